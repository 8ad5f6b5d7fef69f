//! Chunked streaming aggregation.
//!
//! A chunk of decoded rows is summarized into a [`ChunkSummary`] without
//! touching shared state. Summaries combine by plain addition, so the result
//! is identical for any chunk size or merge order. Money and ratio sums use
//! `Decimal` to keep that guarantee exact rather than approximately true.
//!
//! [`AggregationSession`] is the only writer of the running state for one
//! ingestion; [`AggregationSession::finish`] freezes it.

use std::collections::HashMap;

use log::debug;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    funnel::FunnelAccumulator,
    record::{CanonicalRecord, RecordBuilder},
    warnings::WarningLog,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunningTotals {
    pub rows: u64,
    pub skipped_rows: u64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: Decimal,
    pub conversion_value: Decimal,
    pub cost: Decimal,
    pub ctr_sum: Decimal,
    pub ctr_count: u64,
    pub search_impression_share_sum: Decimal,
    pub search_impression_share_count: u64,
}

impl RunningTotals {
    pub fn add_record(&mut self, record: &CanonicalRecord) {
        self.rows += 1;
        self.impressions = self.impressions.saturating_add(record.impressions);
        self.clicks = self.clicks.saturating_add(record.clicks);
        self.conversions = self.conversions.saturating_add(record.conversions);
        self.conversion_value = self.conversion_value.saturating_add(record.conversion_value);
        self.cost = self.cost.saturating_add(record.cost);
        if let Some(ctr) = record.ctr {
            self.ctr_sum = self.ctr_sum.saturating_add(ctr);
            self.ctr_count += 1;
        }
        if let Some(share) = record.search_impression_share {
            self.search_impression_share_sum =
                self.search_impression_share_sum.saturating_add(share);
            self.search_impression_share_count += 1;
        }
    }

    pub fn merge(&mut self, other: &RunningTotals) {
        self.rows += other.rows;
        self.skipped_rows += other.skipped_rows;
        self.impressions = self.impressions.saturating_add(other.impressions);
        self.clicks = self.clicks.saturating_add(other.clicks);
        self.conversions = self.conversions.saturating_add(other.conversions);
        self.conversion_value = self.conversion_value.saturating_add(other.conversion_value);
        self.cost = self.cost.saturating_add(other.cost);
        self.ctr_sum = self.ctr_sum.saturating_add(other.ctr_sum);
        self.ctr_count += other.ctr_count;
        self.search_impression_share_sum = self
            .search_impression_share_sum
            .saturating_add(other.search_impression_share_sum);
        self.search_impression_share_count += other.search_impression_share_count;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SkuRevenue {
    pub conversion_value: Decimal,
    pub cost: Decimal,
}

impl SkuRevenue {
    fn accumulate(&mut self, conversion_value: Decimal, cost: Decimal) {
        self.conversion_value = self.conversion_value.saturating_add(conversion_value);
        self.cost = self.cost.saturating_add(cost);
    }
}

/// Cumulative revenue and cost per `item_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkuRevenueTable {
    items: HashMap<String, SkuRevenue>,
}

impl SkuRevenueTable {
    pub fn add(&mut self, item_id: &str, conversion_value: Decimal, cost: Decimal) {
        if let Some(entry) = self.items.get_mut(item_id) {
            entry.accumulate(conversion_value, cost);
            return;
        }
        self.items.insert(
            item_id.to_string(),
            SkuRevenue {
                conversion_value,
                cost,
            },
        );
    }

    pub fn merge(&mut self, other: SkuRevenueTable) {
        for (item_id, revenue) in other.items {
            self.items
                .entry(item_id)
                .or_default()
                .accumulate(revenue.conversion_value, revenue.cost);
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&SkuRevenue> {
        self.items.get(item_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SkuRevenue)> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Decoded rows of one chunk with the input line number of each row.
#[derive(Debug, Clone, Default)]
pub struct RawChunk {
    pub index: usize,
    pub lines: Vec<usize>,
    pub rows: Vec<Vec<String>>,
}

impl RawChunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Chunk-local partial aggregates.
#[derive(Debug, Clone, Default)]
pub struct ChunkSummary {
    pub totals: RunningTotals,
    pub skus: SkuRevenueTable,
    pub funnel: FunnelAccumulator,
    pub warnings: WarningLog,
}

impl ChunkSummary {
    pub fn empty(warning_capacity: usize) -> Self {
        Self {
            warnings: WarningLog::with_capacity(warning_capacity),
            ..Self::default()
        }
    }

    /// Coerces and summarizes one chunk. The coerced records are returned
    /// only when `keep_records` is set.
    pub fn summarize(
        chunk: &RawChunk,
        builder: &RecordBuilder,
        warning_capacity: usize,
        keep_records: bool,
    ) -> (ChunkSummary, Vec<CanonicalRecord>) {
        let mut summary = ChunkSummary::empty(warning_capacity);
        let mut records = Vec::new();
        for (row, line) in chunk.rows.iter().zip(&chunk.lines) {
            let Some(record) = builder.build(row, *line, &mut summary.warnings) else {
                summary.totals.skipped_rows += 1;
                continue;
            };
            summary.add(&record, builder.has_item_ids());
            if keep_records {
                records.push(record);
            }
        }
        (summary, records)
    }

    fn add(&mut self, record: &CanonicalRecord, track_items: bool) {
        self.totals.add_record(record);
        self.funnel.push(record);
        if track_items && let Some(item_id) = &record.item_id {
            self.skus.add(item_id, record.conversion_value, record.cost);
        }
    }

    pub fn merge(mut self, other: ChunkSummary) -> ChunkSummary {
        self.totals.merge(&other.totals);
        self.skus.merge(other.skus);
        self.funnel.merge(other.funnel);
        self.warnings.absorb(other.warnings);
        self
    }
}

/// Frozen aggregates handed to the analyzers.
#[derive(Debug, Clone)]
pub struct CompletedAggregates {
    pub totals: RunningTotals,
    /// `None` when the input had no item identifier column.
    pub skus: Option<SkuRevenueTable>,
    pub funnel: FunnelAccumulator,
    pub warnings: WarningLog,
}

/// Exclusive owner of the running state for one ingestion.
#[derive(Debug)]
pub struct AggregationSession {
    state: ChunkSummary,
    track_items: bool,
    chunks: usize,
}

impl AggregationSession {
    pub fn new(track_items: bool, warning_capacity: usize) -> Self {
        Self {
            state: ChunkSummary::empty(warning_capacity),
            track_items,
            chunks: 0,
        }
    }

    pub fn fold(&mut self, summary: ChunkSummary) {
        self.chunks += 1;
        debug!(
            "Folding chunk {} ({} row(s), {} skipped)",
            self.chunks, summary.totals.rows, summary.totals.skipped_rows
        );
        let state = std::mem::take(&mut self.state);
        self.state = state.merge(summary);
    }

    pub fn rows(&self) -> u64 {
        self.state.totals.rows
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn finish(self) -> CompletedAggregates {
        let ChunkSummary {
            totals,
            skus,
            funnel,
            warnings,
        } = self.state;
        CompletedAggregates {
            totals,
            skus: self.track_items.then_some(skus),
            funnel,
            warnings,
        }
    }
}
