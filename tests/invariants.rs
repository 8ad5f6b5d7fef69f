mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;

use pmax_insights::{
    aggregate::SkuRevenueTable,
    coerce::{
        CoercionOptions, coerce_amount, coerce_count, coerce_ratio,
        coerce_search_impression_share,
    },
    pareto::{self, rank_items},
    pipeline::{IngestOptions, ingest_reader},
    schema::{AliasTable, DEFAULT_SIMILARITY_THRESHOLD, SchemaMap, normalize_header},
};

#[derive(Debug, Clone)]
struct Row {
    item: u8,
    impressions: u32,
    clicks: u16,
    conversions: u8,
    value_cents: u32,
    cost_cents: u32,
    share: Option<u8>,
}

fn row_strategy() -> impl Strategy<Value = Row> {
    (
        0u8..12,
        0u32..50_000,
        0u16..2_000,
        0u8..60,
        0u32..5_000_000,
        0u32..2_000_000,
        proptest::option::of(0u8..=100),
    )
        .prop_map(
            |(item, impressions, clicks, conversions, value_cents, cost_cents, share)| Row {
                item,
                impressions,
                clicks,
                conversions,
                value_cents,
                cost_cents,
                share,
            },
        )
}

fn render(rows: &[Row]) -> String {
    let mut text = String::from(common::CAMPAIGN_HEADER);
    text.push('\n');
    for row in rows {
        let share = match row.share {
            None => "--".to_string(),
            Some(v) if v < 10 => "< 10".to_string(),
            Some(v) if v > 90 => "> 90".to_string(),
            Some(v) => format!("{v}%"),
        };
        text.push_str(&format!(
            "item-{},{},{},{},${}.{:02},{}.{:02},{}\n",
            row.item,
            row.impressions,
            row.clicks,
            row.conversions,
            row.value_cents / 100,
            row.value_cents % 100,
            row.cost_cents / 100,
            row.cost_cents % 100,
            share
        ));
    }
    text
}

fn aliases() -> AliasTable {
    AliasTable::embedded().expect("embedded aliases parse")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn report_is_independent_of_chunking(
        rows in proptest::collection::vec(row_strategy(), 0..80),
        chunk_size in 1usize..25,
        workers in 1usize..5,
    ) {
        let text = render(&rows);
        let table = aliases();
        let whole = ingest_reader(text.as_bytes(), &table, &IngestOptions::default(), None)
            .expect("whole-file ingest");
        let options = IngestOptions { chunk_size, workers, ..IngestOptions::default() };
        let chunked = ingest_reader(text.as_bytes(), &table, &options, None)
            .expect("chunked ingest");
        let single = ingest_reader(
            text.as_bytes(),
            &table,
            &IngestOptions { chunk_size: 1, ..IngestOptions::default() },
            None,
        )
        .expect("row-at-a-time ingest");
        prop_assert_eq!(whole.report.row_count, rows.len() as u64);
        prop_assert_eq!(&whole.report, &chunked.report);
        prop_assert_eq!(&whole.report, &single.report);
    }

    #[test]
    fn funnel_bands_cover_every_row(rows in proptest::collection::vec(row_strategy(), 0..60)) {
        let text = render(&rows);
        let result = ingest_reader(text.as_bytes(), &aliases(), &IngestOptions::default(), None)
            .expect("ingest");
        let funnel = result.report.funnel;
        for breakdown in [&funnel.impressions_per_click, &funnel.clicks_per_conversion] {
            prop_assert_eq!(
                breakdown.high.count + breakdown.moderate.count + breakdown.low.count,
                rows.len() as u64
            );
            prop_assert!(breakdown.defined_rows <= rows.len() as u64);
        }
    }

    #[test]
    fn normalizer_and_coercers_never_panic(
        headers in proptest::collection::vec("\\PC{0,24}", 0..12),
        cell in "\\PC{0,32}",
    ) {
        let map = SchemaMap::build(&headers, &aliases(), DEFAULT_SIMILARITY_THRESHOLD);
        prop_assert_eq!(map.decisions().len(), headers.len());
        for (decision, header) in map.decisions().iter().zip(&headers) {
            prop_assert_eq!(&decision.normalized, &normalize_header(header));
            prop_assert!(!decision.normalized.starts_with(' '));
        }
        let _ = coerce_amount(&cell);
        let _ = coerce_count(&cell);
        let _ = coerce_ratio(&cell);
        let clipped = coerce_search_impression_share(
            &cell,
            &CoercionOptions { clip_search_impression_share: true },
        );
        if !clipped.is_missing {
            prop_assert!(clipped.value >= Decimal::ZERO && clipped.value <= Decimal::ONE);
        }
    }

    #[test]
    fn covering_set_is_the_smallest_prefix_reaching_the_target(
        values in proptest::collection::vec(0u32..100_000, 1..60),
    ) {
        let mut table = SkuRevenueTable::default();
        for (idx, value) in values.iter().enumerate() {
            table.add(
                &format!("sku-{idx:03}"),
                Decimal::from(*value),
                Decimal::ONE,
            );
        }
        let total: Decimal = values.iter().map(|v| Decimal::from(*v)).sum();
        let result = pareto::analyze(&table, total);
        let target = total * pareto::COVERAGE_TARGET;
        let ranked = rank_items(&table);
        let prefix = |n: usize| -> Decimal {
            ranked[..n].iter().map(|(_, item)| item.conversion_value).sum()
        };

        if total > Decimal::ZERO {
            let k = result.covering_set_size;
            prop_assert!(result.target_reached);
            prop_assert!(k >= 1);
            prop_assert!(prefix(k) >= target);
            prop_assert!(prefix(k - 1) < target);
        } else {
            prop_assert_eq!(result.covering_set_size, 0);
        }

        for pair in result.tiers.windows(2) {
            prop_assert!(pair[0].sku_count <= pair[1].sku_count);
            prop_assert!(pair[0].revenue_percentage <= pair[1].revenue_percentage + 1e-9);
        }
    }
}

#[test]
fn sample_scenario_yields_documented_metrics() {
    let result = ingest_reader(
        common::SAMPLE_EXPORT.as_bytes(),
        &aliases(),
        &IngestOptions::default(),
        None,
    )
    .expect("ingest sample");
    let report = result.report;
    assert_eq!(report.total_impressions, 1500);
    assert_eq!(report.total_clicks, 110);
    assert_eq!(report.total_conversion_value, 550.0);
    assert_eq!(report.total_cost, 150.0);
    assert!((report.roas - 3.67).abs() < 0.01);
    assert_eq!(report.pareto.expect("item ids present").covering_set_size, 1);
    assert_eq!(report.average_search_impression_share, 0.05);
    assert_eq!(result.preview.len(), 0);
    assert!(result.warnings.is_empty());
}

#[test]
fn large_generated_file_matches_across_chunk_sizes() {
    let text = common::generated_export(12_000);
    let table = aliases();
    let big = ingest_reader(
        text.as_bytes(),
        &table,
        &IngestOptions { chunk_size: 250_000, ..IngestOptions::default() },
        None,
    )
    .expect("single chunk");
    let small = ingest_reader(
        text.as_bytes(),
        &table,
        &IngestOptions { chunk_size: 1_000, workers: 3, ..IngestOptions::default() },
        None,
    )
    .expect("many chunks");
    assert_eq!(big.report.row_count, 12_000);
    assert_eq!(big.report, small.report);
}
