//! Size-bounded log of row-level warnings.

use log::warn;
use serde::Serialize;

pub const DEFAULT_WARNING_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowWarning {
    /// 1-based line number in the input, counting the header as line 1.
    pub line: usize,
    pub message: String,
}

/// Keeps the first `capacity` warnings and counts the rest.
#[derive(Debug, Clone, Serialize)]
pub struct WarningLog {
    capacity: usize,
    entries: Vec<RowWarning>,
    total: usize,
}

impl Default for WarningLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_WARNING_CAPACITY)
    }
}

impl WarningLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
            total: 0,
        }
    }

    pub fn record(&mut self, line: usize, message: impl Into<String>) {
        self.total += 1;
        if self.entries.len() < self.capacity {
            self.entries.push(RowWarning {
                line,
                message: message.into(),
            });
        }
    }

    /// Appends another log, preserving this log's capacity.
    pub fn absorb(&mut self, other: WarningLog) {
        let dropped = other.total - other.entries.len();
        for entry in other.entries {
            self.record(entry.line, entry.message);
        }
        self.total += dropped;
    }

    /// Emits retained entries through the `log` facade.
    pub fn emit(&self) {
        for entry in &self.entries {
            warn!("Line {}: {}", entry.line, entry.message);
        }
        let suppressed = self.suppressed();
        if suppressed > 0 {
            warn!("{suppressed} further warning(s) suppressed");
        }
    }

    pub fn entries(&self) -> &[RowWarning] {
        &self.entries
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn suppressed(&self) -> usize {
        self.total - self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
