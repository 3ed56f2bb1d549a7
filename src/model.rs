//! Uniform in-memory representation of aggregated coverage, independent of
//! any report format. Built fresh on every aggregation; only its rendered
//! reports are persisted.

use std::collections::BTreeMap;

/// Compute a coverage rate, returning 0.0 when the total is zero.
#[must_use]
pub fn rate(covered: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64
    }
}

/// One instrumentable statement as recorded by the compiler plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub id: u32,
    /// Source path relative to a source root.
    pub source: String,
    pub line: u32,
    pub branch: bool,
}

/// Key for a statement across independently-instrumented modules. Plugin ids
/// are only unique within one compilation, so the source path disambiguates.
pub type StatementKey = (String, u32);

/// Aggregated hit statistics for one statement.
#[derive(Debug, Clone)]
pub struct StatementStats {
    pub statement: Statement,
    pub hit_count: u64,
}

/// The merged result of one or more measurement-data directories.
#[derive(Debug, Clone, Default)]
pub struct AggregatedCoverage {
    pub statements: BTreeMap<StatementKey, StatementStats>,
}

impl AggregatedCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Register a statement from the universe, keeping existing hits.
    pub fn add_statement(&mut self, statement: Statement) {
        self.statements
            .entry((statement.source.clone(), statement.id))
            .or_insert(StatementStats {
                statement,
                hit_count: 0,
            });
    }

    /// Record hits for a statement already in the universe. Hits for unknown
    /// statements are dropped; the universe file is authoritative.
    pub fn add_hits(&mut self, key: &StatementKey, count: u64) {
        if let Some(stats) = self.statements.get_mut(key) {
            stats.hit_count += count;
        }
    }

    fn counted(&self, filter: impl Fn(&StatementStats) -> bool) -> (u64, u64) {
        let mut covered = 0;
        let mut total = 0;
        for stats in self.statements.values().filter(|s| filter(s)) {
            total += 1;
            if stats.hit_count > 0 {
                covered += 1;
            }
        }
        (covered, total)
    }

    /// Statement coverage as a 0–100 percentage, the domain the scoverage
    /// report stores it in.
    #[must_use]
    pub fn statement_rate(&self) -> f64 {
        let (covered, total) = self.counted(|_| true);
        rate(covered, total) * 100.0
    }

    /// Branch coverage as a 0–100 percentage.
    #[must_use]
    pub fn branch_rate(&self) -> f64 {
        let (covered, total) = self.counted(|s| s.statement.branch);
        rate(covered, total) * 100.0
    }

    /// Line coverage as a [0, 1] ratio, the domain Cobertura stores it in.
    /// A line counts as covered when at least one of its statements was hit.
    #[must_use]
    pub fn line_rate(&self) -> f64 {
        let mut lines: BTreeMap<(&str, u32), bool> = BTreeMap::new();
        for stats in self.statements.values() {
            let entry = lines
                .entry((stats.statement.source.as_str(), stats.statement.line))
                .or_insert(false);
            *entry |= stats.hit_count > 0;
        }
        let covered = lines.values().filter(|&&hit| hit).count() as u64;
        rate(covered, lines.len() as u64)
    }

    /// Source files appearing in the universe, deduplicated and ordered.
    pub fn sources(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for stats in self.statements.values() {
            let s = stats.statement.source.as_str();
            if out.last() != Some(&s) && !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }
}
