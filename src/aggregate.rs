//! Merging measurement-data directories into one coverage model, and the
//! aggregation task that renders the merged result.
//!
//! Measurement-data directory contract with the instrumenting compiler
//! plugin:
//!   - `scoverage.coverage` — the statement universe, written at compile
//!     time. A header line followed by one tab-separated statement per line:
//!     `id<TAB>source-path<TAB>line<TAB>branch(0|1)`.
//!   - `scoverage.measurements.<N>` — one file per test-runner thread; each
//!     line is the id of a statement that was executed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::OutputSelection;
use crate::error::{CovgateError, Result};
use crate::model::{AggregatedCoverage, Statement};
use crate::writer::{write_reports, ReportRequest, ReportWriter};

pub const COVERAGE_FILE: &str = "scoverage.coverage";
pub const MEASUREMENT_PREFIX: &str = "scoverage.measurements.";
const COVERAGE_HEADER: &str = "# covgate coverage 1";

/// Parse a statement-universe file.
fn parse_coverage_file(path: &Path) -> Result<Vec<Statement>> {
    let content = std::fs::read_to_string(path)?;
    let mut lines = content.lines();

    match lines.next() {
        Some(header) if header.trim() == COVERAGE_HEADER => {}
        _ => {
            return Err(CovgateError::Parse(format!(
                "{}: missing coverage header",
                path.display()
            )))
        }
    }

    let mut statements = Vec::new();
    for (n, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            return Err(CovgateError::Parse(format!(
                "{}:{}: expected 4 tab-separated fields, got {}",
                path.display(),
                n + 2,
                fields.len()
            )));
        }
        let parse_u32 = |s: &str, what: &str| {
            s.parse::<u32>().map_err(|_| {
                CovgateError::Parse(format!(
                    "{}:{}: invalid {} '{}'",
                    path.display(),
                    n + 2,
                    what,
                    s
                ))
            })
        };
        statements.push(Statement {
            id: parse_u32(fields[0], "statement id")?,
            source: fields[1].to_string(),
            line: parse_u32(fields[2], "line number")?,
            branch: fields[3] == "1",
        });
    }
    Ok(statements)
}

/// Parse one measurement file into executed statement ids. Each invocation
/// appends an id, so the same id may repeat; repeats are hit counts.
fn parse_measurements(path: &Path) -> Result<Vec<u32>> {
    let content = std::fs::read_to_string(path)?;
    let mut ids = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line.parse::<u32>().map_err(|_| {
            CovgateError::Parse(format!(
                "{}: invalid statement id '{}'",
                path.display(),
                line
            ))
        })?;
        ids.push(id);
    }
    Ok(ids)
}

/// Measurement files within a data directory, ordered for determinism.
fn measurement_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if name
            .to_str()
            .is_some_and(|n| n.starts_with(MEASUREMENT_PREFIX))
        {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Merge measurement-data directories into one coverage model.
///
/// Duplicate directory paths collapse to one. A directory without a
/// statement universe contributes nothing. Deterministic: the same inputs
/// always produce identical statistics.
pub fn aggregate(dirs: &[PathBuf]) -> Result<AggregatedCoverage> {
    let unique: BTreeSet<&PathBuf> = dirs.iter().collect();
    let mut coverage = AggregatedCoverage::new();

    for dir in unique {
        let universe = dir.join(COVERAGE_FILE);
        if !universe.is_file() {
            debug!(dir = %dir.display(), "no statement universe, skipping directory");
            continue;
        }

        let statements = parse_coverage_file(&universe)?;
        // Plugin ids are only unique within one compilation; resolve hits
        // against this directory's own universe.
        let mut key_of: BTreeMap<u32, (String, u32)> = BTreeMap::new();
        for statement in statements {
            key_of.insert(statement.id, (statement.source.clone(), statement.id));
            coverage.add_statement(statement);
        }

        for file in measurement_files(dir)? {
            for id in parse_measurements(&file)? {
                if let Some(key) = key_of.get(&id) {
                    coverage.add_hits(key, 1);
                }
            }
        }
    }

    Ok(coverage)
}

/// Merges per-run measurement directories and renders the unified reports.
#[derive(Debug, Clone)]
pub struct AggregateTask {
    pub report_dir: PathBuf,
    pub dirs_to_aggregate_from: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub source_encoding: String,
    pub outputs: OutputSelection,
    pub delete_reports_on_aggregation: bool,
}

impl AggregateTask {
    /// Run the aggregation. Zero measurements is a valid "nothing to
    /// report" outcome: no reports are written and the report directory is
    /// left absent.
    pub fn execute(&self, writer: &dyn ReportWriter) -> Result<AggregatedCoverage> {
        let coverage = aggregate(&self.dirs_to_aggregate_from)?;

        if coverage.is_empty() {
            info!(report_dir = %self.report_dir.display(), "no measurements found, skipping report generation");
            return Ok(coverage);
        }

        // No incremental merge of stale reports: start from a clean slate.
        if self.report_dir.exists() {
            std::fs::remove_dir_all(&self.report_dir)?;
        }
        std::fs::create_dir_all(&self.report_dir)?;

        write_reports(
            writer,
            &ReportRequest {
                sources: &self.sources,
                report_dir: &self.report_dir,
                coverage: &coverage,
                source_encoding: &self.source_encoding,
            },
            self.outputs,
        )?;

        if self.delete_reports_on_aggregation {
            let unique: BTreeSet<&PathBuf> = self.dirs_to_aggregate_from.iter().collect();
            for dir in unique {
                if dir.exists() {
                    debug!(dir = %dir.display(), "deleting consumed measurement directory");
                    std::fs::remove_dir_all(dir)?;
                }
            }
        }

        Ok(coverage)
    }
}
