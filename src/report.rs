//! The per-test-run report task: same write contract as aggregation but
//! scoped to exactly one measurement-data directory.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::aggregate::{aggregate, COVERAGE_FILE, MEASUREMENT_PREFIX};
use crate::config::OutputSelection;
use crate::error::{CovgateError, Result};
use crate::model::AggregatedCoverage;
use crate::writer::{write_reports, ReportRequest, ReportWriter};

/// Gating precondition for a per-run report, evaluated lazily at execution
/// time because instrumentation output is only known after tests ran.
///
/// - absent or empty directory → no measurements, skip;
/// - measurement files present → run;
/// - only the statement universe present → tests produced nothing, skip;
/// - non-empty but matching no expected name → fail loudly instead of
///   silently degrading to "always skip" when the instrumenting plugin
///   changes its naming scheme.
pub fn has_measurements(data_dir: &Path) -> Result<bool> {
    if !data_dir.is_dir() {
        return Ok(false);
    }

    let mut saw_any = false;
    let mut saw_recognized = false;
    let mut saw_measurements = false;
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        saw_any = true;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(MEASUREMENT_PREFIX) {
            saw_measurements = true;
            saw_recognized = true;
        } else if name == COVERAGE_FILE {
            saw_recognized = true;
        }
    }

    if saw_any && !saw_recognized {
        return Err(CovgateError::UnrecognizedMeasurementData(
            data_dir.display().to_string(),
        ));
    }
    Ok(saw_measurements)
}

/// Renders the reports for a single test run's measurement directory.
#[derive(Debug, Clone)]
pub struct ReportTask {
    pub data_dir: PathBuf,
    pub report_dir: PathBuf,
    pub sources: Vec<PathBuf>,
    pub source_encoding: String,
    pub outputs: OutputSelection,
}

impl ReportTask {
    /// Execute the report task. Returns `None` when the gating precondition
    /// fails or the directory aggregates to nothing; both are skips, not
    /// failures.
    pub fn execute(&self, writer: &dyn ReportWriter) -> Result<Option<AggregatedCoverage>> {
        if !has_measurements(&self.data_dir)? {
            info!(data_dir = %self.data_dir.display(), "no measurement data, skipping report");
            return Ok(None);
        }

        let coverage = aggregate(std::slice::from_ref(&self.data_dir))?;
        if coverage.is_empty() {
            info!(data_dir = %self.data_dir.display(), "could not find coverage data, skipping report");
            return Ok(None);
        }

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

        Ok(Some(coverage))
    }
}
