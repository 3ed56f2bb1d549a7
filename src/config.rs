//! Configuration surface for a single project's coverage setup.
//!
//! All fields carry serde defaults so a build description can declare only
//! what it overrides. Validation happens at configuration time, before any
//! task executes.

use std::path::PathBuf;

use serde::Deserialize;

use crate::coverage::CoverageType;
use crate::error::{CovgateError, Result};

pub const DEFAULT_COVERAGE_TYPE: CoverageType = CoverageType::Statement;
pub const DEFAULT_MINIMUM_RATE: f64 = 0.75;

/// One threshold to enforce: a coverage type and the minimum ratio it must
/// reach, both in [0, 1] after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CheckConfig {
    pub coverage_type: CoverageType,
    pub minimum_rate: f64,
}

/// Which report formats the write contract should produce.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct OutputSelection {
    pub cobertura: bool,
    pub xml: bool,
    pub html: bool,
    /// XML with per-statement debug detail.
    pub debug: bool,
}

impl Default for OutputSelection {
    fn default() -> Self {
        Self {
            cobertura: true,
            xml: true,
            html: true,
            debug: false,
        }
    }
}

/// Per-project coverage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoverageSettings {
    /// Directory the instrumented compile and test runs write raw
    /// measurement data to.
    pub data_dir: PathBuf,
    /// Directory rendered reports are written to.
    pub report_dir: PathBuf,
    /// Range positioning for statement highlighting.
    pub highlighting: bool,
    /// Regex per excluded package.
    pub excluded_packages: Vec<String>,
    /// Regex per excluded file.
    pub excluded_files: Vec<String>,
    pub outputs: OutputSelection,
    /// Delete consumed per-run measurement directories once aggregation
    /// completes, bounding disk usage in multi-module builds.
    pub delete_reports_on_aggregation: bool,
    /// Explicit threshold checks (new syntax).
    pub checks: Vec<CheckConfig>,
    /// Legacy single-threshold shortcut (old syntax). Mutually exclusive
    /// with `checks`.
    pub coverage_type: Option<CoverageType>,
    /// Legacy minimum rate. Mutually exclusive with `checks`.
    pub minimum_rate: Option<f64>,
    /// Make the instrumented compile the sole compile task and rewire
    /// everything that depended on the original compile output.
    pub instrumented_only: bool,
}

impl Default for CoverageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("build/scoverage"),
            report_dir: PathBuf::from("build/reports/scoverage"),
            highlighting: true,
            excluded_packages: Vec::new(),
            excluded_files: Vec::new(),
            outputs: OutputSelection::default(),
            delete_reports_on_aggregation: false,
            checks: Vec::new(),
            coverage_type: None,
            minimum_rate: None,
            instrumented_only: false,
        }
    }
}

impl CoverageSettings {
    /// Resolve the effective threshold checks.
    ///
    /// With no explicit checks the legacy fields apply, falling back to the
    /// default of 75% statement coverage. Declaring both syntaxes at once is
    /// a configuration error, not a merge.
    pub fn resolved_checks(&self) -> Result<Vec<CheckConfig>> {
        if self.checks.is_empty() {
            Ok(vec![CheckConfig {
                coverage_type: self.coverage_type.unwrap_or(DEFAULT_COVERAGE_TYPE),
                minimum_rate: self.minimum_rate.unwrap_or(DEFAULT_MINIMUM_RATE),
            }])
        } else if self.coverage_type.is_some() || self.minimum_rate.is_some() {
            Err(CovgateError::ConflictingConfiguration)
        } else {
            Ok(self.checks.clone())
        }
    }

    /// Compile every exclusion pattern once, failing fast on invalid regexes
    /// instead of handing them to the compiler plugin verbatim.
    pub fn validate_patterns(&self) -> Result<()> {
        for pattern in self.excluded_packages.iter().chain(&self.excluded_files) {
            regex::Regex::new(pattern).map_err(|source| CovgateError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
