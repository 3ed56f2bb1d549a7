use thiserror::Error;

use crate::coverage::CoverageType;

#[derive(Error, Debug)]
pub enum CovgateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Coverage file (type: {coverage_type}) not found, check your configuration.")]
    ReportFileNotFound {
        coverage_type: CoverageType,
        source: std::io::Error,
    },

    #[error("Malformed coverage report: {0}")]
    MalformedReport(String),

    #[error("Only {actual}% of project is covered by tests instead of {expected}% (coverageType: {coverage_type})")]
    CoverageBelowThreshold {
        /// Actual percentage, at most two decimals, trailing zeros trimmed.
        actual: String,
        /// Required percentage, same rendering.
        expected: String,
        coverage_type: CoverageType,
    },

    #[error("Check configuration should be defined in either the new or the old syntax exclusively, not together")]
    ConflictingConfiguration,

    #[error("Invalid exclusion pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    #[error("Measurement data directory '{0}' is non-empty but contains no recognized coverage files")]
    UnrecognizedMeasurementData(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CovgateError>;
