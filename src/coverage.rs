//! The kinds of coverage the instrumenting compiler plugin can measure,
//! and how each maps onto a rendered report file.

use serde::{Deserialize, Serialize};

use crate::error::CovgateError;

/// A measurement granularity. Each variant knows which report file carries
/// its value, which attribute holds it, and the factor that normalizes the
/// stored value to a [0, 1] ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoverageType {
    Line,
    Statement,
    Branch,
}

impl CoverageType {
    /// Name of the report file holding this coverage value.
    pub fn file_name(&self) -> &'static str {
        match self {
            CoverageType::Line => "cobertura.xml",
            CoverageType::Statement | CoverageType::Branch => "scoverage.xml",
        }
    }

    /// Name of the attribute within the report file.
    pub fn attr_name(&self) -> &'static str {
        match self {
            CoverageType::Line => "line-rate",
            CoverageType::Statement => "statement-rate",
            CoverageType::Branch => "branch-rate",
        }
    }

    /// Divisor that maps the stored value domain onto [0, 1]. Line rates are
    /// already ratios; statement and branch rates are stored as 0–100.
    pub fn factor(&self) -> f64 {
        match self {
            CoverageType::Line => 1.0,
            CoverageType::Statement | CoverageType::Branch => 100.0,
        }
    }

    /// Normalize a raw report value to a [0, 1] ratio.
    pub fn normalize(&self, value: f64) -> f64 {
        value / self.factor()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageType::Line => "Line",
            CoverageType::Statement => "Statement",
            CoverageType::Branch => "Branch",
        }
    }

    /// Case-insensitive lookup by configuration name. Absence is left to the
    /// caller to turn into a fallback or an error.
    pub fn find(configuration_name: &str) -> Option<CoverageType> {
        [
            CoverageType::Line,
            CoverageType::Statement,
            CoverageType::Branch,
        ]
        .into_iter()
        .find(|t| t.as_str().eq_ignore_ascii_case(configuration_name))
    }
}

impl std::str::FromStr for CoverageType {
    type Err = CovgateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        CoverageType::find(s).ok_or_else(|| {
            CovgateError::Parse(format!(
                "Unknown coverage type: '{}'. Supported: Line, Statement, Branch",
                s
            ))
        })
    }
}

impl std::fmt::Display for CoverageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
