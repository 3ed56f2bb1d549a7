//! Threshold enforcement: read one aggregated report, extract the coverage
//! ratio for a type, and fail the build when it is below the configured
//! minimum.

use std::io::ErrorKind;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::info;

use crate::coverage::CoverageType;
use crate::error::{CovgateError, Result};
use crate::writer::format_rate;

/// Comparison tolerance. Avoids floating-point false failures when the
/// overall rate equals the minimum exactly.
const EPSILON: f64 = 1e-7;

/// Locale-aware decimal number parsing. Reports are written with the
/// generating locale's decimal separator.
#[derive(Debug, Clone, Copy)]
pub struct DecimalParser {
    pub decimal_separator: char,
}

impl Default for DecimalParser {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
        }
    }
}

impl DecimalParser {
    pub fn parse(&self, input: &str) -> Result<f64> {
        let normalized: String = input
            .trim()
            .chars()
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect();
        normalized
            .parse::<f64>()
            .map_err(|_| CovgateError::MalformedReport(format!("cannot parse number '{}'", input)))
    }
}

/// Extract the named attribute from the root element of a report file.
fn root_attribute(content: &[u8], attr_name: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_reader(content);
    reader.trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| {
                        CovgateError::MalformedReport(format!("bad attribute: {}", e))
                    })?;
                    if attr.key.local_name().into_inner() == attr_name.as_bytes() {
                        let value = attr.unescape_value().map_err(CovgateError::Xml)?;
                        return Ok(Some(value.into_owned()));
                    }
                }
                // Only the root element carries the rate attributes.
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Check one coverage threshold against an aggregated report directory.
///
/// Read-only and idempotent. Fails with [`CovgateError::ReportFileNotFound`]
/// when the report artifact is missing, [`CovgateError::MalformedReport`]
/// when the rate attribute is absent or unparseable, and
/// [`CovgateError::CoverageBelowThreshold`] when the normalized rate is
/// strictly below the minimum (beyond [`EPSILON`]).
pub fn check_coverage(
    report_dir: &Path,
    coverage_type: CoverageType,
    minimum_rate: f64,
    parser: &DecimalParser,
) -> Result<()> {
    info!(%coverage_type, minimum_rate, "checking coverage");

    let report_file = report_dir.join(coverage_type.file_name());
    let content = std::fs::read(&report_file).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            CovgateError::ReportFileNotFound {
                coverage_type,
                source,
            }
        } else {
            CovgateError::Io(source)
        }
    })?;

    let raw = root_attribute(&content, coverage_type.attr_name())?.ok_or_else(|| {
        CovgateError::MalformedReport(format!(
            "attribute '{}' not found in {}",
            coverage_type.attr_name(),
            report_file.display()
        ))
    })?;

    let value = parser.parse(&raw)?;
    let overall_rate = coverage_type.normalize(value);

    if minimum_rate - overall_rate > EPSILON {
        return Err(CovgateError::CoverageBelowThreshold {
            actual: format_rate(overall_rate * 100.0),
            expected: format_rate(minimum_rate * 100.0),
            coverage_type,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn report_dir(cobertura_rate: &str, statement_rate: &str, branch_rate: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path();
        fs::write(
            path.join("cobertura.xml"),
            format!(
                "<?xml version=\"1.0\"?>\n<coverage line-rate=\"{}\" version=\"1.0\"/>\n",
                cobertura_rate
            ),
        )
        .unwrap();
        fs::write(
            path.join("scoverage.xml"),
            format!(
                "<?xml version=\"1.0\"?>\n<scoverage statement-rate=\"{}\" branch-rate=\"{}\"/>\n",
                statement_rate, branch_rate
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_missing_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_coverage(
            dir.path(),
            CoverageType::Line,
            0.5,
            &DecimalParser::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found, check your configuration"));
        assert!(err
            .to_string()
            .contains("Coverage file (type: Line) not found"));
    }

    #[test]
    fn test_line_below_threshold() {
        let dir = report_dir("0.66", "66.0", "50.0");
        let err = check_coverage(&dir, CoverageType::Line, 1.0, &DecimalParser::default())
            .unwrap_err();
        let msg = err.to_string();
        assert_eq!(
            msg,
            "Only 66% of project is covered by tests instead of 100% (coverageType: Line)"
        );
    }

    #[test]
    fn test_line_at_and_above_threshold_pass() {
        let dir = report_dir("0.66", "66.0", "50.0");
        // Exact equality passes thanks to the epsilon tolerance.
        check_coverage(&dir, CoverageType::Line, 0.66, &DecimalParser::default()).unwrap();
        check_coverage(&dir, CoverageType::Line, 0.6, &DecimalParser::default()).unwrap();
    }

    #[test]
    fn test_statement_below_threshold_message() {
        let dir = report_dir("0.5", "33.33", "50.0");
        let err = check_coverage(&dir, CoverageType::Statement, 1.0, &DecimalParser::default())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("33.33"));
        assert!(msg.contains("100"));
        assert!(msg.contains("coverageType: Statement"));
    }

    #[test]
    fn test_branch_threshold_semantics() {
        let dir = report_dir("0.5", "33.33", "50");
        let err = check_coverage(&dir, CoverageType::Branch, 1.0, &DecimalParser::default())
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Only 50%"));
        assert!(msg.contains("instead of 100%"));

        check_coverage(&dir, CoverageType::Branch, 0.5, &DecimalParser::default()).unwrap();
        check_coverage(&dir, CoverageType::Branch, 0.45, &DecimalParser::default()).unwrap();
    }

    #[test]
    fn test_comma_locale_parsing() {
        let dir = report_dir("0.5", "33,33", "50,0");
        let parser = DecimalParser {
            decimal_separator: ',',
        };
        let err = check_coverage(&dir, CoverageType::Statement, 1.0, &parser).unwrap_err();
        assert!(err.to_string().contains("33.33"));
    }

    #[test]
    fn test_malformed_rate_is_surfaced() {
        let dir = report_dir("garbage", "66.0", "50.0");
        let err = check_coverage(&dir, CoverageType::Line, 0.5, &DecimalParser::default())
            .unwrap_err();
        assert!(matches!(err, CovgateError::MalformedReport(_)));
    }

    #[test]
    fn test_missing_attribute_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("cobertura.xml"),
            "<?xml version=\"1.0\"?>\n<coverage version=\"1.0\"/>\n",
        )
        .unwrap();
        let err = check_coverage(
            dir.path(),
            CoverageType::Line,
            0.5,
            &DecimalParser::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CovgateError::MalformedReport(_)));
    }

    #[test]
    fn test_repeated_checks_are_idempotent() {
        let dir = report_dir("0.8", "80.0", "70.0");
        for _ in 0..3 {
            check_coverage(&dir, CoverageType::Line, 0.75, &DecimalParser::default()).unwrap();
        }
    }
}
