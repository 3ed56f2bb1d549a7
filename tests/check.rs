mod common;

use covgate::check::{check_coverage, DecimalParser};
use covgate::coverage::CoverageType;
use covgate::error::CovgateError;

#[test]
fn missing_report_file_names_the_type() {
    let dir = tempfile::tempdir().unwrap();

    let err = check_coverage(
        dir.path(),
        CoverageType::Statement,
        0.75,
        &DecimalParser::default(),
    )
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Coverage file (type: Statement) not found, check your configuration."
    );
}

#[test]
fn line_coverage_below_threshold_fails_with_percentages() {
    let dir = tempfile::tempdir().unwrap();
    common::write_report_dir(dir.path(), "0.66", "66.0", "50.0");

    let err = check_coverage(dir.path(), CoverageType::Line, 1.0, &DecimalParser::default())
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Only 66% of project is covered by tests instead of 100% (coverageType: Line)"
    );
}

#[test]
fn line_coverage_at_and_above_threshold_passes() {
    let dir = tempfile::tempdir().unwrap();
    common::write_report_dir(dir.path(), "0.66", "66.0", "50.0");

    // Only strictly-below fails: exact equality is within tolerance.
    check_coverage(dir.path(), CoverageType::Line, 0.66, &DecimalParser::default()).unwrap();
    check_coverage(dir.path(), CoverageType::Line, 0.6, &DecimalParser::default()).unwrap();
}

#[test]
fn statement_coverage_failure_shows_two_decimals() {
    let dir = tempfile::tempdir().unwrap();
    common::write_report_dir(dir.path(), "0.33", "33.33", "0.0");

    let err = check_coverage(
        dir.path(),
        CoverageType::Statement,
        1.0,
        &DecimalParser::default(),
    )
    .unwrap_err();

    let msg = err.to_string();
    assert!(msg.contains("33.33"), "message was: {}", msg);
    assert!(msg.contains("100"), "message was: {}", msg);
}

#[test]
fn branch_coverage_threshold_semantics() {
    let dir = tempfile::tempdir().unwrap();
    common::write_report_dir(dir.path(), "0.5", "50.0", "50");

    let err = check_coverage(dir.path(), CoverageType::Branch, 1.0, &DecimalParser::default())
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Only 50%"));
    assert!(msg.contains("instead of 100%"));

    check_coverage(dir.path(), CoverageType::Branch, 0.5, &DecimalParser::default()).unwrap();
    check_coverage(dir.path(), CoverageType::Branch, 0.45, &DecimalParser::default()).unwrap();
}

#[test]
fn malformed_rate_attribute_is_not_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    common::write_report_dir(dir.path(), "0.5", "not-a-number", "0.0");

    let err = check_coverage(
        dir.path(),
        CoverageType::Statement,
        0.1,
        &DecimalParser::default(),
    )
    .unwrap_err();

    assert!(matches!(err, CovgateError::MalformedReport(_)));
}
