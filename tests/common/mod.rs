use std::fs;
use std::path::{Path, PathBuf};

use covgate::aggregate::{COVERAGE_FILE, MEASUREMENT_PREFIX};

/// Write a measurement-data directory: a statement universe plus one
/// measurement file per test run.
pub fn write_data_dir(dir: &Path, statements: &[(u32, &str, u32, bool)], runs: &[&[u32]]) {
    fs::create_dir_all(dir).unwrap();
    let mut universe = String::from("# covgate coverage 1\n");
    for (id, source, line, branch) in statements {
        universe.push_str(&format!(
            "{}\t{}\t{}\t{}\n",
            id,
            source,
            line,
            if *branch { 1 } else { 0 }
        ));
    }
    fs::write(dir.join(COVERAGE_FILE), universe).unwrap();
    for (i, ids) in runs.iter().enumerate() {
        let body: String = ids.iter().map(|id| format!("{}\n", id)).collect();
        fs::write(dir.join(format!("{}{}", MEASUREMENT_PREFIX, i)), body).unwrap();
    }
}

/// Write the two XML report files the checker knows how to read.
pub fn write_report_dir(
    dir: &Path,
    line_rate: &str,
    statement_rate: &str,
    branch_rate: &str,
) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    fs::write(
        dir.join("cobertura.xml"),
        format!(
            "<?xml version=\"1.0\"?>\n<coverage line-rate=\"{}\" version=\"1.0\"/>\n",
            line_rate
        ),
    )
    .unwrap();
    fs::write(
        dir.join("scoverage.xml"),
        format!(
            "<?xml version=\"1.0\"?>\n<scoverage statement-rate=\"{}\" branch-rate=\"{}\"/>\n",
            statement_rate, branch_rate
        ),
    )
    .unwrap();
    dir.to_path_buf()
}
