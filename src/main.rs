use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use covgate::aggregate::AggregateTask;
use covgate::check::{check_coverage, DecimalParser};
use covgate::compile::plugin_arg;
use covgate::config::{CoverageSettings, OutputSelection};
use covgate::coverage::CoverageType;
use covgate::plan::{build_plan, BuildDescription};
use covgate::report::ReportTask;
use covgate::writer::XmlReportWriter;

/// covgate — coverage aggregation and threshold gating for instrumented builds.
#[derive(Parser)]
#[command(name = "covgate", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge measurement-data directories and write unified reports.
    Aggregate {
        /// Measurement-data directories to merge.
        #[arg(required = true)]
        data_dirs: Vec<PathBuf>,

        /// Destination directory for the rendered reports.
        #[arg(long, default_value = "build/reports/scoverage")]
        report_dir: PathBuf,

        /// Source root directories.
        #[arg(long)]
        source: Vec<PathBuf>,

        /// Delete the consumed measurement directories afterwards.
        #[arg(long)]
        delete_reports: bool,
    },

    /// Write reports for a single test run's measurement directory.
    Report {
        /// The measurement-data directory.
        data_dir: PathBuf,

        /// Destination directory for the rendered reports.
        #[arg(long, default_value = "build/reports/scoverage")]
        report_dir: PathBuf,

        /// Source root directories.
        #[arg(long)]
        source: Vec<PathBuf>,
    },

    /// Check an aggregated report against a minimum coverage rate.
    Check {
        /// Directory holding the rendered reports.
        report_dir: PathBuf,

        /// Coverage type to check (Line, Statement, Branch).
        #[arg(long, default_value = "Statement")]
        coverage_type: CoverageType,

        /// Minimum rate in [0, 1].
        #[arg(long, default_value_t = 0.75)]
        minimum_rate: f64,
    },

    /// Resolve a build description into its coverage task graph.
    Plan {
        /// Path to the JSON build description.
        build_file: PathBuf,

        /// Path to the instrumenting compiler plugin artifact. When given,
        /// the printed compile flags include the activation flag.
        #[arg(long)]
        plugin: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Aggregate {
            data_dirs,
            report_dir,
            source,
            delete_reports,
        } => {
            let task = AggregateTask {
                report_dir,
                dirs_to_aggregate_from: data_dirs,
                sources: source,
                source_encoding: "UTF-8".to_string(),
                outputs: OutputSelection::default(),
                delete_reports_on_aggregation: delete_reports,
            };
            let coverage = task
                .execute(&XmlReportWriter)
                .context("Aggregation failed")?;
            if coverage.is_empty() {
                println!("No measurements found, nothing to report.");
            } else {
                println!(
                    "Statement coverage: {:.2}%, branch coverage: {:.2}%",
                    coverage.statement_rate(),
                    coverage.branch_rate()
                );
            }
            Ok(())
        }

        Commands::Report {
            data_dir,
            report_dir,
            source,
        } => {
            let settings = CoverageSettings::default();
            let task = ReportTask {
                data_dir,
                report_dir,
                sources: source,
                source_encoding: "UTF-8".to_string(),
                outputs: settings.outputs,
            };
            match task
                .execute(&XmlReportWriter)
                .context("Report generation failed")?
            {
                Some(coverage) => println!(
                    "Statement coverage: {:.2}%",
                    coverage.statement_rate()
                ),
                None => println!("No measurement data, report skipped."),
            }
            Ok(())
        }

        Commands::Check {
            report_dir,
            coverage_type,
            minimum_rate,
        } => {
            check_coverage(
                &report_dir,
                coverage_type,
                minimum_rate,
                &DecimalParser::default(),
            )?;
            println!("Coverage is at or above the required {:.0}%.", minimum_rate * 100.0);
            Ok(())
        }

        Commands::Plan { build_file, plugin } => {
            let content = std::fs::read_to_string(&build_file)
                .with_context(|| format!("Failed to read {}", build_file.display()))?;
            let build: BuildDescription =
                serde_json::from_str(&content).context("Failed to parse build description")?;
            let plan = build_plan(&build)?;

            let activation = plugin
                .map(|path| plugin_arg(|| Ok(path)))
                .transpose()
                .context("Failed to resolve the compiler plugin")?;

            for (id, node) in plan.graph.tasks() {
                let deps: Vec<String> =
                    node.depends_on.iter().map(|d| d.to_string()).collect();
                let after: Vec<String> =
                    node.must_run_after.iter().map(|d| d.to_string()).collect();
                let mut line = format!("{} [{:?}]", id, node.kind);
                if !node.enabled {
                    line.push_str(" (disabled)");
                }
                if !deps.is_empty() {
                    line.push_str(&format!("  dependsOn: {}", deps.join(", ")));
                }
                if !after.is_empty() {
                    line.push_str(&format!("  mustRunAfter: {}", after.join(", ")));
                }
                if let Some(args) = plan.compile_args.get(id) {
                    let mut args = args.clone();
                    if let Some(flag) = &activation {
                        args.push(flag.clone());
                    }
                    line.push_str(&format!("  scalacArgs: {}", args.join(" ")));
                }
                println!("{}", line);
            }
            Ok(())
        }
    }
}
