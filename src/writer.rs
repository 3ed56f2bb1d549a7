//! The report-writing contract and the built-in XML writer.
//!
//! The write contract takes source roots, a destination directory, the
//! aggregated coverage and a source encoding, plus four independent output
//! switches. External writers implement [`ReportWriter`]; failures propagate
//! unchanged since they indicate a packaging mismatch, not a transient
//! condition.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::writer::Writer;
use tracing::info;

use crate::config::OutputSelection;
use crate::error::Result;
use crate::model::AggregatedCoverage;

/// Everything a writer needs for one report.
pub struct ReportRequest<'a> {
    pub sources: &'a [PathBuf],
    pub report_dir: &'a Path,
    pub coverage: &'a AggregatedCoverage,
    pub source_encoding: &'a str,
}

/// Statically-typed interface to a report-writer collaborator.
pub trait ReportWriter {
    fn write_cobertura(&self, req: &ReportRequest<'_>) -> Result<()>;
    fn write_xml(&self, req: &ReportRequest<'_>, debug: bool) -> Result<()>;
    fn write_html(&self, req: &ReportRequest<'_>) -> Result<()>;
}

/// Drive a writer according to the output switches. The destination
/// directory is created if absent; each switch is honored independently.
pub fn write_reports(
    writer: &dyn ReportWriter,
    req: &ReportRequest<'_>,
    outputs: OutputSelection,
) -> Result<()> {
    info!(report_dir = %req.report_dir.display(), "generating coverage reports");
    std::fs::create_dir_all(req.report_dir)?;

    if outputs.cobertura {
        writer.write_cobertura(req)?;
        info!("written Cobertura XML report to {}/cobertura.xml", req.report_dir.display());
    }
    if outputs.xml {
        writer.write_xml(req, false)?;
        info!("written XML report to {}/scoverage.xml", req.report_dir.display());
        if outputs.debug {
            writer.write_xml(req, true)?;
            info!("written XML report with debug information to {}/scoverage-debug.xml", req.report_dir.display());
        }
    }
    if outputs.html {
        writer.write_html(req)?;
        info!("written HTML report to {}/index.html", req.report_dir.display());
    }

    info!("coverage reports completed");
    Ok(())
}

/// Render a percentage the way `DecimalFormat("#.##")` would: at most two
/// decimals, trailing zeros (and a trailing separator) trimmed.
pub fn format_rate(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

/// Built-in writer rendering the XML report formats the checker consumes
/// plus a minimal HTML index. Rich HTML rendering stays with external
/// collaborators.
pub struct XmlReportWriter;

impl XmlReportWriter {
    fn write_file(&self, path: &Path, body: &[u8]) -> Result<()> {
        std::fs::write(path, body)?;
        Ok(())
    }
}

impl ReportWriter for XmlReportWriter {
    fn write_cobertura(&self, req: &ReportRequest<'_>) -> Result<()> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("coverage");
        root.push_attribute(("line-rate", format!("{:.4}", req.coverage.line_rate()).as_str()));
        root.push_attribute((
            "timestamp",
            chrono::Utc::now().timestamp_millis().to_string().as_str(),
        ));
        root.push_attribute(("version", env!("CARGO_PKG_VERSION")));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("sources")))?;
        for source in req.sources {
            writer.write_event(Event::Start(BytesStart::new("source")))?;
            writer.write_event(Event::Text(BytesText::new(
                source.display().to_string().as_str(),
            )))?;
            writer.write_event(Event::End(BytesEnd::new("source")))?;
        }
        writer.write_event(Event::End(BytesEnd::new("sources")))?;

        writer.write_event(Event::End(BytesEnd::new("coverage")))?;
        self.write_file(
            &req.report_dir.join("cobertura.xml"),
            &writer.into_inner().into_inner(),
        )
    }

    fn write_xml(&self, req: &ReportRequest<'_>, debug: bool) -> Result<()> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("scoverage");
        root.push_attribute((
            "statement-rate",
            format!("{:.2}", req.coverage.statement_rate()).as_str(),
        ));
        root.push_attribute((
            "branch-rate",
            format!("{:.2}", req.coverage.branch_rate()).as_str(),
        ));
        root.push_attribute(("source-encoding", req.source_encoding));
        writer.write_event(Event::Start(root))?;

        if debug {
            for stats in req.coverage.statements.values() {
                let mut el = BytesStart::new("statement");
                el.push_attribute(("id", stats.statement.id.to_string().as_str()));
                el.push_attribute(("source", stats.statement.source.as_str()));
                el.push_attribute(("line", stats.statement.line.to_string().as_str()));
                el.push_attribute(("branch", if stats.statement.branch { "true" } else { "false" }));
                el.push_attribute(("invocation-count", stats.hit_count.to_string().as_str()));
                writer.write_event(Event::Empty(el))?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new("scoverage")))?;
        let name = if debug {
            "scoverage-debug.xml"
        } else {
            "scoverage.xml"
        };
        self.write_file(&req.report_dir.join(name), &writer.into_inner().into_inner())
    }

    fn write_html(&self, req: &ReportRequest<'_>) -> Result<()> {
        let body = format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"{}\"><title>Coverage</title></head>\n\
             <body><h1>Coverage</h1>\n\
             <p>Statement coverage: {}%</p>\n\
             <p>Branch coverage: {}%</p>\n\
             </body>\n</html>\n",
            req.source_encoding,
            format_rate(req.coverage.statement_rate()),
            format_rate(req.coverage.branch_rate()),
        );
        self.write_file(&req.report_dir.join("index.html"), body.as_bytes())
    }
}
