use std::io::Write;
use std::path::Path;

use retitler_core::{RunReport, RunStats};

use crate::{ExportError, ExportFormat};

/// Write a batch summary to `path` in the given format.
pub fn export_summary(report: &RunReport, format: ExportFormat, path: &Path) -> Result<(), ExportError> {
    let content = render(report, format)?;
    let io_err = |source| ExportError::Io {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(io_err)?;
    file.write_all(content.as_bytes()).map_err(io_err)?;
    Ok(())
}

/// Render a batch summary as a string.
pub fn render(report: &RunReport, format: ExportFormat) -> Result<String, ExportError> {
    Ok(match format {
        ExportFormat::Json => export_json(report)?,
        ExportFormat::Csv => export_csv(report),
        ExportFormat::Markdown => export_markdown(report),
        ExportFormat::Text => export_text(report),
    })
}

fn export_json(report: &RunReport) -> Result<String, ExportError> {
    let value = serde_json::json!({
        "stats": report.stats(),
        "cancelled": report.is_cancelled(),
        "results": report.results(),
        "failures": report.failures(),
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn export_csv(report: &RunReport) -> String {
    let mut out = String::from("Original,NewName,DOI,Outcome,Structured\n");
    for r in report.results() {
        out.push_str(&format!(
            "{},{},{},{},{}\n",
            csv_escape(&r.original_name),
            csv_escape(&r.new_name),
            csv_escape(&r.doi),
            r.outcome.as_str(),
            r.structured,
        ));
    }
    for f in report.failures() {
        out.push_str(&format!(
            "{},,,error,false\n",
            csv_escape(&f.file_name),
        ));
    }
    out
}

fn md_escape(s: &str) -> String {
    s.replace('|', "\\|")
}

fn stats_line(s: &RunStats) -> String {
    format!(
        "{} total | {} moved | {} source retained | {} copy failed | {} skipped | {} planned | {} errors | {} structured | {} heuristic only",
        s.total,
        s.moved,
        s.source_retained,
        s.copy_failed,
        s.skipped,
        s.planned,
        s.failed,
        s.structured,
        s.heuristic_only,
    )
}

fn export_markdown(report: &RunReport) -> String {
    let mut out = String::from("# Retitler Summary\n\n");
    out.push_str(&format!("{}\n\n", stats_line(&report.stats())));
    if report.is_cancelled() {
        out.push_str("**Run was cancelled before all documents were processed.**\n\n");
    }

    out.push_str("| Original | New Name | DOI | Outcome |\n");
    out.push_str("|----------|----------|-----|---------|\n");
    for r in report.results() {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            md_escape(&r.original_name),
            md_escape(&r.new_name),
            md_escape(&r.doi),
            r.outcome,
        ));
    }

    if !report.failures().is_empty() {
        out.push_str("\n## Errors\n\n");
        for f in report.failures() {
            out.push_str(&format!("- `{}`: {}\n", f.file_name, f.message));
        }
    }
    out
}

fn export_text(report: &RunReport) -> String {
    let results = report.results();
    let w_orig = results
        .iter()
        .map(|r| r.original_name.chars().count())
        .chain(std::iter::once("Original".len()))
        .max()
        .unwrap_or(0);
    let w_new = results
        .iter()
        .map(|r| r.new_name.chars().count())
        .chain(std::iter::once("New Name".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::from("Retitler Summary\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');
    out.push_str(&format!("  {}\n\n", stats_line(&report.stats())));

    out.push_str(&format!(
        "{:<w_orig$}  {:<w_new$}  DOI\n",
        "Original", "New Name"
    ));
    for r in results {
        out.push_str(&format!(
            "{:<w_orig$}  {:<w_new$}  {}\n",
            r.original_name, r.new_name, r.doi
        ));
    }
    for f in report.failures() {
        out.push_str(&format!("{:<w_orig$}  ERROR: {}\n", f.file_name, f.message));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use retitler_core::{ProcessingResult, RelocationOutcome};

    fn report() -> RunReport {
        let mut report = RunReport::default();
        report.record(ProcessingResult {
            original_name: "paper1.pdf".into(),
            new_name: "2015_Deep_Learning.pdf".into(),
            doi: "10.1038/nature14539".into(),
            outcome: RelocationOutcome::Moved,
            structured: true,
        });
        report.record(ProcessingResult {
            original_name: "scan, final.pdf".into(),
            new_name: "Unknown_Unknown_Title.pdf".into(),
            doi: "Not found".into(),
            outcome: RelocationOutcome::CopyFailed,
            structured: false,
        });
        report
    }

    #[test]
    fn csv_quotes_commas_and_keeps_sentinel() {
        let csv = render(&report(), ExportFormat::Csv).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Original,NewName,DOI,Outcome,Structured");
        assert_eq!(
            lines[1],
            "paper1.pdf,2015_Deep_Learning.pdf,10.1038/nature14539,moved,true"
        );
        assert_eq!(
            lines[2],
            "\"scan, final.pdf\",Unknown_Unknown_Title.pdf,Not found,copy-failed,false"
        );
    }

    #[test]
    fn json_includes_stats_and_results() {
        let json = render(&report(), ExportFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["stats"]["total"], 2);
        assert_eq!(value["stats"]["moved"], 1);
        assert_eq!(value["results"][1]["doi"], "Not found");
        assert_eq!(value["results"][1]["outcome"], "copy-failed");
    }

    #[test]
    fn markdown_escapes_pipes() {
        let mut r = report();
        r.record_failure("bad|name.pdf", "worker panicked");
        let md = render(&r, ExportFormat::Markdown).unwrap();
        assert!(md.contains("| paper1.pdf | 2015_Deep_Learning.pdf | 10.1038/nature14539 | moved |"));
        assert!(md.contains("## Errors"));
    }

    #[test]
    fn text_lists_every_document() {
        let text = render(&report(), ExportFormat::Text).unwrap();
        assert!(text.contains("2 total | 1 moved"));
        assert!(text.contains("paper1.pdf"));
        assert!(text.contains("Not found"));
    }

    #[test]
    fn export_writes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.csv");
        export_summary(&report(), ExportFormat::Csv, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("Original,NewName,DOI"));
    }

    #[test]
    fn export_to_missing_directory_fails() {
        let err = export_summary(
            &report(),
            ExportFormat::Text,
            Path::new("/no/such/dir/summary.txt"),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::Io { .. }));
    }
}
