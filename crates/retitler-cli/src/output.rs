use std::io::Write;

use owo_colors::OwoColorize;
use retitler_core::tei::StructuredCandidates;
use retitler_core::{Analysis, MetadataCandidate, RelocationOutcome, RunReport};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn outcome_label(outcome: RelocationOutcome, color: ColorMode) -> String {
    let label = outcome.as_str();
    if !color.enabled() {
        return label.to_string();
    }
    match outcome {
        RelocationOutcome::Moved => label.green().to_string(),
        RelocationOutcome::Planned => label.cyan().to_string(),
        RelocationOutcome::SourceRetained | RelocationOutcome::Skipped => {
            label.yellow().to_string()
        }
        RelocationOutcome::CopyFailed => label.red().to_string(),
    }
}

/// Print the `{original, new_name, doi}` table for every processed document.
pub fn print_results_table(
    w: &mut dyn Write,
    report: &RunReport,
    color: ColorMode,
) -> std::io::Result<()> {
    let results = report.results();
    if results.is_empty() && report.failures().is_empty() {
        writeln!(w, "No PDF files found.")?;
        return Ok(());
    }

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

    let header = format!("{:<w_orig$}  {:<w_new$}  {:<24}  Outcome", "Original", "New Name", "DOI");
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    writeln!(w, "{}", "-".repeat(header.chars().count()))?;

    for r in results {
        let doi = if color.enabled() && r.doi == retitler_core::DOI_NOT_FOUND {
            format!("{:<24}", r.doi).dimmed().to_string()
        } else {
            format!("{:<24}", r.doi)
        };
        writeln!(
            w,
            "{:<w_orig$}  {:<w_new$}  {}  {}",
            r.original_name,
            r.new_name,
            doi,
            outcome_label(r.outcome, color)
        )?;
    }

    for f in report.failures() {
        let line = format!("{:<w_orig$}  error: {}", f.file_name, f.message);
        if color.enabled() {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    Ok(())
}

/// Print the run totals.
pub fn print_summary(w: &mut dyn Write, report: &RunReport, color: ColorMode) -> std::io::Result<()> {
    let s = report.stats();
    writeln!(w)?;
    if color.enabled() {
        writeln!(w, "{}", "Summary".bold())?;
    } else {
        writeln!(w, "Summary")?;
    }
    writeln!(w, "  Documents:        {}", s.total)?;
    if s.planned > 0 {
        writeln!(w, "  Planned (dry run): {}", s.planned)?;
    }
    writeln!(w, "  Moved:            {}", s.moved)?;
    if s.source_retained > 0 {
        let line = format!(
            "  Source retained:  {} (copied, but the original could not be deleted)",
            s.source_retained
        );
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    if s.copy_failed + s.failed > 0 {
        let line = format!("  Failed:           {}", s.copy_failed + s.failed);
        if color.enabled() {
            writeln!(w, "{}", line.red())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    if s.skipped > 0 {
        writeln!(w, "  Skipped:          {}", s.skipped)?;
    }
    writeln!(
        w,
        "  Metadata:         {} structured, {} heuristic only",
        s.structured, s.heuristic_only
    )?;
    if report.is_cancelled() {
        let line = "  Cancelled before all documents were processed.";
        if color.enabled() {
            writeln!(w, "{}", line.yellow())?;
        } else {
            writeln!(w, "{}", line)?;
        }
    }
    Ok(())
}

fn candidate_line(candidate: Option<&MetadataCandidate>) -> String {
    match candidate {
        Some(c) => format!("{} [{}]", c.value, c.source),
        None => "(none)".to_string(),
    }
}

/// Print every candidate and the final record for one document.
pub fn print_analysis(w: &mut dyn Write, analysis: &Analysis, color: ColorMode) -> std::io::Result<()> {
    let name = analysis.document.file_name();
    if color.enabled() {
        writeln!(w, "{} {}", "INSPECT:".bold().cyan(), name.bold())?;
    } else {
        writeln!(w, "INSPECT: {}", name)?;
    }

    writeln!(w, "\nStructured response")?;
    match &analysis.structured {
        Some(StructuredCandidates { title, doi, year }) => {
            writeln!(w, "  Title: {}", candidate_line(title.as_ref()))?;
            writeln!(w, "  Year:  {}", candidate_line(year.as_ref()))?;
            writeln!(w, "  DOI:   {}", candidate_line(doi.as_ref()))?;
        }
        None => writeln!(w, "  (unavailable)")?,
    }

    writeln!(w, "\nFirst page (leading lines)")?;
    for line in analysis.document.first_page_text().lines().take(10) {
        if color.enabled() {
            writeln!(w, "  {}", line.dimmed())?;
        } else {
            writeln!(w, "  {}", line)?;
        }
    }

    let record = &analysis.record;
    writeln!(w, "\nResolved")?;
    writeln!(w, "  Title: {} [{}]", record.title, record.title_source)?;
    writeln!(w, "  Year:  {} [{}]", record.year, record.year_source)?;
    writeln!(w, "  DOI:   {} [{}]", record.doi_or_sentinel(), record.doi_source)?;
    if color.enabled() {
        writeln!(w, "\n  New name: {}", analysis.new_name.green())?;
    } else {
        writeln!(w, "\n  New name: {}", analysis.new_name)?;
    }
    Ok(())
}
