use crate::document::Document;
use crate::heuristics::{title_from_page_text, year_from_page_text, year_from_title};
use crate::tei::StructuredCandidates;
use crate::{CandidateSource, MetadataCandidate, MetadataRecord, UNKNOWN_TITLE, UNKNOWN_YEAR, UNTITLED};

/// Merge structured candidates with page-text heuristics into a final record.
///
/// Precedence per field:
/// - DOI: structured response only.
/// - Title: structured title (unless it is the `Untitled` placeholder),
///   then the first-page title heuristic, then [`UNKNOWN_TITLE`].
/// - Year: structured year, then a year inside the resolved title, then the
///   first-page year scan, then [`UNKNOWN_YEAR`].
///
/// First-page text is only decoded when a heuristic actually needs it.
pub fn resolve(document: &Document, structured: Option<&StructuredCandidates>) -> MetadataRecord {
    let structured_title = structured
        .and_then(|s| s.title.clone())
        .filter(|t| t.value != UNTITLED && !t.value.trim().is_empty());
    let title = structured_title
        .or_else(|| title_from_page_text(document.first_page_text()))
        .unwrap_or_else(|| MetadataCandidate::new(UNKNOWN_TITLE, CandidateSource::None));

    let year = structured
        .and_then(|s| s.year.clone())
        .or_else(|| year_from_title(&title.value))
        .or_else(|| year_from_page_text(document.first_page_text()))
        .unwrap_or_else(|| MetadataCandidate::new(UNKNOWN_YEAR, CandidateSource::None));

    let doi = structured.and_then(|s| s.doi.clone());

    tracing::debug!(
        file = document.file_name(),
        title_source = %title.source,
        year_source = %year.source,
        doi_found = doi.is_some(),
        "metadata resolved"
    );

    MetadataRecord {
        title: title.value,
        year: year.value,
        doi_source: doi.as_ref().map_or(CandidateSource::None, |d| d.source),
        doi: doi.map(|d| d.value),
        title_source: title.source,
        year_source: year.source,
    }
}
