//! Title and year heuristics over raw first-page text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{CandidateSource, MetadataCandidate, UNKNOWN_TITLE, UNTITLED};

/// Number of leading page lines considered for a title.
pub const TITLE_SCAN_LINES: usize = 5;
/// Number of leading page lines scanned for a year.
pub const YEAR_SCAN_LINES: usize = 10;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19[0-9]{2}|20[0-9]{2})\b").unwrap());

/// Section headings that open a page but are never the paper title,
/// optionally numbered ("1 Introduction", "I. INTRODUCTION").
static SECTION_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:[0-9]+\.?|[ivx]+\.)?\s*(?:introduction|contents|table of contents|keywords|index terms|references|acknowledge?ments)\s*[:.]?$",
    )
    .unwrap()
});

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First 1900–2099 year appearing as a standalone 4-digit token.
pub fn find_year(text: &str) -> Option<String> {
    YEAR_RE.find(text).map(|m| m.as_str().to_string())
}

/// Whether `value` is a 4-digit year in 1900–2099.
pub fn is_valid_year(value: &str) -> bool {
    value.len() == 4
        && value.bytes().all(|b| b.is_ascii_digit())
        && (value.starts_with("19") || value.starts_with("20"))
}

/// Whether a title is one of the placeholder values.
pub fn is_sentinel_title(title: &str) -> bool {
    title == UNKNOWN_TITLE || title == UNTITLED
}

static ABSTRACT_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^abstract\s*(?:[:.\u{2013}\u{2014}-]|$)").unwrap());

fn is_section_heading(line: &str) -> bool {
    SECTION_HEADING_RE.is_match(line) || ABSTRACT_HEADING_RE.is_match(line)
}

fn is_title_line(line: &str) -> bool {
    let len = line.chars().count();
    len > 10
        && len < 100
        && line.chars().next().is_some_and(char::is_uppercase)
        && !is_section_heading(line)
}

/// Pick a title from the first few lines of page text.
///
/// The first trimmed line longer than 10 and shorter than 100 characters
/// that starts with an uppercase letter wins.
pub fn title_from_page_text(text: &str) -> Option<MetadataCandidate> {
    text.lines()
        .take(TITLE_SCAN_LINES)
        .map(str::trim)
        .find(|line| is_title_line(line))
        .map(|line| MetadataCandidate::new(line, CandidateSource::HeuristicLine))
}

/// Year embedded in an already-resolved title, e.g. "... (2019) Revisited".
pub fn year_from_title(title: &str) -> Option<MetadataCandidate> {
    if is_sentinel_title(title) {
        return None;
    }
    find_year(title).map(|y| MetadataCandidate::new(y, CandidateSource::HeuristicPattern))
}

/// First year found in the leading lines of page text.
pub fn year_from_page_text(text: &str) -> Option<MetadataCandidate> {
    text.lines()
        .take(YEAR_SCAN_LINES)
        .find_map(find_year)
        .map(|y| MetadataCandidate::new(y, CandidateSource::HeuristicPattern))
}
