//! Candidate extraction from a structured (TEI XML) service response.
//!
//! Each field is resolved by an ordered list of lookups: tag-name variants
//! first, then a pattern over the raw response text. The first lookup that
//! produces a value wins.

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::heuristics::{clean_text, is_valid_year};
use crate::{CandidateSource, MetadataCandidate};

static RAW_TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)title\s*=\s*\{([^}]+)\}").unwrap());
static RAW_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:date|year)\s*=\s*\{?(19[0-9]{2}|20[0-9]{2})").unwrap());
static DATE_TEXT_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19[0-9]{2}|20[0-9]{2})\b").unwrap());

/// A step in a title lookup chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleLookup {
    /// First element with this qualified name and non-empty text.
    Tag(&'static str),
    /// `title = {...}` fragment anywhere in the raw response.
    RawPattern,
}

pub const TITLE_LOOKUPS: [TitleLookup; 4] = [
    TitleLookup::Tag("title"),
    TitleLookup::Tag("tei:title"),
    TitleLookup::Tag("teiheader:title"),
    TitleLookup::RawPattern,
];

/// Qualified names of date-bearing elements, in priority order.
pub const DATE_TAGS: [&str; 3] = ["date", "tei:date", "publicationstmt:date"];
/// Machine-readable date attributes, in priority order.
pub const DATE_ATTRIBUTES: [&str; 2] = ["when", "value"];

/// Candidates pulled out of one structured response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredCandidates {
    pub title: Option<MetadataCandidate>,
    pub doi: Option<MetadataCandidate>,
    pub year: Option<MetadataCandidate>,
}

impl StructuredCandidates {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.doi.is_none() && self.year.is_none()
    }
}

#[derive(Debug, Clone, Default)]
struct Element {
    /// Lower-cased qualified name, e.g. `title` or `tei:title`.
    name: String,
    attributes: Vec<(String, String)>,
    /// Concatenated text of the element and all of its descendants.
    text: String,
}

impl Element {
    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Flat, document-ordered list of the elements of an XML response.
#[derive(Debug, Default)]
struct ElementIndex {
    elements: Vec<Element>,
}

impl ElementIndex {
    fn parse(xml: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(xml);
        let mut elements: Vec<Element> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => {
                    open.push(elements.len());
                    elements.push(element_from(e, reader.decoder()));
                }
                Event::Empty(ref e) => elements.push(element_from(e, reader.decoder())),
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&e[..]).into_owned());
                    for &idx in &open {
                        elements[idx].text.push_str(&text);
                    }
                }
                Event::CData(ref e) => {
                    let text = String::from_utf8_lossy(&e[..]).into_owned();
                    for &idx in &open {
                        elements[idx].text.push_str(&text);
                    }
                }
                Event::End(_) => {
                    open.pop();
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(Self { elements })
    }

    fn find(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|el| el.name == name)
    }

    fn find_with_attr(&self, name: &str, key: &str, value: &str) -> Option<&Element> {
        self.elements
            .iter()
            .find(|el| el.name == name && el.attr(key) == Some(value))
    }
}

fn element_from(e: &BytesStart<'_>, decoder: Decoder) -> Element {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_ascii_lowercase();
    let attributes = e
        .attributes()
        .flatten()
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
            let value = attr
                .decode_and_unescape_value(decoder)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
            (key, value)
        })
        .collect();
    Element {
        name,
        attributes,
        text: String::new(),
    }
}

fn non_empty(text: &str) -> Option<String> {
    let cleaned = clean_text(text);
    (!cleaned.is_empty()).then_some(cleaned)
}

fn lookup_title(
    lookup: TitleLookup,
    index: &ElementIndex,
    raw: &str,
) -> Option<MetadataCandidate> {
    match lookup {
        TitleLookup::Tag(name) => index
            .find(name)
            .and_then(|el| non_empty(&el.text))
            .map(|t| MetadataCandidate::new(t, CandidateSource::StructuredTag)),
        TitleLookup::RawPattern => RAW_TITLE_RE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .and_then(|m| non_empty(m.as_str()))
            .map(|t| MetadataCandidate::new(t, CandidateSource::StructuredPattern)),
    }
}

fn extract_title(index: &ElementIndex, raw: &str) -> Option<MetadataCandidate> {
    TITLE_LOOKUPS
        .iter()
        .find_map(|&lookup| lookup_title(lookup, index, raw))
}

fn extract_doi(index: &ElementIndex) -> Option<MetadataCandidate> {
    index
        .find_with_attr("idno", "type", "DOI")
        .and_then(|el| non_empty(&el.text))
        .map(|doi| MetadataCandidate::new(doi, CandidateSource::StructuredTag))
}

/// Year from a date element: machine-readable attribute first, then free text.
fn year_from_date_element(el: &Element) -> Option<MetadataCandidate> {
    let attr_value = DATE_ATTRIBUTES
        .iter()
        .find_map(|key| el.attr(key).map(str::trim).filter(|v| !v.is_empty()));

    let year = match attr_value {
        Some(value) => {
            let prefix = value.split('-').next().unwrap_or_default();
            if !is_valid_year(prefix) {
                tracing::warn!(value, "date attribute does not start with a usable year");
                return None;
            }
            prefix.to_string()
        }
        None => DATE_TEXT_YEAR_RE.find(&el.text)?.as_str().to_string(),
    };
    Some(MetadataCandidate::new(year, CandidateSource::StructuredTag))
}

fn extract_year(index: &ElementIndex, raw: &str) -> Option<MetadataCandidate> {
    match DATE_TAGS.iter().find_map(|name| index.find(name)) {
        Some(el) => year_from_date_element(el),
        None => RAW_YEAR_RE
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| MetadataCandidate::new(m.as_str(), CandidateSource::StructuredPattern)),
    }
}

/// Extract title, DOI, and year candidates from a structured response.
///
/// Malformed XML is logged and treated as a document with no elements, so
/// only the raw-text pattern lookups can still produce candidates.
pub fn parse_structured_response(response: &str) -> StructuredCandidates {
    let index = match ElementIndex::parse(response) {
        Ok(index) => index,
        Err(e) => {
            tracing::error!(error = %e, "failed to parse structured response");
            ElementIndex::default()
        }
    };

    StructuredCandidates {
        title: extract_title(&index, response),
        doi: extract_doi(&index),
        year: extract_year(&index, response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROBID_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xml:space="preserve" xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader xml:lang="en">
    <fileDesc>
      <titleStmt>
        <title level="a" type="main">Attention Is
            All You Need</title>
      </titleStmt>
      <publicationStmt>
        <publisher/>
        <availability status="unknown"><licence/></availability>
        <date type="published" when="2017-06-12">12 June 2017</date>
      </publicationStmt>
      <sourceDesc>
        <biblStruct>
          <idno type="arXiv">arXiv:1706.03762</idno>
          <idno type="DOI">10.48550/arXiv.1706.03762</idno>
        </biblStruct>
      </sourceDesc>
    </fileDesc>
  </teiHeader>
</TEI>"#;

    #[test]
    fn parses_grobid_header() {
        let c = parse_structured_response(GROBID_HEADER);
        let title = c.title.unwrap();
        assert_eq!(title.value, "Attention Is All You Need");
        assert_eq!(title.source, CandidateSource::StructuredTag);
        assert_eq!(c.doi.unwrap().value, "10.48550/arXiv.1706.03762");
        let year = c.year.unwrap();
        assert_eq!(year.value, "2017");
        assert_eq!(year.source, CandidateSource::StructuredTag);
    }

    #[test]
    fn prefixed_title_tag_is_a_fallback() {
        let xml = "<doc><tei:title>Prefixed Title Here</tei:title></doc>";
        assert_eq!(
            parse_structured_response(xml).title.unwrap().value,
            "Prefixed Title Here"
        );
    }

    #[test]
    fn empty_title_tag_falls_through_to_raw_pattern() {
        let xml = "<doc><title/><note>title = {Graph Cuts in Vision}</note></doc>";
        let title = parse_structured_response(xml).title.unwrap();
        assert_eq!(title.value, "Graph Cuts in Vision");
        assert_eq!(title.source, CandidateSource::StructuredPattern);
    }

    #[test]
    fn doi_requires_exact_type_attribute() {
        let xml = r#"<doc><idno type="doi">10.1/lower</idno><idno type="MD5">abc</idno></doc>"#;
        assert!(parse_structured_response(xml).doi.is_none());
    }

    #[test]
    fn attribute_values_are_decoded_and_unescaped() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI><idno type="&#68;OI">10.1/escaped</idno><date when="&#50;018-02-01"/></TEI>"#;
        let c = parse_structured_response(xml);
        assert_eq!(c.doi.unwrap().value, "10.1/escaped");
        assert_eq!(c.year.unwrap().value, "2018");
    }

    #[test]
    fn value_attribute_used_when_no_when() {
        let xml = r#"<doc><date value="1999-01">Jan</date></doc>"#;
        assert_eq!(parse_structured_response(xml).year.unwrap().value, "1999");
    }

    #[test]
    fn date_text_used_without_attributes() {
        let xml = "<doc><date>Published in March 2004</date></doc>";
        assert_eq!(parse_structured_response(xml).year.unwrap().value, "2004");
    }

    #[test]
    fn date_tag_blocks_raw_fallback() {
        // A date element exists but carries no year; the raw pattern is not consulted.
        let xml = "<doc><date>n.d.</date><note>year = {2011}</note></doc>";
        assert!(parse_structured_response(xml).year.is_none());
    }

    #[test]
    fn raw_year_pattern_without_date_tag() {
        let xml = "<doc><note>@article{x, year = {2011}}</note></doc>";
        let year = parse_structured_response(xml).year.unwrap();
        assert_eq!(year.value, "2011");
        assert_eq!(year.source, CandidateSource::StructuredPattern);
    }

    #[test]
    fn out_of_range_attribute_year_is_discarded() {
        let xml = r#"<doc><date when="1850-01-01"/></doc>"#;
        assert!(parse_structured_response(xml).year.is_none());
    }

    #[test]
    fn malformed_xml_still_tries_raw_patterns() {
        let xml = "<doc><title>Broken</wrong> title = {Recovered Title} date={2015}";
        let c = parse_structured_response(xml);
        assert_eq!(c.title.unwrap().value, "Recovered Title");
        assert_eq!(c.year.unwrap().value, "2015");
        assert!(c.doi.is_none());
    }

    #[test]
    fn empty_response_has_no_candidates() {
        assert!(parse_structured_response("").is_empty());
    }
}
