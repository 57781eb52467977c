use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub mod backend;
pub mod config_file;
pub mod document;
pub mod filename;
pub mod grobid;
pub mod heuristics;
pub mod pipeline;
pub mod relocate;
pub mod resolver;
pub mod tei;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend};
pub use document::Document;
pub use filename::{build_filename, sanitize_title};
pub use grobid::{GrobidClient, ServiceError, StructuredSource, fetch_structured_metadata};
pub use pipeline::{Analysis, DocumentFailure, Pipeline, RunReport, RunStats, list_pdfs};
pub use relocate::{CollisionPolicy, FileOps, RelocationOutcome, Relocator, StdFileOps};
pub use resolver::resolve;
pub use tei::{StructuredCandidates, parse_structured_response};

/// Title used when neither the structured response nor the page text yields one.
pub const UNKNOWN_TITLE: &str = "Unknown_Title";
/// Placeholder title of the structured path; never accepted as a real title.
pub const UNTITLED: &str = "Untitled";
/// Year used when no 4-digit year could be resolved.
pub const UNKNOWN_YEAR: &str = "Unknown";
/// How an absent DOI is written in results and summaries.
pub const DOI_NOT_FOUND: &str = "Not found";
/// Default GROBID header-extraction endpoint.
pub const DEFAULT_GROBID_URL: &str = "http://localhost:8070/api/processHeaderDocument";
/// Default name of the destination directory, relative to the source directory.
pub const DEFAULT_DEST_DIR_NAME: &str = "renamed_pdfs";

/// The method that produced a candidate field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateSource {
    StructuredTag,
    StructuredPattern,
    HeuristicLine,
    HeuristicPattern,
    None,
}

impl CandidateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateSource::StructuredTag => "structured-tag",
            CandidateSource::StructuredPattern => "structured-pattern",
            CandidateSource::HeuristicLine => "heuristic-line",
            CandidateSource::HeuristicPattern => "heuristic-pattern",
            CandidateSource::None => "none",
        }
    }

    /// Whether the value came from the structured metadata service.
    pub fn is_structured(&self) -> bool {
        matches!(
            self,
            CandidateSource::StructuredTag | CandidateSource::StructuredPattern
        )
    }
}

impl fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tentative field value paired with the method that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataCandidate {
    pub value: String,
    pub source: CandidateSource,
}

impl MetadataCandidate {
    pub fn new(value: impl Into<String>, source: CandidateSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }
}

/// The finalized (title, year, DOI) triple for one document.
///
/// `title` is never empty and `year` is either a 1900–2099 year or
/// [`UNKNOWN_YEAR`]. The `*_source` fields record which candidate won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRecord {
    pub title: String,
    pub year: String,
    pub doi: Option<String>,
    pub title_source: CandidateSource,
    pub year_source: CandidateSource,
    pub doi_source: CandidateSource,
}

impl MetadataRecord {
    /// The DOI, or [`DOI_NOT_FOUND`] when absent.
    pub fn doi_or_sentinel(&self) -> &str {
        self.doi.as_deref().unwrap_or(DOI_NOT_FOUND)
    }

    /// True when the structured service contributed the title or the DOI.
    pub fn has_structured_signal(&self) -> bool {
        self.title_source.is_structured() || self.doi_source.is_structured()
    }
}

/// Audit record for one processed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingResult {
    pub original_name: String,
    pub new_name: String,
    pub doi: String,
    pub outcome: RelocationOutcome,
    pub structured: bool,
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Started {
        total: usize,
    },
    Processing {
        index: usize,
        total: usize,
        file_name: String,
    },
    Processed {
        index: usize,
        total: usize,
        result: Box<ProcessingResult>,
    },
    Failed {
        index: usize,
        total: usize,
        file_name: String,
        message: String,
    },
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("document worker failed: {0}")]
    Worker(String),
}

/// Runtime configuration for a batch run.
#[derive(Debug, Clone)]
pub struct Config {
    pub grobid_url: String,
    pub grobid_enabled: bool,
    /// Request timeout for the structured service. `None` means no timeout.
    pub request_timeout: Option<Duration>,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
    pub num_workers: usize,
    pub collision_policy: CollisionPolicy,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        let source_dir = PathBuf::from(".");
        Self {
            grobid_url: DEFAULT_GROBID_URL.to_string(),
            grobid_enabled: true,
            request_timeout: None,
            dest_dir: source_dir.join(DEFAULT_DEST_DIR_NAME),
            source_dir,
            num_workers: 1,
            collision_policy: CollisionPolicy::default(),
            dry_run: false,
        }
    }
}
