use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("PDF has no pages")]
    NoPages,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF text extraction backends.
///
/// Implementors provide the low-level decoding step; the heuristics that
/// pick a title or year out of the text live in [`crate::heuristics`].
pub trait PdfBackend: Send + Sync {
    /// Extract the text content of the first page of a PDF file.
    fn extract_first_page(&self, path: &Path) -> Result<String, BackendError>;
}
