use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::backend::PdfBackend;

/// A source PDF being processed.
///
/// The first-page text is decoded lazily, at most once, and shared by every
/// heuristic that needs it.
pub struct Document {
    path: PathBuf,
    file_name: String,
    backend: Arc<dyn PdfBackend>,
    first_page: OnceCell<String>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, backend: Arc<dyn PdfBackend>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            file_name,
            backend,
            first_page: OnceCell::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Read the raw bytes of the document.
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }

    /// First-page text, decoded on first use. Empty if extraction failed.
    pub fn first_page_text(&self) -> &str {
        self.first_page
            .get_or_init(|| extract_first_page_text(self.backend.as_ref(), &self.path))
    }

    /// Whether the first page has been decoded yet.
    pub fn is_text_extracted(&self) -> bool {
        self.first_page.get().is_some()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("path", &self.path)
            .field("first_page", &self.first_page.get().map(|t| t.len()))
            .finish()
    }
}

/// Extract the first page's text, logging and swallowing any failure.
pub fn extract_first_page_text(backend: &dyn PdfBackend, path: &Path) -> String {
    match backend.extract_first_page(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(file = %path.display(), error = %e, "failed to extract first-page text");
            String::new()
        }
    }
}
