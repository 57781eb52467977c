//! Client for the structured metadata service (GROBID header extraction).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use thiserror::Error;

use crate::DEFAULT_GROBID_URL;
use crate::document::Document;

/// Number of response characters written to the debug log.
const RESPONSE_PREVIEW_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status code {0}")]
    Status(u16),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// A service that turns a PDF into a structured (TEI XML) metadata response.
pub trait StructuredSource: Send + Sync {
    fn name(&self) -> &str;

    /// Submit the document and return the raw response body.
    fn fetch<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>>;
}

/// GROBID `processHeaderDocument` client.
pub struct GrobidClient {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl GrobidClient {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            url: url.into(),
            timeout: None,
        }
    }

    /// Per-request timeout. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Default for GrobidClient {
    fn default() -> Self {
        Self::new(DEFAULT_GROBID_URL)
    }
}

impl StructuredSource for GrobidClient {
    fn name(&self) -> &str {
        "GROBID"
    }

    fn fetch<'a>(
        &'a self,
        document: &'a Document,
    ) -> Pin<Box<dyn Future<Output = Result<String, ServiceError>> + Send + 'a>> {
        Box::pin(async move {
            let bytes = document.read_bytes().await?;
            let part = Part::bytes(bytes)
                .file_name(document.file_name().to_string())
                .mime_str("application/pdf")?;
            let form = Form::new().part("input", part);

            let mut request = self.client.post(&self.url).multipart(form);
            if let Some(timeout) = self.timeout {
                request = request.timeout(timeout);
            }
            let resp = request.send().await?;

            let status = resp.status();
            if status != StatusCode::OK {
                return Err(ServiceError::Status(status.as_u16()));
            }
            Ok(resp.text().await?)
        })
    }
}

/// Fetch the structured response for a document.
///
/// Any failure (unreadable file, unreachable service, non-200 status) is
/// logged and reported as `None`; the caller falls back to page heuristics.
pub async fn fetch_structured_metadata(
    source: &dyn StructuredSource,
    document: &Document,
) -> Option<String> {
    match source.fetch(document).await {
        Ok(body) => {
            let preview: String = body.chars().take(RESPONSE_PREVIEW_CHARS).collect();
            tracing::debug!(
                file = document.file_name(),
                service = source.name(),
                response = %preview,
                "structured response received"
            );
            Some(body)
        }
        Err(ServiceError::Status(code)) => {
            tracing::error!(
                file = document.file_name(),
                service = source.name(),
                status = code,
                "structured service returned an error status"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                file = document.file_name(),
                service = source.name(),
                error = %e,
                "structured service request failed"
            );
            None
        }
    }
}
