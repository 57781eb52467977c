//! Batch orchestration: list PDFs, resolve metadata, relocate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::PdfBackend;
use crate::document::Document;
use crate::filename::build_filename;
use crate::grobid::{GrobidClient, StructuredSource, fetch_structured_metadata};
use crate::relocate::{RelocationOutcome, Relocator};
use crate::resolver::resolve;
use crate::tei::{StructuredCandidates, parse_structured_response};
use crate::{Config, CoreError, MetadataRecord, ProcessingResult, ProgressEvent};

/// List the PDF files directly inside `dir`, sorted by path.
///
/// Only regular files whose extension is `pdf` (any case) are returned.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>, CoreError> {
    let io_err = |source| CoreError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// A document that could not be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub file_name: String,
    pub message: String,
}

/// Counts over a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub total: usize,
    pub moved: usize,
    pub source_retained: usize,
    pub copy_failed: usize,
    pub skipped: usize,
    pub planned: usize,
    pub failed: usize,
    /// Documents where the structured service supplied the title or DOI.
    pub structured: usize,
    pub heuristic_only: usize,
}

/// Results of a batch run, in listing order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    results: Vec<ProcessingResult>,
    failures: Vec<DocumentFailure>,
    cancelled: bool,
}

impl RunReport {
    pub fn record(&mut self, result: ProcessingResult) {
        self.results.push(result);
    }

    pub fn record_failure(&mut self, file_name: impl Into<String>, message: impl Into<String>) {
        self.failures.push(DocumentFailure {
            file_name: file_name.into(),
            message: message.into(),
        });
    }

    pub fn results(&self) -> &[ProcessingResult] {
        &self.results
    }

    pub fn failures(&self) -> &[DocumentFailure] {
        &self.failures
    }

    /// True when the run stopped early on cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn stats(&self) -> RunStats {
        let mut stats = RunStats {
            total: self.results.len() + self.failures.len(),
            failed: self.failures.len(),
            ..RunStats::default()
        };
        for r in &self.results {
            match r.outcome {
                RelocationOutcome::Moved => stats.moved += 1,
                RelocationOutcome::SourceRetained => stats.source_retained += 1,
                RelocationOutcome::CopyFailed => stats.copy_failed += 1,
                RelocationOutcome::Skipped => stats.skipped += 1,
                RelocationOutcome::Planned => stats.planned += 1,
            }
            if r.structured {
                stats.structured += 1;
            } else {
                stats.heuristic_only += 1;
            }
        }
        stats
    }
}

/// Everything learned about one document without relocating it.
#[derive(Debug)]
pub struct Analysis {
    pub document: Document,
    /// `None` when the service was disabled or did not answer.
    pub structured: Option<StructuredCandidates>,
    pub record: MetadataRecord,
    pub new_name: String,
}

/// Resolves and relocates documents.
#[derive(Clone)]
pub struct Pipeline {
    backend: Arc<dyn PdfBackend>,
    source: Option<Arc<dyn StructuredSource>>,
    relocator: Arc<Relocator>,
    dry_run: bool,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn PdfBackend>, relocator: Relocator) -> Self {
        Self {
            backend,
            source: None,
            relocator: Arc::new(relocator),
            dry_run: false,
        }
    }

    /// Build a pipeline from runtime configuration.
    pub fn from_config(config: &Config, backend: Arc<dyn PdfBackend>) -> Self {
        let relocator = Relocator::new(&config.dest_dir, config.collision_policy);
        let mut pipeline = Self::new(backend, relocator).with_dry_run(config.dry_run);
        if config.grobid_enabled {
            let client = GrobidClient::new(&config.grobid_url).with_timeout(config.request_timeout);
            pipeline = pipeline.with_structured_source(Arc::new(client));
        }
        pipeline
    }

    pub fn with_structured_source(mut self, source: Arc<dyn StructuredSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn dest_dir(&self) -> &Path {
        self.relocator.dest_dir()
    }

    async fn structured_candidates(&self, document: &Document) -> Option<StructuredCandidates> {
        let source = self.source.as_ref()?;
        let body = fetch_structured_metadata(source.as_ref(), document).await?;
        Some(parse_structured_response(&body))
    }

    /// Resolve metadata and the target name for a single file.
    pub async fn analyze(&self, path: impl Into<PathBuf>) -> Result<Analysis, CoreError> {
        let document = Document::new(path, self.backend.clone());
        let structured = self.structured_candidates(&document).await;
        tokio::task::spawn_blocking(move || {
            let record = resolve(&document, structured.as_ref());
            let new_name = build_filename(&record);
            Analysis {
                document,
                structured,
                record,
                new_name,
            }
        })
        .await
        .map_err(|e| CoreError::Worker(e.to_string()))
    }

    /// Resolve and relocate one document.
    pub async fn process_document(&self, path: impl Into<PathBuf>) -> Result<ProcessingResult, CoreError> {
        let document = Document::new(path, self.backend.clone());
        let structured = self.structured_candidates(&document).await;
        let relocator = self.relocator.clone();
        let dry_run = self.dry_run;

        // Page decoding and file copies are blocking.
        tokio::task::spawn_blocking(move || {
            let record = resolve(&document, structured.as_ref());
            if record.has_structured_signal() {
                tracing::info!(file = document.file_name(), "processed with structured metadata");
            } else {
                tracing::warn!(
                    file = document.file_name(),
                    "structured metadata missing or invalid, used page heuristics"
                );
            }
            let new_name = build_filename(&record);
            if dry_run {
                relocator.plan(&document, &record, &new_name)
            } else {
                relocator.relocate(&document, &record, &new_name)
            }
        })
        .await
        .map_err(|e| CoreError::Worker(e.to_string()))
    }

    /// Process every PDF in `source_dir` with `num_workers` concurrent workers.
    ///
    /// A failure on one document is recorded and does not stop the batch.
    /// Cancellation stops workers from picking up further documents.
    pub async fn run(
        &self,
        source_dir: &Path,
        num_workers: usize,
        progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
        cancel: CancellationToken,
    ) -> Result<RunReport, CoreError> {
        let pdfs = list_pdfs(source_dir)?;
        if !self.dry_run {
            std::fs::create_dir_all(self.dest_dir()).map_err(|source| CoreError::Io {
                path: self.dest_dir().to_path_buf(),
                source,
            })?;
        }

        let total = pdfs.len();
        let progress = Arc::new(progress);
        progress(ProgressEvent::Started { total });
        tracing::info!(
            source = %source_dir.display(),
            dest = %self.dest_dir().display(),
            total,
            "starting batch"
        );

        let (job_tx, job_rx) = async_channel::unbounded::<(usize, PathBuf)>();
        for job in pdfs.into_iter().enumerate() {
            // Receiver is alive; send on an unbounded channel cannot block.
            let _ = job_tx.send(job).await;
        }
        job_tx.close();

        let mut handles = Vec::with_capacity(num_workers.max(1));
        for _ in 0..num_workers.max(1) {
            handles.push(tokio::spawn(worker_loop(
                self.clone(),
                job_rx.clone(),
                total,
                progress.clone(),
                cancel.clone(),
            )));
        }
        drop(job_rx);

        let mut slots: Vec<Option<Result<ProcessingResult, DocumentFailure>>> = vec![None; total];
        for handle in handles {
            let done = handle.await.map_err(|e| CoreError::Worker(e.to_string()))?;
            for (index, outcome) in done {
                slots[index] = Some(outcome);
            }
        }

        let mut report = RunReport {
            cancelled: cancel.is_cancelled(),
            ..RunReport::default()
        };
        for slot in slots.into_iter().flatten() {
            match slot {
                Ok(result) => report.record(result),
                Err(failure) => report.failures.push(failure),
            }
        }
        Ok(report)
    }
}

type WorkerOutput = Vec<(usize, Result<ProcessingResult, DocumentFailure>)>;

async fn worker_loop(
    pipeline: Pipeline,
    job_rx: async_channel::Receiver<(usize, PathBuf)>,
    total: usize,
    progress: Arc<impl Fn(ProgressEvent) + Send + Sync + 'static>,
    cancel: CancellationToken,
) -> WorkerOutput {
    let mut done = Vec::new();
    while let Ok((index, path)) = job_rx.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!(file = %path.display(), "skipping: cancelled");
            break;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        progress(ProgressEvent::Processing {
            index,
            total,
            file_name: file_name.clone(),
        });

        match pipeline.process_document(path).await {
            Ok(result) => {
                progress(ProgressEvent::Processed {
                    index,
                    total,
                    result: Box::new(result.clone()),
                });
                done.push((index, Ok(result)));
            }
            Err(e) => {
                tracing::error!(file = %file_name, error = %e, "failed to process document");
                progress(ProgressEvent::Failed {
                    index,
                    total,
                    file_name: file_name.clone(),
                    message: e.to_string(),
                });
                done.push((
                    index,
                    Err(DocumentFailure {
                        file_name,
                        message: e.to_string(),
                    }),
                ));
            }
        }
    }
    done
}
