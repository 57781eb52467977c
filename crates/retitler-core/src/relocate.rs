//! Copy-then-delete relocation of source PDFs into the destination directory.

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::{MetadataRecord, ProcessingResult};

/// What to do when the target filename already exists in the destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Replace the existing file.
    Overwrite,
    /// Append `_2`, `_3`, ... to the stem until the name is free.
    #[default]
    Suffix,
    /// Leave the source untouched and record the document as skipped.
    Skip,
}

impl CollisionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollisionPolicy::Overwrite => "overwrite",
            CollisionPolicy::Suffix => "suffix",
            CollisionPolicy::Skip => "skip",
        }
    }
}

impl FromStr for CollisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "suffix" => Ok(CollisionPolicy::Suffix),
            "skip" => Ok(CollisionPolicy::Skip),
            other => Err(format!(
                "unknown collision policy '{other}' (expected overwrite, suffix, or skip)"
            )),
        }
    }
}

/// How a relocation attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelocationOutcome {
    /// Copied to the destination and the source removed.
    Moved,
    /// Copied, but the source could not be removed. Both copies exist.
    SourceRetained,
    /// The copy failed. The source is untouched.
    CopyFailed,
    /// Not relocated because of the collision policy or because the target is the source.
    Skipped,
    /// Dry run: the name was computed but no file was touched.
    Planned,
}

impl RelocationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocationOutcome::Moved => "moved",
            RelocationOutcome::SourceRetained => "source-retained",
            RelocationOutcome::CopyFailed => "copy-failed",
            RelocationOutcome::Skipped => "skipped",
            RelocationOutcome::Planned => "planned",
        }
    }

    /// Whether a copy of the document now exists under its new name.
    pub fn is_copied(&self) -> bool {
        matches!(
            self,
            RelocationOutcome::Moved | RelocationOutcome::SourceRetained
        )
    }
}

impl std::fmt::Display for RelocationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filesystem primitives used by [`Relocator`].
pub trait FileOps: Send + Sync {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;
}

/// [`FileOps`] backed by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileOps;

impl FileOps for StdFileOps {
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        std::fs::copy(from, to).map(|_| ())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Moves documents into a destination directory under their new names.
///
/// The source file is removed only after the copy has fully succeeded.
/// Picking the final name and writing it happen under one lock, so two
/// workers never write the same destination path.
pub struct Relocator {
    dest_dir: PathBuf,
    policy: CollisionPolicy,
    ops: Arc<dyn FileOps>,
    write_lock: Mutex<()>,
}

impl Relocator {
    pub fn new(dest_dir: impl Into<PathBuf>, policy: CollisionPolicy) -> Self {
        Self::with_file_ops(dest_dir, policy, Arc::new(StdFileOps))
    }

    pub fn with_file_ops(
        dest_dir: impl Into<PathBuf>,
        policy: CollisionPolicy,
        ops: Arc<dyn FileOps>,
    ) -> Self {
        Self {
            dest_dir: dest_dir.into(),
            policy,
            ops,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    pub fn policy(&self) -> CollisionPolicy {
        self.policy
    }

    /// Compute the name a document would get without touching any file.
    pub fn plan(&self, document: &Document, record: &MetadataRecord, new_name: &str) -> ProcessingResult {
        result(document, record, new_name.to_string(), RelocationOutcome::Planned)
    }

    /// Copy the document to `dest_dir/new_name` (subject to the collision
    /// policy), then delete the source.
    pub fn relocate(
        &self,
        document: &Document,
        record: &MetadataRecord,
        new_name: &str,
    ) -> ProcessingResult {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let source = document.path();
        let Some(target) = self.resolve_target(source, new_name) else {
            tracing::warn!(
                file = document.file_name(),
                target = new_name,
                policy = self.policy.as_str(),
                "target name already taken, skipping"
            );
            return result(document, record, new_name.to_string(), RelocationOutcome::Skipped);
        };
        let final_name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| new_name.to_string());

        if same_file(source, &target) {
            tracing::info!(file = document.file_name(), "already has its target name, leaving in place");
            return result(document, record, final_name, RelocationOutcome::Skipped);
        }

        let pre_existing = self.ops.exists(&target);
        if let Err(e) = self.ops.copy(source, &target) {
            tracing::error!(
                file = document.file_name(),
                target = %target.display(),
                error = %e,
                "copy failed, source left in place"
            );
            if !pre_existing && self.ops.exists(&target) {
                if let Err(cleanup) = self.ops.remove(&target) {
                    tracing::warn!(target = %target.display(), error = %cleanup, "failed to remove partial copy");
                }
            }
            return result(document, record, final_name, RelocationOutcome::CopyFailed);
        }

        match self.ops.remove(source) {
            Ok(()) => {
                tracing::info!(file = document.file_name(), new_name = %final_name, "moved");
                result(document, record, final_name, RelocationOutcome::Moved)
            }
            Err(e) => {
                tracing::warn!(
                    file = document.file_name(),
                    new_name = %final_name,
                    error = %e,
                    "copied but could not delete source"
                );
                result(document, record, final_name, RelocationOutcome::SourceRetained)
            }
        }
    }

    /// Target path per the collision policy, or `None` when the policy says skip.
    fn resolve_target(&self, source: &Path, new_name: &str) -> Option<PathBuf> {
        let target = self.dest_dir.join(new_name);
        if !self.ops.exists(&target) || same_file(source, &target) {
            return Some(target);
        }
        match self.policy {
            CollisionPolicy::Overwrite => Some(target),
            CollisionPolicy::Skip => None,
            CollisionPolicy::Suffix => {
                let (stem, ext) = split_extension(new_name);
                (2..)
                    .map(|n| self.dest_dir.join(format!("{stem}_{n}{ext}")))
                    .find(|candidate| !self.ops.exists(candidate))
            }
        }
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn result(
    document: &Document,
    record: &MetadataRecord,
    new_name: String,
    outcome: RelocationOutcome,
) -> ProcessingResult {
    ProcessingResult {
        original_name: document.file_name().to_string(),
        new_name,
        doi: record.doi_or_sentinel().to_string(),
        outcome,
        structured: record.has_structured_signal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CandidateSource;
    use crate::backend::{BackendError, PdfBackend};

    struct NoText;

    impl PdfBackend for NoText {
        fn extract_first_page(&self, _path: &Path) -> Result<String, BackendError> {
            Ok(String::new())
        }
    }

    fn record() -> MetadataRecord {
        MetadataRecord {
            title: "Deep Learning".into(),
            year: "2015".into(),
            doi: Some("10.1038/nature14539".into()),
            title_source: CandidateSource::StructuredTag,
            year_source: CandidateSource::StructuredTag,
            doi_source: CandidateSource::StructuredTag,
        }
    }

    fn setup(name: &str, contents: &[u8]) -> (tempfile::TempDir, PathBuf, Document) {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("renamed_pdfs");
        std::fs::create_dir(&dest).unwrap();
        let src = tmp.path().join(name);
        std::fs::write(&src, contents).unwrap();
        let doc = Document::new(&src, Arc::new(NoText));
        (tmp, dest, doc)
    }

    /// Copy always fails after writing a partial file.
    struct PartialCopy;

    impl FileOps for PartialCopy {
        fn copy(&self, _from: &Path, to: &Path) -> io::Result<()> {
            std::fs::write(to, b"partial")?;
            Err(io::Error::other("disk full"))
        }
        fn remove(&self, path: &Path) -> io::Result<()> {
            std::fs::remove_file(path)
        }
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    /// Copy works but the source can never be deleted.
    struct ReadOnlySource;

    impl FileOps for ReadOnlySource {
        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            std::fs::copy(from, to).map(|_| ())
        }
        fn remove(&self, _path: &Path) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    #[test]
    fn moves_file_and_removes_source() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"%PDF data");
        let relocator = Relocator::new(&dest, CollisionPolicy::Suffix);
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::Moved);
        assert_eq!(r.original_name, "paper1.pdf");
        assert_eq!(r.new_name, "2015_Deep_Learning.pdf");
        assert_eq!(r.doi, "10.1038/nature14539");
        assert!(!doc.path().exists());
        assert_eq!(
            std::fs::read(dest.join("2015_Deep_Learning.pdf")).unwrap(),
            b"%PDF data"
        );
    }

    #[test]
    fn failed_copy_keeps_source_and_removes_partial() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"%PDF data");
        let relocator = Relocator::with_file_ops(&dest, CollisionPolicy::Suffix, Arc::new(PartialCopy));
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::CopyFailed);
        assert_eq!(std::fs::read(doc.path()).unwrap(), b"%PDF data");
        assert!(!dest.join("2015_Deep_Learning.pdf").exists());
    }

    #[test]
    fn failed_overwrite_does_not_delete_existing_target() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"%PDF data");
        std::fs::write(dest.join("2015_Deep_Learning.pdf"), b"older").unwrap();
        let relocator =
            Relocator::with_file_ops(&dest, CollisionPolicy::Overwrite, Arc::new(PartialCopy));
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::CopyFailed);
        assert!(dest.join("2015_Deep_Learning.pdf").exists());
        assert!(doc.path().exists());
    }

    #[test]
    fn undeletable_source_is_reported() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"%PDF data");
        let relocator =
            Relocator::with_file_ops(&dest, CollisionPolicy::Suffix, Arc::new(ReadOnlySource));
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::SourceRetained);
        assert!(r.outcome.is_copied());
        assert!(doc.path().exists());
        assert!(dest.join("2015_Deep_Learning.pdf").exists());
    }

    #[test]
    fn suffix_policy_picks_next_free_name() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"new");
        std::fs::write(dest.join("2015_Deep_Learning.pdf"), b"a").unwrap();
        std::fs::write(dest.join("2015_Deep_Learning_2.pdf"), b"b").unwrap();
        let relocator = Relocator::new(&dest, CollisionPolicy::Suffix);
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::Moved);
        assert_eq!(r.new_name, "2015_Deep_Learning_3.pdf");
        assert_eq!(std::fs::read(dest.join("2015_Deep_Learning.pdf")).unwrap(), b"a");
    }

    #[test]
    fn skip_policy_leaves_source() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"new");
        std::fs::write(dest.join("2015_Deep_Learning.pdf"), b"old").unwrap();
        let relocator = Relocator::new(&dest, CollisionPolicy::Skip);
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::Skipped);
        assert!(doc.path().exists());
        assert_eq!(std::fs::read(dest.join("2015_Deep_Learning.pdf")).unwrap(), b"old");
    }

    #[test]
    fn overwrite_policy_replaces_target() {
        let (_tmp, dest, doc) = setup("paper1.pdf", b"new");
        std::fs::write(dest.join("2015_Deep_Learning.pdf"), b"old").unwrap();
        let relocator = Relocator::new(&dest, CollisionPolicy::Overwrite);
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::Moved);
        assert_eq!(std::fs::read(dest.join("2015_Deep_Learning.pdf")).unwrap(), b"new");
    }

    #[test]
    fn document_already_at_target_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("2015_Deep_Learning.pdf");
        std::fs::write(&src, b"x").unwrap();
        let doc = Document::new(&src, Arc::new(NoText));
        let relocator = Relocator::new(tmp.path(), CollisionPolicy::Suffix);
        let r = relocator.relocate(&doc, &record(), "2015_Deep_Learning.pdf");

        assert_eq!(r.outcome, RelocationOutcome::Skipped);
        assert!(src.exists());
    }

    /// Copies slowly so concurrent relocations overlap.
    struct SlowCopy;

    impl FileOps for SlowCopy {
        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            std::thread::sleep(std::time::Duration::from_millis(100));
            std::fs::copy(from, to).map(|_| ())
        }
        fn remove(&self, path: &Path) -> io::Result<()> {
            std::fs::remove_file(path)
        }
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    #[test]
    fn concurrent_suffix_never_shares_a_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("renamed_pdfs");
        std::fs::create_dir(&dest).unwrap();
        std::fs::write(dest.join("2021_X.pdf"), b"existing").unwrap();
        let a = tmp.path().join("a.pdf");
        let b = tmp.path().join("b.pdf");
        std::fs::write(&a, b"from a").unwrap();
        std::fs::write(&b, b"from b").unwrap();

        let relocator = Arc::new(Relocator::with_file_ops(
            &dest,
            CollisionPolicy::Suffix,
            Arc::new(SlowCopy),
        ));
        let handles: Vec<_> = [(a.clone(), "2021_X.pdf"), (b.clone(), "2021_X_2.pdf")]
            .into_iter()
            .map(|(src, name)| {
                let relocator = Arc::clone(&relocator);
                std::thread::spawn(move || {
                    let doc = Document::new(&src, Arc::new(NoText));
                    relocator.relocate(&doc, &record(), name)
                })
            })
            .collect();
        let results: Vec<ProcessingResult> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().all(|r| r.outcome == RelocationOutcome::Moved));
        assert_ne!(results[0].new_name, results[1].new_name);
        assert!(!a.exists() && !b.exists());

        let mut contents: Vec<Vec<u8>> = std::fs::read_dir(&dest)
            .unwrap()
            .map(|e| std::fs::read(e.unwrap().path()).unwrap())
            .collect();
        contents.sort();
        assert_eq!(
            contents,
            vec![b"existing".to_vec(), b"from a".to_vec(), b"from b".to_vec()]
        );
    }

    #[test]
    fn policy_parses_from_str() {
        assert_eq!("SKIP".parse::<CollisionPolicy>(), Ok(CollisionPolicy::Skip));
        assert_eq!(CollisionPolicy::default(), CollisionPolicy::Suffix);
        assert!("rename".parse::<CollisionPolicy>().is_err());
    }

    #[test]
    fn split_extension_handles_dotless_names() {
        assert_eq!(split_extension("a.pdf"), ("a", ".pdf"));
        assert_eq!(split_extension("noext"), ("noext", ""));
    }
}
