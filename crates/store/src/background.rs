//! Background export and session notices
//!
//! Exports run on a snapshot inside the blocking pool, so the session that
//! started them keeps editing. Outcomes are reported as [`Notice`]s over a
//! broadcast channel; a failed export never touches the live document.

use crate::{export_bytes, file_io, DocumentSnapshot, ExportOptions, FidelityReport, Format, Result, StoreError};
use revisions::OrphanedAnnotation;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Capacity of a session's notice channel
pub const NOTICE_CAPACITY: usize = 64;

/// Which kind of background work produced a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    Export,
    Autosave,
}

impl std::fmt::Display for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackgroundTask::Export => f.write_str("export"),
            BackgroundTask::Autosave => f.write_str("autosave"),
        }
    }
}

/// Something a session reports outside the return value of a command
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Background work failed; the document in memory is unaffected
    BackgroundFailure {
        task: BackgroundTask,
        message: String,
    },
    ExportPublished {
        path: PathBuf,
        format: Format,
        warnings: usize,
    },
    AutosaveWritten {
        path: PathBuf,
        version: u32,
    },
    /// A comment lost its anchor and was moved to a surviving node
    Orphaned(OrphanedAnnotation),
}

pub type NoticeSender = broadcast::Sender<Notice>;
pub type NoticeReceiver = broadcast::Receiver<Notice>;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    broadcast::channel(NOTICE_CAPACITY)
}

/// Report a failure as a warning and a notice
pub(crate) fn report_failure(notices: &NoticeSender, task: BackgroundTask, err: &StoreError) {
    tracing::warn!(%task, "Background {} failed: {}", task, err);
    // No subscribers is not an error
    let _ = notices.send(Notice::BackgroundFailure {
        task,
        message: err.to_string(),
    });
}

/// Cooperative cancellation flag shared with a background task
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a background export needs, owned
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub snapshot: DocumentSnapshot,
    pub format: Format,
    pub path: PathBuf,
    pub options: ExportOptions,
}

impl ExportJob {
    /// Job writing to `path` in the format its extension names
    pub fn for_path(
        snapshot: DocumentSnapshot,
        path: impl Into<PathBuf>,
        options: ExportOptions,
    ) -> Result<Self> {
        let path = path.into();
        let format = Format::from_path(&path)?;
        Ok(Self {
            snapshot,
            format,
            path,
            options,
        })
    }

    fn run(&self, cancel: &CancelToken) -> Result<FidelityReport> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let exported = export_bytes(self.format, &self.snapshot, &self.options)?;
        file_io::publish(&self.path, &exported.bytes, Some(cancel))?;
        Ok(exported.report)
    }
}

/// A running background export
pub struct ExportHandle {
    cancel: CancelToken,
    task: JoinHandle<Result<FidelityReport>>,
}

impl ExportHandle {
    /// Ask the export to stop. It stops before encoding or before
    /// publishing, whichever comes next, and leaves no output file.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the export and return its fidelity report
    pub async fn wait(self) -> Result<FidelityReport> {
        self.task.await?
    }
}

/// Start an export on the blocking pool. Must be called inside a tokio
/// runtime.
pub fn spawn_export(job: ExportJob, notices: NoticeSender) -> ExportHandle {
    spawn_export_with(job, notices, CancelToken::new())
}

/// Start an export with a caller-supplied cancel token
pub fn spawn_export_with(job: ExportJob, notices: NoticeSender, cancel: CancelToken) -> ExportHandle {
    let token = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        let result = job.run(&token);
        match &result {
            Ok(report) => {
                tracing::info!(path = %job.path.display(), format = %job.format, warnings = report.len(), "Background export published");
                let _ = notices.send(Notice::ExportPublished {
                    path: job.path.clone(),
                    format: job.format,
                    warnings: report.len(),
                });
            }
            Err(StoreError::Cancelled) => {
                tracing::debug!(path = %job.path.display(), "Background export cancelled");
            }
            Err(err) => report_failure(&notices, BackgroundTask::Export, err),
        }
        result
    });
    ExportHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, NodeKind};
    use tempfile::TempDir;

    fn snapshot() -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::blank();
        let para = snapshot.tree.nodes_of_kind(NodeKind::Paragraph)[0];
        snapshot.tree.append(para, Node::run("Background")).unwrap();
        snapshot
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_export_publishes_and_notifies() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.html");
        let (tx, mut rx) = notice_channel();

        let job = ExportJob::for_path(snapshot(), &path, ExportOptions::default()).unwrap();
        let report = spawn_export(job, tx).wait().await.unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("Background"));
        match rx.recv().await.unwrap() {
            Notice::ExportPublished { path: published, format, warnings } => {
                assert_eq!(published, path);
                assert_eq!(format, Format::Html);
                assert_eq!(warnings, report.len());
            }
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_export_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.docx");
        let (tx, mut rx) = notice_channel();

        let token = CancelToken::new();
        token.cancel();
        let job = ExportJob::for_path(snapshot(), &path, ExportOptions::default()).unwrap();
        let err = spawn_export_with(job, tx, token).wait().await.unwrap_err();

        assert!(matches!(err, StoreError::Cancelled));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_becomes_notice() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("out.rtf");
        let (tx, mut rx) = notice_channel();

        let job = ExportJob::for_path(snapshot(), &path, ExportOptions::default()).unwrap();
        assert!(spawn_export(job, tx).wait().await.is_err());

        match rx.recv().await.unwrap() {
            Notice::BackgroundFailure { task, .. } => assert_eq!(task, BackgroundTask::Export),
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_independent_of_later_edits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let (tx, _rx) = notice_channel();

        let mut live = snapshot();
        let job = ExportJob::for_path(live.clone(), &path, ExportOptions::default()).unwrap();
        let handle = spawn_export(job, tx);

        let para = live.tree.nodes_of_kind(NodeKind::Paragraph)[0];
        live.tree.append(para, Node::run(" edited")).unwrap();

        handle.wait().await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Background"));
        assert!(!text.contains("edited"));
    }
}
