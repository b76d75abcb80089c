//! Autosave with numbered versions and background saving
//!
//! The session hands snapshots to a background task through a watch
//! channel. The task writes the newest one on every interval tick where it
//! changed, as a native file named `{document}.{n:04}.wdj`, and prunes old
//! versions. It never reads the live session state.

use crate::background::{report_failure, BackgroundTask, Notice, NoticeSender};
use crate::settings::AutosaveSettings;
use crate::{file_io, native, DocumentSnapshot, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// One auto-saved version on disk
#[derive(Debug, Clone, PartialEq)]
pub struct AutosaveVersion {
    pub number: u32,
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
}

/// Auto-save files of one document in one directory
#[derive(Debug, Clone)]
pub struct AutosaveStore {
    document_id: String,
    location: PathBuf,
    max_versions: usize,
}

impl AutosaveStore {
    pub fn new(document_id: impl Into<String>, location: impl Into<PathBuf>, max_versions: usize) -> Self {
        Self {
            document_id: document_id.into(),
            location: location.into(),
            max_versions: max_versions.max(1),
        }
    }

    pub fn from_settings(document_id: impl Into<String>, settings: &AutosaveSettings) -> Self {
        Self::new(document_id, settings.location.clone(), settings.max_versions)
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn version_path(&self, number: u32) -> PathBuf {
        self.location.join(format!(
            "{}.{:04}.{}",
            self.document_id,
            number,
            native::FILE_EXTENSION
        ))
    }

    fn parse_version(&self, file_name: &str) -> Option<u32> {
        let rest = file_name.strip_prefix(&self.document_id)?.strip_prefix('.')?;
        let number = rest.strip_suffix(native::FILE_EXTENSION)?.strip_suffix('.')?;
        if number.len() < 4 || !number.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        number.parse().ok()
    }

    /// Versions on disk, oldest first. A missing directory has none.
    pub fn list_versions(&self) -> Result<Vec<AutosaveVersion>> {
        let entries = match std::fs::read_dir(&self.location) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(number) = name.to_str().and_then(|n| self.parse_version(n)) else {
                continue;
            };
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .map(DateTime::<Utc>::from);
            versions.push(AutosaveVersion {
                number,
                path: entry.path(),
                modified,
            });
        }
        versions.sort_by_key(|v| v.number);
        Ok(versions)
    }

    pub fn latest(&self) -> Result<Option<AutosaveVersion>> {
        Ok(self.list_versions()?.pop())
    }

    /// Write the next version and prune the oldest beyond the limit
    pub fn write_version(&self, snapshot: &DocumentSnapshot) -> Result<AutosaveVersion> {
        std::fs::create_dir_all(&self.location)?;
        let number = self.latest()?.map_or(1, |v| v.number + 1);
        let path = self.version_path(number);
        let bytes = native::encode(snapshot, false)?;
        file_io::publish(&path, &bytes, None)?;
        self.prune()?;
        Ok(AutosaveVersion {
            number,
            path,
            modified: Some(Utc::now()),
        })
    }

    /// Delete versions beyond `max_versions`, returning how many went
    pub fn prune(&self) -> Result<usize> {
        let versions = self.list_versions()?;
        let excess = versions.len().saturating_sub(self.max_versions);
        for version in &versions[..excess] {
            std::fs::remove_file(&version.path)?;
        }
        if excess > 0 {
            tracing::debug!(document = %self.document_id, removed = excess, "Pruned autosave versions");
        }
        Ok(excess)
    }

    /// Newest version that still decodes. Corrupt versions are skipped.
    pub fn recover(&self) -> Result<Option<(AutosaveVersion, DocumentSnapshot)>> {
        for version in self.list_versions()?.into_iter().rev() {
            let bytes = std::fs::read(&version.path)?;
            match native::decode(&bytes) {
                Ok((_, snapshot)) => return Ok(Some((version, snapshot))),
                Err(e) => {
                    tracing::warn!(path = %version.path.display(), "Skipping unreadable autosave: {}", e);
                }
            }
        }
        Ok(None)
    }

    /// Remove every version, e.g. after a successful save by the user
    pub fn discard(&self) -> Result<()> {
        for version in self.list_versions()? {
            std::fs::remove_file(&version.path)?;
        }
        Ok(())
    }
}

/// Handle to a running autosave task
pub struct AutosaveHandle {
    sender: watch::Sender<Option<Arc<DocumentSnapshot>>>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Offer the latest snapshot. Only the newest pending one is written.
    pub fn submit(&self, snapshot: DocumentSnapshot) {
        self.sender.send_replace(Some(Arc::new(snapshot)));
    }

    /// Stop the task, writing a pending snapshot first
    pub async fn stop(self) -> Result<()> {
        let AutosaveHandle { sender, task } = self;
        drop(sender);
        task.await?;
        Ok(())
    }
}

/// Start the autosave loop. Must be called inside a tokio runtime.
pub fn start_autosave(store: AutosaveStore, interval: Duration, notices: NoticeSender) -> AutosaveHandle {
    let (sender, receiver) = watch::channel(None);
    let task = tokio::spawn(run_autosave(store, interval, receiver, notices));
    AutosaveHandle { sender, task }
}

async fn run_autosave(
    store: AutosaveStore,
    interval: Duration,
    mut receiver: watch::Receiver<Option<Arc<DocumentSnapshot>>>,
    notices: NoticeSender,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;
    let mut saved: Option<Arc<DocumentSnapshot>> = None;

    loop {
        tokio::select! {
            changed = receiver.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let current = receiver.borrow_and_update().clone();
                save_if_changed(&store, current, &mut saved, &notices).await;
            }
        }
    }

    let current = receiver.borrow().clone();
    save_if_changed(&store, current, &mut saved, &notices).await;
    tracing::debug!(document = %store.document_id(), "Autosave stopped");
}

async fn save_if_changed(
    store: &AutosaveStore,
    current: Option<Arc<DocumentSnapshot>>,
    saved: &mut Option<Arc<DocumentSnapshot>>,
    notices: &NoticeSender,
) {
    let Some(snapshot) = current else {
        return;
    };
    if saved.as_ref().is_some_and(|s| Arc::ptr_eq(s, &snapshot)) {
        return;
    }
    let writer = store.clone();
    let pending = snapshot.clone();
    let result = match tokio::task::spawn_blocking(move || writer.write_version(&pending)).await {
        Ok(result) => result,
        Err(join) => Err(join.into()),
    };
    match result {
        Ok(version) => {
            tracing::debug!(path = %version.path.display(), version = version.number, "Autosave written");
            *saved = Some(snapshot);
            let _ = notices.send(Notice::AutosaveWritten {
                path: version.path,
                version: version.number,
            });
        }
        Err(err) => report_failure(notices, BackgroundTask::Autosave, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::notice_channel;
    use doc_model::{Node, NodeKind};
    use tempfile::TempDir;

    fn snapshot(text: &str) -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::blank();
        let para = snapshot.tree.nodes_of_kind(NodeKind::Paragraph)[0];
        snapshot.tree.append(para, Node::run(text)).unwrap();
        snapshot
    }

    #[test]
    fn test_version_naming() {
        let store = AutosaveStore::new("doc-123", "/tmp/autosave", 5);
        assert_eq!(store.version_path(7), PathBuf::from("/tmp/autosave/doc-123.0007.wdj"));
        assert_eq!(store.parse_version("doc-123.0007.wdj"), Some(7));
        assert_eq!(store.parse_version("doc-123.12345.wdj"), Some(12345));
        assert_eq!(store.parse_version("doc-1234.0007.wdj"), None);
        assert_eq!(store.parse_version("doc-123.7.wdj"), None);
        assert_eq!(store.parse_version("doc-123.0007.json"), None);
    }

    #[test]
    fn test_missing_directory_has_no_versions() {
        let dir = TempDir::new().unwrap();
        let store = AutosaveStore::new("doc", dir.path().join("none"), 5);
        assert!(store.list_versions().unwrap().is_empty());
        assert!(store.recover().unwrap().is_none());
    }

    #[test]
    fn test_versions_are_numbered_and_pruned() {
        let dir = TempDir::new().unwrap();
        let store = AutosaveStore::new("doc", dir.path(), 3);
        for i in 0..7 {
            store.write_version(&snapshot(&format!("v{i}"))).unwrap();
        }
        let numbers: Vec<u32> = store.list_versions().unwrap().iter().map(|v| v.number).collect();
        assert_eq!(numbers, vec![5, 6, 7]);

        let (version, recovered) = store.recover().unwrap().unwrap();
        assert_eq!(version.number, 7);
        assert_eq!(recovered.tree.plain_text().trim(), "v6");
    }

    #[test]
    fn test_recover_skips_corrupt_version() {
        let dir = TempDir::new().unwrap();
        let store = AutosaveStore::new("doc", dir.path(), 5);
        store.write_version(&snapshot("good")).unwrap();
        std::fs::write(store.version_path(2), b"{ truncated").unwrap();

        let (version, recovered) = store.recover().unwrap().unwrap();
        assert_eq!(version.number, 1);
        assert_eq!(recovered.tree.plain_text().trim(), "good");
    }

    #[test]
    fn test_discard_removes_only_this_document() {
        let dir = TempDir::new().unwrap();
        let a = AutosaveStore::new("a", dir.path(), 5);
        let b = AutosaveStore::new("b", dir.path(), 5);
        a.write_version(&snapshot("a")).unwrap();
        b.write_version(&snapshot("b")).unwrap();
        a.discard().unwrap();
        assert!(a.list_versions().unwrap().is_empty());
        assert_eq!(b.list_versions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_writes_pending_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = AutosaveStore::new("doc", dir.path(), 5);
        let (tx, mut rx) = notice_channel();

        let handle = start_autosave(store.clone(), Duration::from_secs(3600), tx);
        handle.submit(snapshot("first"));
        handle.submit(snapshot("second"));
        handle.stop().await.unwrap();

        let versions = store.list_versions().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(store.recover().unwrap().unwrap().1.tree.plain_text().trim(), "second");
        assert!(matches!(
            rx.recv().await.unwrap(),
            Notice::AutosaveWritten { version: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_interval_writes_changed_snapshots_only() {
        let dir = TempDir::new().unwrap();
        let store = AutosaveStore::new("doc", dir.path(), 5);
        let (tx, mut rx) = notice_channel();

        let handle = start_autosave(store.clone(), Duration::from_millis(20), tx);
        handle.submit(snapshot("one"));
        assert!(matches!(rx.recv().await.unwrap(), Notice::AutosaveWritten { version: 1, .. }));

        // Nothing new: further ticks write nothing
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.list_versions().unwrap().len(), 1);

        handle.submit(snapshot("two"));
        assert!(matches!(rx.recv().await.unwrap(), Notice::AutosaveWritten { version: 2, .. }));
        handle.stop().await.unwrap();
        assert_eq!(store.list_versions().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let (tx, mut rx) = notice_channel();

        let handle = start_autosave(AutosaveStore::new("doc", &blocker, 5), Duration::from_secs(3600), tx);
        handle.submit(snapshot("lost"));
        handle.stop().await.unwrap();

        match rx.recv().await.unwrap() {
            Notice::BackgroundFailure { task, .. } => assert_eq!(task, BackgroundTask::Autosave),
            other => panic!("unexpected notice {other:?}"),
        }
    }

    #[test]
    fn test_from_settings() {
        let settings = AutosaveSettings::default().with_location("/var/tmp/as");
        let store = AutosaveStore::from_settings("d", &settings);
        assert_eq!(store.location(), Path::new("/var/tmp/as"));
        assert_eq!(store.max_versions, 5);
    }
}
