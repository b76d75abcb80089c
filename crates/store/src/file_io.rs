//! File I/O operations
//!
//! Documents are read and written by path, with the format taken from the
//! extension. Writes go to a temporary file in the destination directory
//! and are renamed into place, so a reader never sees a partial file.

use crate::{
    export_bytes, import_bytes, CancelToken, DocumentSnapshot, ExportOptions, FidelityReport,
    Format, Imported, Result, StoreError,
};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Write bytes to `path` atomically.
///
/// The cancel token is checked after the data is on disk and before the
/// rename. A cancelled write removes its temporary file.
pub fn publish(path: &Path, bytes: &[u8], cancel: Option<&CancelToken>) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    if cancel.is_some_and(CancelToken::is_cancelled) {
        return Err(StoreError::Cancelled);
    }
    file.persist(path)?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "Published file");
    Ok(())
}

/// Load a document in the format implied by its extension
pub fn load_document_sync(path: impl AsRef<Path>) -> Result<Imported> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let bytes = std::fs::read(path)?;
    Ok(import_bytes(format, &bytes)?)
}

/// Load a document without blocking the runtime
pub async fn load_document(path: impl AsRef<Path>) -> Result<Imported> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let bytes = tokio::fs::read(path).await?;
    let imported = tokio::task::spawn_blocking(move || import_bytes(format, &bytes)).await??;
    Ok(imported)
}

/// Save a document in the format implied by the extension
pub fn save_document_sync(
    snapshot: &DocumentSnapshot,
    path: impl AsRef<Path>,
    options: &ExportOptions,
) -> Result<FidelityReport> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let exported = export_bytes(format, snapshot, options)?;
    publish(path, &exported.bytes, None)?;
    Ok(exported.report)
}

/// Save a document without blocking the runtime
pub async fn save_document(
    snapshot: DocumentSnapshot,
    path: impl AsRef<Path>,
    options: ExportOptions,
) -> Result<FidelityReport> {
    let path = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || save_document_sync(&snapshot, &path, &options)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, NodeKind};
    use tempfile::TempDir;

    fn hello() -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::blank();
        let para = snapshot.tree.nodes_of_kind(NodeKind::Paragraph)[0];
        snapshot.tree.append(para, Node::run("Hello")).unwrap();
        snapshot
    }

    #[test]
    fn test_publish_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        publish(&path, b"first", None).unwrap();
        publish(&path, b"second", None).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cancelled_publish_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.txt");
        let token = CancelToken::new();
        token.cancel();
        let err = publish(&path, b"data", Some(&token)).unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_and_load_by_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.rtf");
        save_document_sync(&hello(), &path, &ExportOptions::default()).unwrap();

        let loaded = load_document_sync(&path).unwrap();
        assert_eq!(loaded.document.tree.plain_text().trim(), "Hello");
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = save_document_sync(&hello(), dir.path().join("x.doc"), &ExportOptions::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownExtension(_)));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.wdj");
        let snapshot = hello();
        save_document(snapshot.clone(), &path, ExportOptions::default())
            .await
            .unwrap();
        let loaded = load_document(&path).await.unwrap();
        assert_eq!(loaded.document, snapshot);
    }
}
