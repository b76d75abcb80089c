//! Native document format
//!
//! A JSON file holding a header, the content tree and the review overlay.
//! Nothing is lost on a round trip, so auto-save and recovery use it.

use crate::{
    Codec, CodecError, CodecResult, DocumentSnapshot, ExportOptions, Exported, FidelityReport,
    Format, Imported,
};
use chrono::{DateTime, Utc};
use doc_model::DocumentTree;
use revisions::{CommentAnchor, Overlay};
use serde::{Deserialize, Serialize};

/// File format version
pub const FORMAT_VERSION: u32 = 1;

/// File extension for the native format
pub const FILE_EXTENSION: &str = "wdj";

/// File header for format identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Magic string for format identification
    pub magic: String,
    pub version: u32,
    pub document_id: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FileHeader {
    pub const MAGIC: &'static str = "WORDTOOL-DOC";

    pub fn new(document_id: impl Into<String>, created: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            magic: Self::MAGIC.to_string(),
            version: FORMAT_VERSION,
            document_id: document_id.into(),
            created: created.unwrap_or(now),
            modified: now,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == Self::MAGIC && self.version <= FORMAT_VERSION
    }
}

/// Complete file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    pub header: FileHeader,
    pub document: DocumentTree,
    #[serde(default)]
    pub overlay: Overlay,
}

impl DocumentFile {
    pub fn new(snapshot: &DocumentSnapshot) -> Self {
        let tree = snapshot.tree.clone();
        Self {
            header: FileHeader::new(tree.root_id().to_string(), tree.metadata().created),
            document: tree,
            overlay: snapshot.overlay.clone(),
        }
    }
}

/// Serialize a snapshot to native bytes
pub fn encode(snapshot: &DocumentSnapshot, pretty: bool) -> CodecResult<Vec<u8>> {
    let file = DocumentFile::new(snapshot);
    let bytes = if pretty {
        serde_json::to_vec_pretty(&file)
    } else {
        serde_json::to_vec(&file)
    };
    bytes.map_err(|e| CodecError::malformed(Format::Native, e.to_string()))
}

/// Read native bytes back into a snapshot together with the header
pub fn decode(bytes: &[u8]) -> CodecResult<(FileHeader, DocumentSnapshot)> {
    let file: DocumentFile = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::malformed(Format::Native, e.to_string()))?;
    if !file.header.is_valid() {
        return Err(CodecError::malformed(
            Format::Native,
            format!(
                "invalid or unsupported header: {} v{}",
                file.header.magic, file.header.version
            ),
        ));
    }
    check_overlay(&file.document, &file.overlay)?;
    Ok((file.header, DocumentSnapshot::new(file.document, file.overlay)))
}

/// Every node the overlay points at must exist in the tree
fn check_overlay(tree: &DocumentTree, overlay: &Overlay) -> CodecResult<()> {
    let missing = overlay
        .changes()
        .iter()
        .flat_map(|c| c.nodes())
        .chain(overlay.comments().iter().flat_map(|c| match c.anchor {
            CommentAnchor::Text { start, end } => vec![start.node, end.node],
            CommentAnchor::Node(node) => vec![node],
        }))
        .find(|n| !tree.contains(*n));
    match missing {
        Some(node) => Err(CodecError::malformed(
            Format::Native,
            format!("overlay refers to unknown node {node}"),
        )),
        None => Ok(()),
    }
}

pub struct NativeCodec;

impl Codec for NativeCodec {
    fn format(&self) -> Format {
        Format::Native
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        let (header, document) = decode(bytes)?;
        tracing::debug!(document_id = %header.document_id, version = header.version, "Read native header");
        Ok(Imported {
            document,
            report: FidelityReport::import(Format::Native),
        })
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        Ok(Exported {
            bytes: encode(document, options.pretty)?,
            report: FidelityReport::export(Format::Native),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Node, NodeKind};
    use revisions::{Comment, OverlayOp};

    fn sample() -> DocumentSnapshot {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree.append(para, Node::run("Hello")).unwrap();
        let mut overlay = Overlay::new();
        OverlayOp::AddComment(Comment::new(CommentAnchor::Node(run), "alice", "Hi"))
            .apply(&mut overlay)
            .unwrap();
        DocumentSnapshot::new(tree, overlay)
    }

    #[test]
    fn test_round_trip_is_lossless() {
        let snapshot = sample();
        let bytes = encode(&snapshot, true).unwrap();
        let (header, loaded) = decode(&bytes).unwrap();
        assert!(header.is_valid());
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn test_bad_magic_is_malformed() {
        let snapshot = sample();
        let text = String::from_utf8(encode(&snapshot, false).unwrap()).unwrap();
        let text = text.replace(FileHeader::MAGIC, "SOMETHING-ELSE");
        assert!(decode(text.as_bytes()).unwrap_err().is_malformed());
    }

    #[test]
    fn test_dangling_overlay_is_malformed() {
        let mut snapshot = sample();
        snapshot.overlay = Overlay::new();
        OverlayOp::AddComment(Comment::new(
            CommentAnchor::Node(doc_model::NodeId::new()),
            "bob",
            "lost",
        ))
        .apply(&mut snapshot.overlay)
        .unwrap();
        let bytes = encode(&snapshot, false).unwrap();
        assert!(decode(&bytes).unwrap_err().is_malformed());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(decode(b"{not json").unwrap_err().is_malformed());
    }
}
