//! Randomized checks across the importable codecs
//!
//! Paragraph text with markup-significant characters must come back
//! unchanged from every format that can be read again.

use doc_model::{Node, NodeKind};
use proptest::prelude::*;
use store::{export_bytes, import_bytes, DocumentSnapshot, ExportOptions, Format};

const READABLE: [Format; 5] = [Format::Docx, Format::Odt, Format::Rtf, Format::Html, Format::Native];

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zA-Z0-9{}<>&\\\\\"'\u{e9}\u{df}\u{fc}]{1,8}", 1..6)
        .prop_map(|words| words.join(" "))
}

fn document(paragraphs: &[String]) -> DocumentSnapshot {
    let mut snapshot = DocumentSnapshot::blank();
    let first = snapshot.tree.nodes_of_kind(NodeKind::Paragraph)[0];
    let section = snapshot.tree.parent(first).unwrap();
    for (i, text) in paragraphs.iter().enumerate() {
        let para = if i == 0 {
            first
        } else {
            snapshot.tree.append(section, Node::paragraph()).unwrap()
        };
        snapshot.tree.append(para, Node::run(text.as_str())).unwrap();
    }
    snapshot
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_text_survives_every_readable_format(paragraphs in prop::collection::vec(sentence(), 1..4)) {
        let snapshot = document(&paragraphs);
        let expected = paragraphs.join("\n");
        for format in READABLE {
            let exported = export_bytes(format, &snapshot, &ExportOptions::default()).unwrap();
            let imported = import_bytes(format, &exported.bytes).unwrap();
            let plain = imported.document.tree.plain_text();
            prop_assert_eq!(
                plain.trim(),
                expected.as_str(),
                "format {}",
                format
            );
        }
    }

    #[test]
    fn prop_garbage_is_rejected_or_imported_whole(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        for format in READABLE {
            if let Ok(imported) = import_bytes(format, &bytes) {
                prop_assert!(imported.document.tree.node_count() > 0);
            }
        }
    }
}
