//! Plain text import and export

use crate::builder::DocumentBuilder;
use crate::view::{ExportView, OverlaySupport};
use crate::{
    Codec, CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory,
    FidelityReport, Format, Imported, WarningSeverity,
};
use doc_model::{Formatting, NodeId, NodeKind};
use std::collections::HashMap;

const BOM: &[u8] = b"\xEF\xBB\xBF";

pub struct TextCodec;

impl Codec for TextCodec {
    fn format(&self) -> Format {
        Format::Text
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        let bytes = bytes.strip_prefix(BOM).unwrap_or(bytes);
        let mut builder = DocumentBuilder::new(Format::Text);
        let text = String::from_utf8_lossy(bytes);
        if let std::borrow::Cow::Owned(_) = text {
            builder.warn(
                "text.invalid_utf8",
                FeatureCategory::Other,
                WarningSeverity::Minor,
                "Invalid UTF-8 sequences replaced",
            );
        }

        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        let mut lines: Vec<&str> = normalized.split('\n').collect();
        // A trailing newline ends the last paragraph rather than starting one.
        if lines.len() > 1 && lines.last() == Some(&"") {
            lines.pop();
        }
        for line in lines {
            builder.begin_paragraph(None, Formatting::new())?;
            builder.run(line, None, Formatting::new())?;
            builder.end_paragraph();
        }
        builder.finish()
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        let view = ExportView::new(document, options.view);
        let mut report = FidelityReport::export(Format::Text);
        let labels = view.list_labels();
        let mut lines = Vec::new();
        for section in view.sections() {
            write_blocks(&view, &labels, section, &mut lines);
        }
        report_losses(&view, &mut report);

        let mut out = lines.join("\n");
        out.push('\n');
        Ok(Exported {
            bytes: out.into_bytes(),
            report,
        })
    }
}

/// List items are indented two spaces per level and start with their
/// marker.
fn write_blocks(
    view: &ExportView<'_>,
    labels: &HashMap<NodeId, String>,
    container: NodeId,
    lines: &mut Vec<String>,
) {
    for block in view.children(container) {
        match view.kind(block) {
            Some(NodeKind::Paragraph) => {
                let text = view.text_of(block);
                match (labels.get(&block), view.list_membership(block)) {
                    (Some(label), Some((_, level))) => {
                        let indent = "  ".repeat(usize::from(level));
                        lines.push(format!("{indent}{label} {text}"));
                    }
                    _ => lines.push(text),
                }
            }
            Some(NodeKind::Table) => {
                for row in view.children(block) {
                    let cells: Vec<String> = view
                        .children(row)
                        .into_iter()
                        .map(|cell| {
                            view.paragraphs(cell)
                                .into_iter()
                                .map(|p| view.text_of(p))
                                .collect::<Vec<_>>()
                                .join(" ")
                        })
                        .collect();
                    lines.push(cells.join("\t"));
                }
            }
            _ => {}
        }
    }
}

fn report_losses(view: &ExportView<'_>, report: &mut FidelityReport) {
    let tree = view.tree();
    let visible = |kind: NodeKind| {
        tree.nodes_of_kind(kind)
            .into_iter()
            .filter(|n| view.is_visible(*n))
            .count()
    };

    let formatted = tree
        .walk()
        .into_iter()
        .filter(|n| view.is_visible(*n))
        .filter_map(|n| tree.get(n))
        .any(|n| !n.direct_formatting().is_empty() || n.style_ref().is_some());
    if formatted {
        report.warn(
            "text.formatting.dropped",
            FeatureCategory::TextFormatting,
            WarningSeverity::Moderate,
            "Styles and formatting are not kept in plain text",
        );
    }
    let images = visible(NodeKind::InlineObject);
    if images > 0 {
        report.warn(
            "text.images.dropped",
            FeatureCategory::Images,
            WarningSeverity::Major,
            format!("{images} image(s) dropped"),
        );
    }
    let bookmarks = visible(NodeKind::Bookmark);
    if bookmarks > 0 {
        report.warn(
            "text.bookmarks.dropped",
            FeatureCategory::Bookmarks,
            WarningSeverity::Minor,
            format!("{bookmarks} bookmark(s) dropped"),
        );
    }
    let fields = visible(NodeKind::FieldReference);
    if fields > 0 {
        report.warn(
            "text.fields.flattened",
            FeatureCategory::Fields,
            WarningSeverity::Minor,
            format!("{fields} field(s) written as their last result"),
        );
    }
    let tables = visible(NodeKind::Table);
    if tables > 0 {
        report.warn(
            "text.tables.flattened",
            FeatureCategory::Tables,
            WarningSeverity::Moderate,
            format!("{tables} table(s) written as tab-separated lines"),
        );
    }
    let headers = view.sections().into_iter().any(|s| {
        matches!(
            tree.get(s).map(|n| n.data()),
            Some(doc_model::NodeData::Section(p)) if p.header.is_some() || p.footer.is_some()
        )
    });
    if headers {
        report.warn(
            "text.headers.dropped",
            FeatureCategory::HeadersFooters,
            WarningSeverity::Moderate,
            "Headers and footers dropped",
        );
    }
    if !tree.metadata().is_empty() {
        report.warn(
            "text.metadata.dropped",
            FeatureCategory::Metadata,
            WarningSeverity::Info,
            "Document properties dropped",
        );
    }
    view.report_overlay_loss(report, OverlaySupport::default());
}
