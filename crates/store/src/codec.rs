//! The importer/exporter contract shared by every format

use crate::{
    docx::DocxCodec, html::HtmlCodec, native::NativeCodec, odt::OdtCodec, pdf::PdfCodec,
    rtf::RtfCodec, text::TextCodec, CodecError, CodecResult, FidelityReport, Format,
};
use doc_model::DocumentTree;
use revisions::{Overlay, ViewMode};
use serde::{Deserialize, Serialize};

/// An immutable copy of one document: content tree plus review overlay.
///
/// Tree nodes are shared behind `Arc`, so taking a snapshot of a live
/// document is cheap and later edits do not disturb it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub tree: DocumentTree,
    #[serde(default)]
    pub overlay: Overlay,
}

impl DocumentSnapshot {
    pub fn new(tree: DocumentTree, overlay: Overlay) -> Self {
        Self { tree, overlay }
    }

    /// A document with a single empty paragraph
    pub fn blank() -> Self {
        Self::new(DocumentTree::blank(), Overlay::new())
    }
}

impl From<DocumentTree> for DocumentSnapshot {
    fn from(tree: DocumentTree) -> Self {
        Self::new(tree, Overlay::new())
    }
}

/// Export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Which view of pending changes to write. Markup keeps them as
    /// tracked changes where the format can.
    pub view: ViewMode,
    /// Compress PDF content streams
    pub compress: bool,
    /// Indent XML output
    pub pretty: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            view: ViewMode::Markup,
            compress: true,
            pretty: false,
        }
    }
}

impl ExportOptions {
    pub fn with_view(mut self, view: ViewMode) -> Self {
        self.view = view;
        self
    }
}

/// Result of a successful import
#[derive(Debug, Clone)]
pub struct Imported {
    pub document: DocumentSnapshot,
    pub report: FidelityReport,
}

/// Result of a successful export
#[derive(Debug, Clone)]
pub struct Exported {
    pub bytes: Vec<u8>,
    pub report: FidelityReport,
}

/// One external file format.
///
/// Import never returns a partial document: structurally invalid input is a
/// `MalformedInput` error. Everything the format cannot carry is reported
/// as a warning next to the result.
pub trait Codec: Send + Sync {
    fn format(&self) -> Format;

    fn can_import(&self) -> bool {
        true
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported>;

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported>;
}

/// The codec for a format
pub fn codec_for(format: Format) -> Box<dyn Codec> {
    match format {
        Format::Docx => Box::new(DocxCodec),
        Format::Odt => Box::new(OdtCodec),
        Format::Rtf => Box::new(RtfCodec),
        Format::Html => Box::new(HtmlCodec),
        Format::Pdf => Box::new(PdfCodec),
        Format::Text => Box::new(TextCodec),
        Format::Native => Box::new(NativeCodec),
    }
}

/// Import with logging of the outcome and every warning
pub fn import_bytes(format: Format, bytes: &[u8]) -> CodecResult<Imported> {
    let codec = codec_for(format);
    if !codec.can_import() {
        return Err(CodecError::unsupported(format, "import"));
    }
    tracing::info!(%format, size = bytes.len(), "Importing document");
    let imported = codec.import(bytes)?;
    log_report(&imported.report);
    tracing::info!(
        %format,
        warnings = imported.report.len(),
        nodes = imported.document.tree.node_count(),
        "Import finished"
    );
    Ok(imported)
}

/// Export with logging of the outcome and every warning
pub fn export_bytes(
    format: Format,
    document: &DocumentSnapshot,
    options: &ExportOptions,
) -> CodecResult<Exported> {
    tracing::info!(%format, view = options.view.display_name(), "Exporting document");
    let exported = codec_for(format).export(document, options)?;
    log_report(&exported.report);
    tracing::info!(
        %format,
        warnings = exported.report.len(),
        size = exported.bytes.len(),
        "Export finished"
    );
    Ok(exported)
}

fn log_report(report: &FidelityReport) {
    for warning in report.warnings() {
        tracing::debug!(
            format = %report.format,
            code = %warning.code,
            category = %warning.category,
            count = warning.count,
            "{}",
            warning.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_format_has_a_codec() {
        for format in Format::ALL {
            let codec = codec_for(format);
            assert_eq!(codec.format(), format);
            assert_eq!(codec.can_import(), format.can_import());
        }
    }

    #[test]
    fn test_pdf_import_is_unsupported() {
        let err = import_bytes(Format::Pdf, b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedFeature { .. }));
    }

    #[test]
    fn test_default_options_keep_markup() {
        assert_eq!(ExportOptions::default().view, ViewMode::Markup);
    }
}
