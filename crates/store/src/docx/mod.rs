//! DOCX import and export
//!
//! DOCX is the Office Open XML word processing package (ECMA-376): a ZIP
//! archive of XML parts tied together by relationship files.
//!
//! ## Parts
//!
//! - `[Content_Types].xml` - content type of every part
//! - `_rels/.rels` - root relationships (main document, core properties)
//! - `word/document.xml` - body content, change marks, comment ranges
//! - `word/styles.xml` - document defaults and style definitions
//! - `word/numbering.xml` - list definitions
//! - `word/theme/theme1.xml` - theme fonts and colors
//! - `word/comments.xml` and `word/commentsExtended.xml` - comments, replies
//!   and their resolved state
//! - `word/header*.xml`, `word/footer*.xml` - section headers and footers
//! - `word/media/` - embedded images
//! - `docProps/core.xml` - title, author and dates

mod numbering;
mod package;
mod parts;
mod properties;
mod reader;
mod writer;

use crate::{Codec, CodecResult, DocumentSnapshot, ExportOptions, Exported, Format, Imported};

pub use package::{ContentTypes, Relationships};

/// XML namespaces used in DOCX files
pub mod namespaces {
    /// Main WordprocessingML namespace
    pub const W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
    /// Relationships namespace
    pub const R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
    /// Package relationships namespace
    pub const PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
    /// Content types namespace
    pub const CT: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
    /// DrawingML namespace
    pub const A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
    /// WordprocessingML Drawing namespace
    pub const WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
    /// Picture namespace
    pub const PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
    /// Word 2010 namespace (paragraph ids)
    pub const W14: &str = "http://schemas.microsoft.com/office/word/2010/wordml";
    /// Word 2012 namespace (comment threads)
    pub const W15: &str = "http://schemas.microsoft.com/office/word/2012/wordml";
    /// Core properties
    pub const CP: &str =
        "http://schemas.openxmlformats.org/package/2006/metadata/core-properties";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    pub const XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
}

/// Relationship types used in DOCX
pub mod relationship_types {
    pub const DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const IMAGE: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
    pub const HEADER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/header";
    pub const FOOTER: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/footer";
    pub const COMMENTS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/comments";
    pub const COMMENTS_EXTENDED: &str =
        "http://schemas.microsoft.com/office/2011/relationships/commentsExtended";
    pub const THEME: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
    pub const NUMBERING: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/numbering";
}

/// Content types for DOCX parts
pub mod content_type_values {
    pub const DOCUMENT: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
    pub const STYLES: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml";
    pub const RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
    pub const COMMENTS: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.comments+xml";
    pub const COMMENTS_EXTENDED: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.commentsExtended+xml";
    pub const HEADER: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.header+xml";
    pub const FOOTER: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.footer+xml";
    pub const THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
    pub const NUMBERING: &str =
        "application/vnd.openxmlformats-officedocument.wordprocessingml.numbering+xml";
    pub const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
    pub const XML: &str = "application/xml";
}

pub struct DocxCodec;

impl Codec for DocxCodec {
    fn format(&self) -> Format {
        Format::Docx
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        reader::read(bytes)
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        writer::write(document, options)
    }
}
