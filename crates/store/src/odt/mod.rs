//! ODT import and export
//!
//! ODT is the OpenDocument text package (OASIS ODF 1.2): a ZIP archive whose
//! first entry is an uncompressed `mimetype` file.
//!
//! ## Parts
//!
//! - `content.xml` - body, automatic styles, tracked change regions and
//!   annotations
//! - `styles.xml` - default styles, named styles and one master page per
//!   section (headers, footers)
//! - `meta.xml` - title, author, keywords and dates
//! - `Pictures/` - embedded images
//! - `META-INF/manifest.xml` - every part with its media type
//!
//! Theme references are written as the values they stand for, format
//! changes are dropped and comment replies are folded into the comment
//! body.

mod properties;
mod reader;
mod writer;

use crate::{Codec, CodecResult, DocumentSnapshot, ExportOptions, Exported, Format, Imported};

/// Media type stored in the `mimetype` entry
pub const MIMETYPE: &str = "application/vnd.oasis.opendocument.text";

/// ODF XML namespaces
pub mod namespaces {
    pub const OFFICE: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";
    pub const TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
    pub const STYLE: &str = "urn:oasis:names:tc:opendocument:xmlns:style:1.0";
    pub const TABLE: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";
    pub const DRAW: &str = "urn:oasis:names:tc:opendocument:xmlns:drawing:1.0";
    /// XSL-FO compatible formatting attributes
    pub const FO: &str = "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0";
    pub const SVG: &str = "urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0";
    pub const XLINK: &str = "http://www.w3.org/1999/xlink";
    pub const DC: &str = "http://purl.org/dc/elements/1.1/";
    pub const META: &str = "urn:oasis:names:tc:opendocument:xmlns:meta:1.0";
    pub const MANIFEST: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";
    /// LibreOffice extensions (resolved comments)
    pub const LOEXT: &str = "urn:org:documentfoundation:names:experimental:office:xmlns:loext:1.0";
}

/// `meta:user-defined` entry naming the default paragraph style
const DEFAULT_STYLE_META: &str = "DefaultParagraphStyle";

pub struct OdtCodec;

impl Codec for OdtCodec {
    fn format(&self) -> Format {
        Format::Odt
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        reader::read(bytes)
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        writer::write(document, options)
    }
}
