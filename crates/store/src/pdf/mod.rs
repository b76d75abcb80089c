//! PDF export
//!
//! Documents are drawn onto Letter pages with the standard Helvetica and
//! Courier fonts. Sections start new pages and carry their header and
//! footer text; tables become rows of text columns; fields show their last
//! result. In the markup view insertions are underlined and deletions
//! struck through in a color per author.
//!
//! Images, comments and bookmarks are not drawn. PDF cannot be imported.

mod content;
mod fonts;
mod layout;
mod objects;
mod writer;

use crate::{Codec, CodecError, CodecResult, DocumentSnapshot, ExportOptions, Exported, Format, Imported};

pub struct PdfCodec;

impl Codec for PdfCodec {
    fn format(&self) -> Format {
        Format::Pdf
    }

    fn can_import(&self) -> bool {
        false
    }

    fn import(&self, _bytes: &[u8]) -> CodecResult<Imported> {
        Err(CodecError::unsupported(Format::Pdf, "import"))
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        writer::write(document, options)
    }
}
