//! RTF import and export
//!
//! RTF 1.9 subset: a tree of `{}` groups holding control words, control
//! symbols and text. Destinations (font, color and style tables, document
//! info, headers, fields, pictures) are groups introduced by a control
//! word; unknown `\*` destinations are skipped.
//!
//! ## Supported
//!
//! - Character and paragraph formatting, paragraph and character styles
//! - Sections with page numbering, header and footer text
//! - Tables (`\trowd` ... `\cell` ... `\row`) with shading, borders and
//!   padding
//! - PNG and JPEG pictures, bookmarks, fields
//! - Tracked insertions and deletions (`\revised`, `\deleted`)
//!
//! Comments, lists and footnotes are not carried; what is dropped is
//! reported as fidelity warnings.

mod lexer;
mod properties;
mod reader;
mod writer;

use crate::{Codec, CodecResult, DocumentSnapshot, ExportOptions, Exported, Format, Imported};

pub struct RtfCodec;

impl Codec for RtfCodec {
    fn format(&self) -> Format {
        Format::Rtf
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        reader::read(bytes)
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        writer::write(document, options)
    }
}
