//! Standard PDF fonts
//!
//! Text is set in the Helvetica and Courier families, which every viewer
//! provides, using WinAnsiEncoding. Widths come from the Adobe font
//! metrics for printable ASCII; other encodable characters use an average
//! width.

use super::objects::{PdfDictionary, PdfObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
    Courier,
    CourierBold,
    CourierOblique,
    CourierBoldOblique,
}

impl StandardFont {
    /// Font for a family name and style flags, and whether the family had
    /// to be replaced by one of the standard ones
    pub fn for_family(family: &str, bold: bool, italic: bool) -> (Self, bool) {
        let lower = family.to_ascii_lowercase();
        let monospace = ["courier", "mono", "consol", "typewriter"]
            .iter()
            .any(|k| lower.contains(k));
        let exact = lower.contains("helvetica") || lower.contains("courier");
        let font = match (monospace, bold, italic) {
            (false, false, false) => StandardFont::Helvetica,
            (false, true, false) => StandardFont::HelveticaBold,
            (false, false, true) => StandardFont::HelveticaOblique,
            (false, true, true) => StandardFont::HelveticaBoldOblique,
            (true, false, false) => StandardFont::Courier,
            (true, true, false) => StandardFont::CourierBold,
            (true, false, true) => StandardFont::CourierOblique,
            (true, true, true) => StandardFont::CourierBoldOblique,
        };
        (font, !exact && !lower.is_empty())
    }

    pub fn base_name(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
            StandardFont::Courier => "Courier",
            StandardFont::CourierBold => "Courier-Bold",
            StandardFont::CourierOblique => "Courier-Oblique",
            StandardFont::CourierBoldOblique => "Courier-BoldOblique",
        }
    }

    /// Resource name used in content streams
    pub fn resource_name(self) -> String {
        format!("F{}", self as u8 + 1)
    }

    fn is_bold(self) -> bool {
        matches!(
            self,
            StandardFont::HelveticaBold
                | StandardFont::HelveticaBoldOblique
                | StandardFont::CourierBold
                | StandardFont::CourierBoldOblique
        )
    }

    fn is_courier(self) -> bool {
        self >= StandardFont::Courier
    }

    /// Advance width of an encoded byte in thousandths of the font size
    pub fn glyph_width(self, byte: u8) -> u16 {
        if self.is_courier() {
            return 600;
        }
        let table = if self.is_bold() {
            &HELVETICA_BOLD_WIDTHS
        } else {
            &HELVETICA_WIDTHS
        };
        match byte {
            0x20..=0x7E => table[(byte - 0x20) as usize],
            0xA0 => 278,
            _ if self.is_bold() => 611,
            _ => 556,
        }
    }

    /// Width of encoded text at a font size, in points
    pub fn text_width(self, bytes: &[u8], size: f32) -> f32 {
        let units: u32 = bytes.iter().map(|b| u32::from(self.glyph_width(*b))).sum();
        units as f32 * size / 1000.0
    }

    pub fn dictionary(self) -> PdfDictionary {
        PdfDictionary::typed("Font")
            .with("Subtype", PdfObject::name("Type1"))
            .with("BaseFont", PdfObject::name(self.base_name()))
            .with("Encoding", PdfObject::name("WinAnsiEncoding"))
    }
}

/// Helvetica widths for 0x20..=0x7E
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 0x30
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 0x50
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 0x60
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 0x70
];

/// Helvetica-Bold widths for 0x20..=0x7E
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 0x20
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 0x30
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 0x40
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 0x50
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 0x60
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, // 0x70
];

/// WinAnsiEncoding bytes 0x80..=0x9F that differ from Latin-1
const WIN_ANSI_HIGH: [(char, u8); 27] = [
    ('\u{20AC}', 0x80),
    ('\u{201A}', 0x82),
    ('\u{0192}', 0x83),
    ('\u{201E}', 0x84),
    ('\u{2026}', 0x85),
    ('\u{2020}', 0x86),
    ('\u{2021}', 0x87),
    ('\u{02C6}', 0x88),
    ('\u{2030}', 0x89),
    ('\u{0160}', 0x8A),
    ('\u{2039}', 0x8B),
    ('\u{0152}', 0x8C),
    ('\u{017D}', 0x8E),
    ('\u{2018}', 0x91),
    ('\u{2019}', 0x92),
    ('\u{201C}', 0x93),
    ('\u{201D}', 0x94),
    ('\u{2022}', 0x95),
    ('\u{2013}', 0x96),
    ('\u{2014}', 0x97),
    ('\u{02DC}', 0x98),
    ('\u{2122}', 0x99),
    ('\u{0161}', 0x9A),
    ('\u{203A}', 0x9B),
    ('\u{0153}', 0x9C),
    ('\u{017E}', 0x9E),
    ('\u{0178}', 0x9F),
];

/// WinAnsiEncoding byte for a character
pub fn encode_char(ch: char) -> Option<u8> {
    match ch {
        ' '..='~' | '\u{A0}'..='\u{FF}' => u8::try_from(u32::from(ch)).ok(),
        '\t' => Some(b' '),
        _ => WIN_ANSI_HIGH
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, byte)| *byte),
    }
}

/// Encode text, replacing characters outside the encoding with `?`. The
/// count tells how many were replaced.
pub fn encode(text: &str) -> (Vec<u8>, usize) {
    let mut missing = 0;
    let bytes = text
        .chars()
        .map(|ch| {
            encode_char(ch).unwrap_or_else(|| {
                missing += 1;
                b'?'
            })
        })
        .collect();
    (bytes, missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_mapping() {
        assert_eq!(
            StandardFont::for_family("Helvetica", false, false),
            (StandardFont::Helvetica, false)
        );
        assert_eq!(
            StandardFont::for_family("Calibri", true, true),
            (StandardFont::HelveticaBoldOblique, true)
        );
        assert_eq!(
            StandardFont::for_family("Courier New", false, true),
            (StandardFont::CourierOblique, false)
        );
        assert_eq!(
            StandardFont::for_family("DejaVu Sans Mono", true, false),
            (StandardFont::CourierBold, true)
        );
    }

    #[test]
    fn test_widths() {
        assert_eq!(StandardFont::Helvetica.glyph_width(b'i'), 222);
        assert_eq!(StandardFont::HelveticaBold.glyph_width(b'i'), 278);
        assert_eq!(StandardFont::HelveticaOblique.glyph_width(b'W'), 944);
        assert_eq!(StandardFont::Courier.glyph_width(b'i'), 600);
        let width = StandardFont::Helvetica.text_width(b"Hello", 12.0);
        assert!((width - 27.336).abs() < 0.01);
    }

    #[test]
    fn test_encoding() {
        assert_eq!(encode_char('A'), Some(0x41));
        assert_eq!(encode_char('\u{e9}'), Some(0xE9));
        assert_eq!(encode_char('\u{20AC}'), Some(0x80));
        assert_eq!(encode_char('\u{201C}'), Some(0x93));
        assert_eq!(encode_char('\u{4E2D}'), None);
        assert_eq!(encode("a\u{4E2D}b"), (b"a?b".to_vec(), 1));
    }

    #[test]
    fn test_resource_names_are_distinct() {
        assert_eq!(StandardFont::Helvetica.resource_name(), "F1");
        assert_eq!(StandardFont::CourierBoldOblique.resource_name(), "F8");
        let mut out = Vec::new();
        StandardFont::CourierBold.dictionary().write_to(&mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("/BaseFont /Courier-Bold"));
        assert!(text.contains("/Encoding /WinAnsiEncoding"));
    }
}
