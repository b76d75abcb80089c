//! PDF object model
//!
//! The handful of object types a writer needs: numbers, names, strings,
//! arrays, dictionaries and indirect references. Streams are written by the
//! file writer since their length depends on compression.

use std::collections::BTreeMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Integer(i64),
    Real(f64),
    /// Byte string, written literally with escapes
    Bytes(Vec<u8>),
    /// Byte string written in hexadecimal
    Hex(Vec<u8>),
    Name(String),
    Array(Vec<PdfObject>),
    Dictionary(PdfDictionary),
    /// Indirect reference to object `n 0`
    Reference(u32),
}

impl PdfObject {
    pub fn name(name: impl Into<String>) -> Self {
        PdfObject::Name(name.into())
    }

    /// Text string: literal when it is plain ASCII, otherwise UTF-16BE with
    /// a byte order mark
    pub fn text(text: &str) -> Self {
        if text.bytes().all(|b| (0x20..0x7F).contains(&b)) {
            return PdfObject::Bytes(text.as_bytes().to_vec());
        }
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        PdfObject::Hex(bytes)
    }

    /// `[x0 y0 x1 y1]`
    pub fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        PdfObject::Array(
            [x0, y0, x1, y1]
                .into_iter()
                .map(PdfObject::Real)
                .collect(),
        )
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            PdfObject::Integer(n) => out.extend_from_slice(n.to_string().as_bytes()),
            PdfObject::Real(n) => out.extend_from_slice(format_number(*n).as_bytes()),
            PdfObject::Bytes(bytes) => write_literal(out, bytes),
            PdfObject::Hex(bytes) => {
                let mut hex = String::with_capacity(bytes.len() * 2 + 2);
                hex.push('<');
                for byte in bytes {
                    let _ = write!(hex, "{byte:02X}");
                }
                hex.push('>');
                out.extend_from_slice(hex.as_bytes());
            }
            PdfObject::Name(name) => write_name(out, name),
            PdfObject::Array(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write_to(out);
                }
                out.push(b']');
            }
            PdfObject::Dictionary(dict) => dict.write_to(out),
            PdfObject::Reference(n) => out.extend_from_slice(format!("{n} 0 R").as_bytes()),
        }
    }
}

impl From<PdfDictionary> for PdfObject {
    fn from(dict: PdfDictionary) -> Self {
        PdfObject::Dictionary(dict)
    }
}

impl From<i64> for PdfObject {
    fn from(n: i64) -> Self {
        PdfObject::Integer(n)
    }
}

/// Dictionary with keys kept in sorted order so output is reproducible
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfDictionary {
    entries: BTreeMap<String, PdfObject>,
}

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn typed(type_name: &str) -> Self {
        Self::new().with("Type", PdfObject::name(type_name))
    }

    pub fn with(mut self, key: &str, value: impl Into<PdfObject>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<PdfObject>) {
        self.entries.insert(key.to_string(), value.into());
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(b"<<");
        for (key, value) in &self.entries {
            out.push(b' ');
            write_name(out, key);
            out.push(b' ');
            value.write_to(out);
        }
        out.extend_from_slice(b" >>");
    }
}

/// Number with at most four decimals and no trailing zeros
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "0".into();
    }
    let rounded = (n * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 {
        return format!("{}", rounded as i64);
    }
    let s = format!("{rounded:.4}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `(...)` with the delimiters, backslash and control bytes escaped
pub fn write_literal(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            0x20..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("\\{byte:03o}").as_bytes()),
        }
    }
    out.push(b')');
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.push(b'/');
    for byte in name.bytes() {
        match byte {
            b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%' => {
                out.extend_from_slice(format!("#{byte:02X}").as_bytes())
            }
            0x21..=0x7E => out.push(byte),
            _ => out.extend_from_slice(format!("#{byte:02X}").as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize(object: &PdfObject) -> String {
        let mut out = Vec::new();
        object.write_to(&mut out);
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_numbers() {
        assert_eq!(format_number(72.0), "72");
        assert_eq!(format_number(3.14159), "3.1416");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "0");
    }

    #[test]
    fn test_strings_and_names() {
        assert_eq!(serialize(&PdfObject::Bytes(b"a(b)\\".to_vec())), "(a\\(b\\)\\\\)");
        assert_eq!(serialize(&PdfObject::Bytes(vec![0xE9])), "(\\351)");
        assert_eq!(serialize(&PdfObject::name("A B")), "/A#20B");
        assert_eq!(serialize(&PdfObject::text("Plain")), "(Plain)");
        assert_eq!(serialize(&PdfObject::text("\u{e9}")), "<FEFF00E9>");
    }

    #[test]
    fn test_dictionary_and_array() {
        let dict = PdfDictionary::typed("Page")
            .with("Parent", PdfObject::Reference(2))
            .with("MediaBox", PdfObject::rect(0.0, 0.0, 612.0, 792.0));
        assert_eq!(
            serialize(&dict.into()),
            "<< /MediaBox [0 0 612 792] /Parent 2 0 R /Type /Page >>"
        );
    }
}
