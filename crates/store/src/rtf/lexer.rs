//! RTF tokens and group tree
//!
//! The input is split into control words, control symbols, text and
//! binary data, then folded into nested groups. Unbalanced braces make the
//! document malformed.

use crate::{CodecError, CodecResult, Format};

/// Deepest group nesting accepted
const MAX_DEPTH: usize = 512;

/// One element of a group
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// Control word with its optional numeric parameter
    Word(String, Option<i32>),
    /// Control symbol other than the escaped characters (`\*`, `\~`, `\-`)
    Symbol(char),
    Text(String),
    /// Data following `\binN`
    Binary(Vec<u8>),
    Group(Vec<Item>),
}

/// Name of the destination a group introduces: its first control word,
/// after `\*` for ignorable destinations. The flag tells whether `\*` was
/// present.
pub fn destination(items: &[Item]) -> Option<(&str, bool)> {
    match items {
        [Item::Symbol('*'), Item::Word(name, _), ..] => Some((name.as_str(), true)),
        [Item::Word(name, _), ..] => Some((name.as_str(), false)),
        _ => None,
    }
}

/// Windows-1252 characters for bytes 0x80 to 0x9F
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '\u{81}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{8D}', '\u{017D}', '\u{8F}',
    '\u{90}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{9D}', '\u{017E}', '\u{0178}',
];

pub fn cp1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_HIGH[(byte - 0x80) as usize],
        _ => char::from(byte),
    }
}

struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek();
        if byte.is_some() {
            self.position += 1;
        }
        byte
    }

    fn error(&self, reason: impl std::fmt::Display) -> CodecError {
        CodecError::malformed(Format::Rtf, format!("{reason} at byte {}", self.position))
    }

    /// Control word or symbol after a backslash
    fn control(&mut self) -> CodecResult<Item> {
        let byte = self.advance().ok_or_else(|| self.error("backslash at end of input"))?;
        if !byte.is_ascii_alphabetic() {
            return Ok(match byte {
                b'\'' => {
                    let hex = [self.advance(), self.advance()];
                    let [Some(hi), Some(lo)] = hex else {
                        return Err(self.error("truncated hex escape"));
                    };
                    let value = std::str::from_utf8(&[hi, lo])
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                        .ok_or_else(|| self.error("invalid hex escape"))?;
                    Item::Text(cp1252(value).to_string())
                }
                b'\\' | b'{' | b'}' => Item::Text(char::from(byte).to_string()),
                // An escaped line break is a paragraph mark
                b'\r' | b'\n' => Item::Word("par".into(), None),
                b'\t' => Item::Word("tab".into(), None),
                other => Item::Symbol(char::from(other)),
            });
        }

        let mut name = String::from(char::from(byte));
        while let Some(b) = self.peek().filter(u8::is_ascii_alphabetic) {
            name.push(char::from(b));
            self.position += 1;
        }
        let mut digits = String::new();
        if self.peek() == Some(b'-') {
            digits.push('-');
            self.position += 1;
        }
        while let Some(b) = self.peek().filter(u8::is_ascii_digit) {
            digits.push(char::from(b));
            self.position += 1;
        }
        let param = match digits.as_str() {
            "" => None,
            "-" => return Err(self.error("sign without digits")),
            d => Some(
                d.parse::<i64>()
                    .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
                    .map_err(|_| self.error("invalid parameter"))?,
            ),
        };
        if self.peek() == Some(b' ') {
            self.position += 1;
        }
        Ok(Item::Word(name, param))
    }

    fn text(&mut self) -> Item {
        let mut text = String::new();
        while let Some(b) = self.peek() {
            match b {
                b'{' | b'}' | b'\\' => break,
                b'\r' | b'\n' => {}
                _ => text.push(cp1252(b)),
            }
            self.position += 1;
        }
        Item::Text(text)
    }

    fn binary(&mut self, length: i32) -> CodecResult<Item> {
        let length = usize::try_from(length).map_err(|_| self.error("negative \\bin length"))?;
        let end = self
            .position
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| self.error("\\bin data past end of input"))?;
        let data = self.input[self.position..end].to_vec();
        self.position = end;
        Ok(Item::Binary(data))
    }
}

/// Parse a document into the items of its outermost group
pub fn parse(input: &[u8]) -> CodecResult<Vec<Item>> {
    let start = input
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(input.len());
    if !input[start..].starts_with(b"{\\rtf") {
        return Err(CodecError::malformed(Format::Rtf, "input does not start with {\\rtf"));
    }
    let mut lexer = Lexer {
        input,
        position: start,
    };
    let mut stack: Vec<Vec<Item>> = Vec::new();
    let mut root = None;
    while let Some(byte) = lexer.peek() {
        match byte {
            b'{' => {
                lexer.position += 1;
                if root.is_some() {
                    return Err(lexer.error("content after the document group"));
                }
                if stack.len() == MAX_DEPTH {
                    return Err(lexer.error("groups nested too deeply"));
                }
                stack.push(Vec::new());
            }
            b'}' => {
                lexer.position += 1;
                let group = stack.pop().ok_or_else(|| lexer.error("unbalanced '}'"))?;
                match stack.last_mut() {
                    Some(parent) => parent.push(Item::Group(group)),
                    None => root = Some(group),
                }
            }
            b'\\' => {
                lexer.position += 1;
                let item = lexer.control()?;
                let item = match item {
                    Item::Word(name, Some(length)) if name == "bin" => lexer.binary(length)?,
                    other => other,
                };
                stack
                    .last_mut()
                    .ok_or_else(|| lexer.error("control word outside any group"))?
                    .push(item);
            }
            b'\r' | b'\n' | b'\0' => lexer.position += 1,
            _ => {
                let item = lexer.text();
                match stack.last_mut() {
                    Some(group) => group.push(item),
                    None if matches!(&item, Item::Text(t) if t.trim().is_empty()) => {}
                    None => return Err(lexer.error("text after the document group")),
                }
            }
        }
    }
    if !stack.is_empty() {
        return Err(CodecError::malformed(
            Format::Rtf,
            format!("{} group(s) left open at end of input", stack.len()),
        ));
    }
    root.ok_or_else(|| CodecError::malformed(Format::Rtf, "empty document"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(name: &str, param: Option<i32>) -> Item {
        Item::Word(name.into(), param)
    }

    #[test]
    fn test_words_symbols_and_text() {
        let items = parse(br"{\rtf1\ansi\fs-4 Hello \'e9\{x\}{\*\generator me;}\~}").unwrap();
        assert_eq!(items[0], word("rtf", Some(1)));
        assert_eq!(items[1], word("ansi", None));
        assert_eq!(items[2], word("fs", Some(-4)));
        assert_eq!(items[3], Item::Text("Hello ".into()));
        assert_eq!(items[4], Item::Text("\u{e9}".into()));
        assert_eq!(items[5], Item::Text("{".into()));
        assert_eq!(items[6], Item::Text("x".into()));
        match &items[8] {
            Item::Group(group) => assert_eq!(destination(group), Some(("generator", true))),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(items[9], Item::Symbol('~'));
    }

    #[test]
    fn test_binary_data() {
        let items = parse(b"{\\rtf1{\\pict\\bin3 \x00}\x01}}").unwrap();
        match &items[1] {
            Item::Group(pict) => assert_eq!(pict[1], Item::Binary(vec![0, b'}', 1])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cp1252() {
        assert_eq!(cp1252(0x93), '\u{201C}');
        assert_eq!(cp1252(0xE9), '\u{e9}');
        assert_eq!(cp1252(b'a'), 'a');
    }

    #[test]
    fn test_unbalanced_groups_are_malformed() {
        assert!(parse(br"{\rtf1{\b bold}").is_err());
        assert!(parse(br"{\rtf1}}").is_err());
        assert!(parse(br"{\rtf1\'4").is_err());
        assert!(parse(b"plain text").is_err());
    }
}
