//! XML reading and writing shared by the XML-based codecs
//!
//! Parts are small enough to read whole, so the reader turns the quick-xml
//! event stream into a light element tree that the format readers walk.
//! Output is built as text with [`XmlWriter`].

use crate::{CodecError, CodecResult, Format};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use doc_model::StyleId;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

// =============================================================================
// Element tree
// =============================================================================

/// A parsed XML node
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// A parsed XML element with its qualified name and attributes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let attributes = start
            .attributes()
            .filter_map(|a| a.ok())
            .map(|a| {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                let value = match a.unescape_value() {
                    Ok(v) => v.into_owned(),
                    Err(_) => String::from_utf8_lossy(&a.value).into_owned(),
                };
                (key, value)
            })
            .collect();
        Self {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    /// Name without the namespace prefix
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Whether the element has the given local name
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    /// Attribute by qualified name (`w:val`) or, without a prefix, by local
    /// name with any prefix
    pub fn attr(&self, name: &str) -> Option<&str> {
        let exact = self
            .attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str());
        if exact.is_some() || name.contains(':') {
            return exact;
        }
        self.attributes
            .iter()
            .find(|(k, _)| local(k) == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in order
    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|c| match c {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// First child element with the given local name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.elements().find(|e| e.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.elements().filter(move |e| e.is(name))
    }

    /// Depth-first search for the first descendant with the given local name
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        for e in self.elements() {
            if e.is(name) {
                return Some(e);
            }
            if let Some(found) = e.find(name) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text of all descendants
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                XmlNode::Text(t) => out.push_str(t),
                XmlNode::Element(e) => e.collect_text(out),
            }
        }
    }

    /// `val` attribute of a child element, the usual shape of OOXML
    /// properties
    pub fn child_val(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(|c| c.attr("val"))
    }
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, l)| l)
}

/// Whitespace that only separates elements (indentation of pretty output)
pub fn is_layout_whitespace(text: &str) -> bool {
    text.contains('\n') && text.chars().all(char::is_whitespace)
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse a complete document into its root element.
///
/// Unbalanced or otherwise unparsable markup fails with `MalformedInput`.
pub fn parse(content: &str, format: Format) -> CodecResult<XmlElement> {
    parse_with(content, format, |_| None)
}

/// Parse with a resolver for entities beyond the five XML ones
pub fn parse_with(
    content: &str,
    format: Format,
    entity: impl Fn(&str) -> Option<&'static str>,
) -> CodecResult<XmlElement> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = true;

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let malformed = |reason: String| CodecError::malformed(format, reason);

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if root.is_some() {
                    return Err(malformed("content after the root element".into()));
                }
                stack.push(XmlElement::from_start(e));
            }
            Ok(Event::Empty(ref e)) => {
                let element = XmlElement::from_start(e);
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => return Err(malformed("content after the root element".into())),
                }
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| malformed("unexpected closing tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None => root = Some(element),
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape_with(|name| entity(name))
                    .map_err(|err| malformed(err.to_string()))?;
                if is_layout_whitespace(&text) {
                    continue;
                }
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, &text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(parent) = stack.last_mut() {
                    push_text(parent, &String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(malformed(format!(
                    "XML error at position {}: {err}",
                    reader.error_position()
                )))
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(malformed(format!("unclosed element <{}>", stack[stack.len() - 1].name)));
    }
    root.ok_or_else(|| malformed("no root element".into()))
}

fn push_text(parent: &mut XmlElement, text: &str) {
    if let Some(XmlNode::Text(last)) = parent.children.last_mut() {
        last.push_str(text);
    } else {
        parent.children.push(XmlNode::Text(text.to_string()));
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Escape text for element content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

/// Text builder for XML parts.
///
/// With `pretty` set, elements are indented except inside mixed content,
/// which starts at the first text written into an element.
pub struct XmlWriter {
    out: String,
    stack: Vec<(String, bool)>,
    pretty: bool,
}

impl XmlWriter {
    pub fn new(pretty: bool) -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>"),
            stack: Vec::new(),
            pretty,
        }
    }

    /// Writer without the XML declaration (for HTML fragments)
    pub fn bare(pretty: bool) -> Self {
        Self {
            out: String::new(),
            stack: Vec::new(),
            pretty,
        }
    }

    fn in_mixed(&self) -> bool {
        self.stack.iter().any(|(_, mixed)| *mixed)
    }

    fn indent(&mut self) {
        if self.pretty && !self.in_mixed() {
            self.out.push('\n');
            for _ in 0..self.stack.len() {
                self.out.push_str("  ");
            }
        }
    }

    fn write_tag(&mut self, name: &str, attrs: &[(&str, &str)], empty: bool) {
        self.indent();
        self.out.push('<');
        self.out.push_str(name);
        for (k, v) in attrs {
            self.out.push(' ');
            self.out.push_str(k);
            self.out.push_str("=\"");
            self.out.push_str(&escape(v));
            self.out.push('"');
        }
        self.out.push_str(if empty { "/>" } else { ">" });
    }

    pub fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.write_tag(name, attrs, false);
        self.stack.push((name.to_string(), false));
    }

    /// Open an element whose content is text-sensitive
    pub fn open_mixed(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.write_tag(name, attrs, false);
        self.stack.push((name.to_string(), true));
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.write_tag(name, attrs, true);
    }

    pub fn close(&mut self) {
        if let Some((name, _)) = self.stack.pop() {
            if self.out.ends_with('>') && !self.out.ends_with("/>") && self.last_open_is(&name) {
                // nothing between open and close; keep it on one line
            } else {
                self.indent();
            }
            self.out.push_str("</");
            self.out.push_str(&name);
            self.out.push('>');
        }
    }

    fn last_open_is(&self, name: &str) -> bool {
        self.out
            .rfind('<')
            .map(|i| self.out[i + 1..].starts_with(name) && !self.out[i + 1..].starts_with('/'))
            .unwrap_or(false)
    }

    pub fn text(&mut self, text: &str) {
        if let Some(top) = self.stack.last_mut() {
            top.1 = true;
        }
        self.out.push_str(&escape(text));
    }

    /// `<name attrs>text</name>`
    pub fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.write_tag(name, attrs, false);
        self.out.push_str(&escape(text));
        self.out.push_str("</");
        self.out.push_str(name);
        self.out.push('>');
    }

    /// Append markup produced by another writer
    pub fn raw(&mut self, markup: &str) {
        self.out.push_str(markup);
    }

    pub fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close();
        }
        self.out
    }
}

/// List elements kept open around the paragraphs being written.
///
/// Each level below the first is a list nested inside the open item of the
/// level above, so the open lists always form one chain.
pub struct ListNesting {
    item_tag: &'static str,
    list: Option<StyleId>,
    /// One entry per open list element: whether it has an open item
    items: Vec<bool>,
}

impl ListNesting {
    pub fn new(item_tag: &'static str) -> Self {
        Self {
            item_tag,
            list: None,
            items: Vec::new(),
        }
    }

    /// Leave the writer inside a new item at `level` of `list`.
    ///
    /// `open_list` writes the opening tag of one list element; it is told
    /// whether that element is the outermost one.
    pub fn item(
        &mut self,
        w: &mut XmlWriter,
        list: &StyleId,
        level: u8,
        mut open_list: impl FnMut(&mut XmlWriter, bool),
    ) {
        if self.list.as_ref() != Some(list) {
            self.close(w);
        }
        let depth = usize::from(level) + 1;
        while self.items.len() > depth {
            self.pop(w);
        }
        while self.items.len() < depth {
            let outermost = self.items.is_empty();
            if let Some(open) = self.items.last_mut() {
                if !*open {
                    w.open(self.item_tag, &[]);
                    *open = true;
                }
            }
            open_list(w, outermost);
            self.items.push(false);
        }
        if let Some(open) = self.items.last_mut() {
            if *open {
                w.close();
            }
            w.open(self.item_tag, &[]);
            *open = true;
        }
        self.list = Some(list.clone());
    }

    fn pop(&mut self, w: &mut XmlWriter) {
        if let Some(open) = self.items.pop() {
            if open {
                w.close();
            }
            w.close();
        }
    }

    /// Close every open list
    pub fn close(&mut self, w: &mut XmlWriter) {
        while !self.items.is_empty() {
            self.pop(w);
        }
        self.list = None;
    }
}

// =============================================================================
// Dates
// =============================================================================

/// W3C date-time in UTC with whole seconds, as OOXML and ODF expect
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 3339 date; a date-time without an offset is taken as UTC
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(value) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Number formatting
// =============================================================================

/// Points without trailing zeros (`12`, `10.5`)
pub fn fmt_num(value: f32) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let s = format!("{rounded:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Parse a number with an optional unit suffix, returning points
pub fn parse_length(value: &str) -> Option<f32> {
    let v = value.trim();
    let (num, factor) = if let Some(n) = v.strip_suffix("pt") {
        (n, 1.0)
    } else if let Some(n) = v.strip_suffix("in") {
        (n, 72.0)
    } else if let Some(n) = v.strip_suffix("cm") {
        (n, 72.0 / 2.54)
    } else if let Some(n) = v.strip_suffix("mm") {
        (n, 72.0 / 25.4)
    } else if let Some(n) = v.strip_suffix("px") {
        (n, 0.75)
    } else {
        (v, 1.0)
    };
    num.trim().parse::<f32>().ok().map(|n| n * factor).filter(|n| n.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_nesting() {
        let mut w = XmlWriter::bare(false);
        let mut lists = ListNesting::new("li");
        let steps = StyleId::from("Steps");
        let open = |w: &mut XmlWriter, outermost: bool| {
            w.open("ol", &[("class", if outermost { "top" } else { "inner" })])
        };
        lists.item(&mut w, &steps, 0, open);
        w.leaf("p", &[], "one");
        lists.item(&mut w, &steps, 1, open);
        w.leaf("p", &[], "one a");
        lists.item(&mut w, &steps, 0, open);
        w.leaf("p", &[], "two");
        lists.close(&mut w);
        assert_eq!(
            w.finish(),
            "<ol class=\"top\"><li><p>one</p><ol class=\"inner\"><li><p>one a</p></li></ol></li>\
             <li><p>two</p></li></ol>"
        );
    }

    #[test]
    fn test_dates() {
        let date = parse_date("2024-03-01T10:00:00+02:00").unwrap();
        assert_eq!(format_date(&date), "2024-03-01T08:00:00Z");
        assert_eq!(parse_date("2024-03-01T08:00:00"), Some(date));
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_parse_tree() {
        let root = parse(
            r#"<w:document xmlns:w="x"><w:body><w:p><w:r><w:t xml:space="preserve"> a &amp; b </w:t></w:r></w:p></w:body></w:document>"#,
            Format::Docx,
        )
        .unwrap();
        assert!(root.is("document"));
        let t = root.find("t").unwrap();
        assert_eq!(t.text(), " a & b ");
        assert_eq!(t.attr("xml:space"), Some("preserve"));
        assert_eq!(t.attr("space"), Some("preserve"));
    }

    #[test]
    fn test_unbalanced_is_malformed() {
        let err = parse("<a><b></a>", Format::Odt).unwrap_err();
        assert!(err.is_malformed());
        let err = parse("<a><b>", Format::Odt).unwrap_err();
        assert!(err.is_malformed());
        let err = parse("", Format::Odt).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_custom_entities() {
        let root = parse_with("<p>a&nbsp;b</p>", Format::Html, |e| {
            (e == "nbsp").then_some("\u{a0}")
        })
        .unwrap();
        assert_eq!(root.text(), "a\u{a0}b");
    }

    #[test]
    fn test_writer_escapes_and_nests() {
        let mut w = XmlWriter::bare(false);
        w.open("a", &[("k", "1 < 2")]);
        w.leaf("b", &[], "x & y");
        w.empty("c", &[]);
        w.close();
        assert_eq!(w.finish(), r#"<a k="1 &lt; 2"><b>x &amp; y</b><c/></a>"#);
    }

    #[test]
    fn test_pretty_output_keeps_mixed_content() {
        let mut w = XmlWriter::bare(true);
        w.open("body", &[]);
        w.open_mixed("p", &[]);
        w.text("one ");
        w.leaf("b", &[], "two");
        w.close();
        w.close();
        let out = w.finish();
        assert!(out.contains("<p>one <b>two</b></p>"));
        let root = parse(&out, Format::Html).unwrap();
        assert_eq!(root.child("p").unwrap().text(), "one two");
    }

    #[test]
    fn test_numbers() {
        assert_eq!(fmt_num(12.0), "12");
        assert_eq!(fmt_num(10.5), "10.5");
        assert_eq!(fmt_num(1.08), "1.08");
        assert_eq!(parse_length("1in"), Some(72.0));
        assert_eq!(parse_length("12pt"), Some(12.0));
        assert_eq!(parse_length("16px"), Some(12.0));
        assert_eq!(parse_length("abc"), None);
    }
}
