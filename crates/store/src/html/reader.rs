//! XHTML reader

use super::css::{declarations, from_css, parse_color};
use super::HEADINGS;
use crate::builder::{ChangeInfo, DocumentBuilder};
use crate::view::Mark;
use crate::xml::{self, parse_date, parse_length, XmlElement, XmlNode};
use crate::{CodecError, CodecResult, FeatureCategory, Format, Imported, WarningSeverity};
use base64::Engine;
use doc_model::{
    DocumentMetadata, FieldKind, Formatting, ImageObject, NodeKind, Property, PropertyScope,
    PropertyValue, SectionProperties, StyleId, VerticalAlign,
};

pub fn read(bytes: &[u8]) -> CodecResult<Imported> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|_| CodecError::malformed(Format::Html, "document is not UTF-8"))?;
    let root = xml::parse_with(text, Format::Html, html_entity)?;
    if !root.is("html") {
        return Err(CodecError::malformed(
            Format::Html,
            format!("root element is <{}>, expected <html>", root.name),
        ));
    }

    let mut reader = HtmlReader {
        builder: DocumentBuilder::new(Format::Html),
        auto_keys: 0,
        line_start: true,
    };
    if let Some(head) = root.child("head") {
        reader.head(head);
    }
    if let Some(body) = root.child("body") {
        let ctx = Context::default().styled(body, &mut reader);
        reader.flow(body, &ctx)?;
    }
    reader.builder.finish()
}

/// Inherited state while walking the body
#[derive(Debug, Clone, Default)]
struct Context {
    chars: Formatting,
    paragraph_style: Option<StyleId>,
    pre: bool,
}

impl Context {
    /// Apply an element's `style` attribute to what its content inherits
    fn styled(&self, el: &XmlElement, reader: &mut HtmlReader) -> Context {
        let mut ctx = self.clone();
        if let Some(style) = el.attr("style") {
            for (name, value) in declarations(style) {
                if name == "white-space" {
                    ctx.pre = value.starts_with("pre");
                }
            }
            let (f, unknown) = from_css(style, PropertyScope::Character);
            reader.unknown_css(&unknown);
            ctx.chars = ctx.chars.merged_with(&f.scoped(PropertyScope::Character));
        }
        ctx
    }

    fn with(&self, property: Property, value: impl Into<PropertyValue>) -> Context {
        let mut ctx = self.clone();
        ctx.chars.set(property, Some(value.into()));
        ctx
    }
}

struct HtmlReader {
    builder: DocumentBuilder,
    auto_keys: usize,
    /// No text written to the current paragraph yet
    line_start: bool,
}

impl HtmlReader {
    fn warn(&mut self, code: &str, category: FeatureCategory, message: impl Into<String>) {
        self.builder.warn(code, category, WarningSeverity::Minor, message);
    }

    fn unknown_css(&mut self, unknown: &[String]) {
        for name in unknown {
            self.warn(
                "html.css.unsupported",
                FeatureCategory::TextFormatting,
                format!("CSS property '{name}' ignored"),
            );
        }
    }

    // =========================================================================
    // Head
    // =========================================================================

    fn head(&mut self, head: &XmlElement) {
        let mut meta = DocumentMetadata::default();
        if let Some(title) = head.child("title") {
            let title = title.text();
            if !title.trim().is_empty() {
                meta.title = Some(title.trim().to_string());
            }
        }
        for m in head.children_named("meta") {
            let (Some(name), Some(content)) = (m.attr("name"), m.attr("content")) else {
                continue;
            };
            match name.to_ascii_lowercase().as_str() {
                "author" => meta.author = Some(content.to_string()),
                "description" => meta.subject = Some(content.to_string()),
                "keywords" => meta.keywords = DocumentMetadata::parse_keywords(content),
                "dcterms.created" => meta.created = parse_date(content),
                "dcterms.modified" => meta.modified = parse_date(content),
                _ => {}
            }
        }
        if head.child("style").is_some() || head.child("link").is_some() {
            self.warn(
                "html.stylesheet.ignored",
                FeatureCategory::Styles,
                "Style sheets ignored; only inline styles are read",
            );
        }
        self.builder.set_metadata(meta);
    }

    // =========================================================================
    // Block content
    // =========================================================================

    fn flow(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        for child in &el.children {
            match child {
                XmlNode::Text(text) => {
                    if !text.trim().is_empty() {
                        self.text(text, ctx)?;
                    }
                }
                XmlNode::Element(child) => self.element(child, ctx)?,
            }
        }
        Ok(())
    }

    fn change_info(&mut self, el: &XmlElement) -> (String, ChangeInfo) {
        let key = match el.attr("data-change") {
            Some(k) => format!("c{k}"),
            None => {
                self.auto_keys += 1;
                format!("auto{}", self.auto_keys)
            }
        };
        let date = el.attr("datetime").or(el.attr("data-date")).and_then(parse_date);
        let author = el.attr("data-author").unwrap_or_default();
        (key, ChangeInfo::new(author, date))
    }

    /// Run `f` inside the change a block's `data-mark` attribute names
    fn marked<F>(&mut self, el: &XmlElement, f: F) -> CodecResult<()>
    where
        F: FnOnce(&mut Self) -> CodecResult<()>,
    {
        let mark = match el.attr("data-mark") {
            Some("ins") => Some(Mark::Inserted),
            Some("del") => Some(Mark::Deleted),
            _ => None,
        };
        let Some(mark) = mark else {
            return f(self);
        };
        let (key, info) = self.change_info(el);
        self.builder.begin_change(&key, mark, info);
        let result = f(self);
        self.builder.end_change(&key);
        result
    }

    fn element(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        match el.local_name() {
            "section" if self.builder.current(NodeKind::TableCell).is_none() => {
                self.marked(el, |r| {
                    r.builder.begin_section(SectionProperties::default())?;
                    let ctx = ctx.styled(el, r);
                    r.flow(el, &ctx)?;
                    r.builder.end_section();
                    Ok(())
                })
            }
            "section" | "div" | "article" | "main" | "header" | "footer" | "nav" | "aside"
            | "body" | "center" | "figure" | "form" => {
                let ctx = ctx.styled(el, self);
                self.flow(el, &ctx)
            }
            "p" | "pre" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "address" | "figcaption"
            | "dt" | "dd" => self.marked(el, |r| r.paragraph(el, ctx)),
            "blockquote" => {
                let mut inner = ctx.styled(el, self);
                inner.paragraph_style = Some(StyleId::new("Quote"));
                if has_block_children(el) {
                    self.flow(el, &inner)
                } else {
                    self.paragraph(el, &inner)
                }
            }
            "ul" | "ol" | "dl" => {
                self.warn(
                    "html.lists.flattened",
                    FeatureCategory::ParagraphFormatting,
                    "Lists imported as plain paragraphs",
                );
                let ctx = ctx.styled(el, self);
                self.flow(el, &ctx)
            }
            "li" => {
                if has_block_children(el) {
                    let ctx = ctx.styled(el, self);
                    self.flow(el, &ctx)
                } else {
                    self.paragraph(el, ctx)
                }
            }
            "table" => self.marked(el, |r| r.table(el, ctx)),
            "hr" => Ok(()),
            "script" | "style" | "noscript" | "template" | "head" | "title" | "meta" | "link" => Ok(()),
            _ => self.inline_element(el, ctx),
        }
    }

    fn paragraph(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        let name = el.local_name();
        let style = match name {
            "pre" => Some(StyleId::new("Code")),
            _ => heading_style(name).or_else(|| ctx.paragraph_style.clone()),
        };
        if matches!(name, "h4" | "h5" | "h6") {
            self.warn(
                "html.heading_level",
                FeatureCategory::Styles,
                format!("<{name}> imported as Heading 3"),
            );
        }

        let mut formatting = Formatting::new();
        if let Some(css) = el.attr("style") {
            let (f, _) = from_css(css, PropertyScope::Paragraph);
            formatting = f.scoped(PropertyScope::Paragraph);
        }
        if let Some(level) = el.attr("data-outline-level").and_then(|l| l.parse::<u8>().ok()) {
            formatting.set(Property::OutlineLevel, Some(PropertyValue::Level(level)));
        }

        let mut inner = ctx.styled(el, self);
        if name == "pre" {
            inner.pre = true;
        }
        self.builder.begin_paragraph(style.clone(), formatting.clone())?;
        self.line_start = true;
        inner.paragraph_style = style;
        self.inline_children(el, &inner, &formatting)?;
        self.builder.end_paragraph();
        Ok(())
    }

    fn table(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        let formatting = table_formatting(el);
        self.builder.begin_table(None, formatting)?;
        let rows = el.elements().flat_map(|c| match c.local_name() {
            "thead" | "tbody" | "tfoot" => c.children_named("tr").collect::<Vec<_>>(),
            "tr" => vec![c],
            _ => Vec::new(),
        });
        for row in rows.collect::<Vec<_>>() {
            self.marked(row, |r| {
                r.builder.begin_row(table_formatting(row))?;
                for cell in row.elements().filter(|c| c.is("td") || c.is("th")) {
                    r.marked(cell, |r| r.cell(cell, ctx))?;
                }
                r.builder.end_row();
                Ok(())
            })?;
        }
        self.builder.end_table();
        Ok(())
    }

    fn cell(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        let cell = self.builder.begin_cell(table_formatting(el))?;
        let mut inner = ctx.styled(el, self);
        if el.is("th") {
            inner = inner.with(Property::Bold, true);
        }
        if has_block_children(el) {
            self.flow(el, &inner)?;
        } else {
            self.builder.begin_paragraph(None, Formatting::new())?;
            self.line_start = true;
            self.inline_children(el, &inner, &Formatting::new())?;
        }
        if self.builder.tree().children(cell).is_empty() {
            self.builder.begin_paragraph(None, Formatting::new())?;
        }
        self.builder.end_cell();
        Ok(())
    }

    // =========================================================================
    // Inline content
    // =========================================================================

    fn inline_children(&mut self, el: &XmlElement, ctx: &Context, para: &Formatting) -> CodecResult<()> {
        for child in &el.children {
            match child {
                XmlNode::Text(text) => self.text(text, ctx)?,
                XmlNode::Element(child) if child.is("br") => {
                    let style = ctx.paragraph_style.clone();
                    self.builder.end_paragraph();
                    self.builder.begin_paragraph(style, para.clone())?;
                    self.line_start = true;
                }
                XmlNode::Element(child) => self.element(child, ctx)?,
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &str, ctx: &Context) -> CodecResult<()> {
        let text = if ctx.pre {
            text.to_string()
        } else {
            let collapsed = collapse_whitespace(text);
            if self.line_start || self.builder.current_paragraph().is_none() {
                collapsed.trim_start().to_string()
            } else {
                collapsed
            }
        };
        if !text.is_empty() {
            self.builder.run(&text, None, ctx.chars.clone())?;
            self.line_start = false;
        }
        Ok(())
    }

    fn inline_element(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        let name = el.local_name();
        match name {
            "ins" | "del" => {
                let mark = if name == "ins" {
                    Mark::Inserted
                } else {
                    Mark::Deleted
                };
                let (key, info) = self.change_info(el);
                self.builder.begin_change(&key, mark, info);
                let result = self.inline_or_flow(el, ctx);
                self.builder.end_change(&key);
                result
            }
            "span" if el.attr("data-field").is_some() => {
                let kind = FieldKind::parse(el.attr("data-field").unwrap_or_default());
                let inner = ctx.styled(el, self);
                self.builder.field(kind, &el.text(), None, inner.chars.clone())?;
                self.line_start = false;
                Ok(())
            }
            "a" => {
                let anchor = el.attr("id").or(el.attr("name"));
                if let Some(name) = anchor {
                    self.builder.bookmark(name)?;
                }
                if el.attr("href").is_some() {
                    self.warn(
                        "html.links.flattened",
                        FeatureCategory::Other,
                        "Hyperlinks imported as plain text",
                    );
                }
                let inner = ctx.styled(el, self);
                self.inline_or_flow(el, &inner)
            }
            "img" => self.image(el),
            "br" => Ok(()),
            _ => {
                let inner = match name {
                    "b" | "strong" => ctx.with(Property::Bold, true),
                    "i" | "em" | "cite" | "var" | "dfn" => ctx.with(Property::Italic, true),
                    "u" => ctx.with(Property::Underline, true),
                    "s" | "strike" => ctx.with(Property::Strikethrough, true),
                    "sup" => ctx.with(
                        Property::VerticalAlign,
                        PropertyValue::VerticalAlign(VerticalAlign::Superscript),
                    ),
                    "sub" => ctx.with(
                        Property::VerticalAlign,
                        PropertyValue::VerticalAlign(VerticalAlign::Subscript),
                    ),
                    "code" | "tt" | "kbd" | "samp" => {
                        ctx.with(Property::FontFamily, PropertyValue::Text("Courier New".into()))
                    }
                    "mark" => ctx.with(
                        Property::Highlight,
                        PropertyValue::Color(doc_model::Color::rgb(0xFF, 0xFF, 0x00)),
                    ),
                    "font" => {
                        let mut inner = ctx.clone();
                        if let Some(face) = el.attr("face") {
                            inner = inner.with(Property::FontFamily, PropertyValue::Text(face.into()));
                        }
                        if let Some(color) = el.attr("color").and_then(parse_color) {
                            inner = inner.with(Property::Color, color);
                        }
                        inner
                    }
                    "span" | "small" | "big" | "abbr" | "q" | "label" | "bdi" | "bdo" | "time" => {
                        ctx.clone()
                    }
                    other => {
                        self.builder.report_mut().unsupported_element(other);
                        ctx.clone()
                    }
                };
                let inner = inner.styled(el, self);
                self.inline_or_flow(el, &inner)
            }
        }
    }

    /// Content of an inline wrapper, which may hold whole blocks
    fn inline_or_flow(&mut self, el: &XmlElement, ctx: &Context) -> CodecResult<()> {
        if has_block_children(el) {
            self.flow(el, ctx)
        } else {
            for child in &el.children {
                match child {
                    XmlNode::Text(text) => self.text(text, ctx)?,
                    XmlNode::Element(child) => self.element(child, ctx)?,
                }
            }
            Ok(())
        }
    }

    fn image(&mut self, el: &XmlElement) -> CodecResult<()> {
        let src = el.attr("src").unwrap_or_default();
        let Some((content_type, data)) = parse_data_uri(src) else {
            self.warn(
                "html.images.external",
                FeatureCategory::Images,
                "Image that is not embedded as a data URI dropped",
            );
            return Ok(());
        };
        let mut width = el.attr("width").and_then(|w| parse_length(&format!("{w}px")));
        let mut height = el.attr("height").and_then(|h| parse_length(&format!("{h}px")));
        if let Some(style) = el.attr("style") {
            for (name, value) in declarations(style) {
                match name.as_str() {
                    "width" => width = parse_length(&value).or(width),
                    "height" => height = parse_length(&value).or(height),
                    _ => {}
                }
            }
        }
        self.builder.image(ImageObject {
            content_type,
            data,
            width: width.unwrap_or(72.0),
            height: height.unwrap_or(72.0),
            alt_text: el.attr("alt").map(str::to_string),
        })?;
        self.line_start = false;
        Ok(())
    }
}

fn heading_style(tag: &str) -> Option<StyleId> {
    let tag = match tag {
        "h4" | "h5" | "h6" => "h3",
        t => t,
    };
    HEADINGS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, s)| StyleId::new(*s))
}

fn table_formatting(el: &XmlElement) -> Formatting {
    el.attr("style")
        .map(|s| from_css(s, PropertyScope::Table).0.scoped(PropertyScope::Table))
        .unwrap_or_default()
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "article", "table", "ul", "ol", "dl", "li", "blockquote", "pre", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "footer", "main", "nav", "aside", "figure", "hr",
    "address",
];

fn has_block_children(el: &XmlElement) -> bool {
    el.elements().any(|c| {
        BLOCK_TAGS.contains(&c.local_name())
            || ((c.is("ins") || c.is("del") || c.is("a")) && has_block_children(c))
    })
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

fn parse_data_uri(src: &str) -> Option<(String, Vec<u8>)> {
    let rest = src.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let content_type = header.strip_suffix(";base64")?;
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;
    let content_type = if content_type.is_empty() {
        "image/png"
    } else {
        content_type
    };
    Some((content_type.to_string(), data))
}

/// Named character references beyond the five XML ones
fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "nbsp" => "\u{a0}",
        "copy" => "\u{a9}",
        "reg" => "\u{ae}",
        "trade" => "\u{2122}",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201c}",
        "rdquo" => "\u{201d}",
        "laquo" => "\u{ab}",
        "raquo" => "\u{bb}",
        "euro" => "\u{20ac}",
        "pound" => "\u{a3}",
        "middot" => "\u{b7}",
        "bull" => "\u{2022}",
        "deg" => "\u{b0}",
        "times" => "\u{d7}",
        "sect" => "\u{a7}",
        "para" => "\u{b6}",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(html: &str) -> Imported {
        read(html.as_bytes()).unwrap()
    }

    #[test]
    fn test_basic_document() {
        let imported = import(
            r#"<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
  <head><title>Report</title><meta name="author" content="Ann"/></head>
  <body>
    <h1>Intro</h1>
    <p>Some   <b>bold</b> text&nbsp;here</p>
  </body>
</html>"#,
        );
        let tree = &imported.document.tree;
        assert_eq!(tree.metadata().title.as_deref(), Some("Report"));
        assert_eq!(tree.metadata().author.as_deref(), Some("Ann"));
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(
            tree.node(paragraphs[0]).unwrap().style_ref(),
            Some(&StyleId::new("Heading1"))
        );
        assert_eq!(tree.text_of(paragraphs[1]), "Some bold text\u{a0}here");
        let bold_run = tree.children(paragraphs[1])[1];
        assert!(doc_model::resolve(tree, bold_run).unwrap().bold());
    }

    #[test]
    fn test_ins_and_del_become_changes() {
        let imported = import(
            r#"<html><body style="white-space: pre-wrap"><p>keep <ins data-change="0" data-author="bo" datetime="2024-03-01T10:00:00+00:00">new</ins><del>old</del></p></body></html>"#,
        );
        let changes = imported.document.overlay.changes();
        assert_eq!(changes.len(), 2);
        assert!(changes[0].is_insertion());
        assert_eq!(changes[0].author, "bo");
        assert!(changes[1].is_deletion());
        assert_eq!(changes[1].author, "Unknown");
    }

    #[test]
    fn test_table_and_image() {
        let imported = import(
            r#"<html><body><table><tr><th>A</th><td><p>B</p></td></tr></table><p><img src="data:image/png;base64,AAEC" style="width: 10pt; height: 20pt" alt="dot"/></p></body></html>"#,
        );
        let tree = &imported.document.tree;
        assert_eq!(tree.nodes_of_kind(NodeKind::TableCell).len(), 2);
        let image = tree.nodes_of_kind(NodeKind::InlineObject)[0];
        match tree.node(image).unwrap().data() {
            doc_model::NodeData::InlineObject(img) => {
                assert_eq!(img.data, vec![0, 1, 2]);
                assert_eq!(img.width, 10.0);
                assert_eq!(img.alt_text.as_deref(), Some("dot"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_not_xhtml_is_malformed() {
        assert!(read(b"<html><body><p>unclosed</body></html>")
            .unwrap_err()
            .is_malformed());
        assert!(read(b"<svg/>").unwrap_err().is_malformed());
    }
}
