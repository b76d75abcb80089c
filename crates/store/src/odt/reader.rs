//! ODT package reader
//!
//! Named styles, document defaults and master pages come from
//! `styles.xml`; automatic styles in `content.xml` become direct
//! formatting on top of their parent style.

use super::properties;
use super::{DEFAULT_STYLE_META, MIMETYPE};
use crate::archive::ArchiveReader;
use crate::builder::{ChangeInfo, CommentDraft, DocumentBuilder};
use crate::view::Mark;
use crate::xml::{self, parse_date, parse_length, XmlElement, XmlNode};
use crate::{CodecError, CodecResult, FeatureCategory, Format, Imported, WarningSeverity};
use doc_model::{
    DocumentMetadata, FieldKind, Formatting, ImageObject, ListKind, Property, PropertyScope,
    PropertyValue, SectionProperties, Style, StyleId, StyleType, MAX_LIST_LEVEL,
};
use std::collections::HashMap;

/// Upper bound for `text:s` counts and repeated cells
const MAX_REPEAT: usize = 1_000;

pub fn read(bytes: &[u8]) -> CodecResult<Imported> {
    let mut archive = ArchiveReader::new(bytes, Format::Odt)?;
    if let Some(mimetype) = archive.read_optional_string("mimetype")? {
        if mimetype.trim() != MIMETYPE {
            return Err(CodecError::malformed(
                Format::Odt,
                format!("package media type is '{}', not an ODF text document", mimetype.trim()),
            ));
        }
    }
    let content = xml::parse(&archive.read_string("content.xml")?, Format::Odt)?;
    if !content.is("document-content") {
        return Err(CodecError::malformed(
            Format::Odt,
            format!("content root is <{}>, not <office:document-content>", content.name),
        ));
    }
    let text = content
        .child("body")
        .and_then(|b| b.child("text"))
        .ok_or_else(|| CodecError::malformed(Format::Odt, "document has no office:text body"))?;

    let mut builder = DocumentBuilder::new(Format::Odt);
    let mut masters = HashMap::new();
    if let Some(styles) = archive.read_optional_string("styles.xml")? {
        let root = xml::parse(&styles, Format::Odt)?;
        read_styles(&root, &mut builder);
        masters = read_masters(&root);
    }
    let mut default_style = None;
    if let Some(meta) = archive.read_optional_string("meta.xml")? {
        let (metadata, style) = read_meta(&xml::parse(&meta, Format::Odt)?);
        builder.set_metadata(metadata);
        default_style = style;
    }
    let default_style = default_style.unwrap_or_else(|| StyleId::from("Standard"));
    if builder.tree().styles().get(&default_style).is_some() {
        builder.set_default_paragraph_style(default_style);
    }

    // Editors commonly keep list styles with the automatic styles
    if let Some(automatic) = content.child("automatic-styles") {
        for style in automatic.children_named("list-style").filter_map(list_style) {
            builder.add_style(style);
        }
    }

    let regions = read_regions(text, &mut builder);
    let mut reader = BodyReader {
        archive,
        builder,
        auto: read_automatic_styles(&content),
        masters,
        regions,
        section_blocks: 0,
        table_depth: 0,
        unnamed_comments: 0,
        list: None,
    };
    reader.body(text)?;
    tracing::debug!(regions = reader.regions.len(), "Read ODT body");
    reader.builder.finish()
}

// =============================================================================
// Styles, master pages and metadata
// =============================================================================

/// Automatic style from `content.xml`
#[derive(Debug, Clone, Default)]
struct AutoStyle {
    parent: Option<StyleId>,
    formatting: Formatting,
    master: Option<String>,
    page_number: Option<u32>,
}

fn read_styles(root: &XmlElement, builder: &mut DocumentBuilder) {
    let Some(styles) = root.child("styles") else {
        return;
    };
    for el in styles.elements() {
        match el.local_name() {
            "default-style" => {
                for (property, value) in properties::read_style(el).iter() {
                    builder.set_default(property, value.clone());
                }
            }
            "style" => {
                let Some(id) = el.attr("style:name") else {
                    continue;
                };
                let name = el.attr("style:display-name").unwrap_or(id);
                let mut style = match el.attr("style:family") {
                    Some("paragraph") => Style::paragraph(id, name),
                    Some("text") => Style::character(id, name),
                    Some("table") => Style::table(id, name),
                    _ => continue,
                };
                if let Some(parent) = el.attr("style:parent-style-name") {
                    style = style.with_based_on(parent);
                }
                if let Some(next) = el.attr("style:next-style-name") {
                    style = style.with_next_style(next);
                }
                style.properties = properties::read_style(el);
                if let Some(list) = el.attr("style:list-style-name") {
                    let list = PropertyValue::ListRef(Some(StyleId::from(list)));
                    style.properties.set(Property::ListStyle, Some(list));
                }
                let list_level = el
                    .attr("style:list-level")
                    .and_then(|l| l.trim().parse::<u8>().ok())
                    .filter(|l| (1..=MAX_LIST_LEVEL + 1).contains(l));
                if let Some(level) = list_level {
                    style.properties.set(Property::ListLevel, Some(PropertyValue::Level(level - 1)));
                }
                builder.add_style(style);
            }
            "list-style" => {
                if let Some(style) = list_style(el) {
                    builder.add_style(style);
                }
            }
            _ => {}
        }
    }
}

/// A `text:list-style`; the first level decides the marker
fn list_style(el: &XmlElement) -> Option<Style> {
    let id = el.attr("style:name")?;
    let name = el.attr("style:display-name").unwrap_or(id);
    let first = el
        .elements()
        .find(|l| l.attr("text:level").unwrap_or("1") == "1");
    let kind = match first {
        Some(level) if level.is("list-level-style-number") => match level.attr("style:num-format") {
            Some("a") => ListKind::LowerAlpha,
            Some("A") => ListKind::UpperAlpha,
            Some("i") => ListKind::LowerRoman,
            Some("I") => ListKind::UpperRoman,
            _ => ListKind::Decimal,
        },
        _ => ListKind::Bullet,
    };
    Some(Style::list_of(id, name, kind))
}

/// Header and footer text by master page name
fn read_masters(root: &XmlElement) -> HashMap<String, (Option<String>, Option<String>)> {
    let mut masters = HashMap::new();
    let Some(master_styles) = root.child("master-styles") else {
        return masters;
    };
    for page in master_styles.children_named("master-page") {
        let Some(name) = page.attr("style:name") else {
            continue;
        };
        let lines = |tag: &str| {
            page.child(tag).map(|part| {
                part.elements()
                    .filter(|p| p.is("p") || p.is("h"))
                    .map(plain_text)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        };
        masters.insert(name.to_string(), (lines("header"), lines("footer")));
    }
    masters
}

fn read_meta(root: &XmlElement) -> (DocumentMetadata, Option<StyleId>) {
    let Some(meta) = root.child("meta") else {
        return (DocumentMetadata::default(), None);
    };
    let text = |name: &str| {
        meta.child(name)
            .map(|e| e.text().trim().to_string())
            .filter(|t| !t.is_empty())
    };
    let metadata = DocumentMetadata {
        title: text("title"),
        author: text("initial-creator").or_else(|| text("creator")),
        subject: text("subject"),
        keywords: meta
            .children_named("keyword")
            .map(|k| k.text().trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        created: text("creation-date").as_deref().and_then(parse_date),
        modified: text("date").as_deref().and_then(parse_date),
    };
    let default_style = meta
        .children_named("user-defined")
        .find(|u| u.attr("meta:name") == Some(DEFAULT_STYLE_META))
        .map(|u| u.text().trim().to_string())
        .filter(|s| !s.is_empty())
        .map(StyleId::from);
    (metadata, default_style)
}

fn read_automatic_styles(content: &XmlElement) -> HashMap<String, AutoStyle> {
    let mut auto = HashMap::new();
    let Some(styles) = content.child("automatic-styles") else {
        return auto;
    };
    for el in styles.children_named("style") {
        let Some(name) = el.attr("style:name") else {
            continue;
        };
        auto.insert(
            name.to_string(),
            AutoStyle {
                parent: el.attr("style:parent-style-name").map(StyleId::from),
                formatting: properties::read_style(el),
                master: el
                    .attr("style:master-page-name")
                    .filter(|m| !m.is_empty())
                    .map(String::from),
                page_number: properties::page_number(el),
            },
        );
    }
    auto
}

// =============================================================================
// Tracked change regions
// =============================================================================

struct Region<'x> {
    mark: Mark,
    info: ChangeInfo,
    /// The `text:insertion` or `text:deletion` element
    body: &'x XmlElement,
}

fn read_regions<'x>(text: &'x XmlElement, builder: &mut DocumentBuilder) -> HashMap<String, Region<'x>> {
    let mut regions = HashMap::new();
    let Some(tracked) = text.child("tracked-changes") else {
        return regions;
    };
    for region in tracked.children_named("changed-region") {
        let Some(id) = region.attr("text:id").or_else(|| region.attr("xml:id")) else {
            continue;
        };
        let Some(body) = region.elements().next() else {
            continue;
        };
        let mark = match body.local_name() {
            "insertion" => Mark::Inserted,
            "deletion" => Mark::Deleted,
            _ => {
                builder.warn(
                    "odt.format_changes.dropped",
                    FeatureCategory::FormatChanges,
                    WarningSeverity::Moderate,
                    "Tracked attribute changes dropped; the current formatting is kept",
                );
                continue;
            }
        };
        let info = body.child("change-info");
        let info = ChangeInfo::new(
            info.and_then(|i| i.child("creator"))
                .map(|c| c.text().trim().to_string())
                .unwrap_or_default(),
            info.and_then(|i| i.child("date"))
                .and_then(|d| parse_date(&d.text())),
        );
        regions.insert(id.to_string(), Region { mark, info, body });
    }
    regions
}

/// Builder key of a region: regions written for one change share the part
/// of the id before the first dot
fn change_key(region: &str) -> String {
    format!("ct:{}", region.split('.').next().unwrap_or(region))
}

// =============================================================================
// Text
// =============================================================================

/// Append `text` with every run of whitespace collapsed to one space
fn push_collapsed(out: &mut String, text: &str) {
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
}

fn space_count(el: &XmlElement) -> usize {
    el.attr("text:c")
        .and_then(|c| c.trim().parse::<usize>().ok())
        .unwrap_or(1)
        .min(MAX_REPEAT)
}

/// Text of a paragraph-like element with ODF whitespace elements expanded;
/// annotations and notes are skipped
fn plain_text(el: &XmlElement) -> String {
    fn collect(el: &XmlElement, out: &mut String) {
        for child in &el.children {
            match child {
                XmlNode::Text(t) => push_collapsed(out, t),
                XmlNode::Element(e) => match e.local_name() {
                    "s" => out.extend(std::iter::repeat(' ').take(space_count(e))),
                    "tab" => out.push('\t'),
                    "line-break" => out.push('\n'),
                    "annotation" | "note" | "change" => {}
                    _ => collect(e, out),
                },
            }
        }
    }
    let mut out = String::new();
    collect(el, &mut out);
    out
}

fn is_blank(node: &XmlNode) -> bool {
    matches!(node, XmlNode::Text(t) if t.trim().is_empty())
}

/// Character style and formatting in effect inside a span
#[derive(Debug, Clone, Default)]
struct Span {
    style: Option<StyleId>,
    formatting: Formatting,
}

// =============================================================================
// Body
// =============================================================================

struct BodyReader<'x, 'b> {
    archive: ArchiveReader<'b>,
    builder: DocumentBuilder,
    auto: HashMap<String, AutoStyle>,
    masters: HashMap<String, (Option<String>, Option<String>)>,
    regions: HashMap<String, Region<'x>>,
    /// Blocks read into the current section
    section_blocks: usize,
    table_depth: usize,
    unnamed_comments: usize,
    /// List and level of the `text:list` being read; `None` inside a list
    /// that names no known list style
    list: Option<Option<(StyleId, u8)>>,
}

impl<'x, 'b> BodyReader<'x, 'b> {
    fn warn(&mut self, code: &str, category: FeatureCategory, severity: WarningSeverity, msg: &str) {
        self.builder.warn(code, category, severity, msg);
    }

    /// Named style and direct formatting for a style name
    fn style_of(&self, name: Option<&str>) -> (Option<StyleId>, Formatting) {
        match name {
            Some(name) => match self.auto.get(name) {
                Some(auto) => (auto.parent.clone(), auto.formatting.clone()),
                None => (Some(StyleId::from(name)), Formatting::new()),
            },
            None => (None, Formatting::new()),
        }
    }

    fn region(&self, el: &XmlElement) -> Option<(String, Mark, ChangeInfo, &'x XmlElement)> {
        let id = el.attr("text:change-id")?;
        let region = self.regions.get(id)?;
        Some((change_key(id), region.mark, region.info.clone(), region.body))
    }

    fn body(&mut self, text: &'x XmlElement) -> CodecResult<()> {
        let (header, footer) = self.masters.get("Standard").cloned().unwrap_or_default();
        self.builder.begin_section(SectionProperties {
            header,
            footer,
            ..SectionProperties::default()
        })?;
        self.blocks(text)
    }

    /// Start a new section when a top-level block's style names a master
    /// page
    fn section_start(&mut self, style: Option<&str>) -> CodecResult<()> {
        if self.table_depth > 0 {
            return Ok(());
        }
        let start = style
            .and_then(|s| self.auto.get(s))
            .and_then(|a| a.master.clone().map(|m| (m, a.page_number)));
        if let Some((master, page_number)) = start {
            let (header, footer) = self.masters.get(&master).cloned().unwrap_or_default();
            let props = SectionProperties {
                header,
                footer,
                page_number_start: page_number,
                ..SectionProperties::default()
            };
            if self.section_blocks == 0 {
                self.builder.set_section_properties(props)?;
            } else {
                self.builder.begin_section(props)?;
            }
            self.section_blocks = 0;
        }
        self.section_blocks += 1;
        Ok(())
    }

    fn blocks(&mut self, container: &'x XmlElement) -> CodecResult<()> {
        for el in container.elements() {
            self.block(el)?;
        }
        Ok(())
    }

    fn block(&mut self, el: &'x XmlElement) -> CodecResult<()> {
        match el.local_name() {
            "p" | "h" => {
                if self.deleted_host(el)? {
                    return Ok(());
                }
                self.section_start(el.attr("text:style-name"))?;
                self.paragraph(el)?;
            }
            "table" => {
                self.section_start(el.attr("table:style-name"))?;
                self.table(el)?;
            }
            "list" => self.list(el)?,
            "section" => self.blocks(el)?,
            "change" => {
                if let Some((key, mark, info, body)) = self.region(el) {
                    self.region_blocks(&key, mark, info, body)?;
                }
            }
            "change-start" => {
                if let Some((key, mark, info, _)) = self.region(el) {
                    self.builder.begin_change(&key, mark, info);
                }
            }
            "change-end" => {
                if let Some(id) = el.attr("text:change-id") {
                    self.builder.end_change(&change_key(id));
                }
            }
            "tracked-changes" | "sequence-decls" | "variable-decls" | "user-field-decls"
            | "soft-page-break" | "forms" => {}
            other => self.builder.report_mut().unsupported_element(other),
        }
        Ok(())
    }

    /// A `text:list`. Nested lists go one level deeper and keep the outer
    /// list unless they name a list style of their own.
    fn list(&mut self, el: &'x XmlElement) -> CodecResult<()> {
        let outer = self.list.clone();
        let named = el
            .attr("text:style-name")
            .map(StyleId::from)
            .filter(|id| {
                self.builder.tree().styles().get(id).map(|s| s.style_type) == Some(StyleType::List)
            });
        let current = match (&outer, named) {
            (Some(Some((_, level))), Some(id)) => Some((id, (level + 1).min(MAX_LIST_LEVEL))),
            (Some(Some((id, level))), None) => Some((id.clone(), (level + 1).min(MAX_LIST_LEVEL))),
            (_, Some(id)) => Some((id, 0)),
            (Some(None), None) => None,
            (None, None) => {
                self.warn(
                    "odt.lists.unnamed",
                    FeatureCategory::ParagraphFormatting,
                    WarningSeverity::Minor,
                    "List without a known list style; items kept as plain paragraphs",
                );
                None
            }
        };
        self.list = Some(current);
        let items = el.elements().filter(|i| i.is("list-item") || i.is("list-header"));
        let result = items.map(|item| self.blocks(item)).collect::<CodecResult<()>>();
        self.list = outer;
        result
    }

    /// Direct list settings that put a paragraph in the list it was read in,
    /// on top of what its paragraph style already hands down
    fn apply_list(&self, style: Option<&StyleId>, paragraph: &mut Formatting) {
        let styles = self.builder.tree().styles();
        let chain = style
            .or(styles.default_paragraph_style())
            .map(|s| styles.chain(s))
            .unwrap_or_default();
        let inherited = |p: Property| chain.iter().find_map(|s| s.properties.get(p));
        let inherited_list = inherited(Property::ListStyle).and_then(PropertyValue::as_list_ref);
        match self.list.clone().flatten() {
            Some((list, level)) => {
                let inherited_level = match inherited(Property::ListLevel) {
                    Some(PropertyValue::Level(l)) => *l,
                    _ => 0,
                };
                if inherited_level != level {
                    paragraph.set(Property::ListLevel, Some(PropertyValue::Level(level)));
                }
                if inherited_list != Some(&list) {
                    paragraph.set(Property::ListStyle, Some(PropertyValue::ListRef(Some(list))));
                }
            }
            None if inherited_list.is_some() => {
                paragraph.set(Property::ListStyle, Some(PropertyValue::ListRef(None)));
            }
            None => {}
        }
    }

    /// Blocks held by a change region, created under that change. The
    /// empty paragraph that closes a region of several blocks is dropped.
    fn region_blocks(
        &mut self,
        key: &str,
        mark: Mark,
        info: ChangeInfo,
        body: &'x XmlElement,
    ) -> CodecResult<()> {
        let mut blocks: Vec<&XmlElement> = body.elements().filter(|e| !e.is("change-info")).collect();
        if blocks.len() > 1 && blocks.last().is_some_and(|p| p.is("p") && p.children.iter().all(is_blank)) {
            blocks.pop();
        }
        self.builder.begin_change(key, mark, info);
        for block in blocks {
            self.block(block)?;
        }
        self.builder.end_change(key);
        Ok(())
    }

    /// A paragraph holding nothing but a `text:change` to a region of
    /// several blocks stands for those deleted blocks
    fn deleted_host(&mut self, p: &'x XmlElement) -> CodecResult<bool> {
        let mut content = p.children.iter().filter(|c| !is_blank(c));
        let (Some(XmlNode::Element(change)), None) = (content.next(), content.next()) else {
            return Ok(false);
        };
        if !change.is("change") {
            return Ok(false);
        }
        let Some((key, mark, info, body)) = self.region(change) else {
            return Ok(false);
        };
        let blocks: Vec<&XmlElement> = body.elements().filter(|e| !e.is("change-info")).collect();
        if mark != Mark::Deleted || (blocks.len() < 2 && !blocks.iter().any(|b| b.is("table"))) {
            return Ok(false);
        }
        self.section_start(p.attr("text:style-name"))?;
        // The host itself is not a block of the section
        self.section_blocks = self.section_blocks.saturating_sub(1);
        self.region_blocks(&key, mark, info, body)?;
        Ok(true)
    }

    // =========================================================================
    // Paragraphs and inline content
    // =========================================================================

    /// Region id when the paragraph opens with an insertion that runs to
    /// its end or past it: the paragraph itself is inserted
    fn opens_insertion(&self, p: &XmlElement) -> Option<(String, ChangeInfo)> {
        let Some(XmlNode::Element(first)) = p.children.iter().find(|c| !is_blank(c)) else {
            return None;
        };
        if !first.is("change-start") {
            return None;
        }
        let id = first.attr("text:change-id")?;
        let (key, mark, info, _) = self.region(first)?;
        if mark != Mark::Inserted {
            return None;
        }
        let elements: Vec<&XmlElement> = p.elements().collect();
        let end = elements
            .iter()
            .position(|e| e.is("change-end") && e.attr("text:change-id") == Some(id));
        match end {
            Some(pos) if pos + 1 != elements.len() => None,
            _ => Some((key, info)),
        }
    }

    fn paragraph(&mut self, p: &'x XmlElement) -> CodecResult<()> {
        let (style, formatting) = self.style_of(p.attr("text:style-name"));
        let mut paragraph = formatting.scoped(PropertyScope::Paragraph);
        if p.is("h") {
            let level = p
                .attr("text:outline-level")
                .and_then(|l| l.trim().parse::<u8>().ok())
                .filter(|l| (1..=9).contains(l));
            let styled = style
                .as_ref()
                .and_then(|s| self.builder.tree().styles().get(s))
                .is_some_and(|s| s.properties.contains(Property::OutlineLevel));
            if let Some(level) = level.filter(|_| !styled && !paragraph.contains(Property::OutlineLevel)) {
                paragraph.set(Property::OutlineLevel, Some(PropertyValue::Level(level)));
            }
        }
        self.apply_list(style.as_ref(), &mut paragraph);
        let inserted = self.opens_insertion(p);
        let node = self.builder.begin_paragraph(style, paragraph)?;
        if let Some((key, info)) = inserted {
            self.builder.mark_block(&key, Mark::Inserted, info, node);
        }
        let span = Span {
            style: None,
            formatting: formatting.scoped(PropertyScope::Character),
        };
        self.inline(p, &span)?;
        self.builder.end_paragraph();
        Ok(())
    }

    fn flush(&mut self, text: &mut String, span: &Span) -> CodecResult<()> {
        if !text.is_empty() {
            self.builder
                .run(text, span.style.clone(), span.formatting.scoped(PropertyScope::Character))?;
            text.clear();
        }
        Ok(())
    }

    fn inline(&mut self, el: &'x XmlElement, span: &Span) -> CodecResult<()> {
        let mut text = String::new();
        for child in &el.children {
            match child {
                XmlNode::Text(t) => push_collapsed(&mut text, t),
                XmlNode::Element(e) => match e.local_name() {
                    "s" => text.extend(std::iter::repeat(' ').take(space_count(e))),
                    "tab" => text.push('\t'),
                    "line-break" => text.push('\n'),
                    "soft-page-break" => {}
                    _ => {
                        self.flush(&mut text, span)?;
                        self.inline_element(e, span)?;
                    }
                },
            }
        }
        self.flush(&mut text, span)
    }

    fn inline_element(&mut self, e: &'x XmlElement, span: &Span) -> CodecResult<()> {
        match e.local_name() {
            "span" => {
                let inner = self.span_for(e.attr("text:style-name"), span);
                self.inline(e, &inner)?;
            }
            "a" => {
                self.warn(
                    "odt.hyperlinks.flattened",
                    FeatureCategory::TextFormatting,
                    WarningSeverity::Minor,
                    "Hyperlink targets dropped; link text kept",
                );
                self.inline(e, span)?;
            }
            "bookmark" | "bookmark-start" => {
                if let Some(name) = e.attr("text:name") {
                    self.builder.bookmark(name)?;
                }
            }
            "bookmark-end" | "soft-page-break" | "reference-mark" | "reference-mark-start"
            | "reference-mark-end" => {}
            "page-number" => self.field(FieldKind::Page, e, span)?,
            "page-count" => self.field(FieldKind::NumPages, e, span)?,
            "date" => self.field(FieldKind::Date, e, span)?,
            "bookmark-ref" | "reference-ref" => {
                let target = e.attr("text:ref-name").unwrap_or_default().to_string();
                self.field(FieldKind::Ref(target), e, span)?;
            }
            "text-input" => {
                let instruction = e.attr("text:description").unwrap_or("FILLIN").to_string();
                self.field(FieldKind::parse(&instruction), e, span)?;
            }
            "title" | "subject" | "author-name" | "file-name" | "time" | "chapter" => {
                let instruction = match e.local_name() {
                    "author-name" => "AUTHOR",
                    "file-name" => "FILENAME",
                    "time" => "TIME",
                    "chapter" => "STYLEREF",
                    "subject" => "SUBJECT",
                    _ => "TITLE",
                };
                self.field(FieldKind::Other(instruction.to_string()), e, span)?;
            }
            "frame" => self.frame(e)?,
            "annotation" => self.annotation(e)?,
            "annotation-end" => {
                if let Some(name) = e.attr("office:name") {
                    self.builder.comment_end(name);
                }
            }
            "change-start" => {
                if let Some((key, mark, info, _)) = self.region(e) {
                    self.builder.begin_change(&key, mark, info);
                }
            }
            "change-end" => {
                if let Some(id) = e.attr("text:change-id") {
                    self.builder.end_change(&change_key(id));
                }
            }
            "change" => {
                if let Some((key, mark, info, body)) = self.region(e) {
                    self.builder.begin_change(&key, mark, info);
                    for p in body.elements().filter(|b| b.is("p") || b.is("h")) {
                        self.inline(p, span)?;
                    }
                    self.builder.end_change(&key);
                }
            }
            "note" => self.warn(
                "odt.notes.dropped",
                FeatureCategory::Other,
                WarningSeverity::Moderate,
                "Footnotes and endnotes dropped",
            ),
            other => self.builder.report_mut().unsupported_element(other),
        }
        Ok(())
    }

    fn span_for(&self, name: Option<&str>, outer: &Span) -> Span {
        let Some(name) = name else {
            return outer.clone();
        };
        match self.auto.get(name) {
            Some(auto) => Span {
                style: auto.parent.clone().or_else(|| outer.style.clone()),
                formatting: outer.formatting.merged_with(&auto.formatting),
            },
            None => Span {
                style: Some(StyleId::from(name)),
                formatting: outer.formatting.clone(),
            },
        }
    }

    fn field(&mut self, kind: FieldKind, e: &XmlElement, span: &Span) -> CodecResult<()> {
        self.builder.field(
            kind,
            &plain_text(e),
            span.style.clone(),
            span.formatting.scoped(PropertyScope::Character),
        )?;
        Ok(())
    }

    fn frame(&mut self, frame: &XmlElement) -> CodecResult<()> {
        let Some(href) = frame.child("image").and_then(|i| i.attr("xlink:href")) else {
            self.warn(
                "odt.frames.unsupported",
                FeatureCategory::Images,
                WarningSeverity::Moderate,
                "Frame without an embedded image dropped",
            );
            return Ok(());
        };
        let Some(data) = self.archive.read_optional_bytes(href.trim_start_matches("./"))? else {
            self.warn(
                "odt.images.missing",
                FeatureCategory::Images,
                WarningSeverity::Moderate,
                &format!("Image '{href}' is not in the package"),
            );
            return Ok(());
        };
        if frame
            .attr("text:anchor-type")
            .is_some_and(|a| a != "as-char" && a != "char")
        {
            self.warn(
                "odt.images.anchored",
                FeatureCategory::Images,
                WarningSeverity::Minor,
                "Floating image placed inline",
            );
        }
        let extension = href.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
        let length = |name: &str| frame.attr(name).and_then(parse_length).unwrap_or(0.0);
        let alt_text = frame
            .child("desc")
            .or_else(|| frame.child("title"))
            .map(|d| d.text())
            .filter(|t| !t.is_empty());
        self.builder.image(ImageObject {
            content_type: ImageObject::content_type_for_extension(&extension).to_string(),
            data,
            width: length("svg:width"),
            height: length("svg:height"),
            alt_text,
        })?;
        Ok(())
    }

    fn annotation(&mut self, el: &XmlElement) -> CodecResult<()> {
        let key = match el.attr("office:name") {
            Some(name) => name.to_string(),
            None => {
                self.unnamed_comments += 1;
                format!("odt-comment-{}", self.unnamed_comments)
            }
        };
        let body = el
            .elements()
            .filter(|p| p.is("p") || p.is("h"))
            .map(plain_text)
            .collect::<Vec<_>>()
            .join("\n");
        self.builder.add_comment(CommentDraft {
            key: key.clone(),
            author: el.child("creator").map(|c| c.text().trim().to_string()).unwrap_or_default(),
            created: el.child("date").and_then(|d| parse_date(&d.text())),
            body,
            resolved: el.attr("loext:resolved") == Some("true"),
            parent: None,
        });
        self.builder.comment_start(&key);
        if el.attr("office:name").is_none() {
            self.builder.comment_end(&key);
        }
        Ok(())
    }

    // =========================================================================
    // Tables
    // =========================================================================

    fn table(&mut self, el: &'x XmlElement) -> CodecResult<()> {
        let (style, formatting) = self.style_of(el.attr("table:style-name"));
        self.builder.begin_table(style, formatting.scoped(PropertyScope::Table))?;
        self.table_depth += 1;
        let result = self.rows(el);
        self.table_depth -= 1;
        result?;
        self.builder.end_table();
        Ok(())
    }

    fn rows(&mut self, container: &'x XmlElement) -> CodecResult<()> {
        for el in container.elements() {
            match el.local_name() {
                "table-row" => self.row(el)?,
                "table-header-rows" | "table-rows" | "table-row-group" => self.rows(el)?,
                "table-column" | "table-columns" | "table-column-group" | "table-header-columns"
                | "soft-page-break" => {}
                other => self.builder.report_mut().unsupported_element(other),
            }
        }
        Ok(())
    }

    fn row(&mut self, row: &'x XmlElement) -> CodecResult<()> {
        let (_, formatting) = self.style_of(row.attr("table:style-name"));
        self.builder.begin_row(formatting.scoped(PropertyScope::Table))?;
        for cell in row.elements() {
            match cell.local_name() {
                "table-cell" => {
                    let spanned = ["table:number-columns-spanned", "table:number-rows-spanned"]
                        .iter()
                        .any(|a| cell.attr(a).and_then(|v| v.parse::<u32>().ok()).unwrap_or(1) > 1);
                    if spanned {
                        self.warn(
                            "odt.tables.merged_cells",
                            FeatureCategory::Tables,
                            WarningSeverity::Moderate,
                            "Merged cells split into separate cells",
                        );
                    }
                    let repeat = cell
                        .attr("table:number-columns-repeated")
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(1)
                        .clamp(1, MAX_REPEAT);
                    for _ in 0..repeat {
                        self.cell(cell)?;
                    }
                }
                "covered-table-cell" => self.warn(
                    "odt.tables.merged_cells",
                    FeatureCategory::Tables,
                    WarningSeverity::Moderate,
                    "Merged cells split into separate cells",
                ),
                "soft-page-break" => {}
                other => self.builder.report_mut().unsupported_element(other),
            }
        }
        self.builder.end_row();
        Ok(())
    }

    fn cell(&mut self, cell: &'x XmlElement) -> CodecResult<()> {
        let (_, formatting) = self.style_of(cell.attr("table:style-name"));
        let node = self.builder.begin_cell(formatting.scoped(PropertyScope::Table))?;
        self.blocks(cell)?;
        if self.builder.tree().children(node).is_empty() {
            self.builder.begin_paragraph(None, Formatting::new())?;
            self.builder.end_paragraph();
        }
        self.builder.end_cell();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::{DocumentSnapshot, ExportOptions};
    use chrono::{TimeZone, Utc};
    use doc_model::{Color, DocumentTree, Node, NodeData, NodeKind};
    use revisions::{Comment, CommentAnchor, CommentReply, Overlay, OverlayOp, TrackedChange, ViewMode};

    const NS: &str = concat!(
        r#"xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" "#,
        r#"xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" "#,
        r#"xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" "#,
        r#"xmlns:fo="urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0" "#,
        r#"xmlns:dc="http://purl.org/dc/elements/1.1/""#
    );

    fn package(content_body: &str, automatic: &str) -> Vec<u8> {
        let content = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><office:document-content {NS}><office:automatic-styles>{automatic}</office:automatic-styles><office:body><office:text>{content_body}</office:text></office:body></office:document-content>"#
        );
        let mut zip = ArchiveWriter::new();
        zip.add_stored("mimetype", MIMETYPE.as_bytes()).unwrap();
        zip.add("content.xml", content.as_bytes()).unwrap();
        zip.finish().unwrap()
    }

    fn round_trip(document: &DocumentSnapshot) -> Imported {
        let exported = super::super::writer::write(document, &ExportOptions::default()).unwrap();
        read(&exported.bytes).unwrap()
    }

    fn runs(tree: &DocumentTree) -> Vec<String> {
        tree.nodes_of_kind(NodeKind::Run)
            .into_iter()
            .map(|r| tree.text_of(r))
            .collect()
    }

    #[test]
    fn test_whitespace_and_spans() {
        let bytes = package(
            r#"<text:p>a  b<text:s text:c="3"/>c<text:tab/>d<text:span text:style-name="T1">bold</text:span></text:p>"#,
            r#"<style:style style:name="T1" style:family="text"><style:text-properties fo:font-weight="bold"/></style:style>"#,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        assert_eq!(runs(tree), vec!["a b   c\td", "bold"]);
        let bold = tree.nodes_of_kind(NodeKind::Run)[1];
        assert_eq!(
            tree.node(bold).unwrap().direct_formatting().get(Property::Bold),
            Some(&PropertyValue::Bool(true))
        );
    }

    #[test]
    fn test_heading_level_and_list() {
        let bytes = package(
            r#"<text:h text:outline-level="2">Title</text:h><text:list><text:list-item><text:p>item</text:p></text:list-item></text:list>"#,
            "",
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(
            tree.node(paragraphs[0]).unwrap().direct_formatting().get(Property::OutlineLevel),
            Some(&PropertyValue::Level(2))
        );
        assert!(imported.report.has_code("odt.lists.unnamed"));
        let item = tree.node(paragraphs[1]).unwrap();
        assert_eq!(item.direct_formatting().get(Property::ListStyle), None);
    }

    #[test]
    fn test_automatic_list_style_and_nesting() {
        let bytes = package(
            r#"<text:list text:style-name="L1"><text:list-item><text:p>one</text:p>
                 <text:list><text:list-item><text:p>one a</text:p></text:list-item></text:list>
               </text:list-item><text:list-item><text:p>two</text:p></text:list-item></text:list>"#,
            r#"<text:list-style style:name="L1"><text:list-level-style-number text:level="1" style:num-format="A"/></text:list-style>"#,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        let list = tree.styles().get(&StyleId::from("L1")).unwrap();
        assert_eq!(list.list_kind(), ListKind::UpperAlpha);
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        let labels = doc_model::list_labels(tree).unwrap();
        let shown: Vec<&str> = paragraphs.iter().map(|p| labels[p].as_str()).collect();
        assert_eq!(shown, ["A.", "A.", "B."]);
        assert_eq!(
            doc_model::list_membership(tree, paragraphs[1]).unwrap(),
            Some((StyleId::from("L1"), 1))
        );
    }

    #[test]
    fn test_missing_content_is_malformed() {
        let mut zip = ArchiveWriter::new();
        zip.add_stored("mimetype", MIMETYPE.as_bytes()).unwrap();
        let bytes = zip.finish().unwrap();
        assert!(read(&bytes).is_err());
        assert!(read(b"not a zip").is_err());
    }

    #[test]
    fn test_wrong_mimetype_is_malformed() {
        let mut zip = ArchiveWriter::new();
        zip.add_stored("mimetype", b"application/vnd.oasis.opendocument.spreadsheet")
            .unwrap();
        zip.add("content.xml", b"<office:document-content/>").unwrap();
        let err = read(&zip.finish().unwrap()).unwrap_err();
        assert!(err.to_string().contains("spreadsheet"));
    }

    fn sample_tree() -> DocumentTree {
        let mut tree = DocumentTree::blank();
        tree.put_style(
            Style::paragraph("Heading1", "Heading 1")
                .with_property(Property::Bold, true)
                .with_property(Property::OutlineLevel, PropertyValue::Level(1)),
        )
        .unwrap();
        let section = tree.children(tree.root_id())[0];
        tree.replace_data(
            section,
            NodeData::Section(SectionProperties {
                header: Some("Report".into()),
                footer: Some("Page footer".into()),
                page_number_start: Some(3),
                ..SectionProperties::default()
            }),
        )
        .unwrap();
        let first = tree.children(section)[0];
        tree.set_style_ref(first, Some(StyleId::from("Heading1"))).unwrap();
        tree.append(first, Node::run("Overview")).unwrap();
        let body = tree.append(section, Node::paragraph()).unwrap();
        tree.append(body, Node::bookmark("intro")).unwrap();
        tree.append(
            body,
            Node::run("Red  text").with_formatting(Formatting::new().with(Property::Color, Color::rgb(200, 0, 0))),
        )
        .unwrap();
        tree.append(body, Node::field(FieldKind::Page, "3")).unwrap();

        let table = tree.append(section, Node::table()).unwrap();
        let row = tree.append(table, Node::table_row()).unwrap();
        for text in ["A1", "B1"] {
            let cell = tree.append(row, Node::table_cell()).unwrap();
            let p = tree.append(cell, Node::paragraph()).unwrap();
            tree.append(p, Node::run(text)).unwrap();
        }
        tree
    }

    #[test]
    fn test_round_trip_structure() {
        let tree = sample_tree();
        let imported = round_trip(&DocumentSnapshot::from(tree.clone()));
        let loaded = &imported.document.tree;

        assert_eq!(loaded.plain_text(), tree.plain_text());
        let sections = loaded.nodes_of_kind(NodeKind::Section);
        assert_eq!(sections.len(), 1);
        match loaded.node(sections[0]).unwrap().data() {
            NodeData::Section(props) => {
                assert_eq!(props.header.as_deref(), Some("Report"));
                assert_eq!(props.footer.as_deref(), Some("Page footer"));
                assert_eq!(props.page_number_start, Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
        let heading = loaded.nodes_of_kind(NodeKind::Paragraph)[0];
        assert_eq!(
            loaded.node(heading).unwrap().style_ref(),
            Some(&StyleId::from("Heading1"))
        );
        assert!(loaded.node(heading).unwrap().direct_formatting().is_empty());
        assert!(loaded.bookmark("intro").is_some());
        assert_eq!(loaded.nodes_of_kind(NodeKind::FieldReference).len(), 1);
        assert_eq!(loaded.nodes_of_kind(NodeKind::TableCell).len(), 2);
        assert!(runs(loaded).contains(&"Red  text".to_string()));
        let red = loaded
            .nodes_of_kind(NodeKind::Run)
            .into_iter()
            .find(|r| loaded.text_of(*r) == "Red  text")
            .unwrap();
        assert_eq!(
            loaded.node(red).unwrap().direct_formatting().get(Property::Color),
            Some(&PropertyValue::Color(Color::rgb(200, 0, 0)))
        );
    }

    #[test]
    fn test_round_trip_lists() {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::list_of("Steps", "Steps", ListKind::Decimal))
            .unwrap();
        tree.put_style(
            Style::paragraph("StepParagraph", "Step Paragraph")
                .with_based_on("Normal")
                .with_property(Property::ListStyle, PropertyValue::ListRef(Some("Steps".into()))),
        )
        .unwrap();
        let section = tree.children(tree.root_id())[0];
        let first = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.set_style_ref(first, Some("StepParagraph".into())).unwrap();
        tree.append(first, Node::run("Mix")).unwrap();
        let nested = tree
            .append(
                section,
                Node::paragraph().with_formatting(
                    Formatting::new()
                        .with(Property::ListStyle, PropertyValue::ListRef(Some("Steps".into())))
                        .with(Property::ListLevel, PropertyValue::Level(1)),
                ),
            )
            .unwrap();
        tree.append(nested, Node::run("Slowly")).unwrap();
        let opted_out = tree
            .append(
                section,
                Node::paragraph()
                    .with_style("StepParagraph")
                    .with_formatting(Formatting::new().with(Property::ListStyle, PropertyValue::ListRef(None))),
            )
            .unwrap();
        tree.append(opted_out, Node::run("Note")).unwrap();
        let second = tree.append(section, Node::paragraph().with_style("StepParagraph")).unwrap();
        tree.append(second, Node::run("Bake")).unwrap();

        let imported = round_trip(&DocumentSnapshot::new(tree, Overlay::new()));
        let tree = &imported.document.tree;
        assert_eq!(
            tree.styles().get(&StyleId::from("Steps")).map(Style::list_kind),
            Some(ListKind::Decimal)
        );
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        let membership: Vec<Option<(StyleId, u8)>> = paragraphs
            .iter()
            .map(|p| doc_model::list_membership(tree, *p).unwrap())
            .collect();
        let steps = StyleId::from("Steps");
        assert_eq!(
            membership,
            [Some((steps.clone(), 0)), Some((steps.clone(), 1)), None, Some((steps, 0))]
        );
        let labels = doc_model::list_labels(tree).unwrap();
        assert_eq!(labels[&paragraphs[3]], "2.");
    }

    #[test]
    fn test_round_trip_sections() {
        let mut tree = DocumentTree::blank();
        let second = tree.append(tree.root_id(), Node::section()).unwrap();
        let p = tree.append(second, Node::paragraph()).unwrap();
        tree.append(p, Node::run("second")).unwrap();
        let imported = round_trip(&DocumentSnapshot::from(tree));
        assert_eq!(imported.document.tree.nodes_of_kind(NodeKind::Section).len(), 2);
    }

    #[test]
    fn test_round_trip_tracked_changes() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let first = tree.children(section)[0];
        tree.append(first, Node::run("kept ")).unwrap();
        let added = tree.append(first, Node::run("added")).unwrap();
        let removed = tree.append(section, Node::paragraph()).unwrap();
        let removed_run = tree.append(removed, Node::run("gone")).unwrap();
        let mut overlay = Overlay::new();
        let when = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        OverlayOp::AddChange(TrackedChange::insertion("Ann", vec![added]).with_timestamp(when))
            .apply(&mut overlay)
            .unwrap();
        OverlayOp::AddChange(
            TrackedChange::deletion("Bob", vec![removed, removed_run]).with_timestamp(when),
        )
        .apply(&mut overlay)
        .unwrap();

        let imported = round_trip(&DocumentSnapshot::new(tree, overlay));
        let changes = imported.document.overlay.changes();
        assert_eq!(changes.len(), 2);
        let insertion = changes.iter().find(|c| c.is_insertion()).unwrap();
        assert_eq!(insertion.author, "Ann");
        assert_eq!(insertion.timestamp, when);
        let deletion = changes.iter().find(|c| c.is_deletion()).unwrap();
        assert_eq!(deletion.author, "Bob");

        let original = DocumentSnapshot::new(imported.document.tree.clone(), imported.document.overlay.clone());
        let final_view = crate::view::ExportView::new(&original, ViewMode::Final);
        let section = final_view.sections()[0];
        let text: Vec<String> = final_view
            .paragraphs(section)
            .into_iter()
            .map(|p| final_view.text_of(p))
            .collect();
        assert_eq!(text, vec!["kept added"]);
    }

    #[test]
    fn test_round_trip_comment_with_reply() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let p = tree.children(section)[0];
        let run = tree.append(p, Node::run("Check this")).unwrap();
        let mut overlay = Overlay::new();
        let mut comment = Comment::new(
            CommentAnchor::range(doc_model::TextRange::within(run, 0, 5)),
            "Ann",
            "Why?",
        );
        comment.add_reply(CommentReply::new("Bob", "Because"));
        OverlayOp::AddComment(comment).apply(&mut overlay).unwrap();

        let exported = super::super::writer::write(
            &DocumentSnapshot::new(tree, overlay),
            &ExportOptions::default(),
        )
        .unwrap();
        assert!(exported.report.has_code("overlay.replies.flattened"));
        let imported = read(&exported.bytes).unwrap();
        let comments = imported.document.overlay.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "Ann");
        assert_eq!(comments[0].body, "Why?\n\nBob replied: Because");
        assert_eq!(runs(&imported.document.tree).concat(), "Check this");
    }

    #[test]
    fn test_round_trip_image() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let p = tree.children(section)[0];
        tree.append(
            p,
            Node::image(ImageObject {
                content_type: "image/png".into(),
                data: vec![0x89, b'P', b'N', b'G'],
                width: 72.0,
                height: 36.0,
                alt_text: Some("Logo".into()),
            }),
        )
        .unwrap();
        let imported = round_trip(&DocumentSnapshot::from(tree));
        let loaded = &imported.document.tree;
        let image = loaded.nodes_of_kind(NodeKind::InlineObject)[0];
        match loaded.node(image).unwrap().data() {
            NodeData::InlineObject(image) => {
                assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);
                assert_eq!(image.width, 72.0);
                assert_eq!(image.height, 36.0);
                assert_eq!(image.alt_text.as_deref(), Some("Logo"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
