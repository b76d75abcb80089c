//! ODT package writer
//!
//! The body is written before `content.xml` is assembled: it decides the
//! automatic styles, the tracked change regions, the master pages and the
//! pictures that the other parts list.

use super::namespaces as ns;
use super::properties::{self, TableFamily};
use super::{DEFAULT_STYLE_META, MIMETYPE};
use crate::archive::ArchiveWriter;
use crate::view::{resolve_theme, ExportView, Mark, OverlaySupport, RunPiece};
use crate::xml::{fmt_num, format_date, ListNesting, XmlWriter};
use crate::{
    CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory, FidelityReport,
    Format, WarningSeverity,
};
use chrono::{DateTime, Utc};
use doc_model::{
    Field, FieldKind, Formatting, ImageObject, ListKind, Node, NodeData, NodeId, NodeKind,
    Property, PropertyScope, PropertyValue, SectionProperties, Style, StyleId, StyleType,
    MAX_LIST_LEVEL,
};
use std::collections::HashMap;

/// Letter page with one inch margins
const PAGE_LAYOUT: &str = "pm1";

pub fn write(document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
    let view = ExportView::new(document, options.view);
    let mut writer = OdtWriter {
        view: &view,
        pretty: options.pretty,
        report: FidelityReport::export(Format::Odt),
        auto: Vec::new(),
        regions: Vec::new(),
        region_counts: HashMap::new(),
        open_insertion: None,
        in_region: false,
        masters: Vec::new(),
        pictures: Vec::new(),
        tables: 0,
        theme_resolved: false,
    };
    let body = writer.body();
    writer.finish(body)
}

/// Master page and page number carried by the first block of a section
struct SectionStart {
    master: String,
    page_number: Option<u32>,
}

struct AutoStyle {
    name: String,
    family: &'static str,
    parent: Option<String>,
    formatting: Formatting,
    master: Option<String>,
    page_number: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionKind {
    Insertion,
    Deletion,
}

/// One `text:changed-region`
struct Region {
    id: String,
    kind: RegionKind,
    change: usize,
    /// Deleted content, already serialized
    body: String,
}

/// Blocks of one container as they are written
enum Item {
    Block(NodeId),
    /// Consecutive blocks removed by the same change
    Deleted(usize, Vec<NodeId>),
}

struct OdtWriter<'v, 'a> {
    view: &'v ExportView<'a>,
    pretty: bool,
    report: FidelityReport,
    auto: Vec<AutoStyle>,
    regions: Vec<Region>,
    /// Regions written so far per change, for unique region ids
    region_counts: HashMap<usize, usize>,
    /// Block insertion whose end marker is still to be written
    open_insertion: Option<(usize, String)>,
    /// Writing deleted content inside a region; change marks are not nested
    in_region: bool,
    /// Master page name with the section header and footer text
    masters: Vec<(String, Option<String>, Option<String>)>,
    pictures: Vec<(String, Vec<u8>)>,
    tables: usize,
    theme_resolved: bool,
}

fn odf_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Write text with ODF whitespace elements: a space at the start or after
/// another space becomes `text:s`, tabs `text:tab` and newlines
/// `text:line-break`.
fn write_spaced(w: &mut XmlWriter, text: &str) {
    fn flush(w: &mut XmlWriter, plain: &mut String, pending: &mut usize) {
        if !plain.is_empty() {
            w.text(plain);
            plain.clear();
        }
        match *pending {
            0 => {}
            1 => w.empty("text:s", &[]),
            n => w.empty("text:s", &[("text:c", n.to_string().as_str())]),
        }
        *pending = 0;
    }

    let mut plain = String::new();
    let mut pending = 0usize;
    let mut after_space = true;
    for ch in text.chars() {
        match ch {
            ' ' if after_space => pending += 1,
            ' ' => {
                plain.push(' ');
                after_space = true;
            }
            '\t' | '\n' => {
                flush(w, &mut plain, &mut pending);
                w.empty(if ch == '\t' { "text:tab" } else { "text:line-break" }, &[]);
                after_space = true;
            }
            c => {
                flush(w, &mut plain, &mut pending);
                plain.push(c);
                after_space = false;
            }
        }
    }
    flush(w, &mut plain, &mut pending);
}

fn family_name(style_type: StyleType) -> &'static str {
    match style_type {
        StyleType::Paragraph => "paragraph",
        StyleType::Character => "text",
        StyleType::Table => "table",
        StyleType::List => "list",
    }
}

impl<'v, 'a> OdtWriter<'v, 'a> {
    /// Replace theme references by the values they stand for
    fn concrete(&mut self, formatting: &Formatting) -> Formatting {
        let (resolved, replaced) = resolve_theme(self.view.tree().theme(), formatting);
        self.theme_resolved |= replaced;
        resolved
    }

    /// Name of the automatic style with these settings, added when new
    fn auto_style(
        &mut self,
        family: &'static str,
        prefix: &str,
        parent: Option<&StyleId>,
        formatting: Formatting,
        start: Option<SectionStart>,
    ) -> String {
        let parent = parent.map(|p| p.as_str().to_string());
        let (master, page_number) = match start {
            Some(s) => (Some(s.master), s.page_number),
            None => (None, None),
        };
        if let Some(existing) = self.auto.iter().find(|s| {
            s.family == family
                && s.parent == parent
                && s.formatting == formatting
                && s.master == master
                && s.page_number == page_number
        }) {
            return existing.name.clone();
        }
        let n = self.auto.iter().filter(|s| s.family == family).count() + 1;
        let name = format!("{prefix}{n}");
        self.auto.push(AutoStyle {
            name: name.clone(),
            family,
            parent,
            formatting,
            master,
            page_number,
        });
        name
    }

    /// Style name for an element: an automatic style when the node has
    /// direct formatting or starts a section, else its named style
    fn style_for(
        &mut self,
        node: &Node,
        family: &'static str,
        prefix: &str,
        start: Option<SectionStart>,
    ) -> Option<String> {
        let formatting = self.concrete(node.direct_formatting());
        if formatting.is_empty() && start.is_none() {
            return node.style_ref().map(|s| s.as_str().to_string());
        }
        Some(self.auto_style(family, prefix, node.style_ref(), formatting, start))
    }

    // =========================================================================
    // Body
    // =========================================================================

    fn body(&mut self) -> String {
        let view = self.view;
        let mut w = XmlWriter::bare(self.pretty);
        let sections = view.sections();
        for (i, &section) in sections.iter().enumerate() {
            let props = match view.node(section).map(Node::data) {
                Some(NodeData::Section(props)) => props.clone(),
                _ => SectionProperties::default(),
            };
            let master = format!("Section{}", i + 1);
            self.masters
                .push((master.clone(), props.header.clone(), props.footer.clone()));
            let mut start = Some(SectionStart {
                master,
                page_number: props.page_number_start,
            });
            let blocks = view.children(section);
            self.blocks(&mut w, &blocks, &mut start);
            if let Some(start) = start.take() {
                let style = self.auto_style("paragraph", "P", None, Formatting::new(), Some(start));
                w.empty("text:p", &[("text:style-name", style.as_str())]);
            }
        }
        if sections.is_empty() {
            self.masters.push(("Section1".into(), None, None));
            let start = SectionStart {
                master: "Section1".into(),
                page_number: None,
            };
            let style = self.auto_style("paragraph", "P", None, Formatting::new(), Some(start));
            w.empty("text:p", &[("text:style-name", style.as_str())]);
        }
        w.finish()
    }

    fn plan(&self, ids: &[NodeId]) -> Vec<Item> {
        let mut plan: Vec<Item> = Vec::new();
        for &id in ids {
            let deleted = if self.in_region {
                None
            } else {
                self.view.mark(id).filter(|m| m.mark == Mark::Deleted)
            };
            match (deleted, plan.last_mut()) {
                (Some(m), Some(Item::Deleted(index, group))) if *index == m.index => group.push(id),
                (Some(m), _) => plan.push(Item::Deleted(m.index, vec![id])),
                (None, _) => plan.push(Item::Block(id)),
            }
        }
        plan
    }

    /// Change index of a paragraph inserted as a whole
    fn inserted_paragraph(&self, item: Option<&Item>) -> Option<usize> {
        match item {
            Some(Item::Block(id)) if !self.in_region && self.view.kind(*id) == Some(NodeKind::Paragraph) => self
                .view
                .mark(*id)
                .filter(|m| m.mark == Mark::Inserted)
                .map(|m| m.index),
            _ => None,
        }
    }

    fn blocks(&mut self, w: &mut XmlWriter, ids: &[NodeId], start: &mut Option<SectionStart>) {
        let plan = self.plan(ids);
        let mut lists = ListNesting::new("text:list-item");
        for (i, item) in plan.iter().enumerate() {
            match item {
                Item::Block(id) => match self.view.kind(*id) {
                    Some(NodeKind::Paragraph) => {
                        match self.view.list_membership(*id) {
                            Some((list, level)) => lists.item(w, &list, level, |w, outermost| {
                                if outermost {
                                    w.open("text:list", &[("text:style-name", list.as_str())]);
                                } else {
                                    w.open("text:list", &[]);
                                }
                            }),
                            None => lists.close(w),
                        }
                        let previous = i.checked_sub(1).and_then(|p| plan.get(p));
                        let previous_is_paragraph = matches!(previous, Some(Item::Block(p))
                            if self.view.kind(*p) == Some(NodeKind::Paragraph));
                        let own = self.inserted_paragraph(Some(item));
                        let next = self.inserted_paragraph(plan.get(i + 1));
                        let edges = Edges {
                            start_here: own.filter(|_| !previous_is_paragraph),
                            close: own.filter(|k| next != Some(*k)),
                            start_next: next.filter(|k| own != Some(*k)),
                        };
                        self.paragraph(w, *id, start.take(), edges);
                    }
                    Some(NodeKind::Table) => {
                        lists.close(w);
                        self.table(w, *id, start.take());
                    }
                    _ => {}
                },
                Item::Deleted(change, group) => {
                    lists.close(w);
                    self.deleted_blocks(w, *change, group, start.take());
                }
            }
        }
        lists.close(w);
    }

    fn new_region(&mut self, change: usize, kind: RegionKind, body: String) -> String {
        let count = self.region_counts.entry(change).or_insert(0);
        *count += 1;
        let id = if *count == 1 {
            format!("ct{}", change + 1)
        } else {
            format!("ct{}.{}", change + 1, count)
        };
        self.regions.push(Region {
            id: id.clone(),
            kind,
            change,
            body,
        });
        id
    }

    fn set_region_body(&mut self, id: &str, body: String) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.id == id) {
            region.body = body;
        }
    }

    /// Deleted blocks: an empty host paragraph pointing at a region that
    /// holds the blocks
    fn deleted_blocks(
        &mut self,
        w: &mut XmlWriter,
        change: usize,
        group: &[NodeId],
        start: Option<SectionStart>,
    ) {
        let region = self.new_region(change, RegionKind::Deletion, String::new());
        let style = start.map(|s| self.auto_style("paragraph", "P", None, Formatting::new(), Some(s)));
        let attrs: Vec<(&str, &str)> = style
            .as_deref()
            .map(|s| vec![("text:style-name", s)])
            .unwrap_or_default();
        w.open_mixed("text:p", &attrs);
        w.empty("text:change", &[("text:change-id", region.as_str())]);
        w.close();

        let mut inner = XmlWriter::bare(false);
        let was = std::mem::replace(&mut self.in_region, true);
        self.blocks(&mut inner, group, &mut None);
        self.in_region = was;
        inner.empty("text:p", &[]);
        self.set_region_body(&region, inner.finish());
    }

    fn paragraph(&mut self, w: &mut XmlWriter, id: NodeId, start: Option<SectionStart>, edges: Edges) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        let style = self.style_for(node, "paragraph", "P", start);
        let heading = view.resolve(id).ok().and_then(|f| match f.get(Property::OutlineLevel) {
            PropertyValue::Level(level) if *level > 0 => Some(level.to_string()),
            _ => None,
        });
        let mut attrs: Vec<(&str, &str)> = Vec::new();
        if let Some(style) = &style {
            attrs.push(("text:style-name", style.as_str()));
        }
        let tag = match &heading {
            Some(level) => {
                attrs.push(("text:outline-level", level.as_str()));
                "text:h"
            }
            None => "text:p",
        };
        w.open_mixed(tag, &attrs);

        if let Some(change) = edges.start_here {
            let region = self.new_region(change, RegionKind::Insertion, String::new());
            w.empty("text:change-start", &[("text:change-id", region.as_str())]);
            self.open_insertion = Some((change, region));
        }
        for &comment in view.paragraph_comment_starts(id) {
            self.annotation(w, comment);
        }
        self.inline_children(w, id);
        for &comment in view.paragraph_comment_ends(id) {
            annotation_end(w, comment);
        }
        if let Some(change) = edges.close {
            if let Some((_, region)) = self.open_insertion.take().filter(|(c, _)| *c == change) {
                w.empty("text:change-end", &[("text:change-id", region.as_str())]);
            }
        }
        if let Some(change) = edges.start_next {
            let region = self.new_region(change, RegionKind::Insertion, String::new());
            w.empty("text:change-start", &[("text:change-id", region.as_str())]);
            self.open_insertion = Some((change, region));
        }
        w.close();
    }

    /// Inline children, with runs of nodes inserted or deleted by the same
    /// change wrapped in one change range
    fn inline_children(&mut self, w: &mut XmlWriter, paragraph: NodeId) {
        let view = self.view;
        let block_change = view.mark(paragraph).map(|m| m.index);
        let in_region = self.in_region;
        let own_mark = |id: NodeId| {
            if in_region {
                return None;
            }
            view.mark_on(id).filter(|m| Some(m.index) != block_change)
        };
        let children = view.children(paragraph);
        let mut i = 0;
        while i < children.len() {
            let Some(mark) = own_mark(children[i]) else {
                self.inline(w, children[i]);
                i += 1;
                continue;
            };
            let mut j = i + 1;
            while j < children.len() && own_mark(children[j]).map(|m| m.index) == Some(mark.index) {
                j += 1;
            }
            let group = &children[i..j];
            match mark.mark {
                Mark::Inserted => {
                    let region = self.new_region(mark.index, RegionKind::Insertion, String::new());
                    w.empty("text:change-start", &[("text:change-id", region.as_str())]);
                    for &child in group {
                        self.inline(w, child);
                    }
                    w.empty("text:change-end", &[("text:change-id", region.as_str())]);
                }
                Mark::Deleted => {
                    let region = self.new_region(mark.index, RegionKind::Deletion, String::new());
                    w.empty("text:change", &[("text:change-id", region.as_str())]);
                    let mut inner = XmlWriter::bare(false);
                    inner.open_mixed("text:p", &[]);
                    let was = std::mem::replace(&mut self.in_region, true);
                    for &child in group {
                        self.inline(&mut inner, child);
                    }
                    self.in_region = was;
                    inner.close();
                    self.set_region_body(&region, inner.finish());
                }
            }
            i = j;
        }
    }

    fn inline(&mut self, w: &mut XmlWriter, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        match node.data() {
            NodeData::Run { .. } => {
                let style = self.style_for(node, "text", "T", None);
                for piece in view.run_pieces(id) {
                    match piece {
                        RunPiece::Text(text) => match &style {
                            Some(style) => {
                                w.open_mixed("text:span", &[("text:style-name", style.as_str())]);
                                write_spaced(w, &text);
                                w.close();
                            }
                            None => write_spaced(w, &text),
                        },
                        RunPiece::CommentStart(i) => self.annotation(w, i),
                        RunPiece::CommentEnd(i) => annotation_end(w, i),
                    }
                }
            }
            NodeData::FieldReference(field) => {
                let style = self.style_for(node, "text", "T", None);
                if let Some(style) = &style {
                    w.open_mixed("text:span", &[("text:style-name", style.as_str())]);
                }
                write_field(w, field);
                if style.is_some() {
                    w.close();
                }
            }
            NodeData::Bookmark { name } => w.empty("text:bookmark", &[("text:name", name.as_str())]),
            NodeData::InlineObject(image) => self.frame(w, image),
            _ => {}
        }
    }

    fn frame(&mut self, w: &mut XmlWriter, image: &ImageObject) {
        let n = self.pictures.len() + 1;
        let path = format!("Pictures/image{n}.{}", image.extension());
        self.pictures.push((path.clone(), image.data.clone()));
        let (width, height) = (
            format!("{}pt", fmt_num(image.width)),
            format!("{}pt", fmt_num(image.height)),
        );
        let name = format!("Image{n}");
        w.open(
            "draw:frame",
            &[
                ("draw:name", name.as_str()),
                ("text:anchor-type", "as-char"),
                ("svg:width", width.as_str()),
                ("svg:height", height.as_str()),
            ],
        );
        w.empty(
            "draw:image",
            &[
                ("xlink:href", path.as_str()),
                ("xlink:type", "simple"),
                ("xlink:show", "embed"),
                ("xlink:actuate", "onLoad"),
            ],
        );
        if let Some(alt) = &image.alt_text {
            w.leaf("svg:desc", &[], alt);
        }
        w.close();
    }

    /// `office:annotation` for comment `index`; replies are folded into
    /// the body
    fn annotation(&mut self, w: &mut XmlWriter, index: usize) {
        let Some(comment) = self.view.comments().get(index).copied() else {
            return;
        };
        let name = format!("__Annotation__{index}");
        let mut attrs = vec![("office:name", name.as_str())];
        if comment.resolved {
            attrs.push(("loext:resolved", "true"));
        }
        w.open("office:annotation", &attrs);
        w.leaf("dc:creator", &[], &comment.author);
        w.leaf("dc:date", &[], &odf_date(&comment.created));
        let mut body = comment.body.clone();
        for reply in &comment.replies {
            body.push_str(&format!("\n\n{} replied: {}", reply.author, reply.body));
        }
        for line in body.split('\n') {
            w.open_mixed("text:p", &[]);
            write_spaced(w, line);
            w.close();
        }
        w.close();
    }

    // =========================================================================
    // Tables
    // =========================================================================

    fn table(&mut self, w: &mut XmlWriter, id: NodeId, start: Option<SectionStart>) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        self.tables += 1;
        let name = format!("Table{}", self.tables);
        let style = self.style_for(node, "table", "ta", start);
        let mut attrs = vec![("table:name", name.as_str())];
        if let Some(style) = &style {
            attrs.push(("table:style-name", style.as_str()));
        }
        w.open("table:table", &attrs);

        let rows = view.children(id);
        let columns = rows
            .iter()
            .map(|r| view.children(*r).len())
            .max()
            .unwrap_or(0)
            .max(1);
        w.empty(
            "table:table-column",
            &[("table:number-columns-repeated", columns.to_string().as_str())],
        );
        for row in rows {
            self.row(w, row);
        }
        w.close();
    }

    fn row(&mut self, w: &mut XmlWriter, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        let cells = view.children(id);
        if !self.in_region && std::iter::once(id).chain(cells.iter().copied()).any(|n| view.mark_on(n).is_some()) {
            self.report.warn(
                "odt.tables.changes",
                FeatureCategory::TrackChanges,
                WarningSeverity::Moderate,
                "Inserted or deleted table rows and cells written as plain rows",
            );
        }
        let style = self.style_for(node, "table-row", "ro", None);
        let attrs: Vec<(&str, &str)> = style
            .as_deref()
            .map(|s| vec![("table:style-name", s)])
            .unwrap_or_default();
        w.open("table:table-row", &attrs);
        for cell in cells {
            let Some(cell_node) = view.node(cell) else {
                continue;
            };
            let style = self.style_for(cell_node, "table-cell", "ce", None);
            let mut attrs = vec![("office:value-type", "string")];
            if let Some(style) = &style {
                attrs.insert(0, ("table:style-name", style.as_str()));
            }
            w.open("table:table-cell", &attrs);
            let blocks = view.children(cell);
            self.blocks(w, &blocks, &mut None);
            if blocks.is_empty() {
                w.empty("text:p", &[]);
            }
            w.close();
        }
        w.close();
    }

    // =========================================================================
    // Parts
    // =========================================================================

    fn automatic_styles(&self, w: &mut XmlWriter) {
        w.open("office:automatic-styles", &[]);
        for style in &self.auto {
            let mut attrs = vec![("style:name", style.name.as_str()), ("style:family", style.family)];
            if let Some(parent) = &style.parent {
                attrs.push(("style:parent-style-name", parent.as_str()));
            }
            if let Some(master) = &style.master {
                attrs.push(("style:master-page-name", master.as_str()));
            }
            let level = properties::outline_level(&style.formatting);
            if let Some(level) = &level {
                attrs.push(("style:default-outline-level", level.as_str()));
            }
            w.open("style:style", &attrs);
            match style.family {
                "paragraph" => {
                    properties::write_paragraph(w, &style.formatting, style.page_number);
                    properties::write_text(w, &style.formatting);
                }
                "text" => properties::write_text(w, &style.formatting),
                "table" => properties::write_table(w, &style.formatting, TableFamily::Table, style.page_number),
                "table-row" => properties::write_table(w, &style.formatting, TableFamily::Row, None),
                _ => properties::write_table(w, &style.formatting, TableFamily::Cell, None),
            }
            w.close();
        }
        w.close();
    }

    fn content(&self, body: &str) -> String {
        let mut w = XmlWriter::new(self.pretty);
        w.open(
            "office:document-content",
            &[
                ("xmlns:office", ns::OFFICE),
                ("xmlns:style", ns::STYLE),
                ("xmlns:text", ns::TEXT),
                ("xmlns:table", ns::TABLE),
                ("xmlns:draw", ns::DRAW),
                ("xmlns:fo", ns::FO),
                ("xmlns:xlink", ns::XLINK),
                ("xmlns:dc", ns::DC),
                ("xmlns:svg", ns::SVG),
                ("xmlns:loext", ns::LOEXT),
                ("office:version", "1.2"),
            ],
        );
        self.automatic_styles(&mut w);
        w.open("office:body", &[]);
        w.open("office:text", &[]);
        if !self.regions.is_empty() {
            w.open("text:tracked-changes", &[]);
            for region in &self.regions {
                let Some(change) = self.view.change(region.change) else {
                    continue;
                };
                w.open("text:changed-region", &[("text:id", region.id.as_str())]);
                w.open(
                    match region.kind {
                        RegionKind::Insertion => "text:insertion",
                        RegionKind::Deletion => "text:deletion",
                    },
                    &[],
                );
                w.open("office:change-info", &[]);
                w.leaf("dc:creator", &[], &change.author);
                w.leaf("dc:date", &[], &odf_date(&change.timestamp));
                w.close();
                w.raw(&region.body);
                w.close();
                w.close();
            }
            w.close();
        }
        w.raw(body);
        w.close();
        w.close();
        w.close();
        w.finish()
    }

    fn styles(&mut self) -> String {
        let view = self.view;
        let tree = view.tree();
        let mut w = XmlWriter::new(self.pretty);
        w.open(
            "office:document-styles",
            &[
                ("xmlns:office", ns::OFFICE),
                ("xmlns:style", ns::STYLE),
                ("xmlns:text", ns::TEXT),
                ("xmlns:table", ns::TABLE),
                ("xmlns:fo", ns::FO),
                ("office:version", "1.2"),
            ],
        );
        w.open("office:styles", &[]);

        let defaults = self.concrete(&tree.defaults().overrides());
        w.open("style:default-style", &[("style:family", "paragraph")]);
        properties::write_paragraph(&mut w, &defaults, None);
        properties::write_text(&mut w, &defaults);
        w.close();
        if properties::has_scope(&defaults, PropertyScope::Table) {
            w.open("style:default-style", &[("style:family", "table-cell")]);
            properties::write_table(&mut w, &defaults, TableFamily::Cell, None);
            w.close();
        }

        let mut styles: Vec<_> = tree.styles().iter().collect();
        styles.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        for style in styles {
            let formatting = self.concrete(&style.properties);
            let mut attrs = vec![
                ("style:name", style.id.as_str()),
                ("style:display-name", style.name.as_str()),
            ];
            if style.style_type == StyleType::List {
                w.open("text:list-style", &attrs);
                write_list_levels(&mut w, style);
                w.close();
                continue;
            }
            attrs.push(("style:family", family_name(style.style_type)));
            if let Some(base) = &style.based_on {
                attrs.push(("style:parent-style-name", base.as_str()));
            }
            if let Some(next) = &style.next_style {
                attrs.push(("style:next-style-name", next.as_str()));
            }
            let level = properties::outline_level(&formatting);
            if let Some(level) = &level {
                attrs.push(("style:default-outline-level", level.as_str()));
            }
            if let Some(list) = formatting.get(Property::ListStyle).and_then(PropertyValue::as_list_ref) {
                attrs.push(("style:list-style-name", list.as_str()));
            }
            let list_level = match formatting.get(Property::ListLevel) {
                Some(PropertyValue::Level(l)) => Some((l + 1).to_string()),
                _ => None,
            };
            if let Some(list_level) = &list_level {
                attrs.push(("style:list-level", list_level.as_str()));
            }
            w.open("style:style", &attrs);
            match style.style_type {
                StyleType::Paragraph => {
                    properties::write_paragraph(&mut w, &formatting, None);
                    properties::write_text(&mut w, &formatting);
                }
                StyleType::Character => properties::write_text(&mut w, &formatting),
                _ => properties::write_table(&mut w, &formatting, TableFamily::Table, None),
            }
            w.close();
        }
        w.close();

        w.open("office:automatic-styles", &[]);
        w.open("style:page-layout", &[("style:name", PAGE_LAYOUT)]);
        w.empty(
            "style:page-layout-properties",
            &[
                ("fo:page-width", "8.5in"),
                ("fo:page-height", "11in"),
                ("fo:margin-top", "1in"),
                ("fo:margin-bottom", "1in"),
                ("fo:margin-left", "1in"),
                ("fo:margin-right", "1in"),
            ],
        );
        w.close();
        w.close();

        w.open("office:master-styles", &[]);
        for (name, header, footer) in &self.masters {
            w.open(
                "style:master-page",
                &[("style:name", name.as_str()), ("style:page-layout-name", PAGE_LAYOUT)],
            );
            for (tag, text) in [("style:header", header), ("style:footer", footer)] {
                let Some(text) = text else {
                    continue;
                };
                w.open(tag, &[]);
                for line in text.split('\n') {
                    w.open_mixed("text:p", &[]);
                    write_spaced(&mut w, line);
                    w.close();
                }
                w.close();
            }
            w.close();
        }
        w.close();
        w.close();
        w.finish()
    }

    fn meta(&self) -> String {
        let view = self.view;
        let tree = view.tree();
        let meta = tree.metadata();
        let mut w = XmlWriter::new(self.pretty);
        w.open(
            "office:document-meta",
            &[
                ("xmlns:office", ns::OFFICE),
                ("xmlns:meta", ns::META),
                ("xmlns:dc", ns::DC),
                ("office:version", "1.2"),
            ],
        );
        w.open("office:meta", &[]);
        w.leaf("meta:generator", &[], concat!("wordtool/", env!("CARGO_PKG_VERSION")));
        if let Some(title) = &meta.title {
            w.leaf("dc:title", &[], title);
        }
        if let Some(subject) = &meta.subject {
            w.leaf("dc:subject", &[], subject);
        }
        if let Some(author) = &meta.author {
            w.leaf("meta:initial-creator", &[], author);
        }
        for keyword in &meta.keywords {
            w.leaf("meta:keyword", &[], keyword);
        }
        if let Some(created) = &meta.created {
            w.leaf("meta:creation-date", &[], &format_date(created));
        }
        if let Some(modified) = &meta.modified {
            w.leaf("dc:date", &[], &format_date(modified));
        }
        if let Some(style) = tree.styles().default_paragraph_style() {
            w.leaf(
                "meta:user-defined",
                &[("meta:name", DEFAULT_STYLE_META), ("meta:value-type", "string")],
                style.as_str(),
            );
        }
        w.close();
        w.close();
        w.finish()
    }

    fn manifest(&self) -> String {
        let mut w = XmlWriter::new(self.pretty);
        w.open(
            "manifest:manifest",
            &[("xmlns:manifest", ns::MANIFEST), ("manifest:version", "1.2")],
        );
        w.empty(
            "manifest:file-entry",
            &[
                ("manifest:full-path", "/"),
                ("manifest:version", "1.2"),
                ("manifest:media-type", MIMETYPE),
            ],
        );
        for part in ["content.xml", "styles.xml", "meta.xml"] {
            w.empty(
                "manifest:file-entry",
                &[("manifest:full-path", part), ("manifest:media-type", "text/xml")],
            );
        }
        for (path, _) in &self.pictures {
            let extension = path.rsplit('.').next().unwrap_or_default();
            w.empty(
                "manifest:file-entry",
                &[
                    ("manifest:full-path", path.as_str()),
                    ("manifest:media-type", ImageObject::content_type_for_extension(extension)),
                ],
            );
        }
        w.close();
        w.finish()
    }

    fn finish(mut self, body: String) -> CodecResult<Exported> {
        let styles = self.styles();
        let content = self.content(&body);
        let meta = self.meta();
        let manifest = self.manifest();
        if self.theme_resolved {
            self.report.warn(
                "odt.theme.resolved",
                FeatureCategory::Theme,
                WarningSeverity::Minor,
                "Theme fonts and colors written as fixed values",
            );
        }

        let mut zip = ArchiveWriter::new();
        // The mimetype entry comes first and uncompressed
        zip.add_stored("mimetype", MIMETYPE.as_bytes())?;
        zip.add("META-INF/manifest.xml", manifest.as_bytes())?;
        zip.add("content.xml", content.as_bytes())?;
        zip.add("styles.xml", styles.as_bytes())?;
        zip.add("meta.xml", meta.as_bytes())?;
        for (path, data) in &self.pictures {
            zip.add_stored(path, data)?;
        }

        self.view.report_overlay_loss(
            &mut self.report,
            OverlaySupport {
                changes: true,
                format_changes: false,
                comments: true,
                replies: false,
            },
        );
        tracing::debug!(
            regions = self.regions.len(),
            pictures = self.pictures.len(),
            "Wrote ODT package"
        );
        Ok(Exported {
            bytes: zip.finish()?,
            report: self.report,
        })
    }
}

/// Where block insertion markers go around one paragraph
#[derive(Debug, Clone, Copy, Default)]
struct Edges {
    /// Open the paragraph's own insertion at its start
    start_here: Option<usize>,
    /// Close the open insertion at the end
    close: Option<usize>,
    /// Open the next paragraph's insertion at the end
    start_next: Option<usize>,
}

/// One level style per nesting level of a list style
fn write_list_levels(w: &mut XmlWriter, style: &Style) {
    let kind = style.list_kind();
    for level in 0..=MAX_LIST_LEVEL {
        let number = (level + 1).to_string();
        let indent = format!("{}in", fmt_num(0.5 * f32::from(level + 1)));
        match kind {
            ListKind::Bullet => {
                let bullet = ListKind::bullet(level).to_string();
                w.open(
                    "text:list-level-style-bullet",
                    &[("text:level", number.as_str()), ("text:bullet-char", bullet.as_str())],
                );
            }
            _ => {
                let format = match kind {
                    ListKind::LowerAlpha => "a",
                    ListKind::UpperAlpha => "A",
                    ListKind::LowerRoman => "i",
                    ListKind::UpperRoman => "I",
                    _ => "1",
                };
                w.open(
                    "text:list-level-style-number",
                    &[
                        ("text:level", number.as_str()),
                        ("style:num-format", format),
                        ("style:num-suffix", "."),
                    ],
                );
            }
        }
        w.empty(
            "style:list-level-properties",
            &[("text:space-before", indent.as_str()), ("text:min-label-width", "0.25in")],
        );
        w.close();
    }
}

fn annotation_end(w: &mut XmlWriter, index: usize) {
    let name = format!("__Annotation__{index}");
    w.empty("office:annotation-end", &[("office:name", name.as_str())]);
}

fn write_field(w: &mut XmlWriter, field: &Field) {
    let result = field.result.as_str();
    match &field.kind {
        FieldKind::Page => w.leaf("text:page-number", &[("text:select-page", "current")], result),
        FieldKind::NumPages => w.leaf("text:page-count", &[], result),
        FieldKind::Date => w.leaf("text:date", &[], result),
        FieldKind::Ref(name) => w.leaf(
            "text:bookmark-ref",
            &[("text:reference-format", "text"), ("text:ref-name", name.as_str())],
            result,
        ),
        FieldKind::Other(instruction) => w.leaf(
            "text:text-input",
            &[("text:description", instruction.as_str())],
            result,
        ),
    }
}
