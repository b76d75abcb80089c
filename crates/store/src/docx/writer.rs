//! DOCX package writer
//!
//! The body is written first because it decides which media, header and
//! footer parts exist; the package is assembled afterwards.

use super::namespaces as ns;
use super::numbering::{self, Numbering};
use super::package::{ContentTypes, Relationships};
use super::parts;
use super::properties::{self, TableLevel};
use super::{content_type_values as ct, relationship_types as rel};
use crate::archive::ArchiveWriter;
use crate::view::{ChangeMark, ExportView, Mark, OverlaySupport, RunPiece};
use crate::xml::{format_date, XmlWriter};
use crate::{
    CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory, FidelityReport,
    Format, WarningSeverity,
};
use doc_model::{Field, Formatting, ImageObject, Node, NodeData, NodeId, NodeKind, SectionProperties};
use revisions::{ChangeKind, TrackedChange};

const EMU_PER_POINT: f32 = 12_700.0;
/// Letter page with one inch margins, in twips
const PAGE_WIDTH: u32 = 12_240;
const PAGE_HEIGHT: u32 = 15_840;
const PAGE_MARGIN: u32 = 1_440;

pub fn write(document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
    let view = ExportView::new(document, options.view);
    let numbering = Numbering::for_tree(view.tree());
    let mut writer = PackageWriter {
        view: &view,
        numbering: &numbering,
        pretty: options.pretty,
        rels: Relationships::new(),
        types: ContentTypes::new(),
        parts: Vec::new(),
        media: Vec::new(),
        report: FidelityReport::export(Format::Docx),
        bookmarks: 0,
        drawings: 0,
        headers: 0,
        footers: 0,
    };
    let body = writer.document();
    writer.finish(body)
}

struct PackageWriter<'v, 'a> {
    view: &'v ExportView<'a>,
    /// `w:numId` of every list style
    numbering: &'v Numbering,
    pretty: bool,
    /// Relationships of the main document part
    rels: Relationships,
    types: ContentTypes,
    /// Generated XML parts by package path
    parts: Vec<(String, String)>,
    media: Vec<(String, Vec<u8>)>,
    report: FidelityReport,
    bookmarks: usize,
    drawings: usize,
    headers: usize,
    footers: usize,
}

fn change_attrs(index: usize, change: &TrackedChange) -> [(&'static str, String); 3] {
    [
        ("w:id", index.to_string()),
        ("w:author", change.author.clone()),
        ("w:date", format_date(&change.timestamp)),
    ]
}

fn attr_refs<'s>(attrs: &'s [(&'static str, String)]) -> Vec<(&'static str, &'s str)> {
    attrs.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

fn emu(points: f32) -> String {
    ((points * EMU_PER_POINT).round().max(0.0) as i64).to_string()
}

impl<'v, 'a> PackageWriter<'v, 'a> {
    // =========================================================================
    // Main document part
    // =========================================================================

    fn document(&mut self) -> String {
        let view = self.view;
        let mut w = XmlWriter::new(self.pretty);
        w.open(
            "w:document",
            &[
                ("xmlns:w", ns::W),
                ("xmlns:r", ns::R),
                ("xmlns:wp", ns::WP),
                ("xmlns:a", ns::A),
                ("xmlns:pic", ns::PIC),
                ("xmlns:w14", ns::W14),
            ],
        );
        w.open("w:body", &[]);

        let sections = view.sections();
        for (i, &section) in sections.iter().enumerate() {
            let last = i + 1 == sections.len();
            let props = match view.node(section).map(Node::data) {
                Some(NodeData::Section(props)) => props.clone(),
                _ => SectionProperties::default(),
            };
            let blocks = view.children(section);
            let carried = !last && blocks.last().and_then(|b| view.kind(*b)) == Some(NodeKind::Paragraph);
            for (j, &block) in blocks.iter().enumerate() {
                let sect = (carried && j + 1 == blocks.len()).then_some(&props);
                self.block(&mut w, block, sect);
            }
            if last {
                self.section_properties(&mut w, &props);
            } else if !carried {
                w.open("w:p", &[]);
                w.open("w:pPr", &[]);
                self.section_properties(&mut w, &props);
                w.close();
                w.close();
            }
        }
        if sections.is_empty() {
            w.empty("w:p", &[]);
            self.section_properties(&mut w, &SectionProperties::default());
        }
        w.close();
        w.close();
        w.finish()
    }

    fn block(&mut self, w: &mut XmlWriter, id: NodeId, sect: Option<&SectionProperties>) {
        match self.view.kind(id) {
            Some(NodeKind::Paragraph) => self.paragraph(w, id, sect),
            Some(NodeKind::Table) => self.table(w, id),
            _ => {}
        }
    }

    fn section_properties(&mut self, w: &mut XmlWriter, props: &SectionProperties) {
        w.open("w:sectPr", &[]);
        if let Some(text) = &props.header {
            let id = self.header_footer(true, text);
            w.empty("w:headerReference", &[("w:type", "default"), ("r:id", id.as_str())]);
        }
        if let Some(text) = &props.footer {
            let id = self.header_footer(false, text);
            w.empty("w:footerReference", &[("w:type", "default"), ("r:id", id.as_str())]);
        }
        let (width, height, margin) = (
            PAGE_WIDTH.to_string(),
            PAGE_HEIGHT.to_string(),
            PAGE_MARGIN.to_string(),
        );
        w.empty("w:pgSz", &[("w:w", width.as_str()), ("w:h", height.as_str())]);
        w.empty(
            "w:pgMar",
            &[
                ("w:top", margin.as_str()),
                ("w:right", margin.as_str()),
                ("w:bottom", margin.as_str()),
                ("w:left", margin.as_str()),
                ("w:header", "720"),
                ("w:footer", "720"),
                ("w:gutter", "0"),
            ],
        );
        if let Some(start) = props.page_number_start {
            w.empty("w:pgNumType", &[("w:start", start.to_string().as_str())]);
        }
        w.close();
    }

    /// Add a header or footer part and return its relationship id
    fn header_footer(&mut self, header: bool, text: &str) -> String {
        let (name, tag, content_type, rel_type) = if header {
            self.headers += 1;
            (format!("header{}.xml", self.headers), "w:hdr", ct::HEADER, rel::HEADER)
        } else {
            self.footers += 1;
            (format!("footer{}.xml", self.footers), "w:ftr", ct::FOOTER, rel::FOOTER)
        };
        let path = format!("word/{name}");
        self.types.add_override(&path, content_type);
        self.parts
            .push((path, parts::write_header_footer(tag, text, self.pretty)));
        self.rels.add(rel_type, &name)
    }

    // =========================================================================
    // Paragraphs and inline content
    // =========================================================================

    fn paragraph(&mut self, w: &mut XmlWriter, id: NodeId, sect: Option<&SectionProperties>) {
        let (view, numbering) = (self.view, self.numbering);
        let Some(node) = view.node(id) else {
            return;
        };
        let formatting = node.direct_formatting();
        let mark = view.mark(id);
        let changes = view.format_changes(id);

        w.open("w:p", &[]);
        if node.style_ref().is_some()
            || properties::has_paragraph(formatting)
            || mark.is_some()
            || sect.is_some()
            || !changes.is_empty()
        {
            w.open("w:pPr", &[]);
            if let Some(style) = node.style_ref() {
                w.empty("w:pStyle", &[("w:val", style.as_str())]);
            }
            properties::write_paragraph(w, formatting, numbering);
            if let Some(mark) = mark {
                w.open("w:rPr", &[]);
                let tag = if mark.mark == Mark::Inserted { "w:ins" } else { "w:del" };
                w.empty(tag, &attr_refs(&change_attrs(mark.index, mark.change)));
                w.close();
            }
            if let Some(sect) = sect {
                self.section_properties(w, sect);
            }
            self.property_change(w, "w:pPrChange", "w:pPr", formatting, &changes, |w, f| {
                properties::write_paragraph(w, f, numbering)
            });
            w.close();
        }

        for &comment in view.paragraph_comment_starts(id) {
            w.empty("w:commentRangeStart", &[("w:id", comment.to_string().as_str())]);
        }
        for child in view.children(id) {
            self.inline(w, child);
        }
        for &comment in view.paragraph_comment_ends(id) {
            comment_end(w, comment);
        }
        w.close();
    }

    fn inline(&mut self, w: &mut XmlWriter, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        let mark = view.mark(id);
        if let Some(mark) = &mark {
            let tag = if mark.mark == Mark::Inserted { "w:ins" } else { "w:del" };
            w.open(tag, &attr_refs(&change_attrs(mark.index, mark.change)));
        }
        let deleted = mark.is_some_and(|m: ChangeMark<'_>| m.mark == Mark::Deleted);
        match node.data() {
            NodeData::Run { .. } => {
                let changes = view.format_changes(id);
                for piece in view.run_pieces(id) {
                    match piece {
                        RunPiece::Text(text) => {
                            w.open("w:r", &[]);
                            self.run_properties(w, node, &changes);
                            run_text(w, &text, deleted);
                            w.close();
                        }
                        RunPiece::CommentStart(i) => {
                            w.empty("w:commentRangeStart", &[("w:id", i.to_string().as_str())]);
                        }
                        RunPiece::CommentEnd(i) => comment_end(w, i),
                    }
                }
            }
            NodeData::FieldReference(field) => self.field(w, id, node, field, deleted),
            NodeData::Bookmark { name } => {
                let bookmark = self.bookmarks.to_string();
                self.bookmarks += 1;
                w.empty(
                    "w:bookmarkStart",
                    &[("w:id", bookmark.as_str()), ("w:name", name.as_str())],
                );
                w.empty("w:bookmarkEnd", &[("w:id", bookmark.as_str())]);
            }
            NodeData::InlineObject(image) => self.image(w, image),
            _ => {}
        }
        if mark.is_some() {
            w.close();
        }
    }

    fn run_properties(&mut self, w: &mut XmlWriter, node: &Node, changes: &[(usize, &TrackedChange)]) {
        let formatting = node.direct_formatting();
        if node.style_ref().is_none() && !properties::has_run(formatting) && changes.is_empty() {
            return;
        }
        w.open("w:rPr", &[]);
        if let Some(style) = node.style_ref() {
            w.empty("w:rStyle", &[("w:val", style.as_str())]);
        }
        properties::write_run(w, formatting);
        self.property_change(w, "w:rPrChange", "w:rPr", formatting, changes, properties::write_run);
        w.close();
    }

    fn field(&mut self, w: &mut XmlWriter, id: NodeId, node: &Node, field: &Field, deleted: bool) {
        let changes = self.view.format_changes(id);
        let instruction = format!(" {} ", field.kind.instruction());
        w.open("w:fldSimple", &[("w:instr", instruction.as_str())]);
        w.open("w:r", &[]);
        self.run_properties(w, node, &changes);
        run_text(w, &field.result, deleted);
        w.close();
        w.close();
    }

    fn image(&mut self, w: &mut XmlWriter, image: &ImageObject) {
        self.drawings += 1;
        let n = self.drawings;
        let extension = image.extension();
        let target = format!("media/image{n}.{extension}");
        let embed = self.rels.add(rel::IMAGE, &target);
        self.types
            .add_default(extension, ImageObject::content_type_for_extension(extension));
        self.media.push((format!("word/{target}"), image.data.clone()));

        let (cx, cy) = (emu(image.width), emu(image.height));
        let id = n.to_string();
        let name = format!("Picture {n}");
        let descr = image.alt_text.clone().unwrap_or_default();

        w.open("w:r", &[]);
        w.open("w:drawing", &[]);
        w.open(
            "wp:inline",
            &[("distT", "0"), ("distB", "0"), ("distL", "0"), ("distR", "0")],
        );
        w.empty("wp:extent", &[("cx", cx.as_str()), ("cy", cy.as_str())]);
        w.empty(
            "wp:docPr",
            &[("id", id.as_str()), ("name", name.as_str()), ("descr", descr.as_str())],
        );
        w.open("a:graphic", &[]);
        w.open("a:graphicData", &[("uri", ns::PIC)]);
        w.open("pic:pic", &[]);
        w.open("pic:nvPicPr", &[]);
        w.empty("pic:cNvPr", &[("id", id.as_str()), ("name", name.as_str())]);
        w.empty("pic:cNvPicPr", &[]);
        w.close();
        w.open("pic:blipFill", &[]);
        w.empty("a:blip", &[("r:embed", embed.as_str())]);
        w.open("a:stretch", &[]);
        w.empty("a:fillRect", &[]);
        w.close();
        w.close();
        w.open("pic:spPr", &[]);
        w.open("a:xfrm", &[]);
        w.empty("a:off", &[("x", "0"), ("y", "0")]);
        w.empty("a:ext", &[("cx", cx.as_str()), ("cy", cy.as_str())]);
        w.close();
        w.open("a:prstGeom", &[("prst", "rect")]);
        w.empty("a:avLst", &[]);
        w.close();
        w.close();
        w.close(); // pic:pic
        w.close(); // a:graphicData
        w.close(); // a:graphic
        w.close(); // wp:inline
        w.close(); // w:drawing
        w.close(); // w:r
    }

    /// Write a `*PrChange` element holding the properties as they were
    /// before the tracked edits
    fn property_change(
        &mut self,
        w: &mut XmlWriter,
        tag: &str,
        inner: &str,
        current: &Formatting,
        changes: &[(usize, &TrackedChange)],
        write: impl Fn(&mut XmlWriter, &Formatting),
    ) {
        let Some(&(index, first)) = changes.first() else {
            return;
        };
        let mut old = current.clone();
        // Oldest change last so the earliest recorded value wins
        for (_, change) in changes.iter().rev() {
            if let ChangeKind::FormatChange { property, old: before, .. } = &change.kind {
                old.set(*property, before.clone());
            }
        }
        if changes.iter().any(|(_, c)| c.author != first.author) {
            self.report.warn(
                "docx.format_changes.merged",
                FeatureCategory::FormatChanges,
                WarningSeverity::Minor,
                "Format changes by several authors on one element written under the first author",
            );
        }
        w.open(tag, &attr_refs(&change_attrs(index, first)));
        w.open(inner, &[]);
        write(w, &old);
        w.close();
        w.close();
    }

    // =========================================================================
    // Tables
    // =========================================================================

    fn table(&mut self, w: &mut XmlWriter, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        let formatting = node.direct_formatting();
        w.open("w:tbl", &[]);
        w.open("w:tblPr", &[]);
        if let Some(style) = node.style_ref() {
            w.empty("w:tblStyle", &[("w:val", style.as_str())]);
        }
        let width = ("w:w", "0");
        w.empty("w:tblW", &[width, ("w:type", "auto")]);
        properties::write_table(w, formatting, TableLevel::Table);
        let changes = view.format_changes(id);
        self.property_change(w, "w:tblPrChange", "w:tblPr", formatting, &changes, |w, f| {
            properties::write_table(w, f, TableLevel::Table)
        });
        w.close();

        let rows = view.children(id);
        let columns = rows
            .iter()
            .map(|r| view.children(*r).len())
            .max()
            .unwrap_or(1)
            .max(1);
        let column_width = ((PAGE_WIDTH - 2 * PAGE_MARGIN) as usize / columns).to_string();
        w.open("w:tblGrid", &[]);
        for _ in 0..columns {
            w.empty("w:gridCol", &[("w:w", column_width.as_str())]);
        }
        w.close();

        for row in rows {
            self.row(w, row);
        }
        w.close();
    }

    fn row(&mut self, w: &mut XmlWriter, row: NodeId) {
        let view = self.view;
        let Some(node) = view.node(row) else {
            return;
        };
        w.open("w:tr", &[]);
        if properties::has_table(node.direct_formatting()) {
            w.open("w:tblPrEx", &[]);
            properties::write_table(w, node.direct_formatting(), TableLevel::Table);
            w.close();
        }
        if let Some(mark) = view.mark(row) {
            w.open("w:trPr", &[]);
            let tag = if mark.mark == Mark::Inserted { "w:ins" } else { "w:del" };
            w.empty(tag, &attr_refs(&change_attrs(mark.index, mark.change)));
            w.close();
        }
        if !view.format_changes(row).is_empty() {
            self.report.warn(
                "docx.rows.format_changes",
                FeatureCategory::FormatChanges,
                WarningSeverity::Minor,
                "Tracked formatting changes on table rows dropped",
            );
        }
        for cell in view.children(row) {
            self.cell(w, cell);
        }
        w.close();
    }

    fn cell(&mut self, w: &mut XmlWriter, cell: NodeId) {
        let view = self.view;
        let Some(node) = view.node(cell) else {
            return;
        };
        let formatting = node.direct_formatting();
        let mark = view.mark_on(cell);
        let changes = view.format_changes(cell);
        w.open("w:tc", &[]);
        if properties::has_table(formatting) || mark.is_some() || !changes.is_empty() {
            w.open("w:tcPr", &[]);
            properties::write_table(w, formatting, TableLevel::Cell);
            if let Some(mark) = mark {
                let tag = if mark.mark == Mark::Inserted { "w:cellIns" } else { "w:cellDel" };
                w.empty(tag, &attr_refs(&change_attrs(mark.index, mark.change)));
            }
            self.property_change(w, "w:tcPrChange", "w:tcPr", formatting, &changes, |w, f| {
                properties::write_table(w, f, TableLevel::Cell)
            });
            w.close();
        }
        let blocks = view.children(cell);
        for &block in &blocks {
            self.block(w, block, None);
        }
        // A cell must end with a paragraph
        if blocks.last().and_then(|b| view.kind(*b)) != Some(NodeKind::Paragraph) {
            w.empty("w:p", &[]);
        }
        w.close();
    }

    // =========================================================================
    // Package
    // =========================================================================

    fn finish(mut self, body: String) -> CodecResult<Exported> {
        let view = self.view;
        let pretty = self.pretty;

        self.rels.add(rel::STYLES, "styles.xml");
        let styles = parts::write_styles(view.tree(), self.numbering, pretty, &mut self.report);
        let numbering = numbering::write_numbering(view.tree(), self.numbering, pretty);
        if numbering.is_some() {
            self.rels.add(rel::NUMBERING, "numbering.xml");
            self.types.add_override("word/numbering.xml", ct::NUMBERING);
        }
        self.rels.add(rel::THEME, "theme/theme1.xml");
        let theme = parts::write_theme(view.tree().theme(), pretty);
        let comments = parts::write_comments(view, pretty);
        if comments.is_some() {
            self.rels.add(rel::COMMENTS, "comments.xml");
            self.rels.add(rel::COMMENTS_EXTENDED, "commentsExtended.xml");
            self.types.add_override("word/comments.xml", ct::COMMENTS);
            self.types
                .add_override("word/commentsExtended.xml", ct::COMMENTS_EXTENDED);
        }
        self.types.add_override("word/document.xml", ct::DOCUMENT);
        self.types.add_override("word/styles.xml", ct::STYLES);
        self.types.add_override("word/theme/theme1.xml", ct::THEME);
        self.types.add_override("docProps/core.xml", ct::CORE_PROPERTIES);

        let mut root_rels = Relationships::new();
        root_rels.add(rel::DOCUMENT, "word/document.xml");
        root_rels.add(rel::CORE_PROPERTIES, "docProps/core.xml");

        let mut zip = ArchiveWriter::new();
        zip.add("[Content_Types].xml", self.types.to_xml().as_bytes())?;
        zip.add("_rels/.rels", root_rels.to_xml().as_bytes())?;
        zip.add("word/document.xml", body.as_bytes())?;
        zip.add("word/_rels/document.xml.rels", self.rels.to_xml().as_bytes())?;
        zip.add("word/styles.xml", styles.as_bytes())?;
        zip.add("word/theme/theme1.xml", theme.as_bytes())?;
        if let Some(numbering) = numbering {
            zip.add("word/numbering.xml", numbering.as_bytes())?;
        }
        zip.add(
            "docProps/core.xml",
            parts::write_core(view.tree().metadata(), pretty).as_bytes(),
        )?;
        if let Some(comments) = comments {
            zip.add("word/comments.xml", comments.comments.as_bytes())?;
            zip.add("word/commentsExtended.xml", comments.extended.as_bytes())?;
        }
        for (path, content) in &self.parts {
            zip.add(path, content.as_bytes())?;
        }
        // Image data is already compressed
        for (path, data) in &self.media {
            zip.add_stored(path, data)?;
        }

        view.report_overlay_loss(
            &mut self.report,
            OverlaySupport {
                changes: true,
                format_changes: true,
                comments: true,
                replies: true,
            },
        );
        tracing::debug!(
            parts = self.parts.len(),
            media = self.media.len(),
            "Wrote DOCX package"
        );
        Ok(Exported {
            bytes: zip.finish()?,
            report: self.report,
        })
    }
}

/// Text of one run; tabs and line breaks become their own elements
fn run_text(w: &mut XmlWriter, text: &str, deleted: bool) {
    let tag = if deleted { "w:delText" } else { "w:t" };
    let mut pending = String::new();
    let flush = |w: &mut XmlWriter, pending: &mut String| {
        if !pending.is_empty() {
            w.leaf(tag, &[("xml:space", "preserve")], pending);
            pending.clear();
        }
    };
    for ch in text.chars() {
        match ch {
            '\t' => {
                flush(w, &mut pending);
                w.empty("w:tab", &[]);
            }
            '\n' => {
                flush(w, &mut pending);
                w.empty("w:br", &[]);
            }
            c => pending.push(c),
        }
    }
    flush(w, &mut pending);
}

fn comment_end(w: &mut XmlWriter, comment: usize) {
    let id = comment.to_string();
    w.empty("w:commentRangeEnd", &[("w:id", id.as_str())]);
    w.open("w:r", &[]);
    w.empty("w:commentReference", &[("w:id", id.as_str())]);
    w.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::reader::read;
    use doc_model::{
        list_labels, list_membership, Color, DocumentTree, FieldKind, ListKind, Property,
        PropertyValue, Style, StyleId, TextRange,
    };
    use revisions::{Comment, CommentAnchor, CommentReply, Overlay, OverlayOp, ViewMode};

    fn png() -> ImageObject {
        ImageObject {
            content_type: "image/png".into(),
            data: vec![0x89, b'P', b'N', b'G', 1, 2, 3],
            width: 72.0,
            height: 36.0,
            alt_text: Some("logo".into()),
        }
    }

    /// Two sections: a heading, formatted and tracked runs, a field, a
    /// bookmark and an image, then a table
    fn sample() -> DocumentSnapshot {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::paragraph("Heading1", "Heading 1").with_property(
            Property::FontSize,
            PropertyValue::Points(16.0),
        ))
        .unwrap();
        let first = tree.nodes_of_kind(NodeKind::Section)[0];
        let title = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.set_style_ref(title, Some(StyleId::from("Heading1"))).unwrap();
        tree.append(title, Node::run("Report")).unwrap();

        let body = tree.append(first, Node::paragraph()).unwrap();
        let plain = tree.append(body, Node::run("Plain and ")).unwrap();
        let bold = tree
            .append(
                body,
                Node::run("bold").with_formatting(
                    Formatting::new()
                        .with(Property::Bold, true)
                        .with(Property::Color, Color::from_hex("C00000").unwrap()),
                ),
            )
            .unwrap();
        let added = tree.append(body, Node::run(" added")).unwrap();
        let removed = tree.append(body, Node::run(" removed")).unwrap();
        tree.append(body, Node::bookmark("results")).unwrap();
        tree.append(body, Node::field(FieldKind::Page, "1")).unwrap();
        tree.append(body, Node::image(png())).unwrap();

        let second = tree.append(tree.root_id(), Node::section()).unwrap();
        tree.replace_data(
            second,
            NodeData::Section(SectionProperties {
                header: Some("Confidential".into()),
                footer: Some("Page footer".into()),
                page_number_start: Some(5),
                page_hints: Vec::new(),
            }),
        )
        .unwrap();
        let table = tree.append(second, Node::table()).unwrap();
        for r in 0..2 {
            let row = tree.append(table, Node::table_row()).unwrap();
            for c in 0..2 {
                let cell = tree.append(row, Node::table_cell()).unwrap();
                let p = tree.append(cell, Node::paragraph()).unwrap();
                tree.append(p, Node::run(format!("r{r}c{c}"))).unwrap();
            }
        }

        let mut overlay = Overlay::new();
        OverlayOp::AddChange(TrackedChange::insertion("alice", vec![added]))
            .apply(&mut overlay)
            .unwrap();
        OverlayOp::AddChange(TrackedChange::deletion("bob", vec![removed]))
            .apply(&mut overlay)
            .unwrap();
        OverlayOp::AddChange(TrackedChange::format_change(
            "carol",
            bold,
            Property::Bold,
            None,
            Some(PropertyValue::Bool(true)),
        ))
        .apply(&mut overlay)
        .unwrap();
        let mut comment = Comment::new(
            CommentAnchor::range(TextRange::within(plain, 0, 5)),
            "dave",
            "Too plain?\nMaybe.",
        );
        comment.add_reply(CommentReply::new("erin", "Fine as is"));
        OverlayOp::AddComment(comment).apply(&mut overlay).unwrap();
        DocumentSnapshot::new(tree, overlay)
    }

    fn round_trip(view: ViewMode) -> (Exported, crate::Imported) {
        let exported = write(&sample(), &ExportOptions::default().with_view(view)).unwrap();
        let imported = read(&exported.bytes).unwrap();
        (exported, imported)
    }

    #[test]
    fn test_markup_round_trip_keeps_structure() {
        let (_, imported) = round_trip(ViewMode::Markup);
        let tree = &imported.document.tree;
        assert_eq!(tree.nodes_of_kind(NodeKind::Section).len(), 2);
        assert_eq!(tree.nodes_of_kind(NodeKind::TableCell).len(), 4);
        assert!(tree.bookmark("results").is_some());
        assert_eq!(tree.nodes_of_kind(NodeKind::FieldReference).len(), 1);
        let images = tree.nodes_of_kind(NodeKind::InlineObject);
        assert_eq!(images.len(), 1);
        match tree.node(images[0]).unwrap().data() {
            NodeData::InlineObject(image) => {
                assert_eq!(image.data, png().data);
                assert_eq!(image.alt_text.as_deref(), Some("logo"));
                assert!((image.width - 72.0).abs() < 0.01);
            }
            other => panic!("unexpected {other:?}"),
        }
        let title = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        assert_eq!(tree.node(title).unwrap().style_ref(), Some(&StyleId::from("Heading1")));
        assert_eq!(
            tree.styles()
                .get(&StyleId::from("Heading1"))
                .and_then(|s| s.properties.get(Property::FontSize)),
            Some(&PropertyValue::Points(16.0))
        );
    }

    #[test]
    fn test_markup_round_trip_keeps_review_state() {
        let (exported, imported) = round_trip(ViewMode::Markup);
        assert!(exported.report.is_empty());
        let overlay = &imported.document.overlay;
        let changes = overlay.changes();
        assert!(changes.iter().any(|c| c.is_insertion() && c.author == "alice"));
        assert!(changes.iter().any(|c| c.is_deletion() && c.author == "bob"));
        assert!(changes.iter().any(|c| matches!(
            &c.kind,
            ChangeKind::FormatChange { property: Property::Bold, old: None, .. }
        )));

        let comments = overlay.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "Too plain?\nMaybe.");
        assert_eq!(comments[0].replies.len(), 1);
        assert_eq!(comments[0].replies[0].author, "erin");
    }

    #[test]
    fn test_final_view_drops_deleted_text() {
        let (_, imported) = round_trip(ViewMode::Final);
        let text = imported.document.tree.plain_text();
        assert!(text.contains("added"));
        assert!(!text.contains("removed"));
        assert!(!imported.document.overlay.has_changes());
    }

    #[test]
    fn test_sections_keep_headers_and_numbering() {
        let (_, imported) = round_trip(ViewMode::Final);
        let tree = &imported.document.tree;
        let sections = tree.nodes_of_kind(NodeKind::Section);
        match tree.node(sections[1]).unwrap().data() {
            NodeData::Section(props) => {
                assert_eq!(props.header.as_deref(), Some("Confidential"));
                assert_eq!(props.footer.as_deref(), Some("Page footer"));
                assert_eq!(props.page_number_start, Some(5));
            }
            other => panic!("unexpected {other:?}"),
        }
        match tree.node(sections[0]).unwrap().data() {
            NodeData::Section(props) => assert!(props.header.is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lists_round_trip() {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::list_of("Steps", "Steps", ListKind::LowerRoman))
            .unwrap();
        tree.put_style(
            Style::paragraph("StepParagraph", "Step Paragraph")
                .with_based_on("Normal")
                .with_property(Property::ListStyle, PropertyValue::ListRef(Some("Steps".into()))),
        )
        .unwrap();
        let section = tree.nodes_of_kind(NodeKind::Section)[0];
        let first = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.set_style_ref(first, Some("StepParagraph".into())).unwrap();
        tree.append(first, Node::run("Open the lid")).unwrap();
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
        tree.append(nested, Node::run("Carefully")).unwrap();
        let snapshot = DocumentSnapshot::new(tree, Overlay::new());

        let exported = write(&snapshot, &ExportOptions::default()).unwrap();
        assert!(exported.report.is_empty());
        let imported = read(&exported.bytes).unwrap();
        let tree = &imported.document.tree;
        let steps = tree.styles().get(&StyleId::from("Steps")).unwrap();
        assert_eq!(steps.style_type, doc_model::StyleType::List);
        assert_eq!(steps.list_kind(), ListKind::LowerRoman);
        assert_eq!(
            tree.styles()
                .get(&StyleId::from("StepParagraph"))
                .and_then(|s| s.properties.get(Property::ListStyle)),
            Some(&PropertyValue::ListRef(Some("Steps".into())))
        );

        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(
            list_membership(tree, paragraphs[0]).unwrap(),
            Some((StyleId::from("Steps"), 0))
        );
        assert_eq!(
            list_membership(tree, paragraphs[1]).unwrap(),
            Some((StyleId::from("Steps"), 1))
        );
        let labels = list_labels(tree).unwrap();
        assert_eq!(labels[&paragraphs[0]], "i.");
        assert_eq!(labels[&paragraphs[1]], "i.");
    }

    #[test]
    fn test_run_text_splits_tabs_and_breaks() {
        let mut w = XmlWriter::bare(false);
        run_text(&mut w, "a\tb\nc", false);
        assert_eq!(
            w.finish(),
            "<w:t xml:space=\"preserve\">a</w:t><w:tab/><w:t xml:space=\"preserve\">b</w:t><w:br/><w:t xml:space=\"preserve\">c</w:t>"
        );
    }

    #[test]
    fn test_package_lists_parts() {
        let exported = write(&sample(), &ExportOptions::default()).unwrap();
        let mut archive = crate::archive::ArchiveReader::new(&exported.bytes, Format::Docx).unwrap();
        let types = archive.read_string("[Content_Types].xml").unwrap();
        assert!(types.contains("Extension=\"png\""));
        assert!(types.contains("/word/header1.xml"));
        assert!(archive.has("word/media/image1.png"));
        assert!(archive.has("word/commentsExtended.xml"));
        assert!(!archive.has("word/numbering.xml"));
    }
}
