//! RTF writer
//!
//! The body is written first so the font, color and author tables hold
//! exactly what it uses; the header is assembled around it.

use super::properties::{self, write_info_date, TableLevel, Tables};
use crate::view::{resolve_theme, ExportView, Mark, OverlaySupport, RunPiece};
use crate::{
    CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory, FidelityReport,
    Format, WarningSeverity,
};
use doc_model::{
    Field, Formatting, ImageObject, Node, NodeData, NodeId, NodeKind, PropertyScope,
    SectionProperties, StyleId, StyleType,
};
use std::collections::HashMap;
use std::fmt::Write as _;

/// Text width of a Letter page with one inch margins, in twips
const TEXT_WIDTH: i32 = 9360;

pub fn write(document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
    let view = ExportView::new(document, options.view);
    let mut writer = RtfWriter {
        view: &view,
        report: FidelityReport::export(Format::Rtf),
        tables: Tables::default(),
        styles: HashMap::new(),
        authors: Vec::new(),
        theme_resolved: false,
        skipped_images: 0,
    };
    writer.number_styles();
    let body = writer.body();
    writer.finish(body)
}

/// Escape text for an RTF body. Characters outside printable ASCII are
/// written as `\uN?` with a `?` fallback.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' | '{' | '}' => {
                out.push('\\');
                out.push(ch);
            }
            '\t' => out.push_str("\\tab "),
            '\n' => out.push_str("\\line "),
            ' '..='~' => out.push(ch),
            _ => {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{}?", *unit as i16);
                }
            }
        }
    }
    out
}

/// Open a group with control words; the delimiting space is only needed
/// when there are words
fn open_group(out: &mut String, words: &str) {
    out.push('{');
    out.push_str(words);
    if !words.is_empty() {
        out.push(' ');
    }
}

struct RtfWriter<'v, 'a> {
    view: &'v ExportView<'a>,
    report: FidelityReport,
    tables: Tables,
    /// Stylesheet number per style; the default paragraph style is 0
    styles: HashMap<StyleId, usize>,
    /// Revision table entries after the leading "Unknown"
    authors: Vec<String>,
    theme_resolved: bool,
    skipped_images: usize,
}

impl<'v, 'a> RtfWriter<'v, 'a> {
    fn concrete(&mut self, formatting: &Formatting) -> Formatting {
        let (resolved, replaced) = resolve_theme(self.view.tree().theme(), formatting);
        self.theme_resolved |= replaced;
        resolved
    }

    fn number_styles(&mut self) {
        let tree = self.view.tree();
        let default = tree.styles().default_paragraph_style().cloned();
        let mut ids: Vec<&StyleId> = tree
            .styles()
            .iter()
            .filter(|s| s.style_type != StyleType::List)
            .map(|s| &s.id)
            .filter(|id| Some(*id) != default.as_ref())
            .collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        if let Some(default) = default {
            self.styles.insert(default, 0);
        }
        for (i, id) in ids.into_iter().enumerate() {
            self.styles.insert(id.clone(), i + 1);
        }
    }

    fn style_number(&self, style: Option<&StyleId>) -> Option<usize> {
        style.and_then(|s| self.styles.get(s)).copied()
    }

    fn author(&mut self, name: &str) -> usize {
        match self.authors.iter().position(|a| a == name) {
            Some(i) => i + 1,
            None => {
                self.authors.push(name.to_string());
                self.authors.len()
            }
        }
    }

    /// Revision words for a node marked in this view
    fn revision(&mut self, id: NodeId) -> String {
        let Some(mark) = self.view.mark(id) else {
            return String::new();
        };
        let author = self.author(&mark.change.author);
        let date = properties::to_dttm(&mark.change.timestamp);
        match mark.mark {
            Mark::Inserted => format!("\\revised\\revauth{author}\\revdttm{date}"),
            Mark::Deleted => format!("\\deleted\\revauthdel{author}\\revdttmdel{date}"),
        }
    }

    /// Character style and formatting words of an inline node
    fn char_words(&mut self, node: &Node) -> String {
        let mut words = String::new();
        if let Some(n) = self.style_number(node.style_ref()) {
            let _ = write!(words, "\\cs{n}");
        }
        let formatting = self.concrete(node.direct_formatting());
        properties::write_char(&mut words, &formatting, &mut self.tables);
        words
    }

    // =========================================================================
    // Body
    // =========================================================================

    fn body(&mut self) -> String {
        let view = self.view;
        let mut out = String::new();
        for (i, section) in view.sections().into_iter().enumerate() {
            if i > 0 {
                out.push_str("\\sect");
            }
            let props = match view.node(section).map(Node::data) {
                Some(NodeData::Section(props)) => props.clone(),
                _ => SectionProperties::default(),
            };
            self.section_header(&mut out, &props);
            self.blocks(&mut out, &view.children(section));
        }
        out
    }

    fn section_header(&mut self, out: &mut String, props: &SectionProperties) {
        out.push_str("\\sectd");
        if let Some(start) = props.page_number_start {
            let _ = write!(out, "\\pgnstarts{start}\\pgnrestart");
        }
        out.push('\n');
        for (word, text) in [("header", &props.header), ("footer", &props.footer)] {
            let Some(text) = text else {
                continue;
            };
            let _ = write!(out, "{{\\{word} ");
            for line in text.split('\n') {
                let _ = write!(out, "\\pard\\plain {}\\par ", escape_text(line));
            }
            out.push_str("}\n");
        }
    }

    fn blocks(&mut self, out: &mut String, ids: &[NodeId]) {
        for &id in ids {
            match self.view.kind(id) {
                Some(NodeKind::Paragraph) => self.paragraph(out, id, false, "\\par"),
                Some(NodeKind::Table) => self.table(out, id),
                _ => {}
            }
        }
    }

    fn paragraph(&mut self, out: &mut String, id: NodeId, in_table: bool, end: &str) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        out.push_str("\\pard\\plain");
        if let Some(n) = self.style_number(node.style_ref()) {
            let _ = write!(out, "\\s{n}");
        }
        let formatting = self.concrete(node.direct_formatting());
        properties::write_paragraph(out, &formatting);
        if in_table {
            out.push_str("\\intbl");
        }
        out.push(' ');

        for child in view.children(id) {
            self.inline(out, child);
        }

        let revision = self.revision(id);
        if revision.is_empty() || end != "\\par" {
            out.push_str(end);
        } else {
            let _ = write!(out, "{{{revision} \\par}}");
        }
        out.push('\n');
    }

    fn inline(&mut self, out: &mut String, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        match node.data() {
            NodeData::Run { .. } => {
                let text: String = view
                    .run_pieces(id)
                    .into_iter()
                    .filter_map(|piece| match piece {
                        RunPiece::Text(text) => Some(text),
                        _ => None,
                    })
                    .collect();
                if text.is_empty() {
                    return;
                }
                let words = self.char_words(node) + &self.revision(id);
                open_group(out, &words);
                out.push_str(&escape_text(&text));
                out.push('}');
            }
            NodeData::FieldReference(field) => {
                let words = self.char_words(node) + &self.revision(id);
                write_field(out, field, &words);
            }
            NodeData::Bookmark { name } => {
                let name = escape_text(name);
                let _ = write!(out, "{{\\*\\bkmkstart {name}}}{{\\*\\bkmkend {name}}}");
            }
            NodeData::InlineObject(image) => {
                let revision = self.revision(id);
                self.picture(out, image, &revision);
            }
            _ => {}
        }
    }

    fn picture(&mut self, out: &mut String, image: &ImageObject, revision: &str) {
        let blip = match image.content_type.as_str() {
            "image/png" => "\\pngblip",
            "image/jpeg" => "\\jpegblip",
            _ => {
                self.skipped_images += 1;
                return;
            }
        };
        let goal = |points: f32| properties::twips(points);
        let pixels = |points: f32| (points * 96.0 / 72.0).round() as i32;
        open_group(out, revision);
        out.push_str("{\\pict");
        if let Some(alt) = &image.alt_text {
            let _ = write!(
                out,
                "{{\\*\\picprop{{\\sp{{\\sn wzDescription}}{{\\sv {}}}}}}}",
                escape_text(alt)
            );
        }
        let _ = write!(
            out,
            "{blip}\\picw{}\\pich{}\\picwgoal{}\\pichgoal{}\n",
            pixels(image.width),
            pixels(image.height),
            goal(image.width),
            goal(image.height)
        );
        for chunk in image.data.chunks(64) {
            for byte in chunk {
                let _ = write!(out, "{byte:02x}");
            }
            out.push('\n');
        }
        out.push_str("}}");
    }

    // =========================================================================
    // Tables
    // =========================================================================

    fn table(&mut self, out: &mut String, id: NodeId) {
        let view = self.view;
        let Some(node) = view.node(id) else {
            return;
        };
        let mut table_words = String::new();
        if let Some(n) = self.style_number(node.style_ref()) {
            let _ = write!(table_words, "\\ts{n}");
        }
        let formatting = self.concrete(node.direct_formatting());
        properties::write_table(&mut table_words, &formatting, TableLevel::Row, &mut self.tables);

        let rows = view.children(id);
        if std::iter::once(id)
            .chain(rows.iter().copied())
            .chain(rows.iter().flat_map(|r| view.children(*r)))
            .any(|n| view.mark_on(n).is_some())
        {
            self.report.warn(
                "rtf.tables.changes",
                FeatureCategory::TrackChanges,
                WarningSeverity::Moderate,
                "Inserted or deleted table rows and cells written as plain rows",
            );
        }
        for row in rows {
            self.row(out, row, &table_words);
        }
    }

    fn row(&mut self, out: &mut String, id: NodeId, table_words: &str) {
        let view = self.view;
        if view.node(id).is_some_and(|n| !n.direct_formatting().is_empty()) {
            self.report.warn(
                "rtf.tables.row_formatting",
                FeatureCategory::Tables,
                WarningSeverity::Minor,
                "Row formatting dropped",
            );
        }
        let cells = view.children(id);
        let width = TEXT_WIDTH / cells.len().max(1) as i32;
        let _ = write!(out, "\\trowd\\trgaph108{table_words}");
        for (i, &cell) in cells.iter().enumerate() {
            if let Some(node) = view.node(cell) {
                let formatting = self.concrete(node.direct_formatting());
                properties::write_table(out, &formatting, TableLevel::Cell, &mut self.tables);
            }
            let _ = write!(out, "\\cellx{}", width * (i as i32 + 1));
        }
        out.push('\n');

        for cell in cells {
            let paragraphs = self.cell_paragraphs(cell);
            match paragraphs.split_last() {
                Some((last, rest)) => {
                    for &p in rest {
                        self.paragraph(out, p, true, "\\par");
                    }
                    self.paragraph(out, *last, true, "\\cell");
                }
                None => out.push_str("\\pard\\plain\\intbl \\cell\n"),
            }
        }
        out.push_str("\\row\n");
    }

    /// Paragraphs of a cell with nested tables flattened into it
    fn cell_paragraphs(&mut self, cell: NodeId) -> Vec<NodeId> {
        let view = self.view;
        let mut paragraphs = Vec::new();
        for block in view.children(cell) {
            match view.kind(block) {
                Some(NodeKind::Paragraph) => paragraphs.push(block),
                Some(NodeKind::Table) => {
                    self.report.warn(
                        "rtf.tables.nested",
                        FeatureCategory::Tables,
                        WarningSeverity::Moderate,
                        "Nested table flattened into its cell",
                    );
                    paragraphs.extend(view.paragraphs(block));
                }
                _ => {}
            }
        }
        paragraphs
    }

    // =========================================================================
    // Header
    // =========================================================================

    fn stylesheet(&mut self) -> String {
        let tree = self.view.tree();
        let mut numbered: Vec<(usize, StyleId)> =
            self.styles.iter().map(|(id, n)| (*n, id.clone())).collect();
        numbered.sort_by_key(|(n, _)| *n);
        let mut out = String::from("{\\stylesheet\n");
        for (n, id) in numbered {
            let Some(style) = tree.styles().get(&id) else {
                continue;
            };
            let formatting = self.concrete(&style.properties);
            let mut words = match style.style_type {
                StyleType::Character => format!("{{\\*\\cs{n}\\additive"),
                StyleType::Table => format!("{{\\*\\ts{n}\\tsrowd"),
                _ => format!("{{\\s{n}"),
            };
            if let Some(base) = self.style_number(style.based_on.as_ref()) {
                let _ = write!(words, "\\sbasedon{base}");
            }
            if let Some(next) = self.style_number(style.next_style.as_ref()) {
                let _ = write!(words, "\\snext{next}");
            }
            match style.style_type {
                StyleType::Table => {
                    properties::write_table(&mut words, &formatting, TableLevel::Row, &mut self.tables)
                }
                _ => {
                    properties::write_paragraph(&mut words, &formatting);
                    properties::write_char(&mut words, &formatting, &mut self.tables);
                }
            }
            let _ = writeln!(out, "{words} {};}}", escape_text(&style.name.replace(';', ",")));
        }
        out.push('}');
        if tree.styles().iter().any(|s| s.style_type == StyleType::List) {
            self.report.warn(
                "rtf.styles.list_dropped",
                FeatureCategory::Styles,
                WarningSeverity::Minor,
                "List styles dropped",
            );
        }
        out
    }

    fn defaults(&mut self) -> String {
        let tree = self.view.tree();
        let defaults = self.concrete(&tree.defaults().overrides());
        if !defaults.scoped(PropertyScope::Table).is_empty() {
            self.report.warn(
                "rtf.defaults.table_dropped",
                FeatureCategory::Styles,
                WarningSeverity::Minor,
                "Table formatting defaults dropped",
            );
        }
        let mut chp = String::new();
        properties::write_char(&mut chp, &defaults, &mut self.tables);
        let mut pap = String::new();
        properties::write_paragraph(&mut pap, &defaults);
        let mut out = String::new();
        if !chp.is_empty() {
            let _ = write!(out, "{{\\*\\defchp{chp}}}");
        }
        if !pap.is_empty() {
            let _ = write!(out, "{{\\*\\defpap{pap}}}");
        }
        out
    }

    fn info(&self) -> String {
        let meta = self.view.tree().metadata();
        let mut out = String::from("{\\info");
        let texts = [
            ("title", meta.title.clone()),
            ("subject", meta.subject.clone()),
            ("author", meta.author.clone()),
            (
                "keywords",
                Some(meta.keywords_joined()).filter(|k| !k.is_empty()),
            ),
        ];
        for (word, text) in texts {
            if let Some(text) = text {
                let _ = write!(out, "{{\\{word} {}}}", escape_text(&text));
            }
        }
        if let Some(created) = &meta.created {
            write_info_date(&mut out, "creatim", created);
        }
        if let Some(modified) = &meta.modified {
            write_info_date(&mut out, "revtim", modified);
        }
        out.push('}');
        out
    }

    fn finish(mut self, body: String) -> CodecResult<Exported> {
        let stylesheet = self.stylesheet();
        let defaults = self.defaults();
        let mut tables = String::new();
        self.tables.write(&mut tables);

        let mut out = String::from("{\\rtf1\\ansi\\ansicpg1252\\deff0\\uc1\n");
        out.push_str(&tables);
        out.push('\n');
        out.push_str(&stylesheet);
        out.push('\n');
        out.push_str(&defaults);
        if !self.authors.is_empty() {
            out.push_str("{\\*\\revtbl{Unknown;}");
            for author in &self.authors {
                let _ = write!(out, "{{{};}}", escape_text(&author.replace(';', ",")));
            }
            out.push('}');
        }
        out.push_str(&self.info());
        let _ = writeln!(
            out,
            "{{\\*\\generator wordtool {};}}\\paperw12240\\paperh15840\\margl1440\\margr1440\\margt1440\\margb1440",
            env!("CARGO_PKG_VERSION")
        );
        out.push_str(&body);
        out.push('}');

        if self.theme_resolved {
            self.report.warn(
                "rtf.theme.resolved",
                FeatureCategory::Theme,
                WarningSeverity::Minor,
                "Theme fonts and colors written as fixed values",
            );
        }
        if self.skipped_images > 0 {
            self.report.warn(
                "rtf.images.unsupported",
                FeatureCategory::Images,
                WarningSeverity::Moderate,
                format!("{} image(s) that are not PNG or JPEG dropped", self.skipped_images),
            );
        }
        self.view.report_overlay_loss(
            &mut self.report,
            OverlaySupport {
                changes: true,
                format_changes: false,
                comments: false,
                replies: false,
            },
        );
        tracing::debug!(
            size = out.len(),
            authors = self.authors.len(),
            "Wrote RTF document"
        );
        Ok(Exported {
            bytes: out.into_bytes(),
            report: self.report,
        })
    }
}

/// `\field` with the instruction and the last result
fn write_field(out: &mut String, field: &Field, words: &str) {
    let _ = write!(
        out,
        "{{\\field{{\\*\\fldinst {} }}{{\\fldrslt ",
        escape_text(&field.kind.instruction())
    );
    open_group(out, words);
    out.push_str(&escape_text(&field.result));
    out.push_str("}}}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{DocumentTree, FieldKind};

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a{b}\\c"), "a\\{b\\}\\\\c");
        assert_eq!(escape_text("x\ty\nz"), "x\\tab y\\line z");
        assert_eq!(escape_text("caf\u{e9}"), "caf\\u233?");
        assert_eq!(escape_text("\u{1F600}"), "\\u-10179?\\u-8704?");
    }

    #[test]
    fn test_write_field() {
        let mut out = String::new();
        let field = Field {
            kind: FieldKind::Page,
            result: "3".into(),
        };
        write_field(&mut out, &field, "\\b");
        assert_eq!(out, "{\\field{\\*\\fldinst PAGE }{\\fldrslt {\\b 3}}}");
    }

    #[test]
    fn test_header_tables_precede_body() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let p = tree.children(section)[0];
        tree.append(p, Node::run("Hi")).unwrap();
        let exported = write(&DocumentSnapshot::from(tree), &ExportOptions::default()).unwrap();
        let text = String::from_utf8(exported.bytes).unwrap();
        assert!(text.starts_with("{\\rtf1\\ansi"));
        let fonts = text.find("{\\fonttbl").unwrap();
        let body = text.find("{Hi}").unwrap();
        assert!(fonts < body);
        assert!(text.trim_end().ends_with('}'));
    }
}
