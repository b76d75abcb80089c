//! XHTML import and export
//!
//! Styles do not survive: every node is written with the formatting that
//! differs from what a fresh import would give it, so effective formatting
//! comes back unchanged. Tracked insertions and deletions map to `<ins>` and
//! `<del>`; on block elements the mark travels in `data-mark` attributes.

mod css;
mod reader;

pub use css::{from_css, parse_color, to_css};

use crate::view::{ExportView, Mark, OverlaySupport, RunPiece};
use crate::xml::{fmt_num, ListNesting, XmlWriter};
use crate::{
    Codec, CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory,
    FidelityReport, Format, Imported, WarningSeverity,
};
use base64::Engine;
use doc_model::{
    DocumentTree, EffectiveFormatting, Formatting, Node, NodeData, NodeId, NodeKind, Property,
    PropertyScope, StyleId,
};

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Heading tags and the styles they stand for
pub const HEADINGS: [(&str, &str); 3] = [("h1", "Heading1"), ("h2", "Heading2"), ("h3", "Heading3")];

pub struct HtmlCodec;

impl Codec for HtmlCodec {
    fn format(&self) -> Format {
        Format::Html
    }

    fn import(&self, bytes: &[u8]) -> CodecResult<Imported> {
        reader::read(bytes)
    }

    fn export(&self, document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
        let view = ExportView::new(document, options.view);
        let mut report = FidelityReport::export(Format::Html);
        let bytes = HtmlWriter::new(&view, options.pretty, &mut report)?.write()?;
        view.report_overlay_loss(
            &mut report,
            OverlaySupport {
                changes: true,
                ..OverlaySupport::default()
            },
        );
        Ok(Exported { bytes, report })
    }
}

/// Formatting a fresh import gives an element before any `style` attribute
pub struct Baseline {
    paragraphs: Vec<(Option<StyleId>, EffectiveFormatting, EffectiveFormatting)>,
    table: EffectiveFormatting,
}

impl Baseline {
    pub fn new() -> CodecResult<Self> {
        let mut styles: Vec<Option<StyleId>> = vec![None];
        styles.extend(HEADINGS.iter().map(|(_, s)| Some(StyleId::new(*s))));

        let mut tree = DocumentTree::new();
        let section = tree.append(tree.root_id(), Node::section())?;
        let mut paragraphs = Vec::new();
        for style in styles {
            let mut node = Node::paragraph();
            if let Some(style) = &style {
                node = node.with_style(style.clone());
            }
            let para = tree.append(section, node)?;
            let run = tree.append(para, Node::run("x"))?;
            paragraphs.push((
                style,
                doc_model::resolve(&tree, para)?,
                doc_model::resolve(&tree, run)?,
            ));
        }
        let table = tree.append(section, Node::table())?;
        Ok(Self {
            paragraphs,
            table: doc_model::resolve(&tree, table)?,
        })
    }

    fn entry(&self, style: Option<&StyleId>) -> Option<&(Option<StyleId>, EffectiveFormatting, EffectiveFormatting)> {
        self.paragraphs
            .iter()
            .find(|(s, _, _)| s.as_ref() == style)
            .or_else(|| self.paragraphs.first())
    }

    pub fn paragraph(&self, style: Option<&StyleId>) -> Option<&EffectiveFormatting> {
        self.entry(style).map(|(_, p, _)| p)
    }

    pub fn run(&self, style: Option<&StyleId>) -> Option<&EffectiveFormatting> {
        self.entry(style).map(|(_, _, r)| r)
    }

    pub fn table(&self) -> &EffectiveFormatting {
        &self.table
    }
}

/// Properties of `scope` whose effective value differs from `base`
pub fn formatting_diff(
    effective: &EffectiveFormatting,
    base: &EffectiveFormatting,
    scope: PropertyScope,
) -> Formatting {
    let mut diff: Formatting = effective
        .scoped(scope)
        .iter()
        .filter(|(p, v)| base.get(*p) != *v)
        .map(|(p, v)| (p, v.clone()))
        .collect();
    // Underline and strike are written together.
    if diff.contains(Property::Underline) || diff.contains(Property::Strikethrough) {
        for p in [Property::Underline, Property::Strikethrough] {
            diff.set(p, Some(effective.get(p).clone()));
        }
    }
    diff
}

/// Heading tag for a paragraph style
pub fn heading_tag(style: Option<&StyleId>) -> Option<&'static str> {
    let style = style?;
    HEADINGS
        .iter()
        .find(|(_, s)| style.as_str() == *s)
        .map(|(tag, _)| *tag)
}

struct HtmlWriter<'v, 'a, 'r> {
    view: &'v ExportView<'a>,
    out: XmlWriter,
    baseline: Baseline,
    report: &'r mut FidelityReport,
}

impl<'v, 'a, 'r> HtmlWriter<'v, 'a, 'r> {
    fn new(view: &'v ExportView<'a>, pretty: bool, report: &'r mut FidelityReport) -> CodecResult<Self> {
        Ok(Self {
            view,
            out: XmlWriter::new(pretty),
            baseline: Baseline::new()?,
            report,
        })
    }

    fn write(mut self) -> CodecResult<Vec<u8>> {
        self.out.open("html", &[("xmlns", XHTML_NS)]);
        self.write_head();
        self.out.open("body", &[("style", "white-space: pre-wrap")]);
        let mut headers = false;
        for section in self.view.sections() {
            if let Some(NodeData::Section(props)) = self.view.node(section).map(|n| n.data()) {
                headers |= props.header.is_some() || props.footer.is_some();
            }
            let attrs = self.mark_attrs(section);
            self.out.open("section", &as_refs(&attrs));
            self.write_blocks(section)?;
            self.out.close();
        }
        self.out.close();
        self.out.close();

        if headers {
            self.report.warn(
                "html.headers.dropped",
                FeatureCategory::HeadersFooters,
                WarningSeverity::Moderate,
                "Headers, footers and page numbering dropped",
            );
        }
        let tree = self.view.tree();
        if tree.walk().into_iter().any(|n| {
            tree.get(n).and_then(|n| n.style_ref()).is_some_and(|s| heading_tag(Some(s)).is_none())
        }) {
            self.report.warn(
                "html.styles.inlined",
                FeatureCategory::Styles,
                WarningSeverity::Minor,
                "Named styles written as inline formatting",
            );
        }
        if tree.styles().iter().any(|s| s.style_type == doc_model::StyleType::List) {
            self.report.warn(
                "html.lists.unstyled",
                FeatureCategory::ParagraphFormatting,
                WarningSeverity::Minor,
                "List styles written as plain ordered and bulleted lists",
            );
        }
        if *tree.theme() != doc_model::Theme::default() {
            self.report.warn(
                "html.theme.resolved",
                FeatureCategory::Theme,
                WarningSeverity::Info,
                "Theme fonts and colors written as concrete values",
            );
        }
        Ok(self.out.finish().into_bytes())
    }

    fn write_head(&mut self) {
        let meta = self.view.tree().metadata().clone();
        self.out.open("head", &[]);
        self.out.empty("meta", &[("charset", "utf-8")]);
        self.out.leaf("title", &[], meta.title.as_deref().unwrap_or(""));
        let mut named = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                self.out.empty("meta", &[("name", name), ("content", value.as_str())]);
            }
        };
        named("author", meta.author.clone());
        named("description", meta.subject.clone());
        named("keywords", (!meta.keywords.is_empty()).then(|| meta.keywords_joined()));
        named("dcterms.created", meta.created.map(|d| d.to_rfc3339()));
        named("dcterms.modified", meta.modified.map(|d| d.to_rfc3339()));
        self.out.close();
    }

    /// `data-*` attributes for a block that carries its own change mark
    fn mark_attrs(&self, node: NodeId) -> Vec<(String, String)> {
        let Some(mark) = self.view.mark_on(node) else {
            return Vec::new();
        };
        let kind = match mark.mark {
            Mark::Inserted => "ins",
            Mark::Deleted => "del",
        };
        vec![
            ("data-mark".into(), kind.into()),
            ("data-change".into(), mark.index.to_string()),
            ("data-author".into(), mark.change.author.clone()),
            ("data-date".into(), mark.change.timestamp.to_rfc3339()),
        ]
    }

    /// List paragraphs are wrapped in `<ol>` or `<ul>` items, nested by
    /// level
    fn write_blocks(&mut self, container: NodeId) -> CodecResult<()> {
        let mut lists = ListNesting::new("li");
        for block in self.view.children(container) {
            match self.view.kind(block) {
                Some(NodeKind::Paragraph) => {
                    match self.view.list_membership(block) {
                        Some((list, level)) => {
                            let tag = match self.view.tree().styles().get(&list) {
                                Some(style) if style.list_kind().is_ordered() => "ol",
                                _ => "ul",
                            };
                            lists.item(&mut self.out, &list, level, |w, _| w.open(tag, &[]));
                        }
                        None => lists.close(&mut self.out),
                    }
                    self.write_paragraph(block)?;
                }
                Some(NodeKind::Table) => {
                    lists.close(&mut self.out);
                    self.write_table(block)?;
                }
                _ => {}
            }
        }
        lists.close(&mut self.out);
        Ok(())
    }

    fn write_paragraph(&mut self, para: NodeId) -> CodecResult<()> {
        let style = self.view.node(para).and_then(|n| n.style_ref()).cloned();
        let tag = heading_tag(style.as_ref()).unwrap_or("p");
        let base_style = heading_tag(style.as_ref()).and(style.as_ref());
        let effective = self.view.resolve(para)?;
        let mut attrs = self.mark_attrs(para);
        if let Some(base) = self.baseline.paragraph(base_style) {
            let diff = formatting_diff(&effective, base, PropertyScope::Paragraph);
            let level = diff.get(Property::OutlineLevel).and_then(|v| match v {
                doc_model::PropertyValue::Level(l) => Some(*l),
                _ => None,
            });
            let mut diff = diff;
            for property in [Property::OutlineLevel, Property::ListStyle, Property::ListLevel] {
                diff.set(property, None);
            }
            if !diff.is_empty() {
                attrs.push(("style".into(), to_css(&diff)));
            }
            if let Some(level) = level {
                attrs.push(("data-outline-level".into(), level.to_string()));
            }
        }
        self.out.open_mixed(tag, &as_refs(&attrs));
        let base_style = base_style.cloned();
        for child in self.view.children(para) {
            self.write_inline(child, base_style.as_ref())?;
        }
        self.out.close();
        Ok(())
    }

    fn write_inline(&mut self, node: NodeId, para_style: Option<&StyleId>) -> CodecResult<()> {
        let Some(data) = self.view.node(node).map(|n| n.data().clone()) else {
            return Ok(());
        };
        let wrapped = match self.view.mark_on(node) {
            Some(mark) => {
                let tag = match mark.mark {
                    Mark::Inserted => "ins",
                    Mark::Deleted => "del",
                };
                let index = mark.index.to_string();
                let date = mark.change.timestamp.to_rfc3339();
                self.out.open_mixed(
                    tag,
                    &[
                        ("data-change", index.as_str()),
                        ("data-author", mark.change.author.as_str()),
                        ("datetime", date.as_str()),
                    ],
                );
                true
            }
            None => false,
        };

        match data {
            NodeData::Run { .. } => {
                let style = self.run_style(node, para_style)?;
                let text: String = self
                    .view
                    .run_pieces(node)
                    .into_iter()
                    .filter_map(|p| match p {
                        RunPiece::Text(t) => Some(t),
                        _ => None,
                    })
                    .collect();
                match style {
                    Some(css) => self.out.leaf("span", &[("style", css.as_str())], &text),
                    None => self.out.text(&text),
                }
            }
            NodeData::FieldReference(field) => {
                let instruction = field.kind.instruction();
                let mut attrs = vec![("data-field".to_string(), instruction)];
                if let Some(css) = self.run_style(node, para_style)? {
                    attrs.push(("style".into(), css));
                }
                self.out.leaf("span", &as_refs(&attrs), &field.result);
            }
            NodeData::Bookmark { name } => {
                self.out.open_mixed("a", &[("id", name.as_str())]);
                self.out.close();
            }
            NodeData::InlineObject(image) => {
                let src = format!(
                    "data:{};base64,{}",
                    image.content_type,
                    base64::engine::general_purpose::STANDARD.encode(&image.data)
                );
                let style = format!("width: {}pt; height: {}pt", fmt_num(image.width), fmt_num(image.height));
                let mut attrs = vec![("src", src.as_str()), ("style", style.as_str())];
                if let Some(alt) = &image.alt_text {
                    attrs.push(("alt", alt.as_str()));
                }
                self.out.empty("img", &attrs);
            }
            _ => {}
        }
        if wrapped {
            self.out.close();
        }
        Ok(())
    }

    fn run_style(&self, node: NodeId, para_style: Option<&StyleId>) -> CodecResult<Option<String>> {
        let effective = self.view.resolve(node)?;
        let Some(base) = self.baseline.run(para_style) else {
            return Ok(None);
        };
        let diff = formatting_diff(&effective, base, PropertyScope::Character);
        Ok((!diff.is_empty()).then(|| to_css(&diff)))
    }

    fn write_table(&mut self, table: NodeId) -> CodecResult<()> {
        let effective = self.view.resolve(table)?;
        let mut attrs = self.mark_attrs(table);
        let diff = formatting_diff(&effective, self.baseline.table(), PropertyScope::Table);
        if !diff.is_empty() {
            attrs.push(("style".into(), to_css(&diff)));
        }
        self.out.open("table", &as_refs(&attrs));
        for row in self.view.children(table) {
            let row_effective = self.view.resolve(row)?;
            let mut attrs = self.mark_attrs(row);
            let diff = formatting_diff(&row_effective, &effective, PropertyScope::Table);
            if !diff.is_empty() {
                attrs.push(("style".into(), to_css(&diff)));
            }
            self.out.open("tr", &as_refs(&attrs));
            for cell in self.view.children(row) {
                let cell_effective = self.view.resolve(cell)?;
                let mut attrs = self.mark_attrs(cell);
                let diff = formatting_diff(&cell_effective, &row_effective, PropertyScope::Table);
                if !diff.is_empty() {
                    attrs.push(("style".into(), to_css(&diff)));
                }
                self.out.open("td", &as_refs(&attrs));
                self.write_blocks(cell)?;
                self.out.close();
            }
            self.out.close();
        }
        self.out.close();
        Ok(())
    }
}

fn as_refs(attrs: &[(String, String)]) -> Vec<(&str, &str)> {
    attrs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{Color, PropertyValue};
    use revisions::{Overlay, OverlayOp, TrackedChange, ViewMode};

    fn doc() -> (DocumentSnapshot, NodeId) {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.append(para, Node::run("Hello ")).unwrap();
        let removed = tree
            .append(
                para,
                Node::run("world").with_formatting(
                    Formatting::new().with(Property::Color, Color::rgb(0xAA, 0, 0)),
                ),
            )
            .unwrap();
        let mut overlay = Overlay::new();
        OverlayOp::AddChange(TrackedChange::deletion("alice", vec![removed]))
            .apply(&mut overlay)
            .unwrap();
        (DocumentSnapshot::new(tree, overlay), removed)
    }

    #[test]
    fn test_markup_keeps_deletion() {
        let (doc, _) = doc();
        let exported = HtmlCodec.export(&doc, &ExportOptions::default()).unwrap();
        let html = String::from_utf8(exported.bytes).unwrap();
        assert!(html.contains("<del data-change=\"0\" data-author=\"alice\""));
        assert!(html.contains("color: #AA0000"));
        assert!(!exported.report.has_code("overlay.changes.flattened"));
    }

    #[test]
    fn test_final_view_omits_deleted_run() {
        let (doc, _) = doc();
        let exported = HtmlCodec
            .export(&doc, &ExportOptions::default().with_view(ViewMode::Final))
            .unwrap();
        let html = String::from_utf8(exported.bytes).unwrap();
        assert!(html.contains("Hello "));
        assert!(!html.contains("world"));
    }

    #[test]
    fn test_plain_paragraph_has_no_style() {
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        tree.append(para, Node::run("plain")).unwrap();
        let exported = HtmlCodec
            .export(&DocumentSnapshot::from(tree), &ExportOptions::default())
            .unwrap();
        let html = String::from_utf8(exported.bytes).unwrap();
        assert!(html.contains("<p>plain</p>"));
    }

    #[test]
    fn test_diff_writes_decorations_together() {
        let base = Baseline::new().unwrap();
        let mut tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let run = tree
            .append(
                para,
                Node::run("u").with_formatting(Formatting::new().with(Property::Underline, true)),
            )
            .unwrap();
        let effective = doc_model::resolve(&tree, run).unwrap();
        let diff = formatting_diff(&effective, base.run(None).unwrap(), PropertyScope::Character);
        assert_eq!(diff.get(Property::Underline), Some(&PropertyValue::Bool(true)));
        assert_eq!(diff.get(Property::Strikethrough), Some(&PropertyValue::Bool(false)));
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_lists_nest_by_level() {
        let mut tree = DocumentTree::blank();
        tree.put_style(doc_model::Style::list_of("Steps", "Steps", doc_model::ListKind::Decimal))
            .unwrap();
        let first = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let section = tree.parent(first).unwrap();
        for (level, text) in [(0, "one"), (1, "one a"), (0, "two")] {
            let para = tree
                .append(
                    section,
                    Node::paragraph().with_formatting(
                        Formatting::new()
                            .with(Property::ListStyle, PropertyValue::ListRef(Some("Steps".into())))
                            .with(Property::ListLevel, PropertyValue::Level(level)),
                    ),
                )
                .unwrap();
            tree.append(para, Node::run(text)).unwrap();
        }
        let exported = HtmlCodec
            .export(&DocumentSnapshot::from(tree), &ExportOptions::default())
            .unwrap();
        let html = String::from_utf8(exported.bytes).unwrap();
        assert!(html.contains(
            "<ol><li><p>one</p><ol><li><p>one a</p></li></ol></li><li><p>two</p></li></ol>"
        ));
        assert!(exported.report.has_code("html.lists.unstyled"));

        let imported = HtmlCodec.import(html.as_bytes()).unwrap();
        assert_eq!(imported.document.tree.plain_text().trim(), "one\none a\ntwo");
    }
}
