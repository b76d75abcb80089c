//! Package parts around the body: styles, theme, core properties, comments
//! and header/footer parts

use super::namespaces;
use super::numbering::Numbering;
use super::properties::{self, TableLevel};
use crate::builder::{style_type_for, CommentDraft, DocumentBuilder};
use crate::view::ExportView;
use crate::xml::{format_date, parse_date, XmlElement, XmlWriter};
use crate::{FeatureCategory, FidelityReport, WarningSeverity};
use doc_model::{
    Color, DocumentMetadata, DocumentTree, Formatting, Style, StyleId, StyleType,
    Theme, ThemePalette,
};
use std::collections::HashMap;

// =============================================================================
// Styles
// =============================================================================

fn style_type_name(style_type: StyleType) -> &'static str {
    match style_type {
        StyleType::Paragraph => "paragraph",
        StyleType::Character => "character",
        StyleType::Table => "table",
        StyleType::List => "numbering",
    }
}

fn write_property_groups(w: &mut XmlWriter, f: &Formatting, numbering: &Numbering) {
    if properties::has_paragraph(f) {
        w.open("w:pPr", &[]);
        properties::write_paragraph(w, f, numbering);
        w.close();
    }
    if properties::has_run(f) {
        w.open("w:rPr", &[]);
        properties::write_run(w, f);
        w.close();
    }
    if properties::has_table(f) {
        w.open("w:tblPr", &[]);
        properties::write_table(w, f, TableLevel::Table);
        w.close();
    }
}

/// `word/styles.xml`: document defaults and every registered style
pub fn write_styles(
    tree: &DocumentTree,
    numbering: &Numbering,
    pretty: bool,
    report: &mut FidelityReport,
) -> String {
    let mut w = XmlWriter::new(pretty);
    w.open("w:styles", &[("xmlns:w", namespaces::W)]);

    let overrides = tree.defaults().overrides();
    w.open("w:docDefaults", &[]);
    w.open("w:rPrDefault", &[]);
    w.open("w:rPr", &[]);
    properties::write_run(&mut w, &overrides);
    w.close();
    w.close();
    w.open("w:pPrDefault", &[]);
    w.open("w:pPr", &[]);
    properties::write_paragraph(&mut w, &overrides, numbering);
    w.close();
    w.close();
    w.close();
    if properties::has_table(&overrides) {
        report.warn(
            "docx.defaults.table",
            FeatureCategory::Styles,
            WarningSeverity::Minor,
            "Document defaults for table borders, padding and shading are not kept",
        );
    }

    let default_style = tree.styles().default_paragraph_style();
    let mut styles: Vec<&Style> = tree.styles().iter().collect();
    styles.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
    for style in styles {
        let mut attrs = vec![
            ("w:type", style_type_name(style.style_type)),
            ("w:styleId", style.id.as_str()),
        ];
        if default_style == Some(&style.id) {
            attrs.push(("w:default", "1"));
        }
        if !style.built_in {
            attrs.push(("w:customStyle", "1"));
        }
        w.open("w:style", &attrs);
        w.empty("w:name", &[("w:val", style.name.as_str())]);
        if let Some(base) = &style.based_on {
            w.empty("w:basedOn", &[("w:val", base.as_str())]);
        }
        if let Some(next) = &style.next_style {
            w.empty("w:next", &[("w:val", next.as_str())]);
        }
        match numbering.num_id(&style.id) {
            Some(num_id) if style.style_type == StyleType::List => {
                let num_id = num_id.to_string();
                w.open("w:pPr", &[]);
                w.open("w:numPr", &[]);
                w.empty("w:numId", &[("w:val", num_id.as_str())]);
                w.close();
                w.close();
            }
            _ => write_property_groups(&mut w, &style.properties, numbering),
        }
        w.close();
    }
    w.close();
    w.finish()
}

fn read_property_groups(el: &XmlElement, numbering: &Numbering) -> Formatting {
    let mut f = Formatting::new();
    if let Some(ppr) = el.child("pPr") {
        f = f.merged_with(&properties::read_paragraph(ppr, numbering));
    }
    if let Some(rpr) = el.child("rPr") {
        f = f.merged_with(&properties::read_run(rpr));
    }
    if let Some(tblpr) = el.child("tblPr") {
        f = f.merged_with(&properties::read_table(tblpr));
    }
    f
}

/// Load document defaults and styles into the builder. List styles take
/// their kind from `numbering`.
pub fn read_styles(root: &XmlElement, numbering: &Numbering, builder: &mut DocumentBuilder) {
    if let Some(defaults) = root.child("docDefaults") {
        let mut f = Formatting::new();
        if let Some(rpr) = defaults.child("rPrDefault").and_then(|d| d.child("rPr")) {
            f = f.merged_with(&properties::read_run(rpr));
        }
        if let Some(ppr) = defaults.child("pPrDefault").and_then(|d| d.child("pPr")) {
            f = f.merged_with(&properties::read_paragraph(ppr, numbering));
        }
        for (property, value) in f.iter() {
            builder.set_default(property, value.clone());
        }
    }

    let mut default_style = None;
    for el in root.children_named("style") {
        let Some(id) = el.attr("styleId") else {
            continue;
        };
        let style_type = style_type_for(el.attr("type").unwrap_or("paragraph"));
        let name = el.child_val("name").unwrap_or(id);
        let mut style = match style_type {
            StyleType::Paragraph => Style::paragraph(id, name),
            StyleType::Character => Style::character(id, name),
            StyleType::Table => Style::table(id, name),
            StyleType::List => {
                let kind = numbering.kind(&StyleId::from(id)).unwrap_or_default();
                Style::list_of(id, name, kind)
            }
        };
        if let Some(base) = el.child_val("basedOn") {
            style = style.with_based_on(base);
        }
        if let Some(next) = el.child_val("next") {
            style = style.with_next_style(next);
        }
        if el.attr("customStyle") != Some("1") {
            style = style.as_built_in();
        }
        // A list style's own numPr points back at itself
        if style_type != StyleType::List {
            style.properties = read_property_groups(el, numbering);
        }
        if style_type == StyleType::Paragraph && el.attr("default") == Some("1") {
            default_style = Some(StyleId::from(id));
        }
        builder.add_style(style);
    }
    if let Some(id) = default_style {
        builder.set_default_paragraph_style(id);
    }
}

// =============================================================================
// Theme
// =============================================================================

fn write_color(w: &mut XmlWriter, slot: &str, color: Color) {
    let hex = color.to_hex();
    w.open(slot, &[]);
    w.empty("a:srgbClr", &[("val", hex.as_str())]);
    w.close();
}

fn write_font(w: &mut XmlWriter, slot: &str, typeface: &str) {
    w.open(slot, &[]);
    w.empty("a:latin", &[("typeface", typeface)]);
    w.empty("a:ea", &[("typeface", "")]);
    w.empty("a:cs", &[("typeface", "")]);
    w.close();
}

/// `word/theme/theme1.xml`. Text, background, accent and highlight map to
/// dk1, lt1, accent1 and accent2.
pub fn write_theme(theme: &Theme, pretty: bool) -> String {
    let p = &theme.palette;
    let mut w = XmlWriter::new(pretty);
    w.open("a:theme", &[("xmlns:a", namespaces::A), ("name", theme.name.as_str())]);
    w.open("a:themeElements", &[]);

    w.open("a:clrScheme", &[("name", theme.name.as_str())]);
    write_color(&mut w, "a:dk1", p.text);
    write_color(&mut w, "a:lt1", p.background);
    write_color(&mut w, "a:dk2", p.text);
    write_color(&mut w, "a:lt2", p.background);
    write_color(&mut w, "a:accent1", p.accent);
    write_color(&mut w, "a:accent2", p.highlight);
    for slot in ["a:accent3", "a:accent4", "a:accent5", "a:accent6", "a:hlink", "a:folHlink"] {
        write_color(&mut w, slot, p.accent);
    }
    w.close();

    w.open("a:fontScheme", &[("name", theme.name.as_str())]);
    write_font(&mut w, "a:majorFont", &theme.heading_font);
    write_font(&mut w, "a:minorFont", &theme.body_font);
    w.close();

    w.open("a:fmtScheme", &[("name", theme.name.as_str())]);
    for list in ["a:fillStyleLst", "a:bgFillStyleLst"] {
        w.open(list, &[]);
        for _ in 0..3 {
            w.open("a:solidFill", &[]);
            w.empty("a:schemeClr", &[("val", "phClr")]);
            w.close();
        }
        w.close();
    }
    w.open("a:lnStyleLst", &[]);
    for width in ["6350", "12700", "19050"] {
        w.open("a:ln", &[("w", width)]);
        w.open("a:solidFill", &[]);
        w.empty("a:schemeClr", &[("val", "phClr")]);
        w.close();
        w.close();
    }
    w.close();
    w.open("a:effectStyleLst", &[]);
    for _ in 0..3 {
        w.open("a:effectStyle", &[]);
        w.empty("a:effectLst", &[]);
        w.close();
    }
    w.close();
    w.close();

    w.close();
    w.close();
    w.finish()
}

fn scheme_color(scheme: &XmlElement, slot: &str) -> Option<Color> {
    let el = scheme.child(slot)?;
    if let Some(srgb) = el.child("srgbClr") {
        return srgb.attr("val").and_then(Color::from_hex);
    }
    el.child("sysClr")
        .and_then(|s| s.attr("lastClr"))
        .and_then(Color::from_hex)
}

/// Theme from a theme part; missing slots keep the light theme's values
pub fn read_theme(root: &XmlElement) -> Theme {
    let mut theme = Theme::light();
    if let Some(name) = root.attr("name") {
        theme.name = name.to_string();
    }
    let Some(elements) = root.child("themeElements") else {
        return theme;
    };
    if let Some(scheme) = elements.child("clrScheme") {
        let base = &theme.palette;
        theme.palette = ThemePalette {
            text: scheme_color(scheme, "dk1").unwrap_or(base.text),
            background: scheme_color(scheme, "lt1").unwrap_or(base.background),
            accent: scheme_color(scheme, "accent1").unwrap_or(base.accent),
            highlight: scheme_color(scheme, "accent2").unwrap_or(base.highlight),
        };
    }
    if let Some(fonts) = elements.child("fontScheme") {
        let typeface = |slot: &str| {
            fonts
                .child(slot)
                .and_then(|f| f.child("latin"))
                .and_then(|l| l.attr("typeface"))
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        if let Some(heading) = typeface("majorFont") {
            theme.heading_font = heading;
        }
        if let Some(body) = typeface("minorFont") {
            theme.body_font = body;
        }
    }
    theme
}

// =============================================================================
// Core properties
// =============================================================================

/// `docProps/core.xml`
pub fn write_core(meta: &DocumentMetadata, pretty: bool) -> String {
    let mut w = XmlWriter::new(pretty);
    w.open(
        "cp:coreProperties",
        &[
            ("xmlns:cp", namespaces::CP),
            ("xmlns:dc", namespaces::DC),
            ("xmlns:dcterms", namespaces::DCTERMS),
            ("xmlns:xsi", namespaces::XSI),
        ],
    );
    if let Some(title) = &meta.title {
        w.leaf("dc:title", &[], title);
    }
    if let Some(subject) = &meta.subject {
        w.leaf("dc:subject", &[], subject);
    }
    if let Some(author) = &meta.author {
        w.leaf("dc:creator", &[], author);
    }
    if !meta.keywords.is_empty() {
        w.leaf("cp:keywords", &[], &meta.keywords_joined());
    }
    for (name, date) in [("dcterms:created", meta.created), ("dcterms:modified", meta.modified)] {
        if let Some(date) = date {
            w.leaf(name, &[("xsi:type", "dcterms:W3CDTF")], &format_date(&date));
        }
    }
    w.close();
    w.finish()
}

pub fn read_core(root: &XmlElement) -> DocumentMetadata {
    let text = |name: &str| {
        root.child(name)
            .map(|e| e.text().trim().to_string())
            .filter(|t| !t.is_empty())
    };
    DocumentMetadata {
        title: text("title"),
        author: text("creator"),
        subject: text("subject"),
        keywords: text("keywords")
            .map(|k| DocumentMetadata::parse_keywords(&k))
            .unwrap_or_default(),
        created: text("created").as_deref().and_then(parse_date),
        modified: text("modified").as_deref().and_then(parse_date),
    }
}

// =============================================================================
// Comments
// =============================================================================

/// Generated comment parts
pub struct CommentParts {
    pub comments: String,
    pub extended: String,
}

fn para_id(n: usize) -> String {
    format!("{:08X}", 0x1000_0000 + n)
}

fn write_comment_body(w: &mut XmlWriter, body: &str, para: &str) {
    let lines: Vec<&str> = body.split('\n').collect();
    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate() {
        if i == last {
            w.open("w:p", &[("w14:paraId", para)]);
        } else {
            w.open("w:p", &[]);
        }
        if !line.is_empty() {
            w.open("w:r", &[]);
            w.leaf("w:t", &[("xml:space", "preserve")], line);
            w.close();
        }
        w.close();
    }
}

/// `word/comments.xml` and `word/commentsExtended.xml` for the comments
/// placed in the view. Comment `i` gets id `i`; replies are numbered after
/// all comments.
pub fn write_comments(view: &ExportView<'_>, pretty: bool) -> Option<CommentParts> {
    let comments = view.comments();
    if comments.is_empty() {
        return None;
    }
    let mut w = XmlWriter::new(pretty);
    let mut ex = XmlWriter::new(pretty);
    w.open(
        "w:comments",
        &[("xmlns:w", namespaces::W), ("xmlns:w14", namespaces::W14)],
    );
    ex.open("w15:commentsEx", &[("xmlns:w15", namespaces::W15)]);

    let mut next_reply = comments.len();
    for (i, comment) in comments.iter().enumerate() {
        let id = i.to_string();
        let date = format_date(&comment.created);
        let para = para_id(i);
        w.open(
            "w:comment",
            &[
                ("w:id", id.as_str()),
                ("w:author", comment.author.as_str()),
                ("w:date", date.as_str()),
            ],
        );
        write_comment_body(&mut w, &comment.body, &para);
        w.close();
        ex.empty(
            "w15:commentEx",
            &[("w15:paraId", para.as_str()), ("w15:done", if comment.resolved { "1" } else { "0" })],
        );

        for reply in &comment.replies {
            let reply_id = next_reply.to_string();
            let reply_para = para_id(next_reply);
            next_reply += 1;
            let date = format_date(&reply.created);
            w.open(
                "w:comment",
                &[
                    ("w:id", reply_id.as_str()),
                    ("w:author", reply.author.as_str()),
                    ("w:date", date.as_str()),
                ],
            );
            write_comment_body(&mut w, &reply.body, &reply_para);
            w.close();
            ex.empty(
                "w15:commentEx",
                &[
                    ("w15:paraId", reply_para.as_str()),
                    ("w15:paraIdParent", para.as_str()),
                    ("w15:done", if reply.resolved { "1" } else { "0" }),
                ],
            );
        }
    }
    w.close();
    ex.close();
    Some(CommentParts {
        comments: w.finish(),
        extended: ex.finish(),
    })
}

/// Comment drafts keyed by `w:id`, with threads and resolved state taken
/// from `commentsExtended` when present
pub fn read_comments(comments: &XmlElement, extended: Option<&XmlElement>) -> Vec<CommentDraft> {
    // paraId -> (parent paraId, done)
    let mut threads: HashMap<String, (Option<String>, bool)> = HashMap::new();
    if let Some(ex) = extended {
        for el in ex.children_named("commentEx") {
            if let Some(para) = el.attr("paraId") {
                threads.insert(
                    para.to_string(),
                    (el.attr("paraIdParent").map(str::to_string), el.attr("done") == Some("1")),
                );
            }
        }
    }

    let mut by_para: HashMap<String, String> = HashMap::new();
    let mut drafts: Vec<(Option<String>, CommentDraft)> = Vec::new();
    for el in comments.children_named("comment") {
        let Some(id) = el.attr("id") else {
            continue;
        };
        let paragraphs: Vec<&XmlElement> = el.children_named("p").collect();
        let body = paragraphs
            .iter()
            .map(|p| p.text())
            .collect::<Vec<_>>()
            .join("\n");
        let para = paragraphs.last().and_then(|p| p.attr("paraId")).map(str::to_string);
        let (parent_para, done) = para
            .as_ref()
            .and_then(|p| threads.get(p).cloned())
            .unwrap_or((None, false));
        if let Some(para) = &para {
            by_para.insert(para.clone(), id.to_string());
        }
        drafts.push((
            parent_para,
            CommentDraft {
                key: id.to_string(),
                author: el.attr("author").unwrap_or_default().to_string(),
                created: el.attr("date").and_then(parse_date),
                body,
                resolved: done,
                parent: None,
            },
        ));
    }
    drafts
        .into_iter()
        .map(|(parent_para, mut draft)| {
            draft.parent = parent_para.and_then(|p| by_para.get(&p).cloned());
            draft
        })
        .collect()
}

// =============================================================================
// Headers and footers
// =============================================================================

/// A header (`w:hdr`) or footer (`w:ftr`) part with one paragraph per line
pub fn write_header_footer(tag: &str, text: &str, pretty: bool) -> String {
    let mut w = XmlWriter::new(pretty);
    w.open(tag, &[("xmlns:w", namespaces::W), ("xmlns:r", namespaces::R)]);
    for line in text.split('\n') {
        w.open("w:p", &[]);
        if !line.is_empty() {
            w.open("w:r", &[]);
            w.leaf("w:t", &[("xml:space", "preserve")], line);
            w.close();
        }
        w.close();
    }
    w.close();
    w.finish()
}

pub fn read_header_footer(root: &XmlElement) -> String {
    root.children_named("p")
        .map(|p| p.text())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse;
    use crate::{DocumentSnapshot, Format};
    use chrono::{TimeZone, Utc};
    use doc_model::{NodeKind, Property, PropertyValue};
    use revisions::{Comment, CommentAnchor, CommentReply, Overlay, OverlayOp, ViewMode};

    #[test]
    fn test_styles_round_trip() {
        let mut tree = DocumentTree::new();
        tree.put_style(
            Style::paragraph("Note", "Note")
                .with_based_on("Normal")
                .with_property(Property::Italic, true),
        )
        .unwrap();
        tree.defaults_mut().set(Property::FontSize, PropertyValue::Points(12.0));
        let mut report = FidelityReport::export(Format::Docx);
        let xml = write_styles(&tree, &Numbering::default(), false, &mut report);
        assert!(report.is_empty());

        let mut builder = DocumentBuilder::new(Format::Docx);
        read_styles(&parse(&xml, Format::Docx).unwrap(), &Numbering::default(), &mut builder);
        let loaded = builder.tree();
        assert_eq!(loaded.styles().get(&StyleId::from("Note")), tree.styles().get(&StyleId::from("Note")));
        assert_eq!(loaded.defaults().get(Property::FontSize), PropertyValue::Points(12.0));
        assert_eq!(
            loaded.styles().default_paragraph_style(),
            Some(&StyleId::from("Normal"))
        );
    }

    #[test]
    fn test_theme_round_trip() {
        let theme = Theme::sepia();
        let xml = write_theme(&theme, true);
        assert_eq!(read_theme(&parse(&xml, Format::Docx).unwrap()), theme);
    }

    #[test]
    fn test_core_round_trip() {
        let meta = DocumentMetadata {
            title: Some("Report".into()),
            author: Some("Ada".into()),
            subject: None,
            keywords: vec!["alpha".into(), "beta".into()],
            created: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()),
            modified: None,
        };
        let xml = write_core(&meta, false);
        assert_eq!(read_core(&parse(&xml, Format::Docx).unwrap()), meta);
    }

    #[test]
    fn test_comments_with_replies() {
        let tree = DocumentTree::blank();
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let mut comment = Comment::new(CommentAnchor::Node(para), "ann", "first line\nsecond");
        comment.resolved = true;
        comment.add_reply(CommentReply::new("ben", "agreed"));
        let mut overlay = Overlay::new();
        OverlayOp::AddComment(comment).apply(&mut overlay).unwrap();
        let doc = DocumentSnapshot::new(tree, overlay);
        let view = ExportView::new(&doc, ViewMode::Markup);

        let parts = write_comments(&view, false).unwrap();
        let drafts = read_comments(
            &parse(&parts.comments, Format::Docx).unwrap(),
            Some(&parse(&parts.extended, Format::Docx).unwrap()),
        );
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].key, "0");
        assert_eq!(drafts[0].body, "first line\nsecond");
        assert!(drafts[0].resolved);
        assert_eq!(drafts[1].author, "ben");
        assert_eq!(drafts[1].parent.as_deref(), Some("0"));
    }
}
