//! DOCX package reader
//!
//! Follows the relationships from `_rels/.rels` to the main document and
//! from there to styles, theme, comments, headers and media, then walks the
//! body into a [`DocumentBuilder`].

use super::numbering::{self, Numbering};
use super::package::{rels_path, resolve_target, Relationships};
use super::parts;
use super::properties;
use super::relationship_types as rel;
use crate::archive::ArchiveReader;
use crate::builder::{ChangeInfo, DocumentBuilder};
use crate::view::Mark;
use crate::xml::{self, parse_date, XmlElement};
use crate::{CodecError, CodecResult, FeatureCategory, Format, Imported, WarningSeverity};
use doc_model::{
    FieldKind, Formatting, ImageObject, NodeId, Property, SectionProperties, StyleId,
};

const EMU_PER_POINT: f32 = 12_700.0;

pub fn read(bytes: &[u8]) -> CodecResult<Imported> {
    let mut archive = ArchiveReader::new(bytes, Format::Docx)?;
    let root_rels = match archive.read_optional_string("_rels/.rels")? {
        Some(content) => Relationships::parse(&content)?,
        None => Relationships::new(),
    };
    let document_part = root_rels
        .by_type(rel::DOCUMENT)
        .map(|r| resolve_target("", &r.target))
        .unwrap_or_else(|| "word/document.xml".to_string());
    let rels = match archive.read_optional_string(&rels_path(&document_part))? {
        Some(content) => Relationships::parse(&content)?,
        None => Relationships::new(),
    };
    let document = xml::parse(&archive.read_string(&document_part)?, Format::Docx)?;
    if !document.is("document") {
        return Err(CodecError::malformed(
            Format::Docx,
            format!("main part root is <{}>, not <w:document>", document.name),
        ));
    }
    let body = document
        .child("body")
        .ok_or_else(|| CodecError::malformed(Format::Docx, "document has no body"))?;

    let mut builder = DocumentBuilder::new(Format::Docx);
    let related = |archive: &mut ArchiveReader<'_>, rel_type: &str| -> CodecResult<Option<XmlElement>> {
        let Some(r) = rels.by_type(rel_type) else {
            return Ok(None);
        };
        match archive.read_optional_string(&resolve_target(&document_part, &r.target))? {
            Some(content) => xml::parse(&content, Format::Docx).map(Some),
            None => Ok(None),
        }
    };

    if let Some(theme) = related(&mut archive, rel::THEME)? {
        builder.set_theme(parts::read_theme(&theme));
    }
    let numbering = match related(&mut archive, rel::NUMBERING)? {
        Some(part) => numbering::read_numbering(&part),
        None => Numbering::default(),
    };
    for style in numbering.styles() {
        builder.add_style(style);
    }
    if let Some(styles) = related(&mut archive, rel::STYLES)? {
        parts::read_styles(&styles, &numbering, &mut builder);
    }
    if let Some(core) = root_rels.by_type(rel::CORE_PROPERTIES) {
        if let Some(content) = archive.read_optional_string(&resolve_target("", &core.target))? {
            builder.set_metadata(parts::read_core(&xml::parse(&content, Format::Docx)?));
        }
    }
    if let Some(comments) = related(&mut archive, rel::COMMENTS)? {
        let extended = related(&mut archive, rel::COMMENTS_EXTENDED)?;
        for draft in parts::read_comments(&comments, extended.as_ref()) {
            builder.add_comment(draft);
        }
    }

    let mut reader = BodyReader {
        archive,
        rels: &rels,
        part: &document_part,
        builder,
        numbering,
        after_table: false,
        field: None,
    };
    reader.body(body)?;
    tracing::debug!(part = %document_part, "Read DOCX body");
    reader.builder.finish()
}

/// Complex field being collected between `fldChar` markers
struct FieldState {
    instruction: String,
    result: String,
    in_result: bool,
    depth: usize,
    style: Option<StyleId>,
    formatting: Formatting,
}

struct BodyReader<'a, 'b> {
    archive: ArchiveReader<'b>,
    rels: &'a Relationships,
    part: &'a str,
    builder: DocumentBuilder,
    numbering: Numbering,
    /// The previous block was a table; an empty paragraph carrying only a
    /// section break after it is the writer's filler
    after_table: bool,
    field: Option<FieldState>,
}

fn change_info(el: &XmlElement) -> (String, ChangeInfo) {
    let key = format!("c{}", el.attr("id").unwrap_or_default());
    let info = ChangeInfo::new(
        el.attr("author").unwrap_or_default(),
        el.attr("date").and_then(parse_date),
    );
    (key, info)
}

fn has_content(p: &XmlElement) -> bool {
    p.elements().any(|e| !e.is("pPr"))
}

impl<'a, 'b> BodyReader<'a, 'b> {
    fn warn(&mut self, code: &str, category: FeatureCategory, severity: WarningSeverity, msg: &str) {
        self.builder.warn(code, category, severity, msg);
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn body(&mut self, body: &XmlElement) -> CodecResult<()> {
        self.builder.begin_section(SectionProperties::default())?;
        let mut pending_section = false;
        self.blocks(body, &mut pending_section)
    }

    fn blocks(&mut self, container: &XmlElement, pending_section: &mut bool) -> CodecResult<()> {
        for el in container.elements() {
            match el.local_name() {
                "p" | "tbl" => {
                    if *pending_section {
                        self.builder.begin_section(SectionProperties::default())?;
                        *pending_section = false;
                        self.after_table = false;
                    }
                    if el.is("p") {
                        if self.paragraph(el)? {
                            *pending_section = true;
                        }
                    } else {
                        self.table(el)?;
                    }
                }
                "sectPr" => {
                    let props = self.section_properties(el)?;
                    self.builder.set_section_properties(props)?;
                }
                "sdt" => {
                    if let Some(content) = el.child("sdtContent") {
                        self.blocks(content, pending_section)?;
                    }
                }
                "customXml" => self.blocks(el, pending_section)?,
                "commentRangeStart" => self.builder.comment_start(el.attr("id").unwrap_or_default()),
                "commentRangeEnd" => self.builder.comment_end(el.attr("id").unwrap_or_default()),
                "tcPr" | "bookmarkStart" | "bookmarkEnd" | "proofErr" | "permStart" | "permEnd" => {}
                other => self.builder.report_mut().unsupported_element(other),
            }
        }
        Ok(())
    }

    /// Read one paragraph. Returns true when it closes a section.
    fn paragraph(&mut self, p: &XmlElement) -> CodecResult<bool> {
        let ppr = p.child("pPr");
        let sect = ppr.and_then(|x| x.child("sectPr"));
        if let Some(sect) = sect {
            if self.after_table && !has_content(p) {
                let props = self.section_properties(sect)?;
                self.builder.set_section_properties(props)?;
                return Ok(true);
            }
        }
        let style = ppr.and_then(|x| x.child_val("pStyle")).map(StyleId::from);
        let formatting = ppr
            .map(|x| properties::read_paragraph(x, &self.numbering))
            .unwrap_or_default();
        let unknown_list = ppr
            .and_then(|x| x.child("numPr"))
            .and_then(|n| n.child_val("numId"))
            .and_then(|v| v.parse::<u32>().ok())
            .is_some_and(|n| n != 0 && self.numbering.list(n).is_none());
        if unknown_list {
            self.warn(
                "docx.lists.unknown",
                FeatureCategory::ParagraphFormatting,
                WarningSeverity::Minor,
                "Paragraph points at a list the package does not define; kept as a plain paragraph",
            );
        }
        let para = self.builder.begin_paragraph(style, formatting)?;
        self.after_table = false;

        if let Some(mark_rpr) = ppr.and_then(|x| x.child("rPr")) {
            for (name, mark) in [("ins", Mark::Inserted), ("del", Mark::Deleted)] {
                if let Some(m) = mark_rpr.child(name) {
                    let (key, info) = change_info(m);
                    self.builder.mark_block(&key, mark, info, para);
                }
            }
        }

        self.inline(p)?;
        self.flush_open_field()?;

        if let Some(change) = ppr.and_then(|x| x.child("pPrChange")) {
            let old = change
                .child("pPr")
                .map(|x| properties::read_paragraph(x, &self.numbering))
                .unwrap_or_default();
            self.format_changes(para, &old, change);
        }
        self.builder.end_paragraph();

        match sect {
            Some(sect) => {
                let props = self.section_properties(sect)?;
                self.builder.set_section_properties(props)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn table(&mut self, tbl: &XmlElement) -> CodecResult<()> {
        let tblpr = tbl.child("tblPr");
        let style = tblpr.and_then(|x| x.child_val("tblStyle")).map(StyleId::from);
        let formatting = tblpr.map(properties::read_table).unwrap_or_default();
        let table = self.builder.begin_table(style, formatting)?;
        if let Some(change) = tblpr.and_then(|x| x.child("tblPrChange")) {
            let old = change.child("tblPr").map(properties::read_table).unwrap_or_default();
            self.format_changes(table, &old, change);
        }

        for tr in tbl.children_named("tr") {
            let formatting = tr.child("tblPrEx").map(properties::read_table).unwrap_or_default();
            let row = self.builder.begin_row(formatting)?;
            if let Some(trpr) = tr.child("trPr") {
                self.block_marks(trpr, "ins", "del", row);
            }
            for tc in tr.children_named("tc") {
                let tcpr = tc.child("tcPr");
                if tcpr.is_some_and(|x| {
                    x.child("gridSpan").is_some() || x.child("vMerge").is_some() || x.child("hMerge").is_some()
                }) {
                    self.warn(
                        "docx.tables.merged_cells",
                        FeatureCategory::Tables,
                        WarningSeverity::Moderate,
                        "Merged cells split into separate cells",
                    );
                }
                let formatting = tcpr.map(properties::read_table).unwrap_or_default();
                let cell = self.builder.begin_cell(formatting)?;
                if let Some(tcpr) = tcpr {
                    self.block_marks(tcpr, "cellIns", "cellDel", cell);
                    if let Some(change) = tcpr.child("tcPrChange") {
                        let old = change.child("tcPr").map(properties::read_table).unwrap_or_default();
                        self.format_changes(cell, &old, change);
                    }
                }
                let mut pending = false;
                self.blocks(tc, &mut pending)?;
                if self.builder.tree().children(cell).is_empty() {
                    self.builder.begin_paragraph(None, Formatting::new())?;
                    self.builder.end_paragraph();
                }
                self.builder.end_cell();
            }
            self.builder.end_row();
        }
        self.builder.end_table();
        self.after_table = true;
        Ok(())
    }

    fn block_marks(&mut self, props: &XmlElement, ins: &str, del: &str, node: NodeId) {
        for (name, mark) in [(ins, Mark::Inserted), (del, Mark::Deleted)] {
            if let Some(m) = props.child(name) {
                let (key, info) = change_info(m);
                self.builder.mark_block(&key, mark, info, node);
            }
        }
    }

    fn section_properties(&mut self, sect: &XmlElement) -> CodecResult<SectionProperties> {
        let (rels, part) = (self.rels, self.part);
        let mut props = SectionProperties::default();
        for (tag, target) in [("headerReference", &mut props.header), ("footerReference", &mut props.footer)] {
            for reference in sect.children_named(tag) {
                if !matches!(reference.attr("type"), Some("default") | None) {
                    self.builder.warn(
                        "docx.headers.variants",
                        FeatureCategory::HeadersFooters,
                        WarningSeverity::Minor,
                        "First-page and even-page headers and footers dropped",
                    );
                    continue;
                }
                let Some(r) = reference.attr("id").and_then(|id| rels.get(id)) else {
                    continue;
                };
                let path = resolve_target(part, &r.target);
                if let Some(content) = self.archive.read_optional_string(&path)? {
                    *target = Some(parts::read_header_footer(&xml::parse(&content, Format::Docx)?));
                }
            }
        }
        props.page_number_start = sect
            .child("pgNumType")
            .and_then(|p| p.attr("start"))
            .and_then(|s| s.parse().ok());
        Ok(props)
    }

    // =========================================================================
    // Inline content
    // =========================================================================

    fn inline(&mut self, container: &XmlElement) -> CodecResult<()> {
        for el in container.elements() {
            match el.local_name() {
                "pPr" | "proofErr" | "permStart" | "permEnd" | "bookmarkEnd" => {}
                "r" => self.run(el)?,
                "ins" | "del" | "moveTo" | "moveFrom" => {
                    if matches!(el.local_name(), "moveTo" | "moveFrom") {
                        self.warn(
                            "docx.moves.flattened",
                            FeatureCategory::TrackChanges,
                            WarningSeverity::Minor,
                            "Tracked moves read as a deletion and an insertion",
                        );
                    }
                    let mark = if matches!(el.local_name(), "ins" | "moveTo") {
                        Mark::Inserted
                    } else {
                        Mark::Deleted
                    };
                    let (key, info) = change_info(el);
                    self.builder.begin_change(&key, mark, info);
                    self.inline(el)?;
                    self.builder.end_change(&key);
                }
                "hyperlink" => {
                    self.warn(
                        "docx.links.flattened",
                        FeatureCategory::Other,
                        WarningSeverity::Minor,
                        "Hyperlinks kept as plain text",
                    );
                    self.inline(el)?;
                }
                "smartTag" | "customXml" => self.inline(el)?,
                "sdt" => {
                    if let Some(content) = el.child("sdtContent") {
                        self.inline(content)?;
                    }
                }
                "fldSimple" => self.simple_field(el)?,
                "bookmarkStart" => {
                    let name = el.attr("name").unwrap_or_default();
                    // Word keeps hidden bookmarks (_GoBack, _Toc...) for itself
                    if !name.starts_with('_') {
                        self.builder.bookmark(name)?;
                    }
                }
                "commentRangeStart" => self.builder.comment_start(el.attr("id").unwrap_or_default()),
                "commentRangeEnd" => self.builder.comment_end(el.attr("id").unwrap_or_default()),
                other => self.builder.report_mut().unsupported_element(other),
            }
        }
        Ok(())
    }

    fn run(&mut self, r: &XmlElement) -> CodecResult<()> {
        let rpr = r.child("rPr");
        let style = rpr.and_then(|x| x.child_val("rStyle")).map(StyleId::from);
        let formatting = rpr.map(properties::read_run).unwrap_or_default();
        let change = rpr.and_then(|x| x.child("rPrChange"));
        let mut text = String::new();

        for el in r.elements() {
            match el.local_name() {
                "rPr" | "lastRenderedPageBreak" | "softHyphen" | "commentReference" => {}
                "t" | "delText" => text.push_str(&el.text()),
                "tab" => text.push('\t'),
                "noBreakHyphen" => text.push('-'),
                "br" | "cr" => {
                    if matches!(el.attr("type"), Some("page" | "column")) {
                        self.warn(
                            "docx.breaks.dropped",
                            FeatureCategory::ParagraphFormatting,
                            WarningSeverity::Minor,
                            "Page and column breaks inside paragraphs dropped",
                        );
                    } else {
                        text.push('\n');
                    }
                }
                "fldChar" => {
                    self.text(&mut text, &style, &formatting, change)?;
                    self.field_char(el, &style, &formatting)?;
                }
                "instrText" => {
                    if let Some(field) = self.field.as_mut() {
                        if !field.in_result && field.depth == 1 {
                            field.instruction.push_str(&el.text());
                        }
                    }
                }
                "drawing" => {
                    self.text(&mut text, &style, &formatting, change)?;
                    self.drawing(el)?;
                }
                "footnoteReference" | "endnoteReference" => self.warn(
                    "docx.notes.dropped",
                    FeatureCategory::Other,
                    WarningSeverity::Moderate,
                    "Footnotes and endnotes dropped",
                ),
                other => self.builder.report_mut().unsupported_element(other),
            }
        }
        self.text(&mut text, &style, &formatting, change)
    }

    /// Emit collected run text, or add it to the open field's result
    fn text(
        &mut self,
        text: &mut String,
        style: &Option<StyleId>,
        formatting: &Formatting,
        change: Option<&XmlElement>,
    ) -> CodecResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let collected = std::mem::take(text);
        if let Some(field) = self.field.as_mut() {
            if field.in_result {
                field.result.push_str(&collected);
            }
            return Ok(());
        }
        let node = self.builder.run(&collected, style.clone(), formatting.clone())?;
        if let (Some(node), Some(change)) = (node, change) {
            let old = change.child("rPr").map(properties::read_run).unwrap_or_default();
            self.format_changes(node, &old, change);
        }
        Ok(())
    }

    fn field_char(
        &mut self,
        el: &XmlElement,
        style: &Option<StyleId>,
        formatting: &Formatting,
    ) -> CodecResult<()> {
        match el.attr("fldCharType") {
            Some("begin") => match self.field.as_mut() {
                Some(field) => field.depth += 1,
                None => {
                    self.field = Some(FieldState {
                        instruction: String::new(),
                        result: String::new(),
                        in_result: false,
                        depth: 1,
                        style: style.clone(),
                        formatting: formatting.clone(),
                    })
                }
            },
            Some("separate") => {
                if let Some(field) = self.field.as_mut() {
                    if field.depth == 1 {
                        field.in_result = true;
                    }
                }
            }
            Some("end") => {
                let done = match self.field.as_mut() {
                    Some(field) if field.depth > 1 => {
                        field.depth -= 1;
                        false
                    }
                    Some(_) => true,
                    None => false,
                };
                if done {
                    self.flush_open_field()?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Close a collected field; a field left open at the paragraph end is
    /// closed there
    fn flush_open_field(&mut self) -> CodecResult<()> {
        if let Some(field) = self.field.take() {
            self.builder.field(
                FieldKind::parse(&field.instruction),
                &field.result,
                field.style,
                field.formatting,
            )?;
        }
        Ok(())
    }

    fn simple_field(&mut self, el: &XmlElement) -> CodecResult<()> {
        let instruction = el.attr("instr").unwrap_or_default();
        let runs: Vec<&XmlElement> = el.children_named("r").collect();
        let rpr = runs.first().and_then(|r| r.child("rPr"));
        let style = rpr.and_then(|x| x.child_val("rStyle")).map(StyleId::from);
        let formatting = rpr.map(properties::read_run).unwrap_or_default();
        let result: String = runs.iter().map(|r| r.text()).collect();
        let node = self
            .builder
            .field(FieldKind::parse(instruction), &result, style, formatting)?;
        if let Some(change) = rpr.and_then(|x| x.child("rPrChange")) {
            let old = change.child("rPr").map(properties::read_run).unwrap_or_default();
            self.format_changes(node, &old, change);
        }
        Ok(())
    }

    fn drawing(&mut self, drawing: &XmlElement) -> CodecResult<()> {
        let Some(frame) = drawing.child("inline").or_else(|| drawing.child("anchor")) else {
            return Ok(());
        };
        if frame.is("anchor") {
            self.warn(
                "docx.images.floating",
                FeatureCategory::Images,
                WarningSeverity::Minor,
                "Floating image placed inline",
            );
        }
        let Some(embed) = frame.find("blip").and_then(|b| b.attr("embed")) else {
            self.warn(
                "docx.drawings.dropped",
                FeatureCategory::Images,
                WarningSeverity::Moderate,
                "Drawing without a picture dropped",
            );
            return Ok(());
        };
        let path = self
            .rels
            .get(embed)
            .map(|r| resolve_target(self.part, &r.target));
        let data = match &path {
            Some(path) => self.archive.read_optional_bytes(path)?,
            None => None,
        };
        let (Some(path), Some(data)) = (path, data) else {
            self.warn(
                "docx.images.missing",
                FeatureCategory::Images,
                WarningSeverity::Major,
                "Image part missing from the package",
            );
            return Ok(());
        };
        let extension = path.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
        let extent = frame.child("extent");
        let size = |name: &str| {
            extent
                .and_then(|e| e.attr(name))
                .and_then(|v| v.parse::<f32>().ok())
                .map(|emu| emu / EMU_PER_POINT)
                .unwrap_or(0.0)
        };
        let image = ImageObject {
            content_type: ImageObject::content_type_for_extension(extension).to_string(),
            data,
            width: size("cx"),
            height: size("cy"),
            alt_text: frame
                .child("docPr")
                .and_then(|d| d.attr("descr"))
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        };
        self.builder.image(image)?;
        Ok(())
    }

    // =========================================================================
    // Format changes
    // =========================================================================

    /// Record a tracked change for every property whose old value differs
    /// from the node's current direct formatting
    fn format_changes(&mut self, node: NodeId, old: &Formatting, change: &XmlElement) {
        let Ok(current) = self.builder.tree().node(node).map(|n| n.direct_formatting().clone()) else {
            return;
        };
        let (_, info) = change_info(change);
        for property in Property::ALL {
            let before = old.get(property);
            if before != current.get(property) {
                self.builder
                    .format_change(node, property, before.cloned(), info.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use doc_model::{NodeKind, PropertyValue};
    use revisions::{ChangeKind, CommentAnchor};

    const W: &str = super::super::namespaces::W;

    fn package(body: &str, comments: Option<&str>) -> Vec<u8> {
        let mut zip = ArchiveWriter::new();
        zip.add(
            "_rels/.rels",
            format!(
                r#"<Relationships xmlns="x"><Relationship Id="rId1" Type="{}" Target="word/document.xml"/></Relationships>"#,
                rel::DOCUMENT
            )
            .as_bytes(),
        )
        .unwrap();
        let mut rels = String::from(r#"<Relationships xmlns="x">"#);
        if comments.is_some() {
            rels.push_str(&format!(
                r#"<Relationship Id="rId9" Type="{}" Target="comments.xml"/>"#,
                rel::COMMENTS
            ));
        }
        rels.push_str("</Relationships>");
        zip.add("word/_rels/document.xml.rels", rels.as_bytes()).unwrap();
        zip.add(
            "word/document.xml",
            format!(r#"<w:document xmlns:w="{W}"><w:body>{body}</w:body></w:document>"#).as_bytes(),
        )
        .unwrap();
        if let Some(comments) = comments {
            zip.add(
                "word/comments.xml",
                format!(r#"<w:comments xmlns:w="{W}">{comments}</w:comments>"#).as_bytes(),
            )
            .unwrap();
        }
        zip.finish().unwrap()
    }

    #[test]
    fn test_paragraphs_and_runs() {
        let bytes = package(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>
               <w:p><w:r><w:rPr><w:b/></w:rPr><w:t xml:space="preserve">bold </w:t></w:r><w:r><w:t>plain</w:t><w:tab/><w:t>x</w:t></w:r></w:p>"#,
            None,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(tree.node(paragraphs[0]).unwrap().style_ref(), Some(&StyleId::from("Heading1")));
        assert_eq!(tree.text_of(paragraphs[1]), "bold plain\tx");
        let runs = tree.children(paragraphs[1]);
        assert_eq!(
            tree.node(runs[0]).unwrap().direct_formatting().get(Property::Bold),
            Some(&PropertyValue::Bool(true))
        );
    }

    #[test]
    fn test_tracked_changes() {
        let bytes = package(
            r#"<w:p><w:r><w:t>keep </w:t></w:r>
               <w:ins w:id="1" w:author="ann" w:date="2024-01-02T03:04:05Z"><w:r><w:t>new</w:t></w:r></w:ins>
               <w:del w:id="2" w:author="bob"><w:r><w:delText>old</w:delText></w:r></w:del>
               <w:r><w:rPr><w:i/><w:rPrChange w:id="3" w:author="cy"><w:rPr/></w:rPrChange></w:rPr><w:t>slanted</w:t></w:r></w:p>"#,
            None,
        );
        let imported = read(&bytes).unwrap();
        let changes = imported.document.overlay.changes();
        assert_eq!(changes.len(), 3);
        assert!(changes[0].is_insertion());
        assert_eq!(changes[0].author, "ann");
        assert!(changes[1].is_deletion());
        match &changes[2].kind {
            ChangeKind::FormatChange { property, old, new, .. } => {
                assert_eq!(*property, Property::Italic);
                assert_eq!(*old, None);
                assert_eq!(*new, Some(PropertyValue::Bool(true)));
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn test_complex_field_and_bookmarks() {
        let bytes = package(
            r#"<w:p><w:bookmarkStart w:id="0" w:name="_GoBack"/><w:bookmarkStart w:id="1" w:name="intro"/><w:bookmarkEnd w:id="1"/>
               <w:r><w:fldChar w:fldCharType="begin"/></w:r><w:r><w:instrText> PAGE </w:instrText></w:r>
               <w:r><w:fldChar w:fldCharType="separate"/></w:r><w:r><w:t>7</w:t></w:r><w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#,
            None,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        assert!(tree.bookmark("intro").is_some());
        assert!(tree.bookmark("_GoBack").is_none());
        let fields = tree.nodes_of_kind(NodeKind::FieldReference);
        assert_eq!(fields.len(), 1);
        match tree.node(fields[0]).unwrap().data() {
            doc_model::NodeData::FieldReference(f) => {
                assert_eq!(f.kind, FieldKind::Page);
                assert_eq!(f.result, "7");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comment_range() {
        let bytes = package(
            r#"<w:p><w:commentRangeStart w:id="5"/><w:r><w:t>noted</w:t></w:r><w:commentRangeEnd w:id="5"/><w:r><w:commentReference w:id="5"/></w:r></w:p>"#,
            Some(r#"<w:comment w:id="5" w:author="ann"><w:p><w:r><w:t>why?</w:t></w:r></w:p></w:comment>"#),
        );
        let imported = read(&bytes).unwrap();
        let comments = imported.document.overlay.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "why?");
        assert!(matches!(comments[0].anchor, CommentAnchor::Text { .. }));
    }

    #[test]
    fn test_sections_and_tables() {
        let bytes = package(
            r#"<w:tbl><w:tblPr/><w:tr><w:tc><w:p><w:r><w:t>a</w:t></w:r></w:p></w:tc><w:tc/></w:tr></w:tbl>
               <w:p><w:pPr><w:sectPr><w:pgNumType w:start="3"/></w:sectPr></w:pPr></w:p>
               <w:p><w:r><w:t>second</w:t></w:r></w:p><w:sectPr/>"#,
            None,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        let sections = tree.nodes_of_kind(NodeKind::Section);
        assert_eq!(sections.len(), 2);
        // The filler paragraph after the table is not content
        assert_eq!(tree.children(sections[0]).len(), 1);
        match tree.node(sections[0]).unwrap().data() {
            doc_model::NodeData::Section(p) => assert_eq!(p.page_number_start, Some(3)),
            other => panic!("unexpected {other:?}"),
        }
        let cells = tree.nodes_of_kind(NodeKind::TableCell);
        assert_eq!(cells.len(), 2);
        assert_eq!(tree.children(cells[1]).len(), 1);
    }

    #[test]
    fn test_numbering_without_definition_is_reported() {
        let bytes = package(
            r#"<w:p><w:pPr><w:numPr><w:ilvl w:val="1"/><w:numId w:val="4"/></w:numPr></w:pPr><w:r><w:t>item</w:t></w:r></w:p>"#,
            None,
        );
        let imported = read(&bytes).unwrap();
        let tree = &imported.document.tree;
        let para = tree.nodes_of_kind(NodeKind::Paragraph)[0];
        let formatting = tree.node(para).unwrap().direct_formatting();
        assert_eq!(formatting.get(Property::ListStyle), None);
        assert!(imported.report.has_code("docx.lists.unknown"));
    }

    #[test]
    fn test_not_a_package_is_malformed() {
        assert!(read(b"plain bytes").unwrap_err().is_malformed());
        let bytes = package("", None);
        let mut zip = ArchiveWriter::new();
        zip.add("word/document.xml", b"<w:document xmlns:w=\"w\"/>").unwrap();
        assert!(read(&zip.finish().unwrap()).unwrap_err().is_malformed());
        assert!(read(&bytes).is_ok());
    }
}
