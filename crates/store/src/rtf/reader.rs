//! RTF reader
//!
//! Walks the group tree with a formatting state that is saved at every `{`
//! and restored at the matching `}`. Text is buffered while the character
//! state stays the same and becomes one run. Paragraphs, tables and
//! sections are opened when the first content that needs them arrives.

use super::lexer::{self, destination, Item};
use super::properties::{self, from_dttm, Lookup, TableLevel};
use crate::builder::{ChangeInfo, DocumentBuilder};
use crate::view::Mark;
use crate::{CodecResult, FeatureCategory, Format, Imported, WarningSeverity};
use chrono::{TimeZone, Utc};
use doc_model::{
    Color, DocumentMetadata, FieldKind, Formatting, ImageObject, NodeId, NodeKind, Property,
    PropertyValue, SectionProperties, Style, StyleId, StyleType,
};
use std::collections::{HashMap, HashSet};

pub fn read(bytes: &[u8]) -> CodecResult<Imported> {
    let items = lexer::parse(bytes)?;
    let mut reader = RtfReader::new();
    reader.items(&items)?;
    reader.finish()
}

/// Revision words in effect: mark, author table index and packed date
#[derive(Debug, Clone, PartialEq)]
struct Revision {
    mark: Mark,
    author: i32,
    date: i32,
}

#[derive(Debug, Clone)]
struct State {
    chars: Formatting,
    char_style: Option<i32>,
    para: Formatting,
    para_style: Option<i32>,
    in_table: bool,
    revision: Option<Revision>,
    /// Fallback characters written after each `\uN`
    uc: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            chars: Formatting::new(),
            char_style: None,
            para: Formatting::new(),
            para_style: None,
            in_table: false,
            revision: None,
            uc: 1,
        }
    }
}

/// What makes two pieces of text the same run
type RunKey = (Option<i32>, Formatting, Option<Revision>);

/// Table row definition from `\trowd` to the next one
#[derive(Debug, Default)]
struct RowDef {
    table_style: Option<i32>,
    table: Formatting,
    cells: Vec<Formatting>,
    /// Cell formatting before its `\cellx`
    pending: Formatting,
    /// Level the next border width applies to
    border: Option<TableLevel>,
}

/// Text of a field result, with the state of its first character
#[derive(Debug, Default)]
struct Capture {
    text: String,
    first: Option<RunKey>,
}

struct RtfReader {
    builder: DocumentBuilder,
    lookup: Lookup,
    styles: HashMap<i32, StyleId>,
    authors: Vec<String>,
    state: State,
    saved: Vec<State>,
    pending: Option<(RunKey, String)>,
    capture: Option<Capture>,
    /// Fallback characters still to drop
    skip: usize,
    high_surrogate: Option<u16>,
    section: SectionProperties,
    section_open: bool,
    /// `\sect` seen; the next block starts a new section
    section_pending: bool,
    page_break: bool,
    row: RowDef,
    cell_index: usize,
    warned: HashSet<&'static str>,
}

impl RtfReader {
    fn new() -> Self {
        Self {
            builder: DocumentBuilder::new(Format::Rtf),
            lookup: Lookup::default(),
            styles: HashMap::new(),
            authors: Vec::new(),
            state: State::default(),
            saved: Vec::new(),
            pending: None,
            capture: None,
            skip: 0,
            high_surrogate: None,
            section: SectionProperties::default(),
            section_open: false,
            section_pending: false,
            page_break: false,
            row: RowDef::default(),
            cell_index: 0,
            warned: HashSet::new(),
        }
    }

    /// Warn once per code
    fn warn(
        &mut self,
        code: &'static str,
        category: FeatureCategory,
        severity: WarningSeverity,
        message: &str,
    ) {
        if self.warned.insert(code) {
            self.builder.warn(code, category, severity, message);
        }
    }

    fn style_id(&self, number: Option<i32>, kind: StyleType) -> Option<StyleId> {
        let id = self.styles.get(&number?)?;
        let style = self.builder.tree().styles().get(id)?;
        (style.style_type == kind).then(|| id.clone())
    }

    // =========================================================================
    // Groups
    // =========================================================================

    fn items(&mut self, items: &[Item]) -> CodecResult<()> {
        for item in items {
            match item {
                Item::Group(inner) => self.group(inner)?,
                Item::Word(name, param) => self.word(name, *param)?,
                Item::Symbol(symbol) => self.symbol(*symbol)?,
                Item::Text(text) => self.text(text)?,
                Item::Binary(_) => {}
            }
        }
        Ok(())
    }

    fn group(&mut self, items: &[Item]) -> CodecResult<()> {
        if let Some((name, ignorable)) = destination(items) {
            if self.destination(name, ignorable, items)? {
                return Ok(());
            }
        }
        self.saved.push(self.state.clone());
        let result = self.items(items);
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        self.skip = 0;
        result
    }

    /// Handle a destination group. Returns false for groups that are read
    /// as ordinary content.
    fn destination(&mut self, name: &str, ignorable: bool, items: &[Item]) -> CodecResult<bool> {
        match name {
            "fonttbl" => self.font_table(items),
            "colortbl" => self.color_table(items),
            "stylesheet" => self.stylesheet(items),
            "info" => self.info(items),
            "revtbl" => {
                self.authors = items
                    .iter()
                    .filter_map(|item| match item {
                        Item::Group(entry) => Some(entry_name(entry)),
                        _ => None,
                    })
                    .collect();
            }
            "defchp" | "defpap" => self.defaults(items),
            "header" | "footer" | "headerr" | "footerr" => {
                let text = plain_text(items);
                let text = text.trim_end_matches('\n');
                let text = (!text.is_empty()).then(|| text.to_string());
                if name.starts_with("header") {
                    self.section.header = text;
                } else {
                    self.section.footer = text;
                }
                self.sync_section()?;
            }
            "headerl" | "headerf" | "footerl" | "footerf" => self.warn(
                "rtf.headers.variants",
                FeatureCategory::HeadersFooters,
                WarningSeverity::Minor,
                "First page and left page headers and footers dropped",
            ),
            "field" => self.field(items)?,
            "bkmkstart" => {
                let name = plain_text(after_destination(items)).trim().to_string();
                self.flush()?;
                self.ensure_paragraph()?;
                self.builder.bookmark(&name)?;
            }
            "pict" => self.picture(items)?,
            // Read the picture inside, skipping the destination marker
            "shppict" => {
                self.saved.push(self.state.clone());
                self.items(after_destination(items))?;
                if let Some(state) = self.saved.pop() {
                    self.state = state;
                }
            }
            "annotation" => self.warn(
                "rtf.comments.dropped",
                FeatureCategory::Comments,
                WarningSeverity::Major,
                "Annotations dropped",
            ),
            "footnote" => self.warn(
                "rtf.footnotes.dropped",
                FeatureCategory::Other,
                WarningSeverity::Moderate,
                "Footnotes and endnotes dropped",
            ),
            "listtable" | "listoverridetable" => self.warn_lists(),
            "object" | "shp" => self.warn(
                "rtf.objects.dropped",
                FeatureCategory::Images,
                WarningSeverity::Moderate,
                "Embedded objects and drawing shapes dropped",
            ),
            "fldinst" | "fldrslt" => return Ok(false),
            "nonshppict" | "bkmkend" | "pntext" | "listtext" | "pn" | "atnid" | "atnauthor"
            | "atndate" | "atnref" | "filetbl" | "rsidtbl" | "generator" => {}
            _ if ignorable => {}
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn warn_lists(&mut self) {
        self.warn(
            "rtf.lists.flattened",
            FeatureCategory::ParagraphFormatting,
            WarningSeverity::Moderate,
            "List numbering dropped; list items read as plain paragraphs",
        );
    }

    // =========================================================================
    // Header tables
    // =========================================================================

    fn font_table(&mut self, items: &[Item]) {
        fn walk(items: &[Item], current: &mut Option<i32>, name: &mut String, fonts: &mut HashMap<i32, String>) {
            for item in items {
                match item {
                    Item::Word(word, Some(n)) if word == "f" => {
                        *current = Some(*n);
                        name.clear();
                    }
                    Item::Text(text) => {
                        for ch in text.chars() {
                            if ch == ';' {
                                if let Some(n) = current.take() {
                                    fonts.insert(n, name.trim().to_string());
                                }
                                name.clear();
                            } else {
                                name.push(ch);
                            }
                        }
                    }
                    Item::Group(inner) if !matches!(destination(inner), Some((_, true))) => {
                        walk(inner, current, name, fonts)
                    }
                    _ => {}
                }
            }
        }
        let (mut current, mut name) = (None, String::new());
        walk(items, &mut current, &mut name, &mut self.lookup.fonts);
    }

    fn color_table(&mut self, items: &[Item]) {
        let mut rgb: [Option<u8>; 3] = [None; 3];
        for item in items {
            match item {
                Item::Word(word, param) => {
                    let channel = match word.as_str() {
                        "red" => 0,
                        "green" => 1,
                        "blue" => 2,
                        _ => continue,
                    };
                    rgb[channel] = Some(param.unwrap_or(0).clamp(0, 255) as u8);
                }
                Item::Text(text) => {
                    for _ in text.chars().filter(|c| *c == ';') {
                        let color = match rgb {
                            [None, None, None] => None,
                            [r, g, b] => Some(Color::rgb(
                                r.unwrap_or(0),
                                g.unwrap_or(0),
                                b.unwrap_or(0),
                            )),
                        };
                        self.lookup.colors.push(color);
                        rgb = [None; 3];
                    }
                }
                _ => {}
            }
        }
    }

    fn stylesheet(&mut self, items: &[Item]) {
        struct Entry {
            number: i32,
            style_type: StyleType,
            based_on: Option<i32>,
            next: Option<i32>,
            formatting: Formatting,
            name: String,
        }

        let mut entries = Vec::new();
        for item in items {
            let Item::Group(group) = item else {
                continue;
            };
            let mut entry = Entry {
                number: 0,
                style_type: StyleType::Paragraph,
                based_on: None,
                next: None,
                formatting: Formatting::new(),
                name: String::new(),
            };
            let mut section_style = false;
            for part in group {
                match part {
                    Item::Word(word, param) => match word.as_str() {
                        "s" => entry.number = param.unwrap_or(0),
                        "cs" => {
                            entry.number = param.unwrap_or(0);
                            entry.style_type = StyleType::Character;
                        }
                        "ts" => {
                            entry.number = param.unwrap_or(0);
                            entry.style_type = StyleType::Table;
                        }
                        "ds" => section_style = true,
                        "sbasedon" => entry.based_on = *param,
                        "snext" => entry.next = *param,
                        _ => {
                            if !properties::apply_table(word, *param, &mut entry.formatting, &self.lookup) {
                                properties::apply(word, *param, &mut entry.formatting, &self.lookup);
                            }
                        }
                    },
                    Item::Text(text) => entry.name.push_str(text),
                    _ => {}
                }
            }
            if !section_style {
                entries.push(entry);
            }
        }

        for entry in &entries {
            let name = entry.name.trim().trim_end_matches(';').trim().to_string();
            let id: String = name.chars().filter(|c| !c.is_whitespace()).collect();
            let id = if id.is_empty() {
                format!("Style{}", entry.number)
            } else {
                id
            };
            self.styles.insert(entry.number, StyleId::from(id));
        }
        for entry in entries {
            let Some(id) = self.styles.get(&entry.number).cloned() else {
                continue;
            };
            let name = entry.name.trim().trim_end_matches(';').trim().to_string();
            let mut style = match entry.style_type {
                StyleType::Character => Style::character(id.clone(), name),
                StyleType::Table => Style::table(id.clone(), name),
                _ => Style::paragraph(id.clone(), name),
            };
            style.based_on = entry.based_on.and_then(|n| self.styles.get(&n).cloned());
            style.next_style = entry.next.and_then(|n| self.styles.get(&n).cloned());
            style.properties = entry.formatting;
            let is_default = entry.number == 0 && entry.style_type == StyleType::Paragraph;
            self.builder.add_style(style);
            if is_default {
                self.builder.set_default_paragraph_style(id);
            }
        }
    }

    fn info(&mut self, items: &[Item]) {
        let mut metadata = DocumentMetadata::default();
        for item in items {
            let Item::Group(group) = item else {
                continue;
            };
            let Some((name, _)) = destination(group) else {
                continue;
            };
            let text = || plain_text(after_destination(group)).trim().to_string();
            match name {
                "title" => metadata.title = Some(text()),
                "subject" => metadata.subject = Some(text()),
                "author" => metadata.author = Some(text()),
                "keywords" => metadata.keywords = DocumentMetadata::parse_keywords(&text()),
                "creatim" => metadata.created = info_date(group),
                "revtim" => metadata.modified = info_date(group),
                _ => {}
            }
        }
        self.builder.set_metadata(metadata);
    }

    fn defaults(&mut self, items: &[Item]) {
        let mut formatting = Formatting::new();
        for item in items {
            if let Item::Word(word, param) = item {
                properties::apply(word, *param, &mut formatting, &self.lookup);
            }
        }
        for (property, value) in formatting.iter() {
            self.builder.set_default(property, value.clone());
        }
    }

    // =========================================================================
    // Control words
    // =========================================================================

    fn word(&mut self, name: &str, param: Option<i32>) -> CodecResult<()> {
        if self.capture.is_some() && matches!(name, "cell" | "row" | "sect" | "page" | "nestcell") {
            return Ok(());
        }
        match name {
            "par" => self.paragraph_end()?,
            "sect" => self.section_break()?,
            "sectd" => {
                self.section = SectionProperties::default();
                self.sync_section()?;
            }
            "pgnstarts" => {
                self.section.page_number_start = param.and_then(|n| u32::try_from(n).ok());
                self.sync_section()?;
            }
            "pard" => {
                self.state.para = Formatting::new();
                self.state.para_style = None;
                self.state.in_table = false;
                self.row.border = None;
            }
            "plain" => {
                self.state.chars = Formatting::new();
                self.state.char_style = None;
            }
            "s" => self.state.para_style = Some(param.unwrap_or(0)),
            "cs" => self.state.char_style = param,
            "intbl" => self.state.in_table = true,
            "cell" => self.cell_end()?,
            "row" => self.row_end()?,
            "nestcell" | "nestrow" | "itap" | "nesttableprops" => {
                self.warn(
                    "rtf.tables.nested",
                    FeatureCategory::Tables,
                    WarningSeverity::Moderate,
                    "Nested tables flattened into their cells",
                );
                if name == "nestcell" {
                    self.paragraph_end()?;
                }
            }
            "trowd" => self.row = RowDef::default(),
            "ts" => self.row.table_style = param,
            "cellx" => {
                let cell = std::mem::take(&mut self.row.pending);
                self.row.cells.push(cell);
                self.row.border = None;
            }
            "revised" | "deleted" if param == Some(0) => self.state.revision = None,
            "revised" | "deleted" => {
                let mark = if name == "revised" { Mark::Inserted } else { Mark::Deleted };
                let revision = self.state.revision.get_or_insert(Revision {
                    mark,
                    author: 0,
                    date: 0,
                });
                revision.mark = mark;
            }
            "revauth" | "revauthdel" => {
                if let Some(revision) = &mut self.state.revision {
                    revision.author = param.unwrap_or(0);
                }
            }
            "revdttm" | "revdttmdel" => {
                if let Some(revision) = &mut self.state.revision {
                    revision.date = param.unwrap_or(0);
                }
            }
            "uc" => self.state.uc = usize::try_from(param.unwrap_or(1)).unwrap_or(1),
            "u" => {
                let unit = param.unwrap_or(0);
                let unit = (if unit < 0 { unit + 65536 } else { unit }) as u16;
                self.skip = self.state.uc;
                self.unicode(unit)?;
            }
            "tab" => self.push_text("\t")?,
            "line" => self.push_text("\n")?,
            "emdash" => self.push_text("\u{2014}")?,
            "endash" => self.push_text("\u{2013}")?,
            "emspace" => self.push_text("\u{2003}")?,
            "enspace" => self.push_text("\u{2002}")?,
            "bullet" => self.push_text("\u{2022}")?,
            "lquote" => self.push_text("\u{2018}")?,
            "rquote" => self.push_text("\u{2019}")?,
            "ldblquote" => self.push_text("\u{201C}")?,
            "rdblquote" => self.push_text("\u{201D}")?,
            "page" => {
                self.paragraph_end()?;
                self.page_break = true;
            }
            "ls" | "ilvl" => self.warn_lists(),
            "brdrt" | "brdrb" | "brdrl" | "brdrr" | "brdrbtw" | "brdrbar" | "box" => {
                self.row.border = None;
            }
            _ => self.formatting_word(name, param),
        }
        Ok(())
    }

    fn formatting_word(&mut self, name: &str, param: Option<i32>) {
        let level = match properties::table_level(name) {
            Some(level) => {
                self.row.border = Some(level);
                Some(level)
            }
            None if name.starts_with("brdr") => self.row.border,
            None => None,
        };
        if let Some(level) = level {
            let target = match level {
                TableLevel::Row => &mut self.row.table,
                TableLevel::Cell => &mut self.row.pending,
            };
            properties::apply_table(name, param, target, &self.lookup);
            return;
        }
        let target = if properties::is_paragraph_word(name) {
            &mut self.state.para
        } else {
            &mut self.state.chars
        };
        properties::apply(name, param, target, &self.lookup);
    }

    fn symbol(&mut self, symbol: char) -> CodecResult<()> {
        match symbol {
            '~' => self.push_text("\u{A0}"),
            '_' => self.push_text("\u{2011}"),
            _ => Ok(()),
        }
    }

    fn unicode(&mut self, unit: u16) -> CodecResult<()> {
        let decoded = match (self.high_surrogate.take(), unit) {
            (None, 0xD800..=0xDBFF) => {
                self.high_surrogate = Some(unit);
                return Ok(());
            }
            (Some(high), 0xDC00..=0xDFFF) => char::decode_utf16([high, unit]).next(),
            (_, unit) => char::decode_utf16([unit]).next(),
        };
        let ch = decoded.and_then(Result::ok).unwrap_or(char::REPLACEMENT_CHARACTER);
        self.push_text(&ch.to_string())
    }

    fn text(&mut self, text: &str) -> CodecResult<()> {
        let mut chars = text.chars();
        while self.skip > 0 {
            if chars.next().is_none() {
                return Ok(());
            }
            self.skip -= 1;
        }
        let rest = chars.as_str();
        if rest.is_empty() {
            return Ok(());
        }
        self.push_text(rest)
    }

    // =========================================================================
    // Content
    // =========================================================================

    fn key(&self) -> RunKey {
        (
            self.state.char_style,
            self.state.chars.clone(),
            self.state.revision.clone(),
        )
    }

    fn push_text(&mut self, text: &str) -> CodecResult<()> {
        let key = self.key();
        if let Some(capture) = &mut self.capture {
            capture.first.get_or_insert(key);
            capture.text.push_str(text);
            return Ok(());
        }
        if let Some((pending, buffer)) = &mut self.pending {
            if *pending == key {
                buffer.push_str(text);
                return Ok(());
            }
        }
        self.flush()?;
        self.pending = Some((key, text.to_string()));
        Ok(())
    }

    /// Turn buffered text into a run
    fn flush(&mut self) -> CodecResult<()> {
        let Some(((style, formatting, revision), text)) = self.pending.take() else {
            return Ok(());
        };
        self.ensure_paragraph()?;
        let style = self.style_id(style, StyleType::Character);
        self.with_revision(revision.as_ref(), |builder| {
            builder.run(&text, style, formatting).map(|_| ())
        })
    }

    fn change(&self, revision: &Revision) -> (String, ChangeInfo) {
        let author = usize::try_from(revision.author)
            .ok()
            .and_then(|i| self.authors.get(i))
            .cloned()
            .unwrap_or_default();
        let info = ChangeInfo::new(author, from_dttm(revision.date));
        let key = format!("{:?}|{}|{}", revision.mark, info.author, revision.date);
        (key, info)
    }

    fn with_revision(
        &mut self,
        revision: Option<&Revision>,
        add: impl FnOnce(&mut DocumentBuilder) -> CodecResult<()>,
    ) -> CodecResult<()> {
        let Some(revision) = revision else {
            return add(&mut self.builder);
        };
        let (key, info) = self.change(revision);
        self.builder.begin_change(&key, revision.mark, info);
        let result = add(&mut self.builder);
        self.builder.end_change(&key);
        result
    }

    fn open_section(&mut self) -> CodecResult<()> {
        self.builder.begin_section(self.section.clone())?;
        self.section_open = true;
        self.section_pending = false;
        Ok(())
    }

    /// Carry section property changes to the open section
    fn sync_section(&mut self) -> CodecResult<()> {
        if self.section_open && !self.section_pending {
            self.builder.set_section_properties(self.section.clone())?;
        }
        Ok(())
    }

    fn section_break(&mut self) -> CodecResult<()> {
        self.flush()?;
        self.builder.end_paragraph();
        self.builder.end_table();
        if self.section_pending || !self.section_open {
            self.open_section()?;
        }
        self.section_pending = true;
        Ok(())
    }

    /// Open the section, table, row and cell the next block goes into
    fn ensure_container(&mut self) -> CodecResult<()> {
        if self.section_pending || !self.section_open {
            self.open_section()?;
        }
        if !self.state.in_table {
            if self.builder.current(NodeKind::Table).is_some() {
                self.builder.end_table();
            }
            return Ok(());
        }
        if self.builder.current(NodeKind::Table).is_none() {
            let style = self.style_id(self.row.table_style, StyleType::Table);
            self.builder.begin_table(style, self.row.table.clone())?;
        }
        if self.builder.current(NodeKind::TableRow).is_none() {
            self.builder.begin_row(Formatting::new())?;
            self.cell_index = 0;
        }
        if self.builder.current(NodeKind::TableCell).is_none() {
            let formatting = self.row.cells.get(self.cell_index).cloned().unwrap_or_default();
            self.builder.begin_cell(formatting)?;
        }
        Ok(())
    }

    fn ensure_paragraph(&mut self) -> CodecResult<NodeId> {
        if let Some(paragraph) = self.builder.current_paragraph() {
            return Ok(paragraph);
        }
        self.ensure_container()?;
        let style = self.style_id(self.state.para_style, StyleType::Paragraph);
        let mut formatting = self.state.para.clone();
        if std::mem::take(&mut self.page_break) {
            formatting.set(Property::PageBreakBefore, Some(PropertyValue::Bool(true)));
        }
        self.builder.begin_paragraph(style, formatting)
    }

    fn paragraph_end(&mut self) -> CodecResult<()> {
        if self.capture.is_some() {
            return self.push_text("\n");
        }
        self.flush()?;
        let paragraph = self.ensure_paragraph()?;
        if let Some(revision) = self.state.revision.clone() {
            let (key, info) = self.change(&revision);
            self.builder.mark_block(&key, revision.mark, info, paragraph);
        }
        self.builder.end_paragraph();
        Ok(())
    }

    fn cell_end(&mut self) -> CodecResult<()> {
        self.flush()?;
        self.state.in_table = true;
        self.ensure_paragraph()?;
        self.builder.end_paragraph();
        self.builder.end_cell();
        self.cell_index += 1;
        Ok(())
    }

    fn row_end(&mut self) -> CodecResult<()> {
        self.flush()?;
        self.builder.end_paragraph();
        if self.builder.current(NodeKind::TableRow).is_some() {
            self.builder.end_row();
        }
        self.cell_index = 0;
        Ok(())
    }

    fn field(&mut self, items: &[Item]) -> CodecResult<()> {
        let mut instruction = String::new();
        let mut result: Option<&[Item]> = None;
        for item in items {
            if let Item::Group(group) = item {
                match destination(group) {
                    Some(("fldinst", _)) => instruction.push_str(&plain_text(group)),
                    Some(("fldrslt", _)) => result = Some(group),
                    _ => {}
                }
            }
        }
        let instruction = instruction.trim().to_string();
        let first_word = instruction
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        if first_word == "HYPERLINK" {
            self.warn(
                "rtf.hyperlinks.dropped",
                FeatureCategory::Other,
                WarningSeverity::Minor,
                "Hyperlinks read as their display text",
            );
        }
        if first_word.is_empty() || first_word == "HYPERLINK" || self.capture.is_some() {
            if let Some(result) = result {
                self.group(result)?;
            }
            return Ok(());
        }

        self.flush()?;
        self.saved.push(self.state.clone());
        self.capture = Some(Capture::default());
        let read = match result {
            Some(result) => self.items(result),
            None => Ok(()),
        };
        let capture = self.capture.take().unwrap_or_default();
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
        read?;

        let (style, formatting, revision) = capture.first.unwrap_or_else(|| self.key());
        self.ensure_paragraph()?;
        let style = self.style_id(style, StyleType::Character);
        let kind = FieldKind::parse(&instruction);
        self.with_revision(revision.as_ref(), |builder| {
            builder.field(kind, &capture.text, style, formatting).map(|_| ())
        })
    }

    fn picture(&mut self, items: &[Item]) -> CodecResult<()> {
        let mut content_type: Option<&str> = None;
        let (mut goal_w, mut goal_h, mut pic_w, mut pic_h) = (None, None, None, None);
        let (mut scale_x, mut scale_y) = (100, 100);
        let mut alt_text = None;
        let mut hex = String::new();
        let mut binary = Vec::new();
        for item in items {
            match item {
                Item::Word(word, param) => match word.as_str() {
                    "pngblip" => content_type = Some("image/png"),
                    "jpegblip" => content_type = Some("image/jpeg"),
                    "emfblip" | "wmetafile" | "macpict" | "dibitmap" | "wbitmap" | "pmmetafile" => {
                        content_type = Some("")
                    }
                    "picwgoal" => goal_w = *param,
                    "pichgoal" => goal_h = *param,
                    "picw" => pic_w = *param,
                    "pich" => pic_h = *param,
                    "picscalex" => scale_x = param.unwrap_or(100),
                    "picscaley" => scale_y = param.unwrap_or(100),
                    _ => {}
                },
                Item::Text(text) => hex.push_str(text),
                Item::Binary(data) => binary.extend_from_slice(data),
                Item::Group(group) if matches!(destination(group), Some(("picprop", _))) => {
                    alt_text = picture_description(group);
                }
                _ => {}
            }
        }
        let content_type = match content_type {
            Some(ct) if !ct.is_empty() => ct,
            _ => {
                self.warn(
                    "rtf.images.unsupported",
                    FeatureCategory::Images,
                    WarningSeverity::Moderate,
                    "Pictures that are not PNG or JPEG dropped",
                );
                return Ok(());
            }
        };
        let data = if binary.is_empty() { decode_hex(&hex) } else { binary };
        // Goals are twips; plain sizes are pixels at 96 dpi
        let size = |goal: Option<i32>, pixels: Option<i32>, scale: i32| {
            let points = goal
                .map(|t| t as f32 / 20.0)
                .or(pixels.map(|p| p as f32 * 0.75))
                .unwrap_or(72.0);
            points * scale as f32 / 100.0
        };
        let image = ImageObject {
            content_type: content_type.to_string(),
            data,
            width: size(goal_w, pic_w, scale_x),
            height: size(goal_h, pic_h, scale_y),
            alt_text,
        };
        self.flush()?;
        self.ensure_paragraph()?;
        let revision = self.state.revision.clone();
        self.with_revision(revision.as_ref(), |builder| builder.image(image).map(|_| ()))
    }

    fn finish(mut self) -> CodecResult<Imported> {
        self.flush()?;
        self.builder.end_paragraph();
        if self.section_pending || !self.section_open {
            self.open_section()?;
        }
        tracing::debug!(
            fonts = self.lookup.fonts.len(),
            colors = self.lookup.colors.len(),
            styles = self.styles.len(),
            "Read RTF document"
        );
        self.builder.finish()
    }
}

/// Items after the word that names a destination
fn after_destination(items: &[Item]) -> &[Item] {
    match items.iter().position(|item| matches!(item, Item::Word(..))) {
        Some(i) => &items[i + 1..],
        None => items,
    }
}

/// Text of a table entry such as `{Ann;}`
fn entry_name(items: &[Item]) -> String {
    plain_text(items).trim().trim_end_matches(';').trim().to_string()
}

/// Text of a destination with paragraph marks as newlines. Ignorable
/// destinations inside are skipped.
fn plain_text(items: &[Item]) -> String {
    fn walk(items: &[Item], out: &mut String, skip: &mut usize) {
        for item in items {
            match item {
                Item::Text(text) => {
                    for ch in text.chars() {
                        if *skip > 0 {
                            *skip -= 1;
                        } else {
                            out.push(ch);
                        }
                    }
                }
                Item::Word(word, param) => match word.as_str() {
                    "par" | "line" => out.push('\n'),
                    "tab" => out.push('\t'),
                    "u" => {
                        let unit = param.unwrap_or(0);
                        let unit = if unit < 0 { unit + 65536 } else { unit };
                        if let Some(ch) = u32::try_from(unit).ok().and_then(char::from_u32) {
                            out.push(ch);
                        }
                        *skip = 1;
                    }
                    _ => {}
                },
                Item::Symbol('~') => out.push('\u{A0}'),
                Item::Group(inner) if !matches!(destination(inner), Some((_, true))) => {
                    walk(inner, out, skip)
                }
                _ => {}
            }
        }
    }
    let mut out = String::new();
    walk(items, &mut out, &mut 0);
    out
}

/// `\yr..\sec` words of an info date group
fn info_date(items: &[Item]) -> Option<chrono::DateTime<Utc>> {
    let mut parts = HashMap::new();
    for item in items {
        if let Item::Word(word, Some(value)) = item {
            parts.insert(word.as_str(), *value);
        }
    }
    let part = |name: &str| parts.get(name).copied().unwrap_or(0);
    let unsigned = |name: &str| u32::try_from(part(name)).ok();
    Utc.with_ymd_and_hms(
        *parts.get("yr")?,
        unsigned("mo")?,
        unsigned("dy")?,
        unsigned("hr")?,
        unsigned("min")?,
        unsigned("sec")?,
    )
    .single()
}

/// `wzDescription` property of a picture
fn picture_description(items: &[Item]) -> Option<String> {
    items.iter().find_map(|item| {
        let Item::Group(property) = item else {
            return None;
        };
        let mut name = None;
        let mut value = None;
        for part in property {
            if let Item::Group(inner) = part {
                match destination(inner) {
                    Some(("sn", _)) => name = Some(plain_text(after_destination(inner)).trim().to_string()),
                    Some(("sv", _)) => value = Some(plain_text(after_destination(inner)).trim().to_string()),
                    _ => {}
                }
            }
        }
        (name.as_deref() == Some("wzDescription")).then_some(value).flatten()
    })
}

fn decode_hex(text: &str) -> Vec<u8> {
    let digits: Vec<u8> = text
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(|d| d as u8)
        .collect();
    digits.chunks_exact(2).map(|pair| pair[0] << 4 | pair[1]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DocumentSnapshot, ExportOptions};
    use doc_model::{DocumentTree, Node, NodeData};
    use revisions::{Overlay, OverlayOp, TrackedChange, ViewMode};

    fn read_str(rtf: &str) -> Imported {
        read(rtf.as_bytes()).unwrap()
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
    fn test_runs_and_paragraphs() {
        let imported = read_str(
            r"{\rtf1\ansi{\fonttbl{\f0 Arial;}}{\colortbl;\red255\green0\blue0;}
\pard\qc Hello {\b\cf1 bold} world\par
\pard caf\'e9 \u8364?\par}",
        );
        let tree = &imported.document.tree;
        assert_eq!(runs(tree), vec!["Hello ", "bold", " world", "caf\u{e9} \u{20AC}"]);
        let paragraphs = tree.nodes_of_kind(NodeKind::Paragraph);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(
            tree.node(paragraphs[0]).unwrap().direct_formatting().get(Property::Alignment),
            Some(&PropertyValue::Alignment(doc_model::Alignment::Center))
        );
        let bold = tree.nodes_of_kind(NodeKind::Run)[1];
        let formatting = tree.node(bold).unwrap().direct_formatting();
        assert_eq!(formatting.get(Property::Bold), Some(&PropertyValue::Bool(true)));
        assert_eq!(
            formatting.get(Property::Color),
            Some(&PropertyValue::Color(Color::rgb(255, 0, 0)))
        );
    }

    #[test]
    fn test_unsupported_content_warns() {
        let imported = read_str(
            r"{\rtf1{\*\listtable{\list}}\pard\ls1 item{\*\annotation note}\par{\footnote x}}",
        );
        assert!(imported.report.has_code("rtf.lists.flattened"));
        assert!(imported.report.has_code("rtf.comments.dropped"));
        assert!(imported.report.has_code("rtf.footnotes.dropped"));
        assert_eq!(runs(&imported.document.tree), vec!["item"]);
    }

    #[test]
    fn test_hyperlink_keeps_display_text() {
        let imported = read_str(
            r#"{\rtf1\pard {\field{\*\fldinst HYPERLINK "http://example.com"}{\fldrslt site}}\par}"#,
        );
        assert!(imported.report.has_code("rtf.hyperlinks.dropped"));
        assert_eq!(runs(&imported.document.tree), vec!["site"]);
    }

    #[test]
    fn test_malformed_input() {
        assert!(read(b"{\\rtf1 {unclosed").is_err());
        assert!(read(b"hello").is_err());
    }

    #[test]
    fn test_round_trip_structure() {
        let mut tree = DocumentTree::blank();
        tree.put_style(Style::paragraph("Normal", "Normal")).unwrap();
        tree.styles_mut()
            .set_default_paragraph_style(Some(StyleId::from("Normal")))
            .unwrap();
        tree.put_style(
            Style::paragraph("Heading1", "Heading 1")
                .with_based_on("Normal")
                .with_property(Property::Bold, true)
                .with_property(Property::OutlineLevel, PropertyValue::Level(1)),
        )
        .unwrap();
        tree.set_metadata(DocumentMetadata {
            title: Some("Quarterly".into()),
            ..DocumentMetadata::default()
        });
        let section = tree.children(tree.root_id())[0];
        tree.replace_data(
            section,
            NodeData::Section(SectionProperties {
                header: Some("Report".into()),
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
            Node::run("Red {text}").with_formatting(Formatting::new().with(Property::Color, Color::rgb(200, 0, 0))),
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
        let after = tree.append(section, Node::paragraph()).unwrap();
        tree.append(after, Node::run("After")).unwrap();

        let imported = round_trip(&DocumentSnapshot::from(tree.clone()));
        let loaded = &imported.document.tree;
        assert_eq!(loaded.plain_text(), tree.plain_text());
        assert_eq!(loaded.metadata().title.as_deref(), Some("Quarterly"));
        assert_eq!(
            loaded.styles().default_paragraph_style(),
            Some(&StyleId::from("Normal"))
        );
        let heading_style = loaded.styles().get(&StyleId::from("Heading1")).unwrap();
        assert_eq!(heading_style.based_on, Some(StyleId::from("Normal")));
        let section = loaded.nodes_of_kind(NodeKind::Section)[0];
        match loaded.node(section).unwrap().data() {
            NodeData::Section(props) => {
                assert_eq!(props.header.as_deref(), Some("Report"));
                assert_eq!(props.page_number_start, Some(3));
            }
            other => panic!("unexpected {other:?}"),
        }
        let heading = loaded.nodes_of_kind(NodeKind::Paragraph)[0];
        assert_eq!(loaded.node(heading).unwrap().style_ref(), Some(&StyleId::from("Heading1")));
        assert!(loaded.bookmark("intro").is_some());
        assert_eq!(loaded.nodes_of_kind(NodeKind::FieldReference).len(), 1);
        assert_eq!(loaded.nodes_of_kind(NodeKind::TableCell).len(), 2);
        assert!(runs(loaded).contains(&"Red {text}".to_string()));
        let last = *loaded.nodes_of_kind(NodeKind::Paragraph).last().unwrap();
        assert_eq!(loaded.text_of(last), "After");
        assert!(loaded.ancestors(last).iter().all(|a| loaded.kind(*a).unwrap() != NodeKind::Table));
    }

    #[test]
    fn test_round_trip_sections() {
        let mut tree = DocumentTree::blank();
        let second = tree.append(tree.root_id(), Node::section()).unwrap();
        let p = tree.append(second, Node::paragraph()).unwrap();
        tree.append(p, Node::run("second")).unwrap();
        let imported = round_trip(&DocumentSnapshot::from(tree));
        let loaded = &imported.document.tree;
        let sections = loaded.nodes_of_kind(NodeKind::Section);
        assert_eq!(sections.len(), 2);
        assert_eq!(loaded.text_of(sections[1]), "second");
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
        let when = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 0).unwrap();
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
        assert!(changes.iter().any(|c| c.is_deletion() && c.author == "Bob"));

        let document = imported.document;
        let final_view = crate::view::ExportView::new(&document, ViewMode::Final);
        let section = final_view.sections()[0];
        let text: Vec<String> = final_view
            .paragraphs(section)
            .into_iter()
            .map(|p| final_view.text_of(p))
            .collect();
        assert_eq!(text, vec!["kept added"]);
    }

    #[test]
    fn test_round_trip_image() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let p = tree.children(section)[0];
        let image = ImageObject {
            content_type: "image/png".into(),
            data: vec![0x89, b'P', b'N', b'G', 0x00, 0xFF],
            width: 72.0,
            height: 36.0,
            alt_text: Some("Logo".into()),
        };
        tree.append(p, Node::image(image.clone())).unwrap();
        let imported = round_trip(&DocumentSnapshot::from(tree));
        let loaded = &imported.document.tree;
        let images = loaded.nodes_of_kind(NodeKind::InlineObject);
        assert_eq!(images.len(), 1);
        match loaded.node(images[0]).unwrap().data() {
            NodeData::InlineObject(read) => assert_eq!(read, &image),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_comments_are_reported_on_export() {
        let mut tree = DocumentTree::blank();
        let section = tree.children(tree.root_id())[0];
        let p = tree.children(section)[0];
        let run = tree.append(p, Node::run("Check")).unwrap();
        let mut overlay = Overlay::new();
        OverlayOp::AddComment(revisions::Comment::new(
            revisions::CommentAnchor::range(doc_model::TextRange::within(run, 0, 5)),
            "Ann",
            "Why?",
        ))
        .apply(&mut overlay)
        .unwrap();
        let exported = super::super::writer::write(
            &DocumentSnapshot::new(tree, overlay),
            &ExportOptions::default(),
        )
        .unwrap();
        assert!(exported.report.has_code("overlay.comments.dropped"));
    }
}
