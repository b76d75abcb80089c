//! Page layout for PDF export
//!
//! Paragraphs are broken into lines greedily at spaces, with words longer
//! than a line split by character. Lines are stacked on Letter pages with
//! one inch margins; every section starts a new page. Table rows are laid
//! out as equal-width text columns.
//!
//! Drawing happens as lines are placed, so a page's content stream is
//! complete once the cursor leaves it.

use super::content::ContentStream;
use super::fonts::{self, StandardFont};
use crate::view::{ExportView, Mark, RunPiece};
use crate::CodecResult;
use doc_model::{
    Alignment, Color, EffectiveFormatting, LineSpacing, NodeData, NodeId, NodeKind,
    SectionProperties, VerticalAlign,
};
use std::collections::{BTreeSet, HashMap, VecDeque};

pub const PAGE_WIDTH: f32 = 612.0;
pub const PAGE_HEIGHT: f32 = 792.0;
pub const MARGIN: f32 = 72.0;
const TEXT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

/// Distance of the header and footer baselines from the page edge
const BAND: f32 = 36.0;
const BAND_SIZE: f32 = 9.0;
const BAND_COLOR: Color = Color::rgb(0x59, 0x59, 0x59);

const CELL_PADDING: f32 = 4.0;
/// Extra left indent per list level
const LIST_INDENT: f32 = 18.0;
const ROW_GAP: f32 = 4.0;

/// Markup colors, assigned to change authors in order of appearance
const AUTHOR_COLORS: [Color; 6] = [
    Color::rgb(0xC0, 0x00, 0x00),
    Color::rgb(0x00, 0x5A, 0xB5),
    Color::rgb(0x2E, 0x7D, 0x32),
    Color::rgb(0x8E, 0x24, 0xAA),
    Color::rgb(0xEF, 0x6C, 0x00),
    Color::rgb(0x00, 0x83, 0x8F),
];

/// How a piece of text is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
struct Look {
    font: StandardFont,
    size: f32,
    color: Color,
    highlight: Option<Color>,
    underline: bool,
    strike: bool,
    /// Baseline shift for superscript and subscript
    rise: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AtomKind {
    Word,
    Space,
    Break,
}

#[derive(Debug, Clone)]
struct Atom {
    kind: AtomKind,
    bytes: Vec<u8>,
    look: Look,
    width: f32,
}

impl Atom {
    fn new(kind: AtomKind, bytes: Vec<u8>, look: Look) -> Self {
        let width = look.font.text_width(&bytes, look.size);
        Self {
            kind,
            bytes,
            look,
            width,
        }
    }
}

/// A laid out line: atoms at x offsets from the column's left edge
#[derive(Debug, Clone, Default)]
pub struct Line {
    items: Vec<(f32, Atom)>,
    height: f32,
    /// Distance from the top of the line to the baseline
    baseline: f32,
}

/// Paragraph settings that shape its lines
#[derive(Debug, Clone, Copy)]
struct Shape {
    alignment: Alignment,
    indent_left: f32,
    indent_right: f32,
    first_line: f32,
    spacing: LineSpacing,
    /// Font size of an empty paragraph
    size: f32,
}

impl Shape {
    fn of(formatting: &EffectiveFormatting) -> Self {
        Self {
            alignment: formatting.alignment(),
            indent_left: formatting.indent_left(),
            indent_right: formatting.indent_right(),
            first_line: formatting.indent_first_line(),
            spacing: formatting.line_spacing(),
            size: formatting.font_size().max(1.0),
        }
    }

    fn line_metrics(&self, size: f32) -> (f32, f32) {
        let natural = size * 1.2;
        let height = match self.spacing {
            LineSpacing::Multiple(m) => natural * m.max(0.1),
            LineSpacing::Exact(points) => points,
            LineSpacing::AtLeast(points) => natural.max(points),
        };
        (height, height - size * 0.25)
    }
}

/// What the layout could not carry
#[derive(Debug, Default)]
pub struct Losses {
    pub images: usize,
    pub bookmarks: usize,
    pub fields: usize,
    pub unencodable: usize,
    pub tables: usize,
    pub bands: bool,
    pub substituted: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct Page {
    pub content: ContentStream,
    pub fonts: BTreeSet<StandardFont>,
}

impl Page {
    fn text(&mut self, x: f32, baseline: f32, bytes: &[u8], look: &Look) {
        self.fonts.insert(look.font);
        self.content.fill_color(look.color).begin_text().font(look.font, look.size.into());
        if look.rise != 0.0 {
            self.content.rise(look.rise.into());
        }
        self.content
            .move_text(x.into(), baseline.into())
            .show(bytes)
            .end_text();
    }

    fn draw(&mut self, x: f32, baseline: f32, bytes: &[u8], width: f32, look: &Look) {
        if let Some(fill) = look.highlight {
            self.content.fill_color(fill).fill_rect(
                x.into(),
                (baseline - look.size * 0.25).into(),
                width.into(),
                (look.size * 1.15).into(),
            );
        }
        self.text(x, baseline, bytes, look);
        let y = baseline + look.rise;
        let decorations = [
            (look.underline, y - look.size * 0.12),
            (look.strike, y + look.size * 0.3),
        ];
        for (_, at) in decorations.iter().filter(|(on, _)| *on) {
            self.content
                .stroke_color(look.color)
                .line_width((look.size * 0.06).into())
                .line(x.into(), (*at).into(), (x + width).into(), (*at).into());
        }
    }
}

pub struct Layout<'v, 'a> {
    view: &'v ExportView<'a>,
    pages: Vec<Page>,
    /// y of the top of the next line
    top: f32,
    /// Nothing placed on the current page yet
    fresh: bool,
    section: SectionProperties,
    page_number: u32,
    authors: Vec<String>,
    /// List markers of the paragraphs shown
    labels: HashMap<NodeId, String>,
    pub losses: Losses,
}

impl<'v, 'a> Layout<'v, 'a> {
    pub fn new(view: &'v ExportView<'a>) -> Self {
        Self {
            view,
            pages: Vec::new(),
            top: PAGE_HEIGHT - MARGIN,
            fresh: true,
            section: SectionProperties::default(),
            page_number: 0,
            authors: Vec::new(),
            labels: view.list_labels(),
            losses: Losses::default(),
        }
    }

    /// Lay out every visible section. There is always at least one page.
    pub fn run(mut self) -> CodecResult<(Vec<Page>, Losses)> {
        let view = self.view;
        for section in view.sections() {
            let props = match view.node(section).map(|n| n.data()) {
                Some(NodeData::Section(props)) => props.clone(),
                _ => SectionProperties::default(),
            };
            if let Some(start) = props.page_number_start {
                self.page_number = start.saturating_sub(1);
            }
            self.losses.bands |= props.header.is_some() || props.footer.is_some();
            self.section = props;
            self.new_page();
            for block in view.children(section) {
                match view.kind(block) {
                    Some(NodeKind::Paragraph) => self.paragraph(block)?,
                    Some(NodeKind::Table) => self.table(block)?,
                    _ => {}
                }
            }
        }
        if self.pages.is_empty() {
            self.new_page();
        }
        Ok((self.pages, self.losses))
    }

    // =========================================================================
    // Pages
    // =========================================================================

    fn new_page(&mut self) {
        self.page_number += 1;
        let mut page = Page::default();
        let font = StandardFont::Helvetica;
        let look = Look {
            font,
            size: BAND_SIZE,
            color: BAND_COLOR,
            highlight: None,
            underline: false,
            strike: false,
            rise: 0.0,
        };
        let leading = BAND_SIZE * 1.2;
        if let Some(header) = self.section.header.clone() {
            for (i, line) in header.split('\n').enumerate() {
                let baseline = PAGE_HEIGHT - BAND - i as f32 * leading;
                self.band_line(&mut page, line, MARGIN, baseline, &look);
            }
        }
        if let Some(footer) = self.section.footer.clone() {
            let lines: Vec<&str> = footer.split('\n').collect();
            for (i, line) in lines.iter().enumerate() {
                let baseline = BAND + (lines.len() - 1 - i) as f32 * leading;
                self.band_line(&mut page, line, MARGIN, baseline, &look);
            }
        }
        if self.section.page_number_start.is_some() {
            let (bytes, _) = fonts::encode(&self.page_number.to_string());
            let width = font.text_width(&bytes, BAND_SIZE);
            page.text(PAGE_WIDTH - MARGIN - width, BAND, &bytes, &look);
        }
        self.pages.push(page);
        self.top = PAGE_HEIGHT - MARGIN;
        self.fresh = true;
    }

    fn band_line(&mut self, page: &mut Page, text: &str, x: f32, baseline: f32, look: &Look) {
        let (bytes, missing) = fonts::encode(text);
        self.losses.unencodable += missing;
        if !bytes.is_empty() {
            page.text(x, baseline, &bytes, look);
        }
    }

    fn current(&mut self) -> &mut Page {
        if self.pages.is_empty() {
            self.new_page();
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    /// Move the cursor down by blank space; space never starts a page
    fn advance(&mut self, amount: f32) {
        if !self.fresh {
            self.top -= amount.max(0.0);
        }
    }

    /// Place lines side by side, each at its column's left edge, starting a
    /// new page first when they do not fit
    fn place(&mut self, parts: &[(f32, &Line)]) {
        let height = parts.iter().map(|(_, l)| l.height).fold(0.0, f32::max);
        if self.top - height < MARGIN && !self.fresh {
            self.new_page();
        }
        let top = self.top;
        let page = self.current();
        for (left, line) in parts {
            let baseline = top - line.baseline;
            draw_line(page, line, *left, baseline);
        }
        self.top -= height;
        self.fresh = false;
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    fn paragraph(&mut self, id: NodeId) -> CodecResult<()> {
        let formatting = self.view.resolve(id)?;
        if formatting.page_break_before() && !self.fresh {
            self.new_page();
        }
        self.advance(formatting.space_before());
        for line in self.lines(id, TEXT_WIDTH)? {
            self.place(&[(MARGIN, &line)]);
        }
        self.advance(formatting.space_after());
        Ok(())
    }

    fn table(&mut self, id: NodeId) -> CodecResult<()> {
        let view = self.view;
        self.losses.tables += 1;
        for row in view.children(id) {
            let cells = view.children(row);
            if cells.is_empty() {
                continue;
            }
            let column = TEXT_WIDTH / cells.len() as f32;
            let mut columns = Vec::with_capacity(cells.len());
            for (i, &cell) in cells.iter().enumerate() {
                let padding = match view.resolve(cell)?.cell_padding() {
                    p if p > 0.0 => p.min(column / 4.0),
                    _ => CELL_PADDING,
                };
                let mut lines = Vec::new();
                for paragraph in view.paragraphs(cell) {
                    lines.extend(self.lines(paragraph, column - 2.0 * padding)?);
                }
                columns.push((MARGIN + i as f32 * column + padding, lines));
            }
            let depth = columns.iter().map(|(_, l)| l.len()).max().unwrap_or(0);
            for index in 0..depth {
                let parts: Vec<(f32, &Line)> = columns
                    .iter()
                    .filter_map(|(left, lines)| lines.get(index).map(|l| (*left, l)))
                    .collect();
                self.place(&parts);
            }
            self.advance(ROW_GAP);
        }
        Ok(())
    }

    // =========================================================================
    // Lines
    // =========================================================================

    fn lines(&mut self, paragraph: NodeId, width: f32) -> CodecResult<Vec<Line>> {
        let formatting = self.view.resolve(paragraph)?;
        let mut shape = Shape::of(&formatting);
        if let Some((_, level)) = self.view.list_membership(paragraph) {
            shape.indent_left += LIST_INDENT * (f32::from(level) + 1.0);
        }
        let atoms = self.atoms(paragraph)?;
        Ok(break_lines(atoms, &shape, width))
    }

    fn atoms(&mut self, paragraph: NodeId) -> CodecResult<Vec<Atom>> {
        let view = self.view;
        let mut atoms = Vec::new();
        if let Some(label) = self.labels.get(&paragraph).cloned() {
            // Hollow and square bullets are outside the font encoding
            let label: String = label
                .chars()
                .map(|c| if fonts::encode_char(c).is_some() { c } else { '\u{2022}' })
                .collect();
            let formatting = view.resolve(paragraph)?;
            let look = self.look(&formatting, paragraph);
            tokenize(&format!("{label} "), look, &mut atoms);
        }
        for child in view.children(paragraph) {
            let Some(node) = view.node(child) else {
                continue;
            };
            let text = match node.data() {
                NodeData::Run { .. } => view
                    .run_pieces(child)
                    .into_iter()
                    .filter_map(|piece| match piece {
                        RunPiece::Text(text) => Some(text),
                        _ => None,
                    })
                    .collect::<String>(),
                NodeData::FieldReference(field) => {
                    self.losses.fields += 1;
                    field.result.clone()
                }
                NodeData::Bookmark { .. } => {
                    self.losses.bookmarks += 1;
                    continue;
                }
                NodeData::InlineObject(_) => {
                    self.losses.images += 1;
                    continue;
                }
                _ => continue,
            };
            if text.is_empty() {
                continue;
            }
            let formatting = view.resolve(child)?;
            let look = self.look(&formatting, child);
            let text = if formatting.all_caps() || formatting.small_caps() {
                text.to_uppercase()
            } else {
                text
            };
            self.losses.unencodable += tokenize(&text, look, &mut atoms);
        }
        Ok(atoms)
    }

    fn look(&mut self, formatting: &EffectiveFormatting, id: NodeId) -> Look {
        let (font, substituted) =
            StandardFont::for_family(formatting.font_family(), formatting.bold(), formatting.italic());
        if substituted {
            self.losses.substituted.insert(formatting.font_family().to_string());
        }
        let base = formatting.font_size().max(1.0);
        let (size, rise) = match formatting.vertical_align() {
            VerticalAlign::Baseline => (base, 0.0),
            VerticalAlign::Superscript => (base * 0.65, base * 0.35),
            VerticalAlign::Subscript => (base * 0.65, -base * 0.15),
        };
        let mut look = Look {
            font,
            size,
            color: formatting.color(),
            highlight: formatting.highlight(),
            underline: formatting.underline(),
            strike: formatting.strikethrough(),
            rise,
        };
        if let Some(mark) = self.view.mark(id) {
            look.color = self.author_color(&mark.change.author);
            match mark.mark {
                Mark::Inserted => look.underline = true,
                Mark::Deleted => look.strike = true,
            }
        }
        look
    }

    fn author_color(&mut self, author: &str) -> Color {
        let index = match self.authors.iter().position(|a| a == author) {
            Some(i) => i,
            None => {
                self.authors.push(author.to_string());
                self.authors.len() - 1
            }
        };
        AUTHOR_COLORS[index % AUTHOR_COLORS.len()]
    }
}

/// Split text into words, spaces and forced breaks. Returns the number of
/// characters the font encoding cannot show.
fn tokenize(text: &str, look: Look, atoms: &mut Vec<Atom>) -> usize {
    let mut missing = 0;
    let mut push = |kind: AtomKind, chunk: &str, atoms: &mut Vec<Atom>| {
        if chunk.is_empty() {
            return;
        }
        let (bytes, m) = fonts::encode(chunk);
        missing += m;
        atoms.push(Atom::new(kind, bytes, look));
    };
    let mut start = 0;
    let mut kind = AtomKind::Word;
    for (i, ch) in text.char_indices() {
        let next = match ch {
            '\n' => AtomKind::Break,
            ' ' | '\t' => AtomKind::Space,
            _ => AtomKind::Word,
        };
        if next != kind || next == AtomKind::Break {
            push(kind, &text[start..i], atoms);
            start = i;
            kind = next;
        }
        if next == AtomKind::Break {
            atoms.push(Atom::new(AtomKind::Break, Vec::new(), look));
            start = i + ch.len_utf8();
            kind = AtomKind::Word;
        }
    }
    push(kind, &text[start..], atoms);
    missing
}

/// Break atoms into lines no wider than `width` minus the indents
fn break_lines(atoms: Vec<Atom>, shape: &Shape, width: f32) -> Vec<Line> {
    let inner = (width - shape.indent_left - shape.indent_right).max(1.0);
    let mut queue: VecDeque<Atom> = atoms.into();
    let mut lines = Vec::new();
    let mut current: Vec<Atom> = Vec::new();
    let mut used = 0.0;
    let mut forced = false;

    let available = |lines: &Vec<Line>| {
        if lines.is_empty() {
            (inner - shape.first_line).max(1.0)
        } else {
            inner
        }
    };

    while let Some(atom) = queue.pop_front() {
        let avail = available(&lines);
        match atom.kind {
            AtomKind::Break => {
                lines.push(finish_line(std::mem::take(&mut current), shape, width, lines.is_empty(), true));
                used = 0.0;
                forced = true;
                continue;
            }
            AtomKind::Space => {
                if current.is_empty() && !lines.is_empty() && !forced {
                    continue;
                }
                used += atom.width;
                current.push(atom);
                continue;
            }
            AtomKind::Word => {}
        }
        forced = false;
        if used + atom.width <= avail {
            used += atom.width;
            current.push(atom);
            continue;
        }
        if current.iter().any(|a| a.kind == AtomKind::Word) {
            queue.push_front(atom);
        } else {
            let (head, tail) = split_word(atom, avail - used);
            current.push(head);
            if let Some(tail) = tail {
                queue.push_front(tail);
            }
        }
        lines.push(finish_line(std::mem::take(&mut current), shape, width, lines.is_empty(), false));
        used = 0.0;
    }
    if !current.is_empty() || lines.is_empty() || forced {
        lines.push(finish_line(current, shape, width, lines.is_empty(), true));
    }
    lines
}

/// Split a word so the head fits in `room`; the head keeps at least one
/// character
fn split_word(atom: Atom, room: f32) -> (Atom, Option<Atom>) {
    let look = atom.look;
    let mut taken = 0.0;
    let mut cut = 0;
    for (i, byte) in atom.bytes.iter().enumerate() {
        let w = f32::from(look.font.glyph_width(*byte)) * look.size / 1000.0;
        if i > 0 && taken + w > room {
            break;
        }
        taken += w;
        cut = i + 1;
    }
    if cut >= atom.bytes.len() {
        return (atom, None);
    }
    let tail = atom.bytes[cut..].to_vec();
    let head = atom.bytes[..cut].to_vec();
    (
        Atom::new(AtomKind::Word, head, look),
        Some(Atom::new(AtomKind::Word, tail, look)),
    )
}

/// Position atoms on a line according to alignment. `last` marks the end
/// of the paragraph or a forced break, which justified text does not
/// stretch.
fn finish_line(mut atoms: Vec<Atom>, shape: &Shape, width: f32, first: bool, last: bool) -> Line {
    while atoms.last().is_some_and(|a| a.kind == AtomKind::Space) {
        atoms.pop();
    }
    let size = atoms.iter().map(|a| a.look.size).fold(0.0, f32::max);
    let (height, baseline) = shape.line_metrics(if size > 0.0 { size } else { shape.size });

    let indent = shape.indent_left + if first { shape.first_line } else { 0.0 };
    let avail = (width - indent - shape.indent_right).max(0.0);
    let content: f32 = atoms.iter().map(|a| a.width).sum();
    let slack = (avail - content).max(0.0);
    let spaces = atoms.iter().filter(|a| a.kind == AtomKind::Space).count();
    let (offset, stretch) = match shape.alignment {
        Alignment::Left => (0.0, 0.0),
        Alignment::Center => (slack / 2.0, 0.0),
        Alignment::Right => (slack, 0.0),
        Alignment::Justify if !last && spaces > 0 => (0.0, slack / spaces as f32),
        Alignment::Justify => (0.0, 0.0),
    };

    let mut x = indent + offset;
    let mut items = Vec::with_capacity(atoms.len());
    for atom in atoms {
        let advance = atom.width + if atom.kind == AtomKind::Space { stretch } else { 0.0 };
        items.push((x, atom));
        x += advance;
    }
    Line {
        items,
        height,
        baseline,
    }
}

/// Draw a line, merging neighbours that share a look into one text show
fn draw_line(page: &mut Page, line: &Line, left: f32, baseline: f32) {
    let mut pending: Option<(f32, Vec<u8>, f32, Look)> = None;
    for (x, atom) in &line.items {
        let x = left + x;
        if let Some((start, bytes, width, look)) = pending.as_mut() {
            if *look == atom.look && (*start + *width - x).abs() < 0.01 {
                bytes.extend_from_slice(&atom.bytes);
                *width += atom.width;
                continue;
            }
        }
        if let Some((start, bytes, width, look)) = pending.take() {
            page.draw(start, baseline, &bytes, width, &look);
        }
        pending = Some((x, atom.bytes.clone(), atom.width, atom.look));
    }
    if let Some((start, bytes, width, look)) = pending {
        if !bytes.is_empty() {
            page.draw(start, baseline, &bytes, width, &look);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn look() -> Look {
        Look {
            font: StandardFont::Courier,
            size: 10.0,
            color: Color::BLACK,
            highlight: None,
            underline: false,
            strike: false,
            rise: 0.0,
        }
    }

    fn shape(alignment: Alignment) -> Shape {
        Shape {
            alignment,
            indent_left: 0.0,
            indent_right: 0.0,
            first_line: 0.0,
            spacing: LineSpacing::Multiple(1.0),
            size: 10.0,
        }
    }

    fn atoms(text: &str) -> Vec<Atom> {
        let mut atoms = Vec::new();
        tokenize(text, look(), &mut atoms);
        atoms
    }

    fn line_text(line: &Line) -> String {
        line.items
            .iter()
            .map(|(_, a)| String::from_utf8_lossy(&a.bytes).into_owned())
            .collect()
    }

    #[test]
    fn test_tokenize() {
        let atoms = atoms("ab  c\nd");
        let kinds: Vec<AtomKind> = atoms.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AtomKind::Word,
                AtomKind::Space,
                AtomKind::Word,
                AtomKind::Break,
                AtomKind::Word
            ]
        );
        // Courier: 600 units at 10pt
        assert_eq!(atoms[0].width, 12.0);
    }

    #[test]
    fn test_greedy_wrap() {
        // Each character is 6pt wide; 30pt holds five
        let lines = break_lines(atoms("aa bb cc dd"), &shape(Alignment::Left), 30.0);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["aa bb", "cc dd"]);
    }

    #[test]
    fn test_long_word_is_split() {
        let lines = break_lines(atoms("abcdefghij"), &shape(Alignment::Left), 24.0);
        let texts: Vec<String> = lines.iter().map(line_text).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_forced_break_and_empty_paragraph() {
        let lines = break_lines(atoms("a\nb"), &shape(Alignment::Left), 100.0);
        assert_eq!(lines.len(), 2);
        let empty = break_lines(Vec::new(), &shape(Alignment::Left), 100.0);
        assert_eq!(empty.len(), 1);
        assert!((empty[0].height - 12.0).abs() < 0.001);
    }

    #[test]
    fn test_alignment_offsets() {
        let right = break_lines(atoms("ab"), &shape(Alignment::Right), 100.0);
        assert!((right[0].items[0].0 - 88.0).abs() < 0.001);
        let center = break_lines(atoms("ab"), &shape(Alignment::Center), 100.0);
        assert!((center[0].items[0].0 - 44.0).abs() < 0.001);

        let justified = break_lines(atoms("aa bb cc dd"), &shape(Alignment::Justify), 36.0);
        // First line "aa bb" is 30pt wide and stretched by 6pt at its space
        let (x, _) = &justified[0].items[2];
        assert!((x - 24.0).abs() < 0.001);
        // The last line is not stretched
        let (x, _) = &justified[1].items[2];
        assert!((x - 18.0).abs() < 0.001);
    }

    #[test]
    fn test_line_spacing() {
        let mut exact = shape(Alignment::Left);
        exact.spacing = LineSpacing::Exact(20.0);
        assert_eq!(exact.line_metrics(10.0).0, 20.0);
        let mut double = shape(Alignment::Left);
        double.spacing = LineSpacing::Multiple(2.0);
        assert!((double.line_metrics(10.0).0 - 24.0).abs() < 0.001);
        let mut at_least = shape(Alignment::Left);
        at_least.spacing = LineSpacing::AtLeast(5.0);
        assert!((at_least.line_metrics(10.0).0 - 12.0).abs() < 0.001);
    }
}
