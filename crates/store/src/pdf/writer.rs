//! PDF file assembly
//!
//! Objects are appended to one buffer while their byte offsets are
//! recorded for the cross-reference table. Object numbers are fixed up
//! front: catalog, page tree and info first, then fonts, then one page and
//! one content stream per page.

use super::fonts::StandardFont;
use super::layout::{Layout, Losses, Page, PAGE_HEIGHT, PAGE_WIDTH};
use super::objects::{PdfDictionary, PdfObject};
use crate::view::{ExportView, OverlaySupport};
use crate::{
    CodecResult, DocumentSnapshot, ExportOptions, Exported, FeatureCategory, FidelityReport,
    Format, WarningSeverity,
};
use chrono::{DateTime, Utc};
use doc_model::{DocumentMetadata, DocumentTree};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::BTreeSet;
use std::io::Write;

const CATALOG: u32 = 1;
const PAGES: u32 = 2;
const INFO: u32 = 3;

pub fn write(document: &DocumentSnapshot, options: &ExportOptions) -> CodecResult<Exported> {
    let view = ExportView::new(document, options.view);
    let (pages, losses) = Layout::new(&view).run()?;

    let mut report = FidelityReport::export(Format::Pdf);
    report_losses(&mut report, &losses, view.tree());
    view.report_overlay_loss(
        &mut report,
        OverlaySupport {
            changes: true,
            ..OverlaySupport::default()
        },
    );

    let page_count = pages.len();
    let bytes = assemble(pages, view.tree().metadata(), options.compress)?;
    tracing::debug!(
        pages = page_count,
        size = bytes.len(),
        compressed = options.compress,
        "Wrote PDF document"
    );
    Ok(Exported { bytes, report })
}

/// PDF output being built
struct PdfFile {
    out: Vec<u8>,
    /// Byte offset of each object, indexed by object number minus one
    offsets: Vec<Option<usize>>,
    compress: bool,
}

impl PdfFile {
    fn new(compress: bool) -> Self {
        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-1.4\n");
        // Binary marker so transfer tools treat the file as binary
        out.extend_from_slice(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n']);
        Self {
            out,
            offsets: Vec::new(),
            compress,
        }
    }

    fn allocate(&mut self) -> u32 {
        self.offsets.push(None);
        self.offsets.len() as u32
    }

    fn begin(&mut self, number: u32) {
        let slot = number as usize - 1;
        if slot >= self.offsets.len() {
            self.offsets.resize(slot + 1, None);
        }
        self.offsets[slot] = Some(self.out.len());
        self.out
            .extend_from_slice(format!("{number} 0 obj\n").as_bytes());
    }

    fn object(&mut self, number: u32, object: &PdfObject) {
        self.begin(number);
        object.write_to(&mut self.out);
        self.out.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, number: u32, mut dict: PdfDictionary, data: Vec<u8>) -> CodecResult<()> {
        let data = if self.compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            dict.insert("Filter", PdfObject::name("FlateDecode"));
            encoder.finish()?
        } else {
            data
        };
        dict.insert("Length", data.len() as i64);
        self.begin(number);
        dict.write_to(&mut self.out);
        self.out.extend_from_slice(b"\nstream\n");
        self.out.extend_from_slice(&data);
        self.out.extend_from_slice(b"\nendstream\nendobj\n");
        Ok(())
    }

    fn finish(mut self) -> Vec<u8> {
        let xref = self.out.len();
        let size = self.offsets.len() + 1;
        let mut table = format!("xref\n0 {size}\n0000000000 65535 f \n");
        for offset in &self.offsets {
            match offset {
                Some(offset) => table.push_str(&format!("{offset:010} 00000 n \n")),
                None => table.push_str("0000000000 65535 f \n"),
            }
        }
        self.out.extend_from_slice(table.as_bytes());
        self.out.extend_from_slice(b"trailer\n");
        PdfDictionary::new()
            .with("Size", size as i64)
            .with("Root", PdfObject::Reference(CATALOG))
            .with("Info", PdfObject::Reference(INFO))
            .write_to(&mut self.out);
        self.out
            .extend_from_slice(format!("\nstartxref\n{xref}\n%%EOF\n").as_bytes());
        self.out
    }
}

fn assemble(pages: Vec<Page>, metadata: &DocumentMetadata, compress: bool) -> CodecResult<Vec<u8>> {
    let mut file = PdfFile::new(compress);
    for expected in [CATALOG, PAGES, INFO] {
        let number = file.allocate();
        debug_assert_eq!(number, expected);
    }

    let fonts: BTreeSet<StandardFont> = pages.iter().flat_map(|p| p.fonts.iter().copied()).collect();
    let font_refs: Vec<(StandardFont, u32)> = fonts.into_iter().map(|f| (f, file.allocate())).collect();
    let page_refs: Vec<(u32, u32)> = pages
        .iter()
        .map(|_| (file.allocate(), file.allocate()))
        .collect();

    file.object(
        CATALOG,
        &PdfDictionary::typed("Catalog")
            .with("Pages", PdfObject::Reference(PAGES))
            .into(),
    );
    file.object(
        PAGES,
        &PdfDictionary::typed("Pages")
            .with(
                "Kids",
                PdfObject::Array(page_refs.iter().map(|(p, _)| PdfObject::Reference(*p)).collect()),
            )
            .with("Count", page_refs.len() as i64)
            .into(),
    );
    file.object(INFO, &info(metadata).into());
    for (font, number) in &font_refs {
        file.object(*number, &font.dictionary().into());
    }

    for (page, (page_ref, content_ref)) in pages.into_iter().zip(page_refs) {
        let mut font_resources = PdfDictionary::new();
        for (font, number) in font_refs.iter().filter(|(f, _)| page.fonts.contains(f)) {
            font_resources.insert(&font.resource_name(), PdfObject::Reference(*number));
        }
        let resources = PdfDictionary::new()
            .with("Font", font_resources)
            .with(
                "ProcSet",
                PdfObject::Array(vec![PdfObject::name("PDF"), PdfObject::name("Text")]),
            );
        let dict = PdfDictionary::typed("Page")
            .with("Parent", PdfObject::Reference(PAGES))
            .with(
                "MediaBox",
                PdfObject::rect(0.0, 0.0, PAGE_WIDTH.into(), PAGE_HEIGHT.into()),
            )
            .with("Resources", resources)
            .with("Contents", PdfObject::Reference(content_ref));
        file.object(page_ref, &dict.into());
        file.stream(content_ref, PdfDictionary::new(), page.content.into_bytes())?;
    }
    Ok(file.finish())
}

/// Document information dictionary
fn info(metadata: &DocumentMetadata) -> PdfDictionary {
    let mut dict = PdfDictionary::new().with(
        "Producer",
        PdfObject::text(&format!("wordtool {}", env!("CARGO_PKG_VERSION"))),
    );
    let texts = [
        ("Title", metadata.title.clone()),
        ("Author", metadata.author.clone()),
        ("Subject", metadata.subject.clone()),
        ("Keywords", Some(metadata.keywords_joined()).filter(|k| !k.is_empty())),
    ];
    for (key, value) in texts {
        if let Some(value) = value {
            dict.insert(key, PdfObject::text(&value));
        }
    }
    for (key, date) in [("CreationDate", &metadata.created), ("ModDate", &metadata.modified)] {
        if let Some(date) = date {
            dict.insert(key, PdfObject::text(&pdf_date(date)));
        }
    }
    dict
}

fn pdf_date(date: &DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}

fn report_losses(report: &mut FidelityReport, losses: &Losses, tree: &DocumentTree) {
    let warnings = [
        (
            losses.images > 0,
            "pdf.images.dropped",
            FeatureCategory::Images,
            WarningSeverity::Major,
            format!("{} image(s) dropped", losses.images),
        ),
        (
            losses.tables > 0,
            "pdf.tables.flattened",
            FeatureCategory::Tables,
            WarningSeverity::Moderate,
            format!("{} table(s) drawn as text rows without borders or shading", losses.tables),
        ),
        (
            losses.fields > 0,
            "pdf.fields.flattened",
            FeatureCategory::Fields,
            WarningSeverity::Info,
            format!("{} field(s) written as their last result", losses.fields),
        ),
        (
            losses.bookmarks > 0,
            "pdf.bookmarks.dropped",
            FeatureCategory::Bookmarks,
            WarningSeverity::Minor,
            format!("{} bookmark(s) dropped", losses.bookmarks),
        ),
        (
            losses.bands,
            "pdf.headers.rendered",
            FeatureCategory::HeadersFooters,
            WarningSeverity::Info,
            "Headers and footers drawn as page text".to_string(),
        ),
        (
            losses.unencodable > 0,
            "pdf.text.unencodable",
            FeatureCategory::TextFormatting,
            WarningSeverity::Moderate,
            format!(
                "{} character(s) outside the standard font encoding shown as '?'",
                losses.unencodable
            ),
        ),
        (
            !losses.substituted.is_empty(),
            "pdf.fonts.substituted",
            FeatureCategory::TextFormatting,
            WarningSeverity::Minor,
            format!(
                "Fonts replaced by standard PDF fonts: {}",
                losses.substituted.iter().cloned().collect::<Vec<_>>().join(", ")
            ),
        ),
        (
            tree.walk()
                .into_iter()
                .any(|id| tree.get(id).is_some_and(|n| n.style_ref().is_some())),
            "pdf.styles.flattened",
            FeatureCategory::Styles,
            WarningSeverity::Info,
            "Named styles drawn as their effective formatting".to_string(),
        ),
        (
            uses_theme(tree),
            "pdf.theme.resolved",
            FeatureCategory::Theme,
            WarningSeverity::Minor,
            "Theme fonts and colors drawn as fixed values".to_string(),
        ),
    ];
    for (lost, code, category, severity, message) in warnings {
        if lost {
            report.warn(code, category, severity, message);
        }
    }
}

fn uses_theme(tree: &DocumentTree) -> bool {
    let in_nodes = tree.walk().into_iter().any(|id| {
        tree.get(id)
            .is_some_and(|n| n.direct_formatting().iter().any(|(_, v)| v.is_theme_reference()))
    });
    in_nodes
        || tree
            .styles()
            .iter()
            .any(|s| s.properties.iter().any(|(_, v)| v.is_theme_reference()))
}
