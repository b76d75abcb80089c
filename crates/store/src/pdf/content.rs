//! Content stream builder
//!
//! Emits the page-description operators the exporter uses: text objects
//! (`BT`/`ET`, `Tf`, `Td`, `Ts`, `Tj`), fills and strokes in RGB, and
//! rectangles and lines for highlights and decorations.

use super::fonts::StandardFont;
use super::objects::{format_number, write_literal};
use doc_model::Color;

#[derive(Debug, Default)]
pub struct ContentStream {
    data: Vec<u8>,
}

impl ContentStream {
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    fn op(&mut self, operands: &[f64], operator: &str) -> &mut Self {
        for n in operands {
            self.data.extend_from_slice(format_number(*n).as_bytes());
            self.data.push(b' ');
        }
        self.data.extend_from_slice(operator.as_bytes());
        self.data.push(b'\n');
        self
    }

    // =========================================================================
    // Color and graphics state
    // =========================================================================

    pub fn fill_color(&mut self, color: Color) -> &mut Self {
        let (r, g, b) = color.to_unit();
        self.op(&[r.into(), g.into(), b.into()], "rg")
    }

    pub fn stroke_color(&mut self, color: Color) -> &mut Self {
        let (r, g, b) = color.to_unit();
        self.op(&[r.into(), g.into(), b.into()], "RG")
    }

    pub fn line_width(&mut self, width: f64) -> &mut Self {
        self.op(&[width], "w")
    }

    // =========================================================================
    // Paths
    // =========================================================================

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64) -> &mut Self {
        self.op(&[x, y, width, height], "re").op(&[], "f")
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> &mut Self {
        self.op(&[x1, y1], "m").op(&[x2, y2], "l").op(&[], "S")
    }

    // =========================================================================
    // Text
    // =========================================================================

    pub fn begin_text(&mut self) -> &mut Self {
        self.op(&[], "BT")
    }

    pub fn end_text(&mut self) -> &mut Self {
        self.op(&[], "ET")
    }

    pub fn font(&mut self, font: StandardFont, size: f64) -> &mut Self {
        self.data.push(b'/');
        self.data.extend_from_slice(font.resource_name().as_bytes());
        self.data.push(b' ');
        self.op(&[size], "Tf")
    }

    /// Move to the start of the next text position relative to the
    /// current line start
    pub fn move_text(&mut self, dx: f64, dy: f64) -> &mut Self {
        self.op(&[dx, dy], "Td")
    }

    pub fn rise(&mut self, rise: f64) -> &mut Self {
        self.op(&[rise], "Ts")
    }

    /// Show already encoded text
    pub fn show(&mut self, bytes: &[u8]) -> &mut Self {
        write_literal(&mut self.data, bytes);
        self.data.extend_from_slice(b" Tj\n");
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_object() {
        let mut content = ContentStream::default();
        content
            .begin_text()
            .font(StandardFont::HelveticaBold, 12.0)
            .move_text(72.0, 700.5)
            .show(b"Hi (there)")
            .end_text();
        let text = String::from_utf8(content.into_bytes()).unwrap();
        assert_eq!(text, "BT\n/F2 12 Tf\n72 700.5 Td\n(Hi \\(there\\)) Tj\nET\n");
    }

    #[test]
    fn test_graphics() {
        let mut content = ContentStream::default();
        content
            .fill_color(Color::rgb(255, 0, 0))
            .fill_rect(10.0, 20.0, 30.0, 5.0)
            .stroke_color(Color::BLACK)
            .line_width(0.5)
            .line(0.0, 0.0, 100.0, 0.0);
        let text = String::from_utf8(content.into_bytes()).unwrap();
        assert!(text.starts_with("1 0 0 rg\n10 20 30 5 re\nf\n"));
        assert!(text.ends_with("0.5 w\n0 0 m\n100 0 l\nS\n"));
    }
}
