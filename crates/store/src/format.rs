//! Supported file formats and extension lookup

use crate::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A file format the store can read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Office Open XML word processing package
    Docx,
    /// OpenDocument text package
    Odt,
    /// Rich Text Format
    Rtf,
    /// XHTML document
    Html,
    /// Portable Document Format (export only)
    Pdf,
    /// Plain UTF-8 text
    Text,
    /// Native JSON document with tree and overlay
    Native,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Docx,
        Format::Odt,
        Format::Rtf,
        Format::Html,
        Format::Pdf,
        Format::Text,
        Format::Native,
    ];

    /// Default file extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            Format::Docx => "docx",
            Format::Odt => "odt",
            Format::Rtf => "rtf",
            Format::Html => "html",
            Format::Pdf => "pdf",
            Format::Text => "txt",
            Format::Native => crate::native::FILE_EXTENSION,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Docx => "DOCX",
            Format::Odt => "ODT",
            Format::Rtf => "RTF",
            Format::Html => "HTML",
            Format::Pdf => "PDF",
            Format::Text => "Plain text",
            Format::Native => "Native",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Format::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Format::Odt => "application/vnd.oasis.opendocument.text",
            Format::Rtf => "application/rtf",
            Format::Html => "application/xhtml+xml",
            Format::Pdf => "application/pdf",
            Format::Text => "text/plain",
            Format::Native => "application/json",
        }
    }

    /// Whether documents can be read from this format
    pub fn can_import(self) -> bool {
        self != Format::Pdf
    }

    /// Look up a format by extension (case-insensitive, leading dot allowed)
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "docx" => Some(Format::Docx),
            "odt" => Some(Format::Odt),
            "rtf" => Some(Format::Rtf),
            "html" | "htm" | "xhtml" => Some(Format::Html),
            "pdf" => Some(Format::Pdf),
            "txt" | "text" => Some(Format::Text),
            e if e == crate::native::FILE_EXTENSION => Some(Format::Native),
            _ => None,
        }
    }

    /// Format implied by a path's extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Format> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| StoreError::UnknownExtension(path.display().to_string()))?;
        Format::from_extension(ext).ok_or_else(|| StoreError::UnknownExtension(ext.to_string()))
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Format {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Format::from_extension(s).ok_or_else(|| StoreError::UnknownExtension(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(Format::from_extension("DOCX"), Some(Format::Docx));
        assert_eq!(Format::from_extension(".htm"), Some(Format::Html));
        assert_eq!(Format::from_extension("txt"), Some(Format::Text));
        assert_eq!(Format::from_extension("wdj"), Some(Format::Native));
        assert_eq!(Format::from_extension("doc"), None);
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Format::from_path("/tmp/report.odt").unwrap(), Format::Odt);
        assert!(matches!(
            Format::from_path("/tmp/README"),
            Err(StoreError::UnknownExtension(_))
        ));
    }

    #[test]
    fn test_every_extension_maps_back() {
        for format in Format::ALL {
            assert_eq!(Format::from_extension(format.extension()), Some(format));
        }
    }

    #[test]
    fn test_pdf_is_export_only() {
        assert!(!Format::Pdf.can_import());
        assert!(Format::Rtf.can_import());
    }
}
