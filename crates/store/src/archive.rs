//! ZIP package access for DOCX and ODT

use crate::{CodecError, CodecResult, Format};
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Read-only view of a package held in memory
pub struct ArchiveReader<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    format: Format,
}

impl<'a> ArchiveReader<'a> {
    /// Open a package. Anything that is not a readable ZIP is malformed input.
    pub fn new(bytes: &'a [u8], format: Format) -> CodecResult<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| CodecError::malformed(format, format!("not a {format} package: {e}")))?;
        Ok(Self { archive, format })
    }

    #[cfg(test)]
    pub fn has(&self, path: &str) -> bool {
        self.archive.file_names().any(|name| name == path)
    }

    /// Part names in package order
    #[cfg(test)]
    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Read a required part
    pub fn read_bytes(&mut self, path: &str) -> CodecResult<Vec<u8>> {
        self.read_optional_bytes(path)?
            .ok_or_else(|| CodecError::malformed(self.format, format!("missing part {path}")))
    }

    pub fn read_optional_bytes(&mut self, path: &str) -> CodecResult<Option<Vec<u8>>> {
        let mut file = match self.archive.by_name(path) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(CodecError::malformed(self.format, format!("{path}: {e}"))),
        };
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|e| CodecError::malformed(self.format, format!("{path}: {e}")))?;
        Ok(Some(contents))
    }

    /// Read a required part as UTF-8 text
    pub fn read_string(&mut self, path: &str) -> CodecResult<String> {
        let bytes = self.read_bytes(path)?;
        self.decode(path, bytes)
    }

    pub fn read_optional_string(&mut self, path: &str) -> CodecResult<Option<String>> {
        match self.read_optional_bytes(path)? {
            Some(bytes) => self.decode(path, bytes).map(Some),
            None => Ok(None),
        }
    }

    fn decode(&self, path: &str, bytes: Vec<u8>) -> CodecResult<String> {
        String::from_utf8(bytes)
            .map_err(|_| CodecError::malformed(self.format, format!("{path} is not UTF-8")))
    }
}

/// Builds a package in memory
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Add a compressed part
    pub fn add(&mut self, path: &str, contents: &[u8]) -> CodecResult<()> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        self.zip.start_file(path, options)?;
        self.zip.write_all(contents)?;
        Ok(())
    }

    /// Add an uncompressed part (the ODT `mimetype` entry must be stored)
    pub fn add_stored(&mut self, path: &str, contents: &[u8]) -> CodecResult<()> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        self.zip.start_file(path, options)?;
        self.zip.write_all(contents)?;
        Ok(())
    }

    pub fn finish(self) -> CodecResult<Vec<u8>> {
        Ok(self.zip.finish()?.into_inner())
    }
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let mut writer = ArchiveWriter::new();
        writer.add_stored("mimetype", b"text/plain").unwrap();
        writer.add("a/b.xml", b"<a/>").unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ArchiveReader::new(&bytes, Format::Odt).unwrap();
        assert!(reader.has("a/b.xml"));
        assert_eq!(reader.read_string("a/b.xml").unwrap(), "<a/>");
        assert!(reader.read_optional_string("missing.xml").unwrap().is_none());
        assert!(reader.read_bytes("missing.xml").unwrap_err().is_malformed());
    }

    #[test]
    fn test_garbage_is_malformed() {
        let err = ArchiveReader::new(b"definitely not a zip", Format::Docx)
            .err()
            .unwrap();
        assert!(err.is_malformed());
    }
}
