//! ZIP archive helper utilities for Excel (.xlsx) and OpenDocument (.ods) containers
//! Provides convenient methods for accessing parts within ZIP archives

use crate::error::SheetError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

/// Helper trait for ZIP archive operations
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a part by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetError>;

    /// Creates an XML reader for a part
    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetError>;

    /// Reads a part fully into memory
    fn read_bytes(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>, SheetError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, SheetError> {
        let pattern = name.replace('\\', "/");
        let pattern = pattern.trim_start_matches('/');
        let path = self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name.trim_start_matches('/')))
            .map(|file_name| file_name.to_owned());
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn xml_reader(
        &'_ mut self,
        name: &str,
    ) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, SheetError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn read_bytes(&mut self, name: &str, limit: u64) -> Result<Option<Vec<u8>>, SheetError> {
        match self.file(name)? {
            Some(file) => {
                let mut buffer = Vec::new();
                file.take(limit).read_to_end(&mut buffer)?;
                Ok(Some(buffer))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn archive() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/Workbook.xml", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"<workbook/>").unwrap();
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn lookup_ignores_case_and_separators() {
        let mut zip = archive();
        assert!(zip.file("XL\\workbook.xml").unwrap().is_some());
        assert!(zip.file("/xl/workbook.xml").unwrap().is_some());
        assert!(zip.file("xl/styles.xml").unwrap().is_none());
    }

    #[test]
    fn read_bytes_respects_limit() {
        let mut zip = archive();
        assert_eq!(zip.read_bytes("xl/workbook.xml", 4).unwrap(), Some(b"<wor".to_vec()));
    }
}
