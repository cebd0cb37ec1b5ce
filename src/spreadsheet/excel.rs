//! Microsoft Office Excel Helpers
use crate::error::SheetError;
use crate::helpers::cfb::Cfb;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::io::Seek;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Loads worksheet relationships of a workbook part
///
/// # Arguments
/// * `zip` - Zip archive handle
/// * `path` - Path to the relationships XML file within the archive
///
/// # Returns
/// Mapping of relationship IDs to worksheet paths
pub(super) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, SheetError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Chartsheets, dialogs and macro sheets carry no cell grid
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps the number format of every cell style to the type its numbers decode to
///
/// # Arguments
/// * `format_indexes` - Number format id of each cell style, in style order
/// * `custom_formats` - Custom format mappings defined in the workbook
/// * `is_1904` - Whether the workbook uses the 1904 date system
pub(super) fn load_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target into a path inside the archive
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if let Some(absolute) = path.strip_prefix('/') {
        absolute.to_owned()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Checks whether the input is an encrypted OOXML package.
/// Encrypted workbooks are stored as compound files holding an `EncryptedPackage` stream.
pub(super) fn is_password_protected(input: &[u8]) -> bool {
    Cfb::new(input)
        .map(|cfb| cfb.exists("EncryptedPackage"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path(Cow::Borrowed("worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("/xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("xl/worksheets/sheet2.xml")), "xl/worksheets/sheet2.xml");
    }

    #[test]
    fn number_formats_by_style() {
        let custom = HashMap::from([("164".to_owned(), CellType::NumberDateTime1900)]);
        let formats = load_number_formats(vec!["0".to_owned(), "14".to_owned(), "164".to_owned(), "2".to_owned()], custom, false);
        assert_eq!(formats, vec![
            CellType::Number,
            CellType::NumberDateTime1900,
            CellType::NumberDateTime1900,
            CellType::Number,
        ]);
    }

    #[test]
    fn worksheet_relationships_only() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/_rels/workbook.xml.rels", SimpleFileOptions::default()).unwrap();
        writer.write_all(br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/chartsheet" Target="chartsheets/sheet1.xml"/>
        </Relationships>"#).unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();

        let relationships = load_relationships(&mut zip, "xl/_rels/workbook.xml.rels").unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships["rId1"], "xl/worksheets/sheet1.xml");
        assert!(load_relationships(&mut zip, "xl/missing.rels").is_err());
    }

    #[test]
    fn plain_bytes_are_not_protected() {
        assert!(!is_password_protected(b"PK\x03\x04"));
    }
}
