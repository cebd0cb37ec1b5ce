//! Office Open XML workbook decoder (.xlsx)
//!
//! Every worksheet of the workbook becomes a sheet, in workbook order. Cells keep their
//! position; numbers whose cell style carries a date format become dates.

use crate::error::ResultMessage;
use crate::error::SheetError;
use crate::helpers::xml::unescape_ooxml;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::Context;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use thiserror::Error;
use zip::ZipArchive;

// Local names of the SpreadsheetML elements read by this decoder
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts"; // Custom number formats container
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt"; // Individual custom number format
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs"; // Cell format indexes container
const TAG_FORMAT_INDEX: &[u8] = b"xf"; // Individual cell format index
const TAG_SHARED_STRING_ITEM: &[u8] = b"si"; // Shared string table item
const TAG_PHONETIC_TEXT: &[u8] = b"rPh"; // Phonetic text for Asian languages
const TAG_TEXT: &[u8] = b"t"; // Text content within strings
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

const PART_WORKBOOK: &str = "xl/workbook.xml";
const PART_WORKBOOK_RELATIONSHIPS: &str = "xl/_rels/workbook.xml.rels";
const PART_STYLES: &str = "xl/styles.xml";
const PART_SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// Errors specific to Office Open XML workbooks
#[derive(Error, Debug)]
pub(crate) enum XlsxError {
    #[error("Unknown cell type '{2}' at {1} of sheet '{0}'")]
    UnknownCellTypeError(String, String, String),
}

/// Decodes every worksheet of an Office Open XML workbook
pub(crate) fn decode(input: &[u8], context: &Context) -> Result<Table, SheetError> {
    if excel::is_password_protected(input) {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?
    }

    let mut zip = ZipArchive::new(Cursor::new(input))?;
    let (sheets, is_1904) = load_workbook(&mut zip).with_prefix(&format!("part '{}'", PART_WORKBOOK))?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError)?
    }
    let number_formats = load_number_formats(&mut zip, is_1904).with_prefix(&format!("part '{}'", PART_STYLES))?;
    let shared_strings = load_shared_strings(&mut zip).with_prefix(&format!("part '{}'", PART_SHARED_STRINGS))?;

    let mut table = Table::default();
    for (name, path) in &sheets {
        context.check()?;
        let sheet = read_sheet(&mut zip, name, path, &number_formats, &shared_strings, context)
            .with_prefix(&format!("sheet '{}'", name))?;
        table.sheets.push(sheet);
    }
    Ok(table)
}

/// Loads worksheet names with their part paths, and the date system of the workbook
fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), SheetError> {
    let relationships = load_relationships(zip, PART_WORKBOOK_RELATIONSHIPS)?;
    let mut reader = zip
        .xml_reader(PART_WORKBOOK)?
        .ok_or_else(|| SpreadsheetError::FileError(PART_WORKBOOK.to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            // Sheets without a worksheet relationship are chartsheets or macro sheets
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event
                .get_attribute_value("date1904")?
                .map(|value| value.trim() == "1" || value.trim() == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads the value type of every cell style.
/// A workbook without a styles part decodes all numbers as plain numbers.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, SheetError> {
    let mut reader = match zip.xml_reader(PART_STYLES)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let kind = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.trim().to_owned(), kind);
            }
        }

        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => format_indexes_context = false,
        Event::Start(event) if format_indexes_context && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?;
            format_indexes.push(id.map(|id| id.trim().to_owned()).unwrap_or_else(|| "0".to_owned()));
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Loads the shared string table; a workbook without one has no shared strings
fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, SheetError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader(PART_SHARED_STRINGS)? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Reads one worksheet part into a sheet
fn read_sheet<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    sheet_name: &str,
    path: &str,
    number_formats: &[CellType],
    shared_strings: &[String],
    context: &Context,
) -> Result<Sheet, SheetError> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;

    let mut sheet = Sheet::new(sheet_name);
    let mut row_count = 0usize;
    let mut next_row = 0usize;
    let mut next_col = 0usize;
    let mut row = 0usize;
    let mut col = 0usize;
    let mut kind = CellType::default();
    let mut value = String::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
            context.checkpoint(row_count)?;
            row_count += 1;
            row = event
                .parse_attribute_value::<usize>("r")?
                .and_then(|number| number.checked_sub(1))
                .unwrap_or(next_row);
            sheet.ensure_rows(row + 1)?;
            next_row = row + 1;
            next_col = 0;
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
            let (cell_row, cell_col) = event
                .get_attribute_value("r")?
                .and_then(|reference| reference_to_index(&reference))
                .unwrap_or((row, next_col));
            row = cell_row;
            col = cell_col;
            next_col = col + 1;
            value.clear();
            kind = match event.get_attribute_value("t")?.as_deref().map(str::trim) {
                Some("s") => CellType::SharedString,
                Some("inlineStr") | Some("str") => CellType::InlineString,
                Some("b") => CellType::Boolean,
                Some("d") => CellType::IsoDateTime,
                Some("e") => CellType::Error,
                Some("n") | Some("") | None => event
                    .parse_attribute_value::<usize>("s")?
                    .and_then(|index| number_formats.get(index).copied())
                    .unwrap_or(CellType::Number),
                Some(other) => Err(XlsxError::UnknownCellTypeError(
                    sheet_name.to_owned(),
                    index_to_reference(row, col),
                    other.to_owned(),
                ))?,
            };
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_INLINE_STRING => {
            value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_VALUE => {
            value = read_string_value(&mut reader, TAG_VALUE, true)?;
        }
        Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
            if !value.is_empty() {
                let cell = kind
                    .to_value(&value, shared_strings)
                    .map_err(SheetError::from)
                    .with_prefix(&format!("cell {}", index_to_reference(row, col)))?;
                sheet.set(row, col, cell)?;
            }
            value.clear();
            kind = CellType::default();
        }
    });
    Ok(sheet)
}

/// Reads the text of a string element, skipping phonetic annotations.
/// Run text inside `<r>` elements is concatenated.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: &[u8],
    is_text_content: bool,
) -> Result<String, SheetError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(match unescape_ooxml(&text) {
        Cow::Borrowed(_) => text,
        Cow::Owned(unescaped) => unescaped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::cancel::NeverCancel;
    use crate::converter::options::ConvertOptions;
    use crate::spreadsheet::cell::CellValue;
    use chrono::NaiveDate;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const RELATIONSHIPS: &str = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
        <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
        <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
    </Relationships>"#;

    const WORKBOOK: &str = r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
        <sheets><sheet name="People" sheetId="1" r:id="rId1"/><sheet name="Empty" sheetId="2" r:id="rId2"/></sheets>
    </workbook>"#;

    const STYLES: &str = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
        <numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd"/></numFmts>
        <cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="164"/><xf numFmtId="14"/></cellXfs>
    </styleSheet>"#;

    const SHARED_STRINGS: &str = r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
        <si><t>name</t></si>
        <si><r><t>Ada </t></r><r><t>Lovelace</t></r><rPh><t>ignored</t></rPh></si>
        <si><t>=HYPERLINK("x")</t></si>
    </sst>"#;

    const SHEET1: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
        <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="inlineStr"><is><t>a_x000D_b</t></is></c></row>
        <row r="3"><c r="A3" t="s"><v>1</v></c><c r="B3" s="1"><v>45292</v></c><c r="C3" t="b"><v>1</v></c></row>
        <row r="4"><c r="A4" t="s"><v>2</v></c><c r="B4"><f>1+1</f><v>2</v></c><c r="C4" t="e"><v>#DIV/0!</v></c></row>
        <row r="5"><c t="str"><v>no reference</v></c><c><v>7.5</v></c></row>
    </sheetData></worksheet>"#;

    const SHEET2: &str = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;

    fn workbook(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn standard_parts() -> Vec<(&'static str, &'static str)> {
        vec![
            ("xl/_rels/workbook.xml.rels", RELATIONSHIPS),
            ("xl/workbook.xml", WORKBOOK),
            ("xl/styles.xml", STYLES),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", SHEET2),
        ]
    }

    fn decode_bytes(input: &[u8]) -> Result<Table, SheetError> {
        let options = ConvertOptions::default();
        let context = Context { options: &options, cancellation: &NeverCancel };
        decode(input, &context)
    }

    #[test]
    fn decode_workbook() {
        let table = decode_bytes(&workbook(&standard_parts())).unwrap();
        assert_eq!(table.sheet_names(), vec!["People", "Empty"]);

        let sheet = &table.sheets[0];
        assert_eq!(sheet.rows().len(), 5);
        assert_eq!(sheet.cell(0, 0), &CellValue::from("name"));
        assert_eq!(sheet.cell(0, 2), &CellValue::from("a\rb"));
        assert!(sheet.rows()[1].is_empty());
        assert_eq!(sheet.cell(2, 0), &CellValue::from("Ada Lovelace"));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(sheet.cell(2, 1), &CellValue::Date(date));
        assert_eq!(sheet.cell(2, 2), &CellValue::Boolean(true));
        assert_eq!(sheet.cell(3, 0), &CellValue::from("=HYPERLINK(\"x\")"));
        assert_eq!(sheet.cell(3, 1), &CellValue::Number(2.0));
        assert_eq!(sheet.cell(3, 2), &CellValue::from("#DIV/0!"));
        assert_eq!(sheet.cell(4, 0), &CellValue::from("no reference"));
        assert_eq!(sheet.cell(4, 1), &CellValue::Number(7.5));

        assert!(table.sheets[1].rows().is_empty());
    }

    #[test]
    fn missing_worksheet_part() {
        let parts: Vec<_> = standard_parts().into_iter().filter(|(name, _)| !name.ends_with("sheet2.xml")).collect();
        let error = decode_bytes(&workbook(&parts)).unwrap_err();
        assert!(error.to_string().contains("xl/worksheets/sheet2.xml"));
    }

    #[test]
    fn missing_workbook_part() {
        let error = decode_bytes(&workbook(&[("xl/_rels/workbook.xml.rels", RELATIONSHIPS)])).unwrap_err();
        assert!(error.to_string().contains("xl/workbook.xml"));
    }

    #[test]
    fn unknown_cell_type() {
        let mut parts = standard_parts();
        parts[4].1 = r#"<worksheet><sheetData><row r="1"><c r="B1" t="zz"><v>1</v></c></row></sheetData></worksheet>"#;
        let error = decode_bytes(&workbook(&parts)).unwrap_err();
        assert!(error.to_string().contains("Unknown cell type 'zz' at B1"));
    }

    #[test]
    fn not_a_zip() {
        assert!(matches!(decode_bytes(b"not a workbook"), Err(SheetError::ZipError(_))));
    }
}
