//! Package parts of a minimal workbook
//!
//! Cell styles are fixed: index 0 is General, 1 is a date (numFmtId 14) and 2 a date-time
//! (numFmtId 22). All strings go through the shared string table.

use crate::converter::cancel::Cancellation;
use crate::error::SheetError;
use crate::helpers::xml::escape_ooxml;
use crate::spreadsheet::cell::to_serial;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::check_cancelled;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::CANCEL_CHECK_ROWS;
use crate::writer::WriteError;
use chrono::NaiveTime;
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::fmt::Write;

/// Longest text a cell can hold, counted in UTF-16 code units
const MAX_CELL_TEXT: usize = 32_767;

const SPREADSHEETML_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const PACKAGE_RELATIONSHIPS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

const DATE_STYLE: usize = 1;
const DATE_TIME_STYLE: usize = 2;

/// Deduplicated string table, indexes in insertion order
#[derive(Default)]
pub(crate) struct SharedStrings {
    indexes: HashMap<String, usize>,
    strings: Vec<String>,
    references: usize,
}

impl SharedStrings {
    pub(crate) fn insert(&mut self, text: &str) -> usize {
        self.references += 1;
        if let Some(index) = self.indexes.get(text) {
            return *index;
        }
        let index = self.strings.len();
        self.strings.push(text.to_owned());
        self.indexes.insert(text.to_owned(), index);
        index
    }

    pub(crate) fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(128 + self.strings.len() * 32);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        let _ = write!(
            xml,
            r#"<sst xmlns="{}" count="{}" uniqueCount="{}">"#,
            SPREADSHEETML_NS,
            self.references,
            self.strings.len()
        );
        for text in &self.strings {
            xml.push_str(r#"<si><t xml:space="preserve">"#);
            xml.push_str(&escape_ooxml(text));
            xml.push_str("</t></si>");
        }
        xml.push_str("</sst>");
        xml
    }
}

pub(crate) fn content_types_xml(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    xml.push_str(r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#);
    xml.push_str(r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#);
    xml.push_str(r#"<Default Extension="xml" ContentType="application/xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#);
    for index in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            index
        );
    }
    xml.push_str(r#"<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>"#);
    xml.push_str(r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#);
    xml.push_str("</Types>");
    xml
}

pub(crate) fn rels_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<Relationships xmlns="{}">"#,
            r#"<Relationship Id="rId1" Type="{}/officeDocument" Target="xl/workbook.xml"/>"#,
            "</Relationships>"
        ),
        PACKAGE_RELATIONSHIPS_NS, RELATIONSHIPS_NS
    )
}

pub(crate) fn workbook_xml(sheet_names: &[&str]) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    let _ = write!(xml, r#"<workbook xmlns="{}" xmlns:r="{}"><sheets>"#, SPREADSHEETML_NS, RELATIONSHIPS_NS);
    for (index, name) in sheet_names.iter().enumerate() {
        let _ = write!(
            xml,
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(*name),
            index + 1,
            index + 1
        );
    }
    xml.push_str("</sheets></workbook>");
    xml
}

/// Worksheets take `rId1..=rIdN`, followed by styles and the shared string table
pub(crate) fn workbook_rels_xml(sheet_count: usize) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    let _ = write!(xml, r#"<Relationships xmlns="{}">"#, PACKAGE_RELATIONSHIPS_NS);
    for index in 1..=sheet_count {
        let _ = write!(
            xml,
            r#"<Relationship Id="rId{}" Type="{}/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            index, RELATIONSHIPS_NS, index
        );
    }
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{}/styles" Target="styles.xml"/>"#,
        sheet_count + 1,
        RELATIONSHIPS_NS
    );
    let _ = write!(
        xml,
        r#"<Relationship Id="rId{}" Type="{}/sharedStrings" Target="sharedStrings.xml"/>"#,
        sheet_count + 2,
        RELATIONSHIPS_NS
    );
    xml.push_str("</Relationships>");
    xml
}

pub(crate) fn styles_xml() -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<styleSheet xmlns="{}">"#,
            r#"<fonts count="1"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts>"#,
            r#"<fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills>"#,
            r#"<borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#,
            r#"<cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#,
            r#"<cellXfs count="3">"#,
            r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#,
            r#"<xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
            r#"<xf numFmtId="22" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
            "</cellXfs>",
            r#"<cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#,
            "</styleSheet>"
        ),
        SPREADSHEETML_NS
    )
}

/// Serializes one worksheet, adding its strings to `shared_strings`.
/// Every row gets a `<row>` element so blank rows keep their position.
pub(crate) fn worksheet_xml(
    sheet: &Sheet,
    shared_strings: &mut SharedStrings,
    cancellation: &dyn Cancellation,
) -> Result<String, SheetError> {
    let mut xml = String::with_capacity(256 + sheet.rows().len() * 64);
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    xml.push('\n');
    let _ = write!(xml, r#"<worksheet xmlns="{}">"#, SPREADSHEETML_NS);
    if sheet.rows().is_empty() {
        xml.push_str("<sheetData/>");
    } else {
        xml.push_str("<sheetData>");
        for (row_index, row) in sheet.rows().iter().enumerate() {
            if row_index % CANCEL_CHECK_ROWS == 0 {
                check_cancelled(cancellation)?;
            }
            if row.cells().iter().all(CellValue::is_empty) {
                let _ = write!(xml, r#"<row r="{}"/>"#, row_index + 1);
                continue;
            }
            let _ = write!(xml, r#"<row r="{}">"#, row_index + 1);
            for (col_index, cell) in row.cells().iter().enumerate() {
                write_cell(&mut xml, sheet.name(), row_index, col_index, cell, shared_strings)?;
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
    }
    xml.push_str("</worksheet>");
    Ok(xml)
}

fn write_cell(
    xml: &mut String,
    sheet_name: &str,
    row: usize,
    col: usize,
    cell: &CellValue,
    shared_strings: &mut SharedStrings,
) -> Result<(), SheetError> {
    let reference = || index_to_reference(row, col);
    match cell {
        CellValue::Empty => {}
        CellValue::String(text) => {
            if text.encode_utf16().count() > MAX_CELL_TEXT {
                Err(WriteError::StringLengthError(sheet_name.to_owned(), reference()))?
            }
            write_shared_string(xml, &reference(), text, shared_strings);
        }
        CellValue::Number(number) => {
            if !number.is_finite() {
                Err(WriteError::NumberError(sheet_name.to_owned(), reference()))?
            }
            let _ = write!(xml, r#"<c r="{}"><v>{}</v></c>"#, reference(), number);
        }
        CellValue::Boolean(value) => {
            let _ = write!(xml, r#"<c r="{}" t="b"><v>{}</v></c>"#, reference(), u8::from(*value));
        }
        CellValue::Date(value) => match to_serial(value) {
            Some(serial) => {
                let style = if value.time() == NaiveTime::MIN { DATE_STYLE } else { DATE_TIME_STYLE };
                let _ = write!(xml, r#"<c r="{}" s="{}"><v>{}</v></c>"#, reference(), style, serial);
            }
            // Moments without a serial are kept as ISO text
            None => write_shared_string(xml, &reference(), &cell.to_string(), shared_strings),
        },
    }
    Ok(())
}

fn write_shared_string(xml: &mut String, reference: &str, text: &str, shared_strings: &mut SharedStrings) {
    let index = shared_strings.insert(text);
    let _ = write!(xml, r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::cancel::NeverCancel;
    use crate::spreadsheet::sheet::Row;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn shared_strings_are_deduplicated() {
        let mut shared_strings = SharedStrings::default();
        assert_eq!(shared_strings.insert("a"), 0);
        assert_eq!(shared_strings.insert("b"), 1);
        assert_eq!(shared_strings.insert("a"), 0);
        let xml = shared_strings.to_xml();
        assert!(xml.contains(r#"count="3" uniqueCount="2""#));
        assert!(xml.contains(r#"<si><t xml:space="preserve">a</t></si><si><t xml:space="preserve">b</t></si>"#));
    }

    #[test]
    fn shared_strings_are_escaped() {
        let mut shared_strings = SharedStrings::default();
        shared_strings.insert("<a & b>\u{1}");
        assert!(shared_strings.to_xml().contains("&lt;a &amp; b&gt;_x0001_"));
    }

    #[test]
    fn worksheet_cells() {
        let sheet = Sheet::with_rows("Data", vec![
            Row::new(vec![CellValue::from("x"), CellValue::Empty, CellValue::from(1.5)]),
            Row::default(),
            Row::new(vec![
                CellValue::from(true),
                CellValue::Date(date(2024, 1, 2).and_hms_opt(0, 0, 0).unwrap()),
                CellValue::Date(date(2024, 1, 2).and_hms_opt(12, 0, 0).unwrap()),
            ]),
        ]);
        let mut shared_strings = SharedStrings::default();
        let xml = worksheet_xml(&sheet, &mut shared_strings, &NeverCancel).unwrap();
        assert!(xml.contains(r#"<row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>1.5</v></c></row>"#));
        assert!(xml.contains(r#"<row r="2"/>"#));
        assert!(xml.contains(r#"<c r="A3" t="b"><v>1</v></c>"#));
        assert!(xml.contains(r#"<c r="B3" s="1"><v>45293</v></c>"#));
        assert!(xml.contains(r#"<c r="C3" s="2"><v>45293.5</v></c>"#));
    }

    #[test]
    fn early_dates_become_text() {
        let early = date(1800, 5, 1).and_hms_opt(0, 0, 0).unwrap();
        let sheet = Sheet::with_rows("Data", vec![Row::new(vec![CellValue::Date(early)])]);
        let mut shared_strings = SharedStrings::default();
        let xml = worksheet_xml(&sheet, &mut shared_strings, &NeverCancel).unwrap();
        assert!(xml.contains(r#"<c r="A1" t="s"><v>0</v></c>"#));
        assert!(shared_strings.to_xml().contains("1800-05-01T00:00:00"));
    }

    #[test]
    fn empty_sheet() {
        let xml = worksheet_xml(&Sheet::new("Empty"), &mut SharedStrings::default(), &NeverCancel).unwrap();
        assert!(xml.ends_with("<sheetData/></worksheet>"));
    }

    #[test]
    fn workbook_relationships() {
        let xml = workbook_rels_xml(2);
        assert!(xml.contains(r#"Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml""#));
        assert!(xml.contains(r#"Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles""#));
        assert!(xml.contains(r#"Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings""#));
    }

    #[test]
    fn workbook_escapes_sheet_names() {
        assert!(workbook_xml(&["R&D"]).contains(r#"name="R&amp;D""#));
    }
}
