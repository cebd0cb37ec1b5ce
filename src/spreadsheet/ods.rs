//! OpenDocument spreadsheet decoder (.ods)
//!
//! Tables of `content.xml` become sheets in document order. Repeated rows and columns are
//! expanded only where they carry a value, so the padding rows office suites write after the
//! last used row never reach the table. A repeated value must stay inside the sheet limits,
//! and all repeats of a document share a cell budget that grows with the input size.

use crate::error::ResultMessage;
use crate::error::SheetError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::Context;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::MAX_COLS;
use crate::spreadsheet::MAX_ROWS;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use thiserror::Error;
use zip::ZipArchive;

/// ODS file MIME type identifier
const MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
const PART_MIME_TYPE: &str = "mimetype";
const PART_CONTENT: &str = "content.xml";
const PART_MANIFEST: &str = "META-INF/manifest.xml";

/// XML element name for table (sheet)
const TABLE: QName = QName(b"table:table");
/// XML element name for table row
const TABLE_ROW: QName = QName(b"table:table-row");
/// XML element name for table cell
const TABLE_CELL: QName = QName(b"table:table-cell");
/// XML element name for covered table cell (merged cells)
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// XML element name for annotations (comments)
const ANNOTATION: QName = QName(b"office:annotation");
/// XML element name for paragraph text
const PARAGRAPH: QName = QName(b"text:p");
/// XML element name for runs of spaces
const SPACES: QName = QName(b"text:s");
const TAB: QName = QName(b"text:tab");
const LINE_BREAK: QName = QName(b"text:line-break");
/// Cells a repeated value may fill per byte of input, with a floor for tiny documents
const REPEAT_CELLS_PER_BYTE: usize = 16;
const MIN_REPEAT_BUDGET: usize = 1 << 16;

/// Error types specific to ODS spreadsheet processing
#[derive(Error, Debug)]
pub(crate) enum OdsError {
    /// Invalid ODS MIME type detected in file
    #[error("Invalid ODS MIME type")]
    MimeTypeError,

    #[error("Unknown value type '{2}' at {1} of sheet '{0}'")]
    UnknownValueTypeError(String, String, String),

    #[error("Repeated cell at {1} of sheet '{0}' exceeds the budget of {2} repeated cells")]
    RepeatLimitError(String, String, usize),
}

/// Decodes every table of an OpenDocument spreadsheet
pub(crate) fn decode(input: &[u8], context: &Context) -> Result<Table, SheetError> {
    let mut zip = ZipArchive::new(Cursor::new(input))?;
    check_mime(&mut zip)?;
    if is_password_protected(&mut zip)? {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?
    }
    let mut reader = zip
        .xml_reader(PART_CONTENT)?
        .ok_or_else(|| SpreadsheetError::FileError(PART_CONTENT.to_owned()))?;

    let mut table = Table::default();
    let mut sheet: Option<Sheet> = None;
    let repeat_budget = input.len().saturating_mul(REPEAT_CELLS_PER_BYTE).max(MIN_REPEAT_BUDGET);
    let mut repeated_cells = 0usize;

    // Cell position
    let mut row = 0usize;
    let mut col = 0usize;
    let mut row_count = 1usize;
    let mut col_count = 1usize;
    let mut rows_seen = 0usize;
    // Cell content
    let mut kind = CellType::default();
    let mut value = String::new();
    let mut paragraphs = 0usize;
    let mut text_context = false;
    let mut annotation_context = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TABLE => {
            context.check()?;
            let name = event
                .get_attribute_value("table:name")?
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("Sheet{}", table.sheets.len() + 1));
            sheet = Some(Sheet::new(name));
            row = 0;
        }
        Event::End(event) if event.name() == TABLE => {
            if let Some(sheet) = sheet.take() {
                table.sheets.push(sheet);
            }
        }
        Event::Start(event) if event.name() == TABLE_ROW => {
            context.checkpoint(rows_seen)?;
            rows_seen += 1;
            row_count = event.parse_attribute_value::<usize>("table:number-rows-repeated")?.unwrap_or(1).max(1);
            col = 0;
        }
        Event::End(event) if event.name() == TABLE_ROW => row = row.saturating_add(row_count),
        Event::Start(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
            value.clear();
            paragraphs = 0;
            col_count = event.parse_attribute_value::<usize>("table:number-columns-repeated")?.unwrap_or(1).max(1);
            let value_type = event.get_attribute_value("office:value-type")?;
            let (cell_kind, attribute) = match value_type.as_deref() {
                None => (CellType::Empty, None),
                Some("float") | Some("percentage") | Some("currency") => (CellType::Number, Some("office:value")),
                Some("boolean") => (CellType::Boolean, Some("office:boolean-value")),
                Some("date") => (CellType::IsoDateTime, Some("office:date-value")),
                Some("time") => (CellType::IsoDuration, Some("office:time-value")),
                Some("string") => {
                    let is_error = event
                        .get_attribute_value("calcext:value-type")?
                        .map(|calc_type| calc_type == "error")
                        .unwrap_or(false);
                    let kind = if is_error { CellType::Error } else { CellType::InlineString };
                    (kind, Some("office:string-value"))
                }
                Some(other) => Err(OdsError::UnknownValueTypeError(
                    sheet.as_ref().map(|sheet| sheet.name().to_owned()).unwrap_or_default(),
                    index_to_reference(row, col),
                    other.to_owned(),
                ))?,
            };
            kind = cell_kind;
            if let Some(data) = attribute.map(|name| event.get_attribute_value(name)).transpose()?.flatten() {
                value.push_str(&data);
            }
            text_context = matches!(kind, CellType::InlineString | CellType::Error) && value.is_empty();
        }
        Event::End(event) if event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL => {
            if let Some(sheet) = sheet.as_mut() {
                if kind != CellType::Empty && !value.is_empty() {
                    let cell = kind
                        .to_value(&value, &[])
                        .map_err(SheetError::from)
                        .with_prefix(&format!("cell {}", index_to_reference(row, col)))?;
                    let last_row = row.saturating_add(row_count);
                    let last_col = col.saturating_add(col_count);
                    if last_row > MAX_ROWS || last_col > MAX_COLS {
                        Err(SpreadsheetError::CellOutOfRangeError(sheet.name().to_owned(), last_row, last_col))?
                    }
                    let copies = row_count * col_count;
                    if copies > 1 {
                        repeated_cells = repeated_cells.saturating_add(copies);
                        if repeated_cells > repeat_budget {
                            Err(OdsError::RepeatLimitError(
                                sheet.name().to_owned(),
                                index_to_reference(row, col),
                                repeat_budget,
                            ))?
                        }
                    }
                    for row_offset in 0..row_count {
                        for col_offset in 0..col_count {
                            sheet.set(row + row_offset, col + col_offset, cell.clone())?;
                        }
                    }
                }
            }
            col = col.saturating_add(col_count);
            kind = CellType::default();
            text_context = false;
            annotation_context = false;
        }
        // String content
        Event::Start(event) if text_context && event.name() == ANNOTATION => annotation_context = true,
        Event::End(event) if text_context && event.name() == ANNOTATION => annotation_context = false,
        Event::Start(event) if text_context && !annotation_context && event.name() == PARAGRAPH => {
            if paragraphs > 0 {
                value.push('\n');
            }
            paragraphs += 1;
        }
        Event::Start(event) if text_context && !annotation_context && event.name() == SPACES => {
            let count = event.parse_attribute_value::<usize>("text:c")?.unwrap_or(1);
            value.extend(std::iter::repeat_n(' ', count));
        }
        Event::Start(event) if text_context && !annotation_context && event.name() == TAB => value.push('\t'),
        Event::Start(event) if text_context && !annotation_context && event.name() == LINE_BREAK => value.push('\n'),
        Event::Text(event) if text_context && !annotation_context => value.push_bytes_text(&event)?,
        Event::GeneralRef(event) if text_context && !annotation_context => value.push_bytes_ref(&event)?,
    });

    Ok(table)
}

/// Validates the `mimetype` part when the archive has one
fn check_mime<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(), SheetError> {
    if let Some(mime_type) = zip.read_bytes(PART_MIME_TYPE, MIME_TYPE.len() as u64 + 16)? {
        if mime_type.trim_ascii() != MIME_TYPE {
            Err(OdsError::MimeTypeError)?;
        }
    }
    Ok(())
}

/// Checks the manifest for encrypted entries; a missing manifest means no encryption
fn is_password_protected<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<bool, SheetError> {
    let mut reader = match zip.xml_reader(PART_MANIFEST)? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = true,
        Event::End(event) if event.name() == QName(b"manifest:file-entry") => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == QName(b"manifest:encryption-data") => {
            return Ok(true);
        }
    });
    Ok(false)
}
