//! # XLSX Encoder
//!
//! Serializes a [`Table`] into an Office Open XML workbook. The whole archive is built in an
//! owned buffer that is only handed out after the zip directory has been written, so a failed
//! encode never leaves partial output behind.

pub(crate) mod xlsx;

use crate::converter::cancel::Cancellation;
use crate::error::SheetError;
use crate::spreadsheet::check_cancelled;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::MAX_COLS;
use crate::spreadsheet::MAX_ROWS;
use crate::writer::xlsx::SharedStrings;
use std::collections::HashSet;
use std::io::Cursor;
use std::io::Write;
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

/// Longest sheet name a workbook accepts
const MAX_SHEET_NAME_CHARS: usize = 31;
/// Characters a sheet name must not contain
const INVALID_SHEET_NAME_CHARS: &[char] = &['[', ']', ':', '*', '?', '/', '\\'];

/// Reasons a table cannot be written as a workbook
#[derive(Error, Debug)]
pub(crate) enum WriteError {
    #[error("Workbook has no sheets")]
    NoSheetsError,

    #[error("Sheet name is empty")]
    EmptySheetNameError,

    #[error("Sheet name '{0}' is longer than 31 characters")]
    SheetNameLengthError(String),

    #[error("Sheet name '{0}' contains an invalid character")]
    SheetNameCharacterError(String),

    #[error("Sheet name '{0}' is used more than once")]
    DuplicateSheetNameError(String),

    #[error("Sheet '{0}' has {1} rows, the limit is 1048576")]
    RowLimitError(String, usize),

    #[error("Sheet '{0}' has {1} columns, the limit is 16384")]
    ColumnLimitError(String, usize),

    #[error("Cell {1} of sheet '{0}' holds more than 32767 characters")]
    StringLengthError(String, String),

    #[error("Cell {1} of sheet '{0}' holds a non-finite number")]
    NumberError(String, String),
}

/// Encodes `table` into xlsx bytes
pub(crate) fn encode_table(table: &Table, cancellation: &dyn Cancellation) -> Result<Vec<u8>, SheetError> {
    validate(table)?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let names = table.sheet_names();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(xlsx::content_types_xml(names.len()).as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(xlsx::rels_xml().as_bytes())?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(xlsx::workbook_xml(&names).as_bytes())?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(xlsx::workbook_rels_xml(names.len()).as_bytes())?;

    zip.start_file("xl/styles.xml", options)?;
    zip.write_all(xlsx::styles_xml().as_bytes())?;

    let mut shared_strings = SharedStrings::default();
    for (index, sheet) in table.sheets.iter().enumerate() {
        check_cancelled(cancellation)?;
        let content = xlsx::worksheet_xml(sheet, &mut shared_strings, cancellation)?;
        zip.start_file(format!("xl/worksheets/sheet{}.xml", index + 1), options)?;
        zip.write_all(content.as_bytes())?;
    }

    zip.start_file("xl/sharedStrings.xml", options)?;
    zip.write_all(shared_strings.to_xml().as_bytes())?;

    check_cancelled(cancellation)?;
    let buffer = zip.finish()?;
    Ok(buffer.into_inner())
}

/// Checks the workbook level limits before anything is written
fn validate(table: &Table) -> Result<(), SheetError> {
    if table.sheets.is_empty() {
        Err(WriteError::NoSheetsError)?
    }

    let mut seen = HashSet::new();
    for sheet in &table.sheets {
        let name = sheet.name();
        if name.trim().is_empty() {
            Err(WriteError::EmptySheetNameError)?
        }
        if name.chars().count() > MAX_SHEET_NAME_CHARS {
            Err(WriteError::SheetNameLengthError(name.to_owned()))?
        }
        if name.contains(INVALID_SHEET_NAME_CHARS) || name.chars().any(char::is_control) {
            Err(WriteError::SheetNameCharacterError(name.to_owned()))?
        }
        if !seen.insert(name.to_lowercase()) {
            Err(WriteError::DuplicateSheetNameError(name.to_owned()))?
        }
        if sheet.rows().len() > MAX_ROWS {
            Err(WriteError::RowLimitError(name.to_owned(), sheet.rows().len()))?
        }
        if sheet.width() > MAX_COLS {
            Err(WriteError::ColumnLimitError(name.to_owned(), sheet.width()))?
        }
    }
    Ok(())
}
