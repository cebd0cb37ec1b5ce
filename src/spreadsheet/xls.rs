//! Excel 97-2003 workbook decoder (.xls, BIFF8)
//!
//! Reads the `Workbook` stream of the compound file: the globals substream first (date system,
//! number formats, cell styles, shared strings and the sheet directory), then the cells of every
//! worksheet substream. Chart, macro and dialog sheets are skipped.

use crate::converter::cancel::Cancellation;
use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::error::SheetError;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::check_cancelled;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::CANCEL_CHECK_ROWS;
use either::Either;
use std::collections::HashMap;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 6; // Formula record with its cached result
const EOF: u16 = 10; // End of a substream
const DATE1904: u16 = 34; // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47; // Workbook encryption
const BOUND_SHEET8: u16 = 133; // Sheet name, type and stream position
const MUL_RK: u16 = 189; // Run of RK numbers in one row
const XF: u16 = 224; // Extended format record for cell styling
const SST: u16 = 252; // Shared string table
const LABEL_SST: u16 = 253; // Label referencing the shared string table
const NUMBER: u16 = 515; // Numeric cell value
const LABEL: u16 = 516; // Text label cell value
const BOOL_ERR: u16 = 517; // Boolean or error cell value
const STRING: u16 = 519; // String result of the preceding formula
const ARRAY: u16 = 545; // Array formula definition
const TABLE: u16 = 566; // Data table definition
const RK: u16 = 638; // Compressed numeric cell value
const FORMAT: u16 = 1054; // Custom number format definition
const SHARED_FORMULA: u16 = 1212; // Shared formula definition
const BOF: u16 = 2057; // Beginning of a substream

const BIFF8_VERSION: u16 = 0x0600;
/// Sheet type of worksheets in BOUNDSHEET8 records
const WORKSHEET: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub(crate) enum XlsError {
    #[error("Missing BOF record at offset {0}")]
    BofError(usize),

    #[error("Unsupported BIFF version 0x{0:04X}")]
    VersionError(u16),

    /// Invalid formula value or structure encountered
    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),
}

/// Workbook level records needed to decode the worksheets
struct Globals {
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// Worksheets with their names and stream positions
    sheets: Vec<(String, usize)>,
}

/// Decodes every worksheet of a BIFF8 workbook
pub(crate) fn decode(input: &[u8], cancellation: &dyn Cancellation) -> Result<Table, SheetError> {
    let cfb = Cfb::new(input)?;
    let stream = cfb
        .read("Workbook")
        .ok_none_else(|| cfb.read("Book"))?
        .ok_or_else(|| SpreadsheetError::FileError("Workbook".to_owned()))?;
    decode_stream(stream, cancellation)
}

/// Decodes the record stream of a workbook
pub(crate) fn decode_stream(stream: Vec<u8>, cancellation: &dyn Cancellation) -> Result<Table, SheetError> {
    let mut reader = Biff8Reader::new(stream);
    let globals = load_globals(&mut reader)?;
    if globals.sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError)?
    }

    let mut table = Table::default();
    for (name, pointer) in &globals.sheets {
        check_cancelled(cancellation)?;
        let sheet = read_sheet(&mut reader, name, *pointer, &globals, cancellation)
            .with_prefix(&format!("sheet '{}'", name))?;
        table.sheets.push(sheet);
    }
    Ok(table)
}

/// Reads the globals substream up to its EOF record
fn load_globals(reader: &mut Biff8Reader) -> Result<Globals, SheetError> {
    expect_bof(reader, 0)?;
    let mut is_1904 = false;
    let mut shared_strings = Vec::new();
    let mut custom_formats: Vec<(String, String)> = Vec::new();
    let mut format_indexes: Vec<String> = Vec::new();
    let mut sheets: Vec<(String, usize)> = Vec::new();
    match_biff8_record!(reader => {
        EOF => break,
        FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError)?,
        DATE1904 => is_1904 = reader.read_u16()? == 1,
        FORMAT => {
            let id = reader.read_u16()?;
            let format = reader.read_xl_unicode_string()?;
            custom_formats.push((id.to_string(), format));
        }
        XF => {
            reader.skip(2)?;
            let id = reader.read_u16()?;
            format_indexes.push(id.to_string());
        }
        SST => shared_strings = load_shared_strings(reader)?,
        BOUND_SHEET8 => {
            let pointer = reader.read_usize()?;
            let _visibility = reader.read_u8()?;
            let sheet_type = reader.read_u8()?;
            let sheet_name = reader.read_short_xl_unicode_string()?;
            if sheet_type == WORKSHEET {
                sheets.push((sheet_name, pointer));
            }
        }
    });

    // The date system may be declared after the formats
    let custom_formats: HashMap<String, CellType> = custom_formats
        .into_iter()
        .map(|(id, format)| (id, CellType::parse_custom_number_format(&format, is_1904)))
        .collect();
    let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);
    Ok(Globals {
        shared_strings,
        number_formats,
        sheets,
    })
}

/// Reads the next record, which must be a BIFF8 BOF
fn expect_bof(reader: &mut Biff8Reader, pointer: usize) -> Result<(), SheetError> {
    match reader.next()? {
        Some(BOF) => {
            let version = reader.read_u16()?;
            if version != BIFF8_VERSION {
                Err(XlsError::VersionError(version))?
            }
            Ok(())
        }
        _ => Err(XlsError::BofError(pointer))?,
    }
}

/// Loads the shared string table from BIFF8 SST record
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, SheetError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(u16::MAX as usize));
    for _ in 0..count {
        let string = reader.read_xl_unicode_rich_extended_string()?;
        shared_strings.push(string);
    }
    Ok(shared_strings)
}

/// Reads the cells of the worksheet substream starting at `pointer`
fn read_sheet(
    reader: &mut Biff8Reader,
    sheet_name: &str,
    pointer: usize,
    globals: &Globals,
    cancellation: &dyn Cancellation,
) -> Result<Sheet, SheetError> {
    reader.goto(pointer);
    expect_bof(reader, pointer)?;
    let style_type = |index: usize| globals.number_formats.get(index).copied().unwrap_or(CellType::Number);

    let mut sheet = Sheet::new(sheet_name);
    let mut records = 0usize;
    while let Some(tag) = reader.next()? {
        if records % CANCEL_CHECK_ROWS == 0 {
            check_cancelled(cancellation)?;
        }
        records += 1;
        match tag {
            BOF => skip_substream(reader)?,
            EOF => break,
            MUL_RK => {
                let row = reader.read_u16()? as usize;
                let col_lower_bound = reader.read_u16()? as usize;
                let col_upper_bound = reader.get_u16_back(2)? as usize;
                for col in col_lower_bound..=col_upper_bound {
                    let index = reader.read_u16()? as usize;
                    let number = reader.read_rk_number()?;
                    sheet.set(row, col, style_type(index).to_number_value(number))?;
                }
            }
            BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                let row = reader.read_u16()? as usize;
                let col = reader.read_u16()? as usize;
                let (either, value) = match tag {
                    BOOL_ERR => read_bool_or_error_cell(reader)?,
                    NUMBER => read_number_cell(reader)?,
                    RK => read_rk_cell(reader)?,
                    LABEL_SST => read_label_sst_cell(reader)?,
                    LABEL => read_label_cell(reader)?,
                    _ => read_formula_cell(reader)?,
                };
                if value.is_empty() {
                    continue;
                }
                let kind = match either {
                    Either::Left(kind) => kind,
                    Either::Right(index) => style_type(index),
                };
                let cell = kind
                    .to_value(&value, &globals.shared_strings)
                    .map_err(SheetError::from)
                    .with_prefix(&format!("cell {}", index_to_reference(row, col)))?;
                sheet.set(row, col, cell)?;
            }
            _ => (),
        }
    }
    Ok(sheet)
}

/// Skips an embedded substream, such as a chart placed on a worksheet
fn skip_substream(reader: &mut Biff8Reader) -> Result<(), SheetError> {
    let mut depth = 1usize;
    while let Some(tag) = reader.next()? {
        match tag {
            BOF => depth += 1,
            EOF if depth == 1 => break,
            EOF => depth -= 1,
            _ => (),
        }
    }
    Ok(())
}

/// Reads a BOOL_ERR record containing boolean or error cell values
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

/// Reads a NUMBER record containing numeric cell values
fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

/// Reads an RK record containing compressed numeric values
fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

/// Reads a LABEL_SST record referencing shared string table
fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

/// Reads a LABEL record containing inline string values
fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// Reads the cached result of a FORMULA record.
/// String results live in the STRING record that follows the formula, possibly after
/// shared, array or table formula definitions.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), SheetError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF000000000000) != 0xFFFF000000000000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        loop {
            let position = reader.position();
            match reader.next()? {
                Some(SHARED_FORMULA) | Some(ARRAY) | Some(TABLE) => continue,
                Some(STRING) => {
                    let value = reader.read_xl_unicode_string()?;
                    return Ok((Either::Left(CellType::InlineString), value));
                }
                _ => {
                    reader.goto(position);
                    return Ok((Either::Left(CellType::InlineString), String::new()));
                }
            }
        }
    } else if flag == 1 {
        let value = if ((formula >> 16) & 0xFF) != 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::InlineString), String::new()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}
