//! Ordered decode attempts for legacy workbooks (.xls)
//!
//! The first attempt is the sheet preserving BIFF8 reader of this crate. When it fails the
//! workbook is read again with `calamine`, which yields the first worksheet as one flattened
//! sheet. Only when every attempt fails does decoding fail, with every cause in the message.

use crate::converter::cancel::Cancellation;
use crate::converter::observer::Observer;
use crate::error::ConversionError;
use crate::error::SheetError;
use crate::spreadsheet::cell::from_serial;
use crate::spreadsheet::cell::parse_iso_datetime;
use crate::spreadsheet::cell::parse_iso_duration;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::check_cancelled;
use crate::spreadsheet::sheet::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::xls;
use crate::spreadsheet::DecodePath;
use crate::spreadsheet::SourceFormat;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::CANCEL_CHECK_ROWS;
use calamine::Data;
use calamine::ExcelDateTime;
use calamine::ExcelDateTimeType;
use calamine::Reader;
use calamine::SheetType;
use calamine::Xls;
use std::io::Cursor;
use thiserror::Error;

/// Name of the single sheet produced by the flattening reader
pub const FALLBACK_SHEET_NAME: &str = "Converted Data";

/// Why a single decode attempt gave up
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AttemptError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,
}

impl From<SheetError> for AttemptError {
    fn from(error: SheetError) -> Self {
        match error {
            SheetError::CancelledError => AttemptError::Cancelled,
            error => AttemptError::Failed(error.to_string()),
        }
    }
}

/// One way of turning legacy workbook bytes into a table
pub trait DecodeAttempt: Send + Sync {
    /// Short label used in logs and aggregated error messages
    fn name(&self) -> &str;

    fn decode(&self, input: &[u8], cancellation: &dyn Cancellation) -> Result<Table, AttemptError>;
}

/// Multi-sheet BIFF8 reader keeping every worksheet and cell position
#[derive(Copy, Clone, Debug, Default)]
pub struct Biff8Attempt;

impl DecodeAttempt for Biff8Attempt {
    fn name(&self) -> &str {
        "biff8"
    }

    fn decode(&self, input: &[u8], cancellation: &dyn Cancellation) -> Result<Table, AttemptError> {
        Ok(xls::decode(input, cancellation)?)
    }
}

/// Generic reader: the used range of the first worksheet as a single sheet
#[derive(Clone, Debug)]
pub struct CalamineAttempt {
    sheet_name: String,
}

impl CalamineAttempt {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        CalamineAttempt { sheet_name: sheet_name.into() }
    }
}

impl Default for CalamineAttempt {
    fn default() -> Self {
        CalamineAttempt::new(FALLBACK_SHEET_NAME)
    }
}

impl DecodeAttempt for CalamineAttempt {
    fn name(&self) -> &str {
        "calamine"
    }

    fn decode(&self, input: &[u8], cancellation: &dyn Cancellation) -> Result<Table, AttemptError> {
        Ok(read_first_worksheet(input, &self.sheet_name, cancellation)?)
    }
}

fn read_first_worksheet(input: &[u8], sheet_name: &str, cancellation: &dyn Cancellation) -> Result<Table, SheetError> {
    check_cancelled(cancellation)?;
    let mut workbook = Xls::new(Cursor::new(input))?;
    let first = workbook
        .sheets_metadata()
        .iter()
        .find(|sheet| matches!(sheet.typ, SheetType::WorkSheet))
        .map(|sheet| sheet.name.to_owned())
        .ok_or(SpreadsheetError::SpreadsheetEmptyError)?;
    let range = workbook.worksheet_range(&first)?;

    let mut sheet = Sheet::new(sheet_name);
    for (index, cells) in range.rows().enumerate() {
        if index % CANCEL_CHECK_ROWS == 0 {
            check_cancelled(cancellation)?;
        }
        sheet.push_row(cells.iter().map(to_value).collect::<Row>());
    }
    Ok(Table::new(vec![sheet]))
}

/// Maps a calamine cell onto a cell value
fn to_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::String(value) => CellValue::String(value.to_owned()),
        Data::Bool(value) => CellValue::Boolean(*value),
        Data::Error(error) => CellValue::String(error.to_string()),
        Data::DateTime(value) => {
            let serial = value.as_f64();
            from_serial(serial, uses_1904_epoch(value))
                .map(CellValue::Date)
                .unwrap_or(CellValue::Number(serial))
        }
        Data::DateTimeIso(value) => parse_iso_datetime(value)
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::String(value.to_owned())),
        Data::DurationIso(value) => parse_iso_duration(value)
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::String(value.to_owned())),
    }
}

/// Durations always count from the 1900 epoch
fn uses_1904_epoch(value: &ExcelDateTime) -> bool {
    value.is_datetime() && *value != ExcelDateTime::new(value.as_f64(), ExcelDateTimeType::DateTime, false)
}

/// Runs decode attempts in order until one succeeds.
pub struct FallbackController {
    attempts: Vec<Box<dyn DecodeAttempt>>,
}

impl FallbackController {
    pub fn new(attempts: Vec<Box<dyn DecodeAttempt>>) -> Self {
        FallbackController { attempts }
    }

    /// Attempt names in the order they run
    pub fn attempt_names(&self) -> Vec<&str> {
        self.attempts.iter().map(|attempt| attempt.name()).collect()
    }

    /// Decodes `input` with the first attempt that succeeds.
    /// The first attempt yields [`DecodePath::Primary`], any later one [`DecodePath::Fallback`].
    pub(crate) fn decode(
        &self,
        input: &[u8],
        cancellation: &dyn Cancellation,
        observer: &dyn Observer,
    ) -> Result<(Table, DecodePath), ConversionError> {
        let mut causes: Vec<String> = Vec::with_capacity(self.attempts.len());
        for (index, attempt) in self.attempts.iter().enumerate() {
            if cancellation.is_cancelled() {
                return Err(ConversionError::Cancelled { stage: "decode" });
            }
            let label = if index == 0 { "primary" } else { "fallback" };
            match attempt.decode(input, cancellation) {
                Ok(table) => {
                    let path = if index == 0 { DecodePath::Primary } else { DecodePath::Fallback };
                    return Ok((table, path));
                }
                Err(AttemptError::Cancelled) => return Err(ConversionError::Cancelled { stage: "decode" }),
                Err(AttemptError::Failed(cause)) => {
                    if let Some(next) = self.attempts.get(index + 1) {
                        observer.fallback_engaged(attempt.name(), next.name(), &cause);
                    }
                    causes.push(format!("{} ({}): {}", label, attempt.name(), cause));
                }
            }
        }

        let cause = if causes.is_empty() {
            "no decode attempts configured".to_owned()
        } else {
            causes.join(" and ")
        };
        Err(ConversionError::Decode { format: SourceFormat::Xls, cause })
    }
}

impl Default for FallbackController {
    fn default() -> Self {
        FallbackController::new(vec![Box::new(Biff8Attempt), Box::new(CalamineAttempt::default())])
    }
}
