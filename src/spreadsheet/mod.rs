//! # Spreadsheet Decoding Module
//!
//! Turns source bytes into a [`Table`]. Each source format has its own decoder:
//! delimited text (`.csv`), JSON arrays (`.json`), zipped XML workbooks (`.xlsx`),
//! OpenDocument spreadsheets (`.ods`) and legacy BIFF8 workbooks (`.xls`). The legacy
//! format goes through an ordered list of decode attempts, see [`fallback`].

pub(crate) mod cell;
pub(crate) mod delimited;
pub(crate) mod excel;
pub mod fallback;
pub(crate) mod json;
pub(crate) mod ods;
pub(crate) mod reference;
pub(crate) mod sanitize;
pub(crate) mod sheet;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::converter::cancel::Cancellation;
use crate::converter::observer::Observer;
use crate::converter::options::ConvertOptions;
use crate::error::ConversionError;
use crate::error::SheetError;
use crate::spreadsheet::fallback::FallbackController;
use crate::spreadsheet::sheet::Table;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// Maximum number of rows of a worksheet
pub const MAX_ROWS: usize = 1_048_576;
/// Maximum number of columns of a worksheet
pub const MAX_COLS: usize = 16_384;
/// Rows processed between two cancellation checks
pub(crate) const CANCEL_CHECK_ROWS: usize = 1024;

/// Errors shared by the container decoders
#[derive(Error, Debug)]
pub(crate) enum SpreadsheetError {
    #[error("Missing part '{0}'")]
    FileError(String),

    #[error("Spreadsheet is password protected")]
    SpreadsheetPasswordProtectedError,

    #[error("Spreadsheet contains no worksheets")]
    SpreadsheetEmptyError,

    #[error("Cell at row {1}, column {2} of sheet '{0}' is beyond the spreadsheet limits")]
    CellOutOfRangeError(String, usize, usize),
}

/// Declared encoding of the input bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Csv,
    Xls,
    Xlsx,
    Ods,
    Json,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 5] = [
        SourceFormat::Csv,
        SourceFormat::Xls,
        SourceFormat::Xlsx,
        SourceFormat::Ods,
        SourceFormat::Json,
    ];

    /// File extension without the leading dot
    pub const fn extension(&self) -> &'static str {
        match self {
            SourceFormat::Csv => "csv",
            SourceFormat::Xls => "xls",
            SourceFormat::Xlsx => "xlsx",
            SourceFormat::Ods => "ods",
            SourceFormat::Json => "json",
        }
    }

    /// Resolves the extension of a file name such as `report.XLS`
    pub fn from_file_name(file_name: &str) -> Result<Self, ConversionError> {
        match file_name.rsplit_once('.') {
            Some((_, extension)) => extension.parse(),
            None => Err(ConversionError::UnsupportedFormat { tag: file_name.to_owned() }),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = ConversionError;

    /// Parses a format tag, with or without the leading dot, ignoring case
    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let extension = tag.trim().trim_start_matches('.');
        SourceFormat::ALL
            .into_iter()
            .find(|format| format.extension().eq_ignore_ascii_case(extension))
            .ok_or_else(|| ConversionError::UnsupportedFormat { tag: tag.to_owned() })
    }
}

impl Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// Which reader produced a table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodePath {
    /// The only decoder of a single-path format
    Direct,
    /// The sheet preserving legacy reader
    Primary,
    /// The flattening legacy reader, single sheet
    Fallback,
}

/// Per-request decoding state
pub(crate) struct Context<'a> {
    pub(crate) options: &'a ConvertOptions,
    pub(crate) cancellation: &'a dyn Cancellation,
}

impl Context<'_> {
    /// Fails when the request has been cancelled
    pub(crate) fn check(&self) -> Result<(), SheetError> {
        check_cancelled(self.cancellation)
    }

    /// Checks for cancellation once every [`CANCEL_CHECK_ROWS`] rows
    pub(crate) fn checkpoint(&self, row: usize) -> Result<(), SheetError> {
        if row % CANCEL_CHECK_ROWS == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

pub(crate) fn check_cancelled(cancellation: &dyn Cancellation) -> Result<(), SheetError> {
    if cancellation.is_cancelled() {
        Err(SheetError::CancelledError)
    } else {
        Ok(())
    }
}

/// Decodes `input` as `format`.
/// Legacy workbooks go through the attempts of `controller`; every other format has one decoder.
pub(crate) fn decode_table(
    input: &[u8],
    format: SourceFormat,
    controller: &FallbackController,
    context: &Context,
    observer: &dyn Observer,
) -> Result<(Table, DecodePath), ConversionError> {
    let direct = |result: Result<Table, SheetError>| {
        result
            .map(|table| (table, DecodePath::Direct))
            .map_err(|error| error.into_decode_error(format))
    };
    match format {
        SourceFormat::Csv => direct(delimited::decode(input, context)),
        SourceFormat::Json => direct(json::decode(input, context)),
        SourceFormat::Xlsx => direct(xlsx::decode(input, context)),
        SourceFormat::Ods => direct(ods::decode(input, context)),
        SourceFormat::Xls => controller.decode(input, context.cancellation, observer),
    }
}
