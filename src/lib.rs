//! # Rusty Convert
//!
//! Converts tabular uploads into sanitized `.xlsx` workbooks.
//!
//! ## Features
//!
//! - **Five source formats**: delimited text (`.csv`), JSON arrays (`.json`), zipped XML
//!   workbooks (`.xlsx`), OpenDocument spreadsheets (`.ods`) and legacy BIFF8 workbooks (`.xls`)
//! - **Formula neutralization**: a string cell whose trimmed text starts with `=` loses that
//!   first `=`, so no formula survives into the output
//! - **Legacy fallback**: `.xls` input is read by a sheet preserving BIFF8 reader first; when it
//!   fails the first worksheet is read again with `calamine` into a single `"Converted Data"` sheet
//! - **All or nothing**: the output workbook is returned only once it is complete
//! - **Cancellation and checkpoints**: long conversions can be cancelled, and every stage is
//!   reported to an [`Observer`] (`tracing` events by default)
//!
//! ## Usage
//!
//! ```no_run
//! use rusty_convert::{convert, SourceFormat};
//!
//! let bytes = convert(b"name,total\nAda,=SUM(A1:A9)\n", SourceFormat::Csv)?;
//! # Ok::<(), rusty_convert::ConversionError>(())
//! ```

mod error;
mod helpers;
mod spreadsheet;
mod writer;

pub mod converter;

pub use crate::converter::cancel::Cancellation;
pub use crate::converter::cancel::NeverCancel;
pub use crate::converter::convert;
pub use crate::converter::decode;
pub use crate::converter::encode;
pub use crate::converter::observer::NoopObserver;
pub use crate::converter::observer::Observer;
pub use crate::converter::observer::TracingObserver;
pub use crate::converter::options::ConvertOptions;
pub use crate::converter::service::ConversionService;
pub use crate::converter::service::ServiceConfig;
pub use crate::converter::service::ServiceError;
pub use crate::converter::Conversion;
pub use crate::converter::ConversionReport;
pub use crate::converter::Converter;
pub use crate::error::ConversionError;
pub use crate::spreadsheet::cell::CellValue;
pub use crate::spreadsheet::fallback::AttemptError;
pub use crate::spreadsheet::fallback::Biff8Attempt;
pub use crate::spreadsheet::fallback::CalamineAttempt;
pub use crate::spreadsheet::fallback::DecodeAttempt;
pub use crate::spreadsheet::fallback::FallbackController;
pub use crate::spreadsheet::fallback::FALLBACK_SHEET_NAME;
pub use crate::spreadsheet::sanitize::sanitize;
pub use crate::spreadsheet::sheet::Row;
pub use crate::spreadsheet::sheet::Sheet;
pub use crate::spreadsheet::sheet::Table;
pub use crate::spreadsheet::DecodePath;
pub use crate::spreadsheet::SourceFormat;
pub use crate::spreadsheet::MAX_COLS;
pub use crate::spreadsheet::MAX_ROWS;
