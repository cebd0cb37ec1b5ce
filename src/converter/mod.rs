//! # Conversion Pipeline
//!
//! A [`Converter`] runs decode, sanitize and encode for one input at a time and reports its
//! progress to an [`Observer`]. It holds only read-only configuration, so one instance can
//! serve any number of threads.

pub mod cancel;
pub mod observer;
pub mod options;
pub mod service;

use crate::converter::cancel::Cancellation;
use crate::converter::cancel::NeverCancel;
use crate::converter::observer::Observer;
use crate::converter::observer::TracingObserver;
use crate::converter::options::ConvertOptions;
use crate::error::ConversionError;
use crate::spreadsheet::decode_table;
use crate::spreadsheet::fallback::DecodeAttempt;
use crate::spreadsheet::fallback::FallbackController;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::Context;
use crate::spreadsheet::DecodePath;
use crate::spreadsheet::SourceFormat;
use crate::writer::encode_table;
use std::sync::Arc;

/// Converts `input` of the declared `format` into xlsx bytes with a default [`Converter`]
pub fn convert(input: &[u8], format: SourceFormat) -> Result<Vec<u8>, ConversionError> {
    Converter::new().convert(input, format).map(|conversion| conversion.bytes)
}

/// Decodes `input` into a table without sanitizing it
pub fn decode(input: &[u8], format: SourceFormat) -> Result<Table, ConversionError> {
    let options = ConvertOptions::default();
    let context = Context { options: &options, cancellation: &NeverCancel };
    let controller = FallbackController::default();
    decode_table(input, format, &controller, &context, &observer::NoopObserver).map(|(table, _)| table)
}

/// Encodes `table` as it is into xlsx bytes
pub fn encode(table: &Table) -> Result<Vec<u8>, ConversionError> {
    encode_table(table, &NeverCancel).map_err(|error| error.into_encode_error())
}

/// Output of a successful conversion
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    /// The finished xlsx workbook
    pub bytes: Vec<u8>,
    pub report: ConversionReport,
}

/// What a conversion did on its way to the output
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConversionReport {
    pub format: SourceFormat,
    pub path: DecodePath,
    pub sheets: usize,
    pub rows: usize,
    /// Number of string cells that lost their leading `=`
    pub sanitized_cells: usize,
}

pub struct Converter {
    observer: Arc<dyn Observer>,
    options: ConvertOptions,
    controller: FallbackController,
}

impl Default for Converter {
    fn default() -> Self {
        Converter::new()
    }
}

impl Converter {
    /// Creates a converter with default options, logging through `tracing`
    pub fn new() -> Self {
        Converter {
            observer: Arc::new(TracingObserver),
            options: ConvertOptions::default(),
            controller: FallbackController::default(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the ordered decode attempts used for `.xls` input
    pub fn with_xls_attempts(mut self, attempts: Vec<Box<dyn DecodeAttempt>>) -> Self {
        self.controller = FallbackController::new(attempts);
        self
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    pub fn convert(&self, input: &[u8], format: SourceFormat) -> Result<Conversion, ConversionError> {
        self.convert_cancellable(input, format, &NeverCancel)
    }

    /// Converts `input`, giving up with [`ConversionError::Cancelled`] once `cancellation` fires
    pub fn convert_cancellable(
        &self,
        input: &[u8],
        format: SourceFormat,
        cancellation: &dyn Cancellation,
    ) -> Result<Conversion, ConversionError> {
        let result = self.run(input, format, cancellation);
        if let Err(error) = &result {
            self.observer.failed(error);
        }
        result
    }

    fn run(
        &self,
        input: &[u8],
        format: SourceFormat,
        cancellation: &dyn Cancellation,
    ) -> Result<Conversion, ConversionError> {
        let observer = self.observer.as_ref();
        observer.decode_started(format, input.len());

        let context = Context { options: &self.options, cancellation };
        let (mut table, path) = decode_table(input, format, &self.controller, &context, observer)?;
        let sheets = table.sheets.len();
        let rows = table.row_count();
        observer.decode_finished(format, path, sheets, rows);

        let sanitized_cells = table.sanitize();
        observer.sanitize_finished(sanitized_cells);

        let bytes = encode_table(&table, cancellation).map_err(|error| error.into_encode_error())?;
        observer.encode_finished(bytes.len());

        Ok(Conversion {
            bytes,
            report: ConversionReport { format, path, sheets, rows, sanitized_cells },
        })
    }
}
