use crate::spreadsheet::SourceFormat;
use thiserror::Error;

/// Errors returned by a conversion.
///
/// Every variant is terminal: no partial workbook is produced once one of these is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("Unsupported format '{tag}'")]
    UnsupportedFormat { tag: String },

    #[error("Failed to decode {format} input: {cause}")]
    Decode { format: SourceFormat, cause: String },

    #[error("Failed to encode xlsx output: {cause}")]
    Encode { cause: String },

    #[error("Invalid {format} structure: {message}")]
    Structural { format: SourceFormat, message: String },

    #[error("Conversion cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

/// Internal error type.
/// Aggregates errors from the standard library, dependencies and internal modules.
#[derive(Error, Debug)]
pub(crate) enum SheetError {
    #[error("{0}")]
    WithContextError(String),

    #[error("Operation cancelled")]
    CancelledError,

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    ParseDateTimeError(#[from] chrono::ParseError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    CalamineError(#[from] calamine::XlsError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    CellError(#[from] crate::spreadsheet::cell::CellError),

    #[error("{0}")]
    StructureError(#[from] crate::spreadsheet::json::StructureError),

    #[error("{0}")]
    OdsError(#[from] crate::spreadsheet::ods::OdsError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    #[error("{0}")]
    XlsxError(#[from] crate::spreadsheet::xlsx::XlsxError),

    // Writer module errors
    #[error("{0}")]
    WriteError(#[from] crate::writer::WriteError),
}

impl SheetError {
    /// Classifies a failure raised while decoding `format` input.
    pub(crate) fn into_decode_error(self, format: SourceFormat) -> ConversionError {
        match self {
            SheetError::CancelledError => ConversionError::Cancelled { stage: "decode" },
            SheetError::StructureError(error) => ConversionError::Structural {
                format,
                message: error.to_string(),
            },
            error => ConversionError::Decode {
                format,
                cause: error.to_string(),
            },
        }
    }

    /// Classifies a failure raised while encoding the output workbook.
    pub(crate) fn into_encode_error(self) -> ConversionError {
        match self {
            SheetError::CancelledError => ConversionError::Cancelled { stage: "encode" },
            error => ConversionError::Encode {
                cause: error.to_string(),
            },
        }
    }
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, SheetError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| match e {
            SheetError::CancelledError => SheetError::CancelledError,
            SheetError::StructureError(error) => SheetError::StructureError(error),
            e => SheetError::WithContextError(format!("{}: {}", message, e)),
        })
    }
}
