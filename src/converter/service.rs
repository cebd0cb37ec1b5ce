//! Upload boundary in front of a [`Converter`]
//!
//! Resolves the declared format from the file name, then checks the allow-list, the declared
//! MIME type and the upload size before any byte is decoded.

use crate::converter::Conversion;
use crate::converter::Converter;
use crate::error::ConversionError;
use crate::spreadsheet::SourceFormat;
use thiserror::Error;

/// Largest upload accepted by default, 50 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub max_upload_bytes: usize,
    /// Accepted formats with the MIME types a client may declare for each
    pub allowed: Vec<(SourceFormat, Vec<String>)>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        let mime = |types: &[&str]| types.iter().map(|t| t.to_string()).collect::<Vec<String>>();
        ServiceConfig {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed: vec![
                (SourceFormat::Csv, mime(&["text/csv", "application/vnd.ms-excel"])),
                (SourceFormat::Xls, mime(&["application/vnd.ms-excel"])),
                (
                    SourceFormat::Xlsx,
                    mime(&["application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"]),
                ),
                (SourceFormat::Ods, mime(&["application/vnd.oasis.opendocument.spreadsheet"])),
                (SourceFormat::Json, mime(&["application/json", "text/json"])),
            ],
        }
    }
}

impl ServiceConfig {
    fn mime_types(&self, format: SourceFormat) -> Option<&[String]> {
        self.allowed
            .iter()
            .find(|(allowed, _)| *allowed == format)
            .map(|(_, types)| types.as_slice())
    }
}

/// Reasons an upload is refused
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    #[error("File '{file_name}' has an unsupported extension")]
    UnsupportedExtension { file_name: String },

    #[error("MIME type '{mime}' does not match {format} input")]
    UnsupportedMime { format: SourceFormat, mime: String },

    #[error("Upload of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

pub struct ConversionService {
    config: ServiceConfig,
    converter: Converter,
}

impl ConversionService {
    pub fn new(config: ServiceConfig, converter: Converter) -> Self {
        ConversionService { config, converter }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Validates an upload and converts it
    pub fn convert_upload(
        &self,
        file_name: &str,
        mime: Option<&str>,
        bytes: &[u8],
    ) -> Result<Conversion, ServiceError> {
        let format = self.check(file_name, mime, bytes.len())?;
        Ok(self.converter.convert(bytes, format)?)
    }

    fn check(&self, file_name: &str, mime: Option<&str>, size: usize) -> Result<SourceFormat, ServiceError> {
        let resolved = SourceFormat::from_file_name(file_name)
            .ok()
            .and_then(|format| self.config.mime_types(format).map(|types| (format, types)));
        let Some((format, mime_types)) = resolved else {
            tracing::warn!(file_name, "upload rejected: unsupported extension");
            return Err(ServiceError::UnsupportedExtension { file_name: file_name.to_owned() });
        };

        if let Some(mime) = mime {
            let essence = mime.split(';').next().unwrap_or(mime).trim();
            if !mime_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(essence)) {
                tracing::warn!(file_name, mime, format = %format, "upload rejected: MIME type mismatch");
                return Err(ServiceError::UnsupportedMime { format, mime: mime.to_owned() });
            }
        }

        if size > self.config.max_upload_bytes {
            tracing::warn!(file_name, size, limit = self.config.max_upload_bytes, "upload rejected: too large");
            return Err(ServiceError::TooLarge { size, limit: self.config.max_upload_bytes });
        }

        tracing::debug!(file_name, format = %format, size, "upload accepted");
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::observer::NoopObserver;
    use std::sync::Arc;

    fn service(config: ServiceConfig) -> ConversionService {
        ConversionService::new(config, Converter::new().with_observer(Arc::new(NoopObserver)))
    }

    #[test]
    fn accepts_declared_csv() {
        let conversion = service(ServiceConfig::default())
            .convert_upload("people.CSV", Some("text/csv; charset=utf-8"), b"name\nAda\n")
            .unwrap();
        assert_eq!(conversion.report.format, SourceFormat::Csv);
        assert_eq!(conversion.report.rows, 2);
    }

    #[test]
    fn rejects_unknown_extension() {
        let error = service(ServiceConfig::default()).convert_upload("notes.txt", None, b"x").unwrap_err();
        assert_eq!(error, ServiceError::UnsupportedExtension { file_name: "notes.txt".to_owned() });
    }

    #[test]
    fn rejects_format_outside_the_allow_list() {
        let config = ServiceConfig {
            allowed: vec![(SourceFormat::Csv, vec!["text/csv".to_owned()])],
            ..ServiceConfig::default()
        };
        let error = service(config).convert_upload("data.json", None, b"[]").unwrap_err();
        assert!(matches!(error, ServiceError::UnsupportedExtension { .. }));
    }

    #[test]
    fn rejects_mime_mismatch() {
        let error = service(ServiceConfig::default())
            .convert_upload("data.json", Some("text/csv"), b"[]")
            .unwrap_err();
        assert_eq!(error, ServiceError::UnsupportedMime {
            format: SourceFormat::Json,
            mime: "text/csv".to_owned(),
        });
    }

    #[test]
    fn rejects_large_upload() {
        let config = ServiceConfig { max_upload_bytes: 4, ..ServiceConfig::default() };
        let error = service(config).convert_upload("data.csv", None, b"a,b,c\n").unwrap_err();
        assert_eq!(error, ServiceError::TooLarge { size: 6, limit: 4 });
    }

    #[test]
    fn conversion_errors_pass_through() {
        let error = service(ServiceConfig::default()).convert_upload("data.json", None, br#"{"a":1}"#).unwrap_err();
        assert!(matches!(
            error,
            ServiceError::Conversion(ConversionError::Structural { format: SourceFormat::Json, .. })
        ));
    }
}
