//! Pipeline checkpoints.
//!
//! A converter reports its progress to an [`Observer`]. Every method has an empty default, so an
//! observer only implements the checkpoints it cares about. Results never depend on the observer.

use crate::error::ConversionError;
use crate::spreadsheet::DecodePath;
use crate::spreadsheet::SourceFormat;

pub trait Observer: Send + Sync {
    fn decode_started(&self, _format: SourceFormat, _bytes: usize) {}

    fn decode_finished(&self, _format: SourceFormat, _path: DecodePath, _sheets: usize, _rows: usize) {}

    /// The legacy reader `failed` gave up with `cause` and `next` takes over
    fn fallback_engaged(&self, _failed: &str, _next: &str, _cause: &str) {}

    fn sanitize_finished(&self, _cells: usize) {}

    fn encode_finished(&self, _bytes: usize) {}

    fn failed(&self, _error: &ConversionError) {}
}

/// Discards every checkpoint
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Emits checkpoints as `tracing` events. No subscriber is installed by this crate.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn decode_started(&self, format: SourceFormat, bytes: usize) {
        tracing::debug!(format = %format, bytes, "decode started");
    }

    fn decode_finished(&self, format: SourceFormat, path: DecodePath, sheets: usize, rows: usize) {
        tracing::info!(format = %format, path = ?path, sheets, rows, "decode finished");
    }

    fn fallback_engaged(&self, failed: &str, next: &str, cause: &str) {
        tracing::warn!(failed, next, cause, "legacy workbook reader failed, trying the next one");
    }

    fn sanitize_finished(&self, cells: usize) {
        tracing::debug!(cells, "sanitize finished");
    }

    fn encode_finished(&self, bytes: usize) {
        tracing::info!(bytes, "encode finished");
    }

    fn failed(&self, error: &ConversionError) {
        tracing::warn!(cause = %error, "conversion failed");
    }
}
