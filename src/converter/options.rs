use crate::spreadsheet::fallback::FALLBACK_SHEET_NAME;

/// Per-converter decoding options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Field delimiter of delimited text input
    pub csv_delimiter: u8,
    /// Name of the sheet produced from single-table sources (CSV and JSON)
    pub default_sheet_name: String,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            csv_delimiter: b',',
            default_sheet_name: FALLBACK_SHEET_NAME.to_owned(),
        }
    }
}
