use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use iso8601_duration::Duration as IsoDuration;
use std::fmt::Display;
use thiserror::Error;

const MILLISECONDS_PER_DAY: f64 = 86_400_000f64;
/// Serial of 9999-12-31, the last day spreadsheets can address
const MAX_SERIAL: f64 = 2_958_466.0;

/// Errors raised while turning raw cell text into a value
#[derive(Error, Debug)]
pub(crate) enum CellError {
    #[error("Shared string index '{0}' is out of range")]
    SharedStringIndexError(usize),

    #[error("Parse '{0}' to number failed")]
    NumberError(String),

    #[error("Parse '{0}' to date/time failed")]
    DateTimeError(String),

    #[error("Parse '{0}' to iso8601 duration failed")]
    DurationError(String),
}

/// A single decoded cell.
///
/// Only [`CellValue::String`] is subject to sanitization. Time-of-day values without a date are
/// represented as a [`CellValue::Date`] on 1899-12-31, the day of serial 0.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDateTime),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Returns the text of a string cell
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_owned())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::Date(value)
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::String(value) => write!(f, "{}", value),
            CellValue::Number(value) => write!(f, "{}", value),
            CellValue::Boolean(value) => write!(f, "{}", value),
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// How the raw text of a cell has to be interpreted.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as 1/0 or true/false
    Boolean,
    /// Numeric values
    Number,
    /// Numbers formatted as date or time, 1900 date system
    NumberDateTime1900,
    /// Numbers formatted as date or time, 1904 date system
    NumberDateTime1904,
    /// ISO 8601 date/time strings
    IsoDateTime,
    /// ISO 8601 duration strings
    IsoDuration,
    /// Inline string values
    InlineString,
    /// Shared string table references
    SharedString,
    /// Error values, kept as their text
    Error,
}

impl CellType {
    /// Date/time type for the given date system
    pub(crate) fn date_time(is_1904: bool) -> Self {
        if is_1904 {
            Self::NumberDateTime1904
        } else {
            Self::NumberDateTime1900
        }
    }

    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id.trim() {
            "14" | "15" | "16" | "17" | "18" | "19" | "20" | "21" | "22" | "45" | "46" | "47" => Some(Self::date_time(is_1904)),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Quoted literals, escaped characters and bracketed sections are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_temporal = false;
        let mut is_bracket = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' if !is_literal => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' | 'H' | 'h' | 'S' | 's' => is_temporal = true,
                _ => (),
            }
        }

        if is_temporal {
            Self::date_time(is_1904)
        } else {
            Self::Number
        }
    }

    /// Converts a numeric payload, turning temporal types into dates.
    /// Serials outside the representable range stay numbers.
    pub(crate) fn to_number_value(self, number: f64) -> CellValue {
        let date = match self {
            CellType::NumberDateTime1900 => from_serial(number, false),
            CellType::NumberDateTime1904 => from_serial(number, true),
            _ => None,
        };
        date.map(CellValue::Date).unwrap_or(CellValue::Number(number))
    }

    /// Converts the raw text of a cell into its value
    pub(crate) fn to_value(self, raw: &str, shared_strings: &[String]) -> Result<CellValue, CellError> {
        Ok(match self {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => CellValue::Boolean(matches!(raw.trim(), "1" | "true" | "TRUE")),
            CellType::Number | CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                let number = raw
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| CellError::NumberError(raw.to_owned()))?;
                self.to_number_value(number)
            }
            CellType::IsoDateTime => CellValue::Date(parse_iso_datetime(raw)?),
            CellType::IsoDuration => CellValue::Date(parse_iso_duration(raw)?),
            CellType::InlineString | CellType::Error => CellValue::String(raw.to_owned()),
            CellType::SharedString => {
                let index = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| CellError::NumberError(raw.to_owned()))?;
                let value = shared_strings
                    .get(index)
                    .ok_or(CellError::SharedStringIndexError(index))?;
                CellValue::String(value.to_owned())
            }
        })
    }
}

/// Converts Excel error codes to human-readable error strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// Day 0 of the 1900 date system; time-only values are anchored here
pub(crate) fn time_base() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 31).expect("NaiveDate Literal")
}

fn epoch(is_1904: bool) -> NaiveDateTime {
    let date = if is_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };
    date.expect("NaiveDate Literal").and_time(NaiveTime::MIN)
}

/// Converts a spreadsheet serial number into a date-time.
/// Handles the Lotus 1-2-3 leap year bug of the 1900 system: serials below 60 are shifted by a day.
pub(crate) fn from_serial(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial >= MAX_SERIAL {
        return None;
    }
    let milliseconds = (serial * MILLISECONDS_PER_DAY).round() as i64;
    let shift = if !is_1904 && serial.trunc() < 60.0 { 1 } else { 0 };
    epoch(is_1904)
        .checked_add_signed(Duration::days(shift))?
        .checked_add_signed(Duration::milliseconds(milliseconds))
}

/// Converts a date-time into a 1900-system serial number.
/// Returns `None` for moments before 1899-12-31, which have no serial.
pub(crate) fn to_serial(value: &NaiveDateTime) -> Option<f64> {
    let milliseconds = value.signed_duration_since(epoch(false)).num_milliseconds();
    let mut serial = milliseconds as f64 / MILLISECONDS_PER_DAY;
    if serial < 61.0 {
        serial -= 1.0;
    }
    if serial < 0.0 || serial >= MAX_SERIAL {
        None
    } else {
        Some(serial)
    }
}

/// Parses ISO 8601 date, date-time or time text
pub(crate) fn parse_iso_datetime(value: &str) -> Result<NaiveDateTime, CellError> {
    let text = value.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN)))
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S%.f").map(|time| time_base().and_time(time)))
        .map_err(|_| CellError::DateTimeError(value.to_owned()))
}

/// Parses an ISO 8601 duration such as `PT12H30M00S` into a time on day 0
pub(crate) fn parse_iso_duration(value: &str) -> Result<NaiveDateTime, CellError> {
    let duration = value
        .trim()
        .parse::<IsoDuration>()
        .map_err(|_| CellError::DurationError(value.to_owned()))?;
    let hours = duration.day as f64 * 24.0 + duration.hour as f64;
    let seconds = (hours * 60.0 + duration.minute as f64) * 60.0 + duration.second as f64;
    time_base()
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::milliseconds((seconds * 1000.0).round() as i64))
        .ok_or_else(|| CellError::DurationError(value.to_owned()))
}
