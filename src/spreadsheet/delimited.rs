//! Delimited text decoder (.csv)
//!
//! The first record is the header row and stays text. Data fields are inferred:
//! empty fields become empty cells, finite numbers become numbers, the literals
//! `true` and `false` become booleans, and everything else stays text.

use crate::error::ResultMessage;
use crate::error::SheetError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::Context;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::MAX_COLS;
use crate::spreadsheet::MAX_ROWS;
use csv::ReaderBuilder;

/// Decodes UTF-8 delimited text into a single-sheet table
pub(crate) fn decode(input: &[u8], context: &Context) -> Result<Table, SheetError> {
    let text = std::str::from_utf8(input)
        .map_err(SheetError::from)
        .with_prefix("input is not valid UTF-8")?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = ReaderBuilder::new()
        .delimiter(context.options.csv_delimiter)
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let name = &context.options.default_sheet_name;
    let mut sheet = Sheet::new(name.as_str());
    for (index, result) in reader.records().enumerate() {
        context.checkpoint(index)?;
        let record = result?;
        if index >= MAX_ROWS || record.len() > MAX_COLS {
            Err(SpreadsheetError::CellOutOfRangeError(name.to_owned(), index + 1, record.len()))?
        }
        let row: Row = if index == 0 {
            record.iter().map(header_value).collect()
        } else {
            record.iter().map(infer_value).collect()
        };
        sheet.push_row(row);
    }

    Ok(Table::new(vec![sheet]))
}

fn header_value(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Empty
    } else {
        CellValue::String(field.to_owned())
    }
}

/// Infers the value of a data field
pub(crate) fn infer_value(field: &str) -> CellValue {
    match field {
        "" => CellValue::Empty,
        "true" => CellValue::Boolean(true),
        "false" => CellValue::Boolean(false),
        _ => match field.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => CellValue::Number(number),
            _ => CellValue::String(field.to_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::cancel::NeverCancel;
    use crate::converter::options::ConvertOptions;
    use std::sync::atomic::AtomicBool;

    fn decode_with(input: &str, options: &ConvertOptions) -> Result<Table, SheetError> {
        let context = Context { options, cancellation: &NeverCancel };
        decode(input.as_bytes(), &context)
    }

    #[test]
    fn header_and_inferred_rows() {
        let table = decode_with("name,age,active\nAda,36,true\nBob,,false\n", &ConvertOptions::default()).unwrap();
        let sheet = &table.sheets[0];
        assert_eq!(sheet.name(), "Converted Data");
        assert_eq!(sheet.rows().len(), 3);
        assert_eq!(sheet.cell(0, 1), &CellValue::from("age"));
        assert_eq!(sheet.cell(1, 1), &CellValue::Number(36.0));
        assert_eq!(sheet.cell(1, 2), &CellValue::Boolean(true));
        assert_eq!(sheet.cell(2, 1), &CellValue::Empty);
        assert_eq!(sheet.cell(2, 2), &CellValue::Boolean(false));
    }

    #[test]
    fn inference_rules() {
        assert_eq!(infer_value("1e3"), CellValue::Number(1000.0));
        assert_eq!(infer_value(" 2.5 "), CellValue::Number(2.5));
        assert_eq!(infer_value("NaN"), CellValue::from("NaN"));
        assert_eq!(infer_value("inf"), CellValue::from("inf"));
        assert_eq!(infer_value("TRUE"), CellValue::from("TRUE"));
        assert_eq!(infer_value("=1+1"), CellValue::from("=1+1"));
    }

    #[test]
    fn header_stays_text() {
        let table = decode_with("1,true\n2,false\n", &ConvertOptions::default()).unwrap();
        assert_eq!(table.sheets[0].cell(0, 0), &CellValue::from("1"));
        assert_eq!(table.sheets[0].cell(0, 1), &CellValue::from("true"));
    }

    #[test]
    fn quoted_fields_and_bom() {
        let table = decode_with("\u{feff}a,b\n\"x, y\",\"line\nbreak\"\n", &ConvertOptions::default()).unwrap();
        let sheet = &table.sheets[0];
        assert_eq!(sheet.cell(0, 0), &CellValue::from("a"));
        assert_eq!(sheet.cell(1, 0), &CellValue::from("x, y"));
        assert_eq!(sheet.cell(1, 1), &CellValue::from("line\nbreak"));
    }

    #[test]
    fn custom_delimiter() {
        let options = ConvertOptions { csv_delimiter: b';', ..ConvertOptions::default() };
        let table = decode_with("a;b\n1;2\n", &options).unwrap();
        assert_eq!(table.sheets[0].cell(1, 1), &CellValue::Number(2.0));
    }

    #[test]
    fn ragged_record_is_an_error() {
        let error = decode_with("a,b\n1,2,3\n", &ConvertOptions::default()).unwrap_err();
        assert!(error.to_string().contains("line"));
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let context = Context { options: &ConvertOptions::default(), cancellation: &NeverCancel };
        let error = decode(&[b'a', b',', 0xFF, b'\n'], &context).unwrap_err();
        assert!(error.to_string().starts_with("input is not valid UTF-8"));
    }

    #[test]
    fn cancelled_before_first_row() {
        let cancelled = AtomicBool::new(true);
        let options = ConvertOptions::default();
        let context = Context { options: &options, cancellation: &cancelled };
        assert!(matches!(decode(b"a\n1\n", &context), Err(SheetError::CancelledError)));
    }

    #[test]
    fn empty_input_has_no_rows() {
        let table = decode_with("", &ConvertOptions::default()).unwrap();
        assert_eq!(table.sheets.len(), 1);
        assert!(table.sheets[0].rows().is_empty());
    }
}
