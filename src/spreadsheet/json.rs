//! JSON array decoder (.json)
//!
//! Two root shapes are accepted. An array of objects takes its header from the keys of the
//! first object, in document order. An array of arrays takes its header from the first
//! inner array. Anything else is a structural error.

use crate::error::SheetError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Row;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::sheet::Table;
use crate::spreadsheet::Context;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::MAX_COLS;
use crate::spreadsheet::MAX_ROWS;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

/// Root shape errors, reported as structural rather than decode failures
#[derive(Error, Debug)]
pub(crate) enum StructureError {
    #[error("root must be an array of objects or array of arrays")]
    RootShapeError,
}

/// Decodes a JSON array into a single-sheet table
pub(crate) fn decode(input: &[u8], context: &Context) -> Result<Table, SheetError> {
    let root: Value = serde_json::from_slice(input)?;
    let items = match root {
        Value::Array(items) => items,
        _ => Err(StructureError::RootShapeError)?,
    };
    let name = context.options.default_sheet_name.as_str();
    if items.len() > MAX_ROWS {
        Err(SpreadsheetError::CellOutOfRangeError(name.to_owned(), items.len(), 1))?
    }

    let rows = match items.first() {
        None => Vec::new(),
        Some(Value::Object(_)) => decode_objects(items, context)?,
        Some(Value::Array(_)) => decode_arrays(items, context)?,
        Some(_) => Err(StructureError::RootShapeError)?,
    };
    if rows.iter().any(|row| row.len() > MAX_COLS) {
        Err(SpreadsheetError::CellOutOfRangeError(name.to_owned(), 1, MAX_COLS + 1))?
    }
    Ok(Table::new(vec![Sheet::with_rows(name, rows)]))
}

fn decode_objects(items: Vec<Value>, context: &Context) -> Result<Vec<Row>, SheetError> {
    let objects = items
        .into_iter()
        .map(|item| match item {
            Value::Object(object) => Ok(object),
            _ => Err(StructureError::RootShapeError),
        })
        .collect::<Result<Vec<Map<String, Value>>, StructureError>>()?;

    let header: Vec<String> = objects
        .first()
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default();
    let mut rows = Vec::with_capacity(objects.len() + 1);
    rows.push(header.iter().map(|key| header_value(&Value::String(key.to_owned()))).collect());
    for (index, object) in objects.iter().enumerate() {
        context.checkpoint(index)?;
        rows.push(header.iter().map(|key| object.get(key).map(to_value).unwrap_or_default()).collect());
    }
    Ok(rows)
}

fn decode_arrays(items: Vec<Value>, context: &Context) -> Result<Vec<Row>, SheetError> {
    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        context.checkpoint(index)?;
        let values = match item {
            Value::Array(values) => values,
            _ => Err(StructureError::RootShapeError)?,
        };
        let row: Row = if index == 0 {
            values.iter().map(header_value).collect()
        } else {
            values.iter().map(to_value).collect()
        };
        rows.push(row);
    }
    Ok(rows)
}

/// Header cells are text; `null` and empty names stay empty
fn header_value(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::String(text) if text.is_empty() => CellValue::Empty,
        Value::String(text) => CellValue::String(text.to_owned()),
        other => CellValue::String(other.to_string()),
    }
}

/// Maps a JSON value onto a cell; nested values keep their compact JSON text
fn to_value(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(flag) => CellValue::Boolean(*flag),
        Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::String(number.to_string())),
        Value::String(text) => CellValue::String(text.to_owned()),
        Value::Array(_) | Value::Object(_) => CellValue::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::cancel::NeverCancel;
    use crate::converter::options::ConvertOptions;

    fn decode_text(input: &str) -> Result<Table, SheetError> {
        let options = ConvertOptions::default();
        let context = Context { options: &options, cancellation: &NeverCancel };
        decode(input.as_bytes(), &context)
    }

    fn row(cells: Vec<CellValue>) -> Row {
        Row::new(cells)
    }

    #[test]
    fn array_of_objects() {
        let table = decode_text(r#"[{"a":1,"b":2},{"a":3}]"#).unwrap();
        assert_eq!(table.sheets[0].rows(), &[
            row(vec![CellValue::from("a"), CellValue::from("b")]),
            row(vec![CellValue::Number(1.0), CellValue::Number(2.0)]),
            row(vec![CellValue::Number(3.0), CellValue::Empty]),
        ]);
    }

    #[test]
    fn header_order_follows_first_object() {
        let table = decode_text(r#"[{"z":1,"a":2},{"a":3,"z":4,"extra":5}]"#).unwrap();
        let sheet = &table.sheets[0];
        assert_eq!(sheet.cell(0, 0), &CellValue::from("z"));
        assert_eq!(sheet.cell(2, 0), &CellValue::Number(4.0));
        assert_eq!(sheet.cell(2, 1), &CellValue::Number(3.0));
        assert_eq!(sheet.width(), 2);
    }

    #[test]
    fn array_of_arrays() {
        let table = decode_text(r#"[["name",1,null],["x",true,{"k":[1]}]]"#).unwrap();
        let sheet = &table.sheets[0];
        assert_eq!(sheet.cell(0, 1), &CellValue::from("1"));
        assert_eq!(sheet.cell(0, 2), &CellValue::Empty);
        assert_eq!(sheet.cell(1, 1), &CellValue::Boolean(true));
        assert_eq!(sheet.cell(1, 2), &CellValue::from(r#"{"k":[1]}"#));
    }

    #[test]
    fn empty_array() {
        let table = decode_text("[]").unwrap();
        assert_eq!(table.sheets.len(), 1);
        assert!(table.sheets[0].rows().is_empty());
    }

    #[test]
    fn rejected_roots() {
        for input in [r#"{"a":1}"#, "1", r#"["a","b"]"#, r#"[{"a":1},[1]]"#, r#"[[1],{"a":1}]"#] {
            let error = decode_text(input).unwrap_err();
            assert!(matches!(error, SheetError::StructureError(_)), "{}", input);
        }
    }

    #[test]
    fn invalid_json_is_not_structural() {
        let error = decode_text("[{\"a\":").unwrap_err();
        assert!(matches!(error, SheetError::JsonError(_)));
    }
}
