//! Formula prefix removal.
//!
//! A string cell whose trimmed text starts with `=` would be evaluated as a formula by
//! spreadsheet applications. The cell keeps its text without that first `=`.

use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::sheet::Table;

/// Strips one leading `=` from the trimmed text of a string cell.
/// Every other cell is returned unchanged.
pub fn sanitize(cell: CellValue) -> CellValue {
    match cell {
        CellValue::String(text) => match text.trim().strip_prefix('=') {
            Some(rest) => CellValue::String(rest.to_owned()),
            None => CellValue::String(text),
        },
        other => other,
    }
}

/// Sanitizes a cell in place and reports whether it changed
pub(crate) fn sanitize_cell(cell: &mut CellValue) -> bool {
    let is_formula = cell.as_str().map(|text| text.trim_start().starts_with('=')).unwrap_or(false);
    if is_formula {
        *cell = sanitize(std::mem::take(cell));
    }
    is_formula
}

impl Table {
    /// Sanitizes every cell of every sheet and returns how many cells changed
    pub fn sanitize(&mut self) -> usize {
        let mut count = 0usize;
        for sheet in self.sheets.iter_mut() {
            for row in sheet.rows_mut() {
                for cell in row.cells_mut() {
                    if sanitize_cell(cell) {
                        count += 1;
                    }
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::sheet::Row;
    use crate::spreadsheet::sheet::Sheet;

    #[test]
    fn strips_single_prefix() {
        assert_eq!(sanitize(CellValue::from("=SUM(A1:A3)")), CellValue::from("SUM(A1:A3)"));
        assert_eq!(sanitize(CellValue::from("  =1+1  ")), CellValue::from("1+1"));
        assert_eq!(sanitize(CellValue::from("==x")), CellValue::from("=x"));
        assert_eq!(sanitize(CellValue::from("=")), CellValue::from(""));
    }

    #[test]
    fn identity_for_other_cells() {
        assert_eq!(sanitize(CellValue::from("  plain  ")), CellValue::from("  plain  "));
        assert_eq!(sanitize(CellValue::from("a=b")), CellValue::from("a=b"));
        assert_eq!(sanitize(CellValue::Number(1.0)), CellValue::Number(1.0));
        assert_eq!(sanitize(CellValue::Boolean(true)), CellValue::Boolean(true));
        assert_eq!(sanitize(CellValue::Empty), CellValue::Empty);
    }

    #[test]
    fn sanitize_is_not_idempotent_on_double_prefix() {
        let once = sanitize(CellValue::from("==1"));
        assert_eq!(sanitize(once), CellValue::from("1"));
    }

    #[test]
    fn table_sanitize_counts_changes() {
        let mut table = Table::new(vec![Sheet::with_rows("Data", vec![
            Row::new(vec![CellValue::from("=A1"), CellValue::from("ok"), CellValue::from(2.0)]),
            Row::new(vec![CellValue::Empty, CellValue::from(" =B2")]),
        ])]);
        assert_eq!(table.sanitize(), 2);
        assert_eq!(table.sheets[0].cell(0, 0), &CellValue::from("A1"));
        assert_eq!(table.sheets[0].cell(1, 1), &CellValue::from("B2"));
        assert_eq!(table.sheets[0].cell(0, 1), &CellValue::from("ok"));
    }
}
