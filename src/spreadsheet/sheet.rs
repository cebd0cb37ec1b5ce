use crate::error::SheetError;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::SpreadsheetError;
use crate::spreadsheet::MAX_COLS;
use crate::spreadsheet::MAX_ROWS;

static EMPTY: CellValue = CellValue::Empty;

/// An ordered collection of sheets, built fresh for every conversion.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub sheets: Vec<Sheet>,
}

impl Table {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Table { sheets }
    }

    /// Sheet names in order
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|sheet| sheet.name()).collect()
    }

    /// Total number of rows over all sheets
    pub fn row_count(&self) -> usize {
        self.sheets.iter().map(|sheet| sheet.rows().len()).sum()
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|sheet| sheet.name() == name)
    }
}

/// A named grid of rows.
///
/// Positions are absolute: row `n` of [`Sheet::rows`] is spreadsheet row `n + 1`, and rows
/// between data rows are kept as empty rows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    name: String,
    rows: Vec<Row>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Sheet {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Cell at 0-based (row, col); missing cells read as empty
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows.get(row).map(|it| it.get(col)).unwrap_or(&EMPTY)
    }

    /// Number of columns of the widest row
    pub fn width(&self) -> usize {
        self.rows.iter().map(Row::len).max().unwrap_or(0)
    }

    /// Stores a decoded cell, growing the grid as needed
    pub(crate) fn set(&mut self, row: usize, col: usize, value: CellValue) -> Result<(), SheetError> {
        if row >= MAX_ROWS || col >= MAX_COLS {
            Err(SpreadsheetError::CellOutOfRangeError(self.name.to_owned(), row + 1, col + 1))?
        }
        if value.is_empty() && row >= self.rows.len() {
            return Ok(());
        }
        self.ensure_rows(row + 1)?;
        self.rows[row].set(col, value);
        Ok(())
    }

    /// Grows the sheet to at least `count` rows
    pub(crate) fn ensure_rows(&mut self, count: usize) -> Result<(), SheetError> {
        if count > MAX_ROWS {
            Err(SpreadsheetError::CellOutOfRangeError(self.name.to_owned(), count, 1))?
        }
        if self.rows.len() < count {
            self.rows.resize_with(count, Row::default);
        }
        Ok(())
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }
}

/// Cells of one row aligned by column index.
///
/// Trailing empty cells are never stored, so reading past the end yields an empty cell and two
/// rows that differ only in trailing blanks compare equal.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(Vec<CellValue>);

impl Row {
    pub fn new(cells: Vec<CellValue>) -> Self {
        let mut row = Row(cells);
        row.trim();
        row
    }

    pub fn cells(&self) -> &[CellValue] {
        &self.0
    }

    pub fn get(&self, col: usize) -> &CellValue {
        self.0.get(col).unwrap_or(&EMPTY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn set(&mut self, col: usize, value: CellValue) {
        if col >= self.0.len() {
            if value.is_empty() {
                return;
            }
            self.0.resize(col + 1, CellValue::Empty);
        }
        self.0[col] = value;
        self.trim();
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [CellValue] {
        &mut self.0
    }

    fn trim(&mut self) {
        while self.0.last().map(CellValue::is_empty).unwrap_or(false) {
            self.0.pop();
        }
    }
}

impl From<Vec<CellValue>> for Row {
    fn from(cells: Vec<CellValue>) -> Self {
        Row::new(cells)
    }
}

impl FromIterator<CellValue> for Row {
    fn from_iter<I: IntoIterator<Item = CellValue>>(iter: I) -> Self {
        Row::new(iter.into_iter().collect())
    }
}
