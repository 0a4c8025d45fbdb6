//! In-memory spreadsheet.
//!
//! Holds one grid per sheet name (the spreadsheet id is ignored) and mimics
//! the parts of the Sheets API the pipeline relies on: reads omit trailing
//! empty rows, writes grow the grid as needed. Failures can be queued to
//! exercise retry and drain-abort paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{A1Range, CellRows, SheetsError, SpreadsheetClient};

#[derive(Clone, Default)]
pub struct InMemorySpreadsheet {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    sheets: HashMap<String, CellRows>,
    failures: VecDeque<SheetsError>,
    reads: usize,
    writes: usize,
}

impl InMemorySpreadsheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a spreadsheet whose `sheet` holds `rows`, starting at row 1.
    pub fn with_rows(sheet: &str, rows: CellRows) -> Self {
        let spreadsheet = Self::new();
        spreadsheet.lock().sheets.insert(sheet.to_string(), rows);
        spreadsheet
    }

    /// Cells of a 1-based row, or `None` past the end of the sheet.
    pub fn row(&self, sheet: &str, row: u32) -> Option<Vec<Value>> {
        let index = usize::try_from(row).ok()?.checked_sub(1)?;
        self.lock().sheets.get(sheet)?.get(index).cloned()
    }

    /// All rows of a sheet, starting at row 1.
    pub fn rows(&self, sheet: &str) -> CellRows {
        self.lock().sheets.get(sheet).cloned().unwrap_or_default()
    }

    /// Fail the next remote call (read or write) with `error`.
    ///
    /// Queued failures are consumed in order, one per call.
    pub fn fail_next(&self, error: SheetsError) {
        self.lock().failures.push_back(error);
    }

    /// Number of `read_range` calls made, including failed ones.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Number of `write_range` calls made, including failed ones.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryState {
    fn read(&self, range: &A1Range) -> CellRows {
        let Some(grid) = self.sheets.get(&range.sheet) else {
            return Vec::new();
        };
        let first = (range.start_row - 1) as usize;
        let last = range
            .end_row
            .map_or(grid.len(), |end| (end as usize).min(grid.len()));
        let from_column = (range.start_column - 1) as usize;
        let to_column = from_column + range.width() as usize;

        let mut rows: CellRows = grid
            .get(first..last.max(first))
            .unwrap_or_default()
            .iter()
            .map(|row| {
                row.iter()
                    .take(to_column)
                    .skip(from_column)
                    .cloned()
                    .collect()
            })
            .collect();

        while rows.last().is_some_and(|row: &Vec<Value>| row.iter().all(is_blank)) {
            rows.pop();
        }
        rows
    }

    fn write(&mut self, range: &A1Range, values: CellRows) {
        let grid = self.sheets.entry(range.sheet.clone()).or_default();
        let from_column = (range.start_column - 1) as usize;
        for (offset, cells) in values.into_iter().enumerate() {
            let index = (range.start_row - 1) as usize + offset;
            if grid.len() <= index {
                grid.resize_with(index + 1, Vec::new);
            }
            let row = &mut grid[index];
            if row.len() < from_column + cells.len() {
                row.resize(from_column + cells.len(), Value::String(String::new()));
            }
            for (column, cell) in cells.into_iter().enumerate() {
                row[from_column + column] = cell;
            }
        }
    }
}

fn is_blank(cell: &Value) -> bool {
    match cell {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

impl SpreadsheetClient for InMemorySpreadsheet {
    async fn read_range(&self, _spreadsheet_id: &str, range: &str) -> Result<CellRows, SheetsError> {
        let range: A1Range = range.parse()?;
        let mut state = self.lock();
        state.reads += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        Ok(state.read(&range))
    }

    async fn write_range(
        &self,
        _spreadsheet_id: &str,
        range: &str,
        values: CellRows,
    ) -> Result<(), SheetsError> {
        let range: A1Range = range.parse()?;
        let mut state = self.lock();
        state.writes += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state.write(&range, values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sheet() -> InMemorySpreadsheet {
        InMemorySpreadsheet::with_rows(
            "users",
            vec![
                vec![json!("id"), json!("name"), json!("email")],
                vec![json!("1"), json!("Ann"), json!("ann@x.com")],
                vec![],
                vec![json!("3"), json!("Cy")],
                vec![json!("")],
            ],
        )
    }

    #[tokio::test]
    async fn read_skips_header_and_trailing_blank_rows() {
        let rows = sheet().read_range("ignored", "users!A2:C").await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec![json!("1"), json!("Ann"), json!("ann@x.com")],
                vec![],
                vec![json!("3"), json!("Cy")],
            ]
        );
    }

    #[tokio::test]
    async fn write_overwrites_and_extends_grid() {
        let spreadsheet = sheet();
        spreadsheet
            .write_range(
                "ignored",
                "users!A7:C7",
                vec![vec![json!(7), json!("Gus"), json!("gus@x.com")]],
            )
            .await
            .unwrap();

        assert_eq!(
            spreadsheet.row("users", 7),
            Some(vec![json!(7), json!("Gus"), json!("gus@x.com")])
        );
        assert_eq!(spreadsheet.row("users", 6), Some(vec![]));
        assert_eq!(spreadsheet.write_count(), 1);
    }

    #[tokio::test]
    async fn queued_failures_are_consumed_in_order() {
        let spreadsheet = sheet();
        spreadsheet.fail_next(SheetsError::api(503, "unavailable"));

        let err = spreadsheet
            .read_range("ignored", "users!A2:C")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(spreadsheet.read_range("ignored", "users!A2:C").await.is_ok());
        assert_eq!(spreadsheet.read_count(), 2);
    }

    #[tokio::test]
    async fn unknown_sheet_reads_empty() {
        let rows = sheet().read_range("ignored", "other!A2:C").await.unwrap();
        assert!(rows.is_empty());
    }
}
