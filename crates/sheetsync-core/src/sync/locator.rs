//! Finding a record's row in the sheet by id.

use std::collections::HashMap;

use serde_json::Value;

use crate::backoff::{BackoffError, BackoffExecutor};
use crate::config::{LocateStrategy, SheetTarget};
use crate::sheets::{CellRows, SpreadsheetClient};

/// Locates rows for one sheet target during a single drain.
///
/// With [`LocateStrategy::Scan`] every lookup re-reads the id range. With
/// [`LocateStrategy::Snapshot`] the range is read on the first lookup and
/// later lookups use an id index built from it.
pub struct RowLocator<'a, S> {
    sheets: &'a S,
    executor: &'a BackoffExecutor,
    target: &'a SheetTarget,
    strategy: LocateStrategy,
    index: Option<HashMap<String, u32>>,
}

impl<'a, S: SpreadsheetClient> RowLocator<'a, S> {
    pub const fn new(
        sheets: &'a S,
        executor: &'a BackoffExecutor,
        target: &'a SheetTarget,
        strategy: LocateStrategy,
    ) -> Self {
        Self {
            sheets,
            executor,
            target,
            strategy,
            index: None,
        }
    }

    /// Absolute 1-based row holding `target_id`, or `None` if no row matches.
    pub async fn locate(&mut self, target_id: i64) -> Result<Option<u32>, BackoffError> {
        match self.strategy {
            LocateStrategy::Scan => {
                let rows = self.read_ids().await?;
                Ok(find_row(&rows, self.target.start_row, target_id))
            }
            LocateStrategy::Snapshot => {
                if self.index.is_none() {
                    let rows = self.read_ids().await?;
                    let index = index_rows(&rows, self.target.start_row);
                    tracing::debug!(rows = rows.len(), ids = index.len(), "Indexed sheet ids");
                    self.index = Some(index);
                }
                Ok(self
                    .index
                    .as_ref()
                    .and_then(|index| index.get(&target_id.to_string()).copied()))
            }
        }
    }

    async fn read_ids(&self) -> Result<CellRows, BackoffError> {
        let sheets = self.sheets;
        let spreadsheet_id = self.target.spreadsheet_id.as_str();
        let range = self.target.scan_range().to_string();
        let range = range.as_str();
        self.executor
            .execute("read_range", move || sheets.read_range(spreadsheet_id, range))
            .await
    }
}

/// Scan `rows` (read starting at `start_row`) for the first row whose first
/// cell matches `target_id`.
pub fn find_row(rows: &[Vec<Value>], start_row: u32, target_id: i64) -> Option<u32> {
    let target = target_id.to_string();
    rows.iter()
        .enumerate()
        .find(|(_, row)| row.first().and_then(cell_key).as_deref() == Some(target.as_str()))
        .and_then(|(offset, _)| absolute_row(start_row, offset))
}

/// Map each id in `rows` to its absolute row; the first occurrence wins.
pub fn index_rows(rows: &[Vec<Value>], start_row: u32) -> HashMap<String, u32> {
    let mut index = HashMap::new();
    for (offset, row) in rows.iter().enumerate() {
        let (Some(key), Some(position)) = (
            row.first().and_then(cell_key),
            absolute_row(start_row, offset),
        ) else {
            continue;
        };
        index.entry(key).or_insert(position);
    }
    index
}

fn absolute_row(start_row: u32, offset: usize) -> Option<u32> {
    start_row.checked_add(u32::try_from(offset).ok()?)
}

// Cells compare by their string form; blank cells never match.
fn cell_key(cell: &Value) -> Option<String> {
    match cell {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::sheets::InMemorySpreadsheet;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rows() -> CellRows {
        vec![
            vec![json!("4"), json!("Dee")],
            vec![],
            vec![json!(""), json!("no id")],
            vec![json!("7"), json!("Ann")],
            vec![json!(8)],
            vec![json!("7"), json!("duplicate")],
        ]
    }

    #[test]
    fn find_row_returns_absolute_position() {
        assert_eq!(find_row(&rows(), 2, 4), Some(2));
        assert_eq!(find_row(&rows(), 2, 7), Some(5));
        assert_eq!(find_row(&rows(), 2, 8), Some(6));
        assert_eq!(find_row(&rows(), 2, 99), None);
    }

    #[test]
    fn empty_rows_never_match() {
        assert_eq!(find_row(&vec![vec![], vec![json!("")]], 2, 0), None);
        assert_eq!(find_row(&[], 2, 1), None);
    }

    #[test]
    fn index_keeps_first_occurrence() {
        let index = index_rows(&rows(), 2);
        assert_eq!(index.get("7"), Some(&5));
        assert_eq!(index.get("8"), Some(&6));
        assert_eq!(index.len(), 3);
    }

    fn sheet() -> InMemorySpreadsheet {
        let mut grid = vec![vec![json!("id"), json!("name"), json!("email")]];
        grid.extend(rows());
        InMemorySpreadsheet::with_rows("users", grid)
    }

    fn executor() -> BackoffExecutor {
        BackoffExecutor::new(RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        })
    }

    #[tokio::test]
    async fn scan_strategy_reads_per_lookup() {
        let sheets = sheet();
        let executor = executor();
        let target = SheetTarget::new("sheet-id", "users");
        let mut locator = RowLocator::new(&sheets, &executor, &target, LocateStrategy::Scan);

        assert_eq!(locator.locate(7).await.unwrap(), Some(5));
        assert_eq!(locator.locate(99).await.unwrap(), None);
        assert_eq!(sheets.read_count(), 2);
    }

    #[tokio::test]
    async fn snapshot_strategy_reads_once() {
        let sheets = sheet();
        let executor = executor();
        let target = SheetTarget::new("sheet-id", "users");
        let mut locator = RowLocator::new(&sheets, &executor, &target, LocateStrategy::Snapshot);

        assert_eq!(locator.locate(7).await.unwrap(), Some(5));
        assert_eq!(locator.locate(4).await.unwrap(), Some(2));
        assert_eq!(locator.locate(99).await.unwrap(), None);
        assert_eq!(sheets.read_count(), 1);
    }

    #[tokio::test]
    async fn read_failure_propagates() {
        let sheets = sheet();
        sheets.fail_next(crate::sheets::SheetsError::api(404, "Requested entity was not found"));
        let executor = executor();
        let target = SheetTarget::new("sheet-id", "users");
        let mut locator = RowLocator::new(&sheets, &executor, &target, LocateStrategy::Scan);

        let err = locator.locate(7).await.unwrap_err();
        assert!(matches!(err, BackoffError::Rejected(_)));
    }
}
