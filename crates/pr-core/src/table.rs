//! Generic row tables produced by the parser

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A parsed table from a single upload
///
/// Cells stay as trimmed strings; no numeric coercion happens here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions, after header normalization
    pub columns: Vec<Column>,
    /// Row data, each padded or truncated to `columns.len()`
    pub rows: Vec<Row>,
    /// Name of the upload this table came from
    pub source_name: String,
}

impl Table {
    /// Create a new empty table
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            source_name: source_name.into(),
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Find a column by its (normalized) name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a cell by row index and column name
    ///
    /// Returns `None` when either the row or the column is absent.
    pub fn value(&self, row_idx: usize, column: &str) -> Option<&str> {
        let col = self.find_column(column)?;
        self.rows.get(row_idx)?.get(col.index)
    }

    /// View a row as a column name -> cell mapping
    pub fn row_map(&self, row_idx: usize) -> Option<BTreeMap<&str, &str>> {
        let row = self.rows.get(row_idx)?;
        Some(
            self.columns
                .iter()
                .map(|c| (c.name.as_str(), row.get(c.index).unwrap_or_default()))
                .collect(),
        )
    }
}

/// A column definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name (canonical if the shape recognised it, else trimmed header text)
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of trimmed cell text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    /// 1-based line number of the record in the original payload
    pub line: u64,
    /// Cell values for each column
    pub cells: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(line: u64, cells: Vec<String>) -> Self {
        Self { line, cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// True when every cell is empty after trimming
    pub fn is_blank(&self) -> bool {
        is_blank(&self.cells)
    }
}

/// True when a raw row has no cells or only whitespace cells
pub fn is_blank<S: AsRef<str>>(cells: &[S]) -> bool {
    cells.iter().all(|c| c.as_ref().trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table {
            columns: vec![
                Column::new("PolicyId".to_string(), 0),
                Column::new("Status".to_string(), 1),
            ],
            rows: vec![Row::new(2, vec!["P1".to_string(), "Approved".to_string()])],
            source_name: "incoming.csv".to_string(),
        }
    }

    #[test]
    fn test_value_lookup() {
        let table = sample();
        assert_eq!(table.value(0, "Status"), Some("Approved"));
        assert_eq!(table.value(0, "Missing"), None);
        assert_eq!(table.value(5, "Status"), None);
    }

    #[test]
    fn test_row_map() {
        let table = sample();
        let map = table.row_map(0).unwrap();
        assert_eq!(map.get("PolicyId"), Some(&"P1"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank::<&str>(&[]));
        assert!(is_blank(&["", "  ", "\t"]));
        assert!(!is_blank(&["", "x"]));
        assert!(!Row::new(1, vec!["a".to_string()]).is_blank());
    }
}
