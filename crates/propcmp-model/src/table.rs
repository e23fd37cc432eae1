//! Raw tabular input, before column resolution.

use crate::columns::ColumnDef;

/// A header-plus-rows table as read from one export file.
///
/// All cells are kept as text; parsing happens during normalization. Rows
/// shorter than the header read as empty cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Where the table came from (file path or a label).
    pub source: String,
    /// File name without extension, used as the scenario fallback.
    pub stem: String,
    /// Header names, as written.
    pub headers: Vec<String>,
    /// Data rows.
    pub rows: Vec<Vec<String>>,
}

/// A column of a [`RawTable`] resolved for a [`ColumnDef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumn<'t> {
    /// Index into the row vectors.
    pub index: usize,
    /// Header text as written in the file.
    pub header: &'t str,
}

impl RawTable {
    /// Create a table.
    pub fn new(
        source: impl Into<String>,
        stem: impl Into<String>,
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Self {
        Self {
            source: source.into(),
            stem: stem.into(),
            headers,
            rows,
        }
    }

    /// Build a table from string slices. Convenient for tests and fixtures.
    pub fn from_strs(stem: &str, headers: &[&str], rows: &[&[&str]]) -> Self {
        Self::new(
            format!("{}.csv", stem),
            stem,
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve a column: the first candidate name (canonical first) present in the header.
    pub fn find_column(&self, column: &ColumnDef) -> Option<ResolvedColumn<'_>> {
        column.candidates().find_map(|candidate| {
            self.headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(candidate))
                .map(|index| ResolvedColumn {
                    index,
                    header: self.headers[index].as_str(),
                })
        })
    }

    /// Trimmed cell text, empty when the row is short.
    pub fn cell(&self, row: usize, index: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(index))
            .map(|c| c.trim())
            .unwrap_or("")
    }
}
