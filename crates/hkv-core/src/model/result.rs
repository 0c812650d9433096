//! Row-oriented read results.

use super::cell::Cell;
use std::collections::VecDeque;

/// Cells of a single row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowResult {
    cells: Vec<Cell>,
}

impl RowResult {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Row key of the result, if it holds any cell.
    pub fn row(&self) -> Option<&[u8]> {
        self.cells.first().map(|c| c.row.as_slice())
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Versions of one column, newest first.
    pub fn column_cells(&self, family: &[u8], qualifier: &[u8]) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self
            .cells
            .iter()
            .filter(|c| c.matches_column(family, qualifier))
            .collect();
        cells.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        cells
    }

    /// Newest value of one column.
    pub fn value(&self, family: &[u8], qualifier: &[u8]) -> Option<&[u8]> {
        self.cells
            .iter()
            .filter(|c| c.matches_column(family, qualifier))
            .max_by_key(|c| c.timestamp)
            .map(|c| c.value.as_slice())
    }
}

/// Rows returned by a scan, in server order.
#[derive(Debug, Default)]
pub struct ResultScanner {
    rows: VecDeque<RowResult>,
    closed: bool,
}

impl ResultScanner {
    pub fn new(rows: Vec<RowResult>) -> Self {
        Self {
            rows: rows.into(),
            closed: false,
        }
    }

    /// Take up to `count` rows.
    pub fn next_batch(&mut self, count: usize) -> Vec<RowResult> {
        let mut batch = Vec::with_capacity(count.min(self.rows.len()));
        while batch.len() < count {
            match self.next() {
                Some(row) => batch.push(row),
                None => break,
            }
        }
        batch
    }

    /// Release remaining rows; later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for ResultScanner {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.rows.pop_front()
    }
}
