//! Versioned cells.

/// Timestamp sentinel meaning "latest"; the server assigns the actual time.
pub const LATEST_TIMESTAMP: i64 = i64::MAX;

/// Fixed per-cell cost used by heap size estimates.
const CELL_OVERHEAD: u64 = 56;

/// Fixed cost of the serialized key layout (lengths, timestamp, type byte).
const KEY_INFRASTRUCTURE_SIZE: usize = 4 + 4 + 2 + 1 + 8 + 1;

/// Kind of mutation a cell carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// A value write
    Put,
    /// Delete one version of a column
    Delete,
    /// Delete every version of a column up to the timestamp
    DeleteColumn,
    /// Delete every column of the family up to the timestamp
    DeleteFamily,
}

impl CellType {
    pub fn is_delete(&self) -> bool {
        !matches!(self, CellType::Put)
    }
}

/// A (row, family, qualifier, timestamp, value) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub timestamp: i64,
    pub cell_type: CellType,
    pub value: Vec<u8>,
}

impl Cell {
    /// Create a put cell.
    pub fn put(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type: CellType::Put,
            value: value.into(),
        }
    }

    /// Create a delete marker of the given kind.
    pub fn delete(
        row: impl Into<Vec<u8>>,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        cell_type: CellType,
    ) -> Self {
        Self {
            row: row.into(),
            family: family.into(),
            qualifier: qualifier.into(),
            timestamp,
            cell_type,
            value: Vec::new(),
        }
    }

    /// Serialized length of the cell in the classic key/value layout.
    pub fn encoded_len(&self) -> usize {
        KEY_INFRASTRUCTURE_SIZE
            + self.row.len()
            + self.family.len()
            + self.qualifier.len()
            + self.value.len()
    }

    /// Approximate in-memory footprint.
    pub fn heap_size(&self) -> u64 {
        CELL_OVERHEAD + self.encoded_len() as u64
    }

    /// Whether this cell belongs to the given column.
    pub fn matches_column(&self, family: &[u8], qualifier: &[u8]) -> bool {
        self.family == family && self.qualifier == qualifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_sizes() {
        let cell = Cell::put("row1", "cf", "q", 10, "value");
        assert_eq!(cell.encoded_len(), 20 + 4 + 2 + 1 + 5);
        assert_eq!(cell.heap_size(), CELL_OVERHEAD + 32);
    }

    #[test]
    fn test_delete_has_no_value() {
        let cell = Cell::delete("row1", "cf", "q", LATEST_TIMESTAMP, CellType::DeleteColumn);
        assert!(cell.value.is_empty());
        assert!(cell.cell_type.is_delete());
        assert!(!CellType::Put.is_delete());
        assert!(cell.matches_column(b"cf", b"q"));
    }
}
