//! Row-oriented request types: Get, Scan, Put, Delete, Append, Increment.
//!
//! All builders consume and return `self`. Family maps are ordered so request
//! translation is deterministic.

use super::cell::{Cell, CellType, LATEST_TIMESTAMP};
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Fixed per-put cost used by heap size estimates.
const PUT_OVERHEAD: u64 = 64;

/// Qualifier selection per family; an empty list selects every qualifier and a
/// `None` entry selects the bare column with no qualifier.
pub type FamilyQualifiers = BTreeMap<Vec<u8>, Vec<Option<Vec<u8>>>>;

/// Timestamp window `[min, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    min: i64,
    max: i64,
}

impl TimeRange {
    /// Create a window; `min` must not exceed `max`.
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min < 0 || max < min {
            return Err(Error::IllegalArgument(format!(
                "invalid time range [{min}, {max})"
            )));
        }
        Ok(Self { min, max })
    }

    /// Window matching exactly one timestamp.
    pub fn at(timestamp: i64) -> Result<Self> {
        Self::new(timestamp, timestamp.saturating_add(1))
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.min && timestamp < self.max
    }
}

/// Common view over write requests carrying cells.
pub trait Mutation: Send + Sync {
    /// Row the mutation applies to.
    fn row(&self) -> &[u8];

    /// Cells grouped by family.
    fn family_cells(&self) -> &BTreeMap<Vec<u8>, Vec<Cell>>;

    fn is_empty(&self) -> bool {
        self.family_cells().values().all(|cells| cells.is_empty())
    }
}

/// Point read of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Get {
    row: Vec<u8>,
    families: FamilyQualifiers,
    max_versions: i32,
    time_range: Option<TimeRange>,
    filter: Option<String>,
}

impl Get {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            families: BTreeMap::new(),
            max_versions: 1,
            time_range: None,
            filter: None,
        }
    }

    /// Select every column of a family.
    pub fn add_family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.insert(family.into(), Vec::new());
        self
    }

    /// Select one column.
    pub fn add_column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        self.families
            .entry(family.into())
            .or_default()
            .push(Some(qualifier.into()));
        self
    }

    /// Select the column that has no qualifier.
    pub fn add_bare_column(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.entry(family.into()).or_default().push(None);
        self
    }

    pub fn with_max_versions(mut self, max_versions: i32) -> Self {
        self.max_versions = max_versions;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    /// Attach a filter already rendered in the remote filter language.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn families(&self) -> &FamilyQualifiers {
        &self.families
    }

    pub fn max_versions(&self) -> i32 {
        self.max_versions
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

/// Range read over `[start_row, stop_row)` by default.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    start_row: Vec<u8>,
    stop_row: Vec<u8>,
    include_start_row: bool,
    include_stop_row: bool,
    families: FamilyQualifiers,
    max_versions: i32,
    time_range: Option<TimeRange>,
    filter: Option<String>,
    batch: Option<u32>,
    reversed: bool,
}

impl Default for Scan {
    fn default() -> Self {
        Self::new()
    }
}

impl Scan {
    /// Scan over every row.
    pub fn new() -> Self {
        Self {
            start_row: Vec::new(),
            stop_row: Vec::new(),
            include_start_row: true,
            include_stop_row: false,
            families: BTreeMap::new(),
            max_versions: 1,
            time_range: None,
            filter: None,
            batch: None,
            reversed: false,
        }
    }

    pub fn with_start_row(mut self, row: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        self.start_row = row.into();
        self.include_start_row = inclusive;
        self
    }

    pub fn with_stop_row(mut self, row: impl Into<Vec<u8>>, inclusive: bool) -> Self {
        self.stop_row = row.into();
        self.include_stop_row = inclusive;
        self
    }

    pub fn add_family(mut self, family: impl Into<Vec<u8>>) -> Self {
        self.families.insert(family.into(), Vec::new());
        self
    }

    pub fn add_column(mut self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        self.families
            .entry(family.into())
            .or_default()
            .push(Some(qualifier.into()));
        self
    }

    pub fn with_max_versions(mut self, max_versions: i32) -> Self {
        self.max_versions = max_versions;
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Ask the server for at most `batch` rows per round trip.
    pub fn with_batch(mut self, batch: u32) -> Self {
        self.batch = Some(batch);
        self
    }

    /// Reverse scans are rejected at execution time.
    pub fn with_reversed(mut self, reversed: bool) -> Self {
        self.reversed = reversed;
        self
    }

    pub fn start_row(&self) -> &[u8] {
        &self.start_row
    }

    pub fn stop_row(&self) -> &[u8] {
        &self.stop_row
    }

    pub fn include_start_row(&self) -> bool {
        self.include_start_row
    }

    pub fn include_stop_row(&self) -> bool {
        self.include_stop_row
    }

    pub fn families(&self) -> &FamilyQualifiers {
        &self.families
    }

    pub fn max_versions(&self) -> i32 {
        self.max_versions
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn batch(&self) -> Option<u32> {
        self.batch
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }
}

/// Write of one or more cells to a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Put {
    row: Vec<u8>,
    timestamp: i64,
    families: BTreeMap<Vec<u8>, Vec<Cell>>,
}

impl Put {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(row, LATEST_TIMESTAMP)
    }

    /// Put whose cells default to `timestamp`.
    pub fn with_timestamp(row: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            row: row.into(),
            timestamp,
            families: BTreeMap::new(),
        }
    }

    pub fn add_column(
        self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        let timestamp = self.timestamp;
        self.add_column_at(family, qualifier, timestamp, value)
    }

    pub fn add_column_at(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        let family = family.into();
        let cell = Cell::put(self.row.clone(), family.clone(), qualifier, timestamp, value);
        self.families.entry(family).or_default().push(cell);
        self
    }

    /// Approximate in-memory footprint, used for write buffer accounting.
    pub fn heap_size(&self) -> u64 {
        PUT_OVERHEAD
            + self.row.len() as u64
            + self
                .families
                .iter()
                .map(|(family, cells)| {
                    family.len() as u64 + cells.iter().map(Cell::heap_size).sum::<u64>()
                })
                .sum::<u64>()
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Mutation for Put {
    fn row(&self) -> &[u8] {
        &self.row
    }

    fn family_cells(&self) -> &BTreeMap<Vec<u8>, Vec<Cell>> {
        &self.families
    }
}

/// Deletion of cells, columns or whole families of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    row: Vec<u8>,
    timestamp: i64,
    families: BTreeMap<Vec<u8>, Vec<Cell>>,
}

impl Delete {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self::with_timestamp(row, LATEST_TIMESTAMP)
    }

    /// Delete whose markers default to `timestamp`.
    pub fn with_timestamp(row: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        Self {
            row: row.into(),
            timestamp,
            families: BTreeMap::new(),
        }
    }

    /// Delete every version of every column in the family.
    pub fn delete_family(self, family: impl Into<Vec<u8>>) -> Self {
        let timestamp = self.timestamp;
        self.delete_family_at(family, timestamp)
    }

    /// Delete every column in the family with a timestamp up to `timestamp`.
    pub fn delete_family_at(self, family: impl Into<Vec<u8>>, timestamp: i64) -> Self {
        self.push(family, Vec::new(), timestamp, CellType::DeleteFamily)
    }

    /// Delete every version of a column.
    pub fn delete_columns(self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        let timestamp = self.timestamp;
        self.delete_columns_at(family, qualifier, timestamp)
    }

    /// Delete the versions of a column with a timestamp up to `timestamp`.
    pub fn delete_columns_at(
        self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        self.push(family, qualifier, timestamp, CellType::DeleteColumn)
    }

    /// Delete the latest version of a column.
    pub fn delete_column(self, family: impl Into<Vec<u8>>, qualifier: impl Into<Vec<u8>>) -> Self {
        let timestamp = self.timestamp;
        self.delete_column_at(family, qualifier, timestamp)
    }

    /// Delete exactly the version written at `timestamp`.
    pub fn delete_column_at(
        self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
    ) -> Self {
        self.push(family, qualifier, timestamp, CellType::Delete)
    }

    fn push(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        timestamp: i64,
        cell_type: CellType,
    ) -> Self {
        let family = family.into();
        let cell = Cell::delete(self.row.clone(), family.clone(), qualifier, timestamp, cell_type);
        self.families.entry(family).or_default().push(cell);
        self
    }
}

impl Mutation for Delete {
    fn row(&self) -> &[u8] {
        &self.row
    }

    fn family_cells(&self) -> &BTreeMap<Vec<u8>, Vec<Cell>> {
        &self.families
    }
}

/// Server-side append to existing column values.
#[derive(Debug, Clone, PartialEq)]
pub struct Append {
    row: Vec<u8>,
    families: BTreeMap<Vec<u8>, Vec<Cell>>,
}

impl Append {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            families: BTreeMap::new(),
        }
    }

    pub fn add(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        let family = family.into();
        let cell = Cell::put(
            self.row.clone(),
            family.clone(),
            qualifier,
            LATEST_TIMESTAMP,
            value,
        );
        self.families.entry(family).or_default().push(cell);
        self
    }
}

impl Mutation for Append {
    fn row(&self) -> &[u8] {
        &self.row
    }

    fn family_cells(&self) -> &BTreeMap<Vec<u8>, Vec<Cell>> {
        &self.families
    }
}

/// Server-side increment of 8-byte counters.
#[derive(Debug, Clone, PartialEq)]
pub struct Increment {
    row: Vec<u8>,
    families: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, i64>>,
    time_range: Option<TimeRange>,
}

impl Increment {
    pub fn new(row: impl Into<Vec<u8>>) -> Self {
        Self {
            row: row.into(),
            families: BTreeMap::new(),
            time_range: None,
        }
    }

    /// Add `amount` to a column; a later call for the same column replaces the amount.
    pub fn add_column(
        mut self,
        family: impl Into<Vec<u8>>,
        qualifier: impl Into<Vec<u8>>,
        amount: i64,
    ) -> Self {
        self.families
            .entry(family.into())
            .or_default()
            .insert(qualifier.into(), amount);
        self
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = Some(time_range);
        self
    }

    pub fn row(&self) -> &[u8] {
        &self.row
    }

    pub fn families(&self) -> &BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, i64>> {
        &self.families
    }

    pub fn time_range(&self) -> Option<&TimeRange> {
        self.time_range.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.families.values().all(|columns| columns.is_empty())
    }
}

/// One action of a mixed-kind batch.
#[derive(Debug, Clone, PartialEq)]
pub enum RowAction {
    Get(Get),
    Put(Put),
    Delete(Delete),
}

impl RowAction {
    pub fn row(&self) -> &[u8] {
        match self {
            RowAction::Get(get) => get.row(),
            RowAction::Put(put) => put.row(),
            RowAction::Delete(delete) => delete.row(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_cells_inherit_timestamp() {
        let put = Put::with_timestamp("r1", 42)
            .add_column("cf", "a", "1")
            .add_column_at("cf", "b", 7, "2");

        let cells = &put.family_cells()[b"cf".as_slice()];
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].timestamp, 42);
        assert_eq!(cells[1].timestamp, 7);
        assert_eq!(cells[0].row, b"r1");
        assert!(!put.is_empty());
    }

    #[test]
    fn test_put_heap_size_grows_with_cells() {
        let small = Put::new("r1").add_column("cf", "a", "1");
        let large = small.clone().add_column("cf", "b", vec![0u8; 100]);
        assert!(large.heap_size() > small.heap_size() + 100);
        assert!(Put::new("r1").is_empty());
    }

    #[test]
    fn test_delete_marker_kinds() {
        let delete = Delete::new("r1")
            .delete_column_at("cf", "a", 5)
            .delete_columns("cf", "b")
            .delete_family_at("cf", 9);

        let kinds: Vec<CellType> = delete.family_cells()[b"cf".as_slice()]
            .iter()
            .map(|c| c.cell_type)
            .collect();
        assert_eq!(
            kinds,
            vec![CellType::Delete, CellType::DeleteColumn, CellType::DeleteFamily]
        );
    }

    #[test]
    fn test_time_range_bounds() {
        let range = TimeRange::new(10, 20).unwrap();
        assert!(range.contains(10));
        assert!(!range.contains(20));
        assert!(TimeRange::new(20, 10).is_err());
        assert!(TimeRange::at(5).unwrap().contains(5));
    }

    #[test]
    fn test_get_column_selection() {
        let get = Get::new("r1")
            .add_column("cf", "a")
            .add_bare_column("cf")
            .with_max_versions(3);
        assert_eq!(
            get.families()[b"cf".as_slice()],
            vec![Some(b"a".to_vec()), None]
        );
        assert_eq!(get.max_versions(), 3);

        let get = get.add_family("cf");
        assert!(get.families()[b"cf".as_slice()].is_empty());
    }
}
