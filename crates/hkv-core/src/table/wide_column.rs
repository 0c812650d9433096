//! The wide-column table capability.

use crate::model::{
    Append, Delete, Get, Increment, Put, ResultScanner, RowAction, RowResult, Scan,
};
use crate::Result;
use async_trait::async_trait;

/// Static description of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub families: Vec<Vec<u8>>,
}

/// Row-oriented, multi-version table operations.
///
/// Every operation addresses exactly one column family. Puts may be buffered
/// client-side; everything else is sent immediately.
#[async_trait]
pub trait WideColumnTable: Send + Sync {
    /// Logical table name.
    fn table_name(&self) -> &str;

    /// Whether the row has any cell matching the get.
    async fn exists(&self, get: &Get) -> Result<bool>;

    async fn get(&self, get: &Get) -> Result<RowResult>;

    /// Gets executed one after another; the first failure aborts the rest.
    async fn get_many(&self, gets: &[Get]) -> Result<Vec<RowResult>>;

    async fn scan(&self, scan: &Scan) -> Result<ResultScanner>;

    /// Scan every row of one family.
    async fn scan_family(&self, family: &[u8]) -> Result<ResultScanner>;

    /// Scan one column over every row.
    async fn scan_column(&self, family: &[u8], qualifier: &[u8]) -> Result<ResultScanner>;

    /// Buffer a put; flushed according to the write buffer policy.
    async fn put(&self, put: Put) -> Result<()>;

    async fn put_all(&self, puts: Vec<Put>) -> Result<()>;

    async fn delete(&self, delete: &Delete) -> Result<()>;

    async fn delete_many(&self, deletes: &[Delete]) -> Result<()>;

    /// Apply `put` only if the column holds `value` (or is absent when `None`).
    async fn check_and_put(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Option<&[u8]>,
        put: &Put,
    ) -> Result<bool>;

    /// Apply `delete` only if the column holds `value` (or is absent when `None`).
    async fn check_and_delete(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Option<&[u8]>,
        delete: &Delete,
    ) -> Result<bool>;

    /// Append to column values atomically; returns the new cells.
    async fn append(&self, append: &Append) -> Result<RowResult>;

    /// Increment counters atomically; returns the new cells.
    async fn increment(&self, increment: &Increment) -> Result<RowResult>;

    /// Increment one counter and return its new value.
    async fn increment_column_value(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        amount: i64,
    ) -> Result<i64>;

    /// Same as [`increment_column_value`](Self::increment_column_value); the WAL flag is ignored.
    async fn increment_column_value_with_wal(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        amount: i64,
        write_to_wal: bool,
    ) -> Result<i64>;

    /// Send every buffered put.
    async fn flush_commits(&self) -> Result<()>;

    async fn is_auto_flush(&self) -> bool;

    /// Equivalent to `set_auto_flush_with_clear(auto_flush, auto_flush)`.
    async fn set_auto_flush(&self, auto_flush: bool);

    async fn set_auto_flush_with_clear(&self, auto_flush: bool, clear_buffer_on_fail: bool);

    async fn write_buffer_size(&self) -> u64;

    /// Change the flush threshold, flushing if the buffer already exceeds it.
    async fn set_write_buffer_size(&self, size: u64) -> Result<()>;

    fn operation_timeout_ms(&self) -> u64;

    fn set_operation_timeout(&self, timeout_ms: u64);

    /// Refresh routing for the family's target, and its test-load target if asked.
    async fn refresh_table_entry(&self, family: &str, has_test_load: bool) -> Result<()>;

    /// Release the private execution pool. Buffered puts are not flushed.
    async fn close(&self) -> Result<()>;

    fn table_descriptor(&self) -> Result<TableDescriptor>;

    async fn get_row_or_before(&self, row: &[u8], family: &[u8]) -> Result<RowResult>;

    async fn batch(&self, actions: &[RowAction]) -> Result<Vec<RowResult>>;

    async fn mutate_row(&self, row: &[u8], actions: &[RowAction]) -> Result<()>;

    async fn lock_row(&self, row: &[u8]) -> Result<u64>;

    async fn unlock_row(&self, lock_id: u64) -> Result<()>;

    async fn coprocessor_exec(
        &self,
        service: &str,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<Vec<Vec<u8>>>;
}
