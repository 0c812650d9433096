//! Remote table: the [`WideColumnTable`] implementation over a [`TableRpc`].
//!
//! Each logical table maps to one physical target per family. Reads go
//! through the bounded executor; mutations are sent inline. Puts land in the
//! write buffer and are flushed as one batch per family.

use super::assembler;
use super::conditional::{check_passed, CheckAndMutate};
use super::executor::{BoundedExecutor, CallScope, ExecutorConfig, ServerCall};
use super::query_builder::{build_filter, point_query, scan_query};
use super::translator::{
    batch_request, build_batch, build_increment_batch, check_batch_results,
    check_family_violation, family_name, query_and_mutate_request, query_request, single_family,
    TargetNaming,
};
use super::wide_column::{TableDescriptor, WideColumnTable};
use crate::buffer::{FlushDecision, WriteBuffer, WriteBufferSettings};
use crate::config::{Config, TableConfig};
use crate::model::{
    Append, Cell, Delete, Get, Increment, Mutation, Put, ResultScanner, RowAction, RowResult, Scan,
};
use crate::rpc::types::{BatchOperation, QueryAndMutateResult, QueryResult, RpcRequest, TableQuery};
use crate::rpc::{ClientRegistry, TableRpc};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

const NOT_SUPPORTED: &str = "not supported yet.";

fn not_supported() -> Error {
    Error::Unsupported(NOT_SUPPORTED.into())
}

/// Assembles a query response addressed to one family.
type Assemble<T> = fn(&[u8], &QueryResult) -> Result<T>;

/// A logical wide-column table backed by a remote table service.
pub struct RemoteTable {
    naming: TargetNaming,
    client: Arc<dyn TableRpc>,
    executor: BoundedExecutor,
    buffer: Mutex<WriteBuffer>,
}

impl RemoteTable {
    /// Open a table with a client shared through the registry.
    pub fn open(table_name: &str, config: &Config, registry: &ClientRegistry) -> Result<Self> {
        config.validate()?;
        let client = registry.get_or_create(&config.remote)?;
        Self::build(table_name, client, config.table.clone(), None)
    }

    /// Open a table over an existing client.
    pub fn with_client(
        table_name: &str,
        client: Arc<dyn TableRpc>,
        config: TableConfig,
    ) -> Result<Self> {
        Self::build(table_name, client, config, None)
    }

    /// Open a table whose pooled reads run on a caller-supplied runtime.
    ///
    /// [`close`](WideColumnTable::close) leaves that runtime running.
    pub fn with_client_and_pool(
        table_name: &str,
        client: Arc<dyn TableRpc>,
        pool: Handle,
        config: TableConfig,
    ) -> Result<Self> {
        Self::build(table_name, client, config, Some(pool))
    }

    fn build(
        table_name: &str,
        client: Arc<dyn TableRpc>,
        config: TableConfig,
        pool: Option<Handle>,
    ) -> Result<Self> {
        if table_name.trim().is_empty() {
            return Err(Error::IllegalArgument("table name is blank.".into()));
        }
        config.validate()?;

        let executor_config = ExecutorConfig::from(&config);
        let executor = match pool {
            Some(handle) => BoundedExecutor::with_handle(table_name, executor_config, handle),
            None => BoundedExecutor::new(table_name, executor_config),
        };

        info!(
            table = %table_name,
            operation_timeout_ms = config.operation_timeout_ms,
            in_pool = executor.execute_in_pool(),
            auto_flush = config.auto_flush,
            write_buffer_size = config.write_buffer_size,
            test_load = config.test_load_enable,
            "Opened table"
        );

        Ok(Self {
            naming: TargetNaming::new(table_name, &config),
            client,
            executor,
            buffer: Mutex::new(WriteBuffer::new(WriteBufferSettings::from(&config))),
        })
    }

    /// Number of buffered puts awaiting a flush.
    pub async fn buffered_puts(&self) -> usize {
        self.buffer.lock().await.len()
    }

    /// Summed size estimate of the buffered puts.
    pub async fn buffer_occupancy(&self) -> u64 {
        self.buffer.lock().await.occupancy()
    }

    /// Send one query through the executor and assemble the response.
    async fn query<T>(
        &self,
        scope: CallScope,
        family: &[u8],
        query: TableQuery,
        assemble: Assemble<T>,
    ) -> Result<T>
    where
        T: Send + 'static,
    {
        let request = query_request(&self.naming.target(family), query);
        let client = self.client.clone();
        let family = family.to_vec();
        let call = ServerCall::new(scope, async move {
            let result = assembler::expect_query(client.execute(request).await?)?;
            assemble(&family, &result)
        });
        self.executor.execute(call).await
    }

    /// Send one batch to a target and check every entry's result.
    async fn send_batch(&self, scope: CallScope, target: String, batch: BatchOperation) -> Result<()> {
        let request = batch_request(&target, batch);
        let client = self.client.clone();
        let call = ServerCall::new(scope, async move {
            let results = assembler::expect_batch(client.execute(request).await?)?;
            check_batch_results(&target, &results)
        });
        self.executor.execute_direct(call).await
    }

    async fn query_and_mutate(
        &self,
        scope: CallScope,
        request: RpcRequest,
    ) -> Result<QueryAndMutateResult> {
        let client = self.client.clone();
        let call = ServerCall::new(scope, async move {
            assembler::expect_query_and_mutate(client.execute(request).await?)
        });
        self.executor.execute_direct(call).await
    }

    /// Flush every buffered put while holding the buffer lock.
    async fn flush_locked(&self, buffer: &mut WriteBuffer, decision: FlushDecision) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        debug!(
            table = %self.table_name(),
            reason = decision.reason(),
            puts = buffer.len(),
            occupancy = buffer.occupancy(),
            "Flushing write buffer"
        );

        let mut flush = buffer.begin_flush();
        let mut first_error = None;

        for group in flush.take_groups() {
            let target = self.naming.target(&group.family);
            let scope = CallScope::new(
                self.table_name(),
                first_row(&group.cells),
                last_row(&group.cells),
            );
            match self
                .send_batch(scope, target, build_batch(&group.cells, false))
                .await
            {
                Ok(()) => flush.mark_written(&group),
                Err(err) => {
                    log_failure(self.table_name(), &group.family, "flush", &err);
                    first_error.get_or_insert(err);
                }
            }
        }

        flush.finish();
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn check_and_mutate(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Option<&[u8]>,
        mutation: &dyn Mutation,
    ) -> Result<bool> {
        let request = CheckAndMutate {
            row,
            family,
            qualifier,
            value,
            mutation,
        }
        .build(&self.naming)?;

        let result = self
            .query_and_mutate(CallScope::row(self.table_name(), row), request)
            .await
            .inspect_err(|err| log_failure(self.table_name(), family, "check_and_mutate", err))?;
        Ok(check_passed(&result))
    }

    /// Atomic query-and-mutate over one row, returning the written cells.
    async fn mutate_returning(
        &self,
        operation: &'static str,
        row: &[u8],
        family: &[u8],
        query: TableQuery,
        mutations: BatchOperation,
    ) -> Result<RowResult> {
        let request = query_and_mutate_request(&self.naming.target(family), query, mutations);
        self.query_and_mutate(CallScope::row(self.table_name(), row), request)
            .await
            .and_then(|result| assembler::affected_result(family, &result))
            .inspect_err(|err| log_failure(self.table_name(), family, operation, err))
    }
}

fn first_family<V>(families: &BTreeMap<Vec<u8>, V>) -> Result<(&[u8], &V)> {
    check_family_violation(families.keys())?;
    families
        .iter()
        .next()
        .map(|(family, value)| (family.as_slice(), value))
        .ok_or_else(|| Error::Unsupported("family is empty.".into()))
}

fn first_row(cells: &[Cell]) -> &[u8] {
    cells.first().map(|c| c.row.as_slice()).unwrap_or_default()
}

fn last_row(cells: &[Cell]) -> &[u8] {
    cells.last().map(|c| c.row.as_slice()).unwrap_or_default()
}

fn log_failure(table: &str, family: &[u8], operation: &str, err: &Error) {
    match err {
        Error::Remote(remote) => error!(
            table = %table,
            family = %family_name(family),
            operation,
            errno = remote.errno,
            error_codes = ?remote.error_codes,
            "Remote operation failed"
        ),
        _ => error!(
            table = %table,
            family = %family_name(family),
            operation,
            error = %err,
            "Remote operation failed"
        ),
    }
}

#[async_trait]
impl WideColumnTable for RemoteTable {
    fn table_name(&self) -> &str {
        self.naming.table_name()
    }

    async fn exists(&self, get: &Get) -> Result<bool> {
        Ok(!self.get(get).await?.is_empty())
    }

    async fn get(&self, get: &Get) -> Result<RowResult> {
        let (family, qualifiers) = first_family(get.families())?;
        let filter = build_filter(
            get.filter(),
            get.time_range(),
            get.max_versions(),
            qualifiers.iter().map(Option::as_deref),
        );
        let query = point_query(get.row(), filter)?;

        self.query(
            CallScope::row(self.table_name(), get.row()),
            family,
            query,
            assembler::row_result,
        )
        .await
        .inspect_err(|err| log_failure(self.table_name(), family, "get", err))
    }

    async fn get_many(&self, gets: &[Get]) -> Result<Vec<RowResult>> {
        let mut results = Vec::with_capacity(gets.len());
        for get in gets {
            results.push(self.get(get).await?);
        }
        Ok(results)
    }

    async fn scan(&self, scan: &Scan) -> Result<ResultScanner> {
        if scan.is_reversed() {
            return Err(Error::Unsupported("reverse scan is not supported yet.".into()));
        }
        let (family, qualifiers) = first_family(scan.families())?;
        let filter = build_filter(
            scan.filter(),
            scan.time_range(),
            scan.max_versions(),
            qualifiers.iter().map(Option::as_deref),
        );

        self.query(
            CallScope::new(self.table_name(), scan.start_row(), scan.stop_row()),
            family,
            scan_query(scan, filter),
            assembler::scanner,
        )
        .await
        .inspect_err(|err| log_failure(self.table_name(), family, "scan", err))
    }

    async fn scan_family(&self, family: &[u8]) -> Result<ResultScanner> {
        self.scan(&Scan::new().add_family(family)).await
    }

    async fn scan_column(&self, family: &[u8], qualifier: &[u8]) -> Result<ResultScanner> {
        self.scan(&Scan::new().add_column(family, qualifier)).await
    }

    async fn put(&self, put: Put) -> Result<()> {
        self.put_all(vec![put]).await
    }

    async fn put_all(&self, puts: Vec<Put>) -> Result<()> {
        let mut buffer = self.buffer.lock().await;

        for (index, put) in puts.into_iter().enumerate() {
            buffer.append(put)?;
            let decision = buffer.check_periodic(index + 1);
            if decision.requires_flush() {
                self.flush_locked(&mut buffer, decision).await?;
            }
        }

        let decision = buffer.check_final();
        if decision.requires_flush() {
            self.flush_locked(&mut buffer, decision).await?;
        }
        Ok(())
    }

    async fn delete(&self, delete: &Delete) -> Result<()> {
        if delete.row().is_empty() {
            return Err(Error::IllegalArgument("row is empty".into()));
        }
        if delete.is_empty() {
            return Err(Error::IllegalArgument("No columns to delete".into()));
        }
        let (family, cells) = single_family(delete)?;

        self.send_batch(
            CallScope::row(self.table_name(), delete.row()),
            self.naming.target(family),
            build_batch(cells, false),
        )
        .await
        .inspect_err(|err| log_failure(self.table_name(), family, "delete", err))
    }

    async fn delete_many(&self, deletes: &[Delete]) -> Result<()> {
        for delete in deletes {
            self.delete(delete).await?;
        }
        Ok(())
    }

    async fn check_and_put(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Option<&[u8]>,
        put: &Put,
    ) -> Result<bool> {
        self.check_and_mutate(row, family, qualifier, value, put).await
    }

    async fn check_and_delete(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Option<&[u8]>,
        delete: &Delete,
    ) -> Result<bool> {
        self.check_and_mutate(row, family, qualifier, value, delete)
            .await
    }

    async fn append(&self, append: &Append) -> Result<RowResult> {
        let (family, cells) = single_family(append)?;
        if append.is_empty() {
            return Err(Error::IllegalArgument("append is empty.".into()));
        }

        let filter = build_filter(
            None,
            None,
            1,
            cells.iter().map(|cell| Some(cell.qualifier.as_slice())),
        );
        let query = point_query(append.row(), filter)?;
        self.mutate_returning("append", append.row(), family, query, build_batch(cells, true))
            .await
    }

    async fn increment(&self, increment: &Increment) -> Result<RowResult> {
        let (family, columns) = first_family(increment.families())?;
        if increment.is_empty() {
            return Err(Error::IllegalArgument("increment is empty.".into()));
        }

        let filter = build_filter(
            None,
            increment.time_range(),
            1,
            columns.keys().map(|qualifier| Some(qualifier.as_slice())),
        );
        let query = point_query(increment.row(), filter)?;
        let mutations = build_increment_batch(increment.row(), columns);
        self.mutate_returning("increment", increment.row(), family, query, mutations)
            .await
    }

    async fn increment_column_value(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        amount: i64,
    ) -> Result<i64> {
        check_family_violation([family])?;

        let filter = build_filter(None, None, 1, [Some(qualifier)]);
        let query = point_query(row, filter)?;
        let columns = BTreeMap::from([(qualifier.to_vec(), amount)]);
        let mutations = build_increment_batch(row, &columns);

        let result = self
            .mutate_returning("increment", row, family, query, mutations)
            .await?;
        let [cell] = result.cells() else {
            return Err(Error::IllegalArgument(format!(
                "the increment result size illegal {}",
                result.len()
            )));
        };
        let bytes: [u8; 8] = cell.value.as_slice().try_into().map_err(|_| {
            Error::IllegalArgument(format!(
                "increment result is {} bytes, expected 8",
                cell.value.len()
            ))
        })?;
        Ok(i64::from_be_bytes(bytes))
    }

    async fn increment_column_value_with_wal(
        &self,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        amount: i64,
        _write_to_wal: bool,
    ) -> Result<i64> {
        self.increment_column_value(row, family, qualifier, amount)
            .await
    }

    async fn flush_commits(&self) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        self.flush_locked(&mut buffer, FlushDecision::AutoFlush).await
    }

    async fn is_auto_flush(&self) -> bool {
        self.buffer.lock().await.is_auto_flush()
    }

    async fn set_auto_flush(&self, auto_flush: bool) {
        self.set_auto_flush_with_clear(auto_flush, auto_flush).await;
    }

    async fn set_auto_flush_with_clear(&self, auto_flush: bool, clear_buffer_on_fail: bool) {
        let mut buffer = self.buffer.lock().await;
        buffer.set_auto_flush(auto_flush, clear_buffer_on_fail);
        debug!(
            table = %self.table_name(),
            auto_flush,
            clear_buffer_on_fail = buffer.clear_on_fail(),
            "Auto-flush updated"
        );
    }

    async fn write_buffer_size(&self) -> u64 {
        self.buffer.lock().await.write_buffer_size()
    }

    async fn set_write_buffer_size(&self, size: u64) -> Result<()> {
        let mut buffer = self.buffer.lock().await;
        let decision = buffer.set_write_buffer_size(size);
        if decision.requires_flush() {
            self.flush_locked(&mut buffer, decision).await?;
        }
        Ok(())
    }

    fn operation_timeout_ms(&self) -> u64 {
        self.executor.operation_timeout_ms()
    }

    fn set_operation_timeout(&self, timeout_ms: u64) {
        self.executor.set_operation_timeout(timeout_ms);
    }

    async fn refresh_table_entry(&self, family: &str, has_test_load: bool) -> Result<()> {
        let family = family.as_bytes();
        self.client
            .refresh_table_entry(&self.naming.normal_target(family))
            .await?;
        if has_test_load {
            self.client
                .refresh_table_entry(&self.naming.test_load_target(family))
                .await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.executor.close();
        Ok(())
    }

    fn table_descriptor(&self) -> Result<TableDescriptor> {
        Err(not_supported())
    }

    async fn get_row_or_before(&self, _row: &[u8], _family: &[u8]) -> Result<RowResult> {
        Err(not_supported())
    }

    async fn batch(&self, _actions: &[RowAction]) -> Result<Vec<RowResult>> {
        Err(not_supported())
    }

    async fn mutate_row(&self, _row: &[u8], _actions: &[RowAction]) -> Result<()> {
        Err(not_supported())
    }

    async fn lock_row(&self, _row: &[u8]) -> Result<u64> {
        Err(not_supported())
    }

    async fn unlock_row(&self, _lock_id: u64) -> Result<()> {
        Err(not_supported())
    }

    async fn coprocessor_exec(
        &self,
        _service: &str,
        _start_key: &[u8],
        _end_key: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        Err(not_supported())
    }
}
