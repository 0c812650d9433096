//! In-memory table service for tests and local development.
//!
//! Cells are stored per physical target under their composite `(K, Q, T)` key,
//! so range queries use the same MIN/MAX marker ordering as the remote system.

use super::client::TableRpc;
use super::types::{
    BatchRequest, KeyRange, ObjValue, OperationResult, OperationType, QueryAndMutateRequest,
    QueryAndMutateResult, QueryRequest, QueryResult, RowKey, RpcRequest, RpcResponse,
    TableOperation, ALL_COLUMNS,
};
use crate::error::RemoteError;
use crate::table::query_builder::to_bytes_binary;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// Error code for a malformed operation.
pub const ERRNO_INVALID_ARGUMENT: i32 = -4002;

/// Error code for an increment on a value that is not an 8-byte counter.
pub const ERRNO_INVALID_COUNTER: i32 = -5150;

const CHECK_FILTER_PREFIX: &str = "CheckAndMutateFilter(=, 'binary:";

type Cells = BTreeMap<RowKey, Vec<u8>>;

/// A stored cell: `(row, qualifier, timestamp, value)`.
pub type StoredCell = (Vec<u8>, Vec<u8>, i64, Vec<u8>);

/// In-memory [`TableRpc`] implementation.
///
/// Failures and latency can be injected per physical target. Every request is
/// recorded and can be inspected with [`requests`](Self::requests).
#[derive(Default)]
pub struct MemoryTableService {
    tables: RwLock<HashMap<String, Cells>>,
    table_failures: RwLock<HashMap<String, i32>>,
    row_failures: RwLock<HashMap<(String, Vec<u8>), i32>>,
    latency: RwLock<Option<Duration>>,
    requests: Mutex<Vec<RpcRequest>>,
    refreshed: Mutex<Vec<String>>,
}

impl MemoryTableService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation on `table` fail with `errno`, or clear the failure.
    pub fn set_table_failure(&self, table: &str, errno: Option<i32>) {
        let mut failures = self.table_failures.write();
        match errno {
            Some(errno) => failures.insert(table.to_string(), errno),
            None => failures.remove(table),
        };
    }

    /// Make batch entries for one row of `table` fail with `errno`, or clear the failure.
    pub fn set_row_failure(&self, table: &str, row: &[u8], errno: Option<i32>) {
        let key = (table.to_string(), row.to_vec());
        let mut failures = self.row_failures.write();
        match errno {
            Some(errno) => failures.insert(key, errno),
            None => failures.remove(&key),
        };
    }

    /// Delay every request by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    /// Targets whose routing was refreshed, oldest first.
    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().clone()
    }

    /// Every stored cell of a target in key order.
    pub fn snapshot(&self, table: &str) -> Vec<StoredCell> {
        self.tables
            .read()
            .get(table)
            .map(|cells| {
                cells
                    .iter()
                    .filter_map(|(key, value)| {
                        let (row, qualifier, timestamp) = key_parts(key)?;
                        Some((
                            row.to_vec(),
                            qualifier.unwrap_or_default().to_vec(),
                            timestamp,
                            value.clone(),
                        ))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn injected_failure(&self, table: &str) -> Result<()> {
        match self.table_failures.read().get(table) {
            Some(&errno) => Err(Error::Remote(RemoteError {
                table: table.to_string(),
                errno,
                error_codes: vec![errno],
            })),
            None => Ok(()),
        }
    }

    fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        self.injected_failure(&request.table_name)?;

        let filter = &request.query.filter;
        if let Some(filter_string) = &filter.filter_string {
            return Err(Error::Rpc(format!(
                "filter is not supported by the memory service: {filter_string}"
            )));
        }

        let mut result = QueryResult {
            property_names: ALL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };

        let tables = self.tables.read();
        let Some(cells) = tables.get(&request.table_name) else {
            return Ok(result);
        };

        let max_versions = filter.max_versions.max(1) as usize;
        let mut column: Vec<(&[u8], &[u8], i64, &Vec<u8>)> = Vec::new();

        for (key, value) in cells {
            if !in_ranges(&request.query.key_ranges, key) {
                continue;
            }
            let Some((row, qualifier, timestamp)) = key_parts(key) else {
                continue;
            };
            let qualifier = qualifier.unwrap_or_default();
            if !filter.select_column_qualifiers.is_empty()
                && !filter
                    .select_column_qualifiers
                    .iter()
                    .any(|q| q.as_slice() == qualifier)
            {
                continue;
            }
            if filter.min_stamp.is_some_and(|min| timestamp < min)
                || filter.max_stamp.is_some_and(|max| timestamp >= max)
            {
                continue;
            }

            if column
                .first()
                .is_some_and(|(r, q, _, _)| *r != row || *q != qualifier)
            {
                emit_column(&mut result.rows, &mut column, max_versions);
            }
            column.push((row, qualifier, timestamp, value));
        }
        emit_column(&mut result.rows, &mut column, max_versions);

        Ok(result)
    }

    fn batch(&self, request: &BatchRequest) -> Vec<OperationResult> {
        let table_errno = self.table_failures.read().get(&request.table_name).copied();
        let row_failures = self.row_failures.read();
        let mut tables = self.tables.write();
        let cells = tables.entry(request.table_name.clone()).or_default();

        request
            .batch
            .operations
            .iter()
            .map(|op| {
                let row = op
                    .row_key
                    .row()
                    .and_then(ObjValue::as_bytes)
                    .unwrap_or_default()
                    .to_vec();
                let injected = row_failures
                    .get(&(request.table_name.clone(), row))
                    .copied()
                    .or(table_errno);
                if let Some(errno) = injected {
                    return OperationResult::failure(errno);
                }
                match apply(cells, op) {
                    Ok(_) => OperationResult::success(1),
                    Err(errno) => OperationResult::failure(errno),
                }
            })
            .collect()
    }

    fn query_and_mutate(&self, request: &QueryAndMutateRequest) -> Result<QueryAndMutateResult> {
        self.injected_failure(&request.table_name)?;

        let remote_error = |errno: i32| {
            Error::Remote(RemoteError {
                table: request.table_name.clone(),
                errno,
                error_codes: vec![errno],
            })
        };

        let mut tables = self.tables.write();
        let cells = tables.entry(request.table_name.clone()).or_default();

        if let Some(filter_string) = &request.query.filter.filter_string {
            let check = CheckFilter::parse(filter_string).ok_or_else(|| {
                Error::Rpc(format!("unsupported filter: {filter_string}"))
            })?;
            let row = request
                .query
                .key_ranges
                .first()
                .and_then(|range| range.start.row())
                .and_then(ObjValue::as_bytes)
                .ok_or_else(|| Error::Rpc("check requires a single-row key range".into()))?
                .to_vec();

            let matched = match latest(cells, &row, &check.qualifier) {
                None => check.check_null,
                Some((_, current)) => !check.check_null && current.as_slice() == check.value,
            };
            if !matched {
                debug!(table = %request.table_name, "Check failed, mutations skipped");
                return Ok(QueryAndMutateResult::default());
            }

            for op in &request.mutations.operations {
                apply(cells, op).map_err(remote_error)?;
            }
            return Ok(QueryAndMutateResult {
                affected_rows: 1,
                affected_entity: QueryResult::default(),
            });
        }

        let mut affected_entity = QueryResult {
            property_names: ALL_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        };
        for op in &request.mutations.operations {
            if let Some(row) = apply(cells, op).map_err(remote_error)? {
                affected_entity.rows.push(row);
            }
        }

        Ok(QueryAndMutateResult {
            affected_rows: request.mutations.len() as i64,
            affected_entity,
        })
    }
}

#[async_trait]
impl TableRpc for MemoryTableService {
    async fn execute(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.requests.lock().push(request.clone());

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match &request {
            RpcRequest::Query(r) => self.query(r).map(RpcResponse::Query),
            RpcRequest::Batch(r) => Ok(RpcResponse::Batch(self.batch(r))),
            RpcRequest::QueryAndMutate(r) => {
                self.query_and_mutate(r).map(RpcResponse::QueryAndMutate)
            }
        }
    }

    async fn refresh_table_entry(&self, table_name: &str) -> Result<()> {
        self.refreshed.lock().push(table_name.to_string());
        Ok(())
    }
}

/// Parsed `CheckAndMutateFilter` predicate.
struct CheckFilter {
    value: Vec<u8>,
    qualifier: Vec<u8>,
    check_null: bool,
}

impl CheckFilter {
    /// Parse from the end so the value may contain separators.
    fn parse(filter: &str) -> Option<Self> {
        let body = filter.strip_prefix(CHECK_FILTER_PREFIX)?.strip_suffix(')')?;
        let (rest, check_null) = body.rsplit_once(", ")?;
        let (rest, qualifier) = rest.rsplit_once(", ")?;
        let (value, _family) = rest.rsplit_once(", ")?;
        Some(Self {
            value: to_bytes_binary(value.strip_suffix('\'')?),
            qualifier: to_bytes_binary(qualifier.strip_prefix('\'')?.strip_suffix('\'')?),
            check_null: check_null.parse().ok()?,
        })
    }
}

fn key_parts(key: &RowKey) -> Option<(&[u8], Option<&[u8]>, i64)> {
    let row = key.row()?.as_bytes()?;
    let qualifier = match key.qualifier()? {
        ObjValue::Null => None,
        other => Some(other.as_bytes()?),
    };
    let timestamp = key.timestamp()?.as_int()?;
    Some((row, qualifier, timestamp))
}

fn cell_key(row: &[u8], qualifier: &[u8], timestamp: i64) -> RowKey {
    RowKey::new(row.into(), qualifier.into(), timestamp.into())
}

fn in_ranges(ranges: &[KeyRange], key: &RowKey) -> bool {
    ranges.is_empty() || ranges.iter().any(|range| range.contains(key))
}

/// Push the newest `max_versions` entries of one column, newest first.
fn emit_column(
    rows: &mut Vec<Vec<ObjValue>>,
    column: &mut Vec<(&[u8], &[u8], i64, &Vec<u8>)>,
    max_versions: usize,
) {
    for (row, qualifier, timestamp, value) in column.drain(..).rev().take(max_versions) {
        rows.push(vec![
            row.into(),
            qualifier.into(),
            timestamp.into(),
            value.clone().into(),
        ]);
    }
}

fn latest<'a>(cells: &'a Cells, row: &[u8], qualifier: &[u8]) -> Option<(i64, &'a Vec<u8>)> {
    let start = RowKey::new(row.into(), qualifier.into(), ObjValue::Min);
    let end = RowKey::new(row.into(), qualifier.into(), ObjValue::Max);
    cells
        .range(start..=end)
        .next_back()
        .and_then(|(key, value)| Some((key.timestamp()?.as_int()?, value)))
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Server-assigned timestamp, strictly newer than the current latest version.
fn next_timestamp(latest: Option<i64>) -> i64 {
    let now = now_millis();
    match latest {
        Some(ts) if ts >= now => ts.saturating_add(1),
        _ => now,
    }
}

fn remove_matching(cells: &mut Cells, start: RowKey, end: RowKey, limit: Option<i64>) {
    let doomed: Vec<RowKey> = cells
        .range(start..=end)
        .filter(|(key, _)| match limit {
            Some(limit) => key
                .timestamp()
                .and_then(ObjValue::as_int)
                .is_some_and(|ts| ts <= limit),
            None => true,
        })
        .map(|(key, _)| key.clone())
        .collect();
    for key in doomed {
        cells.remove(&key);
    }
}

fn delete(cells: &mut Cells, row: &[u8], qualifier: Option<&[u8]>, timestamp: i64) {
    let limit = timestamp.saturating_abs();
    match qualifier {
        None => remove_matching(cells, RowKey::row_min(row), RowKey::row_max(row), Some(limit)),
        Some(qualifier) if timestamp < 0 => remove_matching(
            cells,
            cell_key(row, qualifier, i64::MIN),
            cell_key(row, qualifier, i64::MAX),
            Some(limit),
        ),
        Some(qualifier) if timestamp == i64::MAX => {
            if let Some((ts, _)) = latest(cells, row, qualifier) {
                cells.remove(&cell_key(row, qualifier, ts));
            }
        }
        Some(qualifier) => {
            cells.remove(&cell_key(row, qualifier, timestamp));
        }
    }
}

/// Apply one operation; returns the written tuple for append and increment.
fn apply(
    cells: &mut Cells,
    op: &TableOperation,
) -> std::result::Result<Option<Vec<ObjValue>>, i32> {
    let (row, qualifier, timestamp) = key_parts(&op.row_key).ok_or(ERRNO_INVALID_ARGUMENT)?;
    let row = row.to_vec();
    let qualifier = qualifier.map(<[u8]>::to_vec);

    if op.op_type == OperationType::Delete {
        delete(cells, &row, qualifier.as_deref(), timestamp);
        return Ok(None);
    }

    let qualifier = qualifier.ok_or(ERRNO_INVALID_ARGUMENT)?;
    let value = op
        .value()
        .and_then(ObjValue::as_bytes)
        .ok_or(ERRNO_INVALID_ARGUMENT)?
        .to_vec();

    match op.op_type {
        OperationType::InsertOrUpdate => {
            let timestamp = if timestamp == i64::MAX {
                now_millis()
            } else {
                timestamp
            };
            cells.insert(cell_key(&row, &qualifier, timestamp), value);
            Ok(None)
        }
        OperationType::Append => {
            let current = latest(cells, &row, &qualifier);
            let timestamp = next_timestamp(current.map(|(ts, _)| ts));
            let mut appended = current.map(|(_, v)| v.clone()).unwrap_or_default();
            appended.extend_from_slice(&value);
            cells.insert(cell_key(&row, &qualifier, timestamp), appended.clone());
            Ok(Some(written(row, qualifier, timestamp, appended)))
        }
        OperationType::Increment => {
            let amount = decode_counter(&value)?;
            let current = latest(cells, &row, &qualifier);
            let base = match current {
                Some((_, v)) => decode_counter(v)?,
                None => 0,
            };
            let timestamp = next_timestamp(current.map(|(ts, _)| ts));
            let counter = base.wrapping_add(amount).to_be_bytes().to_vec();
            cells.insert(cell_key(&row, &qualifier, timestamp), counter.clone());
            Ok(Some(written(row, qualifier, timestamp, counter)))
        }
        OperationType::Delete => Ok(None),
    }
}

fn decode_counter(bytes: &[u8]) -> std::result::Result<i64, i32> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| ERRNO_INVALID_COUNTER)?;
    Ok(i64::from_be_bytes(bytes))
}

fn written(row: Vec<u8>, qualifier: Vec<u8>, timestamp: i64, value: Vec<u8>) -> Vec<ObjValue> {
    vec![row.into(), qualifier.into(), timestamp.into(), value.into()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::{
        BatchOperation, EntityType, HTableFilter, TableQuery, PRIMARY_INDEX,
    };

    const TARGET: &str = "t$cf";

    fn put(row: &str, qualifier: &str, ts: i64, value: &str) -> TableOperation {
        TableOperation::new(
            OperationType::InsertOrUpdate,
            cell_key(row.as_bytes(), qualifier.as_bytes(), ts),
        )
        .with_value(value.as_bytes().into())
    }

    fn batch(operations: Vec<TableOperation>) -> RpcRequest {
        RpcRequest::Batch(BatchRequest {
            table_name: TARGET.into(),
            batch: BatchOperation {
                operations,
                same_type: true,
                same_properties_names: true,
            },
            returning_affected_rows: true,
            entity_type: EntityType::Hkv,
        })
    }

    fn query(ranges: Vec<KeyRange>, filter: HTableFilter) -> RpcRequest {
        RpcRequest::Query(QueryRequest {
            table_name: TARGET.into(),
            query: TableQuery {
                index_name: PRIMARY_INDEX.into(),
                key_ranges: ranges,
                select_columns: ALL_COLUMNS.iter().map(|c| c.to_string()).collect(),
                filter,
                batch_size: None,
            },
            entity_type: EntityType::Hkv,
        })
    }

    fn rows(response: RpcResponse) -> Vec<Vec<ObjValue>> {
        match response {
            RpcResponse::Query(result) => result.rows,
            other => panic!("unexpected response {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_versions_newest_first() {
        let service = MemoryTableService::new();
        service
            .execute(batch(vec![
                put("r1", "a", 1, "v1"),
                put("r1", "a", 2, "v2"),
                put("r1", "b", 1, "x"),
                put("r2", "a", 1, "y"),
            ]))
            .await
            .unwrap();

        let filter = HTableFilter {
            max_versions: 2,
            ..Default::default()
        };
        let range = KeyRange {
            start: RowKey::row_min(b"r1"),
            end: RowKey::row_max(b"r1"),
        };
        let rows = rows(service.execute(query(vec![range], filter)).await.unwrap());
        let timestamps: Vec<i64> = rows.iter().filter_map(|r| r[2].as_int()).collect();
        assert_eq!(timestamps, vec![2, 1, 1]);
        assert_eq!(rows[0][3], ObjValue::Bytes(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_encodings() {
        let service = MemoryTableService::new();
        service
            .execute(batch(vec![
                put("r1", "a", 1, "1"),
                put("r1", "a", 2, "2"),
                put("r1", "a", 3, "3"),
                put("r1", "b", 5, "b"),
            ]))
            .await
            .unwrap();

        // exact version
        let exact = TableOperation::new(OperationType::Delete, cell_key(b"r1", b"a", 2));
        // versions up to 1
        let upto = TableOperation::new(OperationType::Delete, cell_key(b"r1", b"a", -1));
        service.execute(batch(vec![exact, upto])).await.unwrap();
        let remaining: Vec<i64> = service.snapshot(TARGET).iter().map(|c| c.2).collect();
        assert_eq!(remaining, vec![3, 5]);

        let family = TableOperation::new(
            OperationType::Delete,
            RowKey::new(b"r1".as_slice().into(), ObjValue::Null, (-i64::MAX).into()),
        );
        service.execute(batch(vec![family])).await.unwrap();
        assert!(service.snapshot(TARGET).is_empty());
    }

    #[tokio::test]
    async fn test_injected_row_failure() {
        let service = MemoryTableService::new();
        service.set_row_failure(TARGET, b"bad", Some(-4005));

        let response = service
            .execute(batch(vec![put("ok", "a", 1, "1"), put("bad", "a", 1, "1")]))
            .await
            .unwrap();
        match response {
            RpcResponse::Batch(results) => {
                assert_eq!(results[0].errno, 0);
                assert_eq!(results[1].errno, -4005);
            }
            other => panic!("unexpected response {}", other.kind()),
        }
        assert_eq!(service.snapshot(TARGET).len(), 1);
        assert_eq!(service.requests().len(), 1);
    }

    #[test]
    fn test_check_filter_parsing() {
        let check =
            CheckFilter::parse("CheckAndMutateFilter(=, 'binary:a, b', 'cf', 'q', false)").unwrap();
        assert_eq!(check.value, b"a, b");
        assert_eq!(check.qualifier, b"q");
        assert!(!check.check_null);

        let check = CheckFilter::parse("CheckAndMutateFilter(=, 'binary:', 'cf', '', true)").unwrap();
        assert!(check.qualifier.is_empty());
        assert!(check.check_null);

        assert!(CheckFilter::parse("ValueFilter(=, 'binary:x')").is_none());

        let check =
            CheckFilter::parse("CheckAndMutateFilter(=, 'binary:\\xFE\\x00', 'cf', 'q\\x01', false)")
                .unwrap();
        assert_eq!(check.value, vec![0xfe, 0x00]);
        assert_eq!(check.qualifier, vec![b'q', 0x01]);
    }

    #[tokio::test]
    async fn test_rejects_unknown_query_filter() {
        let service = MemoryTableService::new();
        let filter = HTableFilter {
            filter_string: Some("PrefixFilter('r')".into()),
            max_versions: 1,
            ..Default::default()
        };
        let result = service.execute(query(vec![], filter)).await;
        assert!(matches!(result, Err(Error::Rpc(_))));
    }
}
