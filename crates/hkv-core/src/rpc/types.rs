//! Wire-level request and response shapes of the table-query protocol.
//!
//! Tables on the remote side are keyed by the composite `(K, Q, T)` primary key
//! with a single value column `V`. Ranges are expressed over that composite key,
//! so row-level bounds are built with [`ObjValue::Min`] / [`ObjValue::Max`]
//! markers in the trailing slots.

use std::cmp::Ordering;

/// Row key column.
pub const COLUMN_K: &str = "K";
/// Qualifier column.
pub const COLUMN_Q: &str = "Q";
/// Timestamp column.
pub const COLUMN_T: &str = "T";
/// Value column.
pub const COLUMN_V: &str = "V";

/// Columns returned by every query, in tuple order.
pub const ALL_COLUMNS: [&str; 4] = [COLUMN_K, COLUMN_Q, COLUMN_T, COLUMN_V];

/// Property columns written by put-like operations.
pub const V_COLUMNS: [&str; 1] = [COLUMN_V];

/// Index used for all range queries.
pub const PRIMARY_INDEX: &str = "PRIMARY";

/// A single wire value.
///
/// Ordering: `Min < Null < Int < Bytes < Max`, bytes compared lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjValue {
    Min,
    Null,
    Int(i64),
    Bytes(Vec<u8>),
    Max,
}

impl ObjValue {
    fn rank(&self) -> u8 {
        match self {
            ObjValue::Min => 0,
            ObjValue::Null => 1,
            ObjValue::Int(_) => 2,
            ObjValue::Bytes(_) => 3,
            ObjValue::Max => 4,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ObjValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ObjValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ObjValue::Min => "min",
            ObjValue::Null => "null",
            ObjValue::Int(_) => "int",
            ObjValue::Bytes(_) => "bytes",
            ObjValue::Max => "max",
        }
    }
}

impl Ord for ObjValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (ObjValue::Int(a), ObjValue::Int(b)) => a.cmp(b),
            (ObjValue::Bytes(a), ObjValue::Bytes(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for ObjValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&[u8]> for ObjValue {
    fn from(bytes: &[u8]) -> Self {
        ObjValue::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for ObjValue {
    fn from(bytes: Vec<u8>) -> Self {
        ObjValue::Bytes(bytes)
    }
}

impl From<i64> for ObjValue {
    fn from(v: i64) -> Self {
        ObjValue::Int(v)
    }
}

/// Composite primary key `(K, Q, T)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowKey(pub Vec<ObjValue>);

impl RowKey {
    pub fn new(row: ObjValue, qualifier: ObjValue, timestamp: ObjValue) -> Self {
        Self(vec![row, qualifier, timestamp])
    }

    /// Key sorting before every key of `row`.
    pub fn row_min(row: &[u8]) -> Self {
        Self::new(row.into(), ObjValue::Min, ObjValue::Min)
    }

    /// Key sorting after every key of `row`.
    pub fn row_max(row: &[u8]) -> Self {
        Self::new(row.into(), ObjValue::Max, ObjValue::Max)
    }

    /// Key sorting after every key.
    pub fn max() -> Self {
        Self::new(ObjValue::Max, ObjValue::Max, ObjValue::Max)
    }

    pub fn row(&self) -> Option<&ObjValue> {
        self.0.first()
    }

    pub fn qualifier(&self) -> Option<&ObjValue> {
        self.0.get(1)
    }

    pub fn timestamp(&self) -> Option<&ObjValue> {
        self.0.get(2)
    }
}

/// Closed range `[start, end]` over composite keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: RowKey,
    pub end: RowKey,
}

impl KeyRange {
    pub fn contains(&self, key: &RowKey) -> bool {
        &self.start <= key && key <= &self.end
    }
}

/// Wide-column filter attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HTableFilter {
    /// Predicate in the remote filter language
    pub filter_string: Option<String>,
    /// Inclusive lower timestamp bound
    pub min_stamp: Option<i64>,
    /// Exclusive upper timestamp bound
    pub max_stamp: Option<i64>,
    /// Versions returned per column
    pub max_versions: i32,
    /// Qualifiers to return; empty selects all, a zero-length entry selects the bare column
    pub select_column_qualifiers: Vec<Vec<u8>>,
}

/// Range query over one physical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub index_name: String,
    pub key_ranges: Vec<KeyRange>,
    pub select_columns: Vec<String>,
    pub filter: HTableFilter,
    pub batch_size: Option<u32>,
}

/// Single-row operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    InsertOrUpdate,
    Delete,
    Append,
    Increment,
}

/// One mutation addressed by composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOperation {
    pub op_type: OperationType,
    pub row_key: RowKey,
    pub property_names: Vec<String>,
    pub property_values: Vec<ObjValue>,
}

impl TableOperation {
    pub fn new(op_type: OperationType, row_key: RowKey) -> Self {
        Self {
            op_type,
            row_key,
            property_names: Vec::new(),
            property_values: Vec::new(),
        }
    }

    /// Attach the value column.
    pub fn with_value(mut self, value: ObjValue) -> Self {
        self.property_names = V_COLUMNS.iter().map(|c| c.to_string()).collect();
        self.property_values = vec![value];
        self
    }

    /// The `V` property, if present.
    pub fn value(&self) -> Option<&ObjValue> {
        self.property_names
            .iter()
            .position(|name| name == COLUMN_V)
            .and_then(|i| self.property_values.get(i))
    }
}

/// Ordered operations sent to one physical table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOperation {
    pub operations: Vec<TableOperation>,
    /// Every operation has the same type (hint only)
    pub same_type: bool,
    /// Every operation writes the same property columns (hint only)
    pub same_properties_names: bool,
}

impl BatchOperation {
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Entity model the request is interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityType {
    /// Wide-column `(K, Q, T, V)` tables
    #[default]
    Hkv,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub table_name: String,
    pub query: TableQuery,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub table_name: String,
    pub batch: BatchOperation,
    pub returning_affected_rows: bool,
    pub entity_type: EntityType,
}

/// Query and mutations evaluated atomically on one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryAndMutateRequest {
    pub table_name: String,
    pub query: TableQuery,
    pub mutations: BatchOperation,
    pub entity_type: EntityType,
}

/// Any request the RPC capability executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcRequest {
    Query(QueryRequest),
    Batch(BatchRequest),
    QueryAndMutate(QueryAndMutateRequest),
}

impl RpcRequest {
    pub fn table_name(&self) -> &str {
        match self {
            RpcRequest::Query(r) => &r.table_name,
            RpcRequest::Batch(r) => &r.table_name,
            RpcRequest::QueryAndMutate(r) => &r.table_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RpcRequest::Query(_) => "query",
            RpcRequest::Batch(_) => "batch",
            RpcRequest::QueryAndMutate(_) => "query_and_mutate",
        }
    }
}

/// Rows returned by a query, one `Vec<ObjValue>` per tuple in `property_names` order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub property_names: Vec<String>,
    pub rows: Vec<Vec<ObjValue>>,
}

/// Outcome of one batch entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    /// 0 on success, a server error code otherwise
    pub errno: i32,
    pub affected_rows: i64,
    pub execute_host: Option<String>,
}

impl OperationResult {
    pub fn success(affected_rows: i64) -> Self {
        Self {
            errno: 0,
            affected_rows,
            execute_host: None,
        }
    }

    pub fn failure(errno: i32) -> Self {
        Self {
            errno,
            affected_rows: 0,
            execute_host: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryAndMutateResult {
    pub affected_rows: i64,
    /// Cells written by increment/append mutations
    pub affected_entity: QueryResult,
}

/// Response mirroring the request kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcResponse {
    Query(QueryResult),
    Batch(Vec<OperationResult>),
    QueryAndMutate(QueryAndMutateResult),
}

impl RpcResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            RpcResponse::Query(_) => "query",
            RpcResponse::Batch(_) => "batch",
            RpcResponse::QueryAndMutate(_) => "query_and_mutate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obj_value_ordering() {
        assert!(ObjValue::Min < ObjValue::Null);
        assert!(ObjValue::Null < ObjValue::Int(i64::MIN));
        assert!(ObjValue::Int(5) < ObjValue::Bytes(vec![]));
        assert!(ObjValue::Bytes(vec![0xff; 8]) < ObjValue::Max);
        assert!(ObjValue::Bytes(b"a".to_vec()) < ObjValue::Bytes(b"ab".to_vec()));
    }

    #[test]
    fn test_row_bounds_bracket_row_keys() {
        let key = RowKey::new(b"r1".as_slice().into(), b"q".as_slice().into(), 10.into());
        assert!(RowKey::row_min(b"r1") < key);
        assert!(key < RowKey::row_max(b"r1"));
        assert!(RowKey::row_max(b"r0") < key);
        assert!(key < RowKey::max());
    }

    #[test]
    fn test_operation_value_lookup() {
        let op = TableOperation::new(OperationType::InsertOrUpdate, RowKey::row_min(b"r"))
            .with_value(b"v".to_vec().into());
        assert_eq!(op.value(), Some(&ObjValue::Bytes(b"v".to_vec())));

        let del = TableOperation::new(OperationType::Delete, RowKey::row_min(b"r"));
        assert!(del.value().is_none());
    }
}
