//! Rebuilds wire tuples into cells and row results.
//!
//! Tuples arrive as `[K, Q, T, V]`. The family is not on the wire; it is the
//! family the request was addressed to.

use crate::model::{Cell, ResultScanner, RowResult};
use crate::rpc::types::{ObjValue, OperationResult, QueryAndMutateResult, QueryResult, RpcResponse};
use crate::{Error, Result};

/// Rebuild one `[K, Q, T, V]` tuple.
pub fn cell_from_tuple(family: &[u8], tuple: &[ObjValue]) -> Result<Cell> {
    let [row, qualifier, timestamp, value] = tuple else {
        return Err(malformed(tuple, "expected 4 columns"));
    };

    let row = row
        .as_bytes()
        .ok_or_else(|| malformed(tuple, "row key is not bytes"))?;
    let qualifier = bytes_or_empty(qualifier).ok_or_else(|| malformed(tuple, "qualifier is not bytes"))?;
    let timestamp = timestamp
        .as_int()
        .ok_or_else(|| malformed(tuple, "timestamp is not an integer"))?;
    let value = bytes_or_empty(value).ok_or_else(|| malformed(tuple, "value is not bytes"))?;

    Ok(Cell::put(row, family, qualifier, timestamp, value))
}

fn bytes_or_empty(value: &ObjValue) -> Option<&[u8]> {
    match value {
        ObjValue::Bytes(bytes) => Some(bytes),
        ObjValue::Null => Some(&[] as &[u8]),
        _ => None,
    }
}

fn malformed(tuple: &[ObjValue], reason: &str) -> Error {
    let types: Vec<&str> = tuple.iter().map(ObjValue::type_name).collect();
    Error::IllegalArgument(format!("malformed row tuple {types:?}: {reason}"))
}

/// Rebuild every tuple, preserving order.
pub fn cells(family: &[u8], rows: &[Vec<ObjValue>]) -> Result<Vec<Cell>> {
    rows.iter().map(|tuple| cell_from_tuple(family, tuple)).collect()
}

/// All tuples of a single-row response as one result.
pub fn row_result(family: &[u8], result: &QueryResult) -> Result<RowResult> {
    Ok(RowResult::new(cells(family, &result.rows)?))
}

/// Split tuples into one result per row; tuples of a row arrive adjacent.
pub fn group_rows(family: &[u8], result: &QueryResult) -> Result<Vec<RowResult>> {
    let mut rows: Vec<RowResult> = Vec::new();
    let mut current: Vec<Cell> = Vec::new();

    for cell in cells(family, &result.rows)? {
        if current.first().is_some_and(|c| c.row != cell.row) {
            rows.push(RowResult::new(std::mem::take(&mut current)));
        }
        current.push(cell);
    }
    if !current.is_empty() {
        rows.push(RowResult::new(current));
    }

    Ok(rows)
}

pub fn scanner(family: &[u8], result: &QueryResult) -> Result<ResultScanner> {
    Ok(ResultScanner::new(group_rows(family, result)?))
}

/// Cells written by an increment or append.
pub fn affected_result(family: &[u8], result: &QueryAndMutateResult) -> Result<RowResult> {
    row_result(family, &result.affected_entity)
}

pub fn expect_query(response: RpcResponse) -> Result<QueryResult> {
    match response {
        RpcResponse::Query(result) => Ok(result),
        other => Err(unexpected("query", &other)),
    }
}

pub fn expect_batch(response: RpcResponse) -> Result<Vec<OperationResult>> {
    match response {
        RpcResponse::Batch(results) => Ok(results),
        other => Err(unexpected("batch", &other)),
    }
}

pub fn expect_query_and_mutate(response: RpcResponse) -> Result<QueryAndMutateResult> {
    match response {
        RpcResponse::QueryAndMutate(result) => Ok(result),
        other => Err(unexpected("query_and_mutate", &other)),
    }
}

fn unexpected(expected: &'static str, actual: &RpcResponse) -> Error {
    Error::UnexpectedResponse {
        expected,
        actual: actual.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(row: &str, q: &str, ts: i64, v: &str) -> Vec<ObjValue> {
        vec![
            row.as_bytes().into(),
            q.as_bytes().into(),
            ts.into(),
            v.as_bytes().into(),
        ]
    }

    #[test]
    fn test_cell_from_tuple() {
        let cell = cell_from_tuple(b"cf", &tuple("r1", "a", 7, "v")).unwrap();
        assert_eq!(cell, Cell::put("r1", "cf", "a", 7, "v"));

        let bare = vec![
            ObjValue::from(b"r1".as_slice()),
            ObjValue::Null,
            ObjValue::Int(1),
            ObjValue::Null,
        ];
        let cell = cell_from_tuple(b"cf", &bare).unwrap();
        assert!(cell.qualifier.is_empty());
        assert!(cell.value.is_empty());
    }

    #[test]
    fn test_malformed_tuples_rejected() {
        let short = vec![ObjValue::from(b"r1".as_slice())];
        assert!(matches!(cell_from_tuple(b"cf", &short), Err(Error::IllegalArgument(_))));

        let mut bad_ts = tuple("r1", "a", 1, "v");
        bad_ts[2] = ObjValue::from(b"1".as_slice());
        let err = cell_from_tuple(b"cf", &bad_ts).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_group_rows() {
        let result = QueryResult {
            property_names: vec![],
            rows: vec![
                tuple("r1", "a", 2, "x"),
                tuple("r1", "b", 1, "y"),
                tuple("r2", "a", 1, "z"),
            ],
        };
        let rows = group_rows(b"cf", &result).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert_eq!(rows[1].row(), Some(b"r2".as_slice()));

        let mut scanner = scanner(b"cf", &result).unwrap();
        assert_eq!(scanner.next().and_then(|r| r.value(b"cf", b"b").map(<[u8]>::to_vec)), Some(b"y".to_vec()));
    }

    #[test]
    fn test_response_kind_mismatch() {
        let err = expect_batch(RpcResponse::Query(QueryResult::default())).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedResponse {
                expected: "batch",
                actual: "query"
            }
        ));
        assert!(expect_query(RpcResponse::Query(QueryResult::default())).is_ok());
    }
}
