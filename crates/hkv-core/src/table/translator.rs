//! Translation of column mutations into wire operations and requests.
//!
//! | cell kind     | wire operation                 | key                         |
//! |---------------|--------------------------------|-----------------------------|
//! | Put           | insert-or-update (or append)   | `(row, qualifier, ts)`      |
//! | Delete        | delete                         | `(row, qualifier, ts)`      |
//! | DeleteColumn  | delete                         | `(row, qualifier, -ts)`     |
//! | DeleteFamily  | delete                         | `(row, NULL, -ts)`          |
//! | increment     | increment                      | `(row, qualifier, i64::MAX)`|

use crate::config::TableConfig;
use crate::error::RemoteError;
use crate::model::{Cell, CellType, Mutation};
use crate::rpc::types::{
    BatchOperation, BatchRequest, EntityType, ObjValue, OperationResult, OperationType,
    QueryAndMutateRequest, QueryRequest, RowKey, RpcRequest, TableOperation, TableQuery,
};
use crate::{Error, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Separator between table and family in physical target names.
pub const FAMILY_SEPARATOR: char = '$';

/// Enforce exactly one non-blank family per operation.
pub fn check_family_violation<I>(families: I) -> Result<()>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut families = families.into_iter();
    let Some(family) = families.next() else {
        return Err(Error::Unsupported("family is empty.".into()));
    };
    if families.next().is_some() {
        return Err(Error::Unsupported(
            "multi family is not supported yet.".into(),
        ));
    }
    if family_name(family.as_ref()).trim().is_empty() {
        return Err(Error::IllegalArgument("family is blank".into()));
    }
    Ok(())
}

/// The only family of a mutation and its cells.
pub fn single_family(mutation: &dyn Mutation) -> Result<(&[u8], &[Cell])> {
    check_family_violation(mutation.family_cells().keys())?;
    mutation
        .family_cells()
        .iter()
        .next()
        .map(|(family, cells)| (family.as_slice(), cells.as_slice()))
        .ok_or_else(|| Error::Unsupported("family is empty.".into()))
}

/// Family bytes as used in target names and filter strings.
pub fn family_name(family: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(family)
}

/// Physical target naming for one logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetNaming {
    table_name: String,
    test_load_enable: bool,
    test_load_suffix: String,
}

impl TargetNaming {
    pub fn new(table_name: impl Into<String>, config: &TableConfig) -> Self {
        Self {
            table_name: table_name.into(),
            test_load_enable: config.test_load_enable,
            test_load_suffix: config.test_load_suffix.clone(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Target that operations on `family` are sent to.
    pub fn target(&self, family: &[u8]) -> String {
        if self.test_load_enable {
            self.test_load_target(family)
        } else {
            self.normal_target(family)
        }
    }

    /// `table$family`
    pub fn normal_target(&self, family: &[u8]) -> String {
        format!("{}{}{}", self.table_name, FAMILY_SEPARATOR, family_name(family))
    }

    /// `table{suffix}$family`
    pub fn test_load_target(&self, family: &[u8]) -> String {
        format!(
            "{}{}{}{}",
            self.table_name,
            self.test_load_suffix,
            FAMILY_SEPARATOR,
            family_name(family)
        )
    }
}

/// Translate one cell; puts become appends when `put_to_append` is set.
pub fn build_operation(cell: &Cell, put_to_append: bool) -> TableOperation {
    let row = ObjValue::from(cell.row.as_slice());
    let qualifier = ObjValue::from(cell.qualifier.as_slice());

    match cell.cell_type {
        CellType::Put => {
            let op_type = if put_to_append {
                OperationType::Append
            } else {
                OperationType::InsertOrUpdate
            };
            TableOperation::new(op_type, RowKey::new(row, qualifier, cell.timestamp.into()))
                .with_value(cell.value.as_slice().into())
        }
        CellType::Delete => TableOperation::new(
            OperationType::Delete,
            RowKey::new(row, qualifier, cell.timestamp.into()),
        ),
        CellType::DeleteColumn => TableOperation::new(
            OperationType::Delete,
            RowKey::new(row, qualifier, negate(cell.timestamp).into()),
        ),
        CellType::DeleteFamily => TableOperation::new(
            OperationType::Delete,
            RowKey::new(row, ObjValue::Null, negate(cell.timestamp).into()),
        ),
    }
}

fn negate(timestamp: i64) -> i64 {
    timestamp.saturating_neg()
}

/// Translate cells into one batch, computing the homogeneity hints.
pub fn build_batch(cells: &[Cell], put_to_append: bool) -> BatchOperation {
    with_hints(
        cells
            .iter()
            .map(|cell| build_operation(cell, put_to_append))
            .collect(),
    )
}

/// Increment of one column by `amount`, encoded as 8 big-endian bytes.
pub fn increment_operation(row: &[u8], qualifier: &[u8], amount: i64) -> TableOperation {
    TableOperation::new(
        OperationType::Increment,
        RowKey::new(row.into(), qualifier.into(), i64::MAX.into()),
    )
    .with_value(amount.to_be_bytes().to_vec().into())
}

/// Increments of several columns of one row.
pub fn build_increment_batch(row: &[u8], columns: &BTreeMap<Vec<u8>, i64>) -> BatchOperation {
    with_hints(
        columns
            .iter()
            .map(|(qualifier, amount)| increment_operation(row, qualifier, *amount))
            .collect(),
    )
}

fn with_hints(operations: Vec<TableOperation>) -> BatchOperation {
    let same_type = operations
        .windows(2)
        .all(|pair| pair[0].op_type == pair[1].op_type);
    let same_properties_names = operations
        .windows(2)
        .all(|pair| pair[0].property_names == pair[1].property_names);
    BatchOperation {
        operations,
        same_type,
        same_properties_names,
    }
}

pub fn query_request(target: &str, query: TableQuery) -> RpcRequest {
    RpcRequest::Query(QueryRequest {
        table_name: target.to_string(),
        query,
        entity_type: EntityType::Hkv,
    })
}

pub fn batch_request(target: &str, batch: BatchOperation) -> RpcRequest {
    RpcRequest::Batch(BatchRequest {
        table_name: target.to_string(),
        batch,
        returning_affected_rows: true,
        entity_type: EntityType::Hkv,
    })
}

pub fn query_and_mutate_request(
    target: &str,
    query: TableQuery,
    mutations: BatchOperation,
) -> RpcRequest {
    RpcRequest::QueryAndMutate(QueryAndMutateRequest {
        table_name: target.to_string(),
        query,
        mutations,
        entity_type: EntityType::Hkv,
    })
}

/// Fail with the first non-zero code, carrying every code of the batch.
pub fn check_batch_results(target: &str, results: &[OperationResult]) -> Result<()> {
    let error_codes: Vec<i32> = results.iter().map(|r| r.errno).collect();
    match error_codes.iter().find(|code| **code != 0) {
        Some(&errno) => Err(Error::Remote(RemoteError {
            table: target.to_string(),
            errno,
            error_codes,
        })),
        None => Ok(()),
    }
}
