//! Conditional mutations: check one column of a row, mutate only if it matches.
//!
//! The check and the mutation travel in one query-and-mutate request, so the
//! remote side evaluates them atomically on the row.

use super::query_builder::{build_filter, check_and_mutate_filter, point_query};
use super::translator::{build_batch, family_name, query_and_mutate_request, single_family, TargetNaming};
use crate::model::Mutation;
use crate::rpc::types::{QueryAndMutateResult, RpcRequest};
use crate::{Error, Result};

/// A check-and-mutate request before translation.
pub struct CheckAndMutate<'a> {
    pub row: &'a [u8],
    pub family: &'a [u8],
    pub qualifier: &'a [u8],
    /// Expected value; `None` checks that the column is absent
    pub value: Option<&'a [u8]>,
    pub mutation: &'a dyn Mutation,
}

impl<'a> CheckAndMutate<'a> {
    /// Validate locally and build the wire request.
    pub fn build(&self, naming: &TargetNaming) -> Result<RpcRequest> {
        if self.row.is_empty() {
            return Err(Error::IllegalArgument("row is empty".into()));
        }
        if family_name(self.family).trim().is_empty() {
            return Err(Error::IllegalArgument("family is blank".into()));
        }
        if self.row != self.mutation.row() {
            return Err(Error::IllegalArgument(
                "mutation row is not equal check row".into(),
            ));
        }
        if self.mutation.is_empty() {
            return Err(Error::IllegalArgument("mutation is empty".into()));
        }

        let (family, cells) = single_family(self.mutation)?;
        if family != self.family {
            return Err(Error::IllegalArgument(
                "mutation family is not equal check family".into(),
            ));
        }

        let filter_string = check_and_mutate_filter(self.family, self.qualifier, self.value);
        let filter = build_filter(Some(filter_string.as_str()), None, 1, [Some(self.qualifier)]);
        let query = point_query(self.row, filter)?;
        let mutations = build_batch(cells, false);

        Ok(query_and_mutate_request(
            &naming.target(family),
            query,
            mutations,
        ))
    }
}

/// Whether the check matched and the mutation was applied.
pub fn check_passed(result: &QueryAndMutateResult) -> bool {
    result.affected_rows > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TableConfig;
    use crate::model::{Delete, Put};
    use crate::rpc::types::{ObjValue, OperationType};

    fn naming() -> TargetNaming {
        TargetNaming::new("t", &TableConfig::default())
    }

    #[test]
    fn test_builds_single_request() {
        let put = Put::new("r1").add_column("cf", "q", "new");
        let request = CheckAndMutate {
            row: b"r1",
            family: b"cf",
            qualifier: b"q",
            value: Some(b"old".as_slice()),
            mutation: &put,
        }
        .build(&naming())
        .unwrap();

        let RpcRequest::QueryAndMutate(request) = request else {
            panic!("expected query-and-mutate request");
        };
        assert_eq!(request.table_name, "t$cf");
        assert_eq!(
            request.query.filter.filter_string.as_deref(),
            Some("CheckAndMutateFilter(=, 'binary:old', 'cf', 'q', false)")
        );
        assert_eq!(request.query.filter.max_versions, 1);
        assert_eq!(request.query.filter.select_column_qualifiers, vec![b"q".to_vec()]);
        assert_eq!(request.query.key_ranges.len(), 1);
        assert_eq!(request.mutations.operations[0].op_type, OperationType::InsertOrUpdate);
    }

    #[test]
    fn test_absent_value_check() {
        let delete = Delete::new("r1").delete_columns("cf", "q");
        let RpcRequest::QueryAndMutate(request) = (CheckAndMutate {
            row: b"r1",
            family: b"cf",
            qualifier: b"q",
            value: None,
            mutation: &delete,
        })
        .build(&naming())
        .unwrap() else {
            panic!("expected query-and-mutate request");
        };
        assert!(request
            .query
            .filter
            .filter_string
            .as_deref()
            .is_some_and(|f| f.ends_with("true)")));
        assert_eq!(
            request.mutations.operations[0].row_key.timestamp(),
            Some(&ObjValue::Int(-i64::MAX))
        );
    }

    #[test]
    fn test_local_validation() {
        let put = Put::new("r1").add_column("cf", "q", "v");
        let check = |row: &'static [u8], family: &'static [u8], mutation: &dyn Mutation| {
            CheckAndMutate {
                row,
                family,
                qualifier: b"q",
                value: None,
                mutation,
            }
            .build(&naming())
        };

        assert!(matches!(check(b"", b"cf", &put), Err(Error::IllegalArgument(_))));
        assert!(matches!(check(b"r1", b" ", &put), Err(Error::IllegalArgument(_))));
        assert!(matches!(check(b"r2", b"cf", &put), Err(Error::IllegalArgument(_))));
        assert!(matches!(check(b"r1", b"other", &put), Err(Error::IllegalArgument(_))));
        assert!(matches!(
            check(b"r1", b"cf", &Put::new("r1")),
            Err(Error::IllegalArgument(msg)) if msg == "mutation is empty"
        ));

        let multi = Put::new("r1").add_column("cf", "q", "v").add_column("cf2", "q", "v");
        assert!(matches!(check(b"r1", b"cf", &multi), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_check_passed() {
        assert!(check_passed(&QueryAndMutateResult {
            affected_rows: 1,
            ..Default::default()
        }));
        assert!(!check_passed(&QueryAndMutateResult::default()));
    }
}
