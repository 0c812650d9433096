//! Table layer: request building, translation, execution and the
//! [`RemoteTable`] facade.

pub mod assembler;
pub mod conditional;
pub mod executor;
pub mod query_builder;
mod remote_table;
pub mod translator;
mod wide_column;

pub use conditional::CheckAndMutate;
pub use executor::{BoundedExecutor, CallScope, ExecutorConfig, ServerCall};
pub use remote_table::RemoteTable;
pub use translator::TargetNaming;
pub use wide_column::{TableDescriptor, WideColumnTable};
