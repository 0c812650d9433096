//! Remote table-query protocol: wire types, the client capability and an
//! in-memory service.

pub mod client;
pub mod memory;
pub mod types;

pub use client::{ClientFactory, ClientRegistry, TableRpc};
pub use memory::MemoryTableService;
pub use types::{
    BatchOperation, BatchRequest, EntityType, HTableFilter, KeyRange, ObjValue, OperationResult,
    OperationType, QueryAndMutateRequest, QueryAndMutateResult, QueryRequest, QueryResult, RowKey,
    RpcRequest, RpcResponse, TableOperation, TableQuery,
};
