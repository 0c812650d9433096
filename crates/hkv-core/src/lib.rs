//! hkv core - wide-column table client over a table-query RPC protocol
//!
//! This library exposes row-oriented, multi-version table operations on top
//! of a remote service that stores every column family as its own table of
//! `(row, qualifier, timestamp) -> value` tuples:
//!
//! - Gets and scans translated into key-range queries with filters
//! - Client-side write buffering with per-family batch flushes
//! - Atomic check-and-mutate, append and increment
//! - Optional bounded execution with a client-observed deadline

pub mod buffer;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod rpc;
pub mod table;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, RemoteError, Result};
pub use model::{
    Append, Cell, CellType, Delete, Get, Increment, Put, ResultScanner, RowAction, RowResult,
    Scan, TimeRange,
};
pub use rpc::{ClientRegistry, MemoryTableService, TableRpc};
pub use table::{RemoteTable, WideColumnTable};
