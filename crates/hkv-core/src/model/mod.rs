//! Wide-column data model: cells, requests and results.

mod cell;
mod operation;
mod result;

pub use cell::{Cell, CellType, LATEST_TIMESTAMP};
pub use operation::{
    Append, Delete, FamilyQualifiers, Get, Increment, Mutation, Put, RowAction, Scan, TimeRange,
};
pub use result::{ResultScanner, RowResult};
