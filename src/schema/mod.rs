//! Header normalization and row mapping.
//!
//! - [`ColumnHeader`] / [`HeaderSlot`]: derive canonical column names from a header row
//! - [`RowMapper`]: turn raw rows into [`crate::types::InsertionTuple`]s

mod header;
mod mapper;

pub use header::{normalize, Column, ColumnHeader, HeaderSlot};
pub use mapper::{RowMapper, RowOverflow};
