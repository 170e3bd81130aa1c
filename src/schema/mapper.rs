use thiserror::Error;

use crate::types::InsertionTuple;

use super::header::ColumnHeader;

/// A row carries more cells than the header declares columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("row has {cells} cells but only {columns} columns are declared")]
pub struct RowOverflow {
    pub cells: usize,
    pub columns: usize,
}

/// Turns raw rows into fixed-shape [`InsertionTuple`]s for one [`ColumnHeader`].
#[derive(Debug, Clone, Copy)]
pub struct RowMapper<'h> {
    header: &'h ColumnHeader,
}

impl<'h> RowMapper<'h> {
    pub fn new(header: &'h ColumnHeader) -> Self {
        Self { header }
    }

    /// Map `row` to `[id, cell(col_1) .. cell(col_N)]`.
    ///
    /// Missing trailing cells become empty strings. Cells are picked by the ordinal recorded when
    /// the header was scanned.
    pub fn values<S: AsRef<str>>(&self, id: u64, row: &[S]) -> Result<InsertionTuple, RowOverflow> {
        let columns = self.header.len();
        if row.len() > columns {
            return Err(RowOverflow {
                cells: row.len(),
                columns,
            });
        }

        let values = self
            .header
            .columns()
            .iter()
            .map(|col| {
                row.get(col.ordinal)
                    .map(|cell| cell.as_ref().to_string())
                    .unwrap_or_default()
            })
            .collect();

        Ok(InsertionTuple::new(id, values))
    }
}
