use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use tracing::debug;

use crate::error::{IngestError, IngestResult};
use crate::types::Row;

/// One worksheet, read as raw text rows.
///
/// Row numbers are 1-based sheet rows (Excel-like), independent of where the used range starts.
/// Rows are rendered up to their last non-empty cell, so trailing blanks never count as cells.
///
/// The worksheet's cell range is loaded into memory when the sheet is opened; only the rendering
/// of rows into text is lazy. Memory use therefore grows with sheet size.
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    range: Range<Data>,
    header_row: usize,
    data_start_row: usize,
}

impl Sheet {
    /// Open the first worksheet of a workbook (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`).
    pub fn open_first(
        path: impl AsRef<Path>,
        header_row: usize,
        data_start_row: usize,
    ) -> IngestResult<Self> {
        let mut workbook = open_workbook_auto(path.as_ref())?;
        let name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(IngestError::NoSheets)?;
        let range = workbook.worksheet_range(&name)?;
        debug!(sheet = %name, size = ?range.get_size(), "loaded worksheet");
        Ok(Self::from_range(name, range, header_row, data_start_row))
    }

    pub fn from_range(
        name: impl Into<String>,
        range: Range<Data>,
        header_row: usize,
        data_start_row: usize,
    ) -> Self {
        Self {
            name: name.into(),
            range,
            header_row,
            data_start_row,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sheet rows up to the last used one.
    pub fn row_count(&self) -> usize {
        self.range.end().map(|(r, _)| r as usize + 1).unwrap_or(0)
    }

    fn first_used_row(&self) -> usize {
        self.range.start().map(|(r, _)| r as usize).unwrap_or(0)
    }

    fn first_used_col(&self) -> usize {
        self.range.start().map(|(_, c)| c as usize).unwrap_or(0)
    }

    /// Cells of the configured header row.
    pub fn header_cells(&self) -> IngestResult<Row> {
        let idx0 = self.header_row.saturating_sub(1);
        if self.header_row == 0 || idx0 >= self.row_count() {
            return Err(IngestError::MissingRow {
                sheet: self.name.clone(),
                row: self.header_row,
                what: "header row",
            });
        }
        let first_used = self.first_used_row();
        if idx0 < first_used {
            return Ok(Vec::new());
        }
        Ok(self
            .range
            .rows()
            .nth(idx0 - first_used)
            .map(|cells| self.render(cells))
            .unwrap_or_default())
    }

    /// Lazily rendered data rows, from the configured start row to the last used row.
    ///
    /// Fails if the sheet ends before the row preceding the first data row.
    pub fn data_rows(&self) -> IngestResult<impl Iterator<Item = Row> + '_> {
        let first = self.data_start_row.saturating_sub(1);
        let total = self.row_count();
        if first > total {
            return Err(IngestError::MissingRow {
                sheet: self.name.clone(),
                row: first,
                what: "row before first data row",
            });
        }

        let first_used = self.first_used_row();
        let leading_blank = (first..total.min(first_used)).map(|_| Vec::new());
        let body = self
            .range
            .rows()
            .skip(first.saturating_sub(first_used))
            .map(move |cells| self.render(cells));
        Ok(leading_blank.chain(body))
    }

    fn render(&self, cells: &[Data]) -> Row {
        let mut row: Row = std::iter::repeat_n(String::new(), self.first_used_col())
            .chain(cells.iter().map(cell_to_string))
            .collect();
        while row.last().is_some_and(|c| c.is_empty()) {
            row.pop();
        }
        row
    }
}

/// Render a cell as raw text: integral floats print without a fractional part.
pub fn cell_to_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(f) => f.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}
