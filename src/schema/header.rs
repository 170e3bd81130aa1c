use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use tracing::warn;

use crate::error::{IngestError, IngestResult};

/// One header column: the name found in the sheet, its SQL-safe name, and its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Header cell text as read from the sheet.
    pub raw_name: String,
    /// Normalized name used as the SQL column name.
    pub canonical_name: String,
    /// Zero-based source column index.
    pub ordinal: usize,
}

/// Canonical column mapping derived from one header row.
///
/// Raw names are non-blank and unique, canonical names are unique and match `[a-z0-9_]+`, and
/// ordinals are `0..len()` in sheet order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    columns: Vec<Column>,
    by_raw: HashMap<String, usize>,
    by_canonical: HashMap<String, usize>,
}

impl ColumnHeader {
    /// Build the mapping from the header cells of one sheet.
    ///
    /// Fails on the first blank or duplicated raw name. Canonical names that normalize to nothing
    /// become `column_<n>` (1-based); canonical collisions get a `_2`, `_3`, ... suffix.
    pub fn from_cells<S: AsRef<str>>(cells: &[S]) -> IngestResult<Self> {
        let mut columns = Vec::with_capacity(cells.len());
        let mut by_raw: HashMap<String, usize> = HashMap::with_capacity(cells.len());
        let mut taken: HashSet<String> = HashSet::with_capacity(cells.len());

        for (ordinal, cell) in cells.iter().enumerate() {
            let raw = cell.as_ref();
            if raw.trim().is_empty() {
                return Err(IngestError::BlankColumnName { column: ordinal + 1 });
            }
            if let Some(&first) = by_raw.get(raw) {
                return Err(IngestError::DuplicateColumnName {
                    name: raw.to_string(),
                    first: first + 1,
                    second: ordinal + 1,
                });
            }

            let mut canonical = normalize(raw);
            if canonical.is_empty() {
                canonical = format!("column_{}", ordinal + 1);
                warn!(raw_name = raw, canonical = %canonical, "column name has no usable characters");
            }
            if taken.contains(&canonical) {
                let base = canonical;
                let mut n = 2usize;
                canonical = loop {
                    let candidate = format!("{base}_{n}");
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                };
                warn!(raw_name = raw, canonical = %canonical, "canonical column name collides, suffixed");
            }

            taken.insert(canonical.clone());
            by_raw.insert(raw.to_string(), ordinal);
            columns.push(Column {
                raw_name: raw.to_string(),
                canonical_name: canonical,
                ordinal,
            });
        }

        let by_canonical = columns
            .iter()
            .map(|c| (c.canonical_name.clone(), c.ordinal))
            .collect();

        Ok(Self {
            columns,
            by_raw,
            by_canonical,
        })
    }

    /// Number of declared columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Columns in ordinal order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Canonical names in ordinal order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.canonical_name.clone()).collect()
    }

    /// Canonical name for a raw header name.
    pub fn canonical_name(&self, raw_name: &str) -> Option<&str> {
        self.by_raw
            .get(raw_name)
            .map(|&i| self.columns[i].canonical_name.as_str())
    }

    /// Raw header name for a canonical name.
    pub fn raw_name(&self, canonical_name: &str) -> Option<&str> {
        self.by_canonical
            .get(canonical_name)
            .map(|&i| self.columns[i].raw_name.as_str())
    }

    /// Source column index for a canonical name.
    pub fn ordinal(&self, canonical_name: &str) -> Option<usize> {
        self.by_canonical.get(canonical_name).copied()
    }
}

/// Lazily scanned header: the first successful scan wins, later scans return it unchanged.
#[derive(Debug, Default)]
pub struct HeaderSlot {
    header: OnceLock<ColumnHeader>,
}

impl HeaderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot already holding `header`; scans return it without looking at their cells.
    pub fn with_header(header: ColumnHeader) -> Self {
        Self {
            header: OnceLock::from(header),
        }
    }

    /// Scan `cells` unless a header is already populated.
    ///
    /// A failed scan leaves the slot empty.
    pub fn scan<S: AsRef<str>>(&self, cells: &[S]) -> IngestResult<&ColumnHeader> {
        if let Some(header) = self.header.get() {
            return Ok(header);
        }
        let scanned = ColumnHeader::from_cells(cells)?;
        Ok(self.header.get_or_init(|| scanned))
    }

    /// The scanned header, if any.
    pub fn get(&self) -> Option<&ColumnHeader> {
        self.header.get()
    }
}

/// Normalize a raw header name into a canonical column name.
///
/// Lowercases, collapses each whitespace run into a single `_`, then drops every character
/// outside `[a-z0-9_]`.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_space = false;
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_whitespace() {
            if !in_space {
                out.push('_');
                in_space = true;
            }
            continue;
        }
        in_space = false;
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_canonical(s: &str) -> bool {
        !s.is_empty()
            && s
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }

    #[test]
    fn normalize_examples() {
        assert_eq!(normalize("Nama Lengkap"), "nama_lengkap");
        assert_eq!(normalize("E-Mail #1"), "email_1");
        assert_eq!(normalize("  Tanggal \t Lahir "), "_tanggal_lahir_");
        assert_eq!(normalize("NIP/NRP"), "nipnrp");
        assert_eq!(normalize("already_ok_9"), "already_ok_9");
    }

    #[test]
    fn header_records_ordinals_in_sheet_order() {
        let h = ColumnHeader::from_cells(&["Nama", "Usia", "Kota Asal"]).unwrap();
        assert_eq!(h.len(), 3);
        assert_eq!(h.names(), vec!["nama", "usia", "kota_asal"]);
        for (i, c) in h.columns().iter().enumerate() {
            assert_eq!(c.ordinal, i);
        }
        assert_eq!(h.canonical_name("Kota Asal"), Some("kota_asal"));
        assert_eq!(h.raw_name("kota_asal"), Some("Kota Asal"));
        assert_eq!(h.ordinal("usia"), Some(1));
        assert_eq!(h.ordinal("missing"), None);
    }

    #[test]
    fn blank_column_name_is_rejected() {
        let err = ColumnHeader::from_cells(&["Nama", "   ", "Usia"]).unwrap_err();
        assert!(matches!(err, IngestError::BlankColumnName { column: 2 }));
    }

    #[test]
    fn duplicate_raw_name_is_rejected() {
        let err = ColumnHeader::from_cells(&["Nama", "Usia", "Nama"]).unwrap_err();
        match err {
            IngestError::DuplicateColumnName { name, first, second } => {
                assert_eq!(name, "Nama");
                assert_eq!((first, second), (1, 3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_names_differing_only_in_case_are_not_duplicates() {
        let h = ColumnHeader::from_cells(&["Nama", "NAMA"]).unwrap();
        assert_eq!(h.names(), vec!["nama", "nama_2"]);
    }

    #[test]
    fn unusable_names_fall_back_to_positional_names() {
        let h = ColumnHeader::from_cells(&["#", "Usia", "%%"]).unwrap();
        assert_eq!(h.names(), vec!["column_1", "usia", "column_3"]);
    }

    #[test]
    fn collision_suffix_skips_names_already_taken() {
        let h = ColumnHeader::from_cells(&["a b", "a_b_2", "A  B"]).unwrap();
        assert_eq!(h.names(), vec!["a_b", "a_b_2", "a_b_3"]);
    }

    #[test]
    fn canonical_names_are_distinct_and_well_formed() {
        let cells = [
            "Nama", "nama", "NAMA ", "E-Mail #1", "email 1", "email_1", "?", "!!", "Ümlaut",
            "x\ty", "x y", "x_y", "123", "Tgl. Lahir",
        ];
        let h = ColumnHeader::from_cells(&cells).unwrap();
        let names = h.names();
        assert_eq!(names.len(), cells.len());
        let distinct: HashSet<&String> = names.iter().collect();
        assert_eq!(distinct.len(), names.len());
        assert!(names.iter().all(|n| is_canonical(n)), "{names:?}");
    }

    #[test]
    fn slot_scan_is_idempotent() {
        let slot = HeaderSlot::new();
        assert!(slot.get().is_none());
        let first = slot.scan(&["Nama", "Usia"]).unwrap().clone();
        let second = slot.scan(&["Other", "Columns", "Entirely"]).unwrap();
        assert_eq!(&first, second);
        assert_eq!(second.len(), 2);
    }

    #[test]
    fn prefilled_slot_ignores_scanned_cells() {
        let header = ColumnHeader::from_cells(&["Nama", "Usia"]).unwrap();
        let slot = HeaderSlot::with_header(header.clone());
        assert_eq!(slot.get(), Some(&header));
        assert_eq!(slot.scan(&["", ""]).unwrap(), &header);
    }

    #[test]
    fn slot_stays_empty_after_failed_scan() {
        let slot = HeaderSlot::new();
        assert!(slot.scan(&["", "Usia"]).is_err());
        assert!(slot.get().is_none());
        assert_eq!(slot.scan(&["Usia"]).unwrap().names(), vec!["usia"]);
    }
}
