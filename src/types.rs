//! Core data model types for ingestion.
//!
//! A sheet is read as raw text [`Row`]s. The header row becomes a
//! [`crate::schema::ColumnHeader`], which describes the target [`TableSchema`]; every data row is
//! then turned into one [`InsertionTuple`].

use std::fmt::Write as _;

/// A raw sheet row: cell values rendered as text, in column order.
pub type Row = Vec<String>;

/// One fixed-shape row ready for insertion: the allocated id followed by one text value per
/// column, in canonical column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionTuple {
    /// Run-unique row identifier.
    pub id: u64,
    /// Column values; `values.len()` equals the table's column count.
    pub values: Vec<String>,
}

impl InsertionTuple {
    /// Create a tuple from an id and column values.
    pub fn new(id: u64, values: Vec<String>) -> Self {
        Self { id, values }
    }

    /// Number of bound parameters, including the id.
    pub fn width(&self) -> usize {
        self.values.len() + 1
    }
}

/// Name and ordered text columns of the target relation.
///
/// Every table also carries an implicit `id BIGINT PRIMARY KEY NOT NULL` first column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Relation name (unquoted).
    pub name: String,
    /// Canonical column names in ordinal order.
    pub columns: Vec<String>,
}

impl TableSchema {
    /// Create a table schema.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// `CREATE TABLE` statement for this schema.
    pub fn create_sql(&self) -> String {
        let mut sql = format!("CREATE TABLE {} (\n  id BIGINT PRIMARY KEY NOT NULL", quote_ident(&self.name));
        for col in &self.columns {
            let _ = write!(sql, ",\n  {} TEXT NOT NULL", quote_ident(col));
        }
        sql.push_str("\n)");
        sql
    }

    /// Parameterized `INSERT` statement binding `(id, col_1 .. col_N)`.
    pub fn insert_sql(&self) -> String {
        let cols = std::iter::once("id".to_string())
            .chain(self.columns.iter().map(|c| quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; self.columns.len() + 1].join(", ");
        format!(
            "INSERT INTO {} ({cols}) VALUES ({placeholders})",
            quote_ident(&self.name)
        )
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_sql_lists_id_then_text_columns() {
        let t = TableSchema::new("data_prajab", vec!["nama".to_string(), "usia".to_string()]);
        assert_eq!(
            t.create_sql(),
            "CREATE TABLE \"data_prajab\" (\n  id BIGINT PRIMARY KEY NOT NULL,\n  \"nama\" TEXT NOT NULL,\n  \"usia\" TEXT NOT NULL\n)"
        );
    }

    #[test]
    fn insert_sql_has_one_placeholder_per_column_plus_id() {
        let t = TableSchema::new("people", vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert_eq!(
            t.insert_sql(),
            "INSERT INTO \"people\" (id, \"a\", \"b\", \"c\") VALUES (?, ?, ?, ?)"
        );
    }

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
