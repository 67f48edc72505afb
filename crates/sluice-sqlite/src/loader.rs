//! Full-replace loader into a single SQLite table.

use crate::LoadError;
use crate::schema::TableSchema;
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use sluice_prep::{Table, Value};
use std::path::Path;

/// Owns a connection whose target table is known to exist.
pub struct SqliteLoader {
    conn: Connection,
    schema: TableSchema,
}

impl SqliteLoader {
    /// Open or create the database at `path` and ensure the table exists.
    pub fn open(path: &Path, schema: TableSchema) -> Result<Self, LoadError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "connected to database");
        Self::init(conn, schema)
    }

    /// In-memory database, for tests.
    pub fn in_memory(schema: TableSchema) -> Result<Self, LoadError> {
        Self::init(Connection::open_in_memory()?, schema)
    }

    fn init(conn: Connection, schema: TableSchema) -> Result<Self, LoadError> {
        conn.execute_batch(&schema.create_sql())?;
        Ok(Self { conn, schema })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Replace the table contents with `table`, atomically.
    ///
    /// Columns are matched by name. Required schema columns must be present
    /// in `table`; optional ones fill with NULL; extra columns are ignored.
    /// Returns the row count after the load.
    pub fn replace(&mut self, table: &Table) -> Result<usize, LoadError> {
        let mapping = self.column_mapping(table)?;

        let tx = self.conn.transaction()?;
        tx.execute(&format!("DELETE FROM {}", self.schema.name()), [])?;
        {
            let mut insert = tx.prepare(&self.schema.insert_sql())?;
            for row in table.rows() {
                let params = mapping
                    .iter()
                    .map(|idx| idx.map_or(SqlValue::Null, |i| to_sql(&row[i])));
                insert.execute(rusqlite::params_from_iter(params))?;
            }
        }
        tx.commit()?;

        self.row_count()
    }

    pub fn row_count(&self) -> Result<usize, LoadError> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {}", self.schema.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }

    fn column_mapping(&self, table: &Table) -> Result<Vec<Option<usize>>, LoadError> {
        let mut mapping = Vec::with_capacity(self.schema.columns().len());
        for col in self.schema.columns() {
            let idx = table.column_index(col.name);
            if idx.is_none() && col.not_null {
                return Err(LoadError::MissingColumn(col.name.to_string()));
            }
            mapping.push(idx);
        }

        let ignored: Vec<&str> = table
            .columns()
            .iter()
            .filter(|c| !self.schema.columns().iter().any(|d| d.name == c.as_str()))
            .map(String::as_str)
            .collect();
        if !ignored.is_empty() {
            tracing::warn!(?ignored, "columns not in the target schema are not loaded");
        }
        Ok(mapping)
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(n) => SqlValue::Integer(*n),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posts(json: &str) -> Table {
        Table::from_json(json).unwrap()
    }

    fn loader() -> SqliteLoader {
        SqliteLoader::in_memory(TableSchema::cleaned_data("CLEANED_DATA").unwrap()).unwrap()
    }

    #[test]
    fn test_replace_loads_rows() {
        let mut loader = loader();
        let table = posts(
            r#"[{"userId":1,"id":1,"title":"a","body":"x"},
                {"userId":1,"id":2,"title":"b","body":"y"}]"#,
        );

        assert_eq!(loader.replace(&table).unwrap(), 2);

        let title: String = loader
            .connection()
            .query_row("SELECT title FROM CLEANED_DATA WHERE id = 2", [], |r| r.get(0))
            .unwrap();
        assert_eq!(title, "b");
    }

    #[test]
    fn test_replace_is_full_replace() {
        let mut loader = loader();
        loader
            .replace(&posts(r#"[{"userId":1,"id":1},{"userId":1,"id":2},{"userId":1,"id":3}]"#))
            .unwrap();

        let count = loader.replace(&posts(r#"[{"userId":2,"id":9}]"#)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_duplicate_key_rolls_back() {
        let mut loader = loader();
        loader.replace(&posts(r#"[{"userId":1,"id":1}]"#)).unwrap();

        let err = loader
            .replace(&posts(r#"[{"userId":1,"id":5},{"userId":2,"id":5}]"#))
            .unwrap_err();

        assert!(matches!(err, LoadError::Sqlite(_)));
        // Previous contents survive the failed replace.
        assert_eq!(loader.row_count().unwrap(), 1);
    }

    #[test]
    fn test_missing_required_column() {
        let mut loader = loader();
        let err = loader.replace(&posts(r#"[{"id":1,"title":"a"}]"#)).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn(ref c) if c == "userId"));
    }

    #[test]
    fn test_missing_optional_column_is_null() {
        let mut loader = loader();
        loader.replace(&posts(r#"[{"userId":1,"id":1,"extra":true}]"#)).unwrap();

        let body: Option<String> = loader
            .connection()
            .query_row("SELECT body FROM CLEANED_DATA", [], |r| r.get(0))
            .unwrap();
        assert_eq!(body, None);
    }

    #[test]
    fn test_null_in_required_column_fails() {
        let mut loader = loader();
        let err = loader
            .replace(&posts(r#"[{"userId":null,"id":1}]"#))
            .unwrap_err();
        assert!(matches!(err, LoadError::Sqlite(_)));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("load.db");

        let loader =
            SqliteLoader::open(&path, TableSchema::cleaned_data("CLEANED_DATA").unwrap()).unwrap();

        assert!(path.exists());
        assert_eq!(loader.row_count().unwrap(), 0);
    }
}
