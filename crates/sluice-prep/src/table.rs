//! Tabular datasets and JSON flattening.

use crate::value::Value;
use indexmap::{IndexMap, IndexSet};

/// Errors building a table.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a JSON array of objects, found {0}")]
    NotAnArray(&'static str),

    #[error("element {index} is {found}, expected an object")]
    NotAnObject { index: usize, found: &'static str },

    #[error("row {row} has {found} cells, table has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),
}

/// Named columns over a set of rows. Every row has one cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = IndexSet::new();
        for name in columns {
            let name = name.into();
            if !seen.insert(name.clone()) {
                return Err(TableError::DuplicateColumn(name));
            }
        }
        Ok(Self {
            columns: seen.into_iter().collect(),
            rows: Vec::new(),
        })
    }

    /// Append a row; its length must match the column count.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RaggedRow {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Parse a JSON document and flatten it.
    pub fn from_json(text: &str) -> Result<Self, TableError> {
        let doc: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json_value(&doc)
    }

    /// Flatten an array of objects into a table.
    ///
    /// Nested objects become dotted column names (`address.city`). Columns
    /// appear in first-seen order across all elements; keys absent from an
    /// element are missing values in its row.
    pub fn from_json_value(doc: &serde_json::Value) -> Result<Self, TableError> {
        let elements = doc
            .as_array()
            .ok_or_else(|| TableError::NotAnArray(json_kind(doc)))?;

        let mut columns = IndexSet::new();
        let mut records = Vec::with_capacity(elements.len());
        for (index, element) in elements.iter().enumerate() {
            let object = element.as_object().ok_or(TableError::NotAnObject {
                index,
                found: json_kind(element),
            })?;
            let mut record = IndexMap::new();
            flatten_into(None, object, &mut record)?;
            for name in record.keys() {
                if !columns.contains(name) {
                    columns.insert(name.clone());
                }
            }
            records.push(record);
        }

        let mut table = Table::new(columns)?;
        for mut record in records {
            let row = table
                .columns
                .iter()
                .map(|name| record.swap_remove(name).unwrap_or(Value::Null))
                .collect();
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of one column, top to bottom.
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> + Clone + '_ {
        self.rows.iter().map(move |row| &row[index])
    }
}

fn flatten_into(
    prefix: Option<&str>,
    object: &serde_json::Map<String, serde_json::Value>,
    out: &mut IndexMap<String, Value>,
) -> Result<(), TableError> {
    for (key, value) in object {
        let name = match prefix {
            Some(p) => format!("{p}.{key}"),
            None => key.clone(),
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(Some(&name), inner, out)?,
            other => {
                // A literal "a.b" key and a nested {"a": {"b": ..}} collide.
                if out.contains_key(&name) {
                    return Err(TableError::DuplicateColumn(name));
                }
                out.insert(name, Value::from_json(other));
            }
        }
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
