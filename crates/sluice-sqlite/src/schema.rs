//! Fixed relational schema of the load target.

use crate::LoadError;

/// One column of the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    /// Declared SQL type, including any length bound.
    pub sql_type: &'static str,
    pub primary_key: bool,
    pub not_null: bool,
}

impl ColumnDef {
    fn render(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Target table: a name and a fixed column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnDef>,
}

impl TableSchema {
    pub const DEFAULT_TABLE: &'static str = "CLEANED_DATA";

    /// The posts schema: user id, row id (the enforced key), title, body.
    pub fn cleaned_data(name: impl Into<String>) -> Result<Self, LoadError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(LoadError::InvalidTableName(name));
        }
        Ok(Self {
            name,
            columns: vec![
                ColumnDef {
                    name: "userId",
                    sql_type: "INT",
                    primary_key: false,
                    not_null: true,
                },
                ColumnDef {
                    name: "id",
                    sql_type: "INT",
                    primary_key: true,
                    not_null: true,
                },
                ColumnDef {
                    name: "title",
                    sql_type: "CHAR(79)",
                    primary_key: false,
                    not_null: false,
                },
                ColumnDef {
                    name: "body",
                    sql_type: "CHAR(225)",
                    primary_key: false,
                    not_null: false,
                },
            ],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn create_sql(&self) -> String {
        let cols: Vec<String> = self.columns.iter().map(ColumnDef::render).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            self.name,
            cols.join(", ")
        )
    }

    pub fn insert_sql(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name).collect();
        let marks: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            names.join(", "),
            marks.join(", ")
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
