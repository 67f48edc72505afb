//! Column profiling: type, text width, missing and distinct counts.

use crate::delimited::{CsvError, writer};
use crate::table::Table;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::io::Write;

/// Semantic type of a column, inferred from its non-missing cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    Text,
    /// Cells of more than one kind.
    Mixed,
    /// Every cell is missing.
    Empty,
}

impl ColumnType {
    pub fn infer<'a>(cells: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut ty = ColumnType::Empty;
        for cell in cells {
            let cell_ty = match cell {
                Value::Null => continue,
                Value::Bool(_) => ColumnType::Boolean,
                Value::Int(_) => ColumnType::Integer,
                Value::Float(_) => ColumnType::Float,
                Value::String(_) => ColumnType::Text,
            };
            ty = match (ty, cell_ty) {
                (ColumnType::Empty, t) => t,
                (a, b) if a == b => a,
                (ColumnType::Integer, ColumnType::Float) | (ColumnType::Float, ColumnType::Integer) => {
                    ColumnType::Float
                }
                _ => ColumnType::Mixed,
            };
        }
        ty
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Text => "text",
            ColumnType::Mixed => "mixed",
            ColumnType::Empty => "empty",
        }
    }

    fn holds_text(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Mixed)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive statistics of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub column_type: ColumnType,
    /// Longest string cell, in characters. Only for columns holding text.
    pub char_length: Option<usize>,
    pub missing: usize,
    /// Distinct non-missing values.
    pub distinct: usize,
}

impl ColumnProfile {
    pub fn of<'a>(name: &str, cells: impl Iterator<Item = &'a Value> + Clone) -> Self {
        let column_type = ColumnType::infer(cells.clone());
        let char_length = if column_type.holds_text() {
            cells
                .clone()
                .filter_map(Value::as_str)
                .map(|s| s.chars().count())
                .max()
        } else {
            None
        };

        let mut missing = 0;
        let mut seen = HashSet::new();
        for cell in cells {
            if cell.is_null() {
                missing += 1;
            } else {
                seen.insert(cell.key());
            }
        }

        Self {
            name: name.to_string(),
            column_type,
            char_length,
            missing,
            distinct: seen.len(),
        }
    }
}

/// Profile of every column of a table, in column order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    pub columns: Vec<ColumnProfile>,
}

pub const PROFILE_HEADER: [&str; 5] = ["", "columnType", "CharLength", "missingsNum", "uniqueValsNum"];

impl Profile {
    pub fn of(table: &Table) -> Self {
        let columns = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, name)| ColumnProfile::of(name, table.column(i)))
            .collect();
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Write the profile as a delimited table keyed by column name.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<(), CsvError> {
        let mut wtr = writer(out);
        wtr.write_record(PROFILE_HEADER)?;
        for col in &self.columns {
            wtr.write_record([
                col.name.clone(),
                col.column_type.to_string(),
                col.char_length.map(|n| n.to_string()).unwrap_or_default(),
                col.missing.to_string(),
                col.distinct.to_string(),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl fmt::Display for Profile {
    /// Aligned text rendering for logs and the terminal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .columns
            .iter()
            .map(|c| c.name.chars().count())
            .max()
            .unwrap_or(0)
            .max(6);
        writeln!(
            f,
            "{:width$}  {:>10}  {:>10}  {:>11}  {:>13}",
            "column", "columnType", "CharLength", "missingsNum", "uniqueValsNum"
        )?;
        for col in &self.columns {
            let chars = col.char_length.map(|n| n.to_string()).unwrap_or_default();
            writeln!(
                f,
                "{:width$}  {:>10}  {:>10}  {:>11}  {:>13}",
                col.name, col.column_type.as_str(), chars, col.missing, col.distinct
            )?;
        }
        Ok(())
    }
}
