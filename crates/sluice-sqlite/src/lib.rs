//! SQLite load target for Sluice.
//!
//! Replaces the contents of one fixed-schema table with the prepared rows.
//! No upsert: every load is a full replace.

mod loader;
mod schema;
mod step;

pub use loader::SqliteLoader;
pub use schema::{ColumnDef, TableSchema};
pub use step::{LOAD_MARKER, LOAD_STEP, LoadStep, register};

/// Errors from the relational store.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input has no '{0}' column, which the target table requires")]
    MissingColumn(String),

    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),
}
