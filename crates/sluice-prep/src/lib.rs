//! Data preparation for Sluice.
//!
//! Flattens a JSON document into a table, profiles its columns, and infers
//! primary key candidates by exhaustive search over column subsets.
//!
//! # Features
//!
//! - `parallel` - test the subsets of each key size in parallel (rayon)

mod delimited;
mod keys;
mod manifest;
mod profile;
mod table;
mod transform;
mod value;

pub use delimited::{CsvError, DELIMITER, QUOTE, read_table, write_table};
pub use keys::{Combinations, KeyBounds, KeyBoundsError, KeyCandidates, KeySearch, is_unique};
pub use manifest::{Manifest, ManifestError};
pub use profile::{ColumnProfile, ColumnType, PROFILE_HEADER, Profile};
pub use table::{Table, TableError};
pub use transform::{
    MANIFEST_ARTIFACT, PROFILE_ARTIFACT, TABLE_ARTIFACT, TRANSFORM_STEP, TransformStep, register,
};
pub use value::{Value, ValueKey};
