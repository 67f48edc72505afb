//! The transform step's output: where its tables went and what keys it found.
//!
//! Three lines: table location, profile location, key candidates as a JSON
//! array of arrays of column names.

use crate::keys::KeyCandidates;

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("manifest is missing its {0} line")]
    MissingLine(&'static str),

    #[error("manifest key list is not valid JSON: {0}")]
    Keys(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Location of the tabular artifact.
    pub table: String,
    /// Location of the profile artifact.
    pub profile: String,
    pub keys: KeyCandidates,
}

impl Manifest {
    pub fn render(&self) -> Result<String, ManifestError> {
        let keys: Vec<&[String]> = self.keys.iter().collect();
        Ok(format!(
            "{}\n{}\n{}",
            self.table,
            self.profile,
            serde_json::to_string(&keys)?
        ))
    }

    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut lines = text.lines().map(str::trim);
        let table = next_line(&mut lines, "table")?;
        let profile = next_line(&mut lines, "profile")?;
        let keys = lines.next().ok_or(ManifestError::MissingLine("key list"))?;
        Ok(Self {
            table,
            profile,
            keys: KeyCandidates::new(serde_json::from_str(keys)?),
        })
    }
}

fn next_line<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
    what: &'static str,
) -> Result<String, ManifestError> {
    match lines.next() {
        Some(line) if !line.is_empty() => Ok(line.to_string()),
        _ => Err(ManifestError::MissingLine(what)),
    }
}
