//! Step declarations and the trait steps implement.

use crate::artifact::{ArtifactId, ArtifactStore, StoreError};
use crate::log::RunLog;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declaration of a step's interface.
///
/// Describes what a step depends on and what it produces, without the
/// work itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecl {
    /// Unique identifier for this step.
    pub id: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Ids of upstream steps, in declaration order.
    #[serde(default)]
    pub requires: Vec<String>,
    /// The artifact whose existence marks this step as done.
    pub output: ArtifactId,
}

impl StepDecl {
    pub fn new(id: impl Into<String>, output: impl Into<ArtifactId>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            requires: Vec::new(),
            output: output.into(),
        }
    }

    /// Set the description.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Add an upstream dependency.
    pub fn requires(mut self, step_id: impl Into<String>) -> Self {
        self.requires.push(step_id.into());
        self
    }
}

/// What a step sees while running.
pub struct StepContext<'a> {
    /// Where outputs are read and written.
    pub store: &'a dyn ArtifactStore,
    /// Logging context of the current run.
    pub log: &'a RunLog,
    /// Output artifacts of the declared dependencies, keyed by step id.
    pub inputs: IndexMap<String, ArtifactId>,
    /// The artifact this step must produce.
    pub output: ArtifactId,
}

impl StepContext<'_> {
    /// Output artifact of the named dependency.
    pub fn input(&self, step_id: &str) -> Result<&ArtifactId, StepError> {
        self.inputs
            .get(step_id)
            .ok_or_else(|| StepError::MissingInput(step_id.to_string()))
    }

    /// Output artifact of the only dependency.
    pub fn sole_input(&self) -> Result<&ArtifactId, StepError> {
        match self.inputs.len() {
            1 => Ok(&self.inputs[0]),
            0 => Err(StepError::MissingInput("<none declared>".into())),
            n => Err(StepError::Failed(format!(
                "expected exactly one input, step declares {n}"
            ))),
        }
    }
}

/// How a step that did not fail finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The output was produced as intended.
    Completed,
    /// The output marker was written, but part of the work failed and was
    /// swallowed. The run carries on; callers must inspect this status.
    Degraded { reason: String },
}

/// Trait for implementing steps.
pub trait Step: Send + Sync {
    /// Get the declaration for this step.
    fn decl(&self) -> &StepDecl;

    /// Do the work and commit the declared output.
    ///
    /// Never called when the output already exists.
    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError>;
}

/// Errors a step can raise. All of them halt the run.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no input from step '{0}'")]
    MissingInput(String),

    #[error("malformed input: {0}")]
    Parse(String),

    #[error("step failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
    /// Wrap any error as `Other`.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StepError::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryStore;

    #[test]
    fn test_decl_builder() {
        let decl = StepDecl::new("transform", "manifest.txt")
            .description("Flatten and profile")
            .requires("fetch");

        assert_eq!(decl.id, "transform");
        assert_eq!(decl.requires, vec!["fetch".to_string()]);
        assert_eq!(decl.output, ArtifactId::new("manifest.txt"));
    }

    #[test]
    fn test_context_inputs() {
        let store = MemoryStore::new();
        let log = RunLog::disabled();
        let mut inputs = IndexMap::new();
        inputs.insert("fetch".to_string(), ArtifactId::new("raw.json"));

        let ctx = StepContext {
            store: &store,
            log: &log,
            inputs,
            output: ArtifactId::new("out"),
        };

        assert_eq!(ctx.input("fetch").unwrap().as_str(), "raw.json");
        assert_eq!(ctx.sole_input().unwrap().as_str(), "raw.json");
        assert!(matches!(ctx.input("load"), Err(StepError::MissingInput(_))));
    }

    #[test]
    fn test_sole_input_without_dependencies() {
        let store = MemoryStore::new();
        let log = RunLog::disabled();
        let ctx = StepContext {
            store: &store,
            log: &log,
            inputs: IndexMap::new(),
            output: ArtifactId::new("out"),
        };

        assert!(ctx.sole_input().is_err());
    }
}
