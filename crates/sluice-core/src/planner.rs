//! Planning: resolve a terminal step into an execution order.
//!
//! Depth-first over declared dependencies: every dependency is placed
//! before its dependents, each step appears once even when several
//! dependents share it, and the terminal step comes last.

use crate::artifact::ArtifactId;
use crate::registry::Registry;
use indexmap::IndexSet;

/// A resolved execution order.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Steps in dependency order; the terminal step is last.
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// The step whose completion implies pipeline completion.
    pub fn terminal(&self) -> Option<&PlanStep> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// A single step in a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    /// Step ID.
    pub step_id: String,
    /// Direct dependencies, in declaration order.
    pub requires: Vec<String>,
    /// Artifact the step produces.
    pub output: ArtifactId,
}

/// Errors found while resolving the dependency graph.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlanError {
    #[error("step not registered: {0}")]
    UnknownStep(String),

    #[error("step '{step}' requires unregistered step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Planner for resolving step dependencies.
pub struct Planner<'a> {
    registry: &'a Registry,
}

impl<'a> Planner<'a> {
    /// Create a new planner with the given registry.
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Resolve `terminal` and its transitive dependency closure.
    pub fn plan(&self, terminal: &str) -> Result<Plan, PlanError> {
        if self.registry.get_decl(terminal).is_none() {
            return Err(PlanError::UnknownStep(terminal.to_string()));
        }

        let mut placed = IndexSet::new();
        let mut path = Vec::new();
        let mut steps = Vec::new();
        self.visit(terminal, &mut path, &mut placed, &mut steps)?;

        Ok(Plan { steps })
    }

    fn visit(
        &self,
        id: &str,
        path: &mut Vec<String>,
        placed: &mut IndexSet<String>,
        steps: &mut Vec<PlanStep>,
    ) -> Result<(), PlanError> {
        if placed.contains(id) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|p| p == id) {
            let mut cycle = path[start..].to_vec();
            cycle.push(id.to_string());
            return Err(PlanError::Cycle(cycle));
        }

        let decl = self
            .registry
            .get_decl(id)
            .ok_or_else(|| PlanError::UnknownStep(id.to_string()))?;

        path.push(id.to_string());
        for dep in &decl.requires {
            if self.registry.get_decl(dep).is_none() {
                return Err(PlanError::UnknownDependency {
                    step: id.to_string(),
                    dependency: dep.clone(),
                });
            }
            self.visit(dep, path, placed, steps)?;
        }
        path.pop();

        placed.insert(id.to_string());
        steps.push(PlanStep {
            step_id: id.to_string(),
            requires: decl.requires.clone(),
            output: decl.output.clone(),
        });
        Ok(())
    }
}
