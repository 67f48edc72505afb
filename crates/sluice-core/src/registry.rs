//! Registry for steps.

use crate::step::{Step, StepDecl};
use indexmap::IndexMap;
use std::sync::Arc;

/// Registry of the steps a pipeline is made of.
///
/// Steps are declared statically before anything runs. Registering a step
/// with an id that is already present replaces the earlier one.
#[derive(Clone, Default)]
pub struct Registry {
    steps: IndexMap<String, Arc<dyn Step>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step.
    pub fn register(&mut self, step: impl Step + 'static) {
        let id = step.decl().id.clone();
        self.steps.insert(id, Arc::new(step));
    }

    /// Get a step by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Step>> {
        self.steps.get(id).cloned()
    }

    /// Get a step declaration by ID.
    pub fn get_decl(&self, id: &str) -> Option<&StepDecl> {
        self.steps.get(id).map(|s| s.decl())
    }

    /// Iterate over all declarations, in registration order.
    pub fn declarations(&self) -> impl Iterator<Item = &StepDecl> {
        self.steps.values().map(|s| s.decl())
    }

    /// Steps nothing else depends on.
    pub fn terminals(&self) -> Vec<&str> {
        self.steps
            .keys()
            .filter(|id| !self.declarations().any(|d| d.requires.contains(id)))
            .map(|id| id.as_str())
            .collect()
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{StepContext, StepError, StepOutcome};

    struct Noop(StepDecl);

    impl Step for Noop {
        fn decl(&self) -> &StepDecl {
            &self.0
        }

        fn run(&self, _ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
            Ok(StepOutcome::Completed)
        }
    }

    fn make_test_registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(Noop(StepDecl::new("fetch", "raw.json")));
        registry.register(Noop(
            StepDecl::new("transform", "manifest.txt").requires("fetch"),
        ));
        registry.register(Noop(StepDecl::new("load", "done.txt").requires("transform")));
        registry
    }

    #[test]
    fn test_get_decl() {
        let registry = make_test_registry();

        assert!(registry.get_decl("transform").is_some());
        assert!(registry.get_decl("nonexistent").is_none());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_declaration_order() {
        let registry = make_test_registry();
        let ids: Vec<_> = registry.declarations().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["fetch", "transform", "load"]);
    }

    #[test]
    fn test_terminals() {
        let registry = make_test_registry();
        assert_eq!(registry.terminals(), vec!["load"]);
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = make_test_registry();
        registry.register(Noop(StepDecl::new("fetch", "other.json")));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get_decl("fetch").unwrap().output.as_str(), "other.json");
    }
}
