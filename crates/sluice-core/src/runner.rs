//! Runner: executes a plan, skipping steps whose output already exists.
//!
//! Execution is sequential on the calling thread. For each step in
//! dependency order the runner checks the store; present outputs are
//! skipped, absent ones are produced by running the step. Memoization is
//! the existence check itself, so a re-run after a partial failure picks up
//! where the last one stopped.

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::log::RunLog;
use crate::planner::{Plan, PlanError, Planner};
use crate::registry::Registry;
use crate::step::{StepContext, StepError, StepOutcome};
use indexmap::IndexMap;
use std::time::{Duration, Instant};

/// What happened to one step during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// Output already existed; the step was not run.
    Skipped,
    /// The step ran and produced its output.
    Completed,
    /// The step ran, wrote its output, but reported a swallowed failure.
    Degraded { reason: String },
}

/// Per-step record of a run.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub step_id: String,
    pub output: ArtifactId,
    pub status: StepStatus,
    pub duration: Duration,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Step reports, in execution order.
    pub steps: Vec<StepReport>,
    /// Total run duration.
    pub duration: Duration,
}

impl RunReport {
    /// Number of steps whose run action was invoked.
    pub fn executed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status != StepStatus::Skipped)
            .count()
    }

    /// Number of steps skipped because their output existed.
    pub fn skipped(&self) -> usize {
        self.steps.len() - self.executed()
    }

    /// Steps that finished in a degraded state.
    pub fn degraded(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Degraded { .. }))
    }

    /// True if any step swallowed a failure.
    pub fn is_degraded(&self) -> bool {
        self.degraded().next().is_some()
    }
}

/// Errors that halt a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: StepError,
    },

    #[error("step '{step}' finished without producing '{output}'")]
    OutputMissing { step: String, output: ArtifactId },
}

/// Sequential, existence-memoized pipeline runner.
pub struct Runner<'a> {
    registry: &'a Registry,
    store: &'a dyn ArtifactStore,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a Registry, store: &'a dyn ArtifactStore) -> Self {
        Self { registry, store }
    }

    /// Resolve the execution order for `terminal`.
    pub fn plan(&self, terminal: &str) -> Result<Plan, PlanError> {
        Planner::new(self.registry).plan(terminal)
    }

    /// Run `terminal` and everything it depends on.
    pub fn run(&self, terminal: &str, log: &RunLog) -> Result<RunReport, RunError> {
        let plan = self.plan(terminal)?;
        self.execute(&plan, log)
    }

    /// Execute a resolved plan.
    ///
    /// Stops at the first failing step. Outputs committed before the
    /// failure stay in place and are skipped next time.
    pub fn execute(&self, plan: &Plan, log: &RunLog) -> Result<RunReport, RunError> {
        log.in_scope(|| {
            let start = Instant::now();
            let mut report = RunReport::default();

            for planned in &plan.steps {
                let span = tracing::info_span!("step", id = %planned.step_id);
                let _enter = span.enter();
                let step_start = Instant::now();

                let status = if self.store.exists(&planned.output) {
                    tracing::debug!(output = %planned.output, "output exists, skipping");
                    StepStatus::Skipped
                } else {
                    self.run_step(&planned.step_id, log)?
                };

                report.steps.push(StepReport {
                    step_id: planned.step_id.clone(),
                    output: planned.output.clone(),
                    status,
                    duration: step_start.elapsed(),
                });
            }

            report.duration = start.elapsed();
            tracing::info!(
                executed = report.executed(),
                skipped = report.skipped(),
                degraded = report.is_degraded(),
                "run finished"
            );
            Ok(report)
        })
    }

    fn run_step(&self, id: &str, log: &RunLog) -> Result<StepStatus, RunError> {
        let step = self
            .registry
            .get(id)
            .ok_or_else(|| PlanError::UnknownStep(id.to_string()))?;
        let decl = step.decl();

        let mut inputs = IndexMap::new();
        for dep in &decl.requires {
            let dep_decl = self
                .registry
                .get_decl(dep)
                .ok_or_else(|| PlanError::UnknownDependency {
                    step: id.to_string(),
                    dependency: dep.clone(),
                })?;
            inputs.insert(dep.clone(), dep_decl.output.clone());
        }

        let ctx = StepContext {
            store: self.store,
            log,
            inputs,
            output: decl.output.clone(),
        };

        tracing::info!("running");
        let outcome = step.run(&ctx).map_err(|source| {
            tracing::error!(error = %source, "step failed");
            RunError::StepFailed {
                step: id.to_string(),
                source,
            }
        })?;

        if !self.store.exists(&decl.output) {
            return Err(RunError::OutputMissing {
                step: id.to_string(),
                output: decl.output.clone(),
            });
        }

        Ok(match outcome {
            StepOutcome::Completed => {
                tracing::info!("completed");
                StepStatus::Completed
            }
            StepOutcome::Degraded { reason } => {
                tracing::warn!(%reason, "completed in degraded state");
                StepStatus::Degraded { reason }
            }
        })
    }
}
