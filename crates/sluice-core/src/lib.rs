//! Sluice: idempotent batch pipeline engine
//!
//! A pipeline is a set of steps, each declaring its upstream steps and the
//! artifact it produces. Running a terminal step resolves its dependency
//! closure and executes only the steps whose output does not exist yet.

mod artifact;
mod log;
mod planner;
mod registry;
mod runner;
mod step;

pub use artifact::{ArtifactId, ArtifactSink, ArtifactStore, FsStore, MemoryStore, StoreError};
pub use log::{LogBuffer, LogBufferWriter, RunLog};
pub use planner::{Plan, PlanError, PlanStep, Planner};
pub use registry::Registry;
pub use runner::{RunError, RunReport, Runner, StepReport, StepStatus};
pub use step::{Step, StepContext, StepDecl, StepError, StepOutcome};
