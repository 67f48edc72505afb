//! The load step.
//!
//! Opening the database and creating the table are fatal. Replacing the
//! rows is best-effort: a failure there is logged, recorded in the marker,
//! and reported as a degraded outcome instead of halting the run.

use crate::loader::SqliteLoader;
use crate::schema::TableSchema;
use sluice_core::{Registry, Step, StepContext, StepDecl, StepError, StepOutcome};
use sluice_prep::{Manifest, read_table};
use std::path::PathBuf;

pub const LOAD_STEP: &str = "load";
pub const LOAD_MARKER: &str = "load_done.txt";

/// Register the load step, consuming the manifest produced by `upstream`.
pub fn register(registry: &mut Registry, upstream: &str, database: PathBuf, schema: TableSchema) {
    registry.register(LoadStep::new(upstream, database, schema));
}

pub struct LoadStep {
    decl: StepDecl,
    database: PathBuf,
    schema: TableSchema,
}

impl LoadStep {
    pub fn new(upstream: &str, database: PathBuf, schema: TableSchema) -> Self {
        Self {
            decl: StepDecl::new(LOAD_STEP, LOAD_MARKER)
                .description("Replace the target table with the prepared rows")
                .requires(upstream),
            database,
            schema,
        }
    }
}

impl Step for LoadStep {
    fn decl(&self) -> &StepDecl {
        &self.decl
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let manifest_id = ctx.sole_input()?;
        let manifest = Manifest::parse(&ctx.store.read_to_string(manifest_id)?)
            .map_err(|e| StepError::Parse(format!("{manifest_id}: {e}")))?;

        let table_id = ctx
            .store
            .identify(&manifest.table)
            .ok_or_else(|| StepError::MissingInput(manifest.table.clone()))?;
        let table = read_table(ctx.store.open_read(&table_id)?)
            .map_err(|e| StepError::Parse(format!("{table_id}: {e}")))?;

        let mut loader =
            SqliteLoader::open(&self.database, self.schema.clone()).map_err(StepError::other)?;

        let (marker, outcome) = match loader.replace(&table) {
            Ok(rows) => {
                tracing::info!(rows, table = self.schema.name(), "load finished");
                ("OK".to_string(), StepOutcome::Completed)
            }
            Err(err) => {
                tracing::error!(error = %err, table = self.schema.name(), "inserting into the target table failed");
                let reason = err.to_string();
                (format!("FAILED: {reason}"), StepOutcome::Degraded { reason })
            }
        };

        ctx.store.write_bytes(&ctx.output, marker.as_bytes())?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{ArtifactId, ArtifactStore, FsStore, RunLog, Runner, StepStatus};
    use sluice_prep::{KeySearch, MANIFEST_ARTIFACT, TRANSFORM_STEP};

    struct Seeded(StepDecl);

    impl Step for Seeded {
        fn decl(&self) -> &StepDecl {
            &self.0
        }

        fn run(&self, _ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
            Err(StepError::Failed("seeded".into()))
        }
    }

    fn pipeline(dir: &std::path::Path, raw: &str) -> (Registry, FsStore, PathBuf) {
        let store = FsStore::new(dir);
        store
            .write_bytes(&ArtifactId::new("raw.json"), raw.as_bytes())
            .unwrap();

        let database = dir.join("load.db");
        let mut registry = Registry::new();
        registry.register(Seeded(StepDecl::new("fetch", "raw.json")));
        sluice_prep::register(&mut registry, "fetch", KeySearch::default());
        register(
            &mut registry,
            TRANSFORM_STEP,
            database.clone(),
            TableSchema::cleaned_data("CLEANED_DATA").unwrap(),
        );
        (registry, store, database)
    }

    fn count_rows(database: &std::path::Path) -> i64 {
        rusqlite::Connection::open(database)
            .unwrap()
            .query_row("SELECT count(*) FROM CLEANED_DATA", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_load_writes_rows_and_ok_marker() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, store, database) = pipeline(
            dir.path(),
            r#"[{"userId":1,"id":1,"title":"a","body":"x"},
                {"userId":1,"id":2,"title":"b","body":"y"}]"#,
        );

        let report = Runner::new(&registry, &store)
            .run(LOAD_STEP, &RunLog::disabled())
            .unwrap();

        assert!(!report.is_degraded());
        assert_eq!(count_rows(&database), 2);
        assert_eq!(
            store.read_to_string(&ArtifactId::new(LOAD_MARKER)).unwrap(),
            "OK"
        );
    }

    #[test]
    fn test_insert_failure_is_degraded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // Duplicate id violates the primary key.
        let (registry, store, database) = pipeline(
            dir.path(),
            r#"[{"userId":1,"id":1,"title":"a"},{"userId":2,"id":1,"title":"b"}]"#,
        );
        let (log, buffer) = RunLog::capture(tracing::Level::INFO);

        let report = Runner::new(&registry, &store).run(LOAD_STEP, &log).unwrap();

        let last = report.steps.last().unwrap();
        assert!(matches!(last.status, StepStatus::Degraded { .. }));
        let marker = store.read_to_string(&ArtifactId::new(LOAD_MARKER)).unwrap();
        assert!(marker.starts_with("FAILED: "), "{marker}");
        assert_eq!(count_rows(&database), 0);
        assert_eq!(buffer.count_lines("inserting into the target table failed"), 1);
    }

    #[test]
    fn test_unopenable_database_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (mut registry, store, _) = pipeline(dir.path(), r#"[{"userId":1,"id":1}]"#);
        // A directory where the database file should be.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        register(
            &mut registry,
            TRANSFORM_STEP,
            blocked,
            TableSchema::cleaned_data("CLEANED_DATA").unwrap(),
        );

        let err = Runner::new(&registry, &store)
            .run(LOAD_STEP, &RunLog::disabled())
            .unwrap_err();

        assert!(matches!(err, sluice_core::RunError::StepFailed { .. }));
        assert!(!store.exists(&ArtifactId::new(LOAD_MARKER)));
        assert!(store.exists(&ArtifactId::new(MANIFEST_ARTIFACT)));
    }

    #[test]
    fn test_rerun_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, store, _) = pipeline(dir.path(), r#"[{"userId":1,"id":1}]"#);
        let runner = Runner::new(&registry, &store);

        runner.run(LOAD_STEP, &RunLog::disabled()).unwrap();
        let report = runner.run(LOAD_STEP, &RunLog::disabled()).unwrap();

        assert_eq!(report.executed(), 0);
    }
}
