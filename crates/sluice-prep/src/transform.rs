//! The transform step: raw JSON in, table + profile + manifest out.

use crate::delimited::write_table;
use crate::keys::KeySearch;
use crate::manifest::Manifest;
use crate::profile::Profile;
use crate::table::Table;
use sluice_core::{ArtifactId, ArtifactStore, Registry, Step, StepContext, StepDecl, StepError, StepOutcome};

pub const TRANSFORM_STEP: &str = "transform";
pub const TABLE_ARTIFACT: &str = "transform_ready_data.csv";
pub const PROFILE_ARTIFACT: &str = "transform_desc_table.csv";
pub const MANIFEST_ARTIFACT: &str = "transform_manifest.txt";

/// Register the transform step, consuming the output of `upstream`.
pub fn register(registry: &mut Registry, upstream: &str, search: KeySearch) {
    registry.register(TransformStep::new(upstream, search));
}

/// Flattens the upstream JSON document, profiles it, infers primary keys.
///
/// The table and profile are committed before the manifest, so an existing
/// manifest always points at complete files.
pub struct TransformStep {
    decl: StepDecl,
    search: KeySearch,
    table: ArtifactId,
    profile: ArtifactId,
}

impl TransformStep {
    pub fn new(upstream: &str, search: KeySearch) -> Self {
        Self {
            decl: StepDecl::new(TRANSFORM_STEP, MANIFEST_ARTIFACT)
                .description("Flatten, profile and infer primary keys")
                .requires(upstream),
            search,
            table: ArtifactId::new(TABLE_ARTIFACT),
            profile: ArtifactId::new(PROFILE_ARTIFACT),
        }
    }
}

impl Step for TransformStep {
    fn decl(&self) -> &StepDecl {
        &self.decl
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let raw_id = ctx.sole_input()?;
        let raw = ctx.store.read_to_string(raw_id)?;

        let doc: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| StepError::Parse(format!("{raw_id}: {e}")))?;
        if let Some(elements) = doc.as_array() {
            tracing::debug!(elements = elements.len(), "parsed document");
            if let Some(first) = elements.first() {
                tracing::debug!(%first, "element example");
            }
        }

        let table =
            Table::from_json_value(&doc).map_err(|e| StepError::Parse(format!("{raw_id}: {e}")))?;
        tracing::info!(rows = table.n_rows(), columns = table.n_cols(), "flattened");

        let profile = Profile::of(&table);
        tracing::debug!("column profile:\n{profile}");

        let bounds = self.search.bounds();
        tracing::debug!(min = bounds.min(), max = ?bounds.max(), "searching for primary keys");
        let keys = self.search.search(&table);
        if keys.is_empty() {
            tracing::warn!("no primary key found");
        } else {
            tracing::info!(count = keys.len(), candidates = ?keys.iter().collect::<Vec<_>>(), "primary key candidates");
        }

        write_with(ctx.store, &self.table, |out| write_table(&table, out))?;
        write_with(ctx.store, &self.profile, |out| profile.write_csv(out))?;

        let manifest = Manifest {
            table: ctx.store.locate(&self.table),
            profile: ctx.store.locate(&self.profile),
            keys,
        };
        let text = manifest.render().map_err(StepError::other)?;
        ctx.store.write_bytes(&ctx.output, text.as_bytes())?;

        Ok(StepOutcome::Completed)
    }
}

fn write_with<E>(
    store: &dyn ArtifactStore,
    id: &ArtifactId,
    write: impl FnOnce(&mut dyn std::io::Write) -> Result<(), E>,
) -> Result<(), StepError>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let mut sink = store.open_write(id)?;
    write(&mut sink).map_err(StepError::other)?;
    sink.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delimited::read_table;
    use crate::keys::KeyBounds;
    use sluice_core::{MemoryStore, RunLog, RunError, Runner, StepStatus};

    const POSTS: &str = r#"[{"id":1,"userId":1,"title":"a","body":"x"},
                            {"id":2,"userId":1,"title":"b","body":"y"}]"#;

    /// Stands in for the fetch step by seeding its artifact.
    struct Seeded(StepDecl);

    impl Step for Seeded {
        fn decl(&self) -> &StepDecl {
            &self.0
        }

        fn run(&self, _ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
            Err(StepError::Failed("fetch must not run in tests".into()))
        }
    }

    fn pipeline(raw: &str) -> (Registry, MemoryStore) {
        let mut registry = Registry::new();
        registry.register(Seeded(StepDecl::new("fetch", "raw.json")));
        register(
            &mut registry,
            "fetch",
            KeySearch::new(KeyBounds::new(1, Some(3)).unwrap()),
        );
        let store = MemoryStore::new();
        store
            .write_bytes(&ArtifactId::new("raw.json"), raw.as_bytes())
            .unwrap();
        (registry, store)
    }

    #[test]
    fn test_end_to_end_artifacts() {
        let (registry, store) = pipeline(POSTS);

        let report = Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &RunLog::disabled())
            .unwrap();
        assert_eq!(report.steps[1].status, StepStatus::Completed);

        let csv = store.read_bytes(&ArtifactId::new(TABLE_ARTIFACT)).unwrap();
        let table = read_table(csv.as_slice()).unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.n_cols(), 4);

        let profile = store
            .read_to_string(&ArtifactId::new(PROFILE_ARTIFACT))
            .unwrap();
        for line in profile.lines().skip(1) {
            let missing = line.split(';').nth(3).unwrap();
            assert_eq!(missing, "0", "{line}");
        }

        let manifest = store
            .read_to_string(&ArtifactId::new(MANIFEST_ARTIFACT))
            .unwrap();
        let manifest = Manifest::parse(&manifest).unwrap();
        assert_eq!(manifest.table, format!("memory://{TABLE_ARTIFACT}"));
        assert!(manifest.keys.contains(&["id"]));
        assert!(!manifest.keys.contains(&["userId"]));
    }

    #[test]
    fn test_manifest_locations_resolve() {
        let (registry, store) = pipeline(POSTS);
        Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &RunLog::disabled())
            .unwrap();

        let text = store
            .read_to_string(&ArtifactId::new(MANIFEST_ARTIFACT))
            .unwrap();
        let manifest = Manifest::parse(&text).unwrap();
        assert_eq!(
            store.identify(&manifest.profile),
            Some(ArtifactId::new(PROFILE_ARTIFACT))
        );
    }

    #[test]
    fn test_malformed_payload_is_fatal() {
        let (registry, store) = pipeline("[{\"id\": 1,");

        let err = Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &RunLog::disabled())
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::StepFailed {
                source: StepError::Parse(_),
                ..
            }
        ));
        assert!(!store.exists(&ArtifactId::new(MANIFEST_ARTIFACT)));
        assert!(!store.exists(&ArtifactId::new(TABLE_ARTIFACT)));
    }

    #[test]
    fn test_wrong_shape_is_fatal() {
        let (registry, store) = pipeline(r#"{"id": 1}"#);
        let err = Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &RunLog::disabled())
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::StepFailed {
                source: StepError::Parse(_),
                ..
            }
        ));
    }

    #[test]
    fn test_no_key_is_not_an_error() {
        let row = r#"{"a":1,"b":"x"}"#;
        let (registry, store) = pipeline(&format!("[{row},{row}]"));

        Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &RunLog::disabled())
            .unwrap();

        let text = store
            .read_to_string(&ArtifactId::new(MANIFEST_ARTIFACT))
            .unwrap();
        assert!(text.ends_with("\n[]"));
    }

    #[test]
    fn test_logs_shape_and_first_element() {
        let (registry, store) = pipeline(POSTS);
        let (log, buffer) = RunLog::capture(tracing::Level::DEBUG);

        Runner::new(&registry, &store)
            .run(TRANSFORM_STEP, &log)
            .unwrap();

        assert_eq!(buffer.count_lines("elements=2"), 1);
        assert_eq!(buffer.count_lines("element example"), 1);
        assert_eq!(buffer.count_lines("rows=2 columns=4"), 1);
        assert_eq!(buffer.count_lines("primary key candidates"), 1);
    }
}
