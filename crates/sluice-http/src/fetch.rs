//! The fetch step: one GET, body persisted as-is.

use crate::retry::Fetcher;
use sluice_core::{Registry, Step, StepContext, StepDecl, StepError, StepOutcome};

pub const FETCH_STEP: &str = "fetch";
pub const RAW_ARTIFACT: &str = "fetch_uploaded_data.json";

/// Register the fetch step for `url`.
pub fn register(registry: &mut Registry, url: impl Into<String>, fetcher: Fetcher) {
    registry.register(FetchStep::new(url, fetcher));
}

pub struct FetchStep {
    decl: StepDecl,
    url: String,
    fetcher: Fetcher,
}

impl FetchStep {
    pub fn new(url: impl Into<String>, fetcher: Fetcher) -> Self {
        Self {
            decl: StepDecl::new(FETCH_STEP, RAW_ARTIFACT).description("Download the raw JSON document"),
            url: url.into(),
            fetcher,
        }
    }
}

impl Step for FetchStep {
    fn decl(&self) -> &StepDecl {
        &self.decl
    }

    fn run(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, StepError> {
        let body = self.fetcher.fetch(&self.url).map_err(StepError::other)?;
        ctx.store.write_bytes(&ctx.output, &body)?;
        tracing::info!(url = %self.url, bytes = body.len(), "fetched payload");
        Ok(StepOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{FetchError, RetryPolicy};
    use crate::transport::{TransportError, TransportErrorKind};
    use sluice_core::{ArtifactId, ArtifactStore, MemoryStore, RunError, RunLog, Runner};

    fn registry_with(fetcher: Fetcher) -> Registry {
        let mut registry = Registry::new();
        register(&mut registry, "http://example.test/posts", fetcher);
        registry
    }

    #[test]
    fn test_body_persisted_verbatim() {
        let body = br#"[ {"id": 1} ]"#.to_vec();
        let served = body.clone();
        let fetcher = Fetcher::new(
            move |_url: &str| -> Result<Vec<u8>, TransportError> { Ok(served.clone()) },
            RetryPolicy::new(1),
        );
        let registry = registry_with(fetcher);
        let store = MemoryStore::new();
        let (log, buffer) = RunLog::capture(tracing::Level::INFO);

        Runner::new(&registry, &store).run(FETCH_STEP, &log).unwrap();

        assert_eq!(store.read_bytes(&ArtifactId::new(RAW_ARTIFACT)).unwrap(), body);
        assert_eq!(buffer.count_lines("bytes=13"), 1);
    }

    #[test]
    fn test_exhausted_fetch_halts_without_output() {
        let fetcher = Fetcher::new(
            |_url: &str| -> Result<Vec<u8>, TransportError> {
                Err(TransportError::new(TransportErrorKind::Timeout, "timed out"))
            },
            RetryPolicy::new(3).with_backoff_factor(0.0),
        );
        let registry = registry_with(fetcher);
        let store = MemoryStore::new();

        let err = Runner::new(&registry, &store)
            .run(FETCH_STEP, &RunLog::disabled())
            .unwrap_err();

        let RunError::StepFailed { source, .. } = err else {
            panic!("expected a step failure");
        };
        let StepError::Other(inner) = source else {
            panic!("expected a wrapped fetch error");
        };
        assert!(matches!(
            inner.downcast_ref::<FetchError>(),
            Some(FetchError::Exhausted { attempts: 3, .. })
        ));
        assert!(!store.exists(&ArtifactId::new(RAW_ARTIFACT)));
    }

    #[test]
    fn test_existing_raw_artifact_skips_network() {
        let fetcher = Fetcher::new(
            |_url: &str| -> Result<Vec<u8>, TransportError> {
                Err(TransportError::new(TransportErrorKind::Setup, "network disabled"))
            },
            RetryPolicy::new(1),
        );
        let registry = registry_with(fetcher);
        let store = MemoryStore::new();
        store
            .write_bytes(&ArtifactId::new(RAW_ARTIFACT), b"[]")
            .unwrap();

        let report = Runner::new(&registry, &store)
            .run(FETCH_STEP, &RunLog::disabled())
            .unwrap();
        assert_eq!(report.executed(), 0);
    }
}
