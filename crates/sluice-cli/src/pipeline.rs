use crate::config::Config;
use anyhow::{Context, Result};
use sluice_core::Registry;
use sluice_http::{FETCH_STEP, Fetcher, HttpTransport};
use sluice_prep::TRANSFORM_STEP;
use sluice_sqlite::TableSchema;

/// Assemble the fetch -> transform -> load pipeline from config.
pub fn build_registry(config: &Config) -> Result<Registry> {
    let mut registry = Registry::new();

    let transport =
        HttpTransport::new(config.timeout()).context("Failed to build the HTTP client")?;
    sluice_http::register(
        &mut registry,
        config.fetch.url.as_str(),
        Fetcher::new(transport, config.retry_policy()),
    );

    sluice_prep::register(&mut registry, FETCH_STEP, config.key_search()?);

    let schema = TableSchema::cleaned_data(config.load.table.as_str())?;
    sluice_sqlite::register(&mut registry, TRANSFORM_STEP, config.database(), schema);

    Ok(registry)
}
