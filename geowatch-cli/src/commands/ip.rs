//! `geowatch ip` - locate this machine through the IP fallback.

use std::sync::Arc;

use geowatch::config::GeowatchConfig;
use geowatch::fallback::ReqwestFetcher;
use geowatch::reading::PositionReport;
use tracing::info;

use crate::error::CliError;

/// Query the configured endpoints and print the resulting report as JSON.
pub fn run(config: &GeowatchConfig) -> Result<(), CliError> {
    let fetcher = ReqwestFetcher::with_timeout(config.fallback.timeout)?;
    let fallback = config
        .fallback
        .build(Arc::new(fetcher))
        .ok_or(CliError::FallbackDisabled)?;

    info!(
        endpoints = fallback.endpoints().len(),
        "Querying IP location endpoints"
    );

    let runtime = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let reading = runtime
        .block_on(fallback.locate())
        .ok_or(CliError::IpLocationFailed)?;

    println!("{}", PositionReport::from(&reading).to_json()?);
    Ok(())
}
