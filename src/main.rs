// =============================================================================
// SENTENCA ENGINE — JUDICIAL DECISION ACQUISITION & EXTRACTION
// =============================================================================
//
// Walks a list of CNJ case numbers through the ESAJ consultation pages of a
// Brazilian state court, downloads each case's decision PDF, extracts and
// cleans its text, isolates the decisory passage, and appends one audited
// outcome row per case to a `;`-delimited table.
//
// Slow on purpose. This runs against a public court service with real users,
// so every request passes through a global politeness gate, and the whole
// thing is resumable: kill it whenever, restart it, and it picks up exactly
// where the outcome table says it stopped.
// =============================================================================

mod config;
mod extractor;
mod fetcher;
mod locator;
mod models;
mod outcome_log;
mod pipeline;
mod politeness;
mod segmenter;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("==========================================");
    info!("  SENTENCA ENGINE starting up");
    info!("==========================================");

    let config = Arc::new(Config::from_env().context("loading configuration")?);
    info!(
        input = %config.input_list.display(),
        docs = %config.docs_dir.display(),
        outcomes = %config.outcomes_path.display(),
        politeness_ms = config.politeness_delay.as_millis() as u64,
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .context("building http client")?;

    // Ctrl-C flips the shutdown flag; the pipeline finishes the case in
    // flight and stops before starting the next one.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, finishing current case");
            let _ = shutdown_tx.send(true);
        }
    });

    let pipeline = Pipeline::new(Arc::clone(&config), client, shutdown_rx)?;
    let stats = match pipeline.run().await {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "run aborted");
            return Err(e);
        }
    };

    info!("==========================================");
    info!("  RUN COMPLETE");
    info!("  processed:            {}", stats.total);
    info!("  skipped (checkpoint): {}", stats.skipped_checkpoint);
    info!("  success:              {}", stats.success);
    info!("  sealed:               {}", stats.sealed);
    info!("  not found:            {}", stats.not_found);
    info!("  no document link:     {}", stats.no_document_link);
    info!("  fetch failed:         {}", stats.fetch_failed);
    info!("  extraction failed:    {}", stats.extraction_failed);
    info!("  segmentation failed:  {}", stats.segmentation_failed);
    info!("==========================================");

    Ok(())
}
