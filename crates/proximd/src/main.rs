//! proximd — runs two in-process sessions over a loopback medium.
//!
//! The advertiser and the discoverer each get a `ClientSession` and a tokio
//! task. They find each other, shake hands, exchange one payload, and hang
//! up; both session snapshots are then printed as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};

use proxim_core::config::ProximConfig;
use proxim_session::ClientSession;

mod loopback;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = ProximConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = ProximConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        ProximConfig::default()
    });

    let advertiser = Arc::new(ClientSession::from_config(&config));
    let discoverer = Arc::new(ClientSession::from_config(&config));
    tracing::info!(
        service_id = %config.loopback.service_id,
        advertiser = advertiser.client_id(),
        discoverer = discoverer.client_id(),
        cancellation = config.features.enable_cancellation_flag,
        "proximd starting"
    );

    loopback::run(&config.loopback, advertiser.clone(), discoverer.clone())
        .await
        .context("loopback exchange failed")?;

    for session in [&advertiser, &discoverer] {
        let snapshot = serde_json::to_string_pretty(&session.snapshot())
            .context("failed to encode session snapshot")?;
        println!("{snapshot}");
    }

    advertiser.reset();
    discoverer.reset();
    tracing::info!("proximd done");
    Ok(())
}
