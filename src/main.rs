// =============================================================================
// Regime Sentinel — Main Entry Point
// =============================================================================
//
// Loads and validates configuration (fatal on error), builds the decision
// pipeline and runs one evaluation cycle per interval until Ctrl+C.
// Decisions are applied to an in-memory paper portfolio.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod config;
mod error;
mod indicators;
mod journal;
mod market_data;
mod orchestrator;
mod portfolio;
mod regime;
mod remote;
mod risk;
mod scheduler;
mod signals;
mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::indicators::{detect_backend, IndicatorEngine};
use crate::journal::DecisionJournal;
use crate::market_data::JsonFileMarketData;
use crate::orchestrator::DecisionOrchestrator;
use crate::portfolio::PaperPortfolio;
use crate::regime::RegimeDetector;
use crate::remote::{HttpInferenceClient, RemoteInvoker};
use crate::scheduler::CycleScheduler;
use crate::signals::SignalGenerator;

const DEFAULT_CONFIG_PATH: &str = "sentinel_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Regime Sentinel starting up");

    let config_path = std::env::var("SENTINEL_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = if Path::new(&config_path).exists() {
        EngineConfig::load(&config_path)?
    } else {
        warn!(path = %config_path, "no config file found, writing defaults");
        let defaults = EngineConfig::default();
        if let Err(e) = defaults.save(&config_path) {
            warn!(error = %e, "failed to write default config");
        }
        defaults
    };

    config.apply_env().context("invalid environment override")?;
    let profile = config.validate().context("invalid configuration")?;

    info!(
        assets = ?config.assets,
        risk_level = %profile.level,
        max_position = format!("{:.4}", profile.max_position_size),
        max_aggregate = format!("{:.4}", profile.max_aggregate_risk),
        stop_loss = format!("{:.4}", profile.base_stop_loss),
        remote = config.remote.enabled,
        "configuration validated"
    );

    // ── 2. Decision pipeline ─────────────────────────────────────────────
    let remote = if config.remote.enabled {
        let client = HttpInferenceClient::new(
            config.remote.base_url.clone(),
            config.remote.model.clone(),
            config.remote.api_key.as_deref(),
            Duration::from_secs(config.remote.timeout_secs),
        )?;
        info!(model = %config.remote.model, base_url = %config.remote.base_url, "remote inference enabled");
        Some(Arc::new(RemoteInvoker::new(
            Arc::new(client),
            config.remote.retry_policy(),
            config.remote.max_concurrent,
        )))
    } else {
        info!("remote inference disabled, quant and minimal stages only");
        None
    };

    let orchestrator = DecisionOrchestrator::new(
        IndicatorEngine::new(detect_backend()),
        RegimeDetector::new(config.regime),
        SignalGenerator::new(config.weights.clone()),
        remote.clone(),
    );

    // ── 3. Collaborators ─────────────────────────────────────────────────
    let source = Arc::new(JsonFileMarketData::new(&config.data_dir, config.max_bars));
    let portfolio = Arc::new(PaperPortfolio::new(config.starting_value, profile.trailing));
    for (asset, correlation) in &config.correlations {
        portfolio.set_correlation(asset, *correlation);
    }
    let journal = Arc::new(DecisionJournal::new(config.journal_capacity));

    let scheduler = Arc::new(CycleScheduler::new(
        config.assets.clone(),
        Duration::from_secs(config.cycle_interval_secs),
        profile,
        Arc::new(orchestrator),
        source,
        portfolio.clone(),
        journal.clone(),
    ));

    // ── 4. Run until Ctrl+C ──────────────────────────────────────────────
    info!("All subsystems running. Press Ctrl+C to stop.");

    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            warn!("shutdown signal received, stopping");
        })
        .await;

    if let Some(invoker) = remote {
        info!(calls = ?invoker.snapshot(), "remote inference summary");
    }
    let state = portfolio.state();
    info!(
        open_positions = state.holdings.len(),
        aggregate_exposure = format!("{:.4}", state.aggregate_exposure()),
        decisions = journal.len(),
        "Regime Sentinel shut down complete."
    );
    Ok(())
}
