//! Record linkage service binary

use std::sync::Arc;

use record_linkage::api::rest::{self, AppState};
use record_linkage::config::Config;
use record_linkage::db::{self, AlgorithmStore, PgStore};
use record_linkage::models::default_algorithm;
use record_linkage::observability;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    observability::init_telemetry(&config.observability)?;

    let pool = db::create_pool(&config.database)?;
    let state = AppState::with_pg_store(PgStore::new(pool), config);

    bootstrap(&state).await?;
    rest::serve(state).await?;
    Ok(())
}

/// Startup hooks: install the built-in default algorithm when the
/// config table is empty, and reap tuning jobs abandoned by a previous
/// process
async fn bootstrap(state: &AppState) -> anyhow::Result<()> {
    let algorithms = Arc::clone(&state.algorithms);
    let stale_age = state.config.tuning.stale_job_age_secs as i64;
    let tuning = state.tuning.clone();

    tokio::task::spawn_blocking(move || -> record_linkage::Result<()> {
        if algorithms.list_algorithms()?.is_empty() {
            let algorithm = default_algorithm();
            tracing::info!(label = %algorithm.label, "installing built-in default algorithm");
            algorithms.create_algorithm(&algorithm)?;
        }
        let failed = tuning.fail_stale_jobs(stale_age)?;
        if failed > 0 {
            tracing::warn!(count = failed, "canceled incomplete tuning jobs");
        }
        Ok(())
    })
    .await??;
    Ok(())
}
