//! Application state for the REST API

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::repositories::{AlgorithmStore, MpiStore, TuningStore};
use crate::db::{MemoryStore, PgStore};
use crate::tuning::TuningRunner;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Master Patient Index store
    pub mpi: Arc<dyn MpiStore>,

    /// Algorithm configuration store
    pub algorithms: Arc<dyn AlgorithmStore>,

    /// Tuning job runner
    pub tuning: Arc<TuningRunner>,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create application state over explicit store implementations
    pub fn new(
        mpi: Arc<dyn MpiStore>,
        algorithms: Arc<dyn AlgorithmStore>,
        tuning_store: Arc<dyn TuningStore>,
        config: Config,
    ) -> Self {
        let tuning = TuningRunner::new(
            Arc::clone(&mpi),
            tuning_store,
            Arc::clone(&algorithms),
            Duration::from_secs(config.tuning.job_timeout_secs),
        );
        Self {
            mpi,
            algorithms,
            tuning: Arc::new(tuning),
            config: Arc::new(config),
        }
    }

    /// State backed by the Diesel store
    pub fn with_pg_store(store: PgStore, config: Config) -> Self {
        let store = Arc::new(store);
        Self::new(
            Arc::clone(&store) as Arc<dyn MpiStore>,
            Arc::clone(&store) as Arc<dyn AlgorithmStore>,
            store as Arc<dyn TuningStore>,
            config,
        )
    }

    /// State backed by the in-memory store (tests, local development)
    pub fn with_memory_store(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(
            Arc::clone(&store) as Arc<dyn MpiStore>,
            Arc::clone(&store) as Arc<dyn AlgorithmStore>,
            store as Arc<dyn TuningStore>,
            config,
        )
    }
}
