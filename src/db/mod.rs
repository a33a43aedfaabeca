//! Database operations and connection management

use diesel::pg::PgConnection;
use diesel::r2d2::{self, ConnectionManager, Pool};

use crate::config::DatabaseConfig;
use crate::Result;

pub mod memory;
pub mod models;
pub mod repositories;
pub mod schema;

mod algorithms;
mod mpi;
mod tuning;

pub use memory::MemoryStore;
pub use repositories::{
    AlgorithmStore, MpiStore, PersonAttachment, TuningPairSample, TuningStore,
};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Create a database connection pool
pub fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(&config.url);

    Pool::builder()
        .max_size(config.max_connections)
        .min_idle(Some(config.min_connections))
        .build(manager)
        .map_err(|e| crate::Error::Pool(e.to_string()))
}

/// Diesel-backed implementation of all three store traits
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a connection; an exhausted or unreachable pool is an
    /// upstream failure
    pub(crate) fn conn(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .map_err(|e| crate::Error::Upstream(e.to_string()))
    }
}
