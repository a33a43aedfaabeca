//! Configuration management for the record linkage service

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Matching configuration
    pub matching: MatchingConfig,

    /// Tuning configuration
    pub tuning: TuningConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Algorithm label used when a link request names none
    pub default_algorithm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningConfig {
    /// Seconds a tuning job may run before being failed
    pub job_timeout_secs: u64,

    /// Age in seconds after which an unfinished job is considered abandoned
    pub stale_job_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub service_name: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/record_linkage".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            matching: MatchingConfig {
                default_algorithm: "dibbs-default".to_string(),
            },
            tuning: TuningConfig {
                job_timeout_secs: 3600,
                stale_job_age_secs: 60 * 60 * 24,
            },
            observability: ObservabilityConfig {
                service_name: "record-linkage".to_string(),
                log_level: "info".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Ok(host) = std::env::var("RL_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("RL_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| crate::Error::Config(format!("invalid RL_PORT: {port}")))?;
        }
        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(max) = std::env::var("RL_DB_MAX_CONNECTIONS") {
            config.database.max_connections = max
                .parse()
                .map_err(|_| crate::Error::Config(format!("invalid RL_DB_MAX_CONNECTIONS: {max}")))?;
        }
        if let Ok(label) = std::env::var("RL_DEFAULT_ALGORITHM") {
            config.matching.default_algorithm = label;
        }
        if let Ok(secs) = std::env::var("RL_TUNING_JOB_TIMEOUT") {
            config.tuning.job_timeout_secs = secs
                .parse()
                .map_err(|_| crate::Error::Config(format!("invalid RL_TUNING_JOB_TIMEOUT: {secs}")))?;
        }
        if let Ok(level) = std::env::var("RL_LOG_LEVEL") {
            config.observability.log_level = level;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.matching.default_algorithm, "dibbs-default");
        assert!(config.tuning.job_timeout_secs > 0);
    }
}
