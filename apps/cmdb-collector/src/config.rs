//! Collector configuration loaded from environment variables.
//!
//! `DATABASE_URL` is required; everything else has a default. Reconciler
//! tunables (`CMDB_CACHE_*`, `CMDB_RELATION_ATTRIBUTE`, ...) are read by
//! [`ReconcilerConfig::from_reader`].

use std::env::VarError;

use cmdb_db::pool::DEFAULT_MAX_CONNECTIONS;
use cmdb_reconcile::config::parse_var;
use cmdb_reconcile::{ConfigError, ReconcilerConfig};

use crate::logging::DEFAULT_FILTER;

/// Default number of concurrently reconciled messages.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;

/// Default capacity of the inbound message queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub worker_concurrency: usize,
    pub queue_capacity: usize,
    /// Apply embedded migrations at startup.
    pub run_migrations: bool,
    pub log_filter: String,
    pub reconciler: ReconcilerConfig,
}

impl CollectorConfig {
    /// Load configuration from the process environment, after `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let database_url = reader("DATABASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".into()))?;

        let db_max_connections =
            parse_var(&reader, "CMDB_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let worker_concurrency =
            parse_var(&reader, "CMDB_WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY)?;
        if worker_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "CMDB_WORKER_CONCURRENCY".into(),
                "must be at least 1".into(),
            ));
        }
        let queue_capacity = parse_var(&reader, "CMDB_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?;
        if queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "CMDB_QUEUE_CAPACITY".into(),
                "must be at least 1".into(),
            ));
        }
        let run_migrations = parse_var(&reader, "CMDB_RUN_MIGRATIONS", true)?;
        let log_filter = reader("CMDB_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());

        Ok(Self {
            database_url,
            db_max_connections,
            worker_concurrency,
            queue_capacity,
            run_migrations,
            log_filter,
            reconciler: ReconcilerConfig::from_reader(&reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_database_url_required() {
        let err = CollectorConfig::from_reader(make_reader(HashMap::new())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(ref key) if key == "DATABASE_URL"));
    }

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::from_reader(make_reader(HashMap::from([(
            "DATABASE_URL",
            "postgres://localhost/cmdb",
        )])))
        .unwrap();

        assert_eq!(config.db_max_connections, 10);
        assert_eq!(config.worker_concurrency, 4);
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.run_migrations);
        assert_eq!(config.log_filter, DEFAULT_FILTER);
        assert_eq!(config.reconciler, ReconcilerConfig::default());
    }

    #[test]
    fn test_overrides_reach_reconciler() {
        let config = CollectorConfig::from_reader(make_reader(HashMap::from([
            ("DATABASE_URL", "postgres://localhost/cmdb"),
            ("CMDB_WORKER_CONCURRENCY", "16"),
            ("CMDB_RUN_MIGRATIONS", "false"),
            ("CMDB_CACHE_ENABLED", "false"),
        ])))
        .unwrap();

        assert_eq!(config.worker_concurrency, 16);
        assert!(!config.run_migrations);
        assert!(!config.reconciler.cache_enabled);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let err = CollectorConfig::from_reader(make_reader(HashMap::from([
            ("DATABASE_URL", "postgres://localhost/cmdb"),
            ("CMDB_WORKER_CONCURRENCY", "0"),
        ])))
        .unwrap_err();
        assert!(err.to_string().contains("CMDB_WORKER_CONCURRENCY"));
    }
}
