//! Reconciler configuration.

use std::time::Duration;

use cmdb_core::TenantId;

use crate::audit::DEFAULT_RESOURCE_NAME_MAX_LEN;
use crate::cache::{CacheGateway, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::context::DEFAULT_TENANT;
use crate::diff::DEFAULT_RELATION_ATTRIBUTE;

/// Tunables of the reconciliation core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Lifetime of cached instances.
    pub cache_ttl: Duration,

    /// Capacity of the in-process cache.
    pub cache_max_entries: u64,

    /// When false the cache gateway always misses.
    pub cache_enabled: bool,

    /// Single-valued relation attribute handled first-write-wins.
    pub relation_attribute: String,

    /// Maximum audited resource name length, in characters.
    pub audit_name_max_len: usize,

    /// Owner assumed when a request names none.
    pub default_tenant: TenantId,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: DEFAULT_CACHE_CAPACITY,
            cache_enabled: true,
            relation_attribute: DEFAULT_RELATION_ATTRIBUTE.to_string(),
            audit_name_max_len: DEFAULT_RESOURCE_NAME_MAX_LEN,
            default_tenant: TenantId::from(DEFAULT_TENANT),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// Lets tests supply variables without touching the process environment.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let cache_ttl_secs = parse_var(&reader, "CMDB_CACHE_TTL_SECS", DEFAULT_CACHE_TTL.as_secs())?;
        let cache_max_entries =
            parse_var(&reader, "CMDB_CACHE_MAX_ENTRIES", DEFAULT_CACHE_CAPACITY)?;
        let cache_enabled = parse_var(&reader, "CMDB_CACHE_ENABLED", true)?;

        let relation_attribute = reader("CMDB_RELATION_ATTRIBUTE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_RELATION_ATTRIBUTE.to_string());

        let audit_name_max_len = parse_var(
            &reader,
            "CMDB_AUDIT_NAME_MAX_LEN",
            DEFAULT_RESOURCE_NAME_MAX_LEN,
        )?;
        if audit_name_max_len == 0 {
            return Err(ConfigError::InvalidValue(
                "CMDB_AUDIT_NAME_MAX_LEN".into(),
                "must be greater than zero".into(),
            ));
        }

        let default_tenant = reader("CMDB_DEFAULT_TENANT")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TENANT.to_string());

        Ok(Self {
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cache_max_entries,
            cache_enabled,
            relation_attribute,
            audit_name_max_len,
            default_tenant: TenantId::from(default_tenant),
        })
    }

    /// Build the cache gateway described by this configuration.
    #[must_use]
    pub fn cache_gateway(&self) -> CacheGateway {
        if self.cache_enabled {
            CacheGateway::in_memory(self.cache_max_entries, self.cache_ttl)
        } else {
            CacheGateway::disabled()
        }
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub fn parse_var<F, T>(reader: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match reader(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    /// Create a reader closure from a HashMap (no global env mutation).
    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::from_reader(make_reader(HashMap::new())).unwrap();
        assert_eq!(config, ReconcilerConfig::default());
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_max_entries, 10_000);
        assert!(config.cache_enabled);
        assert_eq!(config.relation_attribute, "host");
        assert_eq!(config.audit_name_max_len, 256);
        assert_eq!(config.default_tenant.as_str(), "0");
    }

    #[test]
    fn test_overrides() {
        let config = ReconcilerConfig::from_reader(make_reader(HashMap::from([
            ("CMDB_CACHE_TTL_SECS", "60"),
            ("CMDB_CACHE_MAX_ENTRIES", "500"),
            ("CMDB_CACHE_ENABLED", "false"),
            ("CMDB_RELATION_ATTRIBUTE", "rack"),
            ("CMDB_AUDIT_NAME_MAX_LEN", "64"),
            ("CMDB_DEFAULT_TENANT", "tenant-a"),
        ])))
        .unwrap();

        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.cache_max_entries, 500);
        assert!(!config.cache_enabled);
        assert!(!config.cache_gateway().is_enabled());
        assert_eq!(config.relation_attribute, "rack");
        assert_eq!(config.audit_name_max_len, 64);
        assert_eq!(config.default_tenant.as_str(), "tenant-a");
    }

    #[test]
    fn test_invalid_number() {
        let err = ReconcilerConfig::from_reader(make_reader(HashMap::from([(
            "CMDB_CACHE_TTL_SECS",
            "five",
        )])))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key, _) if key == "CMDB_CACHE_TTL_SECS"));
    }

    #[test]
    fn test_zero_name_length_rejected() {
        let err = ReconcilerConfig::from_reader(make_reader(HashMap::from([(
            "CMDB_AUDIT_NAME_MAX_LEN",
            "0",
        )])))
        .unwrap_err();
        assert!(err.to_string().contains("CMDB_AUDIT_NAME_MAX_LEN"));
    }
}
