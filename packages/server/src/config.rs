//! Runtime server configuration
//!
//! `AppConfig` is the single source of truth for what the running process
//! uses. It is read from environment variables once at startup and never
//! changes afterwards.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tailorspace_core::ChildPolicy;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_IMAGE_BUCKET: &str = "catalog-images";
pub const DEFAULT_IMAGE_PUBLIC_URL: &str = "http://localhost:5000/images";
pub const DEFAULT_IMAGE_URL_TTL_SECS: u64 = 3600;

/// Startup configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },

    #[error("Failed to get home directory")]
    NoHomeDirectory,
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            var,
            reason: reason.to_string(),
        }
    }
}

/// Directory-backed image storage settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImageStoreConfig {
    pub dir: PathBuf,
    pub bucket: String,
    pub public_url: String,
    pub url_ttl: Duration,
}

/// Runtime configuration of the catalog server
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// libsql database file
    pub database_path: PathBuf,

    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,

    /// `None` disables uploads and serves stored references unchanged
    pub image_store: Option<ImageStoreConfig>,

    /// How reconciliation treats existing children a document omits
    pub child_policy: ChildPolicy,
}

impl AppConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_path = match var("DATABASE_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_database_path()?,
        };

        let port = match var("SERVER_PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("SERVER_PORT", e))?,
            None => DEFAULT_PORT,
        };

        let cors_origins = var("CORS_ALLOW_ORIGIN")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let image_store = match var("IMAGE_STORE_DIR") {
            Some(dir) => {
                let ttl_secs = match var("IMAGE_URL_TTL_SECS") {
                    Some(ttl) => ttl
                        .parse::<u64>()
                        .map_err(|e| ConfigError::invalid("IMAGE_URL_TTL_SECS", e))?,
                    None => DEFAULT_IMAGE_URL_TTL_SECS,
                };
                Some(ImageStoreConfig {
                    dir: PathBuf::from(dir),
                    bucket: var("IMAGE_BUCKET").unwrap_or_else(|| DEFAULT_IMAGE_BUCKET.to_string()),
                    public_url: var("IMAGE_PUBLIC_URL")
                        .unwrap_or_else(|| DEFAULT_IMAGE_PUBLIC_URL.to_string()),
                    url_ttl: Duration::from_secs(ttl_secs),
                })
            }
            None => None,
        };

        let child_policy = match var("RECONCILE_CHILD_POLICY") {
            Some(policy) => ChildPolicy::from_str(&policy)
                .map_err(|e| ConfigError::invalid("RECONCILE_CHILD_POLICY", e))?,
            None => ChildPolicy::default(),
        };

        Ok(Self {
            database_path,
            host: var("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            cors_origins,
            image_store,
            child_policy,
        })
    }

    /// Defaults around an explicit database file, used by tests and tools
    pub fn for_database(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            image_store: None,
            child_policy: ChildPolicy::default(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Default: ~/.tailorspace/catalog.db
fn default_database_path() -> Result<PathBuf, ConfigError> {
    let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(home_dir.join(".tailorspace").join("catalog.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("DATABASE_PATH", "/tmp/catalog.db")]).unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/catalog.db"));
        assert_eq!(config.bind_address(), "127.0.0.1:5000");
        assert!(config.cors_origins.is_empty());
        assert!(config.image_store.is_none());
        assert_eq!(config.child_policy, ChildPolicy::Additive);
    }

    #[test]
    fn test_image_store_settings() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/catalog.db"),
            ("IMAGE_STORE_DIR", "/var/lib/tailorspace/images"),
            ("IMAGE_URL_TTL_SECS", "60"),
        ])
        .unwrap();

        let store = config.image_store.unwrap();
        assert_eq!(store.dir, PathBuf::from("/var/lib/tailorspace/images"));
        assert_eq!(store.bucket, DEFAULT_IMAGE_BUCKET);
        assert_eq!(store.public_url, DEFAULT_IMAGE_PUBLIC_URL);
        assert_eq!(store.url_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_cors_origins_are_split() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/catalog.db"),
            ("CORS_ALLOW_ORIGIN", "http://localhost:5173, https://shop.example.com,"),
        ])
        .unwrap();

        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:5173", "https://shop.example.com"]
        );
    }

    #[test]
    fn test_child_policy_and_port() {
        let config = config_from(&[
            ("DATABASE_PATH", "/tmp/catalog.db"),
            ("SERVER_PORT", "8080"),
            ("SERVER_HOST", "0.0.0.0"),
            ("RECONCILE_CHILD_POLICY", "replace"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.child_policy, ChildPolicy::Replace);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_port = config_from(&[("DATABASE_PATH", "/tmp/a.db"), ("SERVER_PORT", "http")]);
        assert!(matches!(
            bad_port,
            Err(ConfigError::InvalidValue { var: "SERVER_PORT", .. })
        ));

        let bad_policy = config_from(&[
            ("DATABASE_PATH", "/tmp/a.db"),
            ("RECONCILE_CHILD_POLICY", "merge"),
        ]);
        assert!(matches!(
            bad_policy,
            Err(ConfigError::InvalidValue {
                var: "RECONCILE_CHILD_POLICY",
                ..
            })
        ));
    }
}
