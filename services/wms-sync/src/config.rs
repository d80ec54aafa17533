//! Service configuration.
//!
//! Defaults, then a YAML file or environment variables, then CLI flags.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use storage::ObjectStorageConfig;

/// Root configuration for the sync service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// SQLite URL of the resource catalog
    pub database_url: String,

    /// Where preview images are stored
    pub storage: ObjectStorageConfig,

    pub http: HttpConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://wms-sync.db".to_string(),
            storage: ObjectStorageConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Outbound HTTP settings shared by every request to a remote WMS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("wms-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl SyncConfig {
    /// Defaults overridden by `WMS_SYNC_*` environment variables.
    ///
    /// `WMS_SYNC_MEDIA_ROOT=memory` selects in-memory preview storage.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("WMS_SYNC_DATABASE_URL") {
            config.database_url = url;
        }
        if let Ok(root) = env::var("WMS_SYNC_MEDIA_ROOT") {
            config.storage = storage_for_root(&root);
        }
        if let Some(secs) = env_secs("WMS_SYNC_REQUEST_TIMEOUT") {
            config.http.request_timeout_secs = secs;
        }
        if let Some(secs) = env_secs("WMS_SYNC_CONNECT_TIMEOUT") {
            config.http.connect_timeout_secs = secs;
        }
        if let Ok(agent) = env::var("WMS_SYNC_USER_AGENT") {
            config.http.user_agent = agent;
        }

        config
    }

    /// Load from a YAML file. Missing keys keep their defaults.
    pub fn from_yaml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: SyncConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

/// Preview storage for a CLI or env value: `memory`, or a directory.
pub fn storage_for_root(root: &str) -> ObjectStorageConfig {
    if root.eq_ignore_ascii_case("memory") {
        ObjectStorageConfig::Memory
    } else {
        ObjectStorageConfig::Local {
            root: PathBuf::from(root),
        }
    }
}

fn env_secs(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.http.request_timeout(), Duration::from_secs(30));
        assert!(config.http.user_agent.starts_with("wms-sync/"));
        assert_eq!(
            config.storage,
            ObjectStorageConfig::Local {
                root: PathBuf::from("media")
            }
        );
    }

    #[test]
    fn test_from_yaml_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "database_url: \"sqlite::memory:\"\nstorage:\n  backend: memory\nhttp:\n  request_timeout_secs: 5\n"
        )
        .unwrap();

        let config = SyncConfig::from_yaml(file.path()).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.storage, ObjectStorageConfig::Memory);
        assert_eq!(config.http.request_timeout_secs, 5);
        assert_eq!(config.http.connect_timeout_secs, 10);
    }

    #[test]
    fn test_from_yaml_missing_file() {
        assert!(SyncConfig::from_yaml(Path::new("/nonexistent/wms-sync.yaml")).is_err());
    }

    #[test]
    fn test_storage_for_root() {
        assert_eq!(storage_for_root("MEMORY"), ObjectStorageConfig::Memory);
        assert_eq!(
            storage_for_root("/srv/media"),
            ObjectStorageConfig::Local {
                root: PathBuf::from("/srv/media")
            }
        );
    }
}
