//! Persistent CLI configuration at `~/.fpt/config.json`.
//!
//! The file is optional: a missing file yields defaults, and an unreadable or
//! malformed one is logged and treated as missing. Environment variables
//! (`FPT_PROJECT`, `FPT_PORT`, `FPT_STORE_URL`) and CLI flags override file
//! values; the binary merges all three into the server configuration. Nothing
//! in the query, inference or export pipeline reads this file.

use crate::Result;
use crate::error::{FptError, redact_store_url};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 4011;

/// Default bind address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const CONFIG_DIR: &str = ".fpt";
const CONFIG_FILE: &str = "config.json";

/// Contents of the config file.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FptConfig {
    /// Project id; names the database when the store URL does not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// HTTP port
    pub port: u16,
    /// Bind address
    pub server_host: String,
    /// Store URL (`mongodb://…` or `memory://`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_url: Option<String>,
    /// Whether the gated write endpoints accept requests
    pub write_enabled: bool,
    /// Shared secret for the write endpoints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_token: Option<String>,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Rows fetched per store round trip during export
    pub export_page_size: u32,
}

impl Default for FptConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            port: DEFAULT_PORT,
            server_host: DEFAULT_HOST.to_string(),
            store_url: None,
            write_enabled: false,
            write_token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            export_page_size: crate::export::DEFAULT_EXPORT_PAGE_SIZE,
        }
    }
}

impl std::fmt::Debug for FptConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FptConfig")
            .field("project_id", &self.project_id)
            .field("port", &self.port)
            .field("server_host", &self.server_host)
            .field("store_url", &self.store_url.as_deref().map(redact_store_url))
            .field("write_enabled", &self.write_enabled)
            .field("has_write_token", &self.write_token.is_some())
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("export_page_size", &self.export_page_size)
            .finish()
    }
}

impl FptConfig {
    /// `~/.fpt/config.json`.
    ///
    /// # Errors
    /// Fails when the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or_else(|| FptError::configuration("Could not determine home directory"))
    }

    /// Loads the config from the default location.
    pub async fn load() -> Self {
        match Self::default_path() {
            Ok(path) => Self::load_from(&path).await,
            Err(e) => {
                tracing::warn!("{}, using default configuration", e);
                Self::default()
            }
        }
    }

    /// Loads the config from `path`, falling back to defaults.
    pub async fn load_from(path: &Path) -> Self {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Failed to read config file: {}", e);
                return Self::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring malformed config file: {}", e);
                Self::default()
            }
        }
    }

    /// Writes the config as pretty JSON, creating parent directories.
    ///
    /// On Unix the file is made owner-readable only, since it may hold the
    /// write token.
    ///
    /// # Errors
    /// Fails when the directory or file cannot be written.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FptError::Io {
                    context: format!("Failed to create {}", parent.display()),
                    source,
                })?;
        }

        let mut json =
            serde_json::to_string_pretty(self).map_err(|source| FptError::Serialization {
                context: "config file".to_string(),
                source,
            })?;
        json.push('\n');

        tokio::fs::write(path, json)
            .await
            .map_err(|source| FptError::Io {
                context: format!("Failed to write {}", path.display()),
                source,
            })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|source| FptError::Io {
                    context: format!("Failed to restrict permissions on {}", path.display()),
                    source,
                })?;
        }

        Ok(())
    }

    /// Applies `FPT_PROJECT`, `FPT_PORT` and `FPT_STORE_URL` from the process
    /// environment.
    ///
    /// # Errors
    /// Fails when `FPT_PORT` is not a valid port.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    /// Fails when `FPT_PORT` is not a valid port.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = get("FPT_PROJECT") {
            self.project_id = Some(project);
        }
        if let Some(port) = get("FPT_PORT") {
            self.port = port
                .trim()
                .parse()
                .ok()
                .filter(|p: &u16| *p > 0)
                .ok_or_else(|| {
                    FptError::configuration(format!("FPT_PORT must be a port number, got '{}'", port))
                })?;
        }
        if let Some(url) = get("FPT_STORE_URL") {
            self.store_url = Some(url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FptConfig::load_from(&dir.path().join("config.json")).await;
        assert_eq!(config, FptConfig::default());
        assert_eq!(config.port, 4011);
        assert_eq!(config.server_host, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();
        assert_eq!(FptConfig::load_from(&path).await, FptConfig::default());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"projectId": "demo", "port": 5000}"#)
            .await
            .unwrap();
        let config = FptConfig::load_from(&path).await;
        assert_eq!(config.project_id.as_deref(), Some("demo"));
        assert_eq!(config.port, 5000);
        assert_eq!(config.export_page_size, 500);
        assert!(!config.write_enabled);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = FptConfig {
            project_id: Some("demo".to_string()),
            write_enabled: true,
            write_token: Some("tok".to_string()),
            ..FptConfig::default()
        };
        config.save_to(&path).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.ends_with('\n'));
        assert!(raw.contains("\"writeEnabled\": true"));
        assert_eq!(FptConfig::load_from(&path).await, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FptConfig::default();
        config
            .apply_env_with(env(&[
                ("FPT_PROJECT", "from-env"),
                ("FPT_PORT", "4999"),
                ("FPT_STORE_URL", "memory://"),
            ]))
            .unwrap();
        assert_eq!(config.project_id.as_deref(), Some("from-env"));
        assert_eq!(config.port, 4999);
        assert_eq!(config.store_url.as_deref(), Some("memory://"));

        let mut untouched = FptConfig::default();
        untouched.apply_env_with(env(&[("FPT_PROJECT", "  ")])).unwrap();
        assert_eq!(untouched, FptConfig::default());
    }

    #[test]
    fn test_bad_port_env_fails_closed() {
        let mut config = FptConfig::default();
        for bad in ["http", "0", "70000"] {
            let err = config
                .apply_env_with(env(&[("FPT_PORT", bad)]))
                .unwrap_err();
            assert!(err.to_string().contains("FPT_PORT"));
        }
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = FptConfig {
            store_url: Some("mongodb://u:pw123@h/db".to_string()),
            write_token: Some("tok-secret".to_string()),
            ..FptConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("pw123"));
        assert!(!debug.contains("tok-secret"));
    }
}
