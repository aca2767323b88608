//! Client configuration.
//!
//! Values are layered, later layers winning:
//! defaults → `config.toml` → environment (including `.env`) → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "https://pm.example.com/api"
//!
//! [realtime]
//! key = "app-key"
//! host = "ws.example.com"
//! port = 443
//! cluster = "eu"
//! tls = true
//! auth_endpoint = "https://pm.example.com/broadcasting/auth"
//!
//! [storage]
//! data_dir = "/var/lib/sprintboard"
//! cache_dir = "/var/cache/sprintboard"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_PUSHER_KEY: &str = "local";
pub const DEFAULT_PUSHER_HOST: &str = "127.0.0.1";
pub const DEFAULT_PUSHER_PORT: u16 = 6001;
pub const DEFAULT_PUSHER_CLUSTER: &str = "mt1";

/// Directory name used under the platform config/data/cache roots.
pub const APP_DIR: &str = "sprintboard";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
        }
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Hosted push service settings (Pusher protocol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_pusher_key")]
    pub key: String,
    /// When unset the hosted endpoint `ws-<cluster>.pusher.com` is used.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_pusher_port")]
    pub port: u16,
    #[serde(default = "default_pusher_cluster")]
    pub cluster: String,
    #[serde(default)]
    pub tls: bool,
    /// Private-channel authorization URL; derived from the API URL when unset.
    #[serde(default)]
    pub auth_endpoint: Option<String>,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            key: default_pusher_key(),
            host: Some(DEFAULT_PUSHER_HOST.to_string()),
            port: DEFAULT_PUSHER_PORT,
            cluster: default_pusher_cluster(),
            tls: false,
            auth_endpoint: None,
        }
    }
}

fn default_pusher_key() -> String {
    DEFAULT_PUSHER_KEY.to_string()
}

fn default_pusher_port() -> u16 {
    DEFAULT_PUSHER_PORT
}

fn default_pusher_cluster() -> String {
    DEFAULT_PUSHER_CLUSTER.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl ClientConfig {
    /// Default location of the config file: `<config_dir>/sprintboard/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Load the file if it exists (defaults otherwise), then apply the
    /// process environment.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref p) if p.exists() => Self::load(p)?,
            _ => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `SPRINTBOARD_*` overrides using the given lookup.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SPRINTBOARD_API_URL") {
            self.api.base_url = url;
        }
        if let Some(key) = lookup("SPRINTBOARD_PUSHER_KEY") {
            self.realtime.key = key;
        }
        if let Some(host) = lookup("SPRINTBOARD_PUSHER_HOST") {
            self.realtime.host = if host.is_empty() { None } else { Some(host) };
        }
        if let Some(port) = lookup("SPRINTBOARD_PUSHER_PORT") {
            self.realtime.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SPRINTBOARD_PUSHER_PORT".into(),
                message: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(cluster) = lookup("SPRINTBOARD_PUSHER_CLUSTER") {
            self.realtime.cluster = cluster;
        }
        if let Some(tls) = lookup("SPRINTBOARD_PUSHER_TLS") {
            self.realtime.tls = matches!(tls.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(endpoint) = lookup("SPRINTBOARD_AUTH_ENDPOINT") {
            self.realtime.auth_endpoint = Some(endpoint);
        }
        if let Some(dir) = lookup("SPRINTBOARD_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("SPRINTBOARD_CACHE_DIR") {
            self.storage.cache_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// API base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api.base_url.trim_end_matches('/')
    }

    /// Private-channel authorization endpoint.
    ///
    /// Defaults to `/broadcasting/auth` on the API origin, outside the `/api` prefix.
    pub fn auth_endpoint(&self) -> String {
        if let Some(endpoint) = &self.realtime.auth_endpoint {
            return endpoint.clone();
        }
        let base = self.api_base();
        match url::Url::parse(base) {
            Ok(url) => format!("{}/broadcasting/auth", url.origin().ascii_serialization()),
            Err(_) => format!("{}/broadcasting/auth", base),
        }
    }

    /// WebSocket URL of the push service for the configured app key.
    pub fn realtime_url(&self) -> String {
        let scheme = if self.realtime.tls { "wss" } else { "ws" };
        let host = self
            .realtime
            .host
            .clone()
            .unwrap_or_else(|| format!("ws-{}.pusher.com", self.realtime.cluster));
        format!(
            "{}://{}:{}/app/{}?protocol=7&client=sprintboard-rs&version={}&flash=false",
            scheme,
            host,
            self.realtime.port,
            self.realtime.key,
            env!("CARGO_PKG_VERSION")
        )
    }

    /// Directory holding the durable storage file.
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// Directory holding namespaced cache entries.
    pub fn cache_dir(&self) -> PathBuf {
        self.storage.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    /// Validate the configuration and return a list of problems.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => problems.push(format!(
                "api.base_url must use http or https, got '{}'",
                url.scheme()
            )),
            Err(e) => problems.push(format!("api.base_url is not a valid URL: {}", e)),
        }
        if self.realtime.key.trim().is_empty() {
            problems.push("realtime.key must not be empty".to_string());
        }
        if self.realtime.port == 0 {
            problems.push("realtime.port must be non-zero".to_string());
        }
        if self.realtime.host.is_none() && self.realtime.cluster.trim().is_empty() {
            problems.push("realtime.cluster is required when realtime.host is unset".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_local_development() {
        let config = ClientConfig::default();
        assert_eq!(config.api.base_url, DEFAULT_API_URL);
        assert_eq!(config.realtime.key, "local");
        assert_eq!(config.realtime.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.realtime.port, 6001);
        assert_eq!(config.realtime.cluster, "mt1");
        assert!(!config.realtime.tls);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let content = r#"
[api]
base_url = "https://pm.example.com/api/"

[realtime]
key = "prod-key"
"#;
        let config = ClientConfig::parse(content, Path::new("config.toml")).unwrap();
        assert_eq!(config.api_base(), "https://pm.example.com/api");
        assert_eq!(config.realtime.key, "prod-key");
        assert_eq!(config.realtime.port, DEFAULT_PUSHER_PORT);
        assert_eq!(config.realtime.cluster, DEFAULT_PUSHER_CLUSTER);
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = ClientConfig::parse("[api\nbase_url=", Path::new("/etc/sb.toml")).unwrap_err();
        assert!(err.to_string().contains("/etc/sb.toml"));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = ClientConfig::default();
        config
            .apply_env_with(env(&[
                ("SPRINTBOARD_API_URL", "https://staging.example.com/api"),
                ("SPRINTBOARD_PUSHER_PORT", "443"),
                ("SPRINTBOARD_PUSHER_TLS", "true"),
                ("SPRINTBOARD_PUSHER_HOST", ""),
                ("SPRINTBOARD_PUSHER_CLUSTER", "eu"),
            ]))
            .unwrap();
        assert_eq!(config.api.base_url, "https://staging.example.com/api");
        assert_eq!(config.realtime.port, 443);
        assert!(config.realtime.tls);
        assert!(config.realtime.host.is_none());
        assert!(config.realtime_url().starts_with("wss://ws-eu.pusher.com:443/app/local?"));
    }

    #[test]
    fn test_env_invalid_port_is_rejected() {
        let mut config = ClientConfig::default();
        let err = config
            .apply_env_with(env(&[("SPRINTBOARD_PUSHER_PORT", "sixty")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_auth_endpoint_uses_api_origin() {
        let mut config = ClientConfig::default();
        config.api.base_url = "https://pm.example.com/api".into();
        assert_eq!(config.auth_endpoint(), "https://pm.example.com/broadcasting/auth");

        config.realtime.auth_endpoint = Some("https://auth.example.com/ws".into());
        assert_eq!(config.auth_endpoint(), "https://auth.example.com/ws");
    }

    #[test]
    fn test_realtime_url_local() {
        let config = ClientConfig::default();
        let url = config.realtime_url();
        assert!(url.starts_with("ws://127.0.0.1:6001/app/local?protocol=7"));
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut config = ClientConfig::default();
        config.api.base_url = "ftp://files".into();
        config.realtime.key = " ".into();
        config.realtime.port = 0;
        let problems = config.validate();
        assert_eq!(problems.len(), 3);
    }

    #[test]
    fn test_storage_dirs_honor_overrides() {
        let mut config = ClientConfig::default();
        config.storage.data_dir = Some(PathBuf::from("/tmp/sb-data"));
        config.storage.cache_dir = Some(PathBuf::from("/tmp/sb-cache"));
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/sb-data"));
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/sb-cache"));
    }
}
