//! Configuration ingestion (spec §6): a file (JSON/TOML/YAML, detected by
//! extension) plus `HYBRIDSERVER_`-prefixed environment overrides, falling
//! back to built-in defaults when no file is found.

use std::str::FromStr;

use config::{Config, File};
use serde::{Deserialize, Serialize};
use url::Url;

/// One federated peer (spec's `ServerConfiguration`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PeerConfig {
    /// Unique within the mesh; used to break result ordering ties and as
    /// the "local first, peers alphabetical" sort key for listings.
    pub name: String,
    pub rpc_endpoint: Url,
    pub rpc_namespace: String,
    pub service_name: String,
    pub http_base: Url,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GlobalConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_num_clients")]
    pub num_clients: usize,
    #[serde(default = "default_stop_wait_seconds")]
    pub stop_wait_seconds: u64,
    #[serde(default)]
    pub db_url: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub web_service_url: Option<Url>,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_port() -> u16 {
    8888
}

fn default_num_clients() -> usize {
    50
}

fn default_stop_wait_seconds() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            num_clients: 50,
            stop_wait_seconds: 5,
            db_url: None,
            db_user: None,
            db_password: None,
            web_service_url: None,
            peers: Vec::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GlobalConfig {
    /// Loads configuration from `config_path` if given, falling back to
    /// built-in defaults if the path is absent. Environment variables
    /// prefixed `HYBRIDSERVER_` (e.g. `HYBRIDSERVER_PORT`) always take
    /// priority over file values, matching the teacher's `ConfigFile`
    /// loading pattern.
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        let mut builder = Config::builder()
            .set_default("port", i64::from(Self::default().port))
            .map_err(|e| e.to_string())?
            .set_default("num_clients", Self::default().num_clients as i64)
            .map_err(|e| e.to_string())?
            .set_default("stop_wait_seconds", Self::default().stop_wait_seconds as i64)
            .map_err(|e| e.to_string())?
            .set_default("log_level", default_log_level())
            .map_err(|e| e.to_string())?
            .set_default("log_format", default_log_format())
            .map_err(|e| e.to_string())?;

        if let Some(path) = config_path {
            let expanded = shellexpand::tilde(path).into_owned();
            if !std::path::Path::new(&expanded).exists() {
                return Err(format!("configuration file not found: {expanded}"));
            }
            builder = builder.add_source(File::with_name(&expanded));
        }

        builder = builder.add_source(config::Environment::with_prefix("hybridserver").separator("_"));

        let raw = builder.build().map_err(|e| e.to_string())?;
        raw.try_deserialize().map_err(|e| e.to_string())
    }

    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

impl FromStr for GlobalConfig {
    type Err = String;

    /// Parses a JSON-formatted configuration blob directly (used by
    /// tests that don't want to touch the filesystem).
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let source = File::from_str(input, config::FileFormat::Json);
        let raw = Config::builder()
            .add_source(source)
            .build()
            .map_err(|e| e.to_string())?;
        raw.try_deserialize().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_no_file_given() {
        let config = GlobalConfig::load(None).unwrap();
        assert_eq!(config.port, 8888);
        assert_eq!(config.num_clients, 50);
        assert_eq!(config.stop_wait_seconds, 5);
        assert!(config.peers.is_empty());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let result = GlobalConfig::load(Some("/nonexistent/hybridserver.json"));
        assert!(result.is_err());
    }

    #[test]
    fn parses_peers_from_json() {
        let json = r#"{
            "port": 9999,
            "peers": [
                {"name": "b", "rpc_endpoint": "http://b.example/rpc", "rpc_namespace": "ns", "service_name": "svc", "http_base": "http://b.example/"}
            ]
        }"#;
        let config: GlobalConfig = json.parse().unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.peers[0].name, "b");
    }

    #[test]
    fn loads_from_an_actual_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hybridserver.json");
        std::fs::write(&path, r#"{"port": 7000}"#).unwrap();

        let config = GlobalConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.num_clients, 50);
    }

    #[test]
    fn tilde_in_config_path_is_expanded() {
        let result = GlobalConfig::load(Some("~/definitely-not-a-real-hybridserver-config.json"));
        assert!(result.is_err());
    }
}
