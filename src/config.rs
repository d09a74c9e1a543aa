//! Client Configuration
//!
//! Endpoint and access key for the hosted table service, loaded from the
//! environment (with `.env` support) or from a TOML file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::store::TODOS;

const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HEARTBEAT_SECS: u64 = 30;

/// Remote store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Project base URL, e.g. `https://xyzcompany.supabase.co`
    pub url: String,

    /// Public (anon) API key
    pub api_key: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default = "default_table")]
    pub table: String,

    /// Per-request timeout for the HTTP client
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between realtime heartbeats
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_table() -> String {
    TODOS.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_heartbeat_secs() -> u64 {
    DEFAULT_HEARTBEAT_SECS
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            schema: default_schema(),
            table: default_table(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_SECS,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let url = env_with_fallback("SUPABASE_URL", "NG_APP_SUPABASE_URL")
            .context("SUPABASE_URL not set in environment or .env")?;
        let api_key = env_with_fallback("SUPABASE_KEY", "NG_APP_SUPABASE_KEY")
            .context("SUPABASE_KEY not set in environment or .env")?;

        let mut config = Self::new(url, api_key);
        if let Ok(schema) = std::env::var("TODO_SYNC_SCHEMA") {
            config.schema = schema;
        }
        if let Ok(table) = std::env::var("TODO_SYNC_TABLE") {
            config.table = table;
        }
        if let Ok(secs) = std::env::var("TODO_SYNC_TIMEOUT_SECS") {
            config.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("invalid TODO_SYNC_TIMEOUT_SECS: {secs}"))?;
        }
        if let Ok(secs) = std::env::var("TODO_SYNC_HEARTBEAT_SECS") {
            config.heartbeat_interval_secs = secs
                .parse()
                .with_context(|| format!("invalid TODO_SYNC_HEARTBEAT_SECS: {secs}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot reach a service
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            bail!("api key must not be empty");
        }
        let url = Url::parse(&self.url).with_context(|| format!("invalid url: {}", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("url must use http or https, got {}", url.scheme());
        }
        if self.table.trim().is_empty() {
            bail!("table name must not be empty");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Table endpoint, e.g. `https://host/rest/v1/todos`
    pub fn rest_endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.url.trim_end_matches('/'), self.table)
    }

    /// Realtime websocket endpoint with the key in the query string
    pub fn realtime_endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(self.url.trim_end_matches('/'))
            .with_context(|| format!("invalid url: {}", self.url))?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => bail!("url must use http or https, got {other}"),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("cannot switch {} to {scheme}", self.url))?;
        url.set_path("/realtime/v1/websocket");
        url.query_pairs_mut()
            .clear()
            .append_pair("apikey", &self.api_key)
            .append_pair("vsn", "1.0.0");
        Ok(url)
    }
}

fn env_with_fallback(primary: &str, fallback: &str) -> Result<String, std::env::VarError> {
    std::env::var(primary).or_else(|_| std::env::var(fallback))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_endpoints() {
        let config = ClientConfig::new("https://demo.supabase.co/", "anon-key");
        assert_eq!(config.rest_endpoint(), "https://demo.supabase.co/rest/v1/todos");

        let ws = config.realtime_endpoint().unwrap();
        assert_eq!(ws.scheme(), "wss");
        assert_eq!(ws.path(), "/realtime/v1/websocket");
        assert!(ws.query().unwrap().contains("apikey=anon-key"));
        assert!(ws.query().unwrap().contains("vsn=1.0.0"));
    }

    #[test]
    fn test_plain_http_maps_to_ws() {
        let config = ClientConfig::new("http://127.0.0.1:54321", "k");
        assert_eq!(config.realtime_endpoint().unwrap().scheme(), "ws");
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::new("https://demo.supabase.co", "k").validate().is_ok());
        assert!(ClientConfig::new("https://demo.supabase.co", "  ").validate().is_err());
        assert!(ClientConfig::new("ftp://demo", "k").validate().is_err());
        assert!(ClientConfig::new("not a url", "k").validate().is_err());
    }

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "url = \"https://demo.supabase.co\"").unwrap();
        writeln!(file, "api_key = \"anon\"").unwrap();
        writeln!(file, "request_timeout_secs = 5").unwrap();

        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.table, "todos");
        assert_eq!(config.schema, "public");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_file_rejects_missing_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "url = \"https://demo.supabase.co\"").unwrap();
        assert!(ClientConfig::from_file(file.path()).is_err());
    }
}
