// src/config.rs
//! Gateway configuration: defaults, optional TOML file, then environment overrides.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "GATEWAY_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3030";
pub const DEFAULT_SENTIMENT_ANALYZER_URL: &str = "http://localhost:5050/";

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}
fn default_sentiment_analyzer_url() -> String {
    DEFAULT_SENTIMENT_ANALYZER_URL.to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_get_retries() -> u32 {
    1
}
fn default_retry_base_delay_ms() -> u64 {
    200
}
fn default_enrichment_concurrency() -> usize {
    4
}
fn default_max_sentiment_text_chars() -> usize {
    2000
}
fn default_session_ttl_secs() -> u64 {
    14 * 24 * 60 * 60
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayConfig {
    /// Review/catalog service base URL.
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_sentiment_analyzer_url")]
    pub sentiment_analyzer_url: String,
    /// Per-call timeout for every upstream request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra attempts for GETs that failed at the transport level. POSTs are never retried.
    #[serde(default = "default_get_retries")]
    pub get_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Max in-flight sentiment calls per request.
    #[serde(default = "default_enrichment_concurrency")]
    pub enrichment_concurrency: usize,
    #[serde(default = "default_max_sentiment_text_chars")]
    pub max_sentiment_text_chars: usize,
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            sentiment_analyzer_url: default_sentiment_analyzer_url(),
            request_timeout_secs: default_request_timeout_secs(),
            get_retries: default_get_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            enrichment_concurrency: default_enrichment_concurrency(),
            max_sentiment_text_chars: default_max_sentiment_text_chars(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl GatewayConfig {
    /// Load using env var + fallbacks:
    /// 1) $GATEWAY_CONFIG_PATH (must exist)
    /// 2) config/gateway.toml, if present
    /// 3) built-in defaults
    ///
    /// Environment overrides are applied last in every case.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from_file(&pb)?
            }
            Err(_) => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load_from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env();
        Ok(cfg.sanitized())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading gateway config from {}", path.display()))?;
        let cfg: GatewayConfig = toml::from_str(&content)
            .with_context(|| format!("parsing gateway config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Uppercase names win; the lowercase `backend_url`/`sentiment_analyzer_url`
    /// spellings are accepted for existing `.env` files.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_first(&["BACKEND_URL", "backend_url"]) {
            self.backend_url = v;
        }
        if let Some(v) = env_first(&["SENTIMENT_ANALYZER_URL", "sentiment_analyzer_url"]) {
            self.sentiment_analyzer_url = v;
        }
        env_parse("UPSTREAM_TIMEOUT_SECS", &mut self.request_timeout_secs);
        env_parse("UPSTREAM_GET_RETRIES", &mut self.get_retries);
        env_parse("UPSTREAM_RETRY_BASE_MS", &mut self.retry_base_delay_ms);
        env_parse("ENRICHMENT_CONCURRENCY", &mut self.enrichment_concurrency);
        env_parse("SENTIMENT_MAX_TEXT_CHARS", &mut self.max_sentiment_text_chars);
        env_parse("SESSION_TTL_SECS", &mut self.session_ttl_secs);
    }

    fn sanitized(mut self) -> Self {
        if self.enrichment_concurrency == 0 {
            self.enrichment_concurrency = 1;
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|n| std::env::var(n).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, slot: &mut T) {
    let Ok(raw) = std::env::var(name) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(var = name, value = %raw, "ignoring unparsable config override"),
    }
}
