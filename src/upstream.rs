// src/upstream.rs
//! Generic JSON client for one upstream service: URL composition, bounded
//! timeout, transport/decoding error tagging, and a small GET-only retry.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Context;
use metrics::counter;
use reqwest::{StatusCode, Url};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::GatewayConfig;
use crate::error::UpstreamError;

#[derive(Clone)]
pub struct UpstreamClient {
    /// Name used in logs and metric labels, e.g. "reviews".
    service: &'static str,
    base: Url,
    http: reqwest::Client,
    get_retries: u32,
    retry_base_delay: Duration,
    /// Path carries user text; logs and errors show a hash of it instead.
    redact_path: bool,
}

impl UpstreamClient {
    pub fn new(service: &'static str, base_url: &str, cfg: &GatewayConfig) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("invalid {service} base url '{base_url}'"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("{service} base url '{base_url}' cannot carry a path");
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("dealer-reviews-bff/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(cfg.request_timeout().min(Duration::from_secs(4)))
            .timeout(cfg.request_timeout())
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            service,
            base,
            http,
            get_retries: cfg.get_retries,
            retry_base_delay: cfg.retry_base_delay(),
            redact_path: false,
        })
    }

    /// Everything after the first path segment is private (e.g. review text).
    pub fn with_redacted_path(mut self) -> Self {
        self.redact_path = true;
        self
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Base URL + percent-encoded path segments + form-encoded query.
    pub fn url_for(&self, path: &[&str], query: &[(&str, &str)]) -> Result<Url, UpstreamError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| UpstreamError::InvalidUrl(self.base.to_string()))?;
            segments.pop_if_empty();
            segments.extend(path);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// GET and decode JSON. Transport failures are retried with exponential
    /// backoff up to `get_retries` extra attempts.
    pub async fn get(&self, path: &[&str], query: &[(&str, &str)]) -> Result<Value, UpstreamError> {
        let url = self.url_for(path, query)?;
        let shown = self.shown(&url, path);
        info!(service = self.service, url = %shown, "GET from upstream");

        let mut attempt: u32 = 0;
        loop {
            match self.get_once(&url, &shown).await {
                Err(e) if e.is_network() && attempt < self.get_retries => {
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(1u32 << attempt.min(16));
                    warn!(
                        service = self.service,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "upstream GET failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                outcome => {
                    self.record("GET", &outcome);
                    return outcome;
                }
            }
        }
    }

    async fn get_once(&self, url: &Url, shown: &str) -> Result<Value, UpstreamError> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| network_error(shown, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(UpstreamError::Rejected {
                url: shown.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| network_error(shown, e))?;
        decode_json(shown, &bytes)
    }

    /// POST a JSON body. Never retried. A body that is not JSON is an error
    /// whatever the status code was.
    pub async fn post(&self, path: &[&str], body: &Value) -> Result<(StatusCode, Value), UpstreamError> {
        let url = self.url_for(path, &[])?;
        let shown = self.shown(&url, path);
        let outcome = self.post_once(&url, &shown, body).await;
        self.record("POST", &outcome);
        outcome
    }

    async fn post_once(
        &self,
        url: &Url,
        shown: &str,
        body: &Value,
    ) -> Result<(StatusCode, Value), UpstreamError> {
        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| network_error(shown, e))?;

        let status = resp.status();
        info!(service = self.service, status = status.as_u16(), "POST to upstream answered");

        let bytes = resp.bytes().await.map_err(|e| network_error(shown, e))?;
        let value = decode_json(shown, &bytes)?;
        Ok((status, value))
    }

    /// URL as it may appear in logs and error messages.
    fn shown(&self, url: &Url, path: &[&str]) -> String {
        if !self.redact_path {
            return url.to_string();
        }
        let (head, rest) = path.split_at(path.len().min(1));
        let endpoint = self
            .url_for(head, &[])
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.base.to_string());
        format!("{endpoint}/<{}>", text_id(&rest.join("/")))
    }

    fn record<T>(&self, method: &'static str, outcome: &Result<T, UpstreamError>) {
        let label = match outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        counter!(
            "upstream_requests_total",
            "service" => self.service,
            "method" => method,
            "outcome" => label
        )
        .increment(1);
    }
}

// reqwest puts the full URL into its Display; `shown` replaces it.
fn network_error(shown: &str, e: reqwest::Error) -> UpstreamError {
    let timed_out = e.is_timeout();
    let e = e.without_url();
    let message = if timed_out {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    warn!(url = %shown, error = %message, "network exception occurred");
    UpstreamError::Network {
        url: shown.to_string(),
        message,
    }
}

fn decode_json(shown: &str, bytes: &[u8]) -> Result<Value, UpstreamError> {
    serde_json::from_slice(bytes).map_err(|e| {
        warn!(url = %shown, error = %e, "upstream did not return valid JSON");
        UpstreamError::InvalidResponseBody {
            url: shown.to_string(),
            message: e.to_string(),
        }
    })
}

/// Short stable id for logging user text without logging the text itself.
pub(crate) fn text_id(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> UpstreamClient {
        UpstreamClient::new("test", base, &GatewayConfig::default()).unwrap()
    }

    #[test]
    fn segments_are_joined_without_double_slashes() {
        let c = client("http://localhost:5050/");
        let url = c.url_for(&["analyze", "fine"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5050/analyze/fine");

        let c = client("http://localhost:3030");
        let url = c.url_for(&["fetchReviews", "dealer", "5"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3030/fetchReviews/dealer/5");
    }

    #[test]
    fn base_path_prefix_is_kept() {
        let c = client("http://gateway.local/api/");
        let url = c.url_for(&["fetchDealers"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://gateway.local/api/fetchDealers");
    }

    #[test]
    fn path_and_query_values_are_encoded() {
        let c = client("http://localhost:5050/");
        let url = c
            .url_for(&["analyze", "good & fast/cheap?"], &[("state", "a=b&c")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5050/analyze/good%20&%20fast%2Fcheap%3F?state=a%3Db%26c"
        );
    }

    #[test]
    fn redacted_client_hides_everything_after_the_endpoint() {
        let c = client("http://localhost:5050/").with_redacted_path();
        let path = ["analyze", "my car broke down twice"];
        let url = c.url_for(&path, &[]).unwrap();
        let shown = c.shown(&url, &path);
        assert!(!shown.contains("broke"), "{shown}");
        assert_eq!(
            shown,
            format!("http://localhost:5050/analyze/<{}>", text_id("my car broke down twice"))
        );

        let plain = client("http://localhost:3030");
        let url = plain.url_for(&["fetchDealers", "Texas"], &[]).unwrap();
        assert_eq!(plain.shown(&url, &["fetchDealers", "Texas"]), url.to_string());
    }

    #[test]
    fn text_id_is_short_and_stable() {
        let a = text_id("Great service");
        assert_eq!(a.len(), 12);
        assert_eq!(a, text_id("Great service"));
        assert_ne!(a, text_id("Terrible wait"));
    }

    #[test]
    fn non_base_urls_are_refused() {
        assert!(UpstreamClient::new("x", "mailto:someone@example.com", &GatewayConfig::default()).is_err());
        assert!(UpstreamClient::new("x", "not a url", &GatewayConfig::default()).is_err());
    }
}
