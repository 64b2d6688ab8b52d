// src/sentiment.rs
//! Sentiment classification of a single review text via the analyzer service.

use async_trait::async_trait;
use tracing::warn;

use crate::error::UpstreamError;
use crate::model::SentimentResult;
use crate::upstream::{text_id, UpstreamClient};

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// `Ok(None)` when the analyzer answered with something unusable;
    /// `Err` only when it could not be reached.
    async fn classify(&self, text: &str) -> Result<Option<SentimentResult>, UpstreamError>;
}

pub struct HttpSentimentClassifier {
    client: UpstreamClient,
    max_text_chars: usize,
}

impl HttpSentimentClassifier {
    pub fn new(client: UpstreamClient, max_text_chars: usize) -> Self {
        Self {
            client,
            max_text_chars,
        }
    }
}

#[async_trait]
impl SentimentClassifier for HttpSentimentClassifier {
    async fn classify(&self, text: &str) -> Result<Option<SentimentResult>, UpstreamError> {
        let bounded = truncate_chars(text, self.max_text_chars);
        match self.client.get(&["analyze", bounded], &[]).await {
            Ok(v) => match serde_json::from_value::<SentimentResult>(v) {
                Ok(res) => Ok(Some(res)),
                Err(e) => {
                    warn!(error = %e, text_id = %text_id(text), "unexpected sentiment payload");
                    Ok(None)
                }
            },
            Err(e) if e.is_network() => Err(e),
            Err(e) => {
                warn!(error = %e, text_id = %text_id(text), "sentiment analyzer gave no usable answer");
                Ok(None)
            }
        }
    }
}

/// Longest prefix of `text` with at most `max` chars; `max == 0` disables the bound.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    if max == 0 {
        return text;
    }
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
