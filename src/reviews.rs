// src/reviews.rs
//! Review store access: dealer listings, dealer detail, reviews, and review
//! submission. Reads never fail outright; they degrade to empty data.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{SubmitError, UpstreamError};
use crate::model::{Dealer, DealerId, Fetched, Review, StateFilter, UpstreamStatus};
use crate::upstream::UpstreamClient;

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn fetch_reviews(&self, dealer_id: DealerId) -> Fetched<Vec<Review>>;
    async fn fetch_dealers(&self, filter: &StateFilter) -> Fetched<Vec<Dealer>>;
    async fn fetch_dealer_detail(&self, dealer_id: DealerId) -> Fetched<Option<Value>>;
    /// Decoded backend answer, only for HTTP 200/201 with a JSON body.
    async fn submit_review(&self, payload: &Value) -> Result<Value, SubmitError>;
}

pub struct HttpReviewStore {
    client: UpstreamClient,
}

impl HttpReviewStore {
    pub fn new(client: UpstreamClient) -> Self {
        Self { client }
    }

    async fn read_list<T: DeserializeOwned>(&self, path: &[&str]) -> Fetched<Vec<T>> {
        let service = self.client.service();
        match self.client.get(path, &[]).await.and_then(|v| decode_items(service, v)) {
            Ok((items, 0)) => Fetched::ok(items),
            Ok((items, skipped)) => {
                warn!(service, skipped, kept = items.len(), "dropped unreadable list items");
                Fetched {
                    data: items,
                    status: UpstreamStatus::Degraded,
                }
            }
            Err(e) => {
                warn!(service, error = %e, "read degraded to empty list");
                Fetched::unavailable(Vec::new())
            }
        }
    }
}

/// Decodes a JSON array item by item. Returns the readable items and how
/// many were skipped; a body that is not an array is an error.
fn decode_items<T: DeserializeOwned>(
    service: &str,
    body: Value,
) -> Result<(Vec<T>, usize), UpstreamError> {
    let Value::Array(raw) = body else {
        return Err(UpstreamError::InvalidResponseBody {
            url: service.to_string(),
            message: "expected a JSON array".to_string(),
        });
    };
    let total = raw.len();
    let items: Vec<T> = raw
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let skipped = total - items.len();
    Ok((items, skipped))
}

#[async_trait]
impl ReviewStore for HttpReviewStore {
    async fn fetch_reviews(&self, dealer_id: DealerId) -> Fetched<Vec<Review>> {
        let id = dealer_id.to_string();
        self.read_list(&["fetchReviews", "dealer", id.as_str()]).await
    }

    async fn fetch_dealers(&self, filter: &StateFilter) -> Fetched<Vec<Dealer>> {
        match filter {
            StateFilter::All => self.read_list(&["fetchDealers"]).await,
            StateFilter::State(state) => self.read_list(&["fetchDealers", state.as_str()]).await,
        }
    }

    async fn fetch_dealer_detail(&self, dealer_id: DealerId) -> Fetched<Option<Value>> {
        let id = dealer_id.to_string();
        match self.client.get(&["fetchDealer", id.as_str()], &[]).await {
            Ok(v) => Fetched::ok(Some(v)),
            Err(e) => {
                warn!(dealer_id = %dealer_id, error = %e, "dealer detail unavailable");
                Fetched::unavailable(None)
            }
        }
    }

    async fn submit_review(&self, payload: &Value) -> Result<Value, SubmitError> {
        let (status, body) = self.client.post(&["insert_review"], payload).await?;
        if status.as_u16() == 200 || status.as_u16() == 201 {
            Ok(body)
        } else {
            Err(UpstreamError::Rejected {
                url: "insert_review".to_string(),
                status: status.as_u16(),
            })
        }
    }
}
