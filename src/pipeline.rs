// src/pipeline.rs
//! Review enrichment: fetch a dealer's reviews, then label each one with the
//! sentiment service. One failed classification only degrades that review's
//! label; the batch itself never fails.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{stream, FutureExt, StreamExt};
use metrics::{counter, histogram};
use tracing::{debug, info, warn};

use crate::model::{DealerId, EnrichedReview, Fetched, SentimentLabel, UpstreamStatus};
use crate::reviews::ReviewStore;
use crate::sentiment::SentimentClassifier;
use crate::upstream::text_id;

pub struct ReviewEnrichmentPipeline {
    reviews: Arc<dyn ReviewStore>,
    sentiment: Arc<dyn SentimentClassifier>,
    concurrency: usize,
}

impl ReviewEnrichmentPipeline {
    pub fn new(
        reviews: Arc<dyn ReviewStore>,
        sentiment: Arc<dyn SentimentClassifier>,
        concurrency: usize,
    ) -> Self {
        Self {
            reviews,
            sentiment,
            concurrency: concurrency.max(1),
        }
    }

    /// Reviews of `dealer_id`, in store order, each with exactly one label.
    ///
    /// Classifications run at most `concurrency` at a time. Output position `i`
    /// always carries the label computed from input `i`. Nothing is spawned,
    /// so dropping the returned future cancels every in-flight call.
    pub async fn enrich(&self, dealer_id: DealerId) -> Fetched<Vec<EnrichedReview>> {
        let started = Instant::now();
        let fetched = self.reviews.fetch_reviews(dealer_id).await;
        let fetch_status = fetched.status;
        let reviews = fetched.data;

        // Owned texts keep the stream's futures free of borrows into `reviews`,
        // which the handler's `Send` bound needs.
        let texts: Vec<String> = reviews.iter().map(|r| r.text().to_string()).collect();
        let labels: Vec<SentimentLabel> = stream::iter(texts)
            .map(|text| async move { self.label_for(&text).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        let failed = labels.iter().filter(|l| l.is_error()).count();
        let enriched: Vec<EnrichedReview> = reviews
            .into_iter()
            .zip(labels)
            .map(|(review, label)| EnrichedReview::new(review, label))
            .collect();

        let status = match fetch_status {
            UpstreamStatus::Unavailable => UpstreamStatus::Unavailable,
            _ if failed > 0 => UpstreamStatus::Degraded,
            other => other,
        };

        histogram!("review_enrichment_ms").record(started.elapsed().as_secs_f64() * 1_000.0);
        info!(
            dealer_id = %dealer_id,
            reviews = enriched.len(),
            failed,
            status = status.as_str(),
            "reviews enriched"
        );

        Fetched {
            data: enriched,
            status,
        }
    }

    async fn label_for(&self, text: &str) -> SentimentLabel {
        let call = AssertUnwindSafe(self.sentiment.classify(text)).catch_unwind();
        let label = match call.await {
            Ok(Ok(Some(result))) => match result.sentiment.as_deref() {
                Some(raw) => SentimentLabel::from(raw),
                None => SentimentLabel::Unknown,
            },
            Ok(Ok(None)) => SentimentLabel::Unknown,
            Ok(Err(e)) => {
                warn!(text_id = %text_id(text), error = %e, "sentiment call failed");
                SentimentLabel::Error
            }
            Err(_) => {
                warn!(text_id = %text_id(text), "sentiment classifier panicked");
                SentimentLabel::Error
            }
        };
        debug!(text_id = %text_id(text), label = %label, "review labelled");
        counter!("sentiment_labels_total", "label" => metric_label(&label)).increment(1);
        label
    }
}

fn metric_label(label: &SentimentLabel) -> &'static str {
    match label {
        SentimentLabel::Positive => "positive",
        SentimentLabel::Negative => "negative",
        SentimentLabel::Neutral => "neutral",
        SentimentLabel::Unknown => "unknown",
        SentimentLabel::Error => "error",
        SentimentLabel::Other(_) => "other",
    }
}
