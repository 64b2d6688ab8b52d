// src/model.rs
//! Request-scoped data shapes: reviews, dealers, sentiment labels and the
//! availability signal that travels with every upstream read.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A review as the review store returns it.
///
/// The store's records are loosely shaped. A known field whose value has an
/// unexpected type is left in `extra` untouched, so one odd record never
/// rejects the rest of a listing and the client still receives every field
/// the store sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Review {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "dealership", skip_serializing_if = "Option::is_none")]
    pub dealer_id: Option<i64>,
    /// Reviewer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Review text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car_year: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Review {
    pub fn with_text(id: i64, dealer_id: i64, text: &str) -> Self {
        Self {
            id: Some(id),
            dealer_id: Some(dealer_id),
            review: Some(text.to_string()),
            ..Self::default()
        }
    }

    /// Text to classify; empty when the record has none.
    pub fn text(&self) -> &str {
        self.review.as_deref().unwrap_or_default()
    }

    fn from_fields(mut fields: Map<String, Value>) -> Self {
        let dealer_key = if fields.contains_key("dealership") {
            "dealership"
        } else {
            "dealer_id"
        };
        Self {
            id: take(&mut fields, "id"),
            dealer_id: take(&mut fields, dealer_key),
            name: take(&mut fields, "name"),
            review: take(&mut fields, "review"),
            purchase: take(&mut fields, "purchase"),
            purchase_date: take(&mut fields, "purchase_date"),
            car_make: take(&mut fields, "car_make"),
            car_model: take(&mut fields, "car_model"),
            car_year: take(&mut fields, "car_year"),
            extra: fields,
        }
    }
}

impl<'de> Deserialize<'de> for Review {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Review::from_fields)
    }
}

/// Moves `key` out of `fields` only if its value decodes as `T`.
fn take<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str) -> Option<T> {
    let typed = T::deserialize(fields.get(key)?).ok()?;
    fields.remove(key);
    Some(typed)
}

/// A review with exactly one sentiment label attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReview {
    #[serde(flatten)]
    pub review: Review,
    pub sentiment: SentimentLabel,
}

impl EnrichedReview {
    pub fn new(mut review: Review, sentiment: SentimentLabel) -> Self {
        // the pipeline's label wins over anything the store echoed back
        review.extra.remove("sentiment");
        Self { review, sentiment }
    }
}

/// Dealer record, as loosely shaped as [`Review`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dealer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for Dealer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::deserialize(deserializer)?;
        Ok(Self {
            id: take(&mut fields, "id"),
            full_name: take(&mut fields, "full_name"),
            short_name: take(&mut fields, "short_name"),
            city: take(&mut fields, "city"),
            state: take(&mut fields, "state"),
            address: take(&mut fields, "address"),
            extra: fields,
        })
    }
}

/// Sentiment label assigned to a review.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
    /// Classifier answered, but without a usable label.
    Unknown,
    /// Classification call failed.
    Error,
    /// Any other label the sentiment service emits, passed through verbatim.
    Other(String),
}

impl SentimentLabel {
    pub fn as_str(&self) -> &str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
            SentimentLabel::Unknown => "unknown",
            SentimentLabel::Error => "error",
            SentimentLabel::Other(s) => s.as_str(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SentimentLabel::Error)
    }
}

impl From<&str> for SentimentLabel {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "positive" => SentimentLabel::Positive,
            "negative" => SentimentLabel::Negative,
            "neutral" => SentimentLabel::Neutral,
            "unknown" => SentimentLabel::Unknown,
            "error" => SentimentLabel::Error,
            _ => SentimentLabel::Other(raw.to_string()),
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SentimentLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SentimentLabel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(SentimentLabel::from(raw.as_str()))
    }
}

/// Decoded answer of the sentiment service. The field is optional on purpose:
/// an answer without it is a distinct outcome from a failed call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SentimentResult {
    #[serde(default)]
    pub sentiment: Option<String>,
}

/// Non-zero dealer id parsed from a path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DealerId(NonZeroU64);

impl DealerId {
    /// `None` for the falsy inputs: empty, zero, or not a number.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<NonZeroU64>().ok().map(DealerId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for DealerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dealer listing filter. `All` is the unfiltered sentinel the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateFilter {
    All,
    State(String),
}

impl StateFilter {
    pub fn from_path(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") | Some("All") => StateFilter::All,
            Some(state) => StateFilter::State(state.to_string()),
        }
    }
}

impl FromStr for StateFilter {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(StateFilter::from_path(Some(s)))
    }
}

/// How much of an upstream read actually succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamStatus {
    Ok,
    /// Data present but some items carry a sentinel instead of real values.
    Degraded,
    /// Upstream unreachable or unusable; data is the empty default.
    Unavailable,
}

impl UpstreamStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UpstreamStatus::Ok => "ok",
            UpstreamStatus::Degraded => "degraded",
            UpstreamStatus::Unavailable => "unavailable",
        }
    }
}

/// Result of a read that never fails outright: `data` falls back to an empty
/// default and `status` records why.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub status: UpstreamStatus,
}

impl<T> Fetched<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            status: UpstreamStatus::Ok,
        }
    }

    pub fn unavailable(data: T) -> Self {
        Self {
            data,
            status: UpstreamStatus::Unavailable,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            data: f(self.data),
            status: self.status,
        }
    }
}
