use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::detector::{PiiCategory, PiiSpan};

/// Errors from an external entity-detection model
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detection timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Context-aware PII detection backed by an NLP model.
///
/// Implementations are synchronous collaborators from the sanitizer's point of
/// view: the sanitizer bounds every call with its detection timeout and falls
/// back to pattern detection when the model is slow or failing.
#[async_trait]
pub trait EntityDetector: Send + Sync {
    fn name(&self) -> &str;

    /// Spans over `text` with byte offsets
    async fn detect(&self, text: &str) -> Result<Vec<PiiSpan>, DetectorError>;
}

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    entities: Vec<ModelEntity>,
}

/// Entity as returned by the model. Offsets are character offsets.
#[derive(Debug, Deserialize)]
struct ModelEntity {
    start: usize,
    end: usize,
    label: String,
    #[serde(alias = "confidence")]
    score: f64,
}

/// Map an NER label onto a PII category
pub fn category_for_label(label: &str) -> Option<PiiCategory> {
    let label = label.trim().trim_start_matches("B-").trim_start_matches("I-");
    match label.to_uppercase().as_str() {
        "PERSON" | "PER" | "NAME" => Some(PiiCategory::Name),
        "EMAIL" | "EMAIL_ADDRESS" => Some(PiiCategory::Email),
        "PHONE" | "PHONE_NUMBER" => Some(PiiCategory::Phone),
        "LOCATION" | "LOC" | "ADDRESS" | "STREET_ADDRESS" => Some(PiiCategory::Address),
        "ID" | "SSN" | "US_SSN" | "NATIONAL_ID" | "PASSPORT" => Some(PiiCategory::NationalId),
        "CREDIT_CARD" | "IBAN" | "IBAN_CODE" | "FINANCIAL" | "BANK_ACCOUNT" => {
            Some(PiiCategory::Financial)
        }
        _ => None,
    }
}

/// Convert a character offset into a byte offset; `None` when out of range
fn char_to_byte(text: &str, char_offset: usize) -> Option<usize> {
    if char_offset == 0 {
        return Some(0);
    }
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .nth(char_offset)
}

/// HTTP client for a hosted entity-detection model.
///
/// Request: `POST {endpoint}` with `{"text": "..."}`.
/// Response: `{"entities": [{"start", "end", "label", "score"}]}`.
pub struct HttpEntityDetector {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpEntityDetector {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, DetectorError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    fn to_spans(text: &str, entities: Vec<ModelEntity>) -> Vec<PiiSpan> {
        entities
            .into_iter()
            .filter_map(|entity| {
                let Some(category) = category_for_label(&entity.label) else {
                    tracing::debug!("Ignoring unmapped entity label: {}", entity.label);
                    return None;
                };
                let start = char_to_byte(text, entity.start)?;
                let end = char_to_byte(text, entity.end)?;
                if start >= end || !entity.score.is_finite() {
                    return None;
                }
                Some(PiiSpan {
                    start,
                    end,
                    category,
                    confidence: entity.score.clamp(0.0, 1.0),
                })
            })
            .collect()
    }
}

#[async_trait]
impl EntityDetector for HttpEntityDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&self, text: &str) -> Result<Vec<PiiSpan>, DetectorError> {
        let mut request = self.client.post(&self.endpoint).json(&DetectRequest { text });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(DetectorError::ApiError(format!(
                "entity detection failed: {}",
                response.status()
            )));
        }

        let body: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        Ok(Self::to_spans(text, body.entities))
    }
}
