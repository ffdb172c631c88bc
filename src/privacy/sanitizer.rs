use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::anonymizer::{pseudonymize, AnonymizedText};
use super::detector::{detect_patterns, PiiCategory, PiiSpan};
use super::model::{DetectorError, EntityDetector};
use crate::error::CoreError;

/// Outcome of one sanitize call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiReport {
    /// Sorted by start offset, non-overlapping, offsets into the original text
    pub spans: Vec<PiiSpan>,
    #[serde(rename = "redactedText")]
    pub redacted_text: String,
    /// Set when model-assisted detection was unavailable and patterns alone were used
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PiiReport {
    pub fn high_confidence_spans(&self, threshold: f64) -> Vec<PiiSpan> {
        self.spans
            .iter()
            .filter(|s| s.confidence >= threshold)
            .copied()
            .collect()
    }

    pub fn has_pii(&self, threshold: f64) -> bool {
        self.spans.iter().any(|s| s.confidence >= threshold)
    }
}

#[derive(Debug, Clone)]
pub struct SanitizerConfig {
    pub confidence_threshold: f64,
    /// Maximum input size in bytes
    pub max_input_length: usize,
    pub detection_timeout: Duration,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.75,
            max_input_length: 16 * 1024,
            detection_timeout: Duration::from_millis(2000),
        }
    }
}

/// PII detection and redaction.
///
/// Pattern matchers always run. When an [`EntityDetector`] is attached its
/// spans are merged in, subject to the configured timeout.
#[derive(Clone)]
pub struct Sanitizer {
    config: SanitizerConfig,
    detector: Option<Arc<dyn EntityDetector>>,
}

impl Sanitizer {
    pub fn new(config: SanitizerConfig) -> Self {
        Self {
            config,
            detector: None,
        }
    }

    pub fn with_detector(mut self, detector: Arc<dyn EntityDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn threshold(&self) -> f64 {
        self.config.confidence_threshold
    }

    pub fn config(&self) -> &SanitizerConfig {
        &self.config
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    fn check_size(&self, text: &str) -> Result<(), CoreError> {
        if text.len() > self.config.max_input_length {
            return Err(CoreError::InputTooLarge {
                len: text.len(),
                max: self.config.max_input_length,
            });
        }
        Ok(())
    }

    /// Pattern-only sanitizing. Pure and synchronous.
    pub fn sanitize_patterns(
        &self,
        text: &str,
        categories: &BTreeSet<PiiCategory>,
    ) -> Result<PiiReport, CoreError> {
        self.check_size(text)?;

        let spans = resolve_overlaps(
            detect_patterns(text, categories),
            self.config.confidence_threshold,
        );
        let redacted_text = redact(text, &spans, self.config.confidence_threshold);

        Ok(PiiReport {
            spans,
            redacted_text,
            degraded: false,
            warnings: Vec::new(),
        })
    }

    /// Full sanitizing: patterns plus the entity detector when one is attached.
    ///
    /// Either the whole text is processed or the call fails; a slow or failing
    /// model degrades the report instead of failing it.
    pub async fn sanitize(
        &self,
        text: &str,
        categories: &BTreeSet<PiiCategory>,
    ) -> Result<PiiReport, CoreError> {
        self.check_size(text)?;

        let mut candidates = detect_patterns(text, categories);
        let mut degraded = false;
        let mut warnings = Vec::new();

        if let Some(detector) = &self.detector {
            match self.detect_with_model(detector.as_ref(), text).await {
                Ok(spans) => {
                    candidates.extend(spans.into_iter().filter(|s| {
                        categories.contains(&s.category)
                            && s.end <= text.len()
                            && text.is_char_boundary(s.start)
                            && text.is_char_boundary(s.end)
                    }));
                }
                Err(e) => {
                    tracing::warn!(
                        detector = detector.name(),
                        error = %e,
                        "Entity detection unavailable, using pattern detection only"
                    );
                    degraded = true;
                    warnings.push(match e {
                        DetectorError::Timeout(_) => format!("DetectionTimeout: {}", e),
                        _ => format!("DetectionUnavailable: {}", e),
                    });
                }
            }
        }

        let spans = resolve_overlaps(candidates, self.config.confidence_threshold);
        let redacted_text = redact(text, &spans, self.config.confidence_threshold);

        tracing::debug!(
            spans = spans.len(),
            degraded,
            "Sanitized {} bytes",
            text.len()
        );

        Ok(PiiReport {
            spans,
            redacted_text,
            degraded,
            warnings,
        })
    }

    /// `sanitize` when `use_model` is set, pattern-only otherwise
    pub async fn sanitize_with(
        &self,
        text: &str,
        categories: &BTreeSet<PiiCategory>,
        use_model: bool,
    ) -> Result<PiiReport, CoreError> {
        if use_model {
            self.sanitize(text, categories).await
        } else {
            self.sanitize_patterns(text, categories)
        }
    }

    /// Replace detected PII with numbered pseudonyms instead of placeholders
    pub async fn anonymize(
        &self,
        text: &str,
        categories: &BTreeSet<PiiCategory>,
        consistent: bool,
        use_model: bool,
    ) -> Result<AnonymizedText, CoreError> {
        let report = self.sanitize_with(text, categories, use_model).await?;
        let (anonymized_text, mapping) =
            pseudonymize(text, &report.spans, self.config.confidence_threshold, consistent);

        Ok(AnonymizedText {
            anonymized_text,
            mapping,
            spans: report.spans,
            degraded: report.degraded,
            warnings: report.warnings,
        })
    }

    /// One call plus one retry on timeout
    async fn detect_with_model(
        &self,
        detector: &dyn EntityDetector,
        text: &str,
    ) -> Result<Vec<PiiSpan>, DetectorError> {
        let timeout = self.config.detection_timeout;

        for attempt in 1..=2 {
            match tokio::time::timeout(timeout, detector.detect(text)).await {
                Ok(result) => return result,
                Err(_) => {
                    tracing::debug!(attempt, "Entity detector timed out after {:?}", timeout);
                }
            }
        }

        Err(DetectorError::Timeout(timeout))
    }
}

/// Keep the strongest span out of each overlapping cluster: highest
/// confidence first, then longest, then earliest. Result is sorted by start.
///
/// A losing span at or above `threshold` widens the span that beat it, so
/// the part of it outside the winner is still covered by the redaction.
pub fn resolve_overlaps(mut candidates: Vec<PiiSpan>, threshold: f64) -> Vec<PiiSpan> {
    candidates.retain(|s| !s.is_empty());
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.len().cmp(&a.len()))
            .then_with(|| a.start.cmp(&b.start))
    });

    let mut kept: Vec<PiiSpan> = Vec::with_capacity(candidates.len());
    let mut dropped: Vec<PiiSpan> = Vec::new();
    for span in candidates {
        if kept.iter().any(|k| k.overlaps(&span)) {
            dropped.push(span);
        } else {
            kept.push(span);
        }
    }

    for loser in dropped.iter().filter(|s| s.confidence >= threshold) {
        for winner in kept.iter_mut().filter(|k| k.overlaps(loser)) {
            winner.start = winner.start.min(loser.start);
            winner.end = winner.end.max(loser.end);
        }
    }

    // Widening can make winners touch; fold those into the stronger one
    kept.sort_by_key(|s| s.start);
    let mut merged: Vec<PiiSpan> = Vec::with_capacity(kept.len());
    for span in kept {
        match merged.last_mut() {
            Some(last) if last.overlaps(&span) => {
                if span.confidence > last.confidence {
                    last.category = span.category;
                    last.confidence = span.confidence;
                }
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }

    merged
}

/// Replace every span at or above `threshold` with its category placeholder
pub fn redact(text: &str, spans: &[PiiSpan], threshold: f64) -> String {
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;

    for span in spans.iter().filter(|s| s.confidence >= threshold) {
        result.push_str(&text[cursor..span.start]);
        result.push_str(span.category.placeholder());
        cursor = span.end;
    }
    result.push_str(&text[cursor..]);

    result
}
