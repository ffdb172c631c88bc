use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::detector::{PiiCategory, PiiSpan};
use super::sanitizer::Sanitizer;
use crate::error::CoreError;
use crate::models::{AnonymousProfile, Profile};

/// One pseudonym and the value it stands for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudonymMapping {
    pub original: String,
    pub pseudonym: String,
    pub category: PiiCategory,
}

/// Text with PII swapped for pseudonyms such as `PERSON_1` or `EMAIL_2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizedText {
    #[serde(rename = "anonymizedText")]
    pub anonymized_text: String,
    /// One entry per pseudonym, in order of first appearance
    pub mapping: Vec<PseudonymMapping>,
    pub spans: Vec<PiiSpan>,
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Replace every span at or above `threshold` with a numbered pseudonym.
///
/// Numbering runs per category. With `consistent` set, repeats of a value
/// (compared case-insensitively) share one pseudonym; without it every
/// occurrence gets a fresh one.
pub fn pseudonymize(
    text: &str,
    spans: &[PiiSpan],
    threshold: f64,
    consistent: bool,
) -> (String, Vec<PseudonymMapping>) {
    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut counters: HashMap<PiiCategory, usize> = HashMap::new();
    let mut assigned: HashMap<(PiiCategory, String), usize> = HashMap::new();
    let mut mapping: Vec<PseudonymMapping> = Vec::new();

    for span in spans.iter().filter(|s| s.confidence >= threshold) {
        let original = &text[span.start..span.end];
        let key = (span.category, original.to_lowercase());

        let existing = if consistent {
            assigned.get(&key).copied()
        } else {
            None
        };

        let index = match existing {
            Some(index) => index,
            None => {
                let counter = counters.entry(span.category).or_insert(0);
                *counter += 1;
                mapping.push(PseudonymMapping {
                    original: original.to_string(),
                    pseudonym: format!("{}_{}", span.category.pseudonym_prefix(), counter),
                    category: span.category,
                });
                assigned.insert(key, mapping.len() - 1);
                mapping.len() - 1
            }
        };

        result.push_str(&text[cursor..span.start]);
        result.push_str(&mapping[index].pseudonym);
        cursor = span.end;
    }
    result.push_str(&text[cursor..]);

    (result, mapping)
}

/// Detached copy of a profile that carries no identifying fields.
///
/// The display name is swapped for a random handle and every mention of it in
/// the description becomes that handle. The rest of the description is
/// pseudonymized. Preferences are only copied when the profile is PUBLIC.
pub async fn anonymize_profile(
    sanitizer: &Sanitizer,
    profile: &Profile,
) -> Result<AnonymousProfile, CoreError> {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    let handle = format!("anon-{}", &uuid[..8]);

    let description = if profile.display_name.trim().is_empty() {
        profile.description.clone()
    } else {
        profile.description.replace(profile.display_name.trim(), &handle)
    };
    let anonymized = sanitizer
        .anonymize(&description, &PiiCategory::all(), true, true)
        .await?;

    if anonymized.degraded {
        tracing::warn!(profile = %profile.id, "Anonymous profile built in degraded mode");
    }

    Ok(AnonymousProfile {
        handle,
        description: anonymized.anonymized_text,
        tags: profile.tags.clone(),
        preferences: profile
            .readable_preferences()
            .cloned()
            .unwrap_or_default(),
        privacy_level: profile.privacy_level,
        availability: profile.availability,
        created_at: chrono::Utc::now(),
    })
}
