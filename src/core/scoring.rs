use std::collections::BTreeSet;

use crate::core::filters::{readable_fields, ReadableFields};
use crate::models::{Algorithm, MatchedPreference, PreferenceMap, Profile};

/// Score plus the shared features that explain it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreBreakdown {
    pub score: f64,
    pub matched_tags: Vec<String>,
    pub matched_preferences: Vec<MatchedPreference>,
}

/// Jaccard similarity of two tag sets.
///
/// Two empty sets score 0 so that ranking stays total.
#[inline]
pub fn tag_score(subject: &BTreeSet<String>, candidate: &BTreeSet<String>) -> ScoreBreakdown {
    let matched_tags: Vec<String> = subject.intersection(candidate).cloned().collect();
    let union = subject.union(candidate).count();

    let score = if union == 0 {
        0.0
    } else {
        matched_tags.len() as f64 / union as f64
    };

    ScoreBreakdown {
        score,
        matched_tags,
        matched_preferences: Vec::new(),
    }
}

/// Weighted preference overlap.
///
/// For every category both sides declare, shared values contribute
/// `min(subject_weight, candidate_weight)`. The sum is normalized by the
/// subject's total weight in those same categories and clamped to [0, 1].
#[inline]
pub fn preference_score(subject: &PreferenceMap, candidate: &PreferenceMap) -> ScoreBreakdown {
    let mut overlap = 0.0;
    let mut denominator = 0.0;
    let mut matched_preferences = Vec::new();

    for (category, subject_values) in subject {
        let Some(candidate_values) = candidate.get(category) else {
            continue;
        };

        denominator += subject_values.values().sum::<f64>();

        for (value, &subject_weight) in subject_values {
            if let Some(&candidate_weight) = candidate_values.get(value) {
                let weight = subject_weight.min(candidate_weight);
                overlap += weight;
                if weight > 0.0 {
                    matched_preferences.push(MatchedPreference {
                        category: category.clone(),
                        value: value.clone(),
                        weight,
                    });
                }
            }
        }
    }

    let score = if denominator > 0.0 {
        (overlap / denominator).clamp(0.0, 1.0)
    } else {
        0.0
    };

    ScoreBreakdown {
        score,
        matched_tags: Vec::new(),
        matched_preferences,
    }
}

/// Score already privacy-filtered fields under `algorithm`.
///
/// Unreadable preferences count as empty.
pub fn score_fields(
    subject: &ReadableFields<'_>,
    candidate: &ReadableFields<'_>,
    algorithm: Algorithm,
) -> ScoreBreakdown {
    let empty = PreferenceMap::new();

    match algorithm {
        Algorithm::Tag => tag_score(subject.tags, candidate.tags),
        Algorithm::Preference => preference_score(
            subject.preferences.unwrap_or(&empty),
            candidate.preferences.unwrap_or(&empty),
        ),
    }
}

/// Compatibility of `candidate` for `subject` in [0, 1].
///
/// The subject reads its own record in full. The candidate is read as the
/// subject is allowed to see it; a candidate hidden from the subject scores 0.
pub fn score(subject: &Profile, candidate: &Profile, algorithm: Algorithm) -> f64 {
    let (Some(subject_fields), Some(candidate_fields)) = (
        readable_fields(subject, subject.id),
        readable_fields(candidate, subject.id),
    ) else {
        return 0.0;
    };

    score_fields(&subject_fields, &candidate_fields, algorithm).score
}
