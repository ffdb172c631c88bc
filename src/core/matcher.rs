use std::cmp::Ordering;

use crate::core::filters::readable_fields;
use crate::core::scoring::score_fields;
use crate::error::CoreError;
use crate::models::{Algorithm, MatchResult, Profile};

/// Ranks candidate profiles for a subject.
///
/// # Pipeline Stages
/// 1. Drop the subject itself
/// 2. Privacy gate (runs before any score is computed)
/// 3. Score under the selected algorithm
/// 4. Keep scores >= `min_score`, sort descending with candidate id as tie-break
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    default_algorithm: Algorithm,
    default_min_score: f64,
}

impl Matcher {
    pub fn new(default_algorithm: Algorithm, default_min_score: f64) -> Self {
        Self {
            default_algorithm,
            default_min_score,
        }
    }

    pub fn default_algorithm(&self) -> Algorithm {
        self.default_algorithm
    }

    pub fn default_min_score(&self) -> f64 {
        self.default_min_score
    }

    /// Parse an optional algorithm name, falling back to the configured default
    pub fn resolve_algorithm(&self, name: Option<&str>) -> Result<Algorithm, CoreError> {
        match name {
            Some(name) => name.parse(),
            None => Ok(self.default_algorithm),
        }
    }

    /// Rank `candidates` for `subject`
    ///
    /// # Arguments
    /// * `subject` - The profile matches are computed for
    /// * `candidates` - Candidate pool; may contain profiles the subject cannot see
    /// * `algorithm` - Scoring algorithm
    /// * `min_score` - Inclusive lower bound in [0, 1]
    pub fn rank(
        &self,
        subject: &Profile,
        candidates: &[Profile],
        algorithm: Algorithm,
        min_score: f64,
    ) -> Result<Vec<MatchResult>, CoreError> {
        validate_min_score(min_score)?;

        let Some(subject_fields) = readable_fields(subject, subject.id) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<MatchResult> = candidates
            .iter()
            .filter(|candidate| candidate.id != subject.id)
            .filter_map(|candidate| {
                readable_fields(candidate, subject.id).map(|fields| (candidate.id, fields))
            })
            .filter_map(|(candidate_id, fields)| {
                let breakdown = score_fields(&subject_fields, &fields, algorithm);
                if breakdown.score >= min_score {
                    Some(MatchResult {
                        subject_id: subject.id,
                        candidate_id,
                        score: breakdown.score,
                        algorithm,
                        matched_tags: breakdown.matched_tags,
                        matched_preferences: breakdown.matched_preferences,
                    })
                } else {
                    None
                }
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });

        tracing::debug!(
            "Ranked {} of {} candidates for subject {} ({})",
            matches.len(),
            candidates.len(),
            subject.id,
            algorithm
        );

        Ok(matches)
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(Algorithm::Tag, 0.0)
    }
}

pub(crate) fn validate_min_score(min_score: f64) -> Result<(), CoreError> {
    if !min_score.is_finite() || !(0.0..=1.0).contains(&min_score) {
        return Err(CoreError::Validation(format!(
            "min_score must be within [0, 1], got {}",
            min_score
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{normalize_tags, PreferenceMap, PrivacyLevel, ProfileId};
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn create_candidate(id: u64, tags: &[&str], level: PrivacyLevel) -> Profile {
        let now = Utc::now();
        Profile {
            id: ProfileId(id),
            display_name: format!("member {}", id),
            description: String::new(),
            tags: normalize_tags(tags),
            preferences: PreferenceMap::new(),
            privacy_level: level,
            availability: Default::default(),
            trusted_viewers: BTreeSet::new(),
            public_key: None,
            key_version: 0,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_rank_sorted_with_id_tie_break() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &["music", "hiking"], PrivacyLevel::Public);

        let candidates = vec![
            create_candidate(9, &["music"], PrivacyLevel::Public),
            create_candidate(3, &["music"], PrivacyLevel::Public),
            create_candidate(5, &["music", "hiking"], PrivacyLevel::Public),
            create_candidate(7, &["chess"], PrivacyLevel::Public),
        ];

        let result = matcher
            .rank(&subject, &candidates, Algorithm::Tag, 0.0)
            .unwrap();
        let ids: Vec<u64> = result.iter().map(|m| m.candidate_id.0).collect();

        assert_eq!(ids, vec![5, 3, 9, 7]);
        assert_eq!(result[0].score, 1.0);
    }

    #[test]
    fn test_min_score_is_inclusive() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &["music", "hiking"], PrivacyLevel::Public);
        let candidates = vec![
            create_candidate(2, &["music", "coding"], PrivacyLevel::Public),
            create_candidate(3, &["coding"], PrivacyLevel::Public),
        ];

        let result = matcher
            .rank(&subject, &candidates, Algorithm::Tag, 1.0 / 3.0)
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].candidate_id, ProfileId(2));
    }

    #[test]
    fn test_private_excluded_without_trust() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &["music"], PrivacyLevel::Public);
        let mut hidden = create_candidate(2, &["music"], PrivacyLevel::Private);

        let result = matcher
            .rank(&subject, std::slice::from_ref(&hidden), Algorithm::Tag, 0.0)
            .unwrap();
        assert!(result.is_empty());

        hidden.trusted_viewers.insert(ProfileId(1));
        let result = matcher
            .rank(&subject, &[hidden], Algorithm::Tag, 0.0)
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_subject_never_matches_itself() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &["music"], PrivacyLevel::Public);
        let result = matcher
            .rank(&subject, &[subject.clone()], Algorithm::Tag, 0.0)
            .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_empty_pool_is_not_an_error() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &["music"], PrivacyLevel::Public);
        assert!(matcher
            .rank(&subject, &[], Algorithm::Preference, 0.5)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalid_min_score() {
        let matcher = Matcher::default();
        let subject = create_candidate(1, &[], PrivacyLevel::Public);
        assert!(matches!(
            matcher.rank(&subject, &[], Algorithm::Tag, 1.5),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            matcher.rank(&subject, &[], Algorithm::Tag, f64::NAN),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_resolve_algorithm() {
        let matcher = Matcher::new(Algorithm::Preference, 0.0);
        assert_eq!(matcher.resolve_algorithm(None).unwrap(), Algorithm::Preference);
        assert_eq!(matcher.resolve_algorithm(Some("tag")).unwrap(), Algorithm::Tag);
        assert!(matches!(
            matcher.resolve_algorithm(Some("magic")),
            Err(CoreError::UnknownAlgorithm(_))
        ));
    }
}
