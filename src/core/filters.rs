use std::collections::BTreeSet;

use crate::models::{normalize_tags, CandidateFilter, PreferenceMap, PrivacyLevel, Profile, ProfileId};

/// Fields of a profile the scoring engine is allowed to read
#[derive(Debug, Clone, Copy)]
pub struct ReadableFields<'a> {
    pub tags: &'a BTreeSet<String>,
    pub preferences: Option<&'a PreferenceMap>,
}

/// Privacy gate applied before any score is computed.
///
/// Returns `None` when `viewer` may not see `profile` at all. A profile always
/// reads itself in full; everyone else gets what its privacy level allows.
#[inline]
pub fn readable_fields(profile: &Profile, viewer: ProfileId) -> Option<ReadableFields<'_>> {
    if profile.id == viewer {
        return Some(ReadableFields {
            tags: &profile.tags,
            preferences: Some(&profile.preferences),
        });
    }

    if !profile.is_visible_to(viewer) {
        return None;
    }

    Some(ReadableFields {
        tags: &profile.tags,
        preferences: profile.readable_preferences(),
    })
}

/// Candidate-pool membership for `list_candidates`
#[inline]
pub fn matches_candidate_filter(profile: &Profile, filter: &CandidateFilter) -> bool {
    let named = filter
        .include_ids
        .as_ref()
        .map(|ids| ids.contains(&profile.id));

    if named == Some(false) {
        return false;
    }

    if filter.exclude_ids.contains(&profile.id) {
        return false;
    }

    // Private profiles only enter pools that name them
    if profile.privacy_level == PrivacyLevel::Private && named != Some(true) {
        return false;
    }

    if !filter.any_tags.is_empty() {
        let wanted = normalize_tags(&filter.any_tags);
        if wanted.is_disjoint(&profile.tags) {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn profile(id: u64, level: PrivacyLevel, tags: &[&str]) -> Profile {
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
    fn test_limited_hides_preferences() {
        let limited = profile(2, PrivacyLevel::Limited, &["music"]);
        let fields = readable_fields(&limited, ProfileId(1)).unwrap();
        assert!(fields.preferences.is_none());
        assert!(fields.tags.contains("music"));
    }

    #[test]
    fn test_private_needs_trust() {
        let mut private = profile(2, PrivacyLevel::Private, &[]);
        assert!(readable_fields(&private, ProfileId(1)).is_none());

        private.trusted_viewers.insert(ProfileId(1));
        let fields = readable_fields(&private, ProfileId(1)).unwrap();
        assert!(fields.preferences.is_none());
    }

    #[test]
    fn test_owner_reads_everything() {
        let private = profile(5, PrivacyLevel::Private, &[]);
        assert!(readable_fields(&private, ProfileId(5))
            .unwrap()
            .preferences
            .is_some());
    }

    #[test]
    fn test_private_pooled_only_when_named() {
        let private = profile(3, PrivacyLevel::Private, &[]);
        assert!(!matches_candidate_filter(&private, &CandidateFilter::default()));

        let named = CandidateFilter {
            include_ids: Some(vec![ProfileId(3)]),
            ..Default::default()
        };
        assert!(matches_candidate_filter(&private, &named));
    }

    #[test]
    fn test_tag_and_exclusion_filters() {
        let p = profile(4, PrivacyLevel::Public, &["hiking"]);
        let by_tag = CandidateFilter {
            any_tags: vec!["Hiking".into()],
            ..Default::default()
        };
        assert!(matches_candidate_filter(&p, &by_tag));

        let other_tag = CandidateFilter {
            any_tags: vec!["chess".into()],
            ..Default::default()
        };
        assert!(!matches_candidate_filter(&p, &other_tag));

        let excluded = CandidateFilter {
            exclude_ids: vec![ProfileId(4)],
            ..Default::default()
        };
        assert!(!matches_candidate_filter(&p, &excluded));
    }
}
