use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Preference category -> value -> weight
pub type PreferenceMap = BTreeMap<String, BTreeMap<String, f64>>;

/// Store-issued profile identifier. Allocated monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub u64);

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-issued group identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-profile visibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    /// Tags and preferences are readable by the scoring engine
    #[default]
    Public,
    /// Only tags are readable
    Limited,
    /// Invisible to everyone except trusted viewers, who read it as `Limited`
    Private,
}

/// Self-reported availability shown alongside a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    #[default]
    Active,
    Busy,
    Inactive,
}

impl FromStr for Availability {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(Availability::Active),
            "busy" => Ok(Availability::Busy),
            "inactive" => Ok(Availability::Inactive),
            _ => Err(CoreError::Validation(format!("unknown availability status: {}", s))),
        }
    }
}

/// Sanitized profile record as held by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub preferences: PreferenceMap,
    #[serde(rename = "privacyLevel")]
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub availability: Availability,
    #[serde(rename = "trustedViewers", default)]
    pub trusted_viewers: BTreeSet<ProfileId>,
    #[serde(rename = "publicKey")]
    pub public_key: Option<String>,
    #[serde(rename = "keyVersion", default)]
    pub key_version: u32,
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Profile {
    /// Whether `viewer` may see this profile at all
    pub fn is_visible_to(&self, viewer: ProfileId) -> bool {
        match self.privacy_level {
            PrivacyLevel::Public | PrivacyLevel::Limited => true,
            PrivacyLevel::Private => self.id == viewer || self.trusted_viewers.contains(&viewer),
        }
    }

    /// Preferences as the scoring engine is allowed to read them
    pub fn readable_preferences(&self) -> Option<&PreferenceMap> {
        match self.privacy_level {
            PrivacyLevel::Public => Some(&self.preferences),
            PrivacyLevel::Limited | PrivacyLevel::Private => None,
        }
    }
}

/// Group record; the recommended-for set is derived on demand, never stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub preferences: PreferenceMap,
    #[serde(rename = "memberIds")]
    pub member_ids: BTreeSet<ProfileId>,
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Raw profile fields, before sanitizing
#[derive(Debug, Clone, Default)]
pub struct NewProfile {
    pub display_name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub preferences: PreferenceMap,
    pub privacy_level: PrivacyLevel,
    pub availability: Availability,
    pub trusted_viewers: Vec<ProfileId>,
    /// Accept the record in redacted form even under the `reject` policy
    pub allow_redaction: bool,
}

/// Partial profile update; `None` fields are left untouched
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub preferences: Option<PreferenceMap>,
    pub privacy_level: Option<PrivacyLevel>,
    pub availability: Option<Availability>,
    pub trusted_viewers: Option<Vec<ProfileId>>,
    pub expected_version: Option<u64>,
    pub allow_redaction: bool,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.preferences.is_none()
            && self.privacy_level.is_none()
            && self.availability.is_none()
            && self.trusted_viewers.is_none()
    }
}

/// Raw group fields, before sanitizing
#[derive(Debug, Clone, Default)]
pub struct NewGroup {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub preferences: PreferenceMap,
    pub member_ids: Vec<ProfileId>,
    pub allow_redaction: bool,
}

/// Candidate pool selection
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    /// Explicitly named candidates. PRIVATE profiles are only ever pooled when named here.
    pub include_ids: Option<Vec<ProfileId>>,
    pub exclude_ids: Vec<ProfileId>,
    /// Keep only profiles sharing at least one of these tags
    pub any_tags: Vec<String>,
}

/// Scoring algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Jaccard similarity over tag sets
    #[default]
    Tag,
    /// Overlap of weighted preferences
    Preference,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Tag => "tag",
            Algorithm::Preference => "preference",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tag" | "tags" | "jaccard" => Ok(Algorithm::Tag),
            "preference" | "preferences" | "weighted" => Ok(Algorithm::Preference),
            _ => Err(CoreError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// One shared preference that contributed to a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPreference {
    pub category: String,
    pub value: String,
    /// `min(subject_weight, candidate_weight)`
    pub weight: f64,
}

/// Profile-to-profile match. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "subjectId")]
    pub subject_id: ProfileId,
    #[serde(rename = "candidateId")]
    pub candidate_id: ProfileId,
    pub score: f64,
    pub algorithm: Algorithm,
    #[serde(rename = "matchedTags")]
    pub matched_tags: Vec<String>,
    #[serde(rename = "matchedPreferences")]
    pub matched_preferences: Vec<MatchedPreference>,
}

/// Profile-to-group recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMatch {
    #[serde(rename = "subjectId")]
    pub subject_id: ProfileId,
    #[serde(rename = "groupId")]
    pub group_id: GroupId,
    #[serde(rename = "groupName")]
    pub group_name: String,
    pub score: f64,
    pub algorithm: Algorithm,
    #[serde(rename = "matchedTags")]
    pub matched_tags: Vec<String>,
    #[serde(rename = "matchedPreferences")]
    pub matched_preferences: Vec<MatchedPreference>,
    #[serde(rename = "memberCount")]
    pub member_count: usize,
}

/// Unstored, identity-free copy of a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousProfile {
    pub handle: String,
    pub description: String,
    pub tags: BTreeSet<String>,
    pub preferences: PreferenceMap,
    #[serde(rename = "privacyLevel")]
    pub privacy_level: PrivacyLevel,
    pub availability: Availability,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Proposed group of mutually compatible profiles. Not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormedGroup {
    #[serde(rename = "memberIds")]
    pub member_ids: Vec<ProfileId>,
    /// Mean pairwise affinity of the members
    pub score: f64,
    pub algorithm: Algorithm,
    /// Tags every member shares
    #[serde(rename = "sharedTags")]
    pub shared_tags: Vec<String>,
}

/// Lowercase, trim and collapse inner whitespace; empty tags are dropped
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| {
            t.as_ref()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// Normalize category/value keys and check every weight is finite and non-negative
pub fn normalize_preferences(preferences: PreferenceMap) -> Result<PreferenceMap, CoreError> {
    let mut normalized = PreferenceMap::new();

    for (category, values) in preferences {
        let category_key = category.trim().to_lowercase();
        if category_key.is_empty() {
            return Err(CoreError::Validation(
                "preference category must not be empty".to_string(),
            ));
        }

        let entry = normalized.entry(category_key.clone()).or_default();
        for (value, weight) in values {
            if !weight.is_finite() || weight < 0.0 {
                return Err(CoreError::Validation(format!(
                    "preference weight for {}:{} must be a finite, non-negative number",
                    category_key, value
                )));
            }
            let value_key = value.trim().to_lowercase();
            if value_key.is_empty() {
                return Err(CoreError::Validation(format!(
                    "preference value in category {} must not be empty",
                    category_key
                )));
            }
            entry.insert(value_key, weight);
        }
    }

    Ok(normalized)
}
