use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::domain::{
    Availability, NewGroup, NewProfile, PreferenceMap, PrivacyLevel, ProfileId, ProfilePatch,
};

/// Request to register a profile. Text fields are raw and get sanitized by the store.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(alias = "display_name", rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub preferences: PreferenceMap,
    #[serde(default, alias = "privacy_level", rename = "privacyLevel")]
    pub privacy_level: PrivacyLevel,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default, alias = "trusted_viewers", rename = "trustedViewers")]
    pub trusted_viewers: Vec<ProfileId>,
    #[serde(default, alias = "allow_redaction", rename = "allowRedaction")]
    pub allow_redaction: bool,
}

impl From<CreateProfileRequest> for NewProfile {
    fn from(req: CreateProfileRequest) -> Self {
        NewProfile {
            display_name: req.display_name,
            description: req.description,
            tags: req.tags,
            preferences: req.preferences,
            privacy_level: req.privacy_level,
            availability: req.availability,
            trusted_viewers: req.trusted_viewers,
            allow_redaction: req.allow_redaction,
        }
    }
}

/// Partial profile update
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120))]
    #[serde(alias = "display_name", rename = "displayName")]
    pub display_name: Option<String>,
    pub description: Option<String>,
    #[validate(length(max = 64))]
    pub tags: Option<Vec<String>>,
    pub preferences: Option<PreferenceMap>,
    #[serde(alias = "privacy_level", rename = "privacyLevel")]
    pub privacy_level: Option<PrivacyLevel>,
    pub availability: Option<Availability>,
    #[serde(alias = "trusted_viewers", rename = "trustedViewers")]
    pub trusted_viewers: Option<Vec<ProfileId>>,
    #[serde(alias = "expected_version", rename = "expectedVersion")]
    pub expected_version: Option<u64>,
    #[serde(default, alias = "allow_redaction", rename = "allowRedaction")]
    pub allow_redaction: bool,
}

impl From<UpdateProfileRequest> for ProfilePatch {
    fn from(req: UpdateProfileRequest) -> Self {
        ProfilePatch {
            display_name: req.display_name,
            description: req.description,
            tags: req.tags,
            preferences: req.preferences,
            privacy_level: req.privacy_level,
            availability: req.availability,
            trusted_viewers: req.trusted_viewers,
            expected_version: req.expected_version,
            allow_redaction: req.allow_redaction,
        }
    }
}

/// Request to create a group
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub preferences: PreferenceMap,
    #[serde(default, alias = "member_ids", rename = "memberIds")]
    pub member_ids: Vec<ProfileId>,
    #[serde(default, alias = "allow_redaction", rename = "allowRedaction")]
    pub allow_redaction: bool,
}

impl From<CreateGroupRequest> for NewGroup {
    fn from(req: CreateGroupRequest) -> Self {
        NewGroup {
            name: req.name,
            description: req.description,
            tags: req.tags,
            preferences: req.preferences,
            member_ids: req.member_ids,
            allow_redaction: req.allow_redaction,
        }
    }
}

/// Request to add a member to a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    #[serde(alias = "profile_id", rename = "profileId")]
    pub profile_id: ProfileId,
}

/// Request to rank candidate profiles for a subject
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MatchRequest {
    #[serde(alias = "subject_id", rename = "subjectId")]
    pub subject_id: ProfileId,
    pub algorithm: Option<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(alias = "min_score", rename = "minScore")]
    pub min_score: Option<f64>,
    #[validate(range(min = 1))]
    pub limit: Option<usize>,
    /// Restrict the pool to these candidates; PRIVATE profiles are only pooled when named here
    #[serde(alias = "candidate_ids", rename = "candidateIds")]
    pub candidate_ids: Option<Vec<ProfileId>>,
    #[serde(default, alias = "any_tags", rename = "anyTags")]
    pub any_tags: Vec<String>,
}

/// Request to rank groups for a subject
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecommendGroupsRequest {
    #[serde(alias = "subject_id", rename = "subjectId")]
    pub subject_id: ProfileId,
    pub algorithm: Option<String>,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(alias = "min_score", rename = "minScore")]
    pub min_score: Option<f64>,
    #[validate(range(min = 1))]
    pub limit: Option<usize>,
}

/// Request to split a candidate pool into new groups
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_group_sizes"))]
pub struct FormGroupsRequest {
    pub algorithm: Option<String>,
    #[validate(range(min = 2, max = 50))]
    #[serde(default = "default_min_size", alias = "min_size", rename = "minSize")]
    pub min_size: usize,
    #[validate(range(min = 2, max = 50))]
    #[serde(default = "default_max_size", alias = "max_size", rename = "maxSize")]
    pub max_size: usize,
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(alias = "min_score", rename = "minScore")]
    pub min_score: Option<f64>,
    /// Pool to group; every non-PRIVATE profile when absent
    #[serde(alias = "candidate_ids", rename = "candidateIds")]
    pub candidate_ids: Option<Vec<ProfileId>>,
}

fn default_min_size() -> usize { 3 }
fn default_max_size() -> usize { 5 }

fn validate_group_sizes(req: &FormGroupsRequest) -> Result<(), validator::ValidationError> {
    if req.min_size > req.max_size {
        return Err(validator::ValidationError::new("min_size_above_max_size"));
    }
    Ok(())
}

/// Body of `POST /keys/{profile_id}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateKeyRequest {
    #[serde(default)]
    pub rotate: bool,
}

/// Request to seal a payload for a recipient's current public key
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecureMessageRequest {
    #[serde(alias = "recipient_id", rename = "recipientId")]
    pub recipient_id: ProfileId,
    #[validate(length(min = 1))]
    pub payload: String,
}

/// Ad-hoc sanitize request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizeRequest {
    pub text: String,
    /// Category names; all categories when absent
    pub categories: Option<Vec<String>>,
    /// Consult the entity detector when one is configured (default true)
    #[serde(alias = "use_model", alias = "use_ai", rename = "useModel")]
    pub use_model: Option<bool>,
}

/// Ad-hoc anonymize request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymizeRequest {
    pub text: String,
    pub categories: Option<Vec<String>>,
    /// Give repeated values the same pseudonym (default true)
    #[serde(default = "default_consistent")]
    pub consistent: bool,
    #[serde(alias = "use_model", alias = "use_ai", rename = "useModel")]
    pub use_model: Option<bool>,
}

fn default_consistent() -> bool { true }

/// Request for an unstored anonymous copy of a profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnonymousProfileRequest {
    #[serde(alias = "profile_id", rename = "profileId")]
    pub profile_id: ProfileId,
}

/// Encrypt a profile record; the profile's own public key is used when none is given
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptProfileRequest {
    #[serde(alias = "public_key", rename = "publicKey")]
    pub public_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_request_accepts_both_casings() {
        let camel: MatchRequest =
            serde_json::from_str(r#"{"subjectId": 3, "minScore": 0.5}"#).unwrap();
        let snake: MatchRequest =
            serde_json::from_str(r#"{"subject_id": 3, "min_score": 0.5}"#).unwrap();

        assert_eq!(camel.subject_id, ProfileId(3));
        assert_eq!(snake.min_score, Some(0.5));
        assert!(camel.algorithm.is_none());
    }

    #[test]
    fn test_match_request_rejects_out_of_range_min_score() {
        let req: MatchRequest =
            serde_json::from_str(r#"{"subjectId": 1, "minScore": 1.5}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_profile_defaults() {
        let req: CreateProfileRequest =
            serde_json::from_str(r#"{"displayName": "trail runner"}"#).unwrap();
        assert!(req.validate().is_ok());

        let new: NewProfile = req.into();
        assert_eq!(new.privacy_level, PrivacyLevel::Public);
        assert!(new.tags.is_empty());
        assert!(!new.allow_redaction);
    }

    #[test]
    fn test_form_groups_size_bounds() {
        let defaults: FormGroupsRequest = serde_json::from_str("{}").unwrap();
        assert_eq!((defaults.min_size, defaults.max_size), (3, 5));
        assert!(defaults.validate().is_ok());

        let inverted: FormGroupsRequest =
            serde_json::from_str(r#"{"minSize": 6, "maxSize": 4}"#).unwrap();
        assert!(inverted.validate().is_err());

        let singleton: FormGroupsRequest =
            serde_json::from_str(r#"{"min_size": 1, "max_size": 4}"#).unwrap();
        assert!(singleton.validate().is_err());
    }

    #[test]
    fn test_sanitize_request_accepts_use_ai() {
        let req: SanitizeRequest =
            serde_json::from_str(r#"{"text": "hi", "use_ai": false}"#).unwrap();
        assert_eq!(req.use_model, Some(false));

        let anon: AnonymizeRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(anon.consistent);
        assert!(anon.use_model.is_none());
    }

    #[test]
    fn test_empty_display_name_fails_validation() {
        let req: CreateProfileRequest =
            serde_json::from_str(r#"{"displayName": ""}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
