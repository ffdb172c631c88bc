use serde::{Deserialize, Serialize};

use crate::models::domain::{FormedGroup, Group, GroupMatch, MatchResult, Profile, ProfileId};

/// Returned by create endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedResponse {
    pub id: u64,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileListResponse {
    pub profiles: Vec<Profile>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupListResponse {
    pub groups: Vec<Group>,
    pub total: usize,
}

/// Response for the match endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<MatchResult>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

/// Response for the group recommendation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecommendationResponse {
    pub groups: Vec<GroupMatch>,
    #[serde(rename = "totalGroups")]
    pub total_groups: usize,
}

/// Response for the group formation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormedGroupsResponse {
    pub groups: Vec<FormedGroup>,
    /// Pool members left out of every group
    pub unassigned: Vec<ProfileId>,
    #[serde(rename = "totalCandidates")]
    pub total_candidates: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(rename = "modelDetector")]
    pub model_detector: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Freshly generated key pair. The private key is only ever in this one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPairResponse {
    #[serde(rename = "profileId")]
    pub profile_id: ProfileId,
    #[serde(rename = "keyId")]
    pub key_id: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "privateKey")]
    pub private_key: String,
    pub version: u32,
    #[serde(rename = "createdAt")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureMessageResponse {
    #[serde(rename = "recipientId")]
    pub recipient_id: ProfileId,
    pub ciphertext: String,
    #[serde(rename = "keyVersion")]
    pub key_version: u32,
}

/// Armored ciphertext of a serialized profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedProfileResponse {
    #[serde(rename = "profileId")]
    pub profile_id: ProfileId,
    pub ciphertext: String,
    /// Set when the profile's own stored key was used
    #[serde(rename = "keyVersion", skip_serializing_if = "Option::is_none")]
    pub key_version: Option<u32>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
