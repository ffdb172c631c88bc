// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{
    normalize_preferences, normalize_tags, Algorithm, AnonymousProfile, Availability,
    CandidateFilter, FormedGroup, Group, GroupId, GroupMatch, MatchResult, MatchedPreference, NewGroup, NewProfile, PreferenceMap, PrivacyLevel, Profile,
    ProfileId, ProfilePatch,
};
pub use requests::{
    AddMemberRequest, AnonymizeRequest, AnonymousProfileRequest, CreateGroupRequest,
    CreateProfileRequest, EncryptProfileRequest, FormGroupsRequest, GenerateKeyRequest,
    MatchRequest, RecommendGroupsRequest, SanitizeRequest, SecureMessageRequest,
    UpdateProfileRequest,
};
pub use responses::{
    CreatedResponse, EncryptedProfileResponse, ErrorResponse, FormedGroupsResponse,
    GroupListResponse, GroupRecommendationResponse, HealthResponse, KeyPairResponse,
    MatchResponse, ProfileListResponse, SecureMessageResponse,
};
