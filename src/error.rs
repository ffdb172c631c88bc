use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::{ErrorResponse, GroupId, ProfileId};
use crate::privacy::PiiSpan;

/// Errors surfaced by the matching core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Policy violation, carries the offending spans (offsets and categories only)
    #[error("Unsanitized input in '{field}': {count} high-confidence PII span(s)", count = .spans.len())]
    UnsanitizedInput { field: String, spans: Vec<PiiSpan> },

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {resource}: expected {expected}, found {actual}")]
    Conflict {
        resource: String,
        expected: u64,
        actual: u64,
    },

    #[error("Input too large: {len} bytes exceeds limit of {max}")]
    InputTooLarge { len: usize, max: usize },

    #[error("Key already exists for profile {0}")]
    KeyAlreadyExists(ProfileId),

    #[error("Profile {0} has no public key")]
    MissingPublicKey(ProfileId),

    /// Deliberately carries no detail
    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl CoreError {
    pub fn profile_not_found(id: ProfileId) -> Self {
        CoreError::NotFound(format!("profile {}", id))
    }

    pub fn group_not_found(id: GroupId) -> Self {
        CoreError::NotFound(format!("group {}", id))
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation_error",
            CoreError::UnsanitizedInput { .. } => "unsanitized_input",
            CoreError::UnknownAlgorithm(_) => "unknown_algorithm",
            CoreError::NotFound(_) => "not_found",
            CoreError::Conflict { .. } => "conflict",
            CoreError::InputTooLarge { .. } => "input_too_large",
            CoreError::KeyAlreadyExists(_) => "key_already_exists",
            CoreError::MissingPublicKey(_) => "missing_public_key",
            CoreError::DecryptionFailed => "decryption_failed",
            CoreError::Encryption(_) => "encryption_error",
        }
    }
}

impl ResponseError for CoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) | CoreError::UnknownAlgorithm(_) => StatusCode::BAD_REQUEST,
            CoreError::UnsanitizedInput { .. } | CoreError::MissingPublicKey(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict { .. } | CoreError::KeyAlreadyExists(_) => StatusCode::CONFLICT,
            CoreError::InputTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            CoreError::DecryptionFailed => StatusCode::BAD_REQUEST,
            CoreError::Encryption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            CoreError::UnsanitizedInput { spans, .. } => serde_json::to_value(spans).ok(),
            _ => None,
        };

        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: self.status_code().as_u16(),
            details,
        })
    }
}
