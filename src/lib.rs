//! Universa Match - privacy-preserving matching engine
//!
//! Profiles and groups are sanitized for PII before storage, ranked against
//! each other under interchangeable scoring algorithms, and matched parties
//! exchange contact details through age-encrypted messages.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod privacy;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{form_groups, recommend_groups, Matcher};
pub use error::CoreError;
pub use models::{Algorithm, Group, GroupMatch, MatchResult, PrivacyLevel, Profile, ProfileId};
pub use privacy::{PiiCategory, PiiReport, Sanitizer, SanitizerConfig};
pub use services::{KeyManager, PiiPolicy, ProfileStore};
