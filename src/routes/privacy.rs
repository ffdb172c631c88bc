use actix_web::{web, HttpResponse};
use std::collections::BTreeSet;

use super::{validate_request, AppState};
use crate::error::CoreError;
use crate::models::{
    AnonymizeRequest, AnonymousProfileRequest, EncryptProfileRequest, EncryptedProfileResponse,
    GenerateKeyRequest, KeyPairResponse, ProfileId, SanitizeRequest, SecureMessageRequest,
    SecureMessageResponse,
};
use crate::privacy::{anonymize_profile, PiiCategory};
use crate::services::KeyPair;

/// Configure sanitizing and key routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/privacy/sanitize", web::post().to(sanitize))
        .route("/privacy/anonymize", web::post().to(anonymize))
        .route("/privacy/anonymous-profile", web::post().to(anonymous_profile))
        .route("/keys/{profile_id}", web::post().to(generate_keys))
        .route("/profiles/{id}/encrypt", web::post().to(encrypt_profile))
        .route("/secure-message", web::post().to(secure_message));
}

impl From<KeyPair> for KeyPairResponse {
    fn from(pair: KeyPair) -> Self {
        KeyPairResponse {
            profile_id: pair.profile_id,
            key_id: pair.key_id.to_string(),
            public_key: pair.public_key,
            private_key: pair.private_key,
            version: pair.version,
            created_at: pair.created_at,
        }
    }
}

fn parse_categories(names: Option<&[String]>) -> Result<BTreeSet<PiiCategory>, CoreError> {
    match names {
        None => Ok(PiiCategory::all()),
        Some(names) => names.iter().map(|name| name.parse()).collect(),
    }
}

/// Sanitize endpoint
///
/// POST /api/v1/privacy/sanitize
///
/// Request body:
/// ```json
/// { "text": "string", "categories": ["name", "email"], "useModel": true }
/// ```
async fn sanitize(
    state: web::Data<AppState>,
    req: web::Json<SanitizeRequest>,
) -> Result<HttpResponse, CoreError> {
    let categories = parse_categories(req.categories.as_deref())?;
    let report = state
        .sanitizer
        .sanitize_with(&req.text, &categories, req.use_model.unwrap_or(true))
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Anonymize endpoint
///
/// POST /api/v1/privacy/anonymize
///
/// Request body:
/// ```json
/// { "text": "string", "consistent": true, "useModel": true }
/// ```
///
/// The response maps every pseudonym back to the value it replaced, so it is
/// only ever returned to the caller that supplied the text.
async fn anonymize(
    state: web::Data<AppState>,
    req: web::Json<AnonymizeRequest>,
) -> Result<HttpResponse, CoreError> {
    let categories = parse_categories(req.categories.as_deref())?;
    let anonymized = state
        .sanitizer
        .anonymize(
            &req.text,
            &categories,
            req.consistent,
            req.use_model.unwrap_or(true),
        )
        .await?;

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-store"))
        .json(anonymized))
}

/// Anonymous profile endpoint
///
/// POST /api/v1/privacy/anonymous-profile
///
/// Request body: `{ "profileId": 1 }`. The copy is returned, never stored.
async fn anonymous_profile(
    state: web::Data<AppState>,
    req: web::Json<AnonymousProfileRequest>,
) -> Result<HttpResponse, CoreError> {
    let profile = state.store.get_profile(req.profile_id).await?;
    let anonymous = anonymize_profile(&state.sanitizer, &profile).await?;

    tracing::info!("Built anonymous copy of profile {}", profile.id);

    Ok(HttpResponse::Ok().json(anonymous))
}

/// Profile encryption endpoint
///
/// POST /api/v1/profiles/{id}/encrypt
///
/// Optional body `{ "publicKey": "age1..." }`; the profile's own key otherwise.
async fn encrypt_profile(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    req: Option<web::Json<EncryptProfileRequest>>,
) -> Result<HttpResponse, CoreError> {
    let public_key = req.and_then(|r| r.into_inner().public_key);
    let sealed = state
        .keys
        .encrypt_profile(ProfileId(path.into_inner()), public_key.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(EncryptedProfileResponse {
        profile_id: sealed.profile_id,
        ciphertext: sealed.ciphertext,
        key_version: sealed.key_version,
    }))
}

/// Key generation endpoint
///
/// POST /api/v1/keys/{profile_id}
///
/// Optional body `{ "rotate": true }`. The private key is returned in this
/// response only and is never stored.
async fn generate_keys(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    req: Option<web::Json<GenerateKeyRequest>>,
) -> Result<HttpResponse, CoreError> {
    let rotate = req.map(|r| r.rotate).unwrap_or(false);
    let pair = state
        .keys
        .generate_keypair(ProfileId(path.into_inner()), rotate)
        .await?;

    Ok(HttpResponse::Created()
        .insert_header(("Cache-Control", "no-store"))
        .json(KeyPairResponse::from(pair)))
}

/// Secure message endpoint
///
/// POST /api/v1/secure-message
///
/// Request body:
/// ```json
/// { "recipientId": 2, "payload": "string" }
/// ```
async fn secure_message(
    state: web::Data<AppState>,
    req: web::Json<SecureMessageRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let sealed = state
        .keys
        .seal_for(req.recipient_id, req.payload.as_bytes())
        .await?;

    Ok(HttpResponse::Ok().json(SecureMessageResponse {
        recipient_id: sealed.recipient_id,
        ciphertext: sealed.ciphertext,
        key_version: sealed.key_version,
    }))
}
