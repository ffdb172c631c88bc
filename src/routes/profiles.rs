use actix_web::{web, HttpResponse};
use serde::Deserialize;

use super::{validate_request, AppState};
use crate::error::CoreError;
use crate::models::{
    Availability, CandidateFilter, CreateProfileRequest, CreatedResponse, GroupListResponse,
    ProfileId, ProfileListResponse, UpdateProfileRequest,
};

/// Configure all profile routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/profiles", web::post().to(create_profile))
        .route("/profiles", web::get().to(list_profiles))
        .route("/profiles/{id}", web::get().to(get_profile))
        .route("/profiles/{id}", web::patch().to(update_profile))
        .route("/profiles/{id}", web::delete().to(delete_profile))
        .route("/profiles/{id}/groups", web::get().to(profile_groups));
}

#[derive(Debug, Deserialize)]
pub struct ListProfilesQuery {
    pub tag: Option<String>,
    #[serde(default, rename = "includePrivate")]
    pub include_private: bool,
    /// Availability status filter
    pub status: Option<String>,
}

/// Create profile endpoint
///
/// POST /api/v1/profiles
///
/// Request body:
/// ```json
/// {
///   "displayName": "string",
///   "description": "string",
///   "tags": ["string"],
///   "preferences": {"category": {"value": 1.0}},
///   "privacyLevel": "public|limited|private",
///   "allowRedaction": false
/// }
/// ```
async fn create_profile(
    state: web::Data<AppState>,
    req: web::Json<CreateProfileRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let profile = state.store.create_profile(req.into_inner().into()).await?;

    Ok(HttpResponse::Created().json(CreatedResponse {
        id: profile.id.0,
        version: profile.version,
    }))
}

/// List profiles
///
/// GET /api/v1/profiles?tag={tag}&status={active|busy|inactive}&includePrivate={bool}
///
/// PRIVATE profiles are left out unless `includePrivate` is set.
async fn list_profiles(
    state: web::Data<AppState>,
    query: web::Query<ListProfilesQuery>,
) -> Result<HttpResponse, CoreError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<Availability>)
        .transpose()?;

    let mut profiles = if query.include_private {
        state.store.list_profiles().await
    } else {
        state.store.list_candidates(&CandidateFilter::default()).await
    };

    if let Some(tag) = &query.tag {
        let tag = tag.trim().to_lowercase();
        profiles.retain(|p| p.tags.contains(&tag));
    }
    if let Some(status) = status {
        profiles.retain(|p| p.availability == status);
    }

    let total = profiles.len();
    Ok(HttpResponse::Ok().json(ProfileListResponse { profiles, total }))
}

async fn get_profile(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, CoreError> {
    let profile = state.store.get_profile(ProfileId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// Partial update; include `expectedVersion` for optimistic concurrency
async fn update_profile(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    req: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let profile = state
        .store
        .update_profile(ProfileId(path.into_inner()), req.into_inner().into())
        .await?;

    Ok(HttpResponse::Ok().json(profile))
}

async fn delete_profile(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, CoreError> {
    state.store.delete_profile(ProfileId(path.into_inner())).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Groups the profile is a member of
///
/// GET /api/v1/profiles/{id}/groups
async fn profile_groups(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, CoreError> {
    let groups = state.store.groups_for(ProfileId(path.into_inner())).await?;
    let total = groups.len();
    Ok(HttpResponse::Ok().json(GroupListResponse { groups, total }))
}
