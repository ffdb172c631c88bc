use actix_web::{web, HttpResponse};

use super::{validate_request, AppState};
use crate::core::{form_groups, recommend_groups};
use crate::error::CoreError;
use crate::models::{
    AddMemberRequest, CandidateFilter, CreateGroupRequest, CreatedResponse, FormGroupsRequest,
    FormedGroupsResponse, GroupId, GroupListResponse, GroupRecommendationResponse,
    RecommendGroupsRequest,
};

/// Configure all group routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/groups", web::post().to(create_group))
        .route("/groups", web::get().to(list_groups))
        .route("/groups/recommend", web::post().to(recommend))
        .route("/groups/form", web::post().to(form))
        .route("/groups/{id}", web::get().to(get_group))
        .route("/groups/{id}/members", web::post().to(add_member));
}

async fn create_group(
    state: web::Data<AppState>,
    req: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let group = state.store.create_group(req.into_inner().into()).await?;

    Ok(HttpResponse::Created().json(CreatedResponse {
        id: group.id.0,
        version: group.version,
    }))
}

async fn list_groups(state: web::Data<AppState>) -> Result<HttpResponse, CoreError> {
    let groups = state.store.list_groups().await;
    let total = groups.len();
    Ok(HttpResponse::Ok().json(GroupListResponse { groups, total }))
}

async fn get_group(
    state: web::Data<AppState>,
    path: web::Path<u64>,
) -> Result<HttpResponse, CoreError> {
    let group = state.store.get_group(GroupId(path.into_inner())).await?;
    Ok(HttpResponse::Ok().json(group))
}

/// Add member endpoint
///
/// POST /api/v1/groups/{id}/members
///
/// Request body:
/// ```json
/// { "profileId": 42 }
/// ```
async fn add_member(
    state: web::Data<AppState>,
    path: web::Path<u64>,
    req: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, CoreError> {
    let group = state
        .store
        .add_member(GroupId(path.into_inner()), req.profile_id)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

/// Group recommendation endpoint
///
/// POST /api/v1/groups/recommend
///
/// Request body:
/// ```json
/// {
///   "subjectId": 1,
///   "algorithm": "tag|preference",
///   "minScore": 0.0,
///   "limit": 20
/// }
/// ```
async fn recommend(
    state: web::Data<AppState>,
    req: web::Json<RecommendGroupsRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let algorithm = state.matcher.resolve_algorithm(req.algorithm.as_deref())?;
    let min_score = req.min_score.unwrap_or(state.matcher.default_min_score());
    let limit = state.limits.resolve(req.limit);

    let subject = state.store.get_profile(req.subject_id).await?;
    let groups = state.store.list_groups().await;
    let members = state
        .store
        .profiles_by_ids(groups.iter().flat_map(|g| g.member_ids.iter()))
        .await;

    let mut recommendations = recommend_groups(&subject, &groups, &members, algorithm, min_score)?;
    recommendations.truncate(limit);

    tracing::info!(
        "Returning {} group recommendations for profile {} (from {} groups)",
        recommendations.len(),
        subject.id,
        groups.len()
    );

    Ok(HttpResponse::Ok().json(GroupRecommendationResponse {
        groups: recommendations,
        total_groups: groups.len(),
    }))
}

/// Group formation endpoint
///
/// POST /api/v1/groups/form
///
/// Request body:
/// ```json
/// {
///   "algorithm": "tag|preference",
///   "minSize": 3,
///   "maxSize": 5,
///   "minScore": 0.0,
///   "candidateIds": [1, 2, 3]
/// }
/// ```
///
/// Proposals only; nothing is stored. PRIVATE profiles take part only when
/// named in `candidateIds`, and then only next to their trusted viewers.
async fn form(
    state: web::Data<AppState>,
    req: web::Json<FormGroupsRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;
    let req = req.into_inner();

    let algorithm = state.matcher.resolve_algorithm(req.algorithm.as_deref())?;
    let min_score = req.min_score.unwrap_or(state.matcher.default_min_score());

    let pool = state
        .store
        .list_candidates(&CandidateFilter {
            include_ids: req.candidate_ids,
            ..Default::default()
        })
        .await;

    let formation = form_groups(&pool, algorithm, req.min_size, req.max_size, min_score)?;

    tracing::info!(
        "Formed {} groups from {} candidates ({} unassigned)",
        formation.groups.len(),
        pool.len(),
        formation.unassigned.len()
    );

    Ok(HttpResponse::Ok().json(FormedGroupsResponse {
        groups: formation.groups,
        unassigned: formation.unassigned,
        total_candidates: pool.len(),
    }))
}
