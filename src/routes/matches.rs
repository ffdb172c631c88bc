use actix_web::{web, HttpResponse};

use super::{validate_request, AppState};
use crate::error::CoreError;
use crate::models::{CandidateFilter, MatchRequest, MatchResponse};

/// Configure all match-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/match", web::post().to(find_matches));
}

/// Find matches endpoint
///
/// POST /api/v1/match
///
/// Request body:
/// ```json
/// {
///   "subjectId": 1,
///   "algorithm": "tag|preference",
///   "minScore": 0.25,
///   "limit": 20,
///   "candidateIds": [2, 3],
///   "anyTags": ["string"]
/// }
/// ```
async fn find_matches(
    state: web::Data<AppState>,
    req: web::Json<MatchRequest>,
) -> Result<HttpResponse, CoreError> {
    validate_request(&*req)?;

    let req = req.into_inner();
    let algorithm = state.matcher.resolve_algorithm(req.algorithm.as_deref())?;
    let min_score = req.min_score.unwrap_or(state.matcher.default_min_score());
    let limit = state.limits.resolve(req.limit);

    let subject = state.store.get_profile(req.subject_id).await?;

    let filter = CandidateFilter {
        include_ids: req.candidate_ids,
        exclude_ids: vec![subject.id],
        any_tags: req.any_tags,
    };
    let candidates = state.store.list_candidates(&filter).await;

    tracing::debug!("Found {} candidates for {}", candidates.len(), subject.id);

    let mut matches = state
        .matcher
        .rank(&subject, &candidates, algorithm, min_score)?;
    matches.truncate(limit);

    tracing::info!(
        "Returning {} matches for profile {} (from {} candidates)",
        matches.len(),
        subject.id,
        candidates.len()
    );

    Ok(HttpResponse::Ok().json(MatchResponse {
        matches,
        total_candidates: candidates.len(),
    }))
}
