// Route exports
pub mod groups;
pub mod matches;
pub mod privacy;
pub mod profiles;

use actix_web::{web, HttpResponse};
use std::sync::Arc;
use validator::Validate;

use crate::core::Matcher;
use crate::error::CoreError;
use crate::models::HealthResponse;
use crate::privacy::Sanitizer;
use crate::services::{KeyManager, ProfileStore};

/// Result limits applied to ranking endpoints
#[derive(Debug, Clone, Copy)]
pub struct ResultLimits {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl ResultLimits {
    /// Requested limit, defaulted and capped
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .min(self.max_limit)
    }
}

impl Default for ResultLimits {
    fn default() -> Self {
        Self {
            default_limit: 20,
            max_limit: 100,
        }
    }
}

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ProfileStore>,
    pub keys: Arc<KeyManager>,
    pub sanitizer: Arc<Sanitizer>,
    pub matcher: Matcher,
    pub limits: ResultLimits,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(profiles::configure)
            .configure(groups::configure)
            .configure(matches::configure)
            .configure(privacy::configure),
    );
}

/// Run `validator` rules and surface failures as `CoreError::Validation`
pub(crate) fn validate_request<T: Validate>(req: &T) -> Result<(), CoreError> {
    req.validate().map_err(|errors| {
        tracing::info!("Request validation failed: {}", errors);
        CoreError::Validation(errors.to_string())
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_detector: state.sanitizer.has_detector(),
        timestamp: chrono::Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_resolution() {
        let limits = ResultLimits::default();
        assert_eq!(limits.resolve(None), 20);
        assert_eq!(limits.resolve(Some(5)), 5);
        assert_eq!(limits.resolve(Some(500)), 100);
    }
}
