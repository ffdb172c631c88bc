use actix_cors::Cors;
use actix_web::{error, http::StatusCode, middleware, web, App, HttpResponse, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use universa_match::config::Settings;
use universa_match::core::Matcher;
use universa_match::privacy::{HttpEntityDetector, Sanitizer};
use universa_match::routes::{self, AppState, ResultLimits};
use universa_match::services::{KeyManager, ProfileStore};

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Load configuration
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
        }
    };

    // Initialize logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    if settings.logging.format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }

    info!("Starting Universa matching service...");

    // Initialize sanitizer, with the entity-detection model when configured
    let mut sanitizer = Sanitizer::new(settings.sanitizer.to_config());

    if let Some(model) = &settings.sanitizer.model {
        match HttpEntityDetector::new(model.endpoint.clone(), model.api_key.clone()) {
            Ok(detector) => {
                info!("Entity detector enabled at {}", model.endpoint);
                sanitizer = sanitizer.with_detector(Arc::new(detector));
            }
            Err(e) => {
                warn!("Failed to build entity detector ({}), using pattern detection only", e);
            }
        }
    } else {
        info!("No entity detector configured, using pattern detection only");
    }

    let sanitizer = Arc::new(sanitizer);

    info!(
        "Sanitizer initialized (threshold: {}, max input: {} bytes, timeout: {}ms)",
        settings.sanitizer.confidence_threshold,
        settings.sanitizer.max_input_length,
        settings.sanitizer.detection_timeout_ms
    );

    let store = Arc::new(ProfileStore::new(sanitizer.clone(), settings.store.pii_policy));

    info!("Profile store initialized (PII policy: {:?})", settings.store.pii_policy);

    let keys = Arc::new(KeyManager::new(
        store.clone(),
        settings.secure_message.max_payload_bytes,
    ));

    let matcher = Matcher::new(
        settings.matching.default_algorithm,
        settings.matching.default_min_score,
    );

    info!(
        "Matcher initialized (default algorithm: {}, min score: {})",
        settings.matching.default_algorithm, settings.matching.default_min_score
    );

    // Build application state
    let app_state = AppState {
        store,
        keys,
        sanitizer,
        matcher,
        limits: ResultLimits {
            default_limit: settings.matching.default_limit,
            max_limit: settings.matching.max_limit,
        },
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))
    .map_err(|e| {
        error!("Failed to bind HTTP server: {}", e);
        e
    })?
    .run()
    .await
}
