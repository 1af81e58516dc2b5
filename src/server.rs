use crate::config::Config;
use crate::document::TranslationJob;
use crate::engine::TranslationEngine;
use crate::error::TranslateError;
use crate::field::FieldTranslationJob;
use crate::security::api_key_accepted;
use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TranslationEngine>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(engine: Arc<TranslationEngine>, api_key: Option<String>) -> Self {
        Self {
            engine,
            api_key: api_key.map(Arc::from),
        }
    }
}

/// Build the service router. Translation routes sit behind the optional API
/// key check; `/health` is always open.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    let translate_routes = Router::new()
        .route("/sanity_translate_document", post(translate_document))
        .route("/sanity_translate_field", post(translate_field))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(translate_routes)
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy for the deployment environment (`ENV`)
pub fn cors_layer(config: &Config) -> CorsLayer {
    let methods = [Method::POST, Method::OPTIONS, Method::GET];

    match config.environment.as_str() {
        "production" => {
            info!("CORS: Production");
            let origins: Vec<HeaderValue> = config
                .allowed_origins
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", origin);
                        None
                    }
                })
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(methods)
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::CONTENT_LENGTH,
                    header::ACCEPT_ENCODING,
                    HeaderName::from_static("x-csrf-token"),
                    header::AUTHORIZATION,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                    HeaderName::from_static("x-requested-with"),
                    HeaderName::from_static("sentry-trace"),
                    HeaderName::from_static("baggage"),
                    HeaderName::from_static(API_KEY_HEADER),
                ])
                .expose_headers([header::CONTENT_LENGTH])
                .allow_credentials(true)
                .max_age(Duration::from_secs(12 * 60 * 60))
        }
        "staging" => {
            info!("CORS: Staging");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
        }
        _ => {
            info!("CORS: Development");
            CorsLayer::permissive()
        }
    }
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !api_key_accepted(state.api_key.as_deref(), presented) {
        warn!("Rejected request to {} with missing or invalid API key", request.uri().path());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"status": "error", "message": "Unauthorized"})),
        )
            .into_response();
    }

    next.run(request).await
}

fn status_for(error: &TranslateError) -> StatusCode {
    match error {
        TranslateError::Input(_) => StatusCode::BAD_REQUEST,
        TranslateError::NotFound(_) => StatusCode::NOT_FOUND,
        TranslateError::InconsistentState(_) => StatusCode::CONFLICT,
        TranslateError::Backend(_) | TranslateError::Store(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for TranslateError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        warn!("Request failed ({}): {}", self.kind(), self);
        (
            status,
            Json(json!({
                "status": "error",
                "kind": self.kind(),
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

async fn translate_document(
    State(state): State<AppState>,
    payload: Result<Json<TranslationJob>, JsonRejection>,
) -> Result<Json<Value>, TranslateError> {
    let Json(job) = payload.map_err(|e| TranslateError::Input(e.body_text()))?;

    let result = state.engine.translate_document(&job).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Document translation completed",
        "id": result.document.get("_id").cloned().unwrap_or(Value::Null),
        "translatedFields": result.translated_fields,
    })))
}

async fn translate_field(
    State(state): State<AppState>,
    payload: Result<Json<FieldTranslationJob>, JsonRejection>,
) -> Result<Json<Value>, TranslateError> {
    let Json(job) = payload.map_err(|e| TranslateError::Input(e.body_text()))?;

    state.engine.translate_field(&job).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Field translation completed",
    })))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "API is healthy",
    }))
}
