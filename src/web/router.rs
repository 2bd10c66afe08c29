//! Router configuration for the Web API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    abort_chunk_upload, admin_list_files, chunk_upload_status, delete_file, download_file,
    get_public_file, init_chunk_upload, issue_download_token, merge_chunks, update_file,
    upload_chunk, upload_multiple, upload_single, AppState,
};
use super::middleware::{
    api_rate_limit, create_cors_layer, jwt_auth, security_headers, JwtState, RateLimitState,
};
use super::openapi::ApiDoc;
use crate::config::{UploadConfig, WebConfig};

/// Prefixes the file routes are mounted under. `/api` tracks the newest.
pub const API_VERSIONS: [&str; 4] = ["/dev", "/v1", "/v2", "/api"];

/// Multipart overhead allowed on top of the payload limits.
const BODY_HEADROOM: u64 = 1024 * 1024;

/// Largest request body any route has to accept.
pub fn body_limit(upload: &UploadConfig) -> usize {
    let batch = upload
        .max_file_size
        .saturating_mul(upload.max_files_per_request as u64);
    let limit = upload.chunk_max_size.max(batch).saturating_add(BODY_HEADROOM);
    usize::try_from(limit).unwrap_or(usize::MAX)
}

/// Routes shared by every API version.
fn file_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/file/upload/single", post(upload_single))
        .route("/file/upload/multiple", post(upload_multiple))
        .route("/file/upload/chunk", post(upload_chunk))
        .route("/file/upload/chunk/init", post(init_chunk_upload))
        .route("/file/upload/chunk/merge", post(merge_chunks))
        .route("/file/upload/chunk/abort", post(abort_chunk_upload))
        .route("/file/upload/chunk/:upload_id", get(chunk_upload_status))
        .route("/file/download/token", post(issue_download_token))
        .route("/file/download/:file_id", get(download_file))
        .route("/file/public", get(get_public_file))
        .route("/file/:file_id", patch(update_file).delete(delete_file))
        .route("/admin/files", get(admin_list_files))
}

/// Create the main API router.
pub fn create_router(app_state: Arc<AppState>, web: &WebConfig) -> Router {
    let jwt_state = Arc::new(JwtState::new(&web.jwt_secret));
    let rate_limit_state = Arc::new(RateLimitState::new(web.api_rate_limit));
    let limit = body_limit(&app_state.upload);

    let mut versioned = Router::new();
    for prefix in API_VERSIONS {
        versioned = versioned.nest(prefix, file_routes());
    }

    let api = versioned
        .layer(DefaultBodyLimit::max(limit))
        .layer(middleware::from_fn(move |req, next| {
            api_rate_limit(rate_limit_state.clone(), req, next)
        }))
        .with_state(app_state);

    Router::new()
        .merge(api)
        .merge(create_health_router())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(&web.cors_origins))
                .layer(middleware::from_fn(security_headers))
                .layer(middleware::from_fn(move |req, next| {
                    jwt_auth(jwt_state.clone(), req, next)
                })),
        )
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_limit_covers_batches_and_chunks() {
        let mut upload = UploadConfig::default();
        upload.max_file_size = 10;
        upload.max_files_per_request = 3;
        upload.chunk_max_size = 5;
        assert_eq!(body_limit(&upload), 30 + BODY_HEADROOM as usize);

        upload.chunk_max_size = 100;
        assert_eq!(body_limit(&upload), 100 + BODY_HEADROOM as usize);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }
}
