//! Download token issuance and redemption.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Response},
};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use super::AppState;
use crate::web::dto::{ApiResponse, DownloadQuery, DownloadTokenRequest, DownloadTokenResponse, ValidatedJson};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// Build a Content-Disposition header value.
///
/// ASCII names without quotes or backslashes are sent as-is; anything else
/// gets a sanitized `filename` fallback plus an RFC 5987 `filename*`.
pub(crate) fn content_disposition_header(filename: &str) -> String {
    let plain = filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\');
    if plain {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let fallback: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if !c.is_ascii() => '_',
            c => c,
        })
        .collect();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(filename)
    )
}

/// POST /file/download/token - Issue a one-time download link.
#[utoipa::path(
    post,
    path = "/file/download/token",
    tag = "download",
    request_body = DownloadTokenRequest,
    responses(
        (status = 200, description = "Download link issued", body = DownloadTokenResponse),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No permission for this file"),
        (status = 404, description = "File not found"),
        (status = 429, description = "A token was issued for this file moments ago")
    ),
    security(("bearer_auth" = []))
)]
pub async fn issue_download_token(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<DownloadTokenRequest>,
) -> Result<ApiResponse<DownloadTokenResponse>, ApiError> {
    let issued = state.broker.issue(&state.db, &user, &req.file_id).await?;
    Ok(ApiResponse::ok(DownloadTokenResponse {
        download_url: issued.download_url,
        expires_in: issued.expires_in,
    }))
}

/// GET /file/download/{file_id}?key= - Redeem a download token.
///
/// The token is the only credential; no Authorization header is needed.
#[utoipa::path(
    get,
    path = "/file/download/{file_id}",
    tag = "download",
    params(
        ("file_id" = String, Path, description = "File ID"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Missing key"),
        (status = 401, description = "Token invalid or expired"),
        (status = 403, description = "Token issued for another file, or access revoked"),
        (status = 404, description = "File not found"),
        (status = 410, description = "Token already used")
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response<Body>, ApiError> {
    let token = query
        .key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing download key"))?;

    let download = state
        .broker
        .redeem(&state.db, &state.storage, &token, &file_id)
        .await?;

    let mime = mime_guess::from_path(&download.record.name).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&download.record.name),
        )
        .header(header::CONTENT_LENGTH, download.size)
        .body(Body::from_stream(ReaderStream::new(download.file)))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })
}
