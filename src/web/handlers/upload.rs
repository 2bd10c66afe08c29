//! Upload handlers: single, multiple and chunked.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::AppState;
use crate::web::dto::{
    AbortChunkRequest, ApiResponse, ChunkUploadResponse, FileInfo, InitChunkRequest,
    InitChunkResponse, MergeChunksRequest, MultipleUploadResponse, UploadStatusResponse,
    ValidatedJson,
};
use crate::web::error::{ApiError, ErrorCode};
use crate::web::middleware::AuthUser;

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    tracing::debug!("Failed to read multipart field: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(ErrorCode::PayloadTooLarge, "Request body is too large");
    }
    ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
}

/// POST /file/upload/single - Upload one file.
#[utoipa::path(
    post,
    path = "/file/upload/single",
    tag = "upload",
    request_body(content = inline(Object), content_type = "multipart/form-data", description = "`file` part and optional `description`"),
    responses(
        (status = 201, description = "File stored", body = FileInfo),
        (status = 400, description = "No file, type not allowed or too large"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_single(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<FileInfo>, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((name, bytes.to_vec()));
            }
            "description" => {
                let text = field.text().await.map_err(multipart_error)?;
                description = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let (name, data) = file.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let record = state
        .uploads()
        .upload_single(&user, &name, &data, description.as_deref())
        .await?;

    Ok(ApiResponse::created(FileInfo::from(&record)))
}

/// POST /file/upload/multiple - Upload several files at once.
///
/// Files failing type or size checks are skipped.
#[utoipa::path(
    post,
    path = "/file/upload/multiple",
    tag = "upload",
    request_body(content = inline(Object), content_type = "multipart/form-data", description = "One or more `files` parts"),
    responses(
        (status = 201, description = "Files stored", body = MultipleUploadResponse),
        (status = 400, description = "No files or too many files"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_multiple(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<MultipleUploadResponse>, ApiError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(multipart_error)?;
        files.push((name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    let records = state.uploads().upload_multiple(&user, &files).await?;

    Ok(ApiResponse::created(MultipleUploadResponse {
        uploaded: records.iter().map(FileInfo::from).collect(),
    }))
}

/// POST /file/upload/chunk/init - Open a chunked upload session.
#[utoipa::path(
    post,
    path = "/file/upload/chunk/init",
    tag = "upload",
    request_body = InitChunkRequest,
    responses(
        (status = 200, description = "Session opened", body = InitChunkResponse),
        (status = 400, description = "Invalid request or chunked upload disabled"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = []))
)]
pub async fn init_chunk_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<InitChunkRequest>,
) -> Result<ApiResponse<InitChunkResponse>, ApiError> {
    let session = state.uploads().init_session(&user, &req.into()).await?;
    Ok(ApiResponse::ok(InitChunkResponse::from(&session)))
}

/// POST /file/upload/chunk - Upload one chunk.
#[utoipa::path(
    post,
    path = "/file/upload/chunk",
    tag = "upload",
    request_body(content = inline(Object), content_type = "multipart/form-data", description = "`uploadId`, `chunkIndex` and a `chunk` part"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkUploadResponse),
        (status = 400, description = "Invalid chunk or session not open"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown upload id")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_chunk(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<ChunkUploadResponse>, ApiError> {
    let mut upload_id: Option<String> = None;
    let mut chunk_index: Option<String> = None;
    let mut data: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or("") {
            "uploadId" | "upload_id" => {
                upload_id = Some(field.text().await.map_err(multipart_error)?);
            }
            "chunkIndex" | "chunk_index" => {
                chunk_index = Some(field.text().await.map_err(multipart_error)?);
            }
            "chunk" | "file" => {
                data = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            _ => {}
        }
    }

    let upload_id = upload_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("uploadId is required"))?;
    let chunk_index: u32 = chunk_index
        .ok_or_else(|| ApiError::bad_request("chunkIndex is required"))?
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request("chunkIndex must be a non-negative integer"))?;
    let data = data.ok_or_else(|| ApiError::bad_request("No chunk data provided"))?;

    let receipt = state
        .uploads()
        .accept_chunk(&user, &upload_id, chunk_index, &data)
        .await?;

    Ok(ApiResponse::ok(ChunkUploadResponse {
        chunk_index: receipt.chunk_index,
        chunk_hash: receipt.chunk_hash,
    }))
}

/// POST /file/upload/chunk/merge - Assemble the chunks into a file.
#[utoipa::path(
    post,
    path = "/file/upload/chunk/merge",
    tag = "upload",
    request_body = MergeChunksRequest,
    responses(
        (status = 200, description = "File assembled", body = FileInfo),
        (status = 400, description = "Invalid request or missing chunks"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown upload id"),
        (status = 409, description = "Merge already in progress")
    ),
    security(("bearer_auth" = []))
)]
pub async fn merge_chunks(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<MergeChunksRequest>,
) -> Result<ApiResponse<FileInfo>, ApiError> {
    let record = state.merger().merge(&user, &req.into()).await?;
    Ok(ApiResponse::ok(FileInfo::from(&record)))
}

/// POST /file/upload/chunk/abort - Cancel a chunked upload.
#[utoipa::path(
    post,
    path = "/file/upload/chunk/abort",
    tag = "upload",
    request_body = AbortChunkRequest,
    responses(
        (status = 200, description = "Session aborted"),
        (status = 400, description = "Session already finished"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown upload id"),
        (status = 409, description = "Merge in progress")
    ),
    security(("bearer_auth" = []))
)]
pub async fn abort_chunk_upload(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    ValidatedJson(req): ValidatedJson<AbortChunkRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state.uploads().abort(&user, &req.upload_id).await?;
    Ok(ApiResponse::ok(()).message("Upload aborted"))
}

/// GET /file/upload/chunk/{upload_id} - Session status and received chunks.
#[utoipa::path(
    get,
    path = "/file/upload/chunk/{upload_id}",
    tag = "upload",
    params(("upload_id" = String, Path, description = "Upload session id")),
    responses(
        (status = 200, description = "Session status", body = UploadStatusResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Session belongs to another user"),
        (status = 404, description = "Unknown upload id")
    ),
    security(("bearer_auth" = []))
)]
pub async fn chunk_upload_status(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(upload_id): Path<String>,
) -> Result<ApiResponse<UploadStatusResponse>, ApiError> {
    let progress = state.uploads().session_progress(&user, &upload_id).await?;
    Ok(ApiResponse::ok(UploadStatusResponse::from(&progress)))
}
