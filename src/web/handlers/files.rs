//! File metadata handlers.

use axum::extract::{Path, Query, State};
use std::sync::Arc;

use super::AppState;
use crate::auth::{can_delete_file, filter_file_update, CurrentUser};
use crate::file::{FilePermissionRepository, FileRecord, FileRepository, FileUpdate, PermissionRole};
use crate::web::dto::{
    ApiResponse, FileDetailResponse, PublicFileQuery, PublicFileResponse, UpdateFileRequest,
    ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;
use crate::Result;

async fn load_file(state: &AppState, file_id: &str) -> Result<FileRecord> {
    FileRepository::new(state.db.pool())
        .get_by_id(file_id)
        .await?
        .ok_or_else(|| crate::DepotError::NotFound("File".to_string()))
}

async fn load_grant(
    state: &AppState,
    file_id: &str,
    user: &CurrentUser,
) -> Result<Option<PermissionRole>> {
    FilePermissionRepository::new(state.db.pool())
        .get_role(file_id, &user.id)
        .await
}

/// GET /file/public?fileId= - Public metadata of an active file.
#[utoipa::path(
    get,
    path = "/file/public",
    tag = "files",
    params(PublicFileQuery),
    responses(
        (status = 200, description = "File metadata", body = PublicFileResponse),
        (status = 403, description = "File is not active"),
        (status = 404, description = "File not found")
    )
)]
pub async fn get_public_file(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PublicFileQuery>,
) -> std::result::Result<ApiResponse<PublicFileResponse>, ApiError> {
    let file = load_file(&state, &query.file_id).await?;
    if !file.is_active() {
        return Err(ApiError::forbidden("File is not available"));
    }
    Ok(ApiResponse::ok(PublicFileResponse::from(&file)))
}

/// PATCH /file/{file_id} - Edit file metadata.
#[utoipa::path(
    patch,
    path = "/file/{file_id}",
    tag = "files",
    params(("file_id" = String, Path, description = "File ID")),
    request_body = UpdateFileRequest,
    responses(
        (status = 200, description = "Updated metadata", body = FileDetailResponse),
        (status = 400, description = "Nothing to update or invalid values"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to edit this file"),
        (status = 404, description = "File not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(file_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateFileRequest>,
) -> std::result::Result<ApiResponse<FileDetailResponse>, ApiError> {
    let file = load_file(&state, &file_id).await?;
    let grant = load_grant(&state, &file_id, &user).await?;

    let patch = FileUpdate {
        name: req.name,
        description: req.description,
        tags: req.tags,
        status: req.status,
    };
    let patch = filter_file_update(&user, &file, grant, patch).map_err(crate::DepotError::from)?;

    let updated = FileRepository::new(state.db.pool())
        .update(&file_id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("File not found"))?;

    tracing::info!(file_id = %file_id, user_id = %user.id, "File metadata updated");
    Ok(ApiResponse::ok(FileDetailResponse::from(&updated)))
}

/// DELETE /file/{file_id} - Soft-delete a file.
#[utoipa::path(
    delete,
    path = "/file/{file_id}",
    tag = "files",
    params(("file_id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to delete this file"),
        (status = 404, description = "File not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(file_id): Path<String>,
) -> std::result::Result<ApiResponse<()>, ApiError> {
    let file = load_file(&state, &file_id).await?;
    let grant = load_grant(&state, &file_id, &user).await?;
    can_delete_file(&user, &file, grant).map_err(crate::DepotError::from)?;

    FileRepository::new(state.db.pool())
        .soft_delete(&file_id)
        .await?;

    tracing::info!(file_id = %file_id, user_id = %user.id, "File deleted");
    Ok(ApiResponse::ok(()).message("File deleted"))
}
