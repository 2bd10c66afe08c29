//! Admin handlers.

use axum::extract::{Query, State};
use std::sync::Arc;

use super::AppState;
use crate::auth::require_admin;
use crate::file::{FileQuery, FileRepository};
use crate::web::dto::{AdminFilesQuery, ApiResponse, FileDetailResponse, FileListResponse, PaginationMeta};
use crate::web::error::ApiError;
use crate::web::middleware::AuthUser;

/// GET /admin/files - List every file, newest first.
#[utoipa::path(
    get,
    path = "/admin/files",
    tag = "admin",
    params(AdminFilesQuery),
    responses(
        (status = 200, description = "Page of files", body = FileListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_list_files(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(query): Query<AdminFilesQuery>,
) -> Result<ApiResponse<FileListResponse>, ApiError> {
    require_admin(Some(&user)).map_err(crate::DepotError::from)?;

    let filter = FileQuery {
        status: query.status,
        created_by: None,
        page: query.page(),
        page_size: query.page_size(),
    };
    let (files, total) = FileRepository::new(state.db.pool()).list(&filter).await?;

    Ok(ApiResponse::ok(FileListResponse {
        items: files.iter().map(FileDetailResponse::from).collect(),
        meta: PaginationMeta {
            page: filter.page,
            page_size: filter.page_size,
            total: total.max(0) as u64,
        },
    }))
}
