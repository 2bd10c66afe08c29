//! OpenAPI description of the HTTP surface.
//!
//! Handler paths are relative to a version prefix; the same routes are
//! mounted under `/dev`, `/v1`, `/v2` and `/api`.

use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use super::dto;
use super::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "filedepot API",
        description = "Chunked uploads, merge and one-time download links."
    ),
    servers(
        (url = "/api", description = "Current version"),
        (url = "/v2"),
        (url = "/v1"),
        (url = "/dev")
    ),
    paths(
        handlers::upload::upload_single,
        handlers::upload::upload_multiple,
        handlers::upload::init_chunk_upload,
        handlers::upload::upload_chunk,
        handlers::upload::merge_chunks,
        handlers::upload::abort_chunk_upload,
        handlers::upload::chunk_upload_status,
        handlers::download::issue_download_token,
        handlers::download::download_file,
        handlers::files::get_public_file,
        handlers::files::update_file,
        handlers::files::delete_file,
        handlers::admin::admin_list_files,
    ),
    components(schemas(
        dto::InitChunkRequest,
        dto::MergeChunksRequest,
        dto::AbortChunkRequest,
        dto::DownloadTokenRequest,
        dto::UpdateFileRequest,
        dto::FileInfo,
        dto::MultipleUploadResponse,
        dto::InitChunkResponse,
        dto::ChunkUploadResponse,
        dto::UploadStatusResponse,
        dto::DownloadTokenResponse,
        dto::PublicFileResponse,
        dto::FileDetailResponse,
        dto::FileListResponse,
        dto::PaginationMeta,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "upload", description = "Single, multiple and chunked uploads"),
        (name = "download", description = "One-time download links"),
        (name = "files", description = "File metadata"),
        (name = "admin", description = "Administration")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
