//! Response DTOs for the Web API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::file::{FileRecord, FileStatus, FileTag, SessionProgress, UploadSession};

// ============================================================================
// Envelope
// ============================================================================

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 response.
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, "Success", data)
    }

    /// 201 response.
    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, "Created", data)
    }

    /// Response with an explicit status and message.
    pub fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            data,
        }
    }

    /// Replace the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

/// Pagination metadata.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub page_size: u32,
    /// Total number of items.
    pub total: u64,
}

// ============================================================================
// File DTOs
// ============================================================================

/// A stored file as returned by upload and merge.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    /// Path relative to the upload root.
    pub path: String,
    /// SHA-256 hex digest.
    pub checksum: String,
    pub size: i64,
    /// Category derived from the extension.
    #[serde(rename = "type")]
    pub file_type: String,
}

impl From<&FileRecord> for FileInfo {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            path: record.storage_path.clone(),
            checksum: record.checksum.clone(),
            size: record.size,
            file_type: record.mime_category.clone(),
        }
    }
}

/// Result of a multiple-file upload.
#[derive(Debug, Serialize, ToSchema)]
pub struct MultipleUploadResponse {
    pub uploaded: Vec<FileInfo>,
}

/// Public projection of an active file.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicFileResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub extension: String,
    pub size: i64,
    pub description: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub tags: Vec<FileTag>,
    pub created_at: String,
}

impl From<&FileRecord> for PublicFileResponse {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            file_type: record.mime_category.clone(),
            extension: record.extension.clone(),
            size: record.size,
            description: record.description.clone(),
            tags: record.tags.0.clone(),
            created_at: record.created_at.to_rfc3339(),
        }
    }
}

/// Full file metadata for owners and admins.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileDetailResponse {
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub extension: String,
    pub size: i64,
    pub checksum: String,
    pub version: i64,
    pub created_by: String,
    #[schema(value_type = String)]
    pub status: FileStatus,
    #[schema(value_type = Vec<Object>)]
    pub tags: Vec<FileTag>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&FileRecord> for FileDetailResponse {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            path: record.storage_path.clone(),
            file_type: record.mime_category.clone(),
            extension: record.extension.clone(),
            size: record.size,
            checksum: record.checksum.clone(),
            version: record.version,
            created_by: record.created_by.clone(),
            status: record.status,
            tags: record.tags.0.clone(),
            description: record.description.clone(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Page of files for the admin listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct FileListResponse {
    pub items: Vec<FileDetailResponse>,
    pub meta: PaginationMeta,
}

// ============================================================================
// Chunked upload DTOs
// ============================================================================

/// Result of opening an upload session.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkResponse {
    pub upload_id: String,
    pub chunk_count: i64,
    pub expires_at: String,
}

impl From<&UploadSession> for InitChunkResponse {
    fn from(session: &UploadSession) -> Self {
        Self {
            upload_id: session.id.clone(),
            chunk_count: session.declared_chunk_count,
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

/// Result of storing one chunk.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChunkUploadResponse {
    pub chunk_index: u32,
    /// SHA-256 of the stored chunk.
    pub chunk_hash: String,
}

/// State of an upload session.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub status: String,
    pub file_name: String,
    pub file_size: i64,
    pub chunk_count: i64,
    pub received_chunks: Vec<u32>,
    /// Catalog file created by the merge, once completed.
    pub file_id: Option<String>,
    pub expires_at: String,
}

impl From<&SessionProgress> for UploadStatusResponse {
    fn from(progress: &SessionProgress) -> Self {
        let session = &progress.session;
        Self {
            upload_id: session.id.clone(),
            status: session.status.to_string(),
            file_name: session.file_name.clone(),
            file_size: session.declared_size,
            chunk_count: session.declared_chunk_count,
            received_chunks: progress.received_chunks.clone(),
            file_id: session.file_id.clone(),
            expires_at: session.expires_at.to_rfc3339(),
        }
    }
}

// ============================================================================
// Download DTOs
// ============================================================================

/// Result of a download token request.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTokenResponse {
    /// Link that redeems the token once.
    pub download_url: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}
