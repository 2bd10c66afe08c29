//! Request DTOs for the Web API.
//!
//! Field names are camelCase on the wire; the snake_case spelling is
//! accepted as an alias.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::validation::no_control_chars;
use crate::file::{FileStatus, FileTag, InitSessionRequest, MergeRequest, MAX_CHUNK_COUNT};

/// Open a chunked upload session.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitChunkRequest {
    #[serde(alias = "file_name")]
    #[validate(length(min = 1, max = 255), custom(function = "no_control_chars"))]
    pub file_name: String,
    #[serde(alias = "file_size")]
    #[validate(range(min = 1))]
    pub file_size: u64,
    #[serde(alias = "chunk_count")]
    #[validate(range(min = 1, max = MAX_CHUNK_COUNT))]
    pub chunk_count: u32,
}

impl From<InitChunkRequest> for InitSessionRequest {
    fn from(req: InitChunkRequest) -> Self {
        Self {
            file_name: req.file_name,
            file_size: req.file_size,
            chunk_count: req.chunk_count,
        }
    }
}

/// Merge the chunks of a session into one file.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeChunksRequest {
    #[serde(alias = "upload_id")]
    #[validate(length(min = 1, max = 128))]
    pub upload_id: String,
    #[serde(alias = "file_name")]
    #[validate(length(min = 1, max = 255), custom(function = "no_control_chars"))]
    pub file_name: String,
    #[serde(alias = "file_size")]
    pub file_size: u64,
    #[serde(alias = "chunk_count")]
    #[validate(range(min = 1, max = MAX_CHUNK_COUNT))]
    pub chunk_count: u32,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

impl From<MergeChunksRequest> for MergeRequest {
    fn from(req: MergeChunksRequest) -> Self {
        Self {
            upload_id: req.upload_id,
            file_name: req.file_name,
            file_size: req.file_size,
            chunk_count: req.chunk_count,
            description: req.description,
        }
    }
}

/// Cancel a chunked upload.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AbortChunkRequest {
    #[serde(alias = "upload_id")]
    #[validate(length(min = 1, max = 128))]
    pub upload_id: String,
}

/// Request a one-time download link.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTokenRequest {
    #[serde(alias = "file_id")]
    #[validate(length(min = 1, max = 64))]
    pub file_id: String,
}

/// Partial metadata update.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFileRequest {
    #[validate(length(max = 255), custom(function = "no_control_chars"))]
    pub name: Option<String>,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub tags: Option<Vec<FileTag>>,
    #[schema(value_type = Option<String>)]
    pub status: Option<FileStatus>,
}

/// `?fileId=` for the public projection.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PublicFileQuery {
    #[serde(alias = "file_id")]
    pub file_id: String,
}

/// `?key=` carrying the download token.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    #[serde(default)]
    pub key: Option<String>,
}

/// Admin file listing parameters.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct AdminFilesQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size", alias = "page_size")]
    pub page_size: u32,
    #[serde(default)]
    #[param(value_type = Option<String>)]
    pub status: Option<FileStatus>,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    20
}

impl AdminFilesQuery {
    /// Page number, at least 1.
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Page size clamped to `1..=200`.
    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, 200)
    }
}
