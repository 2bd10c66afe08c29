//! File handling for filedepot.
//!
//! This module provides:
//! - Content hashing (SHA-256, streamed)
//! - Finalized file storage under the upload root
//! - Chunk staging for multi-request uploads
//! - The file catalog and per-file permissions
//! - Upload sessions, single uploads and the merge engine

pub mod catalog;
pub mod category;
pub mod chunk_store;
pub mod hasher;
pub mod merge;
pub mod session;
pub mod storage;
pub mod upload;

pub use catalog::{
    FilePermission, FilePermissionRepository, FileQuery, FileRecord, FileRepository, FileStatus,
    FileTag, FileTags, FileUpdate, NewFile, PermissionRole,
};
pub use category::{extension_of, is_allowed_type, FileCategory};
pub use chunk_store::ChunkStore;
pub use hasher::{hash_bytes, hash_file, hash_reader};
pub use merge::{MergeEngine, MergeRequest};
pub use session::{NewUploadSession, SessionStatus, UploadSession, UploadSessionRepository};
pub use storage::{sanitize_file_name, FileStorage, StoredPath};
pub use upload::{ChunkReceipt, InitSessionRequest, SessionProgress, UploadService};

/// Maximum length for a file name (in characters).
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Maximum length for a file description (in characters).
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Upper bound on the declared chunk count of one session.
pub const MAX_CHUNK_COUNT: u32 = 100_000;
