//! Upload service: single-request uploads and chunked upload sessions.
//!
//! Single uploads are written straight to their final location. Chunked
//! uploads go through a durable session row plus a staging directory and
//! are finalized by [`MergeEngine`](super::MergeEngine).

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::auth::CurrentUser;
use crate::config::UploadConfig;
use crate::db::Database;
use crate::{DepotError, Result};

use super::catalog::{FileRecord, FileRepository, NewFile};
use super::category::is_allowed_type;
use super::chunk_store::ChunkStore;
use super::hasher::hash_file;
use super::session::{NewUploadSession, SessionStatus, UploadSession, UploadSessionRepository};
use super::storage::{sanitize_file_name, FileStorage};
use super::{MAX_CHUNK_COUNT, MAX_DESCRIPTION_LENGTH, MAX_FILENAME_LENGTH};

/// Request data for starting a chunked upload.
#[derive(Debug, Clone)]
pub struct InitSessionRequest {
    /// Original file name.
    pub file_name: String,
    /// Declared total size in bytes.
    pub file_size: u64,
    /// Declared number of chunks.
    pub chunk_count: u32,
}

/// Result of storing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReceipt {
    pub chunk_index: u32,
    /// SHA-256 of the stored chunk bytes.
    pub chunk_hash: String,
}

/// A session together with the chunk indices received so far.
#[derive(Debug, Clone)]
pub struct SessionProgress {
    pub session: UploadSession,
    pub received_chunks: Vec<u32>,
}

/// Upload service for single files and chunked sessions.
pub struct UploadService<'a> {
    db: &'a Database,
    storage: &'a FileStorage,
    chunks: &'a ChunkStore,
    config: &'a UploadConfig,
}

impl<'a> UploadService<'a> {
    /// Create a new UploadService.
    pub fn new(
        db: &'a Database,
        storage: &'a FileStorage,
        chunks: &'a ChunkStore,
        config: &'a UploadConfig,
    ) -> Self {
        Self {
            db,
            storage,
            chunks,
            config,
        }
    }

    /// Store a file received in one request.
    ///
    /// # Validation
    /// - File name: non-empty after sanitizing, max 255 characters
    /// - Type: must match `allowed_types`
    /// - Size: max `max_file_size`
    pub async fn upload_single(
        &self,
        user: &CurrentUser,
        file_name: &str,
        data: &[u8],
        description: Option<&str>,
    ) -> Result<FileRecord> {
        let name = validate_file_name(file_name)?;
        if let Some(desc) = description {
            validate_description(desc)?;
        }
        if !is_allowed_type(&name, &self.config.allowed_types) {
            return Err(DepotError::Validation(format!(
                "file type not allowed: {name}"
            )));
        }
        if data.len() as u64 > self.config.max_file_size {
            let max_mb = self.config.max_file_size / 1024 / 1024;
            return Err(DepotError::Validation(format!(
                "file is too large (max {max_mb}MB)"
            )));
        }

        let stored = self.storage.allocate(&name).await?;
        if let Err(e) = write_new_file(&stored.absolute, data).await {
            discard(self.storage, &stored.relative).await;
            return Err(e);
        }

        let record = match self.register(&name, &stored.relative, &stored.absolute, user, description).await {
            Ok(record) => record,
            Err(e) => {
                discard(self.storage, &stored.relative).await;
                return Err(e);
            }
        };

        info!(
            file_id = %record.id,
            user_id = %user.id,
            size = record.size,
            "Stored single upload"
        );
        Ok(record)
    }

    /// Store several files, skipping the ones that fail.
    ///
    /// Validation failures are skipped quietly; other failures are logged and
    /// skipped so files already stored are still reported. The first such
    /// failure is returned only when nothing was stored.
    pub async fn upload_multiple(
        &self,
        user: &CurrentUser,
        files: &[(String, Vec<u8>)],
    ) -> Result<Vec<FileRecord>> {
        if files.len() > self.config.max_files_per_request {
            return Err(DepotError::Validation(format!(
                "too many files (max {})",
                self.config.max_files_per_request
            )));
        }

        let mut uploaded = Vec::with_capacity(files.len());
        let mut first_failure = None;
        for (name, data) in files {
            match self.upload_single(user, name, data, None).await {
                Ok(record) => uploaded.push(record),
                Err(DepotError::Validation(reason)) => {
                    debug!(file_name = %name, %reason, "Skipping file in batch upload");
                }
                Err(e) => {
                    warn!(file_name = %name, error = %e, "Failed to store file in batch upload");
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) if uploaded.is_empty() => Err(e),
            _ => Ok(uploaded),
        }
    }

    /// Open a chunked upload session and its staging directory.
    pub async fn init_session(
        &self,
        user: &CurrentUser,
        request: &InitSessionRequest,
    ) -> Result<UploadSession> {
        self.require_chunked()?;

        let name = validate_file_name(&request.file_name)?;
        if request.file_size == 0 {
            return Err(DepotError::Validation(
                "fileSize must be a positive integer".to_string(),
            ));
        }
        if request.chunk_count == 0 || request.chunk_count > MAX_CHUNK_COUNT {
            return Err(DepotError::Validation(format!(
                "chunkCount must be between 1 and {MAX_CHUNK_COUNT}"
            )));
        }
        if !is_allowed_type(&name, &self.config.allowed_types) {
            return Err(DepotError::Validation(format!(
                "file type not allowed: {name}"
            )));
        }
        let declared_size = i64::try_from(request.file_size)
            .map_err(|_| DepotError::Validation("fileSize is too large".to_string()))?;

        let id = ChunkStore::generate_upload_id();
        self.chunks.create_session_dir(&id).await?;

        let expires_at = i64::try_from(self.config.session_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| DepotError::Config("session_ttl_secs is out of range".to_string()))?;
        let new_session = NewUploadSession {
            id: id.clone(),
            owner_id: user.id.clone(),
            file_name: name,
            declared_size,
            declared_chunk_count: i64::from(request.chunk_count),
            expires_at,
        };

        let session = match UploadSessionRepository::new(self.db.pool())
            .create(&new_session)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Err(cleanup) = self.chunks.remove_session(&id).await {
                    warn!(upload_id = %id, error = %cleanup, "Failed to remove staging directory");
                }
                return Err(e);
            }
        };

        info!(
            upload_id = %session.id,
            user_id = %user.id,
            chunk_count = request.chunk_count,
            "Opened upload session"
        );
        Ok(session)
    }

    /// Store one chunk of an open session, replacing any earlier copy.
    pub async fn accept_chunk(
        &self,
        user: &CurrentUser,
        upload_id: &str,
        chunk_index: u32,
        data: &[u8],
    ) -> Result<ChunkReceipt> {
        self.require_chunked()?;

        let session = require_open_session(self.db, user, upload_id, Utc::now()).await?;
        if i64::from(chunk_index) >= session.declared_chunk_count {
            return Err(DepotError::Validation(format!(
                "chunkIndex {chunk_index} is out of range (chunkCount {})",
                session.declared_chunk_count
            )));
        }
        if data.is_empty() {
            return Err(DepotError::Validation("chunk is empty".to_string()));
        }
        if data.len() as u64 > self.config.chunk_max_size {
            return Err(DepotError::Validation(format!(
                "chunk is too large (max {} bytes)",
                self.config.chunk_max_size
            )));
        }

        let chunk_hash = self.chunks.write_chunk(upload_id, chunk_index, data).await?;
        debug!(upload_id, chunk_index, size = data.len(), "Stored chunk");

        Ok(ChunkReceipt {
            chunk_index,
            chunk_hash,
        })
    }

    /// Report a session and the chunks received so far. Owner only.
    pub async fn session_progress(
        &self,
        user: &CurrentUser,
        upload_id: &str,
    ) -> Result<SessionProgress> {
        let session = load_owned_session(self.db, user, upload_id).await?;
        let received_chunks = match session.status {
            SessionStatus::Open | SessionStatus::Merging => {
                self.chunks.list_chunks(upload_id).await?
            }
            SessionStatus::Completed | SessionStatus::Aborted => Vec::new(),
        };
        Ok(SessionProgress {
            session,
            received_chunks,
        })
    }

    /// Abort an open session and delete its staging directory.
    pub async fn abort(&self, user: &CurrentUser, upload_id: &str) -> Result<()> {
        let session = load_owned_session(self.db, user, upload_id).await?;

        let aborted = UploadSessionRepository::new(self.db.pool())
            .abort(&session.id)
            .await?;
        if !aborted {
            return Err(match session.status {
                SessionStatus::Merging => DepotError::MergeInProgress(session.id),
                other => DepotError::Validation(format!("upload session is {other}")),
            });
        }

        if let Err(e) = self.chunks.remove_session(&session.id).await {
            warn!(upload_id = %session.id, error = %e, "Failed to remove staging directory");
        }
        info!(upload_id = %session.id, user_id = %user.id, "Aborted upload session");
        Ok(())
    }

    /// Abort expired sessions (and abandoned merges) and remove their
    /// staging directories.
    ///
    /// Returns the number of sessions aborted.
    pub async fn collect_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = UploadSessionRepository::new(self.db.pool())
            .abort_expired(now)
            .await?;

        for id in &expired {
            if let Err(e) = self.chunks.remove_session(id).await {
                warn!(upload_id = %id, error = %e, "Failed to remove expired staging directory");
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Aborted expired upload sessions");
        }
        Ok(expired.len())
    }

    fn require_chunked(&self) -> Result<()> {
        if self.config.enable_chunked_upload {
            Ok(())
        } else {
            Err(DepotError::FeatureDisabled("chunked upload".to_string()))
        }
    }

    async fn register(
        &self,
        name: &str,
        relative: &str,
        absolute: &Path,
        user: &CurrentUser,
        description: Option<&str>,
    ) -> Result<FileRecord> {
        let checksum = hash_file(absolute).await?;
        let size = tokio::fs::metadata(absolute).await?.len() as i64;

        let mut new_file = NewFile::new(name, relative, size, checksum, &user.id);
        if let Some(desc) = description {
            new_file = new_file.with_description(desc);
        }
        FileRepository::new(self.db.pool()).create(&new_file).await
    }
}

/// Reduce a client file name to a usable one, or fail validation.
pub(crate) fn validate_file_name(file_name: &str) -> Result<String> {
    let name = sanitize_file_name(file_name)
        .ok_or_else(|| DepotError::Validation("file name is required".to_string()))?;
    if name.chars().count() > MAX_FILENAME_LENGTH {
        return Err(DepotError::Validation(format!(
            "file name must be at most {MAX_FILENAME_LENGTH} characters"
        )));
    }
    Ok(name)
}

pub(crate) fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        return Err(DepotError::Validation(format!(
            "description must be at most {MAX_DESCRIPTION_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Load a session that belongs to `user`.
pub(crate) async fn load_owned_session(
    db: &Database,
    user: &CurrentUser,
    upload_id: &str,
) -> Result<UploadSession> {
    let session = UploadSessionRepository::new(db.pool())
        .get_by_id(upload_id)
        .await?
        .ok_or_else(|| DepotError::NotFound("upload session".to_string()))?;

    if session.owner_id != user.id {
        return Err(DepotError::Permission(
            "upload session belongs to another user".to_string(),
        ));
    }
    Ok(session)
}

/// Load a session that belongs to `user` and still accepts chunks.
pub(crate) async fn require_open_session(
    db: &Database,
    user: &CurrentUser,
    upload_id: &str,
    now: DateTime<Utc>,
) -> Result<UploadSession> {
    let session = load_owned_session(db, user, upload_id).await?;
    match session.status {
        SessionStatus::Open => {}
        SessionStatus::Merging => return Err(DepotError::MergeInProgress(session.id)),
        other => {
            return Err(DepotError::Validation(format!(
                "upload session is {other}"
            )))
        }
    }
    if session.is_expired(now) {
        return Err(DepotError::Validation("upload session has expired".to_string()));
    }
    Ok(session)
}

/// Create `path` and write `data` to it, synced to disk.
async fn write_new_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Best-effort removal of a stored file after a failed upload.
pub(crate) async fn discard(storage: &FileStorage, relative: &str) {
    if let Err(e) = storage.delete(relative).await {
        warn!(path = relative, error = %e, "Failed to remove orphaned file");
    }
}
