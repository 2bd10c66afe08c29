//! Merge engine: assemble staged chunks into a catalog file.
//!
//! A merge claims its session with the `open -> merging` transition before
//! reading any chunk. Chunks are appended in index order into a freshly
//! allocated path, the result is hashed from disk, and the file record, the
//! owner permission and the session completion commit in one transaction.

use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::auth::CurrentUser;
use crate::config::{MissingChunkPolicy, UploadConfig};
use crate::db::Database;
use crate::{DepotError, Result};

use super::catalog::{insert_with_owner, FileRecord, NewFile};
use super::chunk_store::ChunkStore;
use super::hasher::hash_file;
use super::session::{complete_merge, UploadSessionRepository};
use super::storage::{FileStorage, StoredPath};
use super::upload::{discard, require_open_session, validate_description, validate_file_name};

/// Request data for finishing a chunked upload.
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub upload_id: String,
    /// Original file name to record.
    pub file_name: String,
    /// Declared total size in bytes.
    pub file_size: u64,
    /// Declared number of chunks; must match the session.
    pub chunk_count: u32,
    pub description: Option<String>,
}

/// Merge engine over the chunk staging area and the file storage.
pub struct MergeEngine<'a> {
    db: &'a Database,
    storage: &'a FileStorage,
    chunks: &'a ChunkStore,
    config: &'a UploadConfig,
}

impl<'a> MergeEngine<'a> {
    /// Create a new MergeEngine.
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

    /// Merge all chunks of a session into a new catalog file.
    ///
    /// Returns [`DepotError::MergeInProgress`] when another request holds the
    /// session. Any failure before the record commits hands the session back
    /// so the client can retry.
    pub async fn merge(&self, user: &CurrentUser, request: &MergeRequest) -> Result<FileRecord> {
        if !self.config.enable_chunked_upload {
            return Err(DepotError::FeatureDisabled("chunked upload".to_string()));
        }
        let name = validate_file_name(&request.file_name)?;
        if let Some(ref desc) = request.description {
            validate_description(desc)?;
        }

        let session =
            require_open_session(self.db, user, &request.upload_id, chrono::Utc::now()).await?;
        if i64::from(request.chunk_count) != session.declared_chunk_count {
            return Err(DepotError::Validation(format!(
                "chunkCount {} does not match the session ({})",
                request.chunk_count, session.declared_chunk_count
            )));
        }

        let sessions = UploadSessionRepository::new(self.db.pool());
        if !sessions.begin_merge(&session.id).await? {
            return Err(DepotError::MergeInProgress(session.id));
        }
        info!(upload_id = %session.id, user_id = %user.id, "Merge started");

        let record = match self.assemble(user, request, &name, session.declared_size).await {
            Ok(record) => record,
            Err(e) => {
                if let Err(release) = sessions.release_merge(&session.id).await {
                    warn!(upload_id = %session.id, error = %release, "Failed to release merge");
                }
                return Err(e);
            }
        };

        if let Err(e) = self.chunks.remove_session(&session.id).await {
            warn!(upload_id = %session.id, error = %e, "Failed to remove staging directory");
        }

        info!(
            upload_id = %session.id,
            file_id = %record.id,
            size = record.size,
            "Merge completed"
        );
        Ok(record)
    }

    async fn assemble(
        &self,
        user: &CurrentUser,
        request: &MergeRequest,
        name: &str,
        declared_size: i64,
    ) -> Result<FileRecord> {
        let upload_id = request.upload_id.as_str();

        if self.config.missing_chunk_policy == MissingChunkPolicy::Abort {
            let missing = self
                .chunks
                .missing_chunks(upload_id, request.chunk_count)
                .await?;
            if !missing.is_empty() {
                return Err(DepotError::IncompleteUpload { missing });
            }
        }

        let stored = self.storage.allocate(name).await?;
        let written = match self.concatenate(upload_id, request.chunk_count, &stored).await {
            Ok(written) => written,
            Err(e) => {
                discard(self.storage, &stored.relative).await;
                return Err(e);
            }
        };

        match self
            .finalize(user, request, name, &stored, written, declared_size)
            .await
        {
            Ok(record) => Ok(record),
            Err(e) => {
                discard(self.storage, &stored.relative).await;
                Err(e)
            }
        }
    }

    /// Append chunks `0..chunk_count` to the output file in order.
    ///
    /// Returns the number of bytes written. The file is synced and closed
    /// before returning.
    async fn concatenate(&self, upload_id: &str, chunk_count: u32, stored: &StoredPath) -> Result<u64> {
        let mut output = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&stored.absolute)
            .await?;

        let mut written = 0u64;
        for index in 0..chunk_count {
            match self.chunks.open_chunk(upload_id, index).await? {
                Some(mut chunk) => {
                    written += tokio::io::copy(&mut chunk, &mut output).await?;
                }
                None if self.config.missing_chunk_policy == MissingChunkPolicy::Skip => {
                    warn!(upload_id, chunk_index = index, "Chunk missing, skipped");
                }
                None => return Err(DepotError::IncompleteUpload { missing: vec![index] }),
            }
        }

        output.flush().await?;
        output.sync_all().await?;
        drop(output);
        Ok(written)
    }

    async fn finalize(
        &self,
        user: &CurrentUser,
        request: &MergeRequest,
        name: &str,
        stored: &StoredPath,
        written: u64,
        declared_size: i64,
    ) -> Result<FileRecord> {
        if self.config.enforce_declared_size && written as i64 != declared_size {
            return Err(DepotError::Validation(format!(
                "assembled size {written} does not match declared size {declared_size}"
            )));
        }

        let checksum = hash_file(&stored.absolute).await?;
        let mut new_file = NewFile::new(name, &stored.relative, written as i64, checksum, &user.id);
        if let Some(ref desc) = request.description {
            new_file = new_file.with_description(desc);
        }

        let mut tx = self.db.pool().begin().await?;
        let record = insert_with_owner(&mut *tx, &new_file).await?;
        complete_merge(&mut *tx, &request.upload_id, &record.id).await?;
        tx.commit().await?;
        Ok(record)
    }
}
