//! API handlers.

pub mod admin;
pub mod download;
pub mod files;
pub mod upload;

pub use admin::*;
pub use download::*;
pub use files::*;
pub use upload::*;

use std::sync::Arc;

use crate::cache::{MemoryCache, SharedCache};
use crate::config::{Config, UploadConfig};
use crate::db::Database;
use crate::download::DownloadTokenBroker;
use crate::file::{ChunkStore, FileStorage, MergeEngine, UploadService};
use crate::Result;

/// Shared state for all handlers.
pub struct AppState {
    /// Database handle.
    pub db: Database,
    /// Final file storage.
    pub storage: FileStorage,
    /// Chunk staging area.
    pub chunks: ChunkStore,
    /// Upload limits and policies.
    pub upload: UploadConfig,
    /// Download token issuer.
    pub broker: DownloadTokenBroker,
}

impl AppState {
    /// Build state from configuration with an in-process cache.
    pub fn new(config: &Config, db: Database) -> Result<Self> {
        Self::with_cache(config, db, Arc::new(MemoryCache::new()))
    }

    /// Build state from configuration using `cache` for tokens.
    pub fn with_cache(config: &Config, db: Database, cache: Arc<dyn SharedCache>) -> Result<Self> {
        Ok(Self {
            db,
            storage: FileStorage::new(&config.upload.upload_dir)?,
            chunks: ChunkStore::new(&config.upload.chunk_dir)?,
            upload: config.upload.clone(),
            broker: DownloadTokenBroker::new(
                &config.download,
                config.web.public_base_url.as_deref(),
                cache,
            ),
        })
    }

    /// Upload service borrowing this state.
    pub fn uploads(&self) -> UploadService<'_> {
        UploadService::new(&self.db, &self.storage, &self.chunks, &self.upload)
    }

    /// Merge engine borrowing this state.
    pub fn merger(&self) -> MergeEngine<'_> {
        MergeEngine::new(&self.db, &self.storage, &self.chunks, &self.upload)
    }
}
