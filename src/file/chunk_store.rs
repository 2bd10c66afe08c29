//! On-disk staging of upload chunks.
//!
//! Layout: `{chunk_dir}/{upload_id}/chunk_{index}`. Paths are built only from
//! the server-generated upload id (checked against its format) and a numeric
//! index.

use std::io;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use crate::file::hasher::hash_bytes;
use crate::{DepotError, Result};

const UPLOAD_ID_PREFIX: &str = "upload_";

/// Filesystem wrapper for per-session chunk directories.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a chunk store, creating the staging root if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Generate a new upload id: `upload_{unix_millis}_{16 hex}`.
    pub fn generate_upload_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let random: [u8; 8] = rand::random();
        format!("{UPLOAD_ID_PREFIX}{millis}_{}", hex::encode(random))
    }

    /// Check that `upload_id` has the generated shape.
    pub fn is_valid_upload_id(upload_id: &str) -> bool {
        let Some(rest) = upload_id.strip_prefix(UPLOAD_ID_PREFIX) else {
            return false;
        };
        let Some((millis, random)) = rest.split_once('_') else {
            return false;
        };
        !millis.is_empty()
            && millis.bytes().all(|b| b.is_ascii_digit())
            && random.len() == 16
            && random.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Staging directory of a session.
    pub fn session_dir(&self, upload_id: &str) -> Result<PathBuf> {
        if !Self::is_valid_upload_id(upload_id) {
            return Err(DepotError::Validation(format!(
                "malformed upload id: {upload_id}"
            )));
        }
        Ok(self.root.join(upload_id))
    }

    /// Path of chunk `index` of a session.
    pub fn chunk_path(&self, upload_id: &str, index: u32) -> Result<PathBuf> {
        Ok(self.session_dir(upload_id)?.join(format!("chunk_{index}")))
    }

    /// Create the staging directory of a session (idempotent).
    pub async fn create_session_dir(&self, upload_id: &str) -> Result<PathBuf> {
        let dir = self.session_dir(upload_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Store chunk `index`, replacing any earlier upload of the same index.
    ///
    /// The bytes go to a temporary file first and are renamed into place, so
    /// a concurrent reader sees either the old chunk or the new one. The
    /// staging directory must already exist; once it is removed, writes fail.
    /// Returns the SHA-256 of the chunk.
    pub async fn write_chunk(&self, upload_id: &str, index: u32, data: &[u8]) -> Result<String> {
        let dir = self.session_dir(upload_id)?;
        let final_path = dir.join(format!("chunk_{index}"));
        let random: [u8; 4] = rand::random();
        let temp_path = dir.join(format!(".chunk_{index}.{}.part", hex::encode(random)));

        let mut file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| staging_error(upload_id, e))?;
        if let Err(e) = write_all_synced(&mut file, data).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        drop(file);

        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(staging_error(upload_id, e));
        }

        Ok(hash_bytes(data))
    }

    /// Open chunk `index` for reading, or `None` if it was never stored.
    pub async fn open_chunk(&self, upload_id: &str, index: u32) -> Result<Option<tokio::fs::File>> {
        let path = self.chunk_path(upload_id, index)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Indices of all stored chunks, ascending.
    pub async fn list_chunks(&self, upload_id: &str) -> Result<Vec<u32>> {
        let dir = self.session_dir(upload_id)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut indices = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix("chunk_"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                indices.push(index);
            }
        }
        indices.sort_unstable();
        Ok(indices)
    }

    /// Indices in `0..expected` with no stored chunk.
    pub async fn missing_chunks(&self, upload_id: &str, expected: u32) -> Result<Vec<u32>> {
        let present = self.list_chunks(upload_id).await?;
        Ok((0..expected)
            .filter(|i| present.binary_search(i).is_err())
            .collect())
    }

    /// Recursively delete a session's staging directory.
    ///
    /// A directory that is already gone counts as success.
    pub async fn remove_session(&self, upload_id: &str) -> Result<()> {
        let dir = self.session_dir(upload_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// A missing staging directory means the session was closed underneath us.
fn staging_error(upload_id: &str, e: io::Error) -> DepotError {
    if e.kind() == io::ErrorKind::NotFound {
        DepotError::Validation(format!("upload session {upload_id} is not open"))
    } else {
        e.into()
    }
}

async fn write_all_synced(file: &mut tokio::fs::File, data: &[u8]) -> io::Result<()> {
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn create_test_store() -> (ChunkStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ChunkStore::new(temp_dir.path().join("chunks")).unwrap();
        (store, temp_dir)
    }

    async fn open_session(store: &ChunkStore) -> String {
        let id = ChunkStore::generate_upload_id();
        store.create_session_dir(&id).await.unwrap();
        id
    }

    async fn read_chunk(store: &ChunkStore, id: &str, index: u32) -> Vec<u8> {
        let mut file = store.open_chunk(id, index).await.unwrap().unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_generated_upload_id_is_valid() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;
        assert!(id.starts_with("upload_"));
        assert!(ChunkStore::is_valid_upload_id(&id));
    }

    #[test]
    fn test_malformed_upload_ids_rejected() {
        for id in [
            "",
            "upload_",
            "upload_123",
            "upload_123_short",
            "upload_123_0123456789ABCDEF",
            "upload_12a_0123456789abcdef",
            "../upload_1_0123456789abcdef",
            "upload_1_0123456789abcdef/..",
        ] {
            assert!(!ChunkStore::is_valid_upload_id(id), "{id}");
        }
        assert!(ChunkStore::is_valid_upload_id("upload_1_0123456789abcdef"));
    }

    #[test]
    fn test_session_dir_rejects_traversal() {
        let (store, _temp) = create_test_store();
        assert!(matches!(
            store.session_dir("../../etc"),
            Err(DepotError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_write_and_read_chunk() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;

        let digest = store.write_chunk(&id, 0, b"AAA").await.unwrap();
        assert_eq!(digest, hash_bytes(b"AAA"));
        assert_eq!(read_chunk(&store, &id, 0).await, b"AAA");
        assert!(store
            .chunk_path(&id, 0)
            .unwrap()
            .ends_with(format!("{id}/chunk_0")));
    }

    #[tokio::test]
    async fn test_overwrite_keeps_latest_bytes() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;

        store.write_chunk(&id, 1, b"old bytes").await.unwrap();
        let digest = store.write_chunk(&id, 1, b"new").await.unwrap();

        assert_eq!(digest, hash_bytes(b"new"));
        assert_eq!(read_chunk(&store, &id, 1).await, b"new");
        assert_eq!(store.list_chunks(&id).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_list_and_missing_chunks() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;

        assert!(store.list_chunks(&id).await.unwrap().is_empty());

        for index in [3u32, 0, 10] {
            store.write_chunk(&id, index, b"x").await.unwrap();
        }
        assert_eq!(store.list_chunks(&id).await.unwrap(), vec![0, 3, 10]);
        assert_eq!(store.missing_chunks(&id, 5).await.unwrap(), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn test_open_missing_chunk_is_none() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;
        assert!(store.open_chunk(&id, 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_session_is_idempotent() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;
        store.write_chunk(&id, 0, b"x").await.unwrap();

        store.remove_session(&id).await.unwrap();
        assert!(!store.session_dir(&id).unwrap().exists());
        store.remove_session(&id).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_removal_does_not_recreate_directory() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;
        store.write_chunk(&id, 0, b"x").await.unwrap();
        store.remove_session(&id).await.unwrap();

        assert!(matches!(
            store.write_chunk(&id, 1, b"late").await,
            Err(DepotError::Validation(_))
        ));
        assert!(!store.session_dir(&id).unwrap().exists());
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_distinct_indices() {
        let (store, _temp) = create_test_store();
        let id = open_session(&store).await;

        let mut handles = Vec::new();
        for index in 0..8u32 {
            let store = store.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .write_chunk(&id, index, format!("chunk-{index}").as_bytes())
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list_chunks(&id).await.unwrap(), (0..8).collect::<Vec<_>>());
    }
}
