//! Concurrency tests for filedepot.
//!
//! Chunk uploads for one session may arrive in parallel, and several merge
//! requests may race for the same session; exactly one merge must win.

use std::sync::Arc;

use filedepot::file::{hash_bytes, FileRepository, InitSessionRequest, MergeRequest};
use filedepot::web::AppState;
use filedepot::{Config, CurrentUser, Database, DepotError, Role};
use tempfile::TempDir;

async fn setup_state() -> (Arc<AppState>, TempDir) {
    let temp = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.upload.upload_dir = temp.path().join("uploads").to_string_lossy().into_owned();
    config.upload.chunk_dir = temp.path().join("chunks").to_string_lossy().into_owned();
    config.upload.allowed_types = vec!["*/*".to_string()];

    let db = Database::open_in_memory().await.unwrap();
    (Arc::new(AppState::new(&config, db).unwrap()), temp)
}

fn alice() -> CurrentUser {
    CurrentUser::new("alice", Role::User)
}

#[tokio::test]
async fn test_parallel_chunks_then_racing_merges() {
    let (state, _temp) = setup_state().await;

    const NUM_CHUNKS: u32 = 16;
    const NUM_MERGERS: usize = 8;

    let session = state
        .uploads()
        .init_session(
            &alice(),
            &InitSessionRequest {
                file_name: "parallel.bin".to_string(),
                file_size: u64::from(NUM_CHUNKS) * 4,
                chunk_count: NUM_CHUNKS,
            },
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for index in (0..NUM_CHUNKS).rev() {
        let state = Arc::clone(&state);
        let upload_id = session.id.clone();
        handles.push(tokio::spawn(async move {
            let bytes = format!("{index:04}");
            state
                .uploads()
                .accept_chunk(&alice(), &upload_id, index, bytes.as_bytes())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let request = MergeRequest {
        upload_id: session.id.clone(),
        file_name: "parallel.bin".to_string(),
        file_size: u64::from(NUM_CHUNKS) * 4,
        chunk_count: NUM_CHUNKS,
        description: None,
    };

    let mut handles = Vec::new();
    for _ in 0..NUM_MERGERS {
        let state = Arc::clone(&state);
        let request = request.clone();
        handles.push(tokio::spawn(async move {
            state.merger().merge(&alice(), &request).await
        }));
    }

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => winners.push(record),
            Err(DepotError::MergeInProgress(_)) | Err(DepotError::Validation(_)) => {}
            Err(e) => panic!("unexpected merge error: {e}"),
        }
    }
    assert_eq!(winners.len(), 1, "exactly one merge must succeed");

    let expected: String = (0..NUM_CHUNKS).map(|i| format!("{i:04}")).collect();
    let record = &winners[0];
    assert_eq!(record.checksum, hash_bytes(expected.as_bytes()));
    let stored = state.storage.resolve(&record.storage_path).unwrap();
    assert_eq!(tokio::fs::read(stored).await.unwrap(), expected.as_bytes());

    let query = filedepot::file::FileQuery {
        status: None,
        created_by: Some("alice".to_string()),
        page: 1,
        page_size: 50,
    };
    let (_, total) = FileRepository::new(state.db.pool()).list(&query).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_parallel_single_uploads_get_distinct_paths() {
    let (state, _temp) = setup_state().await;

    const NUM_FILES: usize = 10;

    let mut handles = Vec::new();
    for i in 0..NUM_FILES {
        let state = Arc::clone(&state);
        handles.push(tokio::spawn(async move {
            state
                .uploads()
                .upload_single(&alice(), "same-name.txt", format!("body {i}").as_bytes(), None)
                .await
                .unwrap()
        }));
    }

    let mut paths = Vec::new();
    for handle in handles {
        paths.push(handle.await.unwrap().storage_path);
    }
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), NUM_FILES);
}
