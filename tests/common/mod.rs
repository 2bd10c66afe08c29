//! Shared helpers for the HTTP integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value;
use tempfile::TempDir;

use filedepot::web::handlers::AppState;
use filedepot::web::middleware::JwtClaims;
use filedepot::web::router::create_router;
use filedepot::{Config, Database, Role};

pub const JWT_SECRET: &str = "test-jwt-secret-for-integration";
pub const DOWNLOAD_SECRET: &str = "test-download-secret-for-integration";

/// A router under test with its state and scratch directories.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub config: Config,
    _temp: TempDir,
}

/// Configuration rooted in `temp` that accepts any file type.
pub fn create_test_config(temp: &TempDir) -> Config {
    let mut config = Config::default();
    config.web.jwt_secret = JWT_SECRET.to_string();
    config.web.api_rate_limit = 10_000;
    config.download.token_secret = DOWNLOAD_SECRET.to_string();
    config.upload.upload_dir = temp.path().join("uploads").to_string_lossy().into_owned();
    config.upload.chunk_dir = temp.path().join("chunks").to_string_lossy().into_owned();
    config.upload.allowed_types = vec!["*/*".to_string()];
    config
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Build an app after letting `adjust` tweak the test configuration.
pub async fn spawn_app_with(adjust: impl FnOnce(&mut Config)) -> TestApp {
    let temp = tempfile::tempdir().expect("tempdir");
    let mut config = create_test_config(&temp);
    adjust(&mut config);

    let db = Database::open_in_memory()
        .await
        .expect("Failed to create test database");
    let state = Arc::new(AppState::new(&config, db).expect("Failed to build state"));
    let router = create_router(Arc::clone(&state), &config.web);
    let server = TestServer::new(router).expect("Failed to create test server");

    TestApp {
        server,
        state,
        config,
        _temp: temp,
    }
}

/// Mint an access token the way the identity service would.
pub fn token_for(user_id: &str, role: Role) -> String {
    encode(
        &Header::default(),
        &JwtClaims::new(user_id, role, 3600),
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode jwt")
}

pub fn file_part(name: &str, bytes: &[u8]) -> Part {
    Part::bytes(bytes.to_vec()).file_name(name.to_string())
}

impl TestApp {
    /// Upload `bytes` as `name` through the single-file endpoint; returns `data`.
    pub async fn upload(&self, token: &str, name: &str, bytes: &[u8]) -> Value {
        let response = self
            .server
            .post("/api/file/upload/single")
            .authorization_bearer(token)
            .multipart(MultipartForm::new().add_part("file", file_part(name, bytes)))
            .await;
        assert_eq!(response.status_code(), 201, "{}", response.text());
        response.json::<Value>()["data"].clone()
    }

    /// Open a chunk session; returns the upload id.
    pub async fn init_chunks(&self, token: &str, name: &str, size: u64, count: u32) -> String {
        let response = self
            .server
            .post("/api/file/upload/chunk/init")
            .authorization_bearer(token)
            .json(&serde_json::json!({
                "fileName": name,
                "fileSize": size,
                "chunkCount": count,
            }))
            .await;
        assert_eq!(response.status_code(), 200, "{}", response.text());
        response.json::<Value>()["data"]["uploadId"]
            .as_str()
            .expect("uploadId")
            .to_string()
    }

    pub async fn send_chunk(
        &self,
        token: &str,
        upload_id: &str,
        index: u32,
        bytes: &[u8],
    ) -> TestResponse {
        let form = MultipartForm::new()
            .add_text("uploadId", upload_id.to_string())
            .add_text("chunkIndex", index.to_string())
            .add_part("chunk", file_part(&format!("chunk_{index}"), bytes));
        self.server
            .post("/api/file/upload/chunk")
            .authorization_bearer(token)
            .multipart(form)
            .await
    }

    pub async fn merge(
        &self,
        token: &str,
        upload_id: &str,
        name: &str,
        size: u64,
        count: u32,
    ) -> TestResponse {
        self.server
            .post("/api/file/upload/chunk/merge")
            .authorization_bearer(token)
            .json(&serde_json::json!({
                "uploadId": upload_id,
                "fileName": name,
                "fileSize": size,
                "chunkCount": count,
            }))
            .await
    }

    pub async fn request_download(&self, token: &str, file_id: &str) -> TestResponse {
        self.server
            .post("/api/file/download/token")
            .authorization_bearer(token)
            .json(&serde_json::json!({ "fileId": file_id }))
            .await
    }

    /// Issue a token and return the path part of the download link.
    pub async fn download_link(&self, token: &str, file_id: &str) -> String {
        let response = self.request_download(token, file_id).await;
        assert_eq!(response.status_code(), 200, "{}", response.text());
        response.json::<Value>()["data"]["downloadUrl"]
            .as_str()
            .expect("downloadUrl")
            .to_string()
    }
}
