//! Configuration module for filedepot.

use serde::Deserialize;
use std::path::Path;

use crate::{DepotError, Result};

/// Web API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Host address to bind.
    #[serde(default = "default_web_host")]
    pub host: String,
    /// Port number for the API.
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// CORS allowed origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Secret used to verify caller identity tokens.
    #[serde(default)]
    pub jwt_secret: String,
    /// Rate limit for API endpoints (requests per minute per IP).
    #[serde(default = "default_api_rate_limit")]
    pub api_rate_limit: u32,
    /// Base URL prefixed to generated download links, e.g. `https://files.example.com`.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_web_host() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    4000
}

fn default_api_rate_limit() -> u32 {
    300
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            cors_origins: vec![],
            jwt_secret: String::new(),
            api_rate_limit: default_api_rate_limit(),
            public_base_url: None,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/filedepot.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// What a merge does when a chunk index has no stored chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MissingChunkPolicy {
    /// Refuse to merge and report the missing indices.
    #[default]
    Abort,
    /// Log and skip the missing index.
    Skip,
}

/// Upload and chunk staging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Root directory for finalized files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
    /// Root directory for chunk staging.
    #[serde(default = "default_chunk_dir")]
    pub chunk_dir: String,
    /// Maximum size of a single-request upload in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Maximum size of one chunk in bytes.
    #[serde(default = "default_chunk_max_size")]
    pub chunk_max_size: u64,
    /// Maximum number of files accepted by one multiple-upload request.
    #[serde(default = "default_max_files_per_request")]
    pub max_files_per_request: usize,
    /// Allowed type patterns (`image/*`, `application/pdf`, `*/*`).
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Whether chunked uploads are accepted.
    #[serde(default = "default_enable_chunked_upload")]
    pub enable_chunked_upload: bool,
    /// Behavior when a chunk is missing at merge time.
    #[serde(default)]
    pub missing_chunk_policy: MissingChunkPolicy,
    /// Reject merges whose assembled size differs from the declared size.
    #[serde(default)]
    pub enforce_declared_size: bool,
    /// Lifetime of an upload session in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
    /// Interval of the staging garbage collector in seconds.
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
}

fn default_upload_dir() -> String {
    "./resource/uploads".to_string()
}

fn default_chunk_dir() -> String {
    "./resource/chunks".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_chunk_max_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

fn default_max_files_per_request() -> usize {
    10
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/*".to_string(),
        "text/*".to_string(),
        "application/pdf".to_string(),
    ]
}

fn default_enable_chunked_upload() -> bool {
    true
}

fn default_session_ttl() -> u64 {
    86_400 // 24 hours
}

fn default_gc_interval() -> u64 {
    3600
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            chunk_dir: default_chunk_dir(),
            max_file_size: default_max_file_size(),
            chunk_max_size: default_chunk_max_size(),
            max_files_per_request: default_max_files_per_request(),
            allowed_types: default_allowed_types(),
            enable_chunked_upload: default_enable_chunked_upload(),
            missing_chunk_policy: MissingChunkPolicy::default(),
            enforce_declared_size: false,
            session_ttl_secs: default_session_ttl(),
            gc_interval_secs: default_gc_interval(),
        }
    }
}

/// Download token configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadConfig {
    /// Secret used to sign download tokens.
    #[serde(default)]
    pub token_secret: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    /// Minimum seconds between two token issuances for the same user and file.
    #[serde(default = "default_token_rate_limit")]
    pub rate_limit_secs: u64,
    /// API prefix used when building download URLs.
    #[serde(default = "default_route_prefix")]
    pub route_prefix: String,
}

fn default_token_ttl() -> u64 {
    300 // 5 minutes
}

fn default_token_rate_limit() -> u64 {
    20
}

fn default_route_prefix() -> String {
    "/dev".to_string()
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_secs: default_token_ttl(),
            rate_limit_secs: default_token_rate_limit(),
            route_prefix: default_route_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Web API configuration.
    #[serde(default)]
    pub web: WebConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Upload configuration.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Download token configuration.
    #[serde(default)]
    pub download: DownloadConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(DepotError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| DepotError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEDEPOT_JWT_SECRET`: identity token secret
    /// - `FILEDEPOT_DOWNLOAD_SECRET`: download token secret
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("FILEDEPOT_JWT_SECRET") {
            if !secret.is_empty() {
                self.web.jwt_secret = secret;
            }
        }
        if let Ok(secret) = std::env::var("FILEDEPOT_DOWNLOAD_SECRET") {
            if !secret.is_empty() {
                self.download.token_secret = secret;
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.web.jwt_secret.is_empty() {
            return Err(DepotError::Config(
                "jwt_secret is not set. \
                 Set it in config.toml or via FILEDEPOT_JWT_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.download.token_secret.is_empty() {
            return Err(DepotError::Config(
                "download token_secret is not set. \
                 Set it in config.toml or via FILEDEPOT_DOWNLOAD_SECRET environment variable."
                    .to_string(),
            ));
        }
        if self.upload.max_file_size == 0 || self.upload.chunk_max_size == 0 {
            return Err(DepotError::Config(
                "max_file_size and chunk_max_size must be positive".to_string(),
            ));
        }
        if self.upload.max_files_per_request == 0 {
            return Err(DepotError::Config(
                "max_files_per_request must be positive".to_string(),
            ));
        }
        check_range("upload.session_ttl_secs", self.upload.session_ttl_secs, MAX_SESSION_TTL_SECS)?;
        check_range("upload.gc_interval_secs", self.upload.gc_interval_secs, MAX_SESSION_TTL_SECS)?;
        check_range("download.token_ttl_secs", self.download.token_ttl_secs, MAX_TOKEN_TTL_SECS)?;
        check_range("download.rate_limit_secs", self.download.rate_limit_secs, MAX_TOKEN_TTL_SECS)?;
        Ok(())
    }
}

/// Upper bound for session lifetime and GC interval (one year).
const MAX_SESSION_TTL_SECS: u64 = 365 * 86_400;
/// Upper bound for download token lifetime and rate-limit window (one day).
const MAX_TOKEN_TTL_SECS: u64 = 86_400;

fn check_range(name: &str, value: u64, max: u64) -> Result<()> {
    if value == 0 || value > max {
        return Err(DepotError::Config(format!(
            "{name} must be between 1 and {max} (got {value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 4000);
        assert!(config.web.jwt_secret.is_empty());
        assert_eq!(config.database.path, "data/filedepot.db");
        assert_eq!(config.upload.upload_dir, "./resource/uploads");
        assert_eq!(config.upload.chunk_dir, "./resource/chunks");
        assert_eq!(config.upload.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.upload.chunk_max_size, 50 * 1024 * 1024);
        assert_eq!(config.upload.max_files_per_request, 10);
        assert_eq!(
            config.upload.allowed_types,
            vec!["image/*", "text/*", "application/pdf"]
        );
        assert!(config.upload.enable_chunked_upload);
        assert_eq!(config.upload.missing_chunk_policy, MissingChunkPolicy::Abort);
        assert!(!config.upload.enforce_declared_size);
        assert_eq!(config.download.token_ttl_secs, 300);
        assert_eq!(config.download.rate_limit_secs, 20);
        assert_eq!(config.download.route_prefix, "/dev");
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[web]
host = "127.0.0.1"
port = 8081
cors_origins = ["http://localhost:5173"]
jwt_secret = "jwt"
api_rate_limit = 50
public_base_url = "https://files.example.com"

[database]
path = "/var/lib/filedepot/depot.db"

[upload]
upload_dir = "/srv/uploads"
chunk_dir = "/srv/chunks"
max_file_size = 1024
chunk_max_size = 2048
max_files_per_request = 3
allowed_types = ["*/*"]
enable_chunked_upload = false
missing_chunk_policy = "skip"
enforce_declared_size = true
session_ttl_secs = 60
gc_interval_secs = 30

[download]
token_secret = "dl"
token_ttl_secs = 120
rate_limit_secs = 5
route_prefix = "/v1"

[logging]
level = "debug"
file = "logs/filedepot.log"
"#;
        let config = Config::parse(toml).unwrap();

        assert_eq!(config.web.host, "127.0.0.1");
        assert_eq!(config.web.port, 8081);
        assert_eq!(config.web.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.web.api_rate_limit, 50);
        assert_eq!(
            config.web.public_base_url.as_deref(),
            Some("https://files.example.com")
        );
        assert_eq!(config.database.path, "/var/lib/filedepot/depot.db");
        assert_eq!(config.upload.upload_dir, "/srv/uploads");
        assert_eq!(config.upload.max_files_per_request, 3);
        assert_eq!(config.upload.allowed_types, vec!["*/*"]);
        assert!(!config.upload.enable_chunked_upload);
        assert_eq!(config.upload.missing_chunk_policy, MissingChunkPolicy::Skip);
        assert!(config.upload.enforce_declared_size);
        assert_eq!(config.upload.session_ttl_secs, 60);
        assert_eq!(config.download.token_secret, "dl");
        assert_eq!(config.download.token_ttl_secs, 120);
        assert_eq!(config.download.rate_limit_secs, 5);
        assert_eq!(config.download.route_prefix, "/v1");
        assert_eq!(config.logging.file.as_deref(), Some("logs/filedepot.log"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[upload]
chunk_dir = "/tmp/chunks"
"#;
        let config = Config::parse(toml).unwrap();

        assert_eq!(config.upload.chunk_dir, "/tmp/chunks");
        assert_eq!(config.upload.upload_dir, "./resource/uploads");
        assert_eq!(config.web.port, 4000);
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.download.token_ttl_secs, 300);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("[upload\nmax_file_size = ");
        assert!(matches!(result, Err(DepotError::Config(_))));
    }

    #[test]
    fn test_parse_unknown_missing_chunk_policy() {
        let toml = r#"
[upload]
missing_chunk_policy = "repair"
"#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(DepotError::Io(_))));
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_jwt = std::env::var("FILEDEPOT_JWT_SECRET").ok();
        let original_dl = std::env::var("FILEDEPOT_DOWNLOAD_SECRET").ok();

        std::env::set_var("FILEDEPOT_JWT_SECRET", "env-jwt");
        std::env::set_var("FILEDEPOT_DOWNLOAD_SECRET", "");

        let mut config = Config::default();
        config.download.token_secret = "from-file".to_string();
        config.apply_env_overrides();

        assert_eq!(config.web.jwt_secret, "env-jwt");
        // Empty values never override
        assert_eq!(config.download.token_secret, "from-file");

        match original_jwt {
            Some(val) => std::env::set_var("FILEDEPOT_JWT_SECRET", val),
            None => std::env::remove_var("FILEDEPOT_JWT_SECRET"),
        }
        match original_dl {
            Some(val) => std::env::set_var("FILEDEPOT_DOWNLOAD_SECRET", val),
            None => std::env::remove_var("FILEDEPOT_DOWNLOAD_SECRET"),
        }
    }

    #[test]
    fn test_validate_missing_secrets() {
        let mut config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jwt_secret"));

        config.web.jwt_secret = "jwt".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("token_secret"));

        config.download.token_secret = "dl".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_limits() {
        let mut config = Config::default();
        config.web.jwt_secret = "jwt".to_string();
        config.download.token_secret = "dl".to_string();
        config.upload.chunk_max_size = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_duration_bounds() {
        let valid = || {
            let mut config = Config::default();
            config.web.jwt_secret = "jwt".to_string();
            config.download.token_secret = "dl".to_string();
            config
        };
        assert!(valid().validate().is_ok());

        let mut config = valid();
        config.upload.gc_interval_secs = 0;
        assert!(config.validate().unwrap_err().to_string().contains("gc_interval_secs"));

        let mut config = valid();
        config.upload.session_ttl_secs = u64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("session_ttl_secs"));

        let mut config = valid();
        config.download.token_ttl_secs = u64::MAX;
        assert!(config.validate().unwrap_err().to_string().contains("token_ttl_secs"));

        let mut config = valid();
        config.download.token_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.download.rate_limit_secs = 86_401;
        assert!(config.validate().unwrap_err().to_string().contains("rate_limit_secs"));
    }
}
