//! Download token broker.
//!
//! A token is both signed (file, user, issue time, expiry) and mirrored in
//! the shared cache under `download_token:{token}` with the file id as the
//! value. Redemption consumes the cache entry with one compare-and-delete,
//! so a token opens at most one stream.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use crate::auth::{can_download_file, CurrentUser};
use crate::cache::{CompareAndDelete, SharedCache};
use crate::config::DownloadConfig;
use crate::db::Database;
use crate::file::{FilePermissionRepository, FileRecord, FileRepository, FileStorage};
use crate::{DepotError, Result};

use super::token::{DownloadClaims, DownloadTokenSigner};

const TOKEN_KEY_PREFIX: &str = "download_token:";
const RATE_LIMIT_KEY_PREFIX: &str = "download_token_rate_limit:";

/// Cache key mirroring a token.
pub fn token_cache_key(token: &str) -> String {
    format!("{TOKEN_KEY_PREFIX}{token}")
}

/// Cache key of the issuance rate-limit marker for a user and file.
pub fn rate_limit_cache_key(user_id: &str, file_id: &str) -> String {
    format!("{RATE_LIMIT_KEY_PREFIX}{user_id}:{file_id}")
}

/// Lifetime of the cache mirror for `claims`.
///
/// The signature stays valid through the whole second `exp`, so the mirror
/// must outlive it; otherwise an unused token would read as consumed.
fn mirror_ttl(claims: &DownloadClaims) -> Duration {
    let issued_ms = u64::try_from(claims.timestamp).unwrap_or(0);
    let valid_until_ms = claims.exp.saturating_add(1).saturating_mul(1000);
    Duration::from_millis(valid_until_ms.saturating_sub(issued_ms))
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Link that redeems the token.
    pub download_url: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
}

/// An opened download, ready to stream.
#[derive(Debug)]
pub struct Download {
    pub record: FileRecord,
    pub file: tokio::fs::File,
    /// On-disk size in bytes.
    pub size: u64,
}

/// Issues and redeems single-use download tokens.
pub struct DownloadTokenBroker {
    signer: DownloadTokenSigner,
    cache: Arc<dyn SharedCache>,
    token_ttl: Duration,
    rate_limit: Duration,
    url_prefix: String,
}

impl DownloadTokenBroker {
    /// Create a broker from the download configuration.
    ///
    /// `public_base_url` (if any) is prefixed to generated links.
    pub fn new(
        config: &DownloadConfig,
        public_base_url: Option<&str>,
        cache: Arc<dyn SharedCache>,
    ) -> Self {
        let base = public_base_url.unwrap_or("").trim_end_matches('/');
        let prefix = config.route_prefix.trim_end_matches('/');
        Self {
            signer: DownloadTokenSigner::new(&config.token_secret),
            cache,
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            rate_limit: Duration::from_secs(config.rate_limit_secs),
            url_prefix: format!("{base}{prefix}"),
        }
    }

    /// The shared cache this broker writes to.
    pub fn cache(&self) -> &Arc<dyn SharedCache> {
        &self.cache
    }

    /// Download link for `file_id` carrying `token`.
    pub fn download_url(&self, file_id: &str, token: &str) -> String {
        format!(
            "{}/file/download/{}?key={}",
            self.url_prefix,
            urlencoding::encode(file_id),
            urlencoding::encode(token)
        )
    }

    /// Issue a token for `user` to download `file_id`.
    ///
    /// # Errors
    /// - `NotFound` if the file does not exist
    /// - `Permission` if the file is inactive or the user has no access
    /// - `RateLimited` if a token for the same user and file was issued
    ///   within the rate-limit window
    pub async fn issue(
        &self,
        db: &Database,
        user: &CurrentUser,
        file_id: &str,
    ) -> Result<IssuedToken> {
        let file = FileRepository::new(db.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| DepotError::NotFound("File".to_string()))?;
        let grant = FilePermissionRepository::new(db.pool())
            .get_role(file_id, &user.id)
            .await?;
        can_download_file(user, &file, grant)?;

        let rate_key = rate_limit_cache_key(&user.id, file_id);
        if !self.cache.set_nx_ex(&rate_key, "1", self.rate_limit).await? {
            let remaining = self.cache.ttl(&rate_key).await?.unwrap_or(self.rate_limit);
            let retry_after_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            debug!(user_id = %user.id, file_id, retry_after_secs, "Download token rate limited");
            return Err(DepotError::RateLimited {
                retry_after_secs: retry_after_secs.max(1),
            });
        }

        let claims = DownloadClaims::new(file_id, &user.id, user.role, self.token_ttl.as_secs());
        let token = self.signer.sign(&claims)?;
        self.cache
            .set_ex(&token_cache_key(&token), file_id, mirror_ttl(&claims))
            .await?;

        info!(user_id = %user.id, file_id, jti = %claims.jti, "Issued download token");
        Ok(IssuedToken {
            download_url: self.download_url(file_id, &token),
            token,
            expires_in: self.token_ttl.as_secs(),
        })
    }

    /// Redeem `token` for `file_id` and open the stored bytes.
    ///
    /// # Errors
    /// - `NotFound` if the file (or its bytes) are gone
    /// - `Permission` if the file is inactive or the holder lost access
    /// - `TokenInvalid` for a bad signature or an expired token
    /// - `TokenFileMismatch` if the token names another file
    /// - `TokenAlreadyUsed` if the token was redeemed before
    pub async fn redeem(
        &self,
        db: &Database,
        storage: &FileStorage,
        token: &str,
        file_id: &str,
    ) -> Result<Download> {
        let file = FileRepository::new(db.pool())
            .get_by_id(file_id)
            .await?
            .ok_or_else(|| DepotError::NotFound("File".to_string()))?;
        if !file.is_active() {
            return Err(DepotError::Permission("file is not accessible".to_string()));
        }

        let claims = self.signer.verify(token)?;
        if claims.file_id != file_id {
            return Err(DepotError::TokenFileMismatch);
        }

        // Access is checked again; it may have been revoked since issuance.
        let holder = CurrentUser::new(&claims.user_id, claims.role);
        let grant = FilePermissionRepository::new(db.pool())
            .get_role(file_id, &holder.id)
            .await?;
        can_download_file(&holder, &file, grant)?;

        match self
            .cache
            .compare_and_delete(&token_cache_key(token), file_id)
            .await?
        {
            CompareAndDelete::Deleted => {}
            CompareAndDelete::Missing if claims.is_expired_at(Utc::now()) => {
                return Err(DepotError::TokenInvalid)
            }
            CompareAndDelete::Missing => return Err(DepotError::TokenAlreadyUsed),
            CompareAndDelete::Mismatch => return Err(DepotError::TokenFileMismatch),
        }

        let handle = storage.open(&file.storage_path).await?;
        let size = handle.metadata().await?.len();

        info!(user_id = %claims.user_id, file_id, jti = %claims.jti, "Download token redeemed");
        Ok(Download {
            record: file,
            file: handle,
            size,
        })
    }
}
