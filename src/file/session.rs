//! Durable upload session records.
//!
//! A session moves `open -> merging -> completed`, or `open -> aborted` on
//! explicit abort or expiry. A session stuck in `merging` well past its
//! expiry (a crashed merge) is aborted by the collector too. The `open -> merging` transition is a single
//! conditional UPDATE, so exactly one merge request can claim a session.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{DepotError, Result};

/// How long after expiry a `merging` session is considered abandoned.
pub const STALE_MERGE_GRACE_SECS: i64 = 3600;

/// Upload session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Accepting chunks.
    Open,
    /// A merge request owns the session.
    Merging,
    /// Merged into a catalog entry.
    Completed,
    /// Cancelled or expired.
    Aborted,
}

impl SessionStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "open",
            SessionStatus::Merging => "merging",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(SessionStatus::Open),
            "merging" => Ok(SessionStatus::Merging),
            "completed" => Ok(SessionStatus::Completed),
            "aborted" => Ok(SessionStatus::Aborted),
            _ => Err(format!("unknown session status: {s}")),
        }
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// A chunked upload in progress (or finished).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UploadSession {
    /// Upload id, also the staging directory name.
    pub id: String,
    /// User who initialized the session.
    pub owner_id: String,
    /// Client-declared original file name.
    pub file_name: String,
    /// Client-declared total size in bytes.
    pub declared_size: i64,
    /// Client-declared number of chunks.
    pub declared_chunk_count: i64,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    /// Catalog entry created by the merge.
    pub file_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    /// Whether the session has outlived its TTL.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Data for creating an upload session.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub declared_size: i64,
    pub declared_chunk_count: i64,
    pub expires_at: DateTime<Utc>,
}

const SESSION_COLUMNS: &str = "id, owner_id, file_name, declared_size, declared_chunk_count, \
     status, file_id, created_at, updated_at, expires_at";

/// Mark a merging session completed on an open connection.
///
/// Runs inside the transaction that creates the catalog entry.
pub async fn complete_merge(conn: &mut SqliteConnection, id: &str, file_id: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE upload_sessions SET status = 'completed', file_id = ?, updated_at = ?
         WHERE id = ? AND status = 'merging'",
    )
    .bind(file_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *conn)
    .await
    .map_err(|e| DepotError::Database(e.to_string()))?;

    if result.rows_affected() == 0 {
        return Err(DepotError::Validation(format!(
            "upload session {id} is not merging"
        )));
    }
    Ok(())
}

/// Repository for upload sessions.
pub struct UploadSessionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UploadSessionRepository<'a> {
    /// Create a new repository with the given pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an open session.
    pub async fn create(&self, new_session: &NewUploadSession) -> Result<UploadSession> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO upload_sessions (id, owner_id, file_name, declared_size, declared_chunk_count,
                                          status, created_at, updated_at, expires_at)
             VALUES (?, ?, ?, ?, ?, 'open', ?, ?, ?)",
        )
        .bind(&new_session.id)
        .bind(&new_session.owner_id)
        .bind(&new_session.file_name)
        .bind(new_session.declared_size)
        .bind(new_session.declared_chunk_count)
        .bind(now)
        .bind(now)
        .bind(new_session.expires_at)
        .execute(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        self.get_by_id(&new_session.id)
            .await?
            .ok_or_else(|| DepotError::NotFound("upload session".to_string()))
    }

    /// Get a session by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<UploadSession>> {
        let session = sqlx::query_as::<_, UploadSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(session)
    }

    /// Claim a session for merging (`open -> merging`).
    ///
    /// Returns `false` when another request already moved it out of `open`.
    pub async fn begin_merge(&self, id: &str) -> Result<bool> {
        self.transition(id, SessionStatus::Open, SessionStatus::Merging)
            .await
    }

    /// Give a merging session back (`merging -> open`) after a failed merge.
    pub async fn release_merge(&self, id: &str) -> Result<bool> {
        self.transition(id, SessionStatus::Merging, SessionStatus::Open)
            .await
    }

    /// Abort an open session. Returns `false` if it was not open.
    pub async fn abort(&self, id: &str) -> Result<bool> {
        self.transition(id, SessionStatus::Open, SessionStatus::Aborted)
            .await
    }

    /// Abort every open session whose expiry is before `now`, and every
    /// merging session that expired more than [`STALE_MERGE_GRACE_SECS`] ago.
    ///
    /// Returns the ids of the sessions that were aborted.
    pub async fn abort_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let stale_merge_cutoff = now - chrono::Duration::seconds(STALE_MERGE_GRACE_SECS);
        let ids: Vec<String> = sqlx::query_scalar(
            "UPDATE upload_sessions SET status = 'aborted', updated_at = ?
             WHERE (status = 'open' AND expires_at < ?)
                OR (status = 'merging' AND expires_at < ?)
             RETURNING id",
        )
        .bind(now)
        .bind(now)
        .bind(stale_merge_cutoff)
        .fetch_all(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(ids)
    }

    async fn transition(&self, id: &str, from: SessionStatus, to: SessionStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE upload_sessions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
