//! File catalog: finalized file records and per-file permissions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{DepotError, Result};

/// Lifecycle status of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Visible and downloadable.
    Active,
    /// Soft-deleted; bytes stay on disk.
    Deleted,
    /// Kept but hidden.
    Archived,
}

impl FileStatus {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Active => "active",
            FileStatus::Deleted => "deleted",
            FileStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(FileStatus::Active),
            "deleted" => Ok(FileStatus::Deleted),
            "archived" => Ok(FileStatus::Archived),
            _ => Err(format!("unknown file status: {s}")),
        }
    }
}

impl TryFrom<String> for FileStatus {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// Role a user holds on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRole {
    Owner,
    Editor,
    Viewer,
}

impl PermissionRole {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionRole::Owner => "owner",
            PermissionRole::Editor => "editor",
            PermissionRole::Viewer => "viewer",
        }
    }

    /// Whether this role may change file metadata.
    pub fn can_edit(&self) -> bool {
        matches!(self, PermissionRole::Owner | PermissionRole::Editor)
    }
}

impl FromStr for PermissionRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "owner" => Ok(PermissionRole::Owner),
            "editor" => Ok(PermissionRole::Editor),
            "viewer" => Ok(PermissionRole::Viewer),
            _ => Err(format!("unknown permission role: {s}")),
        }
    }
}

impl TryFrom<String> for PermissionRole {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

/// A free-form key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTag {
    pub key: String,
    pub value: String,
}

/// Tag list stored as a JSON array column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileTags(pub Vec<FileTag>);

impl FileTags {
    fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }
}

impl TryFrom<String> for FileTags {
    type Error = serde_json::Error;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        serde_json::from_str(&s).map(FileTags)
    }
}

/// A finalized file in the catalog.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FileRecord {
    /// Unique file ID (UUID).
    pub id: String,
    /// Original file name.
    pub name: String,
    /// Path relative to the upload root.
    pub storage_path: String,
    /// Size in bytes of the stored content.
    pub size: i64,
    /// Category derived from the extension.
    pub mime_category: String,
    /// Lower-case extension without the dot.
    pub extension: String,
    /// SHA-256 hex digest of the stored bytes.
    pub checksum: String,
    /// Content version, starting at 1.
    pub version: i64,
    /// Uploader user ID.
    pub created_by: String,
    #[sqlx(try_from = "String")]
    pub status: FileStatus,
    #[sqlx(try_from = "String")]
    pub tags: FileTags,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Whether the file may be downloaded or exposed publicly.
    pub fn is_active(&self) -> bool {
        self.status == FileStatus::Active
    }
}

/// Data for creating a new catalog entry.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub storage_path: String,
    pub size: i64,
    pub mime_category: String,
    pub extension: String,
    pub checksum: String,
    pub created_by: String,
    pub description: Option<String>,
    pub tags: FileTags,
}

impl NewFile {
    /// Create a new file entry description.
    pub fn new(
        name: impl Into<String>,
        storage_path: impl Into<String>,
        size: i64,
        checksum: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let extension = crate::file::category::extension_of(&name);
        let mime_category = crate::file::category::FileCategory::from_extension(&extension)
            .as_str()
            .to_string();
        Self {
            name,
            storage_path: storage_path.into(),
            size,
            mime_category,
            extension,
            checksum: checksum.into(),
            created_by: created_by.into(),
            description: None,
            tags: FileTags::default(),
        }
    }

    /// Set the description; blank descriptions are dropped.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.trim().is_empty() {
            self.description = Some(description);
        }
        self
    }

    /// Set the tags.
    pub fn with_tags(mut self, tags: Vec<FileTag>) -> Self {
        self.tags = FileTags(tags);
        self
    }
}

/// Metadata changes for a file. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<FileTag>>,
    pub status: Option<FileStatus>,
}

impl FileUpdate {
    /// Check if there are no changes.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.status.is_none()
    }
}

/// Filter and paging for catalog listings.
#[derive(Debug, Clone)]
pub struct FileQuery {
    pub status: Option<FileStatus>,
    pub created_by: Option<String>,
    /// 1-based page number.
    pub page: u32,
    pub page_size: u32,
}

impl Default for FileQuery {
    fn default() -> Self {
        Self {
            status: None,
            created_by: None,
            page: 1,
            page_size: 20,
        }
    }
}

const FILE_COLUMNS: &str = "id, name, storage_path, size, mime_category, extension, checksum, \
     version, created_by, status, tags, description, created_at, updated_at";

/// Insert a file record and its owner permission on an open connection.
///
/// Callers run this inside a transaction so that both rows commit together.
pub async fn insert_with_owner(conn: &mut SqliteConnection, new_file: &NewFile) -> Result<FileRecord> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO files (id, name, storage_path, size, mime_category, extension, checksum,
                            version, created_by, status, tags, description, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, 'active', ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new_file.name)
    .bind(&new_file.storage_path)
    .bind(new_file.size)
    .bind(&new_file.mime_category)
    .bind(&new_file.extension)
    .bind(&new_file.checksum)
    .bind(&new_file.created_by)
    .bind(new_file.tags.to_json())
    .bind(&new_file.description)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DepotError::Database(e.to_string()))?;

    sqlx::query(
        "INSERT INTO file_permissions (file_id, user_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&new_file.created_by)
    .bind(PermissionRole::Owner.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DepotError::Database(e.to_string()))?;

    let record = sqlx::query_as::<_, FileRecord>(&format!(
        "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
    ))
    .bind(&id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| DepotError::Database(e.to_string()))?;

    Ok(record)
}

/// Repository for file records.
pub struct FileRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FileRepository<'a> {
    /// Create a new repository with the given pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a file record together with the uploader's owner permission.
    ///
    /// Either both rows are stored or neither is.
    pub async fn create(&self, new_file: &NewFile) -> Result<FileRecord> {
        let mut tx = self.pool.begin().await?;
        let record = insert_with_owner(&mut *tx, new_file).await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Get a file by ID.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<FileRecord>> {
        let record = sqlx::query_as::<_, FileRecord>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(record)
    }

    /// Apply a metadata update.
    ///
    /// Returns the updated record, or `None` if the file doesn't exist.
    pub async fn update(&self, id: &str, update: &FileUpdate) -> Result<Option<FileRecord>> {
        if update.is_empty() {
            return self.get_by_id(id).await;
        }

        let mut query: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new("UPDATE files SET ");
        let mut separated = query.separated(", ");

        if let Some(ref name) = update.name {
            separated.push("name = ");
            separated.push_bind_unseparated(name.clone());
        }
        if let Some(ref description) = update.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description.clone());
        }
        if let Some(ref tags) = update.tags {
            separated.push("tags = ");
            separated.push_bind_unseparated(FileTags(tags.clone()).to_json());
        }
        if let Some(status) = update.status {
            separated.push("status = ");
            separated.push_bind_unseparated(status.as_str().to_string());
        }
        separated.push("updated_at = ");
        separated.push_bind_unseparated(Utc::now());

        query.push(" WHERE id = ");
        query.push_bind(id.to_string());

        let result = query
            .build()
            .execute(self.pool)
            .await
            .map_err(|e| DepotError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Mark a file as deleted. The stored bytes are left in place.
    ///
    /// Returns `false` if the file doesn't exist.
    pub async fn soft_delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE files SET status = 'deleted', updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// List files, newest first. Returns the page and the total match count.
    pub async fn list(&self, filter: &FileQuery) -> Result<(Vec<FileRecord>, i64)> {
        let page = filter.page.max(1);
        let page_size = filter.page_size.max(1);

        let mut count_query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM files WHERE 1 = 1");
        let mut list_query: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new(format!("SELECT {FILE_COLUMNS} FROM files WHERE 1 = 1"));

        for query in [&mut count_query, &mut list_query] {
            if let Some(status) = filter.status {
                query.push(" AND status = ");
                query.push_bind(status.as_str().to_string());
            }
            if let Some(ref owner) = filter.created_by {
                query.push(" AND created_by = ");
                query.push_bind(owner.clone());
            }
        }

        list_query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        list_query.push_bind(page_size as i64);
        list_query.push(" OFFSET ");
        list_query.push_bind(((page - 1) as i64) * page_size as i64);

        let total: i64 = count_query
            .build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await
            .map_err(|e| DepotError::Database(e.to_string()))?;

        let items = list_query
            .build_query_as::<FileRecord>()
            .fetch_all(self.pool)
            .await
            .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok((items, total))
    }
}

/// A user's role on a file.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FilePermission {
    pub file_id: String,
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub role: PermissionRole,
    pub created_at: DateTime<Utc>,
}

/// Repository for per-file permissions.
pub struct FilePermissionRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FilePermissionRepository<'a> {
    /// Create a new repository with the given pool reference.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Grant `role` on a file, replacing any role the user already had.
    pub async fn grant(&self, file_id: &str, user_id: &str, role: PermissionRole) -> Result<()> {
        sqlx::query(
            "INSERT INTO file_permissions (file_id, user_id, role, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(file_id, user_id) DO UPDATE SET role = excluded.role",
        )
        .bind(file_id)
        .bind(user_id)
        .bind(role.as_str())
        .bind(Utc::now())
        .execute(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(())
    }

    /// The user's role on a file, if any.
    pub async fn get_role(&self, file_id: &str, user_id: &str) -> Result<Option<PermissionRole>> {
        let permission = sqlx::query_as::<_, FilePermission>(
            "SELECT file_id, user_id, role, created_at FROM file_permissions
             WHERE file_id = ? AND user_id = ?",
        )
        .bind(file_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(permission.map(|p| p.role))
    }

    /// All permissions on a file.
    pub async fn list_for_file(&self, file_id: &str) -> Result<Vec<FilePermission>> {
        let permissions = sqlx::query_as::<_, FilePermission>(
            "SELECT file_id, user_id, role, created_at FROM file_permissions
             WHERE file_id = ? ORDER BY id",
        )
        .bind(file_id)
        .fetch_all(self.pool)
        .await
        .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(permissions)
    }

    /// Remove a user's permission. Returns `false` if there was none.
    pub async fn revoke(&self, file_id: &str, user_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM file_permissions WHERE file_id = ? AND user_id = ?")
            .bind(file_id)
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| DepotError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn setup_db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn sample_file(owner: &str) -> NewFile {
        NewFile::new("report.pdf", "document/1_abc.pdf", 1234, "deadbeef", owner)
    }

    #[test]
    fn test_new_file_derives_category() {
        let file = NewFile::new("Song.MP3", "audio/x.mp3", 1, "c", "u1");
        assert_eq!(file.extension, "mp3");
        assert_eq!(file.mime_category, "audio");

        let file = NewFile::new("Makefile", "other/x", 1, "c", "u1");
        assert_eq!(file.extension, "");
        assert_eq!(file.mime_category, "other");
    }

    #[test]
    fn test_blank_description_dropped() {
        assert!(sample_file("u1").with_description("   ").description.is_none());
        assert_eq!(
            sample_file("u1").with_description("Q3").description.as_deref(),
            Some("Q3")
        );
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("archived".parse::<FileStatus>().unwrap(), FileStatus::Archived);
        assert!("gone".parse::<FileStatus>().is_err());
        assert!(PermissionRole::Editor.can_edit());
        assert!(!PermissionRole::Viewer.can_edit());
    }

    #[tokio::test]
    async fn test_create_file_with_owner_permission() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());

        let file = repo
            .create(&sample_file("user-1").with_tags(vec![FileTag {
                key: "team".to_string(),
                value: "finance".to_string(),
            }]))
            .await
            .unwrap();

        assert_eq!(file.name, "report.pdf");
        assert_eq!(file.size, 1234);
        assert_eq!(file.version, 1);
        assert_eq!(file.status, FileStatus::Active);
        assert_eq!(file.mime_category, "document");
        assert_eq!(file.tags.0.len(), 1);

        let perms = FilePermissionRepository::new(db.pool());
        assert_eq!(
            perms.get_role(&file.id, "user-1").await.unwrap(),
            Some(PermissionRole::Owner)
        );
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_permission_insert_fails() {
        let db = setup_db().await;
        sqlx::raw_sql(
            "CREATE TRIGGER reject_permissions BEFORE INSERT ON file_permissions
             BEGIN SELECT RAISE(ABORT, 'permission store unavailable'); END;",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let repo = FileRepository::new(db.pool());
        assert!(repo.create(&sample_file("user-1")).await.is_err());

        let (items, total) = repo.list(&FileQuery::default()).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_get_missing_file() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());
        assert!(repo.get_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());
        let file = repo.create(&sample_file("user-1")).await.unwrap();

        let update = FileUpdate {
            name: Some("final.pdf".to_string()),
            description: Some("signed copy".to_string()),
            tags: Some(vec![FileTag {
                key: "year".to_string(),
                value: "2026".to_string(),
            }]),
            status: Some(FileStatus::Archived),
        };
        let updated = repo.update(&file.id, &update).await.unwrap().unwrap();

        assert_eq!(updated.name, "final.pdf");
        assert_eq!(updated.description.as_deref(), Some("signed copy"));
        assert_eq!(updated.tags.0[0].value, "2026");
        assert_eq!(updated.status, FileStatus::Archived);
        assert_eq!(updated.storage_path, file.storage_path);
        assert!(updated.updated_at >= file.updated_at);
    }

    #[tokio::test]
    async fn test_update_missing_file() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());
        let update = FileUpdate {
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert!(repo.update("nope", &update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_record() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());
        let file = repo.create(&sample_file("user-1")).await.unwrap();

        assert!(repo.soft_delete(&file.id).await.unwrap());
        let deleted = repo.get_by_id(&file.id).await.unwrap().unwrap();
        assert_eq!(deleted.status, FileStatus::Deleted);
        assert!(!deleted.is_active());

        assert!(!repo.soft_delete("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_with_filter_and_paging() {
        let db = setup_db().await;
        let repo = FileRepository::new(db.pool());

        let mut ids = Vec::new();
        for i in 0..5 {
            let file = NewFile::new(
                format!("f{i}.txt"),
                format!("document/{i}.txt"),
                i,
                "c",
                "user-1",
            );
            ids.push(repo.create(&file).await.unwrap().id);
        }
        repo.soft_delete(&ids[0]).await.unwrap();

        let (active, total) = repo
            .list(&FileQuery {
                status: Some(FileStatus::Active),
                page: 1,
                page_size: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 4);
        assert_eq!(active.len(), 3);

        let (second_page, _) = repo
            .list(&FileQuery {
                status: Some(FileStatus::Active),
                page: 2,
                page_size: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(second_page.len(), 1);
    }

    #[tokio::test]
    async fn test_grant_and_revoke_permission() {
        let db = setup_db().await;
        let file = FileRepository::new(db.pool())
            .create(&sample_file("user-1"))
            .await
            .unwrap();
        let perms = FilePermissionRepository::new(db.pool());

        assert!(perms.get_role(&file.id, "user-2").await.unwrap().is_none());

        perms.grant(&file.id, "user-2", PermissionRole::Viewer).await.unwrap();
        perms.grant(&file.id, "user-2", PermissionRole::Editor).await.unwrap();
        assert_eq!(
            perms.get_role(&file.id, "user-2").await.unwrap(),
            Some(PermissionRole::Editor)
        );
        assert_eq!(perms.list_for_file(&file.id).await.unwrap().len(), 2);

        assert!(perms.revoke(&file.id, "user-2").await.unwrap());
        assert!(!perms.revoke(&file.id, "user-2").await.unwrap());
    }
}
