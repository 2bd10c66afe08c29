//! Database schema and migrations for filedepot.
//!
//! Migrations are applied in order when the database is opened. The
//! schema_version table tracks which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: File catalog
    r#"
CREATE TABLE files (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    storage_path    TEXT NOT NULL UNIQUE,   -- relative to the upload root
    size            INTEGER NOT NULL,
    mime_category   TEXT NOT NULL,
    extension       TEXT NOT NULL,
    checksum        TEXT NOT NULL,          -- SHA-256 hex of the stored bytes
    version         INTEGER NOT NULL DEFAULT 1,
    created_by      TEXT NOT NULL,
    status          TEXT NOT NULL DEFAULT 'active',  -- 'active', 'deleted', 'archived'
    tags            TEXT NOT NULL DEFAULT '[]',      -- JSON array of {key, value}
    description     TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX idx_files_created_by ON files(created_by);
CREATE INDEX idx_files_status ON files(status);
CREATE INDEX idx_files_checksum ON files(checksum);
"#,
    // v2: Per-file permissions
    r#"
CREATE TABLE file_permissions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    file_id     TEXT NOT NULL REFERENCES files(id) ON DELETE CASCADE,
    user_id     TEXT NOT NULL,
    role        TEXT NOT NULL,              -- 'owner', 'editor', 'viewer'
    created_at  TEXT NOT NULL,
    UNIQUE(file_id, user_id)
);

CREATE INDEX idx_file_permissions_user ON file_permissions(user_id);
"#,
    // v3: Upload sessions for chunked uploads
    r#"
CREATE TABLE upload_sessions (
    id                      TEXT PRIMARY KEY,
    owner_id                TEXT NOT NULL,
    file_name               TEXT NOT NULL,
    declared_size           INTEGER NOT NULL,
    declared_chunk_count    INTEGER NOT NULL,
    status                  TEXT NOT NULL DEFAULT 'open',  -- 'open', 'merging', 'completed', 'aborted'
    file_id                 TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL,
    expires_at              TEXT NOT NULL
);

CREATE INDEX idx_upload_sessions_status ON upload_sessions(status, expires_at);
"#,
];
