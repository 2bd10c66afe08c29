//! Finalized file storage under the upload root.
//!
//! Stored files are laid out by category:
//! ```text
//! {upload_dir}/
//! ├── image/
//! │   └── 1760781234567_9f86d081884c7d659a2feaa0c55ad015.png
//! ├── other/
//! │   └── 1760781234999_2c26b46b68ffc68ff99b453c1d304134.bin
//! └── ...
//! ```
//! Catalog records keep the path relative to the root; every resolution goes
//! through [`FileStorage::resolve`], which refuses anything that escapes it.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::file::category::{extension_of, FileCategory};
use crate::{DepotError, Result};

/// A freshly allocated storage location.
#[derive(Debug, Clone)]
pub struct StoredPath {
    /// Path relative to the upload root, `/`-separated.
    pub relative: String,
    /// Absolute path on disk.
    pub absolute: PathBuf,
    /// Category subdirectory the file lives in.
    pub category: FileCategory,
    /// Lower-case extension without the dot (may be empty).
    pub extension: String,
}

/// File storage rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `base_path`, creating the directory if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        let base_path = base_path.canonicalize()?;
        Ok(Self { base_path })
    }

    /// Get the (canonical) base path of this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Generate a unique stored name keeping only the original extension.
    ///
    /// Format: `{unix_millis}_{32 hex}{.ext}`.
    pub fn generate_stored_name(original_name: &str) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let random: [u8; 16] = rand::random();
        let ext = safe_extension(original_name);
        if ext.is_empty() {
            format!("{millis}_{}", hex::encode(random))
        } else {
            format!("{millis}_{}.{ext}", hex::encode(random))
        }
    }

    /// Allocate a new location for a file originally called `original_name`.
    ///
    /// The category directory is created; the file itself is not.
    pub async fn allocate(&self, original_name: &str) -> Result<StoredPath> {
        let category = FileCategory::of_name(original_name);
        let stored_name = Self::generate_stored_name(original_name);
        let relative = format!("{}/{}", category.as_str(), stored_name);

        let absolute = self.resolve(&relative)?;
        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(StoredPath {
            relative,
            absolute,
            category,
            extension: safe_extension(original_name),
        })
    }

    /// Resolve a stored relative path to an absolute path inside the root.
    ///
    /// Absolute paths, `..`, and paths whose existing target resolves outside
    /// the root (e.g. through a symlink) are rejected.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let rel = Path::new(relative);
        if relative.is_empty() || relative.contains('\0') {
            return Err(DepotError::Validation("empty storage path".to_string()));
        }
        if !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(DepotError::Validation(format!(
                "storage path escapes upload root: {relative}"
            )));
        }

        let path = self.base_path.join(rel);
        if let Ok(canonical) = path.canonicalize() {
            if !canonical.starts_with(&self.base_path) {
                return Err(DepotError::Validation(format!(
                    "storage path escapes upload root: {relative}"
                )));
            }
        }
        Ok(path)
    }

    /// Size in bytes of a stored file.
    pub async fn file_size(&self, relative: &str) -> Result<u64> {
        let path = self.resolve(relative)?;
        match tokio::fs::metadata(&path).await {
            Ok(m) => Ok(m.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DepotError::NotFound(format!("Stored file {relative}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Open a stored file for reading.
    pub async fn open(&self, relative: &str) -> Result<tokio::fs::File> {
        let path = self.resolve(relative)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(DepotError::NotFound(format!("Stored file {relative}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a stored file.
    ///
    /// Returns `false` if it didn't exist.
    pub async fn delete(&self, relative: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Reduce a client-supplied file name to its final path component.
///
/// Both `/` and `\` count as separators; control characters are dropped.
/// Returns `None` when nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Extension of `name` if it is short and alphanumeric, otherwise empty.
fn safe_extension(name: &str) -> String {
    let ext = extension_of(name);
    if ext.len() <= 16 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path().join("uploads")).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_new_creates_directory() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.base_path().is_dir());
    }

    #[test]
    fn test_generate_stored_name_format() {
        let name = FileStorage::generate_stored_name("Holiday Photo.JPG");
        let (millis, rest) = name.split_once('_').unwrap();
        assert!(millis.parse::<i64>().is_ok());
        assert_eq!(rest.len(), 32 + ".jpg".len());
        assert!(rest.ends_with(".jpg"));

        let bare = FileStorage::generate_stored_name("Makefile");
        assert!(!bare.contains('.'));
    }

    #[test]
    fn test_generate_stored_name_unique() {
        let a = FileStorage::generate_stored_name("a.txt");
        let b = FileStorage::generate_stored_name("a.txt");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_allocate_uses_category_dir() {
        let (storage, _temp) = create_test_storage();
        let stored = storage.allocate("cat.png").await.unwrap();

        assert!(stored.relative.starts_with("image/"));
        assert_eq!(stored.category, FileCategory::Image);
        assert_eq!(stored.extension, "png");
        assert!(stored.absolute.starts_with(storage.base_path()));
        assert!(stored.absolute.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_allocate_ignores_traversal_in_name() {
        let (storage, _temp) = create_test_storage();
        for name in ["../../etc/passwd", "/etc/shadow", "..\\..\\win.ini", "a/../../b.txt"] {
            let stored = storage.allocate(name).await.unwrap();
            assert!(stored.absolute.starts_with(storage.base_path()), "{name}");
            assert!(!stored.relative.contains(".."), "{name}");
        }
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.resolve("../outside.txt").is_err());
        assert!(storage.resolve("image/../../outside.txt").is_err());
        assert!(storage.resolve("/etc/passwd").is_err());
        assert!(storage.resolve("./image/a.png").is_err());
        assert!(storage.resolve("").is_err());
        assert!(storage.resolve("image/a.png").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let (storage, temp) = create_test_storage();
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), b"x").unwrap();
        std::os::unix::fs::symlink(&outside, storage.base_path().join("link")).unwrap();

        assert!(storage.resolve("link/secret.txt").is_err());
    }

    #[tokio::test]
    async fn test_open_size_delete() {
        let (storage, _temp) = create_test_storage();
        let stored = storage.allocate("notes.txt").await.unwrap();
        tokio::fs::write(&stored.absolute, b"hello").await.unwrap();

        assert_eq!(storage.file_size(&stored.relative).await.unwrap(), 5);
        assert!(storage.open(&stored.relative).await.is_ok());
        assert!(storage.delete(&stored.relative).await.unwrap());
        assert!(!storage.delete(&stored.relative).await.unwrap());
        assert!(matches!(
            storage.open(&stored.relative).await,
            Err(DepotError::NotFound(_))
        ));
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\Users\\me\\a.txt").as_deref(), Some("a.txt"));
        assert_eq!(sanitize_file_name("bad\r\nname.txt").as_deref(), Some("badname.txt"));
        assert_eq!(sanitize_file_name("dir/"), None);
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("   "), None);
    }
}
