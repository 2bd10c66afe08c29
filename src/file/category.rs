//! Extension to file category mapping and allowed-type checks.
//!
//! Categories come from the file name's extension only; client-declared MIME
//! types are never consulted.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broad file category derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Document,
    Image,
    Audio,
    Video,
    Archive,
    Code,
    Font,
    Data,
    Ebook,
    Other,
}

impl FileCategory {
    /// Convert to the stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Document => "document",
            FileCategory::Image => "image",
            FileCategory::Audio => "audio",
            FileCategory::Video => "video",
            FileCategory::Archive => "archive",
            FileCategory::Code => "code",
            FileCategory::Font => "font",
            FileCategory::Data => "data",
            FileCategory::Ebook => "ebook",
            FileCategory::Other => "other",
        }
    }

    /// Look up the category for a lower-case extension without the dot.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "pdf" | "txt" | "md" | "csv"
            | "rtf" | "ods" | "odt" | "odp" | "pages" | "numbers" | "key" => {
                FileCategory::Document
            }
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "tiff" | "tif" | "svg" | "ico"
            | "heic" | "psd" | "ai" | "eps" => FileCategory::Image,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" | "amr" | "aiff" | "mid"
            | "midi" => FileCategory::Audio,
            "mp4" | "avi" | "mov" | "mkv" | "flv" | "wmv" | "webm" | "3gp" | "mpeg" | "mpg"
            | "m4v" => FileCategory::Video,
            "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" | "iso" | "jar" | "war" | "ear" => {
                FileCategory::Archive
            }
            "js" | "ts" | "py" | "java" | "c" | "cpp" | "cs" | "html" | "css" | "json" | "xml"
            | "sh" | "bat" | "php" | "rb" | "go" | "rs" | "swift" | "kt" | "kts" | "dart" | "m"
            | "pl" => FileCategory::Code,
            "ttf" | "otf" | "woff" | "woff2" | "eot" | "fon" => FileCategory::Font,
            "db" | "sqlite" | "mdb" | "accdb" | "jsonl" | "yaml" | "yml" | "parquet" | "avro" => {
                FileCategory::Data
            }
            "epub" | "mobi" | "azw" | "azw3" | "ibooks" => FileCategory::Ebook,
            _ => FileCategory::Other,
        }
    }

    /// Categorize a file name by its extension.
    pub fn of_name(name: &str) -> Self {
        Self::from_extension(&extension_of(name))
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(FileCategory::Document),
            "image" => Ok(FileCategory::Image),
            "audio" => Ok(FileCategory::Audio),
            "video" => Ok(FileCategory::Video),
            "archive" => Ok(FileCategory::Archive),
            "code" => Ok(FileCategory::Code),
            "font" => Ok(FileCategory::Font),
            "data" => Ok(FileCategory::Data),
            "ebook" => Ok(FileCategory::Ebook),
            "other" => Ok(FileCategory::Other),
            _ => Err(format!("unknown file category: {s}")),
        }
    }
}

/// Lower-case extension of `name` without the dot, or an empty string.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Check a file name against allowed type patterns.
///
/// `x/*` matches the category `x` or any guessed MIME type under `x/`.
/// An exact pattern matches the category name or the guessed MIME type.
/// `*/*` matches everything.
pub fn is_allowed_type(name: &str, allowed: &[String]) -> bool {
    let category = FileCategory::of_name(name);
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    let mime = mime.essence_str();

    allowed.iter().any(|pattern| {
        let pattern = pattern.trim().to_ascii_lowercase();
        if pattern == "*/*" || pattern == "*" {
            return true;
        }
        match pattern.strip_suffix("/*") {
            Some(top) => {
                top == category.as_str()
                    || mime.split('/').next().is_some_and(|m| m == top)
            }
            None => pattern == category.as_str() || pattern == mime,
        }
    })
}
