//! Media library search.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use walkdir::WalkDir;

/// Container extensions accepted for conversion.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v",
];

/// Pattern used when a search does not supply one.
pub const DEFAULT_SEARCH_PATTERN: &str = r"DTS.*5\.1";

/// Whether `path` has a known video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = format!(".{}", ext.to_string_lossy().to_lowercase());
    VIDEO_EXTENSIONS.contains(&ext.as_str())
}

/// File name matcher: a case-insensitive regex, or a case-insensitive
/// substring when the pattern does not compile.
#[derive(Debug, Clone)]
pub enum FileMatcher {
    Regex(Regex),
    Substring(String),
}

impl FileMatcher {
    pub fn new(pattern: &str) -> Self {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => Self::Regex(re),
            Err(_) => Self::Substring(pattern.to_lowercase()),
        }
    }

    pub fn is_match(&self, name: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(name),
            Self::Substring(needle) => name.to_lowercase().contains(needle.as_str()),
        }
    }
}

/// A video file found by [`search_video_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    /// Modification time, Unix seconds.
    pub modified: i64,
}

/// Recursively collect video files under `root` whose name matches
/// `pattern`. Unreadable entries are skipped. Blocking; run it on a blocking
/// thread from async code.
pub fn search_video_files(root: &Path, pattern: &str) -> Vec<MediaFile> {
    let matcher = FileMatcher::new(pattern);

    let mut results: Vec<MediaFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_video_file(e.path()))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            if !matcher.is_match(&name) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);
            Some(MediaFile {
                path: entry.path().to_path_buf(),
                name,
                size: meta.len(),
                modified,
            })
        })
        .collect();

    results.sort_by(|a, b| a.path.cmp(&b.path));
    results
}
