//! File naming for converted outputs and source backups.
//!
//! Output names swap the multi-channel DTS marker in the source name for
//! the FLAC 7.1 marker (`movie.DTS-HD.5.1.mkv` -> `movie.FLAC.7.1.mkv`).
//! Both the output and the backup name probe the directory for a free slot
//! so an existing file is never overwritten.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Source-name marker for a DTS 5.1 track, e.g. `DTS.5.1`, `DTS-HD.MA.5.1`.
const DTS_MARKER_PATTERN: &str = r"DTS[.\-A-Za-z]*5\.1";

/// Replacement marker for the converted track.
pub const TARGET_MARKER: &str = "FLAC.7.1";

/// Extension appended to the source file once it has been converted.
pub const BACKUP_SUFFIX: &str = ".bak";

static DTS_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DTS_MARKER_PATTERN).expect("valid regex"));

/// Split a file name into `(stem, extension)`, the extension keeping its dot.
///
/// Only the last dot counts, so `movie.DTS.5.1.mkv` splits into
/// `("movie.DTS.5.1", ".mkv")`.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) => file_name.split_at(idx),
        None => (file_name, ""),
    }
}

/// Apply the marker substitution to a file stem.
pub fn converted_stem(stem: &str) -> String {
    DTS_MARKER_RE.replace_all(stem, TARGET_MARKER).into_owned()
}

/// The `attempt`-th output candidate for `source`.
///
/// Attempt 0 is the plain converted name; attempt N inserts `_N` before the
/// extension.
pub fn output_candidate(source: &Path, attempt: u32) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension(&file_name);
    let base = converted_stem(stem);

    let name = if attempt == 0 {
        format!("{base}{ext}")
    } else {
        format!("{base}_{attempt}{ext}")
    };

    match source.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// First output candidate that does not exist yet.
///
/// Deterministic: on an unchanged directory repeated calls return the same
/// path.
pub async fn generate_output_path(source: &Path) -> io::Result<PathBuf> {
    let mut attempt = 0;
    loop {
        let candidate = output_candidate(source, attempt);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

/// The `attempt`-th backup candidate: `<source>.bak`, then `<source>.bak.N`.
pub fn backup_candidate(source: &Path, attempt: u32) -> PathBuf {
    let mut name = OsString::from(source.as_os_str());
    name.push(BACKUP_SUFFIX);
    if attempt > 0 {
        name.push(format!(".{attempt}"));
    }
    PathBuf::from(name)
}

/// Lowest free backup name for `source`.
pub async fn next_backup_path(source: &Path) -> io::Result<PathBuf> {
    let mut attempt = 0;
    loop {
        let candidate = backup_candidate(source, attempt);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        attempt += 1;
    }
}

/// Rename `source` to its lowest free backup name and return that name.
pub async fn rename_to_backup(source: &Path) -> io::Result<PathBuf> {
    let backup = next_backup_path(source).await?;
    tokio::fs::rename(source, &backup).await?;
    Ok(backup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_dts_hd_marker() {
        let out = output_candidate(Path::new("/media/movie.DTS-HD.5.1.mkv"), 0);
        assert_eq!(out, PathBuf::from("/media/movie.FLAC.7.1.mkv"));
    }

    #[test]
    fn replaces_plain_dts_marker() {
        let out = output_candidate(Path::new("/m/Show.S01E01.DTS.5.1.1080p.mkv"), 0);
        assert_eq!(out, PathBuf::from("/m/Show.S01E01.FLAC.7.1.1080p.mkv"));
    }

    #[test]
    fn numbered_candidates_go_before_extension() {
        let out = output_candidate(Path::new("/media/movie.DTS-HD.5.1.mkv"), 3);
        assert_eq!(out, PathBuf::from("/media/movie.FLAC.7.1_3.mkv"));
    }

    #[test]
    fn name_without_marker_is_kept() {
        let out = output_candidate(Path::new("/media/holiday.mp4"), 0);
        assert_eq!(out, PathBuf::from("/media/holiday.mp4"));
    }

    #[test]
    fn name_without_extension() {
        let out = output_candidate(Path::new("/media/movie.DTS-HD.5.1"), 1);
        // The last dot is treated as the extension separator.
        assert_eq!(out, PathBuf::from("/media/movie.DTS-HD.5_1.1"));
    }

    #[test]
    fn backup_candidates() {
        let src = Path::new("/media/movie.mkv");
        assert_eq!(backup_candidate(src, 0), PathBuf::from("/media/movie.mkv.bak"));
        assert_eq!(backup_candidate(src, 2), PathBuf::from("/media/movie.mkv.bak.2"));
    }

    #[tokio::test]
    async fn output_path_skips_existing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("movie.DTS-HD.5.1.mkv");
        std::fs::write(dir.path().join("movie.FLAC.7.1.mkv"), b"").expect("write");
        std::fs::write(dir.path().join("movie.FLAC.7.1_1.mkv"), b"").expect("write");

        let out = generate_output_path(&source).await.expect("generate");
        assert_eq!(out, dir.path().join("movie.FLAC.7.1_2.mkv"));

        // Unchanged directory, same answer.
        let again = generate_output_path(&source).await.expect("generate");
        assert_eq!(out, again);
    }

    #[tokio::test]
    async fn output_path_never_collides_with_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("holiday.mp4");
        std::fs::write(&source, b"src").expect("write");

        let out = generate_output_path(&source).await.expect("generate");
        assert_eq!(out, dir.path().join("holiday_1.mp4"));
    }

    #[tokio::test]
    async fn backup_uses_lowest_free_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("movie.mkv");
        std::fs::write(&source, b"src").expect("write");
        std::fs::write(dir.path().join("movie.mkv.bak"), b"old").expect("write");
        std::fs::write(dir.path().join("movie.mkv.bak.2"), b"old").expect("write");

        let backup = rename_to_backup(&source).await.expect("rename");
        assert_eq!(backup, dir.path().join("movie.mkv.bak.1"));
        assert!(!source.exists());
        assert_eq!(std::fs::read(&backup).expect("read"), b"src");
        assert_eq!(
            std::fs::read(dir.path().join("movie.mkv.bak")).expect("read"),
            b"old"
        );
    }

    #[tokio::test]
    async fn backup_of_missing_source_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = rename_to_backup(&dir.path().join("gone.mkv")).await;
        assert!(result.is_err());
    }
}
