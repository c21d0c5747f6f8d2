// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Name collision handling at the destination

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::{Result, TidyError};

/// Upper bound on `name(n).ext` probes before giving up
pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Policy applied when the destination path is already occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConflictStrategy {
    /// Pick a free `name(n).ext` next to the existing file
    #[default]
    Rename,
    /// Delete the existing destination, then move
    Overwrite,
    /// Leave both files alone
    Skip,
    /// Drop the source when contents are identical, otherwise rename
    HashCheck,
}

impl ConflictStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictStrategy::Rename => "rename",
            ConflictStrategy::Overwrite => "overwrite",
            ConflictStrategy::Skip => "skip",
            ConflictStrategy::HashCheck => "hash_check",
        }
    }
}

impl From<String> for ConflictStrategy {
    /// Empty or unknown values fall back to `Rename`
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "overwrite" => ConflictStrategy::Overwrite,
            "skip" => ConflictStrategy::Skip,
            "hash_check" | "hashcheck" => ConflictStrategy::HashCheck,
            _ => ConflictStrategy::Rename,
        }
    }
}

impl From<ConflictStrategy> for String {
    fn from(value: ConflictStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to do with a source file whose destination is taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Move the source to this path
    MoveTo(PathBuf),
    /// Leave the source where it is
    Skip,
    /// Source was byte-identical to the destination and has been deleted
    DuplicateRemoved,
}

/// Decide the final destination for `source` when `dest` already exists.
///
/// `Overwrite` and `HashCheck` mutate the filesystem (deleting the existing
/// destination or the duplicate source respectively).
pub fn resolve(
    strategy: ConflictStrategy,
    source: &Path,
    dest: &Path,
    dest_dir: &Path,
    file_name: impl AsRef<OsStr>,
) -> Result<Resolution> {
    resolve_with_limit(strategy, source, dest, dest_dir, file_name, MAX_RENAME_ATTEMPTS)
}

/// [`resolve`] with an explicit cap on `name(n).ext` probes
pub fn resolve_with_limit(
    strategy: ConflictStrategy,
    source: &Path,
    dest: &Path,
    dest_dir: &Path,
    file_name: impl AsRef<OsStr>,
    max_attempts: u32,
) -> Result<Resolution> {
    let file_name = file_name.as_ref();
    match strategy {
        ConflictStrategy::Overwrite => {
            fs::remove_file(dest).map_err(|e| TidyError::Conflict {
                path: dest.to_path_buf(),
                reason: format!("failed to remove destination file for overwrite: {}", e),
            })?;
            Ok(Resolution::MoveTo(dest.to_path_buf()))
        }
        ConflictStrategy::Skip => Ok(Resolution::Skip),
        ConflictStrategy::HashCheck => {
            let identical = same_content(source, dest).map_err(|e| TidyError::Conflict {
                path: source.to_path_buf(),
                reason: format!("failed to hash files: {}", e),
            })?;
            if identical {
                fs::remove_file(source).map_err(|e| TidyError::Conflict {
                    path: source.to_path_buf(),
                    reason: format!("failed to remove duplicate source file: {}", e),
                })?;
                return Ok(Resolution::DuplicateRemoved);
            }
            unique_destination_path_with_limit(dest_dir, file_name, max_attempts)
                .map(Resolution::MoveTo)
        }
        ConflictStrategy::Rename => {
            unique_destination_path_with_limit(dest_dir, file_name, max_attempts)
                .map(Resolution::MoveTo)
        }
    }
}

/// First free path among `name.ext`, `name(1).ext`, `name(2).ext`, ...
pub fn unique_destination_path(dest_dir: &Path, file_name: impl AsRef<OsStr>) -> Result<PathBuf> {
    unique_destination_path_with_limit(dest_dir, file_name, MAX_RENAME_ATTEMPTS)
}

/// [`unique_destination_path`] giving up after `max_attempts` suffixed names
pub fn unique_destination_path_with_limit(
    dest_dir: &Path,
    file_name: impl AsRef<OsStr>,
    max_attempts: u32,
) -> Result<PathBuf> {
    let file_name = file_name.as_ref();
    let candidate = dest_dir.join(file_name);
    if !exists(&candidate) {
        return Ok(candidate);
    }

    let (stem, ext) = split_name(file_name);
    for counter in 1..=max_attempts {
        let mut name = stem.clone();
        name.push(format!("({})", counter));
        name.push(&ext);
        let candidate = dest_dir.join(name);
        if !exists(&candidate) {
            return Ok(candidate);
        }
    }

    Err(TidyError::RenameExhausted {
        dir: dest_dir.to_path_buf(),
        name: file_name.to_string_lossy().into_owned(),
        attempts: max_attempts,
    })
}

/// Split into stem and `.ext` (empty when there is no extension).
/// Works on raw names, so non-UTF-8 bytes survive.
fn split_name(file_name: &OsStr) -> (OsString, OsString) {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            let mut dotted = OsString::from(".");
            dotted.push(ext);
            (stem.to_os_string(), dotted)
        }
        _ => (file_name.to_os_string(), OsString::new()),
    }
}

/// Dangling symlinks count as occupied
fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Whole-file BLAKE3 digest
pub fn file_digest(path: &Path) -> io::Result<blake3::Hash> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hasher.finalize())
}

/// Byte-identical check; sizes are compared before hashing
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(file_digest(a)? == file_digest(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        (dir, src, dst)
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(ConflictStrategy::from("hash-check".to_string()), ConflictStrategy::HashCheck);
        assert_eq!(ConflictStrategy::from("HASH_CHECK".to_string()), ConflictStrategy::HashCheck);
        assert_eq!(ConflictStrategy::from("Skip".to_string()), ConflictStrategy::Skip);
        assert_eq!(ConflictStrategy::from("".to_string()), ConflictStrategy::Rename);
        assert_eq!(ConflictStrategy::from("merge".to_string()), ConflictStrategy::Rename);
        assert_eq!(String::from(ConflictStrategy::Overwrite), "overwrite");
    }

    fn split(name: &str) -> (String, String) {
        let (stem, ext) = split_name(OsStr::new(name));
        (stem.to_string_lossy().into_owned(), ext.to_string_lossy().into_owned())
    }

    #[test]
    fn test_split_name() {
        assert_eq!(split("photo.jpg"), ("photo".to_string(), ".jpg".to_string()));
        assert_eq!(split("archive.tar.gz"), ("archive.tar".to_string(), ".gz".to_string()));
        assert_eq!(split("README"), ("README".to_string(), String::new()));
        assert_eq!(split(".bashrc"), (".bashrc".to_string(), String::new()));
    }

    #[test]
    fn test_rename_exhausted_after_limit() {
        let (_dir, _src, dst) = setup();
        fs::write(dst.join("a.txt"), "0").unwrap();
        for n in 1..=3 {
            fs::write(dst.join(format!("a({}).txt", n)), n.to_string()).unwrap();
        }

        let err = unique_destination_path_with_limit(&dst, "a.txt", 3).unwrap_err();
        match err {
            TidyError::RenameExhausted { dir, name, attempts } => {
                assert_eq!(dir, dst);
                assert_eq!(name, "a.txt");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            unique_destination_path_with_limit(&dst, "a.txt", 4).unwrap(),
            dst.join("a(4).txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unique_path_keeps_raw_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let (_dir, _src, dst) = setup();
        let name = OsStr::from_bytes(b"caf\xE9.jpg");
        fs::write(dst.join(name), "0").unwrap();

        let path = unique_destination_path(&dst, name).unwrap();
        assert_eq!(path.file_name().unwrap().as_bytes(), b"caf\xE9(1).jpg");
    }

    #[test]
    fn test_unique_path_counts_up() {
        let (_dir, _src, dst) = setup();
        assert_eq!(unique_destination_path(&dst, "a.txt").unwrap(), dst.join("a.txt"));

        fs::write(dst.join("a.txt"), "0").unwrap();
        assert_eq!(unique_destination_path(&dst, "a.txt").unwrap(), dst.join("a(1).txt"));

        fs::write(dst.join("a(1).txt"), "1").unwrap();
        fs::write(dst.join("a(2).txt"), "2").unwrap();
        assert_eq!(unique_destination_path(&dst, "a.txt").unwrap(), dst.join("a(3).txt"));
    }

    #[test]
    fn test_rename_resolution() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();

        let res = resolve(ConflictStrategy::Rename, &src.join("a.txt"), &dst.join("a.txt"), &dst, "a.txt").unwrap();
        assert_eq!(res, Resolution::MoveTo(dst.join("a(1).txt")));
        assert!(src.join("a.txt").exists());
    }

    #[test]
    fn test_overwrite_removes_destination() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();

        let res = resolve(ConflictStrategy::Overwrite, &src.join("a.txt"), &dst.join("a.txt"), &dst, "a.txt").unwrap();
        assert_eq!(res, Resolution::MoveTo(dst.join("a.txt")));
        assert!(!dst.join("a.txt").exists());
    }

    #[test]
    fn test_overwrite_failure_is_conflict_error() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.txt"), "new").unwrap();
        // a directory cannot be removed with remove_file
        fs::create_dir(dst.join("a.txt")).unwrap();

        let err = resolve(ConflictStrategy::Overwrite, &src.join("a.txt"), &dst.join("a.txt"), &dst, "a.txt")
            .unwrap_err();
        assert!(matches!(err, TidyError::Conflict { .. }));
    }

    #[test]
    fn test_skip_leaves_both() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.txt"), "new").unwrap();
        fs::write(dst.join("a.txt"), "old").unwrap();

        let res = resolve(ConflictStrategy::Skip, &src.join("a.txt"), &dst.join("a.txt"), &dst, "a.txt").unwrap();
        assert_eq!(res, Resolution::Skip);
        assert!(src.join("a.txt").exists());
        assert_eq!(fs::read_to_string(dst.join("a.txt")).unwrap(), "old");
    }

    #[test]
    fn test_hash_check_identical_removes_source() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.bin"), b"same bytes").unwrap();
        fs::write(dst.join("a.bin"), b"same bytes").unwrap();

        let res = resolve(ConflictStrategy::HashCheck, &src.join("a.bin"), &dst.join("a.bin"), &dst, "a.bin").unwrap();
        assert_eq!(res, Resolution::DuplicateRemoved);
        assert!(!src.join("a.bin").exists());
        assert_eq!(fs::read(dst.join("a.bin")).unwrap(), b"same bytes");
    }

    #[test]
    fn test_hash_check_different_falls_back_to_rename() {
        let (_dir, src, dst) = setup();
        fs::write(src.join("a.bin"), b"abcd").unwrap();
        fs::write(dst.join("a.bin"), b"wxyz").unwrap();

        let res = resolve(ConflictStrategy::HashCheck, &src.join("a.bin"), &dst.join("a.bin"), &dst, "a.bin").unwrap();
        assert_eq!(res, Resolution::MoveTo(dst.join("a(1).bin")));
        assert!(src.join("a.bin").exists());
    }

    #[test]
    fn test_hash_check_missing_source_is_error() {
        let (_dir, src, dst) = setup();
        fs::write(dst.join("a.bin"), b"x").unwrap();

        let err = resolve(ConflictStrategy::HashCheck, &src.join("a.bin"), &dst.join("a.bin"), &dst, "a.bin")
            .unwrap_err();
        assert!(matches!(err, TidyError::Conflict { .. }));
    }

    #[test]
    fn test_digest_matches_content() {
        let (_dir, src, _dst) = setup();
        fs::write(src.join("x"), b"hello").unwrap();
        assert_eq!(file_digest(&src.join("x")).unwrap(), blake3::hash(b"hello"));
    }
}
