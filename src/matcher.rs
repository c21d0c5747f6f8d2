// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Deciding which directory entries belong to a category

use regex::Regex;
use std::ffi::OsString;
use std::fs::{self, DirEntry, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;

use crate::config::CategoryRule;

/// A directory entry observed during a scan
#[derive(Debug, Clone)]
pub struct CandidateFile {
    /// Display and matching form; lossy for names that are not UTF-8
    pub name: String,
    /// Name exactly as stored on disk
    pub file_name: OsString,
    pub path: PathBuf,
    pub is_file: bool,
    pub modified: Option<SystemTime>,
    pub size: u64,
}

impl CandidateFile {
    fn from_metadata(file_name: OsString, path: PathBuf, meta: &Metadata) -> Self {
        Self {
            name: file_name.to_string_lossy().into_owned(),
            file_name,
            path,
            is_file: meta.file_type().is_file(),
            modified: meta.modified().ok(),
            size: meta.len(),
        }
    }

    /// Symlinks are not followed, so a link to a file is not a regular file
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::symlink_metadata(path)?;
        let file_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        Ok(Self::from_metadata(file_name, path.to_path_buf(), &meta))
    }

    fn from_entry(entry: &DirEntry) -> io::Result<Self> {
        let meta = entry.metadata()?;
        Ok(Self::from_metadata(entry.file_name(), entry.path(), &meta))
    }

    /// Lower-cased extension without the dot
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name)
    }
}

/// List a directory once, sorted by name.
///
/// Failing to open the directory is an error; an entry that vanishes
/// between listing and stat is skipped.
pub fn list_candidates(dir: &Path) -> io::Result<Vec<CandidateFile>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        match CandidateFile::from_entry(&entry) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(path = ?entry.path(), error = %e, "Could not stat directory entry"),
        }
    }
    candidates.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(candidates)
}

/// Canonical form of a configured or observed extension: trimmed,
/// leading dots removed, lower case.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Normalized extension of a file name, if it has one
pub fn file_extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(normalize_extension)
        .filter(|e| !e.is_empty())
}

/// One unit of matching work within a category
#[derive(Debug, Clone)]
pub enum MatchSpec {
    /// Normalized extension
    Extension(String),
    /// Whole-name regex; `None` when the configured pattern did not compile
    Pattern { raw: String, regex: Option<Regex> },
}

impl MatchSpec {
    pub fn extension(ext: &str) -> Self {
        MatchSpec::Extension(normalize_extension(ext))
    }

    /// A malformed pattern yields a spec that never matches
    pub fn pattern(raw: &str) -> Self {
        let regex = match Regex::new(raw) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(pattern = raw, error = %e, "Invalid pattern, it will never match");
                None
            }
        };
        MatchSpec::Pattern { raw: raw.to_string(), regex }
    }

    /// Matching passes for a rule: one pattern pass, or one per distinct extension
    pub fn for_rule(rule: &CategoryRule) -> Vec<MatchSpec> {
        if let Some(pattern) = &rule.pattern {
            return vec![MatchSpec::pattern(pattern)];
        }

        let mut specs: Vec<MatchSpec> = Vec::new();
        for ext in &rule.extensions {
            let ext = normalize_extension(ext);
            if ext.is_empty() {
                continue;
            }
            if !specs.iter().any(|s| matches!(s, MatchSpec::Extension(e) if *e == ext)) {
                specs.push(MatchSpec::Extension(ext));
            }
        }
        specs
    }

    /// Subfolder name under the destination when extension subfolders are on
    pub fn subfolder(&self) -> Option<&str> {
        match self {
            MatchSpec::Extension(ext) => Some(ext),
            MatchSpec::Pattern { .. } => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            MatchSpec::Extension(ext) => format!(".{}", ext),
            MatchSpec::Pattern { raw, .. } => format!("/{}/", raw),
        }
    }

    /// Whether a name satisfies this spec, ignoring the file type
    pub fn matches_name(&self, name: &str) -> bool {
        match self {
            MatchSpec::Extension(ext) => file_extension(name).as_deref() == Some(ext.as_str()),
            MatchSpec::Pattern { regex, .. } => regex.as_ref().is_some_and(|r| r.is_match(name)),
        }
    }
}

/// Whether a candidate belongs to a matching pass. Non-regular entries never match.
pub fn matches(candidate: &CandidateFile, spec: &MatchSpec) -> bool {
    candidate.is_file && spec.matches_name(&candidate.name)
}

/// First pass of `rule` that accepts the candidate
pub fn matching_spec(candidate: &CandidateFile, rule: &CategoryRule) -> Option<MatchSpec> {
    MatchSpec::for_rule(rule)
        .into_iter()
        .find(|spec| matches(candidate, spec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(name: &str) -> CandidateFile {
        CandidateFile {
            name: name.to_string(),
            file_name: name.into(),
            path: PathBuf::from("/src").join(name),
            is_file: true,
            modified: None,
            size: 0,
        }
    }

    #[test]
    fn test_normalize_extension() {
        assert_eq!(normalize_extension("JPG"), "jpg");
        assert_eq!(normalize_extension(".Png"), "png");
        assert_eq!(normalize_extension("  ..tar "), "tar");
        assert_eq!(normalize_extension(""), "");
    }

    #[test]
    fn test_extension_matching() {
        let jpg = MatchSpec::extension("jpg");
        assert!(matches(&regular("image.jpg"), &jpg));
        assert!(matches(&regular("image.JPG"), &jpg));
        assert!(matches(&regular("my.image.jpg"), &jpg));
        assert!(matches(&regular("image.jpg"), &MatchSpec::extension(".JPG")));
        assert!(!matches(&regular("image.png"), &jpg));
        assert!(!matches(&regular("image"), &jpg));
        assert!(!matches(&regular("image.jpg.part"), &jpg));
    }

    #[test]
    fn test_directories_never_match() {
        let mut dir = regular("photos.jpg");
        dir.is_file = false;
        assert!(!matches(&dir, &MatchSpec::extension("jpg")));
        assert!(!matches(&dir, &MatchSpec::pattern(".*")));
    }

    #[test]
    fn test_pattern_matching() {
        let spec = MatchSpec::pattern(r"^invoice_\d{4}\.pdf$");
        assert!(matches(&regular("invoice_2024.pdf"), &spec));
        assert!(!matches(&regular("invoice_24.pdf"), &spec));
        assert_eq!(spec.subfolder(), None);
    }

    #[test]
    fn test_malformed_pattern_never_matches() {
        let spec = MatchSpec::pattern("([unclosed");
        assert!(!matches(&regular("([unclosed"), &spec));
        assert!(!matches(&regular("anything.txt"), &spec));
    }

    #[test]
    fn test_specs_for_rule() {
        let rule = CategoryRule::with_extensions("img", &["jpg", ".JPG", "png", ""], "/s", "/d");
        let specs = MatchSpec::for_rule(&rule);
        let labels: Vec<String> = specs.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec![".jpg", ".png"]);

        let mut rule = CategoryRule::with_pattern("re", "^a", "/s", "/d");
        rule.extensions = vec!["txt".into()];
        let specs = MatchSpec::for_rule(&rule);
        assert_eq!(specs.len(), 1);
        assert!(matches!(specs[0], MatchSpec::Pattern { .. }));
    }

    #[test]
    fn test_matching_spec_picks_extension() {
        let rule = CategoryRule::with_extensions("img", &["jpg", "png"], "/s", "/d");
        let spec = matching_spec(&regular("b.PNG"), &rule).unwrap();
        assert_eq!(spec.subfolder(), Some("png"));
        assert!(matching_spec(&regular("c.txt"), &rule).is_none());
    }

    #[test]
    fn test_list_candidates_sorted_and_typed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "aa").unwrap();
        fs::create_dir(dir.path().join("c.txt")).unwrap();

        let found = list_candidates(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(found[0].is_file);
        assert_eq!(found[0].size, 2);
        assert!(!found[2].is_file);
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_candidates(&dir.path().join("missing")).is_err());
    }
}
