// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Moving matched files into their category destinations

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::CategoryRule;
use crate::conflict::{self, Resolution, MAX_RENAME_ATTEMPTS};
use crate::history::{new_batch_id, History, HistoryEntry};
use crate::matcher::{list_candidates, matches, CandidateFile, MatchSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStatus {
    Moved,
    Skipped,
    DuplicateRemoved,
    Failed,
}

/// Result of attempting to relocate one file
#[derive(Debug, Clone, Serialize)]
pub struct MoveOutcome {
    pub category: String,
    pub source: PathBuf,
    /// Final path for `Moved`; the occupied or attempted path otherwise
    pub destination: PathBuf,
    pub status: MoveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the move happened but could not be written to history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

impl MoveOutcome {
    fn new(rule: &CategoryRule, source: &Path, destination: PathBuf, status: MoveStatus) -> Self {
        Self {
            category: rule.name.clone(),
            source: source.to_path_buf(),
            destination,
            status,
            error: None,
            history_error: None,
        }
    }

    fn failed(rule: &CategoryRule, source: &Path, destination: PathBuf, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::new(rule, source, destination, MoveStatus::Failed)
        }
    }
}

/// Match count for one category pass
#[derive(Debug, Clone, Serialize)]
pub struct CategoryScan {
    pub category: String,
    pub matcher: String,
    pub matched: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// Everything one run produced
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub batch_id: String,
    pub dry_run: bool,
    pub scans: Vec<CategoryScan>,
    pub outcomes: Vec<MoveOutcome>,
}

impl RunReport {
    pub fn count(&self, status: MoveStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn history_failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.history_error.is_some()).count()
    }

    pub fn log_summary(&self) {
        if self.dry_run {
            let pending: usize = self.scans.iter().map(|s| s.matched).sum();
            info!(pending, "Dry-run complete (no files were moved)");
            return;
        }

        info!(
            batch_id = %self.batch_id,
            moved = self.count(MoveStatus::Moved),
            skipped = self.count(MoveStatus::Skipped),
            duplicates_removed = self.count(MoveStatus::DuplicateRemoved),
            failed = self.count(MoveStatus::Failed),
            "Run complete"
        );

        let unrecorded = self.history_failures();
        if unrecorded > 0 {
            error!(
                batch_id = %self.batch_id,
                unrecorded,
                "Some moves were not written to history; undo will not restore them"
            );
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions {
    /// Scan and report without touching the filesystem
    pub dry_run: bool,
    /// Include matched file names in scan events
    pub show_files: bool,
}

/// Moves files for a list of category rules and records them in history.
///
/// Holds no state between calls besides its injected collaborators.
#[derive(Clone)]
pub struct Mover {
    history: Arc<History>,
    options: MoveOptions,
    rename_limit: u32,
}

/// Directory a pass of `rule` moves into
pub fn destination_dir(rule: &CategoryRule, spec: &MatchSpec) -> PathBuf {
    match spec.subfolder() {
        Some(ext) if rule.use_extension_subfolder => rule.destination.join(ext),
        _ => rule.destination.clone(),
    }
}

impl Mover {
    pub fn new(history: Arc<History>) -> Self {
        Self {
            history,
            options: MoveOptions::default(),
            rename_limit: MAX_RENAME_ATTEMPTS,
        }
    }

    pub fn with_options(mut self, options: MoveOptions) -> Self {
        self.options = options;
        self
    }

    /// Cap on `name(n).ext` probes for rename and divergent hash-check
    pub fn with_rename_limit(mut self, limit: u32) -> Self {
        self.rename_limit = limit;
        self
    }

    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    pub fn options(&self) -> MoveOptions {
        self.options
    }

    /// One full pass over every category under a fresh batch id
    pub fn run_once(&self, categories: &[CategoryRule]) -> RunReport {
        self.run_batch(categories, &new_batch_id())
    }

    /// One full pass over every category, tagging moves with `batch_id`.
    ///
    /// A file claimed by an earlier rule or pass is invisible to later ones.
    pub fn run_batch(&self, categories: &[CategoryRule], batch_id: &str) -> RunReport {
        let mut report = RunReport {
            batch_id: batch_id.to_string(),
            dry_run: self.options.dry_run,
            ..RunReport::default()
        };
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        for rule in categories {
            let listing = match list_candidates(&rule.source) {
                Ok(listing) => listing,
                Err(e) => {
                    error!(
                        category = %rule.name,
                        path = ?rule.source,
                        error = %e,
                        "Failed to read directory"
                    );
                    continue;
                }
            };

            for spec in MatchSpec::for_rule(rule) {
                let available: Vec<CandidateFile> = listing
                    .iter()
                    .filter(|c| !claimed.contains(&c.path))
                    .cloned()
                    .collect();

                let matched: Vec<&CandidateFile> =
                    available.iter().filter(|c| matches(c, &spec)).collect();
                claimed.extend(matched.iter().map(|c| c.path.clone()));

                let scan = CategoryScan {
                    category: rule.name.clone(),
                    matcher: spec.label(),
                    matched: matched.len(),
                    files: if self.options.show_files {
                        matched.iter().map(|c| c.name.clone()).collect()
                    } else {
                        Vec::new()
                    },
                };
                log_scan(&scan);
                report.scans.push(scan);

                if self.options.dry_run || matched.is_empty() {
                    continue;
                }

                report
                    .outcomes
                    .extend(self.move_category(rule, &available, &spec, batch_id));
            }
        }

        report
    }

    /// Move every file in `files` that `spec` matches.
    ///
    /// A destination that cannot be created fails only its own files.
    pub fn move_category(
        &self,
        rule: &CategoryRule,
        files: &[CandidateFile],
        spec: &MatchSpec,
        batch_id: &str,
    ) -> Vec<MoveOutcome> {
        let matched: Vec<&CandidateFile> = files.iter().filter(|c| matches(c, spec)).collect();
        if matched.is_empty() {
            return Vec::new();
        }

        let dest_dir = destination_dir(rule, spec);
        if let Err(e) = fs::create_dir_all(&dest_dir) {
            error!(category = %rule.name, path = ?dest_dir, error = %e, "Failed to create directory");
            return matched
                .into_iter()
                .map(|c| {
                    let outcome = MoveOutcome::failed(
                        rule,
                        &c.path,
                        dest_dir.join(&c.file_name),
                        format!("cannot create destination directory: {}", e),
                    );
                    log_outcome(&outcome);
                    outcome
                })
                .collect();
        }

        matched
            .into_iter()
            .map(|c| {
                let outcome = self.move_file(rule, c, &dest_dir, batch_id);
                log_outcome(&outcome);
                outcome
            })
            .collect()
    }

    fn move_file(
        &self,
        rule: &CategoryRule,
        candidate: &CandidateFile,
        dest_dir: &Path,
        batch_id: &str,
    ) -> MoveOutcome {
        let source = candidate.path.as_path();
        let naive = dest_dir.join(&candidate.file_name);

        // History stores paths as JSON strings
        if source.to_str().is_none() || naive.to_str().is_none() {
            return MoveOutcome::failed(
                rule,
                source,
                naive,
                "path is not valid UTF-8 and could not be recorded for undo".to_string(),
            );
        }

        if same_file(source, &naive) {
            debug!(file = %candidate.name, "Already at its destination");
            return MoveOutcome::new(rule, source, naive, MoveStatus::Skipped);
        }

        let target = if occupied(&naive) {
            debug!(file = %candidate.name, strategy = %rule.conflict_strategy, "Destination exists");
            match conflict::resolve_with_limit(
                rule.conflict_strategy,
                source,
                &naive,
                dest_dir,
                &candidate.file_name,
                self.rename_limit,
            ) {
                Ok(Resolution::MoveTo(path)) => path,
                Ok(Resolution::Skip) => {
                    return MoveOutcome::new(rule, source, naive, MoveStatus::Skipped);
                }
                Ok(Resolution::DuplicateRemoved) => {
                    return MoveOutcome::new(rule, source, naive, MoveStatus::DuplicateRemoved);
                }
                Err(e) => return MoveOutcome::failed(rule, source, naive, e.to_string()),
            }
        } else {
            naive
        };

        // rename(2) replaces silently, so re-check just before the call
        if occupied(&target) {
            return MoveOutcome::failed(
                rule,
                source,
                target,
                "destination became occupied before the move".to_string(),
            );
        }

        if let Err(e) = fs::rename(source, &target) {
            return MoveOutcome::failed(rule, source, target, e.to_string());
        }

        let mut outcome = MoveOutcome::new(rule, source, target.clone(), MoveStatus::Moved);
        let entry = HistoryEntry::new(source.to_path_buf(), target, batch_id);
        if let Err(e) = self.history.add(&entry) {
            error!(
                source = ?entry.source,
                destination = ?entry.destination,
                history = ?self.history.path(),
                error = %e,
                "Moved file but failed to record it in history"
            );
            outcome.history_error = Some(e.to_string());
        }
        outcome
    }
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Both paths name the same directory entry
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.parent().map(fs::canonicalize), b.parent().map(fs::canonicalize)) {
        (Some(Ok(pa)), Some(Ok(pb))) => pa == pb && a.file_name() == b.file_name(),
        _ => false,
    }
}

fn log_scan(scan: &CategoryScan) {
    if scan.matched == 0 {
        info!(category = %scan.category, matcher = %scan.matcher, "No files found");
    } else if scan.files.is_empty() {
        warn!(category = %scan.category, matcher = %scan.matcher, count = scan.matched, "Files to move");
    } else {
        warn!(
            category = %scan.category,
            matcher = %scan.matcher,
            count = scan.matched,
            files = ?scan.files,
            "Files to move"
        );
    }
}

fn log_outcome(outcome: &MoveOutcome) {
    match outcome.status {
        MoveStatus::Moved => info!(
            source = ?outcome.source,
            destination = ?outcome.destination,
            "Moved file"
        ),
        MoveStatus::Skipped => info!(
            source = ?outcome.source,
            existing = ?outcome.destination,
            "File skipped due to conflict strategy"
        ),
        MoveStatus::DuplicateRemoved => info!(
            source = ?outcome.source,
            existing = ?outcome.destination,
            "File identical, source removed"
        ),
        MoveStatus::Failed => error!(
            source = ?outcome.source,
            destination = ?outcome.destination,
            error = outcome.error.as_deref().unwrap_or("unknown"),
            "Failed to move file"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictStrategy;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        src: PathBuf,
        dst: PathBuf,
        mover: Mover,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        let history = Arc::new(History::open(dir.path().join("history.jsonl")).unwrap());
        Fixture {
            src,
            dst,
            mover: Mover::new(history),
            _dir: dir,
        }
    }

    #[test]
    fn test_destination_dir() {
        let rule = CategoryRule::with_extensions("img", &["jpg"], "/s", "/d");
        assert_eq!(destination_dir(&rule, &MatchSpec::extension("jpg")), PathBuf::from("/d/jpg"));
        let flat = rule.clone().subfolders(false);
        assert_eq!(destination_dir(&flat, &MatchSpec::extension("jpg")), PathBuf::from("/d"));
        let pattern = CategoryRule::with_pattern("re", "x", "/s", "/d").subfolders(true);
        assert_eq!(destination_dir(&pattern, &MatchSpec::pattern("x")), PathBuf::from("/d"));
    }

    #[test]
    fn test_move_category_records_history() {
        let f = fixture();
        fs::write(f.src.join("a.jpg"), "a").unwrap();
        fs::write(f.src.join("b.txt"), "b").unwrap();
        let rule = CategoryRule::with_extensions("img", &["jpg"], &f.src, &f.dst);
        let files = list_candidates(&f.src).unwrap();

        let outcomes = f.mover.move_category(&rule, &files, &MatchSpec::extension("jpg"), "b1");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, MoveStatus::Moved);
        assert_eq!(outcomes[0].destination, f.dst.join("jpg").join("a.jpg"));
        assert!(f.src.join("b.txt").exists());

        let batch = f.mover.history().batch("b1").unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].source, f.src.join("a.jpg"));
    }

    #[test]
    fn test_first_rule_wins() {
        let f = fixture();
        fs::write(f.src.join("report.pdf"), "r").unwrap();
        let rules = vec![
            CategoryRule::with_pattern("reports", "^report", &f.src, f.dst.join("reports")),
            CategoryRule::with_extensions("docs", &["pdf"], &f.src, f.dst.join("docs")),
        ];

        let report = f.mover.run_once(&rules);
        assert_eq!(report.count(MoveStatus::Moved), 1);
        assert!(f.dst.join("reports").join("report.pdf").exists());
        assert!(!f.dst.join("docs").exists());
        assert_eq!(report.scans[1].matched, 0);
    }

    #[test]
    fn test_skipped_file_is_not_retried_by_later_rule() {
        let f = fixture();
        fs::write(f.src.join("a.pdf"), "new").unwrap();
        fs::create_dir_all(f.dst.join("first")).unwrap();
        fs::write(f.dst.join("first").join("a.pdf"), "old").unwrap();
        let rules = vec![
            CategoryRule::with_extensions("first", &["pdf"], &f.src, f.dst.join("first"))
                .subfolders(false)
                .strategy(ConflictStrategy::Skip),
            CategoryRule::with_extensions("second", &["pdf"], &f.src, f.dst.join("second")),
        ];

        let report = f.mover.run_once(&rules);
        assert_eq!(report.count(MoveStatus::Skipped), 1);
        assert_eq!(report.count(MoveStatus::Moved), 0);
        assert!(f.src.join("a.pdf").exists());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let f = fixture();
        fs::write(f.src.join("a.jpg"), "a").unwrap();
        let mover = f.mover.clone().with_options(MoveOptions { dry_run: true, show_files: true });
        let rule = CategoryRule::with_extensions("img", &["jpg"], &f.src, &f.dst);

        let report = mover.run_once(&[rule]);
        assert!(report.outcomes.is_empty());
        assert_eq!(report.scans[0].files, vec!["a.jpg".to_string()]);
        assert!(f.src.join("a.jpg").exists());
        assert!(!f.dst.exists());
        assert!(matches!(mover.history().last_batch_id(), Err(crate::TidyError::HistoryEmpty)));
    }

    #[test]
    fn test_unreadable_source_skips_category_only() {
        let f = fixture();
        fs::write(f.src.join("a.jpg"), "a").unwrap();
        let rules = vec![
            CategoryRule::with_extensions("ghost", &["jpg"], f.src.join("missing"), &f.dst),
            CategoryRule::with_extensions("img", &["jpg"], &f.src, &f.dst),
        ];

        let report = f.mover.run_once(&rules);
        assert_eq!(report.count(MoveStatus::Moved), 1);
    }

    #[test]
    fn test_destination_creation_failure_fails_files() {
        let f = fixture();
        fs::write(f.src.join("a.jpg"), "a").unwrap();
        // a plain file where the destination directory should be
        fs::write(&f.dst, "not a dir").unwrap();
        let rule = CategoryRule::with_extensions("img", &["jpg"], &f.src, &f.dst);

        let report = f.mover.run_once(&[rule]);
        assert_eq!(report.count(MoveStatus::Failed), 1);
        assert!(report.outcomes[0].error.is_some());
        assert!(f.src.join("a.jpg").exists());
    }

    #[test]
    fn test_file_already_at_flat_destination_is_left_alone() {
        for strategy in [
            ConflictStrategy::Rename,
            ConflictStrategy::Overwrite,
            ConflictStrategy::Skip,
            ConflictStrategy::HashCheck,
        ] {
            let f = fixture();
            fs::write(f.src.join("a.pdf"), "keep me").unwrap();
            let rules = [
                CategoryRule::with_extensions("docs", &["pdf"], &f.src, &f.src)
                    .subfolders(false)
                    .strategy(strategy),
                CategoryRule::with_pattern("inbox", r"\.pdf$", &f.src, f.src.join("."))
                    .strategy(strategy),
            ];

            for rule in rules {
                for _ in 0..2 {
                    let report = f.mover.run_once(std::slice::from_ref(&rule));
                    assert_eq!(report.outcomes.len(), 1, "{} {}", rule.name, strategy);
                    assert_eq!(report.count(MoveStatus::Skipped), 1, "{} {}", rule.name, strategy);
                }
            }

            let left: Vec<_> = fs::read_dir(&f.src).unwrap().map(|e| e.unwrap().file_name()).collect();
            assert_eq!(left, vec![std::ffi::OsString::from("a.pdf")], "{}", strategy);
            assert_eq!(fs::read_to_string(f.src.join("a.pdf")).unwrap(), "keep me");
            assert!(matches!(f.mover.history().last_batch_id(), Err(crate::TidyError::HistoryEmpty)));
        }
    }

    #[test]
    fn test_rename_exhaustion_fails_and_keeps_source() {
        let f = fixture();
        fs::create_dir_all(&f.dst).unwrap();
        fs::write(f.dst.join("a.txt"), "0").unwrap();
        fs::write(f.dst.join("a(1).txt"), "1").unwrap();
        fs::write(f.dst.join("a(2).txt"), "2").unwrap();
        fs::write(f.src.join("a.txt"), "new").unwrap();
        let mover = f.mover.clone().with_rename_limit(2);
        let rule = CategoryRule::with_extensions("text", &["txt"], &f.src, &f.dst).subfolders(false);

        let report = mover.run_once(&[rule]);
        assert_eq!(report.count(MoveStatus::Failed), 1);
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("after 2 attempts"));
        assert_eq!(fs::read_to_string(f.src.join("a.txt")).unwrap(), "new");
        assert_eq!(fs::read_to_string(f.dst.join("a.txt")).unwrap(), "0");
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_name_is_not_moved() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let f = fixture();
        let name = OsStr::from_bytes(b"caf\xE9.jpg");
        // some filesystems refuse such names outright
        if fs::write(f.src.join(name), "c").is_err() {
            return;
        }
        let rule = CategoryRule::with_extensions("img", &["jpg"], &f.src, &f.dst);

        let report = f.mover.run_once(&[rule]);
        assert_eq!(report.count(MoveStatus::Failed), 1);
        assert!(report.outcomes[0].error.as_deref().unwrap().contains("UTF-8"));
        assert!(f.src.join(name).exists());
        assert!(matches!(f.mover.history().last_batch_id(), Err(crate::TidyError::HistoryEmpty)));
    }

    #[test]
    fn test_unrecorded_move_is_flagged() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.jpg"), "a").unwrap();
        // history path is a directory, so appends fail
        let history_path = dir.path().join("history.jsonl");
        fs::create_dir_all(&history_path).unwrap();
        let mover = Mover::new(Arc::new(History::open(history_path).unwrap()));
        let rule = CategoryRule::with_extensions("img", &["jpg"], &src, dir.path().join("dst"));

        let report = mover.run_once(&[rule]);
        assert_eq!(report.count(MoveStatus::Moved), 1);
        assert_eq!(report.history_failures(), 1);
    }
}
