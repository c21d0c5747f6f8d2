// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Watch mode: track files in source directories and move them once settled
//!
//! Two activities share the tracked-path map. The notify callback records
//! activity for created or written paths; a periodic sweep re-reads each
//! tracked file's modification time and hands files that have been quiet
//! for longer than the stability threshold to the [`Mover`]. The map lock
//! is never held across filesystem calls.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{same_dir, AppConfig, CategoryRule};
use crate::history::new_batch_id;
use crate::matcher::{list_candidates, matching_spec, CandidateFile};
use crate::mover::{MoveOutcome, Mover, RunReport};
use crate::Result;

/// Tracked path -> time of last detected activity
pub type Tracker = Arc<Mutex<HashMap<PathBuf, SystemTime>>>;

fn lock(tracker: &Mutex<HashMap<PathBuf, SystemTime>>) -> MutexGuard<'_, HashMap<PathBuf, SystemTime>> {
    tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// notify adapter that feeds create/write activity into a [`Tracker`]
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new(tracker: Tracker) -> Result<Self> {
        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let handler = move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let paths = Self::activity_paths(event);
                if paths.is_empty() {
                    return;
                }
                let now = SystemTime::now();
                let mut tracked = lock(&tracker);
                for path in paths {
                    debug!("Activity on {:?}", path);
                    tracked.insert(path, now);
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        };

        let watcher = RecommendedWatcher::new(handler, config)?;

        Ok(Self { watcher })
    }

    /// Add a directory to watch
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        info!("Monitoring directory: {:?}", path);

        Ok(())
    }

    /// Paths a create or write event refers to
    fn activity_paths(event: Event) -> Vec<PathBuf> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => event
                .paths
                .into_iter()
                .filter(|p| should_process(p))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Check if a file should be tracked at all
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files
    if filename.starts_with('.') {
        return false;
    }

    // Skip in-progress downloads
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download"];
    let lower = filename.to_lowercase();
    if temp_extensions.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n)) {
        return false;
    }

    true
}

/// Result of one stability sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Batch used for this cycle's moves, if anything was promoted
    pub batch_id: Option<String>,
    pub outcomes: Vec<MoveOutcome>,
    /// Stable files no category accepted
    pub rejected: Vec<PathBuf>,
    /// Tracked files that disappeared from disk
    pub dropped: usize,
    /// Files still waiting for the threshold
    pub pending: usize,
}

/// Promotes settled files from watched source directories into the move pipeline
pub struct StabilityWatcher {
    mover: Mover,
    categories: Vec<CategoryRule>,
    threshold: Duration,
    interval: Duration,
    tracked: Tracker,
}

impl StabilityWatcher {
    pub fn new(
        mover: Mover,
        categories: Vec<CategoryRule>,
        threshold: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            mover,
            categories,
            threshold,
            interval,
            tracked: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Valid categories and timings from the configuration
    pub fn from_config(mover: Mover, config: &AppConfig) -> Self {
        Self::new(
            mover,
            config.valid_categories(),
            config.watch.stability_threshold(),
            config.watch.sweep_interval(),
        )
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Shared handle to the tracked-path map
    pub fn tracker(&self) -> Tracker {
        Arc::clone(&self.tracked)
    }

    /// Start tracking a path or refresh its last-seen time
    pub fn track(&self, path: PathBuf) {
        lock(&self.tracked).insert(path, SystemTime::now());
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        lock(&self.tracked).contains_key(path)
    }

    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        lock(&self.tracked).keys().cloned().collect()
    }

    fn untrack(&self, path: &Path) {
        lock(&self.tracked).remove(path);
    }

    /// Distinct source directories, in category order
    pub fn source_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for rule in &self.categories {
            if !dirs.contains(&rule.source) {
                dirs.push(rule.source.clone());
            }
        }
        dirs
    }

    /// Seed the tracker with files already present that some category accepts
    pub fn initial_scan(&self) -> usize {
        let mut found = Vec::new();
        for rule in &self.categories {
            let listing = match list_candidates(&rule.source) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(category = %rule.name, path = ?rule.source, error = %e, "Initial scan failed");
                    continue;
                }
            };
            found.extend(
                listing
                    .into_iter()
                    .filter(|c| should_process(&c.path) && matching_spec(c, rule).is_some())
                    .map(|c| c.path),
            );
        }

        let now = SystemTime::now();
        let mut tracked = lock(&self.tracked);
        let before = tracked.len();
        for path in found {
            tracked.entry(path).or_insert(now);
        }
        tracked.len() - before
    }

    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now())
    }

    /// Promote every tracked file whose modification time is older than
    /// `now - threshold`. Promoted, rejected and vanished files stop being
    /// tracked; files are moved one after another.
    pub fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        for path in self.tracked_paths() {
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.untrack(&path);
                    report.dropped += 1;
                    continue;
                }
                Err(e) => {
                    debug!("Cannot stat {:?}, retrying next sweep: {}", path, e);
                    report.pending += 1;
                    continue;
                }
            };

            let modified = meta.modified().unwrap_or(now);
            let quiet_for = now.duration_since(modified).unwrap_or(Duration::ZERO);
            if quiet_for <= self.threshold {
                report.pending += 1;
                continue;
            }

            let batch_id = report.batch_id.get_or_insert_with(new_batch_id).clone();
            match self.promote(&path, &batch_id) {
                Some(outcome) => report.outcomes.push(outcome),
                None => report.rejected.push(path.clone()),
            }
            self.untrack(&path);
        }

        if !report.outcomes.is_empty() {
            RunReport {
                batch_id: report.batch_id.clone().unwrap_or_default(),
                outcomes: report.outcomes.clone(),
                ..RunReport::default()
            }
            .log_summary();
        }

        report
    }

    /// Hand one stable file to the first category of its directory that accepts it
    fn promote(&self, path: &Path, batch_id: &str) -> Option<MoveOutcome> {
        let candidate = match CandidateFile::from_path(path) {
            Ok(candidate) if candidate.is_file => candidate,
            Ok(_) => return None,
            Err(e) => {
                debug!("File vanished before promotion {:?}: {}", path, e);
                return None;
            }
        };
        let parent = path.parent()?;

        for rule in self.categories.iter().filter(|r| same_dir(&r.source, parent)) {
            let Some(spec) = matching_spec(&candidate, rule) else {
                continue;
            };

            if self.mover.options().dry_run {
                info!(category = %rule.name, file = %candidate.name, "DRY RUN: would move stable file");
                return None;
            }

            return self
                .mover
                .move_category(rule, std::slice::from_ref(&candidate), &spec, batch_id)
                .pop();
        }

        debug!("No category for stable file {:?}", path);
        None
    }

    /// Run until `shutdown` turns true: watch source directories, seed the
    /// tracker, then sweep every interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(stability_delay = ?self.threshold, interval = ?self.interval, "Starting Watch Mode");

        let mut file_watcher = FileWatcher::new(self.tracker())?;
        for dir in self.source_dirs() {
            if let Err(e) = file_watcher.watch(&dir) {
                error!("Failed to watch directory {:?}: {}", dir, e);
            }
        }

        info!("Performing initial scan for existing files...");
        let seeded = self.initial_scan();
        info!("Tracking {} existing files", seeded);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    match tokio::task::spawn_blocking(move || this.sweep()).await {
                        Ok(report) => debug!(
                            pending = report.pending,
                            dropped = report.dropped,
                            rejected = report.rejected.len(),
                            "Sweep finished"
                        ),
                        Err(e) => error!("Sweep task failed: {}", e),
                    }
                }
            }
        }

        drop(file_watcher);
        info!("Stopping Watch Mode");
        Ok(())
    }
}
