// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Batch history of completed moves, used by undo

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::{Result, TidyError};

/// A single completed move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub timestamp: DateTime<Utc>,
    pub batch_id: String,
}

impl HistoryEntry {
    pub fn new(source: PathBuf, destination: PathBuf, batch_id: &str) -> Self {
        Self {
            source,
            destination,
            timestamp: Utc::now(),
            batch_id: batch_id.to_string(),
        }
    }
}

/// Run-scoped batch identifier, unique per invocation or promotion cycle
pub fn new_batch_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("batch_{}_{}", Utc::now().format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// JSON Lines ledger of moves. Every read-modify-write holds `lock`.
pub struct History {
    path: PathBuf,
    lock: Mutex<()>,
}

impl History {
    /// Open the ledger, creating its parent directory.
    ///
    /// The file itself is created on the first `add`.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                TidyError::History(format!("cannot create history directory {:?}: {}", parent, e))
            })?;
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guarded data is (), so a poisoned lock carries no broken state.
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an entry
    pub fn add(&self, entry: &HistoryEntry) -> Result<()> {
        let _guard = self.guard();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        file.sync_data()?;

        Ok(())
    }

    /// Read all entries in insertion order
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let _guard = self.guard();
        self.read_unlocked()
    }

    fn read_unlocked(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!("Failed to parse history entry: {}", e);
                }
            }
        }

        Ok(entries)
    }

    /// Batch id of the most recently added entry
    pub fn last_batch_id(&self) -> Result<String> {
        self.read_all()?
            .pop()
            .map(|entry| entry.batch_id)
            .ok_or(TidyError::HistoryEmpty)
    }

    /// Entries of one batch in insertion order
    pub fn batch(&self, batch_id: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|entry| entry.batch_id == batch_id)
            .collect())
    }

    /// Distinct batch ids, newest first, with their entries
    pub fn batches(&self) -> Result<Vec<(String, Vec<HistoryEntry>)>> {
        let mut batches: Vec<(String, Vec<HistoryEntry>)> = Vec::new();
        for entry in self.read_all()? {
            match batches.iter_mut().find(|(id, _)| *id == entry.batch_id) {
                Some((_, entries)) => entries.push(entry),
                None => batches.push((entry.batch_id.clone(), vec![entry])),
            }
        }
        batches.reverse();
        Ok(batches)
    }

    /// Drop every entry of a batch, returning how many were removed
    pub fn remove_batch(&self, batch_id: &str) -> Result<usize> {
        let _guard = self.guard();

        let entries = self.read_unlocked()?;
        let before = entries.len();
        let kept: Vec<HistoryEntry> = entries
            .into_iter()
            .filter(|entry| entry.batch_id != batch_id)
            .collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        self.rewrite(&kept)?;
        Ok(removed)
    }

    /// Clear all history
    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    /// Replace the ledger through a sibling temp file so readers never see a partial file
    fn rewrite(&self, entries: &[HistoryEntry]) -> Result<()> {
        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            let json = serde_json::to_string(entry)?;
            writeln!(writer, "{}", json)?;
        }
        let file = writer
            .into_inner()
            .map_err(|e| TidyError::History(format!("failed to flush history: {}", e)))?;
        file.sync_all()?;

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Get history file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn entry(name: &str, batch: &str) -> HistoryEntry {
        HistoryEntry::new(
            PathBuf::from("/src").join(name),
            PathBuf::from("/dst").join(name),
            batch,
        )
    }

    #[test]
    fn test_empty_history() {
        let dir = TempDir::new().unwrap();
        let history = History::open(dir.path().join("h.jsonl")).unwrap();
        assert!(matches!(history.last_batch_id(), Err(TidyError::HistoryEmpty)));
        assert!(history.batch("batch_x").unwrap().is_empty());
        assert_eq!(history.remove_batch("batch_x").unwrap(), 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("history").join("h.jsonl");
        History::open(path.clone()).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_batches_and_removal() {
        let dir = TempDir::new().unwrap();
        let history = History::open(dir.path().join("h.jsonl")).unwrap();

        history.add(&entry("a", "b1")).unwrap();
        history.add(&entry("b", "b1")).unwrap();
        history.add(&entry("c", "b2")).unwrap();

        assert_eq!(history.last_batch_id().unwrap(), "b2");
        let b1 = history.batch("b1").unwrap();
        assert_eq!(b1.len(), 2);
        assert_eq!(b1[0].source, PathBuf::from("/src/a"));

        let batches = history.batches().unwrap();
        assert_eq!(batches[0].0, "b2");
        assert_eq!(batches[1].1.len(), 2);

        assert_eq!(history.remove_batch("b2").unwrap(), 1);
        assert_eq!(history.last_batch_id().unwrap(), "b1");
        assert_eq!(history.read_all().unwrap().len(), 2);
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.jsonl");
        History::open(path.clone()).unwrap().add(&entry("a", "b1")).unwrap();

        let reopened = History::open(path).unwrap();
        let entries = reopened.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].destination, PathBuf::from("/dst/a"));
        assert_eq!(entries[0].batch_id, "b1");
    }

    #[test]
    fn test_skips_corrupt_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("h.jsonl");
        let history = History::open(path.clone()).unwrap();
        history.add(&entry("a", "b1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();
        drop(file);
        history.add(&entry("b", "b2")).unwrap();

        assert_eq!(history.read_all().unwrap().len(), 2);
        assert_eq!(history.last_batch_id().unwrap(), "b2");
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let history = Arc::new(History::open(dir.path().join("h.jsonl")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let history = Arc::clone(&history);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        history.add(&entry(&format!("{}-{}", t, i), "b")).unwrap();
                        if i % 10 == 0 {
                            history.remove_batch("other").unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(history.batch("b").unwrap().len(), 100);
    }

    #[test]
    fn test_batch_ids_are_unique() {
        let a = new_batch_id();
        let b = new_batch_id();
        assert!(a.starts_with("batch_"));
        assert_ne!(a, b);
    }
}
