// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Reverting the most recent batch of moves

use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::history::{History, HistoryEntry};
use crate::{Result, TidyError};

/// What an undo pass did
#[derive(Debug, Clone, Default, Serialize)]
pub struct UndoReport {
    pub batch_id: String,
    pub dry_run: bool,
    /// Paths put back at (or, in a dry run, eligible for) their source
    pub restored: Vec<PathBuf>,
    /// Entries left alone, with the reason
    pub failed: Vec<(PathBuf, String)>,
    /// Set when the batch could not be dropped from history afterwards
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

impl UndoReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.history_error.is_none()
    }

    /// `History` error when the batch could not be dropped from the ledger
    pub fn ensure_batch_removed(&self) -> Result<()> {
        match &self.history_error {
            Some(e) => Err(TidyError::History(format!(
                "files were restored but batch {} is still in history: {}",
                self.batch_id, e
            ))),
            None => Ok(()),
        }
    }
}

/// Id and entries of the newest batch; `HistoryEmpty` when there is none
pub fn last_batch(history: &History) -> Result<(String, Vec<HistoryEntry>)> {
    let batch_id = history.last_batch_id()?;
    let entries = history.batch(&batch_id)?;
    Ok((batch_id, entries))
}

/// Undo the newest batch
pub fn undo_last(history: &History, dry_run: bool) -> Result<UndoReport> {
    let (batch_id, entries) = last_batch(history)?;
    Ok(undo_batch(history, &batch_id, &entries, dry_run))
}

/// Move every entry of a batch back, newest first, then forget the batch.
///
/// A missing destination or an occupied source fails that entry only; the
/// batch is removed from history whatever the per-entry results. A dry run
/// checks the same conditions and changes nothing.
pub fn undo_batch(
    history: &History,
    batch_id: &str,
    entries: &[HistoryEntry],
    dry_run: bool,
) -> UndoReport {
    let mut report = UndoReport {
        batch_id: batch_id.to_string(),
        dry_run,
        ..UndoReport::default()
    };

    info!(batch_id, files = entries.len(), dry_run, "Undoing last operation");

    for entry in entries.iter().rev() {
        match restore_entry(entry, dry_run) {
            Ok(()) => report.restored.push(entry.source.clone()),
            Err(reason) => {
                warn!(
                    source = ?entry.source,
                    destination = ?entry.destination,
                    reason = %reason,
                    "Could not restore file"
                );
                report.failed.push((entry.source.clone(), reason));
            }
        }
    }

    if dry_run {
        return report;
    }

    info!(
        batch_id,
        restored = report.restored.len(),
        failed = report.failed.len(),
        "Undo completed"
    );

    if let Err(e) = history.remove_batch(batch_id) {
        error!(batch_id, error = %e, "Failed to remove batch from history");
        report.history_error = Some(e.to_string());
    }

    report
}

fn restore_entry(entry: &HistoryEntry, dry_run: bool) -> std::result::Result<(), String> {
    if fs::symlink_metadata(&entry.destination).is_err() {
        return Err("file not found at destination".to_string());
    }
    if fs::symlink_metadata(&entry.source).is_ok() {
        return Err("source location already occupied".to_string());
    }
    if dry_run {
        return Ok(());
    }

    if let Some(parent) = entry.source.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create source directory: {}", e))?;
    }
    fs::rename(&entry.destination, &entry.source)
        .map_err(|e| format!("failed to move file back: {}", e))?;

    info!(path = ?entry.source, "Restored file");
    Ok(())
}
