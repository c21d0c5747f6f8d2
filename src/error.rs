// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for tidywatch

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tidywatch operations
pub type Result<T> = std::result::Result<T, TidyError>;

/// tidywatch error types
#[derive(Error, Debug)]
pub enum TidyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("History error: {0}")]
    History(String),

    #[error("History is empty")]
    HistoryEmpty,

    #[error("No free name for {name:?} in {dir:?} after {attempts} attempts")]
    RenameExhausted {
        dir: PathBuf,
        name: String,
        attempts: u32,
    },

    #[error("Conflict resolution failed for {path:?}: {reason}")]
    Conflict { path: PathBuf, reason: String },
}
