// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidywatch: rule-based file organizer
//!
//! Moves files from watched source directories into category folders,
//! resolves name collisions without losing data, and records every move
//! in batches so the last run can be undone.

pub mod config;
pub mod conflict;
pub mod error;
pub mod history;
pub mod logging;
pub mod matcher;
pub mod mover;
pub mod undo;
pub mod watcher;

pub use config::AppConfig;
pub use error::{Result, TidyError};
