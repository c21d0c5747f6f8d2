// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for tidywatch

pub mod templates;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conflict::ConflictStrategy;
use crate::matcher::normalize_extension;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Ordered category rules; the first matching rule wins
    #[serde(default)]
    pub categories: Vec<CategoryRule>,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Undo history settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One matching and destination policy
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CategoryRule {
    pub name: String,

    /// Extensions without the leading dot, compared case-insensitively
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regular expression evaluated against the whole file name.
    /// Takes precedence over `extensions` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default)]
    pub source: PathBuf,

    #[serde(default)]
    pub destination: PathBuf,

    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,

    /// Place files under `<destination>/<extension>/`
    #[serde(default = "default_true")]
    pub use_extension_subfolder: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Seconds a file must go unmodified before it is moved
    #[serde(default = "default_stability_delay")]
    pub stability_delay_secs: u64,

    /// Seconds between stability sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Console,
    #[serde(alias = "log")]
    File,
    Both,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default)]
    pub output: LogOutput,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub show_caller: bool,
}

// Default value functions
fn default_true() -> bool { true }
fn default_stability_delay() -> u64 { 300 }
fn default_sweep_interval() -> u64 { 5 }
fn default_history_path() -> PathBuf { PathBuf::from("tidywatch_history.jsonl") }
fn default_log_file() -> PathBuf { PathBuf::from("tidywatch.log") }
fn default_log_level() -> String { "info".to_string() }

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            stability_delay_secs: default_stability_delay(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::default(),
            log_file: default_log_file(),
            level: default_log_level(),
            show_caller: false,
        }
    }
}

impl WatchConfig {
    /// Stability threshold; zero means "unset" and falls back to five minutes
    pub fn stability_threshold(&self) -> Duration {
        match self.stability_delay_secs {
            0 => Duration::from_secs(default_stability_delay()),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_secs {
            0 => Duration::from_secs(default_sweep_interval()),
            secs => Duration::from_secs(secs),
        }
    }
}

impl CategoryRule {
    /// Build an extension-based rule with the default strategy and subfolders
    pub fn with_extensions(
        name: &str,
        extensions: &[&str],
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            pattern: None,
            source: source.into(),
            destination: destination.into(),
            conflict_strategy: ConflictStrategy::default(),
            use_extension_subfolder: true,
        }
    }

    /// Build a pattern-based rule; extension subfolders do not apply
    pub fn with_pattern(
        name: &str,
        pattern: &str,
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.to_string(),
            extensions: Vec::new(),
            pattern: Some(pattern.to_string()),
            source: source.into(),
            destination: destination.into(),
            conflict_strategy: ConflictStrategy::default(),
            use_extension_subfolder: false,
        }
    }

    pub fn strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    pub fn subfolders(mut self, enabled: bool) -> Self {
        self.use_extension_subfolder = enabled;
        self
    }

    /// Problems that make this rule unusable; empty when the rule is valid
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("category name is empty".to_string());
        }
        if self.source.as_os_str().is_empty() {
            problems.push("source directory is not set".to_string());
        }
        if self.destination.as_os_str().is_empty() {
            problems.push("destination directory is not set".to_string());
        }
        let flat = self.pattern.is_some() || !self.use_extension_subfolder;
        if flat && !self.source.as_os_str().is_empty() && same_dir(&self.source, &self.destination) {
            problems.push("destination is the source directory itself".to_string());
        }

        match &self.pattern {
            Some(pattern) => {
                if let Err(e) = regex::Regex::new(pattern) {
                    problems.push(format!("invalid pattern {:?}: {}", pattern, e));
                }
            }
            None => {
                let usable = self
                    .extensions
                    .iter()
                    .any(|e| !normalize_extension(e).is_empty());
                if !usable {
                    problems.push("neither extensions nor a pattern are configured".to_string());
                }
            }
        }

        problems
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::TidyError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Every problem found, keyed by category name (or position when unnamed)
    pub fn validate(&self) -> Vec<(String, String)> {
        let mut issues = Vec::new();
        let mut seen = HashSet::new();

        for (index, rule) in self.categories.iter().enumerate() {
            let label = if rule.name.trim().is_empty() {
                format!("#{}", index + 1)
            } else {
                rule.name.clone()
            };

            if !rule.name.trim().is_empty() && !seen.insert(rule.name.as_str()) {
                issues.push((label.clone(), "duplicate category name".to_string()));
            }
            for problem in rule.problems() {
                issues.push((label.clone(), problem));
            }
        }

        issues
    }

    /// Rules that are safe to run; invalid ones are logged and left out
    pub fn valid_categories(&self) -> Vec<CategoryRule> {
        let mut seen = HashSet::new();
        let mut valid = Vec::new();

        for rule in &self.categories {
            let problems = rule.problems();
            if !problems.is_empty() {
                tracing::error!(
                    category = %rule.name,
                    problems = ?problems,
                    "Skipping invalid category"
                );
                continue;
            }
            if !seen.insert(rule.name.clone()) {
                tracing::error!(category = %rule.name, "Skipping duplicate category");
                continue;
            }
            valid.push(rule.clone());
        }

        valid
    }
}

/// Same directory, following symlinks when both exist
pub(crate) fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
