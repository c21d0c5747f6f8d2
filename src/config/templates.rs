// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Starter configurations written by `tidywatch init`

use std::path::{Path, PathBuf};

use super::{AppConfig, CategoryRule, LogOutput, LoggingConfig};
use crate::conflict::ConflictStrategy;

/// Names accepted by [`template`]
pub const TEMPLATE_NAMES: &[&str] = &["basic", "media", "dev", "full"];

/// Build the named template, or `None` for an unknown name
pub fn template(name: &str) -> Option<AppConfig> {
    let base = default_source_dir();
    let categories = match name {
        "basic" => vec![images(&base, &["jpg", "jpeg", "png", "gif", "bmp", "webp"])],
        "media" => media(&base),
        "dev" => dev(&base),
        "full" => {
            let mut all = media(&base);
            all.extend(dev(&base));
            all
        }
        _ => return None,
    };

    let logging = match name {
        "basic" => LoggingConfig::default(),
        _ => LoggingConfig {
            output: LogOutput::Both,
            log_file: default_log_file(),
            level: if name == "dev" { "debug" } else { "info" }.to_string(),
            show_caller: name != "media",
        },
    };

    Some(AppConfig {
        categories,
        logging,
        ..AppConfig::default()
    })
}

fn images(base: &Path, extensions: &[&str]) -> CategoryRule {
    CategoryRule::with_extensions("images", extensions, base, base.join("images"))
}

fn media(base: &Path) -> Vec<CategoryRule> {
    vec![
        images(base, &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"])
            .strategy(ConflictStrategy::HashCheck),
        CategoryRule::with_extensions("videos", &["mp4", "avi", "mkv", "mov", "wmv"], base, base.join("videos")),
        CategoryRule::with_extensions("audio", &["mp3", "wav", "flac", "aac"], base, base.join("audio")),
    ]
}

fn dev(base: &Path) -> Vec<CategoryRule> {
    vec![
        CategoryRule::with_extensions(
            "source-code",
            &["go", "py", "js", "ts", "java", "cpp", "c", "rs", "rb"],
            base,
            base.join("code"),
        ),
        CategoryRule::with_extensions(
            "documentation",
            &["md", "txt", "pdf", "doc", "docx"],
            base,
            base.join("docs"),
        ),
        CategoryRule::with_extensions(
            "configs",
            &["yaml", "yml", "json", "toml", "xml", "ini", "conf"],
            base,
            base.join("configs"),
        ),
        CategoryRule::with_extensions("archives", &["zip", "tar", "gz", "rar", "7z"], base, base.join("archives"))
            .strategy(ConflictStrategy::HashCheck),
    ]
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

fn default_source_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join("Downloads"))
        .unwrap_or_else(|| PathBuf::from("Downloads"))
}

fn default_log_file() -> PathBuf {
    home_dir()
        .map(|h| h.join(".tidywatch").join("logs").join("tidywatch.log"))
        .unwrap_or_else(|| PathBuf::from("tidywatch.log"))
}
