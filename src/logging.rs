// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tracing subscriber setup shared by the binaries

use std::fs::{self, OpenOptions};
use std::sync::Arc;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::config::{LogOutput, LoggingConfig};
use crate::{Result, TidyError};

/// Verbosity requested on the command line; overrides the configured level
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity {
    pub verbose: bool,
    pub trace: bool,
    pub quiet: bool,
}

impl Verbosity {
    fn level<'a>(&self, configured: &'a str) -> &'a str {
        if self.trace {
            "trace"
        } else if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            configured
        }
    }
}

/// Map config level names onto tracing filter directives
fn filter_directive(level: &str) -> &'static str {
    match level.trim().to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "fatal" => "error",
        _ => "info",
    }
}

/// Install the global subscriber.
///
/// File output appends to `log_file`, creating its directory; ANSI colours
/// are only used when writing to the console alone.
pub fn init(config: &LoggingConfig, verbosity: Verbosity) -> Result<()> {
    let filter = filter_directive(verbosity.level(&config.level));

    let (writer, ansi) = match config.output {
        LogOutput::Console => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::File | LogOutput::Both => {
            if let Some(dir) = config.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(dir).map_err(|e| {
                    TidyError::Config(format!("couldn't create log directory {:?}: {}", dir, e))
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.log_file)
                .map_err(|e| {
                    TidyError::Config(format!("couldn't open log file {:?}: {}", config.log_file, e))
                })?;
            let file = Arc::new(file);

            if config.output == LogOutput::Both {
                (BoxMakeWriter::new(std::io::stdout.and(file)), false)
            } else {
                (BoxMakeWriter::new(file), false)
            }
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(config.show_caller)
        .with_line_number(config.show_caller)
        .with_ansi(ansi)
        .with_writer(writer)
        .try_init()
        .map_err(|e| TidyError::Config(format!("failed to install logger: {}", e)))?;

    Ok(())
}
