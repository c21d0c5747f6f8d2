// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidywatch: rule-based file organizer
//!
//! Moves files into category folders once, or keeps watching source
//! directories and moves files after they stop changing.

use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use tidywatch::config::templates::{template, TEMPLATE_NAMES};
use tidywatch::config::AppConfig;
use tidywatch::history::History;
use tidywatch::logging::{self, Verbosity};
use tidywatch::mover::{MoveOptions, Mover, RunReport};
use tidywatch::undo::{last_batch, undo_batch};
use tidywatch::watcher::StabilityWatcher;
use tidywatch::{Result, TidyError};

/// tidywatch CLI - rule-based file organizer
#[derive(Parser, Debug)]
#[command(name = "tidywatch")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Organize files into category folders, watch for new ones, undo the last run", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "tidywatch.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Output format for results
    #[arg(long, global = true, default_value = "text", value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Move matching files once (default command)
    Move {
        /// Show what would be moved without moving anything
        #[arg(short = 'p', long = "dry-run", alias = "preview")]
        dry_run: bool,

        /// List matched file names
        #[arg(long)]
        show_files: bool,
    },

    /// Watch source directories and move files once they stop changing
    Watch {
        /// Seconds a file must stay unmodified (overrides config)
        #[arg(short, long)]
        delay: Option<u64>,

        /// Seconds between stability sweeps (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Log what would be moved without moving anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Undo the most recent batch of moves
    Undo {
        /// Show what would be restored
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect or clear move history
    History {
        #[command(subcommand)]
        action: HistoryCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Write a starter configuration file
    Init {
        /// Template to use (basic, media, dev, full)
        #[arg(short, long, default_value = "basic")]
        template: String,

        /// Where to write the configuration (defaults to --config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommands {
    /// List recent batches
    List {
        /// Number of batches to show
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,
    },

    /// Clear all history
    Clear {
        /// Skip confirmation
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "tidywatch.json")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)?;

    logging::init(
        &config.logging,
        Verbosity {
            verbose: cli.verbose,
            trace: cli.trace,
            quiet: cli.quiet,
        },
    )?;

    match cli.command {
        Some(Commands::Move { dry_run, show_files }) => {
            run_move(config, dry_run, show_files, &cli.format)
        }
        Some(Commands::Watch { delay, interval, dry_run }) => {
            run_watch(config, delay, interval, dry_run).await
        }
        Some(Commands::Undo { dry_run, yes }) => run_undo(config, dry_run, yes, &cli.format),
        Some(Commands::History { action }) => run_history_command(config, action),
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Init { template, output, force }) => {
            run_init(&template, output.unwrap_or(cli.config), force)
        }
        None => run_move(config, false, false, &cli.format),
    }
}

fn open_history(config: &AppConfig) -> Result<Arc<History>> {
    History::open(config.history.path.clone()).map(Arc::new)
}

/// Run every category once
fn run_move(config: AppConfig, dry_run: bool, show_files: bool, format: &str) -> Result<()> {
    let categories = config.valid_categories();
    if categories.is_empty() {
        return Err(TidyError::Config(
            "no usable categories configured; run `tidywatch init` to create a configuration".to_string(),
        ));
    }

    let mover = Mover::new(open_history(&config)?)
        .with_options(MoveOptions { dry_run, show_files });
    let report = mover.run_once(&categories);
    report.log_summary();

    print_report(&report, format)
}

fn print_report(report: &RunReport, format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(report)?),
        "jsonl" => {
            for outcome in &report.outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Run the watch mode until Ctrl+C or SIGTERM
async fn run_watch(
    mut config: AppConfig,
    delay: Option<u64>,
    interval: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    if let Some(secs) = delay {
        config.watch.stability_delay_secs = secs;
    }
    if let Some(secs) = interval {
        config.watch.sweep_interval_secs = secs;
    }

    if dry_run {
        warn!("DRY RUN MODE - files will not be moved");
    }

    let mover = Mover::new(open_history(&config)?)
        .with_options(MoveOptions { dry_run, show_files: false });
    let watcher = Arc::new(StabilityWatcher::from_config(mover, &config));
    if watcher.source_dirs().is_empty() {
        return Err(TidyError::Config("no usable categories to watch".to_string()));
    }

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!("Watcher active. Press Ctrl+C to stop.");
    watcher.run(shutdown_rx).await
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Ask a yes/no question on stdin
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Undo the most recent batch
fn run_undo(config: AppConfig, dry_run: bool, yes: bool, format: &str) -> Result<()> {
    let history = open_history(&config)?;

    let (batch_id, entries) = match last_batch(&history) {
        Ok(batch) => batch,
        Err(TidyError::HistoryEmpty) => {
            println!("No moves to undo");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if !dry_run && !yes {
        println!("Undo operation for batch: {}", batch_id);
        println!("\nFiles to restore ({} total):", entries.len());
        for entry in entries.iter().take(5) {
            let name = entry
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            println!("  - {}", name);
        }
        if entries.len() > 5 {
            println!("  ... and {} more files", entries.len() - 5);
        }
        if !confirm("\nProceed with restore?")? {
            println!("Undo operation cancelled");
            return Ok(());
        }
    }

    let report = undo_batch(&history, &batch_id, &entries, dry_run);

    match format {
        "json" | "jsonl" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            let verb = if dry_run { "Would restore" } else { "Restored" };
            for path in &report.restored {
                println!("  {}: {}", verb, path.display());
            }
            for (path, reason) in &report.failed {
                println!("  Skip: {} ({})", path.display(), reason);
            }
            println!(
                "\n{}{} restored, {} failed/skipped.",
                if dry_run { "[DRY RUN] " } else { "" },
                report.restored.len(),
                report.failed.len()
            );
        }
    }

    report.ensure_batch_removed()
}

/// Run history commands
fn run_history_command(config: AppConfig, action: HistoryCommands) -> Result<()> {
    let history = open_history(&config)?;

    match action {
        HistoryCommands::List { count } => {
            let batches = history.batches()?;
            if batches.is_empty() {
                println!("History is empty");
                return Ok(());
            }
            println!("Recent batches ({} of {}):", count.min(batches.len()), batches.len());
            for (batch_id, entries) in batches.into_iter().take(count) {
                let when = entries
                    .first()
                    .map(|e| e.timestamp.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {} [{}] {} file(s)", batch_id, when, entries.len());
                for entry in entries {
                    println!(
                        "    {} -> {}",
                        entry.source.display(),
                        entry.destination.display()
                    );
                }
            }
        }
        HistoryCommands::Clear { force } => {
            if !force {
                eprintln!("Use --force to confirm clearing history");
                return Ok(());
            }
            history.clear()?;
            println!("History cleared");
        }
    }

    Ok(())
}

/// Run config commands
fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output } => {
            let default_config = template("basic").unwrap_or_default();
            default_config.save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            let issues = config.validate();
            if issues.is_empty() {
                println!("Configuration at {:?} is valid", config_path);
                println!("  Categories: {}", config.categories.len());
                println!("  Stability delay: {:?}", config.watch.stability_threshold());
                println!("  History: {:?}", config.history.path);
            } else {
                for (category, problem) in &issues {
                    println!("  {}: {}", category, problem);
                }
                return Err(TidyError::Config(format!(
                    "{} problem(s) in {:?}",
                    issues.len(),
                    config_path
                )));
            }
        }
    }

    Ok(())
}

/// Write a starter configuration
fn run_init(template_name: &str, output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(TidyError::Config(format!(
            "{:?} already exists. Use --force to overwrite",
            output
        )));
    }

    let config = template(template_name).ok_or_else(|| {
        TidyError::Config(format!(
            "unknown template '{}', expected one of: {}",
            template_name,
            TEMPLATE_NAMES.join(", ")
        ))
    })?;
    config.save(&output)?;

    println!("Configuration file created at: {:?}", output);
    println!("\nNext steps:");
    println!("  1. Edit the configuration file to customize categories");
    println!("  2. Run 'tidywatch move --dry-run' to see what would be moved");
    println!("  3. Run 'tidywatch' to organize your files");
    println!("  4. Run 'tidywatch watch' to move new files as they settle");
    println!("  5. Run 'tidywatch undo' to revert the last run");

    Ok(())
}
