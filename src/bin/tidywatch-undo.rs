// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! tidywatch Undo Utility
//!
//! Reverses the most recent batch of moves recorded in the history log.

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tidywatch::config::LoggingConfig;
use tidywatch::history::History;
use tidywatch::logging::{self, Verbosity};
use tidywatch::undo::{last_batch, undo_batch};
use tidywatch::{Result, TidyError};

#[derive(Parser, Debug)]
#[command(name = "tidywatch-undo")]
#[command(version)]
#[command(about = "Undo the last tidywatch batch")]
struct Args {
    /// Path to history file
    #[arg(short = 'f', long, default_value = "tidywatch_history.jsonl")]
    history_file: PathBuf,

    /// Dry run - show what would be undone without doing it
    #[arg(long)]
    dry_run: bool,

    /// List all batches in history
    #[arg(long)]
    list: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    logging::init(
        &LoggingConfig::default(),
        Verbosity {
            verbose: args.verbose,
            quiet: !args.verbose,
            ..Default::default()
        },
    )?;

    if !args.history_file.exists() {
        eprintln!("History file not found: {:?}", args.history_file);
        eprintln!("No moves to undo.");
        return Ok(());
    }

    let history = History::open(args.history_file)?;

    if args.list {
        let batches = history.batches()?;
        println!("Move History ({} batches):", batches.len());
        println!("{:-<80}", "");
        for (i, (batch_id, entries)) in batches.iter().enumerate() {
            println!("{:3}. {} ({} files)", i + 1, batch_id, entries.len());
            for entry in entries {
                println!(
                    "     [{}] {} -> {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.source.display(),
                    entry.destination.display()
                );
            }
        }
        return Ok(());
    }

    let (batch_id, entries) = match last_batch(&history) {
        Ok(batch) => batch,
        Err(TidyError::HistoryEmpty) => {
            println!("No history entries found.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if !args.dry_run && !args.yes {
        println!("The following files will be moved back:");
        for entry in entries.iter().take(5) {
            println!("  {}", entry.source.display());
        }
        if entries.len() > 5 {
            println!("  ... and {} more", entries.len() - 5);
        }
        print!("Proceed? [y/N] ");
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            println!("Undo cancelled.");
            return Ok(());
        }
    }

    println!(
        "{}Undoing batch {} ({} move(s))...",
        if args.dry_run { "[DRY RUN] " } else { "" },
        batch_id,
        entries.len()
    );

    let report = undo_batch(&history, &batch_id, &entries, args.dry_run);

    for path in &report.restored {
        if args.dry_run {
            println!("  Would restore: {}", path.display());
        } else {
            println!("  Undone: {}", path.display());
        }
    }
    for (path, reason) in &report.failed {
        eprintln!("  Skip: {} ({})", path.display(), reason);
    }

    println!();
    if args.dry_run {
        println!("Dry run complete. {} move(s) would be undone.", report.restored.len());
    } else {
        println!(
            "Done. {} undone, {} failed/skipped.",
            report.restored.len(),
            report.failed.len()
        );
    }

    report.ensure_batch_removed()
}
