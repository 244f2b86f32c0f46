// Command-line surface (spec §6: "thin run/cache/extract CLI surface").

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "vibe-validate", version, about = "Local validation runner that memoizes checks against git tree-hash identity")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the git binary to shell out to.
    #[arg(long, global = true, default_value = "git")]
    pub git_binary: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the validation pipeline, consulting and updating the cache.
    Run {
        /// Re-run even if a cached result exists for the current tree hash.
        #[arg(long)]
        force: bool,
        /// Resume from the first failing step of the most recent run.
        #[arg(long)]
        retry_failed: bool,
    },
    /// Inspect or maintain the validation cache stored as git notes.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run an extractor over captured output (mainly for debugging an extractor).
    Extract {
        /// Path to a file containing captured command output; reads stdin if omitted.
        path: Option<PathBuf>,
        /// The original command, used only as a detection hint.
        #[arg(long)]
        command: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Report total and stale note counts.
    Health,
    /// Delete every cache entry.
    Prune,
    /// List tree hashes with cached results.
    List,
}
