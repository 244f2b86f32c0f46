mod cli;

use std::io::Read as _;

use anyhow::Context as _;
use clap::Parser;
use flexi_logger::Logger;
use tokio_util::sync::CancellationToken;

use chrono::Utc;

use cli::{CacheAction, Cli, Command};
use vibe_validate::cache::ValidationCache;
use vibe_validate::config::ValidationConfig;
use vibe_validate::error::Error;
use vibe_validate::extract;
use vibe_validate::git::GitPort;
use vibe_validate::health::HealthMonitor;
use vibe_validate::history::HistoryRecorder;
use vibe_validate::model::{HistoryNote, RunRecord};
use vibe_validate::notes::{NotesStore, RUN_REF_PREFIX, VALIDATE_REF};
use vibe_validate::pipeline::{Orchestrator, RunOptions};
use vibe_validate::render;
use vibe_validate::treehash::TreeHasher;

fn init_logging() {
    let spec = if std::env::var("VV_DEBUG").is_ok() { "debug" } else { "warn" };
    Logger::try_with_str(spec)
        .expect("static log spec")
        .log_to_stderr()
        .start()
        .expect("starting flexi_logger");
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            if let Some(err) = e.downcast_ref::<Error>() {
                eprintln!("error: {err}");
                err.exit_code()
            } else {
                eprintln!("error: {e:#}");
                2
            }
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let port = GitPort::discover(cli.git_binary.clone())?;

    match cli.command {
        Command::Run { force, retry_failed } => run_validation(&port, force, retry_failed).await,
        Command::Cache { action } => run_cache_action(&port, action).await,
        Command::Extract { path, command } => run_extract(path, command).await,
    }
}

async fn run_validation(port: &GitPort, force: bool, retry_failed: bool) -> anyhow::Result<i32> {
    if std::env::var("VV_SKIP_DEPENDENCY_CHECK").is_ok() {
        log::info!("VV_SKIP_DEPENDENCY_CHECK set; skipping dependency pre-check (no-op in this build)");
    }

    let (config, config_path) = ValidationConfig::discover(&port.root)
        .with_context(|| format!("loading validation config near {}", port.root.display()))?;
    log::debug!("using config {}", config_path.display());

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let orchestrator = Orchestrator::new(port, &config, cancel.clone());
    let outcome = orchestrator.run(RunOptions { force, retry_failed }).await?;

    if !outcome.cached {
        let cache = ValidationCache::new(NotesStore::new(port)).with_max_runs_per_tree(config.max_runs_per_tree);
        let recorder = HistoryRecorder::new(cache);
        let branch = port.current_branch().await.ok().flatten();
        let head_commit = port.head_commit().await.ok().flatten().map(|h| h.to_string());
        let uncommitted = TreeHasher::new(port).has_working_tree_changes().await.unwrap_or(false);
        let _ = recorder
            .record(outcome.record.clone(), branch, head_commit, uncommitted)
            .await;
    }

    let stdout = std::io::stdout();
    render::render(&mut stdout.lock(), &outcome.record, outcome.cached)?;

    if cancel.is_cancelled() {
        return Ok(130);
    }
    Ok(if outcome.record.passed { 0 } else { 1 })
}

async fn run_cache_action(port: &GitPort, action: CacheAction) -> anyhow::Result<i32> {
    let notes = NotesStore::new(port);
    match action {
        CacheAction::Health => {
            let monitor = HealthMonitor::new(NotesStore::new(port));
            let report = monitor.check().await?;
            println!("totalNotes: {}", report.total_notes);
            println!("oldNotesCount: {}", report.old_notes_count);
            Ok(0)
        }
        CacheAction::Prune => {
            let (config, _) = ValidationConfig::discover(&port.root)
                .with_context(|| format!("loading validation config near {}", port.root.display()))?;
            let validate_pruned = notes
                .prune_older_than::<HistoryNote, _>(VALIDATE_REF, config.retention_days, |note| {
                    note.latest().map(|r| r.timestamp).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
                })
                .await?;
            let run_pruned = notes
                .prune_older_than::<RunRecord, _>(RUN_REF_PREFIX, config.retention_days, |r| r.timestamp)
                .await?;
            println!("pruned {} validation record(s), {} run record(s)", validate_pruned, run_pruned);
            Ok(0)
        }
        CacheAction::List => {
            for (_sha, key) in notes.list(VALIDATE_REF).await? {
                println!("{key}");
            }
            Ok(0)
        }
    }
}

async fn run_extract(path: Option<std::path::PathBuf>, command: Option<String>) -> anyhow::Result<i32> {
    let text = match path {
        Some(p) => std::fs::read_to_string(&p).with_context(|| format!("reading {}", p.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let result = extract::auto_detect_and_extract(&text, command.as_deref());
    println!("{}", serde_yaml::to_string(&result)?);
    Ok(0)
}
