//! Command-line surface: `status`, `list`, `check`, `daemon`, `init`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use crate::check::backend::{AnthropicBackend, ENV_API_KEY};
use crate::check::CheckExecutor;
use crate::config::{Topic, DEFAULT_CONFIG_TEXT};
use crate::daemon::{self, Daemon};
use crate::dedup::DedupFilter;
use crate::notify::Dispatcher;
use crate::power;
use crate::schedule;
use crate::signal::{self, ForceTarget};
use crate::store::{ConfigStore, StoreError};
use crate::verdict::Verdict;

#[derive(Parser)]
#[command(
    name = "watchdog",
    version,
    about = "AI agent that monitors topics and notifies you of updates"
)]
pub struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run as background daemon (the default).
    Daemon,
    /// Run a check right now, bypassing power/idle gating and schedules.
    Check {
        /// Specific topic to check; all topics when omitted.
        #[arg(short, long)]
        topic: Option<String>,
        /// Queue the check for the running daemon instead of checking here.
        #[arg(long)]
        queue: bool,
    },
    /// List configured topics.
    List,
    /// Show current status.
    Status,
    /// Create a default config file.
    Init,
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(ConfigStore::default_path);
    let store = ConfigStore::new(path);

    match cli.command.unwrap_or(Commands::Daemon) {
        Commands::Init => cmd_init(&store),
        Commands::List => cmd_list(&store),
        Commands::Status => cmd_status(&store),
        Commands::Check { topic, queue } => cmd_check(&store, topic, queue).await,
        Commands::Daemon => cmd_daemon(&store).await,
    }
}

fn cmd_init(store: &ConfigStore) -> Result<()> {
    if store.path().exists() {
        println!("Config already exists: {}", store.path().display());
        return Ok(());
    }
    if let Some(parent) = store.path().parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Written verbatim so the starter file keeps its comments.
    std::fs::write(store.path(), DEFAULT_CONFIG_TEXT)?;
    println!("Created default config at: {}", store.path().display());
    Ok(())
}

fn cmd_list(store: &ConfigStore) -> Result<()> {
    let cfg = store.load()?;
    if cfg.topics.is_empty() {
        println!("No topics configured");
        return Ok(());
    }
    let name_width = cfg
        .topics
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    println!("{:<name_width$}  {:>8}  {:>7}  {}", "Name", "Interval", "Queries", "Last checked");
    for t in &cfg.topics {
        let last = t
            .last_checked_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{:<name_width$}  {:>7}h  {:>7}  {}",
            t.name,
            t.check_interval_hours,
            t.search_queries.len(),
            last
        );
    }
    Ok(())
}

fn cmd_status(store: &ConfigStore) -> Result<()> {
    println!("Config: {}", store.path().display());
    match store.load() {
        Ok(cfg) => {
            println!("Topics: {}", cfg.topics.len());
            let now = chrono::Utc::now();
            for t in &cfg.topics {
                match schedule::next_due_at(t, now) {
                    None => println!("  {}: due now", t.name),
                    Some(due) => {
                        println!("  {}: due {}", t.name, due.format("%Y-%m-%d %H:%M UTC"))
                    }
                }
            }
        }
        Err(StoreError::Missing(_)) => {
            println!("Topics: config not initialized (run `watchdog init`)");
        }
        Err(e) => return Err(e.into()),
    }
    let on_ac = match power::power_state() {
        power::PowerState::Ac => "AC",
        power::PowerState::Battery => "battery",
        power::PowerState::Unknown => "unknown (assumed AC)",
    };
    println!("Power: {on_ac}");
    match power::idle_minutes() {
        Some(m) => println!("Idle: {m} min"),
        None => println!("Idle: not detectable"),
    }
    let key_set = std::env::var(ENV_API_KEY).map(|k| !k.is_empty()).unwrap_or(false);
    println!("API key: {}", if key_set { "set" } else { "not set" });
    Ok(())
}

async fn cmd_check(store: &ConfigStore, topic: Option<String>, queue: bool) -> Result<()> {
    if queue {
        let target = topic.map(ForceTarget::Topic).unwrap_or(ForceTarget::All);
        signal::request(&store.dir(), &target)?;
        println!("Force check queued for the running daemon.");
        return Ok(());
    }

    let cfg = store.load()?;
    let selected: Vec<Topic> = match &topic {
        Some(name) => vec![cfg
            .topic(name)
            .ok_or_else(|| anyhow!("topic not found: {name}"))?
            .clone()],
        None => cfg.topics.clone(),
    };
    if selected.is_empty() {
        println!("No topics configured");
        return Ok(());
    }

    let backend = AnthropicBackend::from_env().context("cannot run checks")?;
    let executor = CheckExecutor::new(Arc::new(backend));
    let dedup = DedupFilter::default();
    let dispatcher = Dispatcher::desktop();

    for t in &selected {
        println!("Checking: {}", t.name);
        let result = executor.execute(t).await;
        daemon::reconcile(store, &dedup, &dispatcher, &result).await;
        match result.verdict {
            Verdict::Changed => println!("  UPDATE: {}", result.summary),
            Verdict::Unchanged => println!("  No update: {}", result.summary),
            Verdict::Inconclusive => println!(
                "  Inconclusive: {}",
                result.error.as_deref().unwrap_or(&result.summary)
            ),
        }
        if let Some(url) = &result.source_url {
            println!("  Source: {url}");
        }
    }
    Ok(())
}

async fn cmd_daemon(store: &ConfigStore) -> Result<()> {
    let backend = AnthropicBackend::from_env().context("daemon cannot start")?;
    let executor = CheckExecutor::new(Arc::new(backend));
    let daemon = Daemon::new(store.clone(), executor);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });

    daemon.run(rx).await
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("sigterm handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
