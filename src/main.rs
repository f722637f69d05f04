//! Asset Ledger - file inventory and journal
//!
//! Entry point: bulk scan, then live watching until shutdown.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use asset_ledger::config::{FilterRules, UnattendedPolicy};
use asset_ledger::monitors::{FocusMonitor, ProcProbe, ResourceMonitor, XdotoolProbe};
use asset_ledger::observability::init_tracing;
use asset_ledger::storage::{init_storage, Database};
use asset_ledger::watcher::{
    run_watcher, BulkScanner, Classifier, EventHandler, FileWatcher, Indexer, ScanReport,
    TerminalPrompt, UnattendedPrompt, WatcherConfig, WatcherStats,
};
use asset_ledger::{Config, Error, Result};
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Asset Ledger - keep an inventory of the files under a set of roots
#[derive(Parser, Debug)]
#[command(name = "asset-ledger")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory for the `SQLite` database
    #[arg(short, long, env = "ASSET_LEDGER_DATA_DIR", default_value = "./data")]
    data_dir: PathBuf,

    /// Root directories to scan and watch (absolute paths)
    #[arg(short, long = "root", env = "ASSET_LEDGER_ROOTS", value_delimiter = ',')]
    roots: Vec<PathBuf>,

    /// TOML file overriding the classification rules
    #[arg(long, env = "ASSET_LEDGER_RULES")]
    rules: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ASSET_LEDGER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "ASSET_LEDGER_LOG_JSON")]
    log_json: bool,

    /// Never prompt; unknown extensions follow --unattended
    #[arg(long, env = "ASSET_LEDGER_NON_INTERACTIVE")]
    non_interactive: bool,

    /// What to do with unknown extensions when nobody can answer (ignore, process)
    #[arg(long, env = "ASSET_LEDGER_UNATTENDED", default_value = "ignore")]
    unattended: UnattendedPolicy,

    /// Skip the bulk scan and start watching right away
    #[arg(long, env = "ASSET_LEDGER_SKIP_SCAN", conflicts_with = "scan_only")]
    skip_scan: bool,

    /// Exit after the bulk scan
    #[arg(long, env = "ASSET_LEDGER_SCAN_ONLY")]
    scan_only: bool,

    /// Journal CPU and memory pressure alerts while watching
    #[arg(long, env = "ASSET_LEDGER_RESOURCE_MONITOR")]
    resource_monitor: bool,

    /// Journal changes of the focused window while watching (needs xdotool)
    #[arg(long, env = "ASSET_LEDGER_FOCUS_MONITOR")]
    focus_monitor: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.log_json);

    tracing::info!(
        "Asset Ledger v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = Config {
        data_dir: cli.data_dir,
        log_level: cli.log_level,
        roots: cli.roots,
        rules_file: cli.rules,
        interactive: !cli.non_interactive,
        unattended: cli.unattended,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;

    let rules = match &config.rules_file {
        Some(path) => FilterRules::load(path)?,
        None => FilterRules::default(),
    };

    let db = Database::open(config.database_path())?;
    init_storage(&db)?;

    let classifier = Arc::new(Classifier::new(rules, config.roots.clone()));
    let indexer = Indexer::new(db.clone(), classifier);

    if cli.skip_scan {
        tracing::info!("Bulk scan skipped");
    } else {
        let report = bulk_scan(indexer.clone(), &config).await?;
        if cli.log_json {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::internal(format!("failed to encode scan report: {e}")))?;
            println!("{json}");
        } else {
            print!("{report}");
        }
    }

    if cli.scan_only {
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            shutdown.cancel();
        });
    }

    let mut monitors: Vec<JoinHandle<()>> = Vec::new();
    if cli.resource_monitor {
        let monitor = ResourceMonitor::new(Box::new(ProcProbe::new()));
        monitors.push(tokio::spawn(monitor.run(db.clone(), shutdown.clone())));
    }
    if cli.focus_monitor {
        let monitor = FocusMonitor::new(Box::new(XdotoolProbe));
        monitors.push(tokio::spawn(monitor.run(db.clone(), shutdown.clone())));
    }

    let watcher = FileWatcher::new(&WatcherConfig::with_roots(config.roots.clone()))?;
    let handler = EventHandler::new(indexer, config.unattended, WatcherStats::new());
    run_watcher(watcher, handler, shutdown.clone()).await;

    // The watcher can also stop on its own; take the monitors down with it.
    shutdown.cancel();
    for monitor in monitors {
        if let Err(e) = monitor.await {
            tracing::error!(error = %e, "Monitor task failed");
        }
    }

    tracing::info!("Asset Ledger stopped");
    Ok(())
}

/// Run the bulk scan on a blocking thread.
///
/// The operator is only prompted when the run is interactive and stdin is a
/// terminal; otherwise the unattended policy answers.
async fn bulk_scan(indexer: Indexer, config: &Config) -> Result<ScanReport> {
    let roots = config.roots.clone();
    let attended = config.interactive && std::io::stdin().is_terminal();
    let policy = config.unattended;

    if !attended {
        tracing::info!(%policy, "No operator available, unknown extensions use the unattended policy");
    }

    tokio::task::spawn_blocking(move || {
        let mut scanner = BulkScanner::new(indexer, roots);
        if attended {
            scanner.scan(&mut TerminalPrompt::stdio())
        } else {
            scanner.scan(&mut UnattendedPrompt::new(policy))
        }
    })
    .await
    .map_err(|e| Error::internal(format!("bulk scan task failed: {e}")))?
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
