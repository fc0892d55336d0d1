//! # votepipe-server
//!
//! One binary, one role per process:
//!
//! - `vote`: ballot page and submission intake in front of the Redis queue
//! - `worker`: drains the queue into PostgreSQL
//! - `result`: polls PostgreSQL for totals and streams them to viewers
//! - `config check`: prints the effective configuration, optionally waiting
//!   until both backends answer

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use votepipe_config::{Config, ConfigLoad, ConfigLoader, ConfigWarnings};
use votepipe_core::{
    Aggregator, Broadcaster, Intake, IntakeFaults, RetryPolicy, SubmissionSink,
    Worker,
};
use votepipe_server::{
    infra::{
        app_state::{ResultState, VoteState},
        backends, telemetry,
    },
    routes,
};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "votepipe-server")]
#[command(about = "Ballot intake, queue worker and live results for votepipe")]
struct Cli {
    /// Path to a votepipe.toml (defaults to ./votepipe.toml or ./config/votepipe.toml)
    #[arg(long, env = "VOTEPIPE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Path to a .env file applied before reading the environment
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
struct ListenArgs {
    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the ballot page and enqueue submissions
    Vote(ListenArgs),
    /// Drain the queue into the tally store
    Worker,
    /// Serve live results to WebSocket viewers
    Result(ListenArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration with secrets redacted
    Check {
        /// Wait up to this long (e.g. `30s`) for queue and store to accept
        /// connections
        #[arg(long, value_parser = humantime::parse_duration)]
        wait: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Vote(listen) => run_vote(config, &listen).await,
        Command::Worker => run_worker(config).await,
        Command::Result(listen) => run_result(config, &listen).await,
        Command::Config(ConfigCommand::Check { wait }) => {
            run_config_check(config, wait).await
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad { config, warnings } =
        loader.load().context("failed to load configuration")?;

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config.metadata.config_path {
        info!(path = %path.display(), "configuration file loaded");
    }
    log_warnings(&warnings);
    Ok(config)
}

fn log_warnings(warnings: &ConfigWarnings) {
    for warning in &warnings.items {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }
}

fn listen_addr(config: &Config, listen: &ListenArgs) -> anyhow::Result<SocketAddr> {
    let host = listen.host.as_deref().unwrap_or(&config.server.host);
    let port = listen.port.unwrap_or(config.server.port);
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))
}

fn instance_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Cancelled on Ctrl-C (and SIGTERM on unix).
fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        trigger.cancel();
    });
    cancel
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn run_vote(config: Config, listen: &ListenArgs) -> anyhow::Result<()> {
    let addr = listen_addr(&config, listen)?;
    let queue = backends::queue_link(&config.queue)?;
    if config.intake.faults != IntakeFaults::Off {
        warn!(fault = ?config.intake.faults, "intake fault injection enabled");
    }
    let intake: Arc<dyn SubmissionSink> =
        Arc::new(Intake::new(queue, config.intake.faults));
    let state = VoteState::new(intake, config.ballot.clone(), instance_name());
    let app = routes::vote_router(state);

    let cancel = shutdown_token();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, queue = %config.queue.host, "vote server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("vote server failed")?;
    Ok(())
}

async fn run_worker(config: Config) -> anyhow::Result<()> {
    let queue = backends::queue_link(&config.queue)?;
    let store = backends::store_link(&config.store)?;
    let mut worker = Worker::new(queue, store, backends::worker_settings(&config));

    let cancel = shutdown_token();
    worker.run(cancel).await;
    Ok(())
}

async fn run_result(config: Config, listen: &ListenArgs) -> anyhow::Result<()> {
    let addr = listen_addr(&config, listen)?;
    let store = backends::store_link(&config.store)?;
    let broadcaster = Broadcaster::default();
    let mut aggregator =
        Aggregator::new(store, broadcaster.clone(), config.aggregator.interval);
    let state = ResultState::new(broadcaster, config.ballot.clone());
    let app = routes::result_router(state);

    let cancel = shutdown_token();
    let aggregator_cancel = cancel.clone();
    let aggregator_task =
        tokio::spawn(async move { aggregator.run(aggregator_cancel).await });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, store = %config.store.host, "result server listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .context("result server failed");

    cancel.cancel();
    aggregator_task.await.context("aggregator task panicked")?;
    served
}

async fn run_config_check(
    config: Config,
    wait: Option<Duration>,
) -> anyhow::Result<()> {
    let lines = config.describe();
    let width = lines.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, value) in lines {
        println!("{key:width$}  {value}");
    }

    let Some(wait) = wait else {
        return Ok(());
    };

    let cancel = CancellationToken::new();
    let deadline = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(wait).await;
        deadline.cancel();
    });
    let policy = RetryPolicy::exponential(
        Duration::from_millis(250),
        Duration::from_secs(5),
    )
    .with_jitter(0.1);
    let waited = humantime::format_duration(wait);

    let config = &config;
    policy
        .retry(|| probe_queue(config), &cancel)
        .await
        .map_err(|_| anyhow!("queue unreachable after {waited}"))?;
    println!("queue: reachable");
    policy
        .retry(|| probe_store(config), &cancel)
        .await
        .map_err(|_| anyhow!("store unreachable after {waited}"))?;
    println!("store: reachable");
    Ok(())
}

async fn probe_queue(config: &Config) -> anyhow::Result<()> {
    let mut link = backends::queue_link(&config.queue)?;
    link.ensure_open().await?;
    link.disconnect().await;
    Ok(())
}

async fn probe_store(config: &Config) -> anyhow::Result<()> {
    let mut link = backends::store_link(&config.store)?;
    link.ensure_open().await?;
    link.disconnect().await;
    Ok(())
}
