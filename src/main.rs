use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::simulate::{self, SimulationReport};

/// Drive the configured rate limiters with a synthetic workload.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only run the named limiter (repeatable)
    #[arg(short, long = "limiter")]
    limiters: Vec<String>,

    /// Print reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = TurnstileConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    info!(limiters = config.limiters.len(), "Configuration loaded");

    for name in &args.limiters {
        if !config.limiters.contains_key(name) {
            anyhow::bail!("no limiter named '{}' in configuration", name);
        }
    }

    let mut limiters: Vec<(String, Arc<dyn turnstile::RateLimiter>)> = Vec::new();
    let mut runs = JoinSet::new();
    for (name, limiter_config) in &config.limiters {
        if !args.limiters.is_empty() && !args.limiters.contains(name) {
            continue;
        }

        let limiter: Arc<dyn turnstile::RateLimiter> = Arc::from(limiter_config.build(name)?);
        limiters.push((name.clone(), Arc::clone(&limiter)));
        let name = name.clone();
        let algorithm = limiter_config.algorithm();
        let workload = config.workload.clone();
        runs.spawn(async move { simulate::run(&name, algorithm, limiter, &workload).await });
    }

    tokio::select! {
        reports = collect(runs) => print_reports(reports?, args.json)?,
        _ = shutdown_signal() => warn!("Interrupted before the workload finished"),
    }

    // Interrupted runs are aborted before they reach their own `stop`.
    for (name, limiter) in &limiters {
        limiter.stop();
        debug!(limiter = %name, "Rate limiter stopped");
    }

    info!("Turnstile stopped");
    Ok(())
}

async fn collect(mut runs: JoinSet<SimulationReport>) -> anyhow::Result<Vec<SimulationReport>> {
    let mut reports = Vec::with_capacity(runs.len());
    while let Some(report) = runs.join_next().await {
        reports.push(report.context("workload task failed")?);
    }
    reports.sort_by(|a, b| a.limiter.cmp(&b.limiter));
    Ok(reports)
}

fn print_reports(reports: Vec<SimulationReport>, json: bool) -> anyhow::Result<()> {
    for report in reports {
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", report);
        }
    }
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
