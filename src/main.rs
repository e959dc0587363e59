use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hostpace::config::{HostpaceConfig, LoggingConfig};
use hostpace::error::HostpaceError;
use hostpace::ratelimit::{Initiator, RateLimitOptions, RateLimiter};
use hostpace::reload::spawn_reloader;

/// Pace a stream of URLs according to per-host rate limit rules.
///
/// Reads one URL per line on stdin and writes each one to stdout as soon as
/// it may be sent.
#[derive(Parser, Debug)]
#[command(name = "hostpace", version, about)]
struct Cli {
    /// Service configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rate limit rules file, overrides the configured path
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Initiator to throttle the requests as
    #[arg(short, long, default_value = "manual")]
    initiator: Initiator,

    /// Print the per-bucket statistics as JSON on exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = HostpaceConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging);

    info!("Starting Hostpace");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let rules_path = cli
        .rules
        .clone()
        .or_else(|| config.rate_limiting.rules_path.as_ref().map(PathBuf::from));

    let options = match &rules_path {
        Some(path) => RateLimitOptions::from_file(path)?,
        None => {
            warn!("No rules file configured, requests will not be throttled");
            RateLimitOptions::new()
        }
    };
    let limiter = Arc::new(RateLimiter::with_options(&options));
    info!(rules = limiter.rules().len(), initiator = %cli.initiator, "Rate limiter initialized");

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let reloader = match (&rules_path, config.rate_limiting.reload_interval()) {
        (Some(path), Some(interval)) => Some(spawn_reloader(
            Arc::clone(&limiter),
            path.clone(),
            interval,
            cancel.clone(),
        )),
        _ => None,
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let uri = line.trim();
        if uri.is_empty() {
            continue;
        }

        match limiter.throttle(uri, cli.initiator, &cancel).await {
            Ok(()) => {
                stdout.write_all(uri.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(HostpaceError::Interrupted(uri)) => {
                info!(uri = %uri, "Interrupted while waiting, stopping");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    cancel.cancel();
    if let Some(reloader) = reloader {
        reloader.await?;
    }

    if cli.stats {
        print_stats(&limiter)?;
    }

    info!("Hostpace stopped");
    Ok(())
}

/// Initialize tracing to stderr; stdout carries the paced URLs.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if config.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn print_stats(limiter: &RateLimiter) -> anyhow::Result<()> {
    let stats: Vec<serde_json::Value> = limiter
        .entries()
        .iter()
        .map(|entry| {
            serde_json::json!({
                "rule": entry.key().rule,
                "group": entry.key().group,
                "requests": entry.request_count(),
                "first_request_time": entry.first_request_time(),
                "last_request_time": entry.last_request_time(),
                "effective_requests_per_second": entry.effective_requests_per_second(),
            })
        })
        .collect();
    eprintln!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM), then cancel `token`.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }

    token.cancel();
}
