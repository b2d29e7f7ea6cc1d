//! homewatch - service health monitoring and uptime history for a homelab dashboard.

mod config;
mod db;
mod probe;
mod scheduler;
mod uptime;

#[cfg(test)]
mod testing;

use config::EngineConfig;
use db::{HistoryStore, NullSink, Store, TimeSeriesSink};
use probe::HttpProber;
use scheduler::HealthMonitor;
use uptime::UptimeService;

use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "homewatch",
    version,
    about = "Health checks and uptime history for homelab services"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Probe registered services until interrupted (default)
    Run {
        /// Override the check interval in seconds
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print uptime history as JSON
    History {
        /// Only this service; every service with history otherwise
        #[arg(long)]
        service: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("homewatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let mut cfg = EngineConfig::load();

    let command = cli.command.unwrap_or(Command::Run {
        interval_secs: None,
    });
    match command {
        Command::Run { interval_secs } => {
            if let Some(secs) = interval_secs.filter(|s| *s > 0) {
                cfg.check_interval = Duration::from_secs(secs);
            }
            run(cfg).await
        }
        Command::History { service } => history(cfg, service).await,
    }
}

async fn run(cfg: EngineConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing::info!("Using registry database at {}", cfg.db_path);
    let registry = Arc::new(Store::new(&cfg.db_path)?);
    let sink = open_history(&cfg);
    let prober = Arc::new(HttpProber::new(cfg.probe_timeout)?);

    let monitor = HealthMonitor::start(&cfg, registry, sink, prober);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down; waiting for in-flight health checks");
    monitor.shutdown().await;

    Ok(())
}

async fn history(
    cfg: EngineConfig,
    service: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let uptime = UptimeService::new(open_history(&cfg));

    let json = match service {
        Some(id) => serde_json::to_string_pretty(&uptime.get_uptime_history(&id).await)?,
        None => serde_json::to_string_pretty(&uptime.get_all_uptime_history().await)?,
    };
    println!("{}", json);

    Ok(())
}

/// Open the history database, or fall back to running without history.
fn open_history(cfg: &EngineConfig) -> Arc<dyn TimeSeriesSink> {
    let Some(path) = cfg.history_path.as_deref() else {
        tracing::info!("Skipping uptime history: HOMEWATCH_HISTORY_PATH not set");
        return Arc::new(NullSink);
    };

    match HistoryStore::new(path) {
        Ok(store) => {
            tracing::info!("Using history database at {}", path);
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                "Failed to open history database {}: {}; continuing without history",
                path,
                e
            );
            Arc::new(NullSink)
        }
    }
}
