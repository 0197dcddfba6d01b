use clap::Parser;
use hoard::server::{Daemon, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "hoardd", about = "hoard cache server", version)]
struct Args {
  #[arg(short, long)]
  config: Option<String>,
  #[arg(long, env = "HOARD_HOST")]
  host: Option<String>,
  #[arg(short, long, env = "HOARD_PORT")]
  port: Option<u16>,
  /// Cache memory limit, e.g. "512mb" or "1gb"
  #[arg(short, long)]
  max_memory: Option<String>,
  /// Shard across N workers behind a consistent-hash router
  #[arg(short, long)]
  workers: Option<usize>,
  /// Spill evicted entries to this append-only log
  #[arg(long)]
  persist: Option<String>,
  #[arg(long)]
  log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();

  // Load config: explicit path > auto-detect > defaults
  let mut config = if let Some(path) = &args.config {
    ServerConfig::from_file(path)?
  } else {
    ServerConfig::find_and_load()?.unwrap_or_default()
  };

  // CLI args override config file
  if let Some(host) = args.host {
    config.server.host = host;
  }
  if let Some(port) = args.port {
    config.server.port = port;
  }
  if let Some(max_memory) = args.max_memory {
    config.cache.max_memory = max_memory;
  }
  if let Some(workers) = args.workers {
    config.cluster.num_workers = workers;
  }
  if let Some(path) = args.persist {
    config.persistence.enabled = true;
    config.persistence.path = path;
  }
  if let Some(level) = args.log_level {
    config.logging.level = level;
  }

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into()),
    )
    .with(tracing_subscriber::fmt::layer())
    .init();

  let daemon = Arc::new(Daemon::new(config));
  let daemon_clone = daemon.clone();

  // Handle shutdown signals (SIGINT, SIGTERM)
  tokio::spawn(async move {
    shutdown_signal().await;
    daemon_clone.shutdown();

    // Give connections a moment to drain
    tokio::time::sleep(Duration::from_secs(1)).await;
    tracing::info!("Shutdown complete");
    std::process::exit(0);
  });

  daemon.run().await
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c()
      .await
      .expect("Failed to install Ctrl+C handler");
  };

  #[cfg(unix)]
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("Failed to install SIGTERM handler")
      .recv()
      .await;
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("Received SIGINT"),
    _ = terminate => tracing::info!("Received SIGTERM"),
  }
}
