//! Process assembly
//!
//! Builds stores, workers, compactors and (in cluster mode) the router
//! from one [`ServerConfig`], and fans a shutdown broadcast out to all of
//! them. Workers share nothing: each owns its store and, when persistence
//! is enabled, its own log file.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::config::{format_memory_size, ServerConfig};
use super::router::{CommandKeyPolicy, HashRing, Router};
use super::worker::Worker;
use crate::cache::{CacheStore, TieredStore};
use crate::persist::{run_compaction_task, LogStore};

pub struct Daemon {
  config: ServerConfig,
  shutdown_tx: broadcast::Sender<()>,
}

impl Daemon {
  pub fn new(config: ServerConfig) -> Self {
    let (shutdown_tx, _) = broadcast::channel(1);
    Self {
      config,
      shutdown_tx,
    }
  }

  /// Trigger graceful shutdown of every server task.
  pub fn shutdown(&self) {
    tracing::info!("Initiating graceful shutdown...");
    let _ = self.shutdown_tx.send(());
  }

  pub async fn run(&self) -> Result<(), anyhow::Error> {
    let max_bytes = self.config.cache.max_memory_bytes();
    tracing::info!(
      "memory limit {} per worker, allkeys-lru eviction",
      format_memory_size(max_bytes)
    );

    let public_addr: SocketAddr = self.config.address().parse()?;

    if self.config.cluster.num_workers == 0 {
      let store = self.build_store(max_bytes, None)?;
      let worker = Worker::new(store, &self.config.net);
      return worker.run(public_addr, self.shutdown_tx.subscribe()).await;
    }

    // Cluster mode: workers on consecutive ports behind the router.
    let mut worker_addrs = Vec::with_capacity(self.config.cluster.num_workers);
    for i in 0..self.config.cluster.num_workers {
      let addr = SocketAddr::new(
        public_addr.ip(),
        self.config.cluster.worker_base_port + i as u16,
      );
      let store = self.build_store(max_bytes, Some(i))?;
      let worker = Worker::new(store, &self.config.net);
      let shutdown = self.shutdown_tx.subscribe();
      tokio::spawn(async move {
        if let Err(e) = worker.run(addr, shutdown).await {
          tracing::error!("worker on {} failed: {}", addr, e);
        }
      });
      worker_addrs.push(addr);
    }

    let policy = Arc::new(CommandKeyPolicy);
    let ring = HashRing::build(&worker_addrs, policy.as_ref());
    let router = Router::new(ring, policy, &self.config.net);
    router.run(public_addr, self.shutdown_tx.subscribe()).await
  }

  /// One store per worker; `shard` picks the log file in cluster mode.
  fn build_store(
    &self,
    max_bytes: usize,
    shard: Option<usize>,
  ) -> Result<Arc<dyn CacheStore>, anyhow::Error> {
    let persistence = &self.config.persistence;
    if !persistence.enabled {
      return Ok(Arc::new(TieredStore::new(max_bytes)));
    }

    let path = match shard {
      Some(i) => format!("{}.{}", persistence.path, i),
      None => persistence.path.clone(),
    };
    let log = Arc::new(LogStore::open(&path, persistence.bloom_filter_size)?);
    tracing::info!(
      "spill log {} ({} live keys recovered)",
      log.path().display(),
      log.live_len()
    );

    tokio::spawn(run_compaction_task(
      log.clone(),
      Duration::from_millis(persistence.rewrite_interval_ms.max(1)),
      persistence.rewrite_dirty_threshold,
      self.shutdown_tx.subscribe(),
    ));

    Ok(Arc::new(TieredStore::with_log(max_bytes, log)))
  }
}
