//! Periodic log compaction task

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use super::log::LogStore;

/// Drive compaction for `log` until the shutdown channel fires.
///
/// Each tick checks the dirty-write counter and only rewrites once at least
/// `dirty_threshold` appends or tombstones have accumulated, so an idle
/// store never churns its file. The rewrite itself runs on the blocking
/// pool; request traffic keeps flowing meanwhile.
pub async fn run_compaction_task(
  log: Arc<LogStore>,
  interval: Duration,
  dirty_threshold: u64,
  mut shutdown: broadcast::Receiver<()>,
) {
  let mut ticker = tokio::time::interval(interval);
  ticker.tick().await; // the first tick fires immediately

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if log.dirty() < dirty_threshold {
          continue;
        }
        let log = log.clone();
        match tokio::task::spawn_blocking(move || log.compact()).await {
          Ok(Ok(stats)) => {
            tracing::debug!(
              "log compaction kept {} records, dropped {} ({} live bytes)",
              stats.kept,
              stats.dropped,
              stats.live_bytes
            );
          }
          Ok(Err(e)) => {
            tracing::error!("log compaction failed, keeping live file: {}", e);
          }
          Err(e) => {
            tracing::error!("log compaction task panicked: {}", e);
          }
        }
      }
      _ = shutdown.recv() => {
        tracing::debug!("compaction task stopping");
        break;
      }
    }
  }
}
