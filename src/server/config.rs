//! Server configuration
//!
//! Loaded from `hoard.yaml` with per-field defaults, so a config file only
//! needs the keys it wants to change. String values may reference
//! environment variables with `${VAR}` syntax.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
  #[serde(default)]
  pub server: ServerSection,
  #[serde(default)]
  pub cache: CacheSection,
  #[serde(default)]
  pub persistence: PersistenceSection,
  #[serde(default)]
  pub cluster: ClusterSection,
  #[serde(default)]
  pub net: NetSection,
  #[serde(default)]
  pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
  #[serde(default = "default_host")]
  pub host: String,
  #[serde(default = "default_port")]
  pub port: u16,
}

fn default_host() -> String {
  "127.0.0.1".into()
}
fn default_port() -> u16 {
  9001
}

impl Default for ServerSection {
  fn default() -> Self {
    Self {
      host: default_host(),
      port: default_port(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
  /// Maximum cache memory (e.g. "512mb", "1gb")
  #[serde(default = "default_max_memory")]
  pub max_memory: String,
}

fn default_max_memory() -> String {
  "1gb".into()
}

impl Default for CacheSection {
  fn default() -> Self {
    Self {
      max_memory: default_max_memory(),
    }
  }
}

impl CacheSection {
  /// The configured limit in bytes.
  pub fn max_memory_bytes(&self) -> usize {
    parse_memory_size(&self.max_memory).unwrap_or(1024 * 1024 * 1024)
  }
}

/// Spill-log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSection {
  /// Spill evicted entries to an append-only log
  #[serde(default)]
  pub enabled: bool,

  /// Path of the log file
  #[serde(default = "default_log_path")]
  pub path: String,

  /// Bucket count of the membership filter
  #[serde(default = "default_filter_buckets")]
  pub bloom_filter_size: usize,

  /// How often the compactor wakes up
  #[serde(default = "default_rewrite_interval_ms")]
  pub rewrite_interval_ms: u64,

  /// Appends and tombstones that must accumulate before a rewrite runs
  #[serde(default = "default_rewrite_dirty_threshold")]
  pub rewrite_dirty_threshold: u64,
}

fn default_log_path() -> String {
  "./data/hoard.log".into()
}
fn default_filter_buckets() -> usize {
  10_000
}
fn default_rewrite_interval_ms() -> u64 {
  5_000
}
fn default_rewrite_dirty_threshold() -> u64 {
  100
}

impl Default for PersistenceSection {
  fn default() -> Self {
    Self {
      enabled: false,
      path: default_log_path(),
      bloom_filter_size: default_filter_buckets(),
      rewrite_interval_ms: default_rewrite_interval_ms(),
      rewrite_dirty_threshold: default_rewrite_dirty_threshold(),
    }
  }
}

/// Sharding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSection {
  /// Worker backends behind the router; 0 runs a single worker directly
  /// on the public address
  #[serde(default)]
  pub num_workers: usize,

  /// Worker `i` listens on `worker_base_port + i`
  #[serde(default = "default_worker_base_port")]
  pub worker_base_port: u16,
}

fn default_worker_base_port() -> u16 {
  5000
}

impl Default for ClusterSection {
  fn default() -> Self {
    Self {
      num_workers: 0,
      worker_base_port: default_worker_base_port(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetSection {
  /// Per-connection read buffer in bytes
  #[serde(default = "default_buffer_size")]
  pub buffer_size: usize,

  /// Cap on connections serviced concurrently per listener
  #[serde(default = "default_max_events")]
  pub max_events: usize,
}

fn default_buffer_size() -> usize {
  2048
}
fn default_max_events() -> usize {
  4096
}

impl Default for NetSection {
  fn default() -> Self {
    Self {
      buffer_size: default_buffer_size(),
      max_events: default_max_events(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
  #[serde(default = "default_level")]
  pub level: String,
}

fn default_level() -> String {
  "info".into()
}

impl Default for LoggingSection {
  fn default() -> Self {
    Self {
      level: default_level(),
    }
  }
}

impl ServerConfig {
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
    let content = std::fs::read_to_string(&path)?;
    Ok(serde_yaml::from_str(&expand_env_vars(&content))?)
  }

  pub fn find_and_load() -> Result<Option<Self>, anyhow::Error> {
    for p in ["hoard.yaml", "hoard.yml"] {
      if Path::new(p).exists() {
        tracing::info!("Loading config from {}", p);
        return Ok(Some(Self::from_file(p)?));
      }
    }
    Ok(None)
  }

  pub fn address(&self) -> String {
    format!("{}:{}", self.server.host, self.server.port)
  }
}

/// Substitute `${VAR}` references with the environment's values. Unset
/// variables expand to the empty string.
fn expand_env_vars(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut rest = input;
  while let Some(start) = rest.find("${") {
    out.push_str(&rest[..start]);
    match rest[start + 2..].find('}') {
      Some(end) => {
        let name = &rest[start + 2..start + 2 + end];
        out.push_str(&std::env::var(name).unwrap_or_default());
        rest = &rest[start + 2 + end + 1..];
      }
      None => {
        out.push_str(&rest[start..]);
        rest = "";
      }
    }
  }
  out.push_str(rest);
  out
}

/// Parse a memory size string to bytes.
/// Supports b, kb, mb, gb suffixes (case insensitive).
pub fn parse_memory_size(s: &str) -> Option<usize> {
  let s = s.trim().to_lowercase();
  let (digits, unit) = if let Some(d) = s.strip_suffix("gb") {
    (d, 1024 * 1024 * 1024)
  } else if let Some(d) = s.strip_suffix("mb") {
    (d, 1024 * 1024)
  } else if let Some(d) = s.strip_suffix("kb") {
    (d, 1024)
  } else if let Some(d) = s.strip_suffix('b') {
    (d, 1)
  } else {
    (s.as_str(), 1)
  };
  digits.trim().parse::<usize>().ok().map(|n| n * unit)
}

/// Format bytes as a human-readable string
pub fn format_memory_size(bytes: usize) -> String {
  const GB: usize = 1024 * 1024 * 1024;
  const MB: usize = 1024 * 1024;
  const KB: usize = 1024;

  if bytes >= GB {
    format!("{:.1}GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1}MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1}KB", bytes as f64 / KB as f64)
  } else {
    format!("{}B", bytes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.server.port, 9001);
    assert_eq!(config.cache.max_memory, "1gb");
    assert_eq!(config.cluster.num_workers, 0);
    assert!(!config.persistence.enabled);
    assert_eq!(config.net.buffer_size, 2048);
  }

  #[test]
  fn test_parse_memory_size() {
    assert_eq!(parse_memory_size("256mb"), Some(256 * 1024 * 1024));
    assert_eq!(parse_memory_size("1gb"), Some(1024 * 1024 * 1024));
    assert_eq!(parse_memory_size("512kb"), Some(512 * 1024));
    assert_eq!(parse_memory_size("1024b"), Some(1024));
    assert_eq!(parse_memory_size("1024"), Some(1024));
    assert_eq!(parse_memory_size("256 MB"), Some(256 * 1024 * 1024));
    assert_eq!(parse_memory_size("invalid"), None);
  }

  #[test]
  fn test_format_memory_size() {
    assert_eq!(format_memory_size(1024 * 1024 * 1024), "1.0GB");
    assert_eq!(format_memory_size(512 * 1024), "512.0KB");
    assert_eq!(format_memory_size(500), "500B");
  }

  #[test]
  fn test_partial_yaml() {
    let config: ServerConfig =
      serde_yaml::from_str("server:\n  port: 7000\ncache:\n  max_memory: 4mb\n").unwrap();
    assert_eq!(config.server.port, 7000);
    assert_eq!(config.cache.max_memory_bytes(), 4 * 1024 * 1024);
    assert_eq!(config.server.host, "127.0.0.1");
  }
}
