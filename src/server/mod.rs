//! Server side: configuration, command dispatch, worker and router loops

mod commands;
mod config;
mod daemon;
mod router;
mod worker;

pub use commands::{execute_command, CommandContext};
pub use config::{
  format_memory_size, parse_memory_size, CacheSection, ClusterSection, LoggingSection,
  NetSection, PersistenceSection, ServerConfig, ServerSection,
};
pub use daemon::Daemon;
pub use router::{CommandKeyPolicy, HashRing, RoutePolicy, Router};
pub use worker::Worker;
