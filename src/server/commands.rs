//! Command handlers
//!
//! Maps parsed request frames onto store operations and formats the RESP
//! reply. Verbs are case-insensitive; anything outside the supported set
//! reports an unknown command on the offending connection.

use std::sync::Arc;

use crate::cache::{CacheStore, StoreError};
use crate::resp::RespValue;

/// Command execution context
pub struct CommandContext {
  pub store: Arc<dyn CacheStore>,
}

/// Execute one command against the store.
pub async fn execute_command(ctx: &CommandContext, cmd: &str, args: &[String]) -> RespValue {
  match cmd {
    "SET" => cmd_set(ctx, args).await,
    "GET" => cmd_get(ctx, args).await,
    "DEL" => cmd_del(ctx, args).await,
    "INFO" => cmd_info(ctx).await,
    "CONFIG" => cmd_config(ctx, args).await,
    _ => RespValue::error("ERR Unknown command"),
  }
}

async fn cmd_set(ctx: &CommandContext, args: &[String]) -> RespValue {
  if args.len() < 2 {
    return RespValue::error("ERR wrong number of arguments for 'set' command");
  }

  match ctx.store.set(&args[0], &args[1]).await {
    Ok(()) => RespValue::ok(),
    Err(StoreError::EntryTooLarge) => RespValue::error("ERR entry too large"),
  }
}

async fn cmd_get(ctx: &CommandContext, args: &[String]) -> RespValue {
  if args.is_empty() {
    return RespValue::error("ERR wrong number of arguments for 'get' command");
  }

  match ctx.store.get(&args[0]).await {
    Some(value) => RespValue::bulk(&value),
    None => RespValue::null_bulk(),
  }
}

async fn cmd_del(ctx: &CommandContext, args: &[String]) -> RespValue {
  if args.is_empty() {
    return RespValue::error("ERR wrong number of arguments for 'del' command");
  }

  let mut deleted = 0i64;
  for key in args {
    if ctx.store.delete(key).await {
      deleted += 1;
    }
  }
  RespValue::integer(deleted)
}

async fn cmd_info(ctx: &CommandContext) -> RespValue {
  let stats = ctx.store.stats().await;

  let mut info = String::new();
  info.push_str("# Memory\r\n");
  info.push_str(&format!("used_memory:{}\r\n", stats.memory_used));
  info.push_str(&format!("maxmemory:{}\r\n", stats.memory_limit));
  info.push_str("maxmemory_policy:allkeys-lru\r\n");
  info.push_str("# Stats\r\n");
  info.push_str(&format!("keyspace_hits:{}\r\n", stats.hits));

  RespValue::bulk(&info)
}

async fn cmd_config(ctx: &CommandContext, args: &[String]) -> RespValue {
  if args.is_empty() {
    return RespValue::error("ERR wrong number of arguments for 'config' command");
  }

  if args[0].to_uppercase() == "GET" && args.len() >= 2 {
    match args[1].to_lowercase().as_str() {
      "maxmemory" => {
        let stats = ctx.store.stats().await;
        return RespValue::array(vec![
          RespValue::bulk("maxmemory"),
          RespValue::bulk(&stats.memory_limit.to_string()),
        ]);
      }
      "maxmemory-policy" => {
        return RespValue::array(vec![
          RespValue::bulk("maxmemory-policy"),
          RespValue::bulk("allkeys-lru"),
        ]);
      }
      _ => {}
    }
  }

  RespValue::SimpleString(
    "Supported CONFIG commands: GET maxmemory, GET maxmemory-policy".to_string(),
  )
}
