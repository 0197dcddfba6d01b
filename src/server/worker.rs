//! Cache worker: a RESP server over one store
//!
//! One worker owns one store and serves it over TCP. Frames on a
//! connection are answered strictly in arrival order, so pipelined
//! requests keep their ordering; connections are independent of each
//! other. A protocol error is reported on the offending connection and
//! the connection stays open; only EOF or a socket error closes it.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use uuid::Uuid;

use super::commands::{execute_command, CommandContext};
use super::config::NetSection;
use crate::cache::CacheStore;
use crate::resp::{extract_command, RespParser, RespValue};

pub struct Worker {
  store: Arc<dyn CacheStore>,
  buffer_size: usize,
  max_connections: usize,
}

impl Worker {
  pub fn new(store: Arc<dyn CacheStore>, net: &NetSection) -> Self {
    Self {
      store,
      buffer_size: net.buffer_size,
      max_connections: net.max_events,
    }
  }

  /// Bind `addr` and serve until the shutdown channel fires.
  pub async fn run(
    self,
    addr: SocketAddr,
    shutdown: broadcast::Receiver<()>,
  ) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(addr).await?;
    self.serve(listener, shutdown).await
  }

  /// Serve an already-bound listener (lets tests pick ephemeral ports).
  pub async fn serve(
    self,
    listener: TcpListener,
    mut shutdown: broadcast::Receiver<()>,
  ) -> Result<(), anyhow::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("cache worker listening on {}", addr);

    let permits = Arc::new(Semaphore::new(self.max_connections));

    loop {
      tokio::select! {
        result = listener.accept() => {
          match result {
            Ok((socket, peer)) => {
              let Ok(permit) = permits.clone().try_acquire_owned() else {
                tracing::warn!("connection limit reached, refusing {}", peer);
                continue;
              };
              let store = self.store.clone();
              let buffer_size = self.buffer_size;
              tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, peer, store, buffer_size).await {
                  tracing::debug!("client {} error: {}", peer, e);
                }
                drop(permit);
              });
            }
            Err(e) => tracing::error!("accept error: {}", e),
          }
        }
        _ = shutdown.recv() => {
          tracing::info!("cache worker on {} shutting down", addr);
          break;
        }
      }
    }
    Ok(())
  }
}

async fn handle_connection(
  mut socket: TcpStream,
  peer: SocketAddr,
  store: Arc<dyn CacheStore>,
  buffer_size: usize,
) -> Result<(), anyhow::Error> {
  let client_id = Uuid::new_v4();
  tracing::debug!("client {} connected from {}", client_id, peer);

  let ctx = CommandContext { store };
  let mut parser = RespParser::new();
  let mut buf = vec![0u8; buffer_size];

  loop {
    let n = socket.read(&mut buf).await?;
    if n == 0 {
      break;
    }
    parser.feed(&buf[..n]);

    // Answer every complete frame buffered so far, in order.
    loop {
      match parser.parse() {
        Ok(Some(frame)) => {
          let reply = match extract_command(&frame) {
            Some((cmd, args)) => execute_command(&ctx, &cmd, &args).await,
            None => RespValue::error("ERR Invalid command"),
          };
          socket.write_all(&reply.encode()).await?;
        }
        Ok(None) => break,
        Err(e) => {
          tracing::debug!("client {} protocol error: {}", client_id, e);
          socket
            .write_all(&RespValue::error(&format!("ERR {}", e)).encode())
            .await?;
          parser.clear();
          break;
        }
      }
    }
  }

  tracing::debug!("client {} disconnected", client_id);
  Ok(())
}
