//! Consistent-hash router
//!
//! Fronts a set of cache workers behind one endpoint. Worker addresses are
//! hashed onto a ring once at startup; each request's key argument is
//! hashed with the same function and lands on the worker owning the first
//! ring slot at or above it, wrapping to the smallest slot. A request is
//! proxied over a fresh backend connection and the worker's reply relayed
//! verbatim; backend connections are not reused.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use xxhash_rust::xxh64::xxh64;

use super::config::NetSection;
use crate::resp::{command_key, RespParser, RespValue};

const RING_HASH_SEED: u64 = 0;

/// How the router turns a request frame into a ring position.
pub trait RoutePolicy: Send + Sync {
  /// The routing key of a request, if it has one.
  fn extract_key(&self, frame: &RespValue) -> Option<String>;

  /// Stable 31-bit hash; the same function must cover worker addresses
  /// and keys or ring placement and lookups would disagree.
  fn hash(&self, bytes: &[u8]) -> u32;
}

/// Default policy: the key is the command's second array element. INFO and
/// CONFIG carry no key in that position, so they report none and the
/// router pins them to the ring minimum.
pub struct CommandKeyPolicy;

impl RoutePolicy for CommandKeyPolicy {
  fn extract_key(&self, frame: &RespValue) -> Option<String> {
    let verb = frame.as_array()?.first()?.as_str()?.to_uppercase();
    if verb == "INFO" || verb == "CONFIG" {
      return None;
    }
    command_key(frame).map(String::from)
  }

  fn hash(&self, bytes: &[u8]) -> u32 {
    (xxh64(bytes, RING_HASH_SEED) as u32) & 0x7fff_ffff
  }
}

/// Immutable consistent-hash ring over the worker set.
pub struct HashRing {
  ring: BTreeMap<u32, SocketAddr>,
}

impl HashRing {
  /// Place every worker on the ring by hashing `ip || port`.
  pub fn build(workers: &[SocketAddr], policy: &dyn RoutePolicy) -> Self {
    let mut ring = BTreeMap::new();
    for addr in workers {
      let slot = policy.hash(format!("{}{}", addr.ip(), addr.port()).as_bytes());
      ring.insert(slot, *addr);
    }
    Self { ring }
  }

  /// The worker owning `hash`: smallest ring slot >= hash, wrapping to the
  /// minimum. Deterministic for a fixed worker set.
  pub fn select(&self, hash: u32) -> Option<SocketAddr> {
    self
      .ring
      .range(hash..)
      .next()
      .or_else(|| self.ring.iter().next())
      .map(|(_, addr)| *addr)
  }

  /// The worker at the smallest ring slot; keyless commands land here.
  pub fn first(&self) -> Option<SocketAddr> {
    self.ring.values().next().copied()
  }

  pub fn len(&self) -> usize {
    self.ring.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ring.is_empty()
  }

  /// Ring slots in order, for logging and tests.
  pub fn nodes(&self) -> Vec<(u32, SocketAddr)> {
    self.ring.iter().map(|(h, a)| (*h, *a)).collect()
  }
}

pub struct Router {
  ring: Arc<HashRing>,
  policy: Arc<dyn RoutePolicy>,
  buffer_size: usize,
}

impl Router {
  pub fn new(ring: HashRing, policy: Arc<dyn RoutePolicy>, net: &NetSection) -> Self {
    Self {
      ring: Arc::new(ring),
      policy,
      buffer_size: net.buffer_size,
    }
  }

  /// Bind `addr` and route until the shutdown channel fires.
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
    tracing::info!("router listening on {} ({} workers)", addr, self.ring.len());

    loop {
      tokio::select! {
        result = listener.accept() => {
          match result {
            Ok((socket, peer)) => {
              let ring = self.ring.clone();
              let policy = self.policy.clone();
              let buffer_size = self.buffer_size;
              tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, ring, policy, buffer_size).await {
                  tracing::debug!("router client {} error: {}", peer, e);
                }
              });
            }
            Err(e) => tracing::error!("router accept error: {}", e),
          }
        }
        _ = shutdown.recv() => {
          tracing::info!("router on {} shutting down", addr);
          break;
        }
      }
    }
    Ok(())
  }
}

async fn handle_connection(
  mut socket: TcpStream,
  ring: Arc<HashRing>,
  policy: Arc<dyn RoutePolicy>,
  buffer_size: usize,
) -> Result<(), anyhow::Error> {
  let mut parser = RespParser::new();
  let mut buf = vec![0u8; buffer_size];

  loop {
    let n = socket.read(&mut buf).await?;
    if n == 0 {
      break;
    }
    parser.feed(&buf[..n]);

    loop {
      match parser.parse() {
        Ok(Some(frame)) => {
          let target = policy
            .extract_key(&frame)
            .and_then(|key| ring.select(policy.hash(key.as_bytes())))
            .or_else(|| ring.first());

          let reply = match target {
            Some(worker) => proxy_request(worker, &frame, buffer_size).await,
            None => RespValue::error("ERR no backend workers"),
          };
          socket.write_all(&reply.encode()).await?;
        }
        Ok(None) => break,
        Err(e) => {
          socket
            .write_all(&RespValue::error(&format!("ERR {}", e)).encode())
            .await?;
          parser.clear();
          break;
        }
      }
    }
  }
  Ok(())
}

/// Forward one request to `worker` and read back one complete reply.
/// Backend trouble surfaces to the client as an error reply, never as a
/// dropped request.
async fn proxy_request(worker: SocketAddr, frame: &RespValue, buffer_size: usize) -> RespValue {
  let mut backend = match TcpStream::connect(worker).await {
    Ok(stream) => stream,
    Err(e) => {
      tracing::warn!("backend {} unavailable: {}", worker, e);
      return RespValue::error("ERR backend unavailable");
    }
  };

  if let Err(e) = backend.write_all(&frame.encode()).await {
    tracing::warn!("backend {} write failed: {}", worker, e);
    return RespValue::error("ERR backend unavailable");
  }

  let mut parser = RespParser::new();
  let mut buf = vec![0u8; buffer_size];
  loop {
    match parser.parse() {
      Ok(Some(reply)) => return reply,
      Ok(None) => {}
      Err(e) => {
        tracing::warn!("backend {} sent a malformed reply: {}", worker, e);
        return RespValue::error("ERR backend unavailable");
      }
    }
    match backend.read(&mut buf).await {
      Ok(0) => {
        tracing::warn!("backend {} closed before replying", worker);
        return RespValue::error("ERR backend unavailable");
      }
      Ok(n) => parser.feed(&buf[..n]),
      Err(e) => {
        tracing::warn!("backend {} read failed: {}", worker, e);
        return RespValue::error("ERR backend unavailable");
      }
    }
  }
}
