//! RESP client connection

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::resp::{RespParser, RespValue};

/// One TCP connection speaking request/reply RESP.
pub struct Connection {
  stream: TcpStream,
  parser: RespParser,
  buf: Vec<u8>,
}

impl Connection {
  pub async fn connect(host: &str) -> Result<Self, anyhow::Error> {
    let stream = TcpStream::connect(host).await.map_err(|e| {
      anyhow::anyhow!(
        "Failed to connect to cache server at {}: {}. Is the server running?",
        host,
        e
      )
    })?;
    Ok(Self {
      stream,
      parser: RespParser::new(),
      buf: vec![0u8; 4096],
    })
  }

  /// Send one frame and wait for one complete reply.
  pub async fn request(&mut self, frame: &RespValue) -> Result<RespValue, anyhow::Error> {
    self.stream.write_all(&frame.encode()).await?;
    loop {
      if let Some(reply) = self.parser.parse()? {
        return Ok(reply);
      }
      let n = self.stream.read(&mut self.buf).await?;
      if n == 0 {
        anyhow::bail!("connection closed by server");
      }
      self.parser.feed(&self.buf[..n]);
    }
  }

  pub async fn set(&mut self, key: &str, value: &str) -> Result<RespValue, anyhow::Error> {
    self.request(&RespValue::command(&["SET", key, value])).await
  }

  pub async fn get(&mut self, key: &str) -> Result<RespValue, anyhow::Error> {
    self.request(&RespValue::command(&["GET", key])).await
  }

  pub async fn del(&mut self, keys: &[String]) -> Result<RespValue, anyhow::Error> {
    let mut parts = vec!["DEL"];
    parts.extend(keys.iter().map(String::as_str));
    self.request(&RespValue::command(&parts)).await
  }

  pub async fn info(&mut self) -> Result<RespValue, anyhow::Error> {
    self.request(&RespValue::command(&["INFO"])).await
  }

  pub async fn config_get(&mut self, param: &str) -> Result<RespValue, anyhow::Error> {
    self
      .request(&RespValue::command(&["CONFIG", "GET", param]))
      .await
  }
}
