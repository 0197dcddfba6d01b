//! RESP protocol parser and encoder
//!
//! Requests arrive as arrays of bulk strings; replies use the five classic
//! kinds (simple string, error, integer, bulk string, array). The parser is
//! incremental: partial frames are buffered until the missing bytes arrive.

/// RESP protocol value types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
  /// Simple string (+OK\r\n)
  SimpleString(String),
  /// Error (-ERR message\r\n)
  Error(String),
  /// Integer (:123\r\n)
  Integer(i64),
  /// Bulk string ($5\r\nhello\r\n); None encodes the null bulk ($-1\r\n)
  BulkString(Option<String>),
  /// Array (*2\r\n...); None encodes the null array (*-1\r\n)
  Array(Option<Vec<RespValue>>),
}

impl RespValue {
  pub fn ok() -> Self {
    RespValue::SimpleString("OK".to_string())
  }

  pub fn error(msg: &str) -> Self {
    RespValue::Error(msg.to_string())
  }

  pub fn integer(i: i64) -> Self {
    RespValue::Integer(i)
  }

  pub fn bulk(s: &str) -> Self {
    RespValue::BulkString(Some(s.to_string()))
  }

  pub fn null_bulk() -> Self {
    RespValue::BulkString(None)
  }

  pub fn array(items: Vec<RespValue>) -> Self {
    RespValue::Array(Some(items))
  }

  /// Build a command frame from its string parts
  pub fn command(parts: &[&str]) -> Self {
    RespValue::array(parts.iter().map(|p| RespValue::bulk(p)).collect())
  }

  /// Encode to RESP wire format
  pub fn encode(&self) -> Vec<u8> {
    let mut buf = Vec::new();
    self.encode_into(&mut buf);
    buf
  }

  fn encode_into(&self, buf: &mut Vec<u8>) {
    match self {
      RespValue::SimpleString(s) => {
        buf.extend_from_slice(format!("+{}\r\n", s).as_bytes());
      }
      RespValue::Error(e) => {
        buf.extend_from_slice(format!("-{}\r\n", e).as_bytes());
      }
      RespValue::Integer(i) => {
        buf.extend_from_slice(format!(":{}\r\n", i).as_bytes());
      }
      RespValue::BulkString(None) => {
        buf.extend_from_slice(b"$-1\r\n");
      }
      RespValue::BulkString(Some(s)) => {
        buf.extend_from_slice(format!("${}\r\n", s.len()).as_bytes());
        buf.extend_from_slice(s.as_bytes());
        buf.extend_from_slice(b"\r\n");
      }
      RespValue::Array(None) => {
        buf.extend_from_slice(b"*-1\r\n");
      }
      RespValue::Array(Some(items)) => {
        buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
        for item in items {
          item.encode_into(buf);
        }
      }
    }
  }

  /// Extract string content
  pub fn as_str(&self) -> Option<&str> {
    match self {
      RespValue::SimpleString(s) | RespValue::BulkString(Some(s)) => Some(s),
      _ => None,
    }
  }

  /// Extract array elements
  pub fn as_array(&self) -> Option<&[RespValue]> {
    match self {
      RespValue::Array(Some(arr)) => Some(arr),
      _ => None,
    }
  }
}

/// RESP parse error
#[derive(Debug, Clone)]
pub enum RespError {
  /// Incomplete data, need more bytes
  Incomplete,
  /// Invalid protocol format
  Invalid(String),
}

impl std::fmt::Display for RespError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RespError::Incomplete => write!(f, "incomplete frame"),
      RespError::Invalid(msg) => write!(f, "invalid RESP: {}", msg),
    }
  }
}

impl std::error::Error for RespError {}

/// Incremental RESP frame parser.
///
/// Bytes are accumulated with [`feed`](RespParser::feed); [`parse`](RespParser::parse)
/// yields one complete frame at a time and returns `Ok(None)` while the
/// buffered data is still a prefix of a frame, so a reactor can keep reading
/// without ever stalling on a partial frame.
pub struct RespParser {
  buffer: Vec<u8>,
  pos: usize,
}

impl Default for RespParser {
  fn default() -> Self {
    Self::new()
  }
}

impl RespParser {
  pub fn new() -> Self {
    Self {
      buffer: Vec::new(),
      pos: 0,
    }
  }

  /// Append received bytes to the parse buffer
  pub fn feed(&mut self, data: &[u8]) {
    self.buffer.extend_from_slice(data);
  }

  /// Try to parse the next complete frame from the buffer
  pub fn parse(&mut self) -> Result<Option<RespValue>, RespError> {
    if self.pos >= self.buffer.len() {
      return Ok(None);
    }

    // Input not introduced by a type byte is not a frame at all. The read
    // is consumed whole and surfaces as an empty command, which the
    // dispatcher reports as invalid; the connection keeps going.
    if !matches!(self.buffer[self.pos], b'+' | b'-' | b':' | b'$' | b'*') {
      self.buffer.clear();
      self.pos = 0;
      return Ok(Some(RespValue::Array(Some(Vec::new()))));
    }

    match self.parse_value() {
      Ok(value) => {
        self.buffer.drain(..self.pos);
        self.pos = 0;
        Ok(Some(value))
      }
      Err(RespError::Incomplete) => {
        self.pos = 0;
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// Discard all buffered bytes, e.g. after a protocol error
  pub fn clear(&mut self) {
    self.buffer.clear();
    self.pos = 0;
  }

  fn parse_value(&mut self) -> Result<RespValue, RespError> {
    match self.next_byte()? {
      b'+' => Ok(RespValue::SimpleString(self.read_line()?)),
      b'-' => Ok(RespValue::Error(self.read_line()?)),
      b':' => {
        let line = self.read_line()?;
        let i = line
          .parse()
          .map_err(|_| RespError::Invalid(format!("bad integer: {}", line)))?;
        Ok(RespValue::Integer(i))
      }
      b'$' => self.parse_bulk_string(),
      b'*' => self.parse_array(),
      // Only reachable inside an array, where a type byte is mandatory.
      other => Err(RespError::Invalid(format!(
        "unexpected type byte 0x{:02x}",
        other
      ))),
    }
  }

  fn parse_bulk_string(&mut self) -> Result<RespValue, RespError> {
    let len = self.read_length()?;
    let len = match len {
      n if n < 0 => return Ok(RespValue::BulkString(None)),
      n => n as usize,
    };

    // payload plus trailing CRLF
    if self.pos + len + 2 > self.buffer.len() {
      return Err(RespError::Incomplete);
    }

    let data = &self.buffer[self.pos..self.pos + len];
    let s = String::from_utf8_lossy(data).to_string();
    self.pos += len;

    if &self.buffer[self.pos..self.pos + 2] != b"\r\n" {
      return Err(RespError::Invalid(
        "missing CRLF after bulk string".to_string(),
      ));
    }
    self.pos += 2;

    Ok(RespValue::BulkString(Some(s)))
  }

  fn parse_array(&mut self) -> Result<RespValue, RespError> {
    let len = self.read_length()?;
    if len < 0 {
      return Ok(RespValue::Array(None));
    }

    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
      items.push(self.parse_value()?);
    }
    Ok(RespValue::Array(Some(items)))
  }

  fn read_length(&mut self) -> Result<i64, RespError> {
    let line = self.read_line()?;
    line
      .parse()
      .map_err(|_| RespError::Invalid(format!("bad length: {}", line)))
  }

  fn next_byte(&mut self) -> Result<u8, RespError> {
    if self.pos >= self.buffer.len() {
      return Err(RespError::Incomplete);
    }
    let byte = self.buffer[self.pos];
    self.pos += 1;
    Ok(byte)
  }

  fn read_line(&mut self) -> Result<String, RespError> {
    let start = self.pos;
    while self.pos + 1 < self.buffer.len() {
      if self.buffer[self.pos] == b'\r' && self.buffer[self.pos + 1] == b'\n' {
        let line = String::from_utf8_lossy(&self.buffer[start..self.pos]).to_string();
        self.pos += 2;
        return Ok(line);
      }
      self.pos += 1;
    }
    Err(RespError::Incomplete)
  }
}

/// Parse a single RESP frame from a byte slice
pub fn parse_resp(data: &[u8]) -> Result<RespValue, RespError> {
  let mut parser = RespParser::new();
  parser.feed(data);
  parser.parse()?.ok_or(RespError::Incomplete)
}

/// Extract the uppercased verb and its arguments from a request frame.
///
/// Returns `None` for anything that is not a non-empty array whose first
/// element is a string; the caller reports those as invalid commands.
pub fn extract_command(frame: &RespValue) -> Option<(String, Vec<String>)> {
  let arr = frame.as_array()?;
  let verb = arr.first()?.as_str()?.to_uppercase();
  let args = arr[1..]
    .iter()
    .filter_map(|v| v.as_str().map(String::from))
    .collect();
  Some((verb, args))
}

/// The key argument of a request frame: the second array element.
pub fn command_key(frame: &RespValue) -> Option<&str> {
  frame.as_array()?.get(1)?.as_str()
}
