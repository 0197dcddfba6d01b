//! Client side: RESP connection and interactive REPL

mod connection;
mod repl;

pub use connection::Connection;
pub use repl::Repl;

use crate::resp::RespValue;

/// Print a reply the way redis-cli renders it.
pub fn print_reply(value: &RespValue) {
  match value {
    RespValue::SimpleString(s) => println!("{}", s),
    RespValue::Error(e) => eprintln!("(error) {}", e),
    RespValue::Integer(i) => println!("(integer) {}", i),
    RespValue::BulkString(Some(s)) => println!("\"{}\"", s),
    RespValue::BulkString(None) => println!("(nil)"),
    RespValue::Array(Some(arr)) => {
      if arr.is_empty() {
        println!("(empty array)");
      } else {
        for (i, item) in arr.iter().enumerate() {
          print!("{}) ", i + 1);
          match item {
            RespValue::BulkString(Some(s)) => println!("\"{}\"", s),
            RespValue::BulkString(None) => println!("(nil)"),
            RespValue::Integer(n) => println!("{}", n),
            other => println!("{:?}", other),
          }
        }
      }
    }
    RespValue::Array(None) => println!("(nil)"),
  }
}
