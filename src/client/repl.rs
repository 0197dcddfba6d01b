//! Interactive cache shell

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use super::connection::Connection;
use super::print_reply;

const USAGE: &str = "Commands: SET <key> <value>, GET <key>, DEL <key> [key ...], INFO, EXIT";

pub struct Repl {
  conn: Connection,
  editor: DefaultEditor,
}

impl Repl {
  pub fn new(conn: Connection) -> Result<Self, anyhow::Error> {
    Ok(Self {
      conn,
      editor: DefaultEditor::new()?,
    })
  }

  pub async fn run(&mut self) -> Result<(), anyhow::Error> {
    println!("{} v{}", "hoard".green().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}\n", USAGE);

    loop {
      match self.editor.readline(&format!("{} ", "hoard>".green())) {
        Ok(line) => {
          let line = line.trim();
          if line.is_empty() {
            continue;
          }
          let _ = self.editor.add_history_entry(line);
          if !self.dispatch(line).await {
            break;
          }
        }
        Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
        Err(e) => {
          eprintln!("Error: {:?}", e);
          break;
        }
      }
    }
    Ok(())
  }

  /// Run one line; returns false when the session should end.
  async fn dispatch(&mut self, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or("").to_uppercase();
    let args: Vec<String> = parts.map(String::from).collect();

    let result = match verb.as_str() {
      "SET" if args.len() == 2 => self.conn.set(&args[0], &args[1]).await,
      "SET" => {
        println!("Usage: SET <key> <value>");
        return true;
      }
      "GET" if args.len() == 1 => self.conn.get(&args[0]).await,
      "GET" => {
        println!("Usage: GET <key>");
        return true;
      }
      "DEL" if !args.is_empty() => self.conn.del(&args).await,
      "DEL" => {
        println!("Usage: DEL <key> [key ...]");
        return true;
      }
      "INFO" => self.conn.info().await,
      "EXIT" | "QUIT" => return false,
      _ => {
        println!("Unknown command. {}", USAGE);
        return true;
      }
    };

    match result {
      Ok(reply) => print_reply(&reply),
      Err(e) => {
        eprintln!("{}: {}", "Error".red(), e);
        return false;
      }
    }
    true
  }
}
