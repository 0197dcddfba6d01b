use clap::{Parser, Subcommand};
use hoard::client::{print_reply, Connection, Repl};

#[derive(Parser)]
#[command(name = "hoard", about = "hoard cache client", version)]
struct Args {
  /// Cache server host:port
  #[arg(short = 'H', long, default_value = "127.0.0.1:9001", env = "HOARD_ADDR")]
  host: String,
  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Get a value by key
  Get { key: String },
  /// Set a key to a value
  Set { key: String, value: String },
  /// Delete one or more keys
  Del {
    #[arg(required = true)]
    keys: Vec<String>,
  },
  /// Show server memory and hit statistics
  Info,
  /// Read a configuration parameter
  Config { param: String },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
  let args = Args::parse();
  let mut conn = Connection::connect(&args.host).await?;

  let Some(command) = args.command else {
    return Repl::new(conn)?.run().await;
  };

  let reply = match command {
    Command::Get { key } => conn.get(&key).await?,
    Command::Set { key, value } => conn.set(&key, &value).await?,
    Command::Del { keys } => conn.del(&keys).await?,
    Command::Info => conn.info().await?,
    Command::Config { param } => conn.config_get(&param).await?,
  };
  print_reply(&reply);
  Ok(())
}
