//! Command-line client: one-shot commands or an interactive prompt.

use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};

use emberkv::KvClient;

#[derive(Parser, Debug)]
#[command(name = "kv-cli")]
#[command(about = "Client for the emberkv server")]
#[command(version)]
struct Args {
  /// Server address
  #[arg(short, long, default_value = "127.0.0.1:6379")]
  addr: String,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Store a value under a key
  Put { key: String, value: String },
  /// Fetch a value
  Get { key: String },
  /// Remove a key
  Delete { key: String },
  /// Check whether a key is present
  Exists { key: String },
  /// Count live keys
  Size,
  /// Health check
  Ping,
  /// Drop all keys and truncate the log
  Flush,
  /// Print server statistics
  Stats,
}

fn main() {
  let args = Args::parse();

  let mut client = match KvClient::connect(&args.addr) {
    Ok(c) => c,
    Err(e) => {
      eprintln!("Failed to connect to {}: {}", args.addr, e);
      std::process::exit(1);
    }
  };

  let result = match args.command {
    Some(cmd) => run_one(&mut client, cmd),
    None => repl(&mut client),
  };

  if let Err(e) = result {
    eprintln!("Error: {}", e);
    std::process::exit(1);
  }
}

fn run_one(client: &mut KvClient, cmd: Cmd) -> emberkv::Result<()> {
  let output = match cmd {
    Cmd::Put { key, value } => client.send(&format!("PUT \"{}\" \"{}\"", key, value))?,
    Cmd::Get { key } => client.send(&format!("GET \"{}\"", key))?,
    Cmd::Delete { key } => client.send(&format!("DELETE \"{}\"", key))?,
    Cmd::Exists { key } => client.send(&format!("EXISTS \"{}\"", key))?,
    Cmd::Size => client.send("SIZE")?,
    Cmd::Ping => client.send("PING")?,
    Cmd::Flush => client.send("FLUSH")?,
    Cmd::Stats => client.stats()?,
  };
  println!("{}", output);
  Ok(())
}

/// Reads raw protocol lines from stdin and prints each reply. STATS is
/// special-cased for its multiline response.
fn repl(client: &mut KvClient) -> emberkv::Result<()> {
  let stdin = io::stdin();
  let mut stdout = io::stdout();

  loop {
    print!("> ");
    stdout.flush()?;

    let mut line = String::new();
    if stdin.lock().read_line(&mut line)? == 0 {
      return Ok(()); // EOF
    }
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
      return Ok(());
    }

    let reply = if line.eq_ignore_ascii_case("stats") {
      client.stats()?
    } else {
      client.send(line)?
    };
    println!("{}", reply);
  }
}
