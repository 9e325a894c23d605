//! RelayKV CLI Client
//!
//! Runs commands through a client connected to the in-process local engine.
//! A command given on the command line runs once; otherwise commands are
//! read from stdin, one per line.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relaykv::config::{ReadFrom, TlsMode};
use relaykv::engine::LocalCoreConfig;
use relaykv::{Client, ConnectionConfig, LocalCore, RequestType};
use tracing_subscriber::{fmt, EnvFilter};

/// RelayKV CLI
#[derive(Parser, Debug)]
#[command(name = "relaykv-cli")]
#[command(about = "CLI for the RelayKV client")]
#[command(version)]
struct Args {
    /// Seed node host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Seed node port
    #[arg(short, long, default_value = "6379")]
    port: u16,

    /// Logical database to select on connect
    #[arg(short = 'n', long, default_value = "0")]
    db: u32,

    /// Per-request timeout in milliseconds
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    /// Local engine worker threads
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Command to run (e.g. `SET key value`); reads stdin when omitted
    command: Vec<String>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,relaykv=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("RelayKV CLI v{}", relaykv::VERSION);

    let mut builder = ConnectionConfig::builder()
        .address(&args.host, args.port)
        .tls_mode(TlsMode::None)
        .cluster_mode(false)
        .read_from(ReadFrom::Primary)
        .database_id(args.db)
        .client_name("relaykv-cli");
    if let Some(ms) = args.timeout_ms {
        builder = builder.request_timeout(Duration::from_millis(ms));
    }

    let config = match builder.build() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let core = match LocalCore::with_config(LocalCoreConfig::builder().workers(args.workers).build()) {
        Ok(core) => Arc::new(core),
        Err(e) => {
            tracing::error!("Failed to start engine: {}", e);
            std::process::exit(1);
        }
    };

    let client = match Client::connect(core, &config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("Failed to connect: {}", e);
            std::process::exit(1);
        }
    };

    if !args.command.is_empty() {
        let tokens: Vec<&str> = args.command.iter().map(String::as_str).collect();
        let ok = run_command(&client, &tokens);
        client.close();
        std::process::exit(if ok { 0 } else { 1 });
    }

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if matches!(tokens[0].to_ascii_lowercase().as_str(), "quit" | "exit") {
            break;
        }
        run_command(&client, &tokens);
        if client.is_closing() {
            break;
        }
    }

    client.close();
}

/// Run one command line and print its reply; returns false on error
fn run_command(client: &Client, tokens: &[&str]) -> bool {
    let result = match RequestType::parse_command(tokens) {
        Some((request, consumed)) => client.execute(request, &tokens[consumed..]),
        None => client.custom_command(tokens),
    };

    let mut stdout = io::stdout().lock();
    match result {
        Ok(reply) if reply.is_empty() => {
            let _ = writeln!(stdout, "(empty)");
            true
        }
        Ok(reply) => {
            let _ = writeln!(stdout, "{}", reply);
            true
        }
        Err(e) => {
            let _ = writeln!(stdout, "(error) {}", e);
            false
        }
    }
}
