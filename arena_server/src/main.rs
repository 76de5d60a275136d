//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p arena_server -- [--config server.json] [--tick-hz 60] [--debug]
//!
//! Runs the tick loop until Ctrl-C. Command-line flags override the config
//! file.

use std::env;
use std::path::PathBuf;

use anyhow::Context;
use arena_server::GameServer;
use arena_shared::config::ServerConfig;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    tick_hz: Option<u32>,
    debug: bool,
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                parsed.config = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                parsed.tick_hz = args[i + 1].parse().ok();
                i += 2;
            }
            "--debug" => {
                parsed.debug = true;
                i += 1;
            }
            other => {
                warn!(arg = %other, "ignoring unknown argument");
                i += 1;
            }
        }
    }
    parsed
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args();
    let mut cfg = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if args.debug {
        cfg.debug = true;
    }
    let tick_hz = args.tick_hz.unwrap_or(cfg.updates_per_second);
    info!(
        tick_hz,
        game_mode = ?cfg.game_mode,
        debug = cfg.debug,
        "Starting server"
    );

    let (handle, task) = GameServer::new(cfg).start(tick_hz);

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("Shutting down");
    handle.stop();

    let server = task.await.context("join tick loop")?;
    info!(ticks = server.game.tick(), "Server stopped");
    Ok(())
}
