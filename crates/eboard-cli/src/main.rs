//! eboard
//!
//! Connects an electronic chessboard over serial, Bluetooth LE or the
//! vendor's WebSocket bridge and follows a game on it:
//! - board events are printed to stdout as JSON lines
//! - UCI moves typed on stdin are shown on the board for the user to replay

mod config;
mod game;
mod rules;

use anyhow::{Context, Result};
use clap::Parser;
use config::Config;
use eboard_bridge::{TransportKind, build_transport};
use eboard_sync::{LinkCommand, run_session};
use game::Game;
use rules::ShakmatyPosition;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "eboard", version, about = "Electronic chessboard link")]
struct Args {
    /// Transport: serial, ble or socket
    #[arg(short, long, default_value = "serial")]
    transport: TransportKind,

    /// Serial device path
    #[arg(long)]
    port: Option<String>,

    /// WebSocket bridge URL
    #[arg(long)]
    url: Option<String>,

    /// Position on the board, default is the standard start
    #[arg(long)]
    fen: Option<String>,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level, including raw traffic
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    }
    .with_overrides(args.port, args.url);

    let position = match &args.fen {
        Some(fen) => ShakmatyPosition::from_fen(fen).context("Invalid --fen")?,
        None => ShakmatyPosition::starting(),
    };
    let mut game = Game::new(position.clone());

    info!("eboard {} starting ({} transport)", env!("CARGO_PKG_VERSION"), args.transport);
    let transport = build_transport(args.transport, &config.transport);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (event_tx, mut events) = mpsc::unbounded_channel();
    let session = tokio::spawn(run_session(
        transport,
        config.link,
        Some(position),
        cmd_rx,
        event_tx,
    ));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if let Some(command) = game.handle_event(&event) {
                    let _ = cmd_tx.send(command);
                }
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match game.handle_input(&line) {
                    Ok(Some(command)) => {
                        let _ = cmd_tx.send(command);
                    }
                    Ok(None) => {}
                    Err(message) => eprintln!("{}", message),
                },
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                let _ = cmd_tx.send(LinkCommand::Disconnect);
            }
        }
    }

    match session.await.context("Session task failed")? {
        Ok(()) => Ok(()),
        Err(e) => {
            warn!("{}", e.status_text());
            Err(e.into())
        }
    }
}
