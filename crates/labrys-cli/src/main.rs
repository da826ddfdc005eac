//! Command-line client for the labrys maze game.
//!
//! `register` creates an account; `play` logs in, waits for a match, runs
//! the encrypted UDP session against the assigned game server, and maps
//! w/a/s/d lines on stdin to moves.

mod api;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use labrys_core::SessionConfig;
use labrys_crypto::SessionKey;
use labrys_game::{Direction, GameClient, GameError, GameEvents, GameState};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::api::ApiClient;

const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "labrys", version, about = "Maze game client")]
struct Cli {
    #[command(flatten)]
    config: config::Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register {
        /// Account name
        #[arg(long)]
        username: String,
    },
    /// Log in, wait for a match and play it
    Play {
        /// Account name
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let api = ApiClient::new(cli.config);

    match cli.command {
        Command::Register { username } => register(&api, &username).await,
        Command::Play { username } => play(&api, &username).await,
    }
}

async fn register(api: &ApiClient, username: &str) -> anyhow::Result<()> {
    let password = rpassword::prompt_password("password: ")?;
    api.register(username, &password).await?;
    println!("account created; start a game with `labrys play`");
    Ok(())
}

struct TerminalEvents {
    player_id: Uuid,
    connected_tx: mpsc::UnboundedSender<()>,
    ended_tx: mpsc::UnboundedSender<()>,
}

impl GameEvents for TerminalEvents {
    fn on_connected(&self) {
        let _ = self.connected_tx.send(());
    }

    fn on_state_change(&self, state: &GameState) {
        render(state, self.player_id);
    }

    fn on_game_end(&self, state: &GameState) {
        println!("game over");
        render(state, self.player_id);
        let _ = self.ended_tx.send(());
    }

    fn on_ping_result(&self, rtt_ms: i64) {
        tracing::debug!(rtt_ms, "latency probe");
    }
}

async fn play(api: &ApiClient, username: &str) -> anyhow::Result<()> {
    let password = rpassword::prompt_password("password: ")?;
    let profile = api.login(username, &password).await?;
    println!("logged in as {} (rating {})", profile.username, profile.rating);

    println!("waiting for a match...");
    let assignment = api.request_match(profile.id, &profile.token).await?;
    let server_addr: SocketAddr = tokio::net::lookup_host(assignment.server_addr.as_str())
        .await?
        .next()
        .context("game server address did not resolve")?;
    println!("matched; game server at {server_addr}");

    let session_key = SessionKey::generate()?;
    let session_config = SessionConfig::new(
        server_addr,
        assignment.server_public_key,
        session_key.as_bytes().to_vec(),
    );

    let (connected_tx, mut connected_rx) = mpsc::unbounded_channel();
    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
    let events = Arc::new(TerminalEvents {
        player_id: profile.id,
        connected_tx,
        ended_tx,
    });

    let client = GameClient::new(session_config, profile.id, events).await?;
    client.start(profile.token.as_bytes()).await?;

    timeout(HANDSHAKE_DEADLINE, connected_rx.recv())
        .await
        .context("handshake timed out")?;
    println!("connected; move with w/a/s/d, q quits");
    client.request_state().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = ended_rx.recv() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let direction = match line.trim() {
                    "w" => Direction::North,
                    "s" => Direction::South,
                    "d" => Direction::East,
                    "a" => Direction::West,
                    "q" => break,
                    "" => continue,
                    other => {
                        println!("unknown command: {other}");
                        continue;
                    }
                };
                match client.move_player(direction).await {
                    Ok(()) => {}
                    Err(GameError::NoKnownState) => println!("no snapshot yet, hang on"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    client.stop().await;
    Ok(())
}

/// Draw the grid with player markers and leftover rewards, then the
/// scoreboard.
fn render(state: &GameState, player_id: Uuid) {
    println!("-- state v{} --", state.version);
    for (row, cells) in state.maze.grid.iter().enumerate() {
        let mut line = String::with_capacity(cells.len() * 2);
        for (col, cell) in cells.iter().enumerate() {
            let occupant = state
                .players
                .iter()
                .find(|p| p.pos.row == row as i32 && p.pos.col == col as i32);
            let glyph = match occupant {
                Some(p) if p.id == player_id => '@',
                Some(_) => 'o',
                None if cell.reward > 0 => '*',
                None => '.',
            };
            line.push(glyph);
            line.push(' ');
        }
        println!("{line}");
    }
    for player in &state.players {
        let marker = if player.id == player_id { " (you)" } else { "" };
        println!("  {}{}: {} points", player.id, marker, player.reward);
    }
}
