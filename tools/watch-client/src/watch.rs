//! Interactive viewer loop
//!
//! Bridges stdin commands and a [`SimulatedPlayer`] to the sync socket
//! through a [`ClientSynchronizer`].

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use watchparty_core::{ClientMessage, ClientSynchronizer, Reaction, ServerMessage};

use crate::player::SimulatedPlayer;

const HELP: &str = concat!(
    "commands: join | play | pause | seek <secs> | skip <secs> | ",
    "buffer | resume | end | status | quit"
);

/// What a typed line asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Join,
    Play,
    Pause,
    Seek(f64),
    Skip(f64),
    Buffer,
    Resume,
    End,
    Status,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = match parts.next()? {
            "join" => Self::Join,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "seek" => Self::Seek(parse_secs(parts.next()?)?),
            "skip" => Self::Skip(parse_secs(parts.next()?)?),
            "buffer" => Self::Buffer,
            "resume" => Self::Resume,
            "end" => Self::End,
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return None,
        };
        Some(command)
    }
}

fn parse_secs(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|secs| secs.is_finite())
}

pub async fn run(ws_url: &str, session_id: &str, tick: Duration) -> Result<()> {
    let (socket, _) = connect_async(ws_url)
        .await
        .with_context(|| format!("Failed to connect to {}", ws_url))?;
    let (mut sink, mut stream) = socket.split();
    tracing::info!(url = %ws_url, session_id = %session_id, "Connected");

    let mut sync = ClientSynchronizer::new(session_id);
    let mut player = SimulatedPlayer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(tick);

    println!("{}", HELP);

    loop {
        let outbound: Option<ClientMessage> = tokio::select! {
            _ = ticker.tick() => {
                player.set_stalled(sync.is_buffering());
                let position = player.tick();
                sync.on_progress(position)
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        on_server_text(&text, &mut sync, &mut player);
                        None
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        println!("server closed the connection");
                        break;
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => on_command(command, &mut sync, &mut player),
                    None => {
                        if !line.trim().is_empty() {
                            println!("{}", HELP);
                        }
                        None
                    }
                }
            }
        };

        if let Some(message) = outbound {
            tracing::debug!(action = %message.action, timestamp = ?message.timestamp, "Sending");
            sink.send(Message::Text(message.to_json()?))
                .await
                .context("WebSocket write failed")?;
        }
    }

    let _ = sink.close().await;
    Ok(())
}

fn on_command(
    command: Command,
    sync: &mut ClientSynchronizer,
    player: &mut SimulatedPlayer,
) -> Option<ClientMessage> {
    let position = player.tick();
    match command {
        Command::Join => match sync.join(position) {
            Ok(message) => Some(message),
            Err(e) => {
                println!("{}", e);
                None
            }
        },
        // The player only runs once joined.
        Command::Play => {
            let outbound = sync.on_play(position);
            player.set_playing(sync.should_play());
            outbound
        }
        Command::Pause => {
            let outbound = sync.on_pause(position);
            player.set_playing(sync.should_play());
            outbound
        }
        Command::Seek(to) => {
            player.seek(to);
            sync.on_seek(player.position())
        }
        Command::Skip(by) => {
            // Unreported jump; the next progress tick notices it.
            player.skip(Duration::from_secs_f64(by.max(0.0)));
            None
        }
        Command::Buffer => {
            player.set_stalled(true);
            sync.on_buffer_start(position)
        }
        Command::Resume => {
            player.set_stalled(false);
            sync.on_buffer_end(position)
        }
        Command::End => sync.on_ended(position),
        Command::Status => {
            println!(
                "state={:?} playing={} buffering={} position={:.2}s handle={}",
                sync.state(),
                player.is_playing(),
                sync.is_buffering(),
                position,
                sync.handle().map_or("-", |h| h.as_str()),
            );
            None
        }
        Command::Quit => None,
    }
}

fn on_server_text(text: &str, sync: &mut ClientSynchronizer, player: &mut SimulatedPlayer) {
    let message = match ServerMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring unreadable server message");
            return;
        }
    };

    let position = player.tick();
    match sync.on_server_message(&message, position) {
        Reaction::Ignored => {}
        Reaction::Applied { seek_to } => {
            if let Some(to) = seek_to {
                println!("syncing: {:.2}s -> {:.2}s", position, to);
                player.seek(to);
            }
            if let ServerMessage::End(_) = message {
                println!("video ended");
            }
            player.set_playing(sync.should_play());
        }
        Reaction::Rejected { error, message } => {
            println!("server error ({}): {}", error, message);
        }
    }
}
