//! WebSocket client: one connection to the server, one brain actor per
//! joined game.
//!
//! The socket reader decodes JSON frames and routes each game's messages
//! into that game's bounded event queue; a writer task drains every brain's
//! outbound actions back onto the socket. Queues are the only coupling: a
//! full queue drops the frame (the server will assert state again), a closed
//! queue means the brain is gone and the game entry is dropped.

use crate::brain::RobotBrain;
use crate::config::BotConfig;
use crate::pinger;
use catan_core::{Action, Board, GameOptions, Message, Seat};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Capacity of each brain's event queue.
const EVENT_QUEUE_CAPACITY: usize = 128;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("websocket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Frames from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    /// We were seated in a game: everything a brain needs to start.
    GameJoin {
        game_id: Uuid,
        name: String,
        board: Board,
        options: GameOptions,
        seat: Seat,
    },
    /// An in-game message for a joined game.
    Game { game_id: Uuid, message: Message },
}

/// Frames to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientFrame {
    /// Identify as a robot so the server may seat us.
    ImARobot { nickname: String },
    Game { game_id: Uuid, action: Action },
}

/// One joined game's plumbing.
pub struct BrainHandle {
    queue: mpsc::Sender<Message>,
    brain_task: JoinHandle<()>,
    pinger_task: JoinHandle<()>,
}

impl BrainHandle {
    /// Ask the brain to tear down at its next dequeue.
    pub async fn kill(&self) {
        let _ = self.queue.send(Message::Shutdown).await;
    }

    pub fn abort(&self) {
        self.brain_task.abort();
        self.pinger_task.abort();
    }
}

/// The robot client: connection state shared by reader and writer tasks.
pub struct BotClient {
    pub nickname: String,
    config: BotConfig,
    brains: DashMap<Uuid, BrainHandle>,
    actions_tx: mpsc::UnboundedSender<(Uuid, Action)>,
}

impl BotClient {
    pub fn new(nickname: String, config: BotConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<(Uuid, Action)>) {
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            nickname,
            config,
            brains: DashMap::new(),
            actions_tx,
        });
        (client, actions_rx)
    }

    pub fn game_count(&self) -> usize {
        self.brains.len()
    }

    /// Spawn a brain actor and its pinger for a freshly joined game.
    pub fn join_game(
        &self,
        game_id: Uuid,
        name: String,
        board: Board,
        options: GameOptions,
        seat: Seat,
    ) {
        if self.brains.contains_key(&game_id) {
            warn!(%game_id, "already joined this game");
            return;
        }

        let game = catan_core::Game::new(name.clone(), board, options);
        let (queue_tx, queue_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (brain_actions_tx, mut brain_actions_rx) = mpsc::unbounded_channel();

        let brain = RobotBrain::new(self.config.clone(), game, seat, brain_actions_tx);
        let brain_task = tokio::spawn(brain.run(queue_rx));

        // forward this brain's actions onto the shared writer channel
        let shared = self.actions_tx.clone();
        tokio::spawn(async move {
            while let Some(action) = brain_actions_rx.recv().await {
                if shared.send((game_id, action)).is_err() {
                    break;
                }
            }
        });

        let pinger_task = pinger::spawn(queue_tx.clone());
        self.brains.insert(
            game_id,
            BrainHandle { queue: queue_tx, brain_task, pinger_task },
        );
        info!(%game_id, game = %name, seat, "brain started");
    }

    /// Route an in-game message to its brain. Full queue: drop the message.
    /// Closed queue: the brain exited, forget the game.
    pub fn route(&self, game_id: Uuid, message: Message) {
        let Some(handle) = self.brains.get(&game_id) else {
            warn!(%game_id, "message for a game we never joined");
            return;
        };
        match handle.queue.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%game_id, "event queue full, dropping message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                drop(handle);
                self.leave_game(game_id);
            }
        }
    }

    pub fn leave_game(&self, game_id: Uuid) {
        if let Some((_, handle)) = self.brains.remove(&game_id) {
            handle.abort();
            info!(%game_id, "brain removed");
        }
    }

    /// Kill every brain, e.g. on connection loss.
    pub async fn shutdown(&self) {
        let ids: Vec<Uuid> = self.brains.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some(handle) = self.brains.get(&id) {
                handle.kill().await;
            }
        }
    }
}

/// Connect and serve until the socket closes.
pub async fn run_client(
    url: &str,
    client: Arc<BotClient>,
    mut actions_rx: mpsc::UnboundedReceiver<(Uuid, Action)>,
) -> Result<(), ClientError> {
    let (ws_stream, _) = connect_async(url).await?;
    info!(%url, nickname = %client.nickname, "connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let hello = ClientFrame::ImARobot { nickname: client.nickname.clone() };
    ws_sender
        .send(WsMessage::Text(serde_json::to_string(&hello)?.into()))
        .await?;

    // writer: brain actions out
    let send_task = tokio::spawn(async move {
        while let Some((game_id, action)) = actions_rx.recv().await {
            let frame = ClientFrame::Game { game_id, action };
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("failed to encode action: {e}"),
            }
        }
    });

    // reader: server frames in
    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(ServerFrame::GameJoin { game_id, name, board, options, seat }) => {
                    client.join_game(game_id, name, board, options, seat);
                }
                Ok(ServerFrame::Game { game_id, message }) => {
                    client.route(game_id, message);
                }
                Err(e) => warn!("undecodable frame: {e}"),
            },
            Ok(WsMessage::Close(_)) => {
                info!("server closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("websocket error: {e}");
                break;
            }
        }
    }

    client.shutdown().await;
    send_task.abort();
    Ok(())
}
