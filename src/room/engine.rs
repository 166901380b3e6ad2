//! The single-writer Room Engine (§4.2, §9 "Single-writer rooms")
//!
//! Each loaded room runs as one tokio task owning a [`RoomState`]. External
//! callers never touch the state directly; they enqueue a [`RoomCommand`]
//! onto the engine's bounded channel and the task applies it serially. This
//! is the hand-rolled equivalent of an actor: no shared locks across the
//! room's mutable state, just a mailbox.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::database::RoomStore;
use crate::error::Result;
use crate::grid::Pos;
use crate::ids::RoomId;
use crate::room::commands::{RoomCommand, RoomEvent};
use crate::room::state::{RoomCounters, RoomState};
use crate::room::types::{ChatMessage, Participant, RoomRecord};

/// Per-room tuning, threaded in from [`crate::config::Config`] rather than
/// hard-coded so tests can exercise tight limits (§6.3, §10.1).
#[derive(Debug, Clone)]
pub struct RoomEngineConfig {
    pub history_limit: usize,
    pub message_max_len: usize,
    pub walk_speed: f64,
    pub command_channel_capacity: usize,
}

impl Default for RoomEngineConfig {
    fn default() -> Self {
        use crate::room::types::{HISTORY_LIMIT_DEFAULT, MESSAGE_MAX_LEN_DEFAULT, WALK_SPEED_DEFAULT};
        Self {
            history_limit: HISTORY_LIMIT_DEFAULT,
            message_max_len: MESSAGE_MAX_LEN_DEFAULT,
            walk_speed: WALK_SPEED_DEFAULT,
            command_channel_capacity: 256,
        }
    }
}

/// The subset of a [`RoomRecord`] that never changes for the life of a
/// loaded engine, cached on the handle so discovery queries don't need to
/// round-trip through the command channel (§4.4).
#[derive(Debug, Clone)]
pub struct RoomMeta {
    pub name: String,
    pub owner_username: Option<String>,
    pub is_public: bool,
}

/// A cheap, cloneable reference to a running Room Engine task. The registry
/// hands these out; connection handlers only ever see this, never the
/// engine's internal state (§4.4).
#[derive(Clone)]
pub struct RoomHandle {
    id: RoomId,
    slug: String,
    meta: RoomMeta,
    is_canonical: bool,
    commands: mpsc::Sender<RoomCommand>,
    counters: Arc<RoomCounters>,
}

impl RoomHandle {
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn meta(&self) -> &RoomMeta {
        &self.meta
    }

    pub fn is_canonical(&self) -> bool {
        self.is_canonical
    }

    pub fn counters(&self) -> (usize, usize) {
        self.counters.snapshot()
    }

    pub fn commands(&self) -> &mpsc::Sender<RoomCommand> {
        &self.commands
    }

    /// Enqueues a command, mapping a dead engine task (should not normally
    /// happen; the registry removes handles for dead engines) to an
    /// internal error instead of panicking the caller.
    pub async fn send(&self, command: RoomCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| crate::error::Error::Internal("room engine task is gone".into()))
    }
}

/// Spawns the engine task for a just-loaded room. `on_empty` is invoked
/// (synchronously, from within the engine task) after any command leaves
/// the room with zero attached sockets, so the registry can unload it
/// (§4.4 "unload on empty", §9).
pub fn spawn<F>(
    record: RoomRecord,
    history: Vec<ChatMessage>,
    is_canonical: bool,
    config: RoomEngineConfig,
    store: Arc<dyn RoomStore>,
    on_empty: F,
) -> RoomHandle
where
    F: Fn(RoomId) + Send + Sync + 'static,
{
    let id = record.id.clone();
    let slug = record.slug.clone();
    let meta = RoomMeta {
        name: record.name.clone(),
        owner_username: record.owner_username.clone(),
        is_public: record.is_public,
    };
    let state = RoomState::new(record, history, config.history_limit);
    let counters = state.counters.clone();

    let (tx, rx) = mpsc::channel(config.command_channel_capacity);

    tokio::spawn(run(state, rx, config, store, is_canonical, on_empty));

    RoomHandle {
        id,
        slug,
        meta,
        is_canonical,
        commands: tx,
        counters,
    }
}

async fn run<F>(
    mut state: RoomState,
    mut commands: mpsc::Receiver<RoomCommand>,
    config: RoomEngineConfig,
    store: Arc<dyn RoomStore>,
    is_canonical: bool,
    on_empty: F,
) where
    F: Fn(RoomId) + Send + Sync + 'static,
{
    let room_id = state.room_id().clone();
    info!(room_id = %room_id, slug = %state.record.slug, "room engine started");

    while let Some(command) = commands.recv().await {
        handle_command(&mut state, command, &config, store.as_ref()).await;

        if state.is_empty() && !is_canonical {
            debug!(room_id = %room_id, "room emptied, notifying registry");
            on_empty(room_id.clone());
        }
    }

    info!(room_id = %room_id, "room engine stopped");
}

async fn handle_command(
    state: &mut RoomState,
    command: RoomCommand,
    config: &RoomEngineConfig,
    store: &dyn RoomStore,
) {
    match command {
        RoomCommand::AttachParticipant(cmd) => {
            let spawn_pos = spawn_position(state, &config);
            let participant = Participant {
                id: cmd.id.clone(),
                name: cmd.name,
                avatar: cmd.avatar,
                x: spawn_pos.x,
                y: spawn_pos.y,
            };

            let displaced = state.attach_participant(participant.clone(), cmd.sender.clone());
            if let Some(displaced_sender) = displaced {
                let _ = displaced_sender
                    .send(RoomEvent::Error {
                        code: "DISPLACED",
                        message: "this identity connected from another socket".into(),
                    })
                    .await;
            }

            let snapshot = RoomEvent::RoomState {
                room: state.record.clone(),
                participants: state.participants().cloned().collect(),
                messages: state.history().cloned().collect(),
            };
            let _ = cmd.sender.send(snapshot).await;

            broadcast_except(state, &cmd.sender, RoomEvent::AgentJoined { agent: participant }).await;
        }

        RoomCommand::AttachSpectator(cmd) => {
            state.attach_spectator(cmd.sender.clone());
            let snapshot = RoomEvent::RoomState {
                room: state.record.clone(),
                participants: state.participants().cloned().collect(),
                messages: state.history().cloned().collect(),
            };
            let _ = cmd.sender.send(snapshot).await;
        }

        RoomCommand::Detach(cmd) => {
            if let Some(participant_id) = state.detach_socket(&cmd.sender) {
                broadcast_all(
                    state,
                    RoomEvent::AgentLeft {
                        agent_id: participant_id,
                    },
                )
                .await;
            }
        }

        RoomCommand::Move(cmd) => {
            handle_move(state, cmd, config).await;
        }

        RoomCommand::Chat(cmd) => {
            handle_chat(state, cmd, config, store).await;
        }

        RoomCommand::Ping(cmd) => {
            let _ = cmd.sender.send(RoomEvent::Pong).await;
        }
    }
}

/// Spawn policy (§4.2): prefer `(0, 0)` if walkable, else the first
/// walkable tile in row-major order, else `(0, 0)` regardless (a fully
/// blocked grid is a data error the engine must not crash over).
fn spawn_position(state: &RoomState, _config: &RoomEngineConfig) -> Pos {
    let grid = &state.record.grid;
    if grid.walkable(0, 0) {
        Pos::new(0, 0)
    } else {
        grid.first_walkable().unwrap_or_else(|| Pos::new(0, 0))
    }
}

async fn handle_move(state: &mut RoomState, cmd: crate::room::commands::Move, config: &RoomEngineConfig) {
    let grid = &state.record.grid;

    let Some(current) = state.participant(&cmd.id).map(|p| p.pos()) else {
        return;
    };

    // Coordinates arrive signed off the wire so a negative value reaches
    // validation instead of failing to decode (§8 boundary behaviors); fold
    // that together with the ordinary in-bounds check here.
    let in_bounds = cmd.x >= 0 && cmd.y >= 0 && grid.in_bounds(cmd.x as u32, cmd.y as u32);
    if !in_bounds {
        send_move_error(
            state,
            &cmd.id,
            format!(
                "position ({},{}) out of bounds; room is {}x{}",
                cmd.x, cmd.y, grid.width, grid.height
            ),
        )
        .await;
        return;
    }
    let target = Pos::new(cmd.x as u32, cmd.y as u32);
    if !grid.walkable(target.x, target.y) {
        send_move_error(
            state,
            &cmd.id,
            format!("tile ({},{}) is not walkable", target.x, target.y),
        )
        .await;
        return;
    }

    let path = grid.find_path(current, target);
    if path.is_empty() && current != target {
        send_move_error(
            state,
            &cmd.id,
            format!(
                "no walkable path from ({},{}) to ({},{})",
                current.x, current.y, target.x, target.y
            ),
        )
        .await;
        return;
    }

    // Movement is logically instantaneous: the engine's authoritative
    // position teleports to the destination immediately and clients
    // animate the broadcast path themselves (§4.2 "Movement semantics").
    state.teleport(&cmd.id, target);

    broadcast_all(
        state,
        RoomEvent::AgentPath {
            agent_id: cmd.id,
            path,
            speed: config.walk_speed,
        },
    )
    .await;
}

async fn send_move_error(state: &RoomState, id: &crate::ids::ParticipantId, message: impl Into<String>) {
    if let Some(sender) = state.sender_for_participant(id) {
        let _ = sender
            .send(RoomEvent::Error {
                code: "INVALID_MOVE",
                message: message.into(),
            })
            .await;
    }
}

async fn handle_chat(
    state: &mut RoomState,
    cmd: crate::room::commands::Chat,
    config: &RoomEngineConfig,
    store: &dyn RoomStore,
) {
    let Some(participant) = state.participant(&cmd.id).cloned() else {
        return;
    };

    let trimmed = cmd.content.trim();
    if trimmed.is_empty() {
        return;
    }
    let content: String = trimmed.chars().take(config.message_max_len).collect();

    let persisted = store
        .insert_message(
            state.room_id(),
            Some(&participant.id),
            &participant.name,
            &participant.avatar.body_color,
            &content,
        )
        .await;

    let message = match persisted {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "failed to persist chat message");
            ChatMessage {
                id: crate::ids::MessageId::new(),
                room_id: state.room_id().clone(),
                author_id: Some(participant.id.clone()),
                author_name: participant.name.clone(),
                author_avatar: participant.avatar.clone(),
                content,
                created_at: chrono::Utc::now(),
            }
        }
    };

    state.push_message(message.clone());
    broadcast_all(state, RoomEvent::ChatMessage(message)).await;
}

async fn broadcast_all(state: &RoomState, event: RoomEvent) {
    for sender in state.all_sockets() {
        let _ = sender.send(event.clone()).await;
    }
}

async fn broadcast_except(state: &RoomState, except: &crate::room::commands::EventSender, event: RoomEvent) {
    for sender in state.all_sockets() {
        if sender.same_channel(except) {
            continue;
        }
        let _ = sender.send(event.clone()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryRoomStore;
    use crate::grid::Grid;
    use crate::ids::ParticipantId;
    use crate::room::commands::{AttachParticipant, Chat, Move, RoomCommand};
    use crate::room::types::Avatar;

    fn open_room(slug: &str) -> RoomRecord {
        RoomRecord {
            id: RoomId::new(),
            slug: slug.to_string(),
            name: "Test Room".to_string(),
            description: None,
            owner_id: None,
            owner_username: None,
            is_public: true,
            created_at: chrono::Utc::now(),
            grid: Grid::open(5, 5),
        }
    }

    #[tokio::test]
    async fn attach_participant_receives_room_state_then_others_receive_joined() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let handle = spawn(
            open_room("test"),
            Vec::new(),
            false,
            RoomEngineConfig::default(),
            store,
            |_| {},
        );

        let (tx_a, mut rx_a) = mpsc::channel(8);
        handle
            .send(RoomCommand::AttachParticipant(AttachParticipant {
                id: ParticipantId::new(),
                name: "Alice".into(),
                avatar: Avatar {
                    body_color: "#3B82F6".into(),
                },
                sender: tx_a,
            }))
            .await
            .unwrap();

        let first = rx_a.recv().await.unwrap();
        assert!(matches!(first, RoomEvent::RoomState { .. }));

        let (tx_b, mut rx_b) = mpsc::channel(8);
        handle
            .send(RoomCommand::AttachParticipant(AttachParticipant {
                id: ParticipantId::new(),
                name: "Bob".into(),
                avatar: Avatar {
                    body_color: "#EF4444".into(),
                },
                sender: tx_b,
            }))
            .await
            .unwrap();

        // Alice sees Bob join.
        let joined = rx_a.recv().await.unwrap();
        assert!(matches!(joined, RoomEvent::AgentJoined { .. }));

        // Bob gets his own room_state snapshot first.
        let bob_first = rx_b.recv().await.unwrap();
        assert!(matches!(bob_first, RoomEvent::RoomState { .. }));
    }

    #[tokio::test]
    async fn move_to_blocked_tile_sends_targeted_error() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let mut record = open_room("test");
        // Block (2,2) in an otherwise open 5x5 grid.
        let mut tiles = vec![true; 25];
        tiles[2 * 5 + 2] = false;
        record.grid = Grid::new(5, 5, tiles);

        let handle = spawn(record, Vec::new(), false, RoomEngineConfig::default(), store, |_| {});

        let (tx, mut rx) = mpsc::channel(8);
        let id = ParticipantId::new();
        handle
            .send(RoomCommand::AttachParticipant(AttachParticipant {
                id: id.clone(),
                name: "Alice".into(),
                avatar: Avatar {
                    body_color: "#3B82F6".into(),
                },
                sender: tx.clone(),
            }))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap(); // room_state

        handle
            .send(RoomCommand::Move(Move { id, x: 2, y: 2 }))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            RoomEvent::Error { code, .. } => assert_eq!(code, "INVALID_MOVE"),
            other => panic!("expected targeted error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn negative_coordinates_are_reported_as_out_of_bounds() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let handle = spawn(open_room("test"), Vec::new(), false, RoomEngineConfig::default(), store, |_| {});

        let (tx, mut rx) = mpsc::channel(8);
        let id = ParticipantId::new();
        handle
            .send(RoomCommand::AttachParticipant(AttachParticipant {
                id: id.clone(),
                name: "Alice".into(),
                avatar: Avatar {
                    body_color: "#3B82F6".into(),
                },
                sender: tx,
            }))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap(); // room_state

        handle.send(RoomCommand::Move(Move { id, x: -1, y: 0 })).await.unwrap();

        match rx.recv().await.unwrap() {
            RoomEvent::Error { code, message } => {
                assert_eq!(code, "INVALID_MOVE");
                assert!(message.contains("out of bounds"));
            }
            other => panic!("expected targeted error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn chat_message_is_broadcast_to_sender_and_persisted() {
        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let handle = spawn(
            open_room("test"),
            Vec::new(),
            false,
            RoomEngineConfig::default(),
            store,
            |_| {},
        );

        let (tx, mut rx) = mpsc::channel(8);
        let id = ParticipantId::new();
        handle
            .send(RoomCommand::AttachParticipant(AttachParticipant {
                id: id.clone(),
                name: "Alice".into(),
                avatar: Avatar {
                    body_color: "#3B82F6".into(),
                },
                sender: tx,
            }))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap(); // room_state

        handle
            .send(RoomCommand::Chat(Chat {
                id,
                content: "  hello  ".into(),
            }))
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        match event {
            RoomEvent::ChatMessage(message) => assert_eq!(message.content, "hello"),
            other => panic!("expected chat message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detach_leaving_room_empty_invokes_on_empty() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let store: Arc<dyn RoomStore> = Arc::new(MemoryRoomStore::new());
        let emptied = Arc::new(AtomicBool::new(false));
        let emptied_clone = emptied.clone();

        let handle = spawn(
            open_room("test"),
            Vec::new(),
            false,
            RoomEngineConfig::default(),
            store,
            move |_| emptied_clone.store(true, Ordering::SeqCst),
        );

        let (tx, mut rx) = mpsc::channel(8);
        handle
            .send(RoomCommand::AttachSpectator(crate::room::commands::AttachSpectator {
                sender: tx.clone(),
            }))
            .await
            .unwrap();
        let _ = rx.recv().await.unwrap(); // room_state

        handle
            .send(RoomCommand::Detach(crate::room::commands::Detach { sender: tx }))
            .await
            .unwrap();

        // Give the engine task a chance to process Detach before asserting.
        for _ in 0..20 {
            if emptied.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(emptied.load(Ordering::SeqCst));
    }
}
