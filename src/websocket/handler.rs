//! The per-socket Connection Handler (§4.3)
//!
//! One task pair per connection: a reader driving the handshake/command
//! FSM below, and a writer draining a bounded outbound queue, matching the
//! split-socket-plus-forwarding-task shape the teacher's websocket chat
//! example uses (SPEC_FULL §10.7). A server-side ping/pong keepalive runs
//! orthogonally to the application-level `ping`/`pong` wire messages.

use std::str::FromStr;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::ids::RoomId;
use crate::room::commands::{AttachParticipant, AttachSpectator, Chat, Detach, EventSender, Move, RoomCommand, RoomEvent};
use crate::room::engine::RoomHandle;
use crate::state::AppState;
use crate::websocket::auth::{AuthIdentity, TokenVerifier};
use crate::websocket::codec::{decode, encode, ClientMessage, ServerMessage};
use crate::websocket::rate_limit::ConnectionRateLimiter;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// The room a socket is currently attached to, and in what capacity.
struct Attachment {
    handle: RoomHandle,
    as_participant: bool,
}

/// Everything that changes over the life of one connection. Owned by the
/// reader loop; the writer task never sees it.
struct ConnectionState {
    identity: Option<AuthIdentity>,
    attachment: Option<Attachment>,
    limiter: ConnectionRateLimiter,
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // RoomEvent -> wire frame -> writer queue. A room's engine only knows
    // how to emit RoomEvent; this task is the only place that frames it.
    let (event_tx, mut event_rx): (EventSender, mpsc::Receiver<RoomEvent>) = mpsc::channel(64);
    let (writer_tx, mut writer_rx) = mpsc::channel::<Message>(64);

    let relay_writer_tx = writer_tx.clone();
    let relay_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let wire = ServerMessage::from(event);
            if relay_writer_tx.send(Message::Text(encode(&wire).into())).await.is_err() {
                break;
            }
        }
    });

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let verifier = TokenVerifier::new(&state.config().presence.token_secret);
    let max_message_size = state.config().websocket.max_message_size_bytes;
    let ping_interval_secs = state.config().presence.ping_interval_secs.max(1);
    let pong_timeout = Duration::from_secs(state.config().presence.pong_timeout_secs.max(1));

    let mut conn = ConnectionState {
        identity: None,
        attachment: None,
        limiter: ConnectionRateLimiter::new(
            state.config().rate_limit.chats_per_sec,
            state.config().rate_limit.moves_per_sec,
        ),
    };

    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    let mut keepalive = tokio::time::interval(Duration::from_secs(ping_interval_secs));
    keepalive.tick().await;
    let mut last_pong = Instant::now();
    let mut killed = false;

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                if last_pong.elapsed() > pong_timeout {
                    tracing::debug!("closing idle websocket connection (missed pong)");
                    break;
                }
                if writer_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            _ = kill_rx.recv() => {
                killed = true;
                break;
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > max_message_size {
                            send(&writer_tx, ServerMessage::error("INVALID_MESSAGE", "frame exceeds maximum message size")).await;
                            continue;
                        }
                        handle_frame(&text, &state, &verifier, &mut conn, &event_tx, &writer_tx, &kill_tx).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = writer_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Binary(_))) => {
                        send(&writer_tx, ServerMessage::error("INVALID_MESSAGE", "binary frames are not supported")).await;
                    }
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "websocket read error, closing connection");
                        break;
                    }
                }
            }
        }
    }

    if let Some(attachment) = conn.attachment.take() {
        let _ = attachment.handle.send(RoomCommand::Detach(Detach { sender: event_tx.clone() })).await;
    }
    if !killed {
        if let Some(identity) = &conn.identity {
            state.registry().clear_displacement(&identity.id, &kill_tx);
        }
    }

    relay_task.abort();
    writer_task.abort();
}

async fn send(writer_tx: &mpsc::Sender<Message>, message: ServerMessage) {
    let _ = writer_tx.send(Message::Text(encode(&message).into())).await;
}

async fn handle_frame(
    text: &str,
    state: &AppState,
    verifier: &TokenVerifier,
    conn: &mut ConnectionState,
    event_tx: &EventSender,
    writer_tx: &mpsc::Sender<Message>,
    kill_tx: &mpsc::Sender<()>,
) {
    let message = match decode(text) {
        Ok(message) => message,
        Err(_) => {
            send(writer_tx, ServerMessage::error("INVALID_MESSAGE", "frame did not decode to a known message type")).await;
            return;
        }
    };

    match message {
        ClientMessage::Auth { token } => handle_auth(token, state, verifier, conn, event_tx, writer_tx, kill_tx).await,
        ClientMessage::Join { room_id } => handle_join(room_id, state, conn, event_tx, writer_tx).await,
        ClientMessage::Leave => handle_leave(conn, event_tx, writer_tx).await,
        ClientMessage::Move { x, y } => handle_move(x, y, conn, writer_tx).await,
        ClientMessage::Chat { message } => handle_chat(message, conn, writer_tx).await,
        ClientMessage::Ping => send(writer_tx, ServerMessage::Pong).await,
    }
}

/// `auth` is accepted in any state (§4.3): it always replaces whatever
/// identity this socket previously held and detaches any room attachment,
/// since the attachment was keyed to the old identity.
async fn handle_auth(
    token: String,
    state: &AppState,
    verifier: &TokenVerifier,
    conn: &mut ConnectionState,
    event_tx: &EventSender,
    writer_tx: &mpsc::Sender<Message>,
    kill_tx: &mpsc::Sender<()>,
) {
    let identity = match verifier.verify(&token) {
        Ok(identity) => identity,
        Err(e) => {
            send(writer_tx, ServerMessage::auth_error(e.to_string())).await;
            return;
        }
    };

    if let Some(attachment) = conn.attachment.take() {
        let _ = attachment.handle.send(RoomCommand::Detach(Detach { sender: event_tx.clone() })).await;
    }

    if let Some(previous) = &conn.identity {
        state.registry().clear_displacement(&previous.id, kill_tx);
    }

    if let Some(displaced) = state.registry().displace(identity.id.clone(), kill_tx.clone()) {
        let _ = displaced.send(()).await;
    }

    let _ = state.store().touch_last_seen(&identity.id).await;

    send(writer_tx, ServerMessage::auth_ok(&identity.id, &identity.name, &identity.avatar)).await;
    conn.identity = Some(identity);
}

/// `join` without prior auth attaches as a read-only spectator (§4.3
/// CONNECTED state); with an identity present it attaches (or re-attaches,
/// switching rooms) as a full participant.
async fn handle_join(room_id: String, state: &AppState, conn: &mut ConnectionState, event_tx: &EventSender, writer_tx: &mpsc::Sender<Message>) {
    let handle = match resolve_room(&room_id, state).await {
        Ok(handle) => handle,
        Err(e) => {
            send(writer_tx, ServerMessage::error(e.wire_code(), e.to_string())).await;
            return;
        }
    };

    if let Some(old) = conn.attachment.take() {
        let _ = old.handle.send(RoomCommand::Detach(Detach { sender: event_tx.clone() })).await;
    }

    let as_participant = if let Some(identity) = &conn.identity {
        let command = RoomCommand::AttachParticipant(AttachParticipant {
            id: identity.id.clone(),
            name: identity.name.clone(),
            avatar: identity.avatar.clone(),
            sender: event_tx.clone(),
        });
        if handle.send(command).await.is_err() {
            send(writer_tx, ServerMessage::error("INTERNAL_ERROR", "room engine is unavailable")).await;
            return;
        }
        true
    } else {
        let command = RoomCommand::AttachSpectator(AttachSpectator { sender: event_tx.clone() });
        if handle.send(command).await.is_err() {
            send(writer_tx, ServerMessage::error("INTERNAL_ERROR", "room engine is unavailable")).await;
            return;
        }
        false
    };

    conn.attachment = Some(Attachment { handle, as_participant });
}

async fn resolve_room(room_id: &str, state: &AppState) -> crate::error::Result<RoomHandle> {
    match RoomId::from_str(room_id) {
        Ok(id) => state.registry().load_by_id(&id).await,
        Err(_) => state.registry().load_by_slug(room_id).await,
    }
}

async fn handle_leave(conn: &mut ConnectionState, event_tx: &EventSender, writer_tx: &mpsc::Sender<Message>) {
    match conn.attachment.take() {
        Some(attachment) => {
            let _ = attachment.handle.send(RoomCommand::Detach(Detach { sender: event_tx.clone() })).await;
        }
        None => {
            send(writer_tx, ServerMessage::error("NOT_IN_ROOM", "not currently attached to a room")).await;
        }
    }
}

async fn handle_move(x: i64, y: i64, conn: &mut ConnectionState, writer_tx: &mpsc::Sender<Message>) {
    let Some(attachment) = conn.attachment.as_ref().filter(|a| a.as_participant) else {
        send(writer_tx, ServerMessage::error("NOT_IN_ROOM", "not attached as a participant")).await;
        return;
    };
    let Some(identity) = &conn.identity else {
        send(writer_tx, ServerMessage::error("NOT_IN_ROOM", "not authenticated")).await;
        return;
    };

    if !conn.limiter.allow_move() {
        send(writer_tx, ServerMessage::error("RATE_LIMITED", "move rate ceiling exceeded")).await;
        return;
    }

    let _ = attachment.handle.send(RoomCommand::Move(Move { id: identity.id.clone(), x, y })).await;
}

async fn handle_chat(content: String, conn: &mut ConnectionState, writer_tx: &mpsc::Sender<Message>) {
    let Some(attachment) = conn.attachment.as_ref().filter(|a| a.as_participant) else {
        send(writer_tx, ServerMessage::error("NOT_IN_ROOM", "not attached as a participant")).await;
        return;
    };
    let Some(identity) = &conn.identity else {
        send(writer_tx, ServerMessage::error("NOT_IN_ROOM", "not authenticated")).await;
        return;
    };

    if !conn.limiter.allow_chat() {
        send(writer_tx, ServerMessage::error("RATE_LIMITED", "chat rate ceiling exceeded")).await;
        return;
    }

    let _ = attachment.handle.send(RoomCommand::Chat(Chat { id: identity.id.clone(), content })).await;
}

