//! End-to-end command sequences against an in-process Room Registry, no
//! real socket (SPEC_FULL §10.8). Each test mirrors one of the concrete
//! scenarios worked through by hand against the wire protocol.

use std::sync::Arc;

use presence_rooms::database::{MemoryRoomStore, RoomStore};
use presence_rooms::grid::Grid;
use presence_rooms::ids::{ParticipantId, RoomId};
use presence_rooms::room::{
    AttachParticipant, AttachSpectator, Chat, Detach, Move, RoomCommand, RoomEngineConfig, RoomEvent, RoomRecord, RoomRegistry,
};

fn avatar(color: &str) -> presence_rooms::room::Avatar {
    presence_rooms::room::Avatar {
        body_color: color.to_string(),
    }
}

async fn registry_with_canonical(width: u32, height: u32) -> (RoomRegistry, Arc<MemoryRoomStore>) {
    let store = Arc::new(MemoryRoomStore::new());
    let dyn_store: Arc<dyn RoomStore> = store.clone();
    let registry = RoomRegistry::bootstrap(dyn_store, RoomEngineConfig::default(), "lobby", width, height)
        .await
        .unwrap();
    (registry, store)
}

#[tokio::test]
async fn auth_then_join_lobby() {
    let (registry, _store) = registry_with_canonical(14, 14).await;
    let handle = registry.load_by_slug("lobby").await.unwrap();

    let alice = ParticipantId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: alice.clone(),
            name: "Alice".into(),
            avatar: avatar("#3B82F6"),
            sender: tx,
        }))
        .await
        .unwrap();

    match rx.recv().await.unwrap() {
        RoomEvent::RoomState { room, participants, messages } => {
            assert_eq!(room.slug, "lobby");
            assert_eq!(participants.len(), 1);
            assert_eq!(participants[0].id, alice);
            assert_eq!((participants[0].x, participants[0].y), (0, 0));
            assert!(messages.is_empty());
        }
        other => panic!("expected room_state, got {other:?}"),
    }
}

#[tokio::test]
async fn two_participants_chat_is_fanned_out_to_both() {
    let (registry, _store) = registry_with_canonical(14, 14).await;
    let handle = registry.load_by_slug("lobby").await.unwrap();

    let alice = ParticipantId::new();
    let (alice_tx, mut alice_rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: alice.clone(),
            name: "Alice".into(),
            avatar: avatar("#3B82F6"),
            sender: alice_tx,
        }))
        .await
        .unwrap();
    let _ = alice_rx.recv().await.unwrap(); // room_state

    let bob = ParticipantId::new();
    let (bob_tx, mut bob_rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: bob.clone(),
            name: "Bob".into(),
            avatar: avatar("#10B981"),
            sender: bob_tx,
        }))
        .await
        .unwrap();

    // Alice sees Bob join; Bob gets his own snapshot first.
    assert!(matches!(alice_rx.recv().await.unwrap(), RoomEvent::AgentJoined { .. }));
    assert!(matches!(bob_rx.recv().await.unwrap(), RoomEvent::RoomState { .. }));

    handle
        .send(RoomCommand::Chat(Chat {
            id: bob,
            content: "hi".into(),
        }))
        .await
        .unwrap();

    for rx in [&mut alice_rx, &mut bob_rx] {
        match rx.recv().await.unwrap() {
            RoomEvent::ChatMessage(message) => {
                assert_eq!(message.author_name, "Bob");
                assert_eq!(message.content, "hi");
            }
            other => panic!("expected chat_message, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn move_with_pathing_updates_position_immediately() {
    let (registry, _store) = registry_with_canonical(14, 14).await;
    let handle = registry.load_by_slug("lobby").await.unwrap();

    let alice = ParticipantId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: alice.clone(),
            name: "Alice".into(),
            avatar: avatar("#3B82F6"),
            sender: tx,
        }))
        .await
        .unwrap();
    let _ = rx.recv().await.unwrap(); // room_state

    handle.send(RoomCommand::Move(Move { id: alice, x: 3, y: 2 })).await.unwrap();

    match rx.recv().await.unwrap() {
        RoomEvent::AgentPath { path, speed, .. } => {
            assert_eq!(path.len(), 3);
            assert_eq!((path.last().unwrap().x, path.last().unwrap().y), (3, 2));
            assert_eq!(speed, presence_rooms::room::types::WALK_SPEED_DEFAULT);
        }
        other => panic!("expected agent_path, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_move_reports_a_targeted_error_with_no_side_effects() {
    let (registry, _store) = registry_with_canonical(14, 14).await;
    let handle = registry.load_by_slug("lobby").await.unwrap();

    let alice = ParticipantId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: alice.clone(),
            name: "Alice".into(),
            avatar: avatar("#3B82F6"),
            sender: tx,
        }))
        .await
        .unwrap();
    let _ = rx.recv().await.unwrap(); // room_state

    handle.send(RoomCommand::Move(Move { id: alice, x: 99, y: 0 })).await.unwrap();

    match rx.recv().await.unwrap() {
        RoomEvent::Error { code, message } => {
            assert_eq!(code, "INVALID_MOVE");
            assert!(message.contains("99"));
        }
        other => panic!("expected targeted error, got {other:?}"),
    }
}

#[tokio::test]
async fn spectator_join_then_disconnect_decrements_spectator_count() {
    let (registry, _store) = registry_with_canonical(14, 14).await;
    let handle = registry.load_by_slug("lobby").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachSpectator(AttachSpectator { sender: tx.clone() }))
        .await
        .unwrap();
    let _ = rx.recv().await.unwrap(); // room_state

    let (_, spectators_before) = handle.counters();
    assert_eq!(spectators_before, 1);

    handle.send(RoomCommand::Detach(Detach { sender: tx })).await.unwrap();

    // Give the single-writer engine a turn to apply the command.
    for _ in 0..20 {
        let (_, spectators) = handle.counters();
        if spectators == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(handle.counters().1, 0);
}

#[tokio::test]
async fn unload_on_empty_removes_a_non_canonical_room_from_the_registry() {
    let (registry, store) = registry_with_canonical(10, 10).await;

    let room_id = RoomId::new();
    store.seed_room(RoomRecord {
        id: room_id.clone(),
        slug: "side-room".to_string(),
        name: "Side Room".to_string(),
        description: None,
        owner_id: None,
        owner_username: None,
        is_public: true,
        created_at: chrono::Utc::now(),
        grid: Grid::open(10, 10),
    });

    let handle = registry.load_by_slug("side-room").await.unwrap();
    let alice = ParticipantId::new();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    handle
        .send(RoomCommand::AttachParticipant(AttachParticipant {
            id: alice.clone(),
            name: "Alice".into(),
            avatar: avatar("#3B82F6"),
            sender: tx.clone(),
        }))
        .await
        .unwrap();
    let _ = rx.recv().await.unwrap(); // room_state

    handle.send(RoomCommand::Detach(Detach { sender: tx })).await.unwrap();

    for _ in 0..20 {
        let rooms = registry.active_rooms().await.unwrap();
        if !rooms.iter().any(|r| r.slug == "side-room") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let rooms = registry.active_rooms().await.unwrap();
    assert!(!rooms.iter().any(|r| r.slug == "side-room"));
}
