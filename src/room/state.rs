//! In-memory authoritative state owned by a single Room Engine (§3, §4.2)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::grid::Pos;
use crate::ids::{ParticipantId, RoomId};
use crate::room::commands::EventSender;
use crate::room::types::{ChatMessage, Participant, RoomRecord};

/// Participant/spectator counts, updated by the engine and read by the
/// Room Registry's discovery queries without entering the engine's
/// command channel (§4.4, §5, §9).
#[derive(Debug, Default)]
pub struct RoomCounters {
    participants: AtomicUsize,
    spectators: AtomicUsize,
}

impl RoomCounters {
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.participants.load(Ordering::Relaxed),
            self.spectators.load(Ordering::Relaxed),
        )
    }

    fn set(&self, participants: usize, spectators: usize) {
        self.participants.store(participants, Ordering::Relaxed);
        self.spectators.store(spectators, Ordering::Relaxed);
    }
}

struct Socket {
    sender: EventSender,
    participant_id: Option<ParticipantId>,
}

/// Owned exclusively by its Room Engine task; external code must never
/// touch this except through the atomic [`RoomCounters`] snapshot.
pub struct RoomState {
    pub record: RoomRecord,
    pub counters: Arc<RoomCounters>,
    participants: IndexMap<ParticipantId, Participant>,
    sockets: Vec<Socket>,
    history: VecDeque<ChatMessage>,
    history_limit: usize,
}

impl RoomState {
    pub fn new(record: RoomRecord, history: Vec<ChatMessage>, history_limit: usize) -> Self {
        Self {
            record,
            counters: Arc::new(RoomCounters::default()),
            participants: IndexMap::new(),
            sockets: Vec::new(),
            history: history.into_iter().collect(),
            history_limit,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.record.id
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn history(&self) -> impl Iterator<Item = &ChatMessage> {
        self.history.iter()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn spectator_count(&self) -> usize {
        self.sockets
            .iter()
            .filter(|s| s.participant_id.is_none())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    fn sync_counters(&self) {
        self.counters
            .set(self.participants.len(), self.spectator_count());
    }

    /// All sockets currently attached, used for fan-out.
    pub fn all_sockets(&self) -> impl Iterator<Item = &EventSender> {
        self.sockets.iter().map(|s| &s.sender)
    }

    /// The socket currently holding `id`, if any — used to target
    /// validation errors at the mover only (§4.2 movement validation
    /// errors, §7 Validation).
    pub fn sender_for_participant(&self, id: &ParticipantId) -> Option<&EventSender> {
        self.sockets
            .iter()
            .find(|s| s.participant_id.as_ref() == Some(id))
            .map(|s| &s.sender)
    }

    /// Attaches a participant, detaching any existing attachment of the
    /// same id on a different socket first (§3 ownership).
    pub fn attach_participant(
        &mut self,
        participant: Participant,
        sender: EventSender,
    ) -> Option<EventSender> {
        let displaced = self.detach_participant_id(&participant.id);
        self.participants.insert(participant.id.clone(), participant.clone());
        self.sockets.push(Socket {
            sender,
            participant_id: Some(participant.id),
        });
        self.sync_counters();
        displaced
    }

    pub fn attach_spectator(&mut self, sender: EventSender) {
        self.sockets.push(Socket {
            sender,
            participant_id: None,
        });
        self.sync_counters();
    }

    /// Detaches by socket identity; returns the participant id if the
    /// socket held one.
    pub fn detach_socket(&mut self, sender: &EventSender) -> Option<ParticipantId> {
        let idx = self.sockets.iter().position(|s| s.sender.same_channel(sender))?;
        let removed = self.sockets.remove(idx);
        if let Some(pid) = &removed.participant_id {
            // Only drop the participant record if no other socket still
            // holds it (there should never be more than one, but this
            // keeps the invariant explicit).
            let still_attached = self
                .sockets
                .iter()
                .any(|s| s.participant_id.as_ref() == Some(pid));
            if !still_attached {
                self.participants.shift_remove(pid);
            }
        }
        self.sync_counters();
        removed.participant_id
    }

    fn detach_participant_id(&mut self, id: &ParticipantId) -> Option<EventSender> {
        let idx = self
            .sockets
            .iter()
            .position(|s| s.participant_id.as_ref() == Some(id))?;
        let removed = self.sockets.remove(idx);
        self.participants.shift_remove(id);
        Some(removed.sender)
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.get(id)
    }

    pub fn participant_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(id)
    }

    pub fn teleport(&mut self, id: &ParticipantId, to: Pos) {
        if let Some(p) = self.participants.get_mut(id) {
            p.x = to.x;
            p.y = to.y;
        }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.history.push_back(message);
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}
