//! In-memory registry of per-meeting agent sessions.
//!
//! The registry is the single source of truth for whether an agent is
//! attached to a meeting. Each meeting holds at most one slot, which is
//! either a `Connecting` placeholder (handshake in flight) or an `Active`
//! handle. Every operation holds the inner mutex for its full duration, so
//! check-and-insert is atomic under the multi-threaded runtime and two
//! racing connect attempts can never both claim the same meeting.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use call_agents_core::{MeetingId, SessionHandle};
use tracing::warn;

/// Cancellation flag shared between an in-flight connect and the disconnector.
///
/// Set by a manual disconnect that arrives while the handshake is still in
/// flight; the connect path checks it after every suspension point.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Observed state of a meeting's agent session.
#[derive(Clone)]
pub enum SessionState {
    /// No session for this meeting.
    Absent,
    /// Handshake in flight.
    Connecting,
    /// Live session.
    Active(SessionHandle),
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Active(_) => write!(f, "Active"),
        }
    }
}

/// Outcome of a manual-disconnect detach.
pub enum Detach {
    /// Nothing to tear down.
    Idle,
    /// Handshake in flight; cancellation was requested and the entry left in
    /// place for the connect path's own cleanup.
    CancelRequested,
    /// Live handle removed from the registry; the caller owns teardown.
    Detached(SessionHandle),
}

/// A session slot already exists for the meeting.
#[derive(Debug, thiserror::Error)]
#[error("Session already present for meeting: {0}")]
pub struct AlreadyPresent(pub MeetingId);

enum Slot {
    Connecting { cancel: CancelFlag },
    Active(SessionHandle),
}

/// Registry mapping meeting ids to agent session state.
///
/// Thread-safe and cheap to clone.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    slots: Arc<Mutex<HashMap<MeetingId, Slot>>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for a meeting.
    #[must_use]
    pub fn lookup(&self, meeting_id: &MeetingId) -> SessionState {
        match self.slots.lock().unwrap().get(meeting_id) {
            None => SessionState::Absent,
            Some(Slot::Connecting { .. }) => SessionState::Connecting,
            Some(Slot::Active(handle)) => SessionState::Active(Arc::clone(handle)),
        }
    }

    /// Claim the meeting's slot with a `Connecting` placeholder.
    ///
    /// Check and insert happen under a single lock acquisition; exactly one
    /// of any number of racing callers succeeds.
    ///
    /// # Errors
    /// Returns `AlreadyPresent` if any slot (connecting or active) exists.
    pub fn mark_connecting(&self, meeting_id: &MeetingId) -> Result<CancelFlag, AlreadyPresent> {
        let mut slots = self.slots.lock().unwrap();
        if slots.contains_key(meeting_id) {
            return Err(AlreadyPresent(meeting_id.clone()));
        }
        let cancel = CancelFlag::new();
        slots.insert(
            meeting_id.clone(),
            Slot::Connecting {
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    /// Replace a `Connecting` placeholder with a live handle.
    ///
    /// A missing or already-active slot is a protocol violation by the
    /// caller; it is logged and left untouched rather than crashing.
    pub fn promote(&self, meeting_id: &MeetingId, handle: SessionHandle) {
        let mut slots = self.slots.lock().unwrap();
        match slots.get(meeting_id) {
            Some(Slot::Connecting { .. }) => {
                slots.insert(meeting_id.clone(), Slot::Active(handle));
            }
            Some(Slot::Active(_)) => {
                warn!(meeting_id = %meeting_id, "Promote on already-active session, ignoring");
            }
            None => {
                warn!(meeting_id = %meeting_id, "Promote without connecting placeholder, ignoring");
            }
        }
    }

    /// Remove the meeting's slot, returning its previous state. Idempotent.
    pub fn remove(&self, meeting_id: &MeetingId) -> SessionState {
        match self.slots.lock().unwrap().remove(meeting_id) {
            None => SessionState::Absent,
            Some(Slot::Connecting { .. }) => SessionState::Connecting,
            Some(Slot::Active(handle)) => SessionState::Active(handle),
        }
    }

    /// Remove the meeting's slot only if it holds a live handle.
    ///
    /// Used by event-driven teardown: the first path to take the handle owns
    /// the disconnect, every later path sees `None` and does nothing. A
    /// `Connecting` placeholder is left alone since the in-flight connect
    /// owns its own cleanup.
    pub fn take_active(&self, meeting_id: &MeetingId) -> Option<SessionHandle> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get(meeting_id) {
            Some(Slot::Active(_)) => match slots.remove(meeting_id) {
                Some(Slot::Active(handle)) => Some(handle),
                _ => None,
            },
            _ => None,
        }
    }

    /// Begin a manual disconnect under a single lock acquisition.
    ///
    /// Active slots are removed and returned; connecting slots get their
    /// cancellation flag set and stay in place.
    pub fn detach(&self, meeting_id: &MeetingId) -> Detach {
        let mut slots = self.slots.lock().unwrap();
        match slots.get(meeting_id) {
            None => Detach::Idle,
            Some(Slot::Connecting { cancel }) => {
                cancel.cancel();
                Detach::CancelRequested
            }
            Some(Slot::Active(_)) => match slots.remove(meeting_id) {
                Some(Slot::Active(handle)) => Detach::Detached(handle),
                _ => Detach::Idle,
            },
        }
    }

    /// Drain every live handle and clear the registry.
    ///
    /// Pending connects are cancelled so their cleanup paths fire once they
    /// observe the flag. Used by shutdown.
    pub fn drain_all(&self) -> Vec<(MeetingId, SessionHandle)> {
        let mut slots = self.slots.lock().unwrap();
        let drained = std::mem::take(&mut *slots);
        drained
            .into_iter()
            .filter_map(|(meeting_id, slot)| match slot {
                Slot::Active(handle) => Some((meeting_id, handle)),
                Slot::Connecting { cancel } => {
                    cancel.cancel();
                    None
                }
            })
            .collect()
    }

    /// Number of tracked sessions, connecting placeholders included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().unwrap().is_empty()
    }
}
