//! Loopback realtime provider.
//!
//! Sessions are not backed by any media transport. Useful for development
//! and single-process demos: callers can inject lifecycle events and
//! observe configuration and disconnect calls.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use call_agents_core::{
    CallEvent, MeetingId, ProviderError, RealtimeProvider, RealtimeSession, SessionHandle,
    agent::SessionUpdate,
};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// A loopback session handle.
pub struct LoopbackSession {
    id: Uuid,
    meeting_id: MeetingId,
    agent_user_id: String,
    model: String,
    events: broadcast::Sender<CallEvent>,
    updates: Mutex<Vec<SessionUpdate>>,
    kickoffs: Mutex<Vec<String>>,
    disconnects: AtomicUsize,
}

impl LoopbackSession {
    /// Session identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Agent identity this session was opened with.
    #[must_use]
    pub fn agent_user_id(&self) -> &str {
        &self.agent_user_id
    }

    /// Model this session was opened with.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Inject a lifecycle event as if it came from the call.
    pub fn emit(&self, event: CallEvent) {
        // No receivers is fine; nobody is watching this session.
        let _ = self.events.send(event);
    }

    /// Configuration updates applied so far.
    #[must_use]
    pub fn applied_updates(&self) -> Vec<SessionUpdate> {
        self.updates.lock().unwrap().clone()
    }

    /// Kickoff messages sent so far.
    #[must_use]
    pub fn kickoffs(&self) -> Vec<String> {
        self.kickoffs.lock().unwrap().clone()
    }

    /// Number of disconnect calls received.
    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RealtimeSession for LoopbackSession {
    async fn update_session(&self, update: &SessionUpdate) -> Result<(), ProviderError> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn send_user_message(&self, text: &str) -> Result<(), ProviderError> {
        self.kickoffs.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        debug!(meeting_id = %self.meeting_id, session_id = %self.id, "Loopback session disconnected");
        Ok(())
    }
}

/// Loopback provider tracking every opened session.
pub struct LoopbackProvider {
    sessions: Mutex<HashMap<MeetingId, Arc<LoopbackSession>>>,
    opened: AtomicUsize,
}

impl LoopbackProvider {
    /// Create a new loopback provider.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            opened: AtomicUsize::new(0),
        }
    }

    /// The most recent session opened for a meeting.
    #[must_use]
    pub fn session(&self, meeting_id: &str) -> Option<Arc<LoopbackSession>> {
        self.sessions.lock().unwrap().get(meeting_id).cloned()
    }

    /// Total number of sessions opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Default for LoopbackProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RealtimeProvider for LoopbackProvider {
    async fn open_agent_session(
        &self,
        meeting_id: &MeetingId,
        agent_user_id: &str,
        model: &str,
    ) -> Result<SessionHandle, ProviderError> {
        let (events, _) = broadcast::channel(16);
        let session = Arc::new(LoopbackSession {
            id: Uuid::new_v4(),
            meeting_id: meeting_id.clone(),
            agent_user_id: agent_user_id.to_string(),
            model: model.to_string(),
            events,
            updates: Mutex::new(Vec::new()),
            kickoffs: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        });

        self.sessions
            .lock()
            .unwrap()
            .insert(meeting_id.clone(), Arc::clone(&session));
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(meeting_id = %meeting_id, agent = %agent_user_id, model, "Opened loopback session");

        Ok(session)
    }
}
