//! Session manager orchestrating agent connect, teardown, and status.

use std::sync::Arc;

use call_agents_core::{
    MeetingId, MeetingStatus, MeetingStore, ProviderError, RealtimeProvider, SessionHandle,
    StatusChange, StoreError, agent::SessionUpdate, meeting,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    lifecycle,
    registry::{CancelFlag, Detach, SessionRegistry, SessionState},
};

/// Realtime model requested from the provider by default.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Synthetic first user turn. Without it the model waits passively for user
/// speech and a silent agent reads as broken.
pub const DEFAULT_KICKOFF_PROMPT: &str =
    "Greet the user according to your instructions and persona. Start the conversation.";

/// Session manager error for connect.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Meeting not found: {0}")]
    MeetingNotFound(MeetingId),
    #[error("No agent configured for meeting: {0}")]
    AgentNotConfigured(MeetingId),
    #[error("Connect cancelled for meeting: {0}")]
    Cancelled(MeetingId),
}

/// Outcome of a connect request.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    /// Identity of the connected agent; `None` when the connect was an
    /// idempotent no-op against an existing session.
    pub agent_id: Option<String>,
    /// A session already existed (or another connect held the slot).
    pub already_connected: bool,
}

/// Outcome of a disconnect request.
#[derive(Debug, Clone, Copy)]
pub struct DisconnectOutcome {
    /// No session existed for the meeting.
    pub already_idle: bool,
}

/// Connection state reported to polling clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of a meeting's agent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentStatus {
    pub connected: bool,
    pub state: ConnectionState,
}

/// Session manager tunables.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Realtime model requested from the provider.
    pub realtime_model: String,
    /// Kickoff prompt sent after persona configuration.
    pub kickoff_prompt: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
            kickoff_prompt: DEFAULT_KICKOFF_PROMPT.to_string(),
        }
    }
}

/// Session manager for attaching AI agents to live calls.
///
/// Owns the registry of in-memory session state; the persisted meeting
/// record owns durable lifecycle status. The two are kept consistent by the
/// connect and teardown paths but may transiently disagree.
pub struct AgentSessionManager<S, P>
where
    S: MeetingStore,
    P: RealtimeProvider,
{
    store: Arc<S>,
    provider: Arc<P>,
    registry: SessionRegistry,
    config: ManagerConfig,
}

impl<S, P> AgentSessionManager<S, P>
where
    S: MeetingStore + 'static,
    P: RealtimeProvider,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(store: Arc<S>, provider: Arc<P>, config: ManagerConfig) -> Self {
        Self {
            store,
            provider,
            registry: SessionRegistry::new(),
            config,
        }
    }

    /// Connect the meeting's configured agent to its live call.
    ///
    /// Idempotent: a meeting that is already connecting or connected is
    /// reported as `already_connected` rather than producing a second
    /// session, which tolerates duplicate triggers from the client.
    ///
    /// # Errors
    /// Returns an error if the meeting or its agent is missing, if the
    /// provider handshake fails, or if the connect was cancelled. Every
    /// failure path rolls the registry entry back.
    pub async fn connect(&self, meeting_id: &MeetingId) -> Result<ConnectOutcome, ConnectError> {
        // Claim the slot before any I/O; a racing connect observes the
        // placeholder and short-circuits here.
        let Ok(cancel) = self.registry.mark_connecting(meeting_id) else {
            return Ok(ConnectOutcome {
                agent_id: None,
                already_connected: true,
            });
        };

        match self.handshake(meeting_id, &cancel).await {
            Ok(agent_id) => Ok(ConnectOutcome {
                agent_id: Some(agent_id),
                already_connected: false,
            }),
            Err(e) => {
                // Never leave a stuck Connecting placeholder behind.
                self.registry.remove(meeting_id);
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        meeting_id: &MeetingId,
        cancel: &CancelFlag,
    ) -> Result<String, ConnectError> {
        let record = self
            .store
            .get_meeting_with_agent(meeting_id)
            .await?
            .ok_or_else(|| ConnectError::MeetingNotFound(meeting_id.clone()))?;
        let agent = record
            .agent
            .ok_or_else(|| ConnectError::AgentNotConfigured(meeting_id.clone()))?;

        if cancel.is_cancelled() {
            return Err(ConnectError::Cancelled(meeting_id.clone()));
        }

        let handle = self
            .provider
            .open_agent_session(meeting_id, &agent.id, &self.config.realtime_model)
            .await?;

        if let Err(e) = self.configure(meeting_id, &handle, &agent, cancel).await {
            let _ = handle.disconnect().await;
            return Err(e);
        }

        // Wire the lifecycle watcher before the handle becomes visible so
        // no event can slip past unobserved.
        lifecycle::spawn_watcher(
            meeting_id.clone(),
            Arc::clone(&handle),
            self.registry.clone(),
            Arc::clone(&self.store),
        );

        self.registry.promote(meeting_id, Arc::clone(&handle));

        let change = StatusChange::active(meeting::now_epoch());
        if let Err(e) = self.store.set_meeting_status(meeting_id, change).await {
            // The session is live but its status write failed; tear it back
            // down rather than report a connect the store never saw.
            self.registry.remove(meeting_id);
            let _ = handle.disconnect().await;
            return Err(e.into());
        }

        info!(meeting_id = %meeting_id, agent = %agent.name, "Connected agent to meeting");
        Ok(agent.id)
    }

    async fn configure(
        &self,
        meeting_id: &MeetingId,
        handle: &SessionHandle,
        agent: &call_agents_core::AgentPersona,
        cancel: &CancelFlag,
    ) -> Result<(), ConnectError> {
        if cancel.is_cancelled() {
            return Err(ConnectError::Cancelled(meeting_id.clone()));
        }

        let update = SessionUpdate::from_persona(agent);
        handle.update_session(&update).await?;

        if cancel.is_cancelled() {
            return Err(ConnectError::Cancelled(meeting_id.clone()));
        }

        handle.send_user_message(&self.config.kickoff_prompt).await?;

        if cancel.is_cancelled() {
            return Err(ConnectError::Cancelled(meeting_id.clone()));
        }

        Ok(())
    }

    /// Disconnect the meeting's agent session, if any.
    ///
    /// A handshake still in flight is cancelled cooperatively: the flag is
    /// set and the connect path's own cleanup fires once it observes it.
    ///
    /// # Errors
    /// Returns an error if the completed-status write fails; the session is
    /// already torn down at that point.
    pub async fn disconnect(
        &self,
        meeting_id: &MeetingId,
    ) -> Result<DisconnectOutcome, StoreError> {
        match self.registry.detach(meeting_id) {
            Detach::Idle => Ok(DisconnectOutcome { already_idle: true }),
            Detach::CancelRequested => {
                info!(meeting_id = %meeting_id, "Cancelling in-flight agent connect");
                Ok(DisconnectOutcome {
                    already_idle: false,
                })
            }
            Detach::Detached(handle) => {
                if let Err(e) = handle.disconnect().await {
                    warn!(meeting_id = %meeting_id, error = %e, "Handle disconnect failed during manual teardown");
                }
                let change = StatusChange::completed(meeting::now_epoch());
                self.store.set_meeting_status(meeting_id, change).await?;
                info!(meeting_id = %meeting_id, "Disconnected agent from meeting");
                Ok(DisconnectOutcome {
                    already_idle: false,
                })
            }
        }
    }

    /// Tear down every session. Shutdown path.
    ///
    /// Individual disconnect failures are swallowed so one bad handle cannot
    /// block the others; callers bound the whole call with a timeout.
    pub async fn disconnect_all(&self) -> usize {
        let drained = self.registry.drain_all();
        let count = drained.len();
        info!(sessions = count, "Disconnecting all agent sessions");

        for (meeting_id, handle) in drained {
            if let Err(e) = handle.disconnect().await {
                warn!(meeting_id = %meeting_id, error = %e, "Failed to disconnect session during shutdown");
            }
        }
        count
    }

    /// Current agent-connection state for a meeting. Pure registry read.
    #[must_use]
    pub fn status(&self, meeting_id: &MeetingId) -> AgentStatus {
        match self.registry.lookup(meeting_id) {
            SessionState::Absent => AgentStatus {
                connected: false,
                state: ConnectionState::Disconnected,
            },
            SessionState::Connecting => AgentStatus {
                connected: false,
                state: ConnectionState::Connecting,
            },
            SessionState::Active(_) => AgentStatus {
                connected: true,
                state: ConnectionState::Connected,
            },
        }
    }

    /// Mark persisted `active` meetings with no live session as completed.
    ///
    /// In-memory session state does not survive a restart, so a crash can
    /// leave meetings stranded in `active`. Run once at startup, before the
    /// process takes traffic.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written.
    pub async fn reconcile(&self) -> Result<usize, StoreError> {
        let active = self.store.list_by_status(MeetingStatus::Active).await?;
        let mut repaired = 0;

        for stranded in active {
            if matches!(self.registry.lookup(&stranded.id), SessionState::Absent) {
                let change = StatusChange::completed(meeting::now_epoch());
                self.store.set_meeting_status(&stranded.id, change).await?;
                warn!(meeting_id = %stranded.id, "Marked orphaned active meeting as completed");
                repaired += 1;
            }
        }

        Ok(repaired)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use call_agents_core::{
        AgentPersona, CallEvent, Meeting, MeetingWithAgent, Participant, RealtimeSession,
    };
    use tokio::sync::{Notify, broadcast};

    use super::*;
    use crate::{provider::LoopbackProvider, store::MemoryMeetingStore};

    /// Store wrapper that always suspends on reads, records status writes,
    /// and supports failure injection and gating.
    struct FakeStore {
        inner: MemoryMeetingStore,
        writes: Mutex<Vec<(MeetingId, StatusChange)>>,
        fail_get: AtomicBool,
        gate: Mutex<Option<Arc<Notify>>>,
    }

    impl FakeStore {
        fn new() -> Self {
            Self {
                inner: MemoryMeetingStore::new(),
                writes: Mutex::new(Vec::new()),
                fail_get: AtomicBool::new(false),
                gate: Mutex::new(None),
            }
        }

        fn seeded() -> Self {
            let store = Self::new();
            store.inner.insert(
                Meeting::new("m1", "Standup").with_agent("ai-a1"),
                Some(AgentPersona::new("ai-a1", "Coach").with_instructions("Be terse")),
            );
            store.inner.insert(Meeting::new("m2", "Agentless"), None);
            store
        }

        fn gate_reads(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
            gate
        }

        fn writes_for(&self, meeting_id: &str) -> Vec<StatusChange> {
            self.writes
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _)| id == meeting_id)
                .map(|(_, change)| *change)
                .collect()
        }

        fn active_writes(&self, meeting_id: &str) -> usize {
            self.writes_for(meeting_id)
                .iter()
                .filter(|c| c.status == MeetingStatus::Active)
                .count()
        }
    }

    #[async_trait]
    impl MeetingStore for FakeStore {
        async fn get_meeting_with_agent(
            &self,
            id: &MeetingId,
        ) -> Result<Option<MeetingWithAgent>, StoreError> {
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            tokio::task::yield_now().await;
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Internal("db down".to_string()));
            }
            self.inner.get_meeting_with_agent(id).await
        }

        async fn set_meeting_status(
            &self,
            id: &MeetingId,
            change: StatusChange,
        ) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push((id.clone(), change));
            self.inner.set_meeting_status(id, change).await
        }

        async fn list_by_status(&self, status: MeetingStatus) -> Result<Vec<Meeting>, StoreError> {
            self.inner.list_by_status(status).await
        }
    }

    /// Provider with per-meeting failure injection.
    struct FlakySession {
        events: broadcast::Sender<CallEvent>,
        fail_update: bool,
        fail_disconnect: bool,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl RealtimeSession for FlakySession {
        async fn update_session(&self, _update: &SessionUpdate) -> Result<(), ProviderError> {
            if self.fail_update {
                return Err(ProviderError::ConfigUpdate("rejected".to_string()));
            }
            Ok(())
        }

        async fn send_user_message(&self, _text: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
            self.events.subscribe()
        }

        async fn disconnect(&self) -> Result<(), ProviderError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            if self.fail_disconnect {
                return Err(ProviderError::Transport("gone".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FlakyProvider {
        fail_update: bool,
        fail_disconnect_for: Vec<MeetingId>,
        sessions: Mutex<HashMap<MeetingId, Arc<FlakySession>>>,
    }

    impl FlakyProvider {
        fn session(&self, meeting_id: &str) -> Arc<FlakySession> {
            Arc::clone(&self.sessions.lock().unwrap()[meeting_id])
        }
    }

    #[async_trait]
    impl RealtimeProvider for FlakyProvider {
        async fn open_agent_session(
            &self,
            meeting_id: &MeetingId,
            _agent_user_id: &str,
            _model: &str,
        ) -> Result<SessionHandle, ProviderError> {
            let (events, _) = broadcast::channel(16);
            let session = Arc::new(FlakySession {
                events,
                fail_update: self.fail_update,
                fail_disconnect: self.fail_disconnect_for.contains(meeting_id),
                disconnects: AtomicUsize::new(0),
            });
            self.sessions
                .lock()
                .unwrap()
                .insert(meeting_id.clone(), Arc::clone(&session));
            Ok(session)
        }
    }

    fn manager_with(
        store: FakeStore,
    ) -> (
        AgentSessionManager<FakeStore, LoopbackProvider>,
        Arc<FakeStore>,
        Arc<LoopbackProvider>,
    ) {
        let store = Arc::new(store);
        let provider = Arc::new(LoopbackProvider::new());
        let manager = AgentSessionManager::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            ManagerConfig::default(),
        );
        (manager, store, provider)
    }

    async fn wait_until(cond: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(1), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn connect_attaches_agent() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        let outcome = manager.connect(&meeting).await.unwrap();
        assert!(!outcome.already_connected);
        assert_eq!(outcome.agent_id.as_deref(), Some("ai-a1"));

        let status = manager.status(&meeting);
        assert!(status.connected);
        assert_eq!(status.state, ConnectionState::Connected);

        let session = provider.session(&meeting).unwrap();
        assert_eq!(session.applied_updates()[0].instructions, "Be terse");
        assert_eq!(session.kickoffs(), vec![DEFAULT_KICKOFF_PROMPT.to_string()]);

        let writes = store.writes_for("m1");
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].status, MeetingStatus::Active);
        assert!(writes[0].started_at.is_some());
    }

    #[tokio::test]
    async fn repeated_connect_is_idempotent() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let second = manager.connect(&meeting).await.unwrap();

        assert!(second.already_connected);
        assert!(second.agent_id.is_none());
        assert_eq!(provider.open_count(), 1);
        assert_eq!(store.active_writes("m1"), 1);
    }

    #[tokio::test]
    async fn concurrent_connects_produce_one_session() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        let (a, b) = tokio::join!(manager.connect(&meeting), manager.connect(&meeting));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.already_connected, b.already_connected);
        assert_eq!(provider.open_count(), 1);
        assert_eq!(store.active_writes("m1"), 1);
        assert!(manager.status(&meeting).connected);
    }

    #[tokio::test]
    async fn connect_unknown_meeting_rolls_back() {
        let (manager, _store, _provider) = manager_with(FakeStore::seeded());
        let meeting = "nope".to_string();

        let err = manager.connect(&meeting).await.unwrap_err();
        assert!(matches!(err, ConnectError::MeetingNotFound(_)));
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_without_agent_rolls_back() {
        let (manager, _store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m2".to_string();

        let err = manager.connect(&meeting).await.unwrap_err();
        assert!(matches!(err, ConnectError::AgentNotConfigured(_)));
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
        assert_eq!(provider.open_count(), 0);
    }

    #[tokio::test]
    async fn connect_store_failure_rolls_back() {
        let store = FakeStore::seeded();
        store.fail_get.store(true, Ordering::SeqCst);
        let (manager, _store, _provider) = manager_with(store);
        let meeting = "m1".to_string();

        let err = manager.connect(&meeting).await.unwrap_err();
        assert!(matches!(err, ConnectError::Store(_)));
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn handshake_failure_disconnects_and_rolls_back() {
        let store = Arc::new(FakeStore::seeded());
        let provider = Arc::new(FlakyProvider {
            fail_update: true,
            ..FlakyProvider::default()
        });
        let manager = AgentSessionManager::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            ManagerConfig::default(),
        );
        let meeting = "m1".to_string();

        let err = manager.connect(&meeting).await.unwrap_err();
        assert!(matches!(err, ConnectError::Provider(_)));
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
        // The opened handle was torn down during rollback.
        assert_eq!(provider.session("m1").disconnects.load(Ordering::SeqCst), 1);
        assert!(store.writes_for("m1").is_empty());
    }

    #[tokio::test]
    async fn disconnect_absent_is_idle_noop() {
        let (manager, store, _provider) = manager_with(FakeStore::seeded());

        let outcome = manager.disconnect(&"m1".to_string()).await.unwrap();
        assert!(outcome.already_idle);
        assert!(store.writes_for("m1").is_empty());
    }

    #[tokio::test]
    async fn disconnect_active_completes_meeting() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let outcome = manager.disconnect(&meeting).await.unwrap();

        assert!(!outcome.already_idle);
        assert_eq!(provider.session(&meeting).unwrap().disconnect_count(), 1);
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);

        let writes = store.writes_for("m1");
        assert_eq!(writes.last().unwrap().status, MeetingStatus::Completed);
        assert!(writes.last().unwrap().ended_at.is_some());
    }

    #[tokio::test]
    async fn disconnect_cancels_inflight_connect() {
        let store = FakeStore::seeded();
        let gate = store.gate_reads();
        let (manager, store, provider) = manager_with(store);
        let manager = Arc::new(manager);
        let meeting = "m1".to_string();

        let connect = {
            let manager = Arc::clone(&manager);
            let meeting = meeting.clone();
            tokio::spawn(async move { manager.connect(&meeting).await })
        };

        {
            let manager = Arc::clone(&manager);
            let meeting = meeting.clone();
            wait_until(move || manager.status(&meeting).state == ConnectionState::Connecting).await;
        }

        let outcome = manager.disconnect(&meeting).await.unwrap();
        assert!(!outcome.already_idle);
        // The placeholder stays until the connect path observes the flag.
        assert_eq!(manager.status(&meeting).state, ConnectionState::Connecting);

        gate.notify_one();
        let err = connect.await.unwrap().unwrap_err();
        assert!(matches!(err, ConnectError::Cancelled(_)));
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
        assert_eq!(provider.open_count(), 0);
        assert!(store.writes_for("m1").is_empty());
    }

    #[tokio::test]
    async fn empty_room_tears_session_down() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let session = provider.session(&meeting).unwrap();

        // A human remains: nothing happens.
        session.emit(CallEvent::ParticipantLeft {
            participants: vec![Participant::new("alice"), Participant::new("ai-a1")],
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.status(&meeting).connected);

        // Only the agent remains: auto-hangup.
        session.emit(CallEvent::ParticipantLeft {
            participants: vec![Participant::new("ai-a1")],
        });
        {
            let session = Arc::clone(&session);
            wait_until(move || session.disconnect_count() == 1).await;
        }
        {
            let store = Arc::clone(&store);
            wait_until(move || {
                store
                    .writes_for("m1")
                    .last()
                    .is_some_and(|c| c.status == MeetingStatus::Completed)
            })
            .await;
        }
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn call_ended_disconnects_without_status_write() {
        let (manager, store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let session = provider.session(&meeting).unwrap();

        session.emit(CallEvent::CallEnded);
        {
            let session = Arc::clone(&session);
            wait_until(move || session.disconnect_count() == 1).await;
        }
        assert_eq!(manager.status(&meeting).state, ConnectionState::Disconnected);
        // Natural call end leaves the status transition to the caller.
        assert_eq!(store.writes_for("m1").last().unwrap().status, MeetingStatus::Active);
    }

    #[tokio::test]
    async fn session_error_drops_state_without_remote_disconnect() {
        let (manager, _store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let session = provider.session(&meeting).unwrap();

        session.emit(CallEvent::Error {
            message: "ice failure".to_string(),
        });
        {
            let manager = Arc::new(manager);
            let meeting = meeting.clone();
            wait_until(move || !manager.status(&meeting).connected).await;
        }
        assert_eq!(session.disconnect_count(), 0);
    }

    #[tokio::test]
    async fn call_end_and_manual_disconnect_tear_down_once() {
        let (manager, _store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let session = provider.session(&meeting).unwrap();

        session.emit(CallEvent::CallEnded);
        let _ = manager.disconnect(&meeting).await.unwrap();

        {
            let session = Arc::clone(&session);
            wait_until(move || session.disconnect_count() >= 1).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn manual_disconnect_then_call_end_tears_down_once() {
        let (manager, _store, provider) = manager_with(FakeStore::seeded());
        let meeting = "m1".to_string();

        manager.connect(&meeting).await.unwrap();
        let session = provider.session(&meeting).unwrap();

        manager.disconnect(&meeting).await.unwrap();
        assert_eq!(session.disconnect_count(), 1);

        session.emit(CallEvent::CallEnded);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_all_swallows_handle_failures() {
        let store = FakeStore::new();
        for id in ["m1", "m2", "m3"] {
            store.inner.insert(
                Meeting::new(id, id).with_agent("ai-a1"),
                Some(AgentPersona::new("ai-a1", "Coach")),
            );
        }
        let store = Arc::new(store);
        let provider = Arc::new(FlakyProvider {
            fail_disconnect_for: vec!["m2".to_string()],
            ..FlakyProvider::default()
        });
        let manager = AgentSessionManager::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            ManagerConfig::default(),
        );

        for id in ["m1", "m2", "m3"] {
            manager.connect(&id.to_string()).await.unwrap();
        }

        let count = manager.disconnect_all().await;
        assert_eq!(count, 3);
        for id in ["m1", "m2", "m3"] {
            assert_eq!(provider.session(id).disconnects.load(Ordering::SeqCst), 1);
            assert_eq!(manager.status(&id.to_string()).state, ConnectionState::Disconnected);
        }
    }

    #[tokio::test]
    async fn reconcile_completes_orphaned_meetings() {
        let store = FakeStore::seeded();
        store.inner.insert(
            Meeting {
                id: "orphan".to_string(),
                name: "Stranded".to_string(),
                agent_id: Some("ai-a1".to_string()),
                status: MeetingStatus::Active,
                started_at: Some(100),
                ended_at: None,
            },
            Some(AgentPersona::new("ai-a1", "Coach")),
        );
        let (manager, store, _provider) = manager_with(store);

        // A live session must not be reconciled away.
        manager.connect(&"m1".to_string()).await.unwrap();

        let repaired = manager.reconcile().await.unwrap();
        assert_eq!(repaired, 1);

        let writes = store.writes_for("orphan");
        assert_eq!(writes.last().unwrap().status, MeetingStatus::Completed);
        assert!(manager.status(&"m1".to_string()).connected);
    }

    #[test]
    fn connection_state_serializes_snake_case() {
        let json = serde_json::to_string(&ConnectionState::Disconnected).unwrap();
        assert_eq!(json, "\"disconnected\"");
    }
}
