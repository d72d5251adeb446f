//! Collaborator traits for persistence and the realtime provider.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::{
    agent::{AgentPersona, SessionUpdate},
    events::CallEvent,
    meeting::{Meeting, MeetingId, MeetingStatus, StatusChange},
};

/// Storage error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Meeting not found: {0}")]
    NotFound(MeetingId),
    #[error("Store error: {0}")]
    Internal(String),
}

/// A meeting joined with its configured agent, if any.
#[derive(Debug, Clone)]
pub struct MeetingWithAgent {
    pub meeting: Meeting,
    pub agent: Option<AgentPersona>,
}

/// Trait for meeting persistence backends.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    /// Fetch a meeting joined with its configured agent.
    async fn get_meeting_with_agent(
        &self,
        id: &MeetingId,
    ) -> Result<Option<MeetingWithAgent>, StoreError>;

    /// Apply a status transition to a meeting.
    async fn set_meeting_status(
        &self,
        id: &MeetingId,
        change: StatusChange,
    ) -> Result<(), StoreError>;

    /// List meetings currently in the given status.
    async fn list_by_status(&self, status: MeetingStatus) -> Result<Vec<Meeting>, StoreError>;
}

/// Realtime provider error.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to open realtime session: {0}")]
    SessionOpen(String),
    #[error("Failed to apply session configuration: {0}")]
    ConfigUpdate(String),
    #[error("Realtime transport error: {0}")]
    Transport(String),
}

/// Opaque reference to a live realtime connection between an agent and a call.
///
/// Sufficient to send configuration and teardown commands and to subscribe
/// to call lifecycle events.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    /// Apply persona configuration to the open session.
    async fn update_session(&self, update: &SessionUpdate) -> Result<(), ProviderError>;

    /// Send a synthetic user turn to the model.
    async fn send_user_message(&self, text: &str) -> Result<(), ProviderError>;

    /// Subscribe to call lifecycle events for this session.
    fn subscribe(&self) -> broadcast::Receiver<CallEvent>;

    /// Tear down the realtime connection.
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

/// Shared handle to a live realtime session.
pub type SessionHandle = Arc<dyn RealtimeSession>;

/// Trait for realtime media/model providers.
#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    /// Open a realtime session joining the given agent to a call.
    async fn open_agent_session(
        &self,
        meeting_id: &MeetingId,
        agent_user_id: &str,
        model: &str,
    ) -> Result<SessionHandle, ProviderError>;
}
