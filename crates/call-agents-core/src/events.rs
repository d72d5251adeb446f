//! Call lifecycle events emitted by realtime session handles.

use serde::{Deserialize, Serialize};

/// Prefix identifying agent users in call participant lists.
pub const AGENT_USER_PREFIX: &str = "ai-";

/// A participant currently in the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Call-level user identifier.
    pub user_id: String,
}

impl Participant {
    /// Create a participant.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Whether this participant is a human rather than an agent.
    #[must_use]
    pub fn is_human(&self) -> bool {
        !self.user_id.starts_with(AGENT_USER_PREFIX)
    }
}

/// Lifecycle event delivered over a session handle's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// The realtime connection failed.
    Error { message: String },
    /// The call ended.
    CallEnded,
    /// A participant left; payload lists everyone still in the call.
    ParticipantLeft { participants: Vec<Participant> },
}
