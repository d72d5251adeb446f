//! Meeting records and lifecycle status.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Meeting identifier.
pub type MeetingId = String;

/// Meeting lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    /// Meeting is scheduled but has not started.
    Upcoming,
    /// An agent is connected and the call is live.
    Active,
    /// The call ended.
    Completed,
    /// Post-call processing (transcription, summary) is running.
    Processing,
    /// Meeting was cancelled before it started.
    Cancelled,
}

/// Persisted meeting data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    /// Unique meeting identifier.
    pub id: MeetingId,
    /// Display name.
    pub name: String,
    /// Agent configured for this meeting, if any.
    pub agent_id: Option<String>,
    /// Current lifecycle status.
    pub status: MeetingStatus,
    /// When the call went live (Unix epoch seconds).
    pub started_at: Option<i64>,
    /// When the call ended.
    pub ended_at: Option<i64>,
}

impl Meeting {
    /// Create an upcoming meeting.
    #[must_use]
    pub fn new(id: impl Into<MeetingId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            agent_id: None,
            status: MeetingStatus::Upcoming,
            started_at: None,
            ended_at: None,
        }
    }

    /// Set the configured agent.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }
}

/// A status transition together with the timestamps it stamps.
///
/// Timestamps that are `None` are left untouched on the stored meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    /// New status.
    pub status: MeetingStatus,
    /// `started_at` stamp, if this transition sets one.
    pub started_at: Option<i64>,
    /// `ended_at` stamp, if this transition sets one.
    pub ended_at: Option<i64>,
}

impl StatusChange {
    /// Transition to `active`, stamping the start time.
    #[must_use]
    pub const fn active(started_at: i64) -> Self {
        Self {
            status: MeetingStatus::Active,
            started_at: Some(started_at),
            ended_at: None,
        }
    }

    /// Transition to `completed`, stamping the end time.
    #[must_use]
    pub const fn completed(ended_at: i64) -> Self {
        Self {
            status: MeetingStatus::Completed,
            started_at: None,
            ended_at: Some(ended_at),
        }
    }
}

/// Current Unix timestamp in seconds.
#[must_use]
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
