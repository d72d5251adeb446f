//! In-memory meeting store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use call_agents_core::{
    AgentPersona, Meeting, MeetingId, MeetingStatus, MeetingWithAgent, MeetingStore, StatusChange,
    StoreError,
};

struct MeetingRecord {
    meeting: Meeting,
    agent: Option<AgentPersona>,
}

/// In-memory store implementation.
///
/// Useful for development and single-process deployments.
/// Data is lost on restart.
pub struct MemoryMeetingStore {
    records: RwLock<HashMap<MeetingId, MeetingRecord>>,
}

impl MemoryMeetingStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a meeting and its agent configuration.
    pub fn insert(&self, meeting: Meeting, agent: Option<AgentPersona>) {
        if let Ok(mut records) = self.records.write() {
            records.insert(meeting.id.clone(), MeetingRecord { meeting, agent });
        }
    }

    /// Snapshot of a stored meeting.
    #[must_use]
    pub fn get(&self, id: &MeetingId) -> Option<Meeting> {
        self.records
            .read()
            .ok()?
            .get(id)
            .map(|r| r.meeting.clone())
    }
}

impl Default for MemoryMeetingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeetingStore for MemoryMeetingStore {
    async fn get_meeting_with_agent(
        &self,
        id: &MeetingId,
    ) -> Result<Option<MeetingWithAgent>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(id)
            .map(|r| MeetingWithAgent {
                meeting: r.meeting.clone(),
                agent: r.agent.clone(),
            }))
    }

    async fn set_meeting_status(
        &self,
        id: &MeetingId,
        change: StatusChange,
    ) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        record.meeting.status = change.status;
        if change.started_at.is_some() {
            record.meeting.started_at = change.started_at;
        }
        if change.ended_at.is_some() {
            record.meeting.ended_at = change.ended_at;
        }

        Ok(())
    }

    async fn list_by_status(&self, status: MeetingStatus) -> Result<Vec<Meeting>, StoreError> {
        Ok(self
            .records
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .values()
            .filter(|r| r.meeting.status == status)
            .map(|r| r.meeting.clone())
            .collect())
    }
}
