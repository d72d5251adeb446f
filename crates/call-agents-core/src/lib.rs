//! Core abstractions for AI agent call session management.
//!
//! This crate provides the fundamental building blocks:
//! - `Meeting` / `MeetingStatus` - Persisted meeting lifecycle
//! - `AgentPersona` - Configured AI persona attachable to a meeting
//! - `CallEvent` - Call lifecycle events emitted by session handles
//! - Store and realtime-provider traits

pub mod agent;
pub mod events;
pub mod meeting;
pub mod traits;

pub use agent::{AgentPersona, SessionUpdate, TurnDetection};
pub use events::{AGENT_USER_PREFIX, CallEvent, Participant};
pub use meeting::{Meeting, MeetingId, MeetingStatus, StatusChange};
pub use traits::{
    MeetingStore, MeetingWithAgent, ProviderError, RealtimeProvider, RealtimeSession,
    SessionHandle, StoreError,
};
