//! Agent realtime-session lifecycle management.
//!
//! Provides:
//! - `SessionRegistry` - Per-meeting session state (absent / connecting / active)
//! - `AgentSessionManager` - Connect, teardown, and status orchestration
//! - Store and provider implementations (memory, loopback)

pub mod lifecycle;
pub mod manager;
pub mod provider;
pub mod registry;
pub mod store;

pub use manager::{AgentSessionManager, ManagerConfig};
pub use registry::SessionRegistry;
