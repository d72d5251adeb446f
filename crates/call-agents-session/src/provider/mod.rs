//! Realtime provider implementations.

pub mod loopback;

pub use loopback::{LoopbackProvider, LoopbackSession};
