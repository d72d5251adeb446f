//! Meeting store implementations.

pub mod memory;

pub use memory::MemoryMeetingStore;
