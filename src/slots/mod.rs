//! # Slots: numbered artifact positions consumed by the playback process.
//!
//! - [`SlotAllocator`] decides which program owns which slot in a generation.
//! - [`ArtifactPublisher`] atomically writes and clears slot artifacts.

mod allocator;
mod publisher;

pub use allocator::{Allocation, SlotAllocator, SlotAssignment};
pub use publisher::ArtifactPublisher;
