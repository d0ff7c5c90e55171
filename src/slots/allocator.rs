//! # SlotAllocator: maps enabled programs to dense slot numbers.
//!
//! Pure function of its inputs; no filesystem access. The caller lists the
//! existing slots and clears the ones reported as stale.
//!
//! ## Rules
//! - Only enabled programs get a slot
//! - Sorted by `(order ascending, name ascending)`, missing order last
//! - Slots are exactly `0..k` for `k` enabled programs
//! - `stale` lists every existing slot `>= k`, ascending and deduplicated
//!
//! ## Example
//! ```text
//! a.star {order: 1}  b.star {order: 0}  c.star {disabled}   existing: [0, 1, 2]
//!
//!   slot 0 ← b.star
//!   slot 1 ← a.star
//!   stale  = [2]
//! ```

use std::sync::Arc;

use serde::Serialize;

use crate::programs::ProgramConfig;

/// One program bound to one slot within a generation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlotAssignment {
    pub slot: u32,
    pub program: Arc<str>,
}

/// Result of one allocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Allocation {
    /// Ordered by slot.
    pub assignments: Vec<SlotAssignment>,
    /// Existing slots with no owner in this generation.
    pub stale: Vec<u32>,
}

/// Deterministic slot allocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotAllocator;

impl SlotAllocator {
    /// Computes the assignments for `programs` and the slots to reclaim.
    pub fn compute(programs: &[ProgramConfig], existing: &[u32]) -> Allocation {
        let mut enabled: Vec<&ProgramConfig> = programs.iter().filter(|p| p.enabled).collect();
        enabled.sort_by(|a, b| a.slot_order(b));

        let assignments: Vec<SlotAssignment> = enabled
            .into_iter()
            .zip(0u32..)
            .map(|(p, slot)| SlotAssignment {
                slot,
                program: Arc::from(p.name.as_str()),
            })
            .collect();

        let k = assignments.len() as u32;
        let mut stale: Vec<u32> = existing.iter().copied().filter(|s| *s >= k).collect();
        stale.sort_unstable();
        stale.dedup();

        Allocation { assignments, stale }
    }
}
