//! Local allocator (component B, spec §3.3, §3.5).
//!
//! Hands out fresh SSA-like local identifiers. `Input` and `Data` are
//! reserved at indices 0 and 1 respectively; every other local is allocated
//! fresh in increasing order, which is what gives planner output its
//! deterministic numbering (spec Invariant 1).

use serde::{Deserialize, Serialize};

/// A small dense integer denoting a runtime-assigned slot in the execution
/// frame.
pub type Local = u32;

/// Reserved local for the `input` root document.
pub const INPUT: Local = 0;
/// Reserved local for the `data` root document.
pub const DATA: Local = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAllocator {
    next: Local,
}

impl Default for LocalAllocator {
    fn default() -> Self {
        LocalAllocator { next: DATA + 1 }
    }
}

impl LocalAllocator {
    pub fn new() -> Self {
        LocalAllocator::default()
    }

    /// Allocate a fresh local, guaranteed distinct from every previously
    /// allocated local (including the reserved `INPUT`/`DATA` pair).
    pub fn fresh(&mut self) -> Local {
        let l = self.next;
        self.next += 1;
        l
    }

    /// How many locals have been handed out so far, including the reserved
    /// pair.
    pub fn count(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_locals_are_stable() {
        assert_eq!(INPUT, 0);
        assert_eq!(DATA, 1);
    }

    #[test]
    fn fresh_locals_are_distinct_and_increasing() {
        let mut alloc = LocalAllocator::new();
        let a = alloc.fresh();
        let b = alloc.fresh();
        let c = alloc.fresh();
        assert!(a < b && b < c);
        assert!(a > DATA);
    }

    #[test]
    fn count_tracks_allocations() {
        let mut alloc = LocalAllocator::new();
        alloc.fresh();
        alloc.fresh();
        assert_eq!(alloc.count(), DATA + 1 + 2);
    }
}
