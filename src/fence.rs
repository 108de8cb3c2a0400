//! Fence: opaque handle tying an async compose submission to a later wait.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_FENCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceState {
    Pending,
    Signaled,
}

/// Owned by the caller once returned from `compose`. Consumed exactly once
/// by `wait_fence` (or implicitly by `flush`, which drains every pending
/// fence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fence {
    pub id: u64,
}

impl Fence {
    pub fn new() -> Self {
        Self {
            id: NEXT_FENCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for Fence {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks outstanding fences for one engine instance so `flush` can drain
/// them and a stale `wait_fence` call can be rejected with `Closed`.
#[derive(Default)]
pub struct PendingFences {
    pending: std::collections::HashSet<u64>,
}

impl PendingFences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, fence: Fence) {
        self.pending.insert(fence.id);
    }

    /// Moves `fence` to `Signaled`, removing it from the pending set.
    /// Returns `false` if the fence was not outstanding (already signaled,
    /// or never issued by this engine).
    pub fn signal(&mut self, fence: Fence) -> bool {
        self.pending.remove(&fence.id)
    }

    pub fn is_pending(&self, fence: Fence) -> bool {
        self.pending.contains(&fence.id)
    }

    pub fn drain_all(&mut self) -> Vec<Fence> {
        self.pending.drain().map(|id| Fence { id }).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_ids_are_unique() {
        let a = Fence::new();
        let b = Fence::new();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn signal_removes_from_pending_set() {
        let mut pending = PendingFences::new();
        let f = Fence::new();
        pending.insert(f);
        assert!(pending.is_pending(f));
        assert!(pending.signal(f));
        assert!(!pending.is_pending(f));
    }

    #[test]
    fn signalling_unknown_fence_returns_false() {
        let mut pending = PendingFences::new();
        assert!(!pending.signal(Fence::new()));
    }

    #[test]
    fn drain_all_empties_pending_set() {
        let mut pending = PendingFences::new();
        for _ in 0..4 {
            pending.insert(Fence::new());
        }
        assert_eq!(pending.len(), 4);
        let drained = pending.drain_all();
        assert_eq!(drained.len(), 4);
        assert!(pending.is_empty());
    }
}
