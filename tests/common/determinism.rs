//! Deterministic uids for reproducible bundle paths and namespaces.

use std::sync::atomic::{AtomicU64, Ordering};

use relocator::{Result, UidSource};

/// Hands out `t0001`, `t0002`, ... in order.
pub struct SequentialUid {
    counter: AtomicU64,
}

impl SequentialUid {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(n: u64) -> Self {
        Self {
            counter: AtomicU64::new(n),
        }
    }
}

impl Default for SequentialUid {
    fn default() -> Self {
        Self::new()
    }
}

impl UidSource for SequentialUid {
    fn next_uid(&self) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("t{n:04}"))
    }
}
