//! Per-thread ledger of native-owned resources
//!
//! Every guard that takes ownership of memory crossing the boundary notes the
//! acquisition here and notes the release when it runs the matching
//! deallocation. Calls are single-threaded, so a thread-local ledger gives
//! exact counts for one call context.

use serde::Serialize;
use std::cell::Cell;

/// What kind of resource changed hands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Buffer handed out by the host allocator callback
    CallbackBuffer,
    /// Buffer allocated by native code and returned by pointer
    NativeBuffer,
    /// Struct holding native allocations (strings, error payloads)
    NativeStruct,
}

/// Counts at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    pub acquired: u64,
    pub released: u64,
}

impl LedgerSnapshot {
    /// Resources acquired but not yet released
    pub fn outstanding(&self) -> i64 {
        self.acquired as i64 - self.released as i64
    }

    /// Activity since an earlier snapshot
    pub fn since(&self, earlier: &LedgerSnapshot) -> LedgerSnapshot {
        LedgerSnapshot {
            acquired: self.acquired - earlier.acquired,
            released: self.released - earlier.released,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released
    }
}

thread_local! {
    static LEDGER: Cell<LedgerSnapshot> = const {
        Cell::new(LedgerSnapshot { acquired: 0, released: 0 })
    };
}

pub(crate) fn note_acquired(kind: ResourceKind) {
    LEDGER.with(|ledger| {
        let mut counts = ledger.get();
        counts.acquired += 1;
        ledger.set(counts);
    });
    tracing::trace!(?kind, "acquired");
}

pub(crate) fn note_released(kind: ResourceKind) {
    LEDGER.with(|ledger| {
        let mut counts = ledger.get();
        counts.released += 1;
        ledger.set(counts);
    });
    tracing::trace!(?kind, "released");
}

/// Current counts for the calling thread
pub fn snapshot() -> LedgerSnapshot {
    LEDGER.with(Cell::get)
}
