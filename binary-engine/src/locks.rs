//! Per-participant write serialization
//!
//! Cap counters, rank fields and membership flags are read-modify-write on
//! the participant record. Every writer must hold that participant's lock;
//! the bond, rank and gateway paths share one registry so their updates
//! cannot interleave.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Keyed mutex registry shared by every participant writer
#[derive(Default)]
pub struct ParticipantLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl ParticipantLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The mutex guarding one participant's record
    pub fn lock(&self, participant_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(participant_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
