//! Binary placement engine
//!
//! Inserts a new participant into the binary tree under a sponsor using
//! spillover: walk down the chosen side from the sponsor until an empty
//! slot is found, however deep that is. Placement is terminal and
//! idempotent; concurrent placements under one sponsor serialize through
//! optimistic retry on slot conflicts.

use crate::{
    error::{Error, Result},
    metrics::Metrics,
    store::NetworkStore,
    types::{DescendantEntry, Participant, Position},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Spillover walk depth guard (cycle protection, not a business limit)
const MAX_WALK_DEPTH: usize = 4096;

/// Sponsor-chain index depth guard
const MAX_SPONSOR_DEPTH: u32 = 512;

/// Outcome of a placement attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// Participant was linked under this binary parent
    Placed {
        /// The parent whose slot was taken
        parent_id: Uuid,
        /// Side under the parent
        side: Position,
        /// Levels walked below the sponsor
        depth: usize,
    },
    /// Participant was already placed; nothing changed
    AlreadyPlaced,
}

/// Binary placement engine
pub struct PlacementEngine {
    store: Arc<dyn NetworkStore>,
    max_retries: usize,
    metrics: Metrics,
}

impl PlacementEngine {
    /// Create a new placement engine
    pub fn new(store: Arc<dyn NetworkStore>) -> Self {
        Self {
            store,
            max_retries: 5,
            metrics: Metrics::default(),
        }
    }

    /// Override the conflict retry budget
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Place a participant under their sponsor on the given side
    ///
    /// A second call for an already-placed participant is a no-op.
    pub fn place(
        &self,
        participant_id: Uuid,
        sponsor_id: Uuid,
        side: Position,
    ) -> Result<PlacementOutcome> {
        let participant = self
            .store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        if participant.is_placed() {
            tracing::debug!(
                participant_id = %participant_id,
                "Placement skipped, participant already placed"
            );
            return Ok(PlacementOutcome::AlreadyPlaced);
        }

        let mut last_conflict = String::new();
        for attempt in 0..=self.max_retries {
            // Fresh walk each attempt: a concurrent placement may have
            // filled the slot we computed
            let (parent_id, depth) = self.find_open_slot(sponsor_id, side)?;
            let descendants = self.sponsor_chain_index(&participant)?;

            match self
                .store
                .commit_placement(&participant, parent_id, side, &descendants)
            {
                Ok(()) => {
                    self.metrics.placements_total.inc();
                    tracing::info!(
                        participant_id = %participant_id,
                        sponsor_id = %sponsor_id,
                        parent_id = %parent_id,
                        side = %side,
                        depth,
                        "Participant placed"
                    );
                    return Ok(PlacementOutcome::Placed {
                        parent_id,
                        side,
                        depth,
                    });
                }
                Err(Error::Conflict(msg)) => {
                    tracing::debug!(
                        participant_id = %participant_id,
                        attempt,
                        "Placement conflict, retrying with fresh reads"
                    );
                    last_conflict = msg;
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::RetryExhausted(format!(
            "Placement of {} under {}: {}",
            participant_id, sponsor_id, last_conflict
        )))
    }

    /// Walk down the fixed side from the sponsor to the first empty slot
    fn find_open_slot(&self, sponsor_id: Uuid, side: Position) -> Result<(Uuid, usize)> {
        let mut cursor = self
            .store
            .participant(sponsor_id)?
            .ok_or(Error::ParticipantNotFound(sponsor_id))?;
        let mut depth = 0usize;

        while let Some(child_id) = cursor.child(side) {
            if depth >= MAX_WALK_DEPTH {
                return Err(Error::Other(format!(
                    "Spillover walk below {} exceeded {} levels",
                    sponsor_id, MAX_WALK_DEPTH
                )));
            }
            cursor = self.store.participant(child_id)?.ok_or(Error::CorruptLink {
                participant: cursor.participant_id,
                missing: child_id,
            })?;
            depth += 1;
        }

        Ok((cursor.participant_id, depth))
    }

    /// Descendant index rows for every ancestor up the sponsor chain
    fn sponsor_chain_index(&self, participant: &Participant) -> Result<Vec<DescendantEntry>> {
        let now = Utc::now();
        let mut rows = Vec::new();
        let mut cursor = participant.sponsor_id;
        let mut depth = 1u32;

        while let Some(ancestor_id) = cursor {
            if depth > MAX_SPONSOR_DEPTH {
                tracing::warn!(
                    participant_id = %participant.participant_id,
                    "Sponsor chain exceeded {} levels, truncating index",
                    MAX_SPONSOR_DEPTH
                );
                break;
            }
            let ancestor = self
                .store
                .participant(ancestor_id)?
                .ok_or(Error::CorruptLink {
                    participant: participant.participant_id,
                    missing: ancestor_id,
                })?;

            rows.push(DescendantEntry {
                ancestor_id,
                descendant_id: participant.participant_id,
                depth,
                created_at: now,
            });

            cursor = ancestor.sponsor_id;
            depth += 1;
        }

        Ok(rows)
    }
}
