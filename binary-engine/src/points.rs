//! Point lot ledger
//!
//! Qualifying financial events (paid registrations, deposits) fan volume
//! points out to every binary ancestor of the triggering participant. The
//! whole fan-out commits atomically under the event key, so webhook retries
//! are exactly-once.

use crate::{
    error::{Error, Result},
    metrics::Metrics,
    plan::CompensationPlan,
    store::NetworkStore,
    types::{Participant, PointLot, Position},
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// Binary-chain walk depth guard (cycle protection)
const MAX_CHAIN_DEPTH: usize = 4096;

/// Point lot ledger
pub struct PointLedger {
    store: Arc<dyn NetworkStore>,
    plan: Arc<CompensationPlan>,
    metrics: Metrics,
}

impl PointLedger {
    /// Create a new point ledger
    pub fn new(store: Arc<dyn NetworkStore>, plan: Arc<CompensationPlan>) -> Self {
        Self {
            store,
            plan,
            metrics: Metrics::default(),
        }
    }

    /// Credit `volume` points up the binary chain of `participant_id`
    ///
    /// At each ancestor the points land on the side the walk came from.
    /// Inactive ancestors and the participant's direct sponsor are skipped.
    /// Returns the number of lots created; a replayed `event_key` returns
    /// zero without effect.
    pub fn fan_out(&self, event_key: &str, participant_id: Uuid, volume: Decimal) -> Result<usize> {
        if volume <= Decimal::ZERO {
            return Ok(0);
        }

        let participant = self
            .store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        let points = volume * self.plan.points_per_unit;
        let now = Utc::now();
        let expires_at = now + Duration::days(self.plan.point_expiry_days);

        let lots = self.collect_chain_lots(&participant, points, event_key, now, expires_at)?;

        if !self.store.record_fanout(event_key, &lots)? {
            tracing::debug!(
                event_key,
                participant_id = %participant_id,
                "Point fan-out replayed, skipping"
            );
            return Ok(0);
        }

        self.metrics.fanout_lots_total.inc_by(lots.len() as u64);
        tracing::info!(
            event_key,
            participant_id = %participant_id,
            points = %points,
            lots = lots.len(),
            "Point fan-out applied"
        );

        Ok(lots.len())
    }

    /// Unexpired point total for one leg
    pub fn side_points(
        &self,
        participant_id: Uuid,
        side: Position,
        now: DateTime<Utc>,
    ) -> Result<Decimal> {
        Ok(self
            .store
            .lots(participant_id, side)?
            .iter()
            .filter(|lot| !lot.is_expired(now))
            .map(|lot| lot.points)
            .sum())
    }

    /// Split one leg's queue into (live FIFO, expired)
    pub fn live_and_expired(
        &self,
        participant_id: Uuid,
        side: Position,
        now: DateTime<Utc>,
    ) -> Result<(Vec<PointLot>, Vec<PointLot>)> {
        Ok(self
            .store
            .lots(participant_id, side)?
            .into_iter()
            .partition(|lot| !lot.is_expired(now)))
    }

    fn collect_chain_lots(
        &self,
        participant: &Participant,
        points: Decimal,
        event_key: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Vec<PointLot>> {
        let mut lots = Vec::new();
        let mut cursor = participant.clone();
        let mut depth = 0usize;

        while let Some(parent_id) = cursor.parent_binary_id {
            if depth >= MAX_CHAIN_DEPTH {
                return Err(Error::Other(format!(
                    "Binary chain above {} exceeded {} levels",
                    participant.participant_id, MAX_CHAIN_DEPTH
                )));
            }

            // The side of the ancestor the walk came from
            let side = cursor.position.ok_or_else(|| {
                Error::Other(format!(
                    "Placed participant {} has no position",
                    cursor.participant_id
                ))
            })?;

            let ancestor = self
                .store
                .participant(parent_id)?
                .ok_or(Error::CorruptLink {
                    participant: cursor.participant_id,
                    missing: parent_id,
                })?;

            let is_direct_sponsor = participant.sponsor_id == Some(ancestor.participant_id);
            if ancestor.is_active && !is_direct_sponsor {
                lots.push(PointLot {
                    lot_id: Uuid::now_v7(),
                    participant_id: ancestor.participant_id,
                    side,
                    points,
                    source_event: event_key.to_string(),
                    created_at: now,
                    expires_at,
                });
            }

            cursor = ancestor;
            depth += 1;
        }

        Ok(lots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::PlacementEngine;
    use crate::store::MemoryNetworkStore;

    /// Build a 3-level left chain: root -> a -> b, all active, sponsored by root
    fn chain() -> (Arc<MemoryNetworkStore>, PointLedger, Uuid, Uuid, Uuid) {
        let store = Arc::new(MemoryNetworkStore::new());
        let plan = Arc::new(CompensationPlan::default());
        let ledger = PointLedger::new(store.clone(), plan);
        let placement = PlacementEngine::new(store.clone());

        let mut root = Participant::new(Uuid::new_v4(), None, "US");
        root.is_active = true;
        store.put_participant(&root).unwrap();

        let mut a = Participant::new(Uuid::new_v4(), Some(root.participant_id), "US");
        a.is_active = true;
        store.put_participant(&a).unwrap();

        let mut b = Participant::new(Uuid::new_v4(), Some(root.participant_id), "US");
        b.is_active = true;
        store.put_participant(&b).unwrap();

        placement
            .place(a.participant_id, root.participant_id, Position::Left)
            .unwrap();
        placement
            .place(b.participant_id, root.participant_id, Position::Left)
            .unwrap();

        (
            store,
            ledger,
            root.participant_id,
            a.participant_id,
            b.participant_id,
        )
    }

    #[test]
    fn test_fan_out_credits_ancestors_on_walked_side() {
        let (_store, ledger, root, a, b) = chain();
        let now = Utc::now();

        // b is placed under a (spillover); b's sponsor is root, so root is
        // skipped as direct sponsor but a collects left points
        let created = ledger.fan_out("deposit:tx-1", b, Decimal::from(100)).unwrap();
        assert_eq!(created, 1);

        assert_eq!(
            ledger.side_points(a, Position::Left, now).unwrap(),
            Decimal::from(100)
        );
        assert_eq!(
            ledger.side_points(root, Position::Left, now).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_fan_out_skips_inactive_ancestor() {
        let (store, ledger, _root, a, b) = chain();
        let now = Utc::now();

        let mut mid = store.participant(a).unwrap().unwrap();
        mid.is_active = false;
        store.put_participant(&mid).unwrap();

        ledger.fan_out("deposit:tx-2", b, Decimal::from(100)).unwrap();
        assert_eq!(
            ledger.side_points(a, Position::Left, now).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_fan_out_exactly_once_per_event() {
        let (_store, ledger, _root, a, b) = chain();
        let now = Utc::now();

        assert_eq!(
            ledger.fan_out("deposit:tx-3", b, Decimal::from(50)).unwrap(),
            1
        );
        assert_eq!(
            ledger.fan_out("deposit:tx-3", b, Decimal::from(50)).unwrap(),
            0
        );

        assert_eq!(
            ledger.side_points(a, Position::Left, now).unwrap(),
            Decimal::from(50)
        );
    }

    #[test]
    fn test_zero_volume_noop() {
        let (_store, ledger, _root, _a, b) = chain();
        assert_eq!(
            ledger.fan_out("deposit:tx-4", b, Decimal::ZERO).unwrap(),
            0
        );
    }

    #[test]
    fn test_expired_lots_excluded_from_side_points() {
        let (_store, ledger, _root, a, b) = chain();

        ledger.fan_out("deposit:tx-5", b, Decimal::from(75)).unwrap();

        let far_future = Utc::now() + chrono::Duration::days(365);
        assert_eq!(
            ledger.side_points(a, Position::Left, far_future).unwrap(),
            Decimal::ZERO
        );

        let (live, expired) = ledger
            .live_and_expired(a, Position::Left, far_future)
            .unwrap();
        assert!(live.is_empty());
        assert_eq!(expired.len(), 1);
    }
}
