//! Repository interface for the compensation network
//!
//! The placement, matching, bond and rank engines are written against the
//! `NetworkStore` trait so their semantics are testable against an
//! in-memory store. The multi-record operations (`commit_placement`,
//! `record_fanout`, `commit_match`, `append_bond`) are atomic: either every
//! record in the unit commits or none does.

use crate::{
    error::{Error, Result},
    types::{BondLedgerEntry, DescendantEntry, MatchObligation, Participant, PointLot, Position},
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Storage abstraction for participants, point lots and the bond ledger
pub trait NetworkStore: Send + Sync {
    /// Look up a participant
    fn participant(&self, id: Uuid) -> Result<Option<Participant>>;

    /// Upsert a participant record
    fn put_participant(&self, participant: &Participant) -> Result<()>;

    /// All participant IDs (batch sweeps)
    fn participant_ids(&self) -> Result<Vec<Uuid>>;

    /// Atomically link a child into the tree: set the child's parent and
    /// position, occupy the parent's slot, bump the sponsor's direct count
    /// and append the sponsor-chain descendant index rows.
    ///
    /// Fails with `Conflict` if the slot was taken since the caller's walk.
    fn commit_placement(
        &self,
        child: &Participant,
        parent_id: Uuid,
        side: Position,
        descendants: &[DescendantEntry],
    ) -> Result<()>;

    /// Atomically append a point fan-out, exactly once per event key.
    /// Returns `false` without effect when the event was already processed.
    fn record_fanout(&self, event_key: &str, lots: &[PointLot]) -> Result<bool>;

    /// Whether an event key has been processed (read-only)
    fn event_processed(&self, event_key: &str) -> Result<bool>;

    /// Atomically upsert a participant together with an event marker,
    /// exactly once per key. Returns `false` without effect on replay.
    fn activate_membership(&self, participant: &Participant, event_key: &str) -> Result<bool>;

    /// Point lots for one leg, oldest first
    fn lots(&self, participant_id: Uuid, side: Position) -> Result<Vec<PointLot>>;

    /// Atomically apply a matching consumption: delete fully consumed and
    /// purged lots, rewrite partially consumed boundary lots and record the
    /// unsettled match obligation in the same commit
    fn commit_match(
        &self,
        participant_id: Uuid,
        removed: &[PointLot],
        updated: &[PointLot],
        obligation: Option<&MatchObligation>,
    ) -> Result<()>;

    /// Match obligations whose binary bond has not settled yet
    fn open_obligations(&self, participant_id: Uuid) -> Result<Vec<MatchObligation>>;

    /// Delete a settled match obligation
    fn settle_obligation(&self, participant_id: Uuid, match_id: Uuid) -> Result<()>;

    /// Atomically append a bond audit entry together with the updated
    /// participant (cap counters, bond totals, membership flags). Entries
    /// carrying a `source_key` are also indexed by that key.
    fn append_bond(&self, entry: &BondLedgerEntry, participant: &Participant) -> Result<()>;

    /// Bond entry previously recorded under a source key, if any
    fn bond_entry_for_key(&self, source_key: &str) -> Result<Option<BondLedgerEntry>>;

    /// Bond audit trail for a participant, oldest first
    fn bond_entries(&self, participant_id: Uuid) -> Result<Vec<BondLedgerEntry>>;

    /// Sponsor-chain descendants of a participant (reporting)
    fn descendants(&self, ancestor_id: Uuid) -> Result<Vec<DescendantEntry>>;
}

type LotKey = (i64, Uuid);

#[derive(Default)]
struct MemoryInner {
    participants: HashMap<Uuid, Participant>,
    /// (participant, side) -> created-nanos-ordered lots (FIFO)
    lots: HashMap<(Uuid, Position), BTreeMap<LotKey, PointLot>>,
    bonds: HashMap<Uuid, Vec<BondLedgerEntry>>,
    bonds_by_key: HashMap<String, BondLedgerEntry>,
    obligations: HashMap<Uuid, BTreeMap<Uuid, MatchObligation>>,
    descendants: HashMap<Uuid, Vec<DescendantEntry>>,
    processed_events: HashSet<String>,
}

/// In-memory network store (tests and embedded tooling)
#[derive(Default)]
pub struct MemoryNetworkStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryNetworkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn lot_key(lot: &PointLot) -> LotKey {
    (
        lot.created_at.timestamp_nanos_opt().unwrap_or(0),
        lot.lot_id,
    )
}

impl NetworkStore for MemoryNetworkStore {
    fn participant(&self, id: Uuid) -> Result<Option<Participant>> {
        Ok(self.inner.read().participants.get(&id).cloned())
    }

    fn put_participant(&self, participant: &Participant) -> Result<()> {
        self.inner
            .write()
            .participants
            .insert(participant.participant_id, participant.clone());
        Ok(())
    }

    fn participant_ids(&self) -> Result<Vec<Uuid>> {
        Ok(self.inner.read().participants.keys().copied().collect())
    }

    fn commit_placement(
        &self,
        child: &Participant,
        parent_id: Uuid,
        side: Position,
        descendants: &[DescendantEntry],
    ) -> Result<()> {
        let mut inner = self.inner.write();

        let parent = inner
            .participants
            .get(&parent_id)
            .ok_or(Error::ParticipantNotFound(parent_id))?;
        if parent.child(side).is_some() {
            return Err(Error::Conflict(format!(
                "Slot {} of {} already occupied",
                side, parent_id
            )));
        }

        let mut parent = parent.clone();
        parent.set_child(side, child.participant_id);

        let mut child = child.clone();
        child.parent_binary_id = Some(parent_id);
        child.position = Some(side);

        // Sponsor direct count; the sponsor may also be the binary parent
        if let Some(sponsor_id) = child.sponsor_id {
            if sponsor_id == parent_id {
                parent.direct_count += 1;
            } else if let Some(sponsor) = inner.participants.get(&sponsor_id) {
                let mut sponsor = sponsor.clone();
                sponsor.direct_count += 1;
                inner.participants.insert(sponsor_id, sponsor);
            }
        }

        inner.participants.insert(parent_id, parent);
        inner.participants.insert(child.participant_id, child);

        for row in descendants {
            inner
                .descendants
                .entry(row.ancestor_id)
                .or_default()
                .push(row.clone());
        }

        Ok(())
    }

    fn record_fanout(&self, event_key: &str, lots: &[PointLot]) -> Result<bool> {
        let mut inner = self.inner.write();

        if inner.processed_events.contains(event_key) {
            return Ok(false);
        }

        for lot in lots {
            inner
                .lots
                .entry((lot.participant_id, lot.side))
                .or_default()
                .insert(lot_key(lot), lot.clone());
        }
        inner.processed_events.insert(event_key.to_string());

        Ok(true)
    }

    fn event_processed(&self, event_key: &str) -> Result<bool> {
        Ok(self.inner.read().processed_events.contains(event_key))
    }

    fn activate_membership(&self, participant: &Participant, event_key: &str) -> Result<bool> {
        let mut inner = self.inner.write();

        if inner.processed_events.contains(event_key) {
            return Ok(false);
        }

        inner
            .participants
            .insert(participant.participant_id, participant.clone());
        inner.processed_events.insert(event_key.to_string());

        Ok(true)
    }

    fn lots(&self, participant_id: Uuid, side: Position) -> Result<Vec<PointLot>> {
        Ok(self
            .inner
            .read()
            .lots
            .get(&(participant_id, side))
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn commit_match(
        &self,
        participant_id: Uuid,
        removed: &[PointLot],
        updated: &[PointLot],
        obligation: Option<&MatchObligation>,
    ) -> Result<()> {
        let mut inner = self.inner.write();

        for lot in removed {
            if let Some(queue) = inner.lots.get_mut(&(participant_id, lot.side)) {
                queue.remove(&lot_key(lot));
            }
        }
        for lot in updated {
            inner
                .lots
                .entry((participant_id, lot.side))
                .or_default()
                .insert(lot_key(lot), lot.clone());
        }
        if let Some(ob) = obligation {
            inner
                .obligations
                .entry(participant_id)
                .or_default()
                .insert(ob.match_id, ob.clone());
        }

        Ok(())
    }

    fn open_obligations(&self, participant_id: Uuid) -> Result<Vec<MatchObligation>> {
        Ok(self
            .inner
            .read()
            .obligations
            .get(&participant_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }

    fn settle_obligation(&self, participant_id: Uuid, match_id: Uuid) -> Result<()> {
        if let Some(open) = self.inner.write().obligations.get_mut(&participant_id) {
            open.remove(&match_id);
        }
        Ok(())
    }

    fn append_bond(&self, entry: &BondLedgerEntry, participant: &Participant) -> Result<()> {
        let mut inner = self.inner.write();

        inner
            .bonds
            .entry(entry.participant_id)
            .or_default()
            .push(entry.clone());
        if let Some(key) = &entry.source_key {
            inner.bonds_by_key.insert(key.clone(), entry.clone());
        }
        inner
            .participants
            .insert(participant.participant_id, participant.clone());

        Ok(())
    }

    fn bond_entry_for_key(&self, source_key: &str) -> Result<Option<BondLedgerEntry>> {
        Ok(self.inner.read().bonds_by_key.get(source_key).cloned())
    }

    fn bond_entries(&self, participant_id: Uuid) -> Result<Vec<BondLedgerEntry>> {
        Ok(self
            .inner
            .read()
            .bonds
            .get(&participant_id)
            .cloned()
            .unwrap_or_default())
    }

    fn descendants(&self, ancestor_id: Uuid) -> Result<Vec<DescendantEntry>> {
        Ok(self
            .inner
            .read()
            .descendants
            .get(&ancestor_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn lot(participant: Uuid, side: Position, points: i64) -> PointLot {
        PointLot {
            lot_id: Uuid::now_v7(),
            participant_id: participant,
            side,
            points: Decimal::from(points),
            source_event: "test".to_string(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::days(60),
        }
    }

    #[test]
    fn test_participant_roundtrip() {
        let store = MemoryNetworkStore::new();
        let p = Participant::new(Uuid::new_v4(), None, "US");

        store.put_participant(&p).unwrap();
        let loaded = store.participant(p.participant_id).unwrap().unwrap();
        assert_eq!(loaded.participant_id, p.participant_id);
        assert!(store.participant(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_commit_placement_links_both_sides() {
        let store = MemoryNetworkStore::new();
        let sponsor = Participant::new(Uuid::new_v4(), None, "US");
        let child = Participant::new(Uuid::new_v4(), Some(sponsor.participant_id), "US");
        store.put_participant(&sponsor).unwrap();
        store.put_participant(&child).unwrap();

        store
            .commit_placement(&child, sponsor.participant_id, Position::Left, &[])
            .unwrap();

        let parent = store.participant(sponsor.participant_id).unwrap().unwrap();
        assert_eq!(parent.left_child_id, Some(child.participant_id));
        assert_eq!(parent.direct_count, 1);

        let placed = store.participant(child.participant_id).unwrap().unwrap();
        assert_eq!(placed.parent_binary_id, Some(sponsor.participant_id));
        assert_eq!(placed.position, Some(Position::Left));
    }

    #[test]
    fn test_commit_placement_conflict_on_occupied_slot() {
        let store = MemoryNetworkStore::new();
        let sponsor = Participant::new(Uuid::new_v4(), None, "US");
        let a = Participant::new(Uuid::new_v4(), Some(sponsor.participant_id), "US");
        let b = Participant::new(Uuid::new_v4(), Some(sponsor.participant_id), "US");
        store.put_participant(&sponsor).unwrap();
        store.put_participant(&a).unwrap();
        store.put_participant(&b).unwrap();

        store
            .commit_placement(&a, sponsor.participant_id, Position::Left, &[])
            .unwrap();
        let result = store.commit_placement(&b, sponsor.participant_id, Position::Left, &[]);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_fanout_exactly_once() {
        let store = MemoryNetworkStore::new();
        let p = Uuid::new_v4();
        let lots = vec![lot(p, Position::Left, 100)];

        assert!(store.record_fanout("deposit:tx-1", &lots).unwrap());
        assert!(!store.record_fanout("deposit:tx-1", &lots).unwrap());

        assert_eq!(store.lots(p, Position::Left).unwrap().len(), 1);
    }

    #[test]
    fn test_lots_fifo_order() {
        let store = MemoryNetworkStore::new();
        let p = Uuid::new_v4();

        let mut first = lot(p, Position::Right, 10);
        first.created_at = Utc::now() - chrono::Duration::hours(2);
        let second = lot(p, Position::Right, 20);

        store.record_fanout("e1", &[second.clone()]).unwrap();
        store.record_fanout("e2", &[first.clone()]).unwrap();

        let lots = store.lots(p, Position::Right).unwrap();
        assert_eq!(lots[0].lot_id, first.lot_id);
        assert_eq!(lots[1].lot_id, second.lot_id);
    }

    #[test]
    fn test_commit_match_removes_and_rewrites() {
        let store = MemoryNetworkStore::new();
        let p = Uuid::new_v4();
        let a = lot(p, Position::Left, 100);
        let b = lot(p, Position::Left, 50);
        store.record_fanout("e1", &[a.clone(), b.clone()]).unwrap();

        let mut partial = b.clone();
        partial.points = Decimal::from(20);
        store.commit_match(p, &[a], &[partial], None).unwrap();

        let lots = store.lots(p, Position::Left).unwrap();
        assert_eq!(lots.len(), 1);
        assert_eq!(lots[0].points, Decimal::from(20));
    }

    #[test]
    fn test_activate_membership_exactly_once() {
        let store = MemoryNetworkStore::new();
        let mut p = Participant::new(Uuid::new_v4(), None, "US");
        store.put_participant(&p).unwrap();

        p.is_active = true;
        p.cap_limit = Decimal::from(300);
        assert!(store.activate_membership(&p, "membership:t1:activate").unwrap());
        assert!(store.event_processed("membership:t1:activate").unwrap());

        // A replay with different fields leaves the record alone
        p.cap_limit = Decimal::from(999);
        assert!(!store.activate_membership(&p, "membership:t1:activate").unwrap());

        let loaded = store.participant(p.participant_id).unwrap().unwrap();
        assert!(loaded.is_active);
        assert_eq!(loaded.cap_limit, Decimal::from(300));
    }

    #[test]
    fn test_obligation_recorded_with_match_and_settled() {
        let store = MemoryNetworkStore::new();
        let p = Uuid::new_v4();
        let consumed = lot(p, Position::Left, 100);
        store.record_fanout("e1", &[consumed.clone()]).unwrap();

        let ob = MatchObligation {
            match_id: Uuid::now_v7(),
            participant_id: p,
            matched_points: Decimal::from(100),
            created_at: Utc::now(),
        };
        store.commit_match(p, &[consumed], &[], Some(&ob)).unwrap();

        let open = store.open_obligations(p).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].matched_points, Decimal::from(100));

        store.settle_obligation(p, ob.match_id).unwrap();
        assert!(store.open_obligations(p).unwrap().is_empty());
    }

    #[test]
    fn test_bond_entry_indexed_by_source_key() {
        let store = MemoryNetworkStore::new();
        let p = Participant::new(Uuid::new_v4(), None, "US");
        store.put_participant(&p).unwrap();

        let entry = BondLedgerEntry {
            bond_id: Uuid::now_v7(),
            participant_id: p.participant_id,
            bond_type: crate::types::BondType::Direct,
            gross: Decimal::from(10),
            credited: Decimal::from(10),
            lost: Decimal::ZERO,
            triggered_by: None,
            source_key: Some("membership:t1:direct".to_string()),
            metadata: Default::default(),
            created_at: Utc::now(),
        };
        store.append_bond(&entry, &p).unwrap();

        let found = store
            .bond_entry_for_key("membership:t1:direct")
            .unwrap()
            .unwrap();
        assert_eq!(found.bond_id, entry.bond_id);
        assert!(store.bond_entry_for_key("membership:t2:direct").unwrap().is_none());
    }
}
