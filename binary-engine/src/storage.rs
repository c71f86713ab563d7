//! RocksDB-backed network store
//!
//! # Column Families
//!
//! - `participants` - Current node state (key: participant_id)
//! - `point_lots` - FIFO lot queues (key: participant_id || side ||
//!   created-nanos || lot_id, so a prefix scan yields oldest-first)
//! - `bond_ledger` - Append-only bond audit (key: participant_id || bond_id)
//! - `bond_keys` - Source-key index over bond entries (exactly-once bonds)
//! - `obligations` - Unsettled match obligations (key: participant_id ||
//!   match_id)
//! - `descendants` - Sponsor-chain reporting index (key: ancestor ||
//!   descendant)
//! - `events` - Processed event keys (exactly-once guard)
//!
//! Multi-record commits go through a single `WriteBatch`; the
//! read-check-write sections (`commit_placement`, `record_fanout`) serialize
//! on a store-level mutex so the occupancy check and the batch commit cannot
//! interleave.

use crate::{
    error::{Error, Result},
    store::NetworkStore,
    types::{BondLedgerEntry, DescendantEntry, MatchObligation, Participant, PointLot, Position},
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const CF_PARTICIPANTS: &str = "participants";
const CF_POINT_LOTS: &str = "point_lots";
const CF_BOND_LEDGER: &str = "bond_ledger";
const CF_BOND_KEYS: &str = "bond_keys";
const CF_OBLIGATIONS: &str = "obligations";
const CF_DESCENDANTS: &str = "descendants";
const CF_EVENTS: &str = "events";

/// RocksDB network store
pub struct RocksNetworkStore {
    db: Arc<DB>,
    write_lock: Mutex<()>,
}

impl RocksNetworkStore {
    /// Open or create the database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_PARTICIPANTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_POINT_LOTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_BOND_LEDGER, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_BOND_KEYS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_OBLIGATIONS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_DESCENDANTS, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened network store");

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_index() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn side_byte(side: Position) -> u8 {
        match side {
            Position::Left => b'L',
            Position::Right => b'R',
        }
    }

    fn lot_prefix(participant_id: Uuid, side: Position) -> Vec<u8> {
        let mut key = participant_id.as_bytes().to_vec();
        key.push(Self::side_byte(side));
        key
    }

    fn lot_key(lot: &PointLot) -> Vec<u8> {
        let mut key = Self::lot_prefix(lot.participant_id, lot.side);
        let nanos = lot.created_at.timestamp_nanos_opt().unwrap_or(0);
        key.extend_from_slice(&nanos.to_be_bytes());
        key.extend_from_slice(lot.lot_id.as_bytes());
        key
    }

    fn bond_key(entry: &BondLedgerEntry) -> Vec<u8> {
        let mut key = entry.participant_id.as_bytes().to_vec();
        key.extend_from_slice(entry.bond_id.as_bytes());
        key
    }

    fn obligation_key(participant_id: Uuid, match_id: Uuid) -> Vec<u8> {
        let mut key = participant_id.as_bytes().to_vec();
        key.extend_from_slice(match_id.as_bytes());
        key
    }

    fn descendant_key(row: &DescendantEntry) -> Vec<u8> {
        let mut key = row.ancestor_id.as_bytes().to_vec();
        key.extend_from_slice(row.descendant_id.as_bytes());
        key
    }

    fn put_participant_in_batch(&self, batch: &mut WriteBatch, p: &Participant) -> Result<()> {
        let cf = self.cf_handle(CF_PARTICIPANTS)?;
        batch.put_cf(cf, p.participant_id.as_bytes(), bincode::serialize(p)?);
        Ok(())
    }

    fn scan_prefix<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self.db.prefix_iterator_cf(cf, prefix);

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }
}

impl NetworkStore for RocksNetworkStore {
    fn participant(&self, id: Uuid) -> Result<Option<Participant>> {
        let cf = self.cf_handle(CF_PARTICIPANTS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn put_participant(&self, participant: &Participant) -> Result<()> {
        let cf = self.cf_handle(CF_PARTICIPANTS)?;
        self.db.put_cf(
            cf,
            participant.participant_id.as_bytes(),
            bincode::serialize(participant)?,
        )?;
        Ok(())
    }

    fn participant_ids(&self) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_PARTICIPANTS)?;
        let iter = self.db.iterator_cf(cf, rocksdb::IteratorMode::Start);

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if key.len() == 16 {
                let bytes: [u8; 16] = key.as_ref().try_into().unwrap_or([0u8; 16]);
                ids.push(Uuid::from_bytes(bytes));
            }
        }
        Ok(ids)
    }

    fn commit_placement(
        &self,
        child: &Participant,
        parent_id: Uuid,
        side: Position,
        descendants: &[DescendantEntry],
    ) -> Result<()> {
        let _guard = self.write_lock.lock();

        let parent = self
            .participant(parent_id)?
            .ok_or(Error::ParticipantNotFound(parent_id))?;
        if parent.child(side).is_some() {
            return Err(Error::Conflict(format!(
                "Slot {} of {} already occupied",
                side, parent_id
            )));
        }

        let mut parent = parent;
        parent.set_child(side, child.participant_id);

        let mut child = child.clone();
        child.parent_binary_id = Some(parent_id);
        child.position = Some(side);

        let mut batch = WriteBatch::default();

        // Sponsor direct count; the sponsor may also be the binary parent
        if let Some(sponsor_id) = child.sponsor_id {
            if sponsor_id == parent_id {
                parent.direct_count += 1;
            } else if let Some(mut sponsor) = self.participant(sponsor_id)? {
                sponsor.direct_count += 1;
                self.put_participant_in_batch(&mut batch, &sponsor)?;
            }
        }

        self.put_participant_in_batch(&mut batch, &parent)?;
        self.put_participant_in_batch(&mut batch, &child)?;

        let cf_desc = self.cf_handle(CF_DESCENDANTS)?;
        for row in descendants {
            batch.put_cf(cf_desc, Self::descendant_key(row), bincode::serialize(row)?);
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn record_fanout(&self, event_key: &str, lots: &[PointLot]) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let cf_events = self.cf_handle(CF_EVENTS)?;
        if self.db.get_cf(cf_events, event_key.as_bytes())?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        let cf_lots = self.cf_handle(CF_POINT_LOTS)?;
        for lot in lots {
            batch.put_cf(cf_lots, Self::lot_key(lot), bincode::serialize(lot)?);
        }
        batch.put_cf(cf_events, event_key.as_bytes(), &[]);

        self.db.write(batch)?;
        Ok(true)
    }

    fn event_processed(&self, event_key: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_EVENTS)?;
        Ok(self.db.get_cf(cf, event_key.as_bytes())?.is_some())
    }

    fn activate_membership(&self, participant: &Participant, event_key: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();

        let cf_events = self.cf_handle(CF_EVENTS)?;
        if self.db.get_cf(cf_events, event_key.as_bytes())?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.put_participant_in_batch(&mut batch, participant)?;
        batch.put_cf(cf_events, event_key.as_bytes(), &[]);

        self.db.write(batch)?;
        Ok(true)
    }

    fn lots(&self, participant_id: Uuid, side: Position) -> Result<Vec<PointLot>> {
        self.scan_prefix(CF_POINT_LOTS, &Self::lot_prefix(participant_id, side))
    }

    fn commit_match(
        &self,
        participant_id: Uuid,
        removed: &[PointLot],
        updated: &[PointLot],
        obligation: Option<&MatchObligation>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut batch = WriteBatch::default();
        let cf = self.cf_handle(CF_POINT_LOTS)?;
        for lot in removed {
            batch.delete_cf(cf, Self::lot_key(lot));
        }
        for lot in updated {
            batch.put_cf(cf, Self::lot_key(lot), bincode::serialize(lot)?);
        }
        if let Some(ob) = obligation {
            let cf_ob = self.cf_handle(CF_OBLIGATIONS)?;
            batch.put_cf(
                cf_ob,
                Self::obligation_key(participant_id, ob.match_id),
                bincode::serialize(ob)?,
            );
        }

        self.db.write(batch)?;
        Ok(())
    }

    fn open_obligations(&self, participant_id: Uuid) -> Result<Vec<MatchObligation>> {
        self.scan_prefix(CF_OBLIGATIONS, participant_id.as_bytes())
    }

    fn settle_obligation(&self, participant_id: Uuid, match_id: Uuid) -> Result<()> {
        let cf = self.cf_handle(CF_OBLIGATIONS)?;
        self.db
            .delete_cf(cf, Self::obligation_key(participant_id, match_id))?;
        Ok(())
    }

    fn append_bond(&self, entry: &BondLedgerEntry, participant: &Participant) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_bonds = self.cf_handle(CF_BOND_LEDGER)?;
        batch.put_cf(cf_bonds, Self::bond_key(entry), bincode::serialize(entry)?);
        if let Some(key) = &entry.source_key {
            let cf_keys = self.cf_handle(CF_BOND_KEYS)?;
            batch.put_cf(cf_keys, key.as_bytes(), bincode::serialize(entry)?);
        }
        self.put_participant_in_batch(&mut batch, participant)?;

        self.db.write(batch)?;

        tracing::debug!(
            participant_id = %entry.participant_id,
            bond_type = %entry.bond_type,
            gross = %entry.gross,
            credited = %entry.credited,
            lost = %entry.lost,
            "Bond entry appended"
        );

        Ok(())
    }

    fn bond_entries(&self, participant_id: Uuid) -> Result<Vec<BondLedgerEntry>> {
        self.scan_prefix(CF_BOND_LEDGER, participant_id.as_bytes())
    }

    fn bond_entry_for_key(&self, source_key: &str) -> Result<Option<BondLedgerEntry>> {
        let cf = self.cf_handle(CF_BOND_KEYS)?;
        match self.db.get_cf(cf, source_key.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn descendants(&self, ancestor_id: Uuid) -> Result<Vec<DescendantEntry>> {
        self.scan_prefix(CF_DESCENDANTS, ancestor_id.as_bytes())
    }
}
