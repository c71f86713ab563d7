//! RocksDB-backed wallet store
//!
//! # Column Families
//!
//! - `wallets` - Current wallet state (key: participant_id || currency)
//! - `entries` - Append-only ledger (key: wallet_id || entry_id)
//! - `idempotency` - Replay index (key: wallet_id || idempotency key)
//! - `external_tx` - Provider reference index (key: wallet_id || tx id)
//!
//! Entry IDs are UUIDv7, so the `entries` key order is creation order and a
//! prefix scan over the wallet ID yields the ledger FIFO.

use crate::{
    config::Config,
    error::{Error, Result},
    store::WalletStore,
    types::{Currency, LedgerEntry, Wallet},
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

const CF_WALLETS: &str = "wallets";
const CF_ENTRIES: &str = "entries";
const CF_IDEMPOTENCY: &str = "idempotency";
const CF_EXTERNAL_TX: &str = "external_tx";

/// RocksDB wallet store
pub struct RocksWalletStore {
    db: Arc<DB>,
}

impl RocksWalletStore {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_WALLETS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_ENTRIES, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Self::cf_options_index()),
            ColumnFamilyDescriptor::new(CF_EXTERNAL_TX, Self::cf_options_index()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened wallet store");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Wallet state is frequently read, use LZ4 for speed
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

    fn wallet_key(participant_id: Uuid, currency: Currency) -> Vec<u8> {
        let mut key = participant_id.as_bytes().to_vec();
        key.extend_from_slice(currency.code().as_bytes());
        key
    }

    fn entry_key(wallet_id: Uuid, entry_id: Uuid) -> Vec<u8> {
        let mut key = wallet_id.as_bytes().to_vec();
        key.extend_from_slice(entry_id.as_bytes());
        key
    }

    fn string_index_key(wallet_id: Uuid, token: &str) -> Vec<u8> {
        let mut key = wallet_id.as_bytes().to_vec();
        key.push(b'|');
        key.extend_from_slice(token.as_bytes());
        key
    }

    fn get_entry_via_index(&self, cf_name: &str, index_key: &[u8]) -> Result<Option<LedgerEntry>> {
        let cf = self.cf_handle(cf_name)?;
        let entry_key = match self.db.get_cf(cf, index_key)? {
            Some(v) => v,
            None => return Ok(None),
        };

        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let value = self
            .db
            .get_cf(cf_entries, &entry_key)?
            .ok_or_else(|| Error::Storage("Dangling idempotency index entry".to_string()))?;

        Ok(Some(bincode::deserialize(&value)?))
    }
}

impl WalletStore for RocksWalletStore {
    fn wallet(&self, participant_id: Uuid, currency: Currency) -> Result<Option<Wallet>> {
        let cf = self.cf_handle(CF_WALLETS)?;
        let key = Self::wallet_key(participant_id, currency);

        match self.db.get_cf(cf, &key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn apply_mutation(&self, wallet: &Wallet, entry: &LedgerEntry) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Wallet state
        let cf_wallets = self.cf_handle(CF_WALLETS)?;
        let wallet_key = Self::wallet_key(wallet.participant_id, wallet.currency);
        batch.put_cf(cf_wallets, &wallet_key, bincode::serialize(wallet)?);

        // 2. Ledger entry
        let cf_entries = self.cf_handle(CF_ENTRIES)?;
        let entry_key = Self::entry_key(entry.wallet_id, entry.entry_id);
        batch.put_cf(cf_entries, &entry_key, bincode::serialize(entry)?);

        // 3. Replay indices point at the entry key
        if let Some(key) = &entry.idempotency_key {
            let cf = self.cf_handle(CF_IDEMPOTENCY)?;
            batch.put_cf(cf, Self::string_index_key(entry.wallet_id, key), &entry_key);
        }
        if let Some(tid) = &entry.external_tx_id {
            let cf = self.cf_handle(CF_EXTERNAL_TX)?;
            batch.put_cf(cf, Self::string_index_key(entry.wallet_id, tid), &entry_key);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            wallet_id = %wallet.wallet_id,
            entry_id = %entry.entry_id,
            amount = %entry.amount,
            balance_after = %entry.balance_after,
            "Ledger entry appended"
        );

        Ok(())
    }

    fn entry_for_key(&self, wallet_id: Uuid, key: &str) -> Result<Option<LedgerEntry>> {
        self.get_entry_via_index(CF_IDEMPOTENCY, &Self::string_index_key(wallet_id, key))
    }

    fn entry_for_external_tx(&self, wallet_id: Uuid, tid: &str) -> Result<Option<LedgerEntry>> {
        self.get_entry_via_index(CF_EXTERNAL_TX, &Self::string_index_key(wallet_id, tid))
    }

    fn entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf_handle(CF_ENTRIES)?;
        let prefix = wallet_id.as_bytes().to_vec();

        let iter = self.db.prefix_iterator_cf(cf, &prefix);

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }

        Ok(entries)
    }
}
