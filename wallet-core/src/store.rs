//! Repository interface for wallets and ledger entries
//!
//! The wallet service is written against the `WalletStore` trait so the
//! financial core stays testable against an in-memory store. Production
//! deployments use the RocksDB-backed store in `storage`.

use crate::{
    error::Result,
    types::{Currency, LedgerEntry, Wallet},
};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Storage abstraction for wallets and their append-only entries
///
/// `apply_mutation` is the single write path: the wallet upsert, the entry
/// append and the idempotency/external-tx indices must commit atomically.
pub trait WalletStore: Send + Sync {
    /// Look up the wallet for (participant, currency)
    fn wallet(&self, participant_id: Uuid, currency: Currency) -> Result<Option<Wallet>>;

    /// Atomically persist a balance mutation: wallet upsert + entry append +
    /// idempotency/external-tx index rows
    fn apply_mutation(&self, wallet: &Wallet, entry: &LedgerEntry) -> Result<()>;

    /// Find a previously applied entry by idempotency key
    fn entry_for_key(&self, wallet_id: Uuid, key: &str) -> Result<Option<LedgerEntry>>;

    /// Find a previously applied entry by external transaction ID
    fn entry_for_external_tx(&self, wallet_id: Uuid, tid: &str) -> Result<Option<LedgerEntry>>;

    /// All entries for a wallet in creation order
    fn entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>>;
}

/// In-memory wallet store (tests and embedded tooling)
#[derive(Default)]
pub struct MemoryWalletStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    /// (participant, currency) -> wallet
    wallets: HashMap<(Uuid, Currency), Wallet>,
    /// wallet -> entries in creation order
    entries: HashMap<Uuid, Vec<LedgerEntry>>,
    /// (wallet, idempotency key) -> entry
    by_key: HashMap<(Uuid, String), LedgerEntry>,
    /// (wallet, external tx id) -> entry
    by_external: HashMap<(Uuid, String), LedgerEntry>,
}

impl MemoryWalletStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl WalletStore for MemoryWalletStore {
    fn wallet(&self, participant_id: Uuid, currency: Currency) -> Result<Option<Wallet>> {
        Ok(self
            .inner
            .read()
            .wallets
            .get(&(participant_id, currency))
            .cloned())
    }

    fn apply_mutation(&self, wallet: &Wallet, entry: &LedgerEntry) -> Result<()> {
        let mut inner = self.inner.write();

        inner
            .wallets
            .insert((wallet.participant_id, wallet.currency), wallet.clone());
        inner
            .entries
            .entry(wallet.wallet_id)
            .or_default()
            .push(entry.clone());

        if let Some(key) = &entry.idempotency_key {
            inner
                .by_key
                .insert((wallet.wallet_id, key.clone()), entry.clone());
        }
        if let Some(tid) = &entry.external_tx_id {
            inner
                .by_external
                .insert((wallet.wallet_id, tid.clone()), entry.clone());
        }

        Ok(())
    }

    fn entry_for_key(&self, wallet_id: Uuid, key: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .inner
            .read()
            .by_key
            .get(&(wallet_id, key.to_string()))
            .cloned())
    }

    fn entry_for_external_tx(&self, wallet_id: Uuid, tid: &str) -> Result<Option<LedgerEntry>> {
        Ok(self
            .inner
            .read()
            .by_external
            .get(&(wallet_id, tid.to_string()))
            .cloned())
    }

    fn entries(&self, wallet_id: Uuid) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .inner
            .read()
            .entries
            .get(&wallet_id)
            .cloned()
            .unwrap_or_default())
    }
}
