//! Wallet service: idempotent credit/debit over the ledger store
//!
//! Every balance mutation runs under a per-wallet lock and commits exactly
//! one `LedgerEntry` atomically with the wallet upsert. Replays (same
//! idempotency key or external transaction ID) return the previously
//! recorded balance and never double-apply.

use crate::{
    error::{Error, Result},
    metrics::Metrics,
    store::WalletStore,
    types::{Currency, EntryKind, LedgerEntry, Wallet},
};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves a participant's wallet currency when the caller does not pass
/// one explicitly (e.g. from the profile country)
pub trait CurrencyResolver: Send + Sync {
    /// Currency for the participant's default wallet
    fn currency_for(&self, participant_id: Uuid) -> Result<Currency>;
}

/// Fixed-currency resolver (tests, single-currency deployments)
pub struct StaticResolver(pub Currency);

impl CurrencyResolver for StaticResolver {
    fn currency_for(&self, _participant_id: Uuid) -> Result<Currency> {
        Ok(self.0)
    }
}

/// Wallet service
pub struct WalletService {
    /// Ledger store
    store: Arc<dyn WalletStore>,

    /// Currency resolution for implicit-currency calls
    resolver: Arc<dyn CurrencyResolver>,

    /// Per-wallet critical sections
    locks: DashMap<(Uuid, Currency), Arc<Mutex<()>>>,

    /// Prometheus metrics
    metrics: Metrics,
}

impl WalletService {
    /// Create a new wallet service
    pub fn new(store: Arc<dyn WalletStore>, resolver: Arc<dyn CurrencyResolver>) -> Self {
        Self {
            store,
            resolver,
            locks: DashMap::new(),
            metrics: Metrics::default(),
        }
    }

    /// Credit a participant's wallet, returning the new balance
    ///
    /// Replaying the same `idempotency_key` returns the balance recorded by
    /// the first application (fails closed, never double-credits).
    pub fn credit(
        &self,
        participant_id: Uuid,
        amount: Decimal,
        currency: Option<Currency>,
        kind: EntryKind,
        idempotency_key: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        self.mutate(
            participant_id,
            amount,
            currency,
            kind,
            idempotency_key,
            None,
            metadata,
        )
    }

    /// Debit a participant's wallet, returning the new balance
    ///
    /// Fails with `InsufficientFunds` when `balance < amount`. `tid` is an
    /// optional external transaction ID also checked for duplicate
    /// submission.
    pub fn debit(
        &self,
        participant_id: Uuid,
        amount: Decimal,
        currency: Option<Currency>,
        kind: EntryKind,
        idempotency_key: Option<&str>,
        tid: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidAmount(amount));
        }
        self.mutate(
            participant_id,
            -amount,
            currency,
            kind,
            idempotency_key,
            tid,
            metadata,
        )
    }

    /// Current balance for the participant's wallet (zero if absent; an
    /// absent wallet is not persisted by a read)
    pub fn balance(&self, participant_id: Uuid, currency: Option<Currency>) -> Result<Decimal> {
        let currency = self.resolve_currency(participant_id, currency)?;
        Ok(self
            .store
            .wallet(participant_id, currency)?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Full ledger for the participant's wallet in creation order
    pub fn entries(
        &self,
        participant_id: Uuid,
        currency: Option<Currency>,
    ) -> Result<Vec<LedgerEntry>> {
        let currency = self.resolve_currency(participant_id, currency)?;
        match self.store.wallet(participant_id, currency)? {
            Some(wallet) => self.store.entries(wallet.wallet_id),
            None => Ok(Vec::new()),
        }
    }

    /// Metrics handle (for registry scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    fn resolve_currency(
        &self,
        participant_id: Uuid,
        currency: Option<Currency>,
    ) -> Result<Currency> {
        match currency {
            Some(c) => Ok(c),
            None => self.resolver.currency_for(participant_id),
        }
    }

    fn wallet_lock(&self, participant_id: Uuid, currency: Currency) -> Arc<Mutex<()>> {
        self.locks
            .entry((participant_id, currency))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Single mutation path for credit and debit (`signed_amount` < 0 debits)
    fn mutate(
        &self,
        participant_id: Uuid,
        signed_amount: Decimal,
        currency: Option<Currency>,
        kind: EntryKind,
        idempotency_key: Option<&str>,
        tid: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<Decimal> {
        if signed_amount == Decimal::ZERO {
            return Err(Error::InvalidAmount(signed_amount));
        }

        let currency = self.resolve_currency(participant_id, currency)?;

        let lock = self.wallet_lock(participant_id, currency);
        let _guard = lock.lock();

        // Lazily create the wallet under the lock
        let mut wallet = self
            .store
            .wallet(participant_id, currency)?
            .unwrap_or_else(|| Wallet::new(participant_id, currency));

        // Replay detection: idempotency key first, then provider tx id
        if let Some(key) = idempotency_key {
            if let Some(prior) = self.store.entry_for_key(wallet.wallet_id, key)? {
                self.metrics.record_duplicate();
                tracing::debug!(
                    participant_id = %participant_id,
                    idempotency_key = key,
                    "Duplicate operation replayed, returning prior balance"
                );
                return Ok(prior.balance_after);
            }
        }
        if let Some(tid) = tid {
            if let Some(prior) = self.store.entry_for_external_tx(wallet.wallet_id, tid)? {
                self.metrics.record_duplicate();
                tracing::debug!(
                    participant_id = %participant_id,
                    external_tx_id = tid,
                    "Duplicate external transaction, returning prior balance"
                );
                return Ok(prior.balance_after);
            }
        }

        if signed_amount < Decimal::ZERO {
            let requested = -signed_amount;
            if wallet.balance < requested {
                self.metrics.record_insufficient_funds();
                return Err(Error::InsufficientFunds {
                    available: wallet.balance,
                    requested,
                });
            }
        }

        let new_balance = wallet.balance + signed_amount;
        wallet.balance = new_balance;
        wallet.updated_at = Utc::now();

        let entry = LedgerEntry {
            entry_id: Uuid::now_v7(),
            wallet_id: wallet.wallet_id,
            participant_id,
            currency,
            kind,
            amount: signed_amount,
            balance_after: new_balance,
            idempotency_key: idempotency_key.map(String::from),
            external_tx_id: tid.map(String::from),
            metadata,
            created_at: wallet.updated_at,
        };

        self.store.apply_mutation(&wallet, &entry)?;

        if signed_amount > Decimal::ZERO {
            self.metrics.record_credit();
        } else {
            self.metrics.record_debit();
        }

        tracing::info!(
            participant_id = %participant_id,
            kind = %kind,
            amount = %signed_amount,
            balance = %new_balance,
            "Wallet mutation applied"
        );

        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWalletStore;

    fn test_service() -> WalletService {
        WalletService::new(
            Arc::new(MemoryWalletStore::new()),
            Arc::new(StaticResolver(Currency::USD)),
        )
    }

    fn d(cents: i64) -> Decimal {
        Decimal::new(cents, 2)
    }

    #[test]
    fn test_credit_and_balance() {
        let service = test_service();
        let p = Uuid::new_v4();

        let balance = service
            .credit(p, d(10000), None, EntryKind::Topup, None, HashMap::new())
            .unwrap();
        assert_eq!(balance, d(10000));
        assert_eq!(service.balance(p, None).unwrap(), d(10000));
    }

    #[test]
    fn test_balance_of_absent_wallet_is_zero() {
        let service = test_service();
        assert_eq!(service.balance(Uuid::new_v4(), None).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_invalid_amount_rejected() {
        let service = test_service();
        let p = Uuid::new_v4();

        let result = service.credit(p, Decimal::ZERO, None, EntryKind::Topup, None, HashMap::new());
        assert!(matches!(result, Err(Error::InvalidAmount(_))));
    }

    #[test]
    fn test_debit_insufficient_funds() {
        let service = test_service();
        let p = Uuid::new_v4();

        service
            .credit(p, d(5000), None, EntryKind::Topup, None, HashMap::new())
            .unwrap();

        let result = service.debit(
            p,
            d(10000),
            None,
            EntryKind::BetPlace,
            None,
            None,
            HashMap::new(),
        );
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));

        // Balance unchanged by the failed debit
        assert_eq!(service.balance(p, None).unwrap(), d(5000));
    }

    #[test]
    fn test_idempotent_credit_replay() {
        let service = test_service();
        let p = Uuid::new_v4();

        // Two deposits of $50 each with the same key: exactly one applies
        let b1 = service
            .credit(p, d(5000), None, EntryKind::Topup, Some("X1"), HashMap::new())
            .unwrap();
        let b2 = service
            .credit(p, d(5000), None, EntryKind::Topup, Some("X1"), HashMap::new())
            .unwrap();

        assert_eq!(b1, d(5000));
        assert_eq!(b2, d(5000));
        assert_eq!(service.balance(p, None).unwrap(), d(5000));
        assert_eq!(service.entries(p, None).unwrap().len(), 1);
    }

    #[test]
    fn test_external_tx_replay() {
        let service = test_service();
        let p = Uuid::new_v4();

        service
            .credit(p, d(20000), None, EntryKind::Topup, None, HashMap::new())
            .unwrap();

        let b1 = service
            .debit(
                p,
                d(5000),
                None,
                EntryKind::Withdrawal,
                None,
                Some("prov-77"),
                HashMap::new(),
            )
            .unwrap();
        let b2 = service
            .debit(
                p,
                d(5000),
                None,
                EntryKind::Withdrawal,
                None,
                Some("prov-77"),
                HashMap::new(),
            )
            .unwrap();

        assert_eq!(b1, d(15000));
        assert_eq!(b2, d(15000));
        assert_eq!(service.entries(p, None).unwrap().len(), 2);
    }

    #[test]
    fn test_prefix_sum_invariant() {
        let service = test_service();
        let p = Uuid::new_v4();

        service
            .credit(p, d(10000), None, EntryKind::Topup, None, HashMap::new())
            .unwrap();
        service
            .debit(p, d(2500), None, EntryKind::BetPlace, None, None, HashMap::new())
            .unwrap();
        service
            .credit(p, d(7500), None, EntryKind::BetWin, None, HashMap::new())
            .unwrap();

        let entries = service.entries(p, None).unwrap();
        let sum: Decimal = entries.iter().map(|e| e.amount).sum();
        let last = entries.last().unwrap();

        assert_eq!(sum, service.balance(p, None).unwrap());
        assert_eq!(last.balance_after, sum);
    }

    #[test]
    fn test_one_wallet_per_currency() {
        let service = test_service();
        let p = Uuid::new_v4();

        service
            .credit(p, d(100), Some(Currency::USD), EntryKind::Topup, None, HashMap::new())
            .unwrap();
        service
            .credit(p, d(200), Some(Currency::EUR), EntryKind::Topup, None, HashMap::new())
            .unwrap();

        assert_eq!(service.balance(p, Some(Currency::USD)).unwrap(), d(100));
        assert_eq!(service.balance(p, Some(Currency::EUR)).unwrap(), d(200));
    }
}
