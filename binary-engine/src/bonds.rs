//! Bond distribution engine
//!
//! Single entry point `add_bond` applies the earnings cap, records the
//! audit entry and settles the credited part through the wallet service.
//! Forfeited amounts (cap exceeded, inactive participant) are normal,
//! audited outcomes, never errors.
//!
//! Cap accounting is a read-modify-write on the participant and serializes
//! per participant through the shared lock registry; the audit append and
//! the cap update commit in one store batch. A bond carrying a source key
//! distributes exactly once per key: a replay returns the recorded entry
//! and completes any wallet settlement an earlier crash left unfinished.

use crate::{
    error::{Error, Result},
    locks::ParticipantLocks,
    metrics::Metrics,
    plan::CompensationPlan,
    store::NetworkStore,
    types::{BondLedgerEntry, BondType, Participant},
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{EntryKind, WalletService};

/// Summary of a residual distribution
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualOutcome {
    /// Sponsor-chain levels reached
    pub levels_paid: usize,
    /// Sum of gross amounts across levels
    pub total_gross: Decimal,
}

/// Bond distribution engine
pub struct BondEngine {
    store: Arc<dyn NetworkStore>,
    wallets: Arc<WalletService>,
    plan: Arc<CompensationPlan>,
    locks: Arc<ParticipantLocks>,
    metrics: Metrics,
}

impl BondEngine {
    /// Create a new bond engine
    pub fn new(
        store: Arc<dyn NetworkStore>,
        wallets: Arc<WalletService>,
        plan: Arc<CompensationPlan>,
    ) -> Self {
        Self {
            store,
            wallets,
            plan,
            locks: Arc::new(ParticipantLocks::new()),
            metrics: Metrics::default(),
        }
    }

    /// Metrics handle (for registry scraping)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shared lock registry: every participant read-modify-write outside
    /// this engine must serialize through the same locks
    pub fn locks(&self) -> Arc<ParticipantLocks> {
        self.locks.clone()
    }

    /// Distribute one bonus to one participant
    ///
    /// Rounds the gross to 2 decimal places; non-positive amounts are a
    /// no-op (`None`). A `source_key` makes the distribution exactly-once:
    /// a second call under the same key returns the recorded entry and
    /// finishes any wallet settlement a crash left behind. Returns the
    /// audit entry describing how the gross split into credited and lost.
    pub fn add_bond(
        &self,
        participant_id: Uuid,
        bond_type: BondType,
        gross: Decimal,
        triggered_by: Option<Uuid>,
        source_key: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<Option<BondLedgerEntry>> {
        let gross = gross.round_dp(2);
        if gross <= Decimal::ZERO {
            return Ok(None);
        }

        let lock = self.locks.lock(participant_id);
        let _guard = lock.lock();

        if let Some(key) = source_key {
            if let Some(prior) = self.store.bond_entry_for_key(key)? {
                self.complete_settlement(&prior)?;
                return Ok(Some(prior));
            }
        }

        let mut participant = self
            .store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        let (credited, lost) = self.split_against_cap(&mut participant, gross);

        if credited > Decimal::ZERO {
            participant.bond_counters(bond_type).pending += credited;
        }

        let entry = BondLedgerEntry {
            bond_id: Uuid::now_v7(),
            participant_id,
            bond_type,
            gross,
            credited,
            lost,
            triggered_by,
            source_key: source_key.map(str::to_string),
            metadata,
            created_at: Utc::now(),
        };

        // Audit entry + cap counters in one atomic batch
        self.store.append_bond(&entry, &participant)?;

        if credited > Decimal::ZERO {
            let mut meta = HashMap::new();
            meta.insert("bond_type".to_string(), bond_type.code().to_string());
            self.wallets.credit(
                participant_id,
                credited,
                None,
                Self::entry_kind(bond_type),
                Some(&Self::wallet_key(&entry)),
                meta,
            )?;

            // Settle: pending -> balance
            let counters = participant.bond_counters(bond_type);
            counters.pending -= credited;
            counters.balance += credited;
            self.store.put_participant(&participant)?;

            self.metrics.bonds_credited_total.inc();
        }
        if lost > Decimal::ZERO {
            self.metrics.bonds_lost_total.inc();
        }

        tracing::info!(
            participant_id = %participant_id,
            bond_type = %bond_type,
            gross = %gross,
            credited = %credited,
            lost = %lost,
            "Bond distributed"
        );

        Ok(Some(entry))
    }

    /// Deterministic wallet idempotency key: keyed bonds replay against the
    /// source key, unkeyed ones against the bond ID
    fn wallet_key(entry: &BondLedgerEntry) -> String {
        match &entry.source_key {
            Some(key) => format!("bond:{}", key),
            None => format!("bond:{}", entry.bond_id),
        }
    }

    /// Finish the wallet side of an already-recorded bond
    ///
    /// Called on a keyed replay while holding the participant lock. The
    /// wallet credit replays cleanly against its idempotency key; the
    /// pending counter still holds the amount only if the original call
    /// crashed between the audit append and the settle write.
    fn complete_settlement(&self, entry: &BondLedgerEntry) -> Result<()> {
        if entry.credited <= Decimal::ZERO {
            return Ok(());
        }

        let mut meta = HashMap::new();
        meta.insert("bond_type".to_string(), entry.bond_type.code().to_string());
        self.wallets.credit(
            entry.participant_id,
            entry.credited,
            None,
            Self::entry_kind(entry.bond_type),
            Some(&Self::wallet_key(entry)),
            meta,
        )?;

        let mut participant = self
            .store
            .participant(entry.participant_id)?
            .ok_or(Error::ParticipantNotFound(entry.participant_id))?;
        let counters = participant.bond_counters(entry.bond_type);
        if counters.pending >= entry.credited {
            counters.pending -= entry.credited;
            counters.balance += entry.credited;
            self.store.put_participant(&participant)?;
            tracing::info!(
                participant_id = %entry.participant_id,
                bond_id = %entry.bond_id,
                credited = %entry.credited,
                "Recovered unfinished bond settlement"
            );
        }

        Ok(())
    }

    /// Direct bonus to the buyer's sponsor on a membership sale, exactly
    /// once per `source_key`
    pub fn exec_direct(
        &self,
        buyer_id: Uuid,
        membership_price: Decimal,
        source_key: &str,
    ) -> Result<Option<BondLedgerEntry>> {
        let buyer = self
            .store
            .participant(buyer_id)?
            .ok_or(Error::ParticipantNotFound(buyer_id))?;

        let sponsor_id = match buyer.sponsor_id {
            Some(id) => id,
            None => return Ok(None),
        };

        let gross = membership_price * self.plan.direct_percent;
        self.add_bond(
            sponsor_id,
            BondType::Direct,
            gross,
            Some(buyer_id),
            Some(source_key),
            HashMap::new(),
        )
    }

    /// Binary bonus for consumed matched points, exactly once per
    /// `source_key`
    pub fn exec_binary(
        &self,
        participant_id: Uuid,
        matched_points: Decimal,
        source_key: &str,
    ) -> Result<Option<BondLedgerEntry>> {
        let participant = self
            .store
            .participant(participant_id)?
            .ok_or(Error::ParticipantNotFound(participant_id))?;

        let percent = self.plan.binary_percent(participant.rank)?;
        let gross = matched_points * percent;
        let mut meta = HashMap::new();
        meta.insert("matched_points".to_string(), matched_points.to_string());
        self.add_bond(
            participant_id,
            BondType::Binary,
            gross,
            None,
            Some(source_key),
            meta,
        )
    }

    /// Achievement bonus for a newly reached rank, once per tier ever
    pub fn exec_rank(
        &self,
        participant_id: Uuid,
        rank: crate::types::Rank,
    ) -> Result<Option<BondLedgerEntry>> {
        let gross = self.plan.rank_bonus(rank)?;
        let key = format!("rank:{}:{}", participant_id, rank.name());
        let mut meta = HashMap::new();
        meta.insert("rank".to_string(), rank.name().to_string());
        self.add_bond(
            participant_id,
            BondType::Rank,
            gross,
            None,
            Some(&key),
            meta,
        )
    }

    /// Residual distribution up the sponsor chain of `source_id`
    ///
    /// Pays a decreasing percent of `base_amount` per level, at most
    /// `residual_levels()` deep, stopping at the first missing sponsor.
    /// Each level distributes exactly once per `<key_prefix>:residual:<n>`.
    pub fn exec_residual(
        &self,
        source_id: Uuid,
        base_amount: Decimal,
        key_prefix: &str,
    ) -> Result<ResidualOutcome> {
        let source = self
            .store
            .participant(source_id)?
            .ok_or(Error::ParticipantNotFound(source_id))?;

        let mut outcome = ResidualOutcome {
            levels_paid: 0,
            total_gross: Decimal::ZERO,
        };

        let mut cursor = source.sponsor_id;
        for percent in self.plan.residual_percents.iter() {
            let ancestor_id = match cursor {
                Some(id) => id,
                None => break,
            };
            let ancestor = self
                .store
                .participant(ancestor_id)?
                .ok_or(Error::CorruptLink {
                    participant: source_id,
                    missing: ancestor_id,
                })?;

            let level = outcome.levels_paid + 1;
            let gross = base_amount * *percent;
            let key = format!("{}:residual:{}", key_prefix, level);
            let mut meta = HashMap::new();
            meta.insert("level".to_string(), level.to_string());
            self.add_bond(
                ancestor_id,
                BondType::Residual,
                gross,
                Some(source_id),
                Some(&key),
                meta,
            )?;

            outcome.levels_paid += 1;
            outcome.total_gross += gross.round_dp(2);
            cursor = ancestor.sponsor_id;
        }

        Ok(outcome)
    }

    /// Cap-then-credit split; mutates cap counters and membership flags
    fn split_against_cap(&self, participant: &mut Participant, gross: Decimal) -> (Decimal, Decimal) {
        if !participant.is_active {
            return (Decimal::ZERO, gross);
        }
        if participant.cap_limit <= Decimal::ZERO {
            // No cap configured
            return (gross, Decimal::ZERO);
        }

        let available = (participant.cap_limit - participant.cap_current).max(Decimal::ZERO);
        if available <= Decimal::ZERO {
            if !participant.membership_expired {
                self.expire_membership(participant);
            }
            return (Decimal::ZERO, gross);
        }

        let credited = gross.min(available);
        let lost = gross - credited;
        participant.cap_current += credited;

        if participant.cap_current >= participant.cap_limit {
            self.expire_membership(participant);
        }

        (credited, lost)
    }

    fn expire_membership(&self, participant: &mut Participant) {
        participant.membership_expired = true;
        participant.is_active = false;
        tracing::info!(
            participant_id = %participant.participant_id,
            cap_limit = %participant.cap_limit,
            "Earnings cap reached, membership expired"
        );
    }

    fn entry_kind(bond_type: BondType) -> EntryKind {
        match bond_type {
            BondType::Direct => EntryKind::DirectBonus,
            BondType::Binary => EntryKind::BinaryBonus,
            BondType::Rank => EntryKind::RankBonus,
            BondType::Residual => EntryKind::ResidualBonus,
        }
    }
}
