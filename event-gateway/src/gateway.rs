//! Inbound event handlers
//!
//! Translates confirmed platform events (deposits, membership sales, bet
//! settlements, withdrawals) into wallet mutations and compensation
//! effects. Every handler is safe to replay: each individual effect is
//! idempotent on a key derived from the provider's transaction or bet ID,
//! so a retry after a mid-handler failure completes the missing work
//! instead of skipping it. A completion marker commits only after the last
//! effect and lets later replays short-circuit.

use crate::error::Result;
use crate::resolver::ProfileCurrencyResolver;
use binary_engine::{
    BondEngine, BondLedgerEntry, CompensationPlan, Error as NetworkError, NetworkStore,
    Participant, PlacementEngine, PlacementOutcome, PointLedger, Position,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{Currency, EntryKind, WalletService, WalletStore};

/// Result of a confirmed deposit
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    /// Wallet balance after the credit
    pub balance: Decimal,

    /// Point lots fanned out to binary ancestors
    pub lots_created: usize,
}

/// Result of a membership payment
#[derive(Debug, Clone)]
pub struct MembershipOutcome {
    /// The event was already processed; nothing changed
    pub replayed: bool,

    /// Binary placement performed by this event, if any
    pub placement: Option<PlacementOutcome>,

    /// Direct bonus paid to the sponsor, if any
    pub direct_bond: Option<BondLedgerEntry>,

    /// Sponsor-chain levels that received a residual bonus
    pub residual_levels: usize,

    /// Point lots fanned out to binary ancestors
    pub lots_created: usize,
}

impl MembershipOutcome {
    fn replayed() -> Self {
        Self {
            replayed: true,
            placement: None,
            direct_bond: None,
            residual_levels: 0,
            lots_created: 0,
        }
    }
}

/// Event gateway: the composition root over the wallet ledger and the
/// compensation engines
pub struct EventGateway {
    wallets: Arc<WalletService>,
    network: Arc<dyn NetworkStore>,
    placement: PlacementEngine,
    points: PointLedger,
    bonds: Arc<BondEngine>,
    plan: Arc<CompensationPlan>,
}

impl EventGateway {
    /// Wire the gateway over a wallet store and a network store
    pub fn new(
        wallet_store: Arc<dyn WalletStore>,
        network: Arc<dyn NetworkStore>,
        plan: Arc<CompensationPlan>,
        default_currency: Currency,
    ) -> Self {
        let resolver = Arc::new(ProfileCurrencyResolver::new(
            network.clone(),
            default_currency,
        ));
        let wallets = Arc::new(WalletService::new(wallet_store, resolver));
        let bonds = Arc::new(BondEngine::new(
            network.clone(),
            wallets.clone(),
            plan.clone(),
        ));

        Self {
            wallets,
            network: network.clone(),
            placement: PlacementEngine::new(network.clone()),
            points: PointLedger::new(network, plan.clone()),
            bonds,
            plan,
        }
    }

    /// Wallet service handle
    pub fn wallets(&self) -> Arc<WalletService> {
        self.wallets.clone()
    }

    /// Bond engine handle (shared with the sweep scheduler)
    pub fn bonds(&self) -> Arc<BondEngine> {
        self.bonds.clone()
    }

    /// Register a participant profile under a sponsor (idempotent)
    pub fn register(
        &self,
        participant_id: Uuid,
        sponsor_id: Option<Uuid>,
        country: &str,
    ) -> Result<()> {
        if self.network.participant(participant_id)?.is_some() {
            tracing::debug!(
                participant_id = %participant_id,
                "Registration replayed, participant exists"
            );
            return Ok(());
        }

        if let Some(sponsor_id) = sponsor_id {
            if self.network.participant(sponsor_id)?.is_none() {
                return Err(NetworkError::ParticipantNotFound(sponsor_id).into());
            }
        }

        let participant = Participant::new(participant_id, sponsor_id, country);
        self.network.put_participant(&participant)?;

        tracing::info!(
            participant_id = %participant_id,
            sponsor_id = ?sponsor_id,
            country,
            "Participant registered"
        );
        Ok(())
    }

    /// A payment provider confirmed a deposit
    ///
    /// Credits the wallet (in the provider's currency when given, else the
    /// profile currency) and fans qualifying points up the binary chain.
    /// Both effects key off `tx_id` and replay cleanly.
    pub fn on_deposit_confirmed(
        &self,
        participant_id: Uuid,
        amount: Decimal,
        currency: Option<Currency>,
        tx_id: &str,
    ) -> Result<DepositOutcome> {
        let key = format!("deposit:{}", tx_id);

        let mut metadata = HashMap::new();
        metadata.insert("tx_id".to_string(), tx_id.to_string());
        let balance = self.wallets.credit(
            participant_id,
            amount,
            currency,
            EntryKind::Topup,
            Some(&key),
            metadata,
        )?;

        let lots_created = self.points.fan_out(&key, participant_id, amount)?;

        Ok(DepositOutcome {
            balance,
            lots_created,
        })
    }

    /// A membership purchase was confirmed
    ///
    /// Places the buyer into the binary tree (first purchase only, never on
    /// an upgrade), activates them with a fresh earnings cap, pays the
    /// sponsor's direct bonus, distributes residuals up the sponsor chain
    /// and fans out volume points.
    ///
    /// Every effect is idempotent on a key derived from `tx_id` and the
    /// completion marker commits last, so a retried delivery after a
    /// partial failure finishes the missing effects without repeating the
    /// completed ones.
    pub fn on_membership_paid(
        &self,
        participant_id: Uuid,
        price: Decimal,
        preferred_side: Position,
        is_upgrade: bool,
        tx_id: &str,
    ) -> Result<MembershipOutcome> {
        let done_key = format!("membership:{}:done", tx_id);
        if self.network.event_processed(&done_key)? {
            tracing::debug!(tx_id, "Membership event replayed, skipping");
            return Ok(MembershipOutcome::replayed());
        }

        let participant = self
            .network
            .participant(participant_id)?
            .ok_or(NetworkError::ParticipantNotFound(participant_id))?;

        let placement = match (participant.sponsor_id, participant.is_placed(), is_upgrade) {
            (Some(sponsor_id), false, false) => Some(self.placement.place(
                participant_id,
                sponsor_id,
                preferred_side,
            )?),
            _ => None,
        };

        // Activation starts a new cap cycle, exactly once per tx so a
        // completing retry cannot wipe cap accrued since the first attempt
        let cap_limit = (price * self.plan.cap_multiplier).round_dp(2);
        {
            let lock = self.bonds.locks().lock(participant_id);
            let _guard = lock.lock();

            // Fresh read under the lock: placement rewrote the record and
            // concurrent bonds may have touched the counters
            let mut participant = self
                .network
                .participant(participant_id)?
                .ok_or(NetworkError::ParticipantNotFound(participant_id))?;
            participant.is_active = true;
            participant.membership_expired = false;
            participant.cap_limit = cap_limit;
            participant.cap_current = Decimal::ZERO;
            self.network
                .activate_membership(&participant, &format!("membership:{}:activate", tx_id))?;
        }

        let direct_bond =
            self.bonds
                .exec_direct(participant_id, price, &format!("membership:{}:direct", tx_id))?;
        let residual =
            self.bonds
                .exec_residual(participant_id, price, &format!("membership:{}", tx_id))?;
        let lots_created =
            self.points
                .fan_out(&format!("membership:{}", tx_id), participant_id, price)?;

        // Completion marker: commits only after the last effect, so a
        // failure anywhere above leaves the event retryable
        self.network.record_fanout(&done_key, &[])?;

        tracing::info!(
            participant_id = %participant_id,
            price = %price,
            cap_limit = %cap_limit,
            is_upgrade,
            residual_levels = residual.levels_paid,
            "Membership activated"
        );

        Ok(MembershipOutcome {
            replayed: false,
            placement,
            direct_bond,
            residual_levels: residual.levels_paid,
            lots_created,
        })
    }

    /// A bet settled: the stake leaves the wallet, any payout comes back
    ///
    /// Both mutations key off `bet_id`, so a replayed settlement applies
    /// neither twice. Returns the final balance.
    pub fn on_bet_settled(
        &self,
        participant_id: Uuid,
        stake: Decimal,
        payout: Decimal,
        bet_id: &str,
    ) -> Result<Decimal> {
        let mut metadata = HashMap::new();
        metadata.insert("bet_id".to_string(), bet_id.to_string());

        let mut balance = self.wallets.debit(
            participant_id,
            stake,
            None,
            EntryKind::BetPlace,
            Some(&format!("bet:{}:stake", bet_id)),
            None,
            metadata.clone(),
        )?;

        if payout > Decimal::ZERO {
            balance = self.wallets.credit(
                participant_id,
                payout,
                None,
                EntryKind::BetWin,
                Some(&format!("bet:{}:payout", bet_id)),
                metadata,
            )?;
        }

        Ok(balance)
    }

    /// Current stored rank of a participant (reporting)
    pub fn rank_of(&self, participant_id: Uuid) -> Result<binary_engine::Rank> {
        Ok(self
            .network
            .participant(participant_id)?
            .ok_or(NetworkError::ParticipantNotFound(participant_id))?
            .rank)
    }

    /// A withdrawal was requested against the provider transaction `tx_id`
    pub fn on_withdrawal_requested(
        &self,
        participant_id: Uuid,
        amount: Decimal,
        tx_id: &str,
    ) -> Result<Decimal> {
        let mut metadata = HashMap::new();
        metadata.insert("tx_id".to_string(), tx_id.to_string());
        Ok(self.wallets.debit(
            participant_id,
            amount,
            None,
            EntryKind::Withdrawal,
            None,
            Some(tx_id),
            metadata,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binary_engine::MemoryNetworkStore;
    use wallet_core::MemoryWalletStore;

    fn gateway() -> (Arc<MemoryNetworkStore>, EventGateway) {
        let network = Arc::new(MemoryNetworkStore::new());
        let gateway = EventGateway::new(
            Arc::new(MemoryWalletStore::new()),
            network.clone(),
            Arc::new(CompensationPlan::default()),
            Currency::USD,
        );
        (network, gateway)
    }

    #[test]
    fn test_register_idempotent() {
        let (network, gateway) = gateway();
        let root = Uuid::new_v4();

        gateway.register(root, None, "US").unwrap();
        gateway.register(root, None, "US").unwrap();

        assert_eq!(network.participant_ids().unwrap().len(), 1);
    }

    #[test]
    fn test_register_rejects_unknown_sponsor() {
        let (_network, gateway) = gateway();
        let result = gateway.register(Uuid::new_v4(), Some(Uuid::new_v4()), "US");
        assert!(result.is_err());
    }

    #[test]
    fn test_deposit_credits_and_replays() {
        let (_network, gateway) = gateway();
        let root = Uuid::new_v4();
        gateway.register(root, None, "US").unwrap();

        let first = gateway
            .on_deposit_confirmed(root, Decimal::from(100), None, "tx-1")
            .unwrap();
        let second = gateway
            .on_deposit_confirmed(root, Decimal::from(100), None, "tx-1")
            .unwrap();

        assert_eq!(first.balance, Decimal::from(100));
        assert_eq!(second.balance, Decimal::from(100));
        assert_eq!(second.lots_created, 0);
    }

    #[test]
    fn test_membership_places_activates_and_pays() {
        let (network, gateway) = gateway();
        let root = Uuid::new_v4();
        let member = Uuid::new_v4();
        gateway.register(root, None, "US").unwrap();
        gateway.register(member, Some(root), "US").unwrap();

        // Activate the root first so the direct bonus can credit
        gateway
            .on_membership_paid(root, Decimal::from(100), Position::Left, false, "m-root")
            .unwrap();

        let outcome = gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();

        assert!(!outcome.replayed);
        assert!(matches!(
            outcome.placement,
            Some(PlacementOutcome::Placed { .. })
        ));

        // Direct bonus: 10% of 100 to the sponsor
        let direct = outcome.direct_bond.unwrap();
        assert_eq!(direct.participant_id, root);
        assert_eq!(direct.credited, Decimal::from(10));

        // Residual level 1: 5% of 100, also to the root
        assert_eq!(outcome.residual_levels, 1);
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(15)
        );

        // Cap: 3x the membership price
        let activated = network.participant(member).unwrap().unwrap();
        assert!(activated.is_active);
        assert_eq!(activated.cap_limit, Decimal::from(300));
        assert_eq!(
            gateway.rank_of(member).unwrap(),
            binary_engine::Rank::Affiliate
        );
    }

    #[test]
    fn test_membership_replay_is_inert() {
        let (network, gateway) = gateway();
        let root = Uuid::new_v4();
        let member = Uuid::new_v4();
        gateway.register(root, None, "US").unwrap();
        gateway.register(member, Some(root), "US").unwrap();
        gateway
            .on_membership_paid(root, Decimal::from(100), Position::Left, false, "m-root")
            .unwrap();

        gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();
        let replay = gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();

        assert!(replay.replayed);
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(15)
        );
        assert_eq!(network.bond_entries(root).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_delivery_retry_completes_all_effects() {
        let (network, gateway) = gateway();
        let root = Uuid::new_v4();
        let member = Uuid::new_v4();

        // The member references a sponsor whose record has not arrived yet,
        // so the first delivery fails mid-handler
        network
            .put_participant(&Participant::new(member, Some(root), "US"))
            .unwrap();
        assert!(gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .is_err());

        gateway.register(root, None, "US").unwrap();
        gateway
            .on_membership_paid(root, Decimal::from(100), Position::Left, false, "m-root")
            .unwrap();

        // Retrying the same transaction must perform every effect, not
        // short-circuit as a replay
        let retry = gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();
        assert!(!retry.replayed);
        assert!(retry.placement.is_some());
        assert!(retry.direct_bond.is_some());

        let activated = network.participant(member).unwrap().unwrap();
        assert!(activated.is_active);
        assert_eq!(activated.cap_limit, Decimal::from(300));
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(15)
        );

        // And a third delivery is an inert replay
        let replay = gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(15)
        );
    }

    #[test]
    fn test_partial_delivery_retry_does_not_double_pay() {
        let (_network, gateway) = gateway();
        let root = Uuid::new_v4();
        let member = Uuid::new_v4();
        gateway.register(root, None, "US").unwrap();
        gateway.register(member, Some(root), "US").unwrap();
        gateway
            .on_membership_paid(root, Decimal::from(100), Position::Left, false, "m-root")
            .unwrap();

        // A prior delivery got as far as the direct bonus before dying
        gateway
            .bonds()
            .exec_direct(member, Decimal::from(100), "membership:m-1:direct")
            .unwrap();
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(10)
        );

        let retry = gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();
        assert!(!retry.replayed);

        // Direct bonus replays onto its key; residual still pays fresh
        assert_eq!(
            gateway.wallets().balance(root, None).unwrap(),
            Decimal::from(15)
        );
    }

    #[test]
    fn test_upgrade_skips_placement_and_resets_cap() {
        let (network, gateway) = gateway();
        let root = Uuid::new_v4();
        let member = Uuid::new_v4();
        gateway.register(root, None, "US").unwrap();
        gateway.register(member, Some(root), "US").unwrap();
        gateway
            .on_membership_paid(root, Decimal::from(100), Position::Left, false, "m-root")
            .unwrap();
        gateway
            .on_membership_paid(member, Decimal::from(100), Position::Left, false, "m-1")
            .unwrap();

        let upgrade = gateway
            .on_membership_paid(member, Decimal::from(200), Position::Left, true, "m-2")
            .unwrap();
        assert!(!upgrade.replayed);
        assert!(upgrade.placement.is_none());

        let upgraded = network.participant(member).unwrap().unwrap();
        assert_eq!(upgraded.cap_limit, Decimal::from(600));
        assert_eq!(upgraded.cap_current, Decimal::ZERO);
    }

    #[test]
    fn test_bet_settlement_replays_cleanly() {
        let (_network, gateway) = gateway();
        let p = Uuid::new_v4();
        gateway.register(p, None, "US").unwrap();
        gateway
            .on_deposit_confirmed(p, Decimal::from(100), None, "tx-1")
            .unwrap();

        let b1 = gateway
            .on_bet_settled(p, Decimal::from(30), Decimal::from(75), "bet-9")
            .unwrap();
        let b2 = gateway
            .on_bet_settled(p, Decimal::from(30), Decimal::from(75), "bet-9")
            .unwrap();

        assert_eq!(b1, Decimal::from(145));
        assert_eq!(b2, Decimal::from(145));
    }

    #[test]
    fn test_losing_bet_has_no_payout_entry() {
        let (_network, gateway) = gateway();
        let p = Uuid::new_v4();
        gateway.register(p, None, "US").unwrap();
        gateway
            .on_deposit_confirmed(p, Decimal::from(100), None, "tx-1")
            .unwrap();

        let balance = gateway
            .on_bet_settled(p, Decimal::from(40), Decimal::ZERO, "bet-10")
            .unwrap();
        assert_eq!(balance, Decimal::from(60));
        assert_eq!(gateway.wallets().entries(p, None).unwrap().len(), 2);
    }

    #[test]
    fn test_withdrawal_checks_funds() {
        let (_network, gateway) = gateway();
        let p = Uuid::new_v4();
        gateway.register(p, None, "US").unwrap();
        gateway
            .on_deposit_confirmed(p, Decimal::from(50), None, "tx-1")
            .unwrap();

        assert!(gateway
            .on_withdrawal_requested(p, Decimal::from(80), "w-1")
            .is_err());
        let balance = gateway
            .on_withdrawal_requested(p, Decimal::from(30), "w-2")
            .unwrap();
        assert_eq!(balance, Decimal::from(20));
    }

    #[test]
    fn test_currency_follows_profile_country() {
        let (_network, gateway) = gateway();
        let p = Uuid::new_v4();
        gateway.register(p, None, "BR").unwrap();
        gateway
            .on_deposit_confirmed(p, Decimal::from(100), None, "tx-1")
            .unwrap();

        assert_eq!(
            gateway
                .wallets()
                .balance(p, Some(Currency::BRL))
                .unwrap(),
            Decimal::from(100)
        );
    }
}
