//! Property-based tests for matching and cap arithmetic

use binary_engine::{
    BondEngine, BondType, CompensationPlan, MatchingEngine, MemoryNetworkStore, NetworkStore,
    Participant, PointLedger, PointLot, Position,
};
use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use wallet_core::{Currency, MemoryWalletStore, StaticResolver, WalletService};

fn engines() -> (Arc<MemoryNetworkStore>, Arc<WalletService>, MatchingEngine, Arc<BondEngine>) {
    let store = Arc::new(MemoryNetworkStore::new());
    let plan = Arc::new(CompensationPlan::default());
    let wallets = Arc::new(WalletService::new(
        Arc::new(MemoryWalletStore::new()),
        Arc::new(StaticResolver(Currency::USD)),
    ));
    let bonds = Arc::new(BondEngine::new(store.clone(), wallets.clone(), plan.clone()));
    let matching = MatchingEngine::new(
        store.clone(),
        PointLedger::new(store.clone(), plan),
        bonds.clone(),
    );
    (store, wallets, matching, bonds)
}

fn active(store: &MemoryNetworkStore, cap_limit: Decimal, cap_current: Decimal) -> Uuid {
    let mut p = Participant::new(Uuid::new_v4(), None, "US");
    p.is_active = true;
    p.cap_limit = cap_limit;
    p.cap_current = cap_current;
    store.put_participant(&p).unwrap();
    p.participant_id
}

fn seed(store: &MemoryNetworkStore, p: Uuid, side: Position, points: i64) {
    let lot = PointLot {
        lot_id: Uuid::now_v7(),
        participant_id: p,
        side,
        points: Decimal::from(points),
        source_event: format!("seed:{}", Uuid::new_v4()),
        created_at: Utc::now(),
        expires_at: Utc::now() + chrono::Duration::days(60),
    };
    store.record_fanout(&lot.source_event, &[lot.clone()]).unwrap();
}

fn leg_total(store: &MemoryNetworkStore, p: Uuid, side: Position) -> Decimal {
    store
        .lots(p, side)
        .unwrap()
        .iter()
        .map(|l| l.points)
        .sum()
}

proptest! {
    /// Matching consumes exactly min(left, right) from each leg
    #[test]
    fn matched_volume_is_smaller_leg(
        left_lots in prop::collection::vec(1i64..500, 0..8),
        right_lots in prop::collection::vec(1i64..500, 0..8),
    ) {
        let (store, _wallets, matching, _bonds) = engines();
        let p = active(&store, Decimal::ZERO, Decimal::ZERO);

        for points in &left_lots {
            seed(&store, p, Position::Left, *points);
        }
        for points in &right_lots {
            seed(&store, p, Position::Right, *points);
        }

        let left_before = leg_total(&store, p, Position::Left);
        let right_before = leg_total(&store, p, Position::Right);
        let expected = left_before.min(right_before);

        let outcome = matching.run_for(p, Utc::now()).unwrap();
        prop_assert_eq!(outcome.matched_points, expected);

        prop_assert_eq!(leg_total(&store, p, Position::Left), left_before - expected);
        prop_assert_eq!(leg_total(&store, p, Position::Right), right_before - expected);
    }

    /// credited + lost == gross and the cap is never exceeded
    #[test]
    fn cap_split_conserves_gross(
        cap_limit in 0i64..2000,
        cap_current in 0i64..2000,
        grosses in prop::collection::vec(1i64..800, 1..6),
    ) {
        prop_assume!(cap_current <= cap_limit);

        let (store, wallets, _matching, bonds) = engines();
        let p = active(&store, Decimal::from(cap_limit), Decimal::from(cap_current));

        let mut credited_total = Decimal::ZERO;
        for gross in &grosses {
            let entry = bonds
                .add_bond(p, BondType::Direct, Decimal::from(*gross), None, None, HashMap::new())
                .unwrap()
                .unwrap();
            prop_assert_eq!(entry.credited + entry.lost, entry.gross);
            prop_assert!(entry.credited >= Decimal::ZERO);
            prop_assert!(entry.lost >= Decimal::ZERO);
            credited_total += entry.credited;
        }

        let loaded = store.participant(p).unwrap().unwrap();
        if loaded.cap_limit > Decimal::ZERO {
            prop_assert!(loaded.cap_current <= loaded.cap_limit);
        }
        prop_assert_eq!(wallets.balance(p, None).unwrap(), credited_total);
    }

    /// Replaying a matching run after the queues drained pays nothing more
    #[test]
    fn rerun_after_drain_is_inert(
        points in 1i64..1000,
    ) {
        let (store, wallets, matching, _bonds) = engines();
        let p = active(&store, Decimal::ZERO, Decimal::ZERO);

        seed(&store, p, Position::Left, points);
        seed(&store, p, Position::Right, points);

        matching.run_for(p, Utc::now()).unwrap();
        let balance = wallets.balance(p, None).unwrap();

        let second = matching.run_for(p, Utc::now()).unwrap();
        prop_assert_eq!(second.matched_points, Decimal::ZERO);
        prop_assert!(second.bond.is_none());
        prop_assert_eq!(wallets.balance(p, None).unwrap(), balance);
    }
}
