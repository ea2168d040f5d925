//! Races over the store's claim points.

use std::sync::Arc;
use std::thread;

use super::super::*;
use super::{affiliate, august, chain, deposit, referral, IN_AUGUST, SETTLE_AT};

#[test]
fn concurrent_acquisition_grants_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 10_000, IN_AUGUST));

    let engine = Arc::new(
        AcquisitionEngine::new(CommissionPlan::default(), store.clone(), bus.clone())
            .expect("engine"),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.process("ref-1", IN_AUGUST + 1_000))
        })
        .collect();
    let outcomes: Vec<AcquisitionOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join").expect("process"))
        .collect();

    let winners = outcomes
        .iter()
        .filter(|outcome| outcome.skipped.is_none())
        .count();
    assert_eq!(winners, 1);
    assert!(outcomes
        .iter()
        .filter(|outcome| outcome.skipped.is_some())
        .all(|outcome| outcome.skipped == Some(AcquisitionSkip::AlreadyProcessed)));

    assert_eq!(store.commissions().len(), 2);
    let direct = store.affiliate("a").expect("query").expect("affiliate");
    assert_eq!(direct.validated_referrals, 1);
    assert_eq!(direct.lifetime_commissions_cents, 3_000);
}

#[test]
fn concurrent_settlement_claims_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 40_000, IN_AUGUST));

    let engine = Arc::new(
        RevenueShareEngine::new(CommissionPlan::default(), store.clone(), bus.clone())
            .expect("engine"),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.distribute("a", august(), SETTLE_AT))
        })
        .collect();
    let outcomes: Vec<DistributionOutcome> = handles
        .into_iter()
        .map(|handle| handle.join().expect("join").expect("distribute"))
        .collect();

    let winners = outcomes
        .iter()
        .filter(|outcome| outcome.skipped.is_none())
        .count();
    assert_eq!(winners, 1);
    assert_eq!(store.commissions().len(), 2);
    let source = store.affiliate("a").expect("query").expect("affiliate");
    assert_eq!(source.available_balance_cents, 10_000);
    assert_eq!(source.negative_carryover_cents, 0);
}

#[test]
fn downlines_settling_together_both_credit_the_shared_sponsor() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    store.seed_affiliate(affiliate("top", None));
    store.seed_affiliate(affiliate("left", Some("top")));
    store.seed_affiliate(affiliate("right", Some("top")));
    store.seed_referral(referral("ref-left", "left", "cust-left"));
    store.seed_referral(referral("ref-right", "right", "cust-right"));
    store.seed_transaction(deposit("tx-left", "cust-left", 10_000, IN_AUGUST));
    store.seed_transaction(deposit("tx-right", "cust-right", 10_000, IN_AUGUST));

    let engine = Arc::new(
        RevenueShareEngine::new(CommissionPlan::default(), store.clone(), bus.clone())
            .expect("engine"),
    );

    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|source| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.distribute(source, august(), SETTLE_AT))
        })
        .collect();
    for handle in handles {
        let outcome = handle.join().expect("join").expect("distribute");
        assert_eq!(outcome.skipped, None);
        assert_eq!(outcome.distributed_cents, 2_500 + 200);
    }

    let sponsored = store.commissions_for("top");
    assert_eq!(sponsored.len(), 2);
    assert!(sponsored.iter().all(|commission| commission.level == 2));
    let sponsor = store.affiliate("top").expect("query").expect("affiliate");
    assert_eq!(sponsor.available_balance_cents, 400);
    assert_eq!(sponsor.lifetime_commissions_cents, 400);
}
