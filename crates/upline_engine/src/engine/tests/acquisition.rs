//! Acquisition bonus flow tests.

use std::sync::Arc;

use super::super::*;
use super::{affiliate, chain, deposit, referral, transaction, FailingBus, IN_AUGUST};

fn engine_with(
    plan: CommissionPlan,
    store: &Arc<MemoryStore>,
    bus: &Arc<MemoryBus>,
) -> AcquisitionEngine {
    AcquisitionEngine::new(plan, store.clone(), bus.clone()).expect("engine")
}

#[test]
fn bonus_flows_up_the_chain() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b", "c"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    assert_eq!(outcome.skipped, None);
    assert_eq!(outcome.walked_levels, 3);
    assert_eq!(outcome.max_levels, 5);
    assert_eq!(outcome.total_cents, 3_700);
    let amounts: Vec<(Level, i64)> = outcome
        .lines
        .iter()
        .map(|line| (line.level, line.amount_cents))
        .collect();
    assert_eq!(amounts, vec![(1, 3_000), (2, 500), (3, 200)]);
    assert!(outcome.settlement_hash.is_some());

    // The direct affiliate's aggregates moved; nothing touched the
    // available balance at calculation time.
    let direct = store.affiliate("a").expect("query").expect("affiliate");
    assert_eq!(direct.lifetime_commissions_cents, 3_000);
    assert_eq!(direct.available_balance_cents, 0);
    assert_eq!(direct.validated_referrals, 1);

    let upline = store.commissions_for("b");
    assert_eq!(upline.len(), 1);
    assert_eq!(upline[0].kind, CommissionKind::Cpa);
    assert_eq!(upline[0].level, 2);
    assert_eq!(upline[0].source_affiliate_id.as_deref(), Some("a"));
    assert_eq!(upline[0].referral_id.as_deref(), Some("ref-1"));

    let updated = store.referral("ref-1").expect("query").expect("referral");
    assert!(updated.is_validated);
    assert!(updated.cpa_processed);

    let events = bus.published();
    assert_eq!(events.len(), 4);
    let granted = events
        .iter()
        .filter(|event| matches!(event, EngineEvent::AcquisitionGranted { .. }))
        .count();
    assert_eq!(granted, 1);
    match events.last().expect("event") {
        EngineEvent::AcquisitionGranted {
            total_cents,
            levels_paid,
            ..
        } => {
            assert_eq!(*total_cents, 3_700);
            assert_eq!(*levels_paid, 3);
        }
        other => panic!("expected grant event, got {other:?}"),
    }
}

#[test]
fn second_process_is_a_no_op() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    engine.process("ref-1", IN_AUGUST).expect("first");
    let created = store.commissions().len();

    let again = engine.process("ref-1", IN_AUGUST + 1_000).expect("second");
    assert_eq!(again.skipped, Some(AcquisitionSkip::AlreadyProcessed));
    assert!(again.lines.is_empty());
    assert_eq!(again.events_published, 0);
    assert_eq!(store.commissions().len(), created);

    let direct = store.affiliate("a").expect("query").expect("affiliate");
    assert_eq!(direct.validated_referrals, 1);
    assert_eq!(direct.lifetime_commissions_cents, 3_000);
}

#[test]
fn ineligible_referral_leaves_everything_untouched() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 4_999, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    match outcome.skipped {
        Some(AcquisitionSkip::NotEligible { reason }) => {
            assert!(reason.contains("5000"), "unhelpful reason: {reason}");
        }
        other => panic!("expected not-eligible skip, got {other:?}"),
    }
    assert!(store.commissions().is_empty());
    assert!(bus.published().is_empty());

    let untouched = store.referral("ref-1").expect("query").expect("referral");
    assert!(!untouched.is_validated);
    assert!(!untouched.cpa_processed);
}

#[test]
fn validate_reports_eligibility_without_writing() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 7_500, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let decision = engine.validate("ref-1").expect("validate");

    assert!(decision.eligible);
    assert_eq!(decision.qualifying_transaction_id.as_deref(), Some("tx-1"));
    assert_eq!(decision.qualifying_deposit_cents, Some(7_500));

    assert!(store.commissions().is_empty());
    let untouched = store.referral("ref-1").expect("query").expect("referral");
    assert!(!untouched.cpa_processed);
}

#[test]
fn validate_reports_not_eligible_once_processed() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let before = engine.validate("ref-1").expect("validate");
    assert!(before.eligible);

    engine.process("ref-1", IN_AUGUST).expect("process");

    // The deposit still satisfies the model, but the bonus already went out.
    let after = engine.validate("ref-1").expect("validate");
    assert!(!after.eligible);
    assert_eq!(after.qualifying_transaction_id, None);
    let reason = after.reason.expect("reason");
    assert!(reason.contains("processed"), "unhelpful reason: {reason}");
}

#[test]
fn missing_referral_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let engine = engine_with(CommissionPlan::default(), &store, &bus);

    assert!(matches!(
        engine.process("ghost", IN_AUGUST),
        Err(EngineError::ReferralNotFound { .. })
    ));
    assert!(matches!(
        engine.validate("ghost"),
        Err(EngineError::ReferralNotFound { .. })
    ));
}

#[test]
fn missing_direct_affiliate_aborts_before_claiming() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    store.seed_referral(referral("ref-1", "ghost", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    assert!(matches!(
        engine.process("ref-1", IN_AUGUST),
        Err(EngineError::AffiliateNotFound { .. })
    ));

    // The claim never happened, so fixing the data allows a retry.
    let untouched = store.referral("ref-1").expect("query").expect("referral");
    assert!(!untouched.cpa_processed);
}

#[test]
fn zero_amount_levels_become_skipped_lines() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let mut plan = CommissionPlan::default();
    for row in &mut plan.tiers {
        row.cpa_amounts_cents = vec![3_000];
    }
    let engine = engine_with(plan, &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    assert_eq!(outcome.total_cents, 3_000);
    assert_eq!(outcome.lines.len(), 2);
    assert_eq!(outcome.lines[1].skipped, Some(LineSkip::ZeroAmount));
    assert_eq!(outcome.lines[1].commission_id, None);
    assert_eq!(store.commissions().len(), 1);
}

#[test]
fn boundary_referral_pays_old_tier_then_promotes() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let mut acquirer = affiliate("a", None);
    acquirer.validated_referrals = 10;
    store.seed_affiliate(acquirer);
    store.seed_referral(referral("ref-11", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let outcome = engine.process("ref-11", IN_AUGUST).expect("process");

    // Amounts come from the tier in force before the new referral counted.
    assert_eq!(outcome.lines[0].amount_cents, 3_000);

    let update = outcome.tier_update.expect("tier update");
    assert_eq!(update.validated_referrals, 11);
    assert_eq!(update.tier, "silver");
    assert_eq!(update.tier_level, 2);
    assert!(update.promoted);

    let promoted = store.affiliate("a").expect("query").expect("affiliate");
    assert_eq!(promoted.tier, "silver");
    assert_eq!(promoted.tier_level, 2);
}

#[test]
fn amounts_follow_the_acquirers_tier_for_every_level() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let mut acquirer = affiliate("a", Some("b"));
    acquirer.validated_referrals = 40;
    acquirer.tier = "gold".to_string();
    acquirer.tier_level = 3;
    store.seed_affiliate(acquirer);
    store.seed_affiliate(affiliate("b", None));
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    // The upline is bronze, but acquisition amounts follow the acquirer's
    // gold schedule.
    assert_eq!(outcome.lines[0].amount_cents, 4_500);
    assert_eq!(outcome.lines[1].amount_cents, 750);
}

#[test]
fn deposit_plus_activity_flow() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 2_500, IN_AUGUST));
    for (id, at) in [("tx-2", IN_AUGUST + 1_000), ("tx-3", IN_AUGUST + 2_000)] {
        store.seed_transaction(transaction(
            id,
            "cust-1",
            TransactionKind::Bet,
            200,
            TransactionStatus::Completed,
            at,
        ));
    }

    let plan = CommissionPlan {
        cpa_model: CpaModel::DepositPlusActivity {
            min_deposit_cents: 2_000,
            min_bets: 2,
            min_ggr_cents: 0,
        },
        ..CommissionPlan::default()
    };
    let engine = engine_with(plan, &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST + 3_000).expect("process");

    assert_eq!(outcome.skipped, None);
    assert_eq!(outcome.total_cents, 3_000);
}

#[test]
fn outcome_survives_a_json_round_trip_on_disk() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine = engine_with(CommissionPlan::default(), &store, &bus);
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    let unique = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = std::env::temp_dir().join(format!("upline-grant-{unique}.json"));
    outcome.save_json(&path).expect("save");
    let restored = AcquisitionOutcome::load_json(&path).expect("load");
    assert_eq!(restored, outcome);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn publish_failure_never_rolls_back_the_ledger() {
    let store = Arc::new(MemoryStore::new());
    chain(&store, &["a", "b"]);
    store.seed_referral(referral("ref-1", "a", "cust-1"));
    store.seed_transaction(deposit("tx-1", "cust-1", 6_000, IN_AUGUST));

    let engine =
        AcquisitionEngine::new(CommissionPlan::default(), store.clone(), Arc::new(FailingBus))
            .expect("engine");
    let outcome = engine.process("ref-1", IN_AUGUST).expect("process");

    assert_eq!(outcome.skipped, None);
    assert_eq!(outcome.events_published, 0);
    assert_eq!(outcome.total_cents, 3_500);
    assert_eq!(store.commissions().len(), 2);
}

#[test]
fn invalid_plan_is_rejected_at_construction() {
    let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
    let mut plan = CommissionPlan::default();
    plan.tiers.clear();

    let result = AcquisitionEngine::new(plan, store, Arc::new(MemoryBus::new()));
    assert!(matches!(result, Err(EngineError::PlanInvalid { .. })));
}
