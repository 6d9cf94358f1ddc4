//! End-to-end scenario tests (S1-S8), run against the public engine API
//! the way an external integrator would use it.

use alloy_primitives::U256;
use std::sync::Arc;

use pmx::{
    AdminAuthority, EngineError, EngineEvent, EventSink, InMemoryEventSink, InMemoryLedger,
    MatchingEngine, Outcome, ParticipantId, Side, StaticAdminSet,
};

fn mult() -> U256 {
    U256::from(10u64).pow(U256::from(18u64))
}

fn test_engine() -> (MatchingEngine, Arc<InMemoryLedger>, Arc<InMemoryEventSink>) {
    let ledger = Arc::new(InMemoryLedger::new());
    let sink = Arc::new(InMemoryEventSink::new());
    let admin: Arc<dyn AdminAuthority + Send + Sync> =
        Arc::new(StaticAdminSet::new([ParticipantId::new("root")]));
    let engine = MatchingEngine::new(ledger.clone(), admin, sink.clone(), mult());
    (engine, ledger, sink)
}

#[test]
fn s1_basic_mint() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let alice = ParticipantId::new("alice");

    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&alice, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 400, U256::from(100u64), Outcome::No, &bob)
        .unwrap();
    assert_eq!(ledger.balance_of(&bob), U256::from(960u64) * mult());

    let fulfilled = engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();

    assert_eq!(fulfilled, U256::from(100u64));
    assert_eq!(ledger.balance_of(&alice), U256::from(940u64) * mult());
    engine
        .with_market(market_id, |m| {
            assert_eq!(m.balance(Outcome::Yes, &alice), U256::from(100u64));
            assert_eq!(m.balance(Outcome::No, &bob), U256::from(100u64));
            assert_eq!(m.total_collateral, U256::from(100u64) * mult());
        })
        .unwrap();
}

#[test]
fn s2_partial_fill() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let alice = ParticipantId::new("alice");
    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&alice, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 400, U256::from(50u64), Outcome::No, &bob)
        .unwrap();
    let fulfilled = engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(fulfilled, U256::from(50u64));
}

#[test]
fn s3_multi_level_descending_scan() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let alice = ParticipantId::new("alice");
    ledger.fund(&bob, U256::from(10_000u64) * mult());
    ledger.fund(&alice, U256::from(10_000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 500, U256::from(30u64), Outcome::No, &bob)
        .unwrap();
    engine
        .limit_buy(market_id, 400, U256::from(50u64), Outcome::No, &bob)
        .unwrap();
    engine
        .limit_buy(market_id, 600, U256::from(20u64), Outcome::No, &bob)
        .unwrap();

    let fulfilled = engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(fulfilled, U256::from(100u64));
}

#[test]
fn s4_price_level_clearing_emits_event() {
    let (engine, ledger, sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let alice = ParticipantId::new("alice");
    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&alice, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 500, U256::from(100u64), Outcome::No, &bob)
        .unwrap();
    engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();

    let cleared = sink.events_for_market(market_id).into_iter().any(|e| {
        matches!(
            e,
            EngineEvent::PriceLevelCleared {
                price: 500,
                outcome: Outcome::No,
                ..
            }
        )
    });
    assert!(cleared);
}

#[test]
fn s5_fifo_within_a_price() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let charlie = ParticipantId::new("charlie");
    let alice = ParticipantId::new("alice");
    let minter = ParticipantId::new("minter");
    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&charlie, U256::from(1000u64) * mult());
    ledger.fund(&alice, U256::from(1000u64) * mult());
    ledger.fund(&minter, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();

    // Give Alice 40 Yes shares via mint so she has something to sell.
    engine
        .limit_buy(market_id, 500, U256::from(40u64), Outcome::No, &minter)
        .unwrap();
    engine
        .market_buy(market_id, U256::from(40u64), Outcome::Yes, &alice)
        .unwrap();

    // Bob then Charlie rest Yes bids at the same price, in that order.
    engine
        .limit_buy(market_id, 600, U256::from(50u64), Outcome::Yes, &bob)
        .unwrap();
    engine
        .limit_buy(market_id, 600, U256::from(30u64), Outcome::Yes, &charlie)
        .unwrap();

    let fulfilled = engine
        .market_sell(market_id, U256::from(40u64), Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(fulfilled, U256::from(40u64));
    engine
        .with_market(market_id, |m| {
            assert_eq!(m.balance(Outcome::Yes, &bob), U256::from(40u64));
            assert_eq!(m.balance(Outcome::Yes, &charlie), U256::ZERO);
        })
        .unwrap();
}

#[test]
fn s6_sell_ignores_same_outcome_asks() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let bob = ParticipantId::new("bob");
    let charlie = ParticipantId::new("charlie");
    ledger.fund(&bob, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    // Give Charlie 100 Yes via mint.
    engine
        .limit_buy(market_id, 400, U256::from(100u64), Outcome::No, &bob)
        .unwrap();
    engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &charlie)
        .unwrap();

    engine
        .limit_sell(market_id, 600, U256::from(50u64), Outcome::Yes, &charlie)
        .unwrap();

    let fulfilled = engine
        .market_sell(market_id, U256::from(50u64), Outcome::Yes, &charlie)
        .unwrap();
    assert_eq!(fulfilled, U256::ZERO);
}

#[test]
fn s7_full_lifecycle() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let alice = ParticipantId::new("alice");
    let bob = ParticipantId::new("bob");
    let charlie = ParticipantId::new("charlie");
    ledger.fund(&alice, U256::from(1000u64) * mult());
    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&charlie, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 600, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();
    engine
        .limit_buy(market_id, 400, U256::from(150u64), Outcome::No, &bob)
        .unwrap();
    let fulfilled = engine
        .market_buy(market_id, U256::from(100u64), Outcome::Yes, &charlie)
        .unwrap();
    assert_eq!(fulfilled, U256::from(100u64));

    engine.resolve_market(&root, market_id, Outcome::Yes).unwrap();

    let paid = engine.claim(market_id, &charlie).unwrap();
    assert_eq!(paid, U256::from(100u64) * mult());

    let err = engine.claim(market_id, &bob).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientShares { .. }));
}

/// A partial `market_sell` against a resting bid must decrement that
/// level's `total_size` in step with the order's own remaining size --
/// `limit_buy(Yes, 600)` and `market_buy(No, ...)` both read the same
/// `yes_levels[600]` (price inversion maps `¬(¬X) = X`), so a stale
/// `total_size` left behind by `market_sell` corrupts a later, unrelated
/// `market_buy` against the very same level.
#[test]
fn total_size_stays_accurate_across_partial_sell_then_market_buy() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let minter = ParticipantId::new("minter");
    let alice = ParticipantId::new("alice");
    let bob = ParticipantId::new("bob");
    let charlie = ParticipantId::new("charlie");
    ledger.fund(&minter, U256::from(1000u64) * mult());
    ledger.fund(&alice, U256::from(1000u64) * mult());
    ledger.fund(&bob, U256::from(1000u64) * mult());
    ledger.fund(&charlie, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();

    // Give Alice 40 Yes shares to sell.
    engine
        .limit_buy(market_id, 500, U256::from(40u64), Outcome::No, &minter)
        .unwrap();
    engine
        .market_buy(market_id, U256::from(40u64), Outcome::Yes, &alice)
        .unwrap();

    // Bob rests a 100-share Yes bid at 600; lives in yes_levels[600].
    engine
        .limit_buy(market_id, 600, U256::from(100u64), Outcome::Yes, &bob)
        .unwrap();

    // Alice partially fills it by selling 40 of her Yes shares.
    let sold = engine
        .market_sell(market_id, U256::from(40u64), Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(sold, U256::from(40u64));
    engine
        .with_market(market_id, |m| {
            let level = &m.yes_levels[&600];
            assert_eq!(level.total_size, U256::from(60u64));
            assert_eq!(level.orders[0].size, U256::from(60u64));
        })
        .unwrap();

    // Charlie now mints against the remaining 60 shares of Bob's bid via
    // marketBuy(No, ...), which reads the same yes_levels[600] level. A
    // stale total_size of 100 here would make this loop re-select the
    // drained tick and report far more than 60 filled, or spin without
    // making progress.
    let fulfilled = engine
        .market_buy(market_id, U256::from(60u64), Outcome::No, &charlie)
        .unwrap();
    assert_eq!(fulfilled, U256::from(60u64));

    engine
        .with_market(market_id, |m| {
            assert!(!m.yes_levels.contains_key(&600) || m.yes_levels[&600].total_size == U256::ZERO);
            assert_eq!(m.balance(Outcome::Yes, &bob), U256::from(100u64));
        })
        .unwrap();
}

#[test]
fn s8_cancel_refund() {
    let (engine, ledger, _sink) = test_engine();
    let root = ParticipantId::new("root");
    let alice = ParticipantId::new("alice");
    ledger.fund(&alice, U256::from(1000u64) * mult());

    let market_id = engine.create_market(&root).unwrap();
    engine
        .limit_buy(market_id, 600, U256::from(100u64), Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(ledger.balance_of(&alice), U256::from(940u64) * mult());

    engine
        .cancel(market_id, 600, 0, Side::Bid, Outcome::Yes, &alice)
        .unwrap();
    assert_eq!(ledger.balance_of(&alice), U256::from(1000u64) * mult());

    let fulfilled = engine
        .market_buy(market_id, U256::from(1u64), Outcome::No, &alice)
        .unwrap();
    assert_eq!(fulfilled, U256::ZERO);
}
