//! Property tests for trade accounting.

mod common;

use common::*;
use commodityx::domain::error::CommodityxError;
use commodityx::domain::execution::TradingEngine;
use commodityx::domain::ledger;
use commodityx::domain::order::TradeRequest;
use commodityx::ports::store_port::Store;
use proptest::prelude::*;
use proptest::test_runner::Config;
use std::sync::Arc;

fn engine(balance: f64) -> (TradingEngine, i64) {
    let store = seeded_store();
    let user = fixture_user(store.as_ref(), "prop", balance);
    (TradingEngine::new(store as Arc<dyn Store>), user.id)
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * (1.0 + a.abs().max(b.abs()))
}

proptest! {
    #![proptest_config(Config::with_cases(48))]

    #[test]
    fn buys_debit_cash_and_track_average_cost(
        buys in prop::collection::vec((1u32..500, 1u32..500_000), 1..6)
    ) {
        let (engine, uid) = engine(1.0e12);
        let store = engine.store();

        for (qty, cents) in buys {
            let qty = f64::from(qty);
            let price = f64::from(cents) / 100.0;
            let before_cash = ledger::balance(store, uid).unwrap();
            let before_invested = store
                .find_position(uid, "GC=F")
                .unwrap()
                .map(|p| p.total_invested)
                .unwrap_or(0.0);

            let receipt = engine
                .execute_buy(&TradeRequest::new(uid, "GC=F", qty, price))
                .unwrap();

            let pos = store.find_position(uid, "GC=F").unwrap().unwrap();
            prop_assert!(close(receipt.new_balance, before_cash - qty * price));
            prop_assert!(close(pos.total_invested, before_invested + qty * price));
            prop_assert!(close(pos.average_price, pos.total_invested / pos.quantity));
        }
    }

    #[test]
    fn sells_credit_cash_and_reduce_quantity(
        held in 1u32..1_000,
        sell_fraction in 1u32..=100,
        buy_cents in 1u32..500_000,
        sell_cents in 1u32..500_000,
    ) {
        let (engine, uid) = engine(1.0e12);
        let store = engine.store();
        let held = f64::from(held);
        engine
            .execute_buy(&TradeRequest::new(uid, "GC=F", held, f64::from(buy_cents) / 100.0))
            .unwrap();

        let qty = (held * f64::from(sell_fraction) / 100.0).max(0.01);
        let price = f64::from(sell_cents) / 100.0;
        let before = ledger::balance(store, uid).unwrap();
        let receipt = engine
            .execute_sell(&TradeRequest::new(uid, "GC=F", qty, price))
            .unwrap();

        prop_assert!(close(receipt.new_balance, before + qty * price));
        match store.find_position(uid, "GC=F").unwrap() {
            Some(pos) => prop_assert!(close(pos.quantity, held - qty)),
            None => prop_assert!(close(held, qty)),
        }
    }

    #[test]
    fn oversells_fail_without_side_effects(
        held in 1u32..1_000,
        extra in 1u32..1_000,
    ) {
        let (engine, uid) = engine(1.0e9);
        let store = engine.store();
        let held = f64::from(held);
        engine
            .execute_buy(&TradeRequest::new(uid, "SI=F", held, 25.0))
            .unwrap();
        let before = ledger::balance(store, uid).unwrap();

        let result = engine.execute_sell(&TradeRequest::new(
            uid,
            "SI=F",
            held + f64::from(extra),
            26.0,
        ));

        let is_holdings_error = matches!(result, Err(CommodityxError::InsufficientHoldings { .. }));
        prop_assert!(is_holdings_error);
        prop_assert_eq!(ledger::balance(store, uid).unwrap(), before);
        let pos = store.find_position(uid, "SI=F").unwrap().unwrap();
        prop_assert_eq!(pos.quantity, held);
    }

    #[test]
    fn overbuys_fail_without_side_effects(
        cash_cents in 0u32..1_000_000,
        shortfall_cents in 1u32..1_000_000,
    ) {
        let cash = f64::from(cash_cents) / 100.0;
        let (engine, uid) = engine(cash);
        let store = engine.store();
        let cost = cash + f64::from(shortfall_cents) / 100.0;

        let result = engine.execute_buy(&TradeRequest::new(uid, "CL=F", 1.0, cost));

        let is_funds_error = matches!(result, Err(CommodityxError::InsufficientFunds { .. }));
        prop_assert!(is_funds_error);
        prop_assert_eq!(ledger::balance(store, uid).unwrap(), cash);
        prop_assert!(store.find_position(uid, "CL=F").unwrap().is_none());
    }
}
