//! `MatchingEngine`: the nine core operations over a set of `Market`s, plus
//! the optional `sweep_unmatched_bids` maintenance entry point.
//!
//! Every market lives behind one `Mutex<HashMap<MarketId, Market>>` -- all
//! mutating operations on a given market run as if under a mutex held for
//! the operation's entire duration, matching the single-writer contract the
//! match loop depends on. Each operation stages its index/balance mutations
//! on a cloned scratch copy of the `Market`, performs any fallible
//! `CollateralLedger` calls, and only swaps the scratch copy back in once
//! those calls have succeeded -- a failed operation never becomes visible.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::U256;
use tracing::{debug, instrument, warn};

use crate::admin::AdminAuthority;
use crate::errors::EngineError;
use crate::events::{EngineEvent, EventSink};
use crate::ledger::{CollateralLedger, LedgerError};
use crate::market::Market;
use crate::price_level::LimitOrder;
use crate::types::{MarketId, OrderId, Outcome, ParticipantId, Side, BPS};

/// `size * price_or_tick * mult / BPS`, truncating toward zero.
fn collateral_amount(size: U256, price_or_tick: u32, mult: U256) -> U256 {
    size * U256::from(price_or_tick) * mult / U256::from(BPS)
}

pub struct MatchingEngine {
    markets: Mutex<HashMap<MarketId, Market>>,
    next_market_id: Mutex<MarketId>,
    ledger: Arc<dyn CollateralLedger + Send + Sync>,
    admin: Arc<dyn AdminAuthority + Send + Sync>,
    sink: Arc<dyn EventSink + Send + Sync>,
    mult: U256,
}

impl MatchingEngine {
    pub fn new(
        ledger: Arc<dyn CollateralLedger + Send + Sync>,
        admin: Arc<dyn AdminAuthority + Send + Sync>,
        sink: Arc<dyn EventSink + Send + Sync>,
        mult: U256,
    ) -> Self {
        Self {
            markets: Mutex::new(HashMap::new()),
            next_market_id: Mutex::new(0),
            ledger,
            admin,
            sink,
            mult,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn CollateralLedger + Send + Sync> {
        &self.ledger
    }

    /// Snapshot of a market's resolution state, for the CLI's `report`
    /// command. Returns `None` if no such market was ever created.
    pub fn with_market<R>(&self, market_id: MarketId, f: impl FnOnce(&Market) -> R) -> Option<R> {
        let markets = self.markets.lock().expect("markets mutex poisoned");
        markets.get(&market_id).map(f)
    }

    #[instrument(skip(self, admin_caller))]
    pub fn create_market(&self, admin_caller: &ParticipantId) -> Result<MarketId, EngineError> {
        let result = self.create_market_inner(admin_caller);
        log_result(&result, |id| debug!(market_id = id, "market created"));
        result
    }

    fn create_market_inner(&self, admin_caller: &ParticipantId) -> Result<MarketId, EngineError> {
        self.admin.require_admin(admin_caller)?;
        let mut next_id = self.next_market_id.lock().expect("id mutex poisoned");
        let id = *next_id;
        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        markets.insert(id, Market::new(id));
        *next_id += 1;
        self.sink.emit(EngineEvent::MarketCreated { market_id: id });
        Ok(id)
    }

    #[instrument(skip(self, admin_caller))]
    pub fn resolve_market(
        &self,
        admin_caller: &ParticipantId,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<(), EngineError> {
        let result = self.resolve_market_inner(admin_caller, market_id, outcome);
        log_result(&result, |_| debug!(market_id, %outcome, "market resolved"));
        result
    }

    fn resolve_market_inner(
        &self,
        admin_caller: &ParticipantId,
        market_id: MarketId,
        outcome: Outcome,
    ) -> Result<(), EngineError> {
        self.admin.require_admin(admin_caller)?;
        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.active {
            return Err(EngineError::MarketNotActive { market_id });
        }
        if market.resolved {
            return Err(EngineError::MarketAlreadyResolved { market_id });
        }
        market.resolved = true;
        market.outcome = Some(outcome);
        self.sink
            .emit(EngineEvent::MarketResolved { market_id, outcome });
        Ok(())
    }

    #[instrument(skip(self, maker))]
    pub fn limit_buy(
        &self,
        market_id: MarketId,
        price: u32,
        size: U256,
        outcome: Outcome,
        maker: &ParticipantId,
    ) -> Result<OrderId, EngineError> {
        let result = self.limit_buy_inner(market_id, price, size, outcome, maker);
        log_result(&result, |id| debug!(%id, "limit_buy placed"));
        result
    }

    fn limit_buy_inner(
        &self,
        market_id: MarketId,
        price: u32,
        size: U256,
        outcome: Outcome,
        maker: &ParticipantId,
    ) -> Result<OrderId, EngineError> {
        validate_price(price)?;
        validate_size(size)?;

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.is_tradeable() {
            return Err(EngineError::MarketNotActive { market_id });
        }

        let cost = collateral_amount(size, price, self.mult);
        self.ledger.debit(maker, cost)?;

        let book = market.book_mut(outcome);
        let level = book.levels.entry(price).or_default();
        let index = level.push(LimitOrder::new(maker.clone(), size, Side::Bid));
        book.unified.set(price);
        book.bid_only.set(price);

        let order_id = OrderId::new(market_id, price, index as u64);
        self.sink.emit(EngineEvent::LimitOrderPlaced {
            market_id,
            maker: maker.clone(),
            order_id,
            price,
            size,
            outcome,
            side: Side::Bid,
        });
        Ok(order_id)
    }

    #[instrument(skip(self, maker))]
    pub fn limit_sell(
        &self,
        market_id: MarketId,
        price: u32,
        size: U256,
        outcome: Outcome,
        maker: &ParticipantId,
    ) -> Result<OrderId, EngineError> {
        let result = self.limit_sell_inner(market_id, price, size, outcome, maker);
        log_result(&result, |id| debug!(%id, "limit_sell placed"));
        result
    }

    fn limit_sell_inner(
        &self,
        market_id: MarketId,
        price: u32,
        size: U256,
        outcome: Outcome,
        maker: &ParticipantId,
    ) -> Result<OrderId, EngineError> {
        validate_price(price)?;
        validate_size(size)?;

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.is_tradeable() {
            return Err(EngineError::MarketNotActive { market_id });
        }
        if market.balance(outcome, maker) < size {
            return Err(EngineError::InsufficientShares {
                who: maker.clone(),
                outcome,
            });
        }

        market.debit_balance(outcome, maker, size);

        let tick = BPS - price;
        let opposite = outcome.opposite();
        let book = market.book_mut(opposite);
        let level = book.levels.entry(tick).or_default();
        let index = level.push(LimitOrder::new(maker.clone(), size, Side::Ask));
        book.unified.set(tick);

        let order_id = OrderId::new(market_id, tick, index as u64);
        self.sink.emit(EngineEvent::LimitOrderPlaced {
            market_id,
            maker: maker.clone(),
            order_id,
            price,
            size,
            outcome,
            side: Side::Ask,
        });
        Ok(order_id)
    }

    #[instrument(skip(self, caller))]
    pub fn cancel(
        &self,
        market_id: MarketId,
        price: u32,
        index: u64,
        side: Side,
        outcome: Outcome,
        caller: &ParticipantId,
    ) -> Result<(), EngineError> {
        let result = self.cancel_inner(market_id, price, index, side, outcome, caller);
        log_result(&result, |_| debug!("order cancelled"));
        result
    }

    fn cancel_inner(
        &self,
        market_id: MarketId,
        price: u32,
        index: u64,
        side: Side,
        outcome: Outcome,
        caller: &ParticipantId,
    ) -> Result<(), EngineError> {
        let (resolved_outcome, tick) = match side {
            Side::Bid => (outcome, price),
            Side::Ask => (outcome.opposite(), BPS - price),
        };

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.is_tradeable() {
            return Err(EngineError::MarketNotActive { market_id });
        }

        let order_not_found = || EngineError::OrderNotFound {
            price,
            index,
            side,
            outcome,
        };

        let size = {
            let book = market.book(resolved_outcome);
            let level = book.levels.get(&tick).ok_or_else(order_not_found)?;
            let order = level.orders.get(index as usize).ok_or_else(order_not_found)?;
            if order.maker != *caller {
                return Err(EngineError::Unauthorized {
                    caller: caller.clone(),
                });
            }
            order.size
        };

        if side == Side::Bid {
            let refund = collateral_amount(size, price, self.mult);
            self.ledger.credit(caller, refund)?;
        }

        let book = market.book_mut(resolved_outcome);
        {
            let level = book.levels.get_mut(&tick).expect("checked above");
            level.orders[index as usize].size = U256::ZERO;
            level.total_size -= size;
        }

        if side == Side::Ask {
            market.credit_balance(outcome, caller, size);
        }

        let book = market.book_mut(resolved_outcome);
        if book.levels.get(&tick).expect("checked above").is_empty_of_size() {
            book.unified.unset(tick);
            book.bid_only.unset(tick);
        }

        let order_id = OrderId::new(market_id, tick, index);
        self.sink.emit(EngineEvent::OrderCancelled {
            market_id,
            maker: caller.clone(),
            order_id,
        });
        Ok(())
    }

    #[instrument(skip(self, taker))]
    pub fn market_buy(
        &self,
        market_id: MarketId,
        size: U256,
        outcome: Outcome,
        taker: &ParticipantId,
    ) -> Result<U256, EngineError> {
        let result = self.market_buy_inner(market_id, size, outcome, taker);
        log_result(&result, |fulfilled| debug!(%fulfilled, "market_buy filled"));
        result
    }

    fn market_buy_inner(
        &self,
        market_id: MarketId,
        size: U256,
        outcome: Outcome,
        taker: &ParticipantId,
    ) -> Result<U256, EngineError> {
        validate_size(size)?;

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.is_tradeable() {
            return Err(EngineError::MarketNotActive { market_id });
        }

        let mut scratch = market.clone();
        let opposite = outcome.opposite();
        let mut remaining = size;
        let mut fulfilled = U256::ZERO;
        let mut mint_owed_total = U256::ZERO;
        let mut ask_settlements: Vec<(ParticipantId, U256)> = Vec::new();
        let mut events = Vec::new();

        while remaining > U256::ZERO {
            let Some(tick) = scratch.book(opposite).unified.find_last_set(BPS) else {
                break;
            };

            let mut mint_count_here = U256::ZERO;
            {
                let book = scratch.book_mut(opposite);
                let level = book
                    .levels
                    .get_mut(&tick)
                    .expect("unified tick implies level exists");

                let cleared_here = remaining.min(level.total_size);
                level.total_size -= cleared_here;
                if level.total_size == U256::ZERO {
                    book.unified.unset(tick);
                    book.bid_only.unset(tick);
                    events.push(EngineEvent::PriceLevelCleared {
                        market_id,
                        price: tick,
                        outcome: opposite,
                    });
                }

                let mut i = level.next_order_index;
                while i < level.orders.len() && remaining > U256::ZERO {
                    if level.orders[i].size == U256::ZERO {
                        i += 1;
                        continue;
                    }
                    let c = remaining.min(level.orders[i].size);
                    level.orders[i].size -= c;
                    remaining -= c;
                    fulfilled += c;
                    let maker = level.orders[i].maker.clone();
                    let order_side = level.orders[i].side;
                    let order_id = OrderId::new(market_id, tick, i as u64);

                    match order_side {
                        Side::Bid => {
                            mint_count_here += c;
                            let bal = book.balances.entry(maker.clone()).or_insert(U256::ZERO);
                            *bal += c;
                            events.push(EngineEvent::OrderFilled {
                                market_id,
                                maker: maker.clone(),
                                order_id,
                                size: c,
                                taker: taker.clone(),
                            });
                            events.push(EngineEvent::SharesTransferred {
                                market_id,
                                from: None,
                                to: maker,
                                amount: c,
                                outcome: opposite,
                            });
                        }
                        Side::Ask => {
                            let owed = collateral_amount(c, BPS - tick, self.mult);
                            ask_settlements.push((maker.clone(), owed));
                            events.push(EngineEvent::OrderFilled {
                                market_id,
                                maker,
                                order_id,
                                size: c,
                                taker: taker.clone(),
                            });
                        }
                    }

                    if remaining == U256::ZERO {
                        break;
                    }
                    level.next_order_index = i + 1;
                    i += 1;
                }

                debug_assert_eq!(
                    level.total_size,
                    level.live_size_sum(),
                    "total_size drifted from live order sizes at tick {tick}"
                );
            }

            if mint_count_here > U256::ZERO {
                let owed = collateral_amount(mint_count_here, BPS - tick, self.mult);
                mint_owed_total += owed;
                scratch.total_collateral += mint_count_here * self.mult;
            }
        }

        let ask_total: U256 = ask_settlements
            .iter()
            .fold(U256::ZERO, |acc, (_, amount)| acc + *amount);
        let total_owed = mint_owed_total + ask_total;
        if total_owed > U256::ZERO && self.ledger.balance_of(taker) < total_owed {
            return Err(EngineError::Ledger(LedgerError::InsufficientBalance {
                who: taker.clone(),
                have: self.ledger.balance_of(taker),
                need: total_owed,
            }));
        }
        for (maker, amount) in &ask_settlements {
            self.ledger.transfer_within(taker, maker, *amount)?;
        }
        if mint_owed_total > U256::ZERO {
            self.ledger.debit(taker, mint_owed_total)?;
        }

        if fulfilled > U256::ZERO {
            scratch.credit_balance(outcome, taker, fulfilled);
            events.push(EngineEvent::MarketOrderExecuted {
                market_id,
                taker: taker.clone(),
                fulfilled,
                outcome,
                side: Side::Bid,
            });
            events.push(EngineEvent::SharesTransferred {
                market_id,
                from: None,
                to: taker.clone(),
                amount: fulfilled,
                outcome,
            });
        }

        markets.insert(market_id, scratch);
        drop(markets);
        for event in events {
            self.sink.emit(event);
        }
        Ok(fulfilled)
    }

    #[instrument(skip(self, taker))]
    pub fn market_sell(
        &self,
        market_id: MarketId,
        size: U256,
        outcome: Outcome,
        taker: &ParticipantId,
    ) -> Result<U256, EngineError> {
        let result = self.market_sell_inner(market_id, size, outcome, taker);
        log_result(&result, |fulfilled| debug!(%fulfilled, "market_sell filled"));
        result
    }

    fn market_sell_inner(
        &self,
        market_id: MarketId,
        size: U256,
        outcome: Outcome,
        taker: &ParticipantId,
    ) -> Result<U256, EngineError> {
        validate_size(size)?;

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.is_tradeable() {
            return Err(EngineError::MarketNotActive { market_id });
        }
        if market.balance(outcome, taker) < size {
            return Err(EngineError::InsufficientShares {
                who: taker.clone(),
                outcome,
            });
        }

        let mut scratch = market.clone();
        let mut remaining = size;
        let mut fulfilled = U256::ZERO;
        let mut credit_total = U256::ZERO;
        let mut events = Vec::new();

        while remaining > U256::ZERO {
            let Some(tick) = scratch.book(outcome).bid_only.find_last_set(BPS) else {
                break;
            };

            {
                let book = scratch.book_mut(outcome);
                let level = book
                    .levels
                    .get_mut(&tick)
                    .expect("bid_only tick implies level exists");

                let mut saw_ask = false;
                let mut i = level.next_order_index;
                while i < level.orders.len() && remaining > U256::ZERO {
                    if level.orders[i].size == U256::ZERO {
                        i += 1;
                        continue;
                    }
                    if level.orders[i].side == Side::Ask {
                        saw_ask = true;
                        i += 1;
                        continue;
                    }

                    let c = remaining.min(level.orders[i].size);
                    level.orders[i].size -= c;
                    level.total_size -= c;
                    remaining -= c;
                    fulfilled += c;
                    let maker = level.orders[i].maker.clone();
                    let order_id = OrderId::new(market_id, tick, i as u64);

                    credit_total += collateral_amount(c, tick, self.mult);
                    let bal = book.balances.entry(maker.clone()).or_insert(U256::ZERO);
                    *bal += c;

                    events.push(EngineEvent::OrderFilled {
                        market_id,
                        maker: maker.clone(),
                        order_id,
                        size: c,
                        taker: taker.clone(),
                    });
                    events.push(EngineEvent::SharesTransferred {
                        market_id,
                        from: Some(taker.clone()),
                        to: maker,
                        amount: c,
                        outcome,
                    });

                    if !saw_ask {
                        level.next_order_index = i + 1;
                    }
                    if remaining == U256::ZERO {
                        break;
                    }
                    i += 1;
                }

                debug_assert_eq!(
                    level.total_size,
                    level.live_size_sum(),
                    "total_size drifted from live order sizes at tick {tick}"
                );

                book.bid_only.unset(tick);
            }
        }

        if credit_total > U256::ZERO {
            self.ledger.credit(taker, credit_total)?;
        }

        if fulfilled > U256::ZERO {
            scratch.debit_balance(outcome, taker, fulfilled);
            events.push(EngineEvent::MarketOrderExecuted {
                market_id,
                taker: taker.clone(),
                fulfilled,
                outcome,
                side: Side::Ask,
            });
        }

        markets.insert(market_id, scratch);
        drop(markets);
        for event in events {
            self.sink.emit(event);
        }
        Ok(fulfilled)
    }

    #[instrument(skip(self, caller))]
    pub fn claim(&self, market_id: MarketId, caller: &ParticipantId) -> Result<U256, EngineError> {
        let result = self.claim_inner(market_id, caller);
        log_result(&result, |amount| debug!(%amount, "claim paid"));
        result
    }

    fn claim_inner(&self, market_id: MarketId, caller: &ParticipantId) -> Result<U256, EngineError> {
        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.active || !market.resolved {
            return Err(EngineError::MarketNotResolved { market_id });
        }
        let outcome = market.outcome.expect("resolved implies outcome set");
        let shares = market.balance(outcome, caller);
        if shares == U256::ZERO {
            return Err(EngineError::InsufficientShares {
                who: caller.clone(),
                outcome,
            });
        }

        let amount = shares * self.mult;
        self.ledger.credit(caller, amount)?;
        market.debit_balance(outcome, caller, shares);

        self.sink.emit(EngineEvent::RewardsClaimed {
            market_id,
            user: caller.clone(),
            amount,
        });
        Ok(amount)
    }

    #[instrument(skip(self, admin_caller))]
    pub fn sweep_unmatched_bids(
        &self,
        admin_caller: &ParticipantId,
        market_id: MarketId,
    ) -> Result<U256, EngineError> {
        let result = self.sweep_unmatched_bids_inner(admin_caller, market_id);
        log_result(&result, |refunded| debug!(%refunded, "swept unmatched bids"));
        result
    }

    fn sweep_unmatched_bids_inner(
        &self,
        admin_caller: &ParticipantId,
        market_id: MarketId,
    ) -> Result<U256, EngineError> {
        self.admin.require_admin(admin_caller)?;

        let mut markets = self.markets.lock().expect("markets mutex poisoned");
        let market = markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotActive { market_id })?;
        if !market.resolved {
            return Err(EngineError::MarketNotResolved { market_id });
        }
        let winning_outcome = market.outcome.expect("resolved implies outcome set");
        let losing_outcome = winning_outcome.opposite();

        let mut refunds: Vec<(ParticipantId, U256)> = Vec::new();
        let mut cleared_ticks: Vec<u32> = Vec::new();
        {
            let book = market.book_mut(losing_outcome);
            for (&tick, level) in book.levels.iter_mut() {
                for order in level.orders.iter_mut() {
                    if order.side != Side::Bid || order.size == U256::ZERO {
                        continue;
                    }
                    let refund = collateral_amount(order.size, tick, self.mult);
                    refunds.push((order.maker.clone(), refund));
                    level.total_size -= order.size;
                    order.size = U256::ZERO;
                }
                if level.is_empty_of_size() {
                    cleared_ticks.push(tick);
                }
            }
            for tick in &cleared_ticks {
                book.unified.unset(*tick);
                book.bid_only.unset(*tick);
            }
        }

        let mut total_refunded = U256::ZERO;
        for (maker, amount) in &refunds {
            self.ledger.credit(maker, *amount)?;
            total_refunded += *amount;
        }
        Ok(total_refunded)
    }
}

fn validate_price(price: u32) -> Result<(), EngineError> {
    if price == 0 {
        return Err(EngineError::InvalidPrice);
    }
    if price >= BPS {
        return Err(EngineError::PriceTooHigh { bps: BPS });
    }
    Ok(())
}

fn validate_size(size: U256) -> Result<(), EngineError> {
    if size == U256::ZERO {
        return Err(EngineError::InvalidSize);
    }
    Ok(())
}

fn log_result<T>(result: &Result<T, EngineError>, on_ok: impl FnOnce(&T)) {
    match result {
        Ok(value) => on_ok(value),
        Err(err) => warn!(error = %err, "operation failed"),
    }
}
