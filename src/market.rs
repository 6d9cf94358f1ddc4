//! Per-market state: the four price indexes, the two outcome→level maps,
//! per-participant share balances, and the lifecycle flags.

use std::collections::HashMap;

use alloy_primitives::U256;

use crate::price_index::PriceIndex;
use crate::price_level::PriceLevel;
use crate::types::{MarketId, Outcome, ParticipantId};

/// Bundles the four pieces of per-outcome state the match loop needs,
/// localizing the Yes/No branch to one place instead of scattering `match`
/// arms across `engine.rs`.
pub struct OutcomeBookMut<'a> {
    pub unified: &'a mut PriceIndex,
    pub bid_only: &'a mut PriceIndex,
    pub levels: &'a mut HashMap<u32, PriceLevel>,
    pub balances: &'a mut HashMap<ParticipantId, U256>,
}

pub struct OutcomeBookRef<'a> {
    pub unified: &'a PriceIndex,
    #[allow(dead_code)]
    pub bid_only: &'a PriceIndex,
    pub levels: &'a HashMap<u32, PriceLevel>,
    pub balances: &'a HashMap<ParticipantId, U256>,
}

/// State for a single binary prediction market.
#[derive(Clone)]
pub struct Market {
    pub id: MarketId,

    pub yes_unified: PriceIndex,
    pub no_unified: PriceIndex,
    pub yes_bid_only: PriceIndex,
    pub no_bid_only: PriceIndex,

    pub yes_levels: HashMap<u32, PriceLevel>,
    pub no_levels: HashMap<u32, PriceLevel>,

    pub yes_bal: HashMap<ParticipantId, U256>,
    pub no_bal: HashMap<ParticipantId, U256>,

    /// Monotone non-decreasing during trading: total collateral backing
    /// minted (Yes, No) pairs, in `MULT` units.
    pub total_collateral: U256,

    pub active: bool,
    pub resolved: bool,
    pub outcome: Option<Outcome>,
}

impl Market {
    pub fn new(id: MarketId) -> Self {
        Self {
            id,
            yes_unified: PriceIndex::new(),
            no_unified: PriceIndex::new(),
            yes_bid_only: PriceIndex::new(),
            no_bid_only: PriceIndex::new(),
            yes_levels: HashMap::new(),
            no_levels: HashMap::new(),
            yes_bal: HashMap::new(),
            no_bal: HashMap::new(),
            total_collateral: U256::ZERO,
            active: true,
            resolved: false,
            outcome: None,
        }
    }

    /// Mutable access to the four structures belonging to `outcome`.
    pub fn book_mut(&mut self, outcome: Outcome) -> OutcomeBookMut<'_> {
        match outcome {
            Outcome::Yes => OutcomeBookMut {
                unified: &mut self.yes_unified,
                bid_only: &mut self.yes_bid_only,
                levels: &mut self.yes_levels,
                balances: &mut self.yes_bal,
            },
            Outcome::No => OutcomeBookMut {
                unified: &mut self.no_unified,
                bid_only: &mut self.no_bid_only,
                levels: &mut self.no_levels,
                balances: &mut self.no_bal,
            },
        }
    }

    pub fn book(&self, outcome: Outcome) -> OutcomeBookRef<'_> {
        match outcome {
            Outcome::Yes => OutcomeBookRef {
                unified: &self.yes_unified,
                bid_only: &self.yes_bid_only,
                levels: &self.yes_levels,
                balances: &self.yes_bal,
            },
            Outcome::No => OutcomeBookRef {
                unified: &self.no_unified,
                bid_only: &self.no_bid_only,
                levels: &self.no_levels,
                balances: &self.no_bal,
            },
        }
    }

    pub fn balance(&self, outcome: Outcome, who: &ParticipantId) -> U256 {
        self.book(outcome)
            .balances
            .get(who)
            .copied()
            .unwrap_or(U256::ZERO)
    }

    pub fn credit_balance(&mut self, outcome: Outcome, who: &ParticipantId, amount: U256) {
        let bal = self
            .book_mut(outcome)
            .balances
            .entry(who.clone())
            .or_insert(U256::ZERO);
        *bal += amount;
    }

    /// Debit `amount` from `who`'s balance of `outcome`. Caller must have
    /// already validated `balance >= amount`.
    pub fn debit_balance(&mut self, outcome: Outcome, who: &ParticipantId, amount: U256) {
        let bal = self
            .book_mut(outcome)
            .balances
            .entry(who.clone())
            .or_insert(U256::ZERO);
        *bal -= amount;
    }

    pub fn is_tradeable(&self) -> bool {
        self.active && !self.resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_market_is_active_and_unresolved() {
        let m = Market::new(0);
        assert!(m.is_tradeable());
        assert!(!m.resolved);
        assert_eq!(m.outcome, None);
    }

    #[test]
    fn balances_default_to_zero() {
        let m = Market::new(0);
        let alice = ParticipantId::new("alice");
        assert_eq!(m.balance(Outcome::Yes, &alice), U256::ZERO);
    }

    #[test]
    fn credit_then_debit_roundtrips() {
        let mut m = Market::new(0);
        let alice = ParticipantId::new("alice");
        m.credit_balance(Outcome::Yes, &alice, U256::from(100u64));
        assert_eq!(m.balance(Outcome::Yes, &alice), U256::from(100u64));
        m.debit_balance(Outcome::Yes, &alice, U256::from(40u64));
        assert_eq!(m.balance(Outcome::Yes, &alice), U256::from(60u64));
    }

    #[test]
    fn book_mut_yes_and_no_are_independent() {
        let mut m = Market::new(0);
        m.book_mut(Outcome::Yes).unified.set(400);
        assert!(m.yes_unified.is_set(400));
        assert!(!m.no_unified.is_set(400));
    }
}
