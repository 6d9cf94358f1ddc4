//! Typed error taxonomy for the matching engine core.
//!
//! The library surface returns `Result<T, EngineError>` everywhere; the CLI
//! binary wraps these with `anyhow::Context` at the boundary.

use thiserror::Error;

use crate::types::{Outcome, ParticipantId, Side};

/// Errors raised by `MatchingEngine` operations.
///
/// All checks happen before any mutation (checks-effects-interactions): a
/// failed operation is guaranteed to have produced zero side effects.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("price must be greater than zero")]
    InvalidPrice,

    #[error("price must be below BPS ({bps})")]
    PriceTooHigh { bps: u32 },

    #[error("size must be greater than zero")]
    InvalidSize,

    #[error("market {market_id} is not active")]
    MarketNotActive { market_id: u64 },

    #[error("market {market_id} has already been resolved")]
    MarketAlreadyResolved { market_id: u64 },

    #[error("market {market_id} has not been resolved")]
    MarketNotResolved { market_id: u64 },

    #[error("{who} has insufficient {outcome} shares")]
    InsufficientShares {
        who: ParticipantId,
        outcome: Outcome,
    },

    #[error("{caller} is not authorized to perform this action")]
    Unauthorized { caller: ParticipantId },

    #[error("no resting {side:?} order for {outcome} at price {price} index {index}")]
    OrderNotFound {
        price: u32,
        index: u64,
        side: Side,
        outcome: Outcome,
    },

    #[error("ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
}
