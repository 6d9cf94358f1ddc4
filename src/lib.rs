//! Core of a binary prediction-market exchange: a unified central limit
//! order book that mints new outcome-share pairs when opposing-outcome
//! bids cross, and transfers existing shares when same-outcome bids cross
//! asks.

pub mod admin;
pub mod config;
pub mod data;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod market;
pub mod price_index;
pub mod price_level;
pub mod types;

pub use admin::{AdminAuthority, StaticAdminSet};
pub use config::{EngineConfig, Persistence};
pub use engine::MatchingEngine;
pub use errors::EngineError;
pub use events::{EngineEvent, EventSink, InMemoryEventSink, SqliteEventSink};
pub use ledger::{CollateralLedger, InMemoryLedger, LedgerError, SqliteLedger};
pub use market::Market;
pub use types::{MarketId, Outcome, OrderId, ParticipantId, Side, BPS};
