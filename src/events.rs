//! `EventSink`: the fixed set of records the matching engine emits, plus an
//! in-memory and a `rusqlite`-backed implementation.

use std::sync::Mutex;

use alloy_primitives::U256;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::types::{MarketId, OrderId, Outcome, ParticipantId, Side};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    LimitOrderPlaced {
        market_id: MarketId,
        maker: ParticipantId,
        order_id: OrderId,
        price: u32,
        size: U256,
        outcome: Outcome,
        side: Side,
    },
    MarketOrderExecuted {
        market_id: MarketId,
        taker: ParticipantId,
        fulfilled: U256,
        outcome: Outcome,
        side: Side,
    },
    OrderFilled {
        market_id: MarketId,
        maker: ParticipantId,
        order_id: OrderId,
        size: U256,
        taker: ParticipantId,
    },
    PriceLevelCleared {
        market_id: MarketId,
        price: u32,
        outcome: Outcome,
    },
    /// `from` is `None` when the shares were minted rather than transferred
    /// from an existing holder.
    SharesTransferred {
        market_id: MarketId,
        from: Option<ParticipantId>,
        to: ParticipantId,
        amount: U256,
        outcome: Outcome,
    },
    OrderCancelled {
        market_id: MarketId,
        maker: ParticipantId,
        order_id: OrderId,
    },
    RewardsClaimed {
        market_id: MarketId,
        user: ParticipantId,
        amount: U256,
    },
    MarketCreated {
        market_id: MarketId,
    },
    MarketResolved {
        market_id: MarketId,
        outcome: Outcome,
    },
}

impl EngineEvent {
    pub fn market_id(&self) -> MarketId {
        match self {
            EngineEvent::LimitOrderPlaced { market_id, .. }
            | EngineEvent::MarketOrderExecuted { market_id, .. }
            | EngineEvent::OrderFilled { market_id, .. }
            | EngineEvent::PriceLevelCleared { market_id, .. }
            | EngineEvent::SharesTransferred { market_id, .. }
            | EngineEvent::OrderCancelled { market_id, .. }
            | EngineEvent::RewardsClaimed { market_id, .. }
            | EngineEvent::MarketCreated { market_id }
            | EngineEvent::MarketResolved { market_id, .. } => *market_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EngineEvent::LimitOrderPlaced { .. } => "LimitOrderPlaced",
            EngineEvent::MarketOrderExecuted { .. } => "MarketOrderExecuted",
            EngineEvent::OrderFilled { .. } => "OrderFilled",
            EngineEvent::PriceLevelCleared { .. } => "PriceLevelCleared",
            EngineEvent::SharesTransferred { .. } => "SharesTransferred",
            EngineEvent::OrderCancelled { .. } => "OrderCancelled",
            EngineEvent::RewardsClaimed { .. } => "RewardsClaimed",
            EngineEvent::MarketCreated { .. } => "MarketCreated",
            EngineEvent::MarketResolved { .. } => "MarketResolved",
        }
    }
}

/// Receives engine-emitted records. Implementations must not fail the
/// triggering operation; a sink that can't keep up should buffer or drop,
/// not propagate an error back into the match loop.
pub trait EventSink {
    fn emit(&self, event: EngineEvent);
}

/// Collects every emitted event into a `Vec`, in emission order. Used by
/// tests to assert the ordering guarantees in the event-stream docs.
#[derive(Debug, Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().expect("event sink mutex poisoned").clone()
    }

    pub fn events_for_market(&self, market_id: MarketId) -> Vec<EngineEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.market_id() == market_id)
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().expect("event sink mutex poisoned").push(event);
    }
}

/// Appends every emitted event as a row to a `pmx_events` journal table.
/// Replaying the journal back into an engine is out of scope; the schema is
/// shaped to make that possible later.
pub struct SqliteEventSink {
    conn: Mutex<Connection>,
}

impl SqliteEventSink {
    pub fn open(path: &std::path::Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(crate::data::schema::CREATE_EVENTS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of journaled rows, for tests.
    pub fn len(&self) -> usize {
        let conn = self.conn.lock().expect("event sink mutex poisoned");
        conn.query_row("SELECT COUNT(*) FROM pmx_events", [], |row| row.get(0))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for SqliteEventSink {
    fn emit(&self, event: EngineEvent) {
        let conn = self.conn.lock().expect("event sink mutex poisoned");
        let payload = serde_json::to_string(&event).expect("EngineEvent is always serializable");
        let _ = conn.execute(
            "INSERT INTO pmx_events (market_id, kind, payload) VALUES (?1, ?2, ?3)",
            rusqlite::params![event.market_id() as i64, event.kind(), payload],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> EngineEvent {
        EngineEvent::MarketCreated { market_id: 7 }
    }

    #[test]
    fn in_memory_sink_preserves_emission_order() {
        let sink = InMemoryEventSink::new();
        sink.emit(EngineEvent::MarketCreated { market_id: 1 });
        sink.emit(EngineEvent::MarketResolved {
            market_id: 1,
            outcome: Outcome::Yes,
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::MarketCreated { .. }));
        assert!(matches!(events[1], EngineEvent::MarketResolved { .. }));
    }

    #[test]
    fn in_memory_sink_filters_by_market() {
        let sink = InMemoryEventSink::new();
        sink.emit(EngineEvent::MarketCreated { market_id: 1 });
        sink.emit(EngineEvent::MarketCreated { market_id: 2 });
        assert_eq!(sink.events_for_market(2).len(), 1);
    }

    #[test]
    fn sqlite_sink_journals_every_event() {
        let sink = SqliteEventSink::in_memory().unwrap();
        assert!(sink.is_empty());
        sink.emit(sample_event());
        sink.emit(sample_event());
        assert_eq!(sink.len(), 2);
    }
}
