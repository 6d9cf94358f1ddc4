//! DDL for this crate's own SQLite-backed reference implementations.

pub const CREATE_LEDGER_BALANCES: &str = "
CREATE TABLE IF NOT EXISTS pmx_ledger_balances (
    participant TEXT PRIMARY KEY,
    balance     TEXT NOT NULL
);
";

pub const CREATE_EVENTS: &str = "
CREATE TABLE IF NOT EXISTS pmx_events (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id  INTEGER NOT NULL,
    kind       TEXT NOT NULL,
    payload    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pmx_events_market ON pmx_events(market_id);
";
