//! `CollateralLedger`: the collateral asset abstraction the matching engine
//! debits/credits against. Modeled as a trait plus two implementations, one
//! in-memory and one backed by SQLite.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_primitives::U256;
use rusqlite::Connection;
use thiserror::Error;

use crate::types::ParticipantId;

const ESCROW_ACCOUNT: &str = "__escrow__";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{who} has insufficient spendable balance (have {have}, need {need})")]
    InsufficientBalance {
        who: ParticipantId,
        have: U256,
        need: U256,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Moves collateral between participant accounts and the engine's internal
/// escrow account.
///
/// `debit`/`credit` are the only primitives the matching engine calls
/// directly; `transfer_within` is a convenience equal to debit-then-credit,
/// used for the Ask-fill transfer path where the taker pays the ask maker
/// without the amount passing through escrow accounting twice.
pub trait CollateralLedger {
    fn debit(&self, from: &ParticipantId, amount: U256) -> Result<(), LedgerError>;
    fn credit(&self, to: &ParticipantId, amount: U256) -> Result<(), LedgerError>;

    fn transfer_within(
        &self,
        from: &ParticipantId,
        to: &ParticipantId,
        amount: U256,
    ) -> Result<(), LedgerError> {
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        Ok(())
    }

    /// Current spendable balance, for tests and reporting.
    fn balance_of(&self, who: &ParticipantId) -> U256;

    /// Current escrow total, for tests and reporting.
    fn escrow_balance(&self) -> U256;
}

/// In-memory ledger: a `HashMap` of spendable balances plus one escrow
/// accumulator. Used by the engine's own tests and suitable for embedding
/// in a single-process host.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    inner: Mutex<InMemoryLedgerState>,
}

#[derive(Debug, Default)]
struct InMemoryLedgerState {
    balances: HashMap<ParticipantId, U256>,
    escrow: U256,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fund a participant's spendable balance. Test/setup helper; real
    /// funding rails are out of scope for this crate.
    pub fn fund(&self, who: &ParticipantId, amount: U256) {
        let mut state = self.inner.lock().expect("ledger mutex poisoned");
        let bal = state.balances.entry(who.clone()).or_insert(U256::ZERO);
        *bal += amount;
    }
}

impl CollateralLedger for InMemoryLedger {
    fn debit(&self, from: &ParticipantId, amount: U256) -> Result<(), LedgerError> {
        let mut state = self.inner.lock().expect("ledger mutex poisoned");
        let have = state.balances.get(from).copied().unwrap_or(U256::ZERO);
        if have < amount {
            return Err(LedgerError::InsufficientBalance {
                who: from.clone(),
                have,
                need: amount,
            });
        }
        *state.balances.get_mut(from).unwrap() -= amount;
        state.escrow += amount;
        Ok(())
    }

    fn credit(&self, to: &ParticipantId, amount: U256) -> Result<(), LedgerError> {
        let mut state = self.inner.lock().expect("ledger mutex poisoned");
        if state.escrow < amount {
            // Escrow underfunding indicates an engine bug, not a user error;
            // still surfaced as a typed error rather than panicking.
            return Err(LedgerError::InsufficientBalance {
                who: ParticipantId::new(ESCROW_ACCOUNT),
                have: state.escrow,
                need: amount,
            });
        }
        state.escrow -= amount;
        let bal = state.balances.entry(to.clone()).or_insert(U256::ZERO);
        *bal += amount;
        Ok(())
    }

    fn balance_of(&self, who: &ParticipantId) -> U256 {
        let state = self.inner.lock().expect("ledger mutex poisoned");
        state.balances.get(who).copied().unwrap_or(U256::ZERO)
    }

    fn escrow_balance(&self) -> U256 {
        self.inner.lock().expect("ledger mutex poisoned").escrow
    }
}

/// SQLite-backed ledger: persists balances and the escrow total so a host
/// process can restart without losing ledger state.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &std::path::Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(crate::data::schema::CREATE_LEDGER_BALANCES)?;
        conn.execute(
            "INSERT OR IGNORE INTO pmx_ledger_balances (participant, balance) VALUES (?1, ?2)",
            rusqlite::params![ESCROW_ACCOUNT, "0"],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn read_balance(conn: &Connection, who: &str) -> Result<U256, LedgerError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT balance FROM pmx_ledger_balances WHERE participant = ?1",
                [who],
                |row| row.get(0),
            )
            .ok();
        Ok(raw
            .and_then(|s| U256::from_str_radix(&s, 10).ok())
            .unwrap_or(U256::ZERO))
    }

    fn write_balance(conn: &Connection, who: &str, amount: U256) -> Result<(), LedgerError> {
        conn.execute(
            "INSERT INTO pmx_ledger_balances (participant, balance) VALUES (?1, ?2)
             ON CONFLICT(participant) DO UPDATE SET balance = excluded.balance",
            rusqlite::params![who, amount.to_string()],
        )?;
        Ok(())
    }

    pub fn fund(&self, who: &ParticipantId, amount: U256) -> Result<(), LedgerError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let current = Self::read_balance(&conn, &who.0)?;
        Self::write_balance(&conn, &who.0, current + amount)
    }
}

impl CollateralLedger for SqliteLedger {
    fn debit(&self, from: &ParticipantId, amount: U256) -> Result<(), LedgerError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let have = Self::read_balance(&conn, &from.0)?;
        if have < amount {
            return Err(LedgerError::InsufficientBalance {
                who: from.clone(),
                have,
                need: amount,
            });
        }
        let escrow = Self::read_balance(&conn, ESCROW_ACCOUNT)?;
        Self::write_balance(&conn, &from.0, have - amount)?;
        Self::write_balance(&conn, ESCROW_ACCOUNT, escrow + amount)?;
        Ok(())
    }

    fn credit(&self, to: &ParticipantId, amount: U256) -> Result<(), LedgerError> {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        let escrow = Self::read_balance(&conn, ESCROW_ACCOUNT)?;
        if escrow < amount {
            return Err(LedgerError::InsufficientBalance {
                who: ParticipantId::new(ESCROW_ACCOUNT),
                have: escrow,
                need: amount,
            });
        }
        let have = Self::read_balance(&conn, &to.0)?;
        Self::write_balance(&conn, ESCROW_ACCOUNT, escrow - amount)?;
        Self::write_balance(&conn, &to.0, have + amount)?;
        Ok(())
    }

    fn balance_of(&self, who: &ParticipantId) -> U256 {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        Self::read_balance(&conn, &who.0).unwrap_or(U256::ZERO)
    }

    fn escrow_balance(&self) -> U256 {
        let conn = self.conn.lock().expect("ledger mutex poisoned");
        Self::read_balance(&conn, ESCROW_ACCOUNT).unwrap_or(U256::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_debit_moves_to_escrow() {
        let ledger = InMemoryLedger::new();
        let alice = ParticipantId::new("alice");
        ledger.fund(&alice, U256::from(100u64));

        ledger.debit(&alice, U256::from(40u64)).unwrap();
        assert_eq!(ledger.balance_of(&alice), U256::from(60u64));
        assert_eq!(ledger.escrow_balance(), U256::from(40u64));
    }

    #[test]
    fn in_memory_debit_insufficient_balance_fails() {
        let ledger = InMemoryLedger::new();
        let alice = ParticipantId::new("alice");
        ledger.fund(&alice, U256::from(10u64));
        let err = ledger.debit(&alice, U256::from(20u64)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
    }

    #[test]
    fn in_memory_credit_moves_out_of_escrow() {
        let ledger = InMemoryLedger::new();
        let alice = ParticipantId::new("alice");
        ledger.fund(&alice, U256::from(100u64));
        ledger.debit(&alice, U256::from(100u64)).unwrap();

        let bob = ParticipantId::new("bob");
        ledger.credit(&bob, U256::from(30u64)).unwrap();
        assert_eq!(ledger.balance_of(&bob), U256::from(30u64));
        assert_eq!(ledger.escrow_balance(), U256::from(70u64));
    }

    #[test]
    fn transfer_within_is_debit_then_credit() {
        let ledger = InMemoryLedger::new();
        let alice = ParticipantId::new("alice");
        let bob = ParticipantId::new("bob");
        ledger.fund(&alice, U256::from(50u64));

        ledger
            .transfer_within(&alice, &bob, U256::from(20u64))
            .unwrap();
        assert_eq!(ledger.balance_of(&alice), U256::from(30u64));
        assert_eq!(ledger.balance_of(&bob), U256::from(20u64));
        assert_eq!(ledger.escrow_balance(), U256::ZERO);
    }

    #[test]
    fn sqlite_ledger_roundtrips_like_in_memory() {
        let ledger = SqliteLedger::in_memory().unwrap();
        let alice = ParticipantId::new("alice");
        ledger.fund(&alice, U256::from(100u64)).unwrap();

        ledger.debit(&alice, U256::from(40u64)).unwrap();
        assert_eq!(ledger.balance_of(&alice), U256::from(60u64));
        assert_eq!(ledger.escrow_balance(), U256::from(40u64));

        let bob = ParticipantId::new("bob");
        ledger.credit(&bob, U256::from(40u64)).unwrap();
        assert_eq!(ledger.balance_of(&bob), U256::from(40u64));
        assert_eq!(ledger.escrow_balance(), U256::ZERO);
    }

    #[test]
    fn sqlite_ledger_persists_across_handles_on_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        {
            let ledger = SqliteLedger::open(&path).unwrap();
            ledger
                .fund(&ParticipantId::new("alice"), U256::from(77u64))
                .unwrap();
        }

        let reopened = SqliteLedger::open(&path).unwrap();
        assert_eq!(
            reopened.balance_of(&ParticipantId::new("alice")),
            U256::from(77u64)
        );
    }
}
