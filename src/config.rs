//! Construction-time configuration: collateral decimals, the admin set, and
//! which persistence backend backs the `CollateralLedger`/`EventSink` pair.

use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::U256;
use anyhow::Context;

use crate::admin::StaticAdminSet;
use crate::engine::MatchingEngine;
use crate::events::{EventSink, InMemoryEventSink, SqliteEventSink};
use crate::ledger::{CollateralLedger, InMemoryLedger, SqliteLedger};
use crate::types::ParticipantId;

/// Where the ledger and event journal live.
#[derive(Debug, Clone)]
pub enum Persistence {
    InMemory,
    Sqlite(PathBuf),
}

/// Everything needed to build a `MatchingEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Decimals of the configured collateral token; `MULT = 10^decimals`.
    pub decimals: u8,
    pub admins: Vec<ParticipantId>,
    pub persistence: Persistence,
}

impl EngineConfig {
    pub fn new(decimals: u8, admins: Vec<ParticipantId>) -> Self {
        Self {
            decimals,
            admins,
            persistence: Persistence::InMemory,
        }
    }

    pub fn with_sqlite(mut self, path: PathBuf) -> Self {
        self.persistence = Persistence::Sqlite(path);
        self
    }

    /// `MULT = 10^decimals`, the collateral units one winning share pays.
    pub fn mult(&self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals as u64))
    }

    pub fn build(&self) -> anyhow::Result<MatchingEngine> {
        let admin = Arc::new(StaticAdminSet::new(self.admins.clone()));

        let (ledger, sink): (
            Arc<dyn CollateralLedger + Send + Sync>,
            Arc<dyn EventSink + Send + Sync>,
        ) = match &self.persistence {
            Persistence::InMemory => (
                Arc::new(InMemoryLedger::new()),
                Arc::new(InMemoryEventSink::new()),
            ),
            Persistence::Sqlite(path) => {
                let ledger = SqliteLedger::open(path)
                    .with_context(|| format!("opening ledger database at {}", path.display()))?;
                let sink = SqliteEventSink::open(path)
                    .with_context(|| format!("opening event journal at {}", path.display()))?;
                (Arc::new(ledger), Arc::new(sink))
            }
        };

        Ok(MatchingEngine::new(ledger, admin, sink, self.mult()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mult_reflects_decimals() {
        let config = EngineConfig::new(18, vec![ParticipantId::new("root")]);
        assert_eq!(config.mult(), U256::from(10u64).pow(U256::from(18u64)));
    }

    #[test]
    fn in_memory_config_builds_a_usable_engine() {
        let config = EngineConfig::new(6, vec![ParticipantId::new("root")]);
        let engine = config.build().unwrap();
        let market_id = engine.create_market(&ParticipantId::new("root")).unwrap();
        assert_eq!(market_id, 0);
    }

    #[test]
    fn sqlite_config_builds_against_a_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new(18, vec![ParticipantId::new("root")])
            .with_sqlite(dir.path().join("pmx.db"));
        let engine = config.build().unwrap();
        engine.create_market(&ParticipantId::new("root")).unwrap();
    }
}
