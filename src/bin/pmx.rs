use std::path::PathBuf;

use alloy_primitives::U256;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use pmx::{EngineConfig, MatchingEngine, Outcome, ParticipantId, Side};

#[derive(Parser)]
#[command(name = "pmx", about = "Binary prediction-market matching engine")]
struct Cli {
    /// Collateral decimals; MULT = 10^decimals. Defaults to 18 (wei-scale).
    #[arg(long, default_value = "18")]
    decimals: u8,

    /// Admin participant id, may be given multiple times.
    #[arg(long = "admin", default_value = "root")]
    admins: Vec<String>,

    /// Persist ledger/events to a SQLite file instead of in-memory state.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new market (admin-only).
    CreateMarket {
        #[arg(long, default_value = "root")]
        admin: String,
    },

    /// Place a resting bid.
    LimitBuy {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        price: u32,
        #[arg(long)]
        size: u64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        maker: String,
    },

    /// Place a resting ask (requires existing shares).
    LimitSell {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        price: u32,
        #[arg(long)]
        size: u64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        maker: String,
    },

    /// Cancel a resting order.
    Cancel {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        price: u32,
        #[arg(long)]
        index: u64,
        #[arg(long, value_enum)]
        side: SideArg,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        caller: String,
    },

    /// Immediately match against the opposite outcome's unified book.
    MarketBuy {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        size: u64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        taker: String,
    },

    /// Immediately transfer existing shares against same-outcome bids.
    MarketSell {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        size: u64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long)]
        taker: String,
    },

    /// Resolve a market to its winning outcome (admin-only).
    ResolveMarket {
        #[arg(long)]
        market: u64,
        #[arg(long, value_enum)]
        outcome: OutcomeArg,
        #[arg(long, default_value = "root")]
        admin: String,
    },

    /// Redeem winning shares for collateral.
    Claim {
        #[arg(long)]
        market: u64,
        #[arg(long)]
        caller: String,
    },

    /// Refund losing-outcome resting bids after resolution (admin-only).
    Sweep {
        #[arg(long)]
        market: u64,
        #[arg(long, default_value = "root")]
        admin: String,
    },

    /// Print a market's book depth and participant balances.
    Report {
        #[arg(long)]
        market: u64,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum OutcomeArg {
    Yes,
    No,
}

impl From<OutcomeArg> for Outcome {
    fn from(o: OutcomeArg) -> Self {
        match o {
            OutcomeArg::Yes => Outcome::Yes,
            OutcomeArg::No => Outcome::No,
        }
    }
}

#[derive(Clone, clap::ValueEnum)]
enum SideArg {
    Bid,
    Ask,
}

impl From<SideArg> for Side {
    fn from(s: SideArg) -> Self {
        match s {
            SideArg::Bid => Side::Bid,
            SideArg::Ask => Side::Ask,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let admins: Vec<ParticipantId> = cli
        .admins
        .iter()
        .map(|s| ParticipantId::new(s.as_str()))
        .collect();
    let mut config = EngineConfig::new(cli.decimals, admins);
    if let Some(ref path) = cli.db {
        config = config.with_sqlite(path.clone());
    }
    let engine = config.build().context("failed to build matching engine")?;

    match cli.command {
        Commands::CreateMarket { admin } => cmd_create_market(&engine, &admin),
        Commands::LimitBuy {
            market,
            price,
            size,
            outcome,
            maker,
        } => cmd_limit_buy(&engine, market, price, size, outcome.into(), &maker),
        Commands::LimitSell {
            market,
            price,
            size,
            outcome,
            maker,
        } => cmd_limit_sell(&engine, market, price, size, outcome.into(), &maker),
        Commands::Cancel {
            market,
            price,
            index,
            side,
            outcome,
            caller,
        } => cmd_cancel(&engine, market, price, index, side.into(), outcome.into(), &caller),
        Commands::MarketBuy {
            market,
            size,
            outcome,
            taker,
        } => cmd_market_buy(&engine, market, size, outcome.into(), &taker),
        Commands::MarketSell {
            market,
            size,
            outcome,
            taker,
        } => cmd_market_sell(&engine, market, size, outcome.into(), &taker),
        Commands::ResolveMarket {
            market,
            outcome,
            admin,
        } => cmd_resolve_market(&engine, market, outcome.into(), &admin),
        Commands::Claim { market, caller } => cmd_claim(&engine, market, &caller),
        Commands::Sweep { market, admin } => cmd_sweep(&engine, market, &admin),
        Commands::Report { market } => cmd_report(&engine, market),
    }
}

fn cmd_create_market(engine: &MatchingEngine, admin: &str) -> Result<()> {
    let id = engine
        .create_market(&ParticipantId::new(admin))
        .context("create_market failed")?;
    println!("created market {}", id);
    Ok(())
}

fn cmd_limit_buy(
    engine: &MatchingEngine,
    market: u64,
    price: u32,
    size: u64,
    outcome: Outcome,
    maker: &str,
) -> Result<()> {
    let order_id = engine
        .limit_buy(market, price, U256::from(size), outcome, &ParticipantId::new(maker))
        .context("limit_buy failed")?;
    println!("placed order {}", order_id);
    Ok(())
}

fn cmd_limit_sell(
    engine: &MatchingEngine,
    market: u64,
    price: u32,
    size: u64,
    outcome: Outcome,
    maker: &str,
) -> Result<()> {
    let order_id = engine
        .limit_sell(market, price, U256::from(size), outcome, &ParticipantId::new(maker))
        .context("limit_sell failed")?;
    println!("placed order {}", order_id);
    Ok(())
}

fn cmd_cancel(
    engine: &MatchingEngine,
    market: u64,
    price: u32,
    index: u64,
    side: Side,
    outcome: Outcome,
    caller: &str,
) -> Result<()> {
    engine
        .cancel(market, price, index, side, outcome, &ParticipantId::new(caller))
        .context("cancel failed")?;
    println!("cancelled");
    Ok(())
}

fn cmd_market_buy(
    engine: &MatchingEngine,
    market: u64,
    size: u64,
    outcome: Outcome,
    taker: &str,
) -> Result<()> {
    let fulfilled = engine
        .market_buy(market, U256::from(size), outcome, &ParticipantId::new(taker))
        .context("market_buy failed")?;
    println!("fulfilled {}", fulfilled);
    Ok(())
}

fn cmd_market_sell(
    engine: &MatchingEngine,
    market: u64,
    size: u64,
    outcome: Outcome,
    taker: &str,
) -> Result<()> {
    let fulfilled = engine
        .market_sell(market, U256::from(size), outcome, &ParticipantId::new(taker))
        .context("market_sell failed")?;
    println!("fulfilled {}", fulfilled);
    Ok(())
}

fn cmd_resolve_market(engine: &MatchingEngine, market: u64, outcome: Outcome, admin: &str) -> Result<()> {
    engine
        .resolve_market(&ParticipantId::new(admin), market, outcome)
        .context("resolve_market failed")?;
    println!("resolved market {} to {}", market, outcome);
    Ok(())
}

fn cmd_claim(engine: &MatchingEngine, market: u64, caller: &str) -> Result<()> {
    let amount = engine
        .claim(market, &ParticipantId::new(caller))
        .context("claim failed")?;
    println!("paid {}", amount);
    Ok(())
}

fn cmd_sweep(engine: &MatchingEngine, market: u64, admin: &str) -> Result<()> {
    let refunded = engine
        .sweep_unmatched_bids(&ParticipantId::new(admin), market)
        .context("sweep_unmatched_bids failed")?;
    println!("refunded {}", refunded);
    Ok(())
}

fn cmd_report(engine: &MatchingEngine, market: u64) -> Result<()> {
    let printed = engine.with_market(market, |m| {
        println!("market {}", m.id);
        println!("  active={} resolved={} outcome={:?}", m.active, m.resolved, m.outcome);
        println!("  total_collateral={}", m.total_collateral);
        for (outcome, levels) in [(Outcome::Yes, &m.yes_levels), (Outcome::No, &m.no_levels)] {
            println!("  {} book:", outcome);
            let mut ticks: Vec<&u32> = levels.keys().collect();
            ticks.sort();
            for tick in ticks.into_iter().rev() {
                let level = &levels[tick];
                if !level.is_empty_of_size() {
                    println!("    tick {}: total_size={}", tick, level.total_size);
                }
            }
        }
    });
    if printed.is_none() {
        println!("no such market: {}", market);
    }
    Ok(())
}
