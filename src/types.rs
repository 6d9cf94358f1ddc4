//! Core domain types for the prediction-market exchange.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Basis-points denominator for prices. Prices live in `[1, BPS - 1]`.
pub const BPS: u32 = 1000;

/// Binary outcome of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The complementary outcome in the same market.
    pub fn opposite(&self) -> Outcome {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Yes => "YES",
            Outcome::No => "NO",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which side of the book a resting order occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "BID"),
            Side::Ask => write!(f, "ASK"),
        }
    }
}

/// Opaque participant identifier.
///
/// Deliberately not a chain address: this crate has no on-chain framing in
/// scope, and an opaque owned string is enough to key balances and
/// authorization checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a market, assigned monotonically from 0 by `create_market`.
pub type MarketId = u64;

/// Collision-resistant identifier of a resting order: `H(market_id, tick, index)`.
///
/// `tick` is always the *internal* storage tick (an Ask's id is hashed with
/// `BPS - price`, not the price the maker quoted), and `index` is the
/// order's position in the level's FIFO queue at the time it was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl OrderId {
    pub fn new(market_id: MarketId, tick: u32, index: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&market_id.to_le_bytes());
        hasher.update(&tick.to_le_bytes());
        hasher.update(&index.to_le_bytes());
        OrderId(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        let mut out = String::with_capacity(64);
        for b in bytes {
            out.push_str(&format!("{:02x}", b));
        }
        s.serialize_str(&out)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_opposite_is_involution() {
        assert_eq!(Outcome::Yes.opposite(), Outcome::No);
        assert_eq!(Outcome::No.opposite(), Outcome::Yes);
        assert_eq!(Outcome::Yes.opposite().opposite(), Outcome::Yes);
    }

    #[test]
    fn order_id_is_deterministic() {
        let a = OrderId::new(1, 400, 0);
        let b = OrderId::new(1, 400, 0);
        assert_eq!(a, b, "same inputs must hash identically");
    }

    #[test]
    fn order_id_distinguishes_every_argument() {
        let base = OrderId::new(1, 400, 0);
        assert_ne!(base, OrderId::new(2, 400, 0), "market_id must be mixed in");
        assert_ne!(base, OrderId::new(1, 401, 0), "tick must be mixed in");
        assert_ne!(base, OrderId::new(1, 400, 1), "index must be mixed in");
    }

    #[test]
    fn order_id_display_is_lowercase_hex() {
        let id = OrderId::new(1, 400, 0);
        let s = id.to_string();
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn participant_id_from_str() {
        let p: ParticipantId = "alice".into();
        assert_eq!(p.to_string(), "alice");
    }
}
