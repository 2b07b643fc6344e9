// src/strategy.rs

use crate::key_state::KeyState;
use rand::Rng;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Strategy for picking one key out of the eligible subset of a pool.
///
/// `eligible` preserves the pool's configured key order and is guaranteed
/// non-empty by the caller; the returned value is an index into it. `cursor`
/// is the pool's shared rotation counter, advanced by the pool after every
/// selection; only round-robin consults it.
pub trait RotationStrategy: Send + Sync {
    fn pick(&self, eligible: &[&KeyState], cursor: u64) -> usize;

    fn name(&self) -> &'static str;
}

/// Deterministic rotation: `cursor % eligible.len()`.
///
/// The cursor advances once per selection, so with a stable eligible set the
/// pool walks it in order; keys that drop out of eligibility are skipped
/// without permanently distorting the order once they recover.
pub struct RoundRobin;

impl RotationStrategy for RoundRobin {
    fn pick(&self, eligible: &[&KeyState], cursor: u64) -> usize {
        (cursor % eligible.len() as u64) as usize
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Picks the eligible key with the smallest `usage_count`; ties go to the
/// earliest key in pool order.
pub struct LeastUsed;

impl RotationStrategy for LeastUsed {
    fn pick(&self, eligible: &[&KeyState], _cursor: u64) -> usize {
        let mut best = 0;
        for (idx, state) in eligible.iter().enumerate().skip(1) {
            if state.usage_count < eligible[best].usage_count {
                best = idx;
            }
        }
        best
    }

    fn name(&self) -> &'static str {
        "least_used"
    }
}

/// Uniform pick over the eligible subset. Not cryptographically secure, and
/// does not need to be.
pub struct Random;

impl RotationStrategy for Random {
    fn pick(&self, eligible: &[&KeyState], _cursor: u64) -> usize {
        rand::thread_rng().gen_range(0..eligible.len())
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Configured strategy choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    LeastUsed,
    Random,
}

impl StrategyKind {
    /// Parses a config string. Unrecognized values fall back to round-robin
    /// with a warning rather than failing construction.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "round-robin" | "round_robin" => Self::RoundRobin,
            "least-used" | "least_used" => Self::LeastUsed,
            "random" => Self::Random,
            other => {
                warn!(
                    strategy = %other,
                    "Unknown rotation strategy in configuration. Falling back to round-robin."
                );
                Self::RoundRobin
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::LeastUsed => "least-used",
            Self::Random => "random",
        }
    }

    pub(crate) fn build(self) -> Box<dyn RotationStrategy> {
        match self {
            Self::RoundRobin => Box::new(RoundRobin),
            Self::LeastUsed => Box::new(LeastUsed),
            Self::Random => Box::new(Random),
        }
    }
}

impl<'de> Deserialize<'de> for StrategyKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}
