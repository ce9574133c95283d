//! Core types and data structures

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fixed-point scale of a quantized record (3 decimal places).
pub const QUANTUM_SCALE: i64 = 1000;

/// A record value quantized to 3 decimal places, stored in milli-units.
///
/// Equality and hashing are exact on this representation, so values read
/// from different files compare the same way regardless of how the source
/// text spelled them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Quantized(pub i64);

impl Quantized {
    /// Quantize a real number, returning `None` for NaN or infinities
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value * QUANTUM_SCALE as f64).round();
        if scaled.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Quantized(scaled as i64))
    }

    /// Get the value as a real number
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / QUANTUM_SCALE as f64
    }

    /// Get the raw milli-unit representation
    pub fn milli(self) -> i64 {
        self.0
    }

    /// Absolute difference in milli-units
    pub fn abs_diff(self, other: Quantized) -> u64 {
        self.0.abs_diff(other.0)
    }
}

impl fmt::Display for Quantized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.to_f64())
    }
}

/// One position of a household's attacker-visible stream.
///
/// `Encrypted` stands in for a marked record and never matches anything,
/// not even another `Encrypted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    Plain(Quantized),
    Encrypted,
}

impl Cell {
    /// Whether this cell reveals exactly `value`
    pub fn matches(&self, value: Quantized) -> bool {
        matches!(self, Cell::Plain(v) if *v == value)
    }

    /// Whether two cells are equal plaintexts
    pub fn matches_cell(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Plain(a), Cell::Plain(b)) => a == b,
            _ => false,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Cell::Encrypted)
    }
}

/// Source dataset; selects the transition threshold and the default data path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Dataset {
    Water,
    Electricity,
}

impl Dataset {
    /// Largest adjacent difference that still counts as "no transition"
    pub fn transition_threshold(&self) -> Quantized {
        match self {
            Dataset::Water => Quantized(100 * QUANTUM_SCALE),
            Dataset::Electricity => Quantized(2 * QUANTUM_SCALE),
        }
    }

    /// Default directory holding one CSV per household
    pub fn default_path(&self) -> &'static str {
        match self {
            Dataset::Water => "data/water",
            Dataset::Electricity => "data/electricity",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Water => write!(f, "water"),
            Dataset::Electricity => write!(f, "electricity"),
        }
    }
}

/// Block metric driving the greedy strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Target {
    Entropy,
    Transition,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Entropy => write!(f, "entropy"),
            Target::Transition => write!(f, "transition"),
        }
    }
}

/// Block selection strategy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    GlobalGreedy,
    HouseholdGreedy,
    Random,
    PairwiseUniqueness,
}

impl StrategyKind {
    /// Whether the strategy marks whole blocks (as opposed to single records)
    pub fn is_block_level(&self) -> bool {
        !matches!(self, StrategyKind::PairwiseUniqueness)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::GlobalGreedy => write!(f, "global-greedy"),
            StrategyKind::HouseholdGreedy => write!(f, "household-greedy"),
            StrategyKind::Random => write!(f, "random"),
            StrategyKind::PairwiseUniqueness => write!(f, "pairwise-uniqueness"),
        }
    }
}

/// Which homomorphic-encryption collaborator the harness times, if any
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HeBackendKind {
    #[default]
    None,
    Clear,
    #[value(name = "elgamal")]
    #[serde(rename = "elgamal")]
    ElGamal,
}

impl fmt::Display for HeBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeBackendKind::None => write!(f, "none"),
            HeBackendKind::Clear => write!(f, "clear"),
            HeBackendKind::ElGamal => write!(f, "elgamal"),
        }
    }
}
