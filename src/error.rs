//! Error types for the partial-encryption evaluation core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PartencError>;

/// Errors raised by a homomorphic-encryption collaborator.
///
/// These are surfaced to the harness verbatim; the selection and attack
/// logic never depends on them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeError {
    #[error("Invalid key size: {0} bits (must be at least 512)")]
    InvalidKeySize(u64),

    #[error("Plaintext {value} outside the encodable range [0, {max}]")]
    PlaintextOutOfRange { value: i64, max: u64 },

    #[error("Plaintext {0} has no fixed-point encoding")]
    Unencodable(String),

    #[error("Slot count mismatch: expected at most {expected}, got {actual}")]
    SlotMismatch { expected: usize, actual: usize },

    #[error("Operation not supported by the {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("Failed to compute modular inverse")]
    ModularInverseError,

    #[error("Failed to solve discrete logarithm: {0}")]
    DiscreteLogError(String),

    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

#[derive(Error, Debug)]
pub enum PartencError {
    #[error("Input shape mismatch: {filename} has {actual} records, expected {expected}")]
    InputShape {
        filename: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot quantize {field:?} in {filename} at record {record}")]
    QuantizationDomain {
        filename: String,
        record: usize,
        field: String,
    },

    #[error("Encryption budget of {requested} exceeds the {available} available")]
    BudgetInfeasible { requested: usize, available: usize },

    #[error("No unique attacker data block found after {retries} retries")]
    AtdExhausted { retries: usize },

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("HE collaborator error: {0}")]
    He(#[from] HeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}
