//! Homomorphic-encryption collaborator interface
//!
//! The selection and attack core never touches ciphertexts. The analyst
//! path drives whichever collaborator the harness picked through the
//! [`HeCollaborator`] contract: key setup, encrypt, add, multiply with
//! relinearization, inner sum and decrypt.

mod clear;
mod elgamal;
mod primes;

pub use clear::{ClearBackend, ClearCiphertext};
pub use elgamal::{ElGamalBackend, KeyPair, PrivateKey, PublicKey, SlotCiphertext, VectorCiphertext};

use std::time::{Duration, Instant};

use rand::RngCore;
use serde::Serialize;

use crate::error::HeError;

/// Parameters handed to `key_setup`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeParams {
    /// Slots per ciphertext; equals the block size `S`
    pub slots: usize,
    /// Modulus size for group-based schemes
    pub key_bits: u64,
    /// Use a safe prime `p = 2q + 1` for the group modulus
    pub safe_prime: bool,
    /// Largest fixed-point slot value recoverable from the baby-step table
    pub max_plaintext: u64,
    /// Giant steps tried when the baby-step table misses
    pub giant_steps: u64,
}

impl Default for HeParams {
    fn default() -> Self {
        HeParams {
            slots: 1024,
            key_bits: 512,
            safe_prime: false,
            max_plaintext: 100_000,
            giant_steps: 4096,
        }
    }
}

/// What the analyst path expects from a homomorphic-encryption library
pub trait HeCollaborator: Sized {
    type Ciphertext: Clone;

    /// Short backend name used in diagnostics
    const NAME: &'static str;

    /// Generate the key material for one configuration
    fn key_setup(params: &HeParams, rng: &mut dyn RngCore) -> Result<Self, HeError>;

    fn slots(&self) -> usize;

    /// Encrypt at most `slots` values; missing slots are zero
    fn encrypt(&self, values: &[f64], rng: &mut dyn RngCore) -> Result<Self::Ciphertext, HeError>;

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext, HeError>;

    /// Slot-wise product followed by relinearization
    fn mul_relin(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext, HeError>;

    /// Sum of all slots, replicated into every slot
    fn inner_sum(&self, ct: &Self::Ciphertext) -> Result<Self::Ciphertext, HeError>;

    fn decrypt(&self, ct: &Self::Ciphertext) -> Result<Vec<f64>, HeError>;
}

/// Primitive operations whose cost is tracked
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeOp {
    Encrypt,
    Decrypt,
    Add,
    MulRelin,
    InnerSum,
}

/// Call count and elapsed time of one primitive
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct OpTiming {
    pub calls: usize,
    pub elapsed: Duration,
}

/// Elapsed time per HE primitive, threaded explicitly through the analyst
/// stages.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct HeMetrics {
    pub encrypt: OpTiming,
    pub decrypt: OpTiming,
    pub add: OpTiming,
    pub mul_relin: OpTiming,
    pub inner_sum: OpTiming,
}

impl HeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, op: HeOp) -> &mut OpTiming {
        match op {
            HeOp::Encrypt => &mut self.encrypt,
            HeOp::Decrypt => &mut self.decrypt,
            HeOp::Add => &mut self.add,
            HeOp::MulRelin => &mut self.mul_relin,
            HeOp::InnerSum => &mut self.inner_sum,
        }
    }

    /// Run `f` and charge its duration to `op`
    pub fn time<T>(&mut self, op: HeOp, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        let slot = self.slot(op);
        slot.calls += 1;
        slot.elapsed += start.elapsed();
        out
    }

    pub fn get(&self, op: HeOp) -> OpTiming {
        match op {
            HeOp::Encrypt => self.encrypt,
            HeOp::Decrypt => self.decrypt,
            HeOp::Add => self.add,
            HeOp::MulRelin => self.mul_relin,
            HeOp::InnerSum => self.inner_sum,
        }
    }

    pub fn total(&self) -> Duration {
        self.encrypt.elapsed
            + self.decrypt.elapsed
            + self.add.elapsed
            + self.mul_relin.elapsed
            + self.inner_sum.elapsed
    }
}
