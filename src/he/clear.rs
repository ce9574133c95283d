//! Plaintext stand-in for an HE library
//!
//! Performs every operation on the clear slot vector. Useful as a reference
//! for the analyst pipeline and for timing the rest of the sweep without
//! cryptographic cost.

use rand::RngCore;

use super::{HeCollaborator, HeParams};
use crate::error::HeError;

/// Slot vector in the clear
#[derive(Clone, Debug, PartialEq)]
pub struct ClearCiphertext(pub Vec<f64>);

#[derive(Clone, Debug)]
pub struct ClearBackend {
    slots: usize,
}

impl ClearBackend {
    fn check_slots(&self, ct: &ClearCiphertext) -> Result<(), HeError> {
        if ct.0.len() != self.slots {
            return Err(HeError::SlotMismatch {
                expected: self.slots,
                actual: ct.0.len(),
            });
        }
        Ok(())
    }

    fn zip_with(
        &self,
        a: &ClearCiphertext,
        b: &ClearCiphertext,
        op: impl Fn(f64, f64) -> f64,
    ) -> Result<ClearCiphertext, HeError> {
        self.check_slots(a)?;
        self.check_slots(b)?;
        Ok(ClearCiphertext(
            a.0.iter().zip(&b.0).map(|(x, y)| op(*x, *y)).collect(),
        ))
    }
}

impl HeCollaborator for ClearBackend {
    type Ciphertext = ClearCiphertext;

    const NAME: &'static str = "clear";

    fn key_setup(params: &HeParams, _rng: &mut dyn RngCore) -> Result<Self, HeError> {
        Ok(ClearBackend {
            slots: params.slots,
        })
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn encrypt(&self, values: &[f64], _rng: &mut dyn RngCore) -> Result<ClearCiphertext, HeError> {
        if values.len() > self.slots {
            return Err(HeError::SlotMismatch {
                expected: self.slots,
                actual: values.len(),
            });
        }
        let mut slots = values.to_vec();
        slots.resize(self.slots, 0.0);
        Ok(ClearCiphertext(slots))
    }

    fn add(&self, a: &ClearCiphertext, b: &ClearCiphertext) -> Result<ClearCiphertext, HeError> {
        self.zip_with(a, b, |x, y| x + y)
    }

    fn mul_relin(&self, a: &ClearCiphertext, b: &ClearCiphertext) -> Result<ClearCiphertext, HeError> {
        self.zip_with(a, b, |x, y| x * y)
    }

    fn inner_sum(&self, ct: &ClearCiphertext) -> Result<ClearCiphertext, HeError> {
        self.check_slots(ct)?;
        let total = ct.0.iter().sum();
        Ok(ClearCiphertext(vec![total; self.slots]))
    }

    fn decrypt(&self, ct: &ClearCiphertext) -> Result<Vec<f64>, HeError> {
        self.check_slots(ct)?;
        Ok(ct.0.clone())
    }
}
