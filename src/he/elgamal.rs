//! Slot-wise exponential ElGamal
//!
//! Each slot is an independent ciphertext `(g^k, g^m * h^k)` over a prime
//! field, with `m` the slot value in fixed-point milli-units. The scheme is
//! additively homomorphic only: `mul_relin` reports
//! [`HeError::Unsupported`] and negative plaintexts are rejected.

use std::collections::HashMap;
use std::fmt;

use num_bigint::{BigUint, RandBigInt};
use num_traits::One;
use rand::RngCore;

use super::primes::{find_generator, generate_prime, generate_safe_prime, mod_inverse, MIN_KEY_BITS};
use super::{HeCollaborator, HeParams};
use crate::error::HeError;
use crate::types::Quantized;

/// ElGamal public key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    pub(crate) p: BigUint,
    pub(crate) g: BigUint,
    pub(crate) h: BigUint,
}

impl PublicKey {
    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> &BigUint {
        &self.g
    }

    pub fn bit_size(&self) -> u64 {
        self.p.bits()
    }

    /// Check `p > 2` and that `g` and `h` lie strictly between 1 and `p`
    pub fn validate(&self) -> Result<(), HeError> {
        if self.p <= BigUint::from(2u32) {
            return Err(HeError::CryptoError("modulus p must be > 2".to_string()));
        }
        if self.g <= BigUint::one() || self.g >= self.p {
            return Err(HeError::CryptoError(
                "generator g must be in range (1, p)".to_string(),
            ));
        }
        if self.h <= BigUint::one() || self.h >= self.p {
            return Err(HeError::CryptoError(
                "public component h must be in range (1, p)".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({} bits)", self.bit_size())
    }
}

/// ElGamal private key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrivateKey {
    pub(crate) x: BigUint,
}

impl fmt::Display for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(***)")
    }
}

#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    /// Generate a key pair over a `bit_size`-bit prime
    ///
    /// Safe primes are slow to find at 512 bits; without `safe_prime` a
    /// random prime is used and `q = (p - 1) / 2`.
    pub fn generate(bit_size: u64, safe_prime: bool, rng: &mut dyn RngCore) -> Result<Self, HeError> {
        if bit_size < MIN_KEY_BITS {
            return Err(HeError::InvalidKeySize(bit_size));
        }

        let (p, q) = if safe_prime {
            generate_safe_prime(bit_size, rng)?
        } else {
            let p = generate_prime(bit_size, rng)?;
            let q = (&p - 1u32) / 2u32;
            (p, q)
        };

        let g = find_generator(&p, &q, rng);
        let x = rng.gen_biguint_range(&BigUint::one(), &(&p - 2u32));
        let h = g.modpow(&x, &p);

        let public_key = PublicKey { p, g, h };
        public_key.validate()?;

        Ok(KeyPair {
            public_key,
            private_key: PrivateKey { x },
        })
    }
}

impl fmt::Display for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({} bits)", self.public_key.bit_size())
    }
}

/// One encrypted slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotCiphertext {
    pub c1: BigUint,
    pub c2: BigUint,
}

/// A block of encrypted slots
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorCiphertext {
    pub slots: Vec<SlotCiphertext>,
}

/// Exponential ElGamal behind the collaborator interface
#[derive(Clone, Debug)]
pub struct ElGamalBackend {
    keys: KeyPair,
    slots: usize,
    max_plaintext: u64,
    giant_steps: u64,
    dlog_table: HashMap<BigUint, u64>,
    /// `g^-(max_plaintext + 1)`
    giant_stride: BigUint,
}

impl ElGamalBackend {
    /// Wrap existing keys; builds the baby-step table for `0..=max_plaintext`
    pub fn with_keys(keys: KeyPair, params: &HeParams) -> Result<Self, HeError> {
        let PublicKey { p, g, .. } = &keys.public_key;

        let mut dlog_table = HashMap::with_capacity(params.max_plaintext as usize + 1);
        let mut current = BigUint::one();
        for i in 0..=params.max_plaintext {
            dlog_table.insert(current.clone(), i);
            current = (&current * g) % p;
        }

        // `current` is now g^(max_plaintext + 1)
        let giant_stride = mod_inverse(&current, p).ok_or(HeError::ModularInverseError)?;

        Ok(ElGamalBackend {
            keys,
            slots: params.slots,
            max_plaintext: params.max_plaintext,
            giant_steps: params.giant_steps.max(1),
            dlog_table,
            giant_stride,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.keys.public_key
    }

    /// Largest slot value a fresh encryption accepts, in real units
    pub fn max_plaintext(&self) -> f64 {
        Quantized(self.max_plaintext as i64).to_f64()
    }

    fn encode(&self, value: f64) -> Result<BigUint, HeError> {
        let quantized =
            Quantized::from_f64(value).ok_or_else(|| HeError::Unencodable(value.to_string()))?;
        match u64::try_from(quantized.milli()) {
            Ok(m) if m <= self.max_plaintext => Ok(BigUint::from(m)),
            _ => Err(HeError::PlaintextOutOfRange {
                value: quantized.milli(),
                max: self.max_plaintext,
            }),
        }
    }

    fn encrypt_slot(&self, m: &BigUint, rng: &mut dyn RngCore) -> SlotCiphertext {
        let PublicKey { p, g, h } = &self.keys.public_key;
        let k = rng.gen_biguint_range(&BigUint::one(), &(p - 2u32));
        let c1 = g.modpow(&k, p);
        let c2 = (g.modpow(m, p) * h.modpow(&k, p)) % p;
        SlotCiphertext { c1, c2 }
    }

    fn combine(&self, a: &SlotCiphertext, b: &SlotCiphertext) -> SlotCiphertext {
        let p = &self.keys.public_key.p;
        SlotCiphertext {
            c1: (&a.c1 * &b.c1) % p,
            c2: (&a.c2 * &b.c2) % p,
        }
    }

    /// Baby-step lookup, then giant strides of `max_plaintext + 1`
    fn solve_discrete_log(&self, value: &BigUint) -> Result<u64, HeError> {
        let p = &self.keys.public_key.p;
        let stride = self.max_plaintext + 1;
        let mut gamma = value.clone();
        for j in 0..self.giant_steps {
            if let Some(&i) = self.dlog_table.get(&gamma) {
                return Ok(j * stride + i);
            }
            gamma = (&gamma * &self.giant_stride) % p;
        }
        Err(HeError::DiscreteLogError(format!(
            "plaintext exceeds {} milli-units",
            self.giant_steps * stride
        )))
    }

    fn decrypt_slot(&self, ct: &SlotCiphertext) -> Result<u64, HeError> {
        let p = &self.keys.public_key.p;
        let s = ct.c1.modpow(&self.keys.private_key.x, p);
        let s_inv = mod_inverse(&s, p).ok_or(HeError::ModularInverseError)?;
        let g_m = (&ct.c2 * s_inv) % p;
        self.solve_discrete_log(&g_m)
    }

    fn check_slots(&self, ct: &VectorCiphertext) -> Result<(), HeError> {
        if ct.slots.len() != self.slots {
            return Err(HeError::SlotMismatch {
                expected: self.slots,
                actual: ct.slots.len(),
            });
        }
        Ok(())
    }
}

impl HeCollaborator for ElGamalBackend {
    type Ciphertext = VectorCiphertext;

    const NAME: &'static str = "elgamal";

    fn key_setup(params: &HeParams, rng: &mut dyn RngCore) -> Result<Self, HeError> {
        let keys = KeyPair::generate(params.key_bits, params.safe_prime, rng)?;
        Self::with_keys(keys, params)
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn encrypt(&self, values: &[f64], rng: &mut dyn RngCore) -> Result<VectorCiphertext, HeError> {
        if values.len() > self.slots {
            return Err(HeError::SlotMismatch {
                expected: self.slots,
                actual: values.len(),
            });
        }
        let zero = BigUint::from(0u32);
        let mut slots = Vec::with_capacity(self.slots);
        for i in 0..self.slots {
            let slot = match values.get(i) {
                Some(&v) => self.encrypt_slot(&self.encode(v)?, rng),
                None => self.encrypt_slot(&zero, rng),
            };
            slots.push(slot);
        }
        Ok(VectorCiphertext { slots })
    }

    fn add(&self, a: &VectorCiphertext, b: &VectorCiphertext) -> Result<VectorCiphertext, HeError> {
        self.check_slots(a)?;
        self.check_slots(b)?;
        Ok(VectorCiphertext {
            slots: a
                .slots
                .iter()
                .zip(&b.slots)
                .map(|(x, y)| self.combine(x, y))
                .collect(),
        })
    }

    fn mul_relin(&self, _a: &VectorCiphertext, _b: &VectorCiphertext) -> Result<VectorCiphertext, HeError> {
        Err(HeError::Unsupported {
            backend: Self::NAME,
            operation: "mul_relin",
        })
    }

    fn inner_sum(&self, ct: &VectorCiphertext) -> Result<VectorCiphertext, HeError> {
        self.check_slots(ct)?;
        let mut iter = ct.slots.iter();
        let first = iter.next().cloned().ok_or(HeError::SlotMismatch {
            expected: self.slots,
            actual: 0,
        })?;
        let total = iter.fold(first, |acc, slot| self.combine(&acc, slot));
        Ok(VectorCiphertext {
            slots: vec![total; self.slots],
        })
    }

    fn decrypt(&self, ct: &VectorCiphertext) -> Result<Vec<f64>, HeError> {
        self.check_slots(ct)?;
        ct.slots
            .iter()
            .map(|slot| {
                let m = self.decrypt_slot(slot)?;
                Ok(Quantized(m as i64).to_f64())
            })
            .collect()
    }
}
