//! Number-theory helpers for the group-based backend

use num_bigint::{BigInt, BigUint, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::RngCore;

use crate::error::HeError;

/// Smallest modulus accepted for key generation
pub(crate) const MIN_KEY_BITS: u64 = 512;

const MILLER_RABIN_ROUNDS: usize = 20;

/// Modular inverse via the extended Euclidean algorithm
pub(crate) fn mod_inverse(a: &BigUint, m: &BigUint) -> Option<BigUint> {
    let (gcd, x, _) = extended_gcd(&BigInt::from(a.clone()), &BigInt::from(m.clone()));
    if !gcd.is_one() {
        return None;
    }
    x.mod_floor(&BigInt::from(m.clone())).to_biguint()
}

// Uses signed intermediates; coefficients may be negative.
fn extended_gcd(a: &BigInt, b: &BigInt) -> (BigInt, BigInt, BigInt) {
    if a.is_zero() {
        return (b.clone(), BigInt::zero(), BigInt::one());
    }
    let (gcd, x1, y1) = extended_gcd(&(b % a), a);
    let x = y1 - (b / a) * &x1;
    (gcd, x, x1)
}

/// Write `n` as `2^s * d` with `d` odd
pub(crate) fn factor_powers_of_two(n: &BigUint) -> (u64, BigUint) {
    let mut s = 0;
    let mut d = n.clone();
    while d.is_even() && !d.is_zero() {
        d >>= 1;
        s += 1;
    }
    (s, d)
}

/// Miller-Rabin with `k` random witnesses
pub(crate) fn is_probable_prime(n: &BigUint, k: usize, rng: &mut dyn RngCore) -> bool {
    let two = BigUint::from(2u32);
    let three = BigUint::from(3u32);

    if n <= &BigUint::one() {
        return false;
    }
    if n == &two || n == &three {
        return true;
    }
    if n.is_even() {
        return false;
    }

    let n_minus_1 = n - BigUint::one();
    let (s, d) = factor_powers_of_two(&n_minus_1);

    'witness: for _ in 0..k {
        let a = if n_minus_1 <= two {
            two.clone()
        } else {
            rng.gen_biguint_range(&two, &n_minus_1)
        };

        let mut x = a.modpow(&d, n);
        if x.is_one() || x == n_minus_1 {
            continue;
        }
        for _ in 1..s {
            x = x.modpow(&two, n);
            if x == n_minus_1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Random prime with exactly `bit_size` bits
pub(crate) fn generate_prime(bit_size: u64, rng: &mut dyn RngCore) -> Result<BigUint, HeError> {
    if bit_size < MIN_KEY_BITS {
        return Err(HeError::InvalidKeySize(bit_size));
    }

    let max_iterations = 100_000;
    for _ in 0..max_iterations {
        let mut candidate = rng.gen_biguint(bit_size);
        candidate |= BigUint::one();
        candidate |= BigUint::one() << (bit_size - 1);

        if candidate.bits() == bit_size && is_probable_prime(&candidate, MILLER_RABIN_ROUNDS, rng) {
            return Ok(candidate);
        }
    }
    Err(HeError::CryptoError(format!(
        "failed to generate {}-bit prime after {} iterations",
        bit_size, max_iterations
    )))
}

/// Safe prime `p = 2q + 1` within eight bits of `target_bits`
pub(crate) fn generate_safe_prime(
    target_bits: u64,
    rng: &mut dyn RngCore,
) -> Result<(BigUint, BigUint), HeError> {
    if target_bits < MIN_KEY_BITS {
        return Err(HeError::InvalidKeySize(target_bits));
    }

    let max_iterations = 1_000_000;
    let min_bits = target_bits.saturating_sub(8);
    let max_bits = target_bits + 8;

    for iteration in 0..max_iterations {
        // vary the size slightly around the target
        let variation = iteration % 17;
        let attempt_bits = if variation < 8 {
            target_bits.saturating_sub(variation / 2)
        } else {
            target_bits + (variation - 8) / 2
        };

        let q_bits = attempt_bits.saturating_sub(1);
        let mut q = rng.gen_biguint(q_bits);
        q |= BigUint::one();
        if q_bits > 1 {
            q |= BigUint::one() << (q_bits - 1);
        }

        if is_probable_prime(&q, 15, rng) {
            let p = &q * 2u32 + 1u32;
            let p_bits = p.bits();
            if p_bits >= min_bits && p_bits <= max_bits && is_probable_prime(&p, 15, rng) {
                return Ok((p, q));
            }
        }
    }
    Err(HeError::CryptoError(format!(
        "failed to generate safe prime near {} bits after {} iterations",
        target_bits, max_iterations
    )))
}

/// Element of order neither 2 nor `q` modulo `p`
pub(crate) fn find_generator(p: &BigUint, q: &BigUint, rng: &mut dyn RngCore) -> BigUint {
    let two = BigUint::from(2u32);
    let p_minus_1 = p - BigUint::one();

    loop {
        let g = rng.gen_biguint_range(&two, &p_minus_1);
        if !g.modpow(&two, p).is_one() && !g.modpow(q, p).is_one() {
            return g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mod_inverse() {
        let a = BigUint::from(3u32);
        let m = BigUint::from(11u32);
        let inv = mod_inverse(&a, &m).unwrap();
        assert_eq!((a * inv) % m, BigUint::one());

        assert!(mod_inverse(&BigUint::from(4u32), &BigUint::from(8u32)).is_none());
    }

    #[test]
    fn test_factor_powers_of_two() {
        assert_eq!(factor_powers_of_two(&BigUint::from(40u32)), (3, BigUint::from(5u32)));
        assert_eq!(factor_powers_of_two(&BigUint::from(7u32)), (0, BigUint::from(7u32)));
    }

    #[test]
    fn test_is_probable_prime() {
        let mut rng = StdRng::seed_from_u64(1);
        for p in [2u32, 3, 5, 7, 11, 13, 7919] {
            assert!(is_probable_prime(&BigUint::from(p), 20, &mut rng), "{p}");
        }
        for c in [0u32, 1, 4, 6, 9, 15, 561, 7917] {
            assert!(!is_probable_prime(&BigUint::from(c), 20, &mut rng), "{c}");
        }
    }

    #[test]
    fn test_key_size_validation() {
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(generate_prime(256, &mut rng), Err(HeError::InvalidKeySize(256)));
        assert_eq!(
            generate_safe_prime(128, &mut rng).map(|_| ()),
            Err(HeError::InvalidKeySize(128))
        );
    }

    #[test]
    fn test_generate_prime() {
        let mut rng = StdRng::seed_from_u64(3);
        let p = generate_prime(512, &mut rng).unwrap();
        assert_eq!(p.bits(), 512);
        assert!(is_probable_prime(&p, 20, &mut rng));
    }
}
