//! Arithmetic in the prime field `Z_p` that all shares live in.
//!
//! Every operation here is local: it never talks to the other party and it never fails, because
//! the field is closed under addition, subtraction and scaling. Shares and fully opened values are
//! handled by the same functions, so `add` on two shares produces a share of the sum and `add` on
//! two opened values is plain modular addition.

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive, Zero};
use rand::RngCore;

use crate::{
    data_types::PartyId,
    protocol::{Error, MisuseError},
};

/// The public parameters of the field: an odd prime modulus `p` and the bit length `L` used to
/// decompose opened values into bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    modulus: BigUint,
    bit_length: usize,
    /// Exclusive upper bound `(p + 1) / 2` on values that can be compared.
    comparable_bound: BigUint,
}

impl Field {
    /// Creates a field with the given modulus and bit decomposition length.
    ///
    /// `modulus` must be an odd prime, which is checked with a Miller-Rabin test.
    /// `bit_length` must be at least the bit length of `modulus`, otherwise opened values and
    /// random masks cannot be represented bit by bit.
    pub fn new(modulus: BigUint, bit_length: usize) -> Result<Self, MisuseError> {
        if modulus < BigUint::from(3u8) || (&modulus % 2u32).is_zero() || !is_prime(&modulus) {
            return Err(MisuseError::InvalidModulus(modulus));
        }
        let modulus_bits = modulus_bits(&modulus);
        if bit_length < modulus_bits {
            return Err(MisuseError::BitLengthTooSmall {
                bit_length,
                modulus_bits,
            });
        }
        let comparable_bound = (&modulus + 1u32) >> 1u32;
        Ok(Self {
            modulus,
            bit_length,
            comparable_bound,
        })
    }

    /// Creates a field whose bit length is exactly the bit length of the modulus.
    pub fn with_modulus(modulus: BigUint) -> Result<Self, MisuseError> {
        let bit_length = modulus_bits(&modulus);
        Self::new(modulus, bit_length)
    }

    /// The prime modulus `p`.
    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    /// The bit length `L` used for bit decompositions.
    pub fn bit_length(&self) -> usize {
        self.bit_length
    }

    /// The largest bit length of plaintext values that comparison and equality support.
    pub fn max_value_bits(&self) -> usize {
        modulus_bits(&self.modulus).saturating_sub(2)
    }

    /// Reduces an arbitrary integer into `[0, p)`.
    pub fn reduce(&self, x: &BigUint) -> BigUint {
        x % &self.modulus
    }

    /// `(x + y) mod p`
    pub fn add(&self, x: &BigUint, y: &BigUint) -> BigUint {
        (x + y) % &self.modulus
    }

    /// `(x - y) mod p`
    pub fn sub(&self, x: &BigUint, y: &BigUint) -> BigUint {
        let x = x % &self.modulus;
        let y = y % &self.modulus;
        if x >= y {
            x - y
        } else {
            &self.modulus - y + x
        }
    }

    /// `(alpha * x) mod p`, i.e. multiplies a share by a public constant.
    pub fn scale(&self, alpha: &BigUint, x: &BigUint) -> BigUint {
        (alpha * x) % &self.modulus
    }

    /// Returns this party's share of a public constant: `k` for C1, `0` for C2.
    pub fn share_constant(&self, party: PartyId, k: &BigUint) -> BigUint {
        match party {
            PartyId::C1 => self.reduce(k),
            PartyId::C2 => BigUint::zero(),
        }
    }

    /// Draws a uniformly random element of `[0, p)` by rejection sampling.
    pub fn random(&self, rng: &mut (impl RngCore + ?Sized)) -> BigUint {
        let bits = modulus_bits(&self.modulus);
        let mut bytes = vec![0u8; bits.div_ceil(8)];
        let top_mask = 0xffu8 >> (bytes.len() * 8 - bits);
        loop {
            rng.fill_bytes(&mut bytes);
            if let Some(top) = bytes.last_mut() {
                *top &= top_mask;
            }
            let candidate = BigUint::from_bytes_le(&bytes);
            if candidate < self.modulus {
                return candidate;
            }
        }
    }

    /// Splits `x` into two additive shares `(x1, x2)` with `x1 + x2 = x mod p`.
    ///
    /// `x1` is uniform in `[0, p)`, so neither share on its own reveals anything about `x`.
    pub fn split_share(
        &self,
        x: &BigUint,
        rng: &mut (impl RngCore + ?Sized),
    ) -> (BigUint, BigUint) {
        let x1 = self.random(rng);
        let x2 = self.sub(x, &x1);
        (x1, x2)
    }

    /// Decomposes `x` into exactly `L` bits, least significant bit first.
    pub fn bits(&self, x: &BigUint) -> Vec<bool> {
        let mut bits: Vec<bool> = x
            .to_radix_le(2)
            .into_iter()
            .take(self.bit_length)
            .map(|digit| digit == 1)
            .collect();
        bits.resize(self.bit_length, false);
        bits
    }

    /// Returns `1 - x`, computed on shares: the constant is injected through
    /// [`Field::share_constant`].
    pub(crate) fn one_minus(&self, party: PartyId, x: &BigUint) -> BigUint {
        self.sub(&self.share_constant(party, &BigUint::one()), x)
    }

    /// Checks that a plaintext value lies in `[0, p/2)`, the domain of comparison and equality.
    pub fn ensure_comparable(&self, x: &BigUint) -> Result<(), Error> {
        if x < &self.comparable_bound {
            Ok(())
        } else {
            Err(Error::RangeViolation {
                value: x.clone(),
                bound: self.comparable_bound.clone(),
            })
        }
    }
}

/// Miller-Rabin primality test of an odd `n >= 3` with the first twelve primes as bases.
///
/// Deterministic below `3.3 * 10^24`, a strong probable-prime test above.
fn is_prime(n: &BigUint) -> bool {
    const BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];
    let one = BigUint::one();
    let minus_one = n - &one;
    let h = minus_one.trailing_zeros().unwrap_or(0);
    let t = &minus_one >> h;
    'bases: for base in BASES {
        let a = BigUint::from(base);
        if a >= minus_one {
            continue;
        }
        let mut b = a.modpow(&t, n);
        if b == one || b == minus_one {
            continue;
        }
        for _ in 1..h {
            b = (&b * &b) % n;
            if b == minus_one {
                continue 'bases;
            }
            if b == one {
                return false;
            }
        }
        return false;
    }
    true
}

fn modulus_bits(modulus: &BigUint) -> usize {
    modulus.bits().to_usize().unwrap_or(usize::MAX)
}
