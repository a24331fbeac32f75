//! Data types shared by the dealer, the preprocessing pool and the online protocols.

use std::fmt;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// The role played by a party in the two-party protocols.
///
/// The Beaver multiplication and the sharing of public constants are asymmetric, so the two roles
/// are not interchangeable: only [`PartyId::C2`] adds the `e * f` cross term, and only
/// [`PartyId::C1`] holds the value of a public constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartyId {
    /// The first party, holding the real value of every public constant.
    C1,
    /// The second party, adding the cross term of every Beaver multiplication.
    C2,
}

impl PartyId {
    /// Returns the role of the other party.
    pub fn peer(self) -> Self {
        match self {
            PartyId::C1 => PartyId::C2,
            PartyId::C2 => PartyId::C1,
        }
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartyId::C1 => f.write_str("C1"),
            PartyId::C2 => f.write_str("C2"),
        }
    }
}

/// One party's share of a Beaver triple `(a, b, c)` with `c = a * b mod p`.
///
/// A triple must only ever mask a single multiplication, see
/// [`ReusePolicy`](crate::preprocessing::ReusePolicy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplicationTriple {
    /// Share of the left mask `a`.
    pub a: BigUint,
    /// Share of the right mask `b`.
    pub b: BigUint,
    /// Share of the product `c = a * b`.
    pub c: BigUint,
}

/// One party's share of a random field element `r` together with shares of its bits.
///
/// The bits are the LSB-first binary expansion of `r`, zero-padded (or truncated) to the bit
/// length of the field, and each bit is shared independently of `r` and of the other bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomNumberTuple {
    /// Share of the random value `r`.
    pub r: BigUint,
    /// Shares of the bits of `r`, least significant bit first.
    pub bits: Vec<BigUint>,
}

impl RandomNumberTuple {
    /// The number of bits `L` this tuple was decomposed into.
    pub fn bit_length(&self) -> usize {
        self.bits.len()
    }
}
