//! Secure two-party computation on additive shares: opening, Beaver multiplication, logarithmic
//! product reduction, comparison and equality.
//!
//! All protocols take a [`Context`] that bundles the role of the local party, the field, the
//! [`Channel`] to the other party and the [`Supply`] of correlated randomness. Both parties must
//! call the same protocol functions in the same order with vectors of the same length, since every
//! call consists of a fixed sequence of [`Channel::exchange`] rounds.
//!
//! # Communication rounds
//!
//! | operation                  | rounds                 |
//! |----------------------------|------------------------|
//! | [`recover`], [`multiply`]  | 1                      |
//! | [`multiply_vec`]           | 1, for any length      |
//! | [`secure_product`]         | `ceil(log2(n))`        |
//! | [`less_than_vec`]          | `L + 2`, for any length |
//! | [`equal_vec`]              | `1 + ceil(log2(L))`    |
use std::future::Future;

use num_bigint::BigUint;
use tracing::{Level, debug, instrument};

use crate::{
    channel::{self, Channel, DuplexChannel, ErrorKind},
    data_types::{MultiplicationTriple, PartyId},
    field::Field,
    preprocessing::{Preprocessed, Supply},
};

mod compare;
mod equal;

pub use compare::{less_than, less_than_vec};
pub use equal::{equal, equal_vec};

/// A custom error type for the secure computation protocols.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent, received or decoded.
    #[error(transparent)]
    ChannelError(channel::Error),
    /// The protocol was called in a way that cannot produce a correct result.
    #[error(transparent)]
    Misuse(#[from] MisuseError),
    /// A plaintext value lies outside of `[0, p/2)`, the domain of comparison and equality.
    #[error("value {value} is not below the bound {bound} required for comparisons")]
    RangeViolation {
        /// The offending value.
        value: BigUint,
        /// The exclusive upper bound `(p + 1) / 2`.
        bound: BigUint,
    },
}

impl From<channel::Error> for Error {
    fn from(e: channel::Error) -> Self {
        match e.reason {
            ErrorKind::InvalidLength { expected, actual } => {
                Self::Misuse(MisuseError::PeerLengthMismatch {
                    phase: e.phase,
                    expected,
                    actual,
                })
            }
            _ => Self::ChannelError(e),
        }
    }
}

/// Ways of calling a protocol that cannot produce a correct result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MisuseError {
    /// Two local input vectors that must be combined element-wise differ in length.
    #[error("input vectors differ in length: {left} vs {right}")]
    LengthMismatch {
        /// The length of the first input.
        left: usize,
        /// The length of the mismatching input.
        right: usize,
    },
    /// The other party used a vector of a different length in the same round.
    #[error("the other party sent {actual} values instead of {expected} during {phase}")]
    PeerLengthMismatch {
        /// The protocol phase of the round.
        phase: String,
        /// The number of values this party expected.
        expected: usize,
        /// The number of values the other party sent.
        actual: usize,
    },
    /// The bit length cannot represent every element of the field.
    #[error("bit length {bit_length} is smaller than the {modulus_bits} bits of the modulus")]
    BitLengthTooSmall {
        /// The configured bit length `L`.
        bit_length: usize,
        /// The bit length of the modulus.
        modulus_bits: usize,
    },
    /// The modulus is not an odd prime.
    #[error("invalid modulus {0}, expected an odd prime")]
    InvalidModulus(BigUint),
    /// Not enough multiplication triples are left.
    #[error("{requested} triples requested, but only {available} are left")]
    TriplesExhausted {
        /// The number of triples the protocol needed.
        requested: usize,
        /// The number of triples left in the supply.
        available: usize,
    },
    /// Not enough random-number tuples are left.
    #[error("{requested} tuples requested, but only {available} are left")]
    TuplesExhausted {
        /// The number of tuples the protocol needed.
        requested: usize,
        /// The number of tuples left in the supply.
        available: usize,
    },
    /// A random-number tuple was decomposed into a different number of bits than the field uses.
    #[error("tuple has {actual} bits, but the field uses {expected}")]
    TupleBitLength {
        /// The bit length of the field.
        expected: usize,
        /// The bit length of the tuple.
        actual: usize,
    },
    /// The protocol needs at least one element.
    #[error("empty input")]
    EmptyInput,
}

/// Everything a party needs to run the protocols: its role, the field, the channel to the other
/// party and its supply of correlated randomness.
#[derive(Debug)]
pub struct Context<C, S = Preprocessed> {
    party: PartyId,
    field: Field,
    channel: C,
    supply: S,
}

impl<C: Channel, S: Supply> Context<C, S> {
    /// Creates the context of a party.
    pub fn new(party: PartyId, field: Field, channel: C, supply: S) -> Self {
        Self {
            party,
            field,
            channel,
            supply,
        }
    }

    /// The role of the local party.
    pub fn party(&self) -> PartyId {
        self.party
    }

    /// The field all shares live in.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The channel to the other party.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The supply of correlated randomness.
    pub fn supply(&self) -> &S {
        &self.supply
    }

    /// Mutable access to the supply, e.g. to top it up between protocol calls.
    pub fn supply_mut(&mut self) -> &mut S {
        &mut self.supply
    }

    /// Returns the channel and the supply.
    pub fn into_parts(self) -> (C, S) {
        (self.channel, self.supply)
    }
}

/// Opens a shared value: sends the local share and adds the share of the other party.
pub async fn recover<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    x: &BigUint,
) -> Result<BigUint, Error> {
    let theirs = ctx
        .channel
        .exchange("recover", std::slice::from_ref(x))
        .await?;
    Ok(ctx.field.add(x, &theirs[0]))
}

/// Opens a vector of shared values in a single round.
pub async fn recover_vec<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    xs: &[BigUint],
) -> Result<Vec<BigUint>, Error> {
    let theirs = ctx.channel.exchange("recover", xs).await?;
    Ok(xs
        .iter()
        .zip(&theirs)
        .map(|(x, t)| ctx.field.add(x, t))
        .collect())
}

/// Multiplies two shared values using one Beaver triple and one round.
pub async fn multiply<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    x: &BigUint,
    y: &BigUint,
) -> Result<BigUint, Error> {
    let mut z = multiply_vec(ctx, std::slice::from_ref(x), std::slice::from_ref(y)).await?;
    z.pop().ok_or(Error::Misuse(MisuseError::EmptyInput))
}

/// Multiplies shared vectors element-wise, consuming one triple per pair, in a single round.
///
/// The masked differences `e_i = x_i - a_i` are sent first, followed by all `f_i = y_i - b_i`.
pub async fn multiply_vec<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    xs: &[BigUint],
    ys: &[BigUint],
) -> Result<Vec<BigUint>, Error> {
    if xs.len() != ys.len() {
        return Err(MisuseError::LengthMismatch {
            left: xs.len(),
            right: ys.len(),
        }
        .into());
    }
    let n = xs.len();
    if n == 0 {
        return Ok(vec![]);
    }
    let triples = ctx.supply.triples(n)?;
    let field = &ctx.field;
    let mut masked = Vec::with_capacity(2 * n);
    masked.extend(xs.iter().zip(&triples).map(|(x, t)| field.sub(x, &t.a)));
    masked.extend(ys.iter().zip(&triples).map(|(y, t)| field.sub(y, &t.b)));

    let theirs = ctx.channel.exchange("multiply", &masked).await?;

    let field = &ctx.field;
    let z = triples
        .iter()
        .enumerate()
        .map(|(i, triple)| {
            let e = field.add(&masked[i], &theirs[i]);
            let f = field.add(&masked[n + i], &theirs[n + i]);
            beaver(field, ctx.party, &e, &f, triple)
        })
        .collect();
    Ok(z)
}

/// The local output share of a Beaver multiplication, given the opened masks `e` and `f`.
fn beaver(
    field: &Field,
    party: PartyId,
    e: &BigUint,
    f: &BigUint,
    triple: &MultiplicationTriple,
) -> BigUint {
    let z = f * &triple.a + e * &triple.b + &triple.c;
    let z = match party {
        PartyId::C1 => z,
        PartyId::C2 => z + e * f,
    };
    field.reduce(&z)
}

/// Multiplies all shared elements using a binary tree, in `ceil(log2(n))` rounds.
#[instrument(level = Level::DEBUG, skip_all, fields(party = %ctx.party, n = xs.len()), err)]
pub async fn secure_product<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    xs: &[BigUint],
) -> Result<BigUint, Error> {
    if xs.is_empty() {
        return Err(MisuseError::EmptyInput.into());
    }
    let mut products = secure_product_many(ctx, &[xs.to_vec()]).await?;
    products.pop().ok_or(Error::Misuse(MisuseError::EmptyInput))
}

/// Computes the products of several equal-length arrays at once.
///
/// Every round multiplies the front half of each array with its back half, carrying the last
/// element forward if the length is odd. The halves of all arrays share one [`multiply_vec`]
/// call, so the number of rounds depends only on the array length.
pub async fn secure_product_many<C: Channel, S: Supply>(
    ctx: &mut Context<C, S>,
    arrays: &[Vec<BigUint>],
) -> Result<Vec<BigUint>, Error> {
    let Some(first) = arrays.first() else {
        return Ok(vec![]);
    };
    let len = first.len();
    if let Some(other) = arrays.iter().find(|a| a.len() != len) {
        return Err(MisuseError::LengthMismatch {
            left: len,
            right: other.len(),
        }
        .into());
    }
    if len == 0 {
        return Err(MisuseError::EmptyInput.into());
    }

    let mut arrays = arrays.to_vec();
    let mut len = len;
    let mut round = 0;
    while len > 1 {
        let half = len / 2;
        let mut fronts = Vec::with_capacity(arrays.len() * half);
        let mut backs = Vec::with_capacity(arrays.len() * half);
        for array in &arrays {
            fronts.extend_from_slice(&array[..half]);
            backs.extend_from_slice(&array[half..2 * half]);
        }
        let products = multiply_vec(ctx, &fronts, &backs).await?;
        for (array, chunk) in arrays.iter_mut().zip(products.chunks(half)) {
            let tail = (len % 2 == 1).then(|| array[len - 1].clone());
            array.clear();
            array.extend_from_slice(chunk);
            array.extend(tail);
        }
        len = half + len % 2;
        round += 1;
        debug!(round, len, arrays = arrays.len(), "product round done");
    }
    Ok(arrays.into_iter().filter_map(|mut a| a.pop()).collect())
}

/// The buffer size (per direction) of the in-memory pipe used by [`simulate`].
pub const SIMULATION_BUFFER: usize = 64 * 1024;

/// Simulates a two-party protocol in one process, connecting both parties by an in-memory pipe.
///
/// `protocol` is called once per party with the party's [`Context`] and must return that party's
/// output. The outputs are returned as `(C1, C2)`.
pub async fn simulate<F, Fut, T>(
    field: &Field,
    supplies: (Preprocessed, Preprocessed),
    protocol: F,
) -> Result<(T, T), Error>
where
    F: Fn(Context<DuplexChannel, Preprocessed>) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let (c1, c2) = DuplexChannel::pair(SIMULATION_BUFFER);
    let (s1, s2) = supplies;
    let (r1, r2) = tokio::join!(
        protocol(Context::new(PartyId::C1, field.clone(), c1, s1)),
        protocol(Context::new(PartyId::C2, field.clone(), c2, s2)),
    );
    Ok((r1?, r2?))
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::{Error, MisuseError, multiply_vec, recover, recover_vec, secure_product, simulate};
    use crate::{dealer::Dealer, field::Field, preprocessing::ReusePolicy};

    fn field() -> Field {
        Field::with_modulus(BigUint::from(2147483647u32)).unwrap()
    }

    #[tokio::test]
    async fn recover_opens_both_ways() -> Result<(), Error> {
        let f = field();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (x1, x2) = f.split_share(&BigUint::from(123456u32), &mut rng);
        let shares = [x1, x2];
        let shares = &shares;
        let (a, b) = simulate(&f, Default::default(), move |mut ctx| async move {
            let i = ctx.party() as usize;
            recover(&mut ctx, &shares[i]).await
        })
        .await?;
        assert_eq!(a, BigUint::from(123456u32));
        assert_eq!(b, BigUint::from(123456u32));
        Ok(())
    }

    #[tokio::test]
    async fn recover_vec_in_one_round() -> Result<(), Error> {
        let f = field();
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let plain: Vec<BigUint> = (0..10u32).map(|i| BigUint::from(i * 1000)).collect();
        let (s1, s2): (Vec<_>, Vec<_>) = plain.iter().map(|x| f.split_share(x, &mut rng)).unzip();
        let shares = [s1, s2];
        let shares = &shares;
        let (a, _) = simulate(&f, Default::default(), move |mut ctx| async move {
            let i = ctx.party() as usize;
            recover_vec(&mut ctx, &shares[i]).await
        })
        .await?;
        assert_eq!(a, plain);
        Ok(())
    }

    #[tokio::test]
    async fn multiply_consumes_one_triple_per_pair() -> Result<(), Error> {
        let f = field();
        let mut dealer = Dealer::seeded(f.clone(), 3);
        let supplies = dealer.deal(5, 0, ReusePolicy::SingleUse);
        let (xs, ys) = (vec![BigUint::from(3u32); 3], vec![BigUint::from(0u32); 3]);
        let (xs, ys) = (&xs, &ys);
        let (a, _) = simulate(&f, supplies, move |mut ctx| async move {
            multiply_vec(&mut ctx, xs, ys).await?;
            Ok(ctx.supply().remaining_triples())
        })
        .await?;
        assert_eq!(a, 2);
        Ok(())
    }

    #[tokio::test]
    async fn local_length_mismatch_is_misuse() {
        let f = field();
        let result = simulate(&f, Default::default(), |mut ctx| async move {
            multiply_vec(&mut ctx, &[BigUint::from(1u32)], &[]).await
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::Misuse(MisuseError::LengthMismatch { left: 1, right: 0 }))
        ));
    }

    #[tokio::test]
    async fn empty_product_is_misuse() {
        let f = field();
        let result = simulate(&f, Default::default(), |mut ctx| async move {
            secure_product(&mut ctx, &[]).await
        })
        .await;
        assert!(matches!(result, Err(Error::Misuse(MisuseError::EmptyInput))));
    }

    #[tokio::test]
    async fn exhausted_triples_are_reported() {
        let f = field();
        let mut dealer = Dealer::seeded(f.clone(), 4);
        let supplies = dealer.deal(1, 0, ReusePolicy::SingleUse);
        let result = simulate(&f, supplies, |mut ctx| async move {
            let xs = vec![BigUint::from(2u32); 3];
            secure_product(&mut ctx, &xs).await
        })
        .await;
        assert!(matches!(
            result,
            Err(Error::Misuse(MisuseError::TriplesExhausted {
                requested: 1,
                available: 0
            }))
        ));
    }
}
