//! Correlated randomness as consumed by the online protocols.
//!
//! Each party holds a [`Preprocessed`] pool of its own triple and tuple shares, filled either by
//! [`Dealer::deal`](crate::dealer::Dealer::deal) when both parties are simulated in one process or
//! by [`provision`](crate::dealer::provision) when the shares arrive from an external dealer. The
//! protocols never see the pool directly, they pull units through the [`Supply`] trait.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    data_types::{MultiplicationTriple, RandomNumberTuple},
    protocol::MisuseError,
};

/// Decides whether a triple or tuple may mask more than one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReusePolicy {
    /// Every multiplication gets a fresh triple and every masked value a fresh tuple. Running
    /// out is an error.
    #[default]
    SingleUse,
    /// The first triple and the first tuple are handed out again and again, without ever being
    /// consumed.
    ///
    /// The arithmetic stays correct, but reusing a mask leaks information to the other party.
    /// Only useful to measure communication cost with a handful of preprocessed values.
    Reuse,
}

/// A source of correlated randomness for one party.
pub trait Supply {
    /// Hands out `n` triples, one per elementary multiplication.
    fn triples(&mut self, n: usize) -> Result<Vec<MultiplicationTriple>, MisuseError>;

    /// Hands out `n` random-number tuples, one per masked value.
    fn tuples(&mut self, n: usize) -> Result<Vec<RandomNumberTuple>, MisuseError>;
}

/// The preprocessed triple and tuple shares of one party.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preprocessed {
    triples: VecDeque<MultiplicationTriple>,
    tuples: VecDeque<RandomNumberTuple>,
    policy: ReusePolicy,
}

impl Preprocessed {
    /// Creates a pool from this party's shares.
    pub fn new(
        triples: Vec<MultiplicationTriple>,
        tuples: Vec<RandomNumberTuple>,
        policy: ReusePolicy,
    ) -> Self {
        Self {
            triples: triples.into(),
            tuples: tuples.into(),
            policy,
        }
    }

    /// The policy this pool hands out units under.
    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Hands out all remaining units under `policy` instead.
    pub fn with_policy(mut self, policy: ReusePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The number of triples that have not been handed out yet.
    pub fn remaining_triples(&self) -> usize {
        self.triples.len()
    }

    /// The number of tuples that have not been handed out yet.
    pub fn remaining_tuples(&self) -> usize {
        self.tuples.len()
    }

    /// Adds more shares to the pool, e.g. from a second provisioning round.
    pub fn extend(&mut self, triples: Vec<MultiplicationTriple>, tuples: Vec<RandomNumberTuple>) {
        self.triples.extend(triples);
        self.tuples.extend(tuples);
    }
}

fn take<T: Clone>(
    pool: &mut VecDeque<T>,
    n: usize,
    policy: ReusePolicy,
    exhausted: impl FnOnce(usize) -> MisuseError,
) -> Result<Vec<T>, MisuseError> {
    match policy {
        ReusePolicy::SingleUse => {
            if pool.len() < n {
                return Err(exhausted(pool.len()));
            }
            Ok(pool.drain(..n).collect())
        }
        ReusePolicy::Reuse => match pool.front() {
            Some(unit) => Ok(vec![unit.clone(); n]),
            None if n == 0 => Ok(vec![]),
            None => Err(exhausted(0)),
        },
    }
}

impl Supply for Preprocessed {
    fn triples(&mut self, n: usize) -> Result<Vec<MultiplicationTriple>, MisuseError> {
        let triples = take(&mut self.triples, n, self.policy, |available| {
            MisuseError::TriplesExhausted {
                requested: n,
                available,
            }
        })?;
        debug!(n, remaining = self.triples.len(), "handing out triples");
        Ok(triples)
    }

    fn tuples(&mut self, n: usize) -> Result<Vec<RandomNumberTuple>, MisuseError> {
        let tuples = take(&mut self.tuples, n, self.policy, |available| {
            MisuseError::TuplesExhausted {
                requested: n,
                available,
            }
        })?;
        debug!(n, remaining = self.tuples.len(), "handing out tuples");
        Ok(tuples)
    }
}

/// The number of triples consumed by [`secure_product`](crate::protocol::secure_product) over
/// `n` elements.
pub fn triples_for_product(n: usize) -> usize {
    n.saturating_sub(1)
}

/// The number of triples consumed by one element of
/// [`less_than`](crate::protocol::less_than) with bit length `l`.
///
/// `l - 1` for the prefix-OR chain, `l` for selecting the random bit, `1` for the final XOR.
pub fn triples_for_comparison(l: usize) -> usize {
    2 * l
}

/// The number of triples consumed by one element of [`equal`](crate::protocol::equal) with bit
/// length `l`.
pub fn triples_for_equality(l: usize) -> usize {
    triples_for_product(l)
}
