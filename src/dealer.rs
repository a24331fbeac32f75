//! The dealer as a (semi-)trusted party, providing correlated randomness.
//!
//! The dealer knows both shares of every triple and tuple it generates, so it must not collude
//! with either party. [`Dealer::deal`] generates the shares of both parties in one process for
//! simulations; [`serve`] and [`provision`] run the dealer as a separate service that streams each
//! party only its own shares.

use num_bigint::BigUint;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{Level, debug, instrument};

use crate::{
    data_types::{MultiplicationTriple, RandomNumberTuple},
    field::Field,
    preprocessing::{Preprocessed, ReusePolicy},
};

/// Errors that can occur while provisioning correlated randomness.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provisioning stream failed.
    #[error("I/O error on the provisioning stream: {0}")]
    Io(#[from] std::io::Error),
    /// A provisioning message could not be (de-)serialized.
    #[error("could not (de-)serialize a provisioning message: {0}")]
    Serde(#[from] bincode::Error),
    /// A provisioning message does not fit into a frame.
    #[error("message of {0} bytes is too large for a frame")]
    FrameTooLarge(usize),
    /// The parties requested different amounts of randomness.
    #[error("the parties requested different amounts of randomness: {0:?} vs {1:?}")]
    RequestMismatch(Request, Request),
    /// The parties requested tuples with a different bit length than the dealer's field.
    #[error("requested bit length {actual}, but the dealer uses {expected}")]
    BitLengthMismatch {
        /// The bit length of the dealer's field.
        expected: usize,
        /// The requested bit length.
        actual: usize,
    },
    /// The dealer rejected the request of this party.
    #[error("the dealer rejected the request: {0}")]
    Rejected(String),
    /// The dealer delivered a different number of shares than requested.
    #[error("requested {expected:?}, but received {triples} triples and {tuples} tuples")]
    InvalidDelivery {
        /// The request sent to the dealer.
        expected: Request,
        /// The number of triples received.
        triples: usize,
        /// The number of tuples received.
        tuples: usize,
    },
}

/// The amount of correlated randomness a party asks the dealer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// The number of multiplication triples.
    pub triples: usize,
    /// The number of random-number tuples.
    pub tuples: usize,
    /// The bit length the tuples must be decomposed into.
    pub bit_length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
enum Provision {
    Shares {
        triples: Vec<MultiplicationTriple>,
        tuples: Vec<RandomNumberTuple>,
    },
    Rejected(String),
}

/// The shares of both parties, as generated by the dealer.
type Dealt<T> = (Vec<T>, Vec<T>);

/// Generates Beaver triples and random-number tuples, split into the shares of both parties.
///
/// The random source is pluggable: [`Dealer::from_os_rng`] is the secure default,
/// [`Dealer::seeded`] makes runs reproducible and [`Dealer::new`] accepts any [`RngCore`], e.g.
/// a faster non-cryptographic generator for benchmarks.
#[derive(Debug, Clone)]
pub struct Dealer<R = ChaCha20Rng> {
    field: Field,
    rng: R,
}

impl Dealer<ChaCha20Rng> {
    /// Creates a dealer using ChaCha20 seeded from the operating system.
    pub fn from_os_rng(field: Field) -> Self {
        Self::new(field, ChaCha20Rng::from_os_rng())
    }

    /// Creates a dealer with a reproducible random source. Never use this outside of tests.
    pub fn seeded(field: Field, seed: u64) -> Self {
        Self::new(field, ChaCha20Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> Dealer<R> {
    /// Creates a dealer drawing all randomness from `rng`.
    pub fn new(field: Field, rng: R) -> Self {
        Self { field, rng }
    }

    /// The field the dealer generates shares in.
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Splits a value into two additive shares.
    pub fn split(&mut self, x: &BigUint) -> (BigUint, BigUint) {
        self.field.split_share(x, &mut self.rng)
    }

    /// Generates a Beaver triple and returns the triple shares of C1 and C2.
    pub fn triple(&mut self) -> (MultiplicationTriple, MultiplicationTriple) {
        let a = self.field.random(&mut self.rng);
        let b = self.field.random(&mut self.rng);
        let c = self.field.reduce(&(&a * &b));
        let (a1, a2) = self.split(&a);
        let (b1, b2) = self.split(&b);
        let (c1, c2) = self.split(&c);
        (
            MultiplicationTriple {
                a: a1,
                b: b1,
                c: c1,
            },
            MultiplicationTriple {
                a: a2,
                b: b2,
                c: c2,
            },
        )
    }

    /// Generates a random value with its bit decomposition and returns the tuple shares of C1 and
    /// C2.
    pub fn tuple(&mut self) -> (RandomNumberTuple, RandomNumberTuple) {
        let r = self.field.random(&mut self.rng);
        let (r1, r2) = self.split(&r);
        let (bits1, bits2): (Vec<_>, Vec<_>) = self
            .field
            .bits(&r)
            .into_iter()
            .map(|bit| self.split(&BigUint::from(bit as u8)))
            .unzip();
        (
            RandomNumberTuple { r: r1, bits: bits1 },
            RandomNumberTuple { r: r2, bits: bits2 },
        )
    }

    fn generate(
        &mut self,
        triples: usize,
        tuples: usize,
    ) -> (Dealt<MultiplicationTriple>, Dealt<RandomNumberTuple>) {
        let triples = (0..triples).map(|_| self.triple()).unzip();
        let tuples = (0..tuples).map(|_| self.tuple()).unzip();
        (triples, tuples)
    }

    /// Generates the preprocessed pools of both parties for a simulation in one process.
    pub fn deal(
        &mut self,
        triples: usize,
        tuples: usize,
        policy: ReusePolicy,
    ) -> (Preprocessed, Preprocessed) {
        let ((triples1, triples2), (tuples1, tuples2)) = self.generate(triples, tuples);
        debug!(
            triples = triples1.len(),
            tuples = tuples1.len(),
            "dealer generated shares"
        );
        (
            Preprocessed::new(triples1, tuples1, policy),
            Preprocessed::new(triples2, tuples2, policy),
        )
    }
}

/// Runs the dealer as a service for one provisioning round with both parties.
///
/// Both parties must send the same [`Request`]. If they disagree, or ask for a bit length other
/// than the dealer's, both are told so and the error is returned.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn serve<C1, C2, R>(c1: &mut C1, c2: &mut C2, dealer: &mut Dealer<R>) -> Result<(), Error>
where
    C1: AsyncRead + AsyncWrite + Unpin,
    C2: AsyncRead + AsyncWrite + Unpin,
    R: RngCore,
{
    let (req1, req2) = tokio::try_join!(recv_msg::<Request, _>(c1), recv_msg::<Request, _>(c2))?;
    debug!(?req1, ?req2, "dealer received requests");

    let rejection = if req1 != req2 {
        Some(Error::RequestMismatch(req1, req2))
    } else if req1.bit_length != dealer.field.bit_length() {
        Some(Error::BitLengthMismatch {
            expected: dealer.field.bit_length(),
            actual: req1.bit_length,
        })
    } else {
        None
    };
    if let Some(e) = rejection {
        let msg = Provision::Rejected(e.to_string());
        tokio::try_join!(send_msg(c1, &msg), send_msg(c2, &msg))?;
        return Err(e);
    }

    let ((triples1, triples2), (tuples1, tuples2)) = dealer.generate(req1.triples, req1.tuples);
    let msg1 = Provision::Shares {
        triples: triples1,
        tuples: tuples1,
    };
    let msg2 = Provision::Shares {
        triples: triples2,
        tuples: tuples2,
    };
    tokio::try_join!(send_msg(c1, &msg1), send_msg(c2, &msg2))?;
    debug!("dealer sent shares to both parties");
    Ok(())
}

/// Requests correlated randomness from a dealer running [`serve`] and returns this party's pool.
#[instrument(level = Level::DEBUG, skip(dealer), err)]
pub async fn provision<D>(
    dealer: &mut D,
    request: Request,
    policy: ReusePolicy,
) -> Result<Preprocessed, Error>
where
    D: AsyncRead + AsyncWrite + Unpin,
{
    send_msg(dealer, &request).await?;
    match recv_msg::<Provision, _>(dealer).await? {
        Provision::Shares { triples, tuples } => {
            if triples.len() != request.triples || tuples.len() != request.tuples {
                return Err(Error::InvalidDelivery {
                    expected: request,
                    triples: triples.len(),
                    tuples: tuples.len(),
                });
            }
            Ok(Preprocessed::new(triples, tuples, policy))
        }
        Provision::Rejected(reason) => Err(Error::Rejected(reason)),
    }
}

/// The largest provisioning message in bytes that is sent or accepted.
pub const MAX_FRAME_LEN: usize = 1 << 30;

/// Writes a bincode message prefixed by its length as a big-endian `u32`.
async fn send_msg<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &impl Serialize,
) -> Result<(), Error> {
    let bytes = bincode::serialize(msg)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(bytes.len()));
    }
    let len = u32::try_from(bytes.len()).map_err(|_| Error::FrameTooLarge(bytes.len()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

async fn recv_msg<T: DeserializeOwned, R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<T, Error> {
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes).await?;
    Ok(bincode::deserialize(&bytes)?)
}
