//! Public protocol parameters that both parties must agree on, usually read from a JSON file.

use std::time::Duration;

use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    channel::LineChannel,
    data_types::PartyId,
    field::Field,
    preprocessing::{Preprocessed, ReusePolicy},
    protocol::{Context, MisuseError},
};

/// The timeout of [`ProtocolConfig::default`], in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10 * 60;

/// The parameters of a protocol session.
///
/// Every field may be omitted when deserializing, missing fields take their value from
/// [`ProtocolConfig::default`]. The modulus is written as a decimal string, since it usually does
/// not fit into a JSON number:
///
/// ```json
/// { "modulus": "65521", "bit_length": 16, "policy": "single_use", "timeout_secs": 30 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// The prime modulus `p`.
    #[serde(with = "decimal")]
    pub modulus: BigUint,
    /// The bit length `L`, defaulting to the bit length of the modulus.
    pub bit_length: Option<usize>,
    /// How triples and tuples are handed out.
    pub policy: ReusePolicy,
    /// The timeout of a single channel call in seconds, `None` to wait forever.
    pub timeout_secs: Option<u64>,
}

impl Default for ProtocolConfig {
    /// The Mersenne prime `2^127 - 1` with `L = 127`, single use and a timeout of 10 minutes.
    fn default() -> Self {
        Self {
            modulus: (BigUint::one() << 127u32) - 1u32,
            bit_length: None,
            policy: ReusePolicy::SingleUse,
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ProtocolConfig {
    /// Validates modulus and bit length and returns the field.
    pub fn field(&self) -> Result<Field, MisuseError> {
        match self.bit_length {
            Some(bit_length) => Field::new(self.modulus.clone(), bit_length),
            None => Field::with_modulus(self.modulus.clone()),
        }
    }

    /// The timeout of a single channel call.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Wraps a connected stream pair into a [`LineChannel`] with the configured timeout.
    pub fn channel<R, W>(&self, reader: R, writer: W) -> LineChannel<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let channel = LineChannel::new(reader, writer);
        match self.timeout() {
            Some(timeout) => channel.with_timeout(timeout),
            None => channel,
        }
    }

    /// Builds the context of `party`, applying the configured policy to its preprocessed shares.
    pub fn context<R, W>(
        &self,
        party: PartyId,
        reader: R,
        writer: W,
        preprocessed: Preprocessed,
    ) -> Result<Context<LineChannel<R, W>>, MisuseError>
    where
        R: AsyncRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let field = self.field()?;
        Ok(Context::new(
            party,
            field,
            self.channel(reader, writer),
            preprocessed.with_policy(self.policy),
        ))
    }
}

mod decimal {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(x: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&x.to_str_radix(10))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| D::Error::custom(format!("'{s}' is not a decimal number")))
    }
}
