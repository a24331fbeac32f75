//! A communication channel used to exchange field elements with the other party.
//!
//! On the wire every vector is a count line followed by one line per element, all written as
//! ASCII in radix 36. The count lets the receiver detect a length disagreement between the two
//! parties instead of silently reading the next message as the tail of the current one.

use std::{fmt::Write as _, future::Future, time::Duration};

use num_bigint::BigUint;
use num_traits::ToPrimitive;
use tokio::{
    io::{
        AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
        DuplexStream, ReadHalf, WriteHalf,
    },
    sync::mpsc::{Receiver, Sender, channel},
    time::timeout,
};
use tracing::trace;

/// The radix used to encode field elements (and counts) on the wire.
pub const WIRE_RADIX: u32 = 36;

/// Errors related to sending / receiving / decoding messages.
#[derive(Debug, thiserror::Error)]
#[error("channel error during {phase}: {reason}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl Error {
    fn new(phase: &str, reason: ErrorKind) -> Self {
        Self {
            phase: phase.to_string(),
            reason,
        }
    }
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// The message could not be written to the other party.
    #[error("could not send: {0}")]
    SendError(String),
    /// The message could not be read from the other party.
    #[error("could not receive: {0}")]
    RecvError(String),
    /// A line could not be decoded as a radix-36 number.
    #[error("malformed line {0:?}")]
    Malformed(String),
    /// The stream ended in the middle of a message.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// The other party sent a vector of a different length than expected.
    #[error("expected {expected} values, but the other party sent {actual}")]
    InvalidLength {
        /// The number of values this party expected.
        expected: usize,
        /// The number of values announced by the other party.
        actual: usize,
    },
    /// Nothing was received before the configured timeout.
    #[error("timeout elapsed")]
    TimeoutElapsed,
    /// The other side of an in-memory channel has been dropped.
    #[error("channel closed")]
    Closed,
}

/// A communication channel used to send/receive field elements to/from the other party.
pub trait Channel {
    /// Sends the values to the other party.
    fn send(
        &mut self,
        phase: &str,
        values: &[BigUint],
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Awaits exactly `len` values from the other party.
    fn recv(
        &mut self,
        phase: &str,
        len: usize,
    ) -> impl Future<Output = Result<Vec<BigUint>, Error>> + Send;

    /// Sends the values to the other party and returns the same number of values received from it.
    ///
    /// Sending and receiving must make progress concurrently: both parties call `exchange` at the
    /// same time, so a blocking send would stall both sides as soon as the transport buffers fill.
    fn exchange(
        &mut self,
        phase: &str,
        values: &[BigUint],
    ) -> impl Future<Output = Result<Vec<BigUint>, Error>> + Send;
}

/// A [`Channel`] over a duplex byte stream, using the line-oriented text encoding.
///
/// If a call fails (in particular on timeout) the stream may be left in the middle of a message
/// and the channel should be discarded.
#[derive(Debug)]
pub struct LineChannel<R, W> {
    reader: BufReader<R>,
    writer: W,
    timeout: Option<Duration>,
    bytes_sent: usize,
}

/// The [`LineChannel`] created by [`LineChannel::pair`] for in-process simulations.
pub type DuplexChannel = LineChannel<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> LineChannel<R, W> {
    /// Creates a channel reading from `reader` and writing to `writer`, without timeout.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            timeout: None,
            bytes_sent: 0,
        }
    }

    /// Fails every call that does not complete within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The number of bytes written to the other party so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }
}

impl<S: AsyncRead + AsyncWrite> LineChannel<ReadHalf<S>, WriteHalf<S>> {
    /// Splits a connected duplex stream (e.g. a TCP stream) into a channel.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

impl DuplexChannel {
    /// Creates two connected channels backed by an in-memory pipe of `buffer` bytes per direction.
    pub fn pair(buffer: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(buffer);
        (Self::from_stream(a), Self::from_stream(b))
    }
}

impl<R, W> Channel for LineChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, phase: &str, values: &[BigUint]) -> Result<(), Error> {
        let sent = within(self.timeout, write_values(&mut self.writer, values))
            .await
            .map_err(|reason| Error::new(phase, reason))?;
        self.bytes_sent += sent;
        trace!(phase, values = values.len(), bytes = sent, "sent");
        Ok(())
    }

    async fn recv(&mut self, phase: &str, len: usize) -> Result<Vec<BigUint>, Error> {
        let values = within(self.timeout, read_values(&mut self.reader, len))
            .await
            .map_err(|reason| Error::new(phase, reason))?;
        trace!(phase, values = len, "received");
        Ok(values)
    }

    async fn exchange(&mut self, phase: &str, values: &[BigUint]) -> Result<Vec<BigUint>, Error> {
        let Self {
            reader,
            writer,
            timeout,
            bytes_sent,
        } = self;
        let len = values.len();
        let joined = async {
            let (sent, received) =
                tokio::join!(write_values(writer, values), read_values(reader, len));
            // both halves have finished, a write failure takes precedence over a read failure
            Ok::<_, ErrorKind>((sent?, received?))
        };
        let (sent, received) = within(*timeout, joined)
            .await
            .map_err(|reason| Error::new(phase, reason))?;
        *bytes_sent += sent;
        trace!(phase, values = len, bytes = sent, "exchanged");
        Ok(received)
    }
}

async fn within<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, ErrorKind>>,
) -> Result<T, ErrorKind> {
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(ErrorKind::TimeoutElapsed),
        },
        None => fut.await,
    }
}

/// Encodes a vector as a count line followed by one line per value.
pub(crate) fn encode(values: &[BigUint]) -> String {
    let mut out = String::new();
    // writing into a String never fails
    let _ = writeln!(
        out,
        "{}",
        BigUint::from(values.len()).to_str_radix(WIRE_RADIX)
    );
    for value in values {
        out.push_str(&value.to_str_radix(WIRE_RADIX));
        out.push('\n');
    }
    out
}

/// Decodes a single line (without its line terminator).
pub(crate) fn decode(line: &str) -> Result<BigUint, ErrorKind> {
    BigUint::parse_bytes(line.as_bytes(), WIRE_RADIX)
        .ok_or_else(|| ErrorKind::Malformed(line.to_string()))
}

async fn write_values(
    writer: &mut (impl AsyncWrite + Unpin),
    values: &[BigUint],
) -> Result<usize, ErrorKind> {
    let msg = encode(values);
    writer
        .write_all(msg.as_bytes())
        .await
        .map_err(|e| ErrorKind::SendError(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| ErrorKind::SendError(e.to_string()))?;
    Ok(msg.len())
}

async fn read_values(
    reader: &mut (impl AsyncBufRead + Unpin),
    len: usize,
) -> Result<Vec<BigUint>, ErrorKind> {
    let mut line = String::new();
    let count = read_line(reader, &mut line).await?;
    let actual = count.to_usize().unwrap_or(usize::MAX);
    if actual != len {
        // the peer keeps writing all announced values, which blocks it on a full pipe unless they
        // are consumed
        skip_lines(reader, actual, &mut line).await;
        return Err(ErrorKind::InvalidLength {
            expected: len,
            actual,
        });
    }
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        values.push(read_line(reader, &mut line).await?);
    }
    Ok(values)
}

/// Discards up to `n` lines, stopping early at the end of the stream or on a read error.
async fn skip_lines(reader: &mut (impl AsyncBufRead + Unpin), n: usize, line: &mut String) {
    for _ in 0..n {
        line.clear();
        match reader.read_line(line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

async fn read_line(
    reader: &mut (impl AsyncBufRead + Unpin),
    line: &mut String,
) -> Result<BigUint, ErrorKind> {
    line.clear();
    let n = reader
        .read_line(line)
        .await
        .map_err(|e| ErrorKind::RecvError(e.to_string()))?;
    if n == 0 {
        return Err(ErrorKind::UnexpectedEof);
    }
    decode(line.trim_end_matches(['\n', '\r']))
}

/// A simple in-memory channel using [`Sender`] and [`Receiver`], one message per vector.
#[derive(Debug)]
pub struct SimpleChannel {
    s: Sender<Vec<BigUint>>,
    r: Receiver<Vec<BigUint>>,
}

impl SimpleChannel {
    /// Creates two connected channels for the two parties.
    pub fn pair() -> (Self, Self) {
        let buffer_capacity = 1024;
        let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
        let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
        (
            SimpleChannel {
                s: send_a_to_b,
                r: recv_b_to_a,
            },
            SimpleChannel {
                s: send_b_to_a,
                r: recv_a_to_b,
            },
        )
    }
}

async fn recv_vec(r: &mut Receiver<Vec<BigUint>>, len: usize) -> Result<Vec<BigUint>, ErrorKind> {
    let values = r.recv().await.ok_or(ErrorKind::Closed)?;
    if values.len() == len {
        Ok(values)
    } else {
        Err(ErrorKind::InvalidLength {
            expected: len,
            actual: values.len(),
        })
    }
}

impl Channel for SimpleChannel {
    async fn send(&mut self, phase: &str, values: &[BigUint]) -> Result<(), Error> {
        self.s
            .send(values.to_vec())
            .await
            .map_err(|_| Error::new(phase, ErrorKind::Closed))
    }

    async fn recv(&mut self, phase: &str, len: usize) -> Result<Vec<BigUint>, Error> {
        recv_vec(&mut self.r, len)
            .await
            .map_err(|reason| Error::new(phase, reason))
    }

    async fn exchange(&mut self, phase: &str, values: &[BigUint]) -> Result<Vec<BigUint>, Error> {
        let Self { s, r } = self;
        let (sent, received) = tokio::join!(s.send(values.to_vec()), recv_vec(r, values.len()));
        sent.map_err(|_| Error::new(phase, ErrorKind::Closed))?;
        received.map_err(|reason| Error::new(phase, reason))
    }
}
