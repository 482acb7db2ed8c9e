//! Line framing for the wire streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line length
//! to prevent memory exhaustion caused by an unterminated or maliciously
//! large message from a misbehaving server process.
//!
//! # Usage
//!
//! Use [`LineCodec`] as the codec parameter for
//! [`tokio_util::codec::FramedRead`] over the child's stdout and stderr.
//! Each `\n`-terminated UTF-8 string is one complete wire message; the
//! decoder strips the terminator, the encoder appends it.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted on the wire: 1 MiB.
///
/// Inbound lines exceeding this limit cause [`LineCodec::decode`] to return
/// [`AppError::Decode`] with `"line too long"` rather than allocating
/// unbounded memory for a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Newline-delimited framing codec for the server's stdio streams.
///
/// Delegates line framing to [`LinesCodec`] with a fixed [`MAX_LINE_BYTES`]
/// limit. Decoding yields only complete lines, terminator stripped; partial
/// input is buffered until the newline arrives. Encoding emits `line\n`; the
/// max-length limit is a decoder-side concern only.
#[derive(Debug)]
pub struct LineCodec(LinesCodec);

impl LineCodec {
    /// Create a new `LineCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` contains no complete line yet.
    ///
    /// # Errors
    ///
    /// [`AppError::Decode`]`("line too long: …")` when the line exceeds
    /// [`MAX_LINE_BYTES`]; [`AppError::Io`] on underlying stream failures.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final line when the stream reaches end-of-stream.
    ///
    /// # Errors
    ///
    /// Same mapping as [`LineCodec::decode`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for LineCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated line into `dst`.
    ///
    /// # Errors
    ///
    /// [`AppError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Decode(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
