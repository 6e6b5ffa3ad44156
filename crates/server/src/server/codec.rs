//! Inbound line framing that survives over-long lines.

use bytes::BytesMut;
use protocol::MAX_LINE_LENGTH;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// One decoded inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Line(String),
    /// A line longer than the limit. Its bytes are discarded up to the next newline.
    Oversized,
}

/// [`LinesCodec`] that reports an over-long line as an item instead of an
/// error, so the stream keeps going after it.
#[derive(Debug, Clone)]
pub struct MetroCodec {
    inner: LinesCodec,
}

impl MetroCodec {
    pub fn new() -> Self {
        Self { inner: LinesCodec::new_with_max_length(MAX_LINE_LENGTH) }
    }

    fn map(result: Result<Option<String>, LinesCodecError>) -> Result<Option<Inbound>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(Inbound::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Inbound::Oversized)),
            Err(e) => Err(e),
        }
    }
}

impl Default for MetroCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MetroCodec {
    type Item = Inbound;
    type Error = LinesCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        Self::map(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Inbound>, LinesCodecError> {
        Self::map(self.inner.decode_eof(buf))
    }
}

impl Encoder<String> for MetroCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: String, buf: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.inner.encode(line, buf)
    }
}
