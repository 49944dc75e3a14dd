/// Line codec: frames a TCP byte stream into chat lines.
///
/// Splits on `\n` (a preceding `\r` is dropped, so `\r\n` clients work too),
/// decodes each line as UTF-8, and serializes outgoing lines with a single
/// `\n` terminator.
///
/// Oversized lines (> 8191 bytes) are skipped rather than killing the
/// connection.
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Maximum line length (excluding the terminator).
pub const MAX_LINE_LENGTH: usize = 8191;

/// Codec error: an oversized line we could not recover from, or an I/O error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("line exceeds maximum length ({MAX_LINE_LENGTH} bytes)")]
    LineTooLong,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A tokio codec that frames text lines on `\n` boundaries.
#[derive(Debug, Default)]
pub struct LineCodec {
    /// True while discarding an oversized line and waiting for its `\n`.
    skipping: bool,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Turn raw line bytes (terminator already removed) into a `String`.
fn line_from_bytes(mut bytes: BytesMut) -> Result<String, CodecError> {
    if bytes.last() == Some(&b'\r') {
        bytes.truncate(bytes.len() - 1);
    }
    let line = std::str::from_utf8(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(line.to_owned())
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.skipping {
            match src.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    warn!(bytes = pos + 1, "codec: finished skipping oversized line tail");
                    src.advance(pos + 1);
                    self.skipping = false;
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }

        match src.iter().position(|b| *b == b'\n') {
            Some(pos) if pos > MAX_LINE_LENGTH => {
                warn!(bytes = pos, "codec: skipped oversized line ({pos} bytes)");
                src.advance(pos + 1);
                self.decode(src)
            }
            Some(pos) => {
                let line_bytes = src.split_to(pos);
                src.advance(1);
                line_from_bytes(line_bytes).map(Some)
            }
            None => {
                if src.len() > MAX_LINE_LENGTH {
                    warn!(
                        bytes = src.len(),
                        "codec: discarding oversized partial line, waiting for terminator"
                    );
                    src.clear();
                    self.skipping = true;
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if self.skipping {
            src.clear();
            self.skipping = false;
            return Err(CodecError::LineTooLong);
        }
        if src.is_empty() {
            return Ok(None);
        }
        // Peer closed without a final newline: deliver what is left.
        let rest = src.split_to(src.len());
        line_from_bytes(rest).map(Some)
    }
}

impl Encoder<String> for LineCodec {
    type Error = CodecError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len() + 1);
        dst.put_slice(item.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}
