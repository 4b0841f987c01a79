//! Line framing for the IRC wire protocol.
//!
//! [`LineCodec`] turns the transport's byte stream into logical lines. Bytes
//! that arrive without a terminator stay in the read buffer as carry-over and
//! are completed by the next read, so the sequence of lines does not depend
//! on how the stream was chunked.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Maximum length of an inbound line, including tags and any `\r`.
///
/// Longer lines are dropped whole, however the bytes were chunked.
pub const MAX_LINE_LEN: usize = 8191;

/// Size of each read from the transport.
pub const READ_CHUNK: usize = 4096;

/// Strip terminators from an outbound line.
///
/// Leading and trailing CR/LF are removed. A line with an embedded terminator
/// is cut at the first one so a single call can never emit two commands.
pub fn normalize(line: &str) -> &str {
    let trimmed = line.trim_matches(['\r', '\n']);
    match trimmed.find(['\r', '\n']) {
        Some(pos) => {
            warn!(line = %trimmed, "outbound line contains an embedded terminator; truncating");
            &trimmed[..pos]
        }
        None => trimmed,
    }
}

/// Decoder/encoder for CRLF-terminated IRC lines.
#[derive(Debug, Clone)]
pub struct LineCodec {
    /// Offset already scanned for a terminator.
    next_index: usize,
    max_len: usize,
    /// Set while skipping the rest of an oversized line.
    discarding: bool,
}

impl LineCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        Self::with_max_len(MAX_LINE_LEN)
    }

    /// Create a codec with a custom line length limit.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
            discarding: false,
        }
    }

    fn decode_line(raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        text.trim_end_matches('\r').replace('\0', "")
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ClientError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, ClientError> {
        loop {
            let found = buf[self.next_index..].iter().position(|&b| b == b'\n');
            let Some(offset) = found else {
                if self.discarding {
                    buf.clear();
                    self.next_index = 0;
                } else if buf.len() > self.max_len {
                    warn!(len = buf.len(), limit = self.max_len, "inbound line too long; discarding");
                    buf.clear();
                    self.next_index = 0;
                    self.discarding = true;
                } else {
                    self.next_index = buf.len();
                }
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;
            let raw = buf.split_to(end + 1);

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if end > self.max_len {
                warn!(len = end, limit = self.max_len, "inbound line too long; discarding");
                continue;
            }

            let line = Self::decode_line(&raw[..end]);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, ClientError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if !buf.is_empty() {
            debug!(len = buf.len(), "dropping unterminated fragment at end of stream");
            buf.clear();
        }
        self.next_index = 0;
        Ok(None)
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ClientError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), ClientError> {
        let line = normalize(line.as_ref());
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
