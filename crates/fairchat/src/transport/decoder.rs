//! Incremental decoding of streaming response bodies.
//!
//! Bytes arrive in arbitrary chunks. [`Utf8StreamDecoder`] carries an
//! incomplete multi-byte sequence over to the next chunk, and
//! [`FrameDecoder`] splits the decoded text into lines and extracts the
//! `data: ` payloads.

use fairchat_protocol::{STREAM_DATA_PREFIX, STREAM_DONE};
use log::trace;

/// Stateful UTF-8 decoder.
///
/// Invalid sequences become U+FFFD, exactly as `String::from_utf8_lossy`
/// would produce for the concatenated input.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk, holding back a trailing incomplete sequence.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    break;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            self.pending = rest[valid..].to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush whatever is still held back at end of input.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let tail = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&tail).into_owned()
    }

    /// Number of bytes waiting for the rest of their sequence.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// A payload-bearing line of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Raw payload text following the `data: ` prefix.
    Data(String),
    /// The termination sentinel.
    Done,
}

/// Splits decoded text into lines and extracts payload frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8: Utf8StreamDecoder,
    buffer: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the frames of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line[..line.len() - 1]) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Process the unterminated final line once the body is exhausted.
    pub fn finish(&mut self) -> Vec<Frame> {
        let tail = self.utf8.finish();
        self.buffer.push_str(&tail);
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line).into_iter().collect()
    }

    /// Text buffered for a line that has not been completed yet.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }
}

/// Interpret one line without its trailing newline.
pub fn parse_line(line: &str) -> Option<Frame> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.strip_prefix(STREAM_DATA_PREFIX) {
        Some(payload) if payload == STREAM_DONE => Some(Frame::Done),
        Some(payload) => Some(Frame::Data(payload.to_string())),
        None => {
            if !line.is_empty() {
                trace!("ignoring non-data stream line: {line}");
            }
            None
        }
    }
}
