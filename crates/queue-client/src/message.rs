//! Message model delivered by consumers.

use crate::error::{Error, Result};
use bytes::Bytes;

/// A message received from a destination.
#[derive(Debug, Clone)]
pub enum Message {
    /// Binary payload, read in chunks
    Bytes(BytesMessage),
    /// Text payload
    Text(String),
    /// No payload at all
    Empty,
}

impl Message {
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Bytes(_))
    }

    /// Short human-readable description for log lines.
    pub fn describe(&self) -> String {
        match self {
            Message::Bytes(bytes) => format!("bytes message ({} bytes)", bytes.body_length()),
            Message::Text(text) => format!("text message ({} chars)", text.chars().count()),
            Message::Empty => "empty message".to_string(),
        }
    }
}

/// Binary message body with a read cursor.
///
/// The body is read with repeated [`BytesMessage::read_bytes`] calls into a
/// caller-owned buffer until it returns `None`.
#[derive(Debug, Clone)]
pub struct BytesMessage {
    body: Bytes,
    declared_length: u64,
    position: usize,
}

impl BytesMessage {
    pub fn new(body: Bytes) -> Self {
        Self {
            declared_length: body.len() as u64,
            body,
            position: 0,
        }
    }

    /// A message whose header announces `declared_length` bytes regardless of
    /// the content actually present. Reading past the content fails.
    pub fn with_declared_length(body: Bytes, declared_length: u64) -> Self {
        Self {
            body,
            declared_length,
            position: 0,
        }
    }

    /// Body length in bytes as announced by the message.
    pub fn body_length(&self) -> u64 {
        self.declared_length
    }

    /// Copy the next chunk of the body into `buffer`.
    ///
    /// Returns the number of bytes copied, or `None` once the body is exhausted.
    pub fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<Option<usize>> {
        let remaining = &self.body[self.position..];
        if remaining.is_empty() {
            if (self.position as u64) < self.declared_length {
                return Err(Error::Transfer(format!(
                    "message body truncated: read {} of {} bytes",
                    self.position, self.declared_length
                )));
            }
            return Ok(None);
        }

        let n = remaining.len().min(buffer.len());
        buffer[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(Some(n))
    }

    /// Rewind the read cursor to the start of the body.
    pub fn reset(&mut self) {
        self.position = 0;
    }
}
