//! Reading a received message to the end and discarding it.

use queue_client::{Error, Message};

/// What draining a message produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Binary body read completely in `chunks` reads
    Binary { size_bytes: u64, chunks: u64 },
    /// Any other message type; counted with zero bytes, nothing read
    NonBinary,
}

impl DrainOutcome {
    pub fn size_bytes(&self) -> u64 {
        match self {
            DrainOutcome::Binary { size_bytes, .. } => *size_bytes,
            DrainOutcome::NonBinary => 0,
        }
    }
}

/// Read the full body of `message` into `buffer` chunk by chunk and discard it.
///
/// The buffer is reused across messages; its size bounds each read and is
/// independent of the message size.
pub fn drain_message(message: &mut Message, buffer: &mut [u8]) -> Result<DrainOutcome, Error> {
    let Message::Bytes(body) = message else {
        return Ok(DrainOutcome::NonBinary);
    };

    if buffer.is_empty() {
        return Err(Error::InvalidConfig("read buffer must not be empty".to_string()));
    }

    let declared = body.body_length();
    let mut read = 0u64;
    let mut chunks = 0u64;
    while let Some(n) = body.read_bytes(buffer)? {
        read += n as u64;
        chunks += 1;
    }

    if read != declared {
        return Err(Error::Transfer(format!(
            "read {read} bytes but message declared {declared}"
        )));
    }

    Ok(DrainOutcome::Binary {
        size_bytes: declared,
        chunks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use queue_client::BytesMessage;

    #[test]
    fn test_binary_message_read_in_chunks() {
        let mut message = Message::Bytes(BytesMessage::new(Bytes::from(vec![0u8; 1000])));
        let mut buffer = vec![0u8; 256];

        let outcome = drain_message(&mut message, &mut buffer).unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Binary {
                size_bytes: 1000,
                chunks: 4
            }
        );
    }

    #[test]
    fn test_non_binary_message_counts_zero_bytes() {
        let mut buffer = vec![0u8; 16];
        for mut message in [Message::Text("hello".to_string()), Message::Empty] {
            let outcome = drain_message(&mut message, &mut buffer).unwrap();
            assert_eq!(outcome, DrainOutcome::NonBinary);
            assert_eq!(outcome.size_bytes(), 0);
        }
    }

    #[test]
    fn test_draining_twice_records_same_size() {
        let body = BytesMessage::new(Bytes::from(vec![9u8; 3000]));
        let mut buffer = vec![0u8; 512];

        let mut message = Message::Bytes(body);
        let first = drain_message(&mut message, &mut buffer).unwrap();
        if let Message::Bytes(body) = &mut message {
            body.reset();
        }
        let second = drain_message(&mut message, &mut buffer).unwrap();

        assert_eq!(first.size_bytes(), 3000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_truncated_message_is_transfer_error() {
        let mut message = Message::Bytes(BytesMessage::with_declared_length(
            Bytes::from(vec![1u8; 10]),
            20,
        ));
        let mut buffer = vec![0u8; 4];

        let err = drain_message(&mut message, &mut buffer).unwrap_err();
        assert_eq!(err.kind(), queue_client::ErrorKind::Transfer);
    }

    #[test]
    fn test_empty_body() {
        let mut message = Message::Bytes(BytesMessage::new(Bytes::new()));
        let mut buffer = vec![0u8; 4];
        let outcome = drain_message(&mut message, &mut buffer).unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Binary {
                size_bytes: 0,
                chunks: 0
            }
        );
    }
}
