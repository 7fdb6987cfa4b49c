//! # Networking Error Types
//!
//! All errors that can surface from the session pump and the batch codec.

use thiserror::Error;

use crate::server::SessionState;

/// Errors raised while encoding or decoding a batch frame.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The compressor failed while building an outbound frame.
    #[error("failed to compress batch: {0}")]
    Compress(#[source] std::io::Error),

    /// The compressed payload is corrupt or truncated.
    #[error("failed to decompress batch: {0}")]
    Decompress(#[source] std::io::Error),

    /// A varint ran past five bytes or overflowed 32 bits.
    #[error("varint exceeds 32 bits")]
    VarIntTooLong,

    /// The buffer ended in the middle of a varint.
    #[error("buffer ended inside a varint")]
    TruncatedVarInt,

    /// A length prefix claims more bytes than remain in the batch.
    #[error("length prefix of {declared} bytes overruns the {remaining} remaining")]
    LengthOverrun {
        /// Length declared by the prefix.
        declared: usize,
        /// Bytes actually left in the buffer.
        remaining: usize,
    },

    /// The decompressed batch exceeds the configured ceiling.
    #[error("decompressed batch exceeds {max} bytes")]
    PayloadTooLarge {
        /// Configured ceiling in bytes.
        max: usize,
    },

    /// The batch carries more entries than allowed.
    #[error("batch carries more than {max} packets")]
    TooManyPackets {
        /// Configured entry ceiling.
        max: usize,
    },

    /// A packet reached the batch encoder before being encoded.
    #[error("packet 0x{id:02x} was not encoded before batching")]
    Unencoded {
        /// Packet type id.
        id: u8,
    },

    /// The frame does not start with the batch marker byte.
    #[error("frame is missing the 0xFE batch marker")]
    MissingMarker,

    /// Compression level outside 0-9.
    #[error("invalid compression level {0}, expected 0-9")]
    InvalidLevel(u32),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors returned by session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The operation requires a different lifecycle state.
    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidState {
        /// State the operation requires.
        expected: SessionState,
        /// State the session was in.
        actual: SessionState,
    },

    /// The session has been disconnected.
    #[error("session is closed")]
    Closed,

    /// The bounded outbound queue is full.
    #[error("outbound queue full ({capacity} packets)")]
    OutboundFull {
        /// Configured queue bound.
        capacity: usize,
    },
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// A recoverable fault raised by an identity while handling one packet.
#[derive(Error, Debug)]
pub enum HandlerFault {
    /// The identity refused the packet.
    #[error("packet rejected: {0}")]
    Rejected(String),

    /// Any other failure inside the handler.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised while loading pump configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Compression level outside 0-9.
    #[error("compression_level must be 0-9, got {0}")]
    InvalidLevel(u32),

    /// Tick interval of zero.
    #[error("tick_interval_ms must be greater than zero")]
    InvalidInterval,

    /// A queue or batch limit of zero.
    #[error("{0} must be greater than zero")]
    InvalidLimit(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every variant a session operation can actually return.
    fn describe(err: &SessionError) -> &'static str {
        match err {
            SessionError::InvalidState { .. } => "state",
            SessionError::Closed => "closed",
            SessionError::OutboundFull { .. } => "full",
        }
    }

    #[test]
    fn test_session_error_messages() {
        let state = SessionError::InvalidState {
            expected: SessionState::Unidentified,
            actual: SessionState::Closed,
        };
        assert_eq!(describe(&state), "state");
        assert_eq!(state.to_string(), "session is Closed, expected Unidentified");

        let full = SessionError::OutboundFull { capacity: 8 };
        assert_eq!(describe(&full), "full");
        assert_eq!(full.to_string(), "outbound queue full (8 packets)");
        assert_eq!(describe(&SessionError::Closed), "closed");
    }

    #[test]
    fn test_codec_error_messages() {
        assert_eq!(
            CodecError::LengthOverrun { declared: 100, remaining: 3 }.to_string(),
            "length prefix of 100 bytes overruns the 3 remaining"
        );
        assert_eq!(
            CodecError::Unencoded { id: 0x09 }.to_string(),
            "packet 0x09 was not encoded before batching"
        );
    }
}
