//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
///
/// The variants fall into five categories: transport, crypto, authentication,
/// protocol/state-machine, and application errors reported by the server.
/// Crypto and authentication failures are always fatal to the current
/// session; application errors are the only recoverable category.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Transport errors
    /// Connection was closed before a full frame was received.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Transport-level failure (refused connection, short header, IO error).
    #[error("transport failure: {0}")]
    Transport(String),

    /// Frame exceeds the maximum allowed size.
    #[error("frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    // Cryptographic errors
    /// Symmetric key has the wrong length for the cipher.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Key length the cipher requires.
        expected: usize,
        /// Length that was supplied.
        got: usize,
    },

    /// Encryption or key-wrap operation failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or key-unwrap operation failed (not a tag mismatch).
    #[error("decryption failed: {0}")]
    Decryption(String),

    // Integrity errors
    /// HMAC or AEAD tag verification failed. Fatal to the session.
    #[error("authentication failed: {0}")]
    Authentication(String),

    // Protocol errors
    /// A well-formed message arrived that the current state cannot accept.
    #[error("unexpected {protocol:?} message in state {state:?}")]
    UnexpectedMessage {
        /// Engine state at the time the message arrived.
        state: String,
        /// Protocol value of the offending message.
        protocol: String,
    },

    /// An operation was invoked in a state that does not allow it.
    #[error("invalid handshake state: {0}")]
    InvalidState(String),

    // Serialization errors
    /// Failed to serialize an envelope.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize an envelope or decode its text encoding.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Application errors
    /// Business error reported by the server in a `return_error` envelope.
    #[error("server error: {0}")]
    Application(String),

    /// Locally rejected user input (user id or password rules).
    #[error("invalid input: {0}")]
    Validation(String),
}

impl ProtocolError {
    /// Whether this error must tear down the current session.
    ///
    /// Once integrity cannot be proven no partial trust is possible, so
    /// crypto and authentication failures are always fatal. Application
    /// errors are recoverable; everything else ends the connection but may
    /// be retried with a fresh session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidKeyLength { .. }
                | ProtocolError::Encryption(_)
                | ProtocolError::Decryption(_)
                | ProtocolError::Authentication(_)
        )
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => ProtocolError::ConnectionClosed(err.to_string()),
            _ => ProtocolError::Transport(err.to_string()),
        }
    }
}

impl From<rsa::Error> for ProtocolError {
    fn from(err: rsa::Error) -> Self {
        ProtocolError::Encryption(err.to_string())
    }
}
