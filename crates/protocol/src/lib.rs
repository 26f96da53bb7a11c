//! Vaultwire protocol engine.
//!
//! Sans-IO client-side implementation of the Vaultwire secure session
//! protocol: an RSA key-wrap handshake establishes a shared AES-256-GCM
//! master key, after which authenticated, encrypted request/response
//! exchanges flow over length-prefixed frames. A successful login yields a
//! [`Credential`] that resumes the session later without a new handshake.
//!
//! The crate deliberately owns no sockets. [`HandshakeEngine`] consumes
//! decoded [`Envelope`]s and emits [`EngineAction`]s; transports, prompts and
//! persistence live with the caller.

pub mod crypto;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod handshake;
pub mod session;

pub use envelope::{Body, ContentType, Envelope, Head, Protocol};
pub use error::{ProtocolError, Result};
pub use handshake::{AuthKind, CredentialMode, EngineAction, HandshakeEngine};
pub use session::{ConnectionState, Credential, SessionState};
