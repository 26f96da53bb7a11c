//! Per-connection session state and the persisted session credential.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::KEY_SIZE;
use crate::error::{ProtocolError, Result};

/// Connection lifecycle. Transitions only move forward within one handshake;
/// the sole way back is a full reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No traffic yet.
    New,
    /// `client_hello` sent, waiting for the server's token and public key.
    HelloSent,
    /// Pre-master secret wrapped and sent; master key installed.
    KeyExchanged,
    /// Server confirmed the cipher change; session id assigned.
    Established,
    /// Login accepted; application requests allowed.
    Authenticated,
    /// Fatal server error; secrets wiped, next `start` begins from scratch.
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::HelloSent => "hello_sent",
            ConnectionState::KeyExchanged => "key_exchanged",
            ConnectionState::Established => "established",
            ConnectionState::Authenticated => "authenticated",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Mutable state of one session. Secrets live in [`Zeroizing`] buffers so
/// they are wiped on drop or replacement.
pub struct SessionState {
    pub state: ConnectionState,
    pub client_token: Option<String>,
    pub server_token: Option<String>,
    pre_master_secret: Option<Zeroizing<[u8; KEY_SIZE]>>,
    master_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    pub server_public_key: Option<String>,
    pub session_id: Option<String>,
    pub login_id: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            state: ConnectionState::New,
            client_token: None,
            server_token: None,
            pre_master_secret: None,
            master_key: None,
            server_public_key: None,
            session_id: None,
            login_id: None,
        }
    }

    /// Stores the freshly generated pre-master secret.
    pub fn set_pre_master(&mut self, secret: [u8; KEY_SIZE]) {
        self.pre_master_secret = Some(Zeroizing::new(secret));
    }

    pub fn pre_master(&self) -> Option<&[u8; KEY_SIZE]> {
        self.pre_master_secret.as_deref()
    }

    /// Promotes `key` to the session master key and wipes the pre-master
    /// secret. Installing a second master key within the same handshake is a
    /// state error.
    pub fn install_master_key(&mut self, key: [u8; KEY_SIZE]) -> Result<()> {
        if self.master_key.is_some() {
            return Err(ProtocolError::InvalidState(
                "master key already installed for this session".to_string(),
            ));
        }
        self.master_key = Some(Zeroizing::new(key));
        self.pre_master_secret = None;
        Ok(())
    }

    pub fn master_key(&self) -> Option<&[u8; KEY_SIZE]> {
        self.master_key.as_deref()
    }

    /// Wipes everything and returns to [`ConnectionState::New`].
    pub fn reset(&mut self) {
        *self = SessionState::new();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::new()
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("state", &self.state)
            .field("client_token", &self.client_token)
            .field("server_token", &self.server_token)
            .field(
                "pre_master_secret",
                &self.pre_master_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("session_id", &self.session_id)
            .field("login_id", &self.login_id)
            .finish()
    }
}

/// Proof of a past login: the server-assigned login id plus the session
/// master key. Persisted by the client and replayed to resume without a new
/// handshake. Serialized with the key as base85 text.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    pub login_id: String,
    #[serde(with = "key_encoding")]
    pub master_key: [u8; KEY_SIZE],
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("login_id", &self.login_id)
            .field("master_key", &"<redacted>")
            .finish()
    }
}

mod key_encoding {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::crypto::KEY_SIZE;

    pub fn serialize<S: Serializer>(key: &[u8; KEY_SIZE], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base85::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<[u8; KEY_SIZE], D::Error> {
        let text = String::deserialize(de)?;
        let bytes = crate::crypto::base85_decode(&text)
            .ok_or_else(|| serde::de::Error::custom("master key is not valid base85"))?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("master key has the wrong length"))
    }
}
