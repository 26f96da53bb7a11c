//! Message envelopes and their wire codec.
//!
//! Every message is a JSON document with a `head` (routing and session
//! metadata) and a `body` (the actual payload fields). On the wire the JSON
//! is base85-encoded; once a shared key exists, a `.`-delimited base85
//! HMAC-SHA256 tag over the raw JSON bytes is appended:
//!
//! ```text
//! base85(json)                      before key agreement
//! base85(json) "." base85(hmac)     after key agreement
//! ```
//!
//! Binary body fields (wrapped keys, ciphertexts) are carried as base85
//! strings inside the JSON.

use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::error::{ProtocolError, Result};

/// Delimiter between the payload and its authentication tag.
const TAG_DELIMITER: char = '.';

/// Message class carried in the `content-type` head field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// Key agreement traffic.
    #[serde(rename = "handshake")]
    Handshake,
    /// Client payloads encrypted under the master key.
    #[serde(rename = "client_master_secret")]
    ClientMasterSecret,
    /// Server payloads encrypted under the master key.
    #[serde(rename = "server_master_secret")]
    ServerMasterSecret,
    /// Server acknowledgement of a completed registration.
    #[serde(rename = "sign_up_report")]
    SignUpReport,
    /// Server acknowledgement of a successful login.
    #[serde(rename = "login_report")]
    LoginReport,
    /// Server-reported failure.
    #[serde(rename = "return_error")]
    ReturnError,
}

/// Protocol step carried in the `protocol` head field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "client_hello")]
    ClientHello,
    #[serde(rename = "server_hello")]
    ServerHello,
    #[serde(rename = "client_key_exchange")]
    ClientKeyExchange,
    #[serde(rename = "change_cipher_spec")]
    ChangeCipherSpec,
    #[serde(rename = "login")]
    Login,
    #[serde(rename = "sign_up")]
    SignUp,
    #[serde(rename = "sign_up_complete")]
    SignUpComplete,
    #[serde(rename = "welcome")]
    Welcome,
    #[serde(rename = "request")]
    Request,
    #[serde(rename = "response")]
    Response,
    #[serde(rename = "error")]
    Error,
}

impl Protocol {
    /// Wire name, for logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::ClientHello => "client_hello",
            Protocol::ServerHello => "server_hello",
            Protocol::ClientKeyExchange => "client_key_exchange",
            Protocol::ChangeCipherSpec => "change_cipher_spec",
            Protocol::Login => "login",
            Protocol::SignUp => "sign_up",
            Protocol::SignUpComplete => "sign_up_complete",
            Protocol::Welcome => "welcome",
            Protocol::Request => "request",
            Protocol::Response => "response",
            Protocol::Error => "error",
        }
    }
}

/// Routing and session metadata. Absent fields serialize as `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Head {
    #[serde(rename = "content-type")]
    pub content_type: ContentType,
    pub protocol: Protocol,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub random_token: Option<String>,
    #[serde(default)]
    pub random_token_length: Option<usize>,
    #[serde(rename = "session-id", default)]
    pub session_id: Option<String>,
    #[serde(rename = "session-id_length", default)]
    pub session_id_length: Option<usize>,
    #[serde(rename = "login-id", default)]
    pub login_id: Option<String>,
    #[serde(rename = "login-id_length", default)]
    pub login_id_length: Option<usize>,
}

/// Payload fields. Binary values are base85 strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub userid: Option<String>,
    #[serde(default)]
    pub userpw: Option<String>,
    #[serde(default)]
    pub pre_master_key: Option<String>,
    #[serde(default)]
    pub master_secret: Option<String>,
    #[serde(rename = "public-key", default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub server_error: Option<String>,
}

/// One protocol message. Transient: built, sent and dropped (or received,
/// handled and dropped) within a single exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub head: Head,
    pub body: Body,
}

impl Envelope {
    fn new(content_type: ContentType, protocol: Protocol, version: &str, address: &str) -> Self {
        Envelope {
            head: Head {
                content_type,
                protocol,
                platform: Some("client".to_string()),
                version: Some(version.to_string()),
                address: Some(address.to_string()),
                random_token: None,
                random_token_length: None,
                session_id: None,
                session_id_length: None,
                login_id: None,
                login_id_length: None,
            },
            body: Body::default(),
        }
    }

    /// Opening handshake message carrying the client's random token.
    pub fn client_hello(version: &str, address: &str, client_token: &str) -> Self {
        let mut env = Envelope::new(
            ContentType::Handshake,
            Protocol::ClientHello,
            version,
            address,
        );
        env.head.random_token = Some(client_token.to_string());
        env.head.random_token_length = Some(client_token.len());
        env
    }

    /// Key exchange message carrying the wrapped pre-master secret.
    pub fn client_key_exchange(version: &str, address: &str, wrapped_key: &[u8]) -> Self {
        let mut env = Envelope::new(
            ContentType::Handshake,
            Protocol::ClientKeyExchange,
            version,
            address,
        );
        env.body.pre_master_key = Some(base85::encode(wrapped_key));
        env
    }

    /// Login or signup message. `protocol` must be [`Protocol::Login`] or
    /// [`Protocol::SignUp`]; the user id and password arrive already
    /// encrypted under the master key.
    pub fn authentication(
        protocol: Protocol,
        version: &str,
        address: &str,
        session_id: &str,
        encrypted_userid: &[u8],
        encrypted_userpw: &[u8],
    ) -> Self {
        let mut env = Envelope::new(ContentType::ClientMasterSecret, protocol, version, address);
        env.head.session_id = Some(session_id.to_string());
        env.head.session_id_length = Some(session_id.len());
        env.body.userid = Some(base85::encode(encrypted_userid));
        env.body.userpw = Some(base85::encode(encrypted_userpw));
        env
    }

    /// Application request carrying an encrypted payload.
    pub fn request(
        version: &str,
        address: &str,
        login_id: &str,
        encrypted_payload: &[u8],
    ) -> Self {
        let mut env = Envelope::new(
            ContentType::ClientMasterSecret,
            Protocol::Request,
            version,
            address,
        );
        env.head.login_id = Some(login_id.to_string());
        env.head.login_id_length = Some(login_id.len());
        env.body.master_secret = Some(base85::encode(encrypted_payload));
        env
    }

    /// Serializes the envelope for the wire.
    ///
    /// With `auth_key` the output carries the `.`-delimited HMAC tag;
    /// without it the output is bare base85 JSON (pre-handshake only).
    pub fn encode(&self, auth_key: Option<&[u8]>) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut wire = base85::encode(&json);
        if let Some(key) = auth_key {
            let tag = crypto::keyed_hash(key, &json);
            wire.push(TAG_DELIMITER);
            wire.push_str(&base85::encode(&tag));
        }
        Ok(wire.into_bytes())
    }

    /// Parses an envelope received from the wire.
    ///
    /// With `current_key` set, the message must carry a valid tag under
    /// `current_key` or `fallback_key`; any malformation of an expected-
    /// authenticated message (missing delimiter, undecodable base85, tag
    /// mismatch) is an authentication failure. Without a key, a bare base85
    /// JSON document is expected.
    pub fn decode(
        bytes: &[u8],
        current_key: Option<&[u8]>,
        fallback_key: Option<&[u8]>,
    ) -> Result<Envelope> {
        let Some(expected_key) = current_key else {
            let text = std::str::from_utf8(bytes).map_err(|_| {
                ProtocolError::Deserialization("message is not valid UTF-8".to_string())
            })?;
            let json = crypto::base85_decode(text).ok_or_else(|| {
                ProtocolError::Deserialization("message is not valid base85".to_string())
            })?;
            return Ok(serde_json::from_slice(&json)?);
        };

        let text = std::str::from_utf8(bytes).map_err(|_| {
            ProtocolError::Authentication("authenticated message is not valid UTF-8".to_string())
        })?;
        let (payload_b85, tag_b85) = text.rsplit_once(TAG_DELIMITER).ok_or_else(|| {
            ProtocolError::Authentication("message is missing its authentication tag".to_string())
        })?;
        let json = crypto::base85_decode(payload_b85).ok_or_else(|| {
            ProtocolError::Authentication("message payload is not valid base85".to_string())
        })?;
        let tag = crypto::base85_decode(tag_b85).ok_or_else(|| {
            ProtocolError::Authentication("authentication tag is not valid base85".to_string())
        })?;

        let verified = crypto::verify_keyed_hash(expected_key, &json, &tag)
            || fallback_key
                .map(|key| crypto::verify_keyed_hash(key, &json, &tag))
                .unwrap_or(false);
        if !verified {
            return Err(ProtocolError::Authentication(
                "message authentication failed".to_string(),
            ));
        }

        Ok(serde_json::from_slice(&json)?)
    }
}
