//! Sans-IO session engine.
//!
//! [`HandshakeEngine`] drives one client session through key agreement,
//! authentication and the request/response phase. It never touches a socket:
//! callers feed it decoded [`Envelope`]s and carry out the returned
//! [`EngineAction`]s, which keeps the whole protocol logic testable without a
//! live server.
//!
//! The happy path:
//!
//! ```text
//! start()            -> client_hello                 New -> HelloSent
//! handle(server_hello)  -> client_key_exchange       HelloSent -> KeyExchanged
//! handle(change_cipher_spec) -> AwaitCredentials     KeyExchanged -> Established
//! credentials(..)     -> login / sign_up
//! handle(welcome)     -> LoggedIn { credential }     Established -> Authenticated
//! request(..)         -> request
//! handle(response)    -> Response(text)
//! ```
//!
//! A persisted [`Credential`] short-circuits all of the above via
//! [`HandshakeEngine::resume`].

use tracing::{debug, warn};

use crate::crypto::{self, HkdfMasterKey, KeyDerivation, KEY_SIZE};
use crate::envelope::{ContentType, Envelope, Protocol};
use crate::error::{ProtocolError, Result};
use crate::session::{ConnectionState, Credential, SessionState};

/// Server error fragment meaning the user id is unknown.
const ERROR_USER_NOT_FOUND: &str = "user not found";
/// Server error fragment meaning the user id is already registered.
const ERROR_DUPLICATE_USER: &str = "duplicate user";

/// Which credential prompt the caller should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialMode {
    /// First prompt: the user picks login or signup.
    Choose,
    /// Registration just completed (or was required); ask for a login.
    Login,
    /// The server rejected the id for login/signup; ask for a registration.
    SignUp,
}

/// Authentication flavor selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Login,
    SignUp,
}

/// What the caller must do next.
#[derive(Debug)]
pub enum EngineAction {
    /// Transmit this envelope to the server.
    Send(Envelope),
    /// Ask the user for credentials, then call
    /// [`HandshakeEngine::credentials`].
    AwaitCredentials { mode: CredentialMode },
    /// Login succeeded; persist the credential for later resumption.
    LoggedIn { credential: Credential },
    /// Decrypted application response.
    Response(String),
    /// The session is dead; reconnect and start a fresh handshake.
    Restart { message: String },
}

/// Client-side protocol state machine. One instance per session.
pub struct HandshakeEngine {
    session: SessionState,
    kdf: Box<dyn KeyDerivation + Send>,
    fallback_key: Option<[u8; KEY_SIZE]>,
    version: String,
    address: String,
}

impl HandshakeEngine {
    pub fn new(version: &str, address: &str) -> Self {
        Self::with_kdf(version, address, Box::new(HkdfMasterKey))
    }

    /// Builds an engine with a caller-supplied key derivation scheme.
    pub fn with_kdf(version: &str, address: &str, kdf: Box<dyn KeyDerivation + Send>) -> Self {
        HandshakeEngine {
            session: SessionState::new(),
            kdf,
            fallback_key: None,
            version: version.to_string(),
            address: address.to_string(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// Key for authenticating outbound and inbound envelopes, once one
    /// exists.
    pub fn auth_key(&self) -> Option<&[u8]> {
        self.session.master_key().map(|k| k.as_slice())
    }

    /// Secondary verification key, typically a previously persisted
    /// credential's master key.
    pub fn fallback_key(&self) -> Option<&[u8]> {
        self.fallback_key.as_ref().map(|k| k.as_slice())
    }

    pub fn set_fallback_key(&mut self, key: [u8; KEY_SIZE]) {
        self.fallback_key = Some(key);
    }

    /// Opens a session: generates the client random token and produces the
    /// `client_hello` envelope.
    pub fn start(&mut self) -> Result<Envelope> {
        match self.session.state {
            ConnectionState::New => {}
            // A failed session restarts from scratch on its next step.
            ConnectionState::Error => self.session.reset(),
            other => {
                return Err(ProtocolError::InvalidState(format!(
                    "cannot start a handshake from state {}",
                    other
                )));
            }
        }
        let token = crypto::random_token();
        debug!(state = %self.session.state, "starting handshake");
        let envelope = Envelope::client_hello(&self.version, &self.address, &token);
        self.session.client_token = Some(token);
        self.session.state = ConnectionState::HelloSent;
        Ok(envelope)
    }

    /// Adopts a persisted credential, entering the authenticated phase
    /// without any handshake traffic. The credential's key also becomes the
    /// fallback verification key.
    pub fn resume(&mut self, credential: Credential) -> Result<()> {
        if self.session.state != ConnectionState::New {
            return Err(ProtocolError::InvalidState(format!(
                "cannot resume a session from state {}",
                self.session.state
            )));
        }
        self.session.install_master_key(credential.master_key)?;
        self.fallback_key = Some(credential.master_key);
        self.session.login_id = Some(credential.login_id);
        self.session.state = ConnectionState::Authenticated;
        debug!("session resumed from stored credential");
        Ok(())
    }

    /// Processes one inbound envelope and returns the caller's next step.
    pub fn handle(&mut self, envelope: Envelope) -> Result<EngineAction> {
        let head = &envelope.head;
        match (head.content_type, head.protocol) {
            (ContentType::Handshake, Protocol::ServerHello) => self.on_server_hello(&envelope),
            (ContentType::Handshake, Protocol::ChangeCipherSpec) => {
                self.on_change_cipher_spec(&envelope)
            }
            (ContentType::SignUpReport, Protocol::SignUpComplete) => self.on_sign_up_complete(),
            (ContentType::LoginReport, Protocol::Welcome) => self.on_welcome(&envelope),
            (ContentType::ServerMasterSecret, Protocol::Response) => self.on_response(&envelope),
            (ContentType::ReturnError, Protocol::Error) => self.on_error(&envelope),
            (_, protocol) => Err(ProtocolError::UnexpectedMessage {
                state: self.session.state.to_string(),
                protocol: protocol.as_str().to_string(),
            }),
        }
    }

    fn on_server_hello(&mut self, envelope: &Envelope) -> Result<EngineAction> {
        self.expect_state(ConnectionState::HelloSent, Protocol::ServerHello)?;

        let server_token = envelope.head.random_token.clone().ok_or_else(|| {
            ProtocolError::Deserialization("server hello is missing its random token".to_string())
        })?;
        let public_key = envelope.body.public_key.clone().ok_or_else(|| {
            ProtocolError::Deserialization("server hello is missing the public key".to_string())
        })?;
        let client_token = self.session.client_token.clone().ok_or_else(|| {
            ProtocolError::InvalidState("no client token recorded for this session".to_string())
        })?;

        // Both sides derive the same secret from the exchanged tokens; the
        // wrapped copy lets the server confirm the client saw its key.
        let secret = self
            .kdf
            .derive(server_token.as_bytes(), client_token.as_bytes())?;
        self.session.set_pre_master(secret);
        let wrapped = crypto::wrap_key(&public_key, &secret)?;

        self.session.server_token = Some(server_token);
        self.session.server_public_key = Some(public_key);
        self.session.install_master_key(secret)?;
        self.session.state = ConnectionState::KeyExchanged;
        debug!("pre-master secret wrapped, master key installed");

        Ok(EngineAction::Send(Envelope::client_key_exchange(
            &self.version,
            &self.address,
            &wrapped,
        )))
    }

    fn on_change_cipher_spec(&mut self, envelope: &Envelope) -> Result<EngineAction> {
        self.expect_state(ConnectionState::KeyExchanged, Protocol::ChangeCipherSpec)?;

        let session_id = envelope.head.session_id.clone().ok_or_else(|| {
            ProtocolError::Deserialization(
                "cipher spec confirmation is missing the session id".to_string(),
            )
        })?;
        self.session.session_id = Some(session_id);
        self.session.state = ConnectionState::Established;
        Ok(EngineAction::AwaitCredentials {
            mode: CredentialMode::Choose,
        })
    }

    fn on_sign_up_complete(&mut self) -> Result<EngineAction> {
        self.expect_state(ConnectionState::Established, Protocol::SignUpComplete)?;
        Ok(EngineAction::AwaitCredentials {
            mode: CredentialMode::Login,
        })
    }

    fn on_welcome(&mut self, envelope: &Envelope) -> Result<EngineAction> {
        self.expect_state(ConnectionState::Established, Protocol::Welcome)?;

        let login_id = envelope.head.login_id.clone().ok_or_else(|| {
            ProtocolError::Deserialization("login report is missing the login id".to_string())
        })?;
        let master_key = *self.session.master_key().ok_or_else(|| {
            ProtocolError::InvalidState("no master key at login completion".to_string())
        })?;

        self.session.login_id = Some(login_id.clone());
        self.session.state = ConnectionState::Authenticated;
        Ok(EngineAction::LoggedIn {
            credential: Credential {
                login_id,
                master_key,
            },
        })
    }

    fn on_response(&mut self, envelope: &Envelope) -> Result<EngineAction> {
        self.expect_state(ConnectionState::Authenticated, Protocol::Response)?;

        let payload = envelope.body.master_secret.as_deref().ok_or_else(|| {
            ProtocolError::Deserialization("response has no payload".to_string())
        })?;
        let blob = crypto::base85_decode(payload).ok_or_else(|| {
            ProtocolError::Deserialization("response payload is not valid base85".to_string())
        })?;
        let key = self.require_master_key()?;
        let plaintext = crypto::decrypt_with_key(&blob, &key)?;
        let text = String::from_utf8(plaintext).map_err(|_| {
            ProtocolError::Deserialization("response plaintext is not valid UTF-8".to_string())
        })?;
        Ok(EngineAction::Response(text))
    }

    /// Server-reported errors either re-route the authentication flow or
    /// kill the session. Anything unrecognized is fatal: state moves to
    /// `Error` and the caller reconnects from scratch.
    fn on_error(&mut self, envelope: &Envelope) -> Result<EngineAction> {
        let message = envelope
            .body
            .server_error
            .clone()
            .unwrap_or_else(|| "unspecified server error".to_string());
        warn!(%message, state = %self.session.state, "server reported an error");

        let auth_routable = self.session.state == ConnectionState::Established
            && (message.contains(ERROR_USER_NOT_FOUND) || message.contains(ERROR_DUPLICATE_USER));
        if auth_routable {
            return Ok(EngineAction::AwaitCredentials {
                mode: CredentialMode::SignUp,
            });
        }

        // Secrets are wiped now; the state object is recreated when the
        // caller starts the next handshake.
        self.session.reset();
        self.session.state = ConnectionState::Error;
        Ok(EngineAction::Restart { message })
    }

    /// Encrypts the user id and password individually and builds the login
    /// or signup envelope.
    pub fn credentials(&mut self, kind: AuthKind, userid: &str, password: &str) -> Result<Envelope> {
        self.require_state(ConnectionState::Established, "submit credentials")?;
        let session_id = self.session.session_id.clone().ok_or_else(|| {
            ProtocolError::InvalidState("no session id assigned yet".to_string())
        })?;
        let key = self.require_master_key()?;

        let enc_userid = crypto::encrypt_with_key(userid.as_bytes(), &key)?;
        let enc_userpw = crypto::encrypt_with_key(password.as_bytes(), &key)?;
        let protocol = match kind {
            AuthKind::Login => Protocol::Login,
            AuthKind::SignUp => Protocol::SignUp,
        };
        Ok(Envelope::authentication(
            protocol,
            &self.version,
            &self.address,
            &session_id,
            &enc_userid,
            &enc_userpw,
        ))
    }

    /// Encrypts one application request. Blank requests never leave the
    /// process.
    pub fn request(&mut self, text: &str) -> Result<Envelope> {
        self.require_state(ConnectionState::Authenticated, "send a request")?;
        if text.trim().is_empty() {
            return Err(ProtocolError::Validation(
                "request must not be empty".to_string(),
            ));
        }
        let login_id = self.session.login_id.clone().ok_or_else(|| {
            ProtocolError::InvalidState("no login id for this session".to_string())
        })?;
        let key = self.require_master_key()?;
        let payload = crypto::encrypt_with_key(text.as_bytes(), &key)?;
        Ok(Envelope::request(
            &self.version,
            &self.address,
            &login_id,
            &payload,
        ))
    }

    fn require_master_key(&self) -> Result<[u8; KEY_SIZE]> {
        self.session
            .master_key()
            .copied()
            .ok_or_else(|| ProtocolError::InvalidState("no master key installed".to_string()))
    }

    fn expect_state(&self, expected: ConnectionState, protocol: Protocol) -> Result<()> {
        if self.session.state != expected {
            return Err(ProtocolError::UnexpectedMessage {
                state: self.session.state.to_string(),
                protocol: protocol.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn require_state(&self, expected: ConnectionState, action: &str) -> Result<()> {
        if self.session.state != expected {
            return Err(ProtocolError::InvalidState(format!(
                "cannot {} in state {}",
                action, self.session.state
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{Body, Head};
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
    use std::sync::OnceLock;

    fn test_keys() -> &'static (String, String) {
        static KEYS: OnceLock<(String, String)> = OnceLock::new();
        KEYS.get_or_init(|| {
            let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048)
                .expect("keygen");
            let public_pem = private
                .to_public_key()
                .to_public_key_pem(LineEnding::LF)
                .expect("public pem");
            let private_pem = private
                .to_pkcs8_pem(LineEnding::LF)
                .expect("private pem")
                .to_string();
            (public_pem, private_pem)
        })
    }

    fn server_envelope(content_type: ContentType, protocol: Protocol) -> Envelope {
        Envelope {
            head: Head {
                content_type,
                protocol,
                platform: Some("server".to_string()),
                version: Some("0.1.0".to_string()),
                address: None,
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

    fn server_hello(server_token: &str) -> Envelope {
        let (public_pem, _) = test_keys();
        let mut env = server_envelope(ContentType::Handshake, Protocol::ServerHello);
        env.head.random_token = Some(server_token.to_string());
        env.head.random_token_length = Some(server_token.len());
        env.body.public_key = Some(public_pem.clone());
        env
    }

    fn change_cipher_spec(session_id: &str) -> Envelope {
        let mut env = server_envelope(ContentType::Handshake, Protocol::ChangeCipherSpec);
        env.head.session_id = Some(session_id.to_string());
        env.head.session_id_length = Some(session_id.len());
        env
    }

    fn welcome(login_id: &str) -> Envelope {
        let mut env = server_envelope(ContentType::LoginReport, Protocol::Welcome);
        env.head.login_id = Some(login_id.to_string());
        env.head.login_id_length = Some(login_id.len());
        env
    }

    fn server_error(message: &str) -> Envelope {
        let mut env = server_envelope(ContentType::ReturnError, Protocol::Error);
        env.body.server_error = Some(message.to_string());
        env
    }

    fn engine() -> HandshakeEngine {
        HandshakeEngine::new("0.1.0", "127.0.0.1")
    }

    /// Drives an engine to the `Established` state, returning the master key.
    fn establish(engine: &mut HandshakeEngine) -> [u8; KEY_SIZE] {
        engine.start().unwrap();
        let action = engine.handle(server_hello("srv-token")).unwrap();
        assert!(matches!(action, EngineAction::Send(_)));
        let action = engine.handle(change_cipher_spec("session-9")).unwrap();
        assert!(matches!(
            action,
            EngineAction::AwaitCredentials {
                mode: CredentialMode::Choose
            }
        ));
        engine.auth_key().unwrap().try_into().unwrap()
    }

    fn login(engine: &mut HandshakeEngine) -> Credential {
        let env = engine.credentials(AuthKind::Login, "alice", "s3cret!pw").unwrap();
        assert_eq!(env.head.protocol, Protocol::Login);
        match engine.handle(welcome("alice")).unwrap() {
            EngineAction::LoggedIn { credential } => credential,
            other => panic!("expected LoggedIn, got {:?}", other),
        }
    }

    #[test]
    fn test_client_hello_carries_token() {
        let mut engine = engine();
        let env = engine.start().unwrap();
        assert_eq!(env.head.protocol, Protocol::ClientHello);
        assert_eq!(env.head.content_type, ContentType::Handshake);
        let token = env.head.random_token.as_deref().unwrap();
        assert_eq!(token.len(), 32);
        assert_eq!(env.head.random_token_length, Some(32));
        assert_eq!(engine.state(), ConnectionState::HelloSent);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut engine = engine();
        engine.start().unwrap();
        assert!(matches!(
            engine.start().unwrap_err(),
            ProtocolError::InvalidState(_)
        ));
    }

    #[test]
    fn test_key_exchange_wraps_derived_secret() {
        let (_, private_pem) = test_keys();
        let mut engine = engine();
        let hello = engine.start().unwrap();
        let client_token = hello.head.random_token.unwrap();

        let action = engine.handle(server_hello("srv-token")).unwrap();
        let env = match action {
            EngineAction::Send(env) => env,
            other => panic!("expected Send, got {:?}", other),
        };
        assert_eq!(env.head.protocol, Protocol::ClientKeyExchange);
        assert_eq!(engine.state(), ConnectionState::KeyExchanged);

        // The server's view of the secret must match the installed key.
        let wrapped = base85::decode(env.body.pre_master_key.as_deref().unwrap()).unwrap();
        let unwrapped = crypto::unwrap_key(private_pem, &wrapped).unwrap();
        assert_eq!(unwrapped.as_slice(), engine.auth_key().unwrap());

        let expected = HkdfMasterKey
            .derive(b"srv-token", client_token.as_bytes())
            .unwrap();
        assert_eq!(unwrapped, expected);
    }

    #[test]
    fn test_missing_public_key_is_not_fatal_state_change() {
        let mut engine = engine();
        engine.start().unwrap();
        let mut env = server_hello("srv-token");
        env.body.public_key = None;
        let err = engine.handle(env).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
        assert_eq!(engine.state(), ConnectionState::HelloSent);
    }

    #[test]
    fn test_full_login_flow() {
        let mut engine = engine();
        let key = establish(&mut engine);

        let env = engine.credentials(AuthKind::Login, "alice", "s3cret!pw").unwrap();
        assert_eq!(env.head.session_id.as_deref(), Some("session-9"));
        let enc_userid = base85::decode(env.body.userid.as_deref().unwrap()).unwrap();
        assert_eq!(
            crypto::decrypt_with_key(&enc_userid, &key).unwrap(),
            b"alice"
        );
        let enc_userpw = base85::decode(env.body.userpw.as_deref().unwrap()).unwrap();
        assert_eq!(
            crypto::decrypt_with_key(&enc_userpw, &key).unwrap(),
            b"s3cret!pw"
        );

        let credential = match engine.handle(welcome("alice")).unwrap() {
            EngineAction::LoggedIn { credential } => credential,
            other => panic!("expected LoggedIn, got {:?}", other),
        };
        assert_eq!(credential.login_id, "alice");
        assert_eq!(credential.master_key.as_slice(), engine.auth_key().unwrap());
        assert_eq!(engine.state(), ConnectionState::Authenticated);
    }

    #[test]
    fn test_sign_up_complete_reenters_login() {
        let mut engine = engine();
        establish(&mut engine);

        let env = engine.credentials(AuthKind::SignUp, "bob", "pa55word!").unwrap();
        assert_eq!(env.head.protocol, Protocol::SignUp);

        let env = server_envelope(ContentType::SignUpReport, Protocol::SignUpComplete);
        let action = engine.handle(env).unwrap();
        assert!(matches!(
            action,
            EngineAction::AwaitCredentials {
                mode: CredentialMode::Login
            }
        ));
        assert_eq!(engine.state(), ConnectionState::Established);
    }

    #[test]
    fn test_request_response_roundtrip() {
        let mut engine = engine();
        let key = establish(&mut engine);
        login(&mut engine);

        let env = engine.request("ping").unwrap();
        assert_eq!(env.head.protocol, Protocol::Request);
        assert_eq!(env.head.login_id.as_deref(), Some("alice"));
        let payload = base85::decode(env.body.master_secret.as_deref().unwrap()).unwrap();
        assert_eq!(crypto::decrypt_with_key(&payload, &key).unwrap(), b"ping");

        let mut reply = server_envelope(ContentType::ServerMasterSecret, Protocol::Response);
        let enc = crypto::encrypt_with_key(b"pong", &key).unwrap();
        reply.body.master_secret = Some(base85::encode(&enc));
        match engine.handle(reply).unwrap() {
            EngineAction::Response(text) => assert_eq!(text, "pong"),
            other => panic!("expected Response, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_request_rejected_locally() {
        let mut engine = engine();
        establish(&mut engine);
        login(&mut engine);

        for blank in ["", "   ", "\n", "\t  "] {
            let err = engine.request(blank).unwrap_err();
            assert!(matches!(err, ProtocolError::Validation(_)), "{:?}", blank);
        }
    }

    #[test]
    fn test_unknown_user_routes_to_sign_up() {
        let mut engine = engine();
        establish(&mut engine);
        engine.credentials(AuthKind::Login, "ghost", "n0body!pw").unwrap();

        let action = engine
            .handle(server_error("user not found: ghost"))
            .unwrap();
        assert!(matches!(
            action,
            EngineAction::AwaitCredentials {
                mode: CredentialMode::SignUp
            }
        ));
        assert_eq!(engine.state(), ConnectionState::Established);
    }

    #[test]
    fn test_duplicate_user_routes_to_sign_up() {
        let mut engine = engine();
        establish(&mut engine);

        let action = engine
            .handle(server_error("duplicate user: alice"))
            .unwrap();
        assert!(matches!(
            action,
            EngineAction::AwaitCredentials {
                mode: CredentialMode::SignUp
            }
        ));
    }

    #[test]
    fn test_generic_error_restarts_session() {
        let mut engine = engine();
        establish(&mut engine);

        let action = engine.handle(server_error("internal failure")).unwrap();
        match action {
            EngineAction::Restart { message } => assert!(message.contains("internal failure")),
            other => panic!("expected Restart, got {:?}", other),
        }
        assert_eq!(engine.state(), ConnectionState::Error);
        assert!(engine.auth_key().is_none(), "secrets must be wiped");
        // The next step recreates the session from scratch.
        engine.start().unwrap();
        assert_eq!(engine.state(), ConnectionState::HelloSent);
    }

    #[test]
    fn test_auth_error_outside_established_restarts() {
        let mut engine = engine();
        engine.start().unwrap();
        let action = engine
            .handle(server_error("user not found: early"))
            .unwrap();
        assert!(matches!(action, EngineAction::Restart { .. }));
        assert_eq!(engine.state(), ConnectionState::Error);
    }

    #[test]
    fn test_out_of_order_messages_rejected() {
        let mut engine = engine();
        let err = engine.handle(change_cipher_spec("sid")).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessage { .. }));

        engine.start().unwrap();
        let err = engine.handle(welcome("alice")).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessage { .. }));

        let _ = engine.handle(server_hello("tok")).unwrap();
        let err = engine.handle(server_hello("tok")).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedMessage { .. }));
    }

    #[test]
    fn test_resume_skips_handshake() {
        let mut engine = engine();
        let key = [0x42u8; KEY_SIZE];
        engine
            .resume(Credential {
                login_id: "alice".to_string(),
                master_key: key,
            })
            .unwrap();
        assert_eq!(engine.state(), ConnectionState::Authenticated);
        assert_eq!(engine.auth_key(), Some(key.as_slice()));
        assert_eq!(engine.fallback_key(), Some(key.as_slice()));

        let env = engine.request("hello again").unwrap();
        let payload = base85::decode(env.body.master_secret.as_deref().unwrap()).unwrap();
        assert_eq!(
            crypto::decrypt_with_key(&payload, &key).unwrap(),
            b"hello again"
        );
    }

    #[test]
    fn test_resumed_session_rejection_restarts() {
        let mut engine = engine();
        engine
            .resume(Credential {
                login_id: "alice".to_string(),
                master_key: [0x42u8; KEY_SIZE],
            })
            .unwrap();

        let action = engine.handle(server_error("unknown session")).unwrap();
        assert!(matches!(action, EngineAction::Restart { .. }));
        assert_eq!(engine.state(), ConnectionState::Error);
        engine.start().unwrap();
    }

    #[test]
    fn test_credentials_before_establishment_rejected() {
        let mut engine = engine();
        let err = engine.credentials(AuthKind::Login, "a", "b").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidState(_)));
    }
}
