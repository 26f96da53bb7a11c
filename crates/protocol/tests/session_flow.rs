//! End-to-end protocol flow against a scripted in-memory server.
//!
//! Exercises the full stack below the socket: engine -> envelope codec ->
//! frame codec on the client side, with the server half played by hand using
//! the key-unwrap primitive.

use std::io::Cursor;

use protocol::crypto::{self, KEY_SIZE};
use protocol::envelope::{Body, ContentType, Envelope, Head, Protocol};
use protocol::framing;
use protocol::handshake::{AuthKind, CredentialMode, EngineAction, HandshakeEngine};
use protocol::session::Credential;

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

struct ScriptedServer {
    public_pem: String,
    private_pem: String,
    master_key: Option<[u8; KEY_SIZE]>,
}

impl ScriptedServer {
    fn new() -> Self {
        let private = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).expect("keygen");
        let public_pem = private
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("public pem");
        let private_pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .expect("private pem")
            .to_string();
        ScriptedServer {
            public_pem,
            private_pem,
            master_key: None,
        }
    }

    fn envelope(&self, content_type: ContentType, protocol: Protocol) -> Envelope {
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

    /// Decodes one client frame, verifying the HMAC once a key exists.
    fn receive(&self, frame: &[u8]) -> Envelope {
        let payload = framing::read_frame(&mut Cursor::new(frame.to_vec())).expect("frame");
        let key = self.master_key.as_ref().map(|k| k.as_slice());
        Envelope::decode(&payload, key, None).expect("decode")
    }

    /// Encodes one server envelope, signing it once a key exists.
    fn send(&self, envelope: &Envelope) -> Vec<u8> {
        let key = self.master_key.as_ref().map(|k| k.as_slice());
        let payload = envelope.encode(key).expect("encode");
        framing::write_frame(&payload).expect("frame")
    }
}

/// Encodes and frames a client envelope the way the transport layer would.
fn client_send(engine: &HandshakeEngine, envelope: &Envelope) -> Vec<u8> {
    let payload = envelope.encode(engine.auth_key()).expect("encode");
    framing::write_frame(&payload).expect("frame")
}

/// Reads and decodes one server frame on the client side.
fn client_receive(engine: &HandshakeEngine, frame: &[u8]) -> Envelope {
    let payload = framing::read_frame(&mut Cursor::new(frame.to_vec())).expect("frame");
    Envelope::decode(&payload, engine.auth_key(), engine.fallback_key()).expect("decode")
}

#[test]
fn full_session_over_the_wire() {
    let mut server = ScriptedServer::new();
    let mut engine = HandshakeEngine::new("0.1.0", "127.0.0.1");

    // client_hello
    let hello = engine.start().unwrap();
    let received = server.receive(&client_send(&engine, &hello));
    assert_eq!(received.head.protocol, Protocol::ClientHello);
    let client_token = received.head.random_token.unwrap();

    // server_hello
    let mut reply = server.envelope(ContentType::Handshake, Protocol::ServerHello);
    reply.head.random_token = Some("server-token".to_string());
    reply.head.random_token_length = Some("server-token".len());
    reply.body.public_key = Some(server.public_pem.clone());
    let frame = server.send(&reply);

    // client_key_exchange
    let action = engine.handle(client_receive(&engine, &frame)).unwrap();
    let key_exchange = match action {
        EngineAction::Send(env) => env,
        other => panic!("expected Send, got {:?}", other),
    };
    // The client already holds the key, so this frame is signed; the server
    // has not unwrapped it yet and must read it unauthenticated.
    let payload = framing::read_frame(&mut Cursor::new(client_send(&engine, &key_exchange)))
        .unwrap();
    let text = std::str::from_utf8(&payload).unwrap();
    let (body_b85, _tag) = text.rsplit_once('.').expect("signed frame");
    let received: Envelope =
        serde_json::from_slice(&base85::decode(body_b85).unwrap()).unwrap();
    assert_eq!(received.head.protocol, Protocol::ClientKeyExchange);

    let wrapped = base85::decode(received.body.pre_master_key.as_deref().unwrap()).unwrap();
    let secret = crypto::unwrap_key(&server.private_pem, &wrapped).unwrap();
    server.master_key = Some(secret.clone().try_into().unwrap());
    assert_eq!(secret.as_slice(), engine.auth_key().unwrap());
    // Independent derivation from the exchanged tokens agrees.
    use protocol::crypto::KeyDerivation;
    let derived = crypto::HkdfMasterKey
        .derive(b"server-token", client_token.as_bytes())
        .unwrap();
    assert_eq!(secret.as_slice(), derived.as_slice());

    // change_cipher_spec (now authenticated)
    let mut reply = server.envelope(ContentType::Handshake, Protocol::ChangeCipherSpec);
    reply.head.session_id = Some("sess-42".to_string());
    reply.head.session_id_length = Some(7);
    let frame = server.send(&reply);
    let action = engine.handle(client_receive(&engine, &frame)).unwrap();
    assert!(matches!(
        action,
        EngineAction::AwaitCredentials {
            mode: CredentialMode::Choose
        }
    ));

    // login, with the server verifying the HMAC and decrypting the fields
    let login = engine
        .credentials(AuthKind::Login, "alice", "s3cret!pw")
        .unwrap();
    let received = server.receive(&client_send(&engine, &login));
    assert_eq!(received.head.protocol, Protocol::Login);
    let key = server.master_key.unwrap();
    let userid = base85::decode(received.body.userid.as_deref().unwrap()).unwrap();
    assert_eq!(crypto::decrypt_with_key(&userid, &key).unwrap(), b"alice");

    // welcome
    let mut reply = server.envelope(ContentType::LoginReport, Protocol::Welcome);
    reply.head.login_id = Some("alice".to_string());
    reply.head.login_id_length = Some(5);
    let frame = server.send(&reply);
    let credential = match engine.handle(client_receive(&engine, &frame)).unwrap() {
        EngineAction::LoggedIn { credential } => credential,
        other => panic!("expected LoggedIn, got {:?}", other),
    };
    assert_eq!(credential.login_id, "alice");

    // request / response
    let request = engine.request("what time is it").unwrap();
    let received = server.receive(&client_send(&engine, &request));
    let payload = base85::decode(received.body.master_secret.as_deref().unwrap()).unwrap();
    assert_eq!(
        crypto::decrypt_with_key(&payload, &key).unwrap(),
        b"what time is it"
    );

    let mut reply = server.envelope(ContentType::ServerMasterSecret, Protocol::Response);
    let enc = crypto::encrypt_with_key(b"half past nine", &key).unwrap();
    reply.body.master_secret = Some(base85::encode(&enc));
    let frame = server.send(&reply);
    match engine.handle(client_receive(&engine, &frame)).unwrap() {
        EngineAction::Response(text) => assert_eq!(text, "half past nine"),
        other => panic!("expected Response, got {:?}", other),
    }
}

#[test]
fn resumed_session_over_the_wire() {
    let key = [0x3Cu8; KEY_SIZE];
    let mut server = ScriptedServer::new();
    server.master_key = Some(key);

    let mut engine = HandshakeEngine::new("0.1.0", "127.0.0.1");
    engine
        .resume(Credential {
            login_id: "alice".to_string(),
            master_key: key,
        })
        .unwrap();

    let request = engine.request("resumed hello").unwrap();
    let received = server.receive(&client_send(&engine, &request));
    assert_eq!(received.head.login_id.as_deref(), Some("alice"));
    let payload = base85::decode(received.body.master_secret.as_deref().unwrap()).unwrap();
    assert_eq!(
        crypto::decrypt_with_key(&payload, &key).unwrap(),
        b"resumed hello"
    );
}

#[test]
fn tampered_wire_frame_fails_authentication() {
    let key = [0x77u8; KEY_SIZE];
    let mut engine = HandshakeEngine::new("0.1.0", "127.0.0.1");
    engine
        .resume(Credential {
            login_id: "alice".to_string(),
            master_key: key,
        })
        .unwrap();

    let request = engine.request("sensitive").unwrap();
    let mut frame = client_send(&engine, &request);
    let idx = frame.len() / 2;
    frame[idx] ^= 0x01;

    let payload = framing::read_frame(&mut Cursor::new(frame)).unwrap();
    let err = Envelope::decode(&payload, Some(&key), None).unwrap_err();
    assert!(matches!(err, protocol::ProtocolError::Authentication(_)));
}
