//! Cryptographic operations for the Vaultwire session protocol.
//!
//! This module provides the primitives the handshake and request paths are
//! built on:
//!
//! - AES-256-GCM authenticated encryption with a 16-byte nonce, producing
//!   `nonce(16) ‖ tag(16) ‖ ciphertext` blobs
//! - RSA-OAEP key wrapping for the pre-master secret
//! - HMAC-SHA256 keyed hashing for envelope authentication
//! - a pluggable master-key derivation function (HKDF-SHA256 by default)
//!
//! Plaintext is passed through a reversible base85 transform before any
//! cipher sees it, so every encrypted payload is text-safe after decryption
//! on either side of the wire.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use crate::error::{ProtocolError, Result};

/// Symmetric key length in bytes (AES-256).
pub const KEY_SIZE: usize = 32;

/// AEAD nonce length in bytes.
pub const NONCE_SIZE: usize = 16;

/// AEAD authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Raw length of a random handshake token in bytes.
pub const TOKEN_SIZE: usize = 16;

/// AES-256-GCM parameterized with the protocol's 16-byte nonce.
type Cipher = AesGcm<Aes256, U16>;

type HmacSha256 = Hmac<Sha256>;

/// Pluggable derivation of the 32-byte master key from the two handshake
/// tokens. Implementations must be deterministic given both tokens.
pub trait KeyDerivation {
    /// Derives the symmetric master key from the server and client tokens.
    fn derive(&self, server_token: &[u8], client_token: &[u8]) -> Result<[u8; KEY_SIZE]>;
}

/// Default key derivation: HKDF-SHA256 with the server token as salt and the
/// client token as input key material.
#[derive(Debug, Clone, Copy, Default)]
pub struct HkdfMasterKey;

impl KeyDerivation for HkdfMasterKey {
    fn derive(&self, server_token: &[u8], client_token: &[u8]) -> Result<[u8; KEY_SIZE]> {
        let hk = Hkdf::<Sha256>::new(Some(server_token), client_token);
        let mut okm = [0u8; KEY_SIZE];
        hk.expand(b"vaultwire master key", &mut okm)
            .map_err(|e| ProtocolError::Encryption(format!("hkdf expand failed: {}", e)))?;
        Ok(okm)
    }
}

/// The 85-character alphabet (RFC 1924) produced by the base85 encoding.
const BASE85_ALPHABET: &[u8; 85] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz!#$%&()*+-;<=>?@^_`{|}~";

/// Decodes base85 text that arrived from outside the process.
///
/// The underlying decoder assumes well-formed input and aborts on bytes
/// outside its alphabet, so anything wire-derived or user-editable must pass
/// through this guard first. Returns `None` for out-of-alphabet bytes or an
/// impossible encoded length.
pub fn base85_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 5 == 1 {
        return None;
    }
    if !text.bytes().all(|b| BASE85_ALPHABET.contains(&b)) {
        return None;
    }
    base85::decode(text)
}

/// Generates a fresh random handshake token, hex-encoded for the wire.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_SIZE];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Encrypts `plaintext` under `key` with AES-256-GCM.
///
/// The plaintext is base85-encoded first, then sealed with a fresh random
/// nonce. The result is laid out as `nonce(16) ‖ tag(16) ‖ ciphertext`.
pub fn encrypt_with_key(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = Cipher::new_from_slice(key).map_err(|_| ProtocolError::InvalidKeyLength {
        expected: KEY_SIZE,
        got: key.len(),
    })?;

    let encoded = base85::encode(plaintext);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::<U16>::from_slice(&nonce_bytes);

    // RustCrypto appends the tag to the ciphertext; the wire format wants
    // nonce, then tag, then ciphertext.
    let sealed = cipher
        .encrypt(nonce, encoded.as_bytes())
        .map_err(|_| ProtocolError::Encryption("aead seal failed".to_string()))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    let mut out = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Decrypts a `nonce ‖ tag ‖ ciphertext` blob produced by
/// [`encrypt_with_key`], verifying the tag and reversing the base85
/// transform.
pub fn decrypt_with_key(blob: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let cipher = Cipher::new_from_slice(key).map_err(|_| ProtocolError::InvalidKeyLength {
        expected: KEY_SIZE,
        got: key.len(),
    })?;

    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(ProtocolError::Authentication(format!(
            "sealed blob too short: {} bytes",
            blob.len()
        )));
    }
    let (nonce_bytes, rest) = blob.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    let nonce = Nonce::<U16>::from_slice(nonce_bytes);
    let plain = cipher
        .decrypt(nonce, sealed.as_slice())
        .map_err(|_| ProtocolError::Authentication("aead tag mismatch".to_string()))?;

    let text = std::str::from_utf8(&plain)
        .map_err(|_| ProtocolError::Decryption("decrypted payload is not text".to_string()))?;
    base85_decode(text)
        .ok_or_else(|| ProtocolError::Decryption("decrypted payload is not base85".to_string()))
}

/// Wraps `data` under the peer's RSA public key with OAEP/SHA-256.
///
/// Used once per handshake to transmit the pre-master secret so only the
/// private-key holder can recover it. Accepts PKCS#8 (`BEGIN PUBLIC KEY`)
/// or PKCS#1 (`BEGIN RSA PUBLIC KEY`) PEM.
pub fn wrap_key(public_key_pem: &str, data: &[u8]) -> Result<Vec<u8>> {
    let public_key = match RsaPublicKey::from_public_key_pem(public_key_pem) {
        Ok(key) => key,
        Err(_) => RsaPublicKey::from_pkcs1_pem(public_key_pem)
            .map_err(|e| ProtocolError::Encryption(format!("invalid public key: {}", e)))?,
    };

    let encoded = base85::encode(data);
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), encoded.as_bytes())
        .map_err(|e| ProtocolError::Encryption(format!("rsa wrap failed: {}", e)))
}

/// Inverse of [`wrap_key`]. The client role never calls this against the
/// server; it exists for symmetry and lets tests play the server side.
pub fn unwrap_key(private_key_pem: &str, blob: &[u8]) -> Result<Vec<u8>> {
    let private_key = match RsaPrivateKey::from_pkcs8_pem(private_key_pem) {
        Ok(key) => key,
        Err(_) => RsaPrivateKey::from_pkcs1_pem(private_key_pem)
            .map_err(|e| ProtocolError::Decryption(format!("invalid private key: {}", e)))?,
    };

    let plain = private_key
        .decrypt(Oaep::new::<Sha256>(), blob)
        .map_err(|e| ProtocolError::Decryption(format!("rsa unwrap failed: {}", e)))?;

    let text = std::str::from_utf8(&plain)
        .map_err(|_| ProtocolError::Decryption("unwrapped payload is not text".to_string()))?;
    base85_decode(text)
        .ok_or_else(|| ProtocolError::Decryption("unwrapped payload is not base85".to_string()))
}

/// Computes HMAC-SHA256 of `data` under `key`.
pub fn keyed_hash(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Verifies an HMAC-SHA256 digest in constant time.
pub fn verify_keyed_hash(key: &[u8], data: &[u8], digest: &[u8]) -> bool {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.verify_slice(digest).is_ok()
}
