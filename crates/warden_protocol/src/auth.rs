//! Authentication challenge primitives and the connection handshake.
//!
//! Two challenge mechanisms exist. Key-pair authentication has the remote
//! prove possession of the Ed25519 signing key matching a stored verifying
//! key by signing a random nonce. Password authentication has the remote
//! return a salted SHA-256 digest of a shared password; the salt is fresh
//! per handshake.
//!
//! The core resolves a claimed identity string to [`ServerAuth`] material
//! through a pure lookup; when the lookup yields nothing, authentication is
//! impossible and the connection is rejected without further detail.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ProtocolError;
use crate::transport::Transport;

const SCHEME_KEY_PAIR: &str = "key-pair";
const SCHEME_PASSWORD: &str = "password";

/// Server-side challenge material for one claimed identity.
#[derive(Clone)]
pub enum ServerAuth {
    /// Verify an Ed25519 signature over a random nonce.
    KeyPair { key: VerifyingKey },
    /// Verify a salted digest of a shared password.
    Password { password: String },
}

impl ServerAuth {
    pub fn key_pair(key: VerifyingKey) -> Self {
        Self::KeyPair { key }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }
}

/// Client-side authentication material.
#[derive(Clone)]
pub enum ClientAuth {
    /// Sign the server's nonce with the identity's private key.
    KeyPair { key: SigningKey },
    /// Answer the salted-password challenge.
    Password { password: String },
}

impl ClientAuth {
    pub fn key_pair(key: SigningKey) -> Self {
        Self::KeyPair { key }
    }

    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct HelloFrame {
    id: String,
}

#[derive(Serialize, Deserialize)]
struct ChallengeFrame {
    scheme: String,
    challenge: String,
}

#[derive(Serialize, Deserialize)]
struct ResponseFrame {
    response: String,
}

#[derive(Serialize, Deserialize)]
struct StatusFrame {
    status: String,
}

/// Runs the accepting side of the handshake.
///
/// Reads the claimed identity, resolves challenge material through
/// `resolver`, issues the challenge and verifies the response. Returns the
/// authenticated identity string on success. Every failure path answers the
/// remote with a bare rejection; nothing about the reason is revealed.
pub async fn server_handshake<F>(
    transport: &Transport,
    resolver: F,
) -> Result<String, ProtocolError>
where
    F: FnOnce(&str) -> Option<ServerAuth>,
{
    let hello: HelloFrame = recv_json(transport).await?;
    let Some(auth) = resolver(&hello.id) else {
        reject(transport);
        return Err(ProtocolError::AuthRejected);
    };

    let mut challenge = vec![0u8; 32];
    OsRng.fill_bytes(&mut challenge);
    let scheme = match &auth {
        ServerAuth::KeyPair { .. } => SCHEME_KEY_PAIR,
        ServerAuth::Password { .. } => SCHEME_PASSWORD,
    };
    send_json(
        transport,
        &ChallengeFrame {
            scheme: scheme.to_string(),
            challenge: encode(&challenge),
        },
    )?;

    let response: ResponseFrame = recv_json(transport).await?;
    let Ok(response) = decode(&response.response) else {
        reject(transport);
        return Err(ProtocolError::AuthRejected);
    };

    let accepted = match auth {
        ServerAuth::KeyPair { key } => Signature::from_slice(&response)
            .map(|signature| key.verify(&challenge, &signature).is_ok())
            .unwrap_or(false),
        ServerAuth::Password { password } => {
            constant_time_eq(&response, &password_digest(&challenge, &password))
        }
    };

    if !accepted {
        reject(transport);
        return Err(ProtocolError::AuthRejected);
    }
    send_json(
        transport,
        &StatusFrame {
            status: "ok".to_string(),
        },
    )?;
    Ok(hello.id)
}

/// Runs the dialing side of the handshake.
///
/// Sends the claimed identity, answers the server's challenge with the given
/// material and waits for the verdict.
pub async fn client_handshake(
    transport: &Transport,
    id: &str,
    auth: &ClientAuth,
) -> Result<(), ProtocolError> {
    send_json(transport, &HelloFrame { id: id.to_string() })?;

    let frame = transport
        .recv()
        .await
        .ok_or(ProtocolError::ConnectionClosed)?;
    let challenge: ChallengeFrame = match serde_json::from_slice(&frame) {
        Ok(challenge) => challenge,
        // The server rejects unknown identities before issuing a challenge.
        Err(_) => {
            if serde_json::from_slice::<StatusFrame>(&frame).is_ok() {
                return Err(ProtocolError::AuthRejected);
            }
            return Err(ProtocolError::Violation(
                "malformed challenge frame".to_string(),
            ));
        }
    };
    let nonce = decode(&challenge.challenge)
        .map_err(|_| ProtocolError::Violation("malformed challenge".to_string()))?;

    let response = match (auth, challenge.scheme.as_str()) {
        (ClientAuth::KeyPair { key }, SCHEME_KEY_PAIR) => key.sign(&nonce).to_bytes().to_vec(),
        (ClientAuth::Password { password }, SCHEME_PASSWORD) => {
            password_digest(&nonce, password).to_vec()
        }
        _ => return Err(ProtocolError::AuthRejected),
    };
    send_json(
        transport,
        &ResponseFrame {
            response: encode(&response),
        },
    )?;

    let status: StatusFrame = recv_json(transport).await?;
    if status.status == "ok" {
        Ok(())
    } else {
        Err(ProtocolError::AuthRejected)
    }
}

/// Errors decoding key material from its text form.
#[derive(Debug, thiserror::Error)]
pub enum KeyDecodeError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("wrong key length: expected 32 bytes, got {0}")]
    Length(usize),
    #[error("invalid key material: {0}")]
    Key(#[from] ed25519_dalek::SignatureError),
}

/// Encodes a verifying (public) key as base64 for configs and snapshots.
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    encode(key.as_bytes())
}

/// Decodes a verifying (public) key from its base64 text form.
pub fn decode_verifying_key(text: &str) -> Result<VerifyingKey, KeyDecodeError> {
    let bytes = decode(text)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|rest: Vec<u8>| KeyDecodeError::Length(rest.len()))?;
    Ok(VerifyingKey::from_bytes(&bytes)?)
}

/// Encodes a signing (private) key as base64. The core uses this exactly
/// once, to hand a freshly created key back to the caller.
pub fn encode_signing_key(key: &SigningKey) -> String {
    encode(&key.to_bytes())
}

/// Decodes a signing (private) key from its base64 text form.
pub fn decode_signing_key(text: &str) -> Result<SigningKey, KeyDecodeError> {
    let bytes = decode(text)?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|rest: Vec<u8>| KeyDecodeError::Length(rest.len()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

fn password_digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn reject(transport: &Transport) {
    let _ = send_json(
        transport,
        &StatusFrame {
            status: "rejected".to_string(),
        },
    );
    transport.close();
}

fn encode(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.encode(bytes)
}

fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    STANDARD.decode(text)
}

async fn recv_json<T: DeserializeOwned>(transport: &Transport) -> Result<T, ProtocolError> {
    let frame = transport
        .recv()
        .await
        .ok_or(ProtocolError::ConnectionClosed)?;
    serde_json::from_slice(&frame)
        .map_err(|e| ProtocolError::Violation(format!("malformed handshake frame: {e}")))
}

fn send_json<T: Serialize>(transport: &Transport, value: &T) -> Result<(), ProtocolError> {
    transport.send(serde_json::to_vec(value)?)
}
