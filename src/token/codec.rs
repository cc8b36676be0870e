//! Builds and recovers signed, encrypted session tokens.
//!
//! A token is an RS256-signed compact JWT sealed inside an encrypted
//! envelope: a random 32-byte content key encrypts the signed token with
//! ChaCha20-Poly1305 and is itself wrapped with RSA-OAEP, so claims are both
//! integrity-protected and confidential. Serialized form:
//! `BD1.<wrapped_key>.<nonce>.<ciphertext>` (base64url, unpadded).

use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::Oaep;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use tracing::error;

use super::claims::{AccessClaims, OneTimeClaims, RefreshClaims};
use super::keys::KeyMaterial;
use crate::error::ApiError;

const TOKEN_PREFIX: &str = "BD1";
const CONTENT_KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// The three claim shapes a token can carry. The expected kind is chosen by
/// the caller, so decoding returns a statically known shape instead of a
/// dynamic one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    OneTime,
}

impl TokenKind {
    /// Label used in the normalized "Invalid <kind>" authentication error.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Access => "access token",
            Self::Refresh => "refresh token",
            Self::OneTime => "OTT",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn rs256() -> Self {
        Self {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Signs, encrypts, decrypts and verifies tokens with injected key material.
pub struct TokenCodec {
    keys: KeyMaterial,
    signing_key: SigningKey<Sha256>,
    verifying_key: VerifyingKey<Sha256>,
}

impl TokenCodec {
    #[must_use]
    pub fn new(keys: KeyMaterial) -> Self {
        let signing_key = SigningKey::<Sha256>::new(keys.private.clone());
        let verifying_key = VerifyingKey::<Sha256>::new(keys.public.clone());
        Self {
            keys,
            signing_key,
            verifying_key,
        }
    }

    pub fn issue_access(&self, claims: &AccessClaims) -> Result<String, ApiError> {
        self.issue(claims)
    }

    pub fn issue_refresh(&self, claims: &RefreshClaims) -> Result<String, ApiError> {
        self.issue(claims)
    }

    pub fn issue_one_time(&self, claims: &OneTimeClaims) -> Result<String, ApiError> {
        self.issue(claims)
    }

    pub fn decode_access(&self, token: &str) -> Result<AccessClaims, ApiError> {
        self.decode(token, TokenKind::Access)
    }

    pub fn decode_refresh(&self, token: &str) -> Result<RefreshClaims, ApiError> {
        self.decode(token, TokenKind::Refresh)
    }

    pub fn decode_one_time(&self, token: &str) -> Result<OneTimeClaims, ApiError> {
        self.decode(token, TokenKind::OneTime)
    }

    /// Serialize, sign and seal claims into a compact token string.
    ///
    /// Does not fail for valid claims; failures here are programmer or
    /// entropy errors and surface as `Unexpected`.
    fn issue<T: Serialize>(&self, claims: &T) -> Result<String, ApiError> {
        let signed = self.sign(claims)?;

        let mut content_key = [0u8; CONTENT_KEY_LEN];
        OsRng.fill_bytes(&mut content_key);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let wrapped_key = self
            .keys
            .public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &content_key)
            .map_err(|err| {
                error!("Error while wrapping token content key: {err}");
                ApiError::unexpected("Unexpected server-side error")
            })?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&content_key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), signed.as_bytes())
            .map_err(|err| {
                error!("Error while encrypting signed token: {err}");
                ApiError::unexpected("Unexpected server-side error")
            })?;

        Ok(format!(
            "{TOKEN_PREFIX}.{}.{}.{}",
            Base64UrlUnpadded::encode_string(&wrapped_key),
            Base64UrlUnpadded::encode_string(&nonce_bytes),
            Base64UrlUnpadded::encode_string(&ciphertext),
        ))
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, ApiError> {
        let header = serde_json::to_vec(&TokenHeader::rs256()).map_err(|err| {
            error!("Error while encoding token header: {err}");
            ApiError::unexpected("Unexpected server-side error")
        })?;
        let payload = serde_json::to_vec(claims).map_err(|err| {
            error!("Error while encoding token claims: {err}");
            ApiError::unexpected("Unexpected server-side error")
        })?;
        let signing_input = format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(&header),
            Base64UrlUnpadded::encode_string(&payload),
        );
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        Ok(format!(
            "{signing_input}.{}",
            Base64UrlUnpadded::encode_string(&signature.to_vec())
        ))
    }

    /// Recover claims of the expected kind from a token string.
    ///
    /// Performs no semantic validation (expiry, type, invariants); callers
    /// must validate the returned claims. Every decrypt, signature or shape
    /// failure collapses into the same authentication error so the codec is
    /// not an oracle.
    fn decode<T: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<T, ApiError> {
        self.try_decode(token).ok_or_else(|| {
            error!(kind = kind.label(), "Error while parsing token string");
            ApiError::authentication(format!("Invalid {}", kind.label()))
        })
    }

    fn try_decode<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let mut segments = token.split('.');
        if segments.next()? != TOKEN_PREFIX {
            return None;
        }
        let wrapped_key = Base64UrlUnpadded::decode_vec(segments.next()?).ok()?;
        let nonce_bytes = Base64UrlUnpadded::decode_vec(segments.next()?).ok()?;
        let ciphertext = Base64UrlUnpadded::decode_vec(segments.next()?).ok()?;
        if segments.next().is_some() || nonce_bytes.len() != NONCE_LEN {
            return None;
        }

        let content_key = self
            .keys
            .private
            .decrypt(Oaep::new::<Sha256>(), &wrapped_key)
            .ok()?;
        if content_key.len() != CONTENT_KEY_LEN {
            return None;
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&content_key));
        let signed = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .ok()?;
        let signed = String::from_utf8(signed).ok()?;

        self.verify_signed(&signed)
    }

    fn verify_signed<T: DeserializeOwned>(&self, signed: &str) -> Option<T> {
        let mut parts = signed.split('.');
        let header_b64 = parts.next()?;
        let payload_b64 = parts.next()?;
        let sig_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let header: TokenHeader =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(header_b64).ok()?).ok()?;
        if header.alg != "RS256" {
            return None;
        }

        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature_bytes = Base64UrlUnpadded::decode_vec(sig_b64).ok()?;
        let signature = Signature::try_from(signature_bytes.as_slice()).ok()?;
        self.verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .ok()?;

        serde_json::from_slice(&Base64UrlUnpadded::decode_vec(payload_b64).ok()?).ok()
    }
}

/// One-way content hash used to index the refresh-token store, so raw tokens
/// are never stored at rest. Returns 64 lowercase hex characters.
#[must_use]
pub fn hash_token(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().fold(String::with_capacity(64), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}
