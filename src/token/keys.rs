//! Process-lifetime RSA key material for the token codec.
//!
//! The key pair is loaded from a PKCS#8 PEM file at startup, or generated and
//! persisted once if the file does not exist. It is constructed explicitly and
//! injected into the codec so tests can run with ephemeral keys.

use anyhow::{Context, Result};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::Path;
use tracing::info;

const KEY_BITS: usize = 2048;

/// An immutable-after-init RSA key pair. The private half never leaves the
/// `token` module.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub(super) private: RsaPrivateKey,
    pub(super) public: RsaPublicKey,
}

impl KeyMaterial {
    /// Load the key pair from `path`, generating and persisting a new one if
    /// no file exists yet.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            let pem = fs::read_to_string(path)
                .with_context(|| format!("failed to read key file {}", path.display()))?;
            let private = RsaPrivateKey::from_pkcs8_pem(&pem)
                .with_context(|| format!("failed to parse key file {}", path.display()))?;
            return Ok(Self::from_private(private));
        }

        info!(path = %path.display(), "Key file not found, generating new RSA key pair");
        let material = Self::generate()?;
        let pem = material
            .private
            .to_pkcs8_pem(LineEnding::LF)
            .context("failed to encode generated key")?;
        fs::write(path, pem.as_bytes())
            .with_context(|| format!("failed to write key file {}", path.display()))?;
        Ok(material)
    }

    /// Generate an ephemeral key pair (startup fallback and tests).
    pub fn generate() -> Result<Self> {
        let private =
            RsaPrivateKey::new(&mut OsRng, KEY_BITS).context("failed to generate RSA key pair")?;
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }
}
