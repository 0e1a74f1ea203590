//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use serde::{Deserialize, Serialize};

/// Laenge von Root-, Ketten-, Cipher- und MAC-Schluesseln
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Laenge des AES-CBC Initialisierungsvektors
pub const IV_LAENGE: usize = 16;

/// Sicherer Schluessel-Container (wird beim Drop genullt)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretBytes(pub Vec<u8>);

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretBytes([REDACTED] {} bytes)", self.0.len())
    }
}

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Schluesselmaterial fuer genau eine Nachricht
///
/// Wird aus dem Ketten-Schluessel an einer Position abgeleitet und nach
/// Verwendung verworfen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKeys {
    /// AES-256 Schluessel (32 Bytes)
    pub cipher_key: SecretBytes,
    /// HMAC-SHA256 Schluessel (32 Bytes)
    pub mac_key: SecretBytes,
    /// CBC-IV (16 Bytes)
    pub iv: SecretBytes,
}

impl MessageKeys {
    /// Zerlegt 80 Bytes Schluesselmaterial in cipherKey | macKey | iv
    pub fn aus_material(material: &[u8; 80]) -> Self {
        Self {
            cipher_key: SecretBytes::from_slice(&material[0..32]),
            mac_key: SecretBytes::from_slice(&material[32..64]),
            iv: SecretBytes::from_slice(&material[64..80]),
        }
    }
}
