//! Verschluesselung ruhender Daten (AES-256-GCM)
//!
//! Implementiert den `EncryptedStorage`-Kollaborator fuer die Queue-Snapshots.
//!
//! ## Format
//! ```text
//! [nonce(12)] [ciphertext + auth_tag(16)]
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use geheimpost_core::{EncryptedStorage, GeheimpostError};
use rand_core::{OsRng, RngCore};

use crate::error::{laenge_pruefen, CryptoResult};
use crate::types::SecretBytes;

/// Laenge der GCM-Nonce
const NONCE_LAENGE: usize = 12;

/// AES-256-GCM mit festem Ablage-Schluessel
pub struct RuhendeVerschluesselung {
    schluessel: SecretBytes,
}

impl RuhendeVerschluesselung {
    /// Erstellt die Verschluesselung mit einem 32-Byte-Schluessel
    pub fn neu(schluessel: &[u8]) -> CryptoResult<Self> {
        laenge_pruefen(schluessel, 32)?;
        Ok(Self {
            schluessel: SecretBytes::from_slice(schluessel),
        })
    }

    /// Erstellt die Verschluesselung mit einem frischen Zufallsschluessel
    pub fn zufaellig() -> Self {
        let mut bytes = vec![0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            schluessel: SecretBytes::new(bytes),
        }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.schluessel.as_bytes()))
    }
}

impl std::fmt::Debug for RuhendeVerschluesselung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RuhendeVerschluesselung {{ schluessel: [REDACTED] }}")
    }
}

impl EncryptedStorage for RuhendeVerschluesselung {
    fn encrypt(&self, klartext: &[u8]) -> geheimpost_core::Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LAENGE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(AesNonce::from_slice(&nonce_bytes), klartext)
            .map_err(|e| GeheimpostError::AblageVerschluesselung(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, chiffrat: &[u8]) -> geheimpost_core::Result<Vec<u8>> {
        if chiffrat.len() < NONCE_LAENGE + 16 {
            return Err(GeheimpostError::AblageEntschluesselung(format!(
                "Daten zu kurz: {} Bytes",
                chiffrat.len()
            )));
        }
        let (nonce, ciphertext) = chiffrat.split_at(NONCE_LAENGE);

        self.cipher()
            .decrypt(AesNonce::from_slice(nonce), ciphertext)
            .map_err(|e| GeheimpostError::AblageEntschluesselung(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
