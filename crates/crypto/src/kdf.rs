//! Ratchet-spezifische Schluessel-Ableitungen
//!
//! Alle Ableitungen basieren auf dem generischen HKDF aus `crate::hkdf`,
//! ausser dem Ketten-Schritt, der ein einfaches HMAC ist:
//!
//! ```text
//! RootKey  + DH-Output --HKDF("WhisperRatchet", 64)-----> RootKey' | ChainKey
//! ChainKey             --HKDF("WhisperMessageKeys", 80)-> cipherKey | macKey | iv
//! ChainKey             --HMAC(ChainKey, 0x02)-----------> ChainKey'
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{laenge_pruefen, CryptoError, CryptoResult};
use crate::hkdf::{expand, extract};
use crate::types::{MessageKeys, SecretBytes, SCHLUESSEL_LAENGE};

type HmacSha256 = Hmac<Sha256>;

/// Info-String fuer den DH-Ratchet-Schritt
pub const INFO_RATCHET: &[u8] = b"WhisperRatchet";

/// Info-String fuer Nachrichten-Schluessel
pub const INFO_NACHRICHTEN_SCHLUESSEL: &[u8] = b"WhisperMessageKeys";

/// Eingabe-Byte fuer den Ketten-Schritt
const KETTEN_KONSTANTE: u8 = 0x02;

/// DH-Ratchet-Schritt: (RootKey, DH-Output) -> (neuer RootKey, ChainKey)
pub fn derive_root_key(
    root_key: &[u8],
    dh_output: &[u8],
) -> CryptoResult<(SecretBytes, SecretBytes)> {
    laenge_pruefen(root_key, SCHLUESSEL_LAENGE)?;
    laenge_pruefen(dh_output, SCHLUESSEL_LAENGE)?;

    let prk = extract(root_key, dh_output);
    let okm = expand(prk.as_bytes(), INFO_RATCHET, 64)?;
    let bytes = okm.as_bytes();

    Ok((
        SecretBytes::from_slice(&bytes[0..32]),
        SecretBytes::from_slice(&bytes[32..64]),
    ))
}

/// Leitet das Schluesselmaterial einer Nachricht aus dem Ketten-Schluessel ab
pub fn derive_message_key(chain_key: &[u8]) -> CryptoResult<MessageKeys> {
    laenge_pruefen(chain_key, SCHLUESSEL_LAENGE)?;

    let prk = extract(&[], chain_key);
    let okm = expand(prk.as_bytes(), INFO_NACHRICHTEN_SCHLUESSEL, 80)?;

    let mut material = [0u8; 80];
    material.copy_from_slice(okm.as_bytes());
    let keys = MessageKeys::aus_material(&material);
    material.iter_mut().for_each(|b| *b = 0);
    Ok(keys)
}

/// Symmetrischer Ketten-Schritt: ChainKey' = HMAC-SHA256(ChainKey, 0x02)
///
/// Einweg und ohne DH-Eingabe.
pub fn derive_next_chain_key(chain_key: &[u8]) -> CryptoResult<SecretBytes> {
    laenge_pruefen(chain_key, SCHLUESSEL_LAENGE)?;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(chain_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(&[KETTEN_KONSTANTE]);
    Ok(SecretBytes::new(mac.finalize().into_bytes().to_vec()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
