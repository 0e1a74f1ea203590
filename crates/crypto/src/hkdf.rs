//! HKDF nach RFC 5869 (HMAC-SHA256)
//!
//! `extract` und `expand` sind einzeln verfuegbar, weil die Ratchet-Ableitungen
//! in `kdf` sie mit unterschiedlichen Salts und Infos kombinieren.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::types::SecretBytes;

/// Laenge eines SHA-256 Hashes / PRK
pub const HASH_LAENGE: usize = 32;

/// Maximale Ausgabelaenge von `expand` (255 Bloecke)
pub const MAX_AUSGABE: usize = 255 * HASH_LAENGE;

/// HKDF-Extract: PRK = HMAC-SHA256(salt, ikm)
///
/// Ein leerer Salt entspricht laut RFC einem Salt aus 32 Null-Bytes.
pub fn extract(salt: &[u8], ikm: &[u8]) -> SecretBytes {
    let salt = if salt.is_empty() { None } else { Some(salt) };
    let (prk, _) = Hkdf::<Sha256>::extract(salt, ikm);
    SecretBytes::new(prk.to_vec())
}

/// HKDF-Expand: leitet `length` Bytes aus einem PRK ab
pub fn expand(prk: &[u8], info: &[u8], length: usize) -> CryptoResult<SecretBytes> {
    if length == 0 || length > MAX_AUSGABE {
        return Err(CryptoError::KeyDerivation(format!(
            "Ausgabelaenge {length} ausserhalb 1..={MAX_AUSGABE}"
        )));
    }

    let hk = Hkdf::<Sha256>::from_prk(prk)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SecretBytes::new(okm))
}

/// Extract-then-Expand in einem Schritt
pub fn derive_secrets(
    salt: &[u8],
    ikm: &[u8],
    info: &[u8],
    length: usize,
) -> CryptoResult<SecretBytes> {
    let prk = extract(salt, ikm);
    expand(prk.as_bytes(), info, length)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn rfc5869_testfall_1() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let salt = hex("000102030405060708090a0b0c");
        let info = hex("f0f1f2f3f4f5f6f7f8f9");

        let prk = extract(&salt, &ikm);
        assert_eq!(
            prk.as_bytes(),
            hex("077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5").as_slice()
        );

        let okm = expand(prk.as_bytes(), &info, 42).unwrap();
        assert_eq!(
            okm.as_bytes(),
            hex("3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf34007208d5b887185865")
                .as_slice()
        );
    }

    #[test]
    fn rfc5869_testfall_3_ohne_salt() {
        let ikm = hex("0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b0b");
        let okm = derive_secrets(&[], &ikm, &[], 42).unwrap();
        assert_eq!(
            okm.as_bytes(),
            hex("8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d9d201395faa4b61a96c8")
                .as_slice()
        );
    }

    #[test]
    fn derive_secrets_deterministisch() {
        let k1 = derive_secrets(b"salt", b"ikm", b"info", 32).unwrap();
        let k2 = derive_secrets(b"salt", b"ikm", b"info", 32).unwrap();
        assert_eq!(k1, k2);
        assert_eq!(k1.len(), 32);
    }

    #[test]
    fn verschiedene_infos_geben_verschiedene_keys() {
        let k1 = derive_secrets(b"salt", b"ikm", b"info-1", 64).unwrap();
        let k2 = derive_secrets(b"salt", b"ikm", b"info-2", 64).unwrap();
        // Domain-Separation: kein einziges Byte darf systematisch gleich bleiben
        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(k1.as_bytes()[..32], k2.as_bytes()[..32]);
        assert_ne!(k1.as_bytes()[32..], k2.as_bytes()[32..]);
    }

    #[test]
    fn ausgabelaenge_begrenzt() {
        let prk = extract(b"salt", b"ikm");
        assert!(expand(prk.as_bytes(), b"", MAX_AUSGABE).is_ok());
        assert!(matches!(
            expand(prk.as_bytes(), b"", MAX_AUSGABE + 1),
            Err(CryptoError::KeyDerivation(_))
        ));
        assert!(expand(prk.as_bytes(), b"", 0).is_err());
    }

    #[test]
    fn zu_kurzer_prk_wird_abgelehnt() {
        assert!(expand(&[0u8; 16], b"info", 32).is_err());
    }
}
