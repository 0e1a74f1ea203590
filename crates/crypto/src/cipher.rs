//! AES-256-CBC + HMAC-SHA256 (Encrypt-then-MAC)
//!
//! ## Format
//! ```text
//! [ciphertext (PKCS7, Vielfaches von 16)] [mac(10)]
//! mac = HMAC-SHA256(macKey, iv || ciphertext)[0..10]
//! ```
//!
//! Beim Entschluesseln wird zuerst der MAC geprueft (konstante Laufzeit).
//! Stimmt er nicht, wird der Ciphertext gar nicht erst entschluesselt.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{laenge_pruefen, CryptoError, CryptoResult};
use crate::types::{MessageKeys, IV_LAENGE, SCHLUESSEL_LAENGE};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Laenge des abgeschnittenen MAC-Tags
pub const MAC_LAENGE: usize = 10;

/// AES-Blockgroesse
const BLOCK_LAENGE: usize = 16;

/// Verschluesselt `plaintext` und haengt den abgeschnittenen MAC an
pub fn encrypt(
    plaintext: &[u8],
    cipher_key: &[u8],
    mac_key: &[u8],
    iv: &[u8],
) -> CryptoResult<Vec<u8>> {
    schluessel_pruefen(cipher_key, mac_key, iv)?;

    let ciphertext = Aes256CbcEnc::new_from_slices(cipher_key, iv)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mac = mac_berechnen(mac_key, iv, &ciphertext)?.finalize().into_bytes();

    let mut out = Vec::with_capacity(ciphertext.len() + MAC_LAENGE);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(&mac[..MAC_LAENGE]);
    Ok(out)
}

/// Prueft den MAC und entschluesselt danach
///
/// Gibt `CryptoError::Authentifizierung` zurueck wenn der MAC nicht passt.
pub fn decrypt(data: &[u8], cipher_key: &[u8], mac_key: &[u8], iv: &[u8]) -> CryptoResult<Vec<u8>> {
    schluessel_pruefen(cipher_key, mac_key, iv)?;

    if data.len() < BLOCK_LAENGE + MAC_LAENGE
        || (data.len() - MAC_LAENGE) % BLOCK_LAENGE != 0
    {
        return Err(CryptoError::UngueltigeDaten(format!(
            "Ungueltige Chiffrat-Laenge: {} Bytes",
            data.len()
        )));
    }

    let (ciphertext, tag) = data.split_at(data.len() - MAC_LAENGE);

    mac_berechnen(mac_key, iv, ciphertext)?
        .verify_truncated_left(tag)
        .map_err(|_| CryptoError::Authentifizierung)?;

    Aes256CbcDec::new_from_slices(cipher_key, iv)
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|e| CryptoError::Entschluesselung(e.to_string()))
}

/// Verschluesselt mit abgeleitetem Nachrichten-Schluesselmaterial
pub fn encrypt_mit(plaintext: &[u8], keys: &MessageKeys) -> CryptoResult<Vec<u8>> {
    encrypt(
        plaintext,
        keys.cipher_key.as_bytes(),
        keys.mac_key.as_bytes(),
        keys.iv.as_bytes(),
    )
}

/// Entschluesselt mit abgeleitetem Nachrichten-Schluesselmaterial
pub fn decrypt_mit(data: &[u8], keys: &MessageKeys) -> CryptoResult<Vec<u8>> {
    decrypt(
        data,
        keys.cipher_key.as_bytes(),
        keys.mac_key.as_bytes(),
        keys.iv.as_bytes(),
    )
}

fn schluessel_pruefen(cipher_key: &[u8], mac_key: &[u8], iv: &[u8]) -> CryptoResult<()> {
    laenge_pruefen(cipher_key, SCHLUESSEL_LAENGE)?;
    laenge_pruefen(mac_key, SCHLUESSEL_LAENGE)?;
    if iv.len() != IV_LAENGE {
        return Err(CryptoError::UngueltigeIvLaenge {
            erwartet: IV_LAENGE,
            erhalten: iv.len(),
        });
    }
    Ok(())
}

fn mac_berechnen(mac_key: &[u8], iv: &[u8], ciphertext: &[u8]) -> CryptoResult<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    Ok(mac)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CK: [u8; 32] = [0x11; 32];
    const MK: [u8; 32] = [0x22; 32];
    const IV: [u8; 16] = [0x33; 16];

    #[test]
    fn roundtrip_verschiedene_laengen() {
        for laenge in [0usize, 1, 15, 16, 17, 31, 32, 100, 1024] {
            let plaintext: Vec<u8> = (0..laenge).map(|i| i as u8).collect();
            let chiffrat = encrypt(&plaintext, &CK, &MK, &IV).unwrap();
            assert_eq!((chiffrat.len() - MAC_LAENGE) % 16, 0);
            let klartext = decrypt(&chiffrat, &CK, &MK, &IV).unwrap();
            assert_eq!(klartext, plaintext, "Laenge {laenge}");
        }
    }

    #[test]
    fn jedes_gekippte_bit_wird_abgelehnt() {
        let chiffrat = encrypt(b"Hallo Welt, geheime Nachricht!", &CK, &MK, &IV).unwrap();

        for byte in 0..chiffrat.len() {
            for bit in 0..8 {
                let mut manipuliert = chiffrat.clone();
                manipuliert[byte] ^= 1 << bit;
                let result = decrypt(&manipuliert, &CK, &MK, &IV);
                assert!(
                    matches!(result, Err(CryptoError::Authentifizierung)),
                    "Byte {byte} Bit {bit} nicht erkannt"
                );
            }
        }
    }

    #[test]
    fn falscher_mac_key_ist_authentifizierungsfehler() {
        let chiffrat = encrypt(b"daten", &CK, &MK, &IV).unwrap();
        let result = decrypt(&chiffrat, &CK, &[0x44; 32], &IV);
        assert!(matches!(result, Err(CryptoError::Authentifizierung)));
    }

    #[test]
    fn falscher_iv_ist_authentifizierungsfehler() {
        // IV ist in den MAC eingebunden
        let chiffrat = encrypt(b"daten", &CK, &MK, &IV).unwrap();
        let result = decrypt(&chiffrat, &CK, &MK, &[0x55; 16]);
        assert!(matches!(result, Err(CryptoError::Authentifizierung)));
    }

    #[test]
    fn schluessel_groessen_werden_vorab_geprueft() {
        assert!(matches!(
            encrypt(b"x", &[0u8; 16], &MK, &IV),
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 16 })
        ));
        assert!(matches!(
            encrypt(b"x", &CK, &[0u8; 31], &IV),
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 31 })
        ));
        assert!(matches!(
            encrypt(b"x", &CK, &MK, &[0u8; 12]),
            Err(CryptoError::UngueltigeIvLaenge { erwartet: 16, erhalten: 12 })
        ));
        assert!(matches!(
            decrypt(&[0u8; 26], &CK, &MK, &[0u8; 8]),
            Err(CryptoError::UngueltigeIvLaenge { .. })
        ));
    }

    #[test]
    fn abgeschnittene_daten_werden_abgelehnt() {
        let chiffrat = encrypt(b"daten", &CK, &MK, &IV).unwrap();
        assert!(matches!(
            decrypt(&chiffrat[..chiffrat.len() - 1], &CK, &MK, &IV),
            Err(CryptoError::UngueltigeDaten(_))
        ));
        assert!(decrypt(&[], &CK, &MK, &IV).is_err());
    }

    #[test]
    fn message_keys_helfer() {
        let keys = crate::kdf::derive_message_key(&[9u8; 32]).unwrap();
        let chiffrat = encrypt_mit(b"ueber MessageKeys", &keys).unwrap();
        assert_eq!(decrypt_mit(&chiffrat, &keys).unwrap(), b"ueber MessageKeys");
    }
}
