//! Ed25519 Signatur-Schluessel
//!
//! Deterministische 64-Byte-Signaturen. Die Verifikation wirft nie: jede
//! fehlerhafte Eingabe (falsche Laengen, ungueltiger Punkt) ergibt `false`.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{laenge_pruefen, CryptoError, CryptoResult};

/// Laenge einer Ed25519-Signatur
pub const SIGNATUR_LAENGE: usize = 64;

/// Ed25519 Schluessel-Paar (oeffentlich + optional privat)
pub struct Ed25519KeyPair {
    verifying_key: VerifyingKey,
    /// `None` bei einem Paar das nur den oeffentlichen Schluessel kennt
    signing_key: Option<SigningKey>,
}

/// Oeffentlicher Teil eines Signatur-Paares (serialisierbar)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OeffentlicherSignaturSchluessel {
    pub public_key_bytes: [u8; 32],
}

impl Ed25519KeyPair {
    /// Generiert ein neues Ed25519-Schluessel-Paar
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            verifying_key: signing_key.verifying_key(),
            signing_key: Some(signing_key),
        }
    }

    /// Erstellt ein Paar aus einem privaten Schluessel (32 Bytes)
    pub fn from_private_key(bytes: &[u8]) -> CryptoResult<Self> {
        laenge_pruefen(bytes, 32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let signing_key = SigningKey::from_bytes(&arr);
        arr.iter_mut().for_each(|b| *b = 0);
        Ok(Self {
            verifying_key: signing_key.verifying_key(),
            signing_key: Some(signing_key),
        })
    }

    /// Erstellt ein Paar das nur verifizieren kann
    pub fn from_public_key(bytes: &[u8]) -> CryptoResult<Self> {
        laenge_pruefen(bytes, 32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        let verifying_key = VerifyingKey::from_bytes(&arr)
            .map_err(|e| CryptoError::UngueltigeDaten(e.to_string()))?;
        Ok(Self {
            verifying_key,
            signing_key: None,
        })
    }

    /// Gibt den privaten Schluessel als Bytes zurueck (fuer Persistenz)
    pub fn private_key_bytes(&self) -> Option<[u8; 32]> {
        self.signing_key.as_ref().map(|k| k.to_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    pub fn ist_nur_oeffentlich(&self) -> bool {
        self.signing_key.is_none()
    }

    pub fn oeffentlich(&self) -> OeffentlicherSignaturSchluessel {
        OeffentlicherSignaturSchluessel {
            public_key_bytes: self.public_key_bytes(),
        }
    }

    /// Signiert Daten mit dem privaten Schluessel
    pub fn sign(&self, data: &[u8]) -> CryptoResult<[u8; SIGNATUR_LAENGE]> {
        let signing_key = self
            .signing_key
            .as_ref()
            .ok_or(CryptoError::NurOeffentlicherSchluessel)?;
        Ok(signing_key.sign(data).to_bytes())
    }

    /// Verifiziert eine Signatur gegen den eigenen oeffentlichen Schluessel
    pub fn verify_own(&self, data: &[u8], signature_bytes: &[u8]) -> bool {
        let Ok(sig_array) = <[u8; SIGNATUR_LAENGE]>::try_from(signature_bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_array);
        self.verifying_key.verify(data, &signature).is_ok()
    }

    /// Verifiziert eine Signatur mit einem beliebigen oeffentlichen Schluessel
    pub fn verify(data: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> bool {
        let Ok(pub_array) = <[u8; 32]>::try_from(public_key_bytes) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&pub_array) else {
            return false;
        };
        let Ok(sig_array) = <[u8; SIGNATUR_LAENGE]>::try_from(signature_bytes) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_array);
        verifying_key.verify(data, &signature).is_ok()
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Ed25519KeyPair {{ public_key: [Ed25519 VerifyingKey], nur_oeffentlich: {} }}",
            self.signing_key.is_none()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signieren_und_verifizieren() {
        let pair = Ed25519KeyPair::generate();
        let data = b"Hallo, Geheimpost!";

        let signature = pair.sign(data).unwrap();
        assert_eq!(signature.len(), 64);

        assert!(Ed25519KeyPair::verify(data, &signature, &pair.public_key_bytes()));
        assert!(pair.verify_own(data, &signature));
    }

    #[test]
    fn signatur_ist_deterministisch() {
        let pair = Ed25519KeyPair::generate();
        let s1 = pair.sign(b"gleiche Daten").unwrap();
        let s2 = pair.sign(b"gleiche Daten").unwrap();
        assert_eq!(s1, s2);
    }

    #[test]
    fn falsche_signatur_wird_abgelehnt() {
        let pair = Ed25519KeyPair::generate();
        let data = b"Hallo, Geheimpost!";

        let mut signature = pair.sign(data).unwrap();
        signature[0] ^= 0xFF;

        assert!(!Ed25519KeyPair::verify(data, &signature, &pair.public_key_bytes()));
    }

    #[test]
    fn falsche_daten_werden_abgelehnt() {
        let pair = Ed25519KeyPair::generate();
        let signature = pair.sign(b"Originaltext").unwrap();
        assert!(!Ed25519KeyPair::verify(
            b"Geaenderter Text",
            &signature,
            &pair.public_key_bytes()
        ));
    }

    #[test]
    fn fehlerhafte_eingaben_ergeben_false() {
        let pair = Ed25519KeyPair::generate();
        let signature = pair.sign(b"daten").unwrap();

        // Signatur zu kurz
        assert!(!Ed25519KeyPair::verify(b"daten", &signature[..63], &pair.public_key_bytes()));
        // Schluessel zu kurz
        assert!(!Ed25519KeyPair::verify(b"daten", &signature, &[1u8; 31]));
        // Leere Eingaben
        assert!(!Ed25519KeyPair::verify(b"daten", &[], &[]));
    }

    #[test]
    fn nur_oeffentlich_kann_nicht_signieren() {
        let pair = Ed25519KeyPair::generate();
        let nur_pub = Ed25519KeyPair::from_public_key(&pair.public_key_bytes()).unwrap();

        assert!(nur_pub.ist_nur_oeffentlich());
        assert!(matches!(
            nur_pub.sign(b"x"),
            Err(CryptoError::NurOeffentlicherSchluessel)
        ));

        // Verifizieren klappt weiterhin
        let sig = pair.sign(b"x").unwrap();
        assert!(nur_pub.verify_own(b"x", &sig));
    }

    #[test]
    fn from_private_key_roundtrip() {
        let pair = Ed25519KeyPair::generate();
        let privat = pair.private_key_bytes().unwrap();

        let restored = Ed25519KeyPair::from_private_key(&privat).unwrap();
        assert_eq!(restored.public_key_bytes(), pair.public_key_bytes());
    }

    #[test]
    fn oeffentlicher_schluessel_serialisierbar() {
        let pair = Ed25519KeyPair::generate();
        let pub_id = pair.oeffentlich();
        let json = serde_json::to_string(&pub_id).unwrap();
        let decoded: OeffentlicherSignaturSchluessel = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, pub_id);
    }

    #[test]
    fn verschiedene_keys_ablehnen() {
        let id1 = Ed25519KeyPair::generate();
        let id2 = Ed25519KeyPair::generate();

        let sig = id1.sign(b"Testdaten").unwrap();
        assert!(!Ed25519KeyPair::verify(b"Testdaten", &sig, &id2.public_key_bytes()));
    }
}
