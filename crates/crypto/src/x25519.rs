//! X25519 Diffie-Hellman Schluessel-Paare
//!
//! Liefert die DH-Ausgaben fuer den Ratchet. Ein Paar kann "nur oeffentlich"
//! sein (z.B. der Ratchet-Schluessel des Gegenuebers); dann ist keine
//! Schluessel-Vereinbarung moeglich.

use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::{laenge_pruefen, CryptoError, CryptoResult};
use crate::types::{SecretBytes, SCHLUESSEL_LAENGE};

/// X25519 Schluessel-Paar (oeffentlich + optional privat)
#[derive(Clone)]
pub struct X25519KeyPair {
    public_key: [u8; 32],
    /// `None` bei einem Paar das nur den oeffentlichen Schluessel kennt
    private_key: Option<SecretBytes>,
}

impl X25519KeyPair {
    /// Generiert ein neues Schluessel-Paar aus OS-Zufall
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self {
            public_key: public.to_bytes(),
            private_key: Some(SecretBytes::new(secret.to_bytes().to_vec())),
        }
    }

    /// Stellt ein Paar aus einem 32-Byte privaten Schluessel wieder her
    pub fn from_private_key(bytes: &[u8]) -> CryptoResult<Self> {
        let secret = StaticSecret::from(als_array(bytes)?);
        let public = X25519PublicKey::from(&secret);
        Ok(Self {
            public_key: public.to_bytes(),
            private_key: Some(SecretBytes::from_slice(bytes)),
        })
    }

    /// Erstellt ein Paar das nur den oeffentlichen Schluessel kennt
    pub fn from_public_key(bytes: &[u8]) -> CryptoResult<Self> {
        Ok(Self {
            public_key: als_array(bytes)?,
            private_key: None,
        })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.public_key
    }

    /// Privater Schluessel (fuer Persistenz), `None` bei "nur oeffentlich"
    pub fn private_key_bytes(&self) -> Option<&[u8]> {
        self.private_key.as_ref().map(|k| k.as_bytes())
    }

    pub fn ist_nur_oeffentlich(&self) -> bool {
        self.private_key.is_none()
    }

    /// Fuehrt ECDH mit dem oeffentlichen Schluessel des Gegenuebers aus
    pub fn diffie_hellman(&self, remote_public: &[u8]) -> CryptoResult<SecretBytes> {
        let private = self
            .private_key
            .as_ref()
            .ok_or(CryptoError::NurOeffentlicherSchluessel)?;
        compute_shared_secret(private.as_bytes(), remote_public)
    }
}

impl std::fmt::Debug for X25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("X25519KeyPair")
            .field("public_key", &self.public_key)
            .field("nur_oeffentlich", &self.private_key.is_none())
            .finish()
    }
}

/// Berechnet das gemeinsame Geheimnis aus privatem und oeffentlichem Schluessel
///
/// Beide Eingaben muessen exakt 32 Bytes lang sein.
pub fn compute_shared_secret(private_key: &[u8], public_key: &[u8]) -> CryptoResult<SecretBytes> {
    let secret = StaticSecret::from(als_array(private_key)?);
    let remote = X25519PublicKey::from(als_array(public_key)?);
    let shared = secret.diffie_hellman(&remote);

    // Kleine Untergruppe: Ausgabe waere unabhaengig vom eigenen Schluessel
    if !shared.was_contributory() {
        return Err(CryptoError::UngueltigeDaten(
            "Oeffentlicher Schluessel liegt in kleiner Untergruppe".to_string(),
        ));
    }

    Ok(SecretBytes::new(shared.as_bytes().to_vec()))
}

fn als_array(bytes: &[u8]) -> CryptoResult<[u8; 32]> {
    laenge_pruefen(bytes, SCHLUESSEL_LAENGE)?;
    let mut arr = [0u8; 32];
    arr.copy_from_slice(bytes);
    Ok(arr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dh_erzeugt_gleiches_geheimnis() {
        let alice = X25519KeyPair::generate();
        let bob = X25519KeyPair::generate();

        let a = alice.diffie_hellman(&bob.public_key_bytes()).unwrap();
        let b = bob.diffie_hellman(&alice.public_key_bytes()).unwrap();

        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn wiederherstellung_aus_privatem_schluessel() {
        let original = X25519KeyPair::generate();
        let privat = original.private_key_bytes().unwrap().to_vec();

        let wiederhergestellt = X25519KeyPair::from_private_key(&privat).unwrap();
        assert_eq!(
            wiederhergestellt.public_key_bytes(),
            original.public_key_bytes()
        );
    }

    #[test]
    fn nur_oeffentlich_lehnt_vereinbarung_ab() {
        let fremd = X25519KeyPair::generate();
        let nur_pub = X25519KeyPair::from_public_key(&fremd.public_key_bytes()).unwrap();
        assert!(nur_pub.ist_nur_oeffentlich());

        let result = nur_pub.diffie_hellman(&X25519KeyPair::generate().public_key_bytes());
        assert!(matches!(result, Err(CryptoError::NurOeffentlicherSchluessel)));
    }

    #[test]
    fn falsche_laengen_werden_abgelehnt() {
        let pair = X25519KeyPair::generate();

        let result = compute_shared_secret(&[1u8; 31], &pair.public_key_bytes());
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 31 })
        ));

        let result = compute_shared_secret(pair.private_key_bytes().unwrap(), &[2u8; 33]);
        assert!(matches!(
            result,
            Err(CryptoError::UngueltigeSchluesselLaenge { erwartet: 32, erhalten: 33 })
        ));

        assert!(X25519KeyPair::from_public_key(&[0u8; 16]).is_err());
        assert!(X25519KeyPair::from_private_key(&[]).is_err());
    }

    #[test]
    fn null_punkt_wird_abgelehnt() {
        let pair = X25519KeyPair::generate();
        let result = pair.diffie_hellman(&[0u8; 32]);
        assert!(matches!(result, Err(CryptoError::UngueltigeDaten(_))));
    }
}
