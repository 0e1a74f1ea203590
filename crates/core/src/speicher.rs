//! Schnittstelle zur verschluesselten Ablage
//!
//! Der Kern verschluesselt ruhende Daten (Queue-Snapshots) nicht selbst,
//! sondern delegiert an einen externen Kollaborateur. Die Plattform-Ebene
//! entscheidet, woher der Schluessel stammt (Keystore, Keychain, Konfiguration).

use crate::error::Result;

/// Verschluesselt und entschluesselt beliebige Byte-Bloecke fuer die Ablage
pub trait EncryptedStorage: Send + Sync {
    /// Verschluesselt Klartext-Bytes fuer die Ablage
    fn encrypt(&self, klartext: &[u8]) -> Result<Vec<u8>>;

    /// Entschluesselt zuvor mit `encrypt` erzeugte Bytes
    fn decrypt(&self, chiffrat: &[u8]) -> Result<Vec<u8>>;
}

impl<T: EncryptedStorage + ?Sized> EncryptedStorage for std::sync::Arc<T> {
    fn encrypt(&self, klartext: &[u8]) -> Result<Vec<u8>> {
        (**self).encrypt(klartext)
    }

    fn decrypt(&self, chiffrat: &[u8]) -> Result<Vec<u8>> {
        (**self).decrypt(chiffrat)
    }
}
