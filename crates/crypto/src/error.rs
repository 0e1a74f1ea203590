//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    /// MAC stimmt nicht – der Klartext darf nicht verwendet werden
    #[error("Authentifizierung fehlgeschlagen: MAC ungueltig")]
    Authentifizierung,

    #[error("Schluessel-Paar enthaelt nur den oeffentlichen Schluessel")]
    NurOeffentlicherSchluessel,

    #[error("Ungueltige Schluessel-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige IV-Laenge: erwartet {erwartet}, erhalten {erhalten}")]
    UngueltigeIvLaenge { erwartet: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Key Derivation fehlgeschlagen: {0}")]
    KeyDerivation(String),

    #[error("Keine Ratchet-Sitzung fuer Peer {0}")]
    KeineSitzung(String),

    #[error("Nachricht gehoert zu einer anderen Sitzung")]
    FremdeSitzung,

    #[error("Sitzung hat noch keine Sendekette")]
    KeineSendekette,

    #[error("Kette kann nicht rueckwaerts laufen: aktuell {aktuell}, angefragt {angefragt}")]
    KetteRueckwaerts { aktuell: u32, angefragt: u32 },

    #[error("Zu viele uebersprungene Nachrichten: {angefragt} (Maximum {maximum})")]
    ZuVieleUebersprungen { angefragt: u32, maximum: u32 },

    #[error("Nachricht {index} wurde bereits verarbeitet")]
    NachrichtBereitsVerarbeitet { index: u32 },
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Prueft eine Schluessel-Laenge und liefert den passenden Fehler
pub(crate) fn laenge_pruefen(bytes: &[u8], erwartet: usize) -> CryptoResult<()> {
    if bytes.len() != erwartet {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet,
            erhalten: bytes.len(),
        });
    }
    Ok(())
}
