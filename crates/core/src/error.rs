//! Fehlertypen fuer Geheimpost
//!
//! Fehler an den Grenzen zu externen Kollaborateuren (verschluesselte
//! Ablage). Die Crates definieren eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Result-Alias fuer Kollaborateur-Aufrufe
pub type Result<T> = std::result::Result<T, GeheimpostError>;

/// Fehler eines externen Kollaborateurs
#[derive(Debug, Error)]
pub enum GeheimpostError {
    #[error("Verschluesselung der Ablage fehlgeschlagen: {0}")]
    AblageVerschluesselung(String),

    #[error("Entschluesselung der Ablage fehlgeschlagen: {0}")]
    AblageEntschluesselung(String),

    /// Ablage-Schluessel fehlt oder ist gesperrt (Keystore, Keychain)
    #[error("Ablage nicht verfuegbar: {0}")]
    AblageNichtVerfuegbar(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl GeheimpostError {
    /// Gibt true zurueck wenn ein spaeterer Versuch gelingen koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::AblageNichtVerfuegbar(_))
    }
}
