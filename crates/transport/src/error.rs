//! Fehlertypen fuer das Transport-Crate

use thiserror::Error;

/// Transport-Fehlertypen
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Signaling-Verbindung fehlgeschlagen: {0}")]
    SignalingVerbindung(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    /// Senden ohne offenen Data-Channel, es wird nichts zwischengespeichert
    #[error("Data-Channel ist nicht offen")]
    KanalNichtOffen,

    #[error("Gegenstelle meldet Fehler: {0}")]
    RemoteFehler(String),

    #[error("WebRTC-Fehler: {0}")]
    Plattform(String),

    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error("Ungueltiger Zustand: {0}")]
    UngueltigerZustand(String),

    #[error("Verbindung wurde getrennt")]
    Getrennt,

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl TransportError {
    /// Gibt true zurueck wenn ein erneuter Verbindungsversuch sinnvoll ist
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::SignalingVerbindung(_)
                | Self::Zeitlimit(_)
                | Self::Getrennt
                | Self::KanalNichtOffen
                | Self::Plattform(_)
        )
    }
}

impl From<::webrtc::Error> for TransportError {
    fn from(e: ::webrtc::Error) -> Self {
        Self::Plattform(e.to_string())
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
