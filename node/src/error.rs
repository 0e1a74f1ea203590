//! Fehlertypen des Knotens

use geheimpost_crypto::CryptoError;
use geheimpost_queue::QueueError;
use geheimpost_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnotenError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Kryptografie-Fehler: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Queue-Fehler: {0}")]
    Queue(#[from] QueueError),

    #[error("Ablage-Fehler: {0}")]
    Ablage(#[from] geheimpost_core::GeheimpostError),

    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),

    #[error("Transport-Fehler: {0}")]
    Transport(#[from] TransportError),

    #[error("Unbekannter Peer: {0}")]
    UnbekannterPeer(String),

    #[error("Metriken nicht verfuegbar: {0}")]
    Metriken(String),

    #[error("Knoten wurde bereits gestartet")]
    BereitsGestartet,

    #[error("Knoten ist heruntergefahren")]
    Heruntergefahren,
}

pub type KnotenResult<T> = Result<T, KnotenError>;
