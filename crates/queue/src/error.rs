//! Fehlertypen fuer das Queue-Crate
//!
//! Die Queue selbst kennt keine Fehler (Einreihen gelingt immer, leere
//! Queues liefern `None`). Fehler entstehen nur bei der Persistenz.

use thiserror::Error;

/// Queue-Fehlertypen
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Ablage-Fehler: {0}")]
    Ablage(#[from] geheimpost_core::GeheimpostError),

    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type QueueResult<T> = Result<T, QueueError>;
