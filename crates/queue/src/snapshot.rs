//! Persistierter Zustand einer Queue-Richtung
//!
//! ```text
//! JSON {messages, lastUpdated} --EncryptedStorage.encrypt--> Blob
//! ```

use geheimpost_core::{jetzt_ms, EncryptedStorage};
use serde::{Deserialize, Serialize};

use crate::error::QueueResult;
use crate::types::QueuedMessage;

/// Dateiname des ausgehenden Snapshots
pub const DATEI_AUSGEHEND: &str = "outgoing_queue.enc";
/// Dateiname des eingehenden Snapshots
pub const DATEI_EINGEHEND: &str = "incoming_queue.enc";

/// Snapshot einer Queue-Richtung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQueueSnapshot {
    pub messages: Vec<QueuedMessage>,
    /// Unix-Millisekunden
    pub last_updated: i64,
}

impl PersistedQueueSnapshot {
    /// Snapshot mit aktuellem Zeitstempel
    pub fn jetzt(messages: Vec<QueuedMessage>) -> Self {
        Self {
            messages,
            last_updated: jetzt_ms(),
        }
    }

    /// Serialisiert und verschluesselt den Snapshot
    pub fn versiegeln(&self, ablage: &dyn EncryptedStorage) -> QueueResult<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        Ok(ablage.encrypt(&json)?)
    }

    /// Entschluesselt und deserialisiert einen Snapshot
    pub fn oeffnen(daten: &[u8], ablage: &dyn EncryptedStorage) -> QueueResult<Self> {
        let json = ablage.decrypt(daten)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
