//! Snapshot-Backends
//!
//! Das `SnapshotBackend`-Trait abstrahiert den Ort der verschluesselten
//! Snapshot-Dateien (Verzeichnis, Speicher fuer Tests).

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::QueueResult;

/// Abstraktes Backend fuer Snapshot-Blobs
#[async_trait]
pub trait SnapshotBackend: Send + Sync + 'static {
    /// Blob unter `name` ersetzen
    async fn schreiben(&self, name: &str, daten: &[u8]) -> QueueResult<()>;

    /// Blob laden, `None` wenn keiner existiert
    async fn lesen(&self, name: &str) -> QueueResult<Option<Vec<u8>>>;
}

/// Verzeichnis-basiertes Backend
///
/// Schreibt erst in `<name>.tmp` und benennt danach um, damit ein Absturz
/// waehrend des Schreibens keinen halben Snapshot hinterlaesst.
#[derive(Debug, Clone)]
pub struct DateiBackend {
    verzeichnis: PathBuf,
}

impl DateiBackend {
    pub fn new(verzeichnis: impl Into<PathBuf>) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
        }
    }

    fn pfad(&self, name: &str) -> PathBuf {
        self.verzeichnis.join(name)
    }
}

#[async_trait]
impl SnapshotBackend for DateiBackend {
    async fn schreiben(&self, name: &str, daten: &[u8]) -> QueueResult<()> {
        tokio::fs::create_dir_all(&self.verzeichnis).await?;

        let ziel = self.pfad(name);
        let temp = self.pfad(&format!("{name}.tmp"));
        tokio::fs::write(&temp, daten).await?;
        tokio::fs::rename(&temp, &ziel).await?;

        tracing::debug!(pfad = %ziel.display(), bytes = daten.len(), "Snapshot geschrieben");
        Ok(())
    }

    async fn lesen(&self, name: &str) -> QueueResult<Option<Vec<u8>>> {
        let pfad = self.pfad(name);
        match tokio::fs::read(&pfad).await {
            Ok(daten) => {
                tracing::debug!(pfad = %pfad.display(), bytes = daten.len(), "Snapshot gelesen");
                Ok(Some(daten))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Backend im Arbeitsspeicher
#[derive(Debug, Default)]
pub struct SpeicherBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    schreibvorgaenge: Mutex<usize>,
}

impl SpeicherBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Aktueller Inhalt eines Blobs
    pub fn inhalt(&self, name: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(name).cloned()
    }

    /// Setzt einen Blob direkt
    pub fn setzen(&self, name: &str, daten: Vec<u8>) {
        self.blobs.lock().insert(name.to_string(), daten);
    }

    /// Anzahl bisheriger Schreibvorgaenge
    pub fn schreibvorgaenge(&self) -> usize {
        *self.schreibvorgaenge.lock()
    }
}

#[async_trait]
impl SnapshotBackend for SpeicherBackend {
    async fn schreiben(&self, name: &str, daten: &[u8]) -> QueueResult<()> {
        self.blobs.lock().insert(name.to_string(), daten.to_vec());
        *self.schreibvorgaenge.lock() += 1;
        Ok(())
    }

    async fn lesen(&self, name: &str) -> QueueResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(name).cloned())
    }
}
