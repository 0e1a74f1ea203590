//! geheimpost-queue – Zustell-Queue fuer Ratchet-Nachrichten
//!
//! Dieses Crate implementiert:
//! - MessageQueue: zwei unabhaengige Queues (ausgehend/eingehend), Prioritaet
//!   vor Einfuege-Reihenfolge, begrenzte Wiederholungen
//! - PersistentQueueManager: verschluesselte Snapshots, Autosave, Wiederherstellung
//! - SnapshotBackend-Trait + DateiBackend/SpeicherBackend
//!
//! # Beispiel
//!
//! ```no_run
//! use std::sync::Arc;
//! use geheimpost_queue::{DateiBackend, PersistentQueueManager, PersistenzOptionen};
//! # use geheimpost_core::EncryptedStorage;
//! # async fn beispiel(ablage: Arc<dyn EncryptedStorage>) {
//! let backend = Arc::new(DateiBackend::new("data/queue"));
//! let manager = PersistentQueueManager::neu(backend, ablage, PersistenzOptionen::default());
//! manager.initialize(true, true).await;
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod persistent;
pub mod queue;
pub mod snapshot;
pub mod types;

#[cfg(test)]
mod tests;

// Bequeme Re-Exporte
pub use backend::{DateiBackend, SnapshotBackend, SpeicherBackend};
pub use error::{QueueError, QueueResult};
pub use persistent::{PersistentQueueManager, PersistenzOptionen, Wiederhergestellt, WiederherstellungsModus};
pub use queue::MessageQueue;
pub use snapshot::PersistedQueueSnapshot;
pub use types::{
    MessageStatus, QueueStatistik, QueuedMessage, RichtungsStatistik, MAX_WIEDERHOLUNGEN,
    PRIORITAET_HOCH, PRIORITAET_NIEDRIG, PRIORITAET_NORMAL,
};
