//! Persistenter Queue-Manager
//!
//! Umhuellt die `MessageQueue` und schreibt nach jeder Mutation einen
//! verschluesselten Snapshot beider Richtungen. Gespeichert wird nie inline
//! mit der Mutation: ein Signal weckt einen Hintergrund-Schreiber, mehrere
//! Signale vor dem naechsten Schreiben werden zusammengefasst. Zusaetzlich
//! laeuft optional ein periodischer Autosave.
//!
//! Lesefehler beim Start (fehlende Datei, IO, Entschluesselung, JSON) werden
//! protokolliert und als "kein gespeicherter Zustand" behandelt.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geheimpost_core::{EncryptedStorage, MessageId, PeerId, RatchetMessage};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::SnapshotBackend;
use crate::error::QueueResult;
use crate::queue::MessageQueue;
use crate::snapshot::{PersistedQueueSnapshot, DATEI_AUSGEHEND, DATEI_EINGEHEND};
use crate::types::{MessageStatus, QueueStatistik, QueuedMessage};

/// Standard-Intervall des Autosave
pub const AUTOSAVE_INTERVALL: Duration = Duration::from_secs(10);

/// Umgang mit Eintraegen die beim Speichern gerade in Bearbeitung waren
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiederherstellungsModus {
    /// Nur `PENDING`-Eintraege werden wiederhergestellt
    #[default]
    NurWartend,
    /// `SENDING`/`PROCESSING` werden als `PENDING` erneut zugestellt
    InFlugWiederholen,
}

/// Optionen des Managers
#[derive(Debug, Clone)]
pub struct PersistenzOptionen {
    pub autosave_intervall: Duration,
    pub modus: WiederherstellungsModus,
    /// `FAILED`-Eintraege beim Wiederherstellen behalten
    pub failed_behalten: bool,
}

impl Default for PersistenzOptionen {
    fn default() -> Self {
        Self {
            autosave_intervall: AUTOSAVE_INTERVALL,
            modus: WiederherstellungsModus::NurWartend,
            failed_behalten: false,
        }
    }
}

/// Anzahl wiederhergestellter Eintraege pro Richtung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Wiederhergestellt {
    pub ausgehend: usize,
    pub eingehend: usize,
}

/// Gemeinsamer Zustand fuer Manager und Hintergrund-Tasks
struct Innen {
    queue: MessageQueue,
    backend: Arc<dyn SnapshotBackend>,
    ablage: Arc<dyn EncryptedStorage>,
    /// Haelt Snapshot-Dateien single-writer
    schreib_lock: tokio::sync::Mutex<()>,
    speichern_signal: Notify,
}

impl Innen {
    async fn speichern(&self) -> QueueResult<()> {
        let _schreiber = self.schreib_lock.lock().await;

        // Queue-Locks nur fuer die Kopie halten
        let ausgehend = PersistedQueueSnapshot::jetzt(self.queue.snapshot_outgoing());
        let eingehend = PersistedQueueSnapshot::jetzt(self.queue.snapshot_incoming());

        let blob = ausgehend.versiegeln(self.ablage.as_ref())?;
        self.backend.schreiben(DATEI_AUSGEHEND, &blob).await?;
        let blob = eingehend.versiegeln(self.ablage.as_ref())?;
        self.backend.schreiben(DATEI_EINGEHEND, &blob).await?;

        tracing::debug!(
            ausgehend = ausgehend.messages.len(),
            eingehend = eingehend.messages.len(),
            "Queue-Snapshot gespeichert"
        );
        Ok(())
    }

    async fn speichern_protokolliert(&self) {
        if let Err(e) = self.speichern().await {
            tracing::warn!(fehler = %e, "Queue-Snapshot konnte nicht gespeichert werden");
        }
    }

    /// Laedt einen Snapshot, jeder Fehler ergibt eine leere Liste
    async fn laden(&self, name: &str) -> Vec<QueuedMessage> {
        let daten = match self.backend.lesen(name).await {
            Ok(Some(daten)) => daten,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(datei = name, fehler = %e, "Snapshot nicht lesbar, starte leer");
                return Vec::new();
            }
        };

        match PersistedQueueSnapshot::oeffnen(&daten, self.ablage.as_ref()) {
            Ok(snapshot) => snapshot.messages,
            Err(e) => {
                tracing::warn!(datei = name, fehler = %e, "Snapshot ungueltig, starte leer");
                Vec::new()
            }
        }
    }
}

/// Queue mit verschluesselter Persistenz
pub struct PersistentQueueManager {
    innen: Arc<Innen>,
    optionen: PersistenzOptionen,
    abbruch: CancellationToken,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    initialisiert: AtomicBool,
    heruntergefahren: AtomicBool,
}

impl PersistentQueueManager {
    pub fn neu(
        backend: Arc<dyn SnapshotBackend>,
        ablage: Arc<dyn EncryptedStorage>,
        optionen: PersistenzOptionen,
    ) -> Self {
        Self {
            innen: Arc::new(Innen {
                queue: MessageQueue::new(),
                backend,
                ablage,
                schreib_lock: tokio::sync::Mutex::new(()),
                speichern_signal: Notify::new(),
            }),
            optionen,
            abbruch: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Vec::new()),
            initialisiert: AtomicBool::new(false),
            heruntergefahren: AtomicBool::new(false),
        }
    }

    /// Stellt gespeicherte Eintraege wieder her und startet die Hintergrund-Tasks
    ///
    /// Muss innerhalb einer Tokio-Runtime aufgerufen werden. Ein zweiter
    /// Aufruf hat keine Wirkung.
    pub async fn initialize(&self, auto_restore: bool, enable_auto_save: bool) -> Wiederhergestellt {
        if self.initialisiert.swap(true, Ordering::SeqCst) {
            return Wiederhergestellt::default();
        }

        let mut bericht = Wiederhergestellt::default();
        if auto_restore {
            let ausgehend = self.filtern(self.innen.laden(DATEI_AUSGEHEND).await);
            let eingehend = self.filtern(self.innen.laden(DATEI_EINGEHEND).await);
            bericht.ausgehend = self.innen.queue.restore_outgoing(ausgehend);
            bericht.eingehend = self.innen.queue.restore_incoming(eingehend);
            tracing::info!(
                ausgehend = bericht.ausgehend,
                eingehend = bericht.eingehend,
                modus = ?self.optionen.modus,
                "Queue wiederhergestellt"
            );
        }

        let mut tasks = self.tasks.lock();
        tasks.push(self.schreiber_starten());
        if enable_auto_save {
            tasks.push(self.autosave_starten());
        }
        bericht
    }

    fn filtern(&self, eintraege: Vec<QueuedMessage>) -> Vec<QueuedMessage> {
        let modus = self.optionen.modus;
        let failed_behalten = self.optionen.failed_behalten;

        eintraege
            .into_iter()
            .filter_map(|mut eintrag| match eintrag.status {
                MessageStatus::Pending => Some(eintrag),
                s if s.ist_in_flug() && modus == WiederherstellungsModus::InFlugWiederholen => {
                    eintrag.status = MessageStatus::Pending;
                    Some(eintrag)
                }
                MessageStatus::Failed if failed_behalten => Some(eintrag),
                _ => None,
            })
            .collect()
    }

    fn schreiber_starten(&self) -> JoinHandle<()> {
        let innen = Arc::clone(&self.innen);
        let abbruch = self.abbruch.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => break,
                    _ = innen.speichern_signal.notified() => innen.speichern_protokolliert().await,
                }
            }
            tracing::trace!("Snapshot-Schreiber beendet");
        })
    }

    fn autosave_starten(&self) -> JoinHandle<()> {
        let innen = Arc::clone(&self.innen);
        let abbruch = self.abbruch.clone();
        let intervall = self.optionen.autosave_intervall;
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // Erster Tick kommt sofort
            takt.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => break,
                    _ = takt.tick() => innen.speichern_protokolliert().await,
                }
            }
            tracing::trace!("Autosave beendet");
        })
    }

    fn speichern_planen(&self) {
        if !self.heruntergefahren.load(Ordering::SeqCst) {
            self.innen.speichern_signal.notify_one();
        }
    }

    /// Speichert sofort beide Richtungen
    pub async fn save_now(&self) -> QueueResult<()> {
        self.innen.speichern().await
    }

    /// Beendet alle Hintergrund-Tasks und speichert ein letztes Mal
    ///
    /// Nach der Rueckkehr laeuft kein Task des Managers mehr. Weitere
    /// Aufrufe sind wirkungslos.
    pub async fn shutdown(&self) -> QueueResult<()> {
        if self.heruntergefahren.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.abbruch.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Queue-Task endete mit Fehler");
            }
        }

        let ergebnis = self.innen.speichern().await;
        tracing::info!("Queue-Manager heruntergefahren");
        ergebnis
    }

    pub fn ist_heruntergefahren(&self) -> bool {
        self.heruntergefahren.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Delegierte Queue-Operationen
    // -----------------------------------------------------------------------

    pub fn enqueue_outgoing(&self, peer: PeerId, message: RatchetMessage, priority: u8) -> MessageId {
        let id = self.innen.queue.enqueue_outgoing(peer, message, priority);
        self.speichern_planen();
        id
    }

    pub fn dequeue_outgoing(&self, peer: Option<&PeerId>) -> Option<QueuedMessage> {
        let eintrag = self.innen.queue.dequeue_outgoing(peer);
        if eintrag.is_some() {
            self.speichern_planen();
        }
        eintrag
    }

    pub fn mark_outgoing_sent(&self, id: &MessageId) -> bool {
        let entfernt = self.innen.queue.mark_outgoing_sent(id);
        self.speichern_planen();
        entfernt
    }

    pub fn mark_outgoing_failed(&self, id: &MessageId, retry: bool) -> Option<MessageStatus> {
        let status = self.innen.queue.mark_outgoing_failed(id, retry);
        self.speichern_planen();
        status
    }

    pub fn enqueue_incoming(&self, peer: PeerId, message: RatchetMessage) -> MessageId {
        let id = self.innen.queue.enqueue_incoming(peer, message);
        self.speichern_planen();
        id
    }

    pub fn dequeue_incoming(&self, peer: Option<&PeerId>) -> Option<QueuedMessage> {
        let eintrag = self.innen.queue.dequeue_incoming(peer);
        if eintrag.is_some() {
            self.speichern_planen();
        }
        eintrag
    }

    pub fn mark_incoming_processed(&self, id: &MessageId) -> bool {
        let entfernt = self.innen.queue.mark_incoming_processed(id);
        self.speichern_planen();
        entfernt
    }

    pub fn mark_incoming_failed(&self, id: &MessageId) -> Option<MessageStatus> {
        let status = self.innen.queue.mark_incoming_failed(id);
        self.speichern_planen();
        status
    }

    pub fn purge_failed_outgoing(&self) -> Vec<QueuedMessage> {
        let entfernt = self.innen.queue.purge_failed_outgoing();
        if !entfernt.is_empty() {
            self.speichern_planen();
        }
        entfernt
    }

    pub fn pending_outgoing_for(&self, peer: &PeerId) -> usize {
        self.innen.queue.pending_outgoing_for(peer)
    }

    pub fn get_statistics(&self) -> QueueStatistik {
        self.innen.queue.get_statistics()
    }

    /// Direkter Lesezugriff auf die Queue
    pub fn queue(&self) -> &MessageQueue {
        &self.innen.queue
    }
}

impl Drop for PersistentQueueManager {
    fn drop(&mut self) {
        self.abbruch.cancel();
    }
}

impl std::fmt::Debug for PersistentQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentQueueManager")
            .field("queue", &self.innen.queue)
            .field("optionen", &self.optionen)
            .field("heruntergefahren", &self.ist_heruntergefahren())
            .finish()
    }
}
