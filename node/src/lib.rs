//! geheimpost-node – Koordinator
//!
//! Verbindet Ratchet, persistente Queue und Transport zu einem Knoten:
//!
//! - `nachricht_senden` verschluesselt mit der Ratchet-Sitzung des Peers und
//!   reiht das Chiffrat in die ausgehende Queue ein (gelingt auch offline)
//! - die Ratchet-Sitzungen liegen verschluesselt neben den Queue-Snapshots
//! - pro Peer haelt eine `PeerZustellung` die Verbindung und leert die Queue
//! - empfangene Chiffrate landen in der eingehenden Queue und werden von
//!   einer eigenen Schleife entschluesselt und als `KnotenEreignis` gemeldet

pub mod config;
pub mod error;
pub mod ratchet_ablage;
pub mod zustellung;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use geheimpost_core::{ImmerVerfuegbar, MessageId, NetzwerkStatus, PeerId};
use geheimpost_crypto::hkdf::derive_secrets;
use geheimpost_crypto::{
    CryptoError, RatchetVerwaltung, RuhendeVerschluesselung, SecretBytes, X25519KeyPair,
};
use geheimpost_observability::metrics::AUSGEHEND;
use geheimpost_observability::GeheimpostMetrics;
use geheimpost_queue::{
    DateiBackend, PersistentQueueManager, QueueStatistik, SnapshotBackend, Wiederhergestellt,
    PRIORITAET_NORMAL,
};
use geheimpost_transport::{PeerPlattform, SignalingConnector, TransportSession};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::{base64_dekodieren, NodeConfig};
pub use error::{KnotenError, KnotenResult};
use ratchet_ablage::RatchetAblage;
use zustellung::{PeerZustellung, ZustellKontext};

/// HKDF-Info fuer den aus dem Identitaetsschluessel abgeleiteten Ablage-Schluessel
const INFO_ABLAGE: &[u8] = b"GeheimpostAblage";
/// Kapazitaet des Knoten-Ereignis-Stroms
const EREIGNIS_PUFFER: usize = 256;

/// Was der Knoten nach aussen meldet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnotenEreignis {
    /// Entschluesselte Nachricht eines Peers
    Klartext { peer: PeerId, text: String },
    Verbunden(PeerId),
    Getrennt(PeerId),
    /// Ausgehende Nachricht endgueltig gescheitert
    Gescheitert { peer: PeerId, id: MessageId },
    /// Zustellung an den Peer nach zu vielen Fehlschlaegen eingestellt
    Aufgegeben(PeerId),
}

/// Ein laufender Geheimpost-Knoten
pub struct Knoten {
    eigene_id: PeerId,
    oeffentlicher_schluessel: [u8; 32],
    config: NodeConfig,
    queue: Arc<PersistentQueueManager>,
    ratchet: Arc<RatchetVerwaltung>,
    ratchet_ablage: Arc<RatchetAblage>,
    metriken: GeheimpostMetrics,
    zustellungen: BTreeMap<PeerId, Arc<PeerZustellung>>,
    eingang: Arc<Notify>,
    ereignis_tx: mpsc::Sender<KnotenEreignis>,
    ereignis_rx: Mutex<Option<mpsc::Receiver<KnotenEreignis>>>,
    abbruch: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    gestartet: AtomicBool,
    heruntergefahren: AtomicBool,
}

impl Knoten {
    /// Erstellt einen Knoten, der das Netz immer als verfuegbar ansieht
    pub fn neu(
        config: NodeConfig,
        plattform: Arc<dyn PeerPlattform>,
        connector: Arc<dyn SignalingConnector>,
    ) -> KnotenResult<Self> {
        Self::mit_netzwerkstatus(config, plattform, connector, Arc::new(ImmerVerfuegbar))
    }

    pub fn mit_netzwerkstatus(
        config: NodeConfig,
        plattform: Arc<dyn PeerPlattform>,
        connector: Arc<dyn SignalingConnector>,
        netz: Arc<dyn NetzwerkStatus>,
    ) -> KnotenResult<Self> {
        let eigene_id = config.eigene_id();
        if eigene_id.as_str().is_empty() {
            return Err(KnotenError::Konfiguration("knoten.peer_id ist leer".into()));
        }

        let paar = identitaet_laden(&config)?;
        let ablage = Arc::new(RuhendeVerschluesselung::neu(
            ablage_schluessel(&config, &paar)?.as_bytes(),
        )?);
        let backend: Arc<dyn SnapshotBackend> =
            Arc::new(DateiBackend::new(config.queue.verzeichnis.clone()));
        let metriken =
            GeheimpostMetrics::neu().map_err(|e| KnotenError::Metriken(e.to_string()))?;

        let queue = Arc::new(PersistentQueueManager::neu(
            backend.clone(),
            ablage.clone(),
            config.queue.persistenz_optionen(),
        ));

        let (ereignis_tx, ereignis_rx) = mpsc::channel(EREIGNIS_PUFFER);
        let eingang = Arc::new(Notify::new());
        let kontext = ZustellKontext {
            queue: queue.clone(),
            netz,
            metriken: metriken.clone(),
            einstellungen: config.zustellung.clone(),
            eingang: eingang.clone(),
            ereignis_tx: ereignis_tx.clone(),
        };

        let ratchet = Arc::new(RatchetVerwaltung::new());
        let mut zustellungen = BTreeMap::new();
        for (peer, schluessel) in config.peer_schluessel()? {
            if peer == eigene_id {
                return Err(KnotenError::Konfiguration(format!(
                    "peers enthaelt die eigene ID {peer}"
                )));
            }
            ratchet.peer_einrichten(peer.clone(), paar.clone(), &schluessel)?;

            let session =
                TransportSession::new(config.transport.clone(), plattform.clone(), connector.clone());
            let zustellung = PeerZustellung::neu(
                &eigene_id,
                peer.clone(),
                session,
                config.transport.gesamt_timeout(),
                kontext.clone(),
            );
            tracing::debug!(peer = %peer, rolle = ?zustellung.rolle(), "Peer eingerichtet");
            zustellungen.insert(peer, Arc::new(zustellung));
        }

        let ratchet_ablage = Arc::new(RatchetAblage::neu(ratchet.clone(), backend, ablage));

        Ok(Self {
            eigene_id,
            oeffentlicher_schluessel: paar.public_key_bytes(),
            config,
            queue,
            ratchet,
            ratchet_ablage,
            metriken,
            zustellungen,
            eingang,
            ereignis_tx,
            ereignis_rx: Mutex::new(Some(ereignis_rx)),
            abbruch: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            gestartet: AtomicBool::new(false),
            heruntergefahren: AtomicBool::new(false),
        })
    }

    pub fn eigene_id(&self) -> &PeerId {
        &self.eigene_id
    }

    /// Oeffentlicher X25519-Schluessel, den Peers in ihre Konfiguration eintragen
    pub fn oeffentlicher_schluessel(&self) -> [u8; 32] {
        self.oeffentlicher_schluessel
    }

    pub fn peers(&self) -> Vec<PeerId> {
        self.zustellungen.keys().cloned().collect()
    }

    pub fn ist_verbunden(&self, peer: &PeerId) -> bool {
        self.zustellungen
            .get(peer)
            .is_some_and(|zustellung| zustellung.ist_verbunden())
    }

    pub fn metriken(&self) -> &GeheimpostMetrics {
        &self.metriken
    }

    pub fn statistik(&self) -> QueueStatistik {
        self.queue.get_statistics()
    }

    /// Ereignis-Strom des Knotens (nur einmal abholbar)
    pub fn ereignisse(&self) -> Option<mpsc::Receiver<KnotenEreignis>> {
        self.ereignis_rx.lock().take()
    }

    /// Stellt die Queue wieder her und startet alle Hintergrund-Tasks
    pub async fn starten(&self) -> KnotenResult<Wiederhergestellt> {
        if self.heruntergefahren.load(Ordering::SeqCst) {
            return Err(KnotenError::Heruntergefahren);
        }
        if self.gestartet.swap(true, Ordering::SeqCst) {
            return Err(KnotenError::BereitsGestartet);
        }

        let wiederhergestellt = self
            .queue
            .initialize(self.config.queue.auto_restore, self.config.queue.autosave)
            .await;
        let sitzungen = self.ratchet_ablage.laden().await;

        let mut tasks = self.tasks.lock();
        tasks.push(self.ratchet_ablage.schreiber_starten(self.abbruch.child_token()));
        tasks.push(tokio::spawn(eingang_verarbeiten(
            self.queue.clone(),
            self.ratchet.clone(),
            self.ratchet_ablage.clone(),
            self.metriken.clone(),
            self.eingang.clone(),
            self.ereignis_tx.clone(),
            self.config.zustellung.abfrage_intervall(),
            self.abbruch.child_token(),
        )));
        for zustellung in self.zustellungen.values() {
            tasks.extend(zustellung.starten(self.abbruch.child_token()));
        }

        tracing::info!(
            peer = %self.eigene_id,
            peers = self.zustellungen.len(),
            ausgehend = wiederhergestellt.ausgehend,
            eingehend = wiederhergestellt.eingehend,
            sitzungen,
            "Knoten gestartet"
        );
        Ok(wiederhergestellt)
    }

    /// Verschluesselt `text` fuer `peer` und reiht ihn zur Zustellung ein
    pub fn nachricht_senden(&self, peer: &PeerId, text: &str) -> KnotenResult<MessageId> {
        self.nachricht_senden_mit_prioritaet(peer, text, PRIORITAET_NORMAL)
    }

    /// Wie `nachricht_senden`, 0 ist die hoechste Prioritaet
    pub fn nachricht_senden_mit_prioritaet(
        &self,
        peer: &PeerId,
        text: &str,
        prioritaet: u8,
    ) -> KnotenResult<MessageId> {
        if self.heruntergefahren.load(Ordering::SeqCst) {
            return Err(KnotenError::Heruntergefahren);
        }
        let zustellung = self
            .zustellungen
            .get(peer)
            .ok_or_else(|| KnotenError::UnbekannterPeer(peer.to_string()))?;

        let nachricht = self.ratchet.verschluesseln(peer, text.as_bytes())?;
        self.ratchet_ablage.vormerken();
        let id = self.queue.enqueue_outgoing(peer.clone(), nachricht, prioritaet);
        self.metriken
            .queue_enqueued_total
            .with_label_values(&[AUSGEHEND])
            .inc();
        tracing::debug!(peer = %peer, id = %id, prioritaet, "Nachricht eingereiht");

        zustellung.wecken();
        Ok(id)
    }

    /// Trennt alle Verbindungen, speichert Sitzungen und Queue (idempotent)
    pub async fn herunterfahren(&self) -> KnotenResult<()> {
        if self.heruntergefahren.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(peer = %self.eigene_id, "Knoten wird heruntergefahren");

        self.abbruch.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Knoten-Task endete mit Fehler");
            }
        }
        for zustellung in self.zustellungen.values() {
            zustellung.trennen().await;
        }

        // Ohne vorheriges Laden wuerde ein leerer Stand den gespeicherten ersetzen
        let sitzungen = if self.gestartet.load(Ordering::SeqCst) {
            self.ratchet_ablage.speichern().await
        } else {
            Ok(())
        };
        self.queue.shutdown().await?;
        sitzungen?;
        tracing::info!(peer = %self.eigene_id, "Knoten heruntergefahren");
        Ok(())
    }
}

impl Drop for Knoten {
    fn drop(&mut self) {
        self.abbruch.cancel();
    }
}

impl std::fmt::Debug for Knoten {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Knoten")
            .field("eigene_id", &self.eigene_id)
            .field("peers", &self.peers())
            .finish_non_exhaustive()
    }
}

fn identitaet_laden(config: &NodeConfig) -> KnotenResult<X25519KeyPair> {
    match &config.knoten.privater_schluessel {
        Some(wert) => {
            let bytes = base64_dekodieren(wert, "knoten.privater_schluessel")?;
            Ok(X25519KeyPair::from_private_key(&bytes)?)
        }
        None => {
            tracing::warn!("Kein privater Schluessel konfiguriert, verwende fluechtigen Schluessel");
            Ok(X25519KeyPair::generate())
        }
    }
}

/// Konfigurierter Ablage-Schluessel oder Ableitung aus dem Identitaetsschluessel
fn ablage_schluessel(config: &NodeConfig, paar: &X25519KeyPair) -> KnotenResult<SecretBytes> {
    if let Some(wert) = &config.queue.schluessel {
        return Ok(SecretBytes::new(base64_dekodieren(wert, "queue.schluessel")?));
    }
    let privat = paar
        .private_key_bytes()
        .ok_or(CryptoError::NurOeffentlicherSchluessel)?;
    Ok(derive_secrets(&[], privat, INFO_ABLAGE, 32)?)
}

/// Entschluesselt eingehende Nachrichten in Queue-Reihenfolge
async fn eingang_verarbeiten(
    queue: Arc<PersistentQueueManager>,
    ratchet: Arc<RatchetVerwaltung>,
    ratchet_ablage: Arc<RatchetAblage>,
    metriken: GeheimpostMetrics,
    wecker: Arc<Notify>,
    ereignis_tx: mpsc::Sender<KnotenEreignis>,
    intervall: std::time::Duration,
    abbruch: CancellationToken,
) {
    loop {
        while let Some(eintrag) = queue.dequeue_incoming(None) {
            let klartext = ratchet
                .entschluesseln(&eintrag.peer_id, &eintrag.message)
                .inspect(|_| ratchet_ablage.vormerken())
                .and_then(|bytes| {
                    String::from_utf8(bytes)
                        .map_err(|e| CryptoError::UngueltigeDaten(format!("kein UTF-8: {e}")))
                });

            match klartext {
                Ok(text) => {
                    let ereignis = KnotenEreignis::Klartext {
                        peer: eintrag.peer_id.clone(),
                        text,
                    };
                    tokio::select! {
                        biased;
                        _ = abbruch.cancelled() => return,
                        ergebnis = ereignis_tx.send(ereignis) => {
                            if ergebnis.is_err() {
                                tracing::debug!("Kein Ereignis-Empfaenger, Klartext verworfen");
                            }
                        }
                    }
                    queue.mark_incoming_processed(&eintrag.id);
                }
                Err(e) => {
                    metriken.decrypt_failures_total.inc();
                    tracing::warn!(
                        peer = %eintrag.peer_id,
                        id = %eintrag.id,
                        fehler = %e,
                        "Eingehende Nachricht abgelehnt"
                    );
                    queue.mark_incoming_failed(&eintrag.id);
                }
            }
        }

        let statistik = queue.get_statistics();
        metriken.queue_stand(statistik.ausgehend.wartend, statistik.eingehend.wartend);

        tokio::select! {
            biased;
            _ = abbruch.cancelled() => return,
            _ = wecker.notified() => {}
            _ = tokio::time::sleep(intervall) => {}
        }
    }
}
