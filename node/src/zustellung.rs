//! Zustellung an einen einzelnen Peer
//!
//! Pro Peer laeuft eine Schleife, die die Verbindung haelt und die
//! ausgehende Queue in den Data-Channel leert. Die Rolle folgt der
//! Reihenfolge der Peer-IDs: die kleinere ID sendet das Offer, die groessere
//! wartet darauf. Die Ratchet-Sitzungen haengen davon nicht ab, jede Seite
//! darf jederzeit eine neue eroeffnen.
//!
//! Gescheiterte Verbindungsaufbauten werden gezaehlt. Nach
//! `max_reconnects` aufeinanderfolgenden Fehlschlaegen gibt die Zustellung
//! auf, bis dahin liegt zwischen zwei Versuchen eine feste Pause.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use geheimpost_core::{NetzwerkStatus, PeerId, RatchetMessage};
use geheimpost_observability::metrics::EINGEHEND;
use geheimpost_observability::GeheimpostMetrics;
use geheimpost_queue::{MessageStatus, PersistentQueueManager};
use geheimpost_transport::{TransportError, TransportEreignis, TransportSession};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ZustellungsEinstellungen;
use crate::KnotenEreignis;

/// Wer die Verbindung aufbaut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rolle {
    /// Sendet das Offer
    Anbieter,
    /// Beantwortet das Offer
    Annehmer,
}

impl Rolle {
    pub fn bestimmen(eigene_id: &PeerId, remote: &PeerId) -> Self {
        if eigene_id < remote {
            Self::Anbieter
        } else {
            Self::Annehmer
        }
    }
}

/// Was alle Zustellungen eines Knotens teilen
#[derive(Clone)]
pub struct ZustellKontext {
    pub queue: Arc<PersistentQueueManager>,
    pub netz: Arc<dyn NetzwerkStatus>,
    pub metriken: GeheimpostMetrics,
    pub einstellungen: ZustellungsEinstellungen,
    /// Weckt die Verarbeitung eingehender Nachrichten
    pub eingang: Arc<Notify>,
    pub ereignis_tx: mpsc::Sender<KnotenEreignis>,
}

/// Ergebnis eines gescheiterten Aufbaus
enum Aufbau {
    /// Annehmer: im Fenster kam kein Offer, zaehlt nicht als Fehlschlag
    Leerlauf,
    Fehler(TransportError),
}

/// Verbindung und Ausgangs-Queue fuer genau einen Peer
pub struct PeerZustellung {
    peer: PeerId,
    rolle: Rolle,
    session: TransportSession,
    kontext: ZustellKontext,
    annahme_fenster: Duration,
    fehlversuche: AtomicU32,
    wecker: Notify,
    transport_rx: Mutex<Option<mpsc::Receiver<TransportEreignis>>>,
}

impl PeerZustellung {
    pub fn neu(
        eigene_id: &PeerId,
        peer: PeerId,
        session: TransportSession,
        annahme_fenster: Duration,
        kontext: ZustellKontext,
    ) -> Self {
        let rolle = Rolle::bestimmen(eigene_id, &peer);
        let transport_rx = session.ereignisse();
        Self {
            peer,
            rolle,
            session,
            kontext,
            annahme_fenster,
            fehlversuche: AtomicU32::new(0),
            wecker: Notify::new(),
            transport_rx: Mutex::new(transport_rx),
        }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn rolle(&self) -> Rolle {
        self.rolle
    }

    /// Aufeinanderfolgende gescheiterte Verbindungsaufbauten
    pub fn fehlversuche(&self) -> u32 {
        self.fehlversuche.load(Ordering::SeqCst)
    }

    pub fn ist_verbunden(&self) -> bool {
        self.session.ist_verbunden()
    }

    /// Meldet neue ausgehende Nachrichten
    pub fn wecken(&self) {
        self.wecker.notify_one();
    }

    /// Startet Zustell-Schleife und Ereignis-Task
    pub fn starten(self: &Arc<Self>, abbruch: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![tokio::spawn(self.clone().ausfuehren(abbruch.clone()))];
        match self.transport_rx.lock().take() {
            Some(rx) => tasks.push(tokio::spawn(self.clone().ereignisse_verarbeiten(rx, abbruch))),
            None => tracing::warn!(peer = %self.peer, "Transport-Ereignisse bereits vergeben"),
        }
        tasks
    }

    pub async fn trennen(&self) {
        self.session.disconnect().await;
    }

    // -----------------------------------------------------------------------
    // Verbindung halten
    // -----------------------------------------------------------------------

    async fn ausfuehren(self: Arc<Self>, abbruch: CancellationToken) {
        tracing::info!(peer = %self.peer, rolle = ?self.rolle, "Zustellung gestartet");

        while !abbruch.is_cancelled() {
            if !self.netz_bereit() {
                tracing::debug!(peer = %self.peer, "Kein P2P-faehiges Netz, warte");
                if !self.pausieren(&abbruch).await {
                    break;
                }
                continue;
            }

            let beginn = Instant::now();
            let ergebnis = tokio::select! {
                _ = abbruch.cancelled() => break,
                ergebnis = self.verbindung_herstellen() => ergebnis,
            };

            match ergebnis {
                Ok(()) => {
                    self.kontext
                        .metriken
                        .verbindungsaufbau(true, beginn.elapsed().as_secs_f64());
                    self.fehlversuche.store(0, Ordering::SeqCst);
                    self.zustellen(&abbruch).await;
                    if abbruch.is_cancelled() {
                        break;
                    }
                    self.kontext.metriken.transport_reconnects_total.inc();
                    tracing::info!(peer = %self.peer, "Verbindung verloren, baue neu auf");
                }
                Err(Aufbau::Leerlauf) => {
                    tracing::debug!(peer = %self.peer, "Kein Offer erhalten, erneuere Annahme");
                }
                Err(Aufbau::Fehler(e)) => {
                    self.kontext.metriken.verbindungsaufbau(false, 0.0);
                    let versuche = self.fehlversuche.fetch_add(1, Ordering::SeqCst) + 1;
                    let maximum = self.kontext.einstellungen.max_reconnects;
                    tracing::warn!(
                        peer = %self.peer,
                        versuche,
                        maximum,
                        fehler = %e,
                        "Verbindungsaufbau gescheitert"
                    );
                    if versuche >= maximum {
                        tracing::error!(peer = %self.peer, "Zustellung aufgegeben");
                        self.melden(KnotenEreignis::Aufgegeben(self.peer.clone()));
                        break;
                    }
                }
            }

            self.session.disconnect().await;
            if !self.pausieren(&abbruch).await {
                break;
            }
        }

        self.session.disconnect().await;
        tracing::debug!(peer = %self.peer, "Zustellung beendet");
    }

    async fn verbindung_herstellen(&self) -> Result<(), Aufbau> {
        match self.rolle {
            Rolle::Anbieter => self
                .session
                .connect(self.peer.clone())
                .await
                .map_err(Aufbau::Fehler),
            Rolle::Annehmer => {
                self.session.annehmen_starten().await.map_err(Aufbau::Fehler)?;
                match self.session.verbunden_abwarten(self.annahme_fenster).await {
                    Ok(()) => {}
                    Err(TransportError::Zeitlimit(_)) => return Err(Aufbau::Leerlauf),
                    Err(e) => return Err(Aufbau::Fehler(e)),
                }
                match self.session.remote_peer() {
                    Some(remote) if remote == self.peer => Ok(()),
                    remote => Err(Aufbau::Fehler(TransportError::Protokoll(format!(
                        "Offer von unerwartetem Peer {remote:?}"
                    )))),
                }
            }
        }
    }

    /// Leert die Queue solange der Kanal offen ist
    async fn zustellen(&self, abbruch: &CancellationToken) {
        let mut zustand = self.session.zustand_beobachten();
        loop {
            if !self.session.ist_verbunden() || !self.ausgang_leeren().await {
                return;
            }
            tokio::select! {
                biased;
                _ = abbruch.cancelled() => return,
                geaendert = zustand.changed() => {
                    if geaendert.is_err() || !self.session.ist_verbunden() {
                        return;
                    }
                }
                _ = self.wecker.notified() => {}
                _ = tokio::time::sleep(self.kontext.einstellungen.abfrage_intervall()) => {}
            }
        }
    }

    /// Sendet alle wartenden Nachrichten, `false` wenn ein Senden scheitert
    async fn ausgang_leeren(&self) -> bool {
        let queue = &self.kontext.queue;
        let metriken = &self.kontext.metriken;

        while let Some(eintrag) = queue.dequeue_outgoing(Some(&self.peer)) {
            match self.session.send_message(&eintrag.message.to_base64()).await {
                Ok(()) => {
                    queue.mark_outgoing_sent(&eintrag.id);
                    metriken.messages_sent_total.inc();
                    tracing::debug!(peer = %self.peer, id = %eintrag.id, "Nachricht zugestellt");
                }
                Err(e) => {
                    metriken.send_failures_total.inc();
                    tracing::warn!(peer = %self.peer, id = %eintrag.id, fehler = %e, "Senden fehlgeschlagen");
                    if queue.mark_outgoing_failed(&eintrag.id, true) == Some(MessageStatus::Failed) {
                        metriken.queue_failed_total.inc();
                        self.melden(KnotenEreignis::Gescheitert {
                            peer: self.peer.clone(),
                            id: eintrag.id,
                        });
                    }
                    return false;
                }
            }
        }
        true
    }

    fn netz_bereit(&self) -> bool {
        self.kontext.netz.ist_netzwerk_verfuegbar() && self.kontext.netz.ist_p2p_faehig()
    }

    /// Feste Pause, `false` bei Abbruch
    async fn pausieren(&self, abbruch: &CancellationToken) -> bool {
        tokio::select! {
            _ = abbruch.cancelled() => false,
            _ = tokio::time::sleep(self.kontext.einstellungen.reconnect_pause()) => true,
        }
    }

    fn melden(&self, ereignis: KnotenEreignis) {
        if let Err(e) = self.kontext.ereignis_tx.try_send(ereignis) {
            tracing::debug!(fehler = %e, "Knoten-Ereignis verworfen");
        }
    }

    // -----------------------------------------------------------------------
    // Transport-Ereignisse
    // -----------------------------------------------------------------------

    async fn ereignisse_verarbeiten(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<TransportEreignis>,
        abbruch: CancellationToken,
    ) {
        let mut verbunden = false;
        loop {
            let ereignis = tokio::select! {
                biased;
                _ = abbruch.cancelled() => break,
                ereignis = rx.recv() => match ereignis {
                    Some(ereignis) => ereignis,
                    None => break,
                },
            };

            match ereignis {
                TransportEreignis::NachrichtEmpfangen { peer, text } => {
                    self.eingang_aufnehmen(peer, &text);
                }
                TransportEreignis::Verbunden(peer) => {
                    if !verbunden {
                        verbunden = true;
                        self.kontext.metriken.connected_peers.inc();
                    }
                    tracing::info!(peer = %peer, "Data-Channel offen");
                    self.melden(KnotenEreignis::Verbunden(peer));
                }
                TransportEreignis::Getrennt => {
                    if verbunden {
                        verbunden = false;
                        self.kontext.metriken.connected_peers.dec();
                    }
                    self.melden(KnotenEreignis::Getrennt(self.peer.clone()));
                }
                TransportEreignis::ZustandGeaendert(zustand) => {
                    tracing::trace!(peer = %self.peer, zustand = %zustand, "Transport-Zustand");
                }
            }
        }

        if verbunden {
            self.kontext.metriken.connected_peers.dec();
        }
    }

    fn eingang_aufnehmen(&self, peer: PeerId, text: &str) {
        if peer != self.peer {
            tracing::warn!(von = %peer, erwartet = %self.peer, "Nachricht eines fremden Peers verworfen");
            return;
        }
        match RatchetMessage::from_base64(text) {
            Ok(nachricht) => {
                let id = self.kontext.queue.enqueue_incoming(peer, nachricht);
                self.kontext
                    .metriken
                    .queue_enqueued_total
                    .with_label_values(&[EINGEHEND])
                    .inc();
                tracing::debug!(peer = %self.peer, id = %id, "Nachricht empfangen");
                self.kontext.eingang.notify_one();
            }
            Err(e) => {
                self.kontext.metriken.decrypt_failures_total.inc();
                tracing::warn!(peer = %self.peer, fehler = %e, "Ungueltige Nachricht verworfen");
            }
        }
    }
}

impl std::fmt::Debug for PeerZustellung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerZustellung")
            .field("peer", &self.peer)
            .field("rolle", &self.rolle)
            .field("session", &self.session)
            .field("fehlversuche", &self.fehlversuche())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kleinere_id_bietet_an() {
        let a = PeerId::from("peerA");
        let b = PeerId::from("peerB");
        assert_eq!(Rolle::bestimmen(&a, &b), Rolle::Anbieter);
        assert_eq!(Rolle::bestimmen(&b, &a), Rolle::Annehmer);
    }
}
