//! Transport-Session: Verbindungsaufbau zu genau einem Peer
//!
//! Ablauf auf der Offer-Seite (`connect`):
//!
//! 1. Signaling verbinden (begrenzte Versuche mit fester Pause)
//! 2. Peer-Verbindung erstellen (STUN, Unified-Plan)
//! 3. Geordneten Data-Channel erstellen
//! 4. Offer erstellen, lokal setzen, senden
//! 5. Auf die Answer warten (Zeitlimit)
//! 6. Remote-Description setzen, gepufferte Kandidaten anwenden
//! 7. Warten bis der Data-Channel offen ist
//!
//! Die Answer-Seite (`annehmen_starten`) verbindet nur das Signaling und
//! beantwortet das erste eingehende Offer im Hintergrund.
//!
//! Pro aktiver Verbindung laufen drei Tasks: Signaling-Empfang,
//! Plattform-Ereignisse und der Kandidaten-Task. Alle enden mit dem
//! Abbruch-Token und werden von `disconnect()` abgewartet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use geheimpost_core::PeerId;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::TransportKonfiguration;
use crate::error::{TransportError, TransportResult};
use crate::kandidaten::{KandidatenBefehl, KandidatenPuffer};
use crate::plattform::{DatenKanal, PeerEreignis, PeerPlattform, PeerVerbindung, SdpTyp};
use crate::signaling::{SignalingConnector, SignalingNachricht, SignalingTyp, SignalingVerbindung};

/// Kapazitaet des Kandidaten-Kanals
const KANDIDATEN_PUFFER: usize = 64;
/// Kapazitaet des Kanals fuer Offer/Answer/Fehler-Frames
const BESCHREIBUNG_PUFFER: usize = 4;

/// Zustand einer Session
///
/// Die Reihenfolge der Varianten entspricht dem Fortschritt des Aufbaus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransportZustand {
    Disconnected,
    SignalingConnecting,
    SignalingConnected,
    OfferSent,
    RemoteDescriptionSet,
    /// Data-Channel offen
    Connected,
}

impl std::fmt::Display for TransportZustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::SignalingConnecting => "signaling_connecting",
            Self::SignalingConnected => "signaling_connected",
            Self::OfferSent => "offer_sent",
            Self::RemoteDescriptionSet => "remote_description_set",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Ereignisse einer Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEreignis {
    /// Text vom Data-Channel
    NachrichtEmpfangen { peer: PeerId, text: String },
    /// Data-Channel ist offen
    Verbunden(PeerId),
    /// Eine bestehende Verbindung wurde beendet
    Getrennt,
    ZustandGeaendert(TransportZustand),
}

/// Offer, Answer oder Fehler der Gegenstelle
#[derive(Debug)]
enum RemoteBeschreibung {
    Offer { peer: PeerId, sdp: String },
    Answer(String),
    Fehler(String),
}

/// Zustand, den Session und Hintergrund-Tasks teilen
struct Geteilt {
    zustand_tx: watch::Sender<TransportZustand>,
    ereignis_tx: mpsc::Sender<TransportEreignis>,
    kanal: Mutex<Option<Arc<dyn DatenKanal>>>,
    remote: Mutex<Option<PeerId>>,
    /// Wegen vollem Puffer verworfene Ereignisse
    verworfen: AtomicU64,
}

impl Geteilt {
    fn zustand(&self) -> TransportZustand {
        *self.zustand_tx.borrow()
    }

    fn remote(&self) -> Option<PeerId> {
        self.remote.lock().clone()
    }

    /// Ereignis ohne Warten abgeben
    ///
    /// Aufrufer sind teils synchron. Bei vollem Puffer geht das Ereignis
    /// verloren, das wird gezaehlt und gewarnt. Der Zustand selbst bleibt
    /// ueber `zustand_beobachten` verlaesslich.
    fn melden(&self, ereignis: TransportEreignis) {
        match self.ereignis_tx.try_send(ereignis) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(ereignis)) => {
                let anzahl = self.verworfen.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(?ereignis, verworfen = anzahl, "Ereignis-Puffer voll, Transport-Ereignis verworfen");
            }
            Err(mpsc::error::TrySendError::Closed(ereignis)) => {
                tracing::debug!(?ereignis, "Kein Ereignis-Empfaenger mehr");
            }
        }
    }

    /// Setzt den Zustand unbedingt
    fn zustand_setzen(&self, neu: TransportZustand) {
        let alt = self.zustand_tx.send_replace(neu);
        if alt == neu {
            return;
        }
        tracing::debug!(von = %alt, nach = %neu, "Transport-Zustand");
        self.melden(TransportEreignis::ZustandGeaendert(neu));
        if alt == TransportZustand::Connected && neu == TransportZustand::Disconnected {
            self.melden(TransportEreignis::Getrennt);
        }
    }

    /// Nur vorwaerts, nie aus `Disconnected` heraus
    fn zustand_vorruecken(&self, neu: TransportZustand) -> bool {
        let geaendert = self.zustand_tx.send_if_modified(|z| {
            if *z != TransportZustand::Disconnected && neu > *z {
                *z = neu;
                true
            } else {
                false
            }
        });
        if geaendert {
            tracing::debug!(nach = %neu, "Transport-Zustand");
            self.melden(TransportEreignis::ZustandGeaendert(neu));
            if neu == TransportZustand::Connected {
                if let Some(peer) = self.remote() {
                    tracing::info!(peer = %peer, "Data-Channel offen");
                    self.melden(TransportEreignis::Verbunden(peer));
                }
            }
        }
        geaendert
    }
}

/// Ressourcen einer laufenden Verbindung
struct AktiveVerbindung {
    pc: Arc<dyn PeerVerbindung>,
    signaling_tx: mpsc::Sender<SignalingNachricht>,
    kandidaten_tx: mpsc::Sender<KandidatenBefehl>,
    signaling_abbruch: CancellationToken,
    abbruch: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Verbindung zu einem Peer ueber Signaling und Data-Channel
pub struct TransportSession {
    konfig: TransportKonfiguration,
    plattform: Arc<dyn PeerPlattform>,
    connector: Arc<dyn SignalingConnector>,
    geteilt: Arc<Geteilt>,
    aktiv: Mutex<Option<AktiveVerbindung>>,
    ereignis_rx: Mutex<Option<mpsc::Receiver<TransportEreignis>>>,
}

impl TransportSession {
    pub fn new(
        konfig: TransportKonfiguration,
        plattform: Arc<dyn PeerPlattform>,
        connector: Arc<dyn SignalingConnector>,
    ) -> Self {
        let (zustand_tx, _) = watch::channel(TransportZustand::Disconnected);
        let (ereignis_tx, ereignis_rx) = mpsc::channel(konfig.ereignis_puffer.max(1));
        Self {
            konfig,
            plattform,
            connector,
            geteilt: Arc::new(Geteilt {
                zustand_tx,
                ereignis_tx,
                kanal: Mutex::new(None),
                remote: Mutex::new(None),
                verworfen: AtomicU64::new(0),
            }),
            aktiv: Mutex::new(None),
            ereignis_rx: Mutex::new(Some(ereignis_rx)),
        }
    }

    pub fn zustand(&self) -> TransportZustand {
        self.geteilt.zustand()
    }

    /// Beobachter fuer Zustandswechsel
    pub fn zustand_beobachten(&self) -> watch::Receiver<TransportZustand> {
        self.geteilt.zustand_tx.subscribe()
    }

    /// Ereignis-Stream der Session (nur einmal abholbar)
    pub fn ereignisse(&self) -> Option<mpsc::Receiver<TransportEreignis>> {
        self.ereignis_rx.lock().take()
    }

    pub fn remote_peer(&self) -> Option<PeerId> {
        self.geteilt.remote()
    }

    pub fn ist_verbunden(&self) -> bool {
        self.zustand() == TransportZustand::Connected
    }

    /// Anzahl wegen vollem Puffer verworfener Ereignisse
    pub fn verworfene_ereignisse(&self) -> u64 {
        self.geteilt.verworfen.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Offer-Seite
    // -----------------------------------------------------------------------

    /// Baut die Verbindung zu `peer` auf
    ///
    /// Kehrt erst zurueck, wenn der Data-Channel offen ist. Jeder Fehler
    /// raeumt alle Ressourcen auf und hinterlaesst `Disconnected`.
    pub async fn connect(&self, peer: PeerId) -> TransportResult<()> {
        self.starten()?;
        // Reste einer von der Gegenstelle beendeten Verbindung
        self.ressourcen_freigeben().await;
        tracing::info!(peer = %peer, "Verbindungsaufbau");

        let ergebnis = match tokio::time::timeout(
            self.konfig.gesamt_timeout(),
            self.verbindungsaufbau(peer.clone()),
        )
        .await
        {
            Ok(ergebnis) => ergebnis,
            Err(_) => Err(TransportError::Zeitlimit("Verbindungsaufbau".into())),
        };

        if let Err(e) = &ergebnis {
            tracing::warn!(peer = %peer, fehler = %e, "Verbindungsaufbau gescheitert");
            self.abbauen().await;
        }
        ergebnis
    }

    async fn verbindungsaufbau(&self, peer: PeerId) -> TransportResult<()> {
        *self.geteilt.remote.lock() = Some(peer.clone());

        let signaling = self.signaling_verbinden().await?;
        self.geteilt.zustand_vorruecken(TransportZustand::SignalingConnected);

        let (plattform_tx, plattform_rx) = mpsc::channel(self.konfig.ereignis_puffer.max(1));
        let pc = self
            .plattform
            .verbindung_erstellen(&self.konfig.stun_server, plattform_tx)
            .await?;
        let kanal = match pc.datenkanal_erstellen(&self.konfig.kanal_label).await {
            Ok(kanal) => kanal,
            Err(e) => {
                // Noch nicht in `aktiv`, `abbauen` kennt die Verbindung nicht
                if let Err(fehler) = pc.schliessen().await {
                    tracing::debug!(%fehler, "Peer-Verbindung nicht sauber geschlossen");
                }
                return Err(e);
            }
        };
        *self.geteilt.kanal.lock() = Some(kanal);

        let (beschreibung_tx, mut beschreibung_rx) = mpsc::channel(BESCHREIBUNG_PUFFER);
        let aktiv = self.tasks_starten(pc.clone(), signaling, plattform_rx, beschreibung_tx);
        let signaling_tx = aktiv.signaling_tx.clone();
        let kandidaten_tx = aktiv.kandidaten_tx.clone();
        *self.aktiv.lock() = Some(aktiv);

        let offer = pc.offer_erstellen().await?;
        signaling_tx
            .send(SignalingNachricht::offer(peer.clone(), offer))
            .await
            .map_err(|_| TransportError::Getrennt)?;
        self.geteilt.zustand_vorruecken(TransportZustand::OfferSent);
        tracing::debug!(peer = %peer, "Offer gesendet");

        let answer = loop {
            match tokio::time::timeout(self.konfig.answer_timeout(), beschreibung_rx.recv()).await {
                Err(_) => return Err(TransportError::Zeitlimit("Answer".into())),
                Ok(None) => return Err(TransportError::Getrennt),
                Ok(Some(RemoteBeschreibung::Answer(sdp))) => break sdp,
                Ok(Some(RemoteBeschreibung::Fehler(text))) => {
                    return Err(TransportError::RemoteFehler(text))
                }
                Ok(Some(RemoteBeschreibung::Offer { peer: von, .. })) => {
                    tracing::warn!(peer = %von, "Offer waehrend eigenem Verbindungsaufbau ignoriert");
                }
            }
        };

        pc.remote_description_setzen(SdpTyp::Answer, answer).await?;
        kandidaten_tx
            .send(KandidatenBefehl::RemoteGesetzt)
            .await
            .map_err(|_| TransportError::Getrennt)?;
        self.geteilt.zustand_vorruecken(TransportZustand::RemoteDescriptionSet);

        self.verbunden_abwarten(self.konfig.kanal_timeout()).await
    }

    // -----------------------------------------------------------------------
    // Answer-Seite
    // -----------------------------------------------------------------------

    /// Verbindet das Signaling und beantwortet das erste eingehende Offer
    ///
    /// Kehrt nach dem Signaling-Aufbau zurueck. Ob die Verbindung zustande
    /// kommt, zeigen Zustand und Ereignisse (oder `verbunden_abwarten`).
    pub async fn annehmen_starten(&self) -> TransportResult<()> {
        self.starten()?;
        self.ressourcen_freigeben().await;

        let ergebnis = self.annahme_vorbereiten().await;
        if let Err(e) = &ergebnis {
            tracing::warn!(fehler = %e, "Annahmebereitschaft gescheitert");
            self.abbauen().await;
        }
        ergebnis
    }

    async fn annahme_vorbereiten(&self) -> TransportResult<()> {
        *self.geteilt.remote.lock() = None;

        let signaling = self.signaling_verbinden().await?;
        self.geteilt.zustand_vorruecken(TransportZustand::SignalingConnected);

        let (plattform_tx, plattform_rx) = mpsc::channel(self.konfig.ereignis_puffer.max(1));
        let pc = self
            .plattform
            .verbindung_erstellen(&self.konfig.stun_server, plattform_tx)
            .await?;

        let (beschreibung_tx, beschreibung_rx) = mpsc::channel(BESCHREIBUNG_PUFFER);
        let mut aktiv = self.tasks_starten(pc.clone(), signaling, plattform_rx, beschreibung_tx);
        aktiv.tasks.push(tokio::spawn(annahme_schleife(
            self.geteilt.clone(),
            pc,
            beschreibung_rx,
            aktiv.signaling_tx.clone(),
            aktiv.kandidaten_tx.clone(),
            aktiv.abbruch.clone(),
        )));
        *self.aktiv.lock() = Some(aktiv);

        tracing::info!("Warte auf eingehendes Offer");
        Ok(())
    }

    /// Wartet bis der Data-Channel offen ist
    pub async fn verbunden_abwarten(&self, dauer: Duration) -> TransportResult<()> {
        let mut rx = self.zustand_beobachten();
        let warten = rx.wait_for(|z| {
            matches!(z, TransportZustand::Connected | TransportZustand::Disconnected)
        });
        let ergebnis = match tokio::time::timeout(dauer, warten).await {
            Err(_) => Err(TransportError::Zeitlimit("Data-Channel".into())),
            Ok(Err(_)) => Err(TransportError::Getrennt),
            Ok(Ok(z)) if *z == TransportZustand::Connected => Ok(()),
            Ok(Ok(_)) => Err(TransportError::Getrennt),
        };
        ergebnis
    }

    // -----------------------------------------------------------------------
    // Senden und Trennen
    // -----------------------------------------------------------------------

    /// Sendet Text ueber den Data-Channel
    ///
    /// Ohne offenen Kanal sofort `KanalNichtOffen`, es wird nichts
    /// zwischengespeichert.
    pub async fn send_message(&self, text: &str) -> TransportResult<()> {
        let kanal = self.geteilt.kanal.lock().clone();
        match kanal {
            Some(kanal) if kanal.ist_offen() => kanal.senden(text).await,
            _ => Err(TransportError::KanalNichtOffen),
        }
    }

    /// Trennt die Verbindung (idempotent)
    pub async fn disconnect(&self) {
        self.abbauen().await;
        *self.geteilt.remote.lock() = None;
    }

    // -----------------------------------------------------------------------
    // Intern
    // -----------------------------------------------------------------------

    /// `Disconnected -> SignalingConnecting`, sonst Fehler
    fn starten(&self) -> TransportResult<()> {
        let mut vorher = TransportZustand::Disconnected;
        let gestartet = self.geteilt.zustand_tx.send_if_modified(|z| {
            vorher = *z;
            if *z == TransportZustand::Disconnected {
                *z = TransportZustand::SignalingConnecting;
                true
            } else {
                false
            }
        });
        if !gestartet {
            return Err(TransportError::UngueltigerZustand(format!(
                "Verbindungsaufbau im Zustand {vorher}"
            )));
        }
        self.geteilt
            .melden(TransportEreignis::ZustandGeaendert(TransportZustand::SignalingConnecting));
        Ok(())
    }

    async fn signaling_verbinden(&self) -> TransportResult<SignalingVerbindung> {
        let versuche = self.konfig.signaling_versuche.max(1);
        let mut letzter_fehler = String::new();

        for versuch in 1..=versuche {
            match tokio::time::timeout(self.konfig.signaling_timeout(), self.connector.verbinden())
                .await
            {
                Ok(Ok(verbindung)) => return Ok(verbindung),
                Ok(Err(e)) => {
                    tracing::warn!(versuch, versuche, fehler = %e, "Signaling-Verbindung fehlgeschlagen");
                    letzter_fehler = e.to_string();
                }
                Err(_) => {
                    tracing::warn!(versuch, versuche, "Signaling-Verbindung: Zeitlimit");
                    letzter_fehler = "Zeitlimit".into();
                }
            }
            if versuch < versuche {
                tokio::time::sleep(self.konfig.signaling_pause()).await;
            }
        }

        Err(TransportError::SignalingVerbindung(format!(
            "{versuche} Versuche gescheitert: {letzter_fehler}"
        )))
    }

    fn tasks_starten(
        &self,
        pc: Arc<dyn PeerVerbindung>,
        signaling: SignalingVerbindung,
        plattform_rx: mpsc::Receiver<PeerEreignis>,
        beschreibung_tx: mpsc::Sender<RemoteBeschreibung>,
    ) -> AktiveVerbindung {
        let SignalingVerbindung {
            sender,
            empfaenger,
            abbruch: signaling_abbruch,
        } = signaling;
        let abbruch = CancellationToken::new();
        let (kandidaten_tx, kandidaten_rx) = mpsc::channel(KANDIDATEN_PUFFER);

        let tasks = vec![
            tokio::spawn(kandidaten_schleife(pc.clone(), kandidaten_rx, abbruch.clone())),
            tokio::spawn(signaling_schleife(
                self.geteilt.clone(),
                empfaenger,
                kandidaten_tx.clone(),
                beschreibung_tx,
                abbruch.clone(),
            )),
            tokio::spawn(plattform_schleife(
                self.geteilt.clone(),
                plattform_rx,
                sender.clone(),
                abbruch.clone(),
            )),
        ];

        AktiveVerbindung {
            pc,
            signaling_tx: sender,
            kandidaten_tx,
            signaling_abbruch,
            abbruch,
            tasks,
        }
    }

    /// Gibt alle Ressourcen frei und setzt `Disconnected`
    async fn abbauen(&self) {
        self.ressourcen_freigeben().await;
        self.geteilt.zustand_setzen(TransportZustand::Disconnected);
    }

    /// Beendet Tasks, schliesst Kanal und Peer-Verbindung (ohne Zustandswechsel)
    async fn ressourcen_freigeben(&self) {
        let aktiv = self.aktiv.lock().take();
        let kanal = self.geteilt.kanal.lock().take();

        if let Some(aktiv) = &aktiv {
            aktiv.abbruch.cancel();
            aktiv.signaling_abbruch.cancel();
        }
        if let Some(kanal) = kanal {
            if let Err(e) = kanal.schliessen().await {
                tracing::debug!(fehler = %e, "Data-Channel schliessen");
            }
        }
        if let Some(aktiv) = aktiv {
            for task in aktiv.tasks {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!(fehler = %e, "Transport-Task ist abgestuerzt");
                    }
                }
            }
            if let Err(e) = aktiv.pc.schliessen().await {
                tracing::debug!(fehler = %e, "Peer-Verbindung schliessen");
            }
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        if let Some(aktiv) = self.aktiv.lock().take() {
            aktiv.abbruch.cancel();
            aktiv.signaling_abbruch.cancel();
        }
    }
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession")
            .field("zustand", &self.zustand())
            .field("remote", &self.remote_peer())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

/// Wendet entfernte Kandidaten in Empfangsreihenfolge an
async fn kandidaten_schleife(
    pc: Arc<dyn PeerVerbindung>,
    mut rx: mpsc::Receiver<KandidatenBefehl>,
    abbruch: CancellationToken,
) {
    let mut puffer = KandidatenPuffer::new();
    loop {
        let befehl = tokio::select! {
            biased;
            _ = abbruch.cancelled() => break,
            befehl = rx.recv() => match befehl {
                Some(befehl) => befehl,
                None => break,
            },
        };

        let anwenden = match befehl {
            KandidatenBefehl::Kandidat(kandidat) => {
                let sofort: Vec<_> = puffer.aufnehmen(kandidat).into_iter().collect();
                if sofort.is_empty() {
                    tracing::trace!(gepuffert = puffer.gepuffert(), "ICE-Kandidat gepuffert");
                }
                sofort
            }
            KandidatenBefehl::RemoteGesetzt => {
                let gepuffert = puffer.remote_gesetzt();
                tracing::debug!(anzahl = gepuffert.len(), "Gepufferte ICE-Kandidaten anwenden");
                gepuffert
            }
        };

        for kandidat in anwenden {
            if let Err(e) = pc.kandidat_hinzufuegen(kandidat).await {
                tracing::warn!(fehler = %e, "ICE-Kandidat abgelehnt");
            }
        }
    }
    puffer.leeren();
}

/// Verteilt eingehende Signaling-Frames
async fn signaling_schleife(
    geteilt: Arc<Geteilt>,
    mut rx: mpsc::Receiver<SignalingNachricht>,
    kandidaten_tx: mpsc::Sender<KandidatenBefehl>,
    beschreibung_tx: mpsc::Sender<RemoteBeschreibung>,
    abbruch: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = abbruch.cancelled() => break,
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => {
                    tracing::info!("Signaling-Verbindung beendet");
                    break;
                }
            },
        };

        if let Some(remote) = geteilt.remote() {
            if frame.peer_id != remote {
                tracing::warn!(von = %frame.peer_id, "Signaling-Frame eines fremden Peers ignoriert");
                continue;
            }
        }

        let beschreibung = match frame.typ {
            SignalingTyp::IceCandidate => {
                match frame.kandidat() {
                    Some(kandidat) => {
                        if kandidaten_tx.send(KandidatenBefehl::Kandidat(kandidat)).await.is_err() {
                            break;
                        }
                    }
                    None => tracing::warn!("ice-candidate ohne Kandidat"),
                }
                continue;
            }
            SignalingTyp::Offer => frame.sdp.map(|sdp| RemoteBeschreibung::Offer {
                peer: frame.peer_id,
                sdp,
            }),
            SignalingTyp::Answer => frame.sdp.map(RemoteBeschreibung::Answer),
            SignalingTyp::Error => {
                let text = frame.message.unwrap_or_default();
                tracing::warn!(fehler = %text, "Fehler-Frame vom Signaling");
                Some(RemoteBeschreibung::Fehler(text))
            }
        };

        match beschreibung {
            Some(beschreibung) => {
                if let Err(e) = beschreibung_tx.try_send(beschreibung) {
                    tracing::debug!(fehler = %e, "Signaling-Frame ohne Abnehmer");
                }
            }
            None => tracing::warn!("Offer/Answer ohne SDP"),
        }
    }
}

/// Uebersetzt Plattform-Ereignisse
async fn plattform_schleife(
    geteilt: Arc<Geteilt>,
    mut rx: mpsc::Receiver<PeerEreignis>,
    signaling_tx: mpsc::Sender<SignalingNachricht>,
    abbruch: CancellationToken,
) {
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
            PeerEreignis::LokalerKandidat(kandidat) => {
                // Trickle: sofort weiterleiten
                let Some(peer) = geteilt.remote() else {
                    tracing::warn!("Lokaler ICE-Kandidat ohne Gegenstelle verworfen");
                    continue;
                };
                if signaling_tx
                    .send(SignalingNachricht::ice_candidate(peer, kandidat))
                    .await
                    .is_err()
                {
                    tracing::debug!("Signaling geschlossen, Kandidat verworfen");
                }
            }
            PeerEreignis::KanalEmpfangen(kanal) => {
                *geteilt.kanal.lock() = Some(kanal);
            }
            PeerEreignis::KanalGeoeffnet => {
                geteilt.zustand_vorruecken(TransportZustand::Connected);
            }
            PeerEreignis::KanalNachricht(text) => {
                let Some(peer) = geteilt.remote() else { continue };
                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => break,
                    ergebnis = geteilt.ereignis_tx.send(TransportEreignis::NachrichtEmpfangen { peer, text }) => {
                        if ergebnis.is_err() {
                            tracing::debug!("Kein Ereignis-Empfaenger, Nachricht verworfen");
                        }
                    }
                }
            }
            PeerEreignis::KanalGeschlossen | PeerEreignis::VerbindungGetrennt => {
                if geteilt.zustand() != TransportZustand::Disconnected {
                    tracing::info!(peer = ?geteilt.remote(), "Verbindung von der Gegenstelle beendet");
                    geteilt.zustand_setzen(TransportZustand::Disconnected);
                }
            }
        }
    }
}

/// Beantwortet das erste Offer (Answer-Seite)
async fn annahme_schleife(
    geteilt: Arc<Geteilt>,
    pc: Arc<dyn PeerVerbindung>,
    mut rx: mpsc::Receiver<RemoteBeschreibung>,
    signaling_tx: mpsc::Sender<SignalingNachricht>,
    kandidaten_tx: mpsc::Sender<KandidatenBefehl>,
    abbruch: CancellationToken,
) {
    let mut beantwortet = false;
    loop {
        let beschreibung = tokio::select! {
            biased;
            _ = abbruch.cancelled() => break,
            b = rx.recv() => match b {
                Some(b) => b,
                None => break,
            },
        };

        match beschreibung {
            RemoteBeschreibung::Offer { peer, sdp } if !beantwortet => {
                beantwortet = true;
                if let Err(e) =
                    offer_beantworten(&geteilt, pc.as_ref(), &peer, sdp, &signaling_tx, &kandidaten_tx)
                        .await
                {
                    tracing::warn!(peer = %peer, fehler = %e, "Offer konnte nicht beantwortet werden");
                    let _ = signaling_tx
                        .send(SignalingNachricht::error(peer, e.to_string()))
                        .await;
                }
            }
            RemoteBeschreibung::Offer { peer, .. } => {
                tracing::warn!(peer = %peer, "Weiteres Offer abgelehnt");
                let _ = signaling_tx
                    .send(SignalingNachricht::error(peer, "Session bereits belegt"))
                    .await;
            }
            RemoteBeschreibung::Answer(_) => tracing::warn!("Unerwartete Answer ignoriert"),
            RemoteBeschreibung::Fehler(_) => {}
        }
    }
}

async fn offer_beantworten(
    geteilt: &Geteilt,
    pc: &dyn PeerVerbindung,
    peer: &PeerId,
    sdp: String,
    signaling_tx: &mpsc::Sender<SignalingNachricht>,
    kandidaten_tx: &mpsc::Sender<KandidatenBefehl>,
) -> TransportResult<()> {
    tracing::info!(peer = %peer, "Offer empfangen");
    *geteilt.remote.lock() = Some(peer.clone());

    pc.remote_description_setzen(SdpTyp::Offer, sdp).await?;
    kandidaten_tx
        .send(KandidatenBefehl::RemoteGesetzt)
        .await
        .map_err(|_| TransportError::Getrennt)?;
    geteilt.zustand_vorruecken(TransportZustand::RemoteDescriptionSet);

    let answer = pc.answer_erstellen().await?;
    signaling_tx
        .send(SignalingNachricht::answer(peer.clone(), answer))
        .await
        .map_err(|_| TransportError::Getrennt)?;
    tracing::debug!(peer = %peer, "Answer gesendet");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zustaende_sind_geordnet() {
        assert!(TransportZustand::Disconnected < TransportZustand::SignalingConnecting);
        assert!(TransportZustand::OfferSent < TransportZustand::RemoteDescriptionSet);
        assert!(TransportZustand::RemoteDescriptionSet < TransportZustand::Connected);
        assert_eq!(TransportZustand::OfferSent.to_string(), "offer_sent");
    }

    #[test]
    fn vorruecken_nie_aus_disconnected() {
        let (zustand_tx, _) = watch::channel(TransportZustand::Disconnected);
        let (ereignis_tx, mut ereignis_rx) = mpsc::channel(8);
        let geteilt = Geteilt {
            zustand_tx,
            ereignis_tx,
            kanal: Mutex::new(None),
            remote: Mutex::new(Some(PeerId::from("peerB"))),
            verworfen: AtomicU64::new(0),
        };

        assert!(!geteilt.zustand_vorruecken(TransportZustand::Connected));
        assert_eq!(geteilt.zustand(), TransportZustand::Disconnected);

        geteilt.zustand_setzen(TransportZustand::SignalingConnecting);
        assert!(geteilt.zustand_vorruecken(TransportZustand::OfferSent));
        assert!(!geteilt.zustand_vorruecken(TransportZustand::SignalingConnected));
        assert!(geteilt.zustand_vorruecken(TransportZustand::Connected));
        geteilt.zustand_setzen(TransportZustand::Disconnected);

        let mut ereignisse = Vec::new();
        while let Ok(e) = ereignis_rx.try_recv() {
            ereignisse.push(e);
        }
        assert_eq!(
            ereignisse,
            vec![
                TransportEreignis::ZustandGeaendert(TransportZustand::SignalingConnecting),
                TransportEreignis::ZustandGeaendert(TransportZustand::OfferSent),
                TransportEreignis::ZustandGeaendert(TransportZustand::Connected),
                TransportEreignis::Verbunden(PeerId::from("peerB")),
                TransportEreignis::ZustandGeaendert(TransportZustand::Disconnected),
                TransportEreignis::Getrennt,
            ]
        );
    }
}
