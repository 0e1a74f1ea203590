//! In-Memory-Plattform und Signaling-Relay fuer Tests
//!
//! `FakeNetz` verbindet Peer-Verbindungen innerhalb eines Prozesses. Das SDP
//! traegt die ID der erzeugenden Verbindung (`fake-offer:<id>`), darueber
//! findet die Gegenseite ihren Partner. Der Data-Channel oeffnet, sobald
//! beide Seiten ihre Remote-Description gesetzt und mindestens einen
//! entfernten Kandidaten angewendet haben.
//!
//! Im Modus `allein` gibt es keinen Partner: der Kanal oeffnet nach
//! Remote-Description und erstem Kandidaten, gesendete Texte werden nur
//! protokolliert. Damit laesst sich die Gegenseite im Test per Hand spielen.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use geheimpost_core::PeerId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::plattform::{DatenKanal, IceKandidat, PeerEreignis, PeerPlattform, PeerVerbindung, SdpTyp};
use crate::signaling::{SignalingConnector, SignalingNachricht, SignalingVerbindung};

/// Lokale Kandidaten pro Description
const KANDIDATEN_PRO_SEITE: u32 = 2;

// ---------------------------------------------------------------------------
// Netz und Plattform
// ---------------------------------------------------------------------------

#[derive(Default)]
struct NetzZustand {
    verbindungen: HashMap<u64, Weak<FakeVerbindung>>,
}

/// Gemeinsames In-Memory-Netz mehrerer Plattformen
#[derive(Clone, Default)]
pub struct FakeNetz {
    zustand: Arc<Mutex<NetzZustand>>,
    naechste_id: Arc<AtomicU64>,
}

impl FakeNetz {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plattform mit Partnersuche im Netz
    pub fn plattform(&self) -> FakePlattform {
        FakePlattform {
            netz: self.clone(),
            allein: false,
            ohne_kanal: false,
            letzte: Arc::new(Mutex::new(None)),
        }
    }

    fn verbindung(&self, id: u64) -> Option<Arc<FakeVerbindung>> {
        self.zustand.lock().verbindungen.get(&id).and_then(Weak::upgrade)
    }
}

/// Peer-Plattform fuer Tests
#[derive(Clone)]
pub struct FakePlattform {
    netz: FakeNetz,
    allein: bool,
    /// `datenkanal_erstellen` schlaegt fehl
    ohne_kanal: bool,
    letzte: Arc<Mutex<Option<Arc<FakeVerbindung>>>>,
}

impl FakePlattform {
    /// Plattform ohne Partner (Gegenseite wird im Test gespielt)
    pub fn allein() -> Self {
        Self {
            allein: true,
            ..FakeNetz::new().plattform()
        }
    }

    /// Plattform, deren Verbindungen keinen Data-Channel erstellen koennen
    pub fn ohne_datenkanal(self) -> Self {
        Self {
            ohne_kanal: true,
            ..self
        }
    }

    /// Zuletzt erstellte Verbindung
    pub fn letzte_verbindung(&self) -> Option<Arc<FakeVerbindung>> {
        self.letzte.lock().clone()
    }
}

#[async_trait]
impl PeerPlattform for FakePlattform {
    async fn verbindung_erstellen(
        &self,
        _stun_server: &[String],
        ereignisse: mpsc::Sender<PeerEreignis>,
    ) -> TransportResult<Arc<dyn PeerVerbindung>> {
        let id = self.netz.naechste_id.fetch_add(1, Ordering::Relaxed) + 1;
        let verbindung = Arc::new(FakeVerbindung {
            id,
            allein: self.allein,
            ohne_kanal: self.ohne_kanal,
            netz: self.netz.clone(),
            ereignisse,
            zustand: Mutex::new(FakeZustand::default()),
        });
        self.netz
            .zustand
            .lock()
            .verbindungen
            .insert(id, Arc::downgrade(&verbindung));
        *self.letzte.lock() = Some(verbindung.clone());
        Ok(verbindung)
    }
}

// ---------------------------------------------------------------------------
// Verbindung
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeZustand {
    partner: Option<u64>,
    remote_gesetzt: bool,
    angewendet: Vec<IceKandidat>,
    kanal: Option<Arc<FakeKanal>>,
    offen: bool,
    geschlossen: bool,
}

impl FakeZustand {
    fn bereit(&self) -> bool {
        self.remote_gesetzt && !self.angewendet.is_empty() && !self.offen && !self.geschlossen
    }
}

/// Peer-Verbindung im In-Memory-Netz
pub struct FakeVerbindung {
    id: u64,
    allein: bool,
    ohne_kanal: bool,
    netz: FakeNetz,
    ereignisse: mpsc::Sender<PeerEreignis>,
    zustand: Mutex<FakeZustand>,
}

impl FakeVerbindung {
    /// Angewendete entfernte Kandidaten in Reihenfolge
    pub fn angewendete_kandidaten(&self) -> Vec<IceKandidat> {
        self.zustand.lock().angewendet.clone()
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.zustand.lock().geschlossen
    }

    /// Data-Channel dieser Seite
    pub fn kanal(&self) -> Option<Arc<FakeKanal>> {
        self.zustand.lock().kanal.clone()
    }

    fn melden(&self, ereignis: PeerEreignis) {
        if let Err(e) = self.ereignisse.try_send(ereignis) {
            tracing::debug!(fehler = %e, "Fake-Ereignis verworfen");
        }
    }

    fn lokale_kandidaten_melden(&self) {
        for n in 1..=KANDIDATEN_PRO_SEITE {
            self.melden(PeerEreignis::LokalerKandidat(IceKandidat {
                candidate: format!("candidate:{}:{n} 1 udp 2122260223 127.0.0.1 {} typ host", self.id, 50_000 + n),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }));
        }
    }

    /// Oeffnet den Kanal, sobald beide Seiten bereit sind
    fn pruefen_oeffnen(&self) {
        // Netz-Lock serialisiert das Oeffnen
        let netz = self.netz.zustand.lock();

        if self.allein {
            let kanal = {
                let mut z = self.zustand.lock();
                if !z.bereit() {
                    return;
                }
                z.offen = true;
                z.kanal.clone()
            };
            if let Some(kanal) = kanal {
                kanal.offen.store(true, Ordering::SeqCst);
            }
            self.melden(PeerEreignis::KanalGeoeffnet);
            return;
        }

        let partner_id = self.zustand.lock().partner;
        let Some(partner) = partner_id
            .and_then(|id| netz.verbindungen.get(&id))
            .and_then(Weak::upgrade)
        else {
            return;
        };

        let selbst_bereit = self.zustand.lock().bereit();
        let partner_bereit = partner.zustand.lock().bereit();
        if !selbst_bereit || !partner_bereit {
            return;
        }

        // Die Seite mit eigenem Kanal ist die Offer-Seite
        let eigener_kanal = self.zustand.lock().kanal.is_some();
        let (anbieter, annehmer): (&FakeVerbindung, &FakeVerbindung) = if eigener_kanal {
            (self, partner.as_ref())
        } else {
            (partner.as_ref(), self)
        };
        let Some(kanal_a) = anbieter.zustand.lock().kanal.clone() else {
            return;
        };
        let kanal_b = Arc::new(FakeKanal::neu(&kanal_a.label, annehmer.ereignisse.clone()));
        *kanal_a.partner.lock() = Arc::downgrade(&kanal_b);
        *kanal_b.partner.lock() = Arc::downgrade(&kanal_a);
        kanal_a.offen.store(true, Ordering::SeqCst);
        kanal_b.offen.store(true, Ordering::SeqCst);

        anbieter.zustand.lock().offen = true;
        {
            let mut z = annehmer.zustand.lock();
            z.offen = true;
            z.kanal = Some(kanal_b.clone());
        }

        annehmer.melden(PeerEreignis::KanalEmpfangen(kanal_b));
        annehmer.melden(PeerEreignis::KanalGeoeffnet);
        anbieter.melden(PeerEreignis::KanalGeoeffnet);
    }
}

#[async_trait]
impl PeerVerbindung for FakeVerbindung {
    async fn datenkanal_erstellen(&self, label: &str) -> TransportResult<Arc<dyn DatenKanal>> {
        if self.ohne_kanal {
            return Err(TransportError::Plattform("Data-Channel nicht verfuegbar".into()));
        }
        let kanal = Arc::new(FakeKanal::neu(label, self.ereignisse.clone()));
        self.zustand.lock().kanal = Some(kanal.clone());
        Ok(kanal)
    }

    async fn offer_erstellen(&self) -> TransportResult<String> {
        self.lokale_kandidaten_melden();
        Ok(format!("fake-offer:{}", self.id))
    }

    async fn answer_erstellen(&self) -> TransportResult<String> {
        if !self.zustand.lock().remote_gesetzt {
            return Err(TransportError::Plattform("Answer ohne Remote-Offer".into()));
        }
        self.lokale_kandidaten_melden();
        Ok(format!("fake-answer:{}", self.id))
    }

    async fn remote_description_setzen(&self, typ: SdpTyp, sdp: String) -> TransportResult<()> {
        let erwartet = match typ {
            SdpTyp::Offer => "fake-offer:",
            SdpTyp::Answer => "fake-answer:",
        };
        let Some(rest) = sdp.strip_prefix(erwartet) else {
            return Err(TransportError::Plattform(format!("Ungueltiges SDP: {sdp}")));
        };

        let partner = if self.allein {
            None
        } else {
            let id: u64 = rest
                .parse()
                .map_err(|_| TransportError::Plattform(format!("Ungueltiges SDP: {sdp}")))?;
            if self.netz.verbindung(id).is_none() {
                return Err(TransportError::Plattform(format!("Unbekannte Gegenstelle {id}")));
            }
            Some(id)
        };

        {
            let mut z = self.zustand.lock();
            z.partner = partner;
            z.remote_gesetzt = true;
        }
        self.pruefen_oeffnen();
        Ok(())
    }

    async fn kandidat_hinzufuegen(&self, kandidat: IceKandidat) -> TransportResult<()> {
        {
            let mut z = self.zustand.lock();
            if !z.remote_gesetzt {
                return Err(TransportError::Plattform(
                    "Kandidat vor der Remote-Description".into(),
                ));
            }
            z.angewendet.push(kandidat);
        }
        self.pruefen_oeffnen();
        Ok(())
    }

    async fn schliessen(&self) -> TransportResult<()> {
        let kanal = {
            let mut z = self.zustand.lock();
            z.geschlossen = true;
            z.offen = false;
            z.kanal.clone()
        };
        if let Some(kanal) = kanal {
            kanal.schliessen().await?;
        }
        self.netz.zustand.lock().verbindungen.remove(&self.id);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Data-Channel
// ---------------------------------------------------------------------------

/// Data-Channel im In-Memory-Netz
pub struct FakeKanal {
    label: String,
    offen: AtomicBool,
    ereignisse: mpsc::Sender<PeerEreignis>,
    partner: Mutex<Weak<FakeKanal>>,
    gesendet: Mutex<Vec<String>>,
}

impl FakeKanal {
    fn neu(label: &str, ereignisse: mpsc::Sender<PeerEreignis>) -> Self {
        Self {
            label: label.to_string(),
            offen: AtomicBool::new(false),
            ereignisse,
            partner: Mutex::new(Weak::new()),
            gesendet: Mutex::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Alle ueber diesen Kanal gesendeten Texte
    pub fn gesendet(&self) -> Vec<String> {
        self.gesendet.lock().clone()
    }

    fn schliessen_lokal(&self) -> bool {
        let war_offen = self.offen.swap(false, Ordering::SeqCst);
        if war_offen {
            let _ = self.ereignisse.try_send(PeerEreignis::KanalGeschlossen);
        }
        war_offen
    }
}

#[async_trait]
impl DatenKanal for FakeKanal {
    fn ist_offen(&self) -> bool {
        self.offen.load(Ordering::SeqCst)
    }

    async fn senden(&self, text: &str) -> TransportResult<()> {
        if !self.ist_offen() {
            return Err(TransportError::KanalNichtOffen);
        }
        self.gesendet.lock().push(text.to_string());

        let partner = self.partner.lock().upgrade();
        if let Some(partner) = partner {
            if partner.ist_offen() {
                partner
                    .ereignisse
                    .send(PeerEreignis::KanalNachricht(text.to_string()))
                    .await
                    .map_err(|_| TransportError::Getrennt)?;
            }
        }
        Ok(())
    }

    async fn schliessen(&self) -> TransportResult<()> {
        if self.schliessen_lokal() {
            let partner = self.partner.lock().upgrade();
            if let Some(partner) = partner {
                partner.schliessen_lokal();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Signaling-Relay im Speicher
///
/// Leitet Frames an den Peer aus `peerId` weiter und ersetzt `peerId`
/// durch den Absender. Unbekannte Ziele werden mit einem `error`-Frame
/// beantwortet.
#[derive(Clone, Default)]
pub struct FakeRelay {
    teilnehmer: Arc<Mutex<HashMap<PeerId, mpsc::Sender<SignalingNachricht>>>>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ist_angemeldet(&self, id: &PeerId) -> bool {
        self.teilnehmer
            .lock()
            .get(id)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Meldet einen Teilnehmer an (ersetzt eine bestehende Anmeldung)
    pub fn anmelden(&self, id: PeerId) -> SignalingVerbindung {
        let (zum_relay_tx, mut zum_relay_rx) = mpsc::channel::<SignalingNachricht>(64);
        let (vom_relay_tx, vom_relay_rx) = mpsc::channel::<SignalingNachricht>(64);
        self.teilnehmer.lock().insert(id.clone(), vom_relay_tx.clone());

        let abbruch = CancellationToken::new();
        let token = abbruch.clone();
        let relay = self.clone();
        tokio::spawn(async move {
            loop {
                let mut frame = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    frame = zum_relay_rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };
                let ziel = std::mem::replace(&mut frame.peer_id, id.clone());
                let empfaenger = relay.teilnehmer.lock().get(&ziel).cloned();
                match empfaenger {
                    Some(tx) if tx.send(frame).await.is_ok() => {}
                    _ => {
                        let _ = vom_relay_tx
                            .send(SignalingNachricht::error(ziel, "Peer nicht verbunden"))
                            .await;
                    }
                }
            }
            let mut teilnehmer = relay.teilnehmer.lock();
            if teilnehmer.get(&id).is_some_and(|tx| tx.same_channel(&vom_relay_tx)) {
                teilnehmer.remove(&id);
            }
        });

        SignalingVerbindung {
            sender: zum_relay_tx,
            empfaenger: vom_relay_rx,
            abbruch,
        }
    }
}

/// Signaling-Connector gegen einen `FakeRelay`
pub struct FakeConnector {
    relay: FakeRelay,
    id: PeerId,
    fehlversuche: AtomicU32,
    versuche: AtomicU32,
}

impl FakeConnector {
    pub fn new(relay: FakeRelay, id: PeerId) -> Self {
        Self {
            relay,
            id,
            fehlversuche: AtomicU32::new(0),
            versuche: AtomicU32::new(0),
        }
    }

    /// Die ersten `n` Versuche scheitern
    pub fn mit_fehlversuchen(self, n: u32) -> Self {
        self.fehlversuche.store(n, Ordering::SeqCst);
        self
    }

    /// Bisherige Verbindungsversuche
    pub fn versuche(&self) -> u32 {
        self.versuche.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingConnector for FakeConnector {
    async fn verbinden(&self) -> TransportResult<SignalingVerbindung> {
        self.versuche.fetch_add(1, Ordering::SeqCst);
        let gescheitert = self
            .fehlversuche
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gescheitert {
            return Err(TransportError::SignalingVerbindung("Relay nicht erreichbar".into()));
        }
        Ok(self.relay.anmelden(self.id.clone()))
    }
}
