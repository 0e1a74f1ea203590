//! Abstraktion der WebRTC-Plattform
//!
//! Die Session spricht nur mit diesen Traits. Rueckrufe der Plattform
//! (lokale Kandidaten, Kanal-Zustand, Nachrichten) kommen als
//! `PeerEreignis` ueber einen Kanal, den die Session beim Erstellen der
//! Verbindung uebergibt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportResult;

/// Ein ICE-Kandidat (Trickle)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceKandidat {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Art einer Session-Description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpTyp {
    Offer,
    Answer,
}

/// Rueckmeldungen der Plattform
#[derive(Clone)]
pub enum PeerEreignis {
    /// Lokaler Kandidat, sofort an die Gegenstelle weiterleiten
    LokalerKandidat(IceKandidat),
    /// Die Gegenstelle hat einen Data-Channel eroeffnet (Answer-Seite)
    KanalEmpfangen(Arc<dyn DatenKanal>),
    KanalGeoeffnet,
    KanalNachricht(String),
    KanalGeschlossen,
    /// Peer-Verbindung endgueltig verloren
    VerbindungGetrennt,
}

impl std::fmt::Debug for PeerEreignis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LokalerKandidat(k) => f.debug_tuple("LokalerKandidat").field(k).finish(),
            Self::KanalEmpfangen(_) => f.write_str("KanalEmpfangen"),
            Self::KanalGeoeffnet => f.write_str("KanalGeoeffnet"),
            Self::KanalNachricht(t) => write!(f, "KanalNachricht({} Zeichen)", t.len()),
            Self::KanalGeschlossen => f.write_str("KanalGeschlossen"),
            Self::VerbindungGetrennt => f.write_str("VerbindungGetrennt"),
        }
    }
}

/// Erstellt Peer-Verbindungen
#[async_trait]
pub trait PeerPlattform: Send + Sync + 'static {
    async fn verbindung_erstellen(
        &self,
        stun_server: &[String],
        ereignisse: mpsc::Sender<PeerEreignis>,
    ) -> TransportResult<Arc<dyn PeerVerbindung>>;
}

/// Eine Peer-Verbindung
#[async_trait]
pub trait PeerVerbindung: Send + Sync {
    /// Geordneter Data-Channel ohne Begrenzung der Neuuebertragungen
    async fn datenkanal_erstellen(&self, label: &str) -> TransportResult<Arc<dyn DatenKanal>>;

    /// Erstellt ein Offer, setzt es als lokale Description und gibt das SDP zurueck
    async fn offer_erstellen(&self) -> TransportResult<String>;

    /// Erstellt eine Answer, setzt sie als lokale Description und gibt das SDP zurueck
    async fn answer_erstellen(&self) -> TransportResult<String>;

    async fn remote_description_setzen(&self, typ: SdpTyp, sdp: String) -> TransportResult<()>;

    async fn kandidat_hinzufuegen(&self, kandidat: IceKandidat) -> TransportResult<()>;

    async fn schliessen(&self) -> TransportResult<()>;
}

/// Ein Data-Channel
#[async_trait]
pub trait DatenKanal: Send + Sync {
    fn ist_offen(&self) -> bool;

    async fn senden(&self, text: &str) -> TransportResult<()>;

    async fn schliessen(&self) -> TransportResult<()>;
}
