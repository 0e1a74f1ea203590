//! Signaling-Protokoll
//!
//! JSON-Frames ueber WebSocket:
//!
//! ```text
//! {"type":"offer",         "peerId":"peerB", "sdp":"..."}
//! {"type":"answer",        "peerId":"peerA", "sdp":"..."}
//! {"type":"ice-candidate", "peerId":"peerB", "candidate":"...", "sdpMid":"0", "sdpMLineIndex":0}
//! {"type":"error",         "peerId":"peerB", "message":"..."}
//! ```
//!
//! Ausgehend traegt `peerId` das Ziel, eingehend den Absender.

use async_trait::async_trait;
use geheimpost_core::PeerId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportResult;
use crate::plattform::IceKandidat;

/// Art eines Signaling-Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingTyp {
    Offer,
    Answer,
    IceCandidate,
    Error,
}

/// Ein Signaling-Frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalingNachricht {
    #[serde(rename = "type")]
    pub typ: SignalingTyp,
    #[serde(rename = "peerId")]
    pub peer_id: PeerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp: Option<String>,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SignalingNachricht {
    fn leer(typ: SignalingTyp, peer_id: PeerId) -> Self {
        Self {
            typ,
            peer_id,
            sdp: None,
            sdp_mid: None,
            sdp_m_line_index: None,
            candidate: None,
            message: None,
        }
    }

    pub fn offer(peer_id: PeerId, sdp: String) -> Self {
        Self {
            sdp: Some(sdp),
            ..Self::leer(SignalingTyp::Offer, peer_id)
        }
    }

    pub fn answer(peer_id: PeerId, sdp: String) -> Self {
        Self {
            sdp: Some(sdp),
            ..Self::leer(SignalingTyp::Answer, peer_id)
        }
    }

    pub fn ice_candidate(peer_id: PeerId, kandidat: IceKandidat) -> Self {
        Self {
            candidate: Some(kandidat.candidate),
            sdp_mid: kandidat.sdp_mid,
            sdp_m_line_index: kandidat.sdp_m_line_index,
            ..Self::leer(SignalingTyp::IceCandidate, peer_id)
        }
    }

    pub fn error(peer_id: PeerId, text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Self::leer(SignalingTyp::Error, peer_id)
        }
    }

    /// ICE-Kandidat aus einem `ice-candidate`-Frame
    pub fn kandidat(&self) -> Option<IceKandidat> {
        if self.typ != SignalingTyp::IceCandidate {
            return None;
        }
        Some(IceKandidat {
            candidate: self.candidate.clone()?,
            sdp_mid: self.sdp_mid.clone(),
            sdp_m_line_index: self.sdp_m_line_index,
        })
    }

    pub fn to_json(&self) -> TransportResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> TransportResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Eine offene Signaling-Verbindung
///
/// `abbruch` beendet die Verbindung und alle zugehoerigen Tasks.
#[derive(Debug)]
pub struct SignalingVerbindung {
    pub sender: mpsc::Sender<SignalingNachricht>,
    pub empfaenger: mpsc::Receiver<SignalingNachricht>,
    pub abbruch: CancellationToken,
}

/// Baut Signaling-Verbindungen auf (ein Versuch pro Aufruf)
#[async_trait]
pub trait SignalingConnector: Send + Sync + 'static {
    async fn verbinden(&self) -> TransportResult<SignalingVerbindung>;
}
