//! WebRTC-Plattform auf Basis des `webrtc`-Crates
//!
//! Unified-Plan, STUN aus der Konfiguration, ein geordneter Data-Channel
//! ohne Begrenzung der Neuuebertragungen. Alle Rueckrufe werden in
//! `PeerEreignis`-Werte uebersetzt.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::error::{TransportError, TransportResult};
use crate::plattform::{DatenKanal, IceKandidat, PeerEreignis, PeerPlattform, PeerVerbindung, SdpTyp};

/// Produktive Plattform (webrtc-rs)
#[derive(Debug, Clone, Copy, Default)]
pub struct WebRtcPlattform;

impl WebRtcPlattform {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerPlattform for WebRtcPlattform {
    async fn verbindung_erstellen(
        &self,
        stun_server: &[String],
        ereignisse: mpsc::Sender<PeerEreignis>,
    ) -> TransportResult<Arc<dyn PeerVerbindung>> {
        let mut media = MediaEngine::default();
        media.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media)?;

        let api = APIBuilder::new()
            .with_media_engine(media)
            .with_interceptor_registry(registry)
            .build();

        let konfig = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: stun_server.to_vec(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(konfig).await?);
        rueckrufe_registrieren(&pc, ereignisse.clone());

        Ok(Arc::new(WebRtcVerbindung { pc, ereignisse }))
    }
}

fn rueckrufe_registrieren(pc: &Arc<RTCPeerConnection>, ereignisse: mpsc::Sender<PeerEreignis>) {
    let tx = ereignisse.clone();
    pc.on_ice_candidate(Box::new(move |kandidat: Option<RTCIceCandidate>| {
        let tx = tx.clone();
        Box::pin(async move {
            // None markiert das Ende des Gatherings
            let Some(kandidat) = kandidat else { return };
            match kandidat.to_json() {
                Ok(init) => {
                    let _ = tx
                        .send(PeerEreignis::LokalerKandidat(IceKandidat {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        }))
                        .await;
                }
                Err(e) => tracing::warn!(fehler = %e, "Lokaler ICE-Kandidat nicht serialisierbar"),
            }
        })
    }));

    let tx = ereignisse.clone();
    pc.on_peer_connection_state_change(Box::new(move |zustand: RTCPeerConnectionState| {
        let tx = tx.clone();
        Box::pin(async move {
            tracing::debug!(zustand = %zustand, "Peer-Verbindungszustand");
            if matches!(
                zustand,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed
            ) {
                let _ = tx.send(PeerEreignis::VerbindungGetrennt).await;
            }
        })
    }));

    let tx = ereignisse;
    pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
        let tx = tx.clone();
        Box::pin(async move {
            tracing::debug!(label = dc.label(), "Data-Channel von der Gegenstelle");
            let kanal = WebRtcKanal::neu(dc, tx.clone());
            let _ = tx.send(PeerEreignis::KanalEmpfangen(Arc::new(kanal))).await;
        })
    }));
}

/// Peer-Verbindung (webrtc-rs)
struct WebRtcVerbindung {
    pc: Arc<RTCPeerConnection>,
    ereignisse: mpsc::Sender<PeerEreignis>,
}

#[async_trait]
impl PeerVerbindung for WebRtcVerbindung {
    async fn datenkanal_erstellen(&self, label: &str) -> TransportResult<Arc<dyn DatenKanal>> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let dc = self.pc.create_data_channel(label, Some(init)).await?;
        Ok(Arc::new(WebRtcKanal::neu(dc, self.ereignisse.clone())))
    }

    async fn offer_erstellen(&self) -> TransportResult<String> {
        let offer = self.pc.create_offer(None).await?;
        let sdp = offer.sdp.clone();
        self.pc.set_local_description(offer).await?;
        Ok(sdp)
    }

    async fn answer_erstellen(&self) -> TransportResult<String> {
        let answer = self.pc.create_answer(None).await?;
        let sdp = answer.sdp.clone();
        self.pc.set_local_description(answer).await?;
        Ok(sdp)
    }

    async fn remote_description_setzen(&self, typ: SdpTyp, sdp: String) -> TransportResult<()> {
        let beschreibung = match typ {
            SdpTyp::Offer => RTCSessionDescription::offer(sdp)?,
            SdpTyp::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.pc.set_remote_description(beschreibung).await?;
        Ok(())
    }

    async fn kandidat_hinzufuegen(&self, kandidat: IceKandidat) -> TransportResult<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: kandidat.candidate,
                sdp_mid: kandidat.sdp_mid,
                sdp_mline_index: kandidat.sdp_m_line_index,
                username_fragment: None,
            })
            .await?;
        Ok(())
    }

    async fn schliessen(&self) -> TransportResult<()> {
        self.pc.close().await?;
        Ok(())
    }
}

/// Data-Channel (webrtc-rs)
struct WebRtcKanal {
    dc: Arc<RTCDataChannel>,
}

impl WebRtcKanal {
    fn neu(dc: Arc<RTCDataChannel>, ereignisse: mpsc::Sender<PeerEreignis>) -> Self {
        let tx = ereignisse.clone();
        dc.on_open(Box::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(PeerEreignis::KanalGeoeffnet).await;
            })
        }));

        let tx = ereignisse.clone();
        dc.on_message(Box::new(move |nachricht: DataChannelMessage| {
            let tx = tx.clone();
            Box::pin(async move {
                let text = String::from_utf8_lossy(&nachricht.data).into_owned();
                let _ = tx.send(PeerEreignis::KanalNachricht(text)).await;
            })
        }));

        let tx = ereignisse;
        dc.on_close(Box::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(PeerEreignis::KanalGeschlossen).await;
            })
        }));

        Self { dc }
    }
}

#[async_trait]
impl DatenKanal for WebRtcKanal {
    fn ist_offen(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn senden(&self, text: &str) -> TransportResult<()> {
        if !self.ist_offen() {
            return Err(TransportError::KanalNichtOffen);
        }
        self.dc.send_text(text.to_string()).await?;
        Ok(())
    }

    async fn schliessen(&self) -> TransportResult<()> {
        self.dc.close().await?;
        Ok(())
    }
}
