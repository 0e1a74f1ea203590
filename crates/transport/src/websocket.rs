//! Signaling ueber WebSocket (tokio-tungstenite)
//!
//! Die eigene Peer-ID wird beim Verbindungsaufbau als Query-Parameter
//! `peerId` uebergeben. Pro Verbindung laufen zwei Tasks: einer schreibt
//! ausgehende Frames, einer liest eingehende. Beide enden mit dem
//! Abbruch-Token oder wenn der Socket schliesst.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use geheimpost_core::PeerId;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportResult};
use crate::signaling::{SignalingConnector, SignalingNachricht, SignalingVerbindung};

/// Kapazitaet der Frame-Kanaele pro Richtung
const FRAME_PUFFER: usize = 64;

/// Signaling-Connector fuer einen WebSocket-Relay
#[derive(Debug, Clone)]
pub struct WebSocketSignaling {
    url: String,
    eigene_id: PeerId,
}

impl WebSocketSignaling {
    pub fn new(url: impl Into<String>, eigene_id: PeerId) -> Self {
        Self {
            url: url.into(),
            eigene_id,
        }
    }

    /// URL inklusive `peerId`-Parameter
    pub fn verbindungs_url(&self) -> String {
        let trenner = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}peerId={}", self.url, trenner, self.eigene_id)
    }
}

#[async_trait]
impl SignalingConnector for WebSocketSignaling {
    async fn verbinden(&self) -> TransportResult<SignalingVerbindung> {
        let url = self.verbindungs_url();
        let (ws, _antwort) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::SignalingVerbindung(e.to_string()))?;
        tracing::info!(url = %self.url, peer = %self.eigene_id, "Signaling verbunden");

        let (mut ws_tx, mut ws_rx) = ws.split();
        let (sende_tx, mut sende_rx) = mpsc::channel::<SignalingNachricht>(FRAME_PUFFER);
        let (empfang_tx, empfang_rx) = mpsc::channel::<SignalingNachricht>(FRAME_PUFFER);
        let abbruch = CancellationToken::new();

        // Schreib-Task
        let token = abbruch.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    nachricht = sende_rx.recv() => {
                        let Some(nachricht) = nachricht else { break };
                        let text = match nachricht.to_json() {
                            Ok(text) => text,
                            Err(e) => {
                                tracing::warn!(fehler = %e, "Signaling-Frame nicht serialisierbar");
                                continue;
                            }
                        };
                        if let Err(e) = ws_tx.send(Message::Text(text)).await {
                            tracing::warn!(fehler = %e, "Signaling-Senden fehlgeschlagen");
                            break;
                        }
                    }
                }
            }
            let _ = ws_tx.send(Message::Close(None)).await;
            token.cancel();
            tracing::debug!("Signaling-Schreiber beendet");
        });

        // Lese-Task
        let token = abbruch.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    frame = ws_rx.next() => match frame {
                        Some(Ok(Message::Text(text))) => match SignalingNachricht::from_json(&text) {
                            Ok(nachricht) => {
                                if empfang_tx.send(nachricht).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(fehler = %e, "Unbekannter Signaling-Frame"),
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("Signaling-Server hat die Verbindung geschlossen");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(fehler = %e, "Signaling-Lesefehler");
                            break;
                        }
                    }
                }
            }
            token.cancel();
            tracing::debug!("Signaling-Leser beendet");
        });

        Ok(SignalingVerbindung {
            sender: sende_tx,
            empfaenger: empfang_rx,
            abbruch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_mit_peer_id() {
        let s = WebSocketSignaling::new("wss://relay.example/ws", PeerId::from("peerA"));
        assert_eq!(s.verbindungs_url(), "wss://relay.example/ws?peerId=peerA");

        let s = WebSocketSignaling::new("ws://localhost:8080/?room=1", PeerId::from("peerA"));
        assert_eq!(s.verbindungs_url(), "ws://localhost:8080/?room=1&peerId=peerA");
    }

    #[tokio::test]
    async fn unerreichbarer_server_ist_signaling_fehler() {
        let s = WebSocketSignaling::new("ws://127.0.0.1:1", PeerId::from("peerA"));
        let ergebnis = s.verbinden().await;
        assert!(matches!(ergebnis, Err(TransportError::SignalingVerbindung(_))));
    }
}
