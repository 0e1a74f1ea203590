//! geheimpost-transport – WebRTC-Verbindungsaufbau
//!
//! Dieses Crate implementiert:
//! - TransportSession: Zustandsmaschine fuer Signaling, Offer/Answer,
//!   Trickle-ICE und Data-Channel-Lebenszyklus
//! - SignalingConnector-Trait + WebSocketSignaling (tokio-tungstenite)
//! - PeerPlattform-Trait + WebRtcPlattform (webrtc)
//! - KandidatenPuffer fuer ICE-Kandidaten vor der Remote-Description
//!
//! ## Zustaende
//! ```text
//! Disconnected -> SignalingConnecting -> SignalingConnected -> OfferSent
//!     ^                                                           |
//!     |                                                           v
//!     +---- disconnect() ---- Connected <---- RemoteDescriptionSet
//! ```

pub mod config;
pub mod error;
pub mod kandidaten;
pub mod plattform;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod websocket;

#[cfg(any(test, feature = "testhilfe"))]
pub mod testhilfe;


// Bequeme Re-Exporte
pub use config::TransportKonfiguration;
pub use error::{TransportError, TransportResult};
pub use kandidaten::KandidatenPuffer;
pub use plattform::{DatenKanal, IceKandidat, PeerEreignis, PeerPlattform, PeerVerbindung, SdpTyp};
pub use rtc::WebRtcPlattform;
pub use session::{TransportEreignis, TransportSession, TransportZustand};
pub use signaling::{SignalingConnector, SignalingNachricht, SignalingTyp, SignalingVerbindung};
pub use websocket::WebSocketSignaling;
