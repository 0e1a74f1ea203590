//! Konfiguration einer Transport-Session
//!
//! Zeiten werden in Millisekunden angegeben, damit sie direkt aus TOML
//! gelesen werden koennen.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Einstellungen fuer Verbindungsaufbau und Ereignis-Puffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportKonfiguration {
    /// STUN-Server (Unified-Plan)
    pub stun_server: Vec<String>,
    /// Zeitlimit pro Signaling-Verbindungsversuch
    pub signaling_timeout_ms: u64,
    /// Anzahl Signaling-Verbindungsversuche
    pub signaling_versuche: u32,
    /// Feste Pause zwischen zwei Versuchen
    pub signaling_pause_ms: u64,
    /// Wartezeit auf die Answer
    pub answer_timeout_ms: u64,
    /// Wartezeit bis der Data-Channel offen ist
    pub kanal_timeout_ms: u64,
    /// Obergrenze fuer den gesamten Verbindungsaufbau
    pub gesamt_timeout_ms: u64,
    /// Kapazitaet des Ereignis-Streams
    pub ereignis_puffer: usize,
    /// Label des Data-Channels
    pub kanal_label: String,
}

impl Default for TransportKonfiguration {
    fn default() -> Self {
        Self {
            stun_server: vec!["stun:stun.l.google.com:19302".into()],
            signaling_timeout_ms: 5_000,
            signaling_versuche: 3,
            signaling_pause_ms: 1_000,
            answer_timeout_ms: 10_000,
            kanal_timeout_ms: 10_000,
            gesamt_timeout_ms: 30_000,
            ereignis_puffer: 64,
            kanal_label: "geheimpost".into(),
        }
    }
}

impl TransportKonfiguration {
    pub fn signaling_timeout(&self) -> Duration {
        Duration::from_millis(self.signaling_timeout_ms)
    }

    pub fn signaling_pause(&self) -> Duration {
        Duration::from_millis(self.signaling_pause_ms)
    }

    pub fn answer_timeout(&self) -> Duration {
        Duration::from_millis(self.answer_timeout_ms)
    }

    pub fn kanal_timeout(&self) -> Duration {
        Duration::from_millis(self.kanal_timeout_ms)
    }

    pub fn gesamt_timeout(&self) -> Duration {
        Duration::from_millis(self.gesamt_timeout_ms)
    }
}
