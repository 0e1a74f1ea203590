//! Knoten-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Knoten ohne Konfigurationsdatei
//! lauffaehig ist (mit fluechtigem Schluessel und ohne Peers).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use geheimpost_core::PeerId;
use geheimpost_queue::{PersistenzOptionen, WiederherstellungsModus};
use geheimpost_transport::TransportKonfiguration;
use serde::{Deserialize, Serialize};

use crate::error::{KnotenError, KnotenResult};

/// Vollstaendige Knoten-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Eigene Identitaet
    pub knoten: KnotenEinstellungen,
    /// Bekannte Peers: Peer-ID -> oeffentlicher X25519-Schluessel (Base64)
    pub peers: BTreeMap<String, String>,
    pub signaling: SignalingEinstellungen,
    pub transport: TransportKonfiguration,
    pub queue: QueueEinstellungen,
    pub zustellung: ZustellungsEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Eigene Identitaet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnotenEinstellungen {
    /// Eigene Peer-ID beim Signaling
    pub peer_id: String,
    /// Privater X25519-Schluessel (Base64, 32 Bytes). Fehlt er, wird ein
    /// fluechtiger Schluessel erzeugt.
    pub privater_schluessel: Option<String>,
}

impl Default for KnotenEinstellungen {
    fn default() -> Self {
        Self {
            peer_id: "peerA".into(),
            privater_schluessel: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// WebSocket-URL des Signaling-Relays (ws:// oder wss://)
    pub url: String,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/signaling".into(),
        }
    }
}

/// Persistenz der Nachrichten-Queue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueEinstellungen {
    /// Verzeichnis fuer die verschluesselten Snapshots
    pub verzeichnis: PathBuf,
    /// Gespeicherten Zustand beim Start laden
    pub auto_restore: bool,
    /// Periodischen Autosave starten
    pub autosave: bool,
    pub autosave_sekunden: u64,
    /// Umgang mit Eintraegen die beim Speichern in Bearbeitung waren
    pub modus: WiederherstellungsModus,
    /// Gescheiterte Eintraege beim Wiederherstellen behalten
    pub failed_behalten: bool,
    /// Ablage-Schluessel (Base64, 32 Bytes). Fehlt er, wird er aus dem
    /// privaten Schluessel abgeleitet.
    pub schluessel: Option<String>,
}

impl Default for QueueEinstellungen {
    fn default() -> Self {
        Self {
            verzeichnis: PathBuf::from("geheimpost-daten"),
            auto_restore: true,
            autosave: true,
            autosave_sekunden: 10,
            modus: WiederherstellungsModus::NurWartend,
            failed_behalten: false,
            schluessel: None,
        }
    }
}

impl QueueEinstellungen {
    pub fn persistenz_optionen(&self) -> PersistenzOptionen {
        PersistenzOptionen {
            autosave_intervall: Duration::from_secs(self.autosave_sekunden.max(1)),
            modus: self.modus,
            failed_behalten: self.failed_behalten,
        }
    }
}

/// Zustellung pro Peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZustellungsEinstellungen {
    /// Aufeinanderfolgende gescheiterte Verbindungsaufbauten bis zur Aufgabe
    pub max_reconnects: u32,
    /// Feste Pause zwischen zwei Verbindungsaufbauten
    pub reconnect_pause_ms: u64,
    /// Abfrage-Intervall der Queues
    pub abfrage_intervall_ms: u64,
}

impl Default for ZustellungsEinstellungen {
    fn default() -> Self {
        Self {
            max_reconnects: 5,
            reconnect_pause_ms: 2_000,
            abfrage_intervall_ms: 250,
        }
    }
}

impl ZustellungsEinstellungen {
    pub fn reconnect_pause(&self) -> Duration {
        Duration::from_millis(self.reconnect_pause_ms)
    }

    pub fn abfrage_intervall(&self) -> Duration {
        Duration::from_millis(self.abfrage_intervall_ms.max(1))
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl NodeConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    pub fn eigene_id(&self) -> PeerId {
        PeerId::new(self.knoten.peer_id.clone())
    }

    /// Dekodierte Peer-Schluessel
    pub fn peer_schluessel(&self) -> KnotenResult<Vec<(PeerId, Vec<u8>)>> {
        self.peers
            .iter()
            .map(|(id, schluessel)| {
                let bytes = base64_dekodieren(schluessel, &format!("peers.{id}"))?;
                Ok((PeerId::new(id.clone()), bytes))
            })
            .collect()
    }
}

/// Dekodiert einen Base64-Wert aus der Konfiguration
pub fn base64_dekodieren(wert: &str, feld: &str) -> KnotenResult<Vec<u8>> {
    BASE64
        .decode(wert.trim())
        .map_err(|e| KnotenError::Konfiguration(format!("{feld}: kein gueltiges Base64 ({e})")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.knoten.peer_id, "peerA");
        assert!(cfg.peers.is_empty());
        assert_eq!(cfg.transport.answer_timeout_ms, 10_000);
        assert_eq!(cfg.queue.modus, WiederherstellungsModus::NurWartend);
        assert_eq!(cfg.zustellung.max_reconnects, 5);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [knoten]
            peer_id = "peerB"

            [peers]
            peerA = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="

            [signaling]
            url = "wss://relay.example/ws"

            [transport]
            answer_timeout_ms = 2500

            [queue]
            modus = "in_flug_wiederholen"
            autosave_sekunden = 3
        "#;
        let cfg: NodeConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.eigene_id(), PeerId::from("peerB"));
        assert_eq!(cfg.signaling.url, "wss://relay.example/ws");
        assert_eq!(cfg.transport.answer_timeout_ms, 2_500);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.transport.signaling_versuche, 3);
        assert_eq!(cfg.queue.modus, WiederherstellungsModus::InFlugWiederholen);
        assert_eq!(
            cfg.queue.persistenz_optionen().autosave_intervall,
            Duration::from_secs(3)
        );

        let peers = cfg.peer_schluessel().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].0, PeerId::from("peerA"));
        assert_eq!(peers[0].1, vec![0u8; 32]);
    }

    #[test]
    fn ungueltiges_base64() {
        let mut cfg = NodeConfig::default();
        cfg.peers.insert("peerB".into(), "%%%".into());
        assert!(matches!(
            cfg.peer_schluessel(),
            Err(KnotenError::Konfiguration(_))
        ));
    }

    #[test]
    fn fehlende_datei_liefert_standard() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("fehlt.toml");
        let cfg = NodeConfig::laden(pfad.to_str().unwrap()).unwrap();
        assert_eq!(cfg.knoten.peer_id, "peerA");
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("kaputt.toml");
        std::fs::write(&pfad, "[knoten\npeer_id = ").unwrap();
        assert!(NodeConfig::laden(pfad.to_str().unwrap()).is_err());
    }
}
