//! Datentypen der Nachrichten-Queue

use geheimpost_core::{jetzt_ms, MessageId, PeerId, RatchetMessage};
use serde::{Deserialize, Serialize};

/// Hoechste Prioritaet (wird zuerst ausgeliefert)
pub const PRIORITAET_HOCH: u8 = 0;
/// Standard-Prioritaet
pub const PRIORITAET_NORMAL: u8 = 50;
/// Niedrigste Prioritaet
pub const PRIORITAET_NIEDRIG: u8 = 100;

/// Maximale Anzahl Wiederholungen einer ausgehenden Nachricht
pub const MAX_WIEDERHOLUNGEN: u32 = 3;

/// Zustand eines Queue-Eintrags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Wartet auf Auslieferung bzw. Verarbeitung
    Pending,
    /// Ausgehend: wird gerade gesendet
    Sending,
    /// Eingehend: wird gerade verarbeitet
    Processing,
    Completed,
    /// Endgueltig gescheitert, wird nicht mehr ausgeliefert
    Failed,
}

impl MessageStatus {
    /// Gesendet bzw. in Verarbeitung
    pub fn ist_in_flug(self) -> bool {
        matches!(self, Self::Sending | Self::Processing)
    }
}

/// Ein Eintrag der Queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    pub id: MessageId,
    pub peer_id: PeerId,
    pub message: RatchetMessage,
    /// Einreihe-Zeitpunkt (Unix-Millisekunden)
    pub timestamp: i64,
    /// 0 = hoechste Prioritaet
    pub priority: u8,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: MessageStatus,
}

impl QueuedMessage {
    /// Neuer wartender Eintrag
    pub fn neu(peer_id: PeerId, message: RatchetMessage, priority: u8) -> Self {
        Self {
            id: MessageId::new(),
            peer_id,
            message,
            timestamp: jetzt_ms(),
            priority,
            retry_count: 0,
            max_retries: MAX_WIEDERHOLUNGEN,
            status: MessageStatus::Pending,
        }
    }
}

/// Groessen einer Queue-Richtung
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichtungsStatistik {
    pub gesamt: usize,
    pub wartend: usize,
    pub in_bearbeitung: usize,
    pub fehlgeschlagen: usize,
}

/// Groessen beider Queues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistik {
    pub ausgehend: RichtungsStatistik,
    pub eingehend: RichtungsStatistik,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_json_namen() {
        assert_eq!(serde_json::to_string(&MessageStatus::Pending).unwrap(), "\"PENDING\"");
        assert_eq!(serde_json::to_string(&MessageStatus::Sending).unwrap(), "\"SENDING\"");
        assert_eq!(
            serde_json::to_string(&MessageStatus::Processing).unwrap(),
            "\"PROCESSING\""
        );
        assert_eq!(serde_json::to_string(&MessageStatus::Failed).unwrap(), "\"FAILED\"");
    }

    #[test]
    fn eintrag_camel_case() {
        let eintrag = QueuedMessage::neu(
            PeerId::from("peerB"),
            RatchetMessage::new(vec![1, 2, 3]),
            PRIORITAET_NORMAL,
        );
        let json = serde_json::to_value(&eintrag).unwrap();
        assert_eq!(json["peerId"], "peerB");
        assert_eq!(json["retryCount"], 0);
        assert_eq!(json["maxRetries"], 3);
        assert_eq!(json["priority"], 50);
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["message"], "AQID");

        let zurueck: QueuedMessage = serde_json::from_value(json).unwrap();
        assert_eq!(zurueck, eintrag);
    }
}
