//! Priorisierte Nachrichten-Queue
//!
//! Zwei unabhaengige Richtungen, jede hinter einem eigenen Lock. Die Locks
//! werden nur fuer die Mutation im Speicher gehalten, nie ueber ein `.await`.
//!
//! Reihenfolge: Prioritaet aufsteigend, innerhalb gleicher Prioritaet nach
//! Einfuege-Reihenfolge. Jeder Eintrag ist per ID adressierbar; die Position
//! `(prioritaet, seq)` haelt die Reihenfolge, eine zweite Menge enthaelt nur
//! die wartenden Positionen.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use geheimpost_core::{MessageId, PeerId, RatchetMessage};
use parking_lot::Mutex;

use crate::types::{
    MessageStatus, QueueStatistik, QueuedMessage, RichtungsStatistik, PRIORITAET_NORMAL,
};

type Position = (u8, u64);

struct Slot {
    position: Position,
    nachricht: QueuedMessage,
}

/// Eine Richtung der Queue
#[derive(Default)]
struct Richtung {
    eintraege: HashMap<MessageId, Slot>,
    reihenfolge: BTreeMap<Position, MessageId>,
    wartend: BTreeSet<Position>,
    naechste_seq: u64,
}

impl Richtung {
    fn einfuegen(&mut self, nachricht: QueuedMessage) -> MessageId {
        let position = (nachricht.priority, self.naechste_seq);
        self.naechste_seq += 1;

        let id = nachricht.id;
        if nachricht.status == MessageStatus::Pending {
            self.wartend.insert(position);
        }
        self.reihenfolge.insert(position, id);
        if let Some(alt) = self.eintraege.insert(id, Slot { position, nachricht }) {
            // Doppelte ID: alten Eintrag vollstaendig ersetzen
            self.reihenfolge.remove(&alt.position);
            self.wartend.remove(&alt.position);
        }
        id
    }

    /// Erster wartender Eintrag (optional fuer einen Peer), Status wird umgesetzt
    fn entnehmen(&mut self, peer: Option<&PeerId>, neuer_status: MessageStatus) -> Option<QueuedMessage> {
        let position = self.wartend.iter().copied().find(|pos| match peer {
            None => true,
            Some(peer) => self
                .reihenfolge
                .get(pos)
                .and_then(|id| self.eintraege.get(id))
                .is_some_and(|slot| &slot.nachricht.peer_id == peer),
        })?;

        self.wartend.remove(&position);
        let id = self.reihenfolge.get(&position)?;
        let slot = self.eintraege.get_mut(id)?;
        slot.nachricht.status = neuer_status;
        Some(slot.nachricht.clone())
    }

    fn entfernen(&mut self, id: &MessageId) -> Option<QueuedMessage> {
        let slot = self.eintraege.remove(id)?;
        self.reihenfolge.remove(&slot.position);
        self.wartend.remove(&slot.position);
        Some(slot.nachricht)
    }

    fn fehlschlag(&mut self, id: &MessageId, wiederholen: bool) -> Option<MessageStatus> {
        let slot = self.eintraege.get_mut(id)?;
        let nachricht = &mut slot.nachricht;

        if nachricht.status == MessageStatus::Failed {
            return Some(MessageStatus::Failed);
        }

        if wiederholen {
            nachricht.retry_count = (nachricht.retry_count + 1).min(nachricht.max_retries);
        }
        if wiederholen && nachricht.retry_count < nachricht.max_retries {
            nachricht.status = MessageStatus::Pending;
            self.wartend.insert(slot.position);
        } else {
            nachricht.status = MessageStatus::Failed;
            self.wartend.remove(&slot.position);
        }
        Some(nachricht.status)
    }

    fn in_reihenfolge(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.reihenfolge
            .values()
            .filter_map(|id| self.eintraege.get(id))
            .map(|slot| &slot.nachricht)
    }

    fn statistik(&self) -> RichtungsStatistik {
        let mut stat = RichtungsStatistik {
            gesamt: self.eintraege.len(),
            wartend: self.wartend.len(),
            ..Default::default()
        };
        for slot in self.eintraege.values() {
            match slot.nachricht.status {
                s if s.ist_in_flug() => stat.in_bearbeitung += 1,
                MessageStatus::Failed => stat.fehlgeschlagen += 1,
                _ => {}
            }
        }
        stat
    }
}

/// Ausgehende und eingehende Queue
#[derive(Default)]
pub struct MessageQueue {
    ausgehend: Mutex<Richtung>,
    eingehend: Mutex<Richtung>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Ausgehend
    // -----------------------------------------------------------------------

    /// Reiht eine ausgehende Nachricht ein (schlaegt nie fehl)
    pub fn enqueue_outgoing(&self, peer: PeerId, message: RatchetMessage, priority: u8) -> MessageId {
        let eintrag = QueuedMessage::neu(peer, message, priority);
        tracing::trace!(id = %eintrag.id, peer = %eintrag.peer_id, priority, "Ausgehend eingereiht");
        self.ausgehend.lock().einfuegen(eintrag)
    }

    /// Naechste wartende ausgehende Nachricht, atomar auf `SENDING` gesetzt
    pub fn dequeue_outgoing(&self, peer: Option<&PeerId>) -> Option<QueuedMessage> {
        self.ausgehend.lock().entnehmen(peer, MessageStatus::Sending)
    }

    /// Erfolgreich gesendet: Eintrag wird entfernt
    pub fn mark_outgoing_sent(&self, id: &MessageId) -> bool {
        self.ausgehend.lock().entfernen(id).is_some()
    }

    /// Senden gescheitert
    ///
    /// Mit `retry` wird `retry_count` erhoeht. Liegt er danach noch unter
    /// `max_retries`, wird der Eintrag an seiner Position wieder wartend,
    /// sonst (oder ohne `retry`) endgueltig `FAILED`. Bei `max_retries = 3`
    /// scheitert der Eintrag also beim dritten Fehlschlag. `None` fuer
    /// unbekannte IDs.
    pub fn mark_outgoing_failed(&self, id: &MessageId, retry: bool) -> Option<MessageStatus> {
        let status = self.ausgehend.lock().fehlschlag(id, retry);
        if status == Some(MessageStatus::Failed) {
            tracing::warn!(id = %id, "Ausgehende Nachricht endgueltig gescheitert");
        }
        status
    }

    /// Wartende ausgehende Nachrichten fuer einen Peer
    pub fn pending_outgoing_for(&self, peer: &PeerId) -> usize {
        self.ausgehend
            .lock()
            .in_reihenfolge()
            .filter(|m| m.status == MessageStatus::Pending && &m.peer_id == peer)
            .count()
    }

    /// Endgueltig gescheiterte ausgehende Nachrichten
    pub fn failed_outgoing(&self) -> Vec<QueuedMessage> {
        self.ausgehend
            .lock()
            .in_reihenfolge()
            .filter(|m| m.status == MessageStatus::Failed)
            .cloned()
            .collect()
    }

    /// Entfernt alle gescheiterten ausgehenden Nachrichten und gibt sie zurueck
    pub fn purge_failed_outgoing(&self) -> Vec<QueuedMessage> {
        let mut richtung = self.ausgehend.lock();
        let ids: Vec<MessageId> = richtung
            .in_reihenfolge()
            .filter(|m| m.status == MessageStatus::Failed)
            .map(|m| m.id)
            .collect();
        ids.iter().filter_map(|id| richtung.entfernen(id)).collect()
    }

    pub fn snapshot_outgoing(&self) -> Vec<QueuedMessage> {
        self.ausgehend.lock().in_reihenfolge().cloned().collect()
    }

    /// Fuegt persistierte Eintraege unveraendert wieder ein
    pub fn restore_outgoing(&self, eintraege: Vec<QueuedMessage>) -> usize {
        let mut richtung = self.ausgehend.lock();
        let anzahl = eintraege.len();
        for eintrag in eintraege {
            richtung.einfuegen(eintrag);
        }
        anzahl
    }

    // -----------------------------------------------------------------------
    // Eingehend
    // -----------------------------------------------------------------------

    /// Reiht eine eingehende Nachricht ein (feste Prioritaet NORMAL)
    pub fn enqueue_incoming(&self, peer: PeerId, message: RatchetMessage) -> MessageId {
        let eintrag = QueuedMessage::neu(peer, message, PRIORITAET_NORMAL);
        tracing::trace!(id = %eintrag.id, peer = %eintrag.peer_id, "Eingehend eingereiht");
        self.eingehend.lock().einfuegen(eintrag)
    }

    /// Naechste wartende eingehende Nachricht, atomar auf `PROCESSING` gesetzt
    pub fn dequeue_incoming(&self, peer: Option<&PeerId>) -> Option<QueuedMessage> {
        self.eingehend.lock().entnehmen(peer, MessageStatus::Processing)
    }

    pub fn mark_incoming_processed(&self, id: &MessageId) -> bool {
        self.eingehend.lock().entfernen(id).is_some()
    }

    /// Verarbeitung gescheitert: keine automatische Wiederholung
    pub fn mark_incoming_failed(&self, id: &MessageId) -> Option<MessageStatus> {
        self.eingehend.lock().fehlschlag(id, false)
    }

    pub fn snapshot_incoming(&self) -> Vec<QueuedMessage> {
        self.eingehend.lock().in_reihenfolge().cloned().collect()
    }

    pub fn restore_incoming(&self, eintraege: Vec<QueuedMessage>) -> usize {
        let mut richtung = self.eingehend.lock();
        let anzahl = eintraege.len();
        for eintrag in eintraege {
            richtung.einfuegen(eintrag);
        }
        anzahl
    }

    // -----------------------------------------------------------------------
    // Statistik
    // -----------------------------------------------------------------------

    /// Groessen beider Richtungen, ohne Zustand zu veraendern
    pub fn get_statistics(&self) -> QueueStatistik {
        QueueStatistik {
            ausgehend: self.ausgehend.lock().statistik(),
            eingehend: self.eingehend.lock().statistik(),
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("statistik", &self.get_statistics())
            .finish()
    }
}
