//! Unit-Tests fuer die MessageQueue

use geheimpost_core::{MessageId, PeerId, RatchetMessage};

use crate::queue::MessageQueue;
use crate::types::{
    MessageStatus, PRIORITAET_HOCH, PRIORITAET_NIEDRIG, PRIORITAET_NORMAL,
};

fn peer(name: &str) -> PeerId {
    PeerId::from(name)
}

fn nachricht(inhalt: &[u8]) -> RatchetMessage {
    RatchetMessage::new(inhalt.to_vec())
}

#[test]
fn test_prioritaet_vor_reihenfolge() {
    let queue = MessageQueue::new();
    for (i, prio) in [50u8, 0, 100, 0].into_iter().enumerate() {
        queue.enqueue_outgoing(peer("b"), nachricht(&[i as u8]), prio);
    }

    let mut prios = Vec::new();
    let mut inhalte = Vec::new();
    while let Some(eintrag) = queue.dequeue_outgoing(None) {
        prios.push(eintrag.priority);
        inhalte.push(eintrag.message.as_bytes()[0]);
    }

    assert_eq!(prios, vec![0, 0, 50, 100]);
    // Gleiche Prioritaet bleibt FIFO
    assert_eq!(inhalte, vec![1, 3, 0, 2]);
}

#[test]
fn test_leere_queue_liefert_none() {
    let queue = MessageQueue::new();
    assert!(queue.dequeue_outgoing(None).is_none());
    assert!(queue.dequeue_incoming(None).is_none());
}

#[test]
fn test_dequeue_setzt_sending_und_nicht_doppelt() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);

    let eintrag = queue.dequeue_outgoing(None).expect("Eintrag erwartet");
    assert_eq!(eintrag.id, id);
    assert_eq!(eintrag.status, MessageStatus::Sending);
    assert!(queue.dequeue_outgoing(None).is_none());

    let stat = queue.get_statistics();
    assert_eq!(stat.ausgehend.gesamt, 1);
    assert_eq!(stat.ausgehend.in_bearbeitung, 1);
    assert_eq!(stat.ausgehend.wartend, 0);
}

#[test]
fn test_dequeue_nach_peer_gefiltert() {
    let queue = MessageQueue::new();
    queue.enqueue_outgoing(peer("a"), nachricht(b"fuer a"), PRIORITAET_HOCH);
    queue.enqueue_outgoing(peer("b"), nachricht(b"fuer b"), PRIORITAET_NIEDRIG);

    let eintrag = queue.dequeue_outgoing(Some(&peer("b"))).unwrap();
    assert_eq!(eintrag.message.as_bytes(), b"fuer b");
    assert!(queue.dequeue_outgoing(Some(&peer("b"))).is_none());
    assert!(queue.dequeue_outgoing(Some(&peer("c"))).is_none());
    assert_eq!(queue.pending_outgoing_for(&peer("a")), 1);
}

#[test]
fn test_gesendet_entfernt_eintrag() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);
    queue.dequeue_outgoing(None);

    assert!(queue.mark_outgoing_sent(&id));
    assert!(!queue.mark_outgoing_sent(&id));
    assert_eq!(queue.get_statistics().ausgehend.gesamt, 0);
}

#[test]
fn test_wiederholungen_bis_failed() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);

    for vorher in 0..2u32 {
        let eintrag = queue.dequeue_outgoing(None).expect("wieder wartend");
        assert_eq!(eintrag.retry_count, vorher);
        assert_eq!(
            queue.mark_outgoing_failed(&id, true),
            Some(MessageStatus::Pending)
        );
    }

    // Dritter Fehlschlag: retryCount 2 -> 3 und endgueltig FAILED
    let eintrag = queue.dequeue_outgoing(None).unwrap();
    assert_eq!(eintrag.retry_count, 2);
    assert_eq!(
        queue.mark_outgoing_failed(&id, true),
        Some(MessageStatus::Failed)
    );

    // FAILED wird nie wieder ausgeliefert, bleibt aber sichtbar
    assert!(queue.dequeue_outgoing(None).is_none());
    let failed = queue.failed_outgoing();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].retry_count, 3);
    assert_eq!(queue.get_statistics().ausgehend.fehlgeschlagen, 1);

    // Weitere Fehlschlaege aendern nichts mehr
    assert_eq!(
        queue.mark_outgoing_failed(&id, true),
        Some(MessageStatus::Failed)
    );
    assert_eq!(queue.failed_outgoing()[0].retry_count, 3);
}

#[test]
fn test_wiederholung_behaelt_position() {
    let queue = MessageQueue::new();
    let erste = queue.enqueue_outgoing(peer("b"), nachricht(b"1"), PRIORITAET_NORMAL);
    queue.enqueue_outgoing(peer("b"), nachricht(b"2"), PRIORITAET_NORMAL);

    queue.dequeue_outgoing(None);
    queue.mark_outgoing_failed(&erste, true);

    assert_eq!(queue.dequeue_outgoing(None).unwrap().id, erste);
}

#[test]
fn test_failed_ohne_wiederholung() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);
    queue.dequeue_outgoing(None);

    assert_eq!(
        queue.mark_outgoing_failed(&id, false),
        Some(MessageStatus::Failed)
    );
    assert_eq!(queue.failed_outgoing()[0].retry_count, 0);
}

#[test]
fn test_unbekannte_id() {
    let queue = MessageQueue::new();
    let id = MessageId::new();
    assert_eq!(queue.mark_outgoing_failed(&id, true), None);
    assert!(!queue.mark_outgoing_sent(&id));
    assert!(!queue.mark_incoming_processed(&id));
    assert_eq!(queue.mark_incoming_failed(&id), None);
}

#[test]
fn test_purge_failed() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);
    queue.enqueue_outgoing(peer("b"), nachricht(b"y"), PRIORITAET_NORMAL);
    queue.dequeue_outgoing(None);
    queue.mark_outgoing_failed(&id, false);

    let entfernt = queue.purge_failed_outgoing();
    assert_eq!(entfernt.len(), 1);
    assert_eq!(entfernt[0].id, id);
    assert!(queue.failed_outgoing().is_empty());
    assert_eq!(queue.get_statistics().ausgehend.gesamt, 1);
}

#[test]
fn test_eingehend_processing_ohne_wiederholung() {
    let queue = MessageQueue::new();
    let id = queue.enqueue_incoming(peer("a"), nachricht(b"rein"));

    let eintrag = queue.dequeue_incoming(None).unwrap();
    assert_eq!(eintrag.status, MessageStatus::Processing);
    assert_eq!(eintrag.priority, PRIORITAET_NORMAL);

    assert_eq!(queue.mark_incoming_failed(&id), Some(MessageStatus::Failed));
    assert!(queue.dequeue_incoming(None).is_none());

    let id2 = queue.enqueue_incoming(peer("a"), nachricht(b"zwei"));
    queue.dequeue_incoming(None);
    assert!(queue.mark_incoming_processed(&id2));

    let stat = queue.get_statistics();
    assert_eq!(stat.eingehend.gesamt, 1);
    assert_eq!(stat.eingehend.fehlgeschlagen, 1);
    assert_eq!(stat.ausgehend.gesamt, 0);
}

#[test]
fn test_statistik_veraendert_nichts() {
    let queue = MessageQueue::new();
    queue.enqueue_outgoing(peer("b"), nachricht(b"x"), PRIORITAET_NORMAL);
    let vorher = queue.get_statistics();
    let nachher = queue.get_statistics();
    assert_eq!(vorher, nachher);
    assert_eq!(vorher.ausgehend.wartend, 1);
}

#[test]
fn test_snapshot_und_restore_erhalten_felder() {
    let quelle = MessageQueue::new();
    quelle.enqueue_outgoing(peer("b"), nachricht(b"niedrig"), PRIORITAET_NIEDRIG);
    let hoch = quelle.enqueue_outgoing(peer("b"), nachricht(b"hoch"), PRIORITAET_HOCH);
    quelle.dequeue_outgoing(None);
    quelle.mark_outgoing_failed(&hoch, true);

    let snapshot = quelle.snapshot_outgoing();
    assert_eq!(snapshot[0].id, hoch);

    let ziel = MessageQueue::new();
    assert_eq!(ziel.restore_outgoing(snapshot.clone()), 2);
    assert_eq!(ziel.snapshot_outgoing(), snapshot);

    let erste = ziel.dequeue_outgoing(None).unwrap();
    assert_eq!(erste.id, hoch);
    assert_eq!(erste.retry_count, 1);
}
