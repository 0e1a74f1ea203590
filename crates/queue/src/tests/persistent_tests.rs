//! Tests fuer den persistenten Queue-Manager

use std::sync::Arc;
use std::time::Duration;

use geheimpost_core::{EncryptedStorage, PeerId, RatchetMessage};

use super::TestAblage;
use crate::backend::{DateiBackend, SnapshotBackend, SpeicherBackend};
use crate::persistent::{PersistentQueueManager, PersistenzOptionen, WiederherstellungsModus};
use crate::snapshot::{PersistedQueueSnapshot, DATEI_AUSGEHEND, DATEI_EINGEHEND};
use crate::types::{MessageStatus, PRIORITAET_NORMAL};

fn ablage() -> Arc<dyn EncryptedStorage> {
    Arc::new(TestAblage { schluessel: 0x5C })
}

fn manager(backend: Arc<dyn SnapshotBackend>, optionen: PersistenzOptionen) -> PersistentQueueManager {
    PersistentQueueManager::neu(backend, ablage(), optionen)
}

fn nachricht(i: u8) -> RatchetMessage {
    RatchetMessage::new(vec![i; 4])
}

/// Legt `wartend` PENDING- und `in_flug` SENDING-Eintraege an und speichert
async fn gemischter_zustand(backend: Arc<SpeicherBackend>, wartend: usize, in_flug: usize) {
    let m = manager(backend, PersistenzOptionen::default());
    m.initialize(false, false).await;
    for i in 0..(wartend + in_flug) {
        m.enqueue_outgoing(PeerId::from("peerB"), nachricht(i as u8), PRIORITAET_NORMAL);
    }
    for _ in 0..in_flug {
        m.dequeue_outgoing(None).expect("Eintrag erwartet");
    }
    m.enqueue_incoming(PeerId::from("peerB"), nachricht(200));
    m.dequeue_incoming(None);
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_nur_wartende_werden_wiederhergestellt() {
    let backend = Arc::new(SpeicherBackend::new());
    gemischter_zustand(Arc::clone(&backend), 3, 2).await;

    let m = manager(backend, PersistenzOptionen::default());
    let bericht = m.initialize(true, false).await;

    assert_eq!(bericht.ausgehend, 3);
    assert_eq!(bericht.eingehend, 0);
    let stat = m.get_statistics();
    assert_eq!(stat.ausgehend.gesamt, 3);
    assert_eq!(stat.ausgehend.wartend, 3);
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_in_flug_wiederholen() {
    let backend = Arc::new(SpeicherBackend::new());
    gemischter_zustand(Arc::clone(&backend), 3, 2).await;

    let optionen = PersistenzOptionen {
        modus: WiederherstellungsModus::InFlugWiederholen,
        ..Default::default()
    };
    let m = manager(backend, optionen);
    let bericht = m.initialize(true, false).await;

    assert_eq!(bericht.ausgehend, 5);
    assert_eq!(bericht.eingehend, 1);
    assert_eq!(m.get_statistics().ausgehend.wartend, 5);
    assert_eq!(
        m.dequeue_incoming(None).map(|e| e.status),
        Some(MessageStatus::Processing)
    );
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ohne_auto_restore_bleibt_leer() {
    let backend = Arc::new(SpeicherBackend::new());
    gemischter_zustand(Arc::clone(&backend), 2, 0).await;

    let m = manager(backend, PersistenzOptionen::default());
    let bericht = m.initialize(false, false).await;
    assert_eq!(bericht.ausgehend, 0);
    assert_eq!(m.get_statistics().ausgehend.gesamt, 0);
}

#[tokio::test]
async fn test_failed_behalten() {
    let backend = Arc::new(SpeicherBackend::new());
    {
        let m = manager(backend.clone(), PersistenzOptionen::default());
        m.initialize(false, false).await;
        let id = m.enqueue_outgoing(PeerId::from("peerB"), nachricht(1), PRIORITAET_NORMAL);
        m.dequeue_outgoing(None);
        m.mark_outgoing_failed(&id, false);
        m.shutdown().await.unwrap();
    }

    let standard = manager(backend.clone(), PersistenzOptionen::default());
    assert_eq!(standard.initialize(true, false).await.ausgehend, 0);

    let optionen = PersistenzOptionen {
        failed_behalten: true,
        ..Default::default()
    };
    let behalten = manager(backend, optionen);
    assert_eq!(behalten.initialize(true, false).await.ausgehend, 1);
    assert_eq!(behalten.queue().failed_outgoing().len(), 1);
    assert!(behalten.dequeue_outgoing(None).is_none());
}

#[tokio::test]
async fn test_snapshot_format() {
    let backend = Arc::new(SpeicherBackend::new());
    let m = manager(backend.clone(), PersistenzOptionen::default());
    m.initialize(false, false).await;
    m.enqueue_outgoing(PeerId::from("peerB"), nachricht(7), 0);
    m.save_now().await.unwrap();

    let blob = backend.inhalt(DATEI_AUSGEHEND).expect("Datei erwartet");
    let json = TestAblage { schluessel: 0x5C }.decrypt(&blob).unwrap();
    let wert: serde_json::Value = serde_json::from_slice(&json).unwrap();

    assert!(wert["lastUpdated"].as_i64().unwrap() > 0);
    assert_eq!(wert["messages"][0]["peerId"], "peerB");
    assert_eq!(wert["messages"][0]["status"], "PENDING");
    assert!(backend.inhalt(DATEI_EINGEHEND).is_some());
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_kaputte_dateien_fail_open() {
    let backend = Arc::new(SpeicherBackend::new());
    // Nicht entschluesselbar
    backend.setzen(DATEI_AUSGEHEND, b"muell".to_vec());
    // Entschluesselbar, aber kein gueltiges JSON
    let kaputt = TestAblage { schluessel: 0x5C }.encrypt(b"{kein json").unwrap();
    backend.setzen(DATEI_EINGEHEND, kaputt);

    let m = manager(backend, PersistenzOptionen::default());
    let bericht = m.initialize(true, false).await;
    assert_eq!(bericht.ausgehend, 0);
    assert_eq!(bericht.eingehend, 0);

    // Queue funktioniert trotzdem
    m.enqueue_outgoing(PeerId::from("peerB"), nachricht(1), PRIORITAET_NORMAL);
    assert_eq!(m.get_statistics().ausgehend.gesamt, 1);
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_falscher_schluessel_fail_open() {
    let backend = Arc::new(SpeicherBackend::new());
    gemischter_zustand(Arc::clone(&backend), 2, 0).await;

    let m = PersistentQueueManager::neu(
        backend,
        Arc::new(TestAblage { schluessel: 0x01 }),
        PersistenzOptionen::default(),
    );
    assert_eq!(m.initialize(true, false).await.ausgehend, 0);
}

#[tokio::test]
async fn test_mutation_plant_speichern() {
    let backend = Arc::new(SpeicherBackend::new());
    let m = manager(backend.clone(), PersistenzOptionen::default());
    m.initialize(false, false).await;

    m.enqueue_outgoing(PeerId::from("peerB"), nachricht(1), PRIORITAET_NORMAL);

    let mut gespeichert = false;
    for _ in 0..50 {
        if backend.inhalt(DATEI_AUSGEHEND).is_some() {
            gespeichert = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(gespeichert, "Hintergrund-Speichern erwartet");
    m.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_autosave_laeuft_und_stoppt_nach_shutdown() {
    let backend = Arc::new(SpeicherBackend::new());
    let optionen = PersistenzOptionen {
        autosave_intervall: Duration::from_millis(20),
        ..Default::default()
    };
    let m = manager(backend.clone(), optionen);
    m.initialize(false, true).await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(backend.schreibvorgaenge() >= 2, "Autosave erwartet");

    m.shutdown().await.unwrap();
    let nach_shutdown = backend.schreibvorgaenge();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.schreibvorgaenge(), nach_shutdown);

    // Mutationen nach dem Shutdown loesen kein Speichern mehr aus
    m.enqueue_outgoing(PeerId::from("peerB"), nachricht(1), PRIORITAET_NORMAL);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.schreibvorgaenge(), nach_shutdown);
}

#[tokio::test]
async fn test_shutdown_idempotent() {
    let backend = Arc::new(SpeicherBackend::new());
    let m = manager(backend.clone(), PersistenzOptionen::default());
    m.initialize(false, true).await;

    m.shutdown().await.unwrap();
    let nach_erstem = backend.schreibvorgaenge();
    m.shutdown().await.unwrap();
    assert!(m.ist_heruntergefahren());
    assert_eq!(backend.schreibvorgaenge(), nach_erstem);
}

#[tokio::test]
async fn test_datei_backend_ueber_neustart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let m = manager(
            Arc::new(DateiBackend::new(dir.path())),
            PersistenzOptionen::default(),
        );
        m.initialize(true, false).await;
        m.enqueue_outgoing(PeerId::from("peerB"), nachricht(1), 100);
        m.enqueue_outgoing(PeerId::from("peerB"), nachricht(2), 0);
        m.shutdown().await.unwrap();
    }

    let m = manager(
        Arc::new(DateiBackend::new(dir.path())),
        PersistenzOptionen::default(),
    );
    assert_eq!(m.initialize(true, false).await.ausgehend, 2);
    let erste = m.dequeue_outgoing(None).unwrap();
    assert_eq!(erste.message, nachricht(2));
    m.shutdown().await.unwrap();
}

#[test]
fn test_snapshot_versiegeln_oeffnen() {
    let ablage = TestAblage { schluessel: 0x33 };
    let snapshot = PersistedQueueSnapshot::jetzt(Vec::new());
    let blob = snapshot.versiegeln(&ablage).unwrap();
    assert_eq!(PersistedQueueSnapshot::oeffnen(&blob, &ablage).unwrap(), snapshot);
}
