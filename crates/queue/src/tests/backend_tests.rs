//! Unit-Tests fuer die Snapshot-Backends

use crate::backend::{DateiBackend, SnapshotBackend, SpeicherBackend};

fn temp_backend() -> (DateiBackend, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Temp-Verzeichnis konnte nicht erstellt werden");
    let backend = DateiBackend::new(dir.path().join("queue"));
    (backend, dir)
}

#[tokio::test]
async fn test_schreiben_und_lesen() {
    let (backend, dir) = temp_backend();

    backend
        .schreiben("outgoing_queue.enc", b"blob")
        .await
        .expect("Schreiben fehlgeschlagen");

    let gelesen = backend.lesen("outgoing_queue.enc").await.unwrap();
    assert_eq!(gelesen.as_deref(), Some(&b"blob"[..]));
    assert!(dir.path().join("queue/outgoing_queue.enc").exists());
    // Keine Temp-Datei bleibt zurueck
    assert!(!dir.path().join("queue/outgoing_queue.enc.tmp").exists());
}

#[tokio::test]
async fn test_fehlende_datei_ist_none() {
    let (backend, _dir) = temp_backend();
    assert_eq!(backend.lesen("incoming_queue.enc").await.unwrap(), None);
}

#[tokio::test]
async fn test_schreiben_ersetzt() {
    let (backend, _dir) = temp_backend();
    backend.schreiben("a", b"alt").await.unwrap();
    backend.schreiben("a", b"neu").await.unwrap();
    assert_eq!(backend.lesen("a").await.unwrap().unwrap(), b"neu");
}

#[tokio::test]
async fn test_speicher_backend_zaehlt() {
    let backend = SpeicherBackend::new();
    assert_eq!(backend.schreibvorgaenge(), 0);
    backend.schreiben("a", b"1").await.unwrap();
    backend.schreiben("b", b"2").await.unwrap();
    assert_eq!(backend.schreibvorgaenge(), 2);
    assert_eq!(backend.inhalt("a").unwrap(), b"1");
    assert!(backend.lesen("c").await.unwrap().is_none());
}
