//! Verschluesselte Ablage der Ratchet-Sitzungen
//!
//! Liegt neben den Queue-Snapshots im selben Backend und nutzt denselben
//! Ablage-Schluessel. Wie bei der Queue schreibt ein Hintergrund-Task, mehrere
//! Signale vor dem naechsten Schreiben werden zusammengefasst. Ein fehlender
//! oder unlesbarer Stand beim Start ergibt leere Sitzungen.

use std::sync::Arc;

use geheimpost_core::EncryptedStorage;
use geheimpost_crypto::{RatchetVerwaltung, VerwaltungsAbbild};
use geheimpost_queue::SnapshotBackend;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::KnotenResult;

/// Dateiname des Sitzungs-Snapshots
pub const DATEI_SITZUNGEN: &str = "ratchet_sessions.enc";

pub struct RatchetAblage {
    verwaltung: Arc<RatchetVerwaltung>,
    backend: Arc<dyn SnapshotBackend>,
    ablage: Arc<dyn EncryptedStorage>,
    schreib_lock: tokio::sync::Mutex<()>,
    signal: Notify,
}

impl RatchetAblage {
    pub fn neu(
        verwaltung: Arc<RatchetVerwaltung>,
        backend: Arc<dyn SnapshotBackend>,
        ablage: Arc<dyn EncryptedStorage>,
    ) -> Self {
        Self {
            verwaltung,
            backend,
            ablage,
            schreib_lock: tokio::sync::Mutex::new(()),
            signal: Notify::new(),
        }
    }

    /// Uebernimmt den gespeicherten Stand, gibt die Anzahl der Sitzungen zurueck
    pub async fn laden(&self) -> usize {
        let daten = match self.backend.lesen(DATEI_SITZUNGEN).await {
            Ok(Some(daten)) => daten,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(fehler = %e, "Ratchet-Sitzungen nicht lesbar, starte leer");
                return 0;
            }
        };

        let abbild = self
            .ablage
            .decrypt(&daten)
            .map_err(|e| e.to_string())
            .and_then(|klartext| {
                serde_json::from_slice::<VerwaltungsAbbild>(&klartext).map_err(|e| e.to_string())
            });
        match abbild {
            Ok(abbild) => {
                let anzahl = self.verwaltung.wiederherstellen(abbild);
                tracing::debug!(sitzungen = anzahl, "Ratchet-Sitzungen wiederhergestellt");
                anzahl
            }
            Err(fehler) => {
                tracing::warn!(%fehler, "Ratchet-Sitzungen ungueltig, starte leer");
                0
            }
        }
    }

    /// Schreibt den aktuellen Stand sofort
    pub async fn speichern(&self) -> KnotenResult<()> {
        let _schreiber = self.schreib_lock.lock().await;

        let abbild = self.verwaltung.abbild()?;
        let klartext = serde_json::to_vec(&abbild)?;
        let blob = self.ablage.encrypt(&klartext)?;
        self.backend.schreiben(DATEI_SITZUNGEN, &blob).await?;

        tracing::debug!(peers = abbild.peers.len(), "Ratchet-Sitzungen gespeichert");
        Ok(())
    }

    /// Plant ein Speichern durch den Hintergrund-Schreiber
    pub fn vormerken(&self) {
        self.signal.notify_one();
    }

    pub fn schreiber_starten(self: &Arc<Self>, abbruch: CancellationToken) -> JoinHandle<()> {
        let ablage = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = abbruch.cancelled() => break,
                    _ = ablage.signal.notified() => {
                        if let Err(e) = ablage.speichern().await {
                            tracing::warn!(fehler = %e, "Ratchet-Sitzungen konnten nicht gespeichert werden");
                        }
                    }
                }
            }
            tracing::trace!("Sitzungs-Schreiber beendet");
        })
    }
}

impl std::fmt::Debug for RatchetAblage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetAblage")
            .field("verwaltung", &self.verwaltung)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geheimpost_core::PeerId;
    use geheimpost_crypto::{RuhendeVerschluesselung, X25519KeyPair};
    use geheimpost_queue::SpeicherBackend;

    fn verwaltung(eigen: &X25519KeyPair, peer: &PeerId, remote: &X25519KeyPair) -> Arc<RatchetVerwaltung> {
        let v = Arc::new(RatchetVerwaltung::new());
        v.peer_einrichten(peer.clone(), eigen.clone(), &remote.public_key_bytes())
            .unwrap();
        v
    }

    fn verschluesselung() -> Arc<RuhendeVerschluesselung> {
        Arc::new(RuhendeVerschluesselung::neu(&[7u8; 32]).unwrap())
    }

    #[tokio::test]
    async fn speichern_und_laden() {
        let (a, b) = (X25519KeyPair::generate(), X25519KeyPair::generate());
        let (a_id, b_id) = (PeerId::from("alice"), PeerId::from("bob"));
        let backend = Arc::new(SpeicherBackend::new());
        let schluessel = verschluesselung();

        let va = verwaltung(&a, &b_id, &b);
        let vb = verwaltung(&b, &a_id, &a);
        let erste = va.verschluesseln(&b_id, b"erste").unwrap();
        vb.entschluesseln(&a_id, &erste).unwrap();
        let zweite = va.verschluesseln(&b_id, b"zweite").unwrap();

        RatchetAblage::neu(vb, backend.clone(), schluessel.clone())
            .speichern()
            .await
            .unwrap();
        let gespeichert = backend.inhalt(DATEI_SITZUNGEN).unwrap();
        assert!(!gespeichert.windows(5).any(|w| w == b"basis"));

        let vb = verwaltung(&b, &a_id, &a);
        let ablage = RatchetAblage::neu(vb.clone(), backend, schluessel);
        assert_eq!(ablage.laden().await, 1);
        assert_eq!(vb.entschluesseln(&a_id, &zweite).unwrap(), b"zweite");
    }

    #[tokio::test]
    async fn fehlender_oder_kaputter_stand_ergibt_leere_sitzungen() {
        let (a, b) = (X25519KeyPair::generate(), X25519KeyPair::generate());
        let backend = Arc::new(SpeicherBackend::new());
        let v = verwaltung(&a, &PeerId::from("bob"), &b);
        let ablage = RatchetAblage::neu(v.clone(), backend.clone(), verschluesselung());

        assert_eq!(ablage.laden().await, 0);

        backend.setzen(DATEI_SITZUNGEN, b"kein gueltiger blob".to_vec());
        assert_eq!(ablage.laden().await, 0);
        assert_eq!(v.sitzungen(&PeerId::from("bob")), 0);
    }

    #[tokio::test]
    async fn schreiber_speichert_nach_vormerken() {
        let (a, b) = (X25519KeyPair::generate(), X25519KeyPair::generate());
        let bob = PeerId::from("bob");
        let backend = Arc::new(SpeicherBackend::new());
        let v = verwaltung(&a, &bob, &b);
        let ablage = Arc::new(RatchetAblage::neu(v.clone(), backend.clone(), verschluesselung()));

        let abbruch = CancellationToken::new();
        let schreiber = ablage.schreiber_starten(abbruch.clone());

        v.verschluesseln(&bob, b"x").unwrap();
        ablage.vormerken();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while backend.inhalt(DATEI_SITZUNGEN).is_none() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        abbruch.cancel();
        schreiber.await.unwrap();
    }
}
