//! Ratchet-Sitzungen aller Peers
//!
//! Pro Peer gibt es eine kleine Menge von Sitzungen, unterschieden durch
//! ihren Basis-Schluessel. Eine Nachricht mit unbekannter Basis eroeffnet
//! eine neue Sitzung, authentifiziert durch die statischen Schluessel. Die
//! Map selbst ist nebenlaeufig, jeder Peer hat zusaetzlich ein eigenes Lock,
//! weil Ver- und Entschluesseln den Zustand weiterschalten.
//!
//! Wiederhergestellte Sitzungen werden nur noch zum Empfangen benutzt. Ein
//! Abbild kann aelter sein als der zuletzt gesendete Stand, die erste
//! Nachricht nach einem Start eroeffnet deshalb immer eine neue Sitzung.

use std::collections::{BTreeMap, VecDeque};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use geheimpost_core::{PeerId, RatchetMessage};

use crate::error::{CryptoError, CryptoResult};
use crate::ratchet::nachricht::RatchetKopf;
use crate::ratchet::sitzung::{RatchetSitzung, SitzungsAbbild};
use crate::x25519::X25519KeyPair;

/// Obergrenze gleichzeitig gehaltener Sitzungen pro Peer
pub const MAX_SITZUNGEN_PRO_PEER: usize = 4;

struct Eintrag {
    sitzung: RatchetSitzung,
    /// Nur in diesem Lauf entstandene Sitzungen duerfen senden
    sendebereit: bool,
}

/// Sitzungen mit einem Peer, die bevorzugte steht vorne
struct PeerSitzungen {
    eigenes_paar: X25519KeyPair,
    remote_public: [u8; 32],
    sitzungen: VecDeque<Eintrag>,
}

impl PeerSitzungen {
    fn vorne_einfuegen(&mut self, eintrag: Eintrag) {
        self.sitzungen.push_front(eintrag);
        self.sitzungen.truncate(MAX_SITZUNGEN_PRO_PEER);
    }

    fn nach_vorne(&mut self, index: usize) {
        if index > 0 {
            if let Some(eintrag) = self.sitzungen.remove(index) {
                self.sitzungen.push_front(eintrag);
            }
        }
    }
}

/// Persistierbarer Zustand aller Sitzungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerwaltungsAbbild {
    pub peers: BTreeMap<PeerId, Vec<SitzungsAbbild>>,
}

/// Verwaltet die Ratchet-Sitzungen pro Peer
#[derive(Default)]
pub struct RatchetVerwaltung {
    peers: DashMap<PeerId, Mutex<PeerSitzungen>>,
}

impl std::fmt::Debug for RatchetVerwaltung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetVerwaltung")
            .field("peers", &self.peers.len())
            .finish()
    }
}

impl RatchetVerwaltung {
    pub fn new() -> Self {
        Self::default()
    }

    /// Traegt einen Peer mit seinem statischen Schluessel ein
    ///
    /// Bestehende Sitzungen mit diesem Peer werden verworfen.
    pub fn peer_einrichten(
        &self,
        peer: PeerId,
        eigenes_paar: X25519KeyPair,
        remote_public: &[u8],
    ) -> CryptoResult<()> {
        if eigenes_paar.ist_nur_oeffentlich() {
            return Err(CryptoError::NurOeffentlicherSchluessel);
        }
        let remote_public = <[u8; 32]>::try_from(remote_public).map_err(|_| {
            CryptoError::UngueltigeSchluesselLaenge {
                erwartet: 32,
                erhalten: remote_public.len(),
            }
        })?;

        tracing::debug!(peer = %peer, "Ratchet-Peer eingerichtet");
        self.peers.insert(
            peer,
            Mutex::new(PeerSitzungen {
                eigenes_paar,
                remote_public,
                sitzungen: VecDeque::new(),
            }),
        );
        Ok(())
    }

    pub fn kennt_peer(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    /// Anzahl der Sitzungen mit einem Peer
    pub fn sitzungen(&self, peer: &PeerId) -> usize {
        match self.peers.get(peer) {
            Some(eintrag) => {
                let anzahl = eintrag.lock().sitzungen.len();
                anzahl
            }
            None => 0,
        }
    }

    /// Verschluesselt fuer einen Peer, bei Bedarf in einer neuen Sitzung
    pub fn verschluesseln(&self, peer: &PeerId, klartext: &[u8]) -> CryptoResult<RatchetMessage> {
        let eintrag = self
            .peers
            .get(peer)
            .ok_or_else(|| CryptoError::KeineSitzung(peer.to_string()))?;
        let mut peer_sitzungen = eintrag.lock();

        let index = peer_sitzungen
            .sitzungen
            .iter()
            .position(|e| e.sendebereit && e.sitzung.kann_senden());
        let index = match index {
            Some(index) => index,
            None => {
                let sitzung = RatchetSitzung::statisch_starten(
                    &peer_sitzungen.eigenes_paar,
                    &peer_sitzungen.remote_public,
                )?;
                tracing::debug!(peer = %peer, "Neue Ratchet-Sitzung gestartet");
                peer_sitzungen.vorne_einfuegen(Eintrag {
                    sitzung,
                    sendebereit: true,
                });
                0
            }
        };

        peer_sitzungen.sitzungen[index].sitzung.verschluesseln(klartext)
    }

    /// Entschluesselt eine Nachricht eines Peers
    pub fn entschluesseln(&self, peer: &PeerId, nachricht: &RatchetMessage) -> CryptoResult<Vec<u8>> {
        let eintrag = self
            .peers
            .get(peer)
            .ok_or_else(|| CryptoError::KeineSitzung(peer.to_string()))?;
        let mut peer_sitzungen = eintrag.lock();

        Self::entschluesseln_in(&mut peer_sitzungen, nachricht).map_err(|e| {
            tracing::warn!(peer = %peer, fehler = %e, "Entschluesselung abgelehnt");
            e
        })
    }

    fn entschluesseln_in(
        peer_sitzungen: &mut PeerSitzungen,
        nachricht: &RatchetMessage,
    ) -> CryptoResult<Vec<u8>> {
        let (kopf, _) = RatchetKopf::dekodieren(nachricht.as_bytes())?;

        let bekannt = peer_sitzungen
            .sitzungen
            .iter()
            .position(|e| e.sitzung.basis() == Some(kopf.basis));
        if let Some(index) = bekannt {
            let eintrag = &mut peer_sitzungen.sitzungen[index];
            let klartext = eintrag.sitzung.entschluesseln(nachricht)?;
            if eintrag.sendebereit {
                peer_sitzungen.nach_vorne(index);
            }
            return Ok(klartext);
        }

        let mut sitzung = RatchetSitzung::statisch_annehmen(
            &peer_sitzungen.eigenes_paar,
            &peer_sitzungen.remote_public,
            &kopf.basis,
        )?;
        let klartext = sitzung.entschluesseln(nachricht)?;
        tracing::debug!("Ratchet-Sitzung vom Peer eroeffnet");
        peer_sitzungen.vorne_einfuegen(Eintrag {
            sitzung,
            sendebereit: true,
        });
        Ok(klartext)
    }

    /// Entfernt einen Peer samt seiner Sitzungen
    pub fn entfernen(&self, peer: &PeerId) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Anzahl eingerichteter Peers
    pub fn anzahl(&self) -> usize {
        self.peers.len()
    }

    /// Abbild aller Sitzungen fuer die Ablage
    pub fn abbild(&self) -> CryptoResult<VerwaltungsAbbild> {
        let mut peers = BTreeMap::new();
        for eintrag in self.peers.iter() {
            let peer_sitzungen = eintrag.value().lock();
            let abbilder = peer_sitzungen
                .sitzungen
                .iter()
                .map(|e| e.sitzung.abbild())
                .collect::<CryptoResult<Vec<_>>>()?;
            if !abbilder.is_empty() {
                peers.insert(eintrag.key().clone(), abbilder);
            }
        }
        Ok(VerwaltungsAbbild { peers })
    }

    /// Uebernimmt Sitzungen aus einem Abbild, nur zum Empfangen
    ///
    /// Sitzungen nicht eingerichteter Peers und unlesbare Eintraege werden
    /// uebersprungen. Gibt die Anzahl uebernommener Sitzungen zurueck.
    pub fn wiederherstellen(&self, abbild: VerwaltungsAbbild) -> usize {
        let mut anzahl = 0;
        for (peer, abbilder) in abbild.peers {
            let Some(eintrag) = self.peers.get(&peer) else {
                tracing::debug!(peer = %peer, "Sitzungen eines unbekannten Peers verworfen");
                continue;
            };
            let mut peer_sitzungen = eintrag.lock();
            for sitzungs_abbild in abbilder {
                if peer_sitzungen.sitzungen.len() >= MAX_SITZUNGEN_PRO_PEER {
                    break;
                }
                if sitzungs_abbild.basis().is_none() {
                    continue;
                }
                match RatchetSitzung::aus_abbild(sitzungs_abbild) {
                    Ok(sitzung) => {
                        peer_sitzungen.sitzungen.push_back(Eintrag {
                            sitzung,
                            sendebereit: false,
                        });
                        anzahl += 1;
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer, fehler = %e, "Ratchet-Sitzung nicht lesbar");
                    }
                }
            }
        }
        anzahl
    }
}
