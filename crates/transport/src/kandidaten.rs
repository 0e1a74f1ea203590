//! Puffer fuer entfernte ICE-Kandidaten
//!
//! Kandidaten die vor der Remote-Description eintreffen, duerfen noch nicht
//! angewendet werden. Sie werden in Empfangsreihenfolge gepuffert und nach
//! dem Setzen der Remote-Description in genau dieser Reihenfolge abgegeben.
//! Danach werden neue Kandidaten sofort durchgereicht.

use std::collections::VecDeque;

use crate::plattform::IceKandidat;

/// Befehle an den Kandidaten-Task
///
/// Ein einziger Kanal fuer beide Befehle haelt gepufferte und spaetere
/// Kandidaten in Empfangsreihenfolge.
#[derive(Debug, Clone)]
pub enum KandidatenBefehl {
    Kandidat(IceKandidat),
    RemoteGesetzt,
}

/// Zustand des Puffers
#[derive(Debug, Default)]
pub struct KandidatenPuffer {
    remote_gesetzt: bool,
    wartend: VecDeque<IceKandidat>,
}

impl KandidatenPuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nimmt einen Kandidaten auf
    ///
    /// Gibt ihn zurueck wenn er sofort angewendet werden darf, sonst wird
    /// er gepuffert.
    pub fn aufnehmen(&mut self, kandidat: IceKandidat) -> Option<IceKandidat> {
        if self.remote_gesetzt {
            Some(kandidat)
        } else {
            self.wartend.push_back(kandidat);
            None
        }
    }

    /// Markiert die Remote-Description als gesetzt und leert den Puffer (FIFO)
    pub fn remote_gesetzt(&mut self) -> Vec<IceKandidat> {
        self.remote_gesetzt = true;
        self.wartend.drain(..).collect()
    }

    pub fn ist_remote_gesetzt(&self) -> bool {
        self.remote_gesetzt
    }

    pub fn gepuffert(&self) -> usize {
        self.wartend.len()
    }

    /// Zuruecksetzen (Trennen)
    pub fn leeren(&mut self) {
        self.remote_gesetzt = false;
        self.wartend.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: u32) -> IceKandidat {
        IceKandidat {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    #[test]
    fn puffert_bis_remote_gesetzt() {
        let mut p = KandidatenPuffer::new();
        assert!(p.aufnehmen(k(1)).is_none());
        assert!(p.aufnehmen(k(2)).is_none());
        assert!(p.aufnehmen(k(3)).is_none());
        assert_eq!(p.gepuffert(), 3);

        let abgegeben = p.remote_gesetzt();
        assert_eq!(abgegeben, vec![k(1), k(2), k(3)]);
        assert_eq!(p.gepuffert(), 0);

        // Danach sofort durchgereicht
        assert_eq!(p.aufnehmen(k(4)), Some(k(4)));
    }

    #[test]
    fn leeren_setzt_zurueck() {
        let mut p = KandidatenPuffer::new();
        p.aufnehmen(k(1));
        p.remote_gesetzt();
        p.aufnehmen(k(2));
        p.leeren();
        assert!(!p.ist_remote_gesetzt());
        assert!(p.aufnehmen(k(3)).is_none());
        assert_eq!(p.gepuffert(), 1);
    }
}
