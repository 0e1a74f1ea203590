//! Schnittstelle zum Netzwerkstatus der Plattform
//!
//! Aufrufer fragen den Status ab bevor sie `connect` oder `send_message`
//! ausloesen. Der Kern selbst toleriert "offline": Einreihen in die Queue
//! gelingt immer.

/// Netzwerkstatus-Kollaborateur
pub trait NetzwerkStatus: Send + Sync {
    /// Ist ueberhaupt ein Netzwerk verfuegbar?
    fn ist_netzwerk_verfuegbar(&self) -> bool;

    /// Erlaubt das aktuelle Netz direkte P2P-Verbindungen?
    fn ist_p2p_faehig(&self) -> bool;
}

/// Standard-Implementierung ohne Plattform-Anbindung: immer online
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmerVerfuegbar;

impl NetzwerkStatus for ImmerVerfuegbar {
    fn ist_netzwerk_verfuegbar(&self) -> bool {
        true
    }

    fn ist_p2p_faehig(&self) -> bool {
        true
    }
}
