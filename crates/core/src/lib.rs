//! geheimpost-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Geheimpost-Crates gemeinsam genutzt werden: Peer- und
//! Nachrichten-IDs, die opake `RatchetMessage` sowie die Schnittstellen der
//! externen Kollaborateure (verschluesselte Ablage, Netzwerkstatus).

pub mod error;
pub mod netz;
pub mod speicher;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{GeheimpostError, Result};
pub use netz::{ImmerVerfuegbar, NetzwerkStatus};
pub use speicher::EncryptedStorage;
pub use types::{jetzt_ms, MessageId, PeerId, RatchetMessage};
