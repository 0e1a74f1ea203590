//! Double-Ratchet-Sitzungen
//!
//! - `kette` - symmetrischer Ketten-Ratchet (ein Schritt pro Nachricht)
//! - `nachricht` - Wire-Format einer Ratchet-Nachricht
//! - `sitzung` - Zustand einer einzelnen Sitzung
//! - `verwaltung` - Sitzungen aller Peers samt Abbild fuer die Ablage

pub mod kette;
pub mod nachricht;
pub mod sitzung;
pub mod verwaltung;

pub use kette::KettenZustand;
pub use nachricht::RatchetKopf;
pub use sitzung::{RatchetSitzung, SitzungsAbbild, MAX_UEBERSPRUNGEN};
pub use verwaltung::{RatchetVerwaltung, VerwaltungsAbbild, MAX_SITZUNGEN_PRO_PEER};
