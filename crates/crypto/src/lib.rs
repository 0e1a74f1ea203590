//! # geheimpost-crypto
//!
//! Kryptografische Primitive und Sitzungs-Ratchet fuer Geheimpost.
//!
//! ## Module
//! - `x25519` - Diffie-Hellman Schluessel-Paare
//! - `ed25519` - Signatur-Schluessel-Paare
//! - `hkdf` - RFC 5869 Extract/Expand mit HMAC-SHA256
//! - `kdf` - Ratchet-spezifische Ableitungen (Root-, Ketten-, Nachrichten-Schluessel)
//! - `cipher` - AES-256-CBC + HMAC-SHA256 (Encrypt-then-MAC)
//! - `ratchet` - Double-Ratchet-Sitzungen pro Peer
//! - `ruhend` - AES-256-GCM fuer ruhende Daten (Queue-Snapshots)
//! - `types` - Gemeinsame Typen (SecretBytes, MessageKeys)
//! - `error` - Fehlertypen

pub mod cipher;
pub mod ed25519;
pub mod error;
pub mod hkdf;
pub mod kdf;
pub mod ratchet;
pub mod ruhend;
pub mod types;
pub mod x25519;

// Bequeme Re-Exports
pub use cipher::{decrypt, encrypt, MAC_LAENGE};
pub use ed25519::Ed25519KeyPair;
pub use error::{CryptoError, CryptoResult};
pub use kdf::{derive_message_key, derive_next_chain_key, derive_root_key};
pub use ratchet::{RatchetSitzung, RatchetVerwaltung, VerwaltungsAbbild};
pub use ruhend::RuhendeVerschluesselung;
pub use types::{MessageKeys, SecretBytes};
pub use x25519::X25519KeyPair;
