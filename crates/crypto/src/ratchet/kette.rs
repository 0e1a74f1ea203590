//! Symmetrischer Ketten-Ratchet
//!
//! Jede Nachricht verbraucht genau eine Position der Kette. Ein Empfaenger
//! der zurueckliegt, leitet beliebig weit vorwaerts ab, aber nie rueckwaerts.

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_message_key, derive_next_chain_key};
use crate::types::{MessageKeys, SecretBytes};

/// Ketten-Schluessel und Position einer Richtung
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KettenZustand {
    chain_key: SecretBytes,
    index: u32,
}

impl KettenZustand {
    pub fn neu(chain_key: SecretBytes) -> Self {
        Self {
            chain_key,
            index: 0,
        }
    }

    /// Position der naechsten Nachricht
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Liefert die Schluessel fuer die aktuelle Position und ruckt weiter
    pub fn naechster_schluessel(&mut self) -> CryptoResult<(u32, MessageKeys)> {
        let keys = derive_message_key(self.chain_key.as_bytes())?;
        let index = self.index;
        self.chain_key = derive_next_chain_key(self.chain_key.as_bytes())?;
        self.index = self
            .index
            .checked_add(1)
            .ok_or_else(|| CryptoError::UngueltigeDaten("Ketten-Index uebergelaufen".into()))?;
        Ok((index, keys))
    }

    /// Spult bis Position `ziel` vor und gibt die uebersprungenen Schluessel zurueck
    ///
    /// Danach steht die Kette auf `ziel`. Mehr als `maximum` Schritte werden
    /// abgelehnt ohne die Kette zu veraendern.
    pub fn vorspulen_bis(&mut self, ziel: u32, maximum: u32) -> CryptoResult<Vec<(u32, MessageKeys)>> {
        if ziel < self.index {
            return Err(CryptoError::KetteRueckwaerts {
                aktuell: self.index,
                angefragt: ziel,
            });
        }
        let schritte = ziel - self.index;
        if schritte > maximum {
            return Err(CryptoError::ZuVieleUebersprungen {
                angefragt: schritte,
                maximum,
            });
        }

        let mut uebersprungen = Vec::with_capacity(schritte as usize);
        while self.index < ziel {
            uebersprungen.push(self.naechster_schluessel()?);
        }
        Ok(uebersprungen)
    }
}
