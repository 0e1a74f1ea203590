//! Wire-Format einer Ratchet-Nachricht
//!
//! ```text
//! [version(1)=2] [basis(32)] [dh_public(32)] [n(4 BE)] [pn(4 BE)] [ciphertext || mac(10)]
//! ```
//!
//! `basis` ist der Basis-Schluessel der Sitzung und bleibt fuer ihre ganze
//! Lebensdauer gleich. `n` ist die Position in der Sendekette, `pn` die
//! Laenge der vorherigen Sendekette des Absenders.

use crate::error::{CryptoError, CryptoResult};

/// Aktuelle Format-Version
pub const VERSION: u8 = 2;

/// Laenge des Kopfes in Bytes
pub const KOPF_LAENGE: usize = 1 + 32 + 32 + 4 + 4;

/// Kopf einer Ratchet-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatchetKopf {
    pub basis: [u8; 32],
    pub dh_public: [u8; 32],
    pub n: u32,
    pub pn: u32,
}

impl RatchetKopf {
    /// Kodiert Kopf und Chiffrat in eine Nachricht
    pub fn kodieren(&self, chiffrat: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(KOPF_LAENGE + chiffrat.len());
        out.push(VERSION);
        out.extend_from_slice(&self.basis);
        out.extend_from_slice(&self.dh_public);
        out.extend_from_slice(&self.n.to_be_bytes());
        out.extend_from_slice(&self.pn.to_be_bytes());
        out.extend_from_slice(chiffrat);
        out
    }

    /// Zerlegt eine Nachricht in Kopf und Chiffrat
    pub fn dekodieren(daten: &[u8]) -> CryptoResult<(Self, &[u8])> {
        if daten.len() <= KOPF_LAENGE {
            return Err(CryptoError::UngueltigeDaten(format!(
                "Ratchet-Nachricht zu kurz: {} Bytes",
                daten.len()
            )));
        }
        if daten[0] != VERSION {
            return Err(CryptoError::UngueltigeDaten(format!(
                "Unbekannte Version: {}",
                daten[0]
            )));
        }

        let mut basis = [0u8; 32];
        basis.copy_from_slice(&daten[1..33]);
        let mut dh_public = [0u8; 32];
        dh_public.copy_from_slice(&daten[33..65]);
        let n = u32::from_be_bytes([daten[65], daten[66], daten[67], daten[68]]);
        let pn = u32::from_be_bytes([daten[69], daten[70], daten[71], daten[72]]);

        Ok((
            Self {
                basis,
                dh_public,
                n,
                pn,
            },
            &daten[KOPF_LAENGE..],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kopf_layout() {
        let kopf = RatchetKopf {
            basis: [0xCD; 32],
            dh_public: [0xAB; 32],
            n: 0x0102_0304,
            pn: 7,
        };
        let bytes = kopf.kodieren(b"chiffrat");
        assert_eq!(bytes[0], 2);
        assert_eq!(&bytes[1..33], &[0xCD; 32]);
        assert_eq!(&bytes[33..65], &[0xAB; 32]);
        assert_eq!(&bytes[65..69], &[1, 2, 3, 4]);
        assert_eq!(&bytes[69..73], &[0, 0, 0, 7]);

        let (dekodiert, rest) = RatchetKopf::dekodieren(&bytes).unwrap();
        assert_eq!(dekodiert, kopf);
        assert_eq!(rest, b"chiffrat");
    }

    #[test]
    fn fehlerhafte_nachrichten() {
        assert!(RatchetKopf::dekodieren(&[2u8; KOPF_LAENGE]).is_err());

        let mut bytes = RatchetKopf {
            basis: [0; 32],
            dh_public: [0; 32],
            n: 0,
            pn: 0,
        }
        .kodieren(b"x");
        bytes[0] = 1;
        assert!(matches!(
            RatchetKopf::dekodieren(&bytes),
            Err(CryptoError::UngueltigeDaten(_))
        ));
    }
}
