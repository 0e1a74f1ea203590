mod backend_tests;
mod persistent_tests;
mod queue_tests;

use geheimpost_core::{EncryptedStorage, GeheimpostError};

/// XOR-"Verschluesselung" mit Pruefbyte fuer Tests
pub(crate) struct TestAblage {
    pub schluessel: u8,
}

impl EncryptedStorage for TestAblage {
    fn encrypt(&self, klartext: &[u8]) -> geheimpost_core::Result<Vec<u8>> {
        let mut out = vec![self.schluessel];
        out.extend(klartext.iter().map(|b| b ^ self.schluessel));
        Ok(out)
    }

    fn decrypt(&self, chiffrat: &[u8]) -> geheimpost_core::Result<Vec<u8>> {
        match chiffrat.split_first() {
            Some((&k, rest)) if k == self.schluessel => {
                Ok(rest.iter().map(|b| b ^ self.schluessel).collect())
            }
            _ => Err(GeheimpostError::AblageEntschluesselung(
                "falscher Schluessel".into(),
            )),
        }
    }
}
