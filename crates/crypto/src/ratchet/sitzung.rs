//! Double-Ratchet-Sitzung mit einem Peer
//!
//! Ein DH-Ratchet-Schritt findet statt, sobald eine Nachricht mit einem neuen
//! Ratchet-Schluessel des Gegenuebers ankommt:
//!
//! ```text
//! RootKey, DH(eigen, remote_neu)     -> RootKey', Empfangskette
//! neues eigenes Paar
//! RootKey', DH(eigen_neu, remote_neu) -> RootKey'', Sendekette
//! ```
//!
//! Zwischen zwei DH-Schritten laeuft pro Richtung der symmetrische
//! Ketten-Ratchet. Schluessel uebersprungener Nachrichten werden begrenzt
//! aufbewahrt, damit verspaetete Nachrichten genau einmal entschluesselt
//! werden koennen. Der Zustand wird erst nach erfolgreicher Authentifizierung
//! uebernommen.
//!
//! Jede Sitzung traegt einen Basis-Schluessel, den oeffentlichen Teil des
//! ersten Ratchet-Schluessels ihres Initiators. Er steht in jedem Kopf und
//! ordnet eine Nachricht ihrer Sitzung zu. Bei Sitzungen aus statischen
//! Schluesseln ist er frischer Zufall, zwei Sitzungen desselben Peer-Paars
//! teilen daher nie Ketten-Schluessel.

use std::collections::{HashMap, VecDeque};

use geheimpost_core::RatchetMessage;
use serde::{Deserialize, Serialize};

use crate::cipher::{decrypt_mit, encrypt_mit};
use crate::error::{CryptoError, CryptoResult};
use crate::hkdf::derive_secrets;
use crate::kdf::derive_root_key;
use crate::ratchet::kette::KettenZustand;
use crate::ratchet::nachricht::RatchetKopf;
use crate::types::{MessageKeys, SecretBytes, SCHLUESSEL_LAENGE};
use crate::x25519::X25519KeyPair;

/// Obergrenze fuer aufbewahrte Schluessel uebersprungener Nachrichten
pub const MAX_UEBERSPRUNGEN: u32 = 1000;

/// Info-String fuer das gemeinsame Geheimnis aus statischen Schluesseln
const INFO_SITZUNG: &[u8] = b"GeheimpostSitzung";

type UebersprungenSchluessel = ([u8; 32], u32);

/// Zustand einer Ratchet-Sitzung
#[derive(Clone)]
pub struct RatchetSitzung {
    /// Beim Responder erst nach der ersten Nachricht bekannt
    basis: Option<[u8; 32]>,
    root_key: SecretBytes,
    eigenes_paar: X25519KeyPair,
    remote_public: Option<[u8; 32]>,
    sendekette: Option<KettenZustand>,
    empfangskette: Option<KettenZustand>,
    /// Laenge der vorherigen Sendekette (`pn` im Kopf)
    vorherige_sendelaenge: u32,
    uebersprungen: HashMap<UebersprungenSchluessel, MessageKeys>,
    /// Einfuege-Reihenfolge fuer die Begrenzung
    uebersprungen_reihenfolge: VecDeque<UebersprungenSchluessel>,
}

impl RatchetSitzung {
    fn leer(root_key: SecretBytes, eigenes_paar: X25519KeyPair) -> Self {
        Self {
            basis: None,
            root_key,
            eigenes_paar,
            remote_public: None,
            sendekette: None,
            empfangskette: None,
            vorherige_sendelaenge: 0,
            uebersprungen: HashMap::new(),
            uebersprungen_reihenfolge: VecDeque::new(),
        }
    }

    /// Sitzung der Seite die zuerst sendet
    ///
    /// `remote_ratchet_public` ist der Ratchet-Schluessel des Gegenuebers,
    /// dessen privaten Teil die Gegenseite in `responder` uebergibt.
    pub fn initiator(shared_secret: &[u8], remote_ratchet_public: &[u8]) -> CryptoResult<Self> {
        Self::initiator_mit_paar(shared_secret, X25519KeyPair::generate(), remote_ratchet_public)
    }

    /// Sitzung der Seite die zuerst empfaengt
    ///
    /// Senden ist erst nach der ersten empfangenen Nachricht moeglich.
    pub fn responder(shared_secret: &[u8], eigenes_ratchet_paar: X25519KeyPair) -> CryptoResult<Self> {
        crate::error::laenge_pruefen(shared_secret, SCHLUESSEL_LAENGE)?;
        if eigenes_ratchet_paar.ist_nur_oeffentlich() {
            return Err(CryptoError::NurOeffentlicherSchluessel);
        }
        Ok(Self::leer(
            SecretBytes::from_slice(shared_secret),
            eigenes_ratchet_paar,
        ))
    }

    /// Neue Sitzung aus statischen X25519-Schluesseln, diese Seite beginnt
    ///
    /// Der Basis-Schluessel wird frisch erzeugt und fliesst zusammen mit der
    /// statischen Vereinbarung in das gemeinsame Geheimnis ein. Die
    /// Gegenseite richtet ihre Sitzung mit `statisch_annehmen` ein, sobald
    /// die erste Nachricht ankommt.
    pub fn statisch_starten(eigenes_paar: &X25519KeyPair, remote_public: &[u8]) -> CryptoResult<Self> {
        let basis = X25519KeyPair::generate();
        let shared = sitzungsgeheimnis(
            &eigenes_paar.diffie_hellman(remote_public)?,
            &basis.diffie_hellman(remote_public)?,
        )?;
        Self::initiator_mit_paar(shared.as_bytes(), basis, remote_public)
    }

    /// Gegenstueck zu `statisch_starten` fuer einen empfangenen Basis-Schluessel
    ///
    /// Der statische Schluessel dient als erster eigener Ratchet-Schluessel
    /// und wird mit der ersten Nachricht durch ein frisches Paar ersetzt.
    pub fn statisch_annehmen(
        eigenes_paar: &X25519KeyPair,
        remote_public: &[u8],
        basis: &[u8; 32],
    ) -> CryptoResult<Self> {
        let shared = sitzungsgeheimnis(
            &eigenes_paar.diffie_hellman(remote_public)?,
            &eigenes_paar.diffie_hellman(basis)?,
        )?;
        let mut sitzung = Self::responder(shared.as_bytes(), eigenes_paar.clone())?;
        sitzung.basis = Some(*basis);
        Ok(sitzung)
    }

    fn initiator_mit_paar(
        shared_secret: &[u8],
        eigenes_paar: X25519KeyPair,
        remote_public: &[u8],
    ) -> CryptoResult<Self> {
        crate::error::laenge_pruefen(shared_secret, SCHLUESSEL_LAENGE)?;
        let dh = eigenes_paar.diffie_hellman(remote_public)?;
        let (root_key, chain_key) = derive_root_key(shared_secret, dh.as_bytes())?;

        let basis = eigenes_paar.public_key_bytes();
        let mut sitzung = Self::leer(root_key, eigenes_paar);
        sitzung.basis = Some(basis);
        sitzung.remote_public = Some(als_public(remote_public)?);
        sitzung.sendekette = Some(KettenZustand::neu(chain_key));
        Ok(sitzung)
    }

    /// Basis-Schluessel der Sitzung
    pub fn basis(&self) -> Option<[u8; 32]> {
        self.basis
    }

    /// Oeffentlicher Teil des aktuellen eigenen Ratchet-Schluessels
    pub fn eigener_ratchet_public(&self) -> [u8; 32] {
        self.eigenes_paar.public_key_bytes()
    }

    /// Anzahl aufbewahrter Schluessel uebersprungener Nachrichten
    pub fn anzahl_uebersprungen(&self) -> usize {
        self.uebersprungen.len()
    }

    pub fn kann_senden(&self) -> bool {
        self.sendekette.is_some()
    }

    /// Verschluesselt eine Nachricht und ruckt die Sendekette weiter
    pub fn verschluesseln(&mut self, klartext: &[u8]) -> CryptoResult<RatchetMessage> {
        let kette = self
            .sendekette
            .as_mut()
            .ok_or(CryptoError::KeineSendekette)?;
        let basis = self.basis.ok_or(CryptoError::KeineSendekette)?;
        let (n, keys) = kette.naechster_schluessel()?;

        let chiffrat = encrypt_mit(klartext, &keys)?;
        let kopf = RatchetKopf {
            basis,
            dh_public: self.eigenes_paar.public_key_bytes(),
            n,
            pn: self.vorherige_sendelaenge,
        };
        Ok(RatchetMessage::new(kopf.kodieren(&chiffrat)))
    }

    /// Entschluesselt eine Nachricht
    ///
    /// Bei jedem Fehler bleibt der Sitzungszustand unveraendert.
    pub fn entschluesseln(&mut self, nachricht: &RatchetMessage) -> CryptoResult<Vec<u8>> {
        let (kopf, chiffrat) = RatchetKopf::dekodieren(nachricht.as_bytes())?;
        if self.basis.is_some_and(|basis| basis != kopf.basis) {
            return Err(CryptoError::FremdeSitzung);
        }

        let schluessel = (kopf.dh_public, kopf.n);
        if let Some(keys) = self.uebersprungen.get(&schluessel) {
            let klartext = decrypt_mit(chiffrat, keys)?;
            self.uebersprungen.remove(&schluessel);
            self.uebersprungen_reihenfolge.retain(|s| *s != schluessel);
            return Ok(klartext);
        }

        let mut entwurf = self.clone();
        let klartext = entwurf.entschluesseln_neu(&kopf, chiffrat)?;
        *self = entwurf;
        Ok(klartext)
    }

    fn entschluesseln_neu(&mut self, kopf: &RatchetKopf, chiffrat: &[u8]) -> CryptoResult<Vec<u8>> {
        if self.remote_public != Some(kopf.dh_public) {
            self.restliche_empfangskette_sichern(kopf.pn)?;
            self.dh_schritt(kopf.dh_public)?;
        }

        let kette = self
            .empfangskette
            .as_mut()
            .ok_or_else(|| CryptoError::UngueltigeDaten("Keine Empfangskette".into()))?;

        if kopf.n < kette.index() {
            return Err(CryptoError::NachrichtBereitsVerarbeitet { index: kopf.n });
        }

        let uebersprungen = kette.vorspulen_bis(kopf.n, MAX_UEBERSPRUNGEN)?;
        let (_, keys) = kette.naechster_schluessel()?;
        let klartext = decrypt_mit(chiffrat, &keys)?;

        self.uebersprungen_merken(kopf.dh_public, uebersprungen);
        self.basis = Some(kopf.basis);
        Ok(klartext)
    }

    /// Merkt sich die noch offenen Schluessel der alten Empfangskette
    fn restliche_empfangskette_sichern(&mut self, bis: u32) -> CryptoResult<()> {
        let (Some(remote), Some(kette)) = (self.remote_public, self.empfangskette.as_mut()) else {
            return Ok(());
        };
        if bis <= kette.index() {
            return Ok(());
        }
        let uebersprungen = kette.vorspulen_bis(bis, MAX_UEBERSPRUNGEN)?;
        self.uebersprungen_merken(remote, uebersprungen);
        Ok(())
    }

    fn dh_schritt(&mut self, remote_neu: [u8; 32]) -> CryptoResult<()> {
        self.vorherige_sendelaenge = self.sendekette.as_ref().map_or(0, |k| k.index());

        let dh = self.eigenes_paar.diffie_hellman(&remote_neu)?;
        let (root_key, empfang) = derive_root_key(self.root_key.as_bytes(), dh.as_bytes())?;

        let neues_paar = X25519KeyPair::generate();
        let dh = neues_paar.diffie_hellman(&remote_neu)?;
        let (root_key, sende) = derive_root_key(root_key.as_bytes(), dh.as_bytes())?;

        self.root_key = root_key;
        self.eigenes_paar = neues_paar;
        self.remote_public = Some(remote_neu);
        self.empfangskette = Some(KettenZustand::neu(empfang));
        self.sendekette = Some(KettenZustand::neu(sende));

        tracing::trace!(pn = self.vorherige_sendelaenge, "DH-Ratchet-Schritt");
        Ok(())
    }

    fn uebersprungen_merken(&mut self, dh_public: [u8; 32], schluessel: Vec<(u32, MessageKeys)>) {
        for (n, keys) in schluessel {
            self.uebersprungen.insert((dh_public, n), keys);
            self.uebersprungen_reihenfolge.push_back((dh_public, n));
        }
        while self.uebersprungen_reihenfolge.len() > MAX_UEBERSPRUNGEN as usize {
            if let Some(aeltester) = self.uebersprungen_reihenfolge.pop_front() {
                self.uebersprungen.remove(&aeltester);
            }
        }
    }
}

impl RatchetSitzung {
    /// Persistierbarer Zustand der Sitzung
    pub fn abbild(&self) -> CryptoResult<SitzungsAbbild> {
        let eigener_schluessel = self
            .eigenes_paar
            .private_key_bytes()
            .ok_or(CryptoError::NurOeffentlicherSchluessel)?;

        let uebersprungen = self
            .uebersprungen_reihenfolge
            .iter()
            .filter_map(|schluessel| {
                self.uebersprungen
                    .get(schluessel)
                    .map(|keys| (schluessel.0, schluessel.1, keys.clone()))
            })
            .collect();

        Ok(SitzungsAbbild {
            basis: self.basis,
            root_key: self.root_key.clone(),
            eigener_schluessel: SecretBytes::from_slice(eigener_schluessel),
            remote_public: self.remote_public,
            sendekette: self.sendekette.clone(),
            empfangskette: self.empfangskette.clone(),
            vorherige_sendelaenge: self.vorherige_sendelaenge,
            uebersprungen,
        })
    }

    /// Stellt eine Sitzung aus ihrem Abbild wieder her
    pub fn aus_abbild(abbild: SitzungsAbbild) -> CryptoResult<Self> {
        crate::error::laenge_pruefen(abbild.root_key.as_bytes(), SCHLUESSEL_LAENGE)?;
        let eigenes_paar = X25519KeyPair::from_private_key(abbild.eigener_schluessel.as_bytes())?;

        let mut sitzung = Self::leer(abbild.root_key, eigenes_paar);
        sitzung.basis = abbild.basis;
        sitzung.remote_public = abbild.remote_public;
        sitzung.sendekette = abbild.sendekette;
        sitzung.empfangskette = abbild.empfangskette;
        sitzung.vorherige_sendelaenge = abbild.vorherige_sendelaenge;
        for (dh_public, n, keys) in abbild.uebersprungen {
            sitzung.uebersprungen_merken(dh_public, vec![(n, keys)]);
        }
        Ok(sitzung)
    }
}

/// Serialisierbarer Zustand einer `RatchetSitzung`
///
/// Enthaelt Schluesselmaterial im Klartext und darf nur verschluesselt
/// abgelegt werden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitzungsAbbild {
    basis: Option<[u8; 32]>,
    root_key: SecretBytes,
    eigener_schluessel: SecretBytes,
    remote_public: Option<[u8; 32]>,
    sendekette: Option<KettenZustand>,
    empfangskette: Option<KettenZustand>,
    vorherige_sendelaenge: u32,
    /// In Einfuege-Reihenfolge
    uebersprungen: Vec<([u8; 32], u32, MessageKeys)>,
}

impl SitzungsAbbild {
    pub fn basis(&self) -> Option<[u8; 32]> {
        self.basis
    }
}

impl std::fmt::Debug for RatchetSitzung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetSitzung")
            .field("sende_index", &self.sendekette.as_ref().map(|k| k.index()))
            .field("empfangs_index", &self.empfangskette.as_ref().map(|k| k.index()))
            .field("uebersprungen", &self.uebersprungen.len())
            .finish()
    }
}

/// Gemeinsames Geheimnis aus statischer und fluechtiger Vereinbarung
fn sitzungsgeheimnis(statisch: &SecretBytes, fluechtig: &SecretBytes) -> CryptoResult<SecretBytes> {
    let mut ikm = Vec::with_capacity(statisch.len() + fluechtig.len());
    ikm.extend_from_slice(statisch.as_bytes());
    ikm.extend_from_slice(fluechtig.as_bytes());
    let geheimnis = derive_secrets(&[], &ikm, INFO_SITZUNG, SCHLUESSEL_LAENGE);
    ikm.iter_mut().for_each(|b| *b = 0);
    geheimnis
}

fn als_public(bytes: &[u8]) -> CryptoResult<[u8; 32]> {
    <[u8; 32]>::try_from(bytes).map_err(|_| CryptoError::UngueltigeSchluesselLaenge {
        erwartet: 32,
        erhalten: bytes.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratchet::nachricht;

    fn paar() -> (RatchetSitzung, RatchetSitzung) {
        let shared = [0x5A; 32];
        let bob_ratchet = X25519KeyPair::generate();
        let alice = RatchetSitzung::initiator(&shared, &bob_ratchet.public_key_bytes()).unwrap();
        let bob = RatchetSitzung::responder(&shared, bob_ratchet).unwrap();
        (alice, bob)
    }

    #[test]
    fn einfacher_roundtrip() {
        let (mut alice, mut bob) = paar();
        let m = alice.verschluesseln(b"hallo bob").unwrap();
        assert_eq!(bob.entschluesseln(&m).unwrap(), b"hallo bob");
    }

    #[test]
    fn responder_kann_erst_nach_empfang_senden() {
        let (mut alice, mut bob) = paar();
        assert!(!bob.kann_senden());
        assert!(matches!(
            bob.verschluesseln(b"zu frueh"),
            Err(CryptoError::KeineSendekette)
        ));

        let m = alice.verschluesseln(b"erste").unwrap();
        bob.entschluesseln(&m).unwrap();
        assert!(bob.kann_senden());
    }

    #[test]
    fn ping_pong_mit_dh_schritten() {
        let (mut alice, mut bob) = paar();
        let start = alice.eigener_ratchet_public();

        for runde in 0..5 {
            let a = format!("alice {runde}");
            let m = alice.verschluesseln(a.as_bytes()).unwrap();
            assert_eq!(bob.entschluesseln(&m).unwrap(), a.as_bytes());

            let b = format!("bob {runde}");
            let m = bob.verschluesseln(b.as_bytes()).unwrap();
            assert_eq!(alice.entschluesseln(&m).unwrap(), b.as_bytes());
        }

        assert_ne!(alice.eigener_ratchet_public(), start);
    }

    #[test]
    fn ausser_der_reihe() {
        let (mut alice, mut bob) = paar();
        let nachrichten: Vec<_> = (0..5)
            .map(|i| alice.verschluesseln(format!("n{i}").as_bytes()).unwrap())
            .collect();

        assert_eq!(bob.entschluesseln(&nachrichten[3]).unwrap(), b"n3");
        assert_eq!(bob.anzahl_uebersprungen(), 3);
        assert_eq!(bob.entschluesseln(&nachrichten[0]).unwrap(), b"n0");
        assert_eq!(bob.entschluesseln(&nachrichten[4]).unwrap(), b"n4");
        assert_eq!(bob.entschluesseln(&nachrichten[2]).unwrap(), b"n2");
        assert_eq!(bob.entschluesseln(&nachrichten[1]).unwrap(), b"n1");
        assert_eq!(bob.anzahl_uebersprungen(), 0);
    }

    #[test]
    fn verspaetete_nachricht_aus_alter_kette() {
        let (mut alice, mut bob) = paar();
        let alt0 = alice.verschluesseln(b"alt 0").unwrap();
        let alt1 = alice.verschluesseln(b"alt 1").unwrap();
        bob.entschluesseln(&alt0).unwrap();

        // Bob antwortet, Alice macht einen DH-Schritt und sendet neu
        let antwort = bob.verschluesseln(b"antwort").unwrap();
        alice.entschluesseln(&antwort).unwrap();
        let neu = alice.verschluesseln(b"neu").unwrap();

        assert_eq!(bob.entschluesseln(&neu).unwrap(), b"neu");
        assert_eq!(bob.entschluesseln(&alt1).unwrap(), b"alt 1");
    }

    #[test]
    fn wiederholung_wird_abgelehnt() {
        let (mut alice, mut bob) = paar();
        let m0 = alice.verschluesseln(b"einmal").unwrap();
        let m1 = alice.verschluesseln(b"zweimal").unwrap();
        bob.entschluesseln(&m0).unwrap();
        bob.entschluesseln(&m1).unwrap();

        assert!(matches!(
            bob.entschluesseln(&m0),
            Err(CryptoError::NachrichtBereitsVerarbeitet { index: 0 })
        ));
    }

    #[test]
    fn zu_grosse_luecke_wird_abgelehnt() {
        let (mut alice, mut bob) = paar();
        let mut letzte = None;
        for _ in 0..=MAX_UEBERSPRUNGEN + 1 {
            letzte = Some(alice.verschluesseln(b"x").unwrap());
        }
        let letzte = letzte.unwrap();
        assert!(matches!(
            bob.entschluesseln(&letzte),
            Err(CryptoError::ZuVieleUebersprungen { .. })
        ));
    }

    #[test]
    fn manipulierte_nachricht_aendert_zustand_nicht() {
        let (mut alice, mut bob) = paar();
        let m = alice.verschluesseln(b"original").unwrap();

        let mut bytes = m.as_bytes().to_vec();
        let letzte = bytes.len() - 1;
        bytes[letzte] ^= 0x01;
        let manipuliert = RatchetMessage::new(bytes);

        assert!(matches!(
            bob.entschluesseln(&manipuliert),
            Err(CryptoError::Authentifizierung)
        ));
        // Die echte Nachricht geht danach weiterhin durch
        assert_eq!(bob.entschluesseln(&m).unwrap(), b"original");
        assert_eq!(bob.anzahl_uebersprungen(), 0);
    }

    fn statisches_paar() -> (X25519KeyPair, X25519KeyPair) {
        (X25519KeyPair::generate(), X25519KeyPair::generate())
    }

    fn annehmen(eigen: &X25519KeyPair, remote: &X25519KeyPair, m: &RatchetMessage) -> RatchetSitzung {
        let (kopf, _) = RatchetKopf::dekodieren(m.as_bytes()).unwrap();
        RatchetSitzung::statisch_annehmen(eigen, &remote.public_key_bytes(), &kopf.basis).unwrap()
    }

    #[test]
    fn statische_schluessel_roundtrip() {
        let (a_paar, b_paar) = statisches_paar();
        let mut a = RatchetSitzung::statisch_starten(&a_paar, &b_paar.public_key_bytes()).unwrap();
        assert!(a.kann_senden());

        let erste = a.verschluesseln(b"hallo").unwrap();
        let mut b = annehmen(&b_paar, &a_paar, &erste);
        assert!(!b.kann_senden());
        assert_eq!(b.basis(), a.basis());
        assert_eq!(b.entschluesseln(&erste).unwrap(), b"hallo");

        for i in 0..3 {
            let m = b.verschluesseln(format!("b{i}").as_bytes()).unwrap();
            assert_eq!(a.entschluesseln(&m).unwrap(), format!("b{i}").as_bytes());
            let m = a.verschluesseln(format!("a{i}").as_bytes()).unwrap();
            assert_eq!(b.entschluesseln(&m).unwrap(), format!("a{i}").as_bytes());
        }
    }

    #[test]
    fn neustart_erzeugt_frische_schluessel() {
        let (a_paar, b_paar) = statisches_paar();
        let mut vorher = RatchetSitzung::statisch_starten(&a_paar, &b_paar.public_key_bytes()).unwrap();
        let mut nachher = RatchetSitzung::statisch_starten(&a_paar, &b_paar.public_key_bytes()).unwrap();
        assert_ne!(vorher.basis(), nachher.basis());

        let m1 = vorher.verschluesseln(b"gleicher klartext").unwrap();
        let m2 = nachher.verschluesseln(b"gleicher klartext").unwrap();
        assert_ne!(
            &m1.as_bytes()[nachricht::KOPF_LAENGE..],
            &m2.as_bytes()[nachricht::KOPF_LAENGE..]
        );

        // Beide Sitzungen bleiben fuer die Gegenseite entschluesselbar
        let mut b1 = annehmen(&b_paar, &a_paar, &m1);
        let mut b2 = annehmen(&b_paar, &a_paar, &m2);
        assert_eq!(b1.entschluesseln(&m1).unwrap(), b"gleicher klartext");
        assert_eq!(b2.entschluesseln(&m2).unwrap(), b"gleicher klartext");
    }

    #[test]
    fn nachricht_einer_anderen_sitzung_wird_abgelehnt() {
        let (a_paar, b_paar) = statisches_paar();
        let mut erste = RatchetSitzung::statisch_starten(&a_paar, &b_paar.public_key_bytes()).unwrap();
        let mut zweite = RatchetSitzung::statisch_starten(&a_paar, &b_paar.public_key_bytes()).unwrap();

        let m1 = erste.verschluesseln(b"eins").unwrap();
        let m2 = zweite.verschluesseln(b"zwei").unwrap();
        let mut b = annehmen(&b_paar, &a_paar, &m1);
        b.entschluesseln(&m1).unwrap();

        assert!(matches!(b.entschluesseln(&m2), Err(CryptoError::FremdeSitzung)));
    }

    #[test]
    fn abbild_stellt_sitzung_wieder_her() {
        let (mut alice, mut bob) = paar();
        let nachrichten: Vec<_> = (0..4)
            .map(|i| alice.verschluesseln(format!("n{i}").as_bytes()).unwrap())
            .collect();
        assert_eq!(bob.entschluesseln(&nachrichten[2]).unwrap(), b"n2");

        let json = serde_json::to_string(&bob.abbild().unwrap()).unwrap();
        let abbild: SitzungsAbbild = serde_json::from_str(&json).unwrap();
        assert_eq!(abbild.basis(), alice.basis());
        let mut wiederhergestellt = RatchetSitzung::aus_abbild(abbild).unwrap();

        assert_eq!(wiederhergestellt.anzahl_uebersprungen(), 2);
        assert_eq!(wiederhergestellt.entschluesseln(&nachrichten[0]).unwrap(), b"n0");
        assert_eq!(wiederhergestellt.entschluesseln(&nachrichten[3]).unwrap(), b"n3");

        let antwort = wiederhergestellt.verschluesseln(b"antwort").unwrap();
        assert_eq!(alice.entschluesseln(&antwort).unwrap(), b"antwort");
    }

    #[test]
    fn responder_braucht_privaten_schluessel() {
        let nur_pub = X25519KeyPair::from_public_key(&[9u8; 32]).unwrap();
        assert!(matches!(
            RatchetSitzung::responder(&[1u8; 32], nur_pub),
            Err(CryptoError::NurOeffentlicherSchluessel)
        ));
    }
}
