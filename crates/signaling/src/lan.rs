//! LAN-Discovery – Subnetz-Abgleich gemeldeter lokaler Adressen
//!
//! Best-effort-Helfer: Clients melden ihre lokalen IP-Adressen, ein
//! Scan liefert alle anderen Benutzer deren Adressen im selben
//! /24-Subnetz liegen (erste drei Oktette gleich). Zwei Peers im selben
//! Subnetz koennen ihren Medienpfad direkt aufbauen statt ueber externe
//! Relays.
//!
//! Fehlertoleranz: unparsbare oder fehlende Adresslisten bedeuten
//! "kein Treffer", nie einen Fehler. Der Scan liefert immer eine
//! (moeglicherweise leere) Liste.
//!
//! Eintraege werden beim Verbindungsende ueber die Aufraeumroutine des
//! Dispatchers entfernt, damit keine veralteten Adressen liegenbleiben.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use palaver_core::types::UserId;
use palaver_protocol::control::LanPeer;
use std::net::Ipv4Addr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// LanRecord
// ---------------------------------------------------------------------------

/// Gemeldete lokale Adressen eines Benutzers
#[derive(Debug, Clone)]
pub struct LanRecord {
    pub user_id: UserId,
    pub anzeige_name: String,
    /// Erste Adresse ist anzeige-bevorzugt
    pub adressen: Vec<String>,
    pub aktualisiert_um: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// LanDiscovery
// ---------------------------------------------------------------------------

/// Verwaltet gemeldete LAN-Adressen und beantwortet Subnetz-Scans
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
/// Scans sind O(Benutzer x Adressen) – bei der erwarteten Peer-Anzahl
/// unkritisch.
#[derive(Clone)]
pub struct LanDiscovery {
    inner: Arc<LanDiscoveryInner>,
}

struct LanDiscoveryInner {
    eintraege: DashMap<UserId, LanRecord>,
}

impl LanDiscovery {
    /// Erstellt eine neue leere LanDiscovery
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(LanDiscoveryInner {
                eintraege: DashMap::new(),
            }),
        }
    }

    /// Meldet die lokalen Adressen eines Benutzers (Upsert)
    pub fn melden(
        &self,
        user_id: UserId,
        anzeige_name: impl Into<String>,
        adressen: Vec<String>,
    ) {
        let record = LanRecord {
            user_id,
            anzeige_name: anzeige_name.into(),
            adressen,
            aktualisiert_um: Utc::now(),
        };
        tracing::debug!(
            user_id = %user_id,
            adressen = record.adressen.len(),
            "LAN-Adressen gemeldet"
        );
        self.inner.eintraege.insert(user_id, record);
    }

    /// Entfernt den Eintrag eines Benutzers (Verbindungsende)
    pub fn entfernen(&self, user_id: &UserId) {
        if self.inner.eintraege.remove(user_id).is_some() {
            tracing::debug!(user_id = %user_id, "LAN-Eintrag entfernt");
        }
    }

    /// Sucht alle anderen Benutzer im selben /24-Subnetz
    ///
    /// Verglichen werden die zuvor vom Anfragenden gemeldeten Adressen.
    /// Pro Treffer wird nur die erste passende Adresse zurueckgegeben
    /// (Anzeige). Hat der Anfragende nichts gemeldet, ist das Ergebnis
    /// leer.
    pub fn peers_im_subnetz(&self, anfragender: &UserId) -> Vec<LanPeer> {
        let eigene_adressen = match self.inner.eintraege.get(anfragender) {
            Some(record) => record.adressen.clone(),
            None => return Vec::new(),
        };

        self.inner
            .eintraege
            .iter()
            .filter(|e| e.user_id != *anfragender)
            .filter_map(|e| {
                let treffer = e.adressen.iter().find(|adresse| {
                    eigene_adressen
                        .iter()
                        .any(|eigene| gleiches_subnetz(eigene, adresse))
                })?;
                Some(LanPeer {
                    id: e.user_id,
                    name: e.anzeige_name.clone(),
                    ip: treffer.clone(),
                })
            })
            .collect()
    }

    /// Gibt die Anzahl der gemeldeten Eintraege zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.eintraege.len()
    }
}

impl Default for LanDiscovery {
    fn default() -> Self {
        Self::neu()
    }
}

/// Prueft ob zwei Adressen im selben /24-Subnetz liegen
///
/// Nur IPv4 in Dotted-Decimal-Notation; alles andere gilt als
/// "kein Treffer".
fn gleiches_subnetz(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (a.parse::<Ipv4Addr>(), b.parse::<Ipv4Addr>()) else {
        return false;
    };
    a.octets()[..3] == b.octets()[..3]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnetz_vergleich() {
        assert!(gleiches_subnetz("192.168.1.10", "192.168.1.50"));
        assert!(!gleiches_subnetz("192.168.1.10", "192.168.2.10"));
        assert!(!gleiches_subnetz("192.168.1.10", "10.0.0.5"));
        // Unparsbares ist nie ein Treffer
        assert!(!gleiches_subnetz("not-an-ip", "192.168.1.1"));
        assert!(!gleiches_subnetz("192.168.1.1", ""));
        assert!(!gleiches_subnetz("fe80::1", "fe80::2"));
    }

    #[test]
    fn scan_findet_peer_im_selben_subnetz() {
        let lan = LanDiscovery::neu();
        let anfragender = UserId::new();
        let nachbar = UserId::new();
        let fremder = UserId::new();

        lan.melden(anfragender, "ich", vec!["192.168.1.10".into()]);
        lan.melden(nachbar, "nachbar", vec!["192.168.1.50".into()]);
        lan.melden(fremder, "fremder", vec!["10.0.0.5".into()]);

        let peers = lan.peers_im_subnetz(&anfragender);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].id, nachbar);
        assert_eq!(peers[0].name, "nachbar");
        assert_eq!(peers[0].ip, "192.168.1.50");
    }

    #[test]
    fn scan_ohne_eigene_meldung_ist_leer() {
        let lan = LanDiscovery::neu();
        lan.melden(UserId::new(), "jemand", vec!["192.168.1.2".into()]);

        assert!(lan.peers_im_subnetz(&UserId::new()).is_empty());
    }

    #[test]
    fn scan_liefert_erste_passende_adresse() {
        let lan = LanDiscovery::neu();
        let anfragender = UserId::new();
        let nachbar = UserId::new();

        lan.melden(anfragender, "ich", vec!["10.1.1.4".into(), "192.168.1.10".into()]);
        lan.melden(
            nachbar,
            "nachbar",
            vec!["172.16.0.9".into(), "192.168.1.77".into()],
        );

        let peers = lan.peers_im_subnetz(&anfragender);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].ip, "192.168.1.77");
    }

    #[test]
    fn malformierte_adressen_sind_kein_treffer() {
        let lan = LanDiscovery::neu();
        let anfragender = UserId::new();
        let kaputt = UserId::new();

        lan.melden(anfragender, "ich", vec!["192.168.1.10".into()]);
        lan.melden(kaputt, "kaputt", vec!["kein-ip-string".into()]);

        assert!(lan.peers_im_subnetz(&anfragender).is_empty());
    }

    #[test]
    fn erneute_meldung_ueberschreibt() {
        let lan = LanDiscovery::neu();
        let uid = UserId::new();

        lan.melden(uid, "u", vec!["192.168.1.2".into()]);
        lan.melden(uid, "u", vec!["10.0.0.2".into()]);
        assert_eq!(lan.anzahl(), 1);

        let anfragender = UserId::new();
        lan.melden(anfragender, "a", vec!["192.168.1.9".into()]);
        assert!(
            lan.peers_im_subnetz(&anfragender).is_empty(),
            "Alte Adressen duerfen nicht mehr zaehlen"
        );
    }

    #[test]
    fn entfernen_raeumt_eintrag_ab() {
        let lan = LanDiscovery::neu();
        let uid = UserId::new();
        lan.melden(uid, "u", vec!["192.168.1.2".into()]);

        lan.entfernen(&uid);
        assert_eq!(lan.anzahl(), 0);

        // Doppeltes Entfernen ist No-op
        lan.entfernen(&uid);
    }
}
