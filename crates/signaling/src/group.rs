//! Gruppenanruf-State – Raeume, Mitgliedschaft und Einladungen
//!
//! Pro Gruppe existiert hoechstens ein aktiver Anruf-Raum (Schluessel
//! ist die Gruppen-Kennung des Chat-Backends). Teilnehmer und offene
//! Einladungen sind disjunkte Mengen: Beitritt verschiebt von der
//! Einladungsliste in die Teilnehmerliste, Verlassen entfernt ohne
//! Rueckkehr auf die Einladungsliste.
//!
//! Alle Operationen sind tolerant: unbekannte Raeume oder Benutzer sind
//! stille No-ops, nie harte Fehler. Signalisierungsnachrichten koennen
//! ueber unzuverlaessige Transporte verspaetet oder doppelt eintreffen –
//! eine verirrte Nachricht darf den Raum nicht in einen schlechteren
//! Zustand bringen.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use palaver_core::types::{GroupId, UserId};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// CallRoom
// ---------------------------------------------------------------------------

/// Teilnehmer eines Gruppenanrufs
#[derive(Debug, Clone)]
pub struct Teilnehmer {
    pub user_id: UserId,
    pub anzeige_name: String,
    pub beigetreten_um: DateTime<Utc>,
    pub ist_ersteller: bool,
}

/// Offene Einladung in einen Gruppenanruf
#[derive(Debug, Clone)]
pub struct Einladung {
    pub user_id: UserId,
    pub eingeladen_um: DateTime<Utc>,
}

/// Zustand eines Anruf-Raums
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaumZustand {
    Aktiv,
    Beendet,
}

/// Ein aktiver Gruppenanruf-Raum
#[derive(Debug, Clone)]
pub struct CallRoom {
    pub group_id: GroupId,
    pub ersteller: UserId,
    /// Eindeutig nach UserId; Reihenfolge nur fuer die Anzeige relevant
    pub teilnehmer: Vec<Teilnehmer>,
    /// Eingeladen aber noch nicht beigetreten; disjunkt zu `teilnehmer`
    pub einladungen: Vec<Einladung>,
    pub erstellt_um: DateTime<Utc>,
    pub zustand: RaumZustand,
}

impl CallRoom {
    fn neu(group_id: GroupId, ersteller: UserId, ersteller_name: String) -> Self {
        Self {
            group_id,
            ersteller,
            teilnehmer: vec![Teilnehmer {
                user_id: ersteller,
                anzeige_name: ersteller_name,
                beigetreten_um: Utc::now(),
                ist_ersteller: true,
            }],
            einladungen: Vec::new(),
            erstellt_um: Utc::now(),
            zustand: RaumZustand::Aktiv,
        }
    }

    fn ist_teilnehmer(&self, user_id: &UserId) -> bool {
        self.teilnehmer.iter().any(|t| t.user_id == *user_id)
    }

    fn ist_eingeladen(&self, user_id: &UserId) -> bool {
        self.einladungen.iter().any(|e| e.user_id == *user_id)
    }
}

// ---------------------------------------------------------------------------
// Operations-Ergebnisse
// ---------------------------------------------------------------------------

/// Ergebnis von `starten`
#[derive(Debug, Clone)]
pub enum StartErgebnis {
    /// Raum neu erstellt, Ersteller ist erster Teilnehmer
    Erstellt(Vec<Teilnehmer>),
    /// Fuer diese Gruppe laeuft bereits ein Anruf – aktueller Zustand
    BereitsAktiv(Vec<Teilnehmer>),
}

/// Ergebnis von `beitreten`
#[derive(Debug, Clone)]
pub enum BeitrittErgebnis {
    /// Soeben beigetreten; Liste enthaelt alle Teilnehmer inkl. des Neuen
    Beigetreten(Vec<Teilnehmer>),
    /// War bereits Teilnehmer – idempotent, kein erneuter Broadcast
    BereitsTeilnehmer(Vec<Teilnehmer>),
    /// Kein aktiver Raum fuer diese Gruppe
    KeinRaum,
}

/// Ergebnis von `verlassen`
#[derive(Debug, Clone)]
pub enum VerlassenErgebnis {
    /// Benutzer entfernt; `verbleibende` fuer den Broadcast
    Verlassen {
        verbleibende: Vec<UserId>,
        /// Raum wurde aufgeloest weil er leer wurde
        raum_aufgeloest: bool,
    },
    /// Benutzer war kein Teilnehmer (oder Raum unbekannt) – No-op
    KeinTeilnehmer,
}

// ---------------------------------------------------------------------------
// GroupCallState
// ---------------------------------------------------------------------------

/// Zentraler In-Memory-Zustand aller Gruppenanruf-Raeume
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct GroupCallState {
    inner: Arc<GroupCallStateInner>,
}

struct GroupCallStateInner {
    raeume: DashMap<GroupId, CallRoom>,
}

impl GroupCallState {
    /// Erstellt einen neuen leeren GroupCallState
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(GroupCallStateInner {
                raeume: DashMap::new(),
            }),
        }
    }

    /// Startet einen Gruppenanruf (No-op wenn bereits einer laeuft)
    pub fn starten(
        &self,
        group_id: GroupId,
        ersteller: UserId,
        ersteller_name: impl Into<String>,
    ) -> StartErgebnis {
        match self.inner.raeume.entry(group_id.clone()) {
            Entry::Occupied(bestehend) => {
                tracing::debug!(group_id = %group_id, "Gruppenanruf laeuft bereits");
                StartErgebnis::BereitsAktiv(bestehend.get().teilnehmer.clone())
            }
            Entry::Vacant(frei) => {
                let raum = CallRoom::neu(group_id.clone(), ersteller, ersteller_name.into());
                let teilnehmer = raum.teilnehmer.clone();
                frei.insert(raum);
                tracing::info!(group_id = %group_id, ersteller = %ersteller, "Gruppenanruf gestartet");
                StartErgebnis::Erstellt(teilnehmer)
            }
        }
    }

    /// Laedt einen Benutzer ein
    ///
    /// Gibt `true` zurueck wenn die Einladung neu ist. Bereits
    /// eingeladene oder beigetretene Benutzer und unbekannte Raeume sind
    /// idempotente No-ops (`false`).
    pub fn einladen(&self, group_id: &GroupId, eingeladener: UserId) -> bool {
        let mut raum = match self.inner.raeume.get_mut(group_id) {
            Some(r) => r,
            None => {
                tracing::debug!(group_id = %group_id, "Einladung fuer unbekannten Raum (No-op)");
                return false;
            }
        };

        if raum.ist_teilnehmer(&eingeladener) || raum.ist_eingeladen(&eingeladener) {
            return false;
        }

        raum.einladungen.push(Einladung {
            user_id: eingeladener,
            eingeladen_um: Utc::now(),
        });
        tracing::debug!(group_id = %group_id, eingeladener = %eingeladener, "Einladung vermerkt");
        true
    }

    /// Laesst einen Benutzer beitreten
    ///
    /// Verschiebt ihn von der Einladungs- in die Teilnehmerliste. Auch
    /// ein Beitritt ohne vorherige Einladung wird zugelassen – die
    /// Zugangskontrolle liegt beim umliegenden Backend.
    pub fn beitreten(
        &self,
        group_id: &GroupId,
        user_id: UserId,
        anzeige_name: impl Into<String>,
    ) -> BeitrittErgebnis {
        let mut raum = match self.inner.raeume.get_mut(group_id) {
            Some(r) => r,
            None => return BeitrittErgebnis::KeinRaum,
        };

        if raum.ist_teilnehmer(&user_id) {
            return BeitrittErgebnis::BereitsTeilnehmer(raum.teilnehmer.clone());
        }

        raum.einladungen.retain(|e| e.user_id != user_id);
        let ist_ersteller = user_id == raum.ersteller;
        raum.teilnehmer.push(Teilnehmer {
            user_id,
            anzeige_name: anzeige_name.into(),
            beigetreten_um: Utc::now(),
            ist_ersteller,
        });

        tracing::info!(group_id = %group_id, user_id = %user_id, "Gruppenanruf beigetreten");
        BeitrittErgebnis::Beigetreten(raum.teilnehmer.clone())
    }

    /// Entfernt einen Benutzer aus dem Raum
    ///
    /// Loest den Raum auf wenn keine Teilnehmer uebrig bleiben. Eine
    /// Rueckkehr auf die Einladungsliste findet nicht statt.
    pub fn verlassen(&self, group_id: &GroupId, user_id: &UserId) -> VerlassenErgebnis {
        let raum_leer = {
            let mut raum = match self.inner.raeume.get_mut(group_id) {
                Some(r) => r,
                None => return VerlassenErgebnis::KeinTeilnehmer,
            };

            if !raum.ist_teilnehmer(user_id) {
                return VerlassenErgebnis::KeinTeilnehmer;
            }

            raum.teilnehmer.retain(|t| t.user_id != *user_id);
            raum.teilnehmer.is_empty()
        };

        if raum_leer {
            self.inner.raeume.remove(group_id);
            tracing::info!(group_id = %group_id, "Letzter Teilnehmer weg – Raum aufgeloest");
            return VerlassenErgebnis::Verlassen {
                verbleibende: Vec::new(),
                raum_aufgeloest: true,
            };
        }

        let verbleibende = self.mitglieder(group_id);
        tracing::debug!(group_id = %group_id, user_id = %user_id, "Gruppenanruf verlassen");
        VerlassenErgebnis::Verlassen {
            verbleibende,
            raum_aufgeloest: false,
        }
    }

    /// Beendet einen Gruppenanruf (nur durch den Ersteller)
    ///
    /// Gibt den entfernten Raum zurueck, damit alle Teilnehmer
    /// benachrichtigt werden koennen. Beenden-Anfragen anderer Benutzer
    /// und unbekannte Raeume sind stille No-ops.
    pub fn beenden(&self, group_id: &GroupId, von: &UserId) -> Option<CallRoom> {
        let ist_ersteller = self
            .inner
            .raeume
            .get(group_id)
            .map(|r| r.ersteller == *von)?;

        if !ist_ersteller {
            tracing::debug!(
                group_id = %group_id,
                von = %von,
                "Beenden-Anfrage von Nicht-Ersteller (No-op)"
            );
            return None;
        }

        let (_, mut raum) = self.inner.raeume.remove(group_id)?;
        raum.zustand = RaumZustand::Beendet;
        tracing::info!(group_id = %group_id, von = %von, "Gruppenanruf beendet");
        Some(raum)
    }

    /// Gibt die User-IDs aller Teilnehmer eines Raums zurueck
    pub fn mitglieder(&self, group_id: &GroupId) -> Vec<UserId> {
        self.inner
            .raeume
            .get(group_id)
            .map(|r| r.teilnehmer.iter().map(|t| t.user_id).collect())
            .unwrap_or_default()
    }

    /// Gibt alle Raeume zurueck in denen der Benutzer Teilnehmer ist
    ///
    /// Fuer die Aufraeumroutine beim Verbindungsende.
    pub fn raeume_von(&self, user_id: &UserId) -> Vec<GroupId> {
        self.inner
            .raeume
            .iter()
            .filter(|r| r.ist_teilnehmer(user_id))
            .map(|r| r.group_id.clone())
            .collect()
    }

    /// Prueft ob fuer die Gruppe ein Anruf laeuft
    pub fn ist_aktiv(&self, group_id: &GroupId) -> bool {
        self.inner.raeume.contains_key(group_id)
    }

    /// Gibt die Anzahl der aktiven Raeume zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.raeume.len()
    }
}

impl Default for GroupCallState {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gruppe(name: &str) -> GroupId {
        GroupId::new(name)
    }

    #[test]
    fn starten_und_doppelt_starten() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();

        match gruppen.starten(gruppe("g1"), ersteller, "carla") {
            StartErgebnis::Erstellt(teilnehmer) => {
                assert_eq!(teilnehmer.len(), 1);
                assert!(teilnehmer[0].ist_ersteller);
            }
            _ => panic!("Erwartet Erstellt"),
        }

        // Zweiter Start ist No-op mit aktuellem Zustand
        assert!(matches!(
            gruppen.starten(gruppe("g1"), UserId::new(), "dora"),
            StartErgebnis::BereitsAktiv(_)
        ));
        assert_eq!(gruppen.anzahl(), 1);
    }

    #[test]
    fn einladen_ist_idempotent() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();
        let gast = UserId::new();
        gruppen.starten(gruppe("g1"), ersteller, "c");

        assert!(gruppen.einladen(&gruppe("g1"), gast));
        assert!(!gruppen.einladen(&gruppe("g1"), gast), "Doppelte Einladung");
        assert!(!gruppen.einladen(&gruppe("g1"), ersteller), "Teilnehmer");
        assert!(!gruppen.einladen(&gruppe("g2"), gast), "Unbekannter Raum");
    }

    #[test]
    fn beitritt_verschiebt_von_einladung_zu_teilnehmer() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();
        let gast = UserId::new();
        gruppen.starten(gruppe("g1"), ersteller, "c");
        gruppen.einladen(&gruppe("g1"), gast);

        match gruppen.beitreten(&gruppe("g1"), gast, "gast") {
            BeitrittErgebnis::Beigetreten(teilnehmer) => {
                assert_eq!(teilnehmer.len(), 2);
            }
            _ => panic!("Erwartet Beigetreten"),
        }

        // Einladungsliste ist geleert – Mengen sind disjunkt
        assert!(!gruppen.einladen(&gruppe("g1"), gast));
        assert!(matches!(
            gruppen.beitreten(&gruppe("g1"), gast, "gast"),
            BeitrittErgebnis::BereitsTeilnehmer(_)
        ));
    }

    #[test]
    fn beitritt_ohne_einladung_wird_geduldet() {
        let gruppen = GroupCallState::neu();
        gruppen.starten(gruppe("g1"), UserId::new(), "c");

        let uneingeladen = UserId::new();
        assert!(matches!(
            gruppen.beitreten(&gruppe("g1"), uneingeladen, "x"),
            BeitrittErgebnis::Beigetreten(_)
        ));
    }

    #[test]
    fn beitreten_und_verlassen_ist_round_trip() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();
        let gast = UserId::new();
        gruppen.starten(gruppe("g1"), ersteller, "c");

        let vorher = gruppen.mitglieder(&gruppe("g1"));
        gruppen.beitreten(&gruppe("g1"), gast, "gast");
        gruppen.verlassen(&gruppe("g1"), &gast);

        assert_eq!(gruppen.mitglieder(&gruppe("g1")), vorher);
        // Ohne frische Einladung steht der Benutzer nicht wieder auf der Liste
        assert!(gruppen.einladen(&gruppe("g1"), gast), "Frische Einladung noetig");
    }

    #[test]
    fn verlassen_unbekannter_benutzer_ist_noop() {
        let gruppen = GroupCallState::neu();
        gruppen.starten(gruppe("g1"), UserId::new(), "c");

        assert!(matches!(
            gruppen.verlassen(&gruppe("g1"), &UserId::new()),
            VerlassenErgebnis::KeinTeilnehmer
        ));
        assert!(matches!(
            gruppen.verlassen(&gruppe("weg"), &UserId::new()),
            VerlassenErgebnis::KeinTeilnehmer
        ));
    }

    #[test]
    fn leerer_raum_wird_aufgeloest() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();
        gruppen.starten(gruppe("g1"), ersteller, "c");

        match gruppen.verlassen(&gruppe("g1"), &ersteller) {
            VerlassenErgebnis::Verlassen {
                verbleibende,
                raum_aufgeloest,
            } => {
                assert!(verbleibende.is_empty());
                assert!(raum_aufgeloest);
            }
            _ => panic!("Erwartet Verlassen"),
        }
        assert!(!gruppen.ist_aktiv(&gruppe("g1")));
    }

    #[test]
    fn nur_ersteller_darf_beenden() {
        let gruppen = GroupCallState::neu();
        let ersteller = UserId::new();
        let gast = UserId::new();
        gruppen.starten(gruppe("g1"), ersteller, "c");
        gruppen.beitreten(&gruppe("g1"), gast, "gast");

        // Nicht-Ersteller: stiller No-op
        assert!(gruppen.beenden(&gruppe("g1"), &gast).is_none());
        assert!(gruppen.ist_aktiv(&gruppe("g1")));

        let raum = gruppen.beenden(&gruppe("g1"), &ersteller).expect("Ende");
        assert_eq!(raum.zustand, RaumZustand::Beendet);
        assert_eq!(raum.teilnehmer.len(), 2);
        assert!(!gruppen.ist_aktiv(&gruppe("g1")));

        // Beitritt nach dem Ende ist No-op (Raum weg)
        assert!(matches!(
            gruppen.beitreten(&gruppe("g1"), UserId::new(), "spaet"),
            BeitrittErgebnis::KeinRaum
        ));
    }

    #[test]
    fn raeume_von_benutzer() {
        let gruppen = GroupCallState::neu();
        let user = UserId::new();

        gruppen.starten(gruppe("g1"), user, "u");
        gruppen.starten(gruppe("g2"), UserId::new(), "x");
        gruppen.beitreten(&gruppe("g2"), user, "u");
        gruppen.starten(gruppe("g3"), UserId::new(), "y");

        let mut raeume = gruppen.raeume_von(&user);
        raeume.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(raeume, vec![gruppe("g1"), gruppe("g2")]);
    }
}
