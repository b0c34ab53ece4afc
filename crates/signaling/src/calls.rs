//! Call-State – Zustandsmaschine der Einzelanrufe
//!
//! Verwaltet alle laufenden Eins-zu-Eins-Anrufe:
//!
//! ```text
//! Klingelt --annehmen--> Verbunden --beenden--> Beendet
//!     |                                            ^
//!     +--ablehnen--> Abgelehnt                     |
//!     +--Timeout---> Zeitueberschritten            |
//!     +--beenden (Anrufer legt auf)----------------+
//! ```
//!
//! Pro ungeordnetem Benutzerpaar existiert hoechstens ein
//! nicht-terminaler Anruf (Paar-Index). Terminale Anrufe werden sofort
//! aus den Maps entfernt – eine Anruf-Historie ist nicht Aufgabe dieses
//! Kerns.
//!
//! Der Klingel-Timeout laeuft als eigener tokio-Task; sein AbortHandle
//! liegt im Anruf-Eintrag und wird bei jedem anderen Uebergang aus
//! `Klingelt` abgebrochen, damit kein veralteter Timeout gegen einen
//! laengst entschiedenen Anruf feuert.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use palaver_core::types::{CallId, UserId};
use std::sync::Arc;
use tokio::task::AbortHandle;

// ---------------------------------------------------------------------------
// DirectCall
// ---------------------------------------------------------------------------

/// Zustand eines Einzelanrufs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallZustand {
    /// Anruf laeuft, Angerufener wurde benachrichtigt
    Klingelt,
    /// Anruf angenommen, Signalisierung zwischen den Peers laeuft
    Verbunden,
    /// Von einer Seite beendet (terminal)
    Beendet,
    /// Vom Angerufenen abgelehnt (terminal)
    Abgelehnt,
    /// Klingel-Timeout abgelaufen (terminal)
    Zeitueberschritten,
}

/// Ein laufender oder gerade beendeter Einzelanruf
#[derive(Debug)]
pub struct DirectCall {
    pub call_id: CallId,
    pub anrufer: UserId,
    pub angerufener: UserId,
    pub ist_video: bool,
    pub zustand: CallZustand,
    pub initiiert_um: DateTime<Utc>,
    pub verbunden_um: Option<DateTime<Utc>>,
    pub beendet_um: Option<DateTime<Utc>>,
    /// AbortHandle des Klingel-Timeout-Tasks
    klingel_abbruch: Option<AbortHandle>,
}

impl DirectCall {
    fn neu(call_id: CallId, anrufer: UserId, angerufener: UserId, ist_video: bool) -> Self {
        Self {
            call_id,
            anrufer,
            angerufener,
            ist_video,
            zustand: CallZustand::Klingelt,
            initiiert_um: Utc::now(),
            verbunden_um: None,
            beendet_um: None,
            klingel_abbruch: None,
        }
    }

    /// Bricht den Klingel-Timeout-Task ab, falls vorhanden
    fn klingel_timer_abbrechen(&mut self) {
        if let Some(abbruch) = self.klingel_abbruch.take() {
            abbruch.abort();
        }
    }
}

/// Ergebnis einer Annahme-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnahmeErgebnis {
    /// Anruf wurde soeben verbunden
    Verbunden(CallId),
    /// Anruf war bereits verbunden – idempotent, keine zweite Benachrichtigung
    BereitsVerbunden,
    /// Kein passender klingelnder Anruf fuer dieses Paar
    KeinAnruf,
}

// ---------------------------------------------------------------------------
// CallState
// ---------------------------------------------------------------------------

/// Normalisiert ein Benutzerpaar zu einem ungeordneten Schluessel
fn paar_schluessel(a: &UserId, b: &UserId) -> (UserId, UserId) {
    if a <= b {
        (*a, *b)
    } else {
        (*b, *a)
    }
}

/// Zentraler In-Memory-Zustand aller Einzelanrufe
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct CallState {
    inner: Arc<CallStateInner>,
}

struct CallStateInner {
    /// Alle nicht-terminalen Anrufe, indiziert nach CallId
    anrufe: DashMap<CallId, DirectCall>,
    /// Ungeordnetes Benutzerpaar -> CallId des nicht-terminalen Anrufs
    paare: DashMap<(UserId, UserId), CallId>,
}

impl CallState {
    /// Erstellt einen neuen leeren CallState
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(CallStateInner {
                anrufe: DashMap::new(),
                paare: DashMap::new(),
            }),
        }
    }

    /// Legt einen neuen klingelnden Anruf an
    ///
    /// Gibt `None` zurueck wenn fuer dieses Paar bereits ein
    /// nicht-terminaler Anruf existiert (Paar-Invariante).
    pub fn anlegen(
        &self,
        anrufer: UserId,
        angerufener: UserId,
        ist_video: bool,
    ) -> Option<CallId> {
        let schluessel = paar_schluessel(&anrufer, &angerufener);
        match self.inner.paare.entry(schluessel) {
            Entry::Occupied(bestehend) => {
                tracing::debug!(
                    anrufer = %anrufer,
                    angerufener = %angerufener,
                    bestehender_anruf = %bestehend.get(),
                    "Anruf abgewiesen – Paar hat bereits einen aktiven Anruf"
                );
                None
            }
            Entry::Vacant(frei) => {
                let call_id = CallId::new();
                frei.insert(call_id);
                self.inner
                    .anrufe
                    .insert(call_id, DirectCall::neu(call_id, anrufer, angerufener, ist_video));
                tracing::info!(
                    call_id = %call_id,
                    anrufer = %anrufer,
                    angerufener = %angerufener,
                    ist_video,
                    "Anruf angelegt (klingelt)"
                );
                Some(call_id)
            }
        }
    }

    /// Hinterlegt den AbortHandle des Klingel-Timeout-Tasks
    ///
    /// Ist der Anruf inzwischen nicht mehr im Klingel-Zustand, wird der
    /// Task sofort abgebrochen.
    pub fn klingel_abbruch_setzen(&self, call_id: &CallId, abbruch: AbortHandle) {
        match self.inner.anrufe.get_mut(call_id) {
            Some(mut call) if call.zustand == CallZustand::Klingelt => {
                call.klingel_abbruch = Some(abbruch);
            }
            _ => abbruch.abort(),
        }
    }

    /// Nimmt einen klingelnden Anruf an (Uebergang Klingelt -> Verbunden)
    ///
    /// `annehmender` muss der Angerufene des klingelnden Anrufs sein.
    pub fn annehmen(&self, anrufer: &UserId, annehmender: &UserId) -> AnnahmeErgebnis {
        let schluessel = paar_schluessel(anrufer, annehmender);
        let call_id = match self.inner.paare.get(&schluessel) {
            Some(id) => *id,
            None => return AnnahmeErgebnis::KeinAnruf,
        };

        let mut call = match self.inner.anrufe.get_mut(&call_id) {
            Some(c) => c,
            None => return AnnahmeErgebnis::KeinAnruf,
        };

        match call.zustand {
            CallZustand::Klingelt
                if call.angerufener == *annehmender && call.anrufer == *anrufer =>
            {
                call.zustand = CallZustand::Verbunden;
                call.verbunden_um = Some(Utc::now());
                call.klingel_timer_abbrechen();
                tracing::info!(call_id = %call_id, "Anruf angenommen");
                AnnahmeErgebnis::Verbunden(call_id)
            }
            CallZustand::Verbunden => AnnahmeErgebnis::BereitsVerbunden,
            _ => AnnahmeErgebnis::KeinAnruf,
        }
    }

    /// Lehnt einen klingelnden Anruf ab (terminal)
    ///
    /// `ablehnender` muss der Angerufene sein. Gibt den entfernten Anruf
    /// zurueck, oder `None` wenn kein passender klingelnder Anruf existiert.
    pub fn ablehnen(&self, anrufer: &UserId, ablehnender: &UserId) -> Option<DirectCall> {
        let schluessel = paar_schluessel(anrufer, ablehnender);
        let call_id = *self.inner.paare.get(&schluessel)?;

        {
            let call = self.inner.anrufe.get(&call_id)?;
            if call.zustand != CallZustand::Klingelt || call.angerufener != *ablehnender {
                return None;
            }
        }

        self.inner.paare.remove(&schluessel);
        let (_, mut call) = self.inner.anrufe.remove(&call_id)?;
        call.klingel_timer_abbrechen();
        call.zustand = CallZustand::Abgelehnt;
        call.beendet_um = Some(Utc::now());
        tracing::info!(call_id = %call_id, "Anruf abgelehnt");
        Some(call)
    }

    /// Beendet einen Anruf zwischen zwei Benutzern (terminal, idempotent)
    ///
    /// Erlaubt aus `Verbunden` (Auflegen) und aus `Klingelt` (Anrufer
    /// bricht vor der Annahme ab). Unbekannte oder bereits beendete
    /// Anrufe sind ein No-op und geben `None` zurueck.
    pub fn beenden(&self, von: &UserId, gegenseite: &UserId) -> Option<DirectCall> {
        let schluessel = paar_schluessel(von, gegenseite);
        let (_, call_id) = self.inner.paare.remove(&schluessel)?;
        let (_, mut call) = self.inner.anrufe.remove(&call_id)?;
        call.klingel_timer_abbrechen();
        call.zustand = CallZustand::Beendet;
        call.beendet_um = Some(Utc::now());
        tracing::info!(call_id = %call_id, von = %von, "Anruf beendet");
        Some(call)
    }

    /// Loest den Klingel-Timeout aus (terminal)
    ///
    /// Wirkt nur wenn der Anruf noch klingelt; nach Annahme, Ablehnung
    /// oder Ende ist der Aufruf ein No-op.
    pub fn zeitueberschreitung(&self, call_id: &CallId) -> Option<DirectCall> {
        let (_, mut call) = self
            .inner
            .anrufe
            .remove_if(call_id, |_, c| c.zustand == CallZustand::Klingelt)?;
        self.inner
            .paare
            .remove(&paar_schluessel(&call.anrufer, &call.angerufener));
        call.klingel_abbruch = None;
        call.zustand = CallZustand::Zeitueberschritten;
        call.beendet_um = Some(Utc::now());
        tracing::info!(call_id = %call_id, "Anruf nicht angenommen (Klingel-Timeout)");
        Some(call)
    }

    /// Beendet alle nicht-terminalen Anrufe eines Benutzers
    ///
    /// Fuer die Aufraeumroutine beim Verbindungsende. Gibt die beendeten
    /// Anrufe zurueck, damit die Gegenseiten benachrichtigt werden koennen.
    pub fn alle_beenden_fuer(&self, user_id: &UserId) -> Vec<DirectCall> {
        let beteiligte: Vec<(UserId, UserId)> = self
            .inner
            .anrufe
            .iter()
            .filter(|c| c.anrufer == *user_id || c.angerufener == *user_id)
            .map(|c| (c.anrufer, c.angerufener))
            .collect();

        beteiligte
            .into_iter()
            .filter_map(|(a, b)| self.beenden(&a, &b))
            .collect()
    }

    /// Gibt die CallId des nicht-terminalen Anrufs eines Paares zurueck
    pub fn aktiver_anruf(&self, a: &UserId, b: &UserId) -> Option<CallId> {
        self.inner.paare.get(&paar_schluessel(a, b)).map(|id| *id)
    }

    /// Gibt die Anzahl der nicht-terminalen Anrufe zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.anrufe.len()
    }
}

impl Default for CallState {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
