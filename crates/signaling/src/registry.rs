//! Connection-Registry – Verwaltet die aktive Verbindung pro Benutzer
//!
//! Das Fundament aller anderen Komponenten: bildet eine logische
//! Benutzeridentitaet auf hoechstens eine aktive Transportverbindung ab.
//! Jeder Eintrag haelt die Send-Queue der Verbindung, sodass gezielt
//! oder an alle gepusht werden kann.
//!
//! ## Supersede-Semantik
//! Eine neue Verbindung unter derselben Identitaet ueberschreibt den
//! alten Eintrag. Damit die Aufraeumroutine der verdraengten Verbindung
//! nicht den Nachfolger entfernt, traegt jeder Eintrag eine monoton
//! steigende Verbindungsnummer; `abmelden` entfernt nur bei passender
//! Nummer.

use dashmap::DashMap;
use palaver_core::types::UserId;
use palaver_protocol::control::SignalMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Client
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// ClientHandle
// ---------------------------------------------------------------------------

/// Eintrag eines verbundenen Benutzers
///
/// Haelt die Send-Queue der Transportverbindung sowie die beim Connect
/// erfassten Anzeige-Informationen.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    pub user_id: UserId,
    pub anzeige_name: String,
    pub verbunden_um: chrono::DateTime<chrono::Utc>,
    /// Monoton steigende Nummer dieser Verbindung (Supersede-Schutz)
    pub verbindungs_nr: u64,
    tx: mpsc::Sender<SignalMessage>,
}

impl ClientHandle {
    /// Sendet eine Nachricht nicht-blockierend an den Client
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, nachricht: SignalMessage) -> bool {
        match self.tx.try_send(nachricht) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(user_id = %self.user_id, "Send-Queue voll – Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(user_id = %self.user_id, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionRegistry
// ---------------------------------------------------------------------------

/// Zentrale Registry aller verbundenen Benutzer
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<ConnectionRegistryInner>,
}

struct ConnectionRegistryInner {
    /// Aktive Verbindungen, indiziert nach UserId (hoechstens eine pro Benutzer)
    clients: DashMap<UserId, ClientHandle>,
    /// Zaehler fuer Verbindungsnummern
    naechste_nr: AtomicU64,
}

impl ConnectionRegistry {
    /// Erstellt eine neue leere Registry
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(ConnectionRegistryInner {
                clients: DashMap::new(),
                naechste_nr: AtomicU64::new(1),
            }),
        }
    }

    /// Registriert einen Benutzer und gibt seine Empfangs-Queue zurueck
    ///
    /// Ueberschreibt einen bestehenden Eintrag (Supersede). Das Schliessen
    /// der alten Transportverbindung ist Sache der Transportschicht – hier
    /// wird nur deren Send-Queue fallen gelassen.
    ///
    /// Die zurueckgegebene Verbindungsnummer wird beim `abmelden` wieder
    /// vorgelegt.
    pub fn registrieren(
        &self,
        user_id: UserId,
        anzeige_name: impl Into<String>,
    ) -> (u64, mpsc::Receiver<SignalMessage>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);
        let verbindungs_nr = self.inner.naechste_nr.fetch_add(1, Ordering::Relaxed);
        let handle = ClientHandle {
            user_id,
            anzeige_name: anzeige_name.into(),
            verbunden_um: chrono::Utc::now(),
            verbindungs_nr,
            tx,
        };

        if let Some(alt) = self.inner.clients.insert(user_id, handle) {
            tracing::info!(
                user_id = %user_id,
                alte_nr = alt.verbindungs_nr,
                neue_nr = verbindungs_nr,
                "Bestehende Verbindung durch neue ersetzt"
            );
        } else {
            tracing::info!(user_id = %user_id, nr = verbindungs_nr, "Client online");
        }

        (verbindungs_nr, rx)
    }

    /// Entfernt einen Benutzer, sofern die Verbindungsnummer passt
    ///
    /// Gibt `true` zurueck wenn tatsaechlich ein Eintrag entfernt wurde.
    /// No-op bei unbekanntem Benutzer (doppelte Disconnect-Events) und
    /// bei veralteter Nummer (Verbindung wurde bereits ersetzt).
    pub fn abmelden(&self, user_id: &UserId, verbindungs_nr: u64) -> bool {
        let entfernt = self
            .inner
            .clients
            .remove_if(user_id, |_, handle| handle.verbindungs_nr == verbindungs_nr)
            .is_some();

        if entfernt {
            tracing::info!(user_id = %user_id, nr = verbindungs_nr, "Client offline");
        } else {
            tracing::debug!(
                user_id = %user_id,
                nr = verbindungs_nr,
                "Abmelden ohne passenden Eintrag (No-op)"
            );
        }
        entfernt
    }

    /// Sendet eine Nachricht an einen einzelnen Benutzer
    ///
    /// Gibt `true` zurueck wenn der Benutzer online ist und die Nachricht
    /// eingereiht wurde; `false` sonst (Nachricht verworfen).
    pub fn an_user_senden(&self, user_id: &UserId, nachricht: SignalMessage) -> bool {
        match self.inner.clients.get(user_id) {
            Some(handle) => handle.senden(nachricht),
            None => {
                tracing::debug!(user_id = %user_id, "Senden an nicht verbundenen Benutzer");
                false
            }
        }
    }

    /// Sendet eine Nachricht an alle verbundenen Benutzer
    ///
    /// Gibt die Anzahl der erfolgreichen Sendungen zurueck.
    pub fn an_alle_senden(&self, nachricht: SignalMessage) -> usize {
        let mut gesendet = 0;
        self.inner.clients.iter().for_each(|entry| {
            if entry.value().senden(nachricht.clone()) {
                gesendet += 1;
            }
        });
        gesendet
    }

    /// Prueft ob ein Benutzer online ist
    pub fn ist_online(&self, user_id: &UserId) -> bool {
        self.inner.clients.contains_key(user_id)
    }

    /// Gibt den Verbindungs-Eintrag eines Benutzers zurueck
    pub fn handle_von(&self, user_id: &UserId) -> Option<ClientHandle> {
        self.inner.clients.get(user_id).map(|h| h.clone())
    }

    /// Gibt den Anzeigenamen eines verbundenen Benutzers zurueck
    pub fn anzeige_name_von(&self, user_id: &UserId) -> Option<String> {
        self.inner
            .clients
            .get(user_id)
            .map(|h| h.anzeige_name.clone())
    }

    /// Gibt alle verbundenen Benutzer zurueck (Reihenfolge unspezifiziert)
    ///
    /// Fuer den Presence-Sync beim Verbindungsaufbau.
    pub fn online_liste(&self) -> Vec<(UserId, String)> {
        self.inner
            .clients
            .iter()
            .map(|e| (e.user_id, e.anzeige_name.clone()))
            .collect()
    }

    /// Gibt die Anzahl der verbundenen Benutzer zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.clients.len()
    }
}

impl Default for ConnectionRegistry {
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

    fn test_nachricht(id: u32) -> SignalMessage {
        SignalMessage::ping(id, 12345)
    }

    #[tokio::test]
    async fn registrieren_und_senden() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (_nr, mut rx) = registry.registrieren(uid, "alice");
        assert!(registry.ist_online(&uid));
        assert_eq!(registry.anzeige_name_von(&uid).as_deref(), Some("alice"));
        assert!(registry.handle_von(&uid).is_some());

        let gesendet = registry.an_user_senden(&uid, test_nachricht(1));
        assert!(gesendet);

        let empfangen = rx.try_recv().expect("Nachricht muss vorhanden sein");
        assert_eq!(empfangen.request_id, 1);
    }

    #[tokio::test]
    async fn abmelden_entfernt_eintrag() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (nr, _rx) = registry.registrieren(uid, "bob");
        assert!(registry.ist_online(&uid));

        assert!(registry.abmelden(&uid, nr));
        assert!(!registry.ist_online(&uid));
        assert_eq!(registry.anzahl(), 0);

        // Doppeltes Abmelden ist No-op
        assert!(!registry.abmelden(&uid, nr));
    }

    #[tokio::test]
    async fn erneutes_registrieren_ersetzt_eintrag() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (nr1, mut rx1) = registry.registrieren(uid, "carla");
        let (nr2, mut rx2) = registry.registrieren(uid, "carla");
        assert!(nr2 > nr1);
        assert_eq!(registry.anzahl(), 1, "Nur ein Eintrag pro Benutzer");

        // Nachrichten landen nur noch in der neuen Queue
        registry.an_user_senden(&uid, test_nachricht(7));
        assert!(rx1.try_recv().is_err(), "Alte Queue ist abgehaengt");
        assert_eq!(rx2.try_recv().unwrap().request_id, 7);
    }

    #[tokio::test]
    async fn abmelden_mit_veralteter_nummer_ist_noop() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();

        let (nr1, _rx1) = registry.registrieren(uid, "dora");
        let (_nr2, _rx2) = registry.registrieren(uid, "dora");

        // Aufraeumroutine der verdraengten Verbindung darf den Nachfolger
        // nicht entfernen
        assert!(!registry.abmelden(&uid, nr1));
        assert!(registry.ist_online(&uid));
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let registry = ConnectionRegistry::neu();

        let uids: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        let mut receivers: Vec<_> = uids
            .iter()
            .map(|uid| registry.registrieren(*uid, "user").1)
            .collect();

        let gesendet = registry.an_alle_senden(test_nachricht(99));
        assert_eq!(gesendet, 5);

        for rx in &mut receivers {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[tokio::test]
    async fn senden_an_offline_benutzer() {
        let registry = ConnectionRegistry::neu();
        let gesendet = registry.an_user_senden(&UserId::new(), test_nachricht(1));
        assert!(!gesendet);
    }

    #[tokio::test]
    async fn online_liste_enthaelt_namen() {
        let registry = ConnectionRegistry::neu();
        let uid = UserId::new();
        let (_nr, _rx) = registry.registrieren(uid, "emil");

        let liste = registry.online_liste();
        assert_eq!(liste.len(), 1);
        assert_eq!(liste[0], (uid, "emil".to_string()));
    }

    #[tokio::test]
    async fn clone_teilt_inneren_state() {
        let r1 = ConnectionRegistry::neu();
        let r2 = r1.clone();
        let uid = UserId::new();

        let (_nr, _rx) = r1.registrieren(uid, "shared");
        assert!(r2.ist_online(&uid));
    }
}
