//! Presence-Broadcaster – Verteilt Statuswechsel an alle Clients
//!
//! Jeder Registry-Uebergang (online/offline) erzeugt genau einen
//! Broadcast an alle verbundenen Clients. Keine Filterung, kein
//! Rate-Limiting – auch der Betroffene selbst empfaengt die Nachricht,
//! was harmlos ist. Eigenen Zustand haelt der Broadcaster nicht; die
//! Empfaengerliste kommt aus der Registry.

use palaver_core::types::UserId;
use palaver_protocol::control::{SignalMessage, SignalPayload, UserStatusChange};

use crate::registry::ConnectionRegistry;

/// Verteilt Presence-Statuswechsel an alle verbundenen Clients
#[derive(Clone)]
pub struct PresenceBroadcaster {
    registry: ConnectionRegistry,
}

impl PresenceBroadcaster {
    /// Erstellt einen neuen PresenceBroadcaster auf der gegebenen Registry
    pub fn neu(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Verbreitet einen Statuswechsel an alle verbundenen Clients
    ///
    /// Gibt die Anzahl der erreichten Clients zurueck.
    pub fn status_verbreiten(
        &self,
        user_id: UserId,
        anzeige_name: impl Into<String>,
        ist_online: bool,
    ) -> usize {
        let nachricht = SignalMessage::push(SignalPayload::UserStatusChange(UserStatusChange {
            user_id,
            display_name: anzeige_name.into(),
            is_online: ist_online,
        }));

        let erreicht = self.registry.an_alle_senden(nachricht);
        tracing::debug!(
            user_id = %user_id,
            ist_online,
            erreicht,
            "Presence-Status verbreitet"
        );
        erreicht
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn status_erreicht_alle_clients() {
        let registry = ConnectionRegistry::neu();
        let broadcaster = PresenceBroadcaster::neu(registry.clone());

        let uid_a = UserId::new();
        let uid_b = UserId::new();
        let (_nr_a, mut rx_a) = registry.registrieren(uid_a, "a");
        let (_nr_b, mut rx_b) = registry.registrieren(uid_b, "b");

        let erreicht = broadcaster.status_verbreiten(uid_a, "a", true);
        assert_eq!(erreicht, 2, "Auch der Betroffene selbst empfaengt");

        for rx in [&mut rx_a, &mut rx_b] {
            let msg = rx.try_recv().expect("Status-Nachricht erwartet");
            match msg.payload {
                SignalPayload::UserStatusChange(s) => {
                    assert_eq!(s.user_id, uid_a);
                    assert!(s.is_online);
                }
                _ => panic!("Erwartet UserStatusChange"),
            }
        }
    }

    #[tokio::test]
    async fn offline_status_nach_abmelden() {
        let registry = ConnectionRegistry::neu();
        let broadcaster = PresenceBroadcaster::neu(registry.clone());

        let uid_a = UserId::new();
        let uid_b = UserId::new();
        let (nr_a, _rx_a) = registry.registrieren(uid_a, "a");
        let (_nr_b, mut rx_b) = registry.registrieren(uid_b, "b");

        registry.abmelden(&uid_a, nr_a);
        let erreicht = broadcaster.status_verbreiten(uid_a, "a", false);
        assert_eq!(erreicht, 1, "Nur der verbliebene Client");

        let msg = rx_b.try_recv().unwrap();
        match msg.payload {
            SignalPayload::UserStatusChange(s) => {
                assert_eq!(s.user_id, uid_a);
                assert!(!s.is_online);
            }
            _ => panic!("Erwartet UserStatusChange"),
        }
    }
}
