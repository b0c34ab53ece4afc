//! LAN-Handler – Adress-Meldung und Subnetz-Scan
//!
//! Clients melden ihre lokalen Adressen nach dem Verbindungsaufbau und
//! fragen bei Bedarf nach Peers im selben Subnetz. Ein Scan liefert
//! immer eine Antwort – im Zweifel eine leere Liste, nie einen Fehler.

use palaver_core::identity::IdentityProvider;
use palaver_core::types::UserId;
use palaver_protocol::control::{
    LanReportRequest, LanUsersResponse, SignalMessage, SignalPayload,
};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet eine Adress-Meldung (Upsert, keine Antwort)
pub async fn handle_lan_report<I>(
    request: LanReportRequest,
    user_id: UserId,
    state: &Arc<SignalingState<I>>,
) where
    I: IdentityProvider + 'static,
{
    let name = state
        .registry
        .anzeige_name_von(&user_id)
        .unwrap_or_default();
    state.lan.melden(user_id, name, request.addresses);
}

/// Verarbeitet einen Subnetz-Scan
pub async fn handle_lan_scan<I>(
    request_id: u32,
    user_id: UserId,
    state: &Arc<SignalingState<I>>,
) -> SignalMessage
where
    I: IdentityProvider + 'static,
{
    let users = state.lan.peers_im_subnetz(&user_id);
    SignalMessage::new(
        request_id,
        SignalPayload::LanUsers(LanUsersResponse { users }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::SignalingConfig;
    use palaver_core::identity::OpenIdentityProvider;

    fn test_state() -> Arc<SignalingState<OpenIdentityProvider>> {
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(OpenIdentityProvider::neu()),
        )
    }

    #[tokio::test]
    async fn meldung_und_scan() {
        let state = test_state();
        let ich = UserId::new();
        let nachbar = UserId::new();
        let (_nr1, _rx1) = state.registry.registrieren(ich, "ich");
        let (_nr2, _rx2) = state.registry.registrieren(nachbar, "nachbar");

        handle_lan_report(
            LanReportRequest {
                addresses: vec!["192.168.1.10".into()],
            },
            ich,
            &state,
        )
        .await;
        handle_lan_report(
            LanReportRequest {
                addresses: vec!["192.168.1.50".into()],
            },
            nachbar,
            &state,
        )
        .await;

        let antwort = handle_lan_scan(7, ich, &state).await;
        match antwort.payload {
            SignalPayload::LanUsers(liste) => {
                assert_eq!(liste.users.len(), 1);
                assert_eq!(liste.users[0].id, nachbar);
                assert_eq!(liste.users[0].name, "nachbar");
                assert_eq!(liste.users[0].ip, "192.168.1.50");
            }
            _ => panic!("Erwartet LanUsers"),
        }
    }

    #[tokio::test]
    async fn scan_ohne_meldung_liefert_leere_liste() {
        let state = test_state();
        let antwort = handle_lan_scan(1, UserId::new(), &state).await;
        match antwort.payload {
            SignalPayload::LanUsers(liste) => assert!(liste.users.is_empty()),
            _ => panic!("Erwartet LanUsers"),
        }
    }
}
