//! Session-Handler – Hello-Handshake und Presence-Sync
//!
//! Die erste Nachricht jeder Verbindung ist ein `Hello`. Die behauptete
//! Identitaet wird genau einmal gegen den externen Identity-Provider
//! geprueft, bevor irgendeine Kern-Logik betreten wird. Die Antwort
//! enthaelt die aktuelle Online-Liste, damit der Client seine
//! Kontaktanzeige ohne zweite Anfrage initialisieren kann.

use palaver_core::identity::IdentityProvider;
use palaver_protocol::control::{
    ErrorCode, HelloRequest, HelloResponse, OnlineUser, SignalMessage, SignalPayload,
};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet die Hello-Anfrage einer frischen Verbindung
///
/// Bei Erfolg traegt die Antwort den bestaetigten Anzeigenamen; der
/// Dispatcher uebernimmt daraus den Verbindungskontext. Die eigentliche
/// Registry-Registrierung macht die `ClientConnection` nach dem Versand
/// der Antwort.
pub async fn handle_hello<I>(
    request: HelloRequest,
    request_id: u32,
    state: &Arc<SignalingState<I>>,
) -> SignalMessage
where
    I: IdentityProvider + 'static,
{
    let identitaet = match state
        .identity
        .verifizieren(
            request.user_id,
            &request.display_name,
            request.token.as_deref(),
        )
        .await
    {
        Ok(identitaet) => identitaet,
        Err(e) => {
            tracing::warn!(
                user_id = %request.user_id,
                fehler = %e,
                "Identitaetspruefung fehlgeschlagen"
            );
            return SignalMessage::error(
                request_id,
                ErrorCode::IdentityRejected,
                "Identitaet abgelehnt",
            );
        }
    };

    // Presence-Sync: alle anderen aktuell verbundenen Benutzer.
    // Bei einem Reconnect steht der eigene alte Eintrag noch in der
    // Registry – der gehoert nicht in die Liste.
    let online: Vec<OnlineUser> = state
        .registry
        .online_liste()
        .into_iter()
        .filter(|(uid, _)| *uid != identitaet.user_id)
        .map(|(user_id, display_name)| OnlineUser {
            user_id,
            display_name,
        })
        .collect();

    tracing::info!(
        user_id = %identitaet.user_id,
        name = %identitaet.anzeige_name,
        "Verbindung angemeldet"
    );

    SignalMessage::new(
        request_id,
        SignalPayload::HelloResponse(HelloResponse {
            user_id: identitaet.user_id,
            display_name: identitaet.anzeige_name,
            server_name: state.config.server_name.clone(),
            online,
        }),
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
    use palaver_core::types::UserId;

    fn test_state() -> Arc<SignalingState<OpenIdentityProvider>> {
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(OpenIdentityProvider::neu()),
        )
    }

    fn hello(user_id: UserId, name: &str) -> HelloRequest {
        HelloRequest {
            user_id,
            display_name: name.to_string(),
            token: None,
            client_version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn hello_liefert_online_liste() {
        let state = test_state();
        let bestehend = UserId::new();
        let (_nr, _rx) = state.registry.registrieren(bestehend, "bestehend");

        let antwort = handle_hello(hello(UserId::new(), "neu"), 1, &state).await;
        match antwort.payload {
            SignalPayload::HelloResponse(resp) => {
                assert_eq!(resp.display_name, "neu");
                assert_eq!(resp.online.len(), 1);
                assert_eq!(resp.online[0].user_id, bestehend);
            }
            _ => panic!("Erwartet HelloResponse"),
        }
    }

    #[tokio::test]
    async fn hello_filtert_eigenen_alten_eintrag() {
        let state = test_state();
        let uid = UserId::new();
        // Alter Eintrag aus einer frueheren Verbindung (Reconnect)
        let (_nr, _rx) = state.registry.registrieren(uid, "ich");

        let antwort = handle_hello(hello(uid, "ich"), 2, &state).await;
        match antwort.payload {
            SignalPayload::HelloResponse(resp) => assert!(resp.online.is_empty()),
            _ => panic!("Erwartet HelloResponse"),
        }
    }

    #[tokio::test]
    async fn hello_mit_leerem_namen_wird_abgelehnt() {
        let state = test_state();
        let antwort = handle_hello(hello(UserId::new(), "   "), 3, &state).await;
        match antwort.payload {
            SignalPayload::Error(e) => assert_eq!(e.code, ErrorCode::IdentityRejected),
            _ => panic!("Erwartet Error"),
        }
    }
}
