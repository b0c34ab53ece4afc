//! Presence-Handler – Online-Listen-Anfrage
//!
//! Der initiale Presence-Sync laeuft bereits ueber die Hello-Antwort;
//! diese Anfrage erlaubt Clients eine explizite Neusynchronisierung
//! (z. B. nach einem UI-Reset).

use palaver_core::identity::IdentityProvider;
use palaver_core::types::UserId;
use palaver_protocol::control::{OnlineUser, OnlineUsersResponse, SignalMessage, SignalPayload};
use std::sync::Arc;

use crate::server_state::SignalingState;

/// Verarbeitet eine Online-Listen-Anfrage
pub async fn handle_online_users<I>(
    request_id: u32,
    anfragender: UserId,
    state: &Arc<SignalingState<I>>,
) -> SignalMessage
where
    I: IdentityProvider + 'static,
{
    let users: Vec<OnlineUser> = state
        .registry
        .online_liste()
        .into_iter()
        .filter(|(uid, _)| *uid != anfragender)
        .map(|(user_id, display_name)| OnlineUser {
            user_id,
            display_name,
        })
        .collect();

    SignalMessage::new(
        request_id,
        SignalPayload::OnlineUsersResponse(OnlineUsersResponse { users }),
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

    #[tokio::test]
    async fn liste_enthaelt_andere_aber_nicht_den_anfragenden() {
        let state = SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(OpenIdentityProvider::neu()),
        );
        let ich = UserId::new();
        let andere = UserId::new();
        let (_nr1, _rx1) = state.registry.registrieren(ich, "ich");
        let (_nr2, _rx2) = state.registry.registrieren(andere, "andere");

        let antwort = handle_online_users(3, ich, &state).await;
        match antwort.payload {
            SignalPayload::OnlineUsersResponse(resp) => {
                assert_eq!(resp.users.len(), 1);
                assert_eq!(resp.users[0].user_id, andere);
            }
            _ => panic!("Erwartet OnlineUsersResponse"),
        }
    }
}
