//! Relay-Handler – Offer, Answer und ICE-Candidate
//!
//! Duenne Schicht ueber dem `SignalRelay`: entpackt die Zielangabe,
//! stempelt den authentifizierten Absender und leitet weiter. Das Relay
//! prueft bewusst nicht, ob zwischen den Parteien gerade ein Anruf
//! laeuft – Signalisierung ohne aktiven Anruf wird zugestellt wenn das
//! Ziel online ist, sonst still verworfen.

use palaver_core::identity::IdentityProvider;
use palaver_core::types::UserId;
use palaver_protocol::control::{AnswerMessage, IceCandidateMessage, OfferMessage};
use std::sync::Arc;

use crate::relay::RelayArt;
use crate::server_state::SignalingState;

/// Leitet ein SDP-Offer an das Ziel weiter
pub async fn handle_offer<I>(
    nachricht: OfferMessage,
    von: UserId,
    state: &Arc<SignalingState<I>>,
) where
    I: IdentityProvider + 'static,
{
    state
        .relay
        .weiterleiten(RelayArt::Offer, von, &nachricht.target, nachricht.sdp);
}

/// Leitet eine SDP-Answer an das Ziel weiter
pub async fn handle_answer<I>(
    nachricht: AnswerMessage,
    von: UserId,
    state: &Arc<SignalingState<I>>,
) where
    I: IdentityProvider + 'static,
{
    state
        .relay
        .weiterleiten(RelayArt::Answer, von, &nachricht.target, nachricht.sdp);
}

/// Leitet einen ICE-Kandidaten an das Ziel weiter
pub async fn handle_ice_candidate<I>(
    nachricht: IceCandidateMessage,
    von: UserId,
    state: &Arc<SignalingState<I>>,
) where
    I: IdentityProvider + 'static,
{
    state.relay.weiterleiten(
        RelayArt::IceCandidate,
        von,
        &nachricht.target,
        nachricht.candidate,
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
