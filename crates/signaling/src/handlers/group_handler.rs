//! Group-Handler – Start, Join, Leave, End und Invite
//!
//! Setzt die Raum-Verwaltung aus `group` in Protokollnachrichten um.
//! Join-Antworten tragen die volle Teilnehmerliste, damit der
//! Beitretende seine Seite des Full-Mesh aufbauen kann; die bestehenden
//! Teilnehmer initiieren ihre Peer-Verbindungen zum Neuen auf das
//! `ParticipantJoined`-Event hin. Medien-Topologie vermittelt der
//! Server darueber hinaus nicht.
//!
//! Alle Operationen sind tolerant: unbekannte Raeume oder Benutzer sind
//! stille No-ops.

use palaver_core::identity::IdentityProvider;
use palaver_core::types::UserId;
use palaver_protocol::control::{
    jetzt_ms, EndGroupCallRequest, GroupCallEnded, GroupCallInvitation, GroupCallJoined,
    GroupParticipantInfo, InviteToGroupCallRequest, JoinGroupCallRequest, LeaveGroupCallRequest,
    ParticipantJoined, ParticipantLeft, SignalMessage, SignalPayload, StartGroupCallRequest,
};
use std::sync::Arc;

use crate::group::{BeitrittErgebnis, StartErgebnis, Teilnehmer, VerlassenErgebnis};
use crate::server_state::SignalingState;

/// Konvertiert Teilnehmer in Protokoll-Infos
fn teilnehmer_infos(teilnehmer: &[Teilnehmer]) -> Vec<GroupParticipantInfo> {
    teilnehmer
        .iter()
        .map(|t| GroupParticipantInfo {
            user_id: t.user_id,
            display_name: t.anzeige_name.clone(),
            is_creator: t.ist_ersteller,
        })
        .collect()
}

/// Verarbeitet den Start eines Gruppenanrufs
///
/// Laeuft fuer die Gruppe bereits ein Anruf, ist der Start ein No-op
/// und die Antwort traegt den bestehenden Raumzustand.
pub async fn handle_start_group_call<I>(
    request: StartGroupCallRequest,
    request_id: u32,
    ersteller: UserId,
    state: &Arc<SignalingState<I>>,
) -> SignalMessage
where
    I: IdentityProvider + 'static,
{
    let name = state
        .registry
        .anzeige_name_von(&ersteller)
        .unwrap_or_default();

    let teilnehmer = match state.gruppen.starten(request.group_id.clone(), ersteller, name) {
        StartErgebnis::Erstellt(t) | StartErgebnis::BereitsAktiv(t) => t,
    };

    SignalMessage::new(
        request_id,
        SignalPayload::GroupCallJoined(GroupCallJoined {
            group_id: request.group_id,
            participants: teilnehmer_infos(&teilnehmer),
        }),
    )
}

/// Verarbeitet den Beitritt zu einem Gruppenanruf
///
/// Bestehende Teilnehmer erhalten `ParticipantJoined`; der Beitretende
/// die Teilnehmerliste. Beitritt zu einem unbekannten Raum ist ein
/// stiller No-op (Raum kann zwischenzeitlich beendet worden sein).
pub async fn handle_join_group_call<I>(
    request: JoinGroupCallRequest,
    request_id: u32,
    user_id: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    let name = state
        .registry
        .anzeige_name_von(&user_id)
        .unwrap_or_default();

    match state
        .gruppen
        .beitreten(&request.group_id, user_id, name.clone())
    {
        BeitrittErgebnis::Beigetreten(teilnehmer) => {
            let event = SignalMessage::push(SignalPayload::ParticipantJoined(ParticipantJoined {
                group_id: request.group_id.clone(),
                user_id,
                display_name: name,
                timestamp_ms: jetzt_ms(),
            }));
            an_raum_senden_ausser(state, &teilnehmer, &user_id, event);

            Some(SignalMessage::new(
                request_id,
                SignalPayload::GroupCallJoined(GroupCallJoined {
                    group_id: request.group_id,
                    participants: teilnehmer_infos(&teilnehmer),
                }),
            ))
        }
        BeitrittErgebnis::BereitsTeilnehmer(teilnehmer) => Some(SignalMessage::new(
            request_id,
            SignalPayload::GroupCallJoined(GroupCallJoined {
                group_id: request.group_id,
                participants: teilnehmer_infos(&teilnehmer),
            }),
        )),
        BeitrittErgebnis::KeinRaum => {
            tracing::debug!(group_id = %request.group_id, "Beitritt zu unbekanntem Raum (No-op)");
            None
        }
    }
}

/// Verarbeitet das Verlassen eines Gruppenanrufs
pub async fn handle_leave_group_call<I>(
    request: LeaveGroupCallRequest,
    user_id: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    if let VerlassenErgebnis::Verlassen { verbleibende, .. } =
        state.gruppen.verlassen(&request.group_id, &user_id)
    {
        let event = SignalMessage::push(SignalPayload::ParticipantLeft(ParticipantLeft {
            group_id: request.group_id,
            user_id,
            timestamp_ms: jetzt_ms(),
        }));
        for mitglied in verbleibende {
            state.registry.an_user_senden(&mitglied, event.clone());
        }
    }
    None
}

/// Verarbeitet das Beenden eines Gruppenanrufs (nur Ersteller)
///
/// Alle Teilnehmer – einschliesslich des Beendenden – erhalten
/// `GroupCallEnded`. Anfragen anderer Benutzer sind stille No-ops.
pub async fn handle_end_group_call<I>(
    request: EndGroupCallRequest,
    user_id: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    if let Some(raum) = state.gruppen.beenden(&request.group_id, &user_id) {
        let event = SignalMessage::push(SignalPayload::GroupCallEnded(GroupCallEnded {
            group_id: request.group_id,
            ended_by: user_id,
            timestamp_ms: jetzt_ms(),
        }));
        for teilnehmer in &raum.teilnehmer {
            state.registry.an_user_senden(&teilnehmer.user_id, event.clone());
        }
    }
    None
}

/// Verarbeitet eine Einladung in einen Gruppenanruf
///
/// Der Eingeladene erhaelt `GroupCallInvitation` sofern er online ist;
/// doppelte Einladungen sind idempotente No-ops.
pub async fn handle_invite_to_group_call<I>(
    request: InviteToGroupCallRequest,
    einladender: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    if !state
        .gruppen
        .einladen(&request.group_id, request.target_user_id)
    {
        return None;
    }

    let einladender_name = state
        .registry
        .anzeige_name_von(&einladender)
        .unwrap_or_default();

    state.registry.an_user_senden(
        &request.target_user_id,
        SignalMessage::push(SignalPayload::GroupCallInvitation(GroupCallInvitation {
            group_id: request.group_id,
            group_name: request.group_name,
            caller_id: einladender,
            caller_name: einladender_name,
            timestamp_ms: jetzt_ms(),
        })),
    );
    None
}

/// Sendet ein Event an alle Raum-Teilnehmer ausser einem
///
/// Nuetzlich um Join-Events zu verteilen ohne den Ausloeser zu
/// informieren.
fn an_raum_senden_ausser<I>(
    state: &Arc<SignalingState<I>>,
    teilnehmer: &[Teilnehmer],
    ausgeschlossen: &UserId,
    nachricht: SignalMessage,
) where
    I: IdentityProvider + 'static,
{
    for t in teilnehmer {
        if t.user_id == *ausgeschlossen {
            continue;
        }
        state.registry.an_user_senden(&t.user_id, nachricht.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
