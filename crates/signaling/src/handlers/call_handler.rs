//! Call-Handler – Initiate, Accept, Reject, End und Klingel-Timeout
//!
//! Setzt die Zustandsmaschine aus `calls` in Protokollnachrichten um.
//! Fehler-Feedback geht immer nur an die ausloesende Verbindung
//! (`CallError`), nie an Dritte. Verirrte oder doppelte Nachrichten
//! (Annahme eines laengst beendeten Anrufs, doppeltes Auflegen) werden
//! still absorbiert.

use palaver_core::identity::IdentityProvider;
use palaver_core::types::{CallId, UserId};
use palaver_protocol::control::{
    jetzt_ms, AcceptCallRequest, CallAccepted, CallEnded, CallInitiated, CallRejected,
    EndCallRequest, IncomingCall, InitiateCallRequest, RejectCallRequest, SignalMessage,
    SignalPayload,
};
use std::sync::Arc;

use crate::calls::AnnahmeErgebnis;
use crate::server_state::SignalingState;

/// Standard-Ablehnungsgrund wenn der Client keinen mitschickt
const STANDARD_ABLEHNUNGSGRUND: &str = "Anruf abgelehnt";

/// Ablehnungsgrund beim Klingel-Timeout
const TIMEOUT_GRUND: &str = "Nicht angenommen";

/// Verarbeitet eine Anruf-Initiierung
///
/// Fail fast: ist der Angerufene offline, wird kein Anruf angelegt und
/// der Anrufer bekommt sofort `CallError`. Bei Erfolg klingelt es beim
/// Angerufenen (`IncomingCall`) und der Anrufer erhaelt `CallInitiated`.
pub async fn handle_initiate_call<I>(
    request: InitiateCallRequest,
    request_id: u32,
    anrufer: UserId,
    state: &Arc<SignalingState<I>>,
) -> SignalMessage
where
    I: IdentityProvider + 'static,
{
    if request.receiver_id == anrufer {
        return SignalMessage::call_error(request_id, "Selbstanruf ist nicht moeglich");
    }

    if !state.registry.ist_online(&request.receiver_id) {
        tracing::debug!(
            anrufer = %anrufer,
            angerufener = %request.receiver_id,
            "Anruf abgewiesen – Angerufener offline"
        );
        return SignalMessage::call_error(request_id, "Benutzer ist offline");
    }

    let call_id = match state
        .anrufe
        .anlegen(anrufer, request.receiver_id, request.is_video)
    {
        Some(id) => id,
        None => {
            return SignalMessage::call_error(
                request_id,
                "Zwischen euch laeuft bereits ein Anruf",
            );
        }
    };

    let anrufer_name = state
        .registry
        .anzeige_name_von(&anrufer)
        .unwrap_or_default();

    let zugestellt = state.registry.an_user_senden(
        &request.receiver_id,
        SignalMessage::push(SignalPayload::IncomingCall(IncomingCall {
            caller_id: anrufer,
            caller_name: anrufer_name,
            is_video: request.is_video,
            timestamp_ms: jetzt_ms(),
        })),
    );

    if !zugestellt {
        // Queue zwischenzeitlich geschlossen – Anruf zuruecknehmen
        let _ = state.anrufe.beenden(&anrufer, &request.receiver_id);
        return SignalMessage::call_error(request_id, "Benutzer ist offline");
    }

    klingel_timer_starten(state, call_id);

    SignalMessage::new(
        request_id,
        SignalPayload::CallInitiated(CallInitiated {
            receiver_id: request.receiver_id,
            timestamp_ms: jetzt_ms(),
        }),
    )
}

/// Startet den Klingel-Timeout-Task fuer einen frisch angelegten Anruf
///
/// Der Task haelt nur die CallId und eine Arc-Referenz auf den Zustand.
/// Sein AbortHandle landet im Anruf-Eintrag und wird bei jedem anderen
/// Uebergang aus `Klingelt` abgebrochen.
fn klingel_timer_starten<I>(state: &Arc<SignalingState<I>>, call_id: CallId)
where
    I: IdentityProvider + 'static,
{
    let timeout = state.klingel_timeout();
    let task_state = Arc::clone(state);
    let task = tokio::spawn(async move {
        tokio::time::sleep(timeout).await;

        // Wirkt nur wenn der Anruf noch klingelt
        if let Some(call) = task_state.anrufe.zeitueberschreitung(&call_id) {
            // Aus Anrufersicht identisch zu einer Ablehnung – genau eine
            // terminale Benachrichtigung
            task_state.registry.an_user_senden(
                &call.anrufer,
                SignalMessage::push(SignalPayload::CallRejected(CallRejected {
                    receiver_id: call.angerufener,
                    reason: TIMEOUT_GRUND.to_string(),
                    timestamp_ms: jetzt_ms(),
                })),
            );
            // Klingel-UI des Angerufenen aufloesen
            task_state.registry.an_user_senden(
                &call.angerufener,
                SignalMessage::push(SignalPayload::CallEnded(CallEnded {
                    remote_user_id: call.anrufer,
                    timestamp_ms: jetzt_ms(),
                })),
            );
        }
    });

    state
        .anrufe
        .klingel_abbruch_setzen(&call_id, task.abort_handle());
}

/// Verarbeitet die Annahme eines klingelnden Anrufs
///
/// Der Anrufer erhaelt genau ein `CallAccepted`. Eine zweite Annahme
/// desselben Anrufs ist ein stiller No-op; eine Annahme ohne passenden
/// Anruf ergibt `CallError` an den Annehmenden.
pub async fn handle_accept_call<I>(
    request: AcceptCallRequest,
    request_id: u32,
    annehmender: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    match state.anrufe.annehmen(&request.caller_id, &annehmender) {
        AnnahmeErgebnis::Verbunden(_) => {
            state.registry.an_user_senden(
                &request.caller_id,
                SignalMessage::push(SignalPayload::CallAccepted(CallAccepted {
                    receiver_id: annehmender,
                    timestamp_ms: jetzt_ms(),
                })),
            );
            None
        }
        AnnahmeErgebnis::BereitsVerbunden => None,
        AnnahmeErgebnis::KeinAnruf => Some(SignalMessage::call_error(
            request_id,
            "Kein klingelnder Anruf zu dieser Annahme",
        )),
    }
}

/// Verarbeitet die Ablehnung eines klingelnden Anrufs
///
/// Der Anrufer erhaelt `CallRejected` mit dem (freien) Grund. Verirrte
/// Ablehnungen ohne passenden Anruf sind stille No-ops.
pub async fn handle_reject_call<I>(
    request: RejectCallRequest,
    ablehnender: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    if state
        .anrufe
        .ablehnen(&request.caller_id, &ablehnender)
        .is_some()
    {
        let grund = request
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| STANDARD_ABLEHNUNGSGRUND.to_string());

        state.registry.an_user_senden(
            &request.caller_id,
            SignalMessage::push(SignalPayload::CallRejected(CallRejected {
                receiver_id: ablehnender,
                reason: grund,
                timestamp_ms: jetzt_ms(),
            })),
        );
    }
    None
}

/// Verarbeitet das Beenden eines Anrufs (beide Seiten, idempotent)
///
/// Die Gegenseite erhaelt genau ein `CallEnded`. Beenden eines
/// unbekannten oder bereits beendeten Anrufs ist ein No-op, nie ein
/// Fehler.
pub async fn handle_end_call<I>(
    request: EndCallRequest,
    beendender: UserId,
    state: &Arc<SignalingState<I>>,
) -> Option<SignalMessage>
where
    I: IdentityProvider + 'static,
{
    if state
        .anrufe
        .beenden(&beendender, &request.remote_user_id)
        .is_some()
    {
        state.registry.an_user_senden(
            &request.remote_user_id,
            SignalMessage::push(SignalPayload::CallEnded(CallEnded {
                remote_user_id: beendender,
                timestamp_ms: jetzt_ms(),
            })),
        );
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
