//! Message-Dispatcher – Routet SignalMessages an die richtigen Handler
//!
//! Der Dispatcher empfaengt SignalMessages von einer ClientConnection,
//! bestimmt den richtigen Handler und gibt die Antwort zurueck.
//!
//! ## Zustandspruefung
//! - `Hello` nur auf einer noch nicht angemeldeten Verbindung
//! - `Ping`/`Pong` immer erlaubt
//! - Alles andere erfordert eine angemeldete Verbindung
//!
//! Handler geben `None` zurueck wenn keine direkte Antwort faellig ist –
//! viele Operationen wirken ausschliesslich ueber Pushes an andere
//! Verbindungen.

use palaver_core::identity::IdentityProvider;
use palaver_core::types::UserId;
use palaver_protocol::control::{
    jetzt_ms, CallEnded, ErrorCode, ParticipantLeft, SignalMessage, SignalPayload,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::group::VerlassenErgebnis;
use crate::handlers::{
    call_handler, group_handler, lan_handler, presence_handler, relay_handler, session_handler,
};
use crate::server_state::SignalingState;

/// Dispatcher-Kontext – Informationen ueber die aktuelle Verbindung
pub struct DispatcherContext {
    /// Peer-Adresse (Logging)
    pub peer_addr: SocketAddr,
    /// Angemeldete User-ID (None vor dem Hello)
    pub user_id: Option<UserId>,
    /// Bestaetigter Anzeigename
    pub anzeige_name: Option<String>,
    /// Verbindungsnummer aus der Registry (None bis zur Registrierung)
    pub verbindungs_nr: Option<u64>,
}

impl DispatcherContext {
    /// Erstellt einen frischen Kontext fuer eine neue Verbindung
    pub fn neu(peer_addr: SocketAddr) -> Self {
        Self {
            peer_addr,
            user_id: None,
            anzeige_name: None,
            verbindungs_nr: None,
        }
    }
}

/// Zentraler Message-Dispatcher
///
/// Routet eingehende SignalMessages an die entsprechenden Handler und
/// gibt die Antwort-SignalMessage zurueck.
pub struct MessageDispatcher<I>
where
    I: IdentityProvider + 'static,
{
    state: Arc<SignalingState<I>>,
}

impl<I> MessageDispatcher<I>
where
    I: IdentityProvider + 'static,
{
    /// Erstellt einen neuen Dispatcher
    pub fn neu(state: Arc<SignalingState<I>>) -> Self {
        Self { state }
    }

    /// Verarbeitet eine eingehende SignalMessage und gibt die Antwort zurueck
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll.
    pub async fn dispatch(
        &self,
        message: SignalMessage,
        ctx: &mut DispatcherContext,
    ) -> Option<SignalMessage> {
        let request_id = message.request_id;

        match message.payload {
            // -------------------------------------------------------------------
            // Session (nur vor der Anmeldung)
            // -------------------------------------------------------------------
            SignalPayload::Hello(req) => {
                if ctx.user_id.is_some() {
                    return Some(SignalMessage::error(
                        request_id,
                        ErrorCode::AlreadyAuthenticated,
                        "Bereits angemeldet",
                    ));
                }

                let antwort = session_handler::handle_hello(req, request_id, &self.state).await;

                // Bei Erfolg: Identitaet in den Verbindungskontext uebernehmen
                if let SignalPayload::HelloResponse(ref resp) = antwort.payload {
                    ctx.user_id = Some(resp.user_id);
                    ctx.anzeige_name = Some(resp.display_name.clone());
                    tracing::debug!(
                        user_id = %resp.user_id,
                        peer = %ctx.peer_addr,
                        "Verbindung angemeldet"
                    );
                }

                Some(antwort)
            }

            // -------------------------------------------------------------------
            // Keepalive
            // -------------------------------------------------------------------
            SignalPayload::Ping(ping) => {
                Some(SignalMessage::pong(request_id, ping.timestamp_ms, jetzt_ms()))
            }

            SignalPayload::Pong(_) => {
                // Pong-Antworten vom Client werden nur geloggt (RTT-Messung)
                tracing::trace!("Pong empfangen (RTT-Messung)");
                None
            }

            // -------------------------------------------------------------------
            // Anmeldung erfordernde Nachrichten
            // -------------------------------------------------------------------
            payload => {
                let user_id = match ctx.user_id {
                    Some(uid) => uid,
                    None => {
                        return Some(SignalMessage::error(
                            request_id,
                            ErrorCode::NotAuthenticated,
                            "Nicht angemeldet – bitte zuerst Hello senden",
                        ));
                    }
                };

                self.dispatch_angemeldet(payload, request_id, user_id).await
            }
        }
    }

    /// Routet Nachrichten die eine Anmeldung erfordern
    async fn dispatch_angemeldet(
        &self,
        payload: SignalPayload,
        request_id: u32,
        user_id: UserId,
    ) -> Option<SignalMessage> {
        match payload {
            // -------------------------------------------------------------------
            // Presence
            // -------------------------------------------------------------------
            SignalPayload::OnlineUsers => {
                Some(presence_handler::handle_online_users(request_id, user_id, &self.state).await)
            }

            // -------------------------------------------------------------------
            // Einzelanruf
            // -------------------------------------------------------------------
            SignalPayload::InitiateCall(req) => Some(
                call_handler::handle_initiate_call(req, request_id, user_id, &self.state).await,
            ),

            SignalPayload::AcceptCall(req) => {
                call_handler::handle_accept_call(req, request_id, user_id, &self.state).await
            }

            SignalPayload::RejectCall(req) => {
                call_handler::handle_reject_call(req, user_id, &self.state).await
            }

            SignalPayload::EndCall(req) => {
                call_handler::handle_end_call(req, user_id, &self.state).await
            }

            // -------------------------------------------------------------------
            // WebRTC-Signalisierung (reine Weiterleitung)
            // -------------------------------------------------------------------
            SignalPayload::Offer(nachricht) => {
                relay_handler::handle_offer(nachricht, user_id, &self.state).await;
                None
            }

            SignalPayload::Answer(nachricht) => {
                relay_handler::handle_answer(nachricht, user_id, &self.state).await;
                None
            }

            SignalPayload::IceCandidate(nachricht) => {
                relay_handler::handle_ice_candidate(nachricht, user_id, &self.state).await;
                None
            }

            // -------------------------------------------------------------------
            // Gruppenanruf
            // -------------------------------------------------------------------
            SignalPayload::StartGroupCall(req) => Some(
                group_handler::handle_start_group_call(req, request_id, user_id, &self.state)
                    .await,
            ),

            SignalPayload::JoinGroupCall(req) => {
                group_handler::handle_join_group_call(req, request_id, user_id, &self.state).await
            }

            SignalPayload::LeaveGroupCall(req) => {
                group_handler::handle_leave_group_call(req, user_id, &self.state).await
            }

            SignalPayload::EndGroupCall(req) => {
                group_handler::handle_end_group_call(req, user_id, &self.state).await
            }

            SignalPayload::InviteToGroupCall(req) => {
                group_handler::handle_invite_to_group_call(req, user_id, &self.state).await
            }

            // -------------------------------------------------------------------
            // LAN-Discovery
            // -------------------------------------------------------------------
            SignalPayload::LanReport(req) => {
                lan_handler::handle_lan_report(req, user_id, &self.state).await;
                None
            }

            SignalPayload::LanScan => {
                Some(lan_handler::handle_lan_scan(request_id, user_id, &self.state).await)
            }

            // -------------------------------------------------------------------
            // Unbekannte / unerwartete Nachrichten
            // -------------------------------------------------------------------
            SignalPayload::HelloResponse(_)
            | SignalPayload::OnlineUsersResponse(_)
            | SignalPayload::UserStatusChange(_)
            | SignalPayload::IncomingCall(_)
            | SignalPayload::CallInitiated(_)
            | SignalPayload::CallError(_)
            | SignalPayload::CallAccepted(_)
            | SignalPayload::CallRejected(_)
            | SignalPayload::CallEnded(_)
            | SignalPayload::GroupCallJoined(_)
            | SignalPayload::GroupCallInvitation(_)
            | SignalPayload::ParticipantJoined(_)
            | SignalPayload::ParticipantLeft(_)
            | SignalPayload::GroupCallEnded(_)
            | SignalPayload::LanUsers(_)
            | SignalPayload::Error(_) => {
                tracing::warn!(
                    request_id,
                    user_id = %user_id,
                    "Unerwartete Server->Client Nachricht vom Client empfangen"
                );
                Some(SignalMessage::error(
                    request_id,
                    ErrorCode::InvalidRequest,
                    "Unerwartete Nachricht",
                ))
            }

            // Hello im angemeldeten Zustand wird oben behandelt; Ping/Pong ebenso
            SignalPayload::Hello(_) => Some(SignalMessage::error(
                request_id,
                ErrorCode::AlreadyAuthenticated,
                "Bereits angemeldet",
            )),
            SignalPayload::Ping(_) | SignalPayload::Pong(_) => None,
        }
    }

    /// Bereinigt alle Ressourcen eines Clients beim Trennen
    ///
    /// Wirkt nur wenn die Verbindungsnummer noch aktuell ist – die
    /// Aufraeumroutine einer verdraengten Verbindung darf den Zustand
    /// des Nachfolgers nicht anfassen. Reihenfolge: Registry-Abmeldung
    /// zuerst (entscheidet ueber Zustaendigkeit), dann Anrufe, Raeume,
    /// LAN-Eintrag, zuletzt der Offline-Broadcast an die Verbliebenen.
    pub async fn client_cleanup(&self, user_id: &UserId, verbindungs_nr: u64) {
        let anzeige_name = self
            .state
            .registry
            .anzeige_name_von(user_id)
            .unwrap_or_default();

        if !self.state.registry.abmelden(user_id, verbindungs_nr) {
            // Verdraengte oder bereits abgemeldete Verbindung
            return;
        }

        // Laufende Einzelanrufe beenden, Gegenseiten informieren
        for call in self.state.anrufe.alle_beenden_fuer(user_id) {
            let gegenseite = if call.anrufer == *user_id {
                call.angerufener
            } else {
                call.anrufer
            };
            self.state.registry.an_user_senden(
                &gegenseite,
                SignalMessage::push(SignalPayload::CallEnded(CallEnded {
                    remote_user_id: *user_id,
                    timestamp_ms: jetzt_ms(),
                })),
            );
        }

        // Gruppenanruf-Raeume verlassen
        for group_id in self.state.gruppen.raeume_von(user_id) {
            if let VerlassenErgebnis::Verlassen { verbleibende, .. } =
                self.state.gruppen.verlassen(&group_id, user_id)
            {
                let event =
                    SignalMessage::push(SignalPayload::ParticipantLeft(ParticipantLeft {
                        group_id: group_id.clone(),
                        user_id: *user_id,
                        timestamp_ms: jetzt_ms(),
                    }));
                for mitglied in verbleibende {
                    self.state.registry.an_user_senden(&mitglied, event.clone());
                }
            }
        }

        // LAN-Eintrag entfernen (kein Liegenbleiben veralteter Adressen)
        self.state.lan.entfernen(user_id);

        // Offline-Broadcast an alle Verbliebenen
        self.state
            .presence
            .status_verbreiten(*user_id, anzeige_name, false);

        tracing::debug!(user_id = %user_id, "Client-Ressourcen bereinigt");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_state::SignalingConfig;
    use palaver_core::identity::OpenIdentityProvider;
    use palaver_protocol::control::{
        AcceptCallRequest, EndCallRequest, HelloRequest, InitiateCallRequest, PingMessage,
    };
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc;

    fn test_state() -> Arc<SignalingState<OpenIdentityProvider>> {
        SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(OpenIdentityProvider::neu()),
        )
    }

    fn test_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    /// Spielt den Verbindungsaufbau durch wie es die ClientConnection tut:
    /// Hello dispatchen, dann Registry-Eintrag anlegen und Online-Status
    /// verbreiten.
    async fn anmelden(
        dispatcher: &MessageDispatcher<OpenIdentityProvider>,
        state: &Arc<SignalingState<OpenIdentityProvider>>,
        name: &str,
    ) -> (DispatcherContext, mpsc::Receiver<SignalMessage>) {
        let mut ctx = DispatcherContext::neu(test_addr());
        let hello = SignalMessage::new(
            1,
            SignalPayload::Hello(HelloRequest {
                user_id: UserId::new(),
                display_name: name.to_string(),
                token: None,
                client_version: "0.1.0".into(),
            }),
        );

        let antwort = dispatcher.dispatch(hello, &mut ctx).await.expect("Antwort");
        assert!(matches!(antwort.payload, SignalPayload::HelloResponse(_)));

        let uid = ctx.user_id.expect("Angemeldet");
        let name = ctx.anzeige_name.clone().expect("Name gesetzt");
        let (nr, rx) = state.registry.registrieren(uid, name.clone());
        ctx.verbindungs_nr = Some(nr);
        state.presence.status_verbreiten(uid, name, true);

        (ctx, rx)
    }

    /// Leert eine Empfangs-Queue
    fn queue_leeren(rx: &mut mpsc::Receiver<SignalMessage>) {
        while rx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn nachricht_vor_hello_wird_abgewiesen() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut ctx = DispatcherContext::neu(test_addr());

        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(1, SignalPayload::OnlineUsers),
                &mut ctx,
            )
            .await
            .expect("Fehler erwartet");
        match antwort.payload {
            SignalPayload::Error(e) => assert_eq!(e.code, ErrorCode::NotAuthenticated),
            _ => panic!("Erwartet Error"),
        }
    }

    #[tokio::test]
    async fn doppeltes_hello_wird_abgewiesen() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let (mut ctx, _rx) = anmelden(&dispatcher, &state, "a").await;

        let zweites = SignalMessage::new(
            2,
            SignalPayload::Hello(HelloRequest {
                user_id: UserId::new(),
                display_name: "b".into(),
                token: None,
                client_version: "0.1.0".into(),
            }),
        );
        let antwort = dispatcher.dispatch(zweites, &mut ctx).await.unwrap();
        match antwort.payload {
            SignalPayload::Error(e) => assert_eq!(e.code, ErrorCode::AlreadyAuthenticated),
            _ => panic!("Erwartet Error"),
        }
    }

    #[tokio::test]
    async fn ping_ergibt_pong() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));
        let mut ctx = DispatcherContext::neu(test_addr());

        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(
                    9,
                    SignalPayload::Ping(PingMessage { timestamp_ms: 111 }),
                ),
                &mut ctx,
            )
            .await
            .unwrap();
        match antwort.payload {
            SignalPayload::Pong(p) => assert_eq!(p.echo_timestamp_ms, 111),
            _ => panic!("Erwartet Pong"),
        }
    }

    #[tokio::test]
    async fn szenario_anruf_annehmen_beenden() {
        // A ruft B an -> A: CallInitiated, B: IncomingCall;
        // B nimmt an -> A: CallAccepted; A beendet -> B: CallEnded;
        // weiteres EndCall von A ist No-op.
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let (mut ctx_a, mut rx_a) = anmelden(&dispatcher, &state, "a").await;
        let (mut ctx_b, mut rx_b) = anmelden(&dispatcher, &state, "b").await;
        let uid_a = ctx_a.user_id.unwrap();
        let uid_b = ctx_b.user_id.unwrap();
        queue_leeren(&mut rx_a);
        queue_leeren(&mut rx_b);

        // A ruft B an (video=false)
        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(
                    10,
                    SignalPayload::InitiateCall(InitiateCallRequest {
                        receiver_id: uid_b,
                        is_video: false,
                    }),
                ),
                &mut ctx_a,
            )
            .await
            .expect("CallInitiated erwartet");
        assert!(matches!(antwort.payload, SignalPayload::CallInitiated(_)));

        let eingehend = rx_b.try_recv().expect("IncomingCall erwartet");
        match eingehend.payload {
            SignalPayload::IncomingCall(anruf) => {
                assert_eq!(anruf.caller_id, uid_a);
                assert!(!anruf.is_video);
            }
            _ => panic!("Erwartet IncomingCall"),
        }

        // B nimmt an
        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(
                    11,
                    SignalPayload::AcceptCall(AcceptCallRequest { caller_id: uid_a }),
                ),
                &mut ctx_b,
            )
            .await;
        assert!(antwort.is_none());
        assert!(matches!(
            rx_a.try_recv().unwrap().payload,
            SignalPayload::CallAccepted(_)
        ));

        // A beendet
        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(
                    12,
                    SignalPayload::EndCall(EndCallRequest {
                        remote_user_id: uid_b,
                    }),
                ),
                &mut ctx_a,
            )
            .await;
        assert!(antwort.is_none());
        assert!(matches!(
            rx_b.try_recv().unwrap().payload,
            SignalPayload::CallEnded(_)
        ));

        // Weiteres EndCall: No-op, keine weitere Benachrichtigung
        let antwort = dispatcher
            .dispatch(
                SignalMessage::new(
                    13,
                    SignalPayload::EndCall(EndCallRequest {
                        remote_user_id: uid_b,
                    }),
                ),
                &mut ctx_a,
            )
            .await;
        assert!(antwort.is_none());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn cleanup_beendet_anrufe_und_verbreitet_offline() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let (mut ctx_a, mut rx_a) = anmelden(&dispatcher, &state, "a").await;
        let (mut ctx_b, mut rx_b) = anmelden(&dispatcher, &state, "b").await;
        let uid_a = ctx_a.user_id.unwrap();
        let uid_b = ctx_b.user_id.unwrap();

        // Laufender Anruf zwischen A und B
        let _ = dispatcher
            .dispatch(
                SignalMessage::new(
                    1,
                    SignalPayload::InitiateCall(InitiateCallRequest {
                        receiver_id: uid_b,
                        is_video: false,
                    }),
                ),
                &mut ctx_a,
            )
            .await;
        let _ = dispatcher
            .dispatch(
                SignalMessage::new(
                    2,
                    SignalPayload::AcceptCall(AcceptCallRequest { caller_id: uid_a }),
                ),
                &mut ctx_b,
            )
            .await;
        queue_leeren(&mut rx_a);
        queue_leeren(&mut rx_b);

        // A trennt die Verbindung
        dispatcher
            .client_cleanup(&uid_a, ctx_a.verbindungs_nr.unwrap())
            .await;

        assert!(!state.registry.ist_online(&uid_a));
        assert_eq!(state.anrufe.anzahl(), 0);

        // B sieht CallEnded und den Offline-Status
        let mut call_ended = false;
        let mut offline = false;
        while let Ok(msg) = rx_b.try_recv() {
            match msg.payload {
                SignalPayload::CallEnded(e) => {
                    assert_eq!(e.remote_user_id, uid_a);
                    call_ended = true;
                }
                SignalPayload::UserStatusChange(s) if s.user_id == uid_a => {
                    assert!(!s.is_online);
                    offline = true;
                }
                _ => {}
            }
        }
        assert!(call_ended, "CallEnded erwartet");
        assert!(offline, "Offline-Broadcast erwartet");
    }

    #[tokio::test]
    async fn cleanup_einer_verdraengten_verbindung_ist_noop() {
        let state = test_state();
        let dispatcher = MessageDispatcher::neu(Arc::clone(&state));

        let (ctx, _rx_alt) = anmelden(&dispatcher, &state, "a").await;
        let uid = ctx.user_id.unwrap();
        let alte_nr = ctx.verbindungs_nr.unwrap();

        // Reconnect unter derselben Identitaet
        let (_neue_nr, _rx_neu) = state.registry.registrieren(uid, "a");

        dispatcher.client_cleanup(&uid, alte_nr).await;
        assert!(
            state.registry.ist_online(&uid),
            "Nachfolger-Verbindung bleibt bestehen"
        );
    }
}
