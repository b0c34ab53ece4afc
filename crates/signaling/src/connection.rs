//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task.
//!
//! ## State Machine
//! ```text
//! Verbunden --Hello--> Angemeldet --Disconnect--> Cleanup
//! ```
//!
//! Nach erfolgreichem Hello wird die Verbindung in der Registry
//! eingetragen (Supersede: eine neue Verbindung derselben Identitaet
//! verdraengt die alte) und der Online-Status verbreitet. Die
//! Empfangs-Queue aus der Registry wird in den TCP-Strom gespiegelt.
//!
//! ## Keepalive
//! - Server sendet alle `keepalive_sek` einen Ping
//! - Client muss innerhalb von `verbindungs_timeout_sek` irgendetwas senden
//! - Bei Timeout wird die Verbindung getrennt

use futures_util::{SinkExt, StreamExt};
use palaver_core::identity::IdentityProvider;
use palaver_protocol::control::{jetzt_ms, ErrorCode, SignalMessage};
use palaver_protocol::wire::FrameCodec;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use crate::dispatcher::{DispatcherContext, MessageDispatcher};
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne TCP-Verbindung
///
/// Liest Frames via `FrameCodec`, dispatcht an `MessageDispatcher` und
/// sendet Antworten zurueck. Laeuft in einem eigenen tokio-Task.
pub struct ClientConnection<I>
where
    I: IdentityProvider + 'static,
{
    state: Arc<SignalingState<I>>,
    peer_addr: SocketAddr,
}

impl<I> ClientConnection<I>
where
    I: IdentityProvider + 'static,
{
    /// Erstellt eine neue ClientConnection
    pub fn neu(state: Arc<SignalingState<I>>, peer_addr: SocketAddr) -> Self {
        Self { state, peer_addr }
    }

    /// Startet die Verbindungs-Verarbeitungsschleife
    ///
    /// Diese Methode laeuft bis die Verbindung getrennt wird oder ein
    /// Shutdown-Signal eingeht.
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let peer_addr = self.peer_addr;
        let keepalive_intervall = Duration::from_secs(self.state.config.keepalive_sek);
        let timeout_dauer = Duration::from_secs(self.state.config.verbindungs_timeout_sek);

        tracing::info!(peer = %peer_addr, "Neue Verbindung");

        let mut framed = Framed::new(stream, FrameCodec::new());
        let mut ctx = DispatcherContext::neu(peer_addr);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&self.state));

        // Empfangs-Queue aus der Registry; erst nach dem Hello vorhanden
        let mut empfangs_queue: Option<mpsc::Receiver<SignalMessage>> = None;

        // Zeitpunkt des letzten empfangenen Frames
        let mut letzter_empfang = Instant::now();
        // Zeitpunkt des naechsten Ping
        let mut naechster_ping = Instant::now() + keepalive_intervall;
        let mut ping_request_id: u32 = 0;

        loop {
            let jetzt = Instant::now();

            // Timeout-Pruefung
            if jetzt.duration_since(letzter_empfang) > timeout_dauer {
                tracing::warn!(peer = %peer_addr, "Verbindungs-Timeout");
                break;
            }

            // Naechsten Ping-Zeitpunkt berechnen
            let ping_verzoegerung = if jetzt < naechster_ping {
                naechster_ping.duration_since(jetzt)
            } else {
                Duration::from_millis(1)
            };

            tokio::select! {
                // Eingehende Nachricht vom Client
                frame = framed.next() => {
                    match frame {
                        Some(Ok(nachricht)) => {
                            letzter_empfang = Instant::now();
                            tracing::trace!(
                                peer = %peer_addr,
                                request_id = nachricht.request_id,
                                "Nachricht empfangen"
                            );

                            if let Some(antwort) = dispatcher.dispatch(nachricht, &mut ctx).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(
                                        peer = %peer_addr,
                                        fehler = %e,
                                        "Senden fehlgeschlagen"
                                    );
                                    break;
                                }
                            }

                            // Nach erfolgreichem Hello: Registry-Eintrag anlegen
                            // und Online-Status verbreiten (genau einmal)
                            if ctx.verbindungs_nr.is_none() {
                                if let (Some(uid), Some(name)) =
                                    (ctx.user_id, ctx.anzeige_name.clone())
                                {
                                    let (nr, rx) =
                                        self.state.registry.registrieren(uid, name.clone());
                                    ctx.verbindungs_nr = Some(nr);
                                    empfangs_queue = Some(rx);
                                    self.state.presence.status_verbreiten(uid, name, true);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Frame-Lesefehler"
                            );
                            break;
                        }
                        None => {
                            tracing::info!(peer = %peer_addr, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                // Ausgehende Nachricht aus der Registry-Queue
                ausgehend = empfangs_warten(&mut empfangs_queue) => {
                    match ausgehend {
                        Some(nachricht) => {
                            if let Err(e) = framed.send(nachricht).await {
                                tracing::warn!(
                                    peer = %peer_addr,
                                    fehler = %e,
                                    "Push-Senden fehlgeschlagen"
                                );
                                break;
                            }
                        }
                        None => {
                            // Registry-Eintrag wurde durch eine neue Verbindung
                            // derselben Identitaet ersetzt
                            tracing::info!(
                                peer = %peer_addr,
                                "Verbindung verdraengt – wird getrennt"
                            );
                            break;
                        }
                    }
                }

                // Keepalive-Ping
                _ = tokio::time::sleep(ping_verzoegerung) => {
                    if jetzt >= naechster_ping {
                        ping_request_id = ping_request_id.wrapping_add(1);
                        let ping = SignalMessage::ping(ping_request_id, jetzt_ms());

                        if let Err(e) = framed.send(ping).await {
                            tracing::warn!(
                                peer = %peer_addr,
                                fehler = %e,
                                "Ping-Senden fehlgeschlagen"
                            );
                            break;
                        }
                        naechster_ping = Instant::now() + keepalive_intervall;
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer_addr, "Shutdown-Signal – Verbindung wird getrennt");
                        // Abschiedsnachricht senden
                        let abschied = SignalMessage::error(
                            0,
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break;
                    }
                }
            }
        }

        // Cleanup beim Verbindungsende (No-op wenn nie angemeldet oder
        // bereits verdraengt)
        if let (Some(uid), Some(nr)) = (ctx.user_id, ctx.verbindungs_nr) {
            dispatcher.client_cleanup(&uid, nr).await;
        }

        tracing::info!(peer = %peer_addr, "Verbindungs-Task beendet");
    }
}

/// Wartet auf die naechste ausgehende Nachricht
///
/// Vor dem Hello existiert noch keine Queue – dann wartet dieser Future
/// endlos und der select-Zweig bleibt inaktiv.
async fn empfangs_warten(
    queue: &mut Option<mpsc::Receiver<SignalMessage>>,
) -> Option<SignalMessage> {
    match queue.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
