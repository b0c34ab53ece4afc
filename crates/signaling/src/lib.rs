//! palaver-signaling – Presence- und Anruf-Signalisierungskern
//!
//! Dieser Crate implementiert den Echtzeit-Kern von Palaver: Wer ist
//! online, Vermittlung von Einzel- und Gruppenanrufen, Weiterleitung
//! der WebRTC-Signalisierung (Offer/Answer/ICE) und best-effort
//! LAN-Peer-Discovery. Medien fliessen nie durch diesen Kern – nach
//! abgeschlossener Signalisierung laufen Audio/Video direkt zwischen
//! den Peers.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  State Machine: Verbunden -> Angemeldet
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     +-- SessionHandler   (Hello, Presence-Sync)
//!     +-- PresenceHandler  (Online-Liste)
//!     +-- CallHandler      (Initiate, Accept, Reject, End, Klingel-Timeout)
//!     +-- GroupHandler     (Start, Join, Leave, End, Invite)
//!     +-- RelayHandler     (Offer, Answer, ICE-Candidate)
//!     +-- LanHandler       (Adress-Meldung, Subnetz-Scan)
//!
//! ConnectionRegistry  – Wer ist online, mit welcher Send-Queue
//! PresenceBroadcaster – Statuswechsel an alle Clients verteilen
//! CallState           – Zustandsmaschine der Einzelanrufe
//! GroupCallState      – Gruppenanruf-Raeume und Einladungen
//! SignalRelay         – zustandslose Offer/Answer/ICE-Weiterleitung
//! LanDiscovery        – gemeldete LAN-Adressen, /24-Abgleich
//! ```

pub mod calls;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod group;
pub mod handlers;
pub mod lan;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod server_state;
pub mod tcp;

// Bequeme Re-Exporte
pub use calls::CallState;
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use error::{SignalingError, SignalingResult};
pub use group::GroupCallState;
pub use lan::LanDiscovery;
pub use presence::PresenceBroadcaster;
pub use registry::ConnectionRegistry;
pub use relay::SignalRelay;
pub use server_state::{SignalingConfig, SignalingState};
pub use tcp::SignalingServer;
