//! Signalisierungsprotokoll (TCP)
//!
//! Definiert alle Steuerungsnachrichten die ueber die TCP-Verbindung
//! zwischen Client und Signaling-Server ausgetauscht werden.
//!
//! ## Design
//! - Request/Response Pattern: jede Nachricht hat eine `request_id: u32`
//! - JSON-Serialisierung via serde (TCP, nicht zeitkritisch)
//! - Tagged Enums fuer typsichere Nachrichtentypen
//! - SDP- und ICE-Nutzlasten sind opake `serde_json::Value`s – der
//!   Server leitet sie unveraendert weiter und inspiziert sie nie
//!
//! Die handelnde Identitaet (Anrufer, Einladender, ...) stammt immer aus
//! dem authentifizierten Verbindungskontext, nie aus redundanten
//! Payload-Feldern.

use palaver_core::types::{GroupId, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Standardisierte Fehler-Codes fuer Error-Responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Allgemein
    InternalError,
    InvalidRequest,
    NotFound,
    // Session
    NotAuthenticated,
    AlreadyAuthenticated,
    IdentityRejected,
    // Erreichbarkeit
    TargetOffline,
    ServerFull,
}

// ---------------------------------------------------------------------------
// Session-Nachrichten
// ---------------------------------------------------------------------------

/// Erste Nachricht jeder Verbindung: Identitaet anmelden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    /// Stabile Benutzer-ID (vom Identity-Provider des Backends vergeben)
    pub user_id: UserId,
    /// Anzeigename
    pub display_name: String,
    /// Session-Token des umliegenden Backends (optional, je nach Provider)
    pub token: Option<String>,
    /// Client-Version fuer Kompatibilitaetspruefung
    pub client_version: String,
}

/// Eintrag in der Online-Liste
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUser {
    pub user_id: UserId,
    pub display_name: String,
}

/// Bestaetigung der Anmeldung inkl. Presence-Sync
///
/// `online` enthaelt alle zum Zeitpunkt der Anmeldung verbundenen
/// anderen Benutzer, damit der Client seine Kontaktliste initialisieren
/// kann ohne eine zweite Anfrage zu stellen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloResponse {
    pub user_id: UserId,
    /// Vom Identity-Provider bestaetigter (kanonischer) Anzeigename
    pub display_name: String,
    pub server_name: String,
    pub online: Vec<OnlineUser>,
}

// ---------------------------------------------------------------------------
// Presence-Nachrichten
// ---------------------------------------------------------------------------

/// Status-Aenderung eines Benutzers (Server -> alle Clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStatusChange {
    pub user_id: UserId,
    pub display_name: String,
    pub is_online: bool,
}

/// Antwort auf eine Online-Listen-Anfrage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    pub users: Vec<OnlineUser>,
}

// ---------------------------------------------------------------------------
// Einzelanruf-Nachrichten
// ---------------------------------------------------------------------------

/// Anruf starten (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateCallRequest {
    pub receiver_id: UserId,
    pub is_video: bool,
}

/// Eingehender Anruf (Server -> Angerufener)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingCall {
    pub caller_id: UserId,
    pub caller_name: String,
    pub is_video: bool,
    pub timestamp_ms: u64,
}

/// Bestaetigung an den Anrufer: es klingelt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallInitiated {
    pub receiver_id: UserId,
    pub timestamp_ms: u64,
}

/// Anruf-bezogener Fehler, nur an die ausloesende Verbindung
///
/// Eigener Nachrichtentyp statt genericher Error-Response, damit die
/// Anruf-UI des Clients ihn direkt zuordnen kann.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallErrorMessage {
    pub message: String,
}

/// Anruf annehmen (Angerufener -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptCallRequest {
    pub caller_id: UserId,
}

/// Annahme-Benachrichtigung (Server -> Anrufer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAccepted {
    pub receiver_id: UserId,
    pub timestamp_ms: u64,
}

/// Anruf ablehnen (Angerufener -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectCallRequest {
    pub caller_id: UserId,
    pub reason: Option<String>,
}

/// Ablehnungs-Benachrichtigung (Server -> Anrufer)
///
/// Wird auch beim Klingel-Timeout verwendet – aus Anrufersicht ist
/// "nicht angenommen" dieselbe terminale Nachricht.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRejected {
    pub receiver_id: UserId,
    pub reason: String,
    pub timestamp_ms: u64,
}

/// Anruf beenden (Client -> Server, von beiden Seiten erlaubt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndCallRequest {
    pub remote_user_id: UserId,
}

/// Beendet-Benachrichtigung (Server -> Gegenseite)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEnded {
    pub remote_user_id: UserId,
    pub timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// WebRTC-Signalisierung (Offer/Answer/ICE)
// ---------------------------------------------------------------------------

/// SDP-Offer (bidirektional; `from` wird vom Server gestempelt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferMessage {
    pub target: UserId,
    /// Absender – vom Relay gesetzt, Client-Angaben werden ueberschrieben
    pub from: Option<UserId>,
    /// Opake SDP-Nutzlast
    pub sdp: serde_json::Value,
}

/// SDP-Answer (bidirektional; `from` wird vom Server gestempelt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMessage {
    pub target: UserId,
    pub from: Option<UserId>,
    pub sdp: serde_json::Value,
}

/// ICE-Kandidat (bidirektional; `from` wird vom Server gestempelt)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceCandidateMessage {
    pub target: UserId,
    pub from: Option<UserId>,
    /// Opake Kandidaten-Nutzlast
    pub candidate: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Gruppenanruf-Nachrichten
// ---------------------------------------------------------------------------

/// Gruppenanruf starten (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGroupCallRequest {
    pub group_id: GroupId,
}

/// Gruppenanruf beitreten (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGroupCallRequest {
    pub group_id: GroupId,
}

/// Teilnehmer-Info fuer Raum-Antworten
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupParticipantInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub is_creator: bool,
}

/// Antwort auf Start/Join: aktueller Raumzustand
///
/// Der Beitretende braucht die Teilnehmerliste um seine Seite des
/// Full-Mesh aufzubauen (jedes Teilnehmerpaar haelt eine eigene
/// Peer-Verbindung).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCallJoined {
    pub group_id: GroupId,
    pub participants: Vec<GroupParticipantInfo>,
}

/// Gruppenanruf verlassen (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveGroupCallRequest {
    pub group_id: GroupId,
}

/// Gruppenanruf beenden (nur Ersteller; Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndGroupCallRequest {
    pub group_id: GroupId,
}

/// Benutzer in Gruppenanruf einladen (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteToGroupCallRequest {
    pub group_id: GroupId,
    /// Gruppenname fuer die Anzeige beim Eingeladenen
    pub group_name: Option<String>,
    pub target_user_id: UserId,
}

/// Einladung (Server -> Eingeladener)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCallInvitation {
    pub group_id: GroupId,
    pub group_name: Option<String>,
    pub caller_id: UserId,
    pub caller_name: String,
    pub timestamp_ms: u64,
}

/// Teilnehmer beigetreten (Server -> bestehende Teilnehmer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoined {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub display_name: String,
    pub timestamp_ms: u64,
}

/// Teilnehmer gegangen (Server -> verbleibende Teilnehmer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeft {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub timestamp_ms: u64,
}

/// Gruppenanruf beendet (Server -> alle Teilnehmer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCallEnded {
    pub group_id: GroupId,
    pub ended_by: UserId,
    pub timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// LAN-Discovery-Nachrichten
// ---------------------------------------------------------------------------

/// Lokale Adressen melden (Client -> Server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanReportRequest {
    /// Lokale IP-Adressen, erste ist anzeige-bevorzugt
    pub addresses: Vec<String>,
}

/// Gefundener LAN-Peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanPeer {
    pub id: UserId,
    pub name: String,
    /// Erste passende Adresse des Peers (Anzeige)
    pub ip: String,
}

/// Antwort auf einen LAN-Scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanUsersResponse {
    pub users: Vec<LanPeer>,
}

// ---------------------------------------------------------------------------
// Keepalive
// ---------------------------------------------------------------------------

/// Ping (Client -> Server oder Server -> Client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingMessage {
    /// Unix-Timestamp in Millisekunden fuer RTT-Messung
    pub timestamp_ms: u64,
}

/// Pong-Antwort (spiegelt Timestamp zurueck)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongMessage {
    /// Originaler Timestamp aus dem Ping
    pub echo_timestamp_ms: u64,
    /// Server-eigener Timestamp
    pub server_timestamp_ms: u64,
}

// ---------------------------------------------------------------------------
// Haupt-Enum: SignalPayload
// ---------------------------------------------------------------------------

/// Alle moeglichen Signalisierungsnachrichten (typsicher via Tagged Enum)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalPayload {
    // Session
    Hello(HelloRequest),
    HelloResponse(HelloResponse),

    // Presence
    OnlineUsers,
    OnlineUsersResponse(OnlineUsersResponse),
    UserStatusChange(UserStatusChange),

    // Einzelanruf
    InitiateCall(InitiateCallRequest),
    IncomingCall(IncomingCall),
    CallInitiated(CallInitiated),
    CallError(CallErrorMessage),
    AcceptCall(AcceptCallRequest),
    CallAccepted(CallAccepted),
    RejectCall(RejectCallRequest),
    CallRejected(CallRejected),
    EndCall(EndCallRequest),
    CallEnded(CallEnded),

    // WebRTC-Signalisierung
    Offer(OfferMessage),
    Answer(AnswerMessage),
    IceCandidate(IceCandidateMessage),

    // Gruppenanruf
    StartGroupCall(StartGroupCallRequest),
    JoinGroupCall(JoinGroupCallRequest),
    GroupCallJoined(GroupCallJoined),
    LeaveGroupCall(LeaveGroupCallRequest),
    EndGroupCall(EndGroupCallRequest),
    InviteToGroupCall(InviteToGroupCallRequest),
    GroupCallInvitation(GroupCallInvitation),
    ParticipantJoined(ParticipantJoined),
    ParticipantLeft(ParticipantLeft),
    GroupCallEnded(GroupCallEnded),

    // LAN-Discovery
    LanReport(LanReportRequest),
    LanScan,
    LanUsers(LanUsersResponse),

    // Keepalive
    Ping(PingMessage),
    Pong(PongMessage),

    // Error
    Error(ErrorResponse),
}

/// Standardisierte Fehler-Antwort
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    /// Optionale maschinenlesbare Details
    pub details: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Signal-Frame (Umschlag fuer alle Nachrichten)
// ---------------------------------------------------------------------------

/// Signalisierungsnachricht mit Request/Response-Zuordnung
///
/// Jede Nachricht traegt eine `request_id` die der Client vergibt.
/// Der Server kopiert die ID in die Antwort damit der Client Request
/// und Response zuordnen kann. Server-initiierte Pushes (eingehender
/// Anruf, Presence-Aenderung, ...) verwenden `request_id = 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Eindeutige Nachrichten-ID fuer Request/Response-Zuordnung
    pub request_id: u32,
    /// Inhalt der Nachricht
    pub payload: SignalPayload,
}

impl SignalMessage {
    /// Erstellt eine neue Signalisierungsnachricht
    pub fn new(request_id: u32, payload: SignalPayload) -> Self {
        Self {
            request_id,
            payload,
        }
    }

    /// Erstellt einen Server-initiierten Push (request_id = 0)
    pub fn push(payload: SignalPayload) -> Self {
        Self::new(0, payload)
    }

    /// Erstellt eine Ping-Nachricht
    pub fn ping(request_id: u32, timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            SignalPayload::Ping(PingMessage { timestamp_ms }),
        )
    }

    /// Erstellt eine Pong-Antwort
    pub fn pong(request_id: u32, echo_timestamp_ms: u64, server_timestamp_ms: u64) -> Self {
        Self::new(
            request_id,
            SignalPayload::Pong(PongMessage {
                echo_timestamp_ms,
                server_timestamp_ms,
            }),
        )
    }

    /// Erstellt eine Fehler-Antwort
    pub fn error(request_id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            SignalPayload::Error(ErrorResponse {
                code,
                message: message.into(),
                details: None,
            }),
        )
    }

    /// Erstellt einen anruf-bezogenen Fehler fuer die ausloesende Verbindung
    pub fn call_error(request_id: u32, message: impl Into<String>) -> Self {
        Self::new(
            request_id,
            SignalPayload::CallError(CallErrorMessage {
                message: message.into(),
            }),
        )
    }
}

/// Aktueller Unix-Timestamp in Millisekunden
///
/// Zentraler Helfer fuer alle `timestamp_ms`-Felder ausgehender
/// Nachrichten.
pub fn jetzt_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
