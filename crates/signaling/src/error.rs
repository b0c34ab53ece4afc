//! Fehlertypen fuer den Signalisierungskern

use palaver_core::PalaverError;
use thiserror::Error;

/// Fehlertyp fuer den Signalisierungskern
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Identitaetspruefung fehlgeschlagen
    #[error("Identitaet abgelehnt: {0}")]
    IdentitaetAbgelehnt(String),

    /// Verbindung wurde getrennt
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,

    /// Protokollfehler (ungueltiges Frame, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Zielbenutzer ist nicht verbunden
    #[error("Benutzer offline: {0}")]
    ZielOffline(String),

    /// Kollidierender Anruf zwischen demselben Benutzerpaar
    #[error("Anruf bereits aktiv")]
    AnrufKonflikt,

    /// Server ist voll
    #[error("Server ist voll")]
    ServerVoll,

    /// Senden an Client fehlgeschlagen (Queue geschlossen)
    #[error("Senden fehlgeschlagen")]
    SendFehler,

    /// Timeout (Keepalive, Klingeln)
    #[error("Timeout")]
    Timeout,

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Core(#[from] PalaverError),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Protokollfehler
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }
}

/// Result-Typ fuer den Signalisierungskern
pub type SignalingResult<T> = Result<T, SignalingError>;
