//! Gemeinsame Identifikationstypen fuer Palaver
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.
//!
//! `UserId` und `CallId` sind UUIDs. `GroupId` ist bewusst ein String:
//! Gruppen gehoeren dem umliegenden Chat-Backend, das seine eigenen
//! (opaken) Kennungen vergibt – der Signaling-Kern uebernimmt sie nur.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Benutzer-ID
///
/// Wird vom Identity-Provider beim Verbindungsaufbau geliefert und ist
/// ueber Verbindungen hinweg stabil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Eindeutige Anruf-ID (Einzelanruf)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    /// Erstellt eine neue zufaellige CallId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

/// Gruppen-Kennung des umliegenden Chat-Backends
///
/// Opaker String – der Kern interpretiert ihn nicht, er dient nur als
/// Schluessel fuer Gruppenanruf-Raeume (ein aktiver Raum pro Gruppe).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl GroupId {
    /// Erstellt eine GroupId aus einer beliebigen String-Kennung
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Gibt die innere Kennung zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_eindeutig() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(a, b, "Zwei neue UserIds muessen verschieden sein");
    }

    #[test]
    fn call_id_eindeutig() {
        let a = CallId::new();
        let b = CallId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn group_id_display() {
        let id = GroupId::new("g1");
        assert_eq!(id.to_string(), "group:g1");
        assert_eq!(id.as_str(), "g1");
    }

    #[test]
    fn user_ids_sind_ordenbar() {
        // Fuer den Paar-Schluessel im Call-State muss UserId eine totale
        // Ordnung haben
        let a = UserId::new();
        let b = UserId::new();
        assert!(a < b || b < a);
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let uid = UserId::new();
        let json = serde_json::to_string(&uid).unwrap();
        let uid2: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(uid, uid2);

        let gid = GroupId::new("gruppe-42");
        let json = serde_json::to_string(&gid).unwrap();
        let gid2: GroupId = serde_json::from_str(&json).unwrap();
        assert_eq!(gid, gid2);
    }
}
