//! Identity-Provider Trait-Definition
//!
//! Der Signaling-Kern authentifiziert selbst keine Benutzer. Die
//! Identitaetspruefung uebernimmt ein externer Kollaborateur (das
//! Chat-Backend mit seiner Session-Verwaltung), der hier nur als
//! Schnittstelle spezifiziert ist. Der Kern erhaelt daraus eine stabile
//! `UserId` plus Anzeigenamen und arbeitet danach rein in-memory.

use crate::error::{PalaverError, Result};
use crate::types::UserId;

/// Identitaet eines erfolgreich verifizierten Benutzers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identitaet {
    /// Stabile Benutzer-ID (vergeben vom Identity-Provider)
    pub user_id: UserId,
    /// Anzeigename zum Zeitpunkt der Verbindung
    pub anzeige_name: String,
}

/// Schnittstelle zum externen Identity-Provider
///
/// Wird beim Verbindungsaufbau genau einmal aufgerufen, bevor die
/// Kern-Logik betreten wird. Schlaegt die Pruefung fehl, kommt die
/// Verbindung nie in den authentifizierten Zustand.
#[allow(async_fn_in_trait)]
pub trait IdentityProvider: Send + Sync {
    /// Prueft die vom Client behauptete Identitaet
    ///
    /// `token` ist das Session-Token des umliegenden Backends (optional,
    /// je nach Provider-Implementierung).
    async fn verifizieren(
        &self,
        user_id: UserId,
        anzeige_name: &str,
        token: Option<&str>,
    ) -> Result<Identitaet>;
}

/// Entwicklungs-Provider: akzeptiert die Client-Angaben unveraendert
///
/// Vertraut der beim Connect mitgelieferten Identitaet – das Verhalten
/// der Transportschicht des urspruenglichen Systems. Fuer den Betrieb
/// hinter einem echten Backend wird stattdessen ein Provider verwendet,
/// der das Token gegen die Session-Verwaltung prueft.
#[derive(Debug, Clone, Default)]
pub struct OpenIdentityProvider;

impl OpenIdentityProvider {
    /// Erstellt einen neuen OpenIdentityProvider
    pub fn neu() -> Self {
        Self
    }
}

impl IdentityProvider for OpenIdentityProvider {
    async fn verifizieren(
        &self,
        user_id: UserId,
        anzeige_name: &str,
        _token: Option<&str>,
    ) -> Result<Identitaet> {
        let name = anzeige_name.trim();
        if name.is_empty() {
            return Err(PalaverError::Identitaet(
                "Anzeigename darf nicht leer sein".into(),
            ));
        }

        Ok(Identitaet {
            user_id,
            anzeige_name: name.to_string(),
        })
    }
}
