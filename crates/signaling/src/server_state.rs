//! Gemeinsamer Server-Zustand fuer den Signalisierungskern
//!
//! Haelt alle Zustands-Manager als Arc-Referenzen, die sicher zwischen
//! tokio-Tasks geteilt werden koennen. Der Zustand wird einmal pro
//! Prozess konstruiert und in die Handler injiziert – keine ambienten
//! Globals, jeder Test baut sich eine frische Instanz.

use palaver_core::identity::IdentityProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::calls::CallState;
use crate::group::GroupCallState;
use crate::lan::LanDiscovery;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::relay::SignalRelay;

/// Konfiguration fuer den Signalisierungskern
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Anzeigename des Servers
    pub server_name: String,
    /// Maximale gleichzeitige Clients
    pub max_clients: u32,
    /// Klingel-Timeout fuer Einzelanrufe in Sekunden
    pub klingel_timeout_sek: u64,
    /// Keepalive-Intervall in Sekunden
    pub keepalive_sek: u64,
    /// Timeout fuer inaktive Verbindungen in Sekunden
    pub verbindungs_timeout_sek: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            server_name: "Palaver Server".to_string(),
            max_clients: 512,
            klingel_timeout_sek: 30,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
///
/// Jeder Zustands-Manager wird ausschliesslich von seinem Koordinator
/// beschrieben; kein Manager haelt Locks ueber einen ausgehenden Push
/// hinweg.
pub struct SignalingState<I>
where
    I: IdentityProvider + 'static,
{
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Externer Identity-Provider (prueft die Connect-Identitaet)
    pub identity: Arc<I>,
    /// Registry aller aktiven Verbindungen
    pub registry: ConnectionRegistry,
    /// Presence-Broadcaster (Statuswechsel an alle)
    pub presence: PresenceBroadcaster,
    /// Zustandsmaschine der Einzelanrufe
    pub anrufe: CallState,
    /// Gruppenanruf-Raeume
    pub gruppen: GroupCallState,
    /// Offer/Answer/ICE-Weiterleitung
    pub relay: SignalRelay,
    /// LAN-Discovery (gemeldete Adressen, Subnetz-Scans)
    pub lan: LanDiscovery,
    /// Startzeitpunkt des Servers (fuer Uptime-Berechnung)
    pub start_zeit: Instant,
}

impl<I> SignalingState<I>
where
    I: IdentityProvider + 'static,
{
    /// Erstellt einen neuen SignalingState
    pub fn neu(config: SignalingConfig, identity: Arc<I>) -> Arc<Self> {
        let registry = ConnectionRegistry::neu();
        Arc::new(Self {
            config: Arc::new(config),
            identity,
            presence: PresenceBroadcaster::neu(registry.clone()),
            relay: SignalRelay::neu(registry.clone()),
            registry,
            anrufe: CallState::neu(),
            gruppen: GroupCallState::neu(),
            lan: LanDiscovery::neu(),
            start_zeit: Instant::now(),
        })
    }

    /// Gibt das Klingel-Timeout als Duration zurueck
    pub fn klingel_timeout(&self) -> Duration {
        Duration::from_secs(self.config.klingel_timeout_sek)
    }

    /// Gibt die Uptime in Sekunden zurueck
    pub fn uptime_sek(&self) -> u64 {
        self.start_zeit.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::identity::OpenIdentityProvider;

    #[test]
    fn standard_config() {
        let cfg = SignalingConfig::default();
        assert_eq!(cfg.klingel_timeout_sek, 30);
        assert_eq!(cfg.max_clients, 512);
    }

    #[tokio::test]
    async fn state_konstruktion() {
        let state = SignalingState::neu(
            SignalingConfig::default(),
            Arc::new(OpenIdentityProvider::neu()),
        );
        assert_eq!(state.registry.anzahl(), 0);
        assert_eq!(state.anrufe.anzahl(), 0);
        assert_eq!(state.gruppen.anzahl(), 0);
        assert_eq!(state.klingel_timeout(), Duration::from_secs(30));
    }
}
