//! palaver-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen
//! Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use palaver_core::identity::OpenIdentityProvider;
use palaver_signaling::{SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Identity-Provider aufsetzen
    /// 2. Signalisierungszustand konstruieren
    /// 3. TCP-Listener starten
    /// 4. Auf Ctrl-C / SIGTERM warten, dann Shutdown-Signal verteilen
    pub async fn starten(self) -> Result<()> {
        let bind_addr: SocketAddr = self.config.tcp_bind_adresse().parse()?;

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %bind_addr,
            max_clients = self.config.server.max_clients,
            "Server startet"
        );

        // Identity-Provider: im Standalone-Betrieb der offene
        // Entwicklungs-Provider; hinter dem Chat-Backend wird hier ein
        // Token-pruefender Provider eingesetzt
        let identity = Arc::new(OpenIdentityProvider::neu());

        let state = SignalingState::neu(self.config.signaling_config(), identity);
        let signaling = SignalingServer::neu(Arc::clone(&state), bind_addr);

        // Shutdown-Kanal: Ctrl-C setzt das Signal fuer alle Tasks
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
            }
        });

        signaling.starten(shutdown_rx).await?;

        tracing::info!("Server beendet");
        Ok(())
    }
}
