//! Signal-Relay – Zustandslose Offer/Answer/ICE-Weiterleitung
//!
//! Reiner adressbasierter Forwarder: schlaegt das Ziel in der Registry
//! nach, stempelt den Absender und reicht die Nutzlast unveraendert
//! durch. SDP- und Kandidaten-Inhalte werden nie inspiziert oder
//! validiert.
//!
//! Ist das Ziel offline, wird still verworfen – kein Retry, keine
//! Queue. Echtzeit-Signalisierung hat keinen Wert mehr sobald der Peer
//! weg ist.

use palaver_core::types::UserId;
use palaver_protocol::control::{
    AnswerMessage, IceCandidateMessage, OfferMessage, SignalMessage, SignalPayload,
};

use crate::registry::ConnectionRegistry;

/// Art der weiterzuleitenden Signalisierungsnachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayArt {
    Offer,
    Answer,
    IceCandidate,
}

impl std::fmt::Display for RelayArt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
            Self::IceCandidate => write!(f, "ice-candidate"),
        }
    }
}

/// Zustandsloser Weiterleiter fuer WebRTC-Signalisierung
#[derive(Clone)]
pub struct SignalRelay {
    registry: ConnectionRegistry,
}

impl SignalRelay {
    /// Erstellt ein neues Relay auf der gegebenen Registry
    pub fn neu(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    /// Leitet eine Signalisierungsnachricht an das Ziel weiter
    ///
    /// `von` wird als Absender gestempelt – vom Client mitgeschickte
    /// Absenderangaben werden ueberschrieben. Gibt `true` zurueck wenn
    /// das Ziel online war und die Nachricht eingereiht wurde.
    pub fn weiterleiten(
        &self,
        art: RelayArt,
        von: UserId,
        ziel: &UserId,
        nutzlast: serde_json::Value,
    ) -> bool {
        let payload = match art {
            RelayArt::Offer => SignalPayload::Offer(OfferMessage {
                target: *ziel,
                from: Some(von),
                sdp: nutzlast,
            }),
            RelayArt::Answer => SignalPayload::Answer(AnswerMessage {
                target: *ziel,
                from: Some(von),
                sdp: nutzlast,
            }),
            RelayArt::IceCandidate => SignalPayload::IceCandidate(IceCandidateMessage {
                target: *ziel,
                from: Some(von),
                candidate: nutzlast,
            }),
        };

        let zugestellt = self.registry.an_user_senden(ziel, SignalMessage::push(payload));
        if !zugestellt {
            tracing::debug!(
                art = %art,
                von = %von,
                ziel = %ziel,
                "Signalisierung verworfen – Ziel offline"
            );
        }
        zugestellt
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
