//! palaver-protocol – Nachrichten- und Wire-Format-Definitionen
//!
//! Dieses Crate definiert das Signalisierungsprotokoll zwischen Client
//! und Server: alle Steuerungsnachrichten als Tagged Enum (`control`)
//! und das Laengen-praefixierte JSON-Frame-Format fuer TCP (`wire`).

pub mod control;
pub mod wire;

pub use control::{ErrorCode, SignalMessage, SignalPayload};
pub use wire::FrameCodec;
