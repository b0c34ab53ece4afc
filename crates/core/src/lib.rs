//! palaver-core – Gemeinsame Typen, Traits und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Palaver-Crates gemeinsam genutzt werden.

pub mod error;
pub mod identity;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{PalaverError, Result};
pub use identity::{Identitaet, IdentityProvider, OpenIdentityProvider};
pub use types::{CallId, GroupId, UserId};
