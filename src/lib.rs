//! Cryptographic core of a Signal-style end-to-end secure messaging
//! session: identity key management, an X3DH handshake, and a Double
//! Ratchet session with skipped-message recovery, replay protection, and
//! load-adaptive ratchet cadence.
//!
//! This crate has no networking or storage layer of its own — callers
//! own the wire format and persistence, this crate owns the key material
//! and the state machine that advances it.

pub mod adaptive;
pub mod chain;
pub mod connection;
pub mod constants;
pub mod error;
pub mod identity;
pub mod primitives;
pub mod ratchet;
pub mod recovery;
pub mod replay;
pub mod secure_memory;
pub mod state;

pub use connection::Session;
pub use error::{CoreError, CoreResult};
pub use identity::{IdentityKeySet, PublicBundle, X3dhOutput};
pub use ratchet::RatchetConnection;
pub use state::ExchangeType;
