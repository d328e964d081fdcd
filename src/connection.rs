//! Thread-safe handle around a [`RatchetConnection`] (`spec.md` §4.10,
//! concurrency and resource model).
//!
//! `RatchetConnection` itself is `!Sync` in spirit — every operation
//! mutates chain position, replay state, and nonce counters — so callers
//! sharing one session across threads need a lock around it. Grounded on
//! `guard-service`'s `Mutex`-wrapped shared state (`engine/mod.rs`,
//! `service_state.rs`): a `parking_lot::Mutex` behind an `Arc` rather than
//! `std::sync::Mutex`, for the same reasons that codebase picked it —
//! no poisoning to thread through every call site, and a smaller, faster
//! lock for the short critical sections here (one AEAD seal/open plus a
//! handful of HKDF steps).

use crate::error::CoreResult;
use crate::ratchet::RatchetConnection;
use crate::state::PersistedState;
use parking_lot::Mutex;
use std::sync::Arc;

/// A cloneable handle to one ratchet session. Cloning shares the
/// underlying connection rather than duplicating it — every clone sees
/// the same chain state, the way a `guard-service` engine handle shares
/// one `Mutex<EngineState>` across its async tasks.
#[derive(Clone)]
pub struct Session(Arc<Mutex<RatchetConnection>>);

impl Session {
    pub fn new(connection: RatchetConnection) -> Self {
        Self(Arc::new(Mutex::new(connection)))
    }

    pub fn from_persisted_state(state: PersistedState) -> CoreResult<Self> {
        Ok(Self::new(RatchetConnection::from_persisted_state(state)?))
    }

    /// Seals `plaintext` for sending under the held lock.
    pub fn encrypt(&self, plaintext: &[u8], extra_aad: &[u8]) -> CoreResult<Vec<u8>> {
        self.0.lock().prepare_next_send_message(plaintext, extra_aad)
    }

    /// Opens an incoming envelope under the held lock.
    pub fn decrypt(&self, envelope: &[u8], extra_aad: &[u8]) -> CoreResult<Vec<u8>> {
        self.0.lock().process_received_message(envelope, extra_aad)
    }

    pub fn to_persisted_state(&self) -> CoreResult<PersistedState> {
        self.0.lock().to_persisted_state()
    }

    /// Zeroizes the connection's secret state and marks it unusable. Any
    /// other `Session` handle sharing this connection will see
    /// `CoreError::ObjectDisposed` from further calls.
    pub fn dispose(&self) {
        self.0.lock().dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PrivateKey;
    use crate::state::ExchangeType;

    fn sessions() -> (Session, Session) {
        let root_key = [7u8; 32];
        let bob_spk = PrivateKey::generate();
        let bob_spk_public = bob_spk.public_key();
        let ad = [2u8; 64];

        let alice = RatchetConnection::finalize_as_initiator(
            root_key,
            bob_spk_public,
            ad,
            ExchangeType::Streaming,
        )
        .unwrap();
        let bob =
            RatchetConnection::finalize_as_responder(root_key, bob_spk, ad, ExchangeType::Streaming)
                .unwrap();
        (Session::new(alice), Session::new(bob))
    }

    #[test]
    fn session_round_trips_a_message() {
        let (alice, bob) = sessions();
        let envelope = alice.encrypt(b"hello", b"").unwrap();
        let plaintext = bob.decrypt(&envelope, b"").unwrap();
        assert_eq!(plaintext, b"hello");
    }

    #[test]
    fn cloned_session_shares_state() {
        let (alice, bob) = sessions();
        let alice_clone = alice.clone();

        let e1 = alice.encrypt(b"first", b"").unwrap();
        let e2 = alice_clone.encrypt(b"second", b"").unwrap();

        assert_eq!(bob.decrypt(&e1, b"").unwrap(), b"first");
        assert_eq!(bob.decrypt(&e2, b"").unwrap(), b"second");
    }

    #[test]
    fn disposed_session_rejects_further_use() {
        let (alice, _bob) = sessions();
        alice.dispose();
        assert!(alice.encrypt(b"x", b"").is_err());
    }
}
