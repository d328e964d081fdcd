//! Symmetric chain-key stepping (`spec.md` §4.5).
//!
//! Generalizes the teacher's free-standing `hkdf_ck` (`ratchet.rs`) plus
//! the inline `while self.n_messages_received < until` loop inside
//! `Ratchet::skip_message_keys` into a single type that owns one chain's
//! progression and can be asked for "the key at index N" directly,
//! deriving and caching every key strictly between the chain's current
//! position and N along the way.

use crate::constants::{CHAIN_KEY_CACHE_WINDOW, MAX_DERIVE_AHEAD, TAG_CHAIN_MESSAGE_KEY, TAG_CHAIN_NEXT_KEY};
use crate::error::{CoreError, CoreResult};
use crate::primitives::{hkdf_expand, AeadKey};
use std::collections::BTreeMap;

/// Which side of a connection a chain serves: sending chains advance
/// eagerly (one step per message sent), receiving chains advance lazily
/// and may need to skip ahead when a message arrives out of order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainRole {
    Sending,
    Receiving,
}

/// One symmetric-ratchet chain: a 32-byte seed advanced by repeated HKDF
/// steps, plus a bounded cache of message keys derived ahead of the
/// chain's current read position (needed so a receiving chain can hand
/// back the key for message N before message N-1 has arrived).
pub struct ChainStep {
    role: ChainRole,
    current_seed: [u8; 32],
    current_index: u32,
    derived_ahead: BTreeMap<u32, [u8; 32]>,
}

impl ChainStep {
    pub fn new(role: ChainRole, seed: [u8; 32]) -> Self {
        Self {
            role,
            current_seed: seed,
            current_index: 0,
            derived_ahead: BTreeMap::new(),
        }
    }

    pub fn role(&self) -> ChainRole {
        self.role
    }

    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// The seed this chain would next step from. Combined with
    /// `current_index`, enough to reconstruct an equivalent `ChainStep` via
    /// [`ChainStep::restore`] — the within-chain skip-ahead cache is not
    /// preserved across a save/restore round trip, only the frontier.
    pub fn current_seed(&self) -> [u8; 32] {
        self.current_seed
    }

    /// Rebuilds a chain at an exact previously-observed position, for use
    /// by `state::PersistedState` restoration. The skip-ahead cache starts
    /// empty; any message still outstanding at save time is recovered the
    /// same way an out-of-order message from a live chain would be.
    pub fn restore(role: ChainRole, seed: [u8; 32], index: u32) -> Self {
        Self {
            role,
            current_seed: seed,
            current_index: index,
            derived_ahead: BTreeMap::new(),
        }
    }

    fn step(seed: &[u8; 32]) -> CoreResult<([u8; 32], [u8; 32])> {
        let next_seed: [u8; 32] = hkdf_expand(None, seed, TAG_CHAIN_NEXT_KEY)?;
        let message_key: [u8; 32] = hkdf_expand(None, seed, TAG_CHAIN_MESSAGE_KEY)?;
        Ok((next_seed, message_key))
    }

    /// Returns the message key at `index`, advancing (and, for indices
    /// already passed, caching) as needed. Deriving more than
    /// `MAX_DERIVE_AHEAD` steps past the current position in one call is
    /// rejected — an attacker claiming an enormous message number
    /// shouldn't be able to force unbounded HKDF work or an unbounded
    /// cache.
    pub fn get_or_derive_key_for(&mut self, index: u32) -> CoreResult<AeadKey> {
        if let Some(seed) = self.derived_ahead.remove(&index) {
            return Ok(AeadKey::from_bytes(seed));
        }

        if index < self.current_index {
            return Err(CoreError::DeriveKey("requested index already consumed"));
        }

        let steps_needed = index - self.current_index;
        if steps_needed > MAX_DERIVE_AHEAD {
            return Err(CoreError::DeriveKey("requested index too far ahead"));
        }

        let mut message_key = [0u8; 32];
        while self.current_index <= index {
            let (next_seed, mk) = Self::step(&self.current_seed)?;
            if self.current_index < index {
                self.derived_ahead.insert(self.current_index, mk);
            } else {
                message_key = mk;
            }
            self.current_seed = next_seed;
            self.current_index += 1;
        }

        self.prune_old_keys();
        Ok(AeadKey::from_bytes(message_key))
    }

    /// Advances the chain to `until` without returning any of the
    /// intermediate keys directly — they're cached in `derived_ahead` for
    /// later out-of-order retrieval by [`ChainStep::get_or_derive_key_for`].
    pub fn skip_keys_until(&mut self, until: u32) -> CoreResult<()> {
        if until <= self.current_index {
            return Ok(());
        }
        let steps_needed = until - self.current_index;
        if steps_needed > MAX_DERIVE_AHEAD {
            return Err(CoreError::SkippedCacheExhausted);
        }
        while self.current_index < until {
            let (next_seed, mk) = Self::step(&self.current_seed)?;
            self.derived_ahead.insert(self.current_index, mk);
            self.current_seed = next_seed;
            self.current_index += 1;
        }
        self.prune_old_keys();
        Ok(())
    }

    /// Replaces this chain's seed and resets its position, for use right
    /// after a DH ratchet step reseeds both chains from the new root key.
    pub fn update_keys_after_dh_ratchet(&mut self, new_seed: [u8; 32]) {
        self.current_seed = new_seed;
        self.current_index = 0;
        self.derived_ahead.clear();
    }

    /// Removes and returns every key cached ahead of the current position,
    /// for migration into a longer-lived store (`recovery::RecoveryCache`)
    /// right before this chain is about to be reseeded and its own cache
    /// cleared.
    pub fn drain_derived_ahead(&mut self) -> Vec<(u32, [u8; 32])> {
        std::mem::take(&mut self.derived_ahead).into_iter().collect()
    }

    /// Evicts cached ahead-of-position keys older than
    /// `CHAIN_KEY_CACHE_WINDOW` behind the current index, bounding the
    /// cache's memory footprint under sustained reordering.
    fn prune_old_keys(&mut self) {
        if self.current_index < CHAIN_KEY_CACHE_WINDOW {
            return;
        }
        let floor = self.current_index - CHAIN_KEY_CACHE_WINDOW;
        self.derived_ahead.retain(|&idx, _| idx >= floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_keys_differ() {
        let mut chain = ChainStep::new(ChainRole::Sending, [1u8; 32]);
        let k0 = chain.get_or_derive_key_for(0).unwrap();
        let k1 = chain.get_or_derive_key_for(1).unwrap();
        assert_ne!(k0.as_bytes(), k1.as_bytes());
    }

    #[test]
    fn out_of_order_retrieval_caches_skipped_keys() {
        let mut chain = ChainStep::new(ChainRole::Receiving, [2u8; 32]);
        let k5 = chain.get_or_derive_key_for(5).unwrap();
        let k2 = chain.get_or_derive_key_for(2).unwrap();
        assert_ne!(k5.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn requesting_already_consumed_index_errors() {
        let mut chain = ChainStep::new(ChainRole::Sending, [3u8; 32]);
        chain.get_or_derive_key_for(3).unwrap();
        // index 1 was cached while stepping ahead to reach 3, so the first
        // retrieval succeeds and removes it from the cache.
        chain.get_or_derive_key_for(1).unwrap();
        // asking again finds neither a cache entry nor an un-advanced
        // position: it was genuinely already consumed.
        assert!(chain.get_or_derive_key_for(1).is_err());
    }

    #[test]
    fn excessive_skip_ahead_is_rejected() {
        let mut chain = ChainStep::new(ChainRole::Receiving, [4u8; 32]);
        assert!(chain.get_or_derive_key_for(MAX_DERIVE_AHEAD + 1).is_err());
    }

    #[test]
    fn dh_ratchet_reset_restarts_index_at_zero() {
        let mut chain = ChainStep::new(ChainRole::Sending, [5u8; 32]);
        chain.get_or_derive_key_for(10).unwrap();
        chain.update_keys_after_dh_ratchet([9u8; 32]);
        assert_eq!(chain.current_index(), 0);
    }
}
