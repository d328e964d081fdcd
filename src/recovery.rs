//! Skipped-message-key recovery across DH ratchet boundaries (`spec.md` §4.6).
//!
//! `ChainStep`'s own `derived_ahead` cache (`chain.rs`) only covers keys
//! skipped within the *current* receiving chain. Once a DH ratchet step
//! reseeds that chain, those pre-ratchet keys would be lost — this is
//! exactly the gap the teacher's `Ratchet::mk_skipped: HashMap<(PublicKey,
//! u64), SharedSecret>` closes by keying skipped keys on the sender's
//! ratchet public key as well as the message index. `RecoveryCache`
//! generalizes that map into its own bounded, disposable component so the
//! ratchet connection doesn't have to manage eviction inline the way
//! `Ratchet::skip_message_keys` does.

use crate::constants::DEFAULT_MAX_SKIPPED;
use crate::error::{CoreError, CoreResult};
use crate::primitives::{AeadKey, PublicKey};
use std::collections::HashMap;

/// Insertion order is tracked alongside the map so the oldest entries can
/// be evicted first once the cache exceeds its bound, rather than evicting
/// at random.
pub struct RecoveryCache {
    max_entries: usize,
    keys: HashMap<(PublicKey, u32), [u8; 32]>,
    insertion_order: Vec<(PublicKey, u32)>,
    disposed: bool,
}

impl RecoveryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            keys: HashMap::new(),
            insertion_order: Vec::new(),
            disposed: false,
        }
    }

    pub fn with_default_bound() -> Self {
        Self::new(DEFAULT_MAX_SKIPPED)
    }

    /// Stores a skipped key for `(sender_ratchet_key, index)`. If the
    /// cache is already at capacity the oldest entry is evicted first —
    /// the oldest skipped key is the least likely to still be needed, as
    /// the corresponding message has had the longest time to arrive.
    pub fn store_skipped(&mut self, sender_ratchet_key: PublicKey, index: u32, key: [u8; 32]) -> CoreResult<()> {
        if self.disposed {
            return Err(CoreError::ObjectDisposed);
        }
        let entry_key = (sender_ratchet_key, index);
        if !self.keys.contains_key(&entry_key) && self.keys.len() >= self.max_entries {
            if let Some(oldest) = self.insertion_order.first().cloned() {
                self.keys.remove(&oldest);
                self.insertion_order.remove(0);
            }
        }
        if !self.keys.contains_key(&entry_key) {
            self.insertion_order.push(entry_key.clone());
        }
        self.keys.insert(entry_key, key);
        Ok(())
    }

    /// Looks up and removes (single use only) the key stored for
    /// `(sender_ratchet_key, index)`.
    pub fn try_recover(&mut self, sender_ratchet_key: &PublicKey, index: u32) -> CoreResult<Option<AeadKey>> {
        if self.disposed {
            return Err(CoreError::ObjectDisposed);
        }
        let entry_key = (sender_ratchet_key.clone(), index);
        if let Some(key) = self.keys.remove(&entry_key) {
            self.insertion_order.retain(|k| k != &entry_key);
            return Ok(Some(AeadKey::from_bytes(key)));
        }
        Ok(None)
    }

    /// Drops every skipped key belonging to `sender_ratchet_key` older
    /// than `before_index`: once a receiving chain has moved past a
    /// point, the old chain's un-retrieved keys for indices before it
    /// will never be asked for again (`spec.md`'s forward-secrecy
    /// invariant requires they be wiped, not merely forgotten about).
    pub fn cleanup_old_keys(&mut self, sender_ratchet_key: &PublicKey, before_index: u32) {
        let stale: Vec<_> = self
            .keys
            .keys()
            .filter(|(pk, idx)| pk == sender_ratchet_key && *idx < before_index)
            .cloned()
            .collect();
        for entry_key in stale {
            self.keys.remove(&entry_key);
            self.insertion_order.retain(|k| k != &entry_key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Wipes every stored key and marks the cache unusable. Key material
    /// in a `HashMap<_, [u8; 32]>` isn't zeroized by the map's own `Drop`,
    /// so every entry is overwritten by hand before the map is cleared.
    pub fn dispose(&mut self) {
        for key in self.keys.values_mut() {
            zeroize::Zeroize::zeroize(key);
        }
        self.keys.clear();
        self.insertion_order.clear();
        self.disposed = true;
    }
}

impl Drop for RecoveryCache {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_key(byte: u8) -> PublicKey {
        PublicKey::from_bytes([byte; 32])
    }

    #[test]
    fn store_then_recover_round_trips() {
        let mut cache = RecoveryCache::new(4);
        cache.store_skipped(dummy_key(1), 3, [9u8; 32]).unwrap();
        let recovered = cache.try_recover(&dummy_key(1), 3).unwrap().unwrap();
        assert_eq!(recovered.as_bytes(), &[9u8; 32]);
    }

    #[test]
    fn recover_is_single_use() {
        let mut cache = RecoveryCache::new(4);
        cache.store_skipped(dummy_key(1), 3, [9u8; 32]).unwrap();
        cache.try_recover(&dummy_key(1), 3).unwrap();
        assert!(cache.try_recover(&dummy_key(1), 3).unwrap().is_none());
    }

    #[test]
    fn eviction_drops_oldest_first() {
        let mut cache = RecoveryCache::new(2);
        cache.store_skipped(dummy_key(1), 0, [1u8; 32]).unwrap();
        cache.store_skipped(dummy_key(1), 1, [2u8; 32]).unwrap();
        cache.store_skipped(dummy_key(1), 2, [3u8; 32]).unwrap();
        assert!(cache.try_recover(&dummy_key(1), 0).unwrap().is_none());
        assert!(cache.try_recover(&dummy_key(1), 2).unwrap().is_some());
    }

    #[test]
    fn cleanup_removes_only_stale_entries_for_key() {
        let mut cache = RecoveryCache::new(8);
        cache.store_skipped(dummy_key(1), 0, [1u8; 32]).unwrap();
        cache.store_skipped(dummy_key(1), 5, [2u8; 32]).unwrap();
        cache.store_skipped(dummy_key(2), 0, [3u8; 32]).unwrap();
        cache.cleanup_old_keys(&dummy_key(1), 3);
        assert!(cache.try_recover(&dummy_key(1), 0).unwrap().is_none());
        assert!(cache.try_recover(&dummy_key(1), 5).unwrap().is_some());
        assert!(cache.try_recover(&dummy_key(2), 0).unwrap().is_some());
    }

    #[test]
    fn dispose_blocks_further_use() {
        let mut cache = RecoveryCache::new(4);
        cache.store_skipped(dummy_key(1), 0, [1u8; 32]).unwrap();
        cache.dispose();
        assert!(cache.try_recover(&dummy_key(1), 0).is_err());
    }
}
