//! Replay protection (`spec.md` §4.7): per-chain index tracking plus a
//! time-bounded nonce set.
//!
//! Nothing in the teacher's `ratchet.rs` defends against replay directly —
//! `n_messages_received` only tracks the next *expected* index, and a
//! message whose index has already been consumed would simply fail AEAD
//! decryption against a reused chain position rather than being rejected
//! up front. This module adds the explicit check `spec.md` calls for: a
//! sliding window of already-seen indices per chain, and a separate
//! expiring set of raw nonces so a captured ciphertext can't be replayed
//! verbatim even if (by some future bug) its chain index were accepted
//! twice.

use crate::constants::{DEFAULT_NONCE_LIFETIME_SECS, DEFAULT_REPLAY_WINDOW, MAX_REPLAY_WINDOW};
use crate::error::{CoreError, CoreResult};
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

/// Tracks which message indices on one receiving chain have already been
/// accepted, inside a sliding window behind the highest index seen so far.
/// An index older than the window is rejected outright rather than
/// re-checked against the (already evicted) record of what was seen.
pub struct ReplayWindow {
    window_size: u64,
    highest_seen: Option<u64>,
    seen: HashSet<u64>,
}

impl ReplayWindow {
    pub fn new(window_size: u64) -> Self {
        Self {
            window_size: window_size.min(MAX_REPLAY_WINDOW),
            highest_seen: None,
            seen: HashSet::new(),
        }
    }

    pub fn with_default_window() -> Self {
        Self::new(DEFAULT_REPLAY_WINDOW)
    }

    /// Grows the window, bounded by `MAX_REPLAY_WINDOW` — used by
    /// `adaptive::AdaptiveManager` to widen tolerance for out-of-order
    /// delivery under heavy sustained load.
    pub fn grow_window(&mut self, new_size: u64) {
        self.window_size = new_size.min(MAX_REPLAY_WINDOW);
    }

    /// Records `index` as seen, rejecting it if it was already seen or
    /// falls outside the sliding window behind the current high-water
    /// mark.
    pub fn check_and_record(&mut self, index: u64) -> CoreResult<()> {
        if let Some(highest) = self.highest_seen {
            if index + self.window_size < highest {
                return Err(CoreError::ReplayDetected);
            }
        }
        if !self.seen.insert(index) {
            return Err(CoreError::ReplayDetected);
        }

        let highest = self.highest_seen.get_or_insert(index);
        if index > *highest {
            *highest = index;
        }

        let floor = self.highest_seen.unwrap().saturating_sub(self.window_size);
        self.seen.retain(|&i| i >= floor);
        Ok(())
    }
}

/// A time-bounded set of raw nonce bytes, rejecting any nonce seen again
/// within `lifetime`. Evicts expired entries lazily on each check rather
/// than running a background sweep — there is no async runtime in this
/// crate's dependency stack to host one.
pub struct NonceSet {
    lifetime: Duration,
    entries: VecDeque<(Instant, Vec<u8>)>,
    seen: HashSet<Vec<u8>>,
}

impl NonceSet {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            entries: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    pub fn with_default_lifetime() -> Self {
        Self::new(Duration::from_secs(DEFAULT_NONCE_LIFETIME_SECS))
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some((inserted_at, _)) = self.entries.front() {
            if now.duration_since(*inserted_at) > self.lifetime {
                if let Some((_, nonce)) = self.entries.pop_front() {
                    self.seen.remove(&nonce);
                }
            } else {
                break;
            }
        }
    }

    /// Records `nonce` as seen "now", rejecting it if it was already
    /// recorded and has not yet expired.
    pub fn check_and_record(&mut self, nonce: &[u8]) -> CoreResult<()> {
        let now = Instant::now();
        self.evict_expired(now);
        if self.seen.contains(nonce) {
            return Err(CoreError::ReplayDetected);
        }
        self.seen.insert(nonce.to_vec());
        self.entries.push_back((now, nonce.to_vec()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replay_window_rejects_repeated_index() {
        let mut window = ReplayWindow::new(10);
        window.check_and_record(5).unwrap();
        assert!(matches!(window.check_and_record(5), Err(CoreError::ReplayDetected)));
    }

    #[test]
    fn replay_window_rejects_index_too_old() {
        let mut window = ReplayWindow::new(3);
        window.check_and_record(100).unwrap();
        assert!(matches!(window.check_and_record(90), Err(CoreError::ReplayDetected)));
    }

    #[test]
    fn replay_window_accepts_in_order_and_nearby_out_of_order() {
        let mut window = ReplayWindow::new(10);
        window.check_and_record(1).unwrap();
        window.check_and_record(3).unwrap();
        window.check_and_record(2).unwrap();
    }

    #[test]
    fn nonce_set_rejects_immediate_replay() {
        let mut set = NonceSet::new(Duration::from_secs(60));
        set.check_and_record(b"abc").unwrap();
        assert!(matches!(set.check_and_record(b"abc"), Err(CoreError::ReplayDetected)));
    }

    #[test]
    fn nonce_set_accepts_distinct_nonces() {
        let mut set = NonceSet::new(Duration::from_secs(60));
        set.check_and_record(b"abc").unwrap();
        set.check_and_record(b"def").unwrap();
        assert_eq!(set.len(), 2);
    }
}
