//! Adaptive ratchet cadence (`spec.md` §4.7).
//!
//! Nothing in the teacher's ratchet performs a DH ratchet step on any
//! schedule other than "every time the sender's public key changes" —
//! message rate never factors in. This component is new: it tracks recent
//! message throughput in a rolling window and classifies it into a load
//! tier, which `ratchet::RatchetConnection` consults to decide how
//! aggressively to force fresh DH ratchet steps under load rather than
//! relying solely on the peer's own cadence.

use crate::constants::{
    ADAPTIVE_HEAVY_THRESHOLD, ADAPTIVE_LIGHT_THRESHOLD, ADAPTIVE_MODERATE_THRESHOLD,
    ADAPTIVE_RATE_WINDOW_SECS, ADAPTIVE_TICK_SECS, DEFAULT_REPLAY_WINDOW, MAX_REPLAY_WINDOW,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Coarse classification of recent message throughput.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadClass {
    Light,
    Moderate,
    Heavy,
    Extreme,
}

impl LoadClass {
    fn from_rate(messages_per_sec: f64) -> Self {
        if messages_per_sec < ADAPTIVE_LIGHT_THRESHOLD {
            LoadClass::Light
        } else if messages_per_sec < ADAPTIVE_MODERATE_THRESHOLD {
            LoadClass::Moderate
        } else if messages_per_sec < ADAPTIVE_HEAVY_THRESHOLD {
            LoadClass::Heavy
        } else {
            LoadClass::Extreme
        }
    }
}

/// The cadence a `LoadClass` maps to. Heavier load widens the interval
/// between forced DH ratchet steps (each one costs a key generation and
/// two DH computations) and relaxes the staleness bounds that would
/// otherwise force one anyway, while widening the replay window to
/// tolerate more out-of-order delivery under sustained traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CadenceProfile {
    pub messages_per_forced_ratchet: u32,
    pub max_age: Duration,
    pub max_messages_without_ratchet: u32,
    pub ratchet_on_new_remote_dh: bool,
    pub replay_window: u64,
}

impl CadenceProfile {
    fn for_load(class: LoadClass) -> Self {
        match class {
            LoadClass::Light => CadenceProfile {
                messages_per_forced_ratchet: 5,
                max_age: Duration::from_secs(30 * 60),
                max_messages_without_ratchet: 100,
                ratchet_on_new_remote_dh: true,
                replay_window: DEFAULT_REPLAY_WINDOW,
            },
            LoadClass::Moderate => CadenceProfile {
                messages_per_forced_ratchet: 10,
                max_age: Duration::from_secs(45 * 60),
                max_messages_without_ratchet: 200,
                ratchet_on_new_remote_dh: true,
                replay_window: 2_000,
            },
            LoadClass::Heavy => CadenceProfile {
                messages_per_forced_ratchet: 25,
                max_age: Duration::from_secs(60 * 60),
                max_messages_without_ratchet: 500,
                ratchet_on_new_remote_dh: true,
                replay_window: 3_500,
            },
            // Extreme load disables forcing an extra ratchet just because
            // the peer's DH key changed — that case already gets a
            // receiving ratchet for free; forcing a send-side one too on
            // top of sustained heavy traffic buys little and costs a full
            // key generation plus two DH computations per message.
            LoadClass::Extreme => CadenceProfile {
                messages_per_forced_ratchet: 50,
                max_age: Duration::from_secs(120 * 60),
                max_messages_without_ratchet: 1_000,
                ratchet_on_new_remote_dh: false,
                replay_window: MAX_REPLAY_WINDOW,
            },
        }
    }
}

/// Tracks message timestamps in a rolling window and periodically
/// recomputes the published `LoadClass`/`CadenceProfile`, recomputing at
/// most once per `ADAPTIVE_TICK_SECS` rather than on every call so a
/// connection sending thousands of messages a second doesn't pay for a
/// full window scan per message.
pub struct AdaptiveManager {
    window: Duration,
    tick: Duration,
    timestamps: VecDeque<Instant>,
    last_tick: Option<Instant>,
    current_class: LoadClass,
    total_messages_sent: u32,
    messages_since_last_ratchet: u32,
    last_ratchet_time: Instant,
}

impl AdaptiveManager {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            window: Duration::from_secs(ADAPTIVE_RATE_WINDOW_SECS),
            tick: Duration::from_secs(ADAPTIVE_TICK_SECS),
            timestamps: VecDeque::new(),
            last_tick: None,
            current_class: LoadClass::Light,
            total_messages_sent: 0,
            messages_since_last_ratchet: 0,
            last_ratchet_time: now,
        }
    }

    fn evict_expired(&mut self, now: Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records one message observed right now, recomputing the load
    /// class if a full tick has elapsed since the last recomputation.
    pub fn record_message(&mut self) {
        let now = Instant::now();
        self.timestamps.push_back(now);
        self.evict_expired(now);

        let due = match self.last_tick {
            Some(last) => now.duration_since(last) >= self.tick,
            None => true,
        };
        if due {
            self.recompute(now);
        }
    }

    fn recompute(&mut self, now: Instant) {
        let rate = self.timestamps.len() as f64 / self.window.as_secs_f64();
        self.current_class = LoadClass::from_rate(rate);
        self.last_tick = Some(now);
    }

    pub fn current_load_class(&self) -> LoadClass {
        self.current_class
    }

    pub fn current_cadence(&self) -> CadenceProfile {
        CadenceProfile::for_load(self.current_class)
    }

    /// Reports whether a forced DH ratchet is due before the next
    /// outgoing message, per `spec.md` §4.7: true iff the next message
    /// index is a multiple of the cadence, OR too much time has passed
    /// since the last forced ratchet, OR too many messages have gone by
    /// without one, OR the peer's ratchet key changed since the last
    /// call and the active profile still treats that as cause for one of
    /// its own. Resets the "since last ratchet" counters when it fires.
    pub fn should_ratchet(&mut self, received_new_remote_dh: bool) -> bool {
        self.total_messages_sent += 1;
        self.messages_since_last_ratchet += 1;
        let cadence = self.current_cadence();
        let now = Instant::now();

        let due = self.total_messages_sent % cadence.messages_per_forced_ratchet == 0
            || now.duration_since(self.last_ratchet_time) > cadence.max_age
            || self.messages_since_last_ratchet >= cadence.max_messages_without_ratchet
            || (received_new_remote_dh && cadence.ratchet_on_new_remote_dh);

        if due {
            self.messages_since_last_ratchet = 0;
            self.last_ratchet_time = now;
        }
        due
    }
}

impl Default for AdaptiveManager {
    fn default() -> Self {
        Self::new()
    }
}
