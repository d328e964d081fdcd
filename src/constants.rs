//! Fixed byte lengths and domain-separation tags shared by every component.
//!
//! Lengths mirror the teacher's `constants.rs`; the domain tags are new,
//! pinned once here so callers on both sides of a handshake agree.

/// Byte size of an X25519 / Ed25519 curve element (public or private half,
/// except the Ed25519 secret seed which dalek stores as 32 bytes too, see
/// [`ED25519_SECRET_LENGTH`]).
pub const CURVE25519_SECRET_LENGTH: usize = 32;
pub const CURVE25519_PUBLIC_LENGTH: usize = CURVE25519_SECRET_LENGTH;

/// Ed25519 signing key byte length as persisted (seed + public, dalek
/// "keypair" convention; see `identity::IdentityKeySet`).
pub const ED25519_SECRET_LENGTH: usize = 64;
pub const ED25519_PUBLIC_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

pub const SHA256_HASH_LENGTH: usize = 32;
pub const AES256_SECRET_LENGTH: usize = 32;
pub const AES256_NONCE_LENGTH: usize = 12;
pub const AES256_TAG_LENGTH: usize = 16;

/// X3DH domain-separation prefix: 32 bytes of 0xFF, mandated by the X3DH
/// spec for Curve25519 (57 bytes of 0xFF for Curve448, not used here).
pub const X3DH_DOMAIN_SEPARATION_PREFIX: [u8; 32] = [0xFFu8; 32];

/// HKDF `info` tag for the initial sending chain seed derived in `finalize`.
pub const TAG_INIT_SEND_CHAIN: &[u8] = b"ratchet-core/init-send-chain/v1";
/// HKDF `info` tag for the initial receiving chain seed derived in `finalize`.
pub const TAG_INIT_RECV_CHAIN: &[u8] = b"ratchet-core/init-recv-chain/v1";
/// HKDF `info` tag for a DH ratchet step (root key | chain seed derivation).
pub const TAG_DH_RATCHET: &[u8] = b"ratchet-core/dh-ratchet/v1";
/// HKDF `info` tag for the per-connection metadata encryption key.
pub const TAG_METADATA_KEY: &[u8] = b"ratchet-core/metadata-v1";
/// HKDF `info` tag for a symmetric-ratchet message key derivation.
pub const TAG_CHAIN_MESSAGE_KEY: &[u8] = b"ratchet-core/msg";
/// HKDF `info` tag for a symmetric-ratchet next-chain-key derivation.
pub const TAG_CHAIN_NEXT_KEY: &[u8] = b"ratchet-core/chain";
/// HKDF `info` tag used by `create_from_master_key` to derive per-role seeds.
pub const TAG_MASTER_ED25519_SEED: &[u8] = b"ratchet-core/master/ed25519-seed/v1";
pub const TAG_MASTER_SPK_SEED: &[u8] = b"ratchet-core/master/spk-seed/v1";
/// HKDF `info` tag prefix used by `create_from_master_key` to derive each
/// one-time pre-key seed; the little-endian pre-key index is appended.
pub const TAG_MASTER_OTPK_SEED: &[u8] = b"ratchet-core/master/otpk-seed/v1";

/// Bound on how far `get_or_derive_key_for` will advance a chain in one call.
pub const MAX_DERIVE_AHEAD: u32 = 2_000;
/// Trailing window kept by `prune_old_keys` around the current chain index.
pub const CHAIN_KEY_CACHE_WINDOW: u32 = 2_000;

/// Default bound on the skipped-message-key cache (`spec.md` §4.5).
pub const DEFAULT_MAX_SKIPPED: usize = 2_000;

/// Default nonce replay lifetime (`spec.md` §4.6): five minutes.
pub const DEFAULT_NONCE_LIFETIME_SECS: u64 = 5 * 60;
/// Default per-chain out-of-order window, grown under sustained high rate.
pub const DEFAULT_REPLAY_WINDOW: u64 = 1_000;
pub const MAX_REPLAY_WINDOW: u64 = 5_000;

/// `spec.md` §4.7 adaptive cadence thresholds, messages/sec.
pub const ADAPTIVE_LIGHT_THRESHOLD: f64 = 10.0;
pub const ADAPTIVE_MODERATE_THRESHOLD: f64 = 50.0;
pub const ADAPTIVE_HEAVY_THRESHOLD: f64 = 200.0;

/// Width of the adaptive manager's message-rate sliding window.
pub const ADAPTIVE_RATE_WINDOW_SECS: u64 = 60;
/// How often the adaptive manager recomputes its published cadence.
pub const ADAPTIVE_TICK_SECS: u64 = 10;

/// Nonce counter layout: 8 random bytes followed by a 4-byte little-endian
/// counter (`spec.md` §6).
pub const NONCE_PREFIX_LENGTH: usize = 8;
pub const NONCE_COUNTER_LENGTH: usize = 4;

/// Default session-timeout deadline for a `RatchetConnection`
/// (`spec.md` §3's "session-timeout deadline" field): 30 days of
/// inactivity from `finalize`. Not named by `spec.md` itself, so this is
/// an Open Question resolution (see `DESIGN.md`) rather than a value
/// copied from the source drafts.
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;
