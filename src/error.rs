//! The crate's single error taxonomy.
//!
//! One flat enum replaces the teacher's two hand-written enums
//! (`X3DHError`, `RatchetError`) — `spec.md` §7 calls for one taxonomy
//! shared by every component, and `thiserror` (already in the wider
//! retrieval pack, see `dl_crypto::error::CryptoError`) derives the
//! `Display`/`std::error::Error`/`From` impls the teacher wrote by hand.
//!
//! No variant carries key material; callers get the kind plus a short
//! message, never the bytes that failed to validate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),

    #[error("peer public key invalid: {0}")]
    PeerPublicKeyInvalid(&'static str),

    #[error("local secret unavailable or invalid: {0}")]
    PrepareLocal(&'static str),

    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    #[error("key derivation failed: {0}")]
    DeriveKey(&'static str),

    #[error("key generation failed: {0}")]
    KeyGeneration(&'static str),

    #[error("state decode failed: {0}")]
    Decode(&'static str),

    #[error("object already disposed")]
    ObjectDisposed,

    #[error("session expired")]
    SessionExpired,

    #[error("one-shot exchange sessions cannot be persisted")]
    OneShotNotPersistable,

    #[error("replay detected")]
    ReplayDetected,

    #[error("skipped-key cache exhausted")]
    SkippedCacheExhausted,

    #[error("nonce counter exhausted, a new session is required")]
    NonceCounterExhausted,

    #[error("{0}")]
    Generic(&'static str),

    #[error("HKDF expand failed: {0}")]
    Hkdf(#[from] hkdf::InvalidLength),

    #[error("AES-GCM operation failed: {0}")]
    AesGcm(#[from] aes_gcm::Error),

    #[error("AES-GCM key length invalid: {0}")]
    AesGcmKeyLength(#[from] aes_gcm::aead::crypto_common::InvalidLength),

    #[error("Ed25519 signature invalid: {0}")]
    Signature(#[from] ed25519_dalek::SignatureError),
}

pub type CoreResult<T> = Result<T, CoreError>;
