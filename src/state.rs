//! Wire and persistence formats (`spec.md` §3 and §4.9).
//!
//! `MessageHeader` generalizes the teacher's `ratchet::Header` (dhs/pn/ns,
//! `to_bytes`/`TryFrom<&[u8;48]>`) with a `u32` message-number width instead
//! of `u64` — `MAX_DERIVE_AHEAD`/`DEFAULT_MAX_SKIPPED` already bound chain
//! depth far below `u32::MAX`, so the extra four bytes on every message
//! buy nothing. `PersistedState` is new: the teacher never serializes a
//! `Ratchet` at rest (its server persists only pre-key bundles via
//! `PreKeyBundle::to_base64`), so the connection-state round trip follows
//! the same manual length-prefixed, base64-at-the-edges convention as
//! `PreKeyBundle`/`InitialMessage` rather than reaching for `serde` on a
//! struct that is mostly raw secret key material.

use crate::constants::{AES256_SECRET_LENGTH, CURVE25519_PUBLIC_LENGTH, CURVE25519_SECRET_LENGTH};
use crate::error::{CoreError, CoreResult};
use crate::primitives::PublicKey;
use base64::{engine::general_purpose, Engine as _};

/// Whether a connection is expected to ever be written to disk. A one-shot
/// exchange (`spec.md` §3, §4.4, §9 — e.g. a single self-destructing
/// message) refuses [`crate::ratchet::RatchetConnection::to_persisted_state`]
/// outright rather than letting a caller accidentally snapshot secret chain
/// state that was promised to live only in memory. A restored connection
/// is always treated as streaming: persistence only happens for a
/// connection that was streaming to begin with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeType {
    OneShot,
    Streaming,
}

/// Plaintext metadata carried alongside every ciphertext: the sender's
/// current ratchet public key and its position in the sending chain. Not
/// itself encrypted — it is folded into the AEAD's associated data so the
/// receiver can still authenticate it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub sender_ratchet_key: PublicKey,
    pub previous_chain_length: u32,
    pub message_index: u32,
}

impl MessageHeader {
    pub const LENGTH: usize = CURVE25519_PUBLIC_LENGTH + 4 + 4;

    pub fn to_bytes(&self) -> [u8; Self::LENGTH] {
        let mut out = [0u8; Self::LENGTH];
        out[0..32].copy_from_slice(&self.sender_ratchet_key.0);
        out[32..36].copy_from_slice(&self.previous_chain_length.to_le_bytes());
        out[36..40].copy_from_slice(&self.message_index.to_le_bytes());
        out
    }
}

impl TryFrom<&[u8]> for MessageHeader {
    type Error = CoreError;

    fn try_from(value: &[u8]) -> CoreResult<Self> {
        if value.len() != Self::LENGTH {
            return Err(CoreError::Decode("message header wrong length"));
        }
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&value[0..32]);
        let previous_chain_length = u32::from_le_bytes(value[32..36].try_into().unwrap());
        let message_index = u32::from_le_bytes(value[36..40].try_into().unwrap());
        Ok(MessageHeader {
            sender_ratchet_key: PublicKey::from_bytes(key_bytes),
            previous_chain_length,
            message_index,
        })
    }
}

/// A flat, fully-owned snapshot of a `RatchetConnection`'s cryptographic
/// state, suitable for encrypting at rest by the caller and reloading
/// later. Chain seeds are included raw; callers must not persist this
/// structure's `to_bytes()` output unencrypted, same caution the teacher
/// gives `PrivateKey::to_base64`.
pub struct PersistedState {
    pub local_ratchet_private: [u8; CURVE25519_SECRET_LENGTH],
    pub local_ratchet_public: [u8; CURVE25519_PUBLIC_LENGTH],
    pub remote_ratchet_public: Option<[u8; CURVE25519_PUBLIC_LENGTH]>,
    pub root_key: [u8; AES256_SECRET_LENGTH],
    pub sending_chain_seed: Option<[u8; AES256_SECRET_LENGTH]>,
    pub sending_chain_index: u32,
    pub receiving_chain_seed: Option<[u8; AES256_SECRET_LENGTH]>,
    pub receiving_chain_index: u32,
    pub previous_sending_chain_length: u32,
    pub nonce_prefix: [u8; crate::constants::NONCE_PREFIX_LENGTH],
    pub nonce_counter: u32,
    pub associated_data: [u8; 64],
}

impl PersistedState {
    /// Packs the state into a flat byte vector: every field is fixed
    /// size except the two `Option<[u8; 32]>` chain seeds, each preceded
    /// by a one-byte presence flag.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.local_ratchet_private);
        out.extend_from_slice(&self.local_ratchet_public);

        match &self.remote_ratchet_public {
            Some(key) => {
                out.push(1);
                out.extend_from_slice(key);
            }
            None => out.push(0),
        }

        out.extend_from_slice(&self.root_key);

        match &self.sending_chain_seed {
            Some(seed) => {
                out.push(1);
                out.extend_from_slice(seed);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.sending_chain_index.to_le_bytes());

        match &self.receiving_chain_seed {
            Some(seed) => {
                out.push(1);
                out.extend_from_slice(seed);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.receiving_chain_index.to_le_bytes());

        out.extend_from_slice(&self.previous_sending_chain_length.to_le_bytes());
        out.extend_from_slice(&self.nonce_prefix);
        out.extend_from_slice(&self.nonce_counter.to_le_bytes());
        out.extend_from_slice(&self.associated_data);
        out
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.to_bytes())
    }

    pub fn from_base64(value: &str) -> CoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(value)
            .map_err(|_| CoreError::Decode("persisted state base64"))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let local_ratchet_private = cursor.take_array::<32>()?;
        let local_ratchet_public = cursor.take_array::<32>()?;

        let remote_ratchet_public = if cursor.take_u8()? == 1 {
            Some(cursor.take_array::<32>()?)
        } else {
            None
        };

        let root_key = cursor.take_array::<32>()?;

        let sending_chain_seed = if cursor.take_u8()? == 1 {
            Some(cursor.take_array::<32>()?)
        } else {
            None
        };
        let sending_chain_index = cursor.take_u32()?;

        let receiving_chain_seed = if cursor.take_u8()? == 1 {
            Some(cursor.take_array::<32>()?)
        } else {
            None
        };
        let receiving_chain_index = cursor.take_u32()?;

        let previous_sending_chain_length = cursor.take_u32()?;
        let nonce_prefix = cursor.take_array::<{ crate::constants::NONCE_PREFIX_LENGTH }>()?;
        let nonce_counter = cursor.take_u32()?;
        let associated_data = cursor.take_array::<64>()?;
        cursor.finish()?;

        Ok(PersistedState {
            local_ratchet_private,
            local_ratchet_public,
            remote_ratchet_public,
            root_key,
            sending_chain_seed,
            sending_chain_index,
            receiving_chain_seed,
            receiving_chain_index,
            previous_sending_chain_length,
            nonce_prefix,
            nonce_counter,
            associated_data,
        })
    }
}

/// A tiny forward-only byte reader, just enough to mirror
/// `PersistedState::to_bytes`'s layout without hand-indexing offsets at
/// every call site the way `utils.rs`'s `array_ref!` based `TryFrom`
/// impls do for fixed-shape structs.
pub(crate) struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn take_array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        if self.bytes.len() < self.pos + N {
            return Err(CoreError::Decode("persisted state truncated"));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub(crate) fn take_u8(&mut self) -> CoreResult<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    pub(crate) fn take_u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.take_array::<4>()?))
    }

    pub(crate) fn finish(self) -> CoreResult<()> {
        if self.pos != self.bytes.len() {
            return Err(CoreError::Decode("persisted state has trailing bytes"));
        }
        Ok(())
    }
}
