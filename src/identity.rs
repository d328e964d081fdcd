//! Identity keys and the X3DH handshake (`spec.md` §4.3 and §4.4).
//!
//! `IdentityKeySet` generalizes the teacher's free-standing
//! `generate_prekey_bundle`/`generate_prekey_bundle_with_otpk` functions
//! (`x3dh.rs`) into a struct that owns its signed pre-key and one-time
//! pre-keys across their lifetime instead of handing back a loose tuple of
//! private keys for the caller to track. The DH1–DH4 computation and the
//! `0xFF`-prefixed HKDF step are carried over unchanged from
//! `x3dh::process_prekey_bundle`/`process_initial_message`.

use crate::constants::{
    CURVE25519_PUBLIC_LENGTH, CURVE25519_SECRET_LENGTH, SIGNATURE_LENGTH, TAG_MASTER_ED25519_SEED,
    TAG_MASTER_OTPK_SEED, TAG_MASTER_SPK_SEED, X3DH_DOMAIN_SEPARATION_PREFIX,
};
use crate::error::{CoreError, CoreResult};
use crate::primitives::{hkdf_expand, verify_signature, PrivateKey, PublicKey, Signature};
use crate::state::Cursor;
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;

/// The full set of long-term and medium-term keys an identity holds: the
/// identity key pair, the current signed pre-key, and a pool of one-time
/// pre-keys awaiting consumption.
pub struct IdentityKeySet {
    identity_private: PrivateKey,
    identity_public: PublicKey,
    signed_prekey_id: u32,
    signed_prekey_private: PrivateKey,
    signed_prekey_public: PublicKey,
    signed_prekey_signature: Signature,
    one_time_prekeys: HashMap<u32, PrivateKey>,
    next_otpk_id: u32,
    /// Set by [`IdentityKeySet::generate_ephemeral_keypair`] and consumed by
    /// [`x3dh_derive_as_initiator`]; `spec.md` §4.2 names this as part of
    /// the identity's own state rather than a value threaded through the
    /// call by the caller.
    ephemeral: Option<(PrivateKey, PublicKey)>,
}

/// The subset of an `IdentityKeySet` that is safe to publish: identity key,
/// signed pre-key plus its signature, and (optionally) one claimed
/// one-time pre-key. Mirrors the teacher's `PreKeyBundle`, generalized to
/// carry a single selected one-time pre-key with its id rather than the
/// whole pool (the pool itself never leaves the owning identity).
/// Derives `serde::Serialize`/`Deserialize` directly, matching how the
/// teacher publishes a `PreKeyBundle` to its directory server.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct PublicBundle {
    pub identity_key: PublicKey,
    pub signed_prekey_id: u32,
    pub signed_prekey: PublicKey,
    pub signature: Signature,
    pub one_time_prekey: Option<(u32, PublicKey)>,
}

/// Output of running X3DH from either role: the 32-byte root key input to
/// the Double Ratchet, plus the data both ends need bound into the
/// session's associated data.
pub struct X3dhOutput {
    pub root_key: [u8; 32],
    pub remote_identity: PublicKey,
}

impl IdentityKeySet {
    /// Generates a fresh identity key, signed pre-key, and `n_otpk`
    /// one-time pre-keys, all drawn from the OS CSPRNG.
    pub fn create(n_otpk: u32) -> Self {
        let identity_private = PrivateKey::generate();
        let identity_public = identity_private.public_key();
        let signed_prekey_private = PrivateKey::generate();
        let signed_prekey_public = signed_prekey_private.public_key();
        let signed_prekey_signature = identity_private.sign(&signed_prekey_public.0);

        let mut set = Self {
            identity_private,
            identity_public,
            signed_prekey_id: 0,
            signed_prekey_private,
            signed_prekey_public,
            signed_prekey_signature,
            one_time_prekeys: HashMap::new(),
            next_otpk_id: 0,
            ephemeral: None,
        };
        set.add_one_time_prekeys(n_otpk);
        set.signed_prekey_id = loop {
            let candidate = OsRng.next_u32();
            if !set.one_time_prekeys.contains_key(&candidate) {
                break candidate;
            }
        };
        set
    }

    /// Deterministically derives identity, signed pre-key, and `n_otpk`
    /// one-time pre-key seeds from a single 32-byte master secret plus a
    /// caller-chosen device `id`, using distinct HKDF `info` tags per role
    /// so the seeds are independent even though they share one root of
    /// trust. Useful for deriving a device's full key set from a backup
    /// phrase instead of generating and persisting each key separately.
    /// Unlike [`IdentityKeySet::create`], the one-time pre-keys are
    /// themselves derived rather than drawn from the OS CSPRNG, so the
    /// same `(master_key, id, n_otpk)` always reproduces the same bundle.
    pub fn create_from_master_key(master_key: &[u8; 32], id: u32, n_otpk: u32) -> CoreResult<Self> {
        let mut ikm = Vec::with_capacity(36);
        ikm.extend_from_slice(master_key);
        ikm.extend_from_slice(&id.to_le_bytes());

        let identity_seed: [u8; 32] = hkdf_expand(None, &ikm, TAG_MASTER_ED25519_SEED)?;
        let spk_seed: [u8; 32] = hkdf_expand(None, &ikm, TAG_MASTER_SPK_SEED)?;

        let identity_private = PrivateKey::from_bytes(identity_seed);
        let identity_public = identity_private.public_key();
        let signed_prekey_private = PrivateKey::from_bytes(spk_seed);
        let signed_prekey_public = signed_prekey_private.public_key();
        let signed_prekey_signature = identity_private.sign(&signed_prekey_public.0);
        let signed_prekey_id = u32::from_le_bytes(spk_seed[0..4].try_into().unwrap());

        let mut one_time_prekeys = HashMap::with_capacity(n_otpk as usize);
        for i in 0..n_otpk {
            if i == signed_prekey_id {
                return Err(CoreError::KeyGeneration(
                    "derived signed pre-key id collides with a one-time pre-key id",
                ));
            }
            let mut info = Vec::with_capacity(TAG_MASTER_OTPK_SEED.len() + 4);
            info.extend_from_slice(TAG_MASTER_OTPK_SEED);
            info.extend_from_slice(&i.to_le_bytes());
            let otpk_seed: [u8; 32] = hkdf_expand(None, &ikm, &info)?;
            one_time_prekeys.insert(i, PrivateKey::from_bytes(otpk_seed));
        }

        Ok(Self {
            identity_private,
            identity_public,
            signed_prekey_id,
            signed_prekey_private,
            signed_prekey_public,
            signed_prekey_signature,
            one_time_prekeys,
            next_otpk_id: n_otpk,
            ephemeral: None,
        })
    }

    /// Generates a fresh ephemeral X25519 key pair for one X3DH handshake,
    /// storing it on the identity for [`x3dh_derive_as_initiator`] to
    /// consume. Replaces any previously generated but unused ephemeral —
    /// the old key pair is zeroized on drop.
    pub fn generate_ephemeral_keypair(&mut self) -> PublicKey {
        let private = PrivateKey::generate();
        let public = private.public_key();
        self.ephemeral = Some((private, public.clone()));
        public
    }

    pub fn identity_public(&self) -> &PublicKey {
        &self.identity_public
    }

    /// Generates `n` fresh one-time pre-keys with sequentially assigned
    /// ids, returning the new ids. Ids are a monotonic counter rather than
    /// random (the Open Question `spec.md` §9 raises about id collisions
    /// is resolved this way): a counter can never collide with itself, so
    /// the explicit collision check in [`IdentityKeySet::claim_one_time_prekey`]
    /// exists only to guard against a corrupted id arriving from outside.
    pub fn add_one_time_prekeys(&mut self, n: u32) -> Vec<u32> {
        let mut ids = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let id = self.next_otpk_id;
            self.next_otpk_id += 1;
            self.one_time_prekeys.insert(id, PrivateKey::generate());
            ids.push(id);
        }
        ids
    }

    pub fn remaining_one_time_prekeys(&self) -> usize {
        self.one_time_prekeys.len()
    }

    /// Builds a `PublicBundle` for publication, optionally claiming and
    /// removing one one-time pre-key by id. Claiming an id this identity
    /// does not hold is a key-generation-layer error, not a silent no-op:
    /// a caller asking for an id it was never issued indicates a bug on
    /// the publishing side, not a retryable condition.
    pub fn to_public_bundle(&mut self, claim_otpk_id: Option<u32>) -> CoreResult<PublicBundle> {
        let one_time_prekey = match claim_otpk_id {
            Some(id) => {
                let private = self
                    .one_time_prekeys
                    .remove(&id)
                    .ok_or(CoreError::KeyGeneration("one-time pre-key id not found"))?;
                Some((id, private.public_key()))
            }
            None => None,
        };

        Ok(PublicBundle {
            identity_key: self.identity_public.clone(),
            signed_prekey_id: self.signed_prekey_id,
            signed_prekey: self.signed_prekey_public.clone(),
            signature: self.signed_prekey_signature.clone(),
            one_time_prekey,
        })
    }

    /// Removes and returns the one-time pre-key private half matching
    /// `id`, for use by the responder side of X3DH. Returns `None` if the
    /// id was already consumed or never existed — callers must treat a
    /// re-used id as the initiator having raced another session, not as
    /// an error.
    fn take_one_time_prekey(&mut self, id: u32) -> Option<PrivateKey> {
        self.one_time_prekeys.remove(&id)
    }

    pub fn signed_prekey_private(&self) -> &PrivateKey {
        &self.signed_prekey_private
    }

    /// Snapshots this identity's full key material for storage at rest,
    /// following the same manual length-prefixed, base64-at-the-edges
    /// convention as `state::PersistedState` (and for the same reason:
    /// every field here is secret key material a generic derive wouldn't
    /// know to zeroize).
    pub fn to_persisted_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.identity_private.to_bytes());
        out.extend_from_slice(&self.identity_public.0);
        out.extend_from_slice(&self.signed_prekey_id.to_le_bytes());
        out.extend_from_slice(&self.signed_prekey_private.to_bytes());
        out.extend_from_slice(&self.signed_prekey_public.0);
        out.extend_from_slice(&self.signed_prekey_signature.0);
        out.extend_from_slice(&self.next_otpk_id.to_le_bytes());
        out.extend_from_slice(&(self.one_time_prekeys.len() as u32).to_le_bytes());
        let mut ids: Vec<_> = self.one_time_prekeys.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&self.one_time_prekeys[&id].to_bytes());
        }
        out
    }

    pub fn to_persisted_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.to_persisted_bytes())
    }

    pub fn from_persisted_bytes(bytes: &[u8]) -> CoreResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let identity_private = PrivateKey::from_bytes(cursor.take_array::<CURVE25519_SECRET_LENGTH>()?);
        let identity_public = PublicKey::from_bytes(cursor.take_array::<CURVE25519_PUBLIC_LENGTH>()?);
        let signed_prekey_id = cursor.take_u32()?;
        let signed_prekey_private =
            PrivateKey::from_bytes(cursor.take_array::<CURVE25519_SECRET_LENGTH>()?);
        let signed_prekey_public = PublicKey::from_bytes(cursor.take_array::<CURVE25519_PUBLIC_LENGTH>()?);
        let signed_prekey_signature = Signature(cursor.take_array::<SIGNATURE_LENGTH>()?);
        let next_otpk_id = cursor.take_u32()?;
        let otpk_count = cursor.take_u32()?;

        let mut one_time_prekeys = HashMap::with_capacity(otpk_count as usize);
        for _ in 0..otpk_count {
            let id = cursor.take_u32()?;
            let key = PrivateKey::from_bytes(cursor.take_array::<CURVE25519_SECRET_LENGTH>()?);
            one_time_prekeys.insert(id, key);
        }
        cursor.finish()?;

        Ok(Self {
            identity_private,
            identity_public,
            signed_prekey_id,
            signed_prekey_private,
            signed_prekey_public,
            signed_prekey_signature,
            one_time_prekeys,
            next_otpk_id,
            ephemeral: None,
        })
    }

    pub fn from_persisted_base64(value: &str) -> CoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(value)
            .map_err(|_| CoreError::Decode("identity key set base64"))?;
        Self::from_persisted_bytes(&bytes)
    }
}

/// Ed25519-verifies a remote `PublicBundle`'s signed pre-key against its
/// identity key, matching `x3dh::process_prekey_bundle`'s
/// `bundle.verifying_key.verify(&bundle.sig, &bundle.spk.0)` step.
pub fn verify_remote_spk_signature(bundle: &PublicBundle) -> CoreResult<()> {
    verify_signature(&bundle.identity_key, &bundle.signed_prekey.0, &bundle.signature).map_err(|err| {
        log::warn!("identity: remote signed pre-key signature verification failed");
        err
    })
}

/// Combines three or four DH outputs into the X3DH input key material and
/// expands it with HKDF-SHA256 into a single 32-byte root key, mirroring
/// `x3dh::hkdf` but producing one key instead of two — this crate's
/// Double Ratchet derives its initial sending/receiving chains from one
/// root key via [`crate::chain`], rather than receiving them pre-split.
fn x3dh_combine(
    dh1: &crate::primitives::SharedSecret,
    dh2: &crate::primitives::SharedSecret,
    dh3: &crate::primitives::SharedSecret,
    dh4: Option<&crate::primitives::SharedSecret>,
    info: &[u8],
) -> CoreResult<[u8; 32]> {
    if info.is_empty() {
        return Err(CoreError::DeriveKey("x3dh info must be non-empty"));
    }
    let mut ikm = Vec::with_capacity(32 + 32 * 4);
    ikm.extend_from_slice(&X3DH_DOMAIN_SEPARATION_PREFIX);
    ikm.extend_from_slice(dh1.as_bytes());
    ikm.extend_from_slice(dh2.as_bytes());
    ikm.extend_from_slice(dh3.as_bytes());
    if let Some(dh4) = dh4 {
        ikm.extend_from_slice(dh4.as_bytes());
    }
    hkdf_expand(None, &ikm, info)
}

/// Runs X3DH as the initiator against a remote `PublicBundle`, consuming
/// the ephemeral key pair previously stored by
/// [`IdentityKeySet::generate_ephemeral_keypair`]. Returns the derived
/// root key and the caller's fresh ephemeral public key (to be sent to
/// the remote party).
///
/// DH ordering follows the canonical X3DH definition
/// (`DH1 = DH(IK_A, SPK_B)`, `DH2 = DH(EK_A, IK_B)`, `DH3 = DH(EK_A,
/// SPK_B)`, `DH4 = DH(EK_A, OPK_B)`), matching `x3dh::process_prekey_bundle`.
pub fn x3dh_derive_as_initiator(
    local_identity: &mut IdentityKeySet,
    remote: &PublicBundle,
    info: &[u8],
) -> CoreResult<(X3dhOutput, PublicKey)> {
    if info.is_empty() {
        return Err(CoreError::DeriveKey("x3dh info must be non-empty"));
    }
    verify_remote_spk_signature(remote)?;
    remote.identity_key.validate_as_peer_key().map_err(|err| {
        log::warn!("identity: remote identity key failed curve validation");
        err
    })?;
    remote.signed_prekey.validate_as_peer_key().map_err(|err| {
        log::warn!("identity: remote signed pre-key failed curve validation");
        err
    })?;
    if let Some((_, otpk)) = &remote.one_time_prekey {
        otpk.validate_as_peer_key().map_err(|err| {
            log::warn!("identity: remote one-time pre-key failed curve validation");
            err
        })?;
    }

    let (ephemeral_private, ephemeral_public) = local_identity
        .ephemeral
        .take()
        .ok_or(CoreError::PrepareLocal("no ephemeral keypair generated for X3DH initiator"))?;

    let dh1 = local_identity.identity_private.diffie_hellman(&remote.signed_prekey);
    let dh2 = ephemeral_private.diffie_hellman(&remote.identity_key);
    let dh3 = ephemeral_private.diffie_hellman(&remote.signed_prekey);
    let dh4 = remote
        .one_time_prekey
        .as_ref()
        .map(|(_, otpk)| ephemeral_private.diffie_hellman(otpk));

    let root_key = x3dh_combine(&dh1, &dh2, &dh3, dh4.as_ref(), info)?;

    Ok((
        X3dhOutput {
            root_key,
            remote_identity: remote.identity_key.clone(),
        },
        ephemeral_public,
    ))
}

/// Runs X3DH as the responder: consumes the claimed one-time pre-key (if
/// the initiator used one) and reproduces the same root key the initiator
/// derived. Mirrors `x3dh::process_initial_message`'s DH ordering exactly
/// (`DH1 = DH(SPK_B, IK_A)` etc. — the same pairwise products as the
/// initiator side, computed from the other key's perspective).
pub fn x3dh_derive_as_responder(
    local_identity: &mut IdentityKeySet,
    remote_identity_key: &PublicKey,
    remote_ephemeral_key: &PublicKey,
    claimed_otpk_id: Option<u32>,
    info: &[u8],
) -> CoreResult<X3dhOutput> {
    if info.is_empty() {
        return Err(CoreError::DeriveKey("x3dh info must be non-empty"));
    }
    remote_identity_key.validate_as_peer_key()?;
    remote_ephemeral_key.validate_as_peer_key()?;

    let dh1 = local_identity
        .signed_prekey_private
        .diffie_hellman(remote_identity_key);
    let dh2 = local_identity
        .identity_private
        .diffie_hellman(remote_ephemeral_key);
    let dh3 = local_identity
        .signed_prekey_private
        .diffie_hellman(remote_ephemeral_key);

    let dh4 = match claimed_otpk_id {
        Some(id) => {
            let otpk_private = local_identity
                .take_one_time_prekey(id)
                .ok_or(CoreError::Handshake("claimed one-time pre-key unavailable"))?;
            Some(otpk_private.diffie_hellman(remote_ephemeral_key))
        }
        None => None,
    };

    let root_key = x3dh_combine(&dh1, &dh2, &dh3, dh4.as_ref(), info)?;

    Ok(X3dhOutput {
        root_key,
        remote_identity: remote_identity_key.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiator_and_responder_derive_matching_root_key() {
        let mut alice = IdentityKeySet::create(0);
        let mut bob = IdentityKeySet::create(2);

        alice.generate_ephemeral_keypair();
        let bob_bundle = bob.to_public_bundle(Some(0)).unwrap();
        let (alice_out, alice_ephemeral) =
            x3dh_derive_as_initiator(&mut alice, &bob_bundle, b"X3DH v1").unwrap();

        let bob_out = x3dh_derive_as_responder(
            &mut bob,
            alice.identity_public(),
            &alice_ephemeral,
            Some(0),
            b"X3DH v1",
        )
        .unwrap();

        assert_eq!(alice_out.root_key, bob_out.root_key);
        assert_eq!(bob.remaining_one_time_prekeys(), 1);
    }

    #[test]
    fn initiator_and_responder_agree_without_a_used_one_time_prekey() {
        let mut alice = IdentityKeySet::create(0);
        let mut bob = IdentityKeySet::create(0);

        alice.generate_ephemeral_keypair();
        let bob_bundle = bob.to_public_bundle(None).unwrap();
        let (alice_out, alice_ephemeral) =
            x3dh_derive_as_initiator(&mut alice, &bob_bundle, b"X3DH v1").unwrap();

        let bob_out = x3dh_derive_as_responder(
            &mut bob,
            alice.identity_public(),
            &alice_ephemeral,
            None,
            b"X3DH v1",
        )
        .unwrap();

        assert_eq!(alice_out.root_key, bob_out.root_key);
    }

    #[test]
    fn empty_info_is_rejected_on_both_paths() {
        let mut alice = IdentityKeySet::create(0);
        let mut bob = IdentityKeySet::create(1);
        alice.generate_ephemeral_keypair();
        let bob_bundle = bob.to_public_bundle(Some(0)).unwrap();

        let err = x3dh_derive_as_initiator(&mut alice, &bob_bundle, b"").unwrap_err();
        assert!(matches!(err, CoreError::DeriveKey(_)));

        let mut alice2 = IdentityKeySet::create(0);
        let alice2_ephemeral = alice2.generate_ephemeral_keypair();
        let alice2_identity = alice2.identity_public().clone();
        let err = x3dh_derive_as_responder(&mut bob, &alice2_identity, &alice2_ephemeral, Some(0), b"")
            .unwrap_err();
        assert!(matches!(err, CoreError::DeriveKey(_)));
    }

    #[test]
    fn responder_rejects_already_consumed_otpk() {
        let alice = IdentityKeySet::create(0);
        let mut bob = IdentityKeySet::create(1);
        bob.take_one_time_prekey(0);

        let err = x3dh_derive_as_responder(
            &mut bob,
            alice.identity_public(),
            alice.identity_public(),
            Some(0),
            b"X3DH v1",
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Handshake(_)));
    }

    #[test]
    fn claiming_unknown_otpk_id_is_an_error() {
        let mut bob = IdentityKeySet::create(0);
        let err = bob.to_public_bundle(Some(42)).unwrap_err();
        assert!(matches!(err, CoreError::KeyGeneration(_)));
    }

    #[test]
    fn master_key_derivation_is_deterministic() {
        let master = [7u8; 32];
        let a = IdentityKeySet::create_from_master_key(&master, 0, 3).unwrap();
        let b = IdentityKeySet::create_from_master_key(&master, 0, 3).unwrap();
        assert_eq!(a.identity_public(), b.identity_public());
        assert_eq!(a.signed_prekey_id, b.signed_prekey_id);
        assert_eq!(a.remaining_one_time_prekeys(), 3);
        assert_eq!(b.remaining_one_time_prekeys(), 3);
    }

    #[test]
    fn master_key_derivation_differs_per_device_id() {
        let master = [7u8; 32];
        let a = IdentityKeySet::create_from_master_key(&master, 0, 0).unwrap();
        let b = IdentityKeySet::create_from_master_key(&master, 1, 0).unwrap();
        assert_ne!(a.identity_public(), b.identity_public());
    }

    #[test]
    fn initiator_rejects_bundle_with_all_zero_one_time_prekey() {
        let mut alice = IdentityKeySet::create(0);
        alice.generate_ephemeral_keypair();
        let mut bob = IdentityKeySet::create(1);
        let mut bundle = bob.to_public_bundle(Some(0)).unwrap();
        bundle.one_time_prekey = Some((0, PublicKey::from_bytes([0u8; 32])));

        let err = x3dh_derive_as_initiator(&mut alice, &bundle, b"X3DH v1").unwrap_err();
        assert!(matches!(err, CoreError::PeerPublicKeyInvalid(_)));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let mut bob = IdentityKeySet::create(0);
        let mut bundle = bob.to_public_bundle(None).unwrap();
        bundle.signature = bob.identity_private.sign(b"not the spk");
        assert!(verify_remote_spk_signature(&bundle).is_err());
    }

    #[test]
    fn identity_key_set_round_trips_through_bytes() {
        let mut set = IdentityKeySet::create(3);
        set.add_one_time_prekeys(2);

        let bytes = set.to_persisted_bytes();
        let restored = IdentityKeySet::from_persisted_bytes(&bytes).unwrap();

        assert_eq!(restored.identity_public(), set.identity_public());
        assert_eq!(restored.signed_prekey_id, set.signed_prekey_id);
        assert_eq!(restored.signed_prekey_public, set.signed_prekey_public);
        assert_eq!(restored.next_otpk_id, set.next_otpk_id);
        assert_eq!(restored.one_time_prekeys.len(), set.one_time_prekeys.len());
        for (id, key) in &set.one_time_prekeys {
            assert_eq!(restored.one_time_prekeys[id].to_bytes(), key.to_bytes());
        }
    }

    #[test]
    fn identity_key_set_round_trips_through_base64() {
        let set = IdentityKeySet::create(4);
        let encoded = set.to_persisted_base64();
        let restored = IdentityKeySet::from_persisted_base64(&encoded).unwrap();
        assert_eq!(restored.to_persisted_bytes(), set.to_persisted_bytes());
    }

    #[test]
    fn truncated_identity_bytes_are_rejected() {
        let set = IdentityKeySet::create(0);
        let mut bytes = set.to_persisted_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(IdentityKeySet::from_persisted_bytes(&bytes).is_err());
    }
}
