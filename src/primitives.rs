//! Cryptographic primitives wrapper (`spec.md` §4.2).
//!
//! Generalizes the teacher's `utils.rs` newtypes (`PrivateKey`, `PublicKey`,
//! `SigningKey`, `VerifyingKey`, `Signature`, `SharedSecret`,
//! `EncryptionKey`/`DecryptionKey`) into the smaller set this crate's
//! components actually share: one Curve25519 key pair type doubles as both
//! identity and ephemeral keys, one symmetric `AeadKey` replaces the
//! teacher's split encrypt/decrypt key pair (every AEAD use here is
//! symmetric — a chain's message key both seals and opens), and `hkdf_expand`
//! is pulled out once instead of being re-derived per call site the way
//! `x3dh::hkdf` and `ratchet::hkdf_rk`/`hkdf_ck` each do independently.

use crate::constants::{
    AES256_NONCE_LENGTH, AES256_SECRET_LENGTH, CURVE25519_PUBLIC_LENGTH, CURVE25519_SECRET_LENGTH,
    SHA256_HASH_LENGTH, SIGNATURE_LENGTH,
};
use crate::error::{CoreError, CoreResult};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};
use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::ed25519::signature::SignerMut;
use ed25519_dalek::Verifier;
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::hash::{Hash, Hasher};
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The curve25519 all-zero Montgomery point (the X25519 "identity"
/// point, per RFC 7748 §6.1) and the six other well-known low-order
/// points, in canonical little-endian encoding. A peer public key
/// matching any of these collapses every DH computation with it to a
/// small, attacker-predictable subgroup, defeating the handshake's
/// secrecy entirely — `spec.md` §3's "all X25519 publics are valid
/// curve points (not the small-subgroup set, not all-zero)" invariant.
/// Values taken from the standard libsignal/libsodium small-order table.
const LOW_ORDER_POINTS: [[u8; 32]; 7] = [
    [0u8; 32],
    [
        1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0,
    ],
    [
        0xe0, 0xeb, 0x7a, 0x7c, 0x3b, 0x41, 0xb8, 0xae, 0x16, 0x56, 0xe3, 0xfa, 0xf1, 0x9f, 0xc4,
        0x6a, 0xda, 0x09, 0x8d, 0xeb, 0x9c, 0x32, 0xb1, 0xfd, 0x86, 0x62, 0x05, 0x16, 0x5f, 0x49,
        0xb8, 0x00,
    ],
    [
        0x5f, 0x9c, 0x95, 0xbc, 0xa3, 0x50, 0x8c, 0x24, 0xb1, 0xd0, 0xb1, 0x55, 0x9c, 0x83, 0xef,
        0x5b, 0x04, 0x44, 0x5c, 0xc4, 0x58, 0x1c, 0x8e, 0x86, 0xd8, 0x22, 0x4e, 0xdd, 0xd0, 0x9f,
        0x11, 0x57,
    ],
    [
        0xec, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0x7f,
    ],
    [
        0xed, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff,
    ],
    [
        0xee, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0x7f,
    ],
];

/// A Curve25519 public key: identity key, signed pre-key, one-time
/// pre-key, or ephemeral key all share this representation. Serializes as
/// raw bytes via `serde_bytes`, the same convention the teacher's
/// `FixedArray32` uses for wire-format pre-key bundles.
#[derive(Clone, Debug, Eq, serde::Serialize, serde::Deserialize)]
pub struct PublicKey(#[serde(with = "serde_bytes")] pub [u8; CURVE25519_PUBLIC_LENGTH]);

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for PublicKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl AsRef<[u8; CURVE25519_PUBLIC_LENGTH]> for PublicKey {
    fn as_ref(&self) -> &[u8; CURVE25519_PUBLIC_LENGTH] {
        &self.0
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; CURVE25519_PUBLIC_LENGTH]) -> Self {
        PublicKey(bytes)
    }

    pub fn hash_sha256(&self) -> Sha256Digest {
        let digest = Sha256::digest(self.0);
        Sha256Digest(digest.into())
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_base64(value: &str) -> CoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(value)
            .map_err(|_| CoreError::Decode("public key base64"))?;
        if bytes.len() != CURVE25519_PUBLIC_LENGTH {
            return Err(CoreError::PeerPublicKeyInvalid("wrong length"));
        }
        let mut arr = [0u8; CURVE25519_PUBLIC_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(PublicKey(arr))
    }

    /// Rejects the all-zero identity point and the other well-known
    /// low-order points on the curve (`spec.md` §3: "all X25519 publics
    /// are valid curve points (not the small-subgroup set, not
    /// all-zero)"). Called on every peer-supplied public key before it is
    /// used in a Diffie-Hellman computation — a key generated by
    /// [`PrivateKey::public_key`] can never land in this set, so this
    /// check only ever fires against untrusted input.
    pub fn validate_as_peer_key(&self) -> CoreResult<()> {
        let _ = MontgomeryPoint(self.0);
        if LOW_ORDER_POINTS.iter().any(|p| p == &self.0) {
            return Err(CoreError::PeerPublicKeyInvalid(
                "low-order or identity curve point",
            ));
        }
        Ok(())
    }
}

/// A Curve25519 private key used for X25519 Diffie-Hellman. Also the seed
/// for the Ed25519 signing key derived from the same identity secret
/// (`identity::IdentityKeySet::sign`), matching the teacher's
/// `SigningKey`/`PrivateKey` interconvertibility.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; CURVE25519_SECRET_LENGTH]);

impl PrivateKey {
    pub fn generate() -> Self {
        let key = StaticSecret::random_from_rng(&mut OsRng);
        PrivateKey(key.to_bytes())
    }

    pub fn from_bytes(bytes: [u8; CURVE25519_SECRET_LENGTH]) -> Self {
        PrivateKey(bytes)
    }

    pub fn to_bytes(&self) -> [u8; CURVE25519_SECRET_LENGTH] {
        self.0
    }

    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        let public = x25519_dalek::PublicKey::from(&secret);
        PublicKey(public.to_bytes())
    }

    pub fn diffie_hellman(&self, peer: &PublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.0);
        let peer_public = x25519_dalek::PublicKey::from(peer.0);
        let shared = secret.diffie_hellman(&peer_public);
        SharedSecret(shared.to_bytes())
    }

    /// Derives the Ed25519 signing key sharing this secret's bytes as seed,
    /// mirroring the teacher's `SigningKey::from(&PrivateKey)` conversion.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let mut signing_key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        let sig = signing_key.sign(message);
        Signature(sig.to_bytes())
    }

    pub fn verifying_key(&self) -> PublicKey {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(&self.0);
        let verifying_key = ed25519_dalek::VerifyingKey::from(&signing_key);
        PublicKey(verifying_key.to_bytes())
    }
}

/// Verifies an Ed25519 signature made by [`PrivateKey::sign`] against the
/// corresponding public key bytes.
pub fn verify_signature(public_key: &PublicKey, message: &[u8], signature: &Signature) -> CoreResult<()> {
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&public_key.0)?;
    let dalek_signature = ed25519_dalek::Signature::from(signature.0);
    verifying_key.verify(message, &dalek_signature)?;
    Ok(())
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Signature(#[serde(with = "serde_bytes")] pub [u8; SIGNATURE_LENGTH]);

impl Signature {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    pub fn from_base64(value: &str) -> CoreResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(value)
            .map_err(|_| CoreError::Decode("signature base64"))?;
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(CoreError::Decode("signature wrong length"));
        }
        let mut arr = [0u8; SIGNATURE_LENGTH];
        arr.copy_from_slice(&bytes);
        Ok(Signature(arr))
    }
}

/// The raw output of an X25519 Diffie-Hellman computation. Consumed
/// immediately by an HKDF step; never itself used as an AEAD key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(pub(crate) [u8; CURVE25519_SECRET_LENGTH]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; CURVE25519_SECRET_LENGTH] {
        &self.0
    }
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Sha256Digest(pub [u8; SHA256_HASH_LENGTH]);

/// A symmetric AES-256-GCM key, used both to seal and open messages on a
/// given chain (the teacher keeps separate `EncryptionKey`/`DecryptionKey`
/// types for its asymmetric client/server roles; every key in this crate's
/// ratchet is used for both directions over its lifetime, so one type
/// suffices).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; AES256_SECRET_LENGTH]);

impl AeadKey {
    pub fn from_bytes(bytes: [u8; AES256_SECRET_LENGTH]) -> Self {
        AeadKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; AES256_SECRET_LENGTH] {
        &self.0
    }

    /// Seals `plaintext` under `aad`, returning `nonce || ciphertext`. The
    /// nonce is supplied by the caller (`ratchet::generate_next_nonce`) so
    /// sequential nonces can be derived deterministically per `spec.md` §6
    /// instead of drawn at random per message.
    pub fn seal(&self, nonce: &[u8; AES256_NONCE_LENGTH], plaintext: &[u8], aad: &[u8]) -> CoreResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(&self.0)?;
        let nonce_ref = Nonce::from_slice(nonce);
        let ciphertext = cipher.encrypt(nonce_ref, Payload { msg: plaintext, aad })?;
        let mut out = Vec::with_capacity(AES256_NONCE_LENGTH + ciphertext.len());
        out.extend_from_slice(nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Opens a buffer produced by [`AeadKey::seal`]: `nonce || ciphertext`.
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> CoreResult<Vec<u8>> {
        if sealed.len() < AES256_NONCE_LENGTH {
            return Err(CoreError::InvalidInput("sealed message shorter than nonce"));
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(AES256_NONCE_LENGTH);
        let cipher = Aes256Gcm::new_from_slice(&self.0)?;
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher.decrypt(nonce, Payload { msg: ciphertext, aad })?;
        Ok(plaintext)
    }
}

/// Draws a fresh nonce/prefix directly from the OS CSPRNG, used where the
/// deterministic per-message counter (`ratchet::generate_next_nonce`)
/// doesn't apply — e.g. the X3DH challenge encryption.
pub fn random_nonce() -> [u8; AES256_NONCE_LENGTH] {
    let mut nonce = [0u8; AES256_NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Expands `ikm` with HKDF-SHA256 under `salt` and `info` into exactly
/// `OUT` bytes, generalizing the teacher's three independent HKDF call
/// sites (`x3dh::hkdf`, `ratchet::hkdf_rk`, `ratchet::hkdf_ck`) into one
/// helper.
pub fn hkdf_expand<const OUT: usize>(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> CoreResult<[u8; OUT]> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    let mut out = [0u8; OUT];
    hk.expand(info, &mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffie_hellman_is_symmetric() {
        let a = PrivateKey::generate();
        let b = PrivateKey::generate();
        let shared_a = a.diffie_hellman(&b.public_key());
        let shared_b = b.diffie_hellman(&a.public_key());
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"hello");
        verify_signature(&key.verifying_key(), b"hello", &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let key = PrivateKey::generate();
        let sig = key.sign(b"hello");
        assert!(verify_signature(&key.verifying_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn aead_seal_open_round_trips() {
        let key = AeadKey::from_bytes([3u8; 32]);
        let nonce = [1u8; 12];
        let sealed = key.seal(&nonce, b"payload", b"aad").unwrap();
        let opened = key.open(&sealed, b"aad").unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn aead_open_rejects_wrong_aad() {
        let key = AeadKey::from_bytes([3u8; 32]);
        let nonce = [1u8; 12];
        let sealed = key.seal(&nonce, b"payload", b"aad-a").unwrap();
        assert!(key.open(&sealed, b"aad-b").is_err());
    }

    #[test]
    fn hkdf_expand_is_deterministic() {
        let a: [u8; 32] = hkdf_expand(Some(b"salt"), b"ikm", b"info").unwrap();
        let b: [u8; 32] = hkdf_expand(Some(b"salt"), b"ikm", b"info").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn all_zero_public_key_is_rejected() {
        let key = PublicKey::from_bytes([0u8; 32]);
        assert!(key.validate_as_peer_key().is_err());
    }

    #[test]
    fn freshly_generated_public_key_is_accepted() {
        let key = PrivateKey::generate().public_key();
        key.validate_as_peer_key().unwrap();
    }

    #[test]
    fn public_key_base64_round_trips() {
        let key = PrivateKey::generate().public_key();
        let encoded = key.to_base64();
        let decoded = PublicKey::from_base64(&encoded).unwrap();
        assert_eq!(key, decoded);
    }
}
