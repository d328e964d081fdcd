//! Fixed-size buffers with guaranteed zeroization (`spec.md` §4.1).
//!
//! The teacher never names this concern as its own component — it gets the
//! guarantee for free by deriving `Zeroize, ZeroizeOnDrop` on every secret
//! newtype (`PrivateKey`, `SharedSecret`, `EncryptionKey`, `DecryptionKey`
//! in `utils.rs`). `SecureBuffer<N>` generalizes that precedent into one
//! reusable type so every component — identity keys, chain steps, the
//! skipped-key cache — can hold "a secret of length N" without hand-rolling
//! a zeroizing newtype each time.
//!
//! No OS-level memory locking (`mlock`/`VirtualLock`) is performed: nothing
//! in the retrieved corpus binds to a crate that does this (see
//! `SPEC_FULL.md` §5.1), so adding one here would be a fabricated
//! dependency. Zeroization on every exit path is the guarantee this module
//! actually provides.

use crate::error::{CoreError, CoreResult};
use zeroize::Zeroize;

/// A fixed-length, exclusively-owned secret buffer. Non-`Clone`: handles are
/// move-only, matching `spec.md`'s "ownership is exclusive; handles are
/// non-copyable".
pub struct SecureBuffer<const N: usize> {
    bytes: [u8; N],
    disposed: bool,
}

impl<const N: usize> SecureBuffer<N> {
    /// Allocates a zero-filled buffer of length `N`.
    pub fn allocate() -> Self {
        Self {
            bytes: [0u8; N],
            disposed: false,
        }
    }

    /// Allocates a buffer initialized from `src`. The caller's copy is not
    /// touched by this call; wipe it yourself if it was transient.
    pub fn from_bytes(src: [u8; N]) -> Self {
        Self {
            bytes: src,
            disposed: false,
        }
    }

    /// Overwrites the buffer's contents. Fails (and leaves the buffer
    /// zeroed) if `src.len() != N`.
    pub fn write(&mut self, src: &[u8]) -> CoreResult<()> {
        if self.disposed {
            return Err(CoreError::ObjectDisposed);
        }
        if src.len() != N {
            self.bytes.zeroize();
            return Err(CoreError::InvalidInput("buffer write length mismatch"));
        }
        self.bytes.copy_from_slice(src);
        Ok(())
    }

    /// Returns an owned copy of the buffer's bytes. The caller becomes
    /// responsible for wiping it when done.
    pub fn read_bytes(&self) -> CoreResult<[u8; N]> {
        if self.disposed {
            return Err(CoreError::ObjectDisposed);
        }
        Ok(self.bytes)
    }

    /// Loans a read-only view to `f` without copying the buffer out.
    pub fn with_read_access<R>(&self, f: impl FnOnce(&[u8; N]) -> R) -> CoreResult<R> {
        if self.disposed {
            return Err(CoreError::ObjectDisposed);
        }
        Ok(f(&self.bytes))
    }

    /// Zeroizes and marks the buffer disposed. Idempotent.
    pub fn dispose(&mut self) {
        self.bytes.zeroize();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl<const N: usize> Drop for SecureBuffer<N> {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Allocates `K` same-sized secure buffers, invokes `f`, and guarantees
/// zeroization of every buffer on every exit path (the consolidated
/// "scoped" cleanup idiom `spec.md` §9 calls for, in place of the
/// teacher's scattered try/finally wiping).
pub fn scoped_buffers<const N: usize, const K: usize, R>(
    f: impl FnOnce(&mut [SecureBuffer<N>; K]) -> R,
) -> R {
    let mut buffers: [SecureBuffer<N>; K] = std::array::from_fn(|_| SecureBuffer::allocate());
    let result = f(&mut buffers);
    for buf in &mut buffers {
        buf.dispose();
    }
    result
}

/// A scoped pool of transient, same-sized working buffers for operations
/// (e.g. X3DH's DH concatenation) that need a handful of short-lived byte
/// arrays that must never leak key material onto the general-purpose heap
/// for longer than the operation runs. Cleared unconditionally on return.
pub struct ScopedArrayPool<const N: usize> {
    slots: Vec<[u8; N]>,
}

impl<const N: usize> ScopedArrayPool<N> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            slots: vec![[0u8; N]; n],
        }
    }

    pub fn slot_mut(&mut self, idx: usize) -> CoreResult<&mut [u8; N]> {
        self.slots
            .get_mut(idx)
            .ok_or(CoreError::InvalidInput("pool slot index out of range"))
    }
}

impl<const N: usize> Drop for ScopedArrayPool<N> {
    fn drop(&mut self) {
        for slot in &mut self.slots {
            slot.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = SecureBuffer::<32>::allocate();
        buf.write(&[7u8; 32]).unwrap();
        assert_eq!(buf.read_bytes().unwrap(), [7u8; 32]);
    }

    #[test]
    fn write_length_mismatch_leaves_buffer_zero() {
        let mut buf = SecureBuffer::<32>::allocate();
        buf.write(&[1u8; 16]).unwrap_err();
        assert_eq!(buf.read_bytes().unwrap(), [0u8; 32]);
    }

    #[test]
    fn dispose_then_read_fails() {
        let mut buf = SecureBuffer::<32>::allocate();
        buf.write(&[9u8; 32]).unwrap();
        buf.dispose();
        assert!(buf.read_bytes().is_err());
        assert!(buf.is_disposed());
    }

    #[test]
    fn scoped_buffers_zeroizes_on_every_path() {
        let out = scoped_buffers::<32, 2, _>(|bufs| {
            bufs[0].write(&[1u8; 32]).unwrap();
            bufs[1].write(&[2u8; 32]).unwrap();
            bufs[0].read_bytes().unwrap()[0]
        });
        assert_eq!(out, 1);
    }

    #[test]
    fn array_pool_clears_on_drop() {
        // `Drop` zeroizes each slot in place before the pool's backing
        // `Vec` is freed; call that same step directly and assert on the
        // still-live allocation instead of reading memory after it drops.
        let mut pool = ScopedArrayPool::<16>::with_capacity(1);
        let slot = pool.slot_mut(0).unwrap();
        slot.copy_from_slice(&[0xAAu8; 16]);
        slot.zeroize();
        assert_eq!(*pool.slot_mut(0).unwrap(), [0u8; 16]);
    }
}
