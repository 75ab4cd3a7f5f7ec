//! Copy-on-cross byte marshaling between Rust memory and native memory.
//!
//! Nothing here hands out a view of memory owned by the other side. Bytes
//! going in are copied into a fresh native allocation of exactly their length;
//! bytes coming out are copied into a fresh `Vec`. The native side may free or
//! overwrite its buffer as soon as a call returns.

use std::fmt;

use zeroize::Zeroize;

use crate::error::{NativeError, OqsNativeError, ValidationError};

/// Largest buffer that may cross the boundary (100 MiB).
///
/// Catches corrupted or overflowed lengths early; no algorithm comes close.
pub const MAX_BUFFER_LEN: usize = 100 * 1024 * 1024;

/// Granularity of native-to-Rust copies.
pub const COPY_CHUNK_LEN: usize = 4096;

fn check_len(len: usize) -> Result<(), ValidationError> {
    if len == 0 {
        return Err(ValidationError::EmptyBuffer);
    }
    if len > MAX_BUFFER_LEN {
        return Err(ValidationError::BufferTooLarge {
            len,
            max: MAX_BUFFER_LEN,
        });
    }
    Ok(())
}

/// An owned native allocation of a fixed length.
///
/// Released explicitly with [`NativeBuffer::release`] or on drop; the memory
/// is wiped before it goes back to the allocator.
pub struct NativeBuffer {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the allocation is exclusively owned and holds plain bytes; moving
// ownership to another thread is sound.
unsafe impl Send for NativeBuffer {}

impl NativeBuffer {
    /// Allocate `len` zeroed bytes of native memory.
    ///
    /// # Errors
    ///
    /// [`ValidationError`] for a zero or oversized length, [`NativeError`] if
    /// the allocator refuses.
    pub fn zeroed(len: usize) -> Result<Self, OqsNativeError> {
        check_len(len)?;
        // SAFETY: `calloc` with a non-zero size; a null result is handled.
        let raw = unsafe { libc::calloc(len, 1) };
        if raw.is_null() {
            return Err(NativeError::AllocationFailed { len }.into());
        }
        Ok(Self {
            ptr: raw.cast::<u8>(),
            len,
        })
    }

    /// Copy `bytes` into a new native allocation of exactly `bytes.len()`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyBuffer`] or [`ValidationError::BufferTooLarge`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, OqsNativeError> {
        let buffer = Self::zeroed(bytes.len())?;
        // SAFETY: `buffer.ptr` is valid for `bytes.len()` writes and cannot
        // overlap a Rust slice.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.ptr, bytes.len()) };
        Ok(buffer)
    }

    /// Pointer for passing to native input parameters; null once released.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Pointer for passing to native output parameters; null once released.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    /// Allocation length; zero once released.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True only after release.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the memory has been returned to the allocator.
    pub fn is_released(&self) -> bool {
        self.ptr.is_null()
    }

    /// Copy the contents into an independent `Vec`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::NullPointer`] after release.
    pub fn to_vec(&self) -> Result<Vec<u8>, ValidationError> {
        // SAFETY: while not released, `ptr` is a live allocation of `len`
        // bytes owned by `self`; a released buffer has a null `ptr`, which
        // `from_native` rejects before reading.
        unsafe { from_native(self.ptr, self.len) }
    }

    /// Wipe and free the allocation. Further calls do nothing.
    pub fn release(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        // SAFETY: `ptr` is a live allocation of `len` bytes owned by `self`.
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) };
        bytes.zeroize();
        // SAFETY: `ptr` came from `calloc` and has not been freed.
        unsafe { libc::free(self.ptr.cast()) };
        self.ptr = std::ptr::null_mut();
        self.len = 0;
    }
}

impl Drop for NativeBuffer {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuffer")
            .field("len", &self.len)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Copy `bytes` into native memory. See [`NativeBuffer::from_bytes`].
pub fn to_native(bytes: &[u8]) -> Result<NativeBuffer, OqsNativeError> {
    NativeBuffer::from_bytes(bytes)
}

/// Copy `len` bytes at `ptr` into a new `Vec`, [`COPY_CHUNK_LEN`] at a time.
///
/// A zero `len` yields an empty `Vec`.
///
/// # Errors
///
/// [`ValidationError::NullPointer`] for a null `ptr`,
/// [`ValidationError::BufferTooLarge`] above [`MAX_BUFFER_LEN`].
///
/// # Safety
///
/// A non-null `ptr` must be valid for `len` byte reads for the duration of the
/// call.
pub unsafe fn from_native(ptr: *const u8, len: usize) -> Result<Vec<u8>, ValidationError> {
    if ptr.is_null() {
        return Err(ValidationError::NullPointer);
    }
    if len > MAX_BUFFER_LEN {
        return Err(ValidationError::BufferTooLarge {
            len,
            max: MAX_BUFFER_LEN,
        });
    }

    let mut out = Vec::with_capacity(len);
    let mut offset = 0usize;
    while offset < len {
        let chunk = COPY_CHUNK_LEN.min(len.saturating_sub(offset));
        let src = ptr.wrapping_add(offset);
        // SAFETY: `offset + chunk <= len` and the caller guarantees `len`
        // readable bytes at `ptr`.
        let slice = unsafe { std::slice::from_raw_parts(src, chunk) };
        out.extend_from_slice(slice);
        offset = offset.saturating_add(chunk);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes_copies_every_byte() -> Result<(), OqsNativeError> {
        let input: Vec<u8> = (0..=255u8).collect();
        let buffer = NativeBuffer::from_bytes(&input)?;
        assert_eq!(buffer.len(), input.len());
        assert_eq!(buffer.to_vec()?, input);
        Ok(())
    }

    #[test]
    fn test_zeroed_is_zero_filled() -> Result<(), OqsNativeError> {
        let buffer = NativeBuffer::zeroed(64)?;
        assert!(buffer.to_vec()?.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_empty_input_rejected() {
        let result = NativeBuffer::from_bytes(&[]);
        assert!(matches!(
            result,
            Err(OqsNativeError::Validation(ValidationError::EmptyBuffer))
        ));
    }

    #[test]
    fn test_oversized_length_rejected_without_allocating() {
        let result = NativeBuffer::zeroed(MAX_BUFFER_LEN + 1);
        assert!(matches!(
            result,
            Err(OqsNativeError::Validation(ValidationError::BufferTooLarge { len, max }))
                if len == MAX_BUFFER_LEN + 1 && max == MAX_BUFFER_LEN
        ));
    }

    #[test]
    fn test_release_is_idempotent() -> Result<(), OqsNativeError> {
        let mut buffer = NativeBuffer::from_bytes(b"secret")?;
        buffer.release();
        assert!(buffer.is_released());
        assert!(buffer.as_ptr().is_null());
        buffer.release();
        assert!(buffer.is_released());
        assert!(matches!(buffer.to_vec(), Err(ValidationError::NullPointer)));
        Ok(())
    }

    #[test]
    fn test_from_native_null_rejected() {
        // SAFETY: null is rejected before any read.
        let result = unsafe { from_native(std::ptr::null(), 16) };
        assert_eq!(result, Err(ValidationError::NullPointer));
    }

    #[test]
    fn test_from_native_oversized_rejected() {
        let byte = 0u8;
        // SAFETY: the length check fails before any read.
        let result = unsafe { from_native(&byte, MAX_BUFFER_LEN + 1) };
        assert!(matches!(result, Err(ValidationError::BufferTooLarge { .. })));
    }

    #[test]
    fn test_from_native_zero_length_is_empty() {
        let byte = 7u8;
        // SAFETY: zero bytes are read.
        let result = unsafe { from_native(&byte, 0) };
        assert_eq!(result, Ok(Vec::new()));
    }

    #[test]
    fn test_from_native_crosses_chunk_boundaries() {
        let source: Vec<u8> = (0..COPY_CHUNK_LEN * 2 + 17).map(|i| (i % 251) as u8).collect();
        // SAFETY: `source` is valid for its full length.
        let copied = unsafe { from_native(source.as_ptr(), source.len()) };
        assert_eq!(copied.as_deref(), Ok(source.as_slice()));
    }

    #[test]
    fn test_from_native_result_is_independent() -> Result<(), OqsNativeError> {
        let mut buffer = NativeBuffer::from_bytes(&[1, 2, 3])?;
        let copy = buffer.to_vec()?;
        buffer.release();
        assert_eq!(copy, vec![1, 2, 3]);
        Ok(())
    }
}
