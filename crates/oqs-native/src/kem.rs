//! Key encapsulation over a native `OQS_KEM` context.

use std::ffi::{c_char, c_int};
use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::buffer::NativeBuffer;
use crate::error::{LifecycleError, NativeError, OqsNativeError, ValidationError};
use crate::handle::{AlgorithmFamily, NativeAlgorithmHandle};
use crate::symbols::{OQS_SUCCESS, OqsFunctions};

/// Leading fields of liboqs' `OQS_KEM` struct.
///
/// These fields have kept their layout across liboqs releases; later fields
/// have not, and are never read.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct OqsKemHeader {
    /// `method_name`.
    pub method_name: *const c_char,
    /// `alg_version`.
    pub alg_version: *const c_char,
    /// `claimed_nist_level`.
    pub claimed_nist_level: u8,
    /// `ind_cca`.
    pub ind_cca: bool,
    /// `length_public_key`.
    pub length_public_key: usize,
    /// `length_secret_key`.
    pub length_secret_key: usize,
    /// `length_ciphertext`.
    pub length_ciphertext: usize,
    /// `length_shared_secret`.
    pub length_shared_secret: usize,
}

/// Buffer sizes reported by the native context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KemLengths {
    /// Public key bytes.
    pub public_key: usize,
    /// Secret key bytes.
    pub secret_key: usize,
    /// Ciphertext bytes.
    pub ciphertext: usize,
    /// Shared secret bytes.
    pub shared_secret: usize,
}

impl From<&OqsKemHeader> for KemLengths {
    fn from(header: &OqsKemHeader) -> Self {
        Self {
            public_key: header.length_public_key,
            secret_key: header.length_secret_key,
            ciphertext: header.length_ciphertext,
            shared_secret: header.length_shared_secret,
        }
    }
}

/// Generated key pair. The secret key is wiped on drop.
pub struct KemKeypair {
    /// Public key.
    pub public_key: Vec<u8>,
    /// Secret key.
    pub secret_key: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KemKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemKeypair")
            .field("public_key_len", &self.public_key.len())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Result of encapsulation. The shared secret is wiped on drop.
pub struct KemEncapsulation {
    /// Ciphertext for the key holder.
    pub ciphertext: Vec<u8>,
    /// Shared secret.
    pub shared_secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KemEncapsulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemEncapsulation")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("shared_secret", &"<redacted>")
            .finish()
    }
}

/// A KEM instance backed by one native context.
#[derive(Debug)]
pub struct Kem {
    handle: NativeAlgorithmHandle,
    lengths: KemLengths,
}

impl Kem {
    /// Create a native context for `name` and read its sizes.
    ///
    /// # Errors
    ///
    /// See [`NativeAlgorithmHandle::create`].
    pub fn new(functions: Arc<OqsFunctions>, name: &str) -> Result<Self, OqsNativeError> {
        let handle = NativeAlgorithmHandle::create(functions, AlgorithmFamily::Kem, name)?;
        let ctx = handle.as_ptr()?;
        // SAFETY: `OQS_KEM_new` returned an `OQS_KEM`, whose leading fields
        // are laid out as `OqsKemHeader`.
        let header = unsafe { ctx.cast::<OqsKemHeader>().as_ptr().read() };
        let lengths = KemLengths::from(&header);
        tracing::debug!(algorithm = name, ?lengths, "KEM context ready");
        Ok(Self { handle, lengths })
    }

    /// Algorithm name.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Disposed`] after disposal.
    pub fn algorithm(&self) -> Result<&str, LifecycleError> {
        self.handle.name()
    }

    /// Buffer sizes.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Disposed`] after disposal.
    pub fn lengths(&self) -> Result<KemLengths, LifecycleError> {
        self.handle.as_ptr()?;
        Ok(self.lengths)
    }

    /// Generate a key pair.
    pub fn keypair(&self) -> Result<KemKeypair, OqsNativeError> {
        let ctx = self.handle.as_ptr()?;
        let mut public_key = NativeBuffer::zeroed(self.lengths.public_key)?;
        let mut secret_key = NativeBuffer::zeroed(self.lengths.secret_key)?;

        let keypair = self.handle.functions().raw().kem_keypair;
        // SAFETY: `ctx` is live; both buffers have the sizes the context reported.
        let status =
            unsafe { keypair(ctx.as_ptr(), public_key.as_mut_ptr(), secret_key.as_mut_ptr()) };
        self.check(status, "OQS_KEM_keypair")?;

        Ok(KemKeypair {
            public_key: public_key.to_vec()?,
            secret_key: Zeroizing::new(secret_key.to_vec()?),
        })
    }

    /// Encapsulate a fresh shared secret to `public_key`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::LengthMismatch`] when `public_key` has the wrong size.
    pub fn encapsulate(&self, public_key: &[u8]) -> Result<KemEncapsulation, OqsNativeError> {
        let ctx = self.handle.as_ptr()?;
        expect_len("public key", public_key, self.lengths.public_key)?;

        let public_key = NativeBuffer::from_bytes(public_key)?;
        let mut ciphertext = NativeBuffer::zeroed(self.lengths.ciphertext)?;
        let mut shared_secret = NativeBuffer::zeroed(self.lengths.shared_secret)?;

        let encaps = self.handle.functions().raw().kem_encaps;
        // SAFETY: `ctx` is live; every buffer has the size the context reported.
        let status = unsafe {
            encaps(
                ctx.as_ptr(),
                ciphertext.as_mut_ptr(),
                shared_secret.as_mut_ptr(),
                public_key.as_ptr(),
            )
        };
        self.check(status, "OQS_KEM_encaps")?;

        Ok(KemEncapsulation {
            ciphertext: ciphertext.to_vec()?,
            shared_secret: Zeroizing::new(shared_secret.to_vec()?),
        })
    }

    /// Recover the shared secret from `ciphertext` with `secret_key`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::LengthMismatch`] when either input has the wrong size.
    pub fn decapsulate(
        &self,
        ciphertext: &[u8],
        secret_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, OqsNativeError> {
        let ctx = self.handle.as_ptr()?;
        expect_len("ciphertext", ciphertext, self.lengths.ciphertext)?;
        expect_len("secret key", secret_key, self.lengths.secret_key)?;

        let ciphertext = NativeBuffer::from_bytes(ciphertext)?;
        let secret_key = NativeBuffer::from_bytes(secret_key)?;
        let mut shared_secret = NativeBuffer::zeroed(self.lengths.shared_secret)?;

        let decaps = self.handle.functions().raw().kem_decaps;
        // SAFETY: `ctx` is live; every buffer has the size the context reported.
        let status = unsafe {
            decaps(
                ctx.as_ptr(),
                shared_secret.as_mut_ptr(),
                ciphertext.as_ptr(),
                secret_key.as_ptr(),
            )
        };
        self.check(status, "OQS_KEM_decaps")?;

        Ok(Zeroizing::new(shared_secret.to_vec()?))
    }

    /// Free the native context. Later calls are no-ops.
    pub fn dispose(&mut self) {
        self.handle.dispose();
    }

    /// Whether the context has been freed.
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    fn check(&self, status: c_int, operation: &'static str) -> Result<(), NativeError> {
        if status == OQS_SUCCESS {
            return Ok(());
        }
        tracing::debug!(operation, status, "native KEM operation failed");
        Err(NativeError::OperationFailed {
            algorithm: self.handle.name().unwrap_or_default().to_string(),
            operation,
            status,
        })
    }
}

fn expect_len(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), ValidationError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(ValidationError::LengthMismatch {
            field,
            expected,
            actual: bytes.len(),
        })
    }
}
