//! Ownership and disposal of native algorithm contexts.
//!
//! A [`NativeAlgorithmHandle`] owns exactly one `OQS_KEM` or `OQS_SIG` context.
//! It is either live or disposed; disposal frees the context through the
//! library's own destructor exactly once.
//!
//! Dropping a live handle frees the context as well and logs a warning. That
//! path exists to catch leaks. Secret material held by the native context
//! stays in memory until it runs, so owners call [`NativeAlgorithmHandle::dispose`]
//! as soon as they are done.

use std::ffi::{CString, c_void};
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, NativeError, OqsNativeError, ValidationError};
use crate::symbols::OqsFunctions;

/// Longest accepted algorithm name, in bytes.
pub const MAX_ALGORITHM_NAME_LEN: usize = 64;

/// Kind of native context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmFamily {
    /// Key encapsulation (`OQS_KEM`).
    Kem,
    /// Signature (`OQS_SIG`).
    Signature,
}

impl fmt::Display for AlgorithmFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlgorithmFamily::Kem => "KEM",
            AlgorithmFamily::Signature => "signature",
        })
    }
}

/// Check an algorithm name before it reaches native string parsing.
///
/// Accepts 1 to [`MAX_ALGORITHM_NAME_LEN`] bytes of ASCII letters, digits,
/// `-`, `_`, `+` and `.`.
///
/// ```
/// use oqs_native::handle::validate_algorithm_name;
///
/// assert!(validate_algorithm_name("ML-KEM-768").is_ok());
/// assert!(validate_algorithm_name("SPHINCS+-SHA2-128f-simple").is_ok());
/// assert!(validate_algorithm_name("Kyber512; rm -rf /").is_err());
/// ```
pub fn validate_algorithm_name(name: &str) -> Result<(), ValidationError> {
    let reject = |reason: String| ValidationError::InvalidAlgorithmName {
        name: name.chars().take(MAX_ALGORITHM_NAME_LEN).collect(),
        reason,
    };
    if name.is_empty() {
        return Err(reject("name is empty".to_string()));
    }
    if name.len() > MAX_ALGORITHM_NAME_LEN {
        return Err(reject(format!(
            "name is {} bytes, maximum is {MAX_ALGORITHM_NAME_LEN}",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.')))
    {
        return Err(reject(format!("character {bad:?} is not allowed")));
    }
    Ok(())
}

/// Sole owner of one native algorithm context.
pub struct NativeAlgorithmHandle {
    family: AlgorithmFamily,
    name: String,
    ctx: Option<NonNull<c_void>>,
    functions: Arc<OqsFunctions>,
}

// SAFETY: liboqs contexts may be used from any thread as long as one thread
// at a time touches them. The handle is `!Sync`, and `&mut self` gates
// disposal, so moving it between threads keeps that contract.
unsafe impl Send for NativeAlgorithmHandle {}

impl NativeAlgorithmHandle {
    /// Ask the native library for a context named `name`.
    ///
    /// # Errors
    ///
    /// [`ValidationError::InvalidAlgorithmName`] before any native call;
    /// [`NativeError::AlgorithmUnavailable`] when the library returns null.
    pub fn create(
        functions: Arc<OqsFunctions>,
        family: AlgorithmFamily,
        name: &str,
    ) -> Result<Self, OqsNativeError> {
        validate_algorithm_name(name)?;
        let c_name = CString::new(name).map_err(|_nul| ValidationError::InvalidAlgorithmName {
            name: name.to_string(),
            reason: "contains a NUL byte".to_string(),
        })?;

        let new_context = match family {
            AlgorithmFamily::Kem => functions.raw().kem_new,
            AlgorithmFamily::Signature => functions.raw().sig_new,
        };
        // SAFETY: `c_name` is NUL-terminated and outlives the call.
        let raw = unsafe { new_context(c_name.as_ptr()) };
        let ctx = NonNull::new(raw).ok_or_else(|| NativeError::AlgorithmUnavailable {
            family,
            algorithm: name.to_string(),
        })?;

        tracing::debug!(%family, algorithm = name, "native algorithm context created");
        Ok(Self {
            family,
            name: name.to_string(),
            ctx: Some(ctx),
            functions,
        })
    }

    /// The native context pointer.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Disposed`] after disposal.
    pub fn as_ptr(&self) -> Result<NonNull<c_void>, LifecycleError> {
        self.ctx.ok_or_else(|| self.disposed())
    }

    /// Algorithm name.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Disposed`] after disposal.
    pub fn name(&self) -> Result<&str, LifecycleError> {
        match self.ctx {
            Some(_) => Ok(&self.name),
            None => Err(self.disposed()),
        }
    }

    /// KEM or signature.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::Disposed`] after disposal.
    pub fn family(&self) -> Result<AlgorithmFamily, LifecycleError> {
        match self.ctx {
            Some(_) => Ok(self.family),
            None => Err(self.disposed()),
        }
    }

    /// Whether [`NativeAlgorithmHandle::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.ctx.is_none()
    }

    /// Free the native context. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.free(ctx);
            tracing::debug!(family = %self.family, algorithm = %self.name, "native algorithm context disposed");
        }
    }

    pub(crate) fn functions(&self) -> &OqsFunctions {
        &self.functions
    }

    fn free(&self, ctx: NonNull<c_void>) {
        let free_context = match self.family {
            AlgorithmFamily::Kem => self.functions.raw().kem_free,
            AlgorithmFamily::Signature => self.functions.raw().sig_free,
        };
        // SAFETY: `ctx` came from the matching `*_new` and was taken out of
        // `self.ctx`, so it is freed at most once.
        unsafe { free_context(ctx.as_ptr()) };
    }

    fn disposed(&self) -> LifecycleError {
        LifecycleError::Disposed {
            family: self.family,
            algorithm: self.name.clone(),
        }
    }
}

impl Drop for NativeAlgorithmHandle {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            tracing::warn!(
                family = %self.family,
                algorithm = %self.name,
                "native algorithm handle dropped without dispose(); reclaiming context"
            );
            self.free(ctx);
        }
    }
}

impl fmt::Debug for NativeAlgorithmHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeAlgorithmHandle")
            .field("family", &self.family)
            .field("name", &self.name)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
