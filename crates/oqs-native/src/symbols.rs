//! The fixed table of liboqs entry points.
//!
//! Entry points are resolved once per loaded library by their exported names.
//! Nothing reads function pointers out of native structs.

use std::ffi::{c_char, c_int, c_void};
use std::fmt;
use std::sync::Arc;

use crate::error::{OqsNativeError, SymbolError};
use crate::library::NativeLibrary;
use crate::loader::{LoadOptions, Loader};

/// `OQS_SUCCESS`.
pub const OQS_SUCCESS: c_int = 0;

/// `OQS_KEM *OQS_KEM_new(const char *method_name)` and the `OQS_SIG` twin.
pub type NewContextFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;
/// `void OQS_KEM_free(OQS_KEM *)` and the `OQS_SIG` twin.
pub type FreeContextFn = unsafe extern "C" fn(*mut c_void);
/// `OQS_KEM_keypair(kem, public_key, secret_key)`.
pub type KemKeypairFn = unsafe extern "C" fn(*const c_void, *mut u8, *mut u8) -> c_int;
/// `OQS_KEM_encaps(kem, ciphertext, shared_secret, public_key)`.
pub type KemEncapsFn = unsafe extern "C" fn(*const c_void, *mut u8, *mut u8, *const u8) -> c_int;
/// `OQS_KEM_decaps(kem, shared_secret, ciphertext, secret_key)`.
pub type KemDecapsFn =
    unsafe extern "C" fn(*const c_void, *mut u8, *const u8, *const u8) -> c_int;

/// Raw entry points.
#[derive(Clone, Copy)]
pub struct RawOqsFunctions {
    /// `OQS_KEM_new`.
    pub kem_new: NewContextFn,
    /// `OQS_KEM_free`.
    pub kem_free: FreeContextFn,
    /// `OQS_KEM_keypair`.
    pub kem_keypair: KemKeypairFn,
    /// `OQS_KEM_encaps`.
    pub kem_encaps: KemEncapsFn,
    /// `OQS_KEM_decaps`.
    pub kem_decaps: KemDecapsFn,
    /// `OQS_SIG_new`.
    pub sig_new: NewContextFn,
    /// `OQS_SIG_free`.
    pub sig_free: FreeContextFn,
}

/// Entry points bound to one loaded library, which they keep alive.
pub struct OqsFunctions {
    raw: RawOqsFunctions,
    _library: Option<NativeLibrary>,
}

impl OqsFunctions {
    /// Resolve every entry point in `library`.
    ///
    /// # Errors
    ///
    /// [`SymbolError::Missing`] naming the first symbol that cannot be found.
    pub fn bind(library: &NativeLibrary) -> Result<Self, SymbolError> {
        let raw = RawOqsFunctions {
            kem_new: resolve(library, "OQS_KEM_new")?,
            kem_free: resolve(library, "OQS_KEM_free")?,
            kem_keypair: resolve(library, "OQS_KEM_keypair")?,
            kem_encaps: resolve(library, "OQS_KEM_encaps")?,
            kem_decaps: resolve(library, "OQS_KEM_decaps")?,
            sig_new: resolve(library, "OQS_SIG_new")?,
            sig_free: resolve(library, "OQS_SIG_free")?,
        };
        tracing::debug!(origin = %library.origin(), "liboqs entry points bound");
        Ok(Self {
            raw,
            _library: Some(library.clone()),
        })
    }

    /// Load the library through `loader` and bind it.
    ///
    /// # Errors
    ///
    /// [`OqsNativeError::Load`] or [`OqsNativeError::Symbol`].
    pub fn load_with(loader: &Loader, options: &LoadOptions) -> Result<Arc<Self>, OqsNativeError> {
        let library = loader.load(options)?;
        Ok(Arc::new(Self::bind(&library)?))
    }

    /// [`OqsFunctions::load_with`] on the global loader.
    pub fn load(options: &LoadOptions) -> Result<Arc<Self>, OqsNativeError> {
        Self::load_with(Loader::global(), options)
    }

    /// Build a table from pointers obtained elsewhere (static linking, test doubles).
    ///
    /// # Safety
    ///
    /// Every pointer must behave as the liboqs function of the same name and
    /// stay callable for the lifetime of the table.
    pub unsafe fn from_raw(raw: RawOqsFunctions) -> Self {
        Self {
            raw,
            _library: None,
        }
    }

    pub(crate) fn raw(&self) -> &RawOqsFunctions {
        &self.raw
    }
}

impl fmt::Debug for OqsFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OqsFunctions")
            .field("library", &self._library)
            .finish_non_exhaustive()
    }
}

fn resolve<T: Copy>(library: &NativeLibrary, name: &'static str) -> Result<T, SymbolError> {
    // SAFETY: each call site pairs `name` with the prototype liboqs declares
    // for it in its public headers.
    let symbol = unsafe { library.library().get::<T>(name.as_bytes()) }.map_err(|e| {
        SymbolError::Missing {
            symbol: name,
            reason: e.to_string(),
        }
    })?;
    Ok(*symbol)
}
