//! Convenience re-exports for common types.

pub use crate::buffer::{NativeBuffer, from_native, to_native};
pub use crate::config::{ArchFallback, PathConfiguration};
pub use crate::error::{
    LibraryLoadError, LifecycleError, NativeError, OqsNativeError, ValidationError,
};
pub use crate::handle::{AlgorithmFamily, NativeAlgorithmHandle};
pub use crate::kem::{Kem, KemEncapsulation, KemKeypair};
pub use crate::library::NativeLibrary;
pub use crate::loader::{LoadOptions, Loader};
pub use crate::platform::Platform;
pub use crate::symbols::OqsFunctions;
