//! Runtime loading of the native liboqs library, with safe marshaling and
//! deterministic release of native algorithm contexts.
//!
//! This crate provides:
//! - An eight-step, fixed-precedence strategy chain that locates liboqs for
//!   the current OS and architecture, with a process-wide single-slot cache
//! - A per-platform [`PathConfiguration`] that deployments can ship as JSON
//! - A fixed table of liboqs entry points bound once per loaded library
//! - Copy-on-cross byte marshaling with size ceilings and chunked copies
//! - Single-owner native handles that free their context exactly once
//!
//! # Resolution order
//!
//! | # | Strategy | Source |
//! |---|----------|--------|
//! | 1 | explicit path | [`LoadOptions::explicit_path`] |
//! | 2 | configured paths | [`Loader::set_path_configuration`] |
//! | 3 | legacy explicit path | [`Loader::set_legacy_path`] |
//! | 4 | environment variable | `LIBOQS_PATH` by default |
//! | 5 | extracted release root | [`LoadOptions::extracted_root`] |
//! | 6 | package-relative search | `bin/`, `lib/`, `lib/native/`, `native/`, `blobs/` |
//! | 7 | bare system lookup | OS loader search path |
//! | 8 | legacy default layout | `native/<os>-<arch>/` |
//!
//! On iOS liboqs is linked statically and every strategy resolves to the
//! current process image.
//!
//! # Example
//!
//! ```rust,no_run
//! use oqs_native::{Kem, LoadOptions, OqsFunctions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let functions = OqsFunctions::load(&LoadOptions::default())?;
//!
//!     let mut kem = Kem::new(functions, "ML-KEM-768")?;
//!     let keys = kem.keypair()?;
//!     let sent = kem.encapsulate(&keys.public_key)?;
//!     let received = kem.decapsulate(&sent.ciphertext, &keys.secret_key)?;
//!     assert_eq!(*sent.shared_secret, *received);
//!
//!     kem.dispose();
//!     Ok(())
//! }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod buffer;
pub mod config;
pub mod error;
pub mod handle;
pub mod kem;
pub mod library;
pub mod loader;
pub mod platform;
pub mod prelude;
pub mod strategy;
pub mod symbols;

pub use buffer::{COPY_CHUNK_LEN, MAX_BUFFER_LEN, NativeBuffer, from_native, to_native};
pub use config::{ArchFallback, PathConfiguration};
pub use error::{
    ConfigError, LibraryLoadError, LifecycleError, LoadAttempt, NativeError, OqsNativeError,
    SymbolError, ValidationError,
};
pub use handle::{AlgorithmFamily, NativeAlgorithmHandle, validate_algorithm_name};
pub use kem::{Kem, KemEncapsulation, KemKeypair, KemLengths};
pub use library::{
    HostEnvironment, LibraryOpener, LibraryOrigin, NativeLibrary, SystemHost, SystemOpener,
};
pub use loader::{DEFAULT_ENV_VAR, LoadOptions, Loader, clear_cache, load, set_path_configuration};
pub use platform::{Arch, Os, Platform};
pub use strategy::{LoadStrategy, StrategyKind};
pub use symbols::{OqsFunctions, RawOqsFunctions};

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, OqsNativeError>;
