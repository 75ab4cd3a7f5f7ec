//! Shared test utilities for oqs-native.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with `#[track_caller]`
//! - [`host`] - A scripted [`HostEnvironment`](oqs_native::HostEnvironment)
//! - [`opener`] - [`LibraryOpener`](oqs_native::LibraryOpener) doubles that record or gate calls
//! - [`toy`] - A counting native function table backed by a toy KEM
//! - [`prelude`] - Convenience re-exports
//!
//! ```rust,ignore
//! use oqs_native_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]

pub mod host;
pub mod must;
pub mod opener;
pub mod prelude;
pub mod toy;

pub use must::*;
