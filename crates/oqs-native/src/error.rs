//! Error types for native library resolution, marshaling and handle lifecycle.

use std::path::PathBuf;

use thiserror::Error;

use crate::handle::AlgorithmFamily;
use crate::strategy::StrategyKind;

/// Top-level error for every operation in this crate.
#[derive(Error, Debug)]
pub enum OqsNativeError {
    /// No load strategy produced a native library.
    #[error(transparent)]
    Load(#[from] LibraryLoadError),

    /// Caller input violated a precondition before any native call was made.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The native library returned a failure for a well-formed call.
    #[error(transparent)]
    Native(#[from] NativeError),

    /// An operation was attempted on a disposed handle.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// A required entry point is missing from the loaded library.
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    /// Path configuration could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One line of diagnostics produced by a load strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadAttempt {
    /// Which strategy produced this record.
    pub strategy: StrategyKind,
    /// What the strategy tried and why it did not succeed.
    pub detail: String,
}

/// Every strategy in the chain failed.
///
/// The attempts are kept in chain order so the message alone is enough to fix
/// a deployment without re-running with extra logging.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unable to load native liboqs library; tried:{}", render_attempts(.attempts))]
pub struct LibraryLoadError {
    /// Strategy reports in precedence order.
    pub attempts: Vec<LoadAttempt>,
}

impl LibraryLoadError {
    /// Strategies that were evaluated, in order.
    pub fn strategies(&self) -> impl Iterator<Item = StrategyKind> + '_ {
        self.attempts.iter().map(|a| a.strategy)
    }
}

fn render_attempts(attempts: &[LoadAttempt]) -> String {
    let mut out = String::new();
    for (n, attempt) in attempts.iter().enumerate() {
        out.push_str(&format!(
            "\n  {}. {}: {}",
            n.saturating_add(1),
            attempt.strategy,
            attempt.detail
        ));
    }
    out
}

/// Caller-supplied input rejected before crossing the boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Zero-length buffer passed where native memory must be allocated.
    #[error("buffer is empty; native buffers must hold at least one byte")]
    EmptyBuffer,

    /// Buffer length above the hard ceiling.
    #[error("buffer length {len} exceeds the maximum of {max} bytes")]
    BufferTooLarge {
        /// Supplied length.
        len: usize,
        /// Ceiling.
        max: usize,
    },

    /// Null native pointer.
    #[error("native pointer is null")]
    NullPointer,

    /// Input length does not match what the native algorithm expects.
    #[error("{field} has length {actual}, expected {expected}")]
    LengthMismatch {
        /// Which input was wrong.
        field: &'static str,
        /// Length the algorithm requires.
        expected: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Algorithm name rejected by the allow-list.
    #[error("invalid algorithm name {name:?}: {reason}")]
    InvalidAlgorithmName {
        /// Offending name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// The native library reported failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NativeError {
    /// `*_new` returned null: unknown name, or disabled in this native build.
    #[error("{family} algorithm {algorithm:?} is not available in the loaded liboqs build")]
    AlgorithmUnavailable {
        /// KEM or signature.
        family: AlgorithmFamily,
        /// Requested name.
        algorithm: String,
    },

    /// The native allocator could not provide a buffer.
    #[error("native allocation of {len} bytes failed")]
    AllocationFailed {
        /// Requested size.
        len: usize,
    },

    /// A native operation returned a non-success status.
    #[error("{operation} failed for {algorithm}: native status {status}")]
    OperationFailed {
        /// Algorithm the context was created for.
        algorithm: String,
        /// Native entry point name.
        operation: &'static str,
        /// Status code returned by liboqs.
        status: i32,
    },
}

/// Operation attempted on a handle whose native context is gone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// `dispose()` already ran.
    #[error("{family} handle for {algorithm} has been disposed")]
    Disposed {
        /// KEM or signature.
        family: AlgorithmFamily,
        /// Algorithm name the handle was created for.
        algorithm: String,
    },
}

/// Symbol binding failure.
#[derive(Error, Debug)]
pub enum SymbolError {
    /// An exported function could not be resolved.
    #[error("symbol {symbol} not found in native library: {reason}")]
    Missing {
        /// Exported symbol name.
        symbol: &'static str,
        /// Loader-provided reason.
        reason: String,
    },
}

/// Configuration loading failure.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read path configuration {path}: {source}")]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration is not valid JSON for a path table.
    #[error("invalid path configuration: {0}")]
    Json(#[from] serde_json::Error),
}
