//! Strategy-chain orchestration and the single-slot library cache.
//!
//! A [`Loader`] owns three pieces of mutable state: the registered
//! [`PathConfiguration`], the deprecated legacy path, and the cached
//! [`NativeLibrary`]. Changing either path source drops the cache; so does
//! [`Loader::clear_cache`]. Applications normally share [`Loader::global`];
//! tests build their own loader around a scripted host.
//!
//! Concurrent first loads may each run the chain. Opening the same image twice
//! is harmless and the last cache write wins. Callers that need exactly one
//! load serialize their first call. A load that started before the cache was
//! invalidated returns its library but never stores it.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::config::PathConfiguration;
use crate::error::{LibraryLoadError, LoadAttempt};
use crate::library::{HostEnvironment, LibraryOpener, NativeLibrary, SystemHost, SystemOpener};
use crate::strategy::{LoadStrategy, StrategyContext};

/// Default name of the environment variable holding a library path.
pub const DEFAULT_ENV_VAR: &str = "LIBOQS_PATH";

/// Per-call inputs to [`Loader::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Path tried before anything else.
    pub explicit_path: Option<PathBuf>,
    /// Read from and write to the cache.
    pub use_cache: bool,
    /// Environment variable consulted by the environment strategy.
    pub env_var_name: String,
    /// Root of an unpacked release archive.
    pub extracted_root: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            explicit_path: None,
            use_cache: true,
            env_var_name: DEFAULT_ENV_VAR.to_string(),
            extracted_root: None,
        }
    }
}

impl LoadOptions {
    /// Defaults: cache on, `LIBOQS_PATH`, no explicit path or release root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try `path` first.
    #[must_use]
    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// Enable or bypass the cache.
    #[must_use]
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// Read the library path from a different environment variable.
    #[must_use]
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var_name = name.into();
        self
    }

    /// Search an unpacked release rooted at `root`.
    #[must_use]
    pub fn with_extracted_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extracted_root = Some(root.into());
        self
    }
}

#[derive(Default)]
struct LoaderState {
    config: Option<Arc<PathConfiguration>>,
    legacy_path: Option<PathBuf>,
    cached: Option<NativeLibrary>,
    /// Bumped whenever the cache is invalidated.
    generation: u64,
}

impl LoaderState {
    fn invalidate(&mut self) {
        self.cached = None;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Resolves and caches the native library.
pub struct Loader {
    state: RwLock<LoaderState>,
    host: Arc<dyn HostEnvironment>,
    opener: Arc<dyn LibraryOpener>,
}

impl Loader {
    /// A loader over the real host and OS loader.
    pub fn new() -> Self {
        Self::with_host(Arc::new(SystemHost), Arc::new(SystemOpener))
    }

    /// A loader over a custom host and opener.
    pub fn with_host(host: Arc<dyn HostEnvironment>, opener: Arc<dyn LibraryOpener>) -> Self {
        Self {
            state: RwLock::new(LoaderState::default()),
            host,
            opener,
        }
    }

    /// The process-wide loader.
    pub fn global() -> &'static Loader {
        static GLOBAL: OnceLock<Loader> = OnceLock::new();
        GLOBAL.get_or_init(Loader::new)
    }

    /// Resolve the native library.
    ///
    /// With `use_cache`, a cached library is returned without running any
    /// strategy, and a fresh success is stored. Otherwise the eight strategies
    /// run in precedence order until one succeeds.
    ///
    /// # Errors
    ///
    /// [`LibraryLoadError`] listing every strategy's attempt, in order, when
    /// none succeeds.
    pub fn load(&self, options: &LoadOptions) -> Result<NativeLibrary, LibraryLoadError> {
        if options.use_cache {
            if let Some(library) = self.state.read().cached.clone() {
                tracing::debug!(origin = %library.origin(), "native library cache hit");
                return Ok(library);
            }
        }

        let (chain, generation) = {
            let state = self.state.read();
            let chain = build_chain(options, state.config.clone(), state.legacy_path.clone());
            (chain, state.generation)
        };
        let library = self.run_chain(&chain)?;

        if options.use_cache {
            let mut state = self.state.write();
            if state.generation == generation {
                state.cached = Some(library.clone());
            } else {
                tracing::debug!(
                    origin = %library.origin(),
                    "cache invalidated during load; result not cached"
                );
            }
        }
        Ok(library)
    }

    fn run_chain(&self, chain: &[LoadStrategy]) -> Result<NativeLibrary, LibraryLoadError> {
        let ctx = StrategyContext {
            platform: self.host.platform(),
            host: self.host.as_ref(),
            opener: self.opener.as_ref(),
        };
        let mut attempts = Vec::with_capacity(chain.len());

        for strategy in chain {
            let outcome = strategy.attempt(&ctx);
            match outcome.library {
                Some(library) => {
                    tracing::info!(
                        strategy = %strategy.kind(),
                        origin = %library.origin(),
                        platform = %ctx.platform,
                        "native library loaded"
                    );
                    return Ok(library);
                }
                None => {
                    tracing::debug!(
                        strategy = %strategy.describe(),
                        detail = %outcome.detail,
                        "load strategy did not succeed"
                    );
                    attempts.push(LoadAttempt {
                        strategy: strategy.kind(),
                        detail: outcome.detail,
                    });
                }
            }
        }

        tracing::warn!(
            platform = %ctx.platform,
            attempts = attempts.len(),
            "no load strategy produced the native library"
        );
        Err(LibraryLoadError { attempts })
    }

    /// Drop the cached library; the next [`Loader::load`] reruns the chain.
    pub fn clear_cache(&self) {
        let mut state = self.state.write();
        let had_library = state.cached.is_some();
        state.invalidate();
        if had_library {
            tracing::debug!("native library cache cleared");
        }
    }

    /// Whether a library is cached.
    pub fn is_cached(&self) -> bool {
        self.state.read().cached.is_some()
    }

    /// Register (or remove) the per-platform configuration. Clears the cache.
    pub fn set_path_configuration(&self, config: Option<PathConfiguration>) {
        let mut state = self.state.write();
        state.config = config.map(Arc::new);
        state.invalidate();
        tracing::debug!(
            configured = state.config.is_some(),
            "path configuration replaced; cache cleared"
        );
    }

    /// The registered configuration.
    pub fn path_configuration(&self) -> Option<Arc<PathConfiguration>> {
        self.state.read().config.clone()
    }

    /// Set the deprecated single global path. Clears the cache.
    ///
    /// Kept for old deployments; new code registers a [`PathConfiguration`].
    pub fn set_legacy_path(&self, path: Option<PathBuf>) {
        let mut state = self.state.write();
        state.legacy_path = path;
        state.invalidate();
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Loader")
            .field("configured", &state.config.is_some())
            .field("legacy_path", &state.legacy_path)
            .field("cached", &state.cached)
            .finish_non_exhaustive()
    }
}

/// The full chain for one call, in precedence order.
pub fn build_chain(
    options: &LoadOptions,
    config: Option<Arc<PathConfiguration>>,
    legacy_path: Option<PathBuf>,
) -> Vec<LoadStrategy> {
    vec![
        LoadStrategy::ExplicitPath(options.explicit_path.clone()),
        LoadStrategy::ConfiguredPaths(config),
        LoadStrategy::LegacyExplicitPath(legacy_path),
        LoadStrategy::EnvironmentVariable(options.env_var_name.clone()),
        LoadStrategy::ExtractedReleaseRoot(options.extracted_root.clone()),
        LoadStrategy::PackageRelativeSearch,
        LoadStrategy::BareSystemLookup,
        LoadStrategy::LegacyDefaultLayout,
    ]
}

/// [`Loader::load`] on the global loader.
pub fn load(options: &LoadOptions) -> Result<NativeLibrary, LibraryLoadError> {
    Loader::global().load(options)
}

/// [`Loader::clear_cache`] on the global loader.
pub fn clear_cache() {
    Loader::global().clear_cache();
}

/// [`Loader::set_path_configuration`] on the global loader.
pub fn set_path_configuration(config: Option<PathConfiguration>) {
    Loader::global().set_path_configuration(config);
}
