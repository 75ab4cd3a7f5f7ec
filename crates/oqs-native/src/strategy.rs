//! Load strategies.
//!
//! Each variant is one self-contained attempt to obtain the native library
//! from a single source. The variant order in [`StrategyKind::ALL`] is the
//! precedence order; the loader never reorders it.
//!
//! On iOS the native code is linked into the executable, so every strategy
//! that has a candidate location hands back the current process image instead
//! of opening a file. Strategies without inputs are still reported, which keeps
//! the diagnostics list the same length on every platform.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PathConfiguration;
use crate::library::{HostEnvironment, LibraryOpener, NativeLibrary};
use crate::platform::{Arch, Os, Platform};

/// Subdirectories of the working directory probed by
/// [`LoadStrategy::PackageRelativeSearch`], in order.
pub const PACKAGE_RELATIVE_DIRS: &[&str] = &["bin", "lib", "lib/native", "native", "blobs"];

/// Strategy identity, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    /// A path passed directly to `load`.
    ExplicitPath,
    /// The registered [`PathConfiguration`].
    ConfiguredPaths,
    /// The deprecated single global path.
    LegacyExplicitPath,
    /// A path read from an environment variable.
    EnvironmentVariable,
    /// An unpacked release archive.
    ExtractedReleaseRoot,
    /// Conventional directories under the working directory.
    PackageRelativeSearch,
    /// The OS loader's own search.
    BareSystemLookup,
    /// Historical `native/<os>-<arch>/` layout.
    LegacyDefaultLayout,
}

impl StrategyKind {
    /// All strategies in precedence order.
    pub const ALL: [StrategyKind; 8] = [
        StrategyKind::ExplicitPath,
        StrategyKind::ConfiguredPaths,
        StrategyKind::LegacyExplicitPath,
        StrategyKind::EnvironmentVariable,
        StrategyKind::ExtractedReleaseRoot,
        StrategyKind::PackageRelativeSearch,
        StrategyKind::BareSystemLookup,
        StrategyKind::LegacyDefaultLayout,
    ];

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            StrategyKind::ExplicitPath => "explicit path",
            StrategyKind::ConfiguredPaths => "configured paths",
            StrategyKind::LegacyExplicitPath => "legacy explicit path",
            StrategyKind::EnvironmentVariable => "environment variable",
            StrategyKind::ExtractedReleaseRoot => "extracted release root",
            StrategyKind::PackageRelativeSearch => "package-relative search",
            StrategyKind::BareSystemLookup => "bare system lookup",
            StrategyKind::LegacyDefaultLayout => "legacy default layout",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a strategy may consult.
pub struct StrategyContext<'a> {
    /// Platform being resolved for.
    pub platform: Platform,
    /// Environment, working directory and file system.
    pub host: &'a dyn HostEnvironment,
    /// OS loader.
    pub opener: &'a dyn LibraryOpener,
}

/// Result of one strategy attempt.
#[derive(Debug)]
pub struct StrategyOutcome {
    /// The library, when the attempt succeeded.
    pub library: Option<NativeLibrary>,
    /// What was tried and what happened.
    pub detail: String,
}

impl StrategyOutcome {
    fn loaded(library: NativeLibrary) -> Self {
        let detail = format!("loaded {}", library.origin());
        Self {
            library: Some(library),
            detail,
        }
    }

    fn failed(detail: impl Into<String>) -> Self {
        Self {
            library: None,
            detail: detail.into(),
        }
    }

    fn from_open(result: Result<NativeLibrary, String>) -> Self {
        match result {
            Ok(library) => Self::loaded(library),
            Err(reason) => Self::failed(reason),
        }
    }
}

/// One way of locating the native library, carrying only its own inputs.
#[derive(Debug, Clone)]
pub enum LoadStrategy {
    /// Path passed by the caller.
    ExplicitPath(Option<PathBuf>),
    /// Registered per-platform configuration.
    ConfiguredPaths(Option<Arc<PathConfiguration>>),
    /// Deprecated single global path.
    LegacyExplicitPath(Option<PathBuf>),
    /// Name of the environment variable holding a path.
    EnvironmentVariable(String),
    /// Root of an unpacked release.
    ExtractedReleaseRoot(Option<PathBuf>),
    /// Conventional directories under the working directory.
    PackageRelativeSearch,
    /// Bare file name handed to the OS loader.
    BareSystemLookup,
    /// `native/<os>-<arch>/` under the working directory.
    LegacyDefaultLayout,
}

impl LoadStrategy {
    /// Which strategy this is.
    pub fn kind(&self) -> StrategyKind {
        match self {
            LoadStrategy::ExplicitPath(_) => StrategyKind::ExplicitPath,
            LoadStrategy::ConfiguredPaths(_) => StrategyKind::ConfiguredPaths,
            LoadStrategy::LegacyExplicitPath(_) => StrategyKind::LegacyExplicitPath,
            LoadStrategy::EnvironmentVariable(_) => StrategyKind::EnvironmentVariable,
            LoadStrategy::ExtractedReleaseRoot(_) => StrategyKind::ExtractedReleaseRoot,
            LoadStrategy::PackageRelativeSearch => StrategyKind::PackageRelativeSearch,
            LoadStrategy::BareSystemLookup => StrategyKind::BareSystemLookup,
            LoadStrategy::LegacyDefaultLayout => StrategyKind::LegacyDefaultLayout,
        }
    }

    /// Short description of the source this strategy reads.
    pub fn describe(&self) -> String {
        match self {
            LoadStrategy::ExplicitPath(Some(p))
            | LoadStrategy::LegacyExplicitPath(Some(p))
            | LoadStrategy::ExtractedReleaseRoot(Some(p)) => {
                format!("{} {}", self.kind(), p.display())
            }
            LoadStrategy::EnvironmentVariable(name) => format!("{} {name}", self.kind()),
            _ => self.kind().to_string(),
        }
    }

    /// Try to obtain the library.
    pub fn attempt(&self, ctx: &StrategyContext<'_>) -> StrategyOutcome {
        match self {
            LoadStrategy::ExplicitPath(path) => match path {
                Some(path) => open_candidate(ctx, path),
                None => StrategyOutcome::failed("not supplied"),
            },
            LoadStrategy::ConfiguredPaths(config) => attempt_configured(ctx, config.as_deref()),
            LoadStrategy::LegacyExplicitPath(path) => match path {
                Some(path) => {
                    tracing::warn!(
                        path = %path.display(),
                        "using deprecated legacy library path; register a PathConfiguration instead"
                    );
                    open_candidate(ctx, path)
                }
                None => StrategyOutcome::failed("not supplied"),
            },
            LoadStrategy::EnvironmentVariable(name) => attempt_env(ctx, name),
            LoadStrategy::ExtractedReleaseRoot(root) => match root {
                Some(root) => attempt_release_root(ctx, root),
                None => StrategyOutcome::failed("not supplied"),
            },
            LoadStrategy::PackageRelativeSearch => attempt_package_relative(ctx),
            LoadStrategy::BareSystemLookup => attempt_bare(ctx),
            LoadStrategy::LegacyDefaultLayout => attempt_legacy_layout(ctx),
        }
    }
}

/// Open one concrete candidate, substituting the process image on iOS.
fn open_candidate(ctx: &StrategyContext<'_>, path: &Path) -> StrategyOutcome {
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    match try_open(ctx, path) {
        Ok(library) => StrategyOutcome::loaded(library),
        Err(reason) => StrategyOutcome::failed(reason),
    }
}

fn try_open(ctx: &StrategyContext<'_>, path: &Path) -> Result<NativeLibrary, String> {
    if !ctx.host.is_file(path) {
        return Err(format!("{}: no such file", path.display()));
    }
    ctx.opener
        .open_path(path)
        .map_err(|reason| format!("{}: {reason}", path.display()))
}

fn from_process_image(ctx: &StrategyContext<'_>) -> StrategyOutcome {
    StrategyOutcome::from_open(
        ctx.opener
            .open_current_process()
            .map_err(|reason| format!("current process image: {reason}")),
    )
}

fn attempt_configured(
    ctx: &StrategyContext<'_>,
    config: Option<&PathConfiguration>,
) -> StrategyOutcome {
    let Some(config) = config else {
        return StrategyOutcome::failed("no configuration registered");
    };
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    match config.resolve(&ctx.platform) {
        Some(path) => open_candidate(ctx, path),
        None => StrategyOutcome::failed(format!("no entry for {}", ctx.platform)),
    }
}

fn attempt_env(ctx: &StrategyContext<'_>, name: &str) -> StrategyOutcome {
    match ctx.host.var(name) {
        None => StrategyOutcome::failed(format!("{name} is not set")),
        Some(value) if value.trim().is_empty() => {
            StrategyOutcome::failed(format!("{name} is empty"))
        }
        Some(value) => {
            let outcome = open_candidate(ctx, Path::new(value.trim()));
            match outcome.library {
                Some(_) => outcome,
                None => StrategyOutcome::failed(format!("{name}={}", outcome.detail)),
            }
        }
    }
}

/// Where a release archive keeps the library for `platform`.
pub fn release_layout_path(root: &Path, platform: &Platform) -> Option<PathBuf> {
    let file = platform.library_file_name()?;
    match platform.os {
        Os::Windows => Some(root.join("bin").join(file)),
        Os::Linux => match platform.arch? {
            arch @ (Arch::X86_64 | Arch::Aarch64) => {
                Some(root.join("lib").join(arch.label()).join(file))
            }
            _ => None,
        },
        Os::MacOs => Some(root.join("lib").join(file)),
        Os::Android => Some(root.join("lib").join(platform.android_abi()?).join(file)),
        Os::Ios => None,
    }
}

fn attempt_release_root(ctx: &StrategyContext<'_>, root: &Path) -> StrategyOutcome {
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    match release_layout_path(root, &ctx.platform) {
        Some(path) => open_candidate(ctx, &path),
        None => StrategyOutcome::failed(format!(
            "{}: release layout has no entry for {}",
            root.display(),
            ctx.platform
        )),
    }
}

/// Candidate paths probed under `cwd`, in order.
pub fn package_relative_candidates(cwd: &Path, platform: &Platform) -> Vec<PathBuf> {
    let Some(file) = platform.library_file_name() else {
        return Vec::new();
    };
    let mut candidates: Vec<PathBuf> = PACKAGE_RELATIVE_DIRS
        .iter()
        .map(|dir| cwd.join(dir).join(file))
        .collect();
    if let Some(abi) = platform.android_abi() {
        candidates.push(cwd.join("lib").join(abi).join(file));
        candidates.push(cwd.join("jniLibs").join(abi).join(file));
    }
    candidates
}

fn attempt_package_relative(ctx: &StrategyContext<'_>) -> StrategyOutcome {
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    let Some(cwd) = ctx.host.current_dir() else {
        return StrategyOutcome::failed("working directory unavailable");
    };
    let mut misses = Vec::new();
    for candidate in package_relative_candidates(&cwd, &ctx.platform) {
        match try_open(ctx, &candidate) {
            Ok(library) => return StrategyOutcome::loaded(library),
            Err(reason) => misses.push(reason),
        }
    }
    StrategyOutcome::failed(misses.join("; "))
}

fn attempt_bare(ctx: &StrategyContext<'_>) -> StrategyOutcome {
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    let Some(file) = ctx.platform.library_file_name() else {
        return StrategyOutcome::failed(format!("no library file name for {}", ctx.platform));
    };
    StrategyOutcome::from_open(
        ctx.opener
            .open_by_name(file)
            .map_err(|reason| format!("{file}: {reason}")),
    )
}

/// `<cwd>/native/<os>-<arch>/<file>`.
pub fn legacy_layout_path(cwd: &Path, platform: &Platform) -> Option<PathBuf> {
    let file = platform.library_file_name()?;
    Some(cwd.join("native").join(platform.label()).join(file))
}

fn attempt_legacy_layout(ctx: &StrategyContext<'_>) -> StrategyOutcome {
    if ctx.platform.is_statically_linked() {
        return from_process_image(ctx);
    }
    let Some(cwd) = ctx.host.current_dir() else {
        return StrategyOutcome::failed("working directory unavailable");
    };
    match legacy_layout_path(&cwd, &ctx.platform) {
        Some(path) => open_candidate(ctx, &path),
        None => StrategyOutcome::failed(format!("no legacy layout for {}", ctx.platform)),
    }
}
