//! Loaded native images and the host seams the strategies go through.
//!
//! Strategies never touch the file system, the environment or the OS loader
//! directly. They ask a [`HostEnvironment`] and a [`LibraryOpener`], which in
//! production are [`SystemHost`] and [`SystemOpener`] and in tests are scripted
//! doubles.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use crate::platform::Platform;

/// Where a [`NativeLibrary`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LibraryOrigin {
    /// Opened from an explicit file path.
    File(PathBuf),
    /// Resolved by the OS loader from a bare file name.
    SystemSearch(String),
    /// The running executable (static link).
    CurrentProcess,
}

impl fmt::Display for LibraryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibraryOrigin::File(path) => write!(f, "{}", path.display()),
            LibraryOrigin::SystemSearch(name) => write!(f, "system search for {name}"),
            LibraryOrigin::CurrentProcess => f.write_str("current process image"),
        }
    }
}

/// A loaded native image.
///
/// Clones share the same image. The OS keeps it resident while any clone is
/// alive; there is no explicit unload.
#[derive(Clone)]
pub struct NativeLibrary {
    inner: Arc<Library>,
    origin: LibraryOrigin,
}

impl NativeLibrary {
    /// Wrap an already-opened library.
    pub fn from_library(library: Library, origin: LibraryOrigin) -> Self {
        Self {
            inner: Arc::new(library),
            origin,
        }
    }

    /// Open the image of the running process.
    pub fn current_process() -> Result<Self, libloading::Error> {
        #[cfg(unix)]
        let library: Library = libloading::os::unix::Library::this().into();
        #[cfg(windows)]
        let library: Library = libloading::os::windows::Library::this()?.into();
        Ok(Self::from_library(library, LibraryOrigin::CurrentProcess))
    }

    /// Where this image was loaded from.
    pub fn origin(&self) -> &LibraryOrigin {
        &self.origin
    }

    /// Whether two handles share the same loaded image instance.
    pub fn same_instance(&self, other: &NativeLibrary) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The underlying `libloading` library, for symbol lookup.
    pub(crate) fn library(&self) -> &Library {
        &self.inner
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Read-only view of the host the strategies resolve against.
pub trait HostEnvironment: Send + Sync {
    /// Platform to resolve for.
    fn platform(&self) -> Platform;

    /// Value of an environment variable, `None` when unset or not UTF-8.
    fn var(&self, name: &str) -> Option<String>;

    /// Working directory for relative searches.
    fn current_dir(&self) -> Option<PathBuf>;

    /// Whether `path` names an existing regular file.
    fn is_file(&self, path: &Path) -> bool;
}

/// Opens native images. Implementations report failures as readable text so
/// they can go straight into the diagnostics list.
pub trait LibraryOpener: Send + Sync {
    /// Open the image at `path`.
    fn open_path(&self, path: &Path) -> Result<NativeLibrary, String>;

    /// Let the OS loader search its standard locations for `name`.
    fn open_by_name(&self, name: &str) -> Result<NativeLibrary, String>;

    /// The running process image.
    fn open_current_process(&self) -> Result<NativeLibrary, String>;
}

/// The real host: detected platform, process environment, real file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHost;

impl HostEnvironment for SystemHost {
    fn platform(&self) -> Platform {
        Platform::detect()
    }

    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn current_dir(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Opens images through the OS dynamic loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemOpener;

impl LibraryOpener for SystemOpener {
    fn open_path(&self, path: &Path) -> Result<NativeLibrary, String> {
        // SAFETY: opening a library runs its initializers. liboqs has no
        // initializers with preconditions on the host process.
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        Ok(NativeLibrary::from_library(
            library,
            LibraryOrigin::File(path.to_path_buf()),
        ))
    }

    fn open_by_name(&self, name: &str) -> Result<NativeLibrary, String> {
        // SAFETY: as for `open_path`; the OS loader picks the file.
        let library = unsafe { Library::new(name) }.map_err(|e| e.to_string())?;
        Ok(NativeLibrary::from_library(
            library,
            LibraryOrigin::SystemSearch(name.to_string()),
        ))
    }

    fn open_current_process(&self) -> Result<NativeLibrary, String> {
        NativeLibrary::current_process().map_err(|e| e.to_string())
    }
}
