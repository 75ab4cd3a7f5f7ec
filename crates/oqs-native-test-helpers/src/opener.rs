//! A library opener that succeeds only for scripted inputs and records every call.
//!
//! Successful opens hand back the test binary's own image tagged with the
//! requested origin, so no real liboqs is needed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Barrier;
use std::sync::atomic::{AtomicBool, Ordering};

use libloading::Library;
use oqs_native::{LibraryOpener, LibraryOrigin, NativeLibrary};
use parking_lot::Mutex;

/// One call made to the opener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenCall {
    /// `open_path`.
    Path(PathBuf),
    /// `open_by_name`.
    ByName(String),
    /// `open_current_process`.
    CurrentProcess,
}

/// The current process image, reported as coming from `origin`.
///
/// # Panics
///
/// Panics if the process image cannot be opened, which only happens on
/// Windows when the loader is broken.
pub fn stand_in_library(origin: LibraryOrigin) -> NativeLibrary {
    #[cfg(unix)]
    let library: Library = libloading::os::unix::Library::this().into();
    #[cfg(windows)]
    let library: Library = crate::must(libloading::os::windows::Library::this()).into();
    NativeLibrary::from_library(library, origin)
}

/// Scripted [`LibraryOpener`].
#[derive(Debug, Default)]
pub struct RecordingOpener {
    openable_paths: HashSet<PathBuf>,
    openable_names: HashSet<String>,
    broken_paths: HashSet<PathBuf>,
    calls: Mutex<Vec<OpenCall>>,
}

impl RecordingOpener {
    /// An opener that fails every path and name, but can open the process image.
    pub fn new() -> Self {
        Self::default()
    }

    /// `open_path(path)` succeeds.
    #[must_use]
    pub fn opens_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.openable_paths.insert(path.into());
        self
    }

    /// `open_by_name(name)` succeeds.
    #[must_use]
    pub fn opens_name(mut self, name: &str) -> Self {
        self.openable_names.insert(name.to_string());
        self
    }

    /// `open_path(path)` fails as if the file were not a valid image.
    #[must_use]
    pub fn rejects_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.broken_paths.insert(path.into());
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<OpenCall> {
        self.calls.lock().clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl LibraryOpener for RecordingOpener {
    fn open_path(&self, path: &Path) -> Result<NativeLibrary, String> {
        self.calls.lock().push(OpenCall::Path(path.to_path_buf()));
        if self.broken_paths.contains(path) {
            return Err("invalid ELF header".to_string());
        }
        if self.openable_paths.contains(path) {
            return Ok(stand_in_library(LibraryOrigin::File(path.to_path_buf())));
        }
        Err("cannot open shared object file".to_string())
    }

    fn open_by_name(&self, name: &str) -> Result<NativeLibrary, String> {
        self.calls.lock().push(OpenCall::ByName(name.to_string()));
        if self.openable_names.contains(name) {
            return Ok(stand_in_library(LibraryOrigin::SystemSearch(
                name.to_string(),
            )));
        }
        Err("cannot open shared object file: No such file or directory".to_string())
    }

    fn open_current_process(&self) -> Result<NativeLibrary, String> {
        self.calls.lock().push(OpenCall::CurrentProcess);
        Ok(stand_in_library(LibraryOrigin::CurrentProcess))
    }
}

/// Wraps a [`RecordingOpener`] and parks the first `open_by_name` call.
///
/// The parked call waits at [`GatedOpener::wait_until_entered`] and then at
/// [`GatedOpener::release`], so a test can act while a load is in flight.
/// Both are two-party rendezvous points: the loading thread and the test.
#[derive(Debug)]
pub struct GatedOpener {
    inner: RecordingOpener,
    armed: AtomicBool,
    entered: Barrier,
    released: Barrier,
}

impl GatedOpener {
    /// Gate the first by-name open made through `inner`.
    pub fn new(inner: RecordingOpener) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
            entered: Barrier::new(2),
            released: Barrier::new(2),
        }
    }

    /// Block until the gated call has started.
    pub fn wait_until_entered(&self) {
        self.entered.wait();
    }

    /// Let the gated call finish.
    pub fn release(&self) {
        self.released.wait();
    }

    /// Calls recorded by the wrapped opener.
    pub fn calls(&self) -> Vec<OpenCall> {
        self.inner.calls()
    }
}

impl LibraryOpener for GatedOpener {
    fn open_path(&self, path: &Path) -> Result<NativeLibrary, String> {
        self.inner.open_path(path)
    }

    fn open_by_name(&self, name: &str) -> Result<NativeLibrary, String> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.released.wait();
        }
        self.inner.open_by_name(name)
    }

    fn open_current_process(&self) -> Result<NativeLibrary, String> {
        self.inner.open_current_process()
    }
}
