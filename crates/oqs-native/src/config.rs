//! Per-platform native library path configuration.
//!
//! A [`PathConfiguration`] is built once by the application, before any
//! loading, and registered with the loader. It never changes after that;
//! registering a new one replaces it wholesale and invalidates the cached
//! library.
//!
//! ```
//! use oqs_native::config::PathConfiguration;
//! use oqs_native::platform::{Arch, Os, Platform};
//! use std::path::Path;
//!
//! let config = PathConfiguration::new()
//!     .with_linux_x86_64("/opt/oqs/x86_64/liboqs.so")
//!     .with_linux("/opt/oqs/liboqs.so");
//!
//! let here = Platform::new(Os::Linux, Some(Arch::Aarch64));
//! assert_eq!(config.resolve(&here), Some(Path::new("/opt/oqs/liboqs.so")));
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::platform::{Arch, Os, Platform};

/// What to do when the exact architecture slot is empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchFallback {
    /// Only the exact architecture slot, then the generic OS slot.
    #[default]
    Strict,
    /// Before the generic slot, borrow the sibling slot: `linux_x86_64` on
    /// Linux, `android_arm64` on Android.
    NearestSibling,
}

/// Immutable per-OS / per-architecture path table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathConfiguration {
    /// Windows DLL.
    pub windows: Option<PathBuf>,
    /// Linux, any architecture.
    pub linux: Option<PathBuf>,
    /// Linux x86_64.
    pub linux_x86_64: Option<PathBuf>,
    /// Linux aarch64.
    pub linux_aarch64: Option<PathBuf>,
    /// macOS dylib.
    pub macos: Option<PathBuf>,
    /// iOS. Ignored: the library is statically linked.
    pub ios: Option<PathBuf>,
    /// Android, any ABI.
    pub android: Option<PathBuf>,
    /// Android `arm64-v8a`.
    pub android_arm64: Option<PathBuf>,
    /// Android `armeabi-v7a`.
    pub android_armv7: Option<PathBuf>,
    /// Android `x86_64`.
    pub android_x86_64: Option<PathBuf>,
    /// Android `x86`.
    pub android_x86: Option<PathBuf>,
    /// Architecture fallback policy.
    pub arch_fallback: ArchFallback,
}

macro_rules! slot_setter {
    ($(#[$doc:meta] $setter:ident => $field:ident),* $(,)?) => {
        $(
            #[$doc]
            #[must_use]
            pub fn $setter(mut self, path: impl Into<PathBuf>) -> Self {
                self.$field = Some(path.into());
                self
            }
        )*
    };
}

impl PathConfiguration {
    /// An empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    slot_setter! {
        /// Set the Windows path.
        with_windows => windows,
        /// Set the generic Linux path.
        with_linux => linux,
        /// Set the Linux x86_64 path.
        with_linux_x86_64 => linux_x86_64,
        /// Set the Linux aarch64 path.
        with_linux_aarch64 => linux_aarch64,
        /// Set the macOS path.
        with_macos => macos,
        /// Set the iOS path (recorded, never used).
        with_ios => ios,
        /// Set the generic Android path.
        with_android => android,
        /// Set the Android arm64-v8a path.
        with_android_arm64 => android_arm64,
        /// Set the Android armeabi-v7a path.
        with_android_armv7 => android_armv7,
        /// Set the Android x86_64 path.
        with_android_x86_64 => android_x86_64,
        /// Set the Android x86 path.
        with_android_x86 => android_x86,
    }

    /// Set the architecture fallback policy.
    #[must_use]
    pub fn with_arch_fallback(mut self, policy: ArchFallback) -> Self {
        self.arch_fallback = policy;
        self
    }

    /// The single path that applies to `platform`, if any.
    ///
    /// The exact OS+arch slot wins, then (under [`ArchFallback::NearestSibling`])
    /// the sibling slot, then the generic OS slot. iOS always resolves to `None`.
    pub fn resolve(&self, platform: &Platform) -> Option<&Path> {
        let exact = self.arch_slot(platform.os, platform.arch);
        let sibling = match self.arch_fallback {
            ArchFallback::Strict => None,
            ArchFallback::NearestSibling => match platform.os {
                Os::Linux => self.linux_x86_64.as_ref(),
                Os::Android => self.android_arm64.as_ref(),
                _ => None,
            },
        };
        let generic = match platform.os {
            Os::Windows => self.windows.as_ref(),
            Os::Linux => self.linux.as_ref(),
            Os::MacOs => self.macos.as_ref(),
            Os::Android => self.android.as_ref(),
            Os::Ios => None,
        };
        exact.or(sibling).or(generic).map(PathBuf::as_path)
    }

    fn arch_slot(&self, os: Os, arch: Option<Arch>) -> Option<&PathBuf> {
        match (os, arch?) {
            (Os::Linux, Arch::X86_64) => self.linux_x86_64.as_ref(),
            (Os::Linux, Arch::Aarch64) => self.linux_aarch64.as_ref(),
            (Os::Android, Arch::Aarch64) => self.android_arm64.as_ref(),
            (Os::Android, Arch::Armv7 | Arch::Arm) => self.android_armv7.as_ref(),
            (Os::Android, Arch::X86_64) => self.android_x86_64.as_ref(),
            (Os::Android, Arch::X86) => self.android_x86.as_ref(),
            _ => None,
        }
    }

    /// Whether no slot holds a path.
    pub fn is_empty(&self) -> bool {
        [
            &self.windows,
            &self.linux,
            &self.linux_x86_64,
            &self.linux_aarch64,
            &self.macos,
            &self.ios,
            &self.android,
            &self.android_arm64,
            &self.android_armv7,
            &self.android_x86_64,
            &self.android_x86,
        ]
        .iter()
        .all(|slot| slot.is_none())
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
