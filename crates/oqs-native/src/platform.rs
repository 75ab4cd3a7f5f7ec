//! Host platform detection and native library naming.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Environment variable consulted when `uname -m` cannot tell the Linux architecture.
pub const ARCH_HINT_ENV: &str = "OQS_NATIVE_ARCH";

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Windows.
    Windows,
    /// Linux (non-Android).
    Linux,
    /// macOS.
    MacOs,
    /// iOS. Native code is statically linked into the host process.
    Ios,
    /// Android.
    Android,
}

impl Os {
    /// OS of the current compile target.
    ///
    /// Targets outside the supported set are reported as Linux so that the
    /// `lib*.so` naming convention applies.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "android") {
            Os::Android
        } else if cfg!(target_os = "ios") {
            Os::Ios
        } else if cfg!(target_os = "macos") {
            Os::MacOs
        } else {
            Os::Linux
        }
    }

    /// Lowercase label used in diagnostics and directory layouts.
    pub fn label(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Ios => "ios",
            Os::Android => "android",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Aarch64,
    /// 32-bit ARM without the v7 feature set.
    Arm,
    /// 32-bit ARMv7.
    Armv7,
    /// 32-bit x86.
    X86,
}

impl Arch {
    /// Parse the spellings produced by `uname -m` and the Rust target triples.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => Some(Arch::X86_64),
            "aarch64" | "arm64" | "armv8" | "armv8l" => Some(Arch::Aarch64),
            "armv7" | "armv7l" | "armv7a" | "armeabi-v7a" => Some(Arch::Armv7),
            "arm" | "armv6l" | "armv5tel" => Some(Arch::Arm),
            "x86" | "i386" | "i486" | "i586" | "i686" => Some(Arch::X86),
            _ => None,
        }
    }

    /// Architecture of the current compile target, if it is one we know.
    pub fn current() -> Option<Self> {
        if cfg!(target_arch = "arm") && cfg!(target_feature = "v7") {
            return Some(Arch::Armv7);
        }
        Self::parse(std::env::consts::ARCH)
    }

    /// Lowercase label used in diagnostics and directory layouts.
    pub fn label(self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Arm => "arm",
            Arch::Armv7 => "armv7",
            Arch::X86 => "x86",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The OS and CPU architecture the loader resolves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture; `None` disables architecture-specific paths.
    pub arch: Option<Arch>,
}

impl Platform {
    /// Construct a platform explicitly.
    pub const fn new(os: Os, arch: Option<Arch>) -> Self {
        Self { os, arch }
    }

    /// Detect the host platform. Never fails.
    ///
    /// On Linux the architecture comes from `uname -m`, then from
    /// [`ARCH_HINT_ENV`], then from the compile target.
    pub fn detect() -> Self {
        let os = Os::current();
        let platform = match os {
            Os::Linux => {
                let uname = probe_uname_machine();
                let hint = std::env::var(ARCH_HINT_ENV).ok();
                Self::from_probe(os, uname.as_deref(), hint.as_deref())
            }
            _ => Self::new(os, Arch::current()),
        };
        tracing::debug!(os = %platform.os, arch = ?platform.arch, "detected platform");
        platform
    }

    /// Resolve the architecture from probe results.
    ///
    /// `uname` wins over `hint`; if neither parses, the compile-target
    /// architecture is used, and if that is unknown the result has no arch.
    pub fn from_probe(os: Os, uname: Option<&str>, hint: Option<&str>) -> Self {
        let arch = uname
            .and_then(Arch::parse)
            .or_else(|| hint.and_then(Arch::parse))
            .or_else(Arch::current);
        Self::new(os, arch)
    }

    /// Conventional native library file name, `None` on iOS (static link).
    pub fn library_file_name(&self) -> Option<&'static str> {
        match self.os {
            Os::Windows => Some("oqs.dll"),
            Os::Linux | Os::Android => Some("liboqs.so"),
            Os::MacOs => Some("liboqs.dylib"),
            Os::Ios => None,
        }
    }

    /// Android ABI directory name for this architecture.
    pub fn android_abi(&self) -> Option<&'static str> {
        if self.os != Os::Android {
            return None;
        }
        match self.arch? {
            Arch::Aarch64 => Some("arm64-v8a"),
            Arch::Armv7 | Arch::Arm => Some("armeabi-v7a"),
            Arch::X86_64 => Some("x86_64"),
            Arch::X86 => Some("x86"),
        }
    }

    /// `"<os>-<arch>"`, or just `"<os>"` when the architecture is unknown.
    pub fn label(&self) -> String {
        match self.arch {
            Some(arch) => format!("{}-{}", self.os, arch),
            None => self.os.to_string(),
        }
    }

    /// Whether the native code lives in the current process image.
    pub fn is_statically_linked(&self) -> bool {
        self.os == Os::Ios
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(target_os = "linux")]
fn probe_uname_machine() -> Option<String> {
    let output = std::process::Command::new("uname").arg("-m").output();
    match output {
        Ok(out) if out.status.success() => {
            let machine = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!machine.is_empty()).then_some(machine)
        }
        Ok(out) => {
            tracing::debug!(status = ?out.status, "uname -m exited unsuccessfully");
            None
        }
        Err(e) => {
            tracing::debug!(error = %e, "uname -m could not be spawned");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn probe_uname_machine() -> Option<String> {
    None
}
