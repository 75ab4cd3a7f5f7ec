//! A host environment whose platform, variables, working directory and files
//! are all scripted, and which records every question the loader asks it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use oqs_native::{HostEnvironment, Platform};
use parking_lot::Mutex;

/// One question asked of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostProbe {
    /// `var(name)`.
    Var(String),
    /// `current_dir()`.
    CurrentDir,
    /// `is_file(path)`.
    IsFile(PathBuf),
}

/// Scripted [`HostEnvironment`].
#[derive(Debug)]
pub struct ScriptedHost {
    platform: Platform,
    vars: HashMap<String, String>,
    cwd: Option<PathBuf>,
    files: HashSet<PathBuf>,
    probes: Mutex<Vec<HostProbe>>,
}

impl ScriptedHost {
    /// A host on `platform` with no variables, no files and cwd `/app`.
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            vars: HashMap::new(),
            cwd: Some(PathBuf::from("/app")),
            files: HashSet::new(),
            probes: Mutex::new(Vec::new()),
        }
    }

    /// Set an environment variable.
    #[must_use]
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Set (or clear) the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: Option<&Path>) -> Self {
        self.cwd = cwd.map(Path::to_path_buf);
        self
    }

    /// Make `path` exist as a regular file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.insert(path.into());
        self
    }

    /// Every probe so far, in order.
    pub fn probes(&self) -> Vec<HostProbe> {
        self.probes.lock().clone()
    }

    /// Every `is_file` path probed so far, in order.
    pub fn probed_files(&self) -> Vec<PathBuf> {
        self.probes
            .lock()
            .iter()
            .filter_map(|p| match p {
                HostProbe::IsFile(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded probes.
    pub fn clear_probes(&self) {
        self.probes.lock().clear();
    }
}

impl HostEnvironment for ScriptedHost {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn var(&self, name: &str) -> Option<String> {
        self.probes.lock().push(HostProbe::Var(name.to_string()));
        self.vars.get(name).cloned()
    }

    fn current_dir(&self) -> Option<PathBuf> {
        self.probes.lock().push(HostProbe::CurrentDir);
        self.cwd.clone()
    }

    fn is_file(&self, path: &Path) -> bool {
        self.probes.lock().push(HostProbe::IsFile(path.to_path_buf()));
        self.files.contains(path)
    }
}
