use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::runtime::Runtime;

/// Name of the per-module subfolder holding its bundled binaries.
pub const BIN_DIR: &str = "bin";

/// Resolves every on-disk location the pipeline touches from a single
/// installation root.
///
/// Layout:
/// - `<root>/modules/<name>`: one directory per installed module, mirroring
///   the archive's internal layout
/// - `<root>/bin`: the shared runtime binary directory, a flat directory of
///   files named by their original filename
/// - `<root>/history`: archive copies and the append-only installation log
#[derive(Debug, Clone)]
pub struct ModulePaths {
    root: PathBuf,
}

impl ModulePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns: `<root>/modules`
    pub fn modules_dir(&self) -> PathBuf {
        self.root.join("modules")
    }

    /// Returns: `<root>/modules/<name>`
    pub fn module_dir(&self, module_name: &str) -> PathBuf {
        self.modules_dir().join(module_name)
    }

    /// Returns: `<root>/modules/<name>/bin`
    pub fn module_bin_dir(&self, module_name: &str) -> PathBuf {
        self.module_dir(module_name).join(BIN_DIR)
    }

    /// Returns: `<root>/bin`
    pub fn shared_bin_dir(&self) -> PathBuf {
        self.root.join(BIN_DIR)
    }

    /// Returns: `<root>/history`
    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    /// Returns: `<root>/history/<name>`
    pub fn module_history_dir(&self, module_name: &str) -> PathBuf {
        self.history_dir().join(module_name)
    }

    /// Returns: `<root>/history/installations.log`
    pub fn installation_log(&self) -> PathBuf {
        self.history_dir().join("installations.log")
    }
}

/// Default installation root: `~/.modinst`.
pub fn default_install_root<R: Runtime>(runtime: &R) -> Result<PathBuf> {
    let home = runtime
        .home_dir()
        .context("Could not determine home directory")?;
    Ok(home.join(".modinst"))
}
