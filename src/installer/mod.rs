//! Module installation steps:
//! 1. Unzip the uploaded package
//! 2. Check conflicted assembly references
//! 3. Copy assemblies into the shared runtime
//! 4. Run the module's installing event
//!
//! Steps 2-4 are deliberately decoupled from step 1 so a caller can show
//! conflicts to a human and decide whether to force an override before
//! committing binaries.

mod locks;

use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use std::io::Read;
use std::sync::Mutex;

use crate::archive::ModuleArchive;
use crate::error::InstallError;
use crate::history::{HistoryStore, InstallationRecord};
use crate::hooks::{HookRegistry, ModuleContext, RequestContext};
use crate::paths::ModulePaths;
use crate::references::{AssemblyFileRef, ConflictedAssemblyReference, ReferenceRegistry, file_digest};
use crate::runtime::Runtime;

use locks::NameLocks;

/// Orchestrates the installation pipeline over its collaborator seams.
pub struct ModuleInstaller<'a, R, H, G>
where
    R: Runtime,
    H: HistoryStore,
    G: ReferenceRegistry,
{
    runtime: &'a R,
    history: &'a H,
    references: &'a G,
    hooks: &'a HookRegistry,
    paths: ModulePaths,
    install_locks: NameLocks,
    shared_bin_lock: Mutex<()>,
}

impl<'a, R, H, G> ModuleInstaller<'a, R, H, G>
where
    R: Runtime,
    H: HistoryStore,
    G: ReferenceRegistry,
{
    pub fn new(
        runtime: &'a R,
        history: &'a H,
        references: &'a G,
        hooks: &'a HookRegistry,
        paths: ModulePaths,
    ) -> Self {
        Self {
            runtime,
            history,
            references,
            hooks,
            paths,
            install_locks: NameLocks::new(),
            shared_bin_lock: Mutex::new(()),
        }
    }

    /// Validate an uploaded package and extract it into its own module
    /// directory. Returns the canonical module name resolved from the
    /// manifest (`name_hint` is only used for logging).
    ///
    /// The history entry is written before extraction: if extraction is
    /// interrupted, a durable record of the attempt still exists. The
    /// existence check and extraction run under a per-name lock, so two
    /// installs of the same module in this process cannot race past the
    /// check; concurrent installs from other processes are not guarded.
    #[tracing::instrument(skip(self, stream))]
    pub fn unzip<S: Read>(
        &self,
        name_hint: &str,
        stream: S,
        user: &str,
    ) -> Result<String, InstallError> {
        // Ownership of the stream moves into the archive; it is released on
        // every exit path below.
        let mut archive = ModuleArchive::open(stream)?;
        let manifest = archive.manifest()?;

        let module_name = manifest.module_name().to_string();
        if !name_hint.is_empty() && name_hint != module_name {
            debug!(
                "Manifest name {:?} overrides uploaded name hint {:?}",
                module_name, name_hint
            );
        }

        let lock = self.install_locks.acquire(&module_name);
        let _guard = lock.lock().unwrap();

        let module_dir = self.paths.module_dir(&module_name);
        if self.runtime.exists(&module_dir) {
            return Err(InstallError::AlreadyInstalled {
                module: module_name,
            });
        }

        // Record the installation before touching the module directory, so
        // an interrupted extraction never leaves an untracked install.
        let archive_file = self
            .history
            .save_installation_file(&module_name, &manifest.version, archive.bytes())
            .map_err(|source| InstallError::HistoryWrite {
                module: module_name.clone(),
                source,
            })?;
        let record = InstallationRecord {
            module_name: module_name.clone(),
            version: manifest.version.clone(),
            installed_at: Utc::now(),
            user: user.to_string(),
            archive_file,
        };
        self.history
            .log_installation(&module_name, &record)
            .map_err(|source| InstallError::HistoryWrite {
                module: module_name.clone(),
                source,
            })?;

        archive.extract(self.runtime, &module_dir)?;

        info!("Installed module {:?} ({})", module_name, manifest.version);
        Ok(module_name)
    }

    /// Report which of the module's bundled binaries collide with a
    /// shared-runtime binary of a different version.
    ///
    /// Read-only; safe to call repeatedly and speculatively before the
    /// caller decides whether to commit.
    #[tracing::instrument(skip(self))]
    pub fn check_conflicted_assembly_references(
        &self,
        module_name: &str,
    ) -> Result<Vec<ConflictedAssemblyReference>> {
        let candidates = self.assembly_files(module_name)?;
        Ok(self.references.check(&candidates))
    }

    /// Copy the module's bundled binaries into the shared runtime binary
    /// directory and register the module as a reference holder of each.
    ///
    /// A binary whose file name already exists in the shared directory is
    /// only overwritten when `override_system_version` is true; otherwise
    /// the existing file is kept. Ownership registration happens either
    /// way. Not transactional: the first failure propagates and earlier
    /// copies and registrations stay in place.
    #[tracing::instrument(skip(self))]
    pub fn copy_assemblies(&self, module_name: &str, override_system_version: bool) -> Result<()> {
        let _guard = self.shared_bin_lock.lock().unwrap();

        let assembly_files = self.assembly_files(module_name)?;
        if assembly_files.is_empty() {
            debug!("Module {:?} bundles no binaries", module_name);
            return Ok(());
        }

        let bin_dir = self.paths.shared_bin_dir();
        self.runtime.create_dir_all(&bin_dir)?;

        for file in assembly_files {
            let file_in_bin = bin_dir.join(&file.file_name);
            let exists = self.runtime.exists(&file_in_bin);
            if !exists || override_system_version {
                self.runtime.copy(&file.path, &file_in_bin)?;
                info!("Copied {} into shared runtime", file.file_name);
            } else {
                let retained = file_digest(self.runtime, &file_in_bin)?;
                if retained != file.version {
                    warn!(
                        "Keeping system version of {} ({}); module {} bundles {}",
                        file.file_name, retained, module_name, file.version
                    );
                }
            }
            self.references.add_reference(&file_in_bin, module_name)?;
        }
        Ok(())
    }

    /// Invoke the module's optional install hook. A module with no
    /// registered hook is a no-op; a hook failure propagates unmodified.
    #[tracing::instrument(skip(self, request))]
    pub fn run_event(&self, module_name: &str, request: &RequestContext) -> Result<()> {
        match self.hooks.resolve(module_name) {
            Some(hook) => hook.on_installing(&ModuleContext::new(module_name), request),
            None => {
                debug!("Module {:?} has no install hook", module_name);
                Ok(())
            }
        }
    }

    /// Every binary file under the module's bin subdirectory. Recomputed
    /// from disk on each call; an absent directory yields an empty set.
    fn assembly_files(&self, module_name: &str) -> Result<Vec<AssemblyFileRef>> {
        let bin_dir = self.paths.module_bin_dir(module_name);
        if !self.runtime.is_dir(&bin_dir) {
            return Ok(Vec::new());
        }

        // Directory enumeration order is platform-dependent; sort so the
        // copy loop (and any partial failure it leaves behind) is
        // deterministic.
        let mut paths = self.runtime.read_dir(&bin_dir)?;
        paths.sort();

        let mut files = Vec::new();
        for path in paths {
            if self.runtime.is_dir(&path) {
                continue;
            }
            files.push(AssemblyFileRef::from_file(self.runtime, &path)?);
        }
        Ok(files)
    }
}
