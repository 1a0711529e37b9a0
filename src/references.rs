use anyhow::{Context, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::runtime::Runtime;

/// A binary file bundled by a module, identified by its content digest.
///
/// The digest is the binary's version for conflict purposes: two files with
/// the same name and different digests are different versions.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyFileRef {
    pub path: PathBuf,
    pub file_name: String,
    /// Hex SHA-256 of the file contents.
    pub version: String,
}

impl AssemblyFileRef {
    /// Build a reference for a file on disk, digesting its contents.
    pub fn from_file<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .with_context(|| format!("Binary path {:?} has no file name", path))?
            .to_string_lossy()
            .to_string();
        let version = file_digest(runtime, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            version,
        })
    }
}

/// A bundled binary that collides with a shared-runtime binary of a
/// different version. Informational only; the caller decides whether to
/// force an override.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictedAssemblyReference {
    pub file_name: String,
    /// Version the module wants to install.
    pub module_version: String,
    /// Version already present in the shared runtime.
    pub system_version: String,
}

/// The shared-runtime reference registry: which binaries exist, at which
/// version, and which modules depend on each of them.
#[cfg_attr(test, mockall::automock)]
pub trait ReferenceRegistry: Send + Sync {
    /// Compare candidate binaries against the registered system versions.
    fn check(&self, candidates: &[AssemblyFileRef]) -> Vec<ConflictedAssemblyReference>;

    /// Record that `module_name` depends on the shared binary at
    /// `shared_path`. Registration is unconditional: it happens whether or
    /// not a physical copy occurred, so later cleanup logic never removes a
    /// binary still in use.
    fn add_reference(&self, shared_path: &Path, module_name: &str) -> Result<()>;

    /// The modules registered as depending on a shared binary file name.
    fn referencing_modules(&self, file_name: &str) -> Vec<String>;
}

struct OwnershipEntry {
    system_version: String,
    referenced_by: BTreeSet<String>,
}

/// In-memory registry implementation, internally synchronized so ownership
/// registration is safe under concurrent installs.
pub struct InMemoryReferenceRegistry<'a, R: Runtime> {
    runtime: &'a R,
    entries: Mutex<HashMap<String, OwnershipEntry>>,
}

impl<'a, R: Runtime> InMemoryReferenceRegistry<'a, R> {
    pub fn new(runtime: &'a R) -> Self {
        Self {
            runtime,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Pre-register a shared binary at a known version, without an owner.
    /// Used when the host seeds the registry from an existing bin directory.
    pub fn seed_system_binary(&self, file_name: &str, version: &str) {
        let mut entries = self.entries.lock().unwrap();
        entries
            .entry(file_name.to_string())
            .or_insert_with(|| OwnershipEntry {
                system_version: version.to_string(),
                referenced_by: BTreeSet::new(),
            })
            .system_version = version.to_string();
    }

    /// Seed the registry from every file currently in a shared bin
    /// directory. Missing directory means an empty registry.
    pub fn seed_from_dir(&self, dir: &Path) -> Result<()> {
        if !self.runtime.is_dir(dir) {
            return Ok(());
        }
        for path in self.runtime.read_dir(dir)? {
            if self.runtime.is_dir(&path) {
                continue;
            }
            let file_ref = AssemblyFileRef::from_file(self.runtime, &path)?;
            self.seed_system_binary(&file_ref.file_name, &file_ref.version);
        }
        Ok(())
    }
}

impl<R: Runtime> ReferenceRegistry for InMemoryReferenceRegistry<'_, R> {
    fn check(&self, candidates: &[AssemblyFileRef]) -> Vec<ConflictedAssemblyReference> {
        let entries = self.entries.lock().unwrap();
        candidates
            .iter()
            .filter_map(|candidate| {
                let entry = entries.get(&candidate.file_name)?;
                if entry.system_version == candidate.version {
                    return None;
                }
                Some(ConflictedAssemblyReference {
                    file_name: candidate.file_name.clone(),
                    module_version: candidate.version.clone(),
                    system_version: entry.system_version.clone(),
                })
            })
            .collect()
    }

    #[tracing::instrument(skip(self))]
    fn add_reference(&self, shared_path: &Path, module_name: &str) -> Result<()> {
        // The recorded system version always reflects what is actually on
        // disk: after an overwrite this re-digests the new file, after a
        // skipped copy it re-digests the retained one.
        let file_ref = AssemblyFileRef::from_file(self.runtime, shared_path)?;

        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .entry(file_ref.file_name.clone())
            .or_insert_with(|| OwnershipEntry {
                system_version: file_ref.version.clone(),
                referenced_by: BTreeSet::new(),
            });
        entry.system_version = file_ref.version;
        entry.referenced_by.insert(module_name.to_string());
        debug!(
            "Registered {} as a reference holder of {}",
            module_name, file_ref.file_name
        );
        Ok(())
    }

    fn referencing_modules(&self, file_name: &str) -> Vec<String> {
        let entries = self.entries.lock().unwrap();
        entries
            .get(file_name)
            .map(|entry| entry.referenced_by.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Hex SHA-256 of a file's contents.
pub fn file_digest<R: Runtime>(runtime: &R, path: &Path) -> Result<String> {
    let bytes = runtime
        .read(path)
        .with_context(|| format!("Failed to read binary {:?}", path))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}
