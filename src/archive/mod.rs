use anyhow::{Context, Result};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

use crate::error::InstallError;
use crate::manifest::{MANIFEST_FILE_NAME, ModuleManifest};
use crate::runtime::Runtime;

/// An uploaded module package, validated and held in memory.
///
/// `open` consumes the upload stream; dropping the `ModuleArchive` releases
/// everything on every exit path. The raw bytes stay available for the
/// installation history copy.
#[derive(Debug)]
pub struct ModuleArchive {
    bytes: Vec<u8>,
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl ModuleArchive {
    /// Read the upload stream to its end and validate the container.
    ///
    /// Fails with [`InstallError::InvalidPackage`] if the bytes are not a
    /// well-formed zip archive.
    pub fn open<R: Read>(mut reader: R) -> Result<Self, InstallError> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context("Failed to read module package stream")?;

        let archive = ZipArchive::new(Cursor::new(bytes.clone()))
            .map_err(|e| InstallError::invalid_package(e.to_string()))?;

        Ok(Self { bytes, archive })
    }

    /// The raw archive bytes, as uploaded.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read and parse the module descriptor at the archive root.
    ///
    /// Fails with [`InstallError::InvalidManifest`] if `module.json` is
    /// missing or does not parse.
    pub fn manifest(&mut self) -> Result<ModuleManifest, InstallError> {
        let mut entry = self.archive.by_name(MANIFEST_FILE_NAME).map_err(|_| {
            InstallError::invalid_manifest(format!("{} not found in package", MANIFEST_FILE_NAME))
        })?;

        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|e| InstallError::invalid_manifest(e.to_string()))?;

        ModuleManifest::parse(&content)
    }

    /// Extract the full archive contents under `target`, mirroring the
    /// archive's internal layout. Entries whose names would escape the
    /// target directory are skipped.
    #[tracing::instrument(skip(self, runtime))]
    pub fn extract<RT: Runtime>(&mut self, runtime: &RT, target: &Path) -> Result<()> {
        debug!("Extracting module package to {:?}...", target);
        runtime.create_dir_all(target)?;

        for i in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(i)
                .with_context(|| format!("Failed to read package entry {}", i))?;

            let entry_path = match entry.enclosed_name() {
                Some(path) => path.to_path_buf(),
                None => {
                    debug!("Skipping entry with invalid path: {}", entry.name());
                    continue;
                }
            };

            let full_path = target.join(&entry_path);

            if entry.is_dir() {
                runtime.create_dir_all(&full_path)?;
            } else {
                if let Some(parent) = full_path.parent() {
                    runtime.create_dir_all(parent)?;
                }
                let mut dest_file = runtime.create_file(&full_path)?;
                std::io::copy(&mut entry, &mut dest_file)
                    .with_context(|| format!("Failed to extract file {:?}", full_path))?;

                // Restore file permissions from archive metadata (Unix only)
                #[cfg(unix)]
                if let Some(mode) = entry.unix_mode()
                    && let Err(e) = runtime.set_permissions(&full_path, mode)
                {
                    debug!("Failed to set permissions on {:?}: {}", full_path, e);
                }
            }
        }

        info!("Extraction complete: {:?}", target);
        Ok(())
    }
}
