use serde::{Deserialize, Serialize};

use crate::error::InstallError;

/// Well-known path of the module descriptor inside an uploaded package.
pub const MANIFEST_FILE_NAME: &str = "module.json";

/// Module descriptor declared by the package author.
///
/// The manifest is authoritative: its `name` overrides whatever name the
/// uploader suggested for the package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModuleManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

impl ModuleManifest {
    /// Parse a manifest from its JSON text.
    pub fn parse(content: &str) -> Result<Self, InstallError> {
        let manifest: ModuleManifest = serde_json::from_str(content)
            .map_err(|e| InstallError::invalid_manifest(e.to_string()))?;
        validate_module_name(&manifest.name)?;
        validate_version(&manifest.version)?;
        Ok(manifest)
    }

    /// The canonical module name: trimmed, validated, used as the
    /// installation directory name.
    pub fn module_name(&self) -> &str {
        self.name.trim()
    }
}

/// A module name becomes a directory name, so it must be non-empty and must
/// not escape the modules root.
fn validate_module_name(name: &str) -> Result<(), InstallError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InstallError::invalid_manifest(
            "module name must not be empty",
        ));
    }
    if name == "." || name == ".." {
        return Err(InstallError::invalid_manifest(format!(
            "module name \"{}\" is not allowed",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(InstallError::invalid_manifest(format!(
            "module name \"{}\" must not contain path separators",
            name
        )));
    }
    Ok(())
}

/// The version is interpolated into the archive-copy file name, so it must
/// not carry path components either.
fn validate_version(version: &str) -> Result<(), InstallError> {
    if version.trim().is_empty() {
        return Err(InstallError::invalid_manifest(
            "module version must not be empty",
        ));
    }
    if version.contains('/') || version.contains('\\') || version.contains("..") {
        return Err(InstallError::invalid_manifest(format!(
            "module version \"{}\" must not contain path components",
            version
        )));
    }
    Ok(())
}
