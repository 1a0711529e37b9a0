use thiserror::Error;

/// Errors produced by the module installation pipeline.
///
/// The first three variants are expected user-input problems (a bad upload,
/// a bad manifest, a duplicate name) and are meant to be rendered back to
/// the requester as a message. Everything else is an infrastructure failure.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The uploaded package is not a well-formed archive.
    #[error("the module package is not a valid archive: {reason}")]
    InvalidPackage {
        /// Description of the container problem.
        reason: String,
    },

    /// The module descriptor is missing from the archive or cannot be parsed.
    #[error("the module manifest is missing or invalid: {reason}")]
    InvalidManifest {
        /// Description of the manifest problem.
        reason: String,
    },

    /// A module with the resolved name is already installed.
    #[error("a module named \"{module}\" is already installed")]
    AlreadyInstalled {
        /// The canonical module name that collided.
        module: String,
    },

    /// Recording the installation history failed. Extraction must not
    /// proceed without a history entry, so this aborts the install.
    #[error("failed to record installation history for \"{module}\"")]
    HistoryWrite {
        /// The module whose history entry could not be written.
        module: String,
        #[source]
        source: anyhow::Error,
    },

    /// Any other infrastructure failure (filesystem I/O, extraction).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InstallError {
    /// Whether this error represents a problem with the uploaded package
    /// rather than with the host system.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            InstallError::InvalidPackage { .. }
                | InstallError::InvalidManifest { .. }
                | InstallError::AlreadyInstalled { .. }
        )
    }

    pub(crate) fn invalid_package(reason: impl Into<String>) -> Self {
        InstallError::InvalidPackage {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_manifest(reason: impl Into<String>) -> Self {
        InstallError::InvalidManifest {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_user_errors_are_flagged() {
        assert!(InstallError::invalid_package("truncated").is_user_error());
        assert!(InstallError::invalid_manifest("no module.json").is_user_error());
        assert!(
            InstallError::AlreadyInstalled {
                module: "blog".to_string()
            }
            .is_user_error()
        );
    }

    #[test]
    fn test_infrastructure_errors_are_not_user_errors() {
        let history = InstallError::HistoryWrite {
            module: "blog".to_string(),
            source: anyhow!("disk full"),
        };
        assert!(!history.is_user_error());
        assert!(!InstallError::Other(anyhow!("io")).is_user_error());
    }

    #[test]
    fn test_error_messages_name_the_module() {
        let err = InstallError::AlreadyInstalled {
            module: "blog".to_string(),
        };
        assert!(err.to_string().contains("blog"));
    }
}
