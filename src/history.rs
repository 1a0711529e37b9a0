use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::paths::ModulePaths;
use crate::runtime::Runtime;

/// One immutable entry in the installation log.
///
/// Created once per successful extraction, appended and never rewritten.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstallationRecord {
    pub module_name: String,
    pub version: String,
    pub installed_at: DateTime<Utc>,
    pub user: String,
    /// File name of the archived package copy, relative to the module's
    /// history directory.
    pub archive_file: String,
}

/// Persists an audit copy of each uploaded package and the append-only
/// installation log.
///
/// A store failure fails the whole install attempt: extraction must never
/// proceed without a history entry.
#[cfg_attr(test, mockall::automock)]
pub trait HistoryStore: Send + Sync {
    /// Persist an immutable copy of the uploaded archive. Returns the file
    /// name the copy was stored under.
    fn save_installation_file(&self, module_name: &str, version: &str, bytes: &[u8])
    -> Result<String>;

    /// Append a record to the installation log.
    fn log_installation(&self, module_name: &str, record: &InstallationRecord) -> Result<()>;

    /// The full installation log, oldest entry first.
    fn read_log(&self) -> Result<Vec<InstallationRecord>>;
}

/// File-backed history store: archive copies under `<root>/history/<module>/`
/// and a JSON-lines log at `<root>/history/installations.log`.
pub struct FileHistoryStore<'a, R: Runtime> {
    runtime: &'a R,
    paths: ModulePaths,
}

impl<'a, R: Runtime> FileHistoryStore<'a, R> {
    pub fn new(runtime: &'a R, paths: ModulePaths) -> Self {
        Self { runtime, paths }
    }
}

impl<R: Runtime> HistoryStore for FileHistoryStore<'_, R> {
    #[tracing::instrument(skip(self, bytes))]
    fn save_installation_file(
        &self,
        module_name: &str,
        version: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let dir = self.paths.module_history_dir(module_name);
        self.runtime
            .create_dir_all(&dir)
            .context("Failed to create module history directory")?;

        let file_name = format!(
            "{}-{}-{}.zip",
            module_name,
            version,
            Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        let path = dir.join(&file_name);
        self.runtime
            .write(&path, bytes)
            .with_context(|| format!("Failed to save installation file {:?}", path))?;

        debug!("Saved installation file {:?}", path);
        Ok(file_name)
    }

    #[tracing::instrument(skip(self, record))]
    fn log_installation(&self, module_name: &str, record: &InstallationRecord) -> Result<()> {
        self.runtime
            .create_dir_all(&self.paths.history_dir())
            .context("Failed to create history directory")?;

        let mut line = serde_json::to_string(record)
            .with_context(|| format!("Failed to serialize installation record for {}", module_name))?;
        line.push('\n');

        self.runtime
            .append(&self.paths.installation_log(), line.as_bytes())
            .context("Failed to append to installation log")
    }

    #[tracing::instrument(skip(self))]
    fn read_log(&self) -> Result<Vec<InstallationRecord>> {
        let log_path = self.paths.installation_log();
        if !self.runtime.exists(&log_path) {
            return Ok(Vec::new());
        }

        let content = self.runtime.read_to_string(&log_path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).context("Failed to parse installation log entry")
            })
            .collect()
    }
}
