pub mod archive;
pub mod error;
pub mod history;
pub mod hooks;
pub mod installer;
pub mod manifest;
pub mod paths;
pub mod references;
pub mod runtime;

pub use error::InstallError;
pub use installer::ModuleInstaller;
