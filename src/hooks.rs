use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Identifies the module a hook is being invoked for.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleContext {
    pub module_name: String,
}

impl ModuleContext {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }
}

/// Ambient context of the request that triggered the install.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl RequestContext {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            attributes: HashMap::new(),
        }
    }
}

/// Optional install-time behavior supplied by a module.
///
/// Invoked exactly once, synchronously, after the module's binaries are in
/// place. Errors propagate to the caller unmodified; there is no sandboxing.
pub trait InstallHook: Send + Sync {
    fn on_installing(&self, module: &ModuleContext, request: &RequestContext) -> Result<()>;
}

/// Explicit mapping from module name to its install hook, built by the host
/// at startup and passed into the installer. A module without an entry
/// simply has no install-time behavior.
#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<String, Arc<dyn InstallHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module_name: impl Into<String>, hook: Arc<dyn InstallHook>) {
        self.hooks.insert(module_name.into(), hook);
    }

    pub fn resolve(&self, module_name: &str) -> Option<&Arc<dyn InstallHook>> {
        self.hooks.get(module_name)
    }
}
