//! Process-wide plugin registry
//!
//! Plugins are stored as `Arc<PluginDescriptor>` behind one `RwLock`, so a
//! lookup hands out a descriptor that stays valid even if the plugin is
//! replaced while a dispatch is running. Registration never fails: a new
//! descriptor with an existing name replaces the old one in a single write.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::{info, warn};

use super::suggest::closest;
use super::PluginDescriptor;
use crate::error::DispatchError;

static GLOBAL_REGISTRY: OnceLock<Arc<PluginRegistry>> = OnceLock::new();

#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: RwLock<BTreeMap<String, Arc<PluginDescriptor>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process, preloaded with the built-in
    /// plugins
    pub fn global() -> Arc<PluginRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| {
                let registry = PluginRegistry::new();
                if let Err(e) = crate::plugins::register_builtin_plugins(&registry) {
                    warn!(error = %e, "failed to register built-in plugins");
                }
                Arc::new(registry)
            })
            .clone()
    }

    /// Add a plugin, returning the descriptor it replaced
    pub fn register(&self, descriptor: PluginDescriptor) -> Option<Arc<PluginDescriptor>> {
        let name = descriptor.name().to_string();
        let commands = descriptor.command_names().count();
        let previous = self
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(descriptor));

        if previous.is_some() {
            info!(plugin = %name, commands, "replaced plugin");
        } else {
            info!(plugin = %name, commands, "registered plugin");
        }
        previous
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<PluginDescriptor>, DispatchError> {
        let plugins = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        let found = plugins
            .get(name)
            .cloned()
            .ok_or_else(|| DispatchError::PluginNotFound {
                plugin: name.to_string(),
                suggestion: closest(name, plugins.keys().map(String::as_str)),
            });
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Command names of a plugin, sorted
    pub fn list_commands(&self, plugin: &str) -> Result<Vec<String>, DispatchError> {
        let descriptor = self.lookup(plugin)?;
        Ok(descriptor.command_names().map(str::to_string).collect())
    }

    /// Registered plugin names, sorted
    pub fn list_plugins(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<PluginDescriptor>> {
        self.plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
    }

    pub fn len(&self) -> usize {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
