//! Built-in plugins

pub mod calc;
pub mod json;

use tracing::debug;

use crate::error::PluginError;
use crate::plugin::PluginRegistry;

/// Register `calc` and `json`, replacing any plugins of the same names
pub fn register_builtin_plugins(registry: &PluginRegistry) -> Result<(), PluginError> {
    registry.register(calc::descriptor()?);
    registry.register(json::descriptor()?);
    debug!(plugins = registry.len(), "registered built-in plugins");
    Ok(())
}
