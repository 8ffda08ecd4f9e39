//! Command dispatch
//!
//! `dispatch(plugin, command, raw)` resolves the plugin and the command,
//! tokenizes and parses the raw input with the plugin's own rules, and calls
//! the command's resolver. One synchronous attempt; the first failing step
//! decides the error, and the error always names the plugin and command.
//!
//! A command may carry a fallback resolver. When tokenizing or parsing
//! fails it gets the raw input instead; if it fails too, the original
//! lex or parse error is returned.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::plugin::suggest::closest;
use crate::plugin::{CommandSpec, PluginRegistry, ResolverInput, ResolverOutput};

#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<PluginRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatcher over the process-wide registry
    pub fn global() -> Self {
        Self::new(PluginRegistry::global())
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn dispatch(
        &self,
        plugin: &str,
        command: &str,
        raw: &str,
    ) -> Result<ResolverOutput, DispatchError> {
        let descriptor = self.registry.lookup(plugin)?;
        let spec = descriptor
            .command(command)
            .ok_or_else(|| DispatchError::CommandNotFound {
                plugin: plugin.to_string(),
                command: command.to_string(),
                suggestion: closest(command, descriptor.command_names()),
            })?;

        let Some(entry) = spec.entry_rule.as_deref() else {
            debug!(plugin, command, "dispatching raw input");
            return (spec.resolver)(&ResolverInput::raw(plugin, command, raw)).map_err(|source| {
                DispatchError::Resolver {
                    plugin: plugin.to_string(),
                    command: command.to_string(),
                    source,
                }
            });
        };

        let tokens = match descriptor.tokens().tokenize(raw) {
            Ok(tokens) => tokens,
            Err(source) => {
                let error = DispatchError::Lex {
                    plugin: plugin.to_string(),
                    command: command.to_string(),
                    source,
                };
                return fall_back(spec, plugin, command, raw, error);
            }
        };

        let parsed = if spec.allow_remainder {
            descriptor.grammar().parse_partial(entry, &tokens)
        } else {
            descriptor
                .grammar()
                .parse(entry, &tokens)
                .map(|cst| (cst, tokens.len()))
        };
        let (cst, consumed) = match parsed {
            Ok(parsed) => parsed,
            Err(source) => {
                let error = DispatchError::Parse {
                    plugin: plugin.to_string(),
                    command: command.to_string(),
                    source,
                };
                return fall_back(spec, plugin, command, raw, error);
            }
        };

        debug!(
            plugin,
            command,
            entry,
            tokens = tokens.len(),
            remainder = tokens.len() - consumed,
            "dispatching parsed input"
        );

        let input = ResolverInput {
            plugin,
            command,
            raw,
            cst: Some(&cst),
            remainder: &tokens[consumed..],
        };
        (spec.resolver)(&input).map_err(|source| DispatchError::Resolver {
            plugin: plugin.to_string(),
            command: command.to_string(),
            source,
        })
    }
}

/// Hand the raw input to the command's fallback, keeping `error` if there is
/// none or the fallback fails as well
fn fall_back(
    spec: &CommandSpec,
    plugin: &str,
    command: &str,
    raw: &str,
    error: DispatchError,
) -> Result<ResolverOutput, DispatchError> {
    let Some(fallback) = &spec.fallback else {
        return Err(error);
    };
    warn!(plugin, command, error = %error, "using fallback resolver");
    fallback(&ResolverInput::raw(plugin, command, raw)).map_err(|e| {
        warn!(plugin, command, error = %e, "fallback resolver failed");
        error
    })
}

/// Dispatch against an explicit registry
pub fn dispatch(
    registry: &Arc<PluginRegistry>,
    plugin: &str,
    command: &str,
    raw: &str,
) -> Result<ResolverOutput, DispatchError> {
    Dispatcher::new(Arc::clone(registry)).dispatch(plugin, command, raw)
}
