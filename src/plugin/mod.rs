//! Plugins: a token rule set, a grammar engine and named command resolvers
//!
//! A [`PluginDescriptor`] is assembled with [`PluginBuilder`], which checks
//! the definition the same way a schema document is checked: every problem
//! with the command table is collected into one [`PluginError::Invalid`].
//! Descriptors are immutable once built; registering a new descriptor under
//! the same name replaces the old one (see [`registry`]).

pub mod manifest;
pub mod registry;
pub(crate) mod suggest;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::{PluginError, ValidationCause, ValidationError};
use crate::grammar::{notation, CstNode, GrammarEngine, GrammarRule};
use crate::lexer::{Token, TokenRule, TokenRuleSet};

pub use manifest::{PluginManifest, ResolverCatalog};
pub use registry::PluginRegistry;

/// Everything a resolver gets to see for one dispatch
#[derive(Debug, Clone, Copy)]
pub struct ResolverInput<'a> {
    pub plugin: &'a str,
    pub command: &'a str,
    /// Raw input text as passed to dispatch
    pub raw: &'a str,
    /// Parse tree, when the command has an entry rule
    pub cst: Option<&'a CstNode>,
    /// Tokens left after the entry rule, for commands allowing a remainder
    pub remainder: &'a [Token],
}

impl<'a> ResolverInput<'a> {
    /// Input for a command without an entry rule
    pub fn raw(plugin: &'a str, command: &'a str, raw: &'a str) -> Self {
        Self {
            plugin,
            command,
            raw,
            cst: None,
            remainder: &[],
        }
    }

    /// The parse tree, or an error naming the command that lacks one
    pub fn require_cst(&self) -> anyhow::Result<&'a CstNode> {
        self.cst.ok_or_else(|| {
            anyhow::anyhow!(
                "command '{}.{}' has no entry rule, no parse tree available",
                self.plugin,
                self.command
            )
        })
    }
}

/// Value produced by a resolver. The dispatcher forwards it untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResolverOutput {
    Tree(CstNode),
    Value(Value),
}

impl ResolverOutput {
    pub fn as_tree(&self) -> Option<&CstNode> {
        match self {
            ResolverOutput::Tree(node) => Some(node),
            ResolverOutput::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            ResolverOutput::Value(value) => Some(value),
            ResolverOutput::Tree(_) => None,
        }
    }

    /// JSON form, used when the output is stored as a variable
    pub fn into_value(self) -> Value {
        match self {
            ResolverOutput::Tree(node) => node.to_json(),
            ResolverOutput::Value(value) => value,
        }
    }
}

impl From<CstNode> for ResolverOutput {
    fn from(node: CstNode) -> Self {
        ResolverOutput::Tree(node)
    }
}

impl From<Value> for ResolverOutput {
    fn from(value: Value) -> Self {
        ResolverOutput::Value(value)
    }
}

/// Command resolver. Failures are reported through `anyhow` and wrapped by
/// the dispatcher with plugin and command context.
pub type Resolver =
    Arc<dyn Fn(&ResolverInput<'_>) -> anyhow::Result<ResolverOutput> + Send + Sync>;

/// Wrap a closure as a [`Resolver`]
pub fn resolver<F>(f: F) -> Resolver
where
    F: Fn(&ResolverInput<'_>) -> anyhow::Result<ResolverOutput> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One named command of a plugin
#[derive(Clone)]
pub struct CommandSpec {
    pub name: String,
    /// Grammar rule the raw input must match; `None` hands the raw text
    /// straight to the resolver
    pub entry_rule: Option<String>,
    /// Accept tokens left over after the entry rule
    pub allow_remainder: bool,
    pub description: Option<String>,
    pub resolver: Resolver,
    /// Called with the raw input when tokenizing or parsing fails
    pub fallback: Option<Resolver>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, resolver: Resolver) -> Self {
        Self {
            name: name.into(),
            entry_rule: None,
            allow_remainder: false,
            description: None,
            resolver,
            fallback: None,
        }
    }

    pub fn entry(mut self, rule: impl Into<String>) -> Self {
        self.entry_rule = Some(rule.into());
        self
    }

    pub fn allow_remainder(mut self) -> Self {
        self.allow_remainder = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn fallback(mut self, resolver: Resolver) -> Self {
        self.fallback = Some(resolver);
        self
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("entry_rule", &self.entry_rule)
            .field("allow_remainder", &self.allow_remainder)
            .field("description", &self.description)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

/// A registered plugin
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    name: String,
    description: Option<String>,
    tokens: TokenRuleSet,
    grammar: GrammarEngine,
    commands: BTreeMap<String, CommandSpec>,
}

impl PluginDescriptor {
    pub fn builder(name: impl Into<String>) -> PluginBuilder {
        PluginBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tokens(&self) -> &TokenRuleSet {
        &self.tokens
    }

    pub fn grammar(&self) -> &GrammarEngine {
        &self.grammar
    }

    pub fn command(&self, name: &str) -> Option<&CommandSpec> {
        self.commands.get(name)
    }

    /// Command names in sorted order
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn commands(&self) -> impl Iterator<Item = &CommandSpec> {
        self.commands.values()
    }
}

/// Assembles and checks a [`PluginDescriptor`]
#[derive(Debug, Default)]
pub struct PluginBuilder {
    name: String,
    description: Option<String>,
    token_rules: Vec<TokenRule>,
    grammar_rules: Vec<GrammarRule>,
    notation: Option<String>,
    commands: Vec<CommandSpec>,
}

impl PluginBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn token(mut self, rule: TokenRule) -> Self {
        self.token_rules.push(rule);
        self
    }

    pub fn tokens(mut self, rules: impl IntoIterator<Item = TokenRule>) -> Self {
        self.token_rules.extend(rules);
        self
    }

    pub fn rule(mut self, rule: GrammarRule) -> Self {
        self.grammar_rules.push(rule);
        self
    }

    /// Grammar rules in textual notation, resolved against this plugin's
    /// token rules when the descriptor is built
    pub fn grammar_notation(mut self, source: impl Into<String>) -> Self {
        self.notation = Some(source.into());
        self
    }

    pub fn command(mut self, command: CommandSpec) -> Self {
        self.commands.push(command);
        self
    }

    pub fn build(self) -> Result<PluginDescriptor, PluginError> {
        let plugin = self.name;
        if plugin.trim().is_empty() {
            return Err(PluginError::Invalid {
                plugin,
                errors: vec![ValidationError::new(
                    "name",
                    ValidationCause::MissingField("name".to_string()),
                )],
            });
        }

        let grammar_error = |source| PluginError::Grammar {
            plugin: plugin.clone(),
            source,
        };

        let tokens = TokenRuleSet::new(self.token_rules).map_err(grammar_error)?;

        let mut rules = self.grammar_rules;
        if let Some(source) = &self.notation {
            rules.extend(notation::parse_rules(source, &tokens).map_err(grammar_error)?);
        }
        let grammar = GrammarEngine::new(rules).map_err(grammar_error)?;
        grammar.check_token_kinds(&tokens).map_err(grammar_error)?;

        let mut errors = Vec::new();
        let mut commands = BTreeMap::new();
        for command in self.commands {
            let path = format!("commands.{}", command.name);
            if command.name.trim().is_empty() {
                errors.push(ValidationError::new(
                    "commands",
                    ValidationCause::Constraint("command name must not be empty".to_string()),
                ));
                continue;
            }
            if let Some(entry) = &command.entry_rule {
                if !grammar.has_rule(entry) {
                    errors.push(ValidationError::new(
                        format!("{}.entry", path),
                        ValidationCause::UnknownRule(entry.clone()),
                    ));
                }
            } else {
                if command.allow_remainder {
                    errors.push(ValidationError::new(
                        format!("{}.allow_remainder", path),
                        ValidationCause::Constraint(
                            "allow_remainder requires an entry rule".to_string(),
                        ),
                    ));
                }
                if command.fallback.is_some() {
                    errors.push(ValidationError::new(
                        format!("{}.fallback", path),
                        ValidationCause::Constraint("fallback requires an entry rule".to_string()),
                    ));
                }
            }
            if commands.contains_key(&command.name) {
                errors.push(ValidationError::new(
                    path,
                    ValidationCause::DuplicateCommand(command.name.clone()),
                ));
                continue;
            }
            commands.insert(command.name.clone(), command);
        }

        if !errors.is_empty() {
            return Err(PluginError::Invalid { plugin, errors });
        }

        Ok(PluginDescriptor {
            name: plugin,
            description: self.description,
            tokens,
            grammar,
            commands,
        })
    }
}
