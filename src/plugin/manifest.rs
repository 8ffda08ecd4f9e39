//! Declarative plugin manifests
//!
//! ```yaml
//! name: calc
//! description: integer arithmetic
//! tokens:
//!   - { name: WhiteSpace, pattern: '\s+', skip: true }
//!   - { name: Add, literal: add }
//!   - { name: Number, pattern: '\d+' }
//! grammar: |
//!   addExpression ::= Add Number Number ;
//! commands:
//!   add: { entry: addExpression, resolver: cst }
//!   sum: { entry: addExpression, resolver: sum, fallback: plain_add }
//! ```
//!
//! Resolvers are code, so a manifest names them and a [`ResolverCatalog`]
//! supplies the implementation.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use super::{CommandSpec, PluginDescriptor, Resolver};
use crate::error::{PluginError, ValidationCause, ValidationError};
use crate::grammar::unreachable_rules;
use crate::lexer::TokenRule;
use crate::plugins::{calc, json};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub tokens: Vec<TokenManifest>,
    #[serde(default)]
    pub grammar: Option<String>,
    #[serde(default)]
    pub commands: Entries<CommandManifest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenManifest {
    pub name: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub literal: Option<String>,
    #[serde(default)]
    pub skip: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandManifest {
    #[serde(default)]
    pub entry: Option<String>,
    pub resolver: String,
    /// Catalog resolver used when the input does not tokenize or parse
    #[serde(default)]
    pub fallback: Option<String>,
    #[serde(default)]
    pub allow_remainder: bool,
    #[serde(default)]
    pub description: Option<String>,
}

/// Mapping entries in source order, duplicates kept so they can be reported
#[derive(Debug, Clone)]
pub struct Entries<T>(pub Vec<(String, T)>);

impl<T> Default for Entries<T> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Entries<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for EntriesVisitor<T> {
            type Value = Entries<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Entries<T>, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

impl PluginManifest {
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Build the descriptor, looking resolvers up in `catalog`
    pub fn into_descriptor(
        self,
        catalog: &ResolverCatalog,
    ) -> Result<PluginDescriptor, PluginError> {
        let mut errors = Vec::new();
        let mut token_rules = Vec::with_capacity(self.tokens.len());

        for (index, token) in self.tokens.into_iter().enumerate() {
            let path = format!("tokens[{}]", index);
            let rule = match (token.pattern, token.literal) {
                (Some(pattern), None) => {
                    TokenRule::regex(token.name, &pattern).map_err(|source| {
                        PluginError::Grammar {
                            plugin: self.name.clone(),
                            source,
                        }
                    })?
                }
                (None, Some(literal)) if !literal.is_empty() => {
                    TokenRule::literal(token.name, literal)
                }
                (None, Some(_)) => {
                    errors.push(ValidationError::new(
                        format!("{}.literal", path),
                        ValidationCause::Constraint("literal must not be empty".to_string()),
                    ));
                    continue;
                }
                _ => {
                    errors.push(ValidationError::new(
                        path,
                        ValidationCause::Constraint(
                            "exactly one of 'pattern' or 'literal' is required".to_string(),
                        ),
                    ));
                    continue;
                }
            };
            token_rules.push(if token.skip { rule.skipped() } else { rule });
        }

        if !errors.is_empty() {
            return Err(PluginError::Invalid {
                plugin: self.name,
                errors,
            });
        }

        let mut builder = PluginDescriptor::builder(self.name.clone()).tokens(token_rules);
        if let Some(description) = self.description {
            builder = builder.description(description);
        }
        if let Some(grammar) = self.grammar {
            builder = builder.grammar_notation(grammar);
        }

        for (name, command) in self.commands.0 {
            let resolver = catalog
                .get(&command.resolver)
                .ok_or_else(|| PluginError::UnknownResolver {
                    plugin: self.name.clone(),
                    command: name.clone(),
                    resolver: command.resolver.clone(),
                })?;
            let fallback = command
                .fallback
                .map(|fallback| {
                    catalog
                        .get(&fallback)
                        .ok_or_else(|| PluginError::UnknownResolver {
                            plugin: self.name.clone(),
                            command: name.clone(),
                            resolver: fallback.clone(),
                        })
                })
                .transpose()?;
            let mut spec = CommandSpec::new(name, resolver);
            if let Some(fallback) = fallback {
                spec = spec.fallback(fallback);
            }
            if let Some(entry) = command.entry {
                spec = spec.entry(entry);
            }
            if command.allow_remainder {
                spec = spec.allow_remainder();
            }
            if let Some(description) = command.description {
                spec = spec.describe(description);
            }
            builder = builder.command(spec);
        }

        let descriptor = builder.build()?;
        let unused = unreachable_rules(
            descriptor.grammar(),
            descriptor.commands().filter_map(|c| c.entry_rule.as_deref()),
        );
        if !unused.is_empty() {
            warn!(
                plugin = %descriptor.name(),
                rules = ?unused,
                "grammar rules unreachable from any command"
            );
        }
        debug!(plugin = %descriptor.name(), "built plugin from manifest");
        Ok(descriptor)
    }
}

/// Named resolver implementations available to manifests
#[derive(Clone, Default)]
pub struct ResolverCatalog {
    resolvers: HashMap<String, Resolver>,
}

impl ResolverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in resolvers:
    /// - `cst`: the parse tree itself
    /// - `lexemes`: the lexemes of the parse tree as a JSON array
    /// - `sum`: sum of every numeric lexeme in the parse tree
    /// - `json`: raw input parsed as JSON
    /// - `pretty`: raw input re-rendered as pretty-printed JSON
    /// - `plain_add`: `add <a> <b>` read from the raw text, for fallbacks
    /// - `json_report`: raw input as JSON, or an error object, for fallbacks
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("cst", calc::cst_resolver());
        catalog.register("lexemes", calc::lexemes_resolver());
        catalog.register("sum", calc::sum_resolver());
        catalog.register("json", json::parse_resolver());
        catalog.register("pretty", json::pretty_resolver());
        catalog.register("plain_add", calc::plain_add_resolver());
        catalog.register("json_report", json::report_resolver());
        catalog
    }

    /// Add or replace a resolver
    pub fn register(&mut self, name: impl Into<String>, resolver: Resolver) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn get(&self, name: &str) -> Option<Resolver> {
        self.resolvers.get(name).cloned()
    }

    /// Resolver names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.resolvers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ResolverCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverCatalog")
            .field("resolvers", &self.names())
            .finish()
    }
}
