//! dsl-plugins: pluggable DSL command framework
//!
//! This crate contains:
//! - Schema documents and their validation (JSON meta-schema plus semantic checks)
//! - A closed, typed variable store seeded from a schema, with `${name}` substitution
//! - Per-plugin token rule sets and a first-match tokenizer
//! - An LL(1) grammar rule engine producing concrete syntax trees
//! - A plugin registry and a dispatcher routing (plugin, command, input) to resolvers
//! - Sessions with command piping, and a YAML configuration loader
//!
//! ```no_run
//! use dsl_plugins::{PluginRegistry, SchemaDocument, Session};
//!
//! let schema = SchemaDocument::from_yaml_str("variables:\n  a: 3\n").unwrap();
//! let mut session = Session::new(PluginRegistry::global(), &schema).unwrap();
//! let tree = session.execute("calc", "add", "add ${a} 4").unwrap();
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod plugin;
pub mod plugins;
pub mod schema;
pub mod session;
pub mod variables;

// Re-export commonly used types
pub use config::ConfigLoader;
pub use dispatch::{dispatch, Dispatcher};
pub use error::{
    DispatchError, DslError, DslResult, Found, GrammarError, LexError, ParseError, PipelineError,
    PluginError, ValidationCause, ValidationError, VariableError,
};
pub use grammar::{CstChild, CstNode, Expectation, GrammarEngine, GrammarRule};
pub use lexer::{tokenize, Token, TokenPattern, TokenRule, TokenRuleSet};
pub use plugin::{
    resolver, CommandSpec, PluginBuilder, PluginDescriptor, PluginManifest, PluginRegistry,
    Resolver, ResolverCatalog, ResolverInput, ResolverOutput,
};
pub use plugins::register_builtin_plugins;
pub use schema::{validate, PipingConfig, SchemaDocument, VarType, VariableDecl};
pub use session::Session;
pub use variables::VariableStore;
