//! Error handling for the plugin DSL framework
//!
//! Every layer returns a typed failure built with thiserror. `DslError`
//! collects them for callers that drive several layers at once (sessions,
//! the config loader, the CLI).

use std::fmt;

use thiserror::Error;

use crate::lexer::Token;

/// Main error type for the framework
#[derive(Error, Debug)]
pub enum DslError {
    #[error("Schema validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Variable error: {0}")]
    Variable(#[from] VariableError),

    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

impl From<Vec<ValidationError>> for DslError {
    fn from(errors: Vec<ValidationError>) -> Self {
        DslError::Validation(errors)
    }
}

// =============================================================================
// SCHEMA VALIDATION
// =============================================================================

/// A single problem found while validating a schema document or a plugin
/// definition. Validation always produces a list of these, never a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{path}: {cause}")]
pub struct ValidationError {
    /// Dotted path to the offending field, `$` for the document root
    pub path: String,
    pub cause: ValidationCause,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, cause: ValidationCause) -> Self {
        Self {
            path: path.into(),
            cause,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationCause {
    #[error("malformed document: {0}")]
    Malformed(String),

    #[error("duplicate variable name '{0}'")]
    DuplicateVariable(String),

    #[error("duplicate command name '{0}'")]
    DuplicateCommand(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid variable name '{0}'")]
    InvalidName(String),

    #[error("'{0}' is reserved")]
    ReservedName(String),

    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    #[error("{0}")]
    Constraint(String),
}

/// Render a list of validation errors on one line
pub fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// =============================================================================
// VARIABLE STORE
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VariableError {
    #[error("Variable '{name}' not found")]
    NotFound { name: String },

    #[error("Variable '{name}' is not declared in the schema")]
    NotDeclared { name: String },

    #[error("Variable '{name}' is declared as {expected}, cannot assign a {found} value")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Unterminated variable reference starting at offset {offset}")]
    UnterminatedReference { offset: usize },
}

// =============================================================================
// LEXING AND PARSING
// =============================================================================

/// No token rule matched at `offset`. The tokenizer never skips input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("No token rule matches at offset {offset}: '{remaining}'")]
pub struct LexError {
    pub offset: usize,
    pub remaining: String,
}

/// What the parser saw where an expectation failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    Token(Token),
    EndOfInput,
}

impl fmt::Display for Found {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Found::Token(token) => write!(f, "{}:'{}'", token.kind, token.lexeme),
            Found::EndOfInput => write!(f, "end of input"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error(
        "In rule '{rule}': expected {} but found {found} at offset {offset}",
        .expected.join(" or ")
    )]
    Unexpected {
        rule: String,
        /// Token kinds that would have been accepted, in declaration order
        expected: Vec<String>,
        found: Found,
        offset: usize,
    },

    #[error("Rule '{rule}' not found")]
    UnknownRule { rule: String },

    #[error("Unexpected trailing input {found} at offset {offset}")]
    TrailingInput { found: Found, offset: usize },

    #[error("Input nested too deeply in rule '{rule}' at offset {offset} (limit {limit})")]
    NestingTooDeep {
        rule: String,
        offset: usize,
        limit: usize,
    },
}

impl ParseError {
    /// The first expected token kind, for single-expectation failures
    pub fn expected_kind(&self) -> Option<&str> {
        match self {
            ParseError::Unexpected { expected, .. } => expected.first().map(String::as_str),
            _ => None,
        }
    }

    pub fn found(&self) -> Option<&Found> {
        match self {
            ParseError::Unexpected { found, .. } | ParseError::TrailingInput { found, .. } => {
                Some(found)
            }
            ParseError::UnknownRule { .. } | ParseError::NestingTooDeep { .. } => None,
        }
    }
}

/// Definition-time problems with token rules or grammar rules
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Token rule '{name}' is declared more than once")]
    DuplicateTokenRule { name: String },

    #[error("Token rule set has no non-skip rule, no tokens can be emitted")]
    NoEmittingTokenRule,

    #[error("Invalid pattern for token rule '{rule}': {message}")]
    InvalidPattern { rule: String, message: String },

    #[error("Grammar rule '{name}' is declared more than once")]
    DuplicateRule { name: String },

    #[error("Undefined rule '{name}' referenced in rule '{rule}'")]
    UndefinedReference { name: String, rule: String },

    #[error("Unknown token kind '{kind}' consumed in rule '{rule}'")]
    UnknownTokenKind { kind: String, rule: String },

    #[error("Left recursion detected: {chain}")]
    LeftRecursion { chain: String },

    #[error("Rule '{rule}' repeats an expression that can match nothing")]
    NullableRepeat { rule: String },

    #[error("Ambiguous choice in rule '{rule}': more than one alternative starts with '{kind}'")]
    AmbiguousChoice { rule: String, kind: String },

    #[error("Grammar notation error: {message}")]
    Notation { message: String },
}

// =============================================================================
// PLUGINS AND DISPATCH
// =============================================================================

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin '{plugin}' is invalid: {}", format_validation_errors(.errors))]
    Invalid {
        plugin: String,
        errors: Vec<ValidationError>,
    },

    #[error("Plugin '{plugin}' has an invalid grammar: {source}")]
    Grammar {
        plugin: String,
        #[source]
        source: GrammarError,
    },

    #[error("Plugin '{plugin}' references unknown resolver '{resolver}' for command '{command}'")]
    UnknownResolver {
        plugin: String,
        command: String,
        resolver: String,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Plugin '{plugin}' not found{}", did_you_mean(.suggestion))]
    PluginNotFound {
        plugin: String,
        suggestion: Option<String>,
    },

    #[error("Command '{command}' not found in plugin '{plugin}'{}", did_you_mean(.suggestion))]
    CommandNotFound {
        plugin: String,
        command: String,
        suggestion: Option<String>,
    },

    #[error("{plugin}.{command}: {source}")]
    Lex {
        plugin: String,
        command: String,
        #[source]
        source: LexError,
    },

    #[error("{plugin}.{command}: {source}")]
    Parse {
        plugin: String,
        command: String,
        #[source]
        source: ParseError,
    },

    #[error("{plugin}.{command}: resolver failed: {source}")]
    Resolver {
        plugin: String,
        command: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// The plugin that was active when dispatch failed
    pub fn plugin(&self) -> &str {
        match self {
            DispatchError::PluginNotFound { plugin, .. }
            | DispatchError::CommandNotFound { plugin, .. }
            | DispatchError::Lex { plugin, .. }
            | DispatchError::Parse { plugin, .. }
            | DispatchError::Resolver { plugin, .. } => plugin,
        }
    }
}

/// Failures of a piped command line
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Empty pipeline segment at position {index}")]
    EmptySegment { index: usize },

    #[error("Pipeline segment {index} '{segment}' must name a plugin and a command")]
    MissingCommand { index: usize, segment: String },

    #[error("Pipeline segment {index} failed: {source}")]
    Segment {
        index: usize,
        #[source]
        source: Box<DslError>,
    },
}

pub type DslResult<T> = Result<T, DslError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_mentions_suggestion() {
        let err = DispatchError::CommandNotFound {
            plugin: "calc".to_string(),
            command: "ad".to_string(),
            suggestion: Some("add".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Command 'ad' not found in plugin 'calc' (did you mean 'add'?)"
        );
        assert_eq!(err.plugin(), "calc");
    }

    #[test]
    fn test_parse_error_display_at_end_of_input() {
        let err = ParseError::Unexpected {
            rule: "addExpression".to_string(),
            expected: vec!["Number".to_string()],
            found: Found::EndOfInput,
            offset: 5,
        };
        assert_eq!(
            err.to_string(),
            "In rule 'addExpression': expected Number but found end of input at offset 5"
        );
        assert_eq!(err.expected_kind(), Some("Number"));
    }

    #[test]
    fn test_validation_errors_join() {
        let errors = vec![
            ValidationError::new("variables.a", ValidationCause::DuplicateVariable("a".into())),
            ValidationError::new("$", ValidationCause::MissingField("variables".into())),
        ];
        assert_eq!(
            format_validation_errors(&errors),
            "variables.a: duplicate variable name 'a'; $: missing required field 'variables'"
        );
    }
}
