//! End-to-end dispatch through the built-in plugins
//!
//! These tests verify that:
//! 1. `calc add` parses "add 3 4" into one node with three tokens
//! 2. A short input fails in the parser, not the resolver, at end of input
//! 3. Invalid JSON fails in the `json` resolver and the cause is kept
//! 4. Unmatched input stops the tokenizer at the offending byte
//! 5. Plugin names are unique and re-registration replaces
//!
//! Run with: cargo test --test dispatch_scenarios

use std::error::Error as _;
use std::sync::Arc;

use dsl_plugins::{
    register_builtin_plugins, resolver, CommandSpec, CstChild, DispatchError, Dispatcher, Found,
    ParseError, PluginDescriptor, PluginRegistry, ResolverOutput, Token, TokenRule,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn dispatcher() -> Dispatcher {
    let registry = Arc::new(PluginRegistry::new());
    register_builtin_plugins(&registry).unwrap();
    Dispatcher::new(registry)
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_add_expression_parses_to_three_tokens() {
    let out = dispatcher().dispatch("calc", "add", "add 3 4").unwrap();
    let tree = out.as_tree().expect("add returns the parse tree");

    assert_eq!(tree.rule, "addExpression");
    assert_eq!(
        tree.children,
        vec![
            CstChild::Token(Token::new("Add", "add", 0)),
            CstChild::Token(Token::new("Number", "3", 4)),
            CstChild::Token(Token::new("Number", "4", 6)),
        ]
    );
}

#[test]
fn test_missing_operand_is_parse_error() {
    let err = dispatcher().dispatch("calc", "add", "add 3").unwrap_err();
    match err {
        DispatchError::Parse {
            plugin,
            command,
            source,
        } => {
            assert_eq!(plugin, "calc");
            assert_eq!(command, "add");
            assert_eq!(
                source,
                ParseError::Unexpected {
                    rule: "addExpression".to_string(),
                    expected: vec!["Number".to_string()],
                    found: Found::EndOfInput,
                    offset: 5,
                }
            );
        }
        other => panic!("Expected Parse error, got {:?}", other),
    }
}

#[test]
fn test_invalid_json_is_resolver_error() {
    let err = dispatcher()
        .dispatch("json", "parseJson", "{not valid json")
        .unwrap_err();

    assert!(matches!(err, DispatchError::Resolver { .. }));
    assert_eq!(
        err.to_string(),
        "json.parseJson: resolver failed: invalid JSON"
    );
    assert!(err.source().is_some());
}

#[test]
fn test_valid_json_passes_through() {
    let out = dispatcher()
        .dispatch("json", "parse", r#"{"a": [1, true, null]}"#)
        .unwrap();
    assert_eq!(out, ResolverOutput::Value(json!({"a": [1, true, null]})));
}

#[test]
fn test_lexing_fails_fast_at_unmatched_byte() {
    let registry = Arc::new(PluginRegistry::new());
    registry.register(
        PluginDescriptor::builder("nums")
            .token(TokenRule::regex("WhiteSpace", r"\s+").unwrap().skipped())
            .token(TokenRule::regex("Number", r"\d+").unwrap())
            .rule(dsl_plugins::GrammarRule::new("pair").consume("Number").consume("Number"))
            .command(
                CommandSpec::new("pair", resolver(|_| Ok(json!(null).into()))).entry("pair"),
            )
            .build()
            .unwrap(),
    );

    let err = Dispatcher::new(registry)
        .dispatch("nums", "pair", "3 $$ 4")
        .unwrap_err();
    match err {
        DispatchError::Lex { source, .. } => {
            assert_eq!(source.offset, 2);
            assert_eq!(source.remaining, "$$ 4");
        }
        other => panic!("Expected Lex error, got {:?}", other),
    }
}

#[test]
fn test_unknown_names_are_reported_before_any_work() {
    let d = dispatcher();
    assert!(matches!(
        d.dispatch("nope", "add", "").unwrap_err(),
        DispatchError::PluginNotFound { .. }
    ));
    assert!(matches!(
        d.dispatch("calc", "multiply", "add 1 2").unwrap_err(),
        DispatchError::CommandNotFound { suggestion: None, .. }
    ));
}

#[test]
fn test_reregistration_replaces_plugin() {
    let d = dispatcher();
    let replacement = PluginDescriptor::builder("calc")
        .token(TokenRule::regex("Word", r"\w+").unwrap())
        .command(CommandSpec::new(
            "echo",
            resolver(|input| Ok(json!(input.raw).into())),
        ))
        .build()
        .unwrap();
    let previous = d.registry().register(replacement);

    assert!(previous.is_some_and(|p| p.command("add").is_some()));
    assert_eq!(d.registry().list_commands("calc").unwrap(), vec!["echo"]);
    assert!(matches!(
        d.dispatch("calc", "add", "add 1 2").unwrap_err(),
        DispatchError::CommandNotFound { .. }
    ));
    assert_eq!(
        d.dispatch("calc", "echo", "hi").unwrap().into_value(),
        json!("hi")
    );
}
