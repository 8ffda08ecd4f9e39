//! Loading schemas and plugin manifests from a config directory
//!
//! Run with: cargo test --test config_loading

use std::fs;
use std::sync::Arc;

use dsl_plugins::{
    dispatch, ConfigLoader, DispatchError, DslError, ParseError, PluginRegistry, ResolverCatalog,
};
use serde_json::json;
use tempfile::TempDir;

fn shipped_config() -> ConfigLoader {
    ConfigLoader::new(concat!(env!("CARGO_MANIFEST_DIR"), "/config"))
}

#[test]
fn test_shipped_config_is_valid() {
    let loader = shipped_config();
    let schema = loader.load_schema().unwrap();
    assert!(schema.piping().enabled);

    let plugins = loader
        .load_plugins(&ResolverCatalog::with_builtins())
        .unwrap();
    let mut names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["call", "words"]);
}

#[test]
fn test_shipped_call_plugin_parses_nested_calls() {
    let registry = Arc::new(PluginRegistry::new());
    let mut session = shipped_config()
        .load_session(registry, &ResolverCatalog::with_builtins())
        .unwrap();

    let out = session
        .execute("call", "sum", r#"max(1, min(2, 3), "x", ${base})"#)
        .unwrap();
    assert_eq!(out.into_value(), json!(16));

    let tree = session
        .execute("call", "parse", "f()")
        .unwrap();
    assert_eq!(tree.as_tree().map(|t| t.lexemes()), Some(vec!["f", "(", ")"]));
}

#[test]
fn test_call_sum_falls_back_to_plain_add() {
    let registry = Arc::new(PluginRegistry::new());
    let mut session = shipped_config()
        .load_session(registry, &ResolverCatalog::with_builtins())
        .unwrap();

    let out = session.execute("call", "sum", "add 4 ${base}").unwrap();
    assert_eq!(out.into_value(), json!({ "result": 14 }));

    // neither the grammar nor the fallback accepts this
    let err = session.execute("call", "sum", "f(1").unwrap_err();
    assert!(matches!(
        err,
        DslError::Dispatch(DispatchError::Parse { .. })
    ));
}

fn nested_call(depth: usize) -> String {
    format!("{}1{}", "f(".repeat(depth), ")".repeat(depth))
}

#[test]
fn test_deeply_nested_call_is_a_parse_error() {
    let registry = Arc::new(PluginRegistry::new());
    shipped_config()
        .register_plugins(&registry, &ResolverCatalog::with_builtins())
        .unwrap();

    let tree = dispatch(&registry, "call", "parse", &nested_call(50)).unwrap();
    assert_eq!(tree.as_tree().map(|t| t.all_tokens().len()), Some(151));

    let err = dispatch(&registry, "call", "parse", &nested_call(10_000)).unwrap_err();
    assert!(
        matches!(
            err,
            DispatchError::Parse {
                source: ParseError::NestingTooDeep { .. },
                ..
            }
        ),
        "{:?}",
        err
    );
}

#[test]
fn test_words_plugin_remainder() {
    let registry = Arc::new(PluginRegistry::new());
    let mut session = shipped_config()
        .load_session(registry, &ResolverCatalog::with_builtins())
        .unwrap();

    let split = session.execute("words", "split", "a, b, c").unwrap();
    assert_eq!(split.into_value(), json!(["a", ",", "b", ",", "c"]));

    let first = session.execute("words", "first", "a, b c d").unwrap();
    assert_eq!(first.as_tree().map(|t| t.lexemes()), Some(vec!["a", ",", "b"]));

    assert!(session.execute("words", "tree", "a, b c d").is_err());
}

#[test]
fn test_manifest_with_bad_grammar_fails_loading() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("plugins")).unwrap();
    fs::write(
        dir.path().join("plugins/loop.yaml"),
        "name: loop\ntokens:\n  - { name: A, literal: a }\ngrammar: |\n  x ::= y A ;\n  y ::= x ;\n",
    )
    .unwrap();

    let err = ConfigLoader::new(dir.path())
        .load_plugins(&ResolverCatalog::with_builtins())
        .unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("Failed to build plugin 'loop'"), "{}", message);
    assert!(message.contains("Left recursion detected: x -> y -> x"), "{}", message);
}
