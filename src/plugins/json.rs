//! JSON plugin
//!
//! Its commands take the raw input as a whole and hand it to serde_json, so
//! none of them has an entry rule. The token rules still describe JSON
//! lexically, which makes `tokenize json ...` useful for inspecting input.

use anyhow::Context;
use serde_json::{json, Value};

use crate::error::PluginError;
use crate::lexer::TokenRule;
use crate::plugin::{resolver, CommandSpec, PluginDescriptor, Resolver, ResolverOutput};

pub const NAME: &str = "json";

pub fn descriptor() -> Result<PluginDescriptor, PluginError> {
    let grammar_error = |source| PluginError::Grammar {
        plugin: NAME.to_string(),
        source,
    };

    let tokens = vec![
        TokenRule::regex("WhiteSpace", r"\s+").map_err(grammar_error)?.skipped(),
        TokenRule::literal("LBrace", "{"),
        TokenRule::literal("RBrace", "}"),
        TokenRule::literal("LBracket", "["),
        TokenRule::literal("RBracket", "]"),
        TokenRule::literal("Colon", ":"),
        TokenRule::literal("Comma", ","),
        TokenRule::literal("True", "true"),
        TokenRule::literal("False", "false"),
        TokenRule::literal("Null", "null"),
        TokenRule::regex("String", r#""(?:[^"\\]|\\.)*""#).map_err(grammar_error)?,
        TokenRule::regex("Number", r"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?")
            .map_err(grammar_error)?,
    ];

    PluginDescriptor::builder(NAME)
        .description("Parse and format JSON documents")
        .tokens(tokens)
        .command(
            CommandSpec::new("parseJson", parse_resolver()).describe("Parse raw input as JSON"),
        )
        .command(CommandSpec::new("parse", parse_resolver()).describe("Alias of parseJson"))
        .command(
            CommandSpec::new("pretty", pretty_resolver())
                .describe("Re-render raw input as pretty-printed JSON"),
        )
        .build()
}

fn parse_raw(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw.trim()).context("invalid JSON")
}

pub fn parse_resolver() -> Resolver {
    resolver(|input| Ok(ResolverOutput::Value(parse_raw(input.raw)?)))
}

/// Never fails: invalid input becomes `{"error": .., "details": ..}`.
/// Meant as a command fallback.
pub fn report_resolver() -> Resolver {
    resolver(|input| {
        let value = match serde_json::from_str::<Value>(input.raw.trim()) {
            Ok(value) => value,
            Err(e) => json!({ "error": "Invalid JSON string", "details": e.to_string() }),
        };
        Ok(ResolverOutput::Value(value))
    })
}

pub fn pretty_resolver() -> Resolver {
    resolver(|input| {
        let value = parse_raw(input.raw)?;
        let text = serde_json::to_string_pretty(&value)?;
        Ok(ResolverOutput::Value(Value::String(text)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::ResolverInput;

    #[test]
    fn test_report_turns_errors_into_values() {
        let report = report_resolver();
        let out = report(&ResolverInput::raw(NAME, "check", "[1]")).unwrap();
        assert_eq!(out, ResolverOutput::Value(json!([1])));

        let out = report(&ResolverInput::raw(NAME, "check", "{oops")).unwrap();
        let value = out.into_value();
        assert_eq!(value["error"], "Invalid JSON string");
        assert!(value["details"].as_str().is_some_and(|d| !d.is_empty()));
    }

    #[test]
    fn test_parse_valid_json() {
        let out = parse_resolver()(&ResolverInput::raw(NAME, "parseJson", r#" {"a": [1, 2]} "#))
            .unwrap();
        assert_eq!(out, ResolverOutput::Value(json!({"a": [1, 2]})));
    }

    #[test]
    fn test_invalid_json_cites_cause() {
        let err = parse_resolver()(&ResolverInput::raw(NAME, "parseJson", "{not valid json"))
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid JSON");
        // the serde_json error is kept as the cause
        assert!(format!("{:#}", err).starts_with("invalid JSON: "));
    }

    #[test]
    fn test_pretty() {
        let out = pretty_resolver()(&ResolverInput::raw(NAME, "pretty", "[1,2]")).unwrap();
        assert_eq!(out, ResolverOutput::Value(json!("[\n  1,\n  2\n]")));
    }

    #[test]
    fn test_tokens_describe_json() {
        let plugin = descriptor().unwrap();
        let kinds: Vec<String> = plugin
            .tokens()
            .tokenize(r#"{"k": -1.5e3, "b": [true, null]}"#)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                "LBrace", "String", "Colon", "Number", "Comma", "String", "Colon", "LBracket",
                "True", "Comma", "Null", "RBracket", "RBrace"
            ]
        );
    }
}
