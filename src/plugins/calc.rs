//! Arithmetic plugin
//!
//! `add 3 4` is parsed by `addExpression ::= Add Number Number`. The `add`
//! command only parses and hands back the tree; `sum` evaluates it.

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Number, Value};

use crate::error::PluginError;
use crate::grammar::GrammarRule;
use crate::lexer::TokenRule;
use crate::plugin::{resolver, CommandSpec, PluginDescriptor, Resolver, ResolverOutput};

pub const NAME: &str = "calc";

pub fn descriptor() -> Result<PluginDescriptor, PluginError> {
    let grammar_error = |source| PluginError::Grammar {
        plugin: NAME.to_string(),
        source,
    };

    PluginDescriptor::builder(NAME)
        .description("Integer addition")
        .token(
            TokenRule::regex("WhiteSpace", r"\s+")
                .map_err(grammar_error)?
                .skipped(),
        )
        .token(TokenRule::literal("Add", "add"))
        .token(TokenRule::regex("Number", r"\d+").map_err(grammar_error)?)
        .rule(
            GrammarRule::new("addExpression")
                .consume("Add")
                .consume("Number")
                .consume("Number"),
        )
        .command(
            CommandSpec::new("add", cst_resolver())
                .entry("addExpression")
                .describe("Parse 'add <n> <n>' and return the parse tree"),
        )
        .command(
            CommandSpec::new("sum", sum_resolver())
                .entry("addExpression")
                .describe("Parse 'add <n> <n>' and return the sum"),
        )
        .build()
}

/// Returns the parse tree unchanged
pub fn cst_resolver() -> Resolver {
    resolver(|input| Ok(ResolverOutput::Tree(input.require_cst()?.clone())))
}

/// Lexemes of the parse tree as a JSON array of strings
pub fn lexemes_resolver() -> Resolver {
    resolver(|input| {
        let cst = input.require_cst()?;
        Ok(ResolverOutput::Value(json!(cst.lexemes())))
    })
}

/// Sum of every numeric lexeme in the parse tree. Integers stay integers
/// until a fractional lexeme shows up.
pub fn sum_resolver() -> Resolver {
    resolver(|input| {
        let cst = input.require_cst()?;
        let mut int_total: i64 = 0;
        let mut float_total: Option<f64> = None;
        let mut seen = 0usize;

        for token in cst.all_tokens() {
            if let Ok(n) = token.lexeme.parse::<i64>() {
                int_total = int_total
                    .checked_add(n)
                    .ok_or_else(|| anyhow!("integer overflow adding {}", token.lexeme))?;
            } else if let Some(f) = token
                .lexeme
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
            {
                *float_total.get_or_insert(0.0) += f;
            } else {
                continue;
            }
            seen += 1;
        }

        if seen == 0 {
            bail!("no numeric operands in '{}'", input.raw);
        }

        let value = match float_total {
            None => Value::Number(int_total.into()),
            Some(f) => Value::Number(
                Number::from_f64(f + int_total as f64)
                    .context("sum is not a finite number")?,
            ),
        };
        Ok(ResolverOutput::Value(value))
    })
}

/// Reads `add <a> <b>` from the raw text without the grammar, so signed
/// operands are accepted. Meant as a command fallback.
pub fn plain_add_resolver() -> Resolver {
    resolver(|input| {
        let words: Vec<&str> = input.raw.split_whitespace().collect();
        let [verb, a, b] = words.as_slice() else {
            bail!("expected 'add <a> <b>', got '{}'", input.raw.trim());
        };
        if *verb != "add" {
            bail!("unknown operation '{}'", verb);
        }
        let a: i64 = a.parse().with_context(|| format!("'{}' is not an integer", a))?;
        let b: i64 = b.parse().with_context(|| format!("'{}' is not an integer", b))?;
        let sum = a
            .checked_add(b)
            .ok_or_else(|| anyhow!("integer overflow adding {} and {}", a, b))?;
        Ok(ResolverOutput::Value(json!({ "result": sum })))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::CstNode;
    use crate::plugin::ResolverInput;

    fn run(resolver: &Resolver, cst: &CstNode) -> anyhow::Result<ResolverOutput> {
        resolver(&ResolverInput {
            plugin: NAME,
            command: "test",
            raw: "",
            cst: Some(cst),
            remainder: &[],
        })
    }

    #[test]
    fn test_descriptor_shape() {
        let plugin = descriptor().unwrap();
        assert_eq!(plugin.command_names().collect::<Vec<_>>(), vec!["add", "sum"]);
        assert!(plugin.tokens().emits("Number"));
        assert!(!plugin.tokens().emits("WhiteSpace"));
    }

    #[test]
    fn test_sum_of_tree() {
        let plugin = descriptor().unwrap();
        let tokens = plugin.tokens().tokenize("add 3 4").unwrap();
        let cst = plugin.grammar().parse("addExpression", &tokens).unwrap();

        let out = run(&sum_resolver(), &cst).unwrap();
        assert_eq!(out, ResolverOutput::Value(json!(7)));

        let out = run(&lexemes_resolver(), &cst).unwrap();
        assert_eq!(out, ResolverOutput::Value(json!(["add", "3", "4"])));
    }

    #[test]
    fn test_sum_overflow_is_error() {
        let plugin = descriptor().unwrap();
        let input = format!("add {} 1", i64::MAX);
        let tokens = plugin.tokens().tokenize(&input).unwrap();
        let cst = plugin.grammar().parse("addExpression", &tokens).unwrap();
        let err = run(&sum_resolver(), &cst).unwrap_err();
        assert!(err.to_string().contains("overflow"));
    }

    #[test]
    fn test_plain_add() {
        let plain = plain_add_resolver();
        let out = plain(&ResolverInput::raw(NAME, "sum", " add -2  9 ")).unwrap();
        assert_eq!(out, ResolverOutput::Value(json!({ "result": 7 })));

        let err = plain(&ResolverInput::raw(NAME, "sum", "add 1")).unwrap_err();
        assert!(err.to_string().contains("expected 'add <a> <b>'"));
        let err = plain(&ResolverInput::raw(NAME, "sum", "mul 1 2")).unwrap_err();
        assert!(err.to_string().contains("unknown operation 'mul'"));
        assert!(plain(&ResolverInput::raw(NAME, "sum", "add x 2")).is_err());
    }

    #[test]
    fn test_sum_without_numbers_fails() {
        let err = run(&sum_resolver(), &CstNode::new("empty")).unwrap_err();
        assert!(err.to_string().contains("no numeric operands"));
    }
}
