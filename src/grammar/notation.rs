//! Textual grammar notation parsed with nom combinators
//!
//! ```text
//! # comments run to end of line
//! addExpression ::= Add Number Number ;
//! call          ::= Ident LParen args? RParen ;
//! args          ::= value (Comma value)* ;
//! value         ::= Number | String | call ;
//! ```
//!
//! A name that matches a rule of the plugin's token rule set is a "consume
//! token" expectation, any other name invokes a grammar rule. Postfix `?`,
//! `*` and `+` mark optional, zero-or-more and one-or-more.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace1, not_line_ending, one_of},
    combinator::{all_consuming, cut, map, opt, recognize},
    error::{context, convert_error, VerboseError},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    Finish, IResult,
};

use super::{Expectation, GrammarRule};
use crate::error::GrammarError;
use crate::lexer::TokenRuleSet;

type NotationResult<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Parse rule definitions, resolving token kinds against `tokens`
pub fn parse_rules(source: &str, tokens: &TokenRuleSet) -> Result<Vec<GrammarRule>, GrammarError> {
    let rules = parse_unresolved(source)?;
    Ok(rules
        .into_iter()
        .map(|rule| GrammarRule {
            expectations: rule
                .expectations
                .into_iter()
                .map(|e| resolve(e, tokens))
                .collect(),
            name: rule.name,
        })
        .collect())
}

/// Parse rule definitions, treating every name as a rule reference
pub fn parse_unresolved(source: &str) -> Result<Vec<GrammarRule>, GrammarError> {
    let (_, rules) = all_consuming(grammar)(source)
        .finish()
        .map_err(|e| GrammarError::Notation {
            message: convert_error(source, e),
        })?;
    Ok(rules)
}

fn resolve(expectation: Expectation, tokens: &TokenRuleSet) -> Expectation {
    match expectation {
        Expectation::Rule(name) if tokens.contains(&name) => Expectation::Token(name),
        Expectation::Optional(inner) => Expectation::Optional(Box::new(resolve(*inner, tokens))),
        Expectation::Repeat(inner) => Expectation::Repeat(Box::new(resolve(*inner, tokens))),
        Expectation::Choice(items) => {
            Expectation::Choice(items.into_iter().map(|e| resolve(e, tokens)).collect())
        }
        Expectation::Sequence(items) => {
            Expectation::Sequence(items.into_iter().map(|e| resolve(e, tokens)).collect())
        }
        other => other,
    }
}

// Standalone parser functions

/// Whitespace and `#` comments
fn ws(input: &str) -> NotationResult<'_, ()> {
    map(
        many0(alt((multispace1, preceded(char('#'), not_line_ending)))),
        |_| (),
    )(input)
}

fn grammar(input: &str) -> NotationResult<'_, Vec<GrammarRule>> {
    context(
        "grammar",
        preceded(ws, many0(terminated(rule, ws))),
    )(input)
}

/// rule_name ::= alternatives ;
fn rule(input: &str) -> NotationResult<'_, GrammarRule> {
    context(
        "rule",
        map(
            pair(
                terminated(identifier, tuple((ws, tag("::="), ws))),
                cut(terminated(alternatives, pair(ws, char(';')))),
            ),
            |(name, body)| GrammarRule {
                name,
                expectations: match body {
                    Expectation::Sequence(items) => items,
                    single => vec![single],
                },
            },
        ),
    )(input)
}

/// A | B | C
fn alternatives(input: &str) -> NotationResult<'_, Expectation> {
    context(
        "alternatives",
        map(
            separated_list1(delimited(ws, char('|'), ws), sequence),
            |mut alts| {
                if alts.len() == 1 {
                    alts.remove(0)
                } else {
                    Expectation::Choice(alts)
                }
            },
        ),
    )(input)
}

/// A B C, possibly empty
fn sequence(input: &str) -> NotationResult<'_, Expectation> {
    map(many0(terminated(postfix, ws)), |mut items| {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expectation::Sequence(items)
        }
    })(input)
}

/// Postfix operators: ?, *, +
fn postfix(input: &str) -> NotationResult<'_, Expectation> {
    map(pair(primary, opt(one_of("?*+"))), |(expr, op)| match op {
        Some('?') => Expectation::Optional(Box::new(expr)),
        Some('*') => Expectation::Repeat(Box::new(expr)),
        Some('+') => Expectation::Sequence(vec![expr.clone(), Expectation::Repeat(Box::new(expr))]),
        _ => expr,
    })(input)
}

/// Names and parenthesised groups
fn primary(input: &str) -> NotationResult<'_, Expectation> {
    context(
        "primary",
        alt((
            map(identifier, Expectation::Rule),
            delimited(pair(char('('), ws), alternatives, pair(ws, char(')'))),
        )),
    )(input)
}

fn identifier(input: &str) -> NotationResult<'_, String> {
    map(
        recognize(pair(
            alt((alpha1, tag("_"))),
            many0(alt((alphanumeric1, tag("_")))),
        )),
        String::from,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenRule;
    use pretty_assertions::assert_eq;

    fn tokens() -> TokenRuleSet {
        TokenRuleSet::new(vec![
            TokenRule::regex("WhiteSpace", r"\s+").unwrap().skipped(),
            TokenRule::literal("Add", "add"),
            TokenRule::literal("Comma", ","),
            TokenRule::regex("Number", r"\d+").unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_simple_rule() {
        let rules = parse_rules("addExpression ::= Add Number Number ;", &tokens()).unwrap();
        assert_eq!(
            rules,
            vec![GrammarRule::new("addExpression")
                .consume("Add")
                .consume("Number")
                .consume("Number")]
        );
    }

    #[test]
    fn test_operators_groups_and_references() {
        let source = r#"
            # a list of numbers
            list  ::= Add items? ;
            items ::= Number (Comma Number)* ;
            many  ::= Number+ | Add ;
        "#;
        let rules = parse_rules(source, &tokens()).unwrap();
        assert_eq!(rules.len(), 3);

        assert_eq!(
            rules[0].expectations,
            vec![
                Expectation::consume("Add"),
                Expectation::optional(Expectation::rule("items")),
            ]
        );
        assert_eq!(
            rules[1].expectations,
            vec![
                Expectation::consume("Number"),
                Expectation::repeat(Expectation::Sequence(vec![
                    Expectation::consume("Comma"),
                    Expectation::consume("Number"),
                ])),
            ]
        );
        assert_eq!(
            rules[2].expectations,
            vec![Expectation::Choice(vec![
                Expectation::Sequence(vec![
                    Expectation::consume("Number"),
                    Expectation::repeat(Expectation::consume("Number")),
                ]),
                Expectation::consume("Add"),
            ])]
        );
    }

    #[test]
    fn test_empty_rule_body() {
        let rules = parse_unresolved("nothing ::= ;").unwrap();
        assert_eq!(rules, vec![GrammarRule::new("nothing")]);
    }

    #[test]
    fn test_missing_semicolon_is_notation_error() {
        let err = parse_unresolved("broken ::= Add Number").unwrap_err();
        assert!(matches!(err, GrammarError::Notation { .. }));
    }

    #[test]
    fn test_garbage_is_notation_error() {
        let err = parse_unresolved("::= nope ;").unwrap_err();
        assert!(matches!(err, GrammarError::Notation { .. }));
    }
}
