//! Grammar rule engine
//!
//! A plugin's grammar is a set of named rules. Each rule is an ordered list
//! of expectations: consume a token of some kind, or invoke another rule.
//! Optional, repeated, grouped and alternative expectations are supported
//! on top of those two, all decided with one token of lookahead.
//!
//! The engine is built once per plugin. Construction checks the grammar
//! (unique names, defined references, no left recursion, no repetition of
//! expressions that can match nothing, no choice with two alternatives
//! starting on the same token kind) and caches each rule's first-token set.
//! Parsing is then a pure function of (engine, tokens, entry rule).

pub mod cst;
pub mod notation;
mod parser;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, ParseError};
use crate::lexer::{Token, TokenRuleSet};

pub use cst::{CstChild, CstNode};
pub use parser::MAX_NESTING;

/// One step of a grammar rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expectation {
    /// Consume one token of the given kind
    Token(String),
    /// Invoke a nested rule; its node becomes a child
    Rule(String),
    /// Zero or one occurrence
    Optional(Box<Expectation>),
    /// Zero or more occurrences
    Repeat(Box<Expectation>),
    /// First alternative whose first-token set contains the lookahead
    Choice(Vec<Expectation>),
    /// Grouped expectations, flattened into the enclosing node
    Sequence(Vec<Expectation>),
}

impl Expectation {
    pub fn consume(kind: impl Into<String>) -> Self {
        Expectation::Token(kind.into())
    }

    pub fn rule(name: impl Into<String>) -> Self {
        Expectation::Rule(name.into())
    }

    pub fn optional(inner: Expectation) -> Self {
        Expectation::Optional(Box::new(inner))
    }

    pub fn repeat(inner: Expectation) -> Self {
        Expectation::Repeat(Box::new(inner))
    }

    fn for_each_child(&self, f: &mut impl FnMut(&Expectation)) {
        match self {
            Expectation::Optional(inner) | Expectation::Repeat(inner) => f(inner.as_ref()),
            Expectation::Choice(items) | Expectation::Sequence(items) => items.iter().for_each(f),
            Expectation::Token(_) | Expectation::Rule(_) => {}
        }
    }
}

/// A named, ordered sequence of expectations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub name: String,
    pub expectations: Vec<Expectation>,
}

impl GrammarRule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expectations: Vec::new(),
        }
    }

    /// Append a "consume token of kind" expectation
    pub fn consume(mut self, kind: impl Into<String>) -> Self {
        self.expectations.push(Expectation::consume(kind));
        self
    }

    /// Append a nested rule invocation
    pub fn invoke(mut self, rule: impl Into<String>) -> Self {
        self.expectations.push(Expectation::rule(rule));
        self
    }

    pub fn expect(mut self, expectation: Expectation) -> Self {
        self.expectations.push(expectation);
        self
    }
}

/// Token kinds that can start an expectation, and whether it can match
/// without consuming anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FirstSet {
    kinds: Vec<String>,
    nullable: bool,
}

impl FirstSet {
    fn token(kind: &str) -> Self {
        Self {
            kinds: vec![kind.to_string()],
            nullable: false,
        }
    }

    fn add(&mut self, kind: &str) -> bool {
        if self.kinds.iter().any(|k| k == kind) {
            return false;
        }
        self.kinds.push(kind.to_string());
        true
    }

    pub(crate) fn contains(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }

    pub(crate) fn kinds(&self) -> &[String] {
        &self.kinds
    }

    pub(crate) fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// Recursive-descent evaluator over one plugin's grammar rules
#[derive(Debug, Clone)]
pub struct GrammarEngine {
    rules: HashMap<String, GrammarRule>,
    /// Declaration order, for listings
    order: Vec<String>,
    first: HashMap<String, FirstSet>,
}

impl GrammarEngine {
    /// Build an engine, rejecting grammars that cannot be parsed predictively
    pub fn new(rules: Vec<GrammarRule>) -> Result<Self, GrammarError> {
        let mut by_name = HashMap::new();
        let mut order = Vec::with_capacity(rules.len());
        for rule in rules {
            if by_name.contains_key(&rule.name) {
                return Err(GrammarError::DuplicateRule { name: rule.name });
            }
            order.push(rule.name.clone());
            by_name.insert(rule.name.clone(), rule);
        }

        check_references(&by_name, &order)?;
        let first = Analyzer::new(&by_name).run(&order)?;

        Ok(Self {
            rules: by_name,
            order,
            first,
        })
    }

    /// Build an engine from the textual rule notation, resolving names that
    /// match a rule in `tokens` to token kinds
    pub fn from_notation(source: &str, tokens: &TokenRuleSet) -> Result<Self, GrammarError> {
        let rules = notation::parse_rules(source, tokens)?;
        Self::new(rules)
    }

    pub fn rule(&self, name: &str) -> Option<&GrammarRule> {
        self.rules.get(name)
    }

    pub fn has_rule(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Rule names in declaration order
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Every consumed token kind must be an emitting rule of `tokens`,
    /// otherwise the rule could never match
    pub fn check_token_kinds(&self, tokens: &TokenRuleSet) -> Result<(), GrammarError> {
        fn walk(exp: &Expectation, rule: &str, tokens: &TokenRuleSet) -> Result<(), GrammarError> {
            if let Expectation::Token(kind) = exp {
                if !tokens.emits(kind) {
                    return Err(GrammarError::UnknownTokenKind {
                        kind: kind.clone(),
                        rule: rule.to_string(),
                    });
                }
            }
            let mut result = Ok(());
            exp.for_each_child(&mut |child| {
                if result.is_ok() {
                    result = walk(child, rule, tokens);
                }
            });
            result
        }

        for name in &self.order {
            for exp in &self.rules[name].expectations {
                walk(exp, name, tokens)?;
            }
        }
        Ok(())
    }

    /// Parse the whole token sequence with `entry`; leftover tokens fail
    pub fn parse(&self, entry: &str, tokens: &[Token]) -> Result<CstNode, ParseError> {
        parser::Parser::new(self, tokens).parse_complete(entry)
    }

    /// Parse a prefix of the token sequence, returning the node and the
    /// number of tokens consumed
    pub fn parse_partial(
        &self,
        entry: &str,
        tokens: &[Token],
    ) -> Result<(CstNode, usize), ParseError> {
        parser::Parser::new(self, tokens).parse_prefix(entry)
    }

    /// First-token set of an expectation, from the per-rule cache
    pub(crate) fn first_of(&self, exp: &Expectation) -> FirstSet {
        match exp {
            Expectation::Token(kind) => FirstSet::token(kind),
            Expectation::Rule(name) => self.first.get(name).cloned().unwrap_or_default(),
            Expectation::Optional(inner) | Expectation::Repeat(inner) => {
                let mut first = self.first_of(inner);
                first.nullable = true;
                first
            }
            Expectation::Choice(alts) => {
                let mut first = FirstSet::default();
                for alt in alts {
                    let alt_first = self.first_of(alt);
                    for kind in &alt_first.kinds {
                        first.add(kind);
                    }
                    first.nullable |= alt_first.nullable;
                }
                first
            }
            Expectation::Sequence(items) => {
                let mut first = FirstSet {
                    kinds: Vec::new(),
                    nullable: true,
                };
                for item in items {
                    let item_first = self.first_of(item);
                    for kind in &item_first.kinds {
                        first.add(kind);
                    }
                    if !item_first.nullable {
                        first.nullable = false;
                        break;
                    }
                }
                first
            }
        }
    }
}

fn check_references(
    rules: &HashMap<String, GrammarRule>,
    order: &[String],
) -> Result<(), GrammarError> {
    fn walk(
        exp: &Expectation,
        rule: &str,
        rules: &HashMap<String, GrammarRule>,
    ) -> Result<(), GrammarError> {
        if let Expectation::Rule(name) = exp {
            if !rules.contains_key(name) {
                return Err(GrammarError::UndefinedReference {
                    name: name.clone(),
                    rule: rule.to_string(),
                });
            }
        }
        let mut result = Ok(());
        exp.for_each_child(&mut |child| {
            if result.is_ok() {
                result = walk(child, rule, rules);
            }
        });
        result
    }

    for name in order {
        for exp in &rules[name].expectations {
            walk(exp, name, rules)?;
        }
    }
    Ok(())
}

/// Computes first-token sets, detecting left recursion on the way
struct Analyzer<'g> {
    rules: &'g HashMap<String, GrammarRule>,
    first: HashMap<String, FirstSet>,
    visiting: Vec<String>,
}

impl<'g> Analyzer<'g> {
    fn new(rules: &'g HashMap<String, GrammarRule>) -> Self {
        Self {
            rules,
            first: HashMap::new(),
            visiting: Vec::new(),
        }
    }

    fn run(mut self, order: &[String]) -> Result<HashMap<String, FirstSet>, GrammarError> {
        for name in order {
            self.rule_first(name)?;
        }
        // Second pass covers expectations after the first non-nullable one,
        // which the first-set computation never looks at
        let rules = self.rules;
        for name in order {
            for exp in &rules[name].expectations {
                self.check(exp, name)?;
            }
        }
        Ok(self.first)
    }

    fn rule_first(&mut self, name: &str) -> Result<FirstSet, GrammarError> {
        if let Some(first) = self.first.get(name) {
            return Ok(first.clone());
        }
        if let Some(pos) = self.visiting.iter().position(|n| n == name) {
            let mut chain = self.visiting[pos..].to_vec();
            chain.push(name.to_string());
            return Err(GrammarError::LeftRecursion {
                chain: chain.join(" -> "),
            });
        }

        let rules = self.rules;
        let rule = rules
            .get(name)
            .ok_or_else(|| GrammarError::UndefinedReference {
                name: name.to_string(),
                rule: self.visiting.last().cloned().unwrap_or_default(),
            })?;

        self.visiting.push(name.to_string());
        let result = self.sequence_first(&rule.expectations, name);
        self.visiting.pop();

        let first = result?;
        self.first.insert(name.to_string(), first.clone());
        Ok(first)
    }

    fn sequence_first(
        &mut self,
        items: &[Expectation],
        rule: &str,
    ) -> Result<FirstSet, GrammarError> {
        let mut first = FirstSet {
            kinds: Vec::new(),
            nullable: true,
        };
        for item in items {
            let item_first = self.expectation_first(item, rule)?;
            for kind in &item_first.kinds {
                first.add(kind);
            }
            if !item_first.nullable {
                first.nullable = false;
                break;
            }
        }
        Ok(first)
    }

    fn expectation_first(
        &mut self,
        exp: &Expectation,
        rule: &str,
    ) -> Result<FirstSet, GrammarError> {
        match exp {
            Expectation::Token(kind) => Ok(FirstSet::token(kind)),
            Expectation::Rule(name) => self.rule_first(name),
            Expectation::Optional(inner) => {
                let mut first = self.expectation_first(inner, rule)?;
                first.nullable = true;
                Ok(first)
            }
            Expectation::Repeat(inner) => {
                let mut first = self.expectation_first(inner, rule)?;
                if first.nullable {
                    return Err(GrammarError::NullableRepeat {
                        rule: rule.to_string(),
                    });
                }
                first.nullable = true;
                Ok(first)
            }
            Expectation::Choice(alts) => {
                let mut first = FirstSet::default();
                for alt in alts {
                    let alt_first = self.expectation_first(alt, rule)?;
                    for kind in &alt_first.kinds {
                        if !first.add(kind) {
                            return Err(GrammarError::AmbiguousChoice {
                                rule: rule.to_string(),
                                kind: kind.clone(),
                            });
                        }
                    }
                    first.nullable |= alt_first.nullable;
                }
                Ok(first)
            }
            Expectation::Sequence(items) => self.sequence_first(items, rule),
        }
    }

    fn check(&mut self, exp: &Expectation, rule: &str) -> Result<(), GrammarError> {
        self.expectation_first(exp, rule)?;
        let mut children = Vec::new();
        exp.for_each_child(&mut |child| children.push(child.clone()));
        for child in &children {
            self.check(child, rule)?;
        }
        Ok(())
    }
}

/// Names of rules unreachable from `entries`, useful for manifest linting
pub fn unreachable_rules<'a>(
    engine: &'a GrammarEngine,
    entries: impl IntoIterator<Item = &'a str>,
) -> Vec<&'a str> {
    fn mark<'a>(exp: &'a Expectation, seen: &mut HashSet<&'a str>, engine: &'a GrammarEngine) {
        if let Expectation::Rule(name) = exp {
            if let Some(rule) = engine.rules.get(name) {
                if seen.insert(rule.name.as_str()) {
                    for e in &rule.expectations {
                        mark(e, seen, engine);
                    }
                }
            }
        }
        match exp {
            Expectation::Optional(inner) | Expectation::Repeat(inner) => mark(inner, seen, engine),
            Expectation::Choice(items) | Expectation::Sequence(items) => {
                for item in items {
                    mark(item, seen, engine);
                }
            }
            Expectation::Token(_) | Expectation::Rule(_) => {}
        }
    }

    let mut seen = HashSet::new();
    for entry in entries {
        if let Some(rule) = engine.rules.get(entry) {
            if seen.insert(rule.name.as_str()) {
                for e in &rule.expectations {
                    mark(e, &mut seen, engine);
                }
            }
        }
    }

    engine
        .rule_names()
        .filter(|name| !seen.contains(name))
        .collect()
}
