//! Token rules and the tokenizer
//!
//! A plugin declares an ordered set of named token rules. Tokenizing scans
//! the input left to right and, at every offset, commits to the FIRST rule
//! (in declaration order) that matches a non-empty prefix. This is not
//! longest-match: a keyword rule declared before a generic rule wins even
//! where the generic rule would match more text.
//!
//! Skip rules (whitespace, comments) advance the cursor but never reach the
//! output. When nothing matches, tokenizing fails; bytes are never dropped.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GrammarError, LexError};

/// A lexical unit produced by the tokenizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Name of the token rule that produced this token
    pub kind: String,
    pub lexeme: String,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
}

impl Token {
    pub fn new(kind: impl Into<String>, lexeme: impl Into<String>, start: usize) -> Self {
        let lexeme = lexeme.into();
        let end = start + lexeme.len();
        Self {
            kind: kind.into(),
            lexeme,
            start,
            end,
        }
    }
}

/// Matching predicate over the text at the cursor
#[derive(Debug, Clone)]
pub enum TokenPattern {
    /// Exact text
    Literal(String),
    /// Regular expression, anchored at the cursor
    Regex(Regex),
}

impl TokenPattern {
    /// Length in bytes of the non-empty match at the start of `input`
    fn match_len(&self, input: &str) -> Option<usize> {
        match self {
            TokenPattern::Literal(text) => {
                (!text.is_empty() && input.starts_with(text.as_str())).then_some(text.len())
            }
            TokenPattern::Regex(re) => re
                .find(input)
                .filter(|m| m.start() == 0 && m.end() > 0)
                .map(|m| m.end()),
        }
    }

    /// Source text of the pattern
    pub fn as_str(&self) -> &str {
        match self {
            TokenPattern::Literal(text) => text,
            TokenPattern::Regex(re) => re.as_str(),
        }
    }
}

impl PartialEq for TokenPattern {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TokenPattern::Literal(a), TokenPattern::Literal(b)) => a == b,
            (TokenPattern::Regex(a), TokenPattern::Regex(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRule {
    pub name: String,
    pub pattern: TokenPattern,
    pub skip: bool,
}

impl TokenRule {
    /// Rule matching an exact keyword or punctuation
    pub fn literal(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: TokenPattern::Literal(text.into()),
            skip: false,
        }
    }

    /// Rule matching a regular expression at the cursor
    pub fn regex(name: impl Into<String>, pattern: &str) -> Result<Self, GrammarError> {
        let name = name.into();
        // Anchor so the engine cannot report a match further along the input
        let anchored = format!("^(?:{})", pattern);
        let re = Regex::new(&anchored).map_err(|e| GrammarError::InvalidPattern {
            rule: name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name,
            pattern: TokenPattern::Regex(re),
            skip: false,
        })
    }

    /// Mark the rule as skipped: matches advance the cursor but emit nothing
    pub fn skipped(mut self) -> Self {
        self.skip = true;
        self
    }
}

/// Ordered, name-unique set of token rules with at least one emitting rule
#[derive(Debug, Clone)]
pub struct TokenRuleSet {
    rules: Vec<TokenRule>,
}

impl TokenRuleSet {
    pub fn new(rules: Vec<TokenRule>) -> Result<Self, GrammarError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(GrammarError::DuplicateTokenRule {
                    name: rule.name.clone(),
                });
            }
        }
        if rules.iter().all(|r| r.skip) {
            return Err(GrammarError::NoEmittingTokenRule);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[TokenRule] {
        &self.rules
    }

    /// Whether `kind` names a rule that can appear in the output
    pub fn emits(&self, kind: &str) -> bool {
        self.rules.iter().any(|r| r.name == kind && !r.skip)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.rules.iter().any(|r| r.name == kind)
    }

    /// Tokenize `input` against this rule set
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, LexError> {
        tokenize(self, input)
    }
}

/// Convert `input` into tokens, dropping matches of skip rules.
pub fn tokenize(rules: &TokenRuleSet, input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut offset = 0;

    while offset < input.len() {
        let rest = &input[offset..];
        let matched = rules
            .rules
            .iter()
            .find_map(|rule| rule.pattern.match_len(rest).map(|len| (rule, len)));

        let Some((rule, len)) = matched else {
            return Err(LexError {
                offset,
                remaining: rest.to_string(),
            });
        };

        if !rule.skip {
            tokens.push(Token::new(rule.name.clone(), &rest[..len], offset));
        }
        offset += len;
    }

    Ok(tokens)
}
