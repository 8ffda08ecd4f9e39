//! Recursive-descent evaluation of grammar rules
//!
//! One cursor is shared by all nested invocations. There is no
//! backtracking: optional, repeated and alternative expectations are
//! decided by the token under the cursor alone.

use super::{CstNode, Expectation, GrammarEngine};
use crate::error::{Found, ParseError};
use crate::lexer::Token;

/// Maximum number of rule invocations active at once
pub const MAX_NESTING: usize = 256;

pub(crate) struct Parser<'g, 't> {
    engine: &'g GrammarEngine,
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

impl<'g, 't> Parser<'g, 't> {
    pub(crate) fn new(engine: &'g GrammarEngine, tokens: &'t [Token]) -> Self {
        Self {
            engine,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub(crate) fn parse_complete(mut self, entry: &str) -> Result<CstNode, ParseError> {
        let node = self.parse_rule(entry)?;
        if let Some(token) = self.peek() {
            return Err(ParseError::TrailingInput {
                offset: token.start,
                found: Found::Token(token.clone()),
            });
        }
        Ok(node)
    }

    pub(crate) fn parse_prefix(mut self, entry: &str) -> Result<(CstNode, usize), ParseError> {
        let node = self.parse_rule(entry)?;
        Ok((node, self.pos))
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    /// Offset reported when the input ran out
    fn end_offset(&self) -> usize {
        self.tokens.last().map(|t| t.end).unwrap_or(0)
    }

    fn parse_rule(&mut self, name: &str) -> Result<CstNode, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::NestingTooDeep {
                rule: name.to_string(),
                offset: self.peek().map_or_else(|| self.end_offset(), |t| t.start),
                limit: MAX_NESTING,
            });
        }
        self.depth += 1;
        let node = self.parse_rule_body(name);
        self.depth -= 1;
        node
    }

    fn parse_rule_body(&mut self, name: &str) -> Result<CstNode, ParseError> {
        let engine = self.engine;
        let rule = engine.rule(name).ok_or_else(|| ParseError::UnknownRule {
            rule: name.to_string(),
        })?;

        let mut node = CstNode::new(name);
        for expectation in &rule.expectations {
            self.expect(expectation, name, &mut node)?;
        }
        Ok(node)
    }

    fn expect(
        &mut self,
        expectation: &Expectation,
        rule: &str,
        node: &mut CstNode,
    ) -> Result<(), ParseError> {
        match expectation {
            Expectation::Token(kind) => match self.peek() {
                Some(token) if token.kind == *kind => {
                    node.push_token(token.clone());
                    self.pos += 1;
                    Ok(())
                }
                _ => Err(self.unexpected(rule, vec![kind.clone()])),
            },
            Expectation::Rule(name) => {
                let child = self.parse_rule(name)?;
                node.push_node(child);
                Ok(())
            }
            Expectation::Optional(inner) => {
                if self.starts(inner) {
                    self.expect(inner, rule, node)?;
                }
                Ok(())
            }
            Expectation::Repeat(inner) => {
                while self.starts(inner) {
                    let before = self.pos;
                    self.expect(inner, rule, node)?;
                    if self.pos == before {
                        break;
                    }
                }
                Ok(())
            }
            Expectation::Choice(alternatives) => {
                if let Some(alt) = alternatives.iter().find(|alt| self.starts(alt)) {
                    return self.expect(alt, rule, node);
                }
                let engine = self.engine;
                if let Some(alt) = alternatives
                    .iter()
                    .find(|alt| engine.first_of(alt).is_nullable())
                {
                    return self.expect(alt, rule, node);
                }
                let expected = engine.first_of(expectation).kinds().to_vec();
                Err(self.unexpected(rule, expected))
            }
            Expectation::Sequence(items) => {
                for item in items {
                    self.expect(item, rule, node)?;
                }
                Ok(())
            }
        }
    }

    /// Whether the token under the cursor can start `expectation`
    fn starts(&self, expectation: &Expectation) -> bool {
        self.peek()
            .is_some_and(|token| self.engine.first_of(expectation).contains(&token.kind))
    }

    fn unexpected(&self, rule: &str, expected: Vec<String>) -> ParseError {
        let (found, offset) = match self.peek() {
            Some(token) => (Found::Token(token.clone()), token.start),
            None => (Found::EndOfInput, self.end_offset()),
        };
        ParseError::Unexpected {
            rule: rule.to_string(),
            expected,
            found,
            offset,
        }
    }
}
