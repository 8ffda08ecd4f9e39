//! Concrete syntax tree produced by the grammar engine

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::lexer::Token;

/// Result of a successful rule invocation: every consumed token and every
/// nested rule node, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CstNode {
    pub rule: String,
    pub children: Vec<CstChild>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CstChild {
    Token(Token),
    Node(CstNode),
}

impl CstNode {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            children: Vec::new(),
        }
    }

    pub(crate) fn push_token(&mut self, token: Token) {
        self.children.push(CstChild::Token(token));
    }

    pub(crate) fn push_node(&mut self, node: CstNode) {
        self.children.push(CstChild::Node(node));
    }

    /// Tokens directly under this node
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(|c| match c {
            CstChild::Token(t) => Some(t),
            CstChild::Node(_) => None,
        })
    }

    /// Direct tokens of one kind
    pub fn tokens_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a Token> {
        self.tokens().filter(move |t| t.kind == kind)
    }

    /// Child rule nodes directly under this node
    pub fn child_nodes(&self) -> impl Iterator<Item = &CstNode> {
        self.children.iter().filter_map(|c| match c {
            CstChild::Node(n) => Some(n),
            CstChild::Token(_) => None,
        })
    }

    /// First direct child node produced by `rule`
    pub fn child(&self, rule: &str) -> Option<&CstNode> {
        self.child_nodes().find(|n| n.rule == rule)
    }

    /// Every token in the subtree, depth first
    pub fn all_tokens(&self) -> Vec<&Token> {
        let mut out = Vec::new();
        self.collect_tokens(&mut out);
        out
    }

    fn collect_tokens<'a>(&'a self, out: &mut Vec<&'a Token>) {
        for child in &self.children {
            match child {
                CstChild::Token(t) => out.push(t),
                CstChild::Node(n) => n.collect_tokens(out),
            }
        }
    }

    /// Lexemes of every token in the subtree
    pub fn lexemes(&self) -> Vec<&str> {
        self.all_tokens()
            .into_iter()
            .map(|t| t.lexeme.as_str())
            .collect()
    }

    /// Byte range covered by the subtree; `None` when nothing was consumed
    pub fn span(&self) -> Option<(usize, usize)> {
        let tokens = self.all_tokens();
        match (tokens.first(), tokens.last()) {
            (Some(first), Some(last)) => Some((first.start, last.end)),
            _ => None,
        }
    }

    /// JSON form of the subtree, matching the serde representation
    pub fn to_json(&self) -> Value {
        let children = self
            .children
            .iter()
            .map(|child| match child {
                CstChild::Token(t) => json!({
                    "kind": t.kind,
                    "lexeme": t.lexeme,
                    "start": t.start,
                    "end": t.end,
                }),
                CstChild::Node(n) => n.to_json(),
            })
            .collect::<Vec<_>>();
        json!({ "rule": self.rule, "children": children })
    }
}
