use crate::parser::{CallSite, RoutineSignature};
use crate::tokenizer::{Token, TokenKind};
use crate::validators::resolve_call;

use super::Context;

/// Where the cursor sits relative to the tokens around it.
pub struct Cursor<'a> {
    pub line: u32,
    pub prefix: String,
    /// Column where the identifier being typed starts
    pub prefix_start: u32,
    /// Last code token before the identifier being typed
    pub previous: Option<&'a Token>,
    /// Cursor is inside a string or comment
    pub in_literal: bool,
}

const STATEMENT_LEADERS: &[&str] = &["then", "else", "do", "begin", "of", "repeat"];

impl<'a> Cursor<'a> {
    pub fn new(context: &Context<'a>, line: u32, character: u32) -> Cursor<'a> {
        let tokens = &context.entry.tokens;
        let current = tokens.iter().find(|t| {
            t.start.line == line && t.start.column < character && character <= t.start.end_column()
        });

        let in_literal =
            current.is_some_and(|t| t.kind == TokenKind::String || t.kind.is_comment());
        let (prefix, prefix_start) = match current {
            Some(t) if t.is_word() => (
                t.text
                    .chars()
                    .take((character - t.start.column) as usize)
                    .collect(),
                t.start.column,
            ),
            _ => (String::new(), character),
        };

        let previous = tokens
            .iter()
            .filter(|t| !t.kind.is_comment())
            .take_while(|t| (t.start.line, t.start.column) < (line, prefix_start))
            .last();

        Cursor {
            line,
            prefix,
            prefix_start,
            previous,
            in_literal,
        }
    }

    pub fn after_kind(&self, kind: TokenKind) -> bool {
        self.previous.is_some_and(|t| t.kind == kind)
    }

    pub fn after_operator(&self, op: &str) -> bool {
        self.previous.is_some_and(|t| t.is_operator(op))
    }

    /// Whether a statement starts at the cursor, which is where procedure
    /// calls go.
    pub fn at_statement_start(&self) -> bool {
        match self.previous {
            None => true,
            Some(t) if t.kind == TokenKind::Continuation => false,
            Some(t) if t.end.line < self.line => true,
            Some(t) if t.kind == TokenKind::Ampersand => true,
            Some(t) => {
                t.kind == TokenKind::Reserved && STATEMENT_LEADERS.contains(&t.key().as_str())
            }
        }
    }

    /// Innermost call whose argument list the cursor is in.
    pub fn enclosing_call(&self, context: &Context<'a>) -> Option<&'a CallSite> {
        let (line, character) = (self.line, self.prefix_start);
        context
            .entry
            .record
            .call_sites
            .iter()
            .filter(|call| (line, character) > (call.pos.line, call.pos.end_column()))
            .filter(|call| {
                call.spans(line, character) || self.previous.is_some_and(|p| p.start == call.end)
            })
            .last()
    }

    /// Routine the enclosing call resolves to.
    pub fn enclosing_routine(&self, context: &Context<'a>) -> Option<RoutineSignature> {
        let call = self.enclosing_call(context)?;
        let symbols = context.index.symbols();
        let lookup = symbols.excluding(context.path);
        resolve_call(context.entry, call, &lookup)
    }
}
