//! Plain identifiers: variables of the enclosing scope, routines, and
//! `KEYWORD=` of the call the cursor sits in.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind};

use super::util::Cursor;
use super::{Completable, Completer, Context};
use crate::parser::{is_extra_keyword, BindingKind, RoutineSignature, VariableBinding};
use crate::tokenizer::TokenKind;

pub struct IdentifierCompleter {
    prefix: String,
    variables: Vec<VariableBinding>,
    routines: Vec<RoutineSignature>,
    /// Routine whose argument list the cursor is in
    callee: Option<RoutineSignature>,
}

impl<'a> Completer<'a> for IdentifierCompleter {
    fn construct(context: Context<'a>, line: u32, character: u32) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        let cursor = Cursor::new(&context, line, character);
        if cursor.in_literal
            || cursor.after_operator(".")
            || cursor.after_kind(TokenKind::Arrow)
            || cursor.after_kind(TokenKind::DoubleColon)
        {
            return None;
        }

        let record = &context.entry.record;
        let typed_here = |binding: &VariableBinding| {
            binding
                .occurrences
                .iter()
                .all(|o| o.pos.line == line && o.pos.column == cursor.prefix_start)
        };
        let variables = record
            .scope_at(line, character)
            .and_then(|scope| record.scopes.get(scope))
            .map(|scope| {
                scope
                    .bindings
                    .iter()
                    .filter(|binding| !typed_here(binding))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let procedures = cursor.at_statement_start();
        let routines = context
            .index
            .symbols()
            .routines()
            .into_iter()
            .filter(|signature| {
                !signature.kind.is_method() && signature.kind.is_function() != procedures
            })
            .cloned()
            .collect();

        let callee = if procedures {
            None
        } else {
            cursor.enclosing_routine(&context)
        };

        Some(IdentifierCompleter {
            prefix: cursor.prefix,
            variables,
            routines,
            callee,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        let variables = self.variables.iter().cloned().map(Candidate::Variable);
        let routines = self.routines.iter().cloned().map(Candidate::Routine);
        let keywords = self
            .callee
            .iter()
            .flat_map(|callee| callee.keywords.iter())
            .filter(|keyword| !is_extra_keyword(&keyword.name))
            .map(|keyword| Candidate::Keyword(keyword.name.clone()));

        variables.chain(routines).chain(keywords).collect::<Vec<_>>()
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

enum Candidate {
    Variable(VariableBinding),
    Routine(RoutineSignature),
    Keyword(String),
}

impl<'a> Completable<'a, IdentifierCompleter> for Candidate {
    fn completions(&self, completer: &IdentifierCompleter) -> Option<CompletionItem> {
        match self {
            Candidate::Variable(binding) => {
                let detail = match &binding.kind {
                    BindingKind::Argument => "argument".to_string(),
                    BindingKind::Keyword(keyword) => format!("keyword {keyword}"),
                    BindingKind::Local => "local variable".to_string(),
                    BindingKind::Common(block) => format!("common {block}"),
                };
                Some(CompletionItem {
                    label: binding.name.clone(),
                    kind: Some(CompletionItemKind::VARIABLE),
                    detail: Some(detail),
                    ..Default::default()
                })
            }
            Candidate::Routine(signature) => Some(CompletionItem {
                label: signature.name.clone(),
                kind: Some(CompletionItemKind::FUNCTION),
                detail: Some(signature.header_text()),
                ..Default::default()
            }),
            Candidate::Keyword(name) => {
                let callee = completer.callee.as_ref()?;
                Some(CompletionItem {
                    label: name.clone(),
                    kind: Some(CompletionItemKind::PROPERTY),
                    detail: Some(format!("Keyword of {}", callee.name)),
                    insert_text: Some(format!("{name}=")),
                    ..Default::default()
                })
            }
        }
    }
}
