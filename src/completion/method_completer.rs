//! Method names after `->`.
//!
//! The receiver's class is unknown without type inference, so every method
//! in the workspace is offered once under its bare name.

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, CompletionItemLabelDetails};

use super::util::Cursor;
use super::{Completable, Completer, Context};
use crate::parser::RoutineSignature;
use crate::tokenizer::TokenKind;

pub struct MethodCompleter {
    prefix: String,
    methods: Vec<RoutineSignature>,
}

impl<'a> Completer<'a> for MethodCompleter {
    fn construct(context: Context<'a>, line: u32, character: u32) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        let cursor = Cursor::new(&context, line, character);
        if cursor.in_literal || !cursor.after_kind(TokenKind::Arrow) {
            return None;
        }

        let methods = context
            .index
            .symbols()
            .routines()
            .into_iter()
            .filter(|signature| signature.kind.is_method())
            .cloned()
            .collect();

        Some(MethodCompleter {
            prefix: cursor.prefix,
            methods,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        self.methods.iter().cloned().map(MethodCandidate).collect::<Vec<_>>()
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

struct MethodCandidate(RoutineSignature);

impl<'a> Completable<'a, MethodCompleter> for MethodCandidate {
    fn completions(&self, _completer: &MethodCompleter) -> Option<CompletionItem> {
        let signature = &self.0;
        let method = signature.name.rsplit("::").next()?;

        Some(CompletionItem {
            label: method.to_string(),
            kind: Some(CompletionItemKind::METHOD),
            label_details: Some(CompletionItemLabelDetails {
                detail: None,
                description: Some(signature.name.clone()),
            }),
            detail: Some(signature.header_text()),
            ..Default::default()
        })
    }
}
