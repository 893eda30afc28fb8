//! Keyword flags (`/KEYWORD`) inside a call to a resolved routine.

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind,
};

use super::util::Cursor;
use super::{Completable, Completer, Context};
use crate::doc_comments::DocTag;
use crate::parser::{KeywordParameter, RoutineSignature};

pub struct KeywordFlagCompleter {
    prefix: String,
    signature: RoutineSignature,
    /// Documentation of each keyword, in declaration order
    docs: Vec<Option<String>>,
}

impl<'a> Completer<'a> for KeywordFlagCompleter {
    fn construct(context: Context<'a>, line: u32, character: u32) -> Option<Self>
    where
        Self: Sized + Completer<'a>,
    {
        let cursor = Cursor::new(&context, line, character);
        if cursor.in_literal || !cursor.after_operator("/") {
            return None;
        }

        let signature = cursor.enclosing_routine(&context)?;
        let docs = signature
            .keywords
            .iter()
            .map(|keyword| {
                context
                    .index
                    .parameter_docs(&signature, DocTag::Keywords, &keyword.name)
                    .map(|entry| entry.description.join("\n"))
                    .filter(|description| !description.is_empty())
            })
            .collect();

        Some(KeywordFlagCompleter {
            prefix: cursor.prefix,
            signature,
            docs,
        })
    }

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized,
    {
        self.signature
            .keywords
            .iter()
            .zip(&self.docs)
            .filter(|(keyword, _)| !crate::parser::is_extra_keyword(&keyword.name))
            .map(|(keyword, docs)| KeywordCandidate {
                keyword: keyword.clone(),
                docs: docs.clone(),
            })
            .collect::<Vec<_>>()
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

struct KeywordCandidate {
    keyword: KeywordParameter,
    docs: Option<String>,
}

impl<'a> Completable<'a, KeywordFlagCompleter> for KeywordCandidate {
    fn completions(&self, completer: &KeywordFlagCompleter) -> Option<CompletionItem> {
        Some(CompletionItem {
            label: self.keyword.name.clone(),
            kind: Some(CompletionItemKind::PROPERTY),
            detail: Some(format!("Keyword of {}", completer.signature.name)),
            documentation: self.docs.as_ref().map(|value| {
                Documentation::MarkupContent(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: value.clone(),
                })
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use tower_lsp::lsp_types::Position;

    use crate::completion::get_completions;
    use crate::completion::tests::labels;
    use crate::config::Settings;
    use crate::test_utils::create_test_index;

    #[test]
    fn test_keyword_flags_of_resolved_call() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[
            (
                "plot_it.pro",
                "pro plot_it, x, COLOR=color, VERBOSE=verbose, _EXTRA=ex\n  print, \
                 x, color, verbose, ex\nend\n",
            ),
            ("main.pro", "plot_it, 1, /ver\n"),
        ]);

        let found = labels(get_completions(
            &index,
            Position { line: 0, character: 16 },
            &root.join("main.pro"),
            &Settings::default(),
        ));
        assert_eq!(found, vec!["VERBOSE"]);
    }

    /// Test: a flag on an unknown routine offers nothing from this completer
    #[test]
    fn test_unresolved_call_falls_through() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[("main.pro", "missing, /\n")]);

        let found = labels(get_completions(
            &index,
            Position { line: 0, character: 10 },
            &root.join("main.pro"),
            &Settings::default(),
        ));
        assert!(found.is_empty());
    }
}
