use std::path::Path;
use std::sync::Arc;

use tower_lsp::lsp_types::Position;

use super::{FileIndexEntry, WorkspaceIndex};
use crate::doc_comments::{DocCommentBlock, DocEntry, DocTag};
use crate::parser::{KeywordParameter, RoutineSignature, VariableBinding};
use crate::tokenizer::TokenPos;
use crate::validators::resolve_call;

/// What the cursor points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Variable {
        scope: usize,
        binding: VariableBinding,
        pos: TokenPos,
    },
    /// A routine name, at its definition or at a resolved call site
    Routine {
        signature: RoutineSignature,
        pos: TokenPos,
        at_definition: bool,
    },
    /// A keyword name in a header or in a call to a resolved routine
    Keyword {
        signature: RoutineSignature,
        keyword: KeywordParameter,
        pos: TokenPos,
    },
}

impl WorkspaceIndex {
    /// Resolve the symbol under the cursor of an indexed file.
    pub fn select_symbol_at_position(&self, path: &Path, position: Position) -> Option<Selection> {
        let entry = self.get_file(path)?;
        let (line, character) = (position.line, position.character);

        for signature in entry.record.signatures() {
            if signature.name_pos.touches(line, character) {
                return Some(Selection::Routine {
                    signature: signature.clone(),
                    pos: signature.name_pos,
                    at_definition: true,
                });
            }
            let keyword = signature.keywords.iter().find(|k| k.pos.touches(line, character));
            if let Some(keyword) = keyword {
                return Some(Selection::Keyword {
                    signature: signature.clone(),
                    keyword: keyword.clone(),
                    pos: keyword.pos,
                });
            }
        }

        let symbols = self.symbols();
        let lookup = symbols.excluding(path);
        for call in &entry.record.call_sites {
            if call.pos.touches(line, character) {
                let signature = resolve_call(&entry, call, &lookup)?;
                return Some(Selection::Routine {
                    signature,
                    pos: call.pos,
                    at_definition: false,
                });
            }
            if let Some(passed) = call.keywords.iter().find(|k| k.pos.touches(line, character)) {
                let signature = resolve_call(&entry, call, &lookup)?;
                let keyword = signature.resolve_keyword(&passed.name)?.clone();
                return Some(Selection::Keyword {
                    signature,
                    keyword,
                    pos: passed.pos,
                });
            }
        }

        let variable = entry
            .record
            .scopes
            .iter()
            .enumerate()
            .flat_map(|(scope, s)| s.bindings.iter().map(move |b| (scope, b)))
            .find_map(|(scope, binding)| {
                binding
                    .occurrences
                    .iter()
                    .find(|o| o.pos.touches(line, character))
                    .map(|o| Selection::Variable {
                        scope,
                        binding: binding.clone(),
                        pos: o.pos,
                    })
            });
        variable
    }

    /// Committed entry defining `signature`, when it is indexed.
    pub fn defining_entry(&self, signature: &RoutineSignature) -> Option<Arc<FileIndexEntry>> {
        self.get_file(&signature.file)
    }

    /// Documentation block of a routine, looked up in its defining file.
    pub fn routine_docs(&self, signature: &RoutineSignature) -> Option<DocCommentBlock> {
        let entry = self.defining_entry(signature)?;
        entry.docs_for(signature).cloned()
    }

    /// Documentation entry of an argument or keyword.
    pub fn parameter_docs(
        &self,
        signature: &RoutineSignature,
        tag: DocTag,
        name: &str,
    ) -> Option<DocEntry> {
        self.routine_docs(signature)?.entry(&tag, name).cloned()
    }
}
