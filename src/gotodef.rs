use std::path::Path;

use tower_lsp::lsp_types::{Location, Position};

use crate::documents::document_uri;
use crate::index::{Selection, WorkspaceIndex};
use crate::tokenizer::TokenPos;

fn location(path: &Path, pos: TokenPos) -> Option<Location> {
    Some(Location {
        uri: document_uri(path)?,
        range: pos.into(),
    })
}

pub fn goto_definition(
    index: &WorkspaceIndex,
    cursor_position: Position,
    path: &Path,
) -> Option<Vec<Location>> {
    match index.select_symbol_at_position(path, cursor_position)? {
        // Local bindings jump to their first definition
        Selection::Variable { binding, .. } => Some(vec![location(path, binding.definition())?]),
        Selection::Routine { signature, .. } => {
            Some(vec![location(&signature.file, signature.name_pos)?])
        }
        Selection::Keyword {
            signature, keyword, ..
        } => Some(vec![location(&signature.file, keyword.pos)?]),
    }
}
