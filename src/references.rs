use std::path::Path;

use itertools::Itertools;
use tower_lsp::lsp_types::{Location, Position};

use crate::documents::document_uri;
use crate::index::{Selection, WorkspaceIndex};
use crate::validators::resolve_call;

/// Variable occurrences within their scope, or every call site resolving to
/// the routine under the cursor across the workspace.
pub fn references(
    index: &WorkspaceIndex,
    cursor_position: Position,
    path: &Path,
) -> Option<Vec<Location>> {
    match index.select_symbol_at_position(path, cursor_position)? {
        Selection::Variable { binding, .. } => {
            let uri = document_uri(path)?;
            Some(
                binding
                    .occurrences
                    .iter()
                    .map(|o| Location {
                        uri: uri.clone(),
                        range: o.pos.into(),
                    })
                    .collect(),
            )
        }
        Selection::Routine { signature, .. } | Selection::Keyword { signature, .. } => {
            let key = signature.key();
            let symbols = index.symbols();
            let locations = index
                .entries()
                .into_iter()
                .flat_map(|entry| {
                    let lookup = symbols.excluding(&entry.path);
                    let uri = document_uri(&entry.path);
                    let found = entry
                        .calls_to(&key)
                        .filter(|call| {
                            resolve_call(&entry, call, &lookup).as_ref() == Some(&signature)
                        })
                        .filter_map(|call| {
                            Some(Location {
                                uri: uri.clone()?,
                                range: call.pos.into(),
                            })
                        })
                        .collect_vec();
                    found
                })
                .collect();
            Some(locations)
        }
    }
}
