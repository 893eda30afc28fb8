//! Symbol providers.
//!
//! - `textDocument/documentSymbol`: routines of the current file, with their
//!   arguments and keywords as children
//! - `workspace/symbol`: fuzzy search over every resolved routine
//!
//! | Symbol | LSP Kind |
//! |--------|----------|
//! | Procedure, function | `Function` |
//! | Procedure method, function method | `Method` |
//! | Argument | `Variable` |
//! | Keyword | `Property` |

use std::path::Path;

use itertools::Itertools;
use nucleo_matcher::{
    pattern::{self, Normalization},
    Matcher,
};
use tower_lsp::lsp_types::{
    DocumentSymbol, DocumentSymbolResponse, Location, SymbolInformation, SymbolKind,
};

use crate::documents::document_uri;
use crate::index::WorkspaceIndex;
use crate::parser::{RoutineKind, RoutineSignature};
use crate::tokenizer::{span_range, TokenPos};

fn routine_symbol_kind(kind: RoutineKind) -> SymbolKind {
    if kind.is_method() {
        SymbolKind::METHOD
    } else {
        SymbolKind::FUNCTION
    }
}

fn compute_match_score(
    matcher: &mut Matcher,
    pattern: &pattern::Pattern,
    symbol: SymbolInformation,
) -> (u32, SymbolInformation) {
    let mut buf = Vec::new();
    (
        pattern
            .score(
                nucleo_matcher::Utf32Str::new(symbol.name.as_str(), &mut buf),
                matcher,
            )
            .unwrap_or_default(),
        symbol,
    )
}

#[allow(deprecated)]
fn to_symbol_information(signature: &RoutineSignature) -> Option<SymbolInformation> {
    Some(SymbolInformation {
        name: signature.name.clone(),
        kind: routine_symbol_kind(signature.kind),
        tags: None,
        deprecated: None,
        location: Location {
            uri: document_uri(&signature.file)?,
            range: signature.name_pos.into(),
        },
        container_name: signature
            .file
            .file_name()
            .and_then(|name| name.to_str())
            .map(String::from),
    })
}

/// Search routines across the workspace, ranked by fuzzy match score (best
/// first). An empty query returns every routine.
pub fn workspace_symbol(index: &WorkspaceIndex, query: &str) -> Option<Vec<SymbolInformation>> {
    let symbols = index
        .routines()
        .iter()
        .filter_map(to_symbol_information)
        .collect_vec();
    if query.is_empty() {
        return Some(symbols);
    }

    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
    let pattern =
        pattern::Pattern::parse(query, pattern::CaseMatching::Smart, Normalization::Smart);

    Some(
        symbols
            .into_iter()
            .map(|symbol| compute_match_score(&mut matcher, &pattern, symbol))
            .filter(|(score, _)| *score > 0)
            .sorted_by(|(a, _), (b, _)| Ord::cmp(b, a))
            .map(|(_score, symbol)| symbol)
            .collect_vec(),
    )
}

#[allow(deprecated)]
fn child_symbol(name: &str, kind: SymbolKind, pos: TokenPos) -> DocumentSymbol {
    DocumentSymbol {
        name: name.to_string(),
        detail: None,
        kind,
        tags: None,
        deprecated: None,
        range: pos.into(),
        selection_range: pos.into(),
        children: None,
    }
}

/// Outline of a single file, in source order.
#[allow(deprecated)]
pub fn document_symbol(index: &WorkspaceIndex, path: &Path) -> Option<DocumentSymbolResponse> {
    let entry = index.get_file(path)?;
    let symbols = entry
        .record
        .routines
        .iter()
        .map(|routine| {
            let signature = &routine.signature;
            let body_end = entry.record.scopes[routine.scope].end;
            let children = signature
                .args
                .iter()
                .map(|arg| child_symbol(&arg.name, SymbolKind::VARIABLE, arg.pos))
                .chain(
                    signature
                        .keywords
                        .iter()
                        .map(|keyword| {
                            child_symbol(&keyword.name, SymbolKind::PROPERTY, keyword.pos)
                        }),
                )
                .collect_vec();

            DocumentSymbol {
                name: signature.name.clone(),
                detail: Some(signature.kind.label().to_string()),
                kind: routine_symbol_kind(signature.kind),
                tags: None,
                deprecated: None,
                range: span_range(signature.start, body_end),
                selection_range: signature.name_pos.into(),
                children: (!children.is_empty()).then_some(children),
            }
        })
        .collect_vec();

    Some(DocumentSymbolResponse::Nested(symbols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_index;

    #[test]
    fn test_document_symbol_outline() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[(
            "shapes.pro",
            "pro shape::draw, COLOR=color\n  print, color\nend\n\n\
             function area, w, h\n  return, w * h\nend\n",
        )]);

        let Some(DocumentSymbolResponse::Nested(symbols)) =
            document_symbol(&index, &root.join("shapes.pro"))
        else {
            panic!("expected nested symbols");
        };
        let names = symbols.iter().map(|s| s.name.as_str()).collect_vec();
        assert_eq!(names, vec!["shape::draw", "area"]);
        assert_eq!(symbols[0].kind, SymbolKind::METHOD);
        assert_eq!(symbols[1].children.as_ref().unwrap().len(), 2);
        assert_eq!(symbols[1].range.end.line, 6);
    }

    #[test]
    fn test_workspace_symbol_fuzzy_search() {
        let (_temp_dir, _root, index, _sink) = create_test_index(&[
            ("a.pro", "pro plot_histogram\nend\n"),
            ("b.pro", "pro read_data\nend\n"),
        ]);

        let found = workspace_symbol(&index, "plthist").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "plot_histogram");
        assert_eq!(found[0].container_name.as_deref(), Some("a.pro"));

        assert_eq!(workspace_symbol(&index, "").unwrap().len(), 2);
    }
}
