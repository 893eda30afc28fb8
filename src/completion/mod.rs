use std::path::Path;

use tower_lsp::lsp_types::{CompletionItem, CompletionList, CompletionResponse, Position};

use crate::{config::Settings, index::FileIndexEntry, index::WorkspaceIndex};

use self::keyword_completer::KeywordFlagCompleter;
use self::method_completer::MethodCompleter;
use self::identifier_completer::IdentifierCompleter;

mod identifier_completer;
mod keyword_completer;
mod method_completer;
mod util;

#[derive(Clone, Copy)]
pub struct Context<'a> {
    index: &'a WorkspaceIndex,
    entry: &'a FileIndexEntry,
    path: &'a Path,
    settings: &'a Settings,
}

pub trait Completer<'a>: Sized {
    fn construct(context: Context<'a>, line: u32, character: u32) -> Option<Self>
    where
        Self: Sized + Completer<'a>;

    fn completions(&self) -> Vec<impl Completable<'a, Self>>
    where
        Self: Sized;

    /// Text typed so far; ranks the candidates
    fn prefix(&self) -> &str;
}

pub trait Completable<'a, T: Completer<'a>>: Sized {
    fn completions(&self, completer: &T) -> Option<CompletionItem>;
}

/// Completions at a position of an indexed file.
///
/// | Context | Candidates |
/// |---------|------------|
/// | after `->` | method names |
/// | after `/` in a call | keywords of the resolved routine |
/// | anywhere else | variables in scope, routines, keywords of the enclosing call |
pub fn get_completions(
    index: &WorkspaceIndex,
    position: Position,
    path: &Path,
    settings: &Settings,
) -> Option<CompletionResponse> {
    let entry = index.get_file(path)?;
    let completion_context = Context {
        index,
        entry: &entry,
        path,
        settings,
    };

    run_completer::<MethodCompleter>(completion_context, position.line, position.character)
        .or_else(|| {
            run_completer::<KeywordFlagCompleter>(
                completion_context,
                position.line,
                position.character,
            )
        })
        .or_else(|| {
            run_completer::<IdentifierCompleter>(
                completion_context,
                position.line,
                position.character,
            )
        })
}

/// Rank tier of a candidate: case-sensitive prefix match first, then
/// case-insensitive prefix, then anything containing the prefix.
fn match_tier(label: &str, prefix: &str) -> Option<u8> {
    if label.starts_with(prefix) {
        Some(0)
    } else if label.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()) {
        Some(1)
    } else if label.to_ascii_lowercase().contains(&prefix.to_ascii_lowercase()) {
        Some(2)
    } else {
        None
    }
}

fn run_completer<'a, T: Completer<'a>>(
    context: Context<'a>,
    line: u32,
    character: u32,
) -> Option<CompletionResponse> {
    let completer = T::construct(context, line, character)?;
    let prefix = completer.prefix().to_string();

    let mut ranked: Vec<(u8, CompletionItem)> = completer
        .completions()
        .into_iter()
        .flat_map(|completable| completable.completions(&completer))
        .filter_map(|item| match_tier(&item.label, &prefix).map(|tier| (tier, item)))
        .collect();
    ranked.sort_by(|(a_tier, a), (b_tier, b)| {
        a_tier
            .cmp(b_tier)
            .then_with(|| a.label.to_ascii_lowercase().cmp(&b.label.to_ascii_lowercase()))
    });
    ranked.dedup_by(|(_, a), (_, b)| a.label == b.label);

    let limit = context.settings.completion_limit;
    let is_incomplete = ranked.len() > limit;
    let items = ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(rank, (_, item))| CompletionItem {
            sort_text: Some(format!("{rank:05}")),
            ..item
        })
        .collect::<Vec<CompletionItem>>();

    Some(CompletionResponse::List(CompletionList {
        is_incomplete,
        items,
    }))
}
