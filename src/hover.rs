//! Hover provider.
//!
//! # Hover Targets
//!
//! | Target | Shows |
//! |--------|-------|
//! | Routine name (definition or call) | Header and documentation |
//! | Keyword name (header or call) | Keyword documentation entry |
//! | Argument or keyword variable | Parameter documentation entry |
//! | Local or common variable | Kind of variable |
//!
//! # Configuration
//!
//! Hover can be disabled via [`Settings::hover`].

use std::path::Path;

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::config::Settings;
use crate::doc_comments::{DocEntry, DocTag};
use crate::index::{Selection, WorkspaceIndex};
use crate::parser::{BindingKind, RoutineSignature, VariableBinding};

/// Generate hover content for the symbol at the cursor position.
///
/// Returns `None` if hover is disabled, the file is not indexed, or the
/// cursor is not on something that resolves.
pub fn hover(
    index: &WorkspaceIndex,
    position: Position,
    path: &Path,
    settings: &Settings,
) -> Option<Hover> {
    if !settings.hover {
        return None;
    }

    let (markdown, pos) = match index.select_symbol_at_position(path, position)? {
        Selection::Routine { signature, pos, .. } => (routine_markdown(index, &signature), pos),
        Selection::Keyword {
            signature,
            keyword,
            pos,
        } => {
            let mut text = code_block(&format!("{}={}", keyword.name, keyword.variable));
            text.push_str(&format!("\n\nKeyword of `{}`", signature.name));
            if let Some(entry) = index.parameter_docs(&signature, DocTag::Keywords, &keyword.name) {
                text.push_str(&entry_markdown(&entry));
            }
            (text, pos)
        }
        Selection::Variable { scope, binding, pos } => {
            let entry = index.get_file(path)?;
            let routine = entry.record.routine_for_scope(scope).map(|r| &r.signature);
            (variable_markdown(index, &binding, routine), pos)
        }
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: markdown,
        }),
        range: Some(pos.into()),
    })
}

fn code_block(code: &str) -> String {
    format!("```idl\n{code}\n```")
}

fn entry_markdown(entry: &DocEntry) -> String {
    let mut text = String::new();
    if !entry.attributes.is_empty() {
        text.push_str(&format!("\n\n*{}*", entry.attributes.join(", ")));
    }
    if !entry.description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&entry.description.join("\n"));
    }
    text
}

pub fn routine_markdown(index: &WorkspaceIndex, signature: &RoutineSignature) -> String {
    let mut text = code_block(&signature.header_text());
    let Some(docs) = index.routine_docs(signature) else {
        return text;
    };

    let description = docs.description();
    if !description.is_empty() {
        text.push_str("\n\n");
        text.push_str(&description.join("\n"));
    }

    for (tag, title) in [(DocTag::Params, "Arguments"), (DocTag::Keywords, "Keywords")] {
        let Some(section) = docs.section(&tag) else {
            continue;
        };
        if section.entries.is_empty() {
            continue;
        }
        text.push_str(&format!("\n\n**{title}**\n"));
        for entry in &section.entries {
            text.push_str(&format!("\n- `{}`", entry.name));
            if !entry.attributes.is_empty() {
                text.push_str(&format!(" *{}*", entry.attributes.join(", ")));
            }
            if !entry.description.is_empty() {
                text.push_str(&format!(": {}", entry.description.join(" ")));
            }
        }
    }

    if let Some(returns) = docs.section(&DocTag::Returns) {
        if !returns.text.is_empty() {
            text.push_str(&format!("\n\n**Returns** {}", returns.text.join(" ")));
        }
    }
    text
}

fn variable_markdown(
    index: &WorkspaceIndex,
    binding: &VariableBinding,
    routine: Option<&RoutineSignature>,
) -> String {
    let mut text = code_block(&binding.name);
    let owner = routine
        .map(|r| format!("`{}`", r.name))
        .unwrap_or_else(|| "the main level".to_string());

    match &binding.kind {
        BindingKind::Argument => {
            text.push_str(&format!("\n\nArgument of {owner}"));
            let docs = routine.and_then(|r| index.parameter_docs(r, DocTag::Params, &binding.name));
            if let Some(entry) = docs {
                text.push_str(&entry_markdown(&entry));
            }
        }
        BindingKind::Keyword(keyword) => {
            text.push_str(&format!("\n\nVariable of keyword `{keyword}` of {owner}"));
            let docs = routine.and_then(|r| index.parameter_docs(r, DocTag::Keywords, keyword));
            if let Some(entry) = docs {
                text.push_str(&entry_markdown(&entry));
            }
        }
        BindingKind::Local => text.push_str(&format!("\n\nLocal variable of {owner}")),
        BindingKind::Common(block) => {
            text.push_str(&format!("\n\nMember of common block `{block}`"))
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_index;

    const PLOT_IT: &str = ";+
; Plots a line.
;
; :Params:
;   x: in, required, type=fltarr
;     Values to plot
; :Keywords:
;   COLOR: in, optional
;     Line color
;-
pro plot_it, x, COLOR=color
  compile_opt idl2
  print, x, color
end
";

    fn hover_text(
        index: &WorkspaceIndex,
        path: &Path,
        line: u32,
        character: u32,
    ) -> Option<String> {
        let hover = hover(index, Position { line, character }, path, &Settings::default())?;
        match hover.contents {
            HoverContents::Markup(markup) => Some(markup.value),
            _ => None,
        }
    }

    /// Test: hovering a call site shows the callee's header and docs
    #[test]
    fn test_hover_call_site() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[
            ("plot_it.pro", PLOT_IT),
            ("main.pro", "plot_it, [1, 2], COLOR=3\n"),
        ]);

        let text = hover_text(&index, &root.join("main.pro"), 0, 2).unwrap();
        assert!(text.starts_with("```idl\npro plot_it, x, COLOR=color\n```"));
        assert!(text.contains("Plots a line."));
        assert!(text.contains("- `x` *in, required, type=fltarr*: Values to plot"));
        assert!(text.contains("- `COLOR` *in, optional*: Line color"));
    }

    #[test]
    fn test_hover_keyword_in_call() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[
            ("plot_it.pro", PLOT_IT),
            ("main.pro", "plot_it, [1, 2], COL=3\n"),
        ]);

        let text = hover_text(&index, &root.join("main.pro"), 0, 18).unwrap();
        assert!(text.contains("COLOR=color"));
        assert!(text.contains("Line color"));
    }

    #[test]
    fn test_hover_argument_variable() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[("plot_it.pro", PLOT_IT)]);
        let text = hover_text(&index, &root.join("plot_it.pro"), 12, 9).unwrap();
        assert!(text.contains("Argument of `plot_it`"));
        assert!(text.contains("Values to plot"));
    }

    #[test]
    fn test_hover_nothing_and_disabled() {
        let (_temp_dir, root, index, _sink) = create_test_index(&[("plot_it.pro", PLOT_IT)]);
        let path = root.join("plot_it.pro");
        // inside the compile_opt statement
        assert!(hover_text(&index, &path, 11, 4).is_none());

        let settings = Settings {
            hover: false,
            ..Default::default()
        };
        assert!(hover(&index, Position { line: 10, character: 5 }, &path, &settings).is_none());
    }
}
