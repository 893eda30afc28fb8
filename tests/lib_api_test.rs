//! Integration tests for the idl-index library public API.
//!
//! These tests use the crate the way an external consumer would: through the
//! analysis pipeline, the workspace index and the query functions.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tower_lsp::lsp_types::{CompletionResponse, HoverContents, Position, Url};

use idl_index::completion::get_completions;
use idl_index::config::Settings;
use idl_index::gotodef::goto_definition;
use idl_index::hover::hover;
use idl_index::index::WorkspaceIndex;
use idl_index::problems::{ProblemCode, SyntaxProblem};
use idl_index::tokenizer::{split_lines, tokenize, TokenKind, TokenPos};
use idl_index::validators::{analyze, parse_file, NoLookup, ParseOptions};

/// Helper: Create a temporary workspace directory for testing.
///
/// Returns (TempDir, PathBuf) - keep TempDir alive for test duration.
fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace_dir = temp_dir.path().join("workspace");
    fs::create_dir(&workspace_dir).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace_dir)
}

fn index_workspace(root: &Path) -> WorkspaceIndex {
    let index = WorkspaceIndex::new(&Settings::default());
    index
        .index_workspace(&[root.to_path_buf()], false)
        .expect("Failed to index workspace");
    index
}

const DOCUMENTED_KEYWORD: &str = ";+
;
; :Keywords:
;   KW1: in, optional, type=boolean
;     My favorite argument
;
;-
pro myclass::mymethod, KW1=kw1
  compile_opt idl2
  print, kw1
end
";

// ============================================================================
// Analysis pipeline
// ============================================================================

#[test]
fn test_tokenize_from_external_crate() {
    let tokenized = tokenize(&split_lines("x = 'it''s' ; note\n"));

    let kinds: Vec<TokenKind> = tokenized.tokens.iter().map(|t| t.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Identifier,
            TokenKind::Operator,
            TokenKind::String,
            TokenKind::Comment
        ]
    );
    assert!(tokenized.problems.is_empty());
}

/// Test: a documented keyword that is declared and read yields no problems
#[test]
fn test_documented_keyword_in_use_is_clean() {
    let parsed = analyze(
        Path::new("myclass__define.pro"),
        DOCUMENTED_KEYWORD,
        ParseOptions::default(),
        &NoLookup,
    );
    assert!(parsed.problems().is_empty(), "{:?}", parsed.problems());
}

/// Test: keywords documented on a routine without keywords
#[test]
fn test_documented_keyword_without_declaration() {
    let source = DOCUMENTED_KEYWORD
        .replace("pro myclass::mymethod, KW1=kw1", "pro myclass::mymethod")
        .replace("  print, kw1\n", "");
    let parsed = analyze(
        Path::new("myclass__define.pro"),
        &source,
        ParseOptions::default(),
        &NoLookup,
    );

    let problems = parsed.problems();
    assert_eq!(problems.len(), 2);
    assert_eq!(problems[0].code, ProblemCode::NoKwsToDoc.code());
    assert_eq!(problems[0].start, TokenPos::new(2, 2, 11));
    assert_eq!(problems[0].end, TokenPos::new(5, 0, 1));
    assert_eq!(problems[1].code, ProblemCode::DocumentedParamMissing.code());
    assert_eq!(problems[1].start, TokenPos::new(3, 0, 35));
}

#[test]
fn test_syntax_problem_wire_shape() {
    let problem = SyntaxProblem::at(
        ProblemCode::UnusedVariable,
        "Unused variable \"kw1\"",
        TokenPos::new(7, 27, 3),
    );

    let json = serde_json::to_string(&problem).unwrap();
    assert_eq!(
        json,
        r#"{"code":104,"info":"Unused variable \"kw1\"","start":[7,27,3],"end":[7,27,3]}"#
    );

    let back: SyntaxProblem = serde_json::from_str(&json).unwrap();
    assert_eq!(back, problem);
}

#[test]
fn test_parse_file_records_structure() {
    let parsed = parse_file(
        Path::new("area.pro"),
        "function area, w, h, SCALE=scale\n  return, w * h * scale\nend\n",
    );

    let signature = parsed.record.signatures().next().unwrap();
    assert_eq!(signature.name, "area");
    assert!(signature.kind.is_function());
    assert_eq!(signature.args.len(), 2);
    assert_eq!(signature.keywords[0].name, "SCALE");
    assert!(parsed.parse_problems.is_empty());
}

// ============================================================================
// Queries against an indexed workspace
// ============================================================================

#[test]
fn test_queries_across_files() {
    let (_temp_dir, root) = create_test_workspace_dir();
    fs::write(
        root.join("smooth_it.pro"),
        ";+\n; Smooth a signal.\n;\n; :Params:\n;   signal: in, required\n\
         ;     Values to smooth\n;-\nfunction smooth_it, signal\n  return, signal\nend\n",
    )
    .unwrap();
    fs::write(
        root.join("main.pro"),
        "data = [1, 2, 3]\nsmoothed = smooth_it(data)\nprint, smoothed\n",
    )
    .unwrap();

    let index = index_workspace(&root);
    let main = root.join("main.pro");
    let settings = Settings::default();

    let Some(hovered) = hover(&index, Position { line: 1, character: 13 }, &main, &settings) else {
        panic!("expected hover on the call");
    };
    let HoverContents::Markup(markup) = hovered.contents else {
        panic!("expected markdown hover");
    };
    assert!(markup.value.contains("function smooth_it, signal"));
    assert!(markup.value.contains("Smooth a signal."));

    let Some(locations) = goto_definition(&index, Position { line: 1, character: 13 }, &main) else {
        panic!("expected a definition");
    };
    assert_eq!(locations[0].uri, Url::from_file_path(root.join("smooth_it.pro")).unwrap());
    assert_eq!(locations[0].range.start, Position { line: 7, character: 9 });

    let position = Position {
        line: 2,
        character: 9,
    };
    let Some(CompletionResponse::List(list)) = get_completions(&index, position, &main, &settings)
    else {
        panic!("expected completions");
    };
    let labels: Vec<&str> = list.items.iter().map(|item| item.label.as_str()).collect();
    assert_eq!(labels, vec!["smooth_it", "smoothed"]);
}
