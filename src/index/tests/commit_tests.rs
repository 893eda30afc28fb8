use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Settings;
use crate::index::{IndexOutcome, WorkspaceIndex};
use crate::parser::RoutineKind;
use crate::problems::ProblemCode;
use crate::validators::ParseOptions;

fn index() -> WorkspaceIndex {
    WorkspaceIndex::new(&Settings::default())
}

fn codes(index: &WorkspaceIndex, path: &Path) -> Vec<u16> {
    index
        .get_file(path)
        .expect("file is indexed")
        .problems()
        .iter()
        .map(|p| p.code)
        .collect()
}

const DRAW_IT: &str = "pro draw_it, COLOR=color\n  print, color\nend\n";
const CALLER: &str = "draw_it, /color\ndraw_it, /thick\n";

/// Test: analyzing the same content twice yields the same result
#[test]
fn test_reindex_is_idempotent() {
    let index = index();
    let path = PathBuf::from("a.pro");
    let first = index.index_file(&path, DRAW_IT).entry().cloned().unwrap();
    let second = index.index_file(&path, DRAW_IT).entry().cloned().unwrap();

    assert_eq!(first.parsed, second.parsed);
    assert_eq!(second.version, first.version + 1);
    assert_eq!(index.routines().len(), 1);
}

/// Test: an older analysis finishing last never overwrites a newer commit
#[test]
fn test_superseded_reparse_is_discarded() {
    let index = index();
    let path = PathBuf::from("a.pro");

    let mut older = index.begin_index(&path);
    let mut newer = index.begin_index(&path);

    let parsed = index.analyze(&mut newer, "pro new_name\nend\n", ParseOptions::default());
    assert!(matches!(index.commit(&newer, parsed), IndexOutcome::Committed(_)));

    let stale = index.analyze(&mut older, "pro old_name\nend\n", ParseOptions::default());
    match index.commit(&older, stale) {
        IndexOutcome::Superseded { version } => assert_eq!(version, older.version),
        IndexOutcome::Committed(_) => panic!("stale analysis was committed"),
    }

    assert_eq!(index.get_file(&path).unwrap().version, newer.version);
    assert!(index.resolve_routine("new_name", RoutineKind::Procedure).is_some());
    assert!(index.resolve_routine("old_name", RoutineKind::Procedure).is_none());
}

/// Test: body-only edits leave other files' table entries and entries alone
#[test]
fn test_unchanged_signatures_do_not_invalidate_other_files() {
    let index = index();
    let a = PathBuf::from("a.pro");
    let b = PathBuf::from("b.pro");
    index.index_file(&a, DRAW_IT);
    index.index_file(&b, "pro beta, x\n  draw_it, x\nend\n");

    let beta_before = index.routine_definitions("beta", RoutineKind::Procedure);
    let b_before = index.get_file(&b).unwrap();

    index.index_file(&a, "pro draw_it, COLOR=color\n  print, color * 2\nend\n");

    assert_eq!(index.routine_definitions("beta", RoutineKind::Procedure), beta_before);
    assert!(Arc::ptr_eq(&index.get_file(&b).unwrap(), &b_before));
}

/// Test: changing a routine's keywords re-runs checks in files calling it
#[test]
fn test_interface_change_revalidates_callers() {
    let index = index();
    let a = PathBuf::from("a.pro");
    let b = PathBuf::from("b.pro");
    index.index_file(&a, DRAW_IT);
    index.index_file(&b, CALLER);
    assert_eq!(codes(&index, &b), vec![ProblemCode::UnknownKeyword.code()]);

    index.index_file(&a, "pro draw_it, COLOR=color, THICK=thick\n  print, color, thick\nend\n");
    assert!(codes(&index, &b).is_empty());

    index.index_file(&a, "pro draw_it\nend\n");
    assert_eq!(
        codes(&index, &b),
        vec![
            ProblemCode::UnknownKeyword.code(),
            ProblemCode::UnknownKeyword.code()
        ]
    );
}

/// Test: a callee changing while a caller is being analyzed does not leave
/// the caller checked against the old routine table
#[test]
fn test_commit_rechecks_against_newer_table() {
    let index = index();
    let a = PathBuf::from("a.pro");
    let b = PathBuf::from("b.pro");
    index.index_file(&a, "pro draw_it\nend\n");

    let mut pending = index.begin_index(&b);
    let parsed = index.analyze(&mut pending, "draw_it, /color\n", ParseOptions::default());
    assert_eq!(parsed.post_process_problems.len(), 1);

    index.index_file(&a, DRAW_IT);
    assert!(matches!(index.commit(&pending, parsed), IndexOutcome::Committed(_)));

    let fresh = index.get_parsed_file(&b, "draw_it, /color\n", ParseOptions::default());
    assert!(fresh.post_process_problems.is_empty());
    assert!(codes(&index, &b).is_empty());
}

/// Test: an analysis without the post-process pass stays unchecked on commit
#[test]
fn test_commit_without_post_process_is_not_rechecked() {
    let index = index();
    let a = PathBuf::from("a.pro");
    let b = PathBuf::from("b.pro");
    index.index_file(&a, DRAW_IT);

    let mut pending = index.begin_index(&b);
    let parsed = index.analyze(&mut pending, CALLER, ParseOptions { post_process: false });
    index.index_file(&a, "pro draw_it\nend\n");
    index.commit(&pending, parsed);

    assert!(codes(&index, &b).is_empty());
}

#[test]
fn test_callers_indexed_first_are_checked_once_definition_arrives() {
    let index = index();
    let b = PathBuf::from("b.pro");
    index.index_file(&b, CALLER);
    assert!(codes(&index, &b).is_empty());

    index.index_file(Path::new("a.pro"), DRAW_IT);
    assert_eq!(codes(&index, &b), vec![ProblemCode::UnknownKeyword.code()]);
}

#[test]
fn test_remove_file() {
    let index = index();
    let a = PathBuf::from("a.pro");
    let b = PathBuf::from("b.pro");
    index.index_file(&a, DRAW_IT);
    index.index_file(&b, CALLER);

    let mut pending = index.begin_index(&a);
    assert!(index.remove_file(&a).is_some());

    assert!(index.get_file(&a).is_none());
    assert!(index.resolve_routine("draw_it", RoutineKind::Procedure).is_none());
    // unresolved calls are not checked
    assert!(codes(&index, &b).is_empty());

    let parsed = index.analyze(&mut pending, DRAW_IT, ParseOptions::default());
    assert!(matches!(index.commit(&pending, parsed), IndexOutcome::Superseded { .. }));
    assert_eq!(index.files(), vec![b]);
}

#[test]
fn test_get_parsed_file_does_not_commit() {
    let index = index();
    index.index_file(Path::new("a.pro"), DRAW_IT);

    let parsed = index.get_parsed_file(
        Path::new("scratch.pro"),
        CALLER,
        ParseOptions { post_process: true },
    );
    assert_eq!(parsed.post_process_problems.len(), 1);

    let unchecked = index.get_parsed_file(
        Path::new("scratch.pro"),
        CALLER,
        ParseOptions { post_process: false },
    );
    assert!(unchecked.post_process_problems.is_empty());
    assert_eq!(index.files(), vec![PathBuf::from("a.pro")]);
}

#[test]
fn test_resolution_by_name_and_kind() {
    let index = index();
    index.index_file(Path::new("a.pro"), "pro sample\nend\nfunction sample\n  return, 1\nend\n");
    index.index_file(Path::new("b.pro"), "pro sample, x\n  print, x\nend\n");

    assert_eq!(index.resolve_routine_any("SAMPLE").len(), 2);
    assert_eq!(index.routine_definitions("sample", RoutineKind::Procedure).len(), 2);
    let resolved = index.resolve_routine("sample", RoutineKind::Procedure).unwrap();
    assert_eq!(resolved.file, PathBuf::from("b.pro"));
}
