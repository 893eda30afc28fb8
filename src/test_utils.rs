//! Shared test utilities.
//!
//! Only compiled when running tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::Settings;
use crate::index::WorkspaceIndex;
use crate::logger::MemorySink;

/// Creates a temporary workspace directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The path to the workspace subdirectory
///
/// Workspace walks skip hidden directories, and on some systems temp
/// directories live under paths like `/tmp/.tmpXXXXX`, so files go into a
/// non-hidden "workspace" subdirectory.
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let workspace_dir = temp_dir.path().join("workspace");
    fs::create_dir(&workspace_dir).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace_dir)
}

/// Writes `files` (relative path, content) into a fresh workspace and
/// indexes it with default settings.
///
/// # Example
///
/// ```ignore
/// use crate::test_utils::create_test_index;
///
/// let (_temp_dir, root, index, _sink) = create_test_index(&[("plot.pro", "pro plot_it\nend\n")]);
/// assert!(index.get_file(&root.join("plot.pro")).is_some());
/// ```
pub fn create_test_index(
    files: &[(&str, &str)],
) -> (TempDir, PathBuf, WorkspaceIndex, Arc<MemorySink>) {
    let (temp_dir, root) = create_test_workspace_dir();
    for (name, content) in files {
        write_file(&root, name, content);
    }
    let sink = Arc::new(MemorySink::default());
    let index = WorkspaceIndex::with_sink(&Settings::default(), sink.clone());
    index
        .index_workspace(&[root.clone()], false)
        .expect("Failed to index test workspace");
    (temp_dir, root, index, sink)
}

pub fn write_file(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    fs::write(&path, content).expect("Failed to write test file");
    path
}
