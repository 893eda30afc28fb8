//! Index paths of client documents.
//!
//! Files on disk are indexed under their own path. Documents without one,
//! such as notebook cells (`vscode-notebook-cell:`), are indexed under their
//! URI text, which keeps one entry per cell and maps back to the same URI.

use std::path::{Path, PathBuf};

use tower_lsp::lsp_types::Url;

pub fn document_path(uri: &Url) -> Option<PathBuf> {
    match uri.scheme() {
        "file" => uri.to_file_path().ok(),
        _ => Some(PathBuf::from(uri.as_str())),
    }
}

/// URI of an indexed path. Relative paths that are not URI text have none.
pub fn document_uri(path: &Path) -> Option<Url> {
    if path.is_absolute() {
        return Url::from_file_path(path).ok();
    }
    let text = path.to_str()?;
    Url::parse(text).ok().filter(|uri| uri.scheme() != "file")
}

/// Whether a path stands for a document with no file on disk.
pub fn is_virtual(path: &Path) -> bool {
    !path.is_absolute() && document_uri(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELL: &str = "vscode-notebook-cell:/home/user/analysis.idlnb#W0sZmlsZQ%3D%3D";

    #[test]
    fn test_file_uri_maps_to_its_path() {
        let uri = Url::parse("file:///home/user/a.pro").unwrap();
        let path = document_path(&uri).unwrap();
        assert_eq!(path, PathBuf::from("/home/user/a.pro"));
        assert_eq!(document_uri(&path), Some(uri));
        assert!(!is_virtual(&path));
    }

    /// Test: notebook cells get a stable path that maps back to the cell
    #[test]
    fn test_notebook_cell_round_trips() {
        let uri = Url::parse(CELL).unwrap();
        let path = document_path(&uri).unwrap();
        assert!(is_virtual(&path));
        assert_eq!(document_uri(&path), Some(uri));
    }

    #[test]
    fn test_plain_relative_path_has_no_uri() {
        assert_eq!(document_uri(Path::new("a.pro")), None);
        assert!(!is_virtual(Path::new("a.pro")));
    }
}
