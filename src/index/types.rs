use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;

use crate::validators::ParsedFile;

/// A committed analysis of one file. Entries are immutable; a reparse
/// replaces the whole entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIndexEntry {
    pub path: PathBuf,
    /// Version captured when the analysis was submitted
    pub version: u64,
    pub parsed: ParsedFile,
}

impl Deref for FileIndexEntry {
    type Target = ParsedFile;
    fn deref(&self) -> &Self::Target {
        &self.parsed
    }
}

#[derive(Debug, Clone)]
pub enum IndexOutcome {
    Committed(Arc<FileIndexEntry>),
    /// A newer submission for the same path exists; nothing was written
    Superseded { version: u64 },
}

impl IndexOutcome {
    pub fn entry(&self) -> Option<&Arc<FileIndexEntry>> {
        match self {
            IndexOutcome::Committed(entry) => Some(entry),
            IndexOutcome::Superseded { .. } => None,
        }
    }
}

/// Submission of a reparse, carrying the version it will commit as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTicket {
    pub path: PathBuf,
    pub version: u64,
    /// Generation of the routine table the post-process pass ran against
    pub checked_against: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    /// Files committed by this run, sorted
    pub indexed: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
    /// Routines in the global table after the run
    pub routines: usize,
    pub problems: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("workspace root {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
    #[error("invalid file pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}
