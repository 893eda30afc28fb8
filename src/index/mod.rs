//! Workspace index.
//!
//! Holds every committed [`FileIndexEntry`] and the global [`SymbolTable`].
//! Analysis never runs under the state lock: a reparse captures a version
//! ([`WorkspaceIndex::begin_index`]), analyzes against a snapshot of the
//! table, then [`WorkspaceIndex::commit`]s, which is discarded if a newer
//! submission for the same path exists.
//!
//! When a commit changes the interface of a routine, files whose call sites
//! name it get their post-process pass re-run against the new table. An
//! analysis checked against an older table generation is re-checked when it
//! commits.

mod select;
mod symbols;
mod types;

#[cfg(test)]
mod tests;

pub use select::Selection;
pub use symbols::{ExcludingFile, SymbolTable};
pub use types::{
    FailedFile, FileIndexEntry, IndexError, IndexOutcome, IndexSummary, IndexTicket,
};

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use itertools::Itertools;
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Settings;
use crate::logger::{LogEntry, LogSink, TracingSink};
use crate::parser::{RoutineKey, RoutineKind, RoutineSignature};
use crate::problems::SyntaxProblem;
use crate::validators::{self, post_process, ParseOptions, ParsedFile};

#[derive(Debug, Default)]
struct IndexState {
    files: HashMap<PathBuf, Arc<FileIndexEntry>>,
    symbols: Arc<SymbolTable>,
    /// Bumped whenever a routine interface in `symbols` changes
    generation: u64,
}

pub struct WorkspaceIndex {
    file_patterns: Vec<String>,
    state: RwLock<IndexState>,
    versions: DashMap<PathBuf, u64>,
    sink: Arc<dyn LogSink>,
}

impl WorkspaceIndex {
    pub fn new(settings: &Settings) -> WorkspaceIndex {
        WorkspaceIndex::with_sink(settings, Arc::new(TracingSink))
    }

    pub fn with_sink(settings: &Settings, sink: Arc<dyn LogSink>) -> WorkspaceIndex {
        WorkspaceIndex {
            file_patterns: settings.file_patterns.clone(),
            state: RwLock::new(IndexState::default()),
            versions: DashMap::new(),
            sink,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, ticket: &IndexTicket) -> bool {
        self.versions
            .get(&ticket.path)
            .is_some_and(|version| *version == ticket.version)
    }

    /// Snapshot of the global routine table.
    pub fn symbols(&self) -> Arc<SymbolTable> {
        self.read().symbols.clone()
    }

    /// Register a reparse of `path`. Later submissions for the same path
    /// supersede this one.
    pub fn begin_index(&self, path: &Path) -> IndexTicket {
        let mut version = self.versions.entry(path.to_path_buf()).or_insert(0);
        *version += 1;
        IndexTicket {
            path: path.to_path_buf(),
            version: *version,
            checked_against: None,
        }
    }

    /// Analyze content for a ticket without touching committed state. The
    /// ticket records which table generation the post-process pass saw.
    pub fn analyze(
        &self,
        ticket: &mut IndexTicket,
        content: &str,
        options: ParseOptions,
    ) -> ParsedFile {
        let (symbols, generation) = {
            let state = self.read();
            (state.symbols.clone(), state.generation)
        };
        ticket.checked_against = options.post_process.then_some(generation);
        validators::analyze(&ticket.path, content, options, &symbols.excluding(&ticket.path))
    }

    /// Commit an analysis. Returns [`IndexOutcome::Superseded`] without
    /// writing anything when a newer submission exists for the path.
    pub fn commit(&self, ticket: &IndexTicket, mut parsed: ParsedFile) -> IndexOutcome {
        let (entry, changed) = {
            let mut state = self.write();
            if !self.is_current(ticket) {
                debug!(
                    path = %ticket.path.display(),
                    version = ticket.version,
                    "discarding superseded analysis"
                );
                return IndexOutcome::Superseded {
                    version: ticket.version,
                };
            }
            let stale = ticket
                .checked_against
                .is_some_and(|generation| generation != state.generation);
            if stale {
                debug!(path = %ticket.path.display(), "routine table changed during analysis");
                parsed.post_process_problems =
                    post_process(&parsed, &state.symbols.excluding(&ticket.path));
            }
            let signatures: Vec<RoutineSignature> = parsed.record.signatures().cloned().collect();
            let changed = Arc::make_mut(&mut state.symbols).replace_file(&ticket.path, &signatures);
            if !changed.is_empty() {
                state.generation += 1;
            }

            let entry = Arc::new(FileIndexEntry {
                path: ticket.path.clone(),
                version: ticket.version,
                parsed,
            });
            state.files.insert(ticket.path.clone(), entry.clone());
            (entry, changed)
        };

        debug!(
            path = %ticket.path.display(),
            version = ticket.version,
            changed = changed.len(),
            "committed file"
        );
        if !changed.is_empty() {
            self.revalidate_dependents(&changed, &HashSet::from([ticket.path.clone()]));
        }
        IndexOutcome::Committed(entry)
    }

    /// Reparse one file and commit it.
    pub fn index_file(&self, path: &Path, content: &str) -> IndexOutcome {
        self.index_file_with(path, content, ParseOptions::default())
    }

    pub fn index_file_with(
        &self,
        path: &Path,
        content: &str,
        options: ParseOptions,
    ) -> IndexOutcome {
        let mut ticket = self.begin_index(path);
        let parsed = self.analyze(&mut ticket, content, options);
        self.commit(&ticket, parsed)
    }

    /// Analyze content as if it were `path`, without committing.
    pub fn get_parsed_file(&self, path: &Path, content: &str, options: ParseOptions) -> ParsedFile {
        let symbols = self.symbols();
        validators::analyze(path, content, options, &symbols.excluding(path))
    }

    /// Forget a file. Pending reparses of it are superseded.
    pub fn remove_file(&self, path: &Path) -> Option<Arc<FileIndexEntry>> {
        self.begin_index(path);
        let (removed, changed) = {
            let mut state = self.write();
            let removed = state.files.remove(path);
            let changed = Arc::make_mut(&mut state.symbols).remove_file(path);
            if !changed.is_empty() {
                state.generation += 1;
            }
            (removed, changed)
        };
        if !changed.is_empty() {
            self.revalidate_dependents(&changed, &HashSet::new());
        }
        removed
    }

    /// Re-run the post-process pass of every file calling one of `changed`.
    fn revalidate_dependents(&self, changed: &[RoutineKey], skip: &HashSet<PathBuf>) {
        let (targets, symbols) = {
            let state = self.read();
            let targets: Vec<Arc<FileIndexEntry>> = state
                .files
                .values()
                .filter(|entry| !skip.contains(&entry.path))
                .filter(|entry| changed.iter().any(|key| entry.calls_to(key).next().is_some()))
                .cloned()
                .collect();
            (targets, state.symbols.clone())
        };
        if targets.is_empty() {
            return;
        }
        debug!(files = targets.len(), "revalidating dependents");

        let updated: Vec<(Arc<FileIndexEntry>, Vec<SyntaxProblem>)> = targets
            .into_par_iter()
            .map(|entry| {
                let problems = post_process(&entry.parsed, &symbols.excluding(&entry.path));
                (entry, problems)
            })
            .collect();

        let mut state = self.write();
        for (old, problems) in updated {
            let unchanged = state
                .files
                .get(&old.path)
                .is_some_and(|current| Arc::ptr_eq(current, &old));
            // a newer commit already validated against the newer table
            if !unchanged || old.post_process_problems == problems {
                continue;
            }
            let mut parsed = old.parsed.clone();
            parsed.post_process_problems = problems;
            state.files.insert(
                old.path.clone(),
                Arc::new(FileIndexEntry {
                    path: old.path.clone(),
                    version: old.version,
                    parsed,
                }),
            );
        }
    }

    fn compile_patterns(&self) -> Result<Vec<glob::Pattern>, IndexError> {
        self.file_patterns
            .iter()
            .map(|pattern| {
                glob::Pattern::new(pattern).map_err(|source| IndexError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Files under `root` matching the configured patterns, hidden
    /// directories skipped.
    fn workspace_files(root: &Path, patterns: &[glob::Pattern]) -> Vec<PathBuf> {
        WalkDir::new(root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !e
                        .file_name()
                        .to_str()
                        .map(|s| s.starts_with('.'))
                        .unwrap_or(false)
            })
            .flatten()
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                e.file_name()
                    .to_str()
                    .is_some_and(|name| patterns.iter().any(|p| p.matches(name)))
            })
            .map(|e| e.into_path())
            .collect()
    }

    /// Index every matching file under `roots`.
    ///
    /// Files are parsed in parallel, every signature is registered, then the
    /// post-process pass runs in parallel against the complete table. A
    /// non-incremental run starts from an empty index.
    pub fn index_workspace(
        &self,
        roots: &[PathBuf],
        incremental: bool,
    ) -> Result<IndexSummary, IndexError> {
        if let Some(missing) = roots.iter().find(|root| !root.is_dir()) {
            return Err(IndexError::MissingRoot(missing.clone()));
        }
        let patterns = self.compile_patterns()?;

        if !incremental {
            let mut state = self.write();
            state.files.clear();
            Arc::make_mut(&mut state.symbols).clear();
            state.generation += 1;
        }

        let paths: Vec<PathBuf> = roots
            .iter()
            .flat_map(|root| Self::workspace_files(root, &patterns))
            .sorted()
            .dedup()
            .collect();
        info!(roots = roots.len(), files = paths.len(), incremental, "indexing workspace");

        let results: Vec<Result<(IndexTicket, ParsedFile), FailedFile>> = paths
            .par_iter()
            .map(|path| {
                let ticket = self.begin_index(path);
                match std::fs::read_to_string(path) {
                    Ok(content) => {
                        debug!(path = %path.display(), "parsed file");
                        Ok((ticket, validators::parse_file(path, &content)))
                    }
                    Err(err) => Err(FailedFile {
                        path: path.clone(),
                        reason: err.to_string(),
                    }),
                }
            })
            .collect();

        let (parsed, failed): (Vec<_>, Vec<_>) = results.into_iter().partition_result();
        for failure in &failed {
            let name = failure
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| failure.path.display().to_string());
            let content = format!("Failed to read {}: {}", failure.path.display(), failure.reason);
            self.sink.log(
                LogEntry::warning(content)
                    .with_alert(format!("{name} could not be read and was not indexed")),
            );
        }

        let (symbols, generation, changed) = {
            let mut state = self.write();
            let table = Arc::make_mut(&mut state.symbols);
            let mut changed = Vec::new();
            for (ticket, file) in parsed.iter().filter(|(ticket, _)| self.is_current(ticket)) {
                let signatures: Vec<RoutineSignature> = file.record.signatures().cloned().collect();
                changed.extend(table.replace_file(&ticket.path, &signatures));
            }
            if !changed.is_empty() {
                state.generation += 1;
            }
            (state.symbols.clone(), state.generation, changed)
        };

        let validated: Vec<(IndexTicket, ParsedFile)> = parsed
            .into_par_iter()
            .map(|(mut ticket, mut file)| {
                file.post_process_problems = post_process(&file, &symbols.excluding(&ticket.path));
                ticket.checked_against = Some(generation);
                (ticket, file)
            })
            .collect();

        let mut summary = IndexSummary {
            failed,
            ..Default::default()
        };
        {
            let mut state = self.write();
            for (ticket, mut file) in validated {
                if !self.is_current(&ticket) {
                    continue;
                }
                if ticket.checked_against != Some(state.generation) {
                    file.post_process_problems =
                        post_process(&file, &state.symbols.excluding(&ticket.path));
                }
                summary.problems += file.parse_problems.len() + file.post_process_problems.len();
                summary.indexed.push(ticket.path.clone());
                state.files.insert(
                    ticket.path.clone(),
                    Arc::new(FileIndexEntry {
                        path: ticket.path,
                        version: ticket.version,
                        parsed: file,
                    }),
                );
            }
            summary.routines = state.symbols.len();
        }

        if incremental && !changed.is_empty() {
            let skip: HashSet<PathBuf> = summary.indexed.iter().cloned().collect();
            self.revalidate_dependents(&changed.into_iter().unique().collect_vec(), &skip);
        }

        info!(
            indexed = summary.indexed.len(),
            failed = summary.failed.len(),
            routines = summary.routines,
            problems = summary.problems,
            "workspace indexed"
        );
        Ok(summary)
    }

    pub fn get_file(&self, path: &Path) -> Option<Arc<FileIndexEntry>> {
        self.read().files.get(path).cloned()
    }

    /// Indexed paths, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        self.read().files.keys().cloned().sorted().collect()
    }

    pub fn entries(&self) -> Vec<Arc<FileIndexEntry>> {
        self.read()
            .files
            .values()
            .cloned()
            .sorted_by(|a, b| a.path.cmp(&b.path))
            .collect()
    }

    pub fn resolve_routine(&self, name: &str, kind: RoutineKind) -> Option<RoutineSignature> {
        self.symbols().resolve(&RoutineKey::new(name, kind)).cloned()
    }

    pub fn resolve_routine_any(&self, name: &str) -> Vec<RoutineSignature> {
        self.symbols()
            .resolve_any(name)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn routine_definitions(&self, name: &str, kind: RoutineKind) -> Vec<RoutineSignature> {
        self.symbols()
            .definitions(&RoutineKey::new(name, kind))
            .to_vec()
    }

    /// Resolved routine per key, sorted by key.
    pub fn routines(&self) -> Vec<RoutineSignature> {
        self.symbols().routines().into_iter().cloned().collect()
    }
}
