//! Command-line interface.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tower_lsp::lsp_types::ClientCapabilities;

use crate::config::Settings;
use crate::index::WorkspaceIndex;
use crate::problems::{Severity, SyntaxProblem};

#[derive(Parser)]
#[command(name = "idl-index")]
#[command(about = "Static analysis and language server for IDL source files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the language server on stdin/stdout
    #[command(alias = "lsp")]
    Serve,
    /// Index the given directories and report every problem found
    Check {
        #[arg(required = true)]
        roots: Vec<PathBuf>,
        /// Print problems as JSON, keyed by file, with unreadable files listed
        /// separately
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckSummary {
    pub files: usize,
    pub errors: usize,
    pub warnings: usize,
    /// Files that matched but could not be read
    pub failed: usize,
}

#[derive(Serialize)]
struct FailureReport {
    path: String,
    reason: String,
}

#[derive(Serialize, Default)]
struct Report {
    problems: BTreeMap<String, Vec<SyntaxProblem>>,
    failed: Vec<FailureReport>,
}

fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Information => "info",
    }
}

fn display_path(path: &Path, base: &Path) -> String {
    pathdiff::diff_paths(path, base)
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}

/// Index `roots` and write their problems to `out`. Settings are read from
/// the first root.
pub fn check(roots: &[PathBuf], json: bool, out: &mut impl Write) -> anyhow::Result<CheckSummary> {
    let base = roots
        .first()
        .context("No directory given")?
        .canonicalize()
        .context("Failed to resolve workspace root")?;
    let settings = Settings::new(&base, &ClientCapabilities::default())?;

    let index = WorkspaceIndex::new(&settings);
    let roots = roots
        .iter()
        .map(|root| {
            root.canonicalize()
                .with_context(|| format!("Failed to resolve {}", root.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let indexed = index.index_workspace(&roots, false)?;

    let mut summary = CheckSummary {
        failed: indexed.failed.len(),
        ..Default::default()
    };
    let mut report = Report {
        failed: indexed
            .failed
            .iter()
            .map(|failure| FailureReport {
                path: display_path(&failure.path, &base),
                reason: failure.reason.clone(),
            })
            .collect(),
        ..Default::default()
    };
    for entry in index.entries() {
        summary.files += 1;
        let problems: Vec<SyntaxProblem> = entry
            .problems()
            .into_iter()
            .filter(|problem| !settings.is_disabled(problem.code))
            .collect();
        for problem in &problems {
            match problem.severity() {
                Severity::Error => summary.errors += 1,
                Severity::Warning => summary.warnings += 1,
                Severity::Information => {}
            }
        }
        if !problems.is_empty() {
            report.problems.insert(display_path(&entry.path, &base), problems);
        }
    }

    if json {
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        for (path, problems) in &report.problems {
            for problem in problems {
                writeln!(
                    out,
                    "{}:{}:{}: {} [{}] {}",
                    path,
                    problem.start.line + 1,
                    problem.start.column + 1,
                    severity_label(problem.severity()),
                    problem.code,
                    problem.info
                )?;
            }
        }
        writeln!(
            out,
            "{} files checked: {} errors, {} warnings",
            summary.files, summary.errors, summary.warnings
        )?;
        for failure in &report.failed {
            writeln!(out, "{}: could not be read: {}", failure.path, failure.reason)?;
        }
    }

    Ok(summary)
}
