//! idl-index: a static-analysis index and language server for IDL
//!
//! This crate indexes IDL (`.pro`) source files and answers structural
//! queries about them, either through the library API or over the Language
//! Server Protocol.
//!
//! # Overview
//!
//! - **Tokenizer**: position-tagged tokens, continuation and string handling
//! - **Doc-Comment Linker**: `;+ ... ;-` blocks parsed into tagged sections
//!   and attached to the routine that follows
//! - **Structural Parser**: routines, scopes, variable occurrences and call
//!   sites, without an expression tree
//! - **Validators**: parse-time and post-process checks with stable problem
//!   codes
//! - **Workspace Index**: every file plus a global routine table, reindexed
//!   incrementally
//! - **Queries**: hover, go-to-definition, references, completion, symbols
//!   and semantic tokens
//!
//! # Architecture
//!
//! Data flows one way per file ([`tokenizer`] → [`doc_comments`] and
//! [`parser`] → [`validators`]) and both ways across files through the
//! [`index`]: a routine defined in one file is checked against calls in
//! every other.
//!
//! ```ignore
//! use idl_index::config::Settings;
//! use idl_index::index::WorkspaceIndex;
//!
//! let index = WorkspaceIndex::new(&Settings::default());
//! let summary = index.index_workspace(&[workspace_root], false)?;
//! let problems = index.get_file(&path).map(|entry| entry.problems());
//! ```

// Analysis pipeline
pub mod doc_comments;
pub mod parser;
pub mod problems;
pub mod tokenizer;
pub mod validators;

// Workspace index
pub mod index;

// Query and LSP feature modules
pub mod completion;
pub mod diagnostics;
pub mod documents;
pub mod gotodef;
pub mod hover;
pub mod references;
pub mod semantic_tokens;
pub mod symbol;

// Configuration, logging and front ends
pub mod cli;
pub mod config;
pub mod logger;
pub mod server;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;
