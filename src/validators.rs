//! Validator pipeline.
//!
//! Analysis of one file runs in two passes:
//!
//! | Pass         | Needs                         | Problems                  |
//! |--------------|-------------------------------|---------------------------|
//! | parse time   | the file's text only          | tokenizer, doc, structure |
//! | post process | the completed record + lookup | usage, docs, call checks  |
//!
//! The post-process pass is the only place where other files matter, through
//! [`RoutineLookup`]. Each pass's list is sorted by start position on its own;
//! the reported list is the parse-time list followed by the post-process one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::doc_comments::{link_doc_blocks, DocCommentBlock, DocSection, DocTag};
use crate::parser::{
    is_extra_keyword, parse, CallSite, RoutineKey, RoutineSignature, StructuralRecord,
};
use crate::problems::{sort_problems, ProblemCode, SyntaxProblem};
use crate::tokenizer::{split_lines, tokenize, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Run the post-process pass after parsing
    pub post_process: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions { post_process: true }
    }
}

/// Routines defined outside the file being validated.
pub trait RoutineLookup {
    fn routine(&self, key: &RoutineKey) -> Option<RoutineSignature>;

    /// Resolve a method called without its class (`obj->draw`). Returns
    /// `None` when the name is unknown or ambiguous.
    fn method(&self, method: &str, function: bool) -> Option<RoutineSignature>;
}

/// Lookup for files analyzed in isolation.
pub struct NoLookup;

impl RoutineLookup for NoLookup {
    fn routine(&self, _key: &RoutineKey) -> Option<RoutineSignature> {
        None
    }

    fn method(&self, _method: &str, _function: bool) -> Option<RoutineSignature> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub tokens: Vec<Token>,
    pub doc_blocks: Vec<DocCommentBlock>,
    pub record: StructuralRecord,
    pub parse_problems: Vec<SyntaxProblem>,
    pub post_process_problems: Vec<SyntaxProblem>,
}

impl ParsedFile {
    /// Parse-time problems followed by post-process problems.
    pub fn problems(&self) -> Vec<SyntaxProblem> {
        self.parse_problems
            .iter()
            .chain(self.post_process_problems.iter())
            .cloned()
            .collect()
    }

    pub fn docs_for(&self, signature: &RoutineSignature) -> Option<&DocCommentBlock> {
        self.doc_blocks
            .iter()
            .find(|block| block.routine_start == Some(signature.start))
    }

    /// Code token under the cursor, comments excluded.
    pub fn token_at(&self, line: u32, character: u32) -> Option<&Token> {
        self.tokens
            .iter()
            .find(|t| !t.kind.is_comment() && t.contains(line, character))
    }

    /// Call sites naming a routine, in source order.
    pub fn calls_to<'a>(&'a self, key: &'a RoutineKey) -> impl Iterator<Item = &'a CallSite> {
        self.record.call_sites.iter().filter(move |call| {
            call.kind == key.kind
                && if call.is_unqualified_method() {
                    key.method_name().eq_ignore_ascii_case(&call.name)
                } else {
                    call.name.eq_ignore_ascii_case(&key.name)
                }
        })
    }
}

/// Parse-time pass: tokenize, link documentation and build the structural
/// record. Never looks outside the file.
pub fn parse_file(path: &Path, content: &str) -> ParsedFile {
    let lines = split_lines(content);
    let tokenized = tokenize(&lines);
    let (doc_blocks, doc_problems) = link_doc_blocks(&tokenized.tokens, &lines);
    let (record, structure_problems) = parse(path, &tokenized.tokens);

    let mut parse_problems = tokenized.problems;
    parse_problems.extend(doc_problems);
    parse_problems.extend(structure_problems);
    sort_problems(&mut parse_problems);

    ParsedFile {
        path: path.to_path_buf(),
        tokens: tokenized.tokens,
        doc_blocks,
        record,
        parse_problems,
        post_process_problems: Vec::new(),
    }
}

/// Both passes, as configured by `options`.
pub fn analyze(
    path: &Path,
    content: &str,
    options: ParseOptions,
    lookup: &dyn RoutineLookup,
) -> ParsedFile {
    let mut parsed = parse_file(path, content);
    if options.post_process {
        parsed.post_process_problems = post_process(&parsed, lookup);
    }
    parsed
}

/// Resolve the routine a call site names: the file's own routines first,
/// then the lookup.
pub fn resolve_call(
    file: &ParsedFile,
    call: &CallSite,
    lookup: &dyn RoutineLookup,
) -> Option<RoutineSignature> {
    if call.is_unqualified_method() {
        let mut own = file
            .record
            .signatures()
            .filter(|s| {
                s.kind == call.kind && s.key().method_name().eq_ignore_ascii_case(&call.name)
            });
        return match (own.next(), own.next()) {
            (Some(signature), None) => Some(signature.clone()),
            (None, _) => lookup.method(&call.name, call.kind.is_function()),
            _ => None,
        };
    }

    let key = call.key();
    file.record
        .signatures()
        .filter(|s| s.key() == key)
        .last()
        .cloned()
        .or_else(|| lookup.routine(&key))
}

/// Post-process pass over a parsed file.
pub fn post_process(file: &ParsedFile, lookup: &dyn RoutineLookup) -> Vec<SyntaxProblem> {
    let mut problems = Vec::new();

    for routine in &file.record.routines {
        if let Some(block) = file.docs_for(&routine.signature) {
            check_docs(&routine.signature, block, &mut problems);
        }
    }
    check_unused(&file.record, &mut problems);
    for call in &file.record.call_sites {
        if let Some(signature) = resolve_call(file, call, lookup) {
            check_call(call, &signature, &mut problems);
        }
    }

    sort_problems(&mut problems);
    problems
}

fn check_unused(record: &StructuralRecord, problems: &mut Vec<SyntaxProblem>) {
    for binding in record.scopes.iter().flat_map(|s| s.bindings.iter()) {
        if !binding.is_used() {
            problems.push(SyntaxProblem::at(
                ProblemCode::UnusedVariable,
                ProblemCode::UnusedVariable.message_for(&binding.name),
                binding.first_occurrence(),
            ));
        }
    }
}

fn section_span(block: &DocCommentBlock, section: &DocSection, code: ProblemCode) -> SyntaxProblem {
    SyntaxProblem::new(
        code,
        code.message(),
        section.header.unwrap_or(block.open),
        section.end,
    )
}

fn check_docs(
    signature: &RoutineSignature,
    block: &DocCommentBlock,
    problems: &mut Vec<SyntaxProblem>,
) {
    let declared_args: HashSet<String> = signature
        .args
        .iter()
        .map(|a| a.name.to_ascii_lowercase())
        .collect();
    let declared_keywords: HashSet<String> = signature
        .keywords
        .iter()
        .map(|k| k.name.to_ascii_lowercase())
        .collect();

    if let Some(section) = block.section(&DocTag::Params) {
        if declared_args.is_empty() && !section.entries.is_empty() {
            problems.push(section_span(block, section, ProblemCode::NoArgsToDoc));
        }
        let documented: HashSet<String> = section.entries.iter().map(|e| e.key()).collect();
        for entry in &section.entries {
            if !declared_args.contains(&entry.key()) {
                problems.push(SyntaxProblem::at(
                    ProblemCode::DocumentedParamMissing,
                    ProblemCode::DocumentedParamMissing.message_for(&entry.key()),
                    entry.range,
                ));
            }
        }
        for arg in &signature.args {
            if !documented.contains(&arg.name.to_ascii_lowercase()) {
                problems.push(SyntaxProblem::at(
                    ProblemCode::ArgMissingFromDocs,
                    ProblemCode::ArgMissingFromDocs.message_for(&arg.name.to_ascii_lowercase()),
                    arg.pos,
                ));
            }
        }
    }

    if let Some(section) = block.section(&DocTag::Keywords) {
        if declared_keywords.is_empty() && !section.entries.is_empty() {
            problems.push(section_span(block, section, ProblemCode::NoKwsToDoc));
        }
        let documented: HashSet<String> = section.entries.iter().map(|e| e.key()).collect();
        for entry in &section.entries {
            if !declared_keywords.contains(&entry.key()) {
                problems.push(SyntaxProblem::at(
                    ProblemCode::DocumentedParamMissing,
                    ProblemCode::DocumentedParamMissing.message_for(&entry.key()),
                    entry.range,
                ));
            }
        }
        for keyword in signature.named_keywords() {
            if !documented.contains(&keyword.name.to_ascii_lowercase()) {
                problems.push(SyntaxProblem::at(
                    ProblemCode::KeywordMissingFromDocs,
                    ProblemCode::KeywordMissingFromDocs
                        .message_for(&keyword.name.to_ascii_lowercase()),
                    keyword.pos,
                ));
            }
        }
    }

    if !signature.kind.is_function() {
        if let Some(section) = block.section(&DocTag::Returns) {
            problems.push(section_span(block, section, ProblemCode::ReturnsOnProcedure));
        }
    }
}

fn check_call(call: &CallSite, signature: &RoutineSignature, problems: &mut Vec<SyntaxProblem>) {
    if !signature.accepts_extra {
        for keyword in &call.keywords {
            if is_extra_keyword(&keyword.name) {
                continue;
            }
            if signature.resolve_keyword(&keyword.name).is_none() {
                problems.push(SyntaxProblem::at(
                    ProblemCode::UnknownKeyword,
                    ProblemCode::UnknownKeyword.message_for(&keyword.name.to_ascii_lowercase()),
                    keyword.pos,
                ));
            }
        }
    }

    if call.positional > signature.args.len() {
        problems.push(SyntaxProblem::new(
            ProblemCode::TooManyArguments,
            ProblemCode::TooManyArguments.message_for(&signature.name.to_ascii_lowercase()),
            call.pos,
            call.end,
        ));
    }
}
