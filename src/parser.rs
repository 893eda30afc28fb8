//! Structural parser.
//!
//! Consumes the token stream and records only what the validators and the
//! query service need: routine signatures, one scope per routine (plus the
//! main level), the variables of every scope and the call sites. No
//! expression tree is built; statements the parser does not understand are
//! walked for identifiers and otherwise ignored.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::problems::{ProblemCode, SyntaxProblem};
use crate::tokenizer::{Token, TokenKind, TokenPos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoutineKind {
    Procedure,
    Function,
    ProcedureMethod,
    FunctionMethod,
}

impl RoutineKind {
    pub fn new(function: bool, method: bool) -> RoutineKind {
        match (function, method) {
            (false, false) => RoutineKind::Procedure,
            (true, false) => RoutineKind::Function,
            (false, true) => RoutineKind::ProcedureMethod,
            (true, true) => RoutineKind::FunctionMethod,
        }
    }

    pub fn is_function(self) -> bool {
        matches!(self, RoutineKind::Function | RoutineKind::FunctionMethod)
    }

    pub fn is_method(self) -> bool {
        matches!(
            self,
            RoutineKind::ProcedureMethod | RoutineKind::FunctionMethod
        )
    }

    /// Definition keyword, `pro` or `function`.
    pub fn keyword(self) -> &'static str {
        if self.is_function() {
            "function"
        } else {
            "pro"
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RoutineKind::Procedure => "procedure",
            RoutineKind::Function => "function",
            RoutineKind::ProcedureMethod => "procedure method",
            RoutineKind::FunctionMethod => "function method",
        }
    }
}

/// Identity of a routine in the global symbol table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoutineKey {
    /// Lowercase name, `class::method` for methods
    pub name: String,
    pub kind: RoutineKind,
}

impl RoutineKey {
    pub fn new(name: &str, kind: RoutineKind) -> RoutineKey {
        RoutineKey {
            name: name.to_ascii_lowercase(),
            kind,
        }
    }

    /// Method part of `class::method`, or the whole name.
    pub fn method_name(&self) -> &str {
        self.name
            .rsplit_once("::")
            .map(|(_, method)| method)
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub pos: TokenPos,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeywordParameter {
    /// Keyword as callers spell it, `KW1` in `KW1=kw1`
    pub name: String,
    /// Variable the keyword binds inside the routine
    pub variable: String,
    pub pos: TokenPos,
    pub variable_pos: TokenPos,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutineSignature {
    pub name: String,
    pub kind: RoutineKind,
    pub args: Vec<Parameter>,
    pub keywords: Vec<KeywordParameter>,
    /// Declares `_EXTRA` or `_REF_EXTRA`
    pub accepts_extra: bool,
    pub file: PathBuf,
    pub name_pos: TokenPos,
    /// `pro`/`function` token through the last header token
    pub start: TokenPos,
    pub end: TokenPos,
}

const EXTRA_KEYWORDS: &[&str] = &["_extra", "_ref_extra", "_strict_extra"];

pub fn is_extra_keyword(name: &str) -> bool {
    EXTRA_KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
}

impl RoutineSignature {
    pub fn key(&self) -> RoutineKey {
        RoutineKey::new(&self.name, self.kind)
    }

    /// Same callable interface, ignoring where the routine sits in its file.
    pub fn same_interface(&self, other: &RoutineSignature) -> bool {
        let args = |s: &RoutineSignature| -> Vec<String> {
            s.args.iter().map(|a| a.name.to_ascii_lowercase()).collect()
        };
        let keywords = |s: &RoutineSignature| -> Vec<String> {
            s.keywords.iter().map(|k| k.name.to_ascii_lowercase()).collect()
        };
        self.key() == other.key()
            && self.accepts_extra == other.accepts_extra
            && args(self) == args(other)
            && keywords(self) == keywords(other)
    }

    /// Declared keywords, without the pass-through `_EXTRA` family.
    pub fn named_keywords(&self) -> impl Iterator<Item = &KeywordParameter> {
        self.keywords.iter().filter(|k| !is_extra_keyword(&k.name))
    }

    /// Resolve a keyword as passed by a caller. Callers may abbreviate a
    /// keyword to any unambiguous prefix; an exact match wins over prefixes.
    pub fn resolve_keyword(&self, passed: &str) -> Option<&KeywordParameter> {
        let passed = passed.to_ascii_lowercase();
        if let Some(exact) = self
            .named_keywords()
            .find(|k| k.name.eq_ignore_ascii_case(&passed))
        {
            return Some(exact);
        }
        let mut prefixed = self
            .named_keywords()
            .filter(|k| k.name.to_ascii_lowercase().starts_with(&passed));
        match (prefixed.next(), prefixed.next()) {
            (Some(keyword), None) => Some(keyword),
            _ => None,
        }
    }

    /// Header as it would be written in source, e.g. `pro plot_it, x, COLOR=color`.
    pub fn header_text(&self) -> String {
        let mut header = format!("{} {}", self.kind.keyword(), self.name);
        for arg in &self.args {
            header.push_str(", ");
            header.push_str(&arg.name);
        }
        for keyword in &self.keywords {
            header.push_str(&format!(", {}={}", keyword.name, keyword.variable));
        }
        header
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub signature: RoutineSignature,
    pub scope: usize,
    /// False when the routine ran into the next definition or end of file
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Routine(usize),
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceRole {
    Definition,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub pos: TokenPos,
    pub role: OccurrenceRole,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingKind {
    Argument,
    /// Variable bound by the named keyword
    Keyword(String),
    Local,
    Common(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableBinding {
    /// Lowercase; variables are case-insensitive
    pub name: String,
    pub kind: BindingKind,
    pub occurrences: Vec<Occurrence>,
}

impl VariableBinding {
    pub fn first_occurrence(&self) -> TokenPos {
        self.occurrences
            .first()
            .map(|o| o.pos)
            .unwrap_or_default()
    }

    /// First definition, falling back to the first occurrence for variables
    /// that are only ever read.
    pub fn definition(&self) -> TokenPos {
        self.occurrences
            .iter()
            .find(|o| o.role == OccurrenceRole::Definition)
            .map(|o| o.pos)
            .unwrap_or_else(|| self.first_occurrence())
    }

    /// A variable is used when it occurs more than once, or when any
    /// occurrence reads it. Common block members are shared state and always
    /// count as used.
    pub fn is_used(&self) -> bool {
        matches!(self.kind, BindingKind::Common(_))
            || self.occurrences.len() > 1
            || self
                .occurrences
                .iter()
                .any(|o| o.role == OccurrenceRole::Reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    pub start: TokenPos,
    pub end: TokenPos,
    pub bindings: Vec<VariableBinding>,
}

impl Scope {
    pub fn contains(&self, line: u32, character: u32) -> bool {
        (line, character) >= (self.start.line, self.start.column)
            && (line, character) <= (self.end.line, self.end.end_column())
    }

    pub fn binding(&self, name: &str) -> Option<&VariableBinding> {
        self.bindings
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassedKeyword {
    pub name: String,
    pub pos: TokenPos,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Name as written; `class::method` when a method is qualified
    pub name: String,
    pub kind: RoutineKind,
    pub pos: TokenPos,
    pub keywords: Vec<PassedKeyword>,
    pub positional: usize,
    pub scope: usize,
    /// Last token of the argument list
    pub end: TokenPos,
}

impl CallSite {
    pub fn key(&self) -> RoutineKey {
        RoutineKey::new(&self.name, self.kind)
    }

    /// Method calls through `->` without a class only know the method name.
    pub fn is_unqualified_method(&self) -> bool {
        self.kind.is_method() && !self.name.contains("::")
    }

    pub fn spans(&self, line: u32, character: u32) -> bool {
        (line, character) >= (self.pos.line, self.pos.column)
            && (line, character) <= (self.end.line, self.end.end_column())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralRecord {
    pub routines: Vec<Routine>,
    pub scopes: Vec<Scope>,
    pub call_sites: Vec<CallSite>,
}

impl StructuralRecord {
    /// Innermost scope at a position: a routine if one encloses it, else the
    /// main level.
    pub fn scope_at(&self, line: u32, character: u32) -> Option<usize> {
        let routine_scope = self
            .scopes
            .iter()
            .position(|s| matches!(s.kind, ScopeKind::Routine(_)) && s.contains(line, character));
        routine_scope.or_else(|| self.scopes.iter().position(|s| s.kind == ScopeKind::Main))
    }

    pub fn routine_for_scope(&self, scope: usize) -> Option<&Routine> {
        match self.scopes.get(scope)?.kind {
            ScopeKind::Routine(idx) => self.routines.get(idx),
            ScopeKind::Main => None,
        }
    }

    pub fn routine_starting_at(&self, pos: TokenPos) -> Option<&Routine> {
        self.routines.iter().find(|r| r.signature.start == pos)
    }

    pub fn signatures(&self) -> impl Iterator<Item = &RoutineSignature> {
        self.routines.iter().map(|r| &r.signature)
    }
}

/// Split the token stream into statements, as lists of token indices.
/// Comments, continuations and `&` separators are dropped.
fn split_statements(tokens: &[Token]) -> Vec<Vec<usize>> {
    let mut statements = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut continued = false;
    let mut last_line: Option<u32> = None;

    for (idx, token) in tokens.iter().enumerate() {
        if token.kind.is_comment() {
            continue;
        }
        if token.kind == TokenKind::Continuation {
            continued = true;
            continue;
        }
        if last_line.is_some_and(|line| line != token.start.line) && !continued {
            if !current.is_empty() {
                statements.push(std::mem::take(&mut current));
            }
        }
        continued = false;
        last_line = Some(token.start.line);

        if token.kind == TokenKind::Ampersand {
            if !current.is_empty() {
                statements.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(idx);
    }
    if !current.is_empty() {
        statements.push(current);
    }
    statements
}

const BLOCK_OPENERS: &[&str] = &["begin", "case", "switch"];
const BLOCK_CLOSERS: &[&str] = &[
    "end",
    "endcase",
    "endelse",
    "endfor",
    "endforeach",
    "endif",
    "endrep",
    "endswitch",
    "endwhile",
];

/// Words that begin a nested statement on the same line.
const STATEMENT_LEADERS: &[&str] = &[
    "then", "else", "do", "begin", "of", "repeat", "for", "foreach",
];

/// Compound assignment operators that read their target.
const UPDATE_OPERATORS: &[&str] = &["+=", "-=", "*=", "/=", "^=", "#=", "<=", ">=", "++", "--"];

/// Statements whose content names no variables.
const SKIPPED_STATEMENTS: &[&str] = &["compile_opt", "forward_function", "goto", "on_ioerror"];

/// What an identifier occurrence means inside a statement.
#[derive(Debug, PartialEq, Eq)]
enum IdentRole {
    Definition,
    Reference,
    /// Call site starting at this token; the value is the call kind
    Call(RoutineKind),
    Skip,
}

struct Statement<'a> {
    tokens: Vec<&'a Token>,
}

impl<'a> Statement<'a> {
    fn get(&self, idx: usize) -> Option<&'a Token> {
        self.tokens.get(idx).copied()
    }

    fn prev(&self, idx: usize) -> Option<&'a Token> {
        idx.checked_sub(1).and_then(|i| self.get(i))
    }

    fn last_pos(&self) -> TokenPos {
        self.tokens.last().map(|t| t.end).unwrap_or_default()
    }

    fn is_single(&self, word: &str) -> bool {
        self.tokens.len() == 1 && self.tokens[0].is_reserved(word)
    }

    /// Token written as a keyword name in a call (`KW=`, `/KW`).
    fn is_keyword_name(&self, idx: usize) -> bool {
        let Some(prev) = self.prev(idx) else {
            return false;
        };
        let after_separator = |t: &Token| matches!(t.kind, TokenKind::Comma | TokenKind::LParen);
        let assigns = self.get(idx + 1).is_some_and(|n| n.is_operator("="));
        (assigns && after_separator(prev))
            || (prev.is_operator("/") && self.prev(idx - 1).is_some_and(after_separator))
    }

    fn block_delta(&self) -> i32 {
        self.tokens
            .iter()
            .enumerate()
            .filter(|(idx, token)| token.kind == TokenKind::Reserved && !self.is_keyword_name(*idx))
            .map(|(_, token)| {
                let word = token.key();
                if BLOCK_OPENERS.contains(&word.as_str()) {
                    1
                } else if BLOCK_CLOSERS.contains(&word.as_str()) {
                    -1
                } else {
                    0
                }
            })
            .sum()
    }

    /// Whether the identifier at `idx` starts a (possibly nested) statement.
    fn starts_statement(&self, idx: usize) -> bool {
        match self.prev(idx) {
            None => true,
            Some(prev) if prev.kind == TokenKind::Reserved => {
                STATEMENT_LEADERS.contains(&prev.key().as_str())
            }
            // case label `1: x = 2`
            Some(prev) => prev.kind == TokenKind::Colon && idx == 2,
        }
    }

    /// Classify the identifier at `idx`. `enclosing` is the innermost open
    /// delimiter at that point and `known` the variables of the scope.
    fn classify(
        &self,
        idx: usize,
        enclosing: Option<TokenKind>,
        known: &HashSet<String>,
    ) -> IdentRole {
        let token = self.tokens[idx];
        let prev = self.prev(idx);
        let next = self.get(idx + 1);
        let next_kind = next.map(|n| n.kind);

        if prev.is_some_and(|p| p.is_operator(".") || p.kind == TokenKind::DoubleColon) {
            return IdentRole::Skip;
        }
        if prev.is_some_and(|p| p.kind == TokenKind::Arrow) {
            let function = self.method_call_has_parens(idx);
            return IdentRole::Call(RoutineKind::new(function, true));
        }
        if next_kind == Some(TokenKind::DoubleColon)
            || prev.is_some_and(|p| p.is_reserved("inherits"))
        {
            return IdentRole::Skip;
        }
        if self.is_keyword_name(idx) && !self.starts_statement(idx) {
            return IdentRole::Skip;
        }
        if next_kind == Some(TokenKind::Colon) && enclosing == Some(TokenKind::LBrace) {
            return IdentRole::Skip;
        }
        if prev.is_some_and(|p| p.kind == TokenKind::LBrace)
            && matches!(next_kind, None | Some(TokenKind::Comma) | Some(TokenKind::RBrace))
        {
            return IdentRole::Skip;
        }

        let starts = self.starts_statement(idx);
        if starts && next.is_some_and(|n| n.is_operator("=")) {
            return IdentRole::Definition;
        }
        if prev.is_some_and(|p| p.is_reserved("foreach")) {
            return IdentRole::Definition;
        }
        if self.is_foreach_key(idx) {
            return IdentRole::Definition;
        }
        if starts && next.is_some_and(|n| UPDATE_OPERATORS.contains(&n.text.as_str())) {
            return IdentRole::Reference;
        }
        if starts && matches!(next_kind, None | Some(TokenKind::Comma)) {
            return IdentRole::Call(RoutineKind::Procedure);
        }
        if starts && next.is_some_and(|n| n.kind == TokenKind::Reserved && n.is_reserved("else")) {
            return IdentRole::Call(RoutineKind::Procedure);
        }
        if next_kind == Some(TokenKind::LParen) && !known.contains(&token.key()) {
            return IdentRole::Call(RoutineKind::Function);
        }
        IdentRole::Reference
    }

    /// `foreach value, list, key do`: the identifier after the second comma.
    fn is_foreach_key(&self, idx: usize) -> bool {
        let Some(first) = self.get(0) else {
            return false;
        };
        if !first.is_reserved("foreach") {
            return false;
        }
        let commas_before = self.tokens[..idx]
            .iter()
            .filter(|t| t.kind == TokenKind::Comma)
            .count();
        commas_before == 2
            && self.prev(idx).is_some_and(|p| p.kind == TokenKind::Comma)
            && self.get(idx + 1).is_some_and(|n| n.is_reserved("do"))
    }

    fn method_call_has_parens(&self, idx: usize) -> bool {
        let mut name_end = idx;
        while self.get(name_end + 1).is_some_and(|t| t.kind == TokenKind::DoubleColon)
            && self.get(name_end + 2).is_some_and(|t| t.is_word())
        {
            name_end += 2;
        }
        self.get(name_end + 1)
            .is_some_and(|t| t.kind == TokenKind::LParen)
    }

    /// Build a call site whose name starts at `idx`.
    fn call_site(&self, idx: usize, kind: RoutineKind, scope: usize) -> CallSite {
        let mut name = self.tokens[idx].text.clone();
        let mut name_end = idx;
        if kind.is_method() {
            while self.get(name_end + 1).is_some_and(|t| t.kind == TokenKind::DoubleColon)
                && self.get(name_end + 2).is_some_and(|t| t.is_word())
            {
                name.push_str("::");
                name.push_str(&self.tokens[name_end + 2].text);
                name_end += 2;
            }
        }

        let parens = kind.is_function();
        let args_start = name_end + 2;
        let opened = match self.get(name_end + 1) {
            Some(t) if parens => t.kind == TokenKind::LParen,
            Some(t) => t.kind == TokenKind::Comma,
            None => false,
        };

        let mut keywords = Vec::new();
        let mut positional = 0;
        let mut end = self.tokens[name_end].end;

        if opened {
            end = self.tokens[name_end + 1].end;
            let mut depth = 0i32;
            let mut item_start = args_start;
            let mut cursor = args_start;
            loop {
                let token = self.get(cursor);
                let closes_item = match token {
                    None => true,
                    Some(t) if depth == 0 && t.kind == TokenKind::Comma => true,
                    Some(t) if depth == 0 && parens && t.kind == TokenKind::RParen => true,
                    Some(t) if depth == 0 && !parens && t.is_reserved("else") => true,
                    _ => false,
                };
                if closes_item {
                    match self.call_item(item_start, cursor) {
                        Some(CallItem::Keyword(keyword)) => keywords.push(keyword),
                        Some(CallItem::Positional) => positional += 1,
                        None => {}
                    }
                    match token {
                        Some(t) if t.kind == TokenKind::Comma => {
                            end = t.end;
                            cursor += 1;
                            item_start = cursor;
                            continue;
                        }
                        Some(t) if parens => {
                            end = t.end;
                            break;
                        }
                        _ => break,
                    }
                }
                if let Some(t) = token {
                    match t.kind {
                        TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                        TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => depth -= 1,
                        _ => {}
                    }
                    end = t.end;
                }
                cursor += 1;
            }
        }

        CallSite {
            name,
            kind,
            pos: self.tokens[idx].start,
            keywords,
            positional,
            scope,
            end,
        }
    }

    fn call_item(&self, from: usize, to: usize) -> Option<CallItem> {
        let first = self.get(from).filter(|_| from < to)?;
        if first.is_word() && self.get(from + 1).is_some_and(|t| t.is_operator("=")) {
            return Some(CallItem::Keyword(PassedKeyword {
                name: first.text.clone(),
                pos: first.start,
            }));
        }
        if first.is_operator("/") {
            if let Some(word) = self.get(from + 1).filter(|t| t.is_word()) {
                return Some(CallItem::Keyword(PassedKeyword {
                    name: word.text.clone(),
                    pos: word.start,
                }));
            }
        }
        Some(CallItem::Positional)
    }
}

enum CallItem {
    Keyword(PassedKeyword),
    Positional,
}

struct OpenRoutine {
    scope: usize,
    depth: i32,
    start: TokenPos,
}

struct Builder<'a> {
    file: &'a Path,
    record: StructuralRecord,
    problems: Vec<SyntaxProblem>,
    statements: Vec<Vec<Statement<'a>>>,
    lookups: Vec<HashMap<String, usize>>,
    routine_keys: HashSet<RoutineKey>,
    open: Option<OpenRoutine>,
    main_scope: Option<usize>,
    main_depth: i32,
}

/// Parse a token stream into its structural record.
pub fn parse(file: &Path, tokens: &[Token]) -> (StructuralRecord, Vec<SyntaxProblem>) {
    let mut builder = Builder {
        file,
        record: StructuralRecord::default(),
        problems: Vec::new(),
        statements: Vec::new(),
        lookups: Vec::new(),
        routine_keys: HashSet::new(),
        open: None,
        main_scope: None,
        main_depth: 0,
    };

    for indices in split_statements(tokens) {
        let statement = Statement {
            tokens: indices.iter().map(|&i| &tokens[i]).collect(),
        };
        builder.statement(statement);
    }
    if let Some(open) = builder.open.take() {
        builder.missing_end(open);
    }
    builder.analyze_scopes();

    (builder.record, builder.problems)
}

impl<'a> Builder<'a> {
    fn new_scope(&mut self, kind: ScopeKind, start: TokenPos) -> usize {
        self.record.scopes.push(Scope {
            kind,
            start,
            end: start,
            bindings: Vec::new(),
        });
        self.statements.push(Vec::new());
        self.lookups.push(HashMap::new());
        self.record.scopes.len() - 1
    }

    fn missing_end(&mut self, open: OpenRoutine) {
        self.problems.push(SyntaxProblem::at(
            ProblemCode::MissingEnd,
            ProblemCode::MissingEnd.message(),
            open.start,
        ));
    }

    fn statement(&mut self, statement: Statement<'a>) {
        let Some(first) = statement.get(0) else {
            return;
        };

        if first.is_reserved("pro") || first.is_reserved("function") {
            if let Some(open) = self.open.take() {
                self.missing_end(open);
            }
            self.routine_header(statement);
            return;
        }

        let last = statement.last_pos();
        match self.open.as_mut() {
            Some(open) => {
                let scope = open.scope;
                if statement.is_single("end") && open.depth == 0 {
                    if let ScopeKind::Routine(routine) = self.record.scopes[scope].kind {
                        self.record.routines[routine].closed = true;
                    }
                    self.record.scopes[scope].end = last;
                    self.open = None;
                    return;
                }
                open.depth = (open.depth + statement.block_delta()).max(0);
                self.record.scopes[scope].end = last;
                self.statements[scope].push(statement);
            }
            None => {
                if statement.is_single("end") && self.main_depth == 0 {
                    return;
                }
                let scope = match self.main_scope {
                    Some(scope) => scope,
                    None => {
                        let scope = self.new_scope(ScopeKind::Main, first.start);
                        self.main_scope = Some(scope);
                        scope
                    }
                };
                self.main_depth = (self.main_depth + statement.block_delta()).max(0);
                self.record.scopes[scope].end = last;
                self.statements[scope].push(statement);
            }
        }
    }

    fn invalid_header(&mut self, detail: &str, pos: TokenPos) {
        self.problems.push(SyntaxProblem::at(
            ProblemCode::InvalidRoutineHeader,
            format!("{}: {}", ProblemCode::InvalidRoutineHeader.message(), detail),
            pos,
        ));
    }

    fn routine_header(&mut self, statement: Statement<'a>) {
        let keyword = statement.tokens[0];
        let function = keyword.is_reserved("function");

        let Some(name_token) = statement.get(1).filter(|t| t.is_word()) else {
            // body falls through to the main level
            self.invalid_header("missing routine name", keyword.start);
            return;
        };

        let mut name = name_token.text.clone();
        let mut name_pos = name_token.start;
        let mut idx = 2;
        let mut method = false;
        if statement.get(2).is_some_and(|t| t.kind == TokenKind::DoubleColon) {
            match statement.get(3).filter(|t| t.is_word()) {
                Some(method_token) => {
                    name = format!("{}::{}", name, method_token.text);
                    name_pos = TokenPos::new(
                        name_pos.line,
                        name_pos.column,
                        method_token.end.end_column().saturating_sub(name_pos.column),
                    );
                    method = true;
                    idx = 4;
                }
                None => {
                    self.invalid_header(
                        "missing method name after \"::\"",
                        statement.tokens[2].start,
                    );
                    idx = statement.tokens.len();
                }
            }
        }

        let mut args: Vec<Parameter> = Vec::new();
        let mut keywords: Vec<KeywordParameter> = Vec::new();
        let mut seen_params: HashSet<String> = HashSet::new();
        let mut seen_variables: HashSet<String> = HashSet::new();

        while idx < statement.tokens.len() {
            let separator = statement.tokens[idx];
            if separator.kind != TokenKind::Comma {
                self.invalid_header(&format!("unexpected \"{}\"", separator.text), separator.start);
                break;
            }
            let Some(param) = statement.get(idx + 1).filter(|t| t.is_word()) else {
                let pos = statement.get(idx + 1).map(|t| t.start).unwrap_or(separator.start);
                self.invalid_header("expected an argument or keyword", pos);
                break;
            };

            let assigns = statement.get(idx + 2).is_some_and(|t| t.is_operator("="));
            let (variable_token, step) = if assigns {
                match statement
                    .get(idx + 3)
                    .filter(|t| t.kind == TokenKind::Identifier)
                {
                    Some(variable) => (variable, 4),
                    None => {
                        let pos = statement.get(idx + 3).map(|t| t.start).unwrap_or(param.end);
                        self.invalid_header("keyword is missing its variable", pos);
                        break;
                    }
                }
            } else {
                (param, 2)
            };

            let param_key = if assigns {
                format!("/{}", param.key())
            } else {
                param.key()
            };
            let duplicate =
                !seen_params.insert(param_key) || !seen_variables.insert(variable_token.key());
            if duplicate {
                self.problems.push(SyntaxProblem::at(
                    ProblemCode::DuplicateParameter,
                    ProblemCode::DuplicateParameter.message_for(&variable_token.key()),
                    variable_token.start,
                ));
            }

            if assigns {
                keywords.push(KeywordParameter {
                    name: param.text.clone(),
                    variable: variable_token.text.clone(),
                    pos: param.start,
                    variable_pos: variable_token.start,
                });
            } else {
                args.push(Parameter {
                    name: param.text.clone(),
                    pos: param.start,
                });
            }
            idx += step;
        }

        let signature = RoutineSignature {
            kind: RoutineKind::new(function, method),
            accepts_extra: keywords.iter().any(|k| is_extra_keyword(&k.name)),
            name,
            args,
            keywords,
            file: self.file.to_path_buf(),
            name_pos,
            start: keyword.start,
            end: statement.last_pos(),
        };

        if !self.routine_keys.insert(signature.key()) {
            self.problems.push(SyntaxProblem::at(
                ProblemCode::DuplicateRoutine,
                ProblemCode::DuplicateRoutine.message_for(&signature.name),
                name_pos,
            ));
        }

        let routine_idx = self.record.routines.len();
        let scope = self.new_scope(ScopeKind::Routine(routine_idx), keyword.start);
        self.record.scopes[scope].end = statement.last_pos();

        for arg in &signature.args {
            self.occur(
                scope,
                &arg.name,
                arg.pos,
                OccurrenceRole::Definition,
                BindingKind::Argument,
            );
        }
        for keyword in &signature.keywords {
            self.occur(
                scope,
                &keyword.variable,
                keyword.variable_pos,
                OccurrenceRole::Definition,
                BindingKind::Keyword(keyword.name.clone()),
            );
        }

        self.record.routines.push(Routine {
            signature,
            scope,
            closed: false,
        });
        self.open = Some(OpenRoutine {
            scope,
            depth: 0,
            start: keyword.start,
        });
    }

    fn occur(
        &mut self,
        scope: usize,
        name: &str,
        pos: TokenPos,
        role: OccurrenceRole,
        kind: BindingKind,
    ) {
        let key = name.to_ascii_lowercase();
        let occurrence = Occurrence { pos, role };
        match self.lookups[scope].get(&key) {
            Some(&idx) => self.record.scopes[scope].bindings[idx].occurrences.push(occurrence),
            None => {
                let bindings = &mut self.record.scopes[scope].bindings;
                bindings.push(VariableBinding {
                    name: key.clone(),
                    kind,
                    occurrences: vec![occurrence],
                });
                self.lookups[scope].insert(key, bindings.len() - 1);
            }
        }
    }

    fn analyze_scopes(&mut self) {
        let statements = std::mem::take(&mut self.statements);
        for (scope, scope_statements) in statements.iter().enumerate() {
            let mut known: HashSet<String> = self.lookups[scope].keys().cloned().collect();
            let empty = HashSet::new();
            for statement in scope_statements {
                walk_identifiers(statement, &empty, |idx, role| {
                    if role == IdentRole::Definition {
                        known.insert(statement.tokens[idx].key());
                    }
                });
                if statement.get(0).is_some_and(|t| t.is_reserved("common")) {
                    known.extend(
                        statement
                            .tokens
                            .iter()
                            .skip(2)
                            .filter(|t| t.kind == TokenKind::Identifier)
                            .map(|t| t.key()),
                    );
                }
            }

            for statement in scope_statements {
                self.analyze_statement(scope, statement, &known);
            }
        }
    }

    fn analyze_statement(
        &mut self,
        scope: usize,
        statement: &Statement<'a>,
        known: &HashSet<String>,
    ) {
        let Some(first) = statement.get(0) else {
            return;
        };
        if first.kind == TokenKind::Reserved && SKIPPED_STATEMENTS.contains(&first.key().as_str()) {
            return;
        }
        if first.is_reserved("common") {
            let block = statement.get(1).map(|t| t.text.clone()).unwrap_or_default();
            for token in statement.tokens.iter().skip(2) {
                if token.kind == TokenKind::Identifier {
                    self.occur(
                        scope,
                        &token.text,
                        token.start,
                        OccurrenceRole::Definition,
                        BindingKind::Common(block.clone()),
                    );
                }
            }
            return;
        }
        // label
        if statement.tokens.len() == 2
            && first.kind == TokenKind::Identifier
            && statement.tokens[1].kind == TokenKind::Colon
        {
            return;
        }

        let mut found: Vec<(usize, IdentRole)> = Vec::new();
        walk_identifiers(statement, known, |idx, role| found.push((idx, role)));

        for (idx, role) in found {
            let token = statement.tokens[idx];
            match role {
                IdentRole::Definition => self.occur(
                    scope,
                    &token.text,
                    token.start,
                    OccurrenceRole::Definition,
                    BindingKind::Local,
                ),
                IdentRole::Reference => self.occur(
                    scope,
                    &token.text,
                    token.start,
                    OccurrenceRole::Reference,
                    BindingKind::Local,
                ),
                IdentRole::Call(kind) => {
                    let call = statement.call_site(idx, kind, scope);
                    self.record.call_sites.push(call);
                }
                IdentRole::Skip => {}
            }
        }
    }
}

/// Visit every identifier of a statement with its role.
fn walk_identifiers(
    statement: &Statement<'_>,
    known: &HashSet<String>,
    mut visit: impl FnMut(usize, IdentRole),
) {
    let mut open: Vec<TokenKind> = Vec::new();
    for (idx, token) in statement.tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => open.push(token.kind),
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                open.pop();
            }
            TokenKind::Identifier => {
                visit(idx, statement.classify(idx, open.last().copied(), known))
            }
            // reserved words double as method names after `->`
            TokenKind::Reserved
                if statement.prev(idx).is_some_and(|p| p.kind == TokenKind::Arrow) =>
            {
                visit(idx, statement.classify(idx, open.last().copied(), known))
            }
            _ => {}
        }
    }
}
