//! Line-oriented tokenizer for IDL source.
//!
//! Produces a flat, position-tagged token stream. Every line is scanned
//! independently; statement continuation (`$`) is kept in the stream as a
//! [`TokenKind::Continuation`] token so the structural parser can join lines.
//!
//! Tokenization never fails: characters that do not start any known token
//! become [`TokenKind::Unknown`] tokens and are reported as problems.

use std::fmt;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::{Position, Range};

use crate::problems::{ProblemCode, SyntaxProblem};

/// Zero-based `(line, column, length)` triple, columns counted in characters.
///
/// Serializes as a three element array, which is the shape diagnostic
/// consumers assert against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct TokenPos {
    pub line: u32,
    pub column: u32,
    pub length: u32,
}

impl TokenPos {
    pub fn new(line: u32, column: u32, length: u32) -> TokenPos {
        TokenPos {
            line,
            column,
            length,
        }
    }

    /// Column one past the last character.
    pub fn end_column(&self) -> u32 {
        self.column + self.length
    }

    /// True if `(line, character)` touches this span, including the position
    /// just after the last character (where an editor cursor sits after typing).
    pub fn touches(&self, line: u32, character: u32) -> bool {
        self.line == line && self.column <= character && character <= self.end_column()
    }

    /// Ordering key used to sort problems and tokens by source position.
    pub fn sort_key(&self) -> (u32, u32) {
        (self.line, self.column)
    }
}

impl From<TokenPos> for Range {
    fn from(pos: TokenPos) -> Self {
        span_range(pos, pos)
    }
}

/// LSP range from the start of `start` through the end of `end`.
pub fn span_range(start: TokenPos, end: TokenPos) -> Range {
    Range {
        start: Position {
            line: start.line,
            character: start.column,
        },
        end: Position {
            line: end.line,
            character: end.end_column(),
        },
    }
}

impl From<[u32; 3]> for TokenPos {
    fn from([line, column, length]: [u32; 3]) -> Self {
        TokenPos::new(line, column, length)
    }
}

impl From<TokenPos> for [u32; 3] {
    fn from(pos: TokenPos) -> Self {
        [pos.line, pos.column, pos.length]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Identifier,
    /// Reserved word of the language (`pro`, `if`, `endfor`, `eq`, ...)
    Reserved,
    /// `!pi`, `!null`, ...
    SystemVariable,
    Number,
    String,
    Operator,
    Comma,
    Colon,
    /// `::` in `class::method`
    DoubleColon,
    /// `->` method invocation
    Arrow,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    /// `&` statement separator
    Ampersand,
    /// `$` line continuation
    Continuation,
    Comment,
    /// `;+` opening a documentation block
    DocOpen,
    /// `;-` closing a documentation block
    DocClose,
    Unknown,
}

impl TokenKind {
    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            TokenKind::Comment | TokenKind::DocOpen | TokenKind::DocClose
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub start: TokenPos,
    pub end: TokenPos,
}

impl Token {
    fn single(kind: TokenKind, text: String, pos: TokenPos) -> Token {
        Token {
            kind,
            text,
            start: pos,
            end: pos,
        }
    }

    /// Lowercase form of the token text. Identifiers are case-insensitive.
    pub fn key(&self) -> String {
        self.text.to_ascii_lowercase()
    }

    pub fn is_reserved(&self, word: &str) -> bool {
        self.kind == TokenKind::Reserved && self.text.eq_ignore_ascii_case(word)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }

    /// Identifier or reserved word; reserved words may appear as keyword
    /// names (`/END`), struct tags and method names.
    pub fn is_word(&self) -> bool {
        matches!(self.kind, TokenKind::Identifier | TokenKind::Reserved)
    }

    pub fn contains(&self, line: u32, character: u32) -> bool {
        if self.start.line == self.end.line {
            return self.start.touches(line, character);
        }
        (line == self.start.line && character >= self.start.column)
            || (line > self.start.line && line < self.end.line)
            || (line == self.end.line && character <= self.end.end_column())
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

pub const RESERVED_WORDS: &[&str] = &[
    "and",
    "begin",
    "break",
    "case",
    "common",
    "compile_opt",
    "continue",
    "do",
    "else",
    "end",
    "endcase",
    "endelse",
    "endfor",
    "endforeach",
    "endif",
    "endrep",
    "endswitch",
    "endwhile",
    "eq",
    "for",
    "foreach",
    "forward_function",
    "function",
    "ge",
    "goto",
    "gt",
    "if",
    "inherits",
    "le",
    "lt",
    "mod",
    "ne",
    "not",
    "of",
    "on_ioerror",
    "or",
    "pro",
    "repeat",
    "return",
    "switch",
    "then",
    "until",
    "while",
    "xor",
];

pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS
        .binary_search(&word.to_ascii_lowercase().as_str())
        .is_ok()
}

/// Operators made of two characters, checked before single-character ones.
const TWO_CHAR_OPERATORS: &[&str] = &[
    "++", "--", "+=", "-=", "*=", "/=", "^=", "#=", "##", "<=", ">=", "&&", "||",
];

const ONE_CHAR_OPERATORS: &[char] = &[
    '=', '+', '-', '*', '/', '^', '<', '>', '#', '?', '~', '.', '@',
];

#[derive(Debug, Default)]
pub struct Tokenized {
    pub tokens: Vec<Token>,
    pub problems: Vec<SyntaxProblem>,
}

/// Split source text into lines, accepting `\n` and `\r\n` endings.
pub fn split_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Tokenize the given source lines.
pub fn tokenize<S: AsRef<str>>(lines: &[S]) -> Tokenized {
    let mut out = Tokenized::default();

    for (line_idx, line) in lines.iter().enumerate() {
        let mut scanner = LineScanner {
            chars: line.as_ref().chars().collect(),
            idx: 0,
            line: line_idx as u32,
            out: &mut out,
        };
        scanner.scan();
    }

    // nothing left to continue onto
    let dangling = out
        .tokens
        .iter()
        .rev()
        .find(|t| !t.kind.is_comment())
        .filter(|t| t.kind == TokenKind::Continuation)
        .map(|t| t.start);
    if let Some(pos) = dangling {
        out.problems.push(SyntaxProblem::new(
            ProblemCode::DanglingContinuation,
            ProblemCode::DanglingContinuation.message(),
            pos,
            pos,
        ));
    }

    out
}

struct LineScanner<'a> {
    chars: Vec<char>,
    idx: usize,
    line: u32,
    out: &'a mut Tokenized,
}

impl LineScanner<'_> {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.idx + offset).copied()
    }

    fn text(&self, from: usize, to: usize) -> String {
        self.chars[from..to].iter().collect()
    }

    fn pos(&self, from: usize, to: usize) -> TokenPos {
        TokenPos::new(self.line, from as u32, (to - from) as u32)
    }

    fn push(&mut self, kind: TokenKind, from: usize, to: usize) {
        let token = Token::single(kind, self.text(from, to), self.pos(from, to));
        self.out.tokens.push(token);
    }

    fn problem(&mut self, code: ProblemCode, info: impl Into<String>, from: usize, to: usize) {
        let pos = self.pos(from, to.max(from + 1));
        self.out.problems.push(SyntaxProblem::new(code, info, pos, pos));
    }

    fn only_blank_before(&self, idx: usize) -> bool {
        self.chars[..idx].iter().all(|c| c.is_whitespace())
    }

    fn scan(&mut self) {
        let len = self.chars.len();
        while self.idx < len {
            let c = self.chars[self.idx];
            let start = self.idx;

            if c.is_whitespace() {
                self.idx += 1;
                continue;
            }

            match c {
                ';' => {
                    let kind = match self.peek(1) {
                        Some('+') if self.only_blank_before(start) => TokenKind::DocOpen,
                        Some('-') if self.only_blank_before(start) => TokenKind::DocClose,
                        _ => TokenKind::Comment,
                    };
                    self.push(kind, start, len);
                    self.idx = len;
                }
                '$' => {
                    self.push(TokenKind::Continuation, start, start + 1);
                    self.idx += 1;
                    let rest_is_code = self.chars[self.idx..]
                        .iter()
                        .find(|c| !c.is_whitespace())
                        .is_some_and(|c| *c != ';');
                    if rest_is_code {
                        self.problem(
                            ProblemCode::InvalidContinuation,
                            ProblemCode::InvalidContinuation.message(),
                            start,
                            start + 1,
                        );
                    }
                }
                '"' if self.peek(1).is_some_and(|d| d.is_digit(8)) => self.scan_octal(),
                '\'' | '"' => self.scan_string(c),
                '!' if self.peek(1).is_some_and(is_ident_start) => {
                    self.idx += 1;
                    self.consume_ident_tail();
                    self.push(TokenKind::SystemVariable, start, self.idx);
                }
                c if c.is_ascii_digit()
                    || (c == '.' && self.peek(1).is_some_and(|d| d.is_ascii_digit())) =>
                {
                    self.scan_number()
                }
                c if is_ident_start(c) => {
                    self.idx += 1;
                    self.consume_ident_tail();
                    let word = self.text(start, self.idx);
                    let kind = if is_reserved_word(&word) {
                        TokenKind::Reserved
                    } else {
                        TokenKind::Identifier
                    };
                    self.push(kind, start, self.idx);
                }
                _ => self.scan_punctuation(c),
            }
        }
    }

    fn consume_ident_tail(&mut self) {
        while let Some(c) = self.peek(0) {
            let dollar_inside = c == '$' && self.peek(1).is_some_and(is_ident_continue);
            if is_ident_continue(c) || dollar_inside {
                self.idx += 1;
            } else {
                break;
            }
        }
    }

    fn scan_punctuation(&mut self, c: char) {
        let start = self.idx;
        let pair: String = self.chars[start..(start + 2).min(self.chars.len())]
            .iter()
            .collect();

        let two_char_kind = match pair.as_str() {
            "->" => Some(TokenKind::Arrow),
            "::" => Some(TokenKind::DoubleColon),
            p if TWO_CHAR_OPERATORS.contains(&p) => Some(TokenKind::Operator),
            _ => None,
        };
        if let Some(kind) = two_char_kind {
            self.idx += 2;
            self.push(kind, start, self.idx);
            return;
        }

        let kind = match c {
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '&' => TokenKind::Ampersand,
            c if ONE_CHAR_OPERATORS.contains(&c) => TokenKind::Operator,
            _ => TokenKind::Unknown,
        };
        self.idx += 1;
        self.push(kind, start, self.idx);
        if kind == TokenKind::Unknown {
            self.problem(
                ProblemCode::UnknownToken,
                format!("{}: \"{}\"", ProblemCode::UnknownToken.message(), c),
                start,
                self.idx,
            );
        }
    }

    fn scan_string(&mut self, quote: char) {
        let start = self.idx;
        self.idx += 1;
        loop {
            match self.peek(0) {
                None => {
                    let end = self.chars.len();
                    self.push(TokenKind::String, start, end);
                    self.problem(
                        ProblemCode::UnterminatedString,
                        ProblemCode::UnterminatedString.message(),
                        start,
                        end,
                    );
                    return;
                }
                Some(c) if c == quote && self.peek(1) == Some(quote) => self.idx += 2,
                Some(c) if c == quote => {
                    self.idx += 1;
                    break;
                }
                Some(_) => self.idx += 1,
            }
        }

        // 'FF'x, '17'o and '101'b are numeric literals written as strings
        let radix = self.peek(0).map(|c| c.to_ascii_lowercase());
        if matches!(radix, Some('x' | 'o' | 'b'))
            && !self.peek(1).is_some_and(is_ident_continue_strict)
        {
            self.idx += 1;
            self.consume_type_suffix();
            self.push(TokenKind::Number, start, self.idx);
        } else {
            self.push(TokenKind::String, start, self.idx);
        }
    }

    /// `"17` is an octal integer, not the start of a string
    fn scan_octal(&mut self) {
        let start = self.idx;
        self.idx += 1;
        while self.peek(0).is_some_and(|c| c.is_digit(8)) {
            self.idx += 1;
        }
        self.consume_type_suffix();
        self.push(TokenKind::Number, start, self.idx);
    }

    fn scan_number(&mut self) {
        let start = self.idx;
        let prefixed = self.peek(0) == Some('0')
            && matches!(self.peek(1).map(|c| c.to_ascii_lowercase()), Some('x' | 'b' | 'o'))
            && self.peek(2).is_some_and(|c| c.is_ascii_hexdigit());

        if prefixed {
            self.idx += 2;
            while self.peek(0).is_some_and(|c| c.is_ascii_hexdigit()) {
                self.idx += 1;
            }
        } else {
            self.consume_digits();
            if self.peek(0) == Some('.') && !self.peek(1).is_some_and(is_operator_word_start) {
                self.idx += 1;
                self.consume_digits();
            }
            let exponent = self.peek(0).map(|c| c.to_ascii_lowercase());
            if matches!(exponent, Some('e' | 'd')) {
                let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
                if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                    self.idx += 1 + sign;
                    self.consume_digits();
                } else if !self.peek(1).is_some_and(is_ident_continue_strict) {
                    // `1d`, `2e`: bare type marker
                    self.idx += 1;
                }
            }
        }
        self.consume_type_suffix();
        self.push(TokenKind::Number, start, self.idx);
    }

    fn consume_digits(&mut self) {
        while self.peek(0).is_some_and(|c| c.is_ascii_digit()) {
            self.idx += 1;
        }
    }

    fn consume_type_suffix(&mut self) {
        const SUFFIXES: &[&str] = &["ull", "ul", "ll", "us", "u", "l", "s", "b", "d", "i", "j"];
        let rest: String = self.chars[self.idx..(self.idx + 3).min(self.chars.len())]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();
        for suffix in SUFFIXES {
            let after = self.peek(suffix.len());
            if rest.starts_with(suffix) && !after.is_some_and(is_ident_continue_strict) {
                self.idx += suffix.len();
                return;
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_ident_continue_strict(c: char) -> bool {
    is_ident_continue(c) || c == '$'
}

/// `1.eq.2` style: a dot followed by a letter ends the number.
fn is_operator_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() && !matches!(c.to_ascii_lowercase(), 'e' | 'd')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &[&str]) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .tokens
            .into_iter()
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_reserved_words_sorted() {
        let mut sorted = RESERVED_WORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, RESERVED_WORDS);
    }

    #[test]
    fn test_routine_header_tokens() {
        let tokens = kinds(&["pro myclass::mymethod, KW1=kw1"]);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Reserved, "pro".to_string()),
                (TokenKind::Identifier, "myclass".to_string()),
                (TokenKind::DoubleColon, "::".to_string()),
                (TokenKind::Identifier, "mymethod".to_string()),
                (TokenKind::Comma, ",".to_string()),
                (TokenKind::Identifier, "KW1".to_string()),
                (TokenKind::Operator, "=".to_string()),
                (TokenKind::Identifier, "kw1".to_string()),
            ]
        );
    }

    #[test]
    fn test_token_positions() {
        let tokenized = tokenize(&["pro myclass::mymethod, KW1=kw1"]);
        let kw1 = tokenized.tokens.last().unwrap();
        assert_eq!(kw1.start, TokenPos::new(0, 27, 3));
        assert_eq!(kw1.start, kw1.end);
    }

    #[test]
    fn test_doc_delimiters_only_at_line_start() {
        let tokens = kinds(&[";+", "  ;-", "x = 1 ;+ not a doc block"]);
        assert_eq!(tokens[0].0, TokenKind::DocOpen);
        assert_eq!(tokens[1].0, TokenKind::DocClose);
        assert_eq!(tokens.last().unwrap().0, TokenKind::Comment);
    }

    #[test]
    fn test_strings_both_quotes_and_escapes() {
        let tokens = kinds(&["a = 'it''s' + \"say \"\"hi\"\"\""]);
        let strings: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::String)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(strings, vec!["'it''s'", "\"say \"\"hi\"\"\""]);
    }

    #[test]
    fn test_unterminated_string_reports_problem() {
        let tokenized = tokenize(&["print, 'oops"]);
        assert_eq!(tokenized.problems.len(), 1);
        assert_eq!(
            tokenized.problems[0].code,
            ProblemCode::UnterminatedString.code()
        );
        assert_eq!(tokenized.tokens.last().unwrap().text, "'oops");
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds(&["x = [1, 2.5e3, 3d, 12L, 'FF'x, \"17, 0x1F, .5]"]);
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Number)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(
            numbers,
            vec!["1", "2.5e3", "3d", "12L", "'FF'x", "\"17", "0x1F", ".5"]
        );
    }

    #[test]
    fn test_system_variables_and_arrows() {
        let tokens = kinds(&["obj->draw, !pi"]);
        assert_eq!(tokens[1].0, TokenKind::Arrow);
        assert_eq!(tokens[4], (TokenKind::SystemVariable, "!pi".to_string()));
    }

    #[test]
    fn test_continuation_with_comment_is_valid() {
        let tokenized = tokenize(&["plot, x, $ ; more", "  y"]);
        assert!(tokenized.problems.is_empty());
        assert!(tokenized
            .tokens
            .iter()
            .any(|t| t.kind == TokenKind::Continuation));
    }

    #[test]
    fn test_invalid_continuation() {
        let tokenized = tokenize(&["plot, x, $ y"]);
        assert_eq!(tokenized.problems.len(), 1);
        assert_eq!(
            tokenized.problems[0].code,
            ProblemCode::InvalidContinuation.code()
        );
    }

    #[test]
    fn test_dangling_continuation() {
        let tokenized = tokenize(&["plot, x, $", ""]);
        assert_eq!(tokenized.problems.len(), 1);
        assert_eq!(
            tokenized.problems[0].code,
            ProblemCode::DanglingContinuation.code()
        );
    }

    #[test]
    fn test_unknown_character_does_not_stop_tokenizing() {
        let tokenized = tokenize(&["a = 1 ` b = 2"]);
        assert_eq!(tokenized.problems.len(), 1);
        assert_eq!(tokenized.problems[0].code, ProblemCode::UnknownToken.code());
        assert_eq!(tokenized.problems[0].start, TokenPos::new(0, 6, 1));
        assert_eq!(tokenized.tokens.last().unwrap().text, "2");
    }

    #[test]
    fn test_identifiers_with_dollar() {
        let tokens = kinds(&["a$b = 1"]);
        assert_eq!(tokens[0], (TokenKind::Identifier, "a$b".to_string()));
    }

    #[test]
    fn test_split_lines_crlf() {
        assert_eq!(split_lines("a\r\nb\nc"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_token_pos_serializes_as_triple() {
        let json = serde_json::to_string(&TokenPos::new(7, 27, 3)).unwrap();
        assert_eq!(json, "[7,27,3]");
    }
}
