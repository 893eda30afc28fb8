//! Semantic token classification.
//!
//! Lexical classes come straight from the token kind. Identifiers are
//! refined through the structural record: routine names at their definition
//! and call sites, keyword names, and variables by binding kind.

use std::collections::HashMap;

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens, SemanticTokensLegend,
    SemanticTokensResult, Url,
};

use crate::config::Settings;
use crate::index::{FileIndexEntry, WorkspaceIndex};
use crate::parser::{BindingKind, RoutineKind};
use crate::tokenizer::{Token, TokenKind, TokenPos};

/// Token types in legend order; a class's index in this list is its wire id.
pub const TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::KEYWORD,
    SemanticTokenType::FUNCTION,
    SemanticTokenType::METHOD,
    SemanticTokenType::VARIABLE,
    SemanticTokenType::PARAMETER,
    SemanticTokenType::PROPERTY,
    SemanticTokenType::STRING,
    SemanticTokenType::NUMBER,
    SemanticTokenType::COMMENT,
    SemanticTokenType::OPERATOR,
];

pub const TOKEN_MODIFIERS: &[SemanticTokenModifier] = &[
    SemanticTokenModifier::DECLARATION,
    SemanticTokenModifier::DEFAULT_LIBRARY,
    SemanticTokenModifier::DOCUMENTATION,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticClass {
    Keyword,
    Function,
    Method,
    Variable,
    Parameter,
    Property,
    String,
    Number,
    Comment,
    Operator,
}

impl SemanticClass {
    fn type_index(self) -> u32 {
        self as u32
    }

    fn for_routine(kind: RoutineKind) -> SemanticClass {
        if kind.is_method() {
            SemanticClass::Method
        } else {
            SemanticClass::Function
        }
    }
}

pub const DECLARATION: u32 = 1;
pub const DEFAULT_LIBRARY: u32 = 1 << 1;
pub const DOCUMENTATION: u32 = 1 << 2;

/// One classified token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifiedToken {
    pub pos: TokenPos,
    pub class: SemanticClass,
    pub modifiers: u32,
}

const WORD_OPERATORS: &[&str] = &[
    "and", "eq", "ge", "gt", "le", "lt", "mod", "ne", "not", "or", "xor",
];

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: TOKEN_MODIFIERS.to_vec(),
    }
}

/// Whether semantic tokens are served for this document at all. Only files
/// on disk with a `.pro` extension are classified; notebook cells arrive
/// under their own URI scheme.
pub fn is_classified_document(uri: &Url) -> bool {
    uri.scheme() == "file"
        && uri.to_file_path().is_ok_and(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pro"))
        })
}

/// Classified tokens of an indexed file, ordered by position.
pub fn semantic_tokens(
    index: &WorkspaceIndex,
    uri: &Url,
    settings: &Settings,
) -> Option<Vec<ClassifiedToken>> {
    if !settings.semantic_tokens || !is_classified_document(uri) {
        return None;
    }

    let path = uri.to_file_path().ok()?;
    let entry = index.get_file(&path)?;
    Some(classify(&entry))
}

pub fn semantic_tokens_full(
    index: &WorkspaceIndex,
    uri: &Url,
    settings: &Settings,
) -> Option<SemanticTokensResult> {
    let classified = semantic_tokens(index, uri, settings)?;
    Some(SemanticTokensResult::Tokens(SemanticTokens {
        result_id: None,
        data: encode(&classified),
    }))
}

/// Identifier positions the structural record gives a meaning to.
fn structural_classes(entry: &FileIndexEntry) -> HashMap<(u32, u32), (SemanticClass, u32)> {
    let record = &entry.record;
    let mut classes = HashMap::new();

    let mut mark_words = |pos: TokenPos, class: SemanticClass, modifiers: u32| {
        for token in words_within(&entry.tokens, pos) {
            classes.insert((token.start.line, token.start.column), (class, modifiers));
        }
    };

    for scope in &record.scopes {
        for binding in &scope.bindings {
            let class = match binding.kind {
                BindingKind::Argument | BindingKind::Keyword(_) => SemanticClass::Parameter,
                BindingKind::Local | BindingKind::Common(_) => SemanticClass::Variable,
            };
            for occurrence in &binding.occurrences {
                mark_words(occurrence.pos, class, 0);
            }
        }
    }

    for call in &record.call_sites {
        mark_words(call.pos, SemanticClass::for_routine(call.kind), 0);
        for keyword in &call.keywords {
            mark_words(keyword.pos, SemanticClass::Property, 0);
        }
    }

    for signature in record.signatures() {
        mark_words(signature.name_pos, SemanticClass::for_routine(signature.kind), DECLARATION);
        for keyword in &signature.keywords {
            mark_words(keyword.pos, SemanticClass::Property, DECLARATION);
            mark_words(keyword.variable_pos, SemanticClass::Parameter, DECLARATION);
        }
        for arg in &signature.args {
            mark_words(arg.pos, SemanticClass::Parameter, DECLARATION);
        }
    }

    classes
}

fn words_within(tokens: &[Token], pos: TokenPos) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(move |token| {
        token.is_word()
            && token.start.line == pos.line
            && token.start.column >= pos.column
            && token.start.column < pos.end_column().max(pos.column + 1)
    })
}

fn lexical_class(token: &Token) -> Option<(SemanticClass, u32)> {
    let class = match token.kind {
        TokenKind::Reserved if WORD_OPERATORS.contains(&token.key().as_str()) => {
            SemanticClass::Operator
        }
        TokenKind::Reserved => SemanticClass::Keyword,
        TokenKind::SystemVariable => return Some((SemanticClass::Variable, DEFAULT_LIBRARY)),
        TokenKind::Number => SemanticClass::Number,
        TokenKind::String => SemanticClass::String,
        TokenKind::Comment => SemanticClass::Comment,
        TokenKind::DocOpen | TokenKind::DocClose => {
            return Some((SemanticClass::Comment, DOCUMENTATION))
        }
        TokenKind::Operator | TokenKind::Arrow | TokenKind::DoubleColon => SemanticClass::Operator,
        _ => return None,
    };
    Some((class, 0))
}

/// Classify every token of a parsed file.
pub fn classify(entry: &FileIndexEntry) -> Vec<ClassifiedToken> {
    let structural = structural_classes(entry);
    let in_doc_block = |line: u32| {
        entry.doc_blocks.iter().any(|block| {
            line > block.open.line && block.close.map_or(true, |close| line < close.line)
        })
    };

    entry
        .tokens
        .iter()
        .filter(|token| token.start.length > 0)
        .filter_map(|token| {
            let (class, modifiers) = structural
                .get(&(token.start.line, token.start.column))
                .copied()
                .or_else(|| lexical_class(token))?;
            let modifiers = match class {
                SemanticClass::Comment if in_doc_block(token.start.line) => {
                    modifiers | DOCUMENTATION
                }
                _ => modifiers,
            };
            Some(ClassifiedToken {
                pos: token.start,
                class,
                modifiers,
            })
        })
        .collect()
}

/// Relative encoding of the LSP wire format: each token is positioned
/// against the one before it.
pub fn encode(tokens: &[ClassifiedToken]) -> Vec<SemanticToken> {
    let mut previous = (0, 0);
    tokens
        .iter()
        .map(|token| {
            let (line, column) = (token.pos.line, token.pos.column);
            let delta_line = line - previous.0;
            let delta_start = if delta_line == 0 { column - previous.1 } else { column };
            previous = (line, column);
            SemanticToken {
                delta_line,
                delta_start,
                length: token.pos.length,
                token_type: token.class.type_index(),
                token_modifiers_bitset: token.modifiers,
            }
        })
        .collect()
}
