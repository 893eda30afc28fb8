//! Documentation blocks (`;+ ... ;-`) and their association with routines.
//!
//! A block is a run of comment lines between the two delimiters. Inside it,
//! `:Tag:` headers start sections. Parameter-like sections (`:Params:`,
//! `:Arguments:`, `:Keywords:`) hold entries of the form
//!
//! ```text
//! ;   KW1: in, optional, type=boolean
//! ;     Description of the keyword
//! ```
//!
//! Parsing is line oriented and tolerant: a malformed entry is reported and
//! skipped, the rest of the block is still read.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::problems::{ProblemCode, SyntaxProblem};
use crate::tokenizer::{Token, TokenKind, TokenPos};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocTag {
    Description,
    Params,
    Keywords,
    Returns,
    Examples,
    Author,
    History,
    Private,
    Hidden,
    Tooltip,
    Other(String),
}

impl DocTag {
    pub fn parse(tag: &str) -> DocTag {
        match tag.trim().to_ascii_lowercase().as_str() {
            "description" => DocTag::Description,
            "params" | "arguments" | "args" => DocTag::Params,
            "keywords" => DocTag::Keywords,
            "returns" => DocTag::Returns,
            "examples" => DocTag::Examples,
            "author" => DocTag::Author,
            "history" => DocTag::History,
            "private" => DocTag::Private,
            "hidden" => DocTag::Hidden,
            "tooltip" => DocTag::Tooltip,
            _ => DocTag::Other(tag.trim().to_string()),
        }
    }

    /// Sections whose content is a list of `Name: attributes` entries.
    pub fn has_entries(&self) -> bool {
        matches!(self, DocTag::Params | DocTag::Keywords)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocEntry {
    /// Name as written in the documentation
    pub name: String,
    pub attributes: Vec<String>,
    pub description: Vec<String>,
    /// The whole entry line
    pub range: TokenPos,
}

impl DocEntry {
    pub fn key(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocSection {
    pub tag: DocTag,
    /// `None` for the untagged description that may open a block
    pub header: Option<TokenPos>,
    /// Full last line belonging to the section
    pub end: TokenPos,
    pub text: Vec<String>,
    pub entries: Vec<DocEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocCommentBlock {
    pub open: TokenPos,
    pub close: Option<TokenPos>,
    pub sections: Vec<DocSection>,
    /// Position of the `pro`/`function` token this block documents
    pub routine_start: Option<TokenPos>,
}

impl DocCommentBlock {
    pub fn is_orphaned(&self) -> bool {
        self.routine_start.is_none()
    }

    pub fn section(&self, tag: &DocTag) -> Option<&DocSection> {
        self.sections.iter().find(|s| &s.tag == tag)
    }

    pub fn description(&self) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.tag == DocTag::Description)
            .flat_map(|s| s.text.iter().map(String::as_str))
            .collect()
    }

    pub fn entry(&self, tag: &DocTag, name: &str) -> Option<&DocEntry> {
        self.section(tag)?
            .entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }
}

static HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?<indent>\s*):(?<tag>[A-Za-z][A-Za-z _]*):(?<rest>.*)$").unwrap());

static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?<name>[A-Za-z_][A-Za-z0-9_$]*)\s*:(?<attributes>.*)$").unwrap()
});

/// Find every documentation block in the token stream, parse its sections and
/// link it to the routine definition that follows.
pub fn link_doc_blocks<S: AsRef<str>>(
    tokens: &[Token],
    lines: &[S],
) -> (Vec<DocCommentBlock>, Vec<SyntaxProblem>) {
    let mut blocks = Vec::new();
    let mut problems = Vec::new();

    let mut idx = 0;
    while idx < tokens.len() {
        if tokens[idx].kind != TokenKind::DocOpen {
            idx += 1;
            continue;
        }

        let open = tokens[idx].start;
        let mut next = idx + 1;
        while next < tokens.len() && tokens[next].kind == TokenKind::Comment {
            next += 1;
        }

        let close = tokens
            .get(next)
            .filter(|t| t.kind == TokenKind::DocClose)
            .map(|t| t.start);

        let content_end = match (close, tokens.get(next)) {
            (Some(close), _) => close.line,
            (None, Some(stop)) => stop.start.line,
            (None, None) => lines.len() as u32,
        };

        let sections = parse_sections(lines, open.line + 1, content_end, &mut problems);

        let routine_start = match close {
            Some(_) => {
                let mut after = next + 1;
                while after < tokens.len() && tokens[after].kind == TokenKind::Comment {
                    after += 1;
                }
                tokens
                    .get(after)
                    .filter(|t| t.is_reserved("pro") || t.is_reserved("function"))
                    .map(|t| t.start)
            }
            None => {
                problems.push(SyntaxProblem::at(
                    ProblemCode::UnclosedDocBlock,
                    ProblemCode::UnclosedDocBlock.message(),
                    open,
                ));
                None
            }
        };

        blocks.push(DocCommentBlock {
            open,
            close,
            sections,
            routine_start,
        });

        idx = if close.is_some() { next + 1 } else { next };
    }

    (blocks, problems)
}

/// Comment body of a line: everything after the first `;`, with the column
/// where that body starts.
fn comment_body(line: &str) -> Option<(usize, &str)> {
    let semi = line.find(';')?;
    if !line[..semi].trim().is_empty() {
        return None;
    }
    let column = line[..semi].chars().count() + 1;
    Some((column, &line[semi + 1..]))
}

fn full_line(lines: &[impl AsRef<str>], line: u32) -> TokenPos {
    let length = lines
        .get(line as usize)
        .map(|l| l.as_ref().chars().count())
        .unwrap_or(0);
    TokenPos::new(line, 0, length as u32)
}

fn parse_sections<S: AsRef<str>>(
    lines: &[S],
    first: u32,
    end: u32,
    problems: &mut Vec<SyntaxProblem>,
) -> Vec<DocSection> {
    let mut sections: Vec<DocSection> = Vec::new();
    // entry indentation for the current section, fixed by its first entry line
    let mut entry_indent: Option<usize> = None;

    for line_idx in first..end.min(lines.len() as u32) {
        let raw = lines[line_idx as usize].as_ref();
        let Some((body_column, body)) = comment_body(raw) else {
            continue;
        };

        if let Some(caps) = HEADER_RE.captures(body) {
            let indent = caps["indent"].chars().count();
            let tag_text = &caps["tag"];
            let header = TokenPos::new(
                line_idx,
                (body_column + indent) as u32,
                (tag_text.chars().count() + 3) as u32,
            );
            let inline = caps["rest"].trim();
            sections.push(DocSection {
                tag: DocTag::parse(tag_text),
                header: Some(header),
                end: full_line(lines, line_idx),
                text: if inline.is_empty() {
                    Vec::new()
                } else {
                    vec![inline.to_string()]
                },
                entries: Vec::new(),
            });
            entry_indent = None;
            continue;
        }

        if sections.is_empty() {
            if body.trim().is_empty() {
                continue;
            }
            sections.push(DocSection {
                tag: DocTag::Description,
                header: None,
                end: full_line(lines, line_idx),
                text: Vec::new(),
                entries: Vec::new(),
            });
        }
        let Some(section) = sections.last_mut() else {
            continue;
        };
        section.end = full_line(lines, line_idx);

        if body.trim().is_empty() {
            continue;
        }

        if !section.tag.has_entries() {
            section.text.push(body.trim().to_string());
            continue;
        }

        let indent = body.chars().take_while(|c| c.is_whitespace()).count();
        let level = *entry_indent.get_or_insert(indent);

        if indent > level {
            match section.entries.last_mut() {
                Some(entry) => entry.description.push(body.trim().to_string()),
                None => problems.push(SyntaxProblem::at(
                    ProblemCode::MalformedDocEntry,
                    ProblemCode::MalformedDocEntry.message(),
                    full_line(lines, line_idx),
                )),
            }
            continue;
        }

        match ENTRY_RE.captures(body) {
            Some(caps) => section.entries.push(DocEntry {
                name: caps["name"].to_string(),
                attributes: caps["attributes"]
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect(),
                description: Vec::new(),
                range: full_line(lines, line_idx),
            }),
            None => problems.push(SyntaxProblem::at(
                ProblemCode::MalformedDocEntry,
                ProblemCode::MalformedDocEntry.message(),
                full_line(lines, line_idx),
            )),
        }
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;

    fn link(source: &[&str]) -> (Vec<DocCommentBlock>, Vec<SyntaxProblem>) {
        let tokenized = tokenize(source);
        link_doc_blocks(&tokenized.tokens, source)
    }

    const KEYWORD_DOCS: &[&str] = &[
        ";+",
        ";",
        "; :Keywords:",
        ";   KW1: in, optional, type=boolean",
        ";     My favorite argument",
        ";",
        ";-",
        "pro myclass::mymethod, KW1=kw1",
        "  compile_opt idl2",
        "end",
    ];

    #[test]
    fn test_keyword_section_ranges() {
        let (blocks, problems) = link(KEYWORD_DOCS);
        assert!(problems.is_empty());
        assert_eq!(blocks.len(), 1);

        let section = blocks[0].section(&DocTag::Keywords).unwrap();
        assert_eq!(section.header, Some(TokenPos::new(2, 2, 11)));
        assert_eq!(section.end, TokenPos::new(5, 0, 1));
        assert_eq!(section.entries.len(), 1);

        let entry = &section.entries[0];
        assert_eq!(entry.name, "KW1");
        assert_eq!(entry.attributes, vec!["in", "optional", "type=boolean"]);
        assert_eq!(entry.description, vec!["My favorite argument"]);
        assert_eq!(entry.range, TokenPos::new(3, 0, 35));
    }

    #[test]
    fn test_block_links_to_following_routine() {
        let (blocks, _) = link(KEYWORD_DOCS);
        assert_eq!(blocks[0].routine_start, Some(TokenPos::new(7, 0, 3)));
        assert!(!blocks[0].is_orphaned());
    }

    #[test]
    fn test_blank_and_comment_lines_are_skipped_when_linking() {
        let (blocks, _) = link(&[";+", "; Text", ";-", "", "; a comment", "function f", "end"]);
        assert_eq!(blocks[0].routine_start, Some(TokenPos::new(5, 0, 8)));
    }

    #[test]
    fn test_block_followed_by_code_is_orphaned() {
        let (blocks, problems) = link(&[";+", "; :Keywords:", ";   K: in", ";-", "x = 1"]);
        assert!(blocks[0].is_orphaned());
        assert!(problems.is_empty());
    }

    #[test]
    fn test_unclosed_block() {
        let (blocks, problems) = link(&[";+", "; :Params:", ";   a: in", "pro p, a", "end"]);
        assert!(blocks[0].is_orphaned());
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, ProblemCode::UnclosedDocBlock.code());
        assert_eq!(blocks[0].section(&DocTag::Params).unwrap().entries.len(), 1);
    }

    #[test]
    fn test_malformed_entry_is_skipped() {
        let (blocks, problems) = link(&[
            ";+",
            "; :Params:",
            ";   a: in, required",
            ";   this line is not an entry",
            ";   b: in, optional",
            ";-",
        ]);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].code, ProblemCode::MalformedDocEntry.code());
        assert_eq!(problems[0].start, TokenPos::new(3, 0, 29));
        let names: Vec<_> = blocks[0]
            .section(&DocTag::Params)
            .unwrap()
            .entries
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_untagged_description_and_inline_returns() {
        let (blocks, _) = link(&[
            ";+",
            "; Adds two numbers.",
            ";",
            "; :Returns: float",
            ";-",
            "function add, a, b",
            "  return, a + b",
            "end",
        ]);
        let block = &blocks[0];
        assert_eq!(block.description(), vec!["Adds two numbers."]);
        assert_eq!(
            block.section(&DocTag::Returns).unwrap().text,
            vec!["float".to_string()]
        );
    }

    #[test]
    fn test_arguments_alias() {
        assert_eq!(DocTag::parse("Arguments"), DocTag::Params);
        assert_eq!(DocTag::parse("Custom Tag"), DocTag::Other("Custom Tag".into()));
    }
}
