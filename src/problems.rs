//! Problem codes and the wire-visible diagnostic record.
//!
//! Codes are stable identifiers consumed by downstream tooling (fixtures,
//! suppression lists, editor quick-fixes). A code is never reassigned to a
//! different meaning; new problems get new numbers.
//!
//! | Range   | Stage                                   |
//! |---------|-----------------------------------------|
//! | 0-9     | tokenizer                               |
//! | 10-19   | documentation blocks (parse time)       |
//! | 20-29   | routine structure (parse time)          |
//! | 50-69   | documentation vs. signature (post)      |
//! | 100-119 | variable usage and call checks (post)   |

use serde::{Deserialize, Serialize};

use crate::tokenizer::TokenPos;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ProblemCode {
    UnknownToken = 0,
    UnterminatedString = 1,
    InvalidContinuation = 2,
    DanglingContinuation = 3,

    UnclosedDocBlock = 10,
    MalformedDocEntry = 11,

    InvalidRoutineHeader = 20,
    MissingEnd = 21,
    DuplicateRoutine = 22,
    DuplicateParameter = 23,

    NoArgsToDoc = 50,
    NoKwsToDoc = 51,
    ArgMissingFromDocs = 52,
    KeywordMissingFromDocs = 53,
    ReturnsOnProcedure = 54,
    DocumentedParamMissing = 63,

    UnusedVariable = 104,
    UnknownKeyword = 110,
    TooManyArguments = 111,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

impl ProblemCode {
    pub const ALL: &'static [ProblemCode] = &[
        ProblemCode::UnknownToken,
        ProblemCode::UnterminatedString,
        ProblemCode::InvalidContinuation,
        ProblemCode::DanglingContinuation,
        ProblemCode::UnclosedDocBlock,
        ProblemCode::MalformedDocEntry,
        ProblemCode::InvalidRoutineHeader,
        ProblemCode::MissingEnd,
        ProblemCode::DuplicateRoutine,
        ProblemCode::DuplicateParameter,
        ProblemCode::NoArgsToDoc,
        ProblemCode::NoKwsToDoc,
        ProblemCode::ArgMissingFromDocs,
        ProblemCode::KeywordMissingFromDocs,
        ProblemCode::ReturnsOnProcedure,
        ProblemCode::DocumentedParamMissing,
        ProblemCode::UnusedVariable,
        ProblemCode::UnknownKeyword,
        ProblemCode::TooManyArguments,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<ProblemCode> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    pub fn severity(self) -> Severity {
        use ProblemCode::*;
        match self {
            UnknownToken | UnterminatedString | InvalidContinuation | InvalidRoutineHeader
            | MissingEnd | DuplicateParameter | UnknownKeyword | TooManyArguments => {
                Severity::Error
            }
            DanglingContinuation | UnclosedDocBlock | MalformedDocEntry | DuplicateRoutine
            | NoArgsToDoc | NoKwsToDoc | DocumentedParamMissing | ReturnsOnProcedure
            | UnusedVariable => Severity::Warning,
            ArgMissingFromDocs | KeywordMissingFromDocs => Severity::Information,
        }
    }

    /// Base message. Problems naming an identifier append it in quotes.
    pub fn message(self) -> &'static str {
        use ProblemCode::*;
        match self {
            UnknownToken => "Unknown token",
            UnterminatedString => "String literal is missing its closing quote",
            InvalidContinuation => {
                "Line continuation can only be followed by a comment or the end of the line"
            }
            DanglingContinuation => {
                "Line continuation at the end of the file has nothing to continue"
            }
            UnclosedDocBlock => "Documentation block is missing its closing \";-\"",
            MalformedDocEntry => {
                "Malformed documentation entry, expected \"Name: attribute, attribute, ...\""
            }
            InvalidRoutineHeader => "Invalid routine definition",
            MissingEnd => "Routine is missing its closing \"end\"",
            DuplicateRoutine => "Routine is defined more than once in this file",
            DuplicateParameter => "Argument or keyword is declared more than once",
            NoArgsToDoc => {
                "Documentation includes arguments, but none are present in routine definition"
            }
            NoKwsToDoc => {
                "Documentation includes keywords, but none are present in routine definition"
            }
            ArgMissingFromDocs => "Argument is missing from documentation",
            KeywordMissingFromDocs => "Keyword is missing from documentation",
            ReturnsOnProcedure => "Procedures cannot document a return value",
            DocumentedParamMissing => "Documented argument, keyword, or property does not exist",
            UnusedVariable => "Unused variable",
            UnknownKeyword => "Keyword does not exist for routine",
            TooManyArguments => "Too many arguments for routine",
        }
    }

    /// Message with an identifier appended, e.g. `Unused variable "kw1"`.
    pub fn message_for(self, name: &str) -> String {
        match self {
            ProblemCode::DocumentedParamMissing
            | ProblemCode::ArgMissingFromDocs
            | ProblemCode::KeywordMissingFromDocs => format!("{}: \"{}\"", self.message(), name),
            _ => format!("{} \"{}\"", self.message(), name),
        }
    }
}

/// One reported issue. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxProblem {
    pub code: u16,
    pub info: String,
    pub start: TokenPos,
    pub end: TokenPos,
}

impl SyntaxProblem {
    pub fn new(
        code: ProblemCode,
        info: impl Into<String>,
        start: TokenPos,
        end: TokenPos,
    ) -> SyntaxProblem {
        SyntaxProblem {
            code: code.code(),
            info: info.into(),
            start,
            end,
        }
    }

    /// Problem spanning a single token.
    pub fn at(code: ProblemCode, info: impl Into<String>, pos: TokenPos) -> SyntaxProblem {
        SyntaxProblem::new(code, info, pos, pos)
    }

    pub fn problem_code(&self) -> Option<ProblemCode> {
        ProblemCode::from_code(self.code)
    }

    pub fn severity(&self) -> Severity {
        self.problem_code()
            .map(ProblemCode::severity)
            .unwrap_or(Severity::Warning)
    }
}

/// Stable sort by start position; problems on the same position keep the
/// order in which their checks ran.
pub fn sort_problems(problems: &mut [SyntaxProblem]) {
    problems.sort_by_key(|p| p.start.sort_key());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let mut codes: Vec<u16> = ProblemCode::ALL.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ProblemCode::ALL.len());
    }

    #[test]
    fn test_stable_code_values() {
        assert_eq!(ProblemCode::NoKwsToDoc.code(), 51);
        assert_eq!(ProblemCode::DocumentedParamMissing.code(), 63);
        assert_eq!(ProblemCode::UnusedVariable.code(), 104);
    }

    #[test]
    fn test_round_trip_through_code() {
        for code in ProblemCode::ALL {
            assert_eq!(ProblemCode::from_code(code.code()), Some(*code));
        }
        assert_eq!(ProblemCode::from_code(9999), None);
    }

    #[test]
    fn test_messages_naming_identifiers() {
        assert_eq!(
            ProblemCode::UnusedVariable.message_for("kw1"),
            "Unused variable \"kw1\""
        );
        assert_eq!(
            ProblemCode::DocumentedParamMissing.message_for("kw1"),
            "Documented argument, keyword, or property does not exist: \"kw1\""
        );
    }

    #[test]
    fn test_wire_shape() {
        let problem = SyntaxProblem::at(
            ProblemCode::UnusedVariable,
            ProblemCode::UnusedVariable.message_for("kw1"),
            TokenPos::new(7, 27, 3),
        );
        let json = serde_json::to_string(&problem).unwrap();
        assert_eq!(
            json,
            r#"{"code":104,"info":"Unused variable \"kw1\"","start":[7,27,3],"end":[7,27,3]}"#
        );
    }

    #[test]
    fn test_sort_is_stable_for_equal_starts() {
        let pos = TokenPos::new(1, 0, 1);
        let mut problems = vec![
            SyntaxProblem::at(ProblemCode::UnusedVariable, "b", TokenPos::new(2, 0, 1)),
            SyntaxProblem::at(ProblemCode::NoKwsToDoc, "first", pos),
            SyntaxProblem::at(ProblemCode::NoArgsToDoc, "second", pos),
        ];
        sort_problems(&mut problems);
        let infos: Vec<_> = problems.iter().map(|p| p.info.as_str()).collect();
        assert_eq!(infos, vec!["first", "second", "b"]);
    }
}
