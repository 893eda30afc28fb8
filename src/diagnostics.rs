use std::path::Path;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, NumberOrString, Url};

use crate::{
    config::Settings,
    index::WorkspaceIndex,
    problems::{ProblemCode, Severity, SyntaxProblem},
    tokenizer::span_range,
};

fn lsp_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Information => DiagnosticSeverity::INFORMATION,
    }
}

pub fn to_diagnostic(problem: &SyntaxProblem) -> Diagnostic {
    let tags = match problem.problem_code() {
        Some(ProblemCode::UnusedVariable) => Some(vec![DiagnosticTag::UNNECESSARY]),
        _ => None,
    };

    Diagnostic {
        range: span_range(problem.start, problem.end),
        severity: Some(lsp_severity(problem.severity())),
        code: Some(NumberOrString::Number(problem.code.into())),
        source: Some("idl-index".into()),
        message: problem.info.clone(),
        tags,
        ..Default::default()
    }
}

/// Reported problems of an indexed file as LSP diagnostics, minus the codes
/// disabled in settings.
pub fn diagnostics(
    index: &WorkspaceIndex,
    settings: &Settings,
    (path, _uri): (&Path, &Url),
) -> Option<Vec<Diagnostic>> {
    let entry = index.get_file(path)?;

    let diags = entry
        .problems()
        .iter()
        .filter(|problem| !settings.is_disabled(problem.code))
        .map(to_diagnostic)
        .collect();

    Some(diags)
}
