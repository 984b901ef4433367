//! Stage instruction text and request assembly.
//!
//! The natural-language wording is configuration; what the pipeline depends
//! on structurally is the message layout: a fixed system block, then a user
//! content block, and for patch requests an additional block carrying the
//! line-numbered document.

use pageforge_transport::CompletionRequest;

use crate::lint::{self, LintIssue};
use crate::patch;
use crate::record::GenerationRecord;
use crate::stage::Stage;

const DOCUMENT_CONTRACT: &str = "Respond with a single JSON object {\"document\": \"<the complete HTML document>\"} and no surrounding prose.";

const NO_ISSUES_MARKER: &str = "NO_ISSUES";

fn system_for(stage: Stage) -> String {
    match stage {
        Stage::Draft => format!(
            "You build complete single-file HTML5 pages: one document with inline <style> and <script>, playable and mobile-friendly. {DOCUMENT_CONTRACT}"
        ),
        Stage::ImprovementChecklist => "You review a single-file HTML5 page and produce a short, concrete improvement checklist: bugs, disconnected handlers, missing game loops, mobile readiness. Respond with the checklist as plain text, one item per line.".to_string(),
        Stage::ApplyChecklist => format!(
            "You revise a single-file HTML5 page by applying every item of the provided improvement checklist while keeping everything else intact. {DOCUMENT_CONTRACT}"
        ),
        Stage::SyntaxLint1 | Stage::SyntaxLint2 => format!(
            "You fix HTML syntax problems in a single-file page. Fix exactly the listed issues without rewriting unrelated content. {DOCUMENT_CONTRACT}"
        ),
        Stage::PlatformOptimize => format!(
            "You optimize a single-file HTML5 page for mobile: viewport meta, touch or pointer controls, touch targets of at least 44px, and 16px base fonts. {DOCUMENT_CONTRACT}"
        ),
        Stage::FinalInspection => format!(
            "You inspect a single-file HTML5 page for functional issues: undefined variables, buttons without handlers, loops that never run, broken state transitions. Respond with a short plain-text report, one issue per line. If there are none, respond with the single line {NO_ISSUES_MARKER}."
        ),
        Stage::FixInspectionIssues => format!(
            "You fix the functional issues listed in the inspection report while keeping everything else intact. {DOCUMENT_CONTRACT}"
        ),
        Stage::Complete => String::new(),
    }
}

pub(crate) fn stage_request(
    model: &str,
    stage: Stage,
    record: &GenerationRecord,
    issues: &[LintIssue],
) -> CompletionRequest {
    let request = CompletionRequest::new(model).system(system_for(stage));
    match stage {
        Stage::Draft => request.user(format!(
            "Build a single-file interactive HTML page from this idea:\n{}",
            record.input_topic
        )),
        Stage::ImprovementChecklist | Stage::PlatformOptimize | Stage::FinalInspection => {
            request.user(format!("Current document:\n{}", record.document))
        }
        Stage::ApplyChecklist => request.user(format!(
            "Improvement checklist:\n{}\n\nCurrent document:\n{}",
            record.side_artifact, record.document
        )),
        Stage::SyntaxLint1 | Stage::SyntaxLint2 => request.user(format!(
            "Syntax issues found:\n{}\n\nCurrent document:\n{}",
            lint::format_issues(issues),
            record.document
        )),
        Stage::FixInspectionIssues => request.user(format!(
            "Inspection report:\n{}\n\nCurrent document:\n{}",
            record.side_artifact, record.document
        )),
        // Not a model stage; never requested.
        Stage::Complete => request,
    }
}

pub(crate) fn edit_request(model: &str, instruction: &str, document: &str) -> CompletionRequest {
    CompletionRequest::new(model)
        .system(
            "You edit an existing single-file HTML document. Respond with edit directives only, \
             one per line, and nothing else.\n\
             <ln{N}|+{TEXT}|> inserts TEXT as a new line immediately after line N; \
             <ln0|+{TEXT}|> inserts at the very top.\n\
             <ln{N}|-{TEXT}|> removes the first occurrence of TEXT within line N.\n\
             Use the line numbers shown in the provided document and keep the edit minimal.",
        )
        .user(instruction.to_string())
        .user(format!(
            "Current document with line numbers:\n{}",
            patch::number_lines(document)
        ))
}

/// Default detector for "the inspection found something": anything beyond a
/// single line containing the no-issues marker counts as issues. String
/// matching is imperfect by nature, which is why the pipeline accepts a
/// replacement predicate.
pub fn inspection_reports_issues(summary: &str) -> bool {
    let lines: Vec<&str> = summary.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => false,
        [only] => {
            let lower = only.to_ascii_lowercase();
            !(lower.contains(&NO_ISSUES_MARKER.to_ascii_lowercase())
                || lower.contains("no issues"))
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_request_puts_system_block_first() {
        let record = GenerationRecord::new("g", "a single-button counter");
        let request = stage_request("m", Stage::Draft, &record, &[]);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(
            request.messages[0].role,
            pageforge_transport::Role::System
        );
        assert!(request.messages[1].content.contains("a single-button counter"));
    }

    #[test]
    fn lint_request_carries_formatted_issues() {
        let mut record = GenerationRecord::new("g", "t");
        record.document = "<html></html>".into();
        let issues = vec![crate::lint::LintIssue {
            line: 1,
            message: "missing <!doctype html> at the top".into(),
        }];
        let request = stage_request("m", Stage::SyntaxLint1, &record, &issues);
        assert!(request.messages[1].content.contains("missing <!doctype html>"));
        assert!(request.messages[1].content.contains("<html></html>"));
    }

    #[test]
    fn edit_request_appends_numbered_document_block() {
        let request = edit_request("m", "make the button red", "a\nb");
        assert_eq!(request.messages.len(), 3);
        assert!(request.messages[2].content.contains("ln1, a"));
        assert!(request.messages[2].content.contains("ln2, b"));
    }

    #[test]
    fn inspection_detector_accepts_single_no_issues_line() {
        assert!(!inspection_reports_issues("NO_ISSUES"));
        assert!(!inspection_reports_issues("  no issues found.  "));
        assert!(!inspection_reports_issues(""));
    }

    #[test]
    fn inspection_detector_flags_real_reports() {
        assert!(inspection_reports_issues(
            "restart button has no handler\nscore never resets"
        ));
        assert!(inspection_reports_issues("the game loop never starts"));
    }
}
