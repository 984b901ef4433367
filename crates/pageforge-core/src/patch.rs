//! Line-addressed patch protocol.
//!
//! Instead of resending a whole document for a small edit, the model is shown
//! a line-numbered rendering and asked for a minimal set of directives, one
//! per line: `<ln{N}|+{TEXT}|>` inserts TEXT as a new line immediately after
//! line N (N = 0 prepends), `<ln{N}|-{TEXT}|>` removes the first occurrence
//! of TEXT within line N (a removal that empties the line drops the line).
//! Anything that is not an exact directive line is ignored; models emit
//! stray commentary despite instructions, and that must not abort the batch.

use std::collections::HashMap;

const DIRECTIVE_OPEN: &str = "<ln";
const DIRECTIVE_CLOSE: &str = "|>";

/// Edit action for one directive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchAction {
    Insert,
    Remove,
}

/// One line-addressed edit instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatchDirective {
    /// 1-based target line; 0 means the document start and is insert-only.
    pub line: usize,
    pub action: PatchAction,
    /// Literal content to insert, or the literal substring to remove.
    pub text: String,
}

/// Parses a model response into directives, one candidate per line.
pub fn parse_directives(response: &str) -> Vec<PatchDirective> {
    response.lines().filter_map(parse_directive_line).collect()
}

fn parse_directive_line(line: &str) -> Option<PatchDirective> {
    let inner = line
        .trim()
        .strip_prefix(DIRECTIVE_OPEN)?
        .strip_suffix(DIRECTIVE_CLOSE)?;
    let (number, rest) = inner.split_once('|')?;
    let number: usize = number.parse().ok()?;
    let mut chars = rest.chars();
    let action = match chars.next()? {
        '+' => PatchAction::Insert,
        '-' => PatchAction::Remove,
        _ => return None,
    };
    if action == PatchAction::Remove && number == 0 {
        return None;
    }
    Some(PatchDirective {
        line: number,
        action,
        text: chars.as_str().to_string(),
    })
}

/// Applies a directive batch to one document snapshot and returns the
/// patched document.
///
/// Directives are applied from the highest line number down, so mutating
/// line N never invalidates the index of a not-yet-applied directive at a
/// lower line. On a tied line number the removal is applied before the
/// insertion, which makes a remove+insert pair at the same N read as
/// "replace this line". The result is independent of the order directives
/// appeared in the response.
pub fn apply_directives(document: &str, directives: &[PatchDirective]) -> String {
    let mut lines: Vec<String> = document.lines().map(String::from).collect();
    let mut ordered: Vec<&PatchDirective> = directives.iter().collect();
    // Stable sort keeps multiple insertions at one line in response order.
    ordered.sort_by(|a, b| {
        b.line
            .cmp(&a.line)
            .then_with(|| action_rank(a.action).cmp(&action_rank(b.action)))
    });

    // Slots (original line numbers) whose line was dropped by a removal;
    // tied insertions must land one position earlier.
    let mut dropped_slots: Vec<usize> = Vec::new();
    let mut inserted_per_slot: HashMap<usize, usize> = HashMap::new();

    for directive in ordered {
        match directive.action {
            PatchAction::Remove => {
                if dropped_slots.contains(&directive.line) {
                    continue;
                }
                let Some(idx) = directive.line.checked_sub(1) else {
                    continue;
                };
                let Some(target) = lines.get_mut(idx) else {
                    continue;
                };
                if let Some(pos) = target.find(&directive.text) {
                    target.replace_range(pos..pos + directive.text.len(), "");
                    if target.is_empty() {
                        lines.remove(idx);
                        dropped_slots.push(directive.line);
                    }
                }
            }
            PatchAction::Insert => {
                let mut at = directive.line;
                if dropped_slots.contains(&directive.line) {
                    at -= 1;
                }
                let offset = inserted_per_slot.entry(directive.line).or_insert(0);
                let at = (at + *offset).min(lines.len());
                lines.insert(at, directive.text.clone());
                *offset += 1;
            }
        }
    }

    lines.join("\n")
}

fn action_rank(action: PatchAction) -> u8 {
    match action {
        PatchAction::Remove => 0,
        PatchAction::Insert => 1,
    }
}

/// Renders the document with `ln{N}, ` prefixes, the form the model patches
/// against.
pub fn number_lines(document: &str) -> String {
    document
        .lines()
        .enumerate()
        .map(|(i, line)| format!("ln{}, {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
