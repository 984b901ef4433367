//! Local structural checks for generated documents.
//!
//! The lint stages run this before spending a network round-trip: a document
//! that already passes skips the model call entirely, and when it does not,
//! the findings are formatted into the lint prompt so the model fixes
//! concrete problems instead of guessing.

/// One structural finding with a 1-based line number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LintIssue {
    pub line: usize,
    pub message: String,
}

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const STRUCTURAL_TAGS: [&str; 3] = ["html", "head", "body"];

/// Runs every structural check against the document.
pub fn document_issues(document: &str) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    let mut bytes = document.as_bytes().to_vec();
    blank_comments(&mut bytes);
    let starts = line_starts(&bytes);

    let text = String::from_utf8_lossy(&bytes).to_string();
    if !text
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("<!doctype html")
    {
        issues.push(LintIssue {
            line: 1,
            message: "missing <!doctype html> at the top".into(),
        });
    }

    // script/style balance is checked before their bodies are blanked out,
    // while the tags themselves are still visible.
    let raw_tags = scan_tags(&bytes);
    for tag in ["script", "style"] {
        let opens = raw_tags
            .iter()
            .filter(|t| !t.closing && t.name == tag)
            .count();
        let closes = raw_tags
            .iter()
            .filter(|t| t.closing && t.name == tag)
            .count();
        if opens != closes {
            issues.push(LintIssue {
                line: 1,
                message: format!("unbalanced <{tag}> tags (open={opens}, close={closes})"),
            });
        }
    }

    blank_blocks(&mut bytes, "script");
    blank_blocks(&mut bytes, "style");
    let tags = scan_tags(&bytes);

    for tag in STRUCTURAL_TAGS {
        let count = tags.iter().filter(|t| !t.closing && t.name == tag).count();
        match count {
            0 => issues.push(LintIssue {
                line: 1,
                message: format!("missing <{tag}> tag"),
            }),
            1 => {}
            n => issues.push(LintIssue {
                line: 1,
                message: format!("multiple <{tag}> tags found ({n})"),
            }),
        }
    }

    issues.extend(stack_issues(&tags, &starts));
    issues
}

/// Formats findings for the lint-stage prompt.
pub fn format_issues(issues: &[LintIssue]) -> String {
    const MAX_ITEMS: usize = 12;
    let mut out: Vec<String> = issues
        .iter()
        .take(MAX_ITEMS)
        .enumerate()
        .map(|(i, issue)| format!("{}. Line {}: {}", i + 1, issue.line, issue.message))
        .collect();
    if issues.len() > MAX_ITEMS {
        out.push(format!("... and {} more", issues.len() - MAX_ITEMS));
    }
    out.join("\n")
}

#[derive(Debug)]
struct TagToken {
    name: String,
    closing: bool,
    self_closing: bool,
    pos: usize,
}

fn scan_tags(bytes: &[u8]) -> Vec<TagToken> {
    let mut tags = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let start = i;
        let mut j = i + 1;
        let closing = bytes.get(j) == Some(&b'/');
        if closing {
            j += 1;
        }
        let name_start = j;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'-') {
            j += 1;
        }
        if j == name_start {
            // "<!", "<<", stray comparison operators: not a tag.
            i += 1;
            continue;
        }
        let Some(end) = bytes[j..].iter().position(|&b| b == b'>').map(|p| j + p) else {
            break;
        };
        let mut k = end;
        while k > j && bytes[k - 1].is_ascii_whitespace() {
            k -= 1;
        }
        let self_closing = k > j && bytes[k - 1] == b'/';
        tags.push(TagToken {
            name: String::from_utf8_lossy(&bytes[name_start..j]).to_ascii_lowercase(),
            closing,
            self_closing,
            pos: start,
        });
        i = end + 1;
    }
    tags
}

fn stack_issues(tags: &[TagToken], starts: &[usize]) -> Vec<LintIssue> {
    let mut stack: Vec<(&str, usize)> = Vec::new();
    let mut issues = Vec::new();
    for tag in tags {
        let line = line_of(tag.pos, starts);
        if !tag.closing {
            if VOID_TAGS.contains(&tag.name.as_str()) || tag.self_closing {
                continue;
            }
            stack.push((tag.name.as_str(), tag.pos));
            continue;
        }
        if VOID_TAGS.contains(&tag.name.as_str()) {
            issues.push(LintIssue {
                line,
                message: format!("unexpected closing tag </{}> for void element", tag.name),
            });
            continue;
        }
        match stack.last() {
            None => issues.push(LintIssue {
                line,
                message: format!("unmatched closing tag </{}>", tag.name),
            }),
            Some((open, _)) if *open != tag.name => {
                issues.push(LintIssue {
                    line,
                    message: format!("mismatched closing tag </{}>; expected </{open}>", tag.name),
                });
                stack.pop();
            }
            Some(_) => {
                stack.pop();
            }
        }
    }
    for (name, pos) in stack {
        issues.push(LintIssue {
            line: line_of(pos, starts),
            message: format!("unclosed <{name}> tag"),
        });
    }
    issues
}

/// Overwrites `<!-- ... -->` spans with spaces, keeping newlines so line
/// numbers stay valid.
fn blank_comments(bytes: &mut [u8]) {
    let mut from = 0;
    loop {
        let Some(start) = find_ci(bytes, b"<!--", from) else {
            return;
        };
        let end = find_ci(bytes, b"-->", start + 4)
            .map(|p| p + 3)
            .unwrap_or(bytes.len());
        blank_range(bytes, start, end);
        from = end;
    }
}

/// Overwrites whole `<tag ...> ... </tag>` blocks with spaces.
fn blank_blocks(bytes: &mut [u8], tag: &str) {
    let open = format!("<{tag}");
    let close = format!("</{tag}");
    let mut from = 0;
    loop {
        let Some(start) = find_ci(bytes, open.as_bytes(), from) else {
            return;
        };
        let end = match find_ci(bytes, close.as_bytes(), start + open.len()) {
            Some(close_start) => bytes[close_start..]
                .iter()
                .position(|&b| b == b'>')
                .map(|p| close_start + p + 1)
                .unwrap_or(bytes.len()),
            None => bytes.len(),
        };
        blank_range(bytes, start, end);
        from = end;
    }
}

fn blank_range(bytes: &mut [u8], start: usize, end: usize) {
    let len = bytes.len();
    for b in &mut bytes[start..end.min(len)] {
        if *b != b'\n' {
            *b = b' ';
        }
    }
}

fn find_ci(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|p| p + from)
}

fn line_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

fn line_of(pos: usize, starts: &[usize]) -> usize {
    match starts.binary_search(&pos) {
        Ok(idx) => idx + 1,
        Err(idx) => idx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "<!doctype html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>body { color: red; }</style>\n</head>\n<body>\n<div id=\"game\"><br></div>\n<script>if (1 < 2) { run(); }</script>\n</body>\n</html>";

    #[test]
    fn clean_document_has_no_issues() {
        assert_eq!(document_issues(CLEAN), Vec::new());
    }

    #[test]
    fn missing_doctype_is_reported() {
        let issues = document_issues("<html><head></head><body></body></html>");
        assert!(issues.iter().any(|i| i.message.contains("doctype")));
    }

    #[test]
    fn duplicate_body_is_reported() {
        let doc = "<!doctype html><html><head></head><body></body><body></body></html>";
        let issues = document_issues(doc);
        assert!(
            issues
                .iter()
                .any(|i| i.message.contains("multiple <body> tags"))
        );
    }

    #[test]
    fn unbalanced_script_is_reported() {
        let doc = "<!doctype html><html><head></head><body><script>run();</body></html>";
        let issues = document_issues(doc);
        assert!(
            issues
                .iter()
                .any(|i| i.message.contains("unbalanced <script>"))
        );
    }

    #[test]
    fn mismatched_closing_tag_is_reported_with_its_line() {
        let doc =
            "<!doctype html>\n<html>\n<head></head>\n<body>\n<div>\n</span>\n</body>\n</html>";
        let issues = document_issues(doc);
        let mismatch = issues
            .iter()
            .find(|i| i.message.contains("mismatched closing tag </span>"))
            .expect("mismatch issue");
        assert_eq!(mismatch.line, 6);
    }

    #[test]
    fn markup_inside_comments_and_scripts_is_ignored() {
        let doc = "<!doctype html>\n<html>\n<head></head>\n<body>\n<!-- <div> never closed -->\n<script>document.write(\"<section>\");</script>\n</body>\n</html>";
        assert_eq!(document_issues(doc), Vec::new());
    }

    #[test]
    fn format_issues_numbers_and_truncates() {
        let issues: Vec<LintIssue> = (1..=15)
            .map(|n| LintIssue {
                line: n,
                message: format!("issue {n}"),
            })
            .collect();
        let formatted = format_issues(&issues);
        assert!(formatted.starts_with("1. Line 1: issue 1"));
        assert!(formatted.ends_with("... and 3 more"));
    }
}
