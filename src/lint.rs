//! Brace-balance diagnostics.

use serde::Serialize;

pub const UNEXPECTED_CLOSE: &str = "unexpected closing brace";
pub const UNMATCHED_OPEN: &str = "unmatched opening brace";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Byte range `from..to` of one line of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LineRange {
    pub from: usize,
    pub to: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// 1-based line number.
    pub line: usize,
    pub line_range: LineRange,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    /// Diagnostic covering line `line` (1-based) of `text`.
    pub fn on_line(text: &str, line: usize, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line: line.max(1),
            line_range: line_range(text, line).unwrap_or_default(),
            severity,
            message: message.into(),
        }
    }

    /// Diagnostic anchored at the start of the document.
    pub fn at_start(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            line: 1,
            line_range: LineRange::default(),
            severity,
            message: message.into(),
        }
    }
}

/// Byte range of line `line` (1-based), without its terminator.
pub fn line_range(text: &str, line: usize) -> Option<LineRange> {
    let mut from = 0;
    for (i, content) in text.split('\n').enumerate() {
        if i + 1 == line {
            let len = content.strip_suffix('\r').unwrap_or(content).len();
            return Some(LineRange {
                from,
                to: from + len,
            });
        }
        from += content.len() + 1;
    }
    None
}

/// Report stray `}` per occurrence and a single unmatched `{` at the end.
pub fn lint(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut depth: usize = 0;

    for (i, line) in text.split('\n').enumerate() {
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' if depth == 0 => {
                    diagnostics.push(Diagnostic::on_line(
                        text,
                        i + 1,
                        Severity::Error,
                        UNEXPECTED_CLOSE,
                    ));
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
    }

    if depth > 0 {
        diagnostics.push(Diagnostic::at_start(Severity::Error, UNMATCHED_OPEN));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_balanced_and_empty() {
        assert!(lint("").is_empty());
        assert!(lint("  \n\t").is_empty());
        assert!(lint("Table a {\n  id int\n}\nTable b { }").is_empty());
    }

    #[test]
    fn test_unmatched_open() {
        let diags = lint("Table a {\n  id int\n");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, UNMATCHED_OPEN);
        assert_eq!(diags[0].line, 1);
        assert_eq!(diags[0].line_range, LineRange { from: 0, to: 0 });
    }

    #[test]
    fn test_stray_leading_close() {
        let diags = lint("}\nTable a {\n  id int\n}");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, UNEXPECTED_CLOSE);
        assert_eq!(diags[0].line, 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_one_diagnostic_per_stray_close() {
        let text = "Table a { }\n}\n\n}";
        let diags = lint(text);
        let lines: Vec<usize> = diags.iter().map(|d| d.line).collect();
        assert_eq!(lines, vec![2, 4]);
        assert_eq!(diags[1].line_range, LineRange { from: 15, to: 16 });
    }

    #[test]
    fn test_counter_resets_after_stray_close() {
        // the stray `}` must not swallow the later `{`
        let diags = lint("}\n{");
        let messages: Vec<&str> = diags.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, vec![UNEXPECTED_CLOSE, UNMATCHED_OPEN]);
    }

    #[test]
    fn test_line_range_strips_carriage_return() {
        assert_eq!(line_range("ab\r\ncd", 1), Some(LineRange { from: 0, to: 2 }));
        assert_eq!(line_range("ab\r\ncd", 2), Some(LineRange { from: 4, to: 6 }));
        assert_eq!(line_range("ab", 3), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_lint_is_total(input in ".{0,256}") {
            let diags = lint(&input);
            let opens = diags.iter().filter(|d| d.message == UNMATCHED_OPEN).count();
            prop_assert!(opens <= 1);
            for d in &diags {
                prop_assert!(d.line_range.to <= input.len());
            }
        }
    }
}
