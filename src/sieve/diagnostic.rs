/// Structured parse failures.
///
/// A diagnostic is returned as the `Err` side of [`crate::parse`]; no partial
/// tree is ever handed out alongside it.
use serde::{Deserialize, Serialize};

use crate::sieve::ast::{Location, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// Unterminated string or literal, invalid escape, stray character.
    Lexical,
    /// Unexpected token, missing terminator, empty test list.
    Syntax,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedKind {
    /// A literal token such as `";"` or `"elsif"`.
    Literal,
    /// A token class such as `string` or `identifier`.
    Class,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expected {
    pub kind: ExpectedKind,
    pub description: String,
}

impl Expected {
    pub fn literal(text: &str) -> Self {
        Self { kind: ExpectedKind::Literal, description: format!("\"{text}\"") }
    }

    pub fn class(name: &str) -> Self {
        Self { kind: ExpectedKind::Class, description: name.to_string() }
    }

    pub fn end() -> Self {
        Self { kind: ExpectedKind::End, description: "end of input".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error(
    "{} at line {}, column {}",
    .message.trim_end_matches('.'),
    .location.start.line,
    .location.start.column
)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Location,
    /// Source text of the offending token, `None` at end of input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<String>,
    /// Sorted by description, no duplicates.
    #[serde(default)]
    pub expected: Vec<Expected>,
}

impl Diagnostic {
    pub fn lexical(message: impl Into<String>, start: Position, end: Position) -> Self {
        Self {
            kind: DiagnosticKind::Lexical,
            message: message.into(),
            location: Location { start, end },
            found: None,
            expected: Vec::new(),
        }
    }

    /// A PEG-style "expected X but Y found" failure.
    pub fn unexpected(
        location: Location,
        found: Option<String>,
        mut expected: Vec<Expected>,
    ) -> Self {
        expected.sort_by(|a, b| a.description.cmp(&b.description));
        expected.dedup();
        let message = expected_message(&expected, found.as_deref());
        Self { kind: DiagnosticKind::Syntax, message, location, found, expected }
    }

    pub fn syntax(message: impl Into<String>, location: Location, found: Option<String>) -> Self {
        Self {
            kind: DiagnosticKind::Syntax,
            message: message.into(),
            location,
            found,
            expected: Vec::new(),
        }
    }

    pub fn with_expected(mut self, mut expected: Vec<Expected>) -> Self {
        expected.sort_by(|a, b| a.description.cmp(&b.description));
        expected.dedup();
        self.expected = expected;
        self
    }

    pub fn line(&self) -> usize {
        self.location.start.line
    }

    pub fn column(&self) -> usize {
        self.location.start.column
    }

    /// Render the diagnostic against its source with a caret under the
    /// offending column.
    pub fn render(&self, source: &str, origin: &str) -> String {
        let line_no = self.line();
        let text = source.lines().nth(line_no.saturating_sub(1)).unwrap_or("");
        let gutter = line_no.to_string().len();
        let width = if self.location.end.line == line_no {
            self.location.end.column.saturating_sub(self.column()).max(1)
        } else {
            1
        };
        let pad = "";
        let column = self.column();
        let indent = " ".repeat(column.saturating_sub(1));
        let carets = "^".repeat(width);
        format!(
            "error: {}\n\
             {pad:gutter$}--> {origin}:{line_no}:{column}\n\
             {pad:gutter$} |\n\
             {line_no} | {text}\n\
             {pad:gutter$} | {indent}{carets}",
            self.message,
        )
    }
}

fn expected_message(expected: &[Expected], found: Option<&str>) -> String {
    let wanted = match expected {
        [] => "nothing".to_string(),
        [only] => only.description.clone(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|e| e.description.as_str()).collect();
            if init.len() == 1 {
                format!("{} or {}", head[0], last.description)
            } else {
                format!("{}, or {}", head.join(", "), last.description)
            }
        }
    };
    let found = match found {
        Some(text) => format!("\"{}\"", text.escape_debug()),
        None => "end of input".to_string(),
    };
    format!("Expected {wanted} but {found} found.")
}
