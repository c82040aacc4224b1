//! User-facing error reports.
//!
//! Every error surfaced to the user should say what went wrong, where in the
//! build graph it happened, and what to try next.

use std::fmt::{self, Write as _};

/// Suggestions shared by several error sites.
pub mod suggestions {
    pub const NO_MANIFEST: &str =
        "Create a `Lattice.toml` at the project root, or run from inside a project";

    pub const TARGET_NOT_FOUND: &str = "Run `lattice targets` to see available targets";

    pub const BREAK_CYCLE: &str = "Break the cycle by removing one of the listed dependencies";
}

const RED: &str = "1;31";
const GREEN: &str = "1;32";

/// An error report: a headline, supporting lines and numbered fixes.
#[derive(Debug, Clone, Default)]
pub struct Diagnostic {
    pub message: String,
    /// Shown as `= ...` lines under the headline
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            ..Diagnostic::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Render for a terminal, with ANSI bold colors when `color` is set.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        writeln!(output, "{}: {}", paint("error", RED, color), self.message).unwrap();
        for line in &self.context {
            writeln!(output, "  = {}", line).unwrap();
        }

        match self.suggestions.as_slice() {
            [] => {}
            [only] => {
                writeln!(output, "{}: {}", paint("help", GREEN, color), only).unwrap();
            }
            many => {
                writeln!(output, "{}: try one of:", paint("help", GREEN, color)).unwrap();
                for (i, suggestion) in many.iter().enumerate() {
                    writeln!(output, "  {}. {}", i + 1, suggestion).unwrap();
                }
            }
        }

        output
    }
}

fn paint(label: &str, code: &str, color: bool) -> String {
    if color {
        format!("\x1b[{}m{}\x1b[0m", code, label)
    } else {
        label.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
