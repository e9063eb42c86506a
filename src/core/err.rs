// src/core/err.rs

use colored::Colorize;
use thiserror::Error;

use crate::core::location::{FileId, LocationRange};
use crate::core::token::Token;

/// Gives diagnostics access to the text of loaded files so an error can be
/// rendered with its offending source line. Implemented by the input-file
/// manager.
pub trait SourceAccess {
    /// User-visible name for a file, e.g. `//base/BUILD.gird`.
    fn file_label(&self, id: FileId) -> Option<String>;

    /// Full contents of the file, if it is still known.
    fn file_contents(&self, id: FileId) -> Option<String>;
}

/// A diagnostic produced by any stage of evaluation. Carries a primary
/// range, an optional help text, extra ranges highlighted alongside the
/// primary one, and nested sub-errors ("Previously defined here." and the
/// like).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BuildError {
    pub range: LocationRange,
    pub message: String,
    pub help: String,
    pub sub_errors: Vec<BuildError>,
    pub extra_ranges: Vec<LocationRange>,
}

impl BuildError {
    pub fn new(range: LocationRange, message: impl Into<String>) -> Self {
        Self {
            range,
            message: message.into(),
            help: String::new(),
            sub_errors: Vec::new(),
            extra_ranges: Vec::new(),
        }
    }

    pub fn with_help(range: LocationRange, message: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            range,
            message: message.into(),
            help: help.into(),
            sub_errors: Vec::new(),
            extra_ranges: Vec::new(),
        }
    }

    pub fn at_token(token: &Token, message: impl Into<String>) -> Self {
        Self::new(token.range, message)
    }

    pub fn at_token_with_help(
        token: &Token,
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self::with_help(token.range, message, help)
    }

    /// A diagnostic with no location, for failures before any file is read.
    pub fn bare(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::with_help(LocationRange::none(), message, help)
    }

    pub fn append_sub_error(&mut self, sub: BuildError) {
        self.sub_errors.push(sub);
    }

    pub fn with_sub(mut self, sub: BuildError) -> Self {
        self.sub_errors.push(sub);
        self
    }

    pub fn append_range(&mut self, range: LocationRange) {
        self.extra_ranges.push(range);
    }

    /// Renders the error the way the user sees it: message, source line with
    /// a caret under the blamed span, help text, then indented sub-errors.
    pub fn render(&self, sources: &dyn SourceAccess) -> String {
        let mut out = String::new();
        self.render_into(&mut out, sources, 0);
        out
    }

    pub fn print(&self, sources: &dyn SourceAccess) {
        eprint!("{}", self.render(sources));
    }

    fn render_into(&self, out: &mut String, sources: &dyn SourceAccess, depth: usize) {
        let indent = "  ".repeat(depth);
        let header = if depth == 0 {
            format!("{} ", "ERROR".red().bold())
        } else {
            String::new()
        };

        if self.range.is_none() {
            out.push_str(&format!("{indent}{header}{}\n", self.message));
        } else {
            let file = sources
                .file_label(self.range.begin.file)
                .unwrap_or_else(|| "<unknown>".to_string());
            out.push_str(&format!(
                "{indent}{header}at {}:{}:{}: {}\n",
                file, self.range.begin.line, self.range.begin.column, self.message
            ));
            self.render_source_line(out, sources, &indent, self.range);
            for extra in &self.extra_ranges {
                self.render_source_line(out, sources, &indent, *extra);
            }
        }

        if !self.help.is_empty() {
            for line in self.help.lines() {
                out.push_str(&format!("{indent}{line}\n"));
            }
        }

        for sub in &self.sub_errors {
            sub.render_into(out, sources, depth + 1);
        }
    }

    fn render_source_line(
        &self,
        out: &mut String,
        sources: &dyn SourceAccess,
        indent: &str,
        range: LocationRange,
    ) {
        let Some(contents) = sources.file_contents(range.begin.file) else {
            return;
        };
        let Some(line) = contents.lines().nth(range.begin.line as usize - 1) else {
            return;
        };

        out.push_str(&format!("{indent}{line}\n"));

        let caret_start = range.begin.column.saturating_sub(1) as usize;
        let caret_len = if range.end.line == range.begin.line {
            (range.end.column.saturating_sub(range.begin.column)).max(1) as usize
        } else {
            1
        };
        out.push_str(indent);
        out.push_str(&" ".repeat(caret_start));
        out.push_str(&format!("{}\n", "^".repeat(caret_len).red()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::location::Location;
    use std::collections::HashMap;

    struct FakeSources(HashMap<FileId, (String, String)>);

    impl SourceAccess for FakeSources {
        fn file_label(&self, id: FileId) -> Option<String> {
            self.0.get(&id).map(|(name, _)| name.clone())
        }
        fn file_contents(&self, id: FileId) -> Option<String> {
            self.0.get(&id).map(|(_, c)| c.clone())
        }
    }

    #[test]
    fn render_includes_line_and_caret() {
        colored::control::set_override(false);
        let id = FileId(0);
        let mut files = HashMap::new();
        files.insert(id, ("//BUILD.gird".to_string(), "x = doom\n".to_string()));
        let sources = FakeSources(files);

        let range = LocationRange::new(Location::new(id, 1, 5), Location::new(id, 1, 9));
        let err = BuildError::with_help(range, "Undefined identifier", "Define it first.");
        let rendered = err.render(&sources);

        assert!(rendered.contains("//BUILD.gird:1:5"));
        assert!(rendered.contains("x = doom"));
        assert!(rendered.contains("    ^^^^"));
        assert!(rendered.contains("Define it first."));
    }

    #[test]
    fn sub_errors_render_indented() {
        colored::control::set_override(false);
        let sources = FakeSources(HashMap::new());
        let err = BuildError::bare("Value collision.", "")
            .with_sub(BuildError::bare("defined here.", ""));
        let rendered = err.render(&sources);
        assert!(rendered.contains("Value collision."));
        assert!(rendered.contains("  defined here."));
    }
}
