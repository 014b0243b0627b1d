// This file is part of asmforge, an assembler.
// Copyright (C) 2020 Jeff Sharp
//
// asmforge is free software: you can redistribute it and/or modify it
// under the terms of the GNU General Public License as published
// by the Free Software Foundation, either version 3 of the License,
// or (at your option) any later version.
//
// asmforge is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with asmforge.  If not, see <http://www.gnu.org/licenses/>.

//! Source-anchored assembly diagnostics.
//!
//! Distinct from the driver's filesystem-boundary errors (see
//! [`crate::session::DriverError`]): a [`Diagnostic`] always carries a
//! location within one source file and is rendered in the fixed
//! `path:line:col: Stage Error: message` wire format, never through `log`.

use std::fmt::{self, Display, Formatter};
use crate::util::Span;

/// Which pipeline stage raised a diagnostic.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stage {
    Lexer,
    Preprocessor,
    Parser,
    Semantic,
    CodeGenerator,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(match self {
            Stage::Lexer         => "Lexer",
            Stage::Preprocessor  => "Preprocessor",
            Stage::Parser        => "Parser",
            Stage::Semantic      => "Semantic",
            Stage::CodeGenerator => "Code Generator",
        })
    }
}

/// A single reported error, anchored either to a token span or to a single
/// offending character.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub stage: Stage,
    pub span: Span,
    pub message: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, span: Span, message: impl Into<String>) -> Self {
        Self { stage, span, message: message.into() }
    }

    /// Renders this diagnostic against `path` and the original source text,
    /// per the wire format: a header line, a source excerpt, and a
    /// caret/tilde alignment line. No color is applied.
    pub fn render(&self, path: &str, source: &str) -> String {
        let loc = self.span.location();
        let mut out = format!(
            "{}:{}:{}: {} Error: {}\n",
            path, loc.line, loc.column, self.stage, self.message
        );

        if let Some(line_text) = source.lines().nth(self.span.line.saturating_sub(1) as usize) {
            let line_num = self.span.line.to_string();
            let gutter_w = line_num.len();

            out.push_str(&format!("    {} | {}\n", line_num, line_text));

            let col = self.span.column as usize;
            let len = (self.span.len as usize).max(1);
            let mut marker = String::new();
            marker.push_str("    ");
            marker.push_str(&" ".repeat(gutter_w));
            marker.push_str(" | ");
            marker.push_str(&" ".repeat(col));
            marker.push('^');
            if len > 1 {
                marker.push_str(&"~".repeat(len - 1));
            }
            out.push_str(&marker);
            out.push('\n');
        }

        out
    }
}

/// Accumulates diagnostics for one file's pipeline run. Shared, mutated
/// append-only, by every stage (per spec §5).
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, stage: Stage, span: Span, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(stage, span, message));
    }

    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn render_all(&self, path: &str, source: &str) -> String {
        self.diagnostics.iter().map(|d| d.render(path, source)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Span;

    #[test]
    fn render_basic() {
        let mut c = DiagnosticCollector::new();
        c.report(Stage::Lexer, Span::new(5, 1, 5, 1), "unknown character");
        let rendered = c.render_all("foo.as", "A: mvo r1\n");
        assert!(rendered.starts_with("foo.as:1:6: Lexer Error: unknown character\n"));
        assert!(rendered.contains("1 | A: mvo r1"));
        assert!(rendered.contains("^"));
    }

    #[test]
    fn render_caret_aligns_with_target_char() {
        let mut c = DiagnosticCollector::new();
        c.report(Stage::Lexer, Span::new(5, 1, 5, 1), "unknown character");
        let rendered = c.render_all("foo.as", "A: mvo r1\n");
        let lines: Vec<&str> = rendered.lines().collect();
        let excerpt = lines[1];
        let marker = lines[2];

        let pipe_excerpt = excerpt.find('|').expect("excerpt has a gutter separator");
        let pipe_marker = marker.find('|').expect("marker has a gutter separator");
        assert_eq!(pipe_excerpt, pipe_marker, "gutter separators must line up");

        let text_start = pipe_excerpt + 2; // past "| "
        let caret = marker.find('^').expect("marker has a caret");
        assert_eq!(caret, text_start + 5, "caret must sit under the span's first character");
        assert_eq!(excerpt.as_bytes()[caret], b'o');
    }

    #[test]
    fn collector_tracks_errors() {
        let mut c = DiagnosticCollector::new();
        assert!(!c.has_errors());
        c.report(Stage::Parser, Span::new(0, 1, 0, 1), "bad");
        assert!(c.has_errors());
        assert_eq!(c.len(), 1);
    }
}
