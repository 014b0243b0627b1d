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

//! Drives one source file through the full pipeline: lex, preprocess,
//! re-lex, parse, analyze, generate. Halts at the first stage that
//! accumulates any diagnostic, mirroring the two-pass assembler's own
//! "errors anywhere mean no output anywhere" contract.

use std::fs;

use crate::codegen::{self, CodegenOutput};
use crate::diagnostic::DiagnosticCollector;
use crate::lang::lexer::Lexer;
use crate::lang::parser;
use crate::lang::preprocessor;
use crate::semantic;
use crate::text::TextBuffer;

/// Errors that occur at the filesystem boundary, outside the span-anchored
/// diagnostics a [`DiagnosticCollector`] carries.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("could not read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("could not write {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },
}

/// The result of running one file through the pipeline: either the
/// generated artifacts, or a non-empty set of diagnostics explaining why
/// generation did not complete.
pub struct Session {
    pub source: String,
    pub diagnostics: DiagnosticCollector,
    pub output: Option<CodegenOutput>,
}

impl Session {
    /// Runs `source` through every stage, stopping as soon as one stage
    /// reports an error. `source` is kept on the returned `Session` so the
    /// caller can render diagnostics against it afterward.
    pub fn run(source: &str) -> Self {
        let mut diagnostics = DiagnosticCollector::new();
        let buffer = TextBuffer::from_string(source.to_string());
        let source = source.to_string();

        macro_rules! halt_on_error {
            () => {
                if diagnostics.has_errors() {
                    return Self { source, diagnostics, output: None };
                }
            };
        }

        let tokens = Lexer::tokenize(&buffer, &mut diagnostics);
        halt_on_error!();

        let expanded = preprocessor::preprocess(&buffer, &tokens, &mut diagnostics);
        halt_on_error!();

        let tokens = Lexer::tokenize(&expanded, &mut diagnostics);
        halt_on_error!();

        let mut unit = parser::parse(tokens, &mut diagnostics);
        halt_on_error!();

        let symbols = semantic::analyze(&unit, &mut diagnostics);
        halt_on_error!();

        codegen::assign_positions(&mut unit, &mut diagnostics);
        halt_on_error!();

        let output = codegen::generate(&unit, &symbols, &mut diagnostics);
        Self { source, diagnostics, output }
    }

    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// Reads `<base>.as`, assembles it, and — on success — writes
/// `<base>.ob`, plus `<base>.ent`/`<base>.ext` when those sections are
/// non-empty. Returns the session so the caller can render diagnostics
/// regardless of outcome.
pub fn assemble_file(base: &str) -> Result<Session, DriverError> {
    let source_path = format!("{base}.as");
    let source = fs::read_to_string(&source_path)
        .map_err(|source_err| DriverError::Read { path: source_path.clone(), source: source_err })?;

    let session = Session::run(&source);

    if let Some(output) = &session.output {
        write_artifact(base, "ob", &output.object_file)?;

        if !output.entry_file.is_empty() {
            write_artifact(base, "ent", &output.entry_file)?;
        }
        if !output.external_file.is_empty() {
            write_artifact(base, "ext", &output.external_file)?;
        }
    }

    Ok(session)
}

fn write_artifact(base: &str, extension: &str, content: &str) -> Result<(), DriverError> {
    let path = format!("{base}.{extension}");
    fs::write(&path, content).map_err(|source| DriverError::Write { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_program_succeeds() {
        let session = Session::run("MAIN: mov #3, r1\nstop\n");
        assert!(session.succeeded());
        assert!(!session.diagnostics.has_errors());
    }

    #[test]
    fn lexer_error_halts_before_later_stages() {
        let session = Session::run("MAIN: @ r1\nstop\n");
        assert!(!session.succeeded());
        assert!(session.diagnostics.has_errors());
    }

    #[test]
    fn semantic_error_halts_before_codegen() {
        let session = Session::run(".entry MISSING\nMAIN: stop\n");
        assert!(!session.succeeded());
        assert!(session.diagnostics.has_errors());
    }
}
