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

//! Macro definition discovery and expansion.

use crate::diagnostic::{DiagnosticCollector, Stage};
use crate::lang::token::{Token, TokenKind};
use crate::text::TextBuffer;

/// A recorded `macr ... endmacr` definition.
struct MacroDef {
    name: String,
    /// Byte offset of the `macr` token that introduced this definition.
    start_offset: usize,
    /// Byte offset of the sentinel (EOL or EOF) immediately following
    /// `endmacr`; the whole definition, including that sentinel, is
    /// skipped verbatim during expansion.
    end_offset: usize,
    content: String,
}

/// Scans `tokens` for `macr` definitions and expands references into a
/// freshly rewritten [`TextBuffer`], ready to be re-lexed.
pub fn preprocess(
    source: &TextBuffer,
    tokens: &[Token],
    diagnostics: &mut DiagnosticCollector,
) -> TextBuffer {
    let macros = collect_macros(source, tokens, diagnostics);

    if diagnostics.has_errors() {
        return TextBuffer::new();
    }

    expand(source, tokens, &macros)
}

fn collect_macros(
    source: &TextBuffer,
    tokens: &[Token],
    diagnostics: &mut DiagnosticCollector,
) -> Vec<MacroDef> {
    let mut macros: Vec<MacroDef> = Vec::new();

    for i in 0..tokens.len() {
        if !matches!(tokens[i].kind, TokenKind::MacroStart) {
            continue;
        }
        if let Some(def) = try_create_macro(source, tokens, i, &macros, diagnostics) {
            macros.push(def);
        }
    }

    macros
}

fn try_create_macro(
    source: &TextBuffer,
    tokens: &[Token],
    macr_index: usize,
    existing: &[MacroDef],
    diagnostics: &mut DiagnosticCollector,
) -> Option<MacroDef> {
    let start_offset = tokens[macr_index].span.offset as usize;

    let id_index = macr_index + 1;
    let id_token = tokens.get(id_index)?;
    if !matches!(id_token.kind, TokenKind::Identifier) {
        diagnostics.report(Stage::Preprocessor, id_token.span, "Expected identifier after MACR");
        return None;
    }
    let name = id_token.text.clone();

    if existing.iter().any(|m| m.name == name) {
        diagnostics.report(Stage::Preprocessor, id_token.span, "Duplicate macro identifier");
        return None;
    }

    let eol_index = id_index + 1;
    let eol_token = tokens.get(eol_index)?;
    if !matches!(eol_token.kind, TokenKind::Eol) {
        diagnostics.report(Stage::Preprocessor, eol_token.span, "Expected newline after macro identifier");
        return None;
    }

    let content_start = eol_token.span.offset as usize + 1;

    let mut j = eol_index + 1;
    let mut found = None;
    while j + 2 < tokens.len() {
        let (a, b, c) = (&tokens[j], &tokens[j + 1], &tokens[j + 2]);
        if matches!(a.kind, TokenKind::Eol)
            && matches!(b.kind, TokenKind::MacroEnd)
            && (matches!(c.kind, TokenKind::Eol) || matches!(c.kind, TokenKind::Eof))
        {
            found = Some((a.span.offset as usize, c.span.offset as usize));
            break;
        }
        j += 1;
    }

    let (content_end_inclusive, end_offset) = match found {
        Some(pair) => pair,
        None => {
            diagnostics.report(
                Stage::Preprocessor,
                tokens[macr_index].span,
                "Invalid or missing ENDMACR",
            );
            return None;
        }
    };

    let content = source.str_slice(content_start, content_end_inclusive + 1).to_string();

    Some(MacroDef { name, start_offset, end_offset, content })
}

fn expand(source: &TextBuffer, tokens: &[Token], macros: &[MacroDef]) -> TextBuffer {
    let mut out = String::new();
    let mut ti = 0usize;
    let mut i = 0usize;
    let len = source.len();

    while i < len {
        if ti < tokens.len() && i == tokens[ti].span.offset as usize {
            if let Some(m) = macros.iter().find(|m| i >= m.start_offset && i <= m.end_offset) {
                i = m.end_offset + 1;
                while ti < tokens.len() && (tokens[ti].span.offset as usize) <= m.end_offset {
                    ti += 1;
                }
                continue;
            }

            if let Some(m) = macros.iter().find(|m| m.name == tokens[ti].text) {
                out.push_str(&m.content);
                i += tokens[ti].text.len();
                ti += 1;
                if ti < tokens.len() && matches!(tokens[ti].kind, TokenKind::Eol) {
                    ti += 1;
                    i += 1;
                }
                continue;
            }

            out.push_str(&tokens[ti].text);
            i += tokens[ti].text.len().max(1);
            ti += 1;
        } else {
            out.push(source.char_at(i) as char);
            i += 1;
        }
    }

    TextBuffer::from_string(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::Lexer;

    fn expand_source(src: &str) -> (String, bool) {
        let buf = TextBuffer::from_string(src.to_string());
        let mut diags = DiagnosticCollector::new();
        let tokens = Lexer::tokenize(&buf, &mut diags);
        let expanded = preprocess(&buf, &tokens, &mut diags);
        (expanded.as_str().to_string(), diags.has_errors())
    }

    #[test]
    fn expands_macro_reference_twice() {
        let (expanded, had_errors) =
            expand_source("macr X\ninc r3\nendmacr\nX\nX\n");
        assert!(!had_errors);
        let count = expanded.matches("inc r3").count();
        assert_eq!(count, 2);
        assert!(!expanded.contains("macr"));
    }

    #[test]
    fn duplicate_macro_identifier_is_error() {
        let (_, had_errors) = expand_source("macr X\ninc r3\nendmacr\nmacr X\ndec r3\nendmacr\n");
        assert!(had_errors);
    }

    #[test]
    fn missing_endmacr_is_error() {
        let (_, had_errors) = expand_source("macr X\ninc r3\n");
        assert!(had_errors);
    }

    #[test]
    fn non_macro_source_passes_through_unchanged() {
        let (expanded, had_errors) = expand_source("MAIN: mov #3, r1\nstop\n");
        assert!(!had_errors);
        assert_eq!(expanded, "MAIN: mov #3, r1\nstop\n");
    }
}
