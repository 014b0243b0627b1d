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

//! Converts source text into a token stream.

use crate::arch::{Directive, Op, Register};
use crate::diagnostic::{DiagnosticCollector, Stage};
use crate::lang::token::{Token, TokenKind};
use crate::text::TextBuffer;
use crate::util::Span;

fn is_whitespace(c: u8) -> bool {
    c == b' ' || c == b'\t' || c == b'\r'
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

/// Letters only — directive names and the first character of an
/// identifier are drawn from this set (underscore is handled separately
/// as the macro-identifier trigger).
fn is_identifier_start(c: u8) -> bool {
    c.is_ascii_alphabetic()
}

fn is_identifier_char(c: u8) -> bool {
    is_identifier_start(c) || is_digit(c)
}

fn is_macro_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Scans a [`TextBuffer`] into a flat token stream, reporting lexical
/// errors into a shared [`DiagnosticCollector`].
pub struct Lexer<'a> {
    source: &'a TextBuffer,
    index: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a TextBuffer) -> Self {
        Self { source, index: 0, line: 1, column: 0 }
    }

    pub fn tokenize(source: &'a TextBuffer, diagnostics: &mut DiagnosticCollector) -> Vec<Token> {
        let mut lexer = Self::new(source);
        lexer.run(diagnostics)
    }

    fn current(&self) -> u8 {
        self.source.char_at(self.index)
    }

    fn at_end(&self) -> bool {
        self.index >= self.source.len()
    }

    fn advance(&mut self) {
        if self.current() == b'\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        self.index += 1;
    }

    fn span_from(&self, start_offset: usize, start_line: u32, start_column: u32) -> Span {
        Span::new(
            start_offset as u32,
            start_line,
            start_column,
            (self.index - start_offset) as u32,
        )
    }

    fn run(&mut self, diagnostics: &mut DiagnosticCollector) -> Vec<Token> {
        let mut tokens = Vec::new();

        loop {
            if self.at_end() {
                let span = Span::new(self.index as u32, self.line, self.column, 0);
                tokens.push(Token::new(TokenKind::Eof, "", span));
                break;
            }

            let c = self.current();

            if is_whitespace(c) {
                self.advance();
            } else if c == b';' {
                self.skip_comment();
            } else if c == b'\n' {
                tokens.push(self.lex_newline());
            } else if matches!(c, b',' | b':' | b'#' | b'*') {
                tokens.push(self.lex_separator());
            } else if is_digit(c) || c == b'+' || c == b'-' {
                tokens.push(self.lex_number(diagnostics));
            } else if c == b'"' {
                tokens.push(self.lex_string(diagnostics));
            } else if c == b'.' {
                tokens.push(self.lex_directive(diagnostics));
            } else if is_identifier_start(c) || c == b'_' {
                tokens.push(self.lex_identifier());
            } else {
                let start = (self.index, self.line, self.column);
                self.advance();
                let span = self.span_from(start.0, start.1, start.2);
                diagnostics.report(Stage::Lexer, span, "unknown char (in the current context)");
            }
        }

        tokens
    }

    fn skip_comment(&mut self) {
        while !self.at_end() && self.current() != b'\n' {
            self.advance();
        }
    }

    fn lex_newline(&mut self) -> Token {
        let start = (self.index, self.line, self.column);
        self.advance();
        let span = self.span_from(start.0, start.1, start.2);
        Token::new(TokenKind::Eol, "\n", span)
    }

    fn lex_separator(&mut self) -> Token {
        let start = (self.index, self.line, self.column);
        let c = self.current();
        self.advance();
        let span = self.span_from(start.0, start.1, start.2);
        let kind = match c {
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'#' => TokenKind::Hashtag,
            b'*' => TokenKind::Star,
            _ => unreachable!(),
        };
        Token::new(kind, (c as char).to_string(), span)
    }

    fn lex_number(&mut self, diagnostics: &mut DiagnosticCollector) -> Token {
        let start = (self.index, self.line, self.column);
        let mut text = String::new();
        let mut first = true;

        while !self.at_end() && (is_digit(self.current()) || (first && matches!(self.current(), b'+' | b'-'))) {
            text.push(self.current() as char);
            self.advance();
            first = false;
        }

        let span = self.span_from(start.0, start.1, start.2);

        if text.len() == 1 && matches!(text.as_bytes()[0], b'+' | b'-') {
            diagnostics.report(
                Stage::Lexer,
                span,
                "it seems that you have a '-' or '+' without any numerical chars after it",
            );
            return Token::new(TokenKind::Error, text, span);
        }

        let value: i32 = text.parse().unwrap_or(0);
        Token::new(TokenKind::Number(value), text, span)
    }

    fn lex_string(&mut self, diagnostics: &mut DiagnosticCollector) -> Token {
        let start = (self.index, self.line, self.column);
        let mut text = String::new();
        let mut closed = false;
        let mut first = true;

        while !self.at_end() {
            let c = self.current();
            if !first && c == b'"' {
                text.push(c as char);
                self.advance();
                closed = true;
                break;
            }
            text.push(c as char);
            self.advance();
            first = false;
        }

        let span = self.span_from(start.0, start.1, start.2);

        if !closed {
            diagnostics.report(Stage::Lexer, span, "There is no string after \"");
            return Token::new(TokenKind::Error, text, span);
        }

        Token::new(TokenKind::String, text, span)
    }

    fn lex_directive(&mut self, diagnostics: &mut DiagnosticCollector) -> Token {
        let start = (self.index, self.line, self.column);
        let mut text = String::new();

        while !self.at_end() && (text.is_empty() || is_identifier_start(self.current())) {
            text.push(self.current() as char);
            self.advance();
        }

        let span = self.span_from(start.0, start.1, start.2);

        match Directive::parse(&text[1..]) {
            Some(d) => Token::new(TokenKind::Directive(d), text, span),
            None => {
                diagnostics.report(Stage::Lexer, span, "Unknown non-operative instruction");
                Token::new(TokenKind::Error, text, span)
            }
        }
    }

    fn lex_identifier(&mut self) -> Token {
        let start = (self.index, self.line, self.column);
        let is_macro = self.current() == b'_';
        let mut text = String::new();

        while !self.at_end() {
            let c = self.current();
            let ok = if is_macro { is_macro_char(c) } else { is_identifier_char(c) };
            if !ok {
                break;
            }
            text.push(c as char);
            self.advance();
        }

        let span = self.span_from(start.0, start.1, start.2);

        let kind = if let Some(r) = Register::parse(&text) {
            TokenKind::Register(r)
        } else if text == "macr" {
            TokenKind::MacroStart
        } else if text == "endmacr" {
            TokenKind::MacroEnd
        } else if let Some(op) = Op::parse(&text) {
            TokenKind::Op(op)
        } else {
            TokenKind::Identifier
        };

        Token::new(kind, text, span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, DiagnosticCollector) {
        let buf = TextBuffer::from_string(src.to_string());
        let mut diags = DiagnosticCollector::new();
        let tokens = Lexer::tokenize(&buf, &mut diags);
        (tokens, diags)
    }

    #[test]
    fn lexes_simple_instruction() {
        let (tokens, diags) = lex("MAIN: mov #3, r1\n");
        assert!(!diags.has_errors());
        let kinds: Vec<_> = tokens.iter().map(|t| &t.kind).collect();
        assert!(matches!(kinds[0], TokenKind::Identifier));
        assert!(matches!(kinds[1], TokenKind::Colon));
        assert!(matches!(kinds[2], TokenKind::Op(Op::Mov)));
        assert!(matches!(kinds[3], TokenKind::Hashtag));
        assert!(matches!(kinds[4], TokenKind::Number(3)));
        assert!(matches!(kinds[5], TokenKind::Comma));
        assert!(matches!(kinds[6], TokenKind::Register(Register(1))));
        assert!(matches!(kinds[7], TokenKind::Eol));
        assert!(matches!(kinds[8], TokenKind::Eof));
    }

    #[test]
    fn comment_produces_no_token() {
        let (tokens, _) = lex("; a comment\nstop\n");
        assert!(matches!(tokens[0].kind, TokenKind::Eol));
        assert!(matches!(tokens[1].kind, TokenKind::Op(Op::Stop)));
    }

    #[test]
    fn lone_sign_is_error() {
        let (tokens, diags) = lex("mov +, r1\n");
        assert!(diags.has_errors());
        assert!(matches!(tokens[1].kind, TokenKind::Error));
    }

    #[test]
    fn unterminated_string_is_error() {
        let (tokens, diags) = lex("\"abc");
        assert!(diags.has_errors());
        assert!(matches!(tokens[0].kind, TokenKind::Error));
    }

    #[test]
    fn unknown_directive_is_error() {
        let (_, diags) = lex(".bogus\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn macro_identifier_allows_underscore() {
        let (tokens, diags) = lex("_MY_MACRO\n");
        assert!(!diags.has_errors());
        assert!(matches!(tokens[0].kind, TokenKind::Identifier));
        assert_eq!(tokens[0].text, "_MY_MACRO");
    }

    #[test]
    fn unknown_char_reports_and_skips() {
        let (tokens, diags) = lex("@\nstop\n");
        assert!(diags.has_errors());
        assert!(matches!(tokens[0].kind, TokenKind::Eol));
    }

    #[test]
    fn negative_number_literal() {
        let (tokens, diags) = lex("-17\n");
        assert!(!diags.has_errors());
        assert!(matches!(tokens[0].kind, TokenKind::Number(-17)));
    }
}
