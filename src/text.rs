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

//! A growable text buffer over raw source bytes.

/// An append-friendly wrapper over a source file's bytes.
///
/// Out-of-range reads return `'\0'`, mirroring the end-of-input sentinel
/// the lexer dispatches on. Growth is whatever `String`'s own doubling
/// policy provides.
#[derive(Clone, Debug, Default)]
pub struct TextBuffer {
    bytes: Vec<u8>,
}

impl TextBuffer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn from_string(s: String) -> Self {
        Self { bytes: s.into_bytes() }
    }

    pub fn push(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn push_str(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Byte at `index`, or `'\0'` if `index` is out of range.
    pub fn char_at(&self, index: usize) -> u8 {
        self.bytes.get(index).copied().unwrap_or(0)
    }

    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start..end.min(self.bytes.len())]
    }

    /// The substring `[start, end)` as a `&str`. Panics on non-UTF-8
    /// content or a non-char-boundary split, neither of which arise for
    /// the ASCII-only source grammar this assembler accepts.
    pub fn str_slice(&self, start: usize, end: usize) -> &str {
        std::str::from_utf8(self.slice(start, end)).expect("source is ASCII")
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).expect("source is ASCII")
    }
}

impl From<String> for TextBuffer {
    fn from(s: String) -> Self {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_at_in_range() {
        let buf = TextBuffer::from_string("abc".to_string());
        assert_eq!(buf.char_at(0), b'a');
        assert_eq!(buf.char_at(2), b'c');
    }

    #[test]
    fn char_at_out_of_range_reads_null() {
        let buf = TextBuffer::from_string("ab".to_string());
        assert_eq!(buf.char_at(2), 0);
        assert_eq!(buf.char_at(1000), 0);
    }

    #[test]
    fn push_grows_buffer() {
        let mut buf = TextBuffer::new();
        buf.push_str("hi");
        buf.push(b'!');
        assert_eq!(buf.as_str(), "hi!");
        assert_eq!(buf.len(), 3);
    }
}
