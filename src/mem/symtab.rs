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

//! An open-addressed symbol table keyed by identifier text.
//!
//! Entries reference their defining node by index rather than by pointer:
//! the table outlives no one and owns nothing beyond the identifier string
//! itself.

/// What a symbol table entry refers back to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolRef {
    /// Index into [`crate::lang::ast::TranslationUnit::instruction_labels`].
    InstructionLabel(u32),
    /// Index into [`crate::lang::ast::TranslationUnit::guidance_labels`].
    GuidanceLabel(u32),
    /// Index into [`crate::lang::ast::TranslationUnit::externals`].
    External(u32),
}

impl SymbolRef {
    pub fn is_external(self) -> bool {
        matches!(self, SymbolRef::External(_))
    }

    pub fn is_label(self) -> bool {
        !self.is_external()
    }
}

/// One symbol table cell.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub reference: SymbolRef,
    /// Set once the name has been validated by an `.entry` declaration.
    pub is_entry: bool,
}

/// djb2 variant: `h = 5381`, then `h = h*33 + b` for every byte.
fn hash(name: &str) -> u64 {
    let mut h: u64 = 5381;
    for &b in name.as_bytes() {
        h = h.wrapping_mul(33).wrapping_add(b as u64);
    }
    h
}

/// Returned when an insert collides with an existing name.
#[derive(Debug)]
pub struct DuplicateSymbol;

/// Open-addressed, linearly-probed symbol table. Capacity is fixed at
/// construction; callers size it at `ceil(n/0.75)+1` for `n` the upper
/// bound of identifiers the unit can define.
pub struct SymbolTable {
    slots: Vec<Option<Symbol>>,
}

impl SymbolTable {
    /// `capacity_hint` is the expected number of entries (`n` above); the
    /// backing table is sized to keep the table under 75% full.
    pub fn with_capacity_hint(capacity_hint: usize) -> Self {
        let capacity = (capacity_hint * 4 + 2) / 3 + 1;
        let capacity = capacity.max(1);
        Self { slots: vec![None; capacity] }
    }

    fn probe_sequence(&self, name: &str) -> impl Iterator<Item = usize> + '_ {
        let start = (hash(name) as usize) % self.slots.len();
        let len = self.slots.len();
        (0..len).map(move |i| (start + i) % len)
    }

    /// Looks up `name`, returning its entry if present.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        for i in self.probe_sequence(name) {
            match &self.slots[i] {
                Some(sym) if sym.name == name => return Some(sym),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let indices: Vec<usize> = self.probe_sequence(name).collect();
        for i in indices {
            match &self.slots[i] {
                Some(sym) if sym.name == name => return self.slots[i].as_mut(),
                Some(_) => continue,
                None => return None,
            }
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Inserts `name` bound to `reference`. Fails if the name is already
    /// present; the table itself is never grown past its construction
    /// size (a full table is a caller sizing error, not a runtime
    /// condition this assembler needs to recover from).
    pub fn insert(&mut self, name: &str, reference: SymbolRef) -> Result<(), DuplicateSymbol> {
        let indices: Vec<usize> = self.probe_sequence(name).collect();
        let mut first_empty = None;

        for i in indices {
            match &self.slots[i] {
                Some(sym) if sym.name == name => return Err(DuplicateSymbol),
                Some(_) => continue,
                None => {
                    first_empty = Some(i);
                    break;
                }
            }
        }

        let slot = first_empty.expect("symbol table sized below its declared capacity hint");
        self.slots[slot] = Some(Symbol { name: name.to_string(), reference, is_entry: false });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut t = SymbolTable::with_capacity_hint(4);
        t.insert("MAIN", SymbolRef::InstructionLabel(0)).unwrap();
        t.insert("NUMS", SymbolRef::GuidanceLabel(1)).unwrap();
        assert_eq!(t.lookup("MAIN").unwrap().reference, SymbolRef::InstructionLabel(0));
        assert_eq!(t.lookup("NUMS").unwrap().reference, SymbolRef::GuidanceLabel(1));
        assert!(t.lookup("MISSING").is_none());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut t = SymbolTable::with_capacity_hint(4);
        t.insert("MAIN", SymbolRef::InstructionLabel(0)).unwrap();
        assert!(t.insert("MAIN", SymbolRef::External(2)).is_err());
    }

    #[test]
    fn entry_flag_round_trips() {
        let mut t = SymbolTable::with_capacity_hint(4);
        t.insert("MAIN", SymbolRef::InstructionLabel(0)).unwrap();
        t.lookup_mut("MAIN").unwrap().is_entry = true;
        assert!(t.lookup("MAIN").unwrap().is_entry);
    }

    #[test]
    fn probing_survives_collisions() {
        let mut t = SymbolTable::with_capacity_hint(1);
        t.insert("A", SymbolRef::InstructionLabel(0)).unwrap();
        t.insert("B", SymbolRef::InstructionLabel(1)).unwrap();
        t.insert("C", SymbolRef::InstructionLabel(2)).unwrap();
        assert_eq!(t.lookup("A").unwrap().reference, SymbolRef::InstructionLabel(0));
        assert_eq!(t.lookup("B").unwrap().reference, SymbolRef::InstructionLabel(1));
        assert_eq!(t.lookup("C").unwrap().reference, SymbolRef::InstructionLabel(2));
    }
}
