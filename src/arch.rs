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

//! The fixed target machine: registers, operations, addressing modes, ARE.

/// First valid memory address.
pub const STARTING_ADDRESS: i32 = 100;

/// Last valid memory address.
pub const MAX_ADDRESS: i32 = 9999;

/// Inclusive bound of a 15-bit signed data value.
pub const DATA_MAX: i32 = 16383;
pub const DATA_MIN: i32 = -16384;

/// Inclusive bound of a 12-bit signed immediate value.
pub const IMMEDIATE_MAX: i32 = 2047;
pub const IMMEDIATE_MIN: i32 = -2048;

/// One of the eight general-purpose registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Register(pub u8);

impl Register {
    pub const COUNT: u8 = 8;

    /// Parses `r0`..`r7`, returning `None` for anything else.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() == 2 && bytes[0] == b'r' && bytes[1].is_ascii_digit() {
            let n = bytes[1] - b'0';
            if n < Self::COUNT {
                return Some(Register(n));
            }
        }
        None
    }
}

/// One of the sixteen fixed operations, numbered per the machine's opcode
/// encoding (`mov` = 0 .. `stop` = 15).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Op {
    Mov, Cmp, Add, Sub, Lea, Clr, Not, Inc,
    Dec, Jmp, Bne, Red, Prn, Jsr, Rts, Stop,
}

impl Op {
    /// Parses a lowercase mnemonic.
    pub fn parse(s: &str) -> Option<Self> {
        use Op::*;
        Some(match s {
            "mov"  => Mov, "cmp" => Cmp, "add" => Add, "sub" => Sub,
            "lea"  => Lea, "clr" => Clr, "not" => Not, "inc" => Inc,
            "dec"  => Dec, "jmp" => Jmp, "bne" => Bne, "red" => Red,
            "prn"  => Prn, "jsr" => Jsr, "rts" => Rts, "stop" => Stop,
            _ => return None,
        })
    }

    /// The 4-bit opcode number encoded into the opcode word.
    pub fn code(self) -> u16 {
        use Op::*;
        match self {
            Mov => 0,  Cmp => 1,  Add => 2,  Sub => 3,
            Lea => 4,  Clr => 5,  Not => 6,  Inc => 7,
            Dec => 8,  Jmp => 9,  Bne => 10, Red => 11,
            Prn => 12, Jsr => 13, Rts => 14, Stop => 15,
        }
    }

    /// The number of operands this operation takes.
    pub fn operand_count(self) -> u8 {
        use Op::*;
        match self {
            Mov | Cmp | Add | Sub | Lea => 2,
            Clr | Not | Inc | Dec | Jmp | Bne | Red | Prn | Jsr => 1,
            Rts | Stop => 0,
        }
    }
}

/// One of the four guidance/declaration directives.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Directive {
    Data, String, Entry, Extern,
}

impl Directive {
    pub fn parse(s: &str) -> Option<Self> {
        use Directive::*;
        Some(match s {
            "data"   => Data,
            "string" => String,
            "entry"  => Entry,
            "extern" => Extern,
            _ => return None,
        })
    }
}

/// Addressing mode, represented as the bitmask the opcode word's `src`/`dst`
/// fields use directly.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AddressingMode {
    Immediate       = 0b0001,
    Direct          = 0b0010,
    IndirectReg     = 0b0100,
    DirectReg       = 0b1000,
}

impl AddressingMode {
    pub fn bits(self) -> u16 {
        self as u16
    }

    pub fn is_register(self) -> bool {
        matches!(self, AddressingMode::DirectReg | AddressingMode::IndirectReg)
    }
}

/// ARE field values (who resolves this word's address).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Are {
    Absolute    = 4,
    Relocatable = 2,
    External    = 1,
}

impl Are {
    pub fn bits(self) -> u16 {
        self as u16
    }
}

/// Truncates a signed value in `[-16384, 16383]` to its 15-bit two's
/// complement bit pattern.
pub fn to_twos_complement_15(v: i32) -> u16 {
    let bits = if v >= 0 {
        v & 0x7FFF
    } else {
        (((!(-v)) & 0x7FFF) + 1) & 0x7FFF
    };
    bits as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_parse() {
        assert_eq!(Register::parse("r0"), Some(Register(0)));
        assert_eq!(Register::parse("r7"), Some(Register(7)));
        assert_eq!(Register::parse("r8"), None);
        assert_eq!(Register::parse("rx"), None);
        assert_eq!(Register::parse("r"), None);
    }

    #[test]
    fn op_parse_and_code() {
        assert_eq!(Op::parse("mov").map(Op::code), Some(0));
        assert_eq!(Op::parse("stop").map(Op::code), Some(15));
        assert_eq!(Op::parse("lea").map(Op::code), Some(4));
        assert_eq!(Op::parse("nope"), None);
    }

    #[test]
    fn operand_counts() {
        assert_eq!(Op::Mov.operand_count(), 2);
        assert_eq!(Op::Inc.operand_count(), 1);
        assert_eq!(Op::Stop.operand_count(), 0);
    }

    #[test]
    fn twos_complement_positive() {
        assert_eq!(to_twos_complement_15(3), 3);
        assert_eq!(to_twos_complement_15(0), 0);
        assert_eq!(to_twos_complement_15(16383), 0x3FFF);
    }

    #[test]
    fn twos_complement_negative() {
        assert_eq!(to_twos_complement_15(-1), 0x7FFF);
        assert_eq!(to_twos_complement_15(-16384), 0x4000);
    }
}
