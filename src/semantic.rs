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

//! Symbol table construction and per-operation validation.
//!
//! Runs only once the parser has produced a translation unit with no
//! accumulated errors. Builds the symbol table in four passes — instruction
//! labels, guidance labels, externals, entries — then validates every
//! instruction's operand count, addressing modes, and value ranges against
//! it.

use crate::arch::{AddressingMode, Op, DATA_MAX, DATA_MIN, IMMEDIATE_MAX, IMMEDIATE_MIN};
use crate::diagnostic::{DiagnosticCollector, Stage};
use crate::lang::ast::{GuidanceNode, InstructionNode, TokenIdx, TranslationUnit};
use crate::lang::token::{Token, TokenKind};
use crate::mem::symtab::{SymbolRef, SymbolTable};

/// Builds the symbol table for `unit` and validates every instruction and
/// data literal against it, reporting into `diagnostics`.
pub fn analyze(unit: &TranslationUnit, diagnostics: &mut DiagnosticCollector) -> SymbolTable {
    let hint = (unit.instruction_labels.len() + unit.guidance_labels.len() + unit.externals.len()).max(1);
    let mut symbols = SymbolTable::with_capacity_hint(hint);

    for (i, label) in unit.instruction_labels.iter().enumerate() {
        if let Some(tok) = label.label_token {
            insert_label(unit, &mut symbols, tok, SymbolRef::InstructionLabel(i as u32), diagnostics);
        }
    }
    for (i, label) in unit.guidance_labels.iter().enumerate() {
        if let Some(tok) = label.label_token {
            insert_label(unit, &mut symbols, tok, SymbolRef::GuidanceLabel(i as u32), diagnostics);
        }
    }
    for (i, ext) in unit.externals.iter().enumerate() {
        if let Some(tok) = ext.name_token {
            insert_external(unit, &mut symbols, tok, i as u32, diagnostics);
        }
    }
    for entry in &unit.entries {
        if let Some(tok) = entry.name_token {
            validate_entry(unit, &mut symbols, tok, diagnostics);
        }
    }

    for label in &unit.instruction_labels {
        for instr in &label.instructions {
            check_instruction(unit, instr, &symbols, diagnostics);
        }
    }
    for label in &unit.guidance_labels {
        for g in &label.guidance {
            if let GuidanceNode::Data(d) = g {
                for &num in &d.numbers {
                    check_data_value(unit, num, diagnostics);
                }
            }
        }
    }

    symbols
}

fn insert_label(
    unit: &TranslationUnit,
    symbols: &mut SymbolTable,
    name_token: TokenIdx,
    reference: SymbolRef,
    diagnostics: &mut DiagnosticCollector,
) {
    let token = unit.token(name_token);
    if symbols.insert(&token.text, reference).is_err() {
        diagnostics.report(Stage::Semantic, token.span, "Duplicate label declaration");
    }
}

fn insert_external(
    unit: &TranslationUnit,
    symbols: &mut SymbolTable,
    name_token: TokenIdx,
    index: u32,
    diagnostics: &mut DiagnosticCollector,
) {
    let token = unit.token(name_token);
    match symbols.lookup(&token.text) {
        Some(existing) if existing.reference.is_label() => {
            diagnostics.report(Stage::Semantic, token.span, "Identifier is already declared as a label");
        }
        Some(_) => {
            diagnostics.report(Stage::Semantic, token.span, "Duplicate external declaration");
        }
        None => {
            symbols.insert(&token.text, SymbolRef::External(index)).expect("checked above");
        }
    }
}

fn validate_entry(
    unit: &TranslationUnit,
    symbols: &mut SymbolTable,
    name_token: TokenIdx,
    diagnostics: &mut DiagnosticCollector,
) {
    let token = unit.token(name_token);
    match symbols.lookup_mut(&token.text) {
        None => {
            diagnostics.report(Stage::Semantic, token.span, "Entry identifier is not defined");
        }
        Some(sym) if sym.reference.is_external() => {
            diagnostics.report(Stage::Semantic, token.span, "Entry identifier cannot be external");
        }
        Some(sym) => {
            sym.is_entry = true;
        }
    }
}

/// The addressing mode implied by a token's kind and whether it was
/// dereferenced. `None` for the two combinations that are never valid (a
/// dereferenced number or identifier) — callers with a diagnostics sink
/// report those themselves; the code generator never sees them, since it
/// only runs once this module has already rejected them.
///
/// Shared between semantic validation and code generation (both the
/// operand sizing pass and the encoding pass) so the two can never diverge
/// on what an operand's addressing mode is.
pub(crate) fn operand_kind(token: &Token, dereferenced: bool) -> Option<AddressingMode> {
    match (&token.kind, dereferenced) {
        (TokenKind::Number(_), false) => Some(AddressingMode::Immediate),
        (TokenKind::Number(_), true) => None,
        (TokenKind::Identifier, false) => Some(AddressingMode::Direct),
        (TokenKind::Identifier, true) => None,
        (TokenKind::Register(_), true) => Some(AddressingMode::IndirectReg),
        (TokenKind::Register(_), false) => Some(AddressingMode::DirectReg),
        _ => unreachable!("the parser admits only number, identifier, or register operand tokens"),
    }
}

/// Classifies an operand token into its addressing mode. Returns `None`
/// (after reporting) for the two invalid combinations: a dereferenced
/// number or a dereferenced identifier.
fn classify(
    unit: &TranslationUnit,
    idx: TokenIdx,
    dereferenced: bool,
    diagnostics: &mut DiagnosticCollector,
) -> Option<AddressingMode> {
    let token = unit.token(idx);
    match operand_kind(token, dereferenced) {
        Some(mode) => Some(mode),
        None => {
            let message = match &token.kind {
                TokenKind::Number(_) => "A numeric operand cannot be dereferenced",
                TokenKind::Identifier => "An identifier operand cannot be dereferenced",
                _ => unreachable!("operand_kind only returns None for number/identifier"),
            };
            diagnostics.report(Stage::Semantic, token.span, message);
            None
        }
    }
}

/// Range- or existence-checks an operand once its addressing mode is known.
fn validate_operand_value(
    unit: &TranslationUnit,
    idx: TokenIdx,
    mode: AddressingMode,
    symbols: &SymbolTable,
    diagnostics: &mut DiagnosticCollector,
) {
    let token = unit.token(idx);
    match mode {
        AddressingMode::Immediate => {
            if let TokenKind::Number(v) = &token.kind {
                let v = *v;
                if v < IMMEDIATE_MIN || v > IMMEDIATE_MAX {
                    diagnostics.report(Stage::Semantic, token.span, "Immediate value out of range");
                }
            }
        }
        AddressingMode::Direct => {
            if !symbols.contains(&token.text) {
                diagnostics.report(Stage::Semantic, token.span, format!("Unknown identifier '{}'", token.text));
            }
        }
        AddressingMode::DirectReg | AddressingMode::IndirectReg => {}
    }
}

fn check_data_value(unit: &TranslationUnit, idx: TokenIdx, diagnostics: &mut DiagnosticCollector) {
    let token = unit.token(idx);
    if let TokenKind::Number(v) = &token.kind {
        let v = *v;
        if v < DATA_MIN || v > DATA_MAX {
            diagnostics.report(Stage::Semantic, token.span, "Data value out of range");
        }
    }
}

fn check_instruction(
    unit: &TranslationUnit,
    instr: &InstructionNode,
    symbols: &SymbolTable,
    diagnostics: &mut DiagnosticCollector,
) {
    let op = match &unit.token(instr.op_token).kind {
        TokenKind::Op(o) => *o,
        _ => unreachable!("instruction nodes are only built over operation tokens"),
    };
    let op_span = unit.token(instr.op_token).span;

    let expected = op.operand_count();
    let actual = instr.first_operand.is_some() as u8 + instr.second_operand.is_some() as u8;
    if actual != expected {
        diagnostics.report(Stage::Semantic, op_span, "Invalid operand count for this instruction");
        return;
    }

    match expected {
        0 => {}
        1 => {
            let idx = instr.first_operand.unwrap();
            let deref = instr.first_dereferenced;
            let Some(mode) = classify(unit, idx, deref, diagnostics) else { return };
            validate_operand_value(unit, idx, mode, symbols, diagnostics);
            check_single_operand_mode(unit, op, idx, mode, diagnostics);
        }
        2 => {
            let src_idx = instr.first_operand.unwrap();
            let dst_idx = instr.second_operand.unwrap();
            let src_mode = classify(unit, src_idx, instr.first_dereferenced, diagnostics);
            let dst_mode = classify(unit, dst_idx, instr.second_dereferenced, diagnostics);
            let (Some(src_mode), Some(dst_mode)) = (src_mode, dst_mode) else { return };
            validate_operand_value(unit, src_idx, src_mode, symbols, diagnostics);
            validate_operand_value(unit, dst_idx, dst_mode, symbols, diagnostics);
            check_two_operand_modes(unit, op, src_idx, src_mode, dst_idx, dst_mode, diagnostics);
        }
        _ => unreachable!("no defined operation takes more than two operands"),
    }
}

fn check_single_operand_mode(
    unit: &TranslationUnit,
    op: Op,
    idx: TokenIdx,
    mode: AddressingMode,
    diagnostics: &mut DiagnosticCollector,
) {
    let span = unit.token(idx).span;
    let allowed = match op {
        Op::Clr | Op::Not | Op::Inc | Op::Dec | Op::Red => mode != AddressingMode::Immediate,
        Op::Jmp | Op::Bne | Op::Jsr => matches!(mode, AddressingMode::Direct | AddressingMode::IndirectReg),
        Op::Prn => true,
        _ => unreachable!("operation has a one-operand legality rule only if operand_count() == 1"),
    };
    if !allowed {
        let message = if mode == AddressingMode::Immediate {
            "Operand cannot be immediate for this instruction"
        } else {
            "Invalid addressing mode for this instruction"
        };
        diagnostics.report(Stage::Semantic, span, message);
    }
}

fn check_two_operand_modes(
    unit: &TranslationUnit,
    op: Op,
    src_idx: TokenIdx,
    src_mode: AddressingMode,
    dst_idx: TokenIdx,
    dst_mode: AddressingMode,
    diagnostics: &mut DiagnosticCollector,
) {
    let src_span = unit.token(src_idx).span;
    let dst_span = unit.token(dst_idx).span;

    match op {
        Op::Mov | Op::Add | Op::Sub => {
            if dst_mode == AddressingMode::Immediate {
                diagnostics.report(Stage::Semantic, dst_span, "Operand cannot be immediate for this instruction");
            }
        }
        Op::Cmp => {
            if src_mode == AddressingMode::Immediate && dst_mode == AddressingMode::Immediate {
                diagnostics.report(
                    Stage::Semantic,
                    dst_span,
                    "Both operands cannot be immediate for this instruction",
                );
            }
        }
        Op::Lea => {
            if src_mode != AddressingMode::Direct {
                diagnostics.report(Stage::Semantic, src_span, "Invalid addressing mode for this instruction");
            }
            if !dst_mode.is_register() {
                diagnostics.report(Stage::Semantic, dst_span, "Invalid addressing mode for this instruction");
            }
        }
        _ => unreachable!("operation has a two-operand legality rule only if operand_count() == 2"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::Lexer;
    use crate::lang::parser;
    use crate::text::TextBuffer;

    fn analyze_source(src: &str) -> (SymbolTable, DiagnosticCollector) {
        let buf = TextBuffer::from_string(src.to_string());
        let mut diags = DiagnosticCollector::new();
        let tokens = Lexer::tokenize(&buf, &mut diags);
        let unit = parser::parse(tokens, &mut diags);
        assert!(!diags.has_errors(), "fixture must parse cleanly");
        let symbols = analyze(&unit, &mut diags);
        (symbols, diags)
    }

    #[test]
    fn accepts_well_formed_program() {
        let (symbols, diags) = analyze_source("MAIN: mov #3, r1\nstop\n");
        assert!(!diags.has_errors());
        assert!(symbols.contains("MAIN"));
    }

    #[test]
    fn rejects_immediate_destination() {
        let (_, diags) = analyze_source("A: mov r1, #2\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn rejects_both_immediate_for_cmp() {
        let (_, diags) = analyze_source("A: cmp #1, #2\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn lea_requires_direct_source() {
        let (_, diags) = analyze_source("A: lea r1, r2\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn jmp_rejects_direct_register_operand() {
        let (_, diags) = analyze_source("A: jmp r1\nstop\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn unknown_identifier_is_rejected() {
        let (_, diags) = analyze_source("A: jmp MISSING\nstop\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn duplicate_label_is_rejected() {
        let (_, diags) = analyze_source("A: stop\nA: stop\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn extern_conflicting_with_label_is_rejected() {
        let (_, diags) = analyze_source("A: stop\n.extern A\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn entry_of_undefined_identifier_is_rejected() {
        let (_, diags) = analyze_source(".entry MISSING\nA: stop\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn entry_of_external_is_rejected() {
        let (_, diags) = analyze_source(".extern A\n.entry A\nB: stop\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn immediate_out_of_range_is_rejected() {
        let (_, diags) = analyze_source("A: mov #99999, r1\n");
        assert!(diags.has_errors());
    }

    #[test]
    fn data_value_out_of_range_is_rejected() {
        let (_, diags) = analyze_source("A: .data 99999\n");
        assert!(diags.has_errors());
    }
}
