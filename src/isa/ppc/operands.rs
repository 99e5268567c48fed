//! PPC operand syntax.
//!
//! Mirrors the operand-type table in `cctools`'s `as/ppc.c`
//! (`GREG`/`G0REG`/`FREG`/`VREG`/`SGREG`/`SPREG`/`BCND`/`CRF`/`D`/`DS`/`SI`/
//! `UI`/`HI`/`BADDR`/etc.). Only the subset this crate's opcode table (see
//! `opcodes.rs`) actually references is implemented; the rest of the
//! original's operand-kind space is a deliberate scope reduction, noted in
//! `DESIGN.md`.

use crate::diagnostics::Diagnostics;
use crate::ir::expr::{get_absolute_expression, ExprParser, Segment};
use crate::ir::fixup::RelocKind;
use crate::ir::{Expr, SymbolTable};
use crate::source_loc::SourceLoc;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OperandKind {
    /// General-purpose register `r0`..`r31` (`GREG`); `G0REG` additionally
    /// forbids `r0` in a base-register slot.
    GReg { allow_r0: bool },
    /// Floating-point register `f0`..`f31`.
    FReg,
    /// Altivec vector register `v0`..`v31`.
    VReg,
    /// Condition-register field `crf0`..`crf7` or a bare `0`..`7`.
    Crf,
    /// A signed/unsigned immediate or displacement, resolved through the
    /// expression evaluator (`D`/`DS`/`SI`/`UI`/`HI` in the original).
    Imm,
    /// `sym(reg)` memory operand: displacement expression + base register.
    Mem { allow_r0: bool },
    /// A branch target: absolute/relative PC expression, optionally
    /// suffixed with `+`/`-` branch-prediction hints.
    Branch,
}

pub struct ParsedOperand {
    pub text: Box<str>,
}

/// Splits a raw operand-list string (`"r1,r2,100"`.) into individual operand
/// slices on top-level commas (parens may appear inside a memory operand's
/// displacement expression, e.g. `4(r1)`, and are not comma-bearing here so
/// a plain split is sufficient for PPC syntax).
pub fn split_operands(text: &str) -> Vec<&str> {
    text.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

pub fn parse_gpr(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text.strip_prefix('r').or_else(|| text.strip_prefix('R'))?;
    let n: u8 = digits.parse().ok()?;
    (n < 32).then_some(n)
}

pub fn parse_fpr(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text.strip_prefix('f').or_else(|| text.strip_prefix('F'))?;
    let n: u8 = digits.parse().ok()?;
    (n < 32).then_some(n)
}

pub fn parse_vr(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text.strip_prefix('v').or_else(|| text.strip_prefix('V'))?;
    let n: u8 = digits.parse().ok()?;
    (n < 32).then_some(n)
}

pub fn parse_crf(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text.strip_prefix("crf").unwrap_or(text);
    let n: u8 = digits.parse().ok()?;
    (n < 8).then_some(n)
}

/// `crN`, the leading CR-field operand a simplified conditional-branch
/// mnemonic takes (`beq cr1,target`) — distinct spelling from [`parse_crf`]'s
/// `crfN`/bare-digit form used elsewhere.
pub fn parse_cr_field(text: &str) -> Option<u8> {
    let text = text.trim();
    let digits = text.strip_prefix("cr")?;
    let n: u8 = digits.parse().ok()?;
    (n < 8).then_some(n)
}

/// `D(RA)`-style memory operand: returns the displacement expression text
/// and the base-register text.
pub fn split_memory_operand(text: &str) -> Option<(&str, &str)> {
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close <= open {
        return None;
    }
    Some((text[..open].trim(), text[open + 1..close].trim()))
}

/// Evaluate an immediate/displacement operand through the expression
/// evaluator, returning both the evaluated expression (for symbolic
/// operands that need a fixup) and, when it resolved to `ABSOLUTE`, the
/// constant value.
pub fn eval_immediate(
    text: &str,
    symbols: &mut SymbolTable,
    loc: &SourceLoc,
    diag: &Diagnostics,
) -> (Expr, Option<i64>) {
    let (expr, _) = ExprParser::new(text, symbols, loc, diag).parse();
    let value = (expr.seg == Segment::Absolute).then_some(expr.add_number);
    (expr, value)
}

/// Branch-prediction suffix.
/// `bne+`/`bne-` and friends carry a trailing `+`/`-` hint; `bne++`/`bne--`
/// carry the doubled form, which always sets the AT-bits encoding rather
/// than leaving the choice of Y-bit/AT-bits scheme to the caller.
pub fn strip_prediction_hint(mnemonic: &str) -> (&str, Option<bool>, bool) {
    if let Some(base) = mnemonic.strip_suffix("++") {
        (base, Some(true), true)
    } else if let Some(base) = mnemonic.strip_suffix("--") {
        (base, Some(false), true)
    } else if let Some(base) = mnemonic.strip_suffix('+') {
        (base, Some(true), false)
    } else if let Some(base) = mnemonic.strip_suffix('-') {
        (base, Some(false), false)
    } else {
        (mnemonic, None, false)
    }
}

/// `hi16(expr)`/`ha16(expr)`/`lo16(expr)`: an explicit relocation-kind
/// wrapper around an immediate operand (`HI`/`HA`/`LO` in the original's
/// operand grammar). Returns the inner expression text and the reloc kind
/// the wrapper names, or `None` when the operand carries no wrapper (the
/// caller then falls back to its own default, ordinarily `Lo16` for
/// D-form immediate/displacement fields).
pub fn strip_imm_wrapper(text: &str) -> (&str, Option<RelocKind>) {
    let text = text.trim();
    for (prefix, kind) in [("hi16(", RelocKind::Hi16), ("ha16(", RelocKind::Ha16), ("lo16(", RelocKind::Lo16)] {
        if let Some(rest) = text.strip_prefix(prefix) {
            if let Some(inner) = rest.strip_suffix(')') {
                return (inner.trim(), Some(kind));
            }
        }
    }
    (text, None)
}

pub fn get_absolute(text: &str, symbols: &mut SymbolTable, loc: &SourceLoc, diag: &Diagnostics) -> i64 {
    let (expr, _) = ExprParser::new(text, symbols, loc, diag).parse();
    get_absolute_expression(&expr, loc, diag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gpr_names() {
        assert_eq!(parse_gpr("r0"), Some(0));
        assert_eq!(parse_gpr("r31"), Some(31));
        assert_eq!(parse_gpr("r32"), None);
        assert_eq!(parse_gpr("f1"), None);
    }

    #[test]
    fn parses_cr_field_prefix() {
        assert_eq!(parse_cr_field("cr1"), Some(1));
        assert_eq!(parse_cr_field("cr7"), Some(7));
        assert_eq!(parse_cr_field("cr8"), None);
        assert_eq!(parse_cr_field("r1"), None);
    }

    #[test]
    fn splits_memory_operand() {
        assert_eq!(split_memory_operand("4(r1)"), Some(("4", "r1")));
        assert_eq!(split_memory_operand("r1"), None);
    }

    #[test]
    fn prediction_hint_suffix() {
        assert_eq!(strip_prediction_hint("bne+"), ("bne", Some(true), false));
        assert_eq!(strip_prediction_hint("bne-"), ("bne", Some(false), false));
        assert_eq!(strip_prediction_hint("bne++"), ("bne", Some(true), true));
        assert_eq!(strip_prediction_hint("bne--"), ("bne", Some(false), true));
        assert_eq!(strip_prediction_hint("bne"), ("bne", None, false));
    }

    #[test]
    fn imm_wrapper_selects_reloc_kind() {
        assert_eq!(strip_imm_wrapper("hi16(_foo)"), ("_foo", Some(RelocKind::Hi16)));
        assert_eq!(strip_imm_wrapper("ha16(_foo+4)"), ("_foo+4", Some(RelocKind::Ha16)));
        assert_eq!(strip_imm_wrapper("lo16(_foo)"), ("_foo", Some(RelocKind::Lo16)));
        assert_eq!(strip_imm_wrapper("100"), ("100", None));
    }
}
