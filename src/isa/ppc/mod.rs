//! PowerPC backend — the architecture exemplar.
//!
//! Mirrors `md_assemble` in `cctools`'s `as/ppc.c`:
//! opcode lookup, operand-type-driven parsing, invalid-form checks, and
//! relocation-type selection, assembled into one `TargetIsa` impl.

pub mod encode;
pub mod opcodes;
pub mod operands;
pub mod reloc;

use std::cell::RefCell;

use crate::ir::expr::Segment;
use crate::ir::fixup::{FixData, RelocKind};
use crate::isa::{AssembleContext, TargetIsa};
use opcodes::OperandShape;
use reloc::PredictionScheme;

pub struct PpcIsa {
    pub prediction_scheme: PredictionScheme,
    /// `-force_cpusubtype_ALL`: skip the "is this instruction valid for the
    /// selected cpusubtype" gating.
    pub force_cpusubtype_all: bool,
    /// `-no_ppc601`: reject `601`-only forms (this crate's opcode table
    /// doesn't currently define any, so this only affects future additions,
    /// per the Non-goals' opcode-table scope reduction).
    pub no_ppc601: bool,
    /// `.flag_reg N` / `.noflag_reg N`: registers whose use in a `GREG`/
    /// `G0REG` operand slot should be flagged as an error. `RefCell`d since
    /// the pseudo-ops mutate it through a shared `&self` (the `TargetIsa`
    /// the reader holds is not `&mut`).
    flagged_gregs: RefCell<[bool; 32]>,
}

impl Default for PpcIsa {
    fn default() -> Self {
        PpcIsa {
            prediction_scheme: PredictionScheme::YBit,
            force_cpusubtype_all: false,
            no_ppc601: false,
            flagged_gregs: RefCell::new([false; 32]),
        }
    }
}

impl PpcIsa {
    /// Reports a `bad` diagnostic if `reg` was named by a `.flag_reg`
    /// directive still in effect.
    fn check_flagged(&self, reg: u8, ctx: &AssembleContext) {
        if self.flagged_gregs.borrow()[reg as usize & 0x1f] {
            ctx.diag.bad(ctx.loc, format!("flagged register r{} used", reg));
        }
    }
}

impl TargetIsa for PpcIsa {
    fn name(&self) -> &'static str {
        "ppc"
    }

    fn assemble(&self, mnemonic: &str, operand_text: &str, ctx: &mut AssembleContext) -> bool {
        let (base_mnemonic, hint, always_hint) = operands::strip_prediction_hint(mnemonic);
        let Some(entry) = opcodes::lookup(base_mnemonic) else {
            return false;
        };

        let word = match entry.shape {
            OperandShape::XForm3 { xo, rc_capable } => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 3 {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes 3 register operands", base_mnemonic));
                    return true;
                }
                let (Some(rt), Some(ra), Some(rb)) =
                    (operands::parse_gpr(ops[0]), operands::parse_gpr(ops[1]), operands::parse_gpr(ops[2]))
                else {
                    ctx.diag.bad(ctx.loc, "expected general-purpose register operand");
                    return true;
                };
                let rc = rc_capable && base_mnemonic.ends_with('.');
                self.check_flagged(rt, ctx);
                self.check_flagged(ra, ctx);
                self.check_flagged(rb, ctx);
                encode::x_form(entry.opcode, rt, ra, rb, xo, rc)
            }
            OperandShape::DFormImm { allow_r0_ra } => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 3 {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes 3 operands", base_mnemonic));
                    return true;
                }
                let (Some(rt), Some(ra)) = (operands::parse_gpr(ops[0]), operands::parse_gpr(ops[1])) else {
                    ctx.diag.bad(ctx.loc, "expected general-purpose register operand");
                    return true;
                };
                if ra == 0 && !allow_r0_ra {
                    ctx.diag.bad(ctx.loc, format!("`{}' may not use r0 as RA", base_mnemonic));
                }
                let (imm_text, reloc_override) = operands::strip_imm_wrapper(ops[2]);
                let (expr, value) = operands::eval_immediate(imm_text, ctx.symbols, ctx.loc, ctx.diag);
                let imm = match value {
                    Some(v) => v as u16,
                    None if expr.seg == Segment::Unknown || expr.seg == Segment::Sect => {
                        register_hi16_fixup(ctx, &expr, reloc_override.unwrap_or(RelocKind::Lo16));
                        0
                    }
                    None => {
                        ctx.diag.bad(ctx.loc, "immediate operand must be absolute or resolvable");
                        0
                    }
                };
                self.check_flagged(rt, ctx);
                self.check_flagged(ra, ctx);
                encode::d_form(entry.opcode, rt, ra, imm)
            }
            OperandShape::DFormLoad { allow_r0_ra } | OperandShape::DFormStore { allow_r0_ra } => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 2 {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes 2 operands", base_mnemonic));
                    return true;
                }
                let Some(rt) = operands::parse_gpr(ops[0]) else {
                    ctx.diag.bad(ctx.loc, "expected general-purpose register operand");
                    return true;
                };
                let Some((disp_text, base_text)) = operands::split_memory_operand(ops[1]) else {
                    ctx.diag.bad(ctx.loc, "expected `d(ra)' memory operand");
                    return true;
                };
                let Some(ra) = operands::parse_gpr(base_text) else {
                    ctx.diag.bad(ctx.loc, "expected general-purpose base register");
                    return true;
                };
                if ra == 0 && !allow_r0_ra {
                    ctx.diag.bad(ctx.loc, format!("`{}' may not use r0 as RA", base_mnemonic));
                }
                let (disp_text, reloc_override) = operands::strip_imm_wrapper(disp_text);
                let (expr, value) = operands::eval_immediate(disp_text, ctx.symbols, ctx.loc, ctx.diag);
                let disp = match value {
                    Some(v) => v as u16,
                    None if expr.seg == Segment::Unknown || expr.seg == Segment::Sect => {
                        register_hi16_fixup(ctx, &expr, reloc_override.unwrap_or(RelocKind::Lo16));
                        0
                    }
                    None => {
                        ctx.diag.bad(ctx.loc, "displacement must be absolute or resolvable");
                        0
                    }
                };
                self.check_flagged(rt, ctx);
                self.check_flagged(ra, ctx);
                encode::d_form(entry.opcode, rt, ra, disp)
            }
            OperandShape::MfSpr { spr } | OperandShape::MtSpr { spr } => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 1 {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes 1 register operand", base_mnemonic));
                    return true;
                }
                let Some(rt) = operands::parse_gpr(ops[0]) else {
                    ctx.diag.bad(ctx.loc, "expected general-purpose register operand");
                    return true;
                };
                let spr_hi = ((spr >> 5) & 0x1f) as u8;
                let spr_lo = (spr & 0x1f) as u8;
                let xo: u16 = if matches!(entry.shape, OperandShape::MfSpr { .. }) { 339 } else { 467 };
                self.check_flagged(rt, ctx);
                encode::x_form(entry.opcode, rt, spr_lo, spr_hi, xo, false)
            }
            OperandShape::IForm => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 1 {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes 1 branch-target operand", base_mnemonic));
                    return true;
                }
                if hint.is_some() {
                    ctx.diag.warn(ctx.loc, "branch-prediction hint has no effect on an unconditional branch");
                }
                let lk = base_mnemonic.ends_with('l') || base_mnemonic.ends_with("la");
                let aa = base_mnemonic.ends_with('a') || base_mnemonic.ends_with("la");
                let (expr, value) = operands::eval_immediate(ops[0], ctx.symbols, ctx.loc, ctx.diag);
                let li = match value {
                    Some(v) => v as i32,
                    None => {
                        register_branch_fixup(ctx, &expr, false, false);
                        0
                    }
                };
                encode::i_form(entry.opcode, li, aa, lk)
            }
            OperandShape::BForm => {
                let ops = operands::split_operands(operand_text);
                if ops.len() != 3 {
                    ctx.diag.bad(ctx.loc, "`bc' takes `bo,bi,target'");
                    return true;
                }
                let bo = operands::get_absolute(ops[0], ctx.symbols, ctx.loc, ctx.diag) as u8;
                let bi = operands::get_absolute(ops[1], ctx.symbols, ctx.loc, ctx.diag) as u8;
                if hint.is_some() && reloc::bo_is_branch_always(bo) {
                    ctx.diag.warn(ctx.loc, "branch-prediction hint on an always-taken branch is ignored");
                }
                let predict_taken = hint.filter(|_| !reloc::bo_is_branch_always(bo));
                let scheme = if always_hint { PredictionScheme::AtBits } else { self.prediction_scheme };
                let bo = reloc::encode_bo_with_hint(bo, predict_taken, scheme);
                let lk = base_mnemonic.ends_with('l');
                let aa = base_mnemonic.ends_with('a');
                let (expr, value) = operands::eval_immediate(ops[2], ctx.symbols, ctx.loc, ctx.diag);
                let bd = match value {
                    Some(v) => v as i16,
                    None => {
                        register_branch_fixup(ctx, &expr, true, predict_taken.is_some());
                        0
                    }
                };
                encode::b_form(entry.opcode, bo, bi, bd, aa, lk)
            }
            OperandShape::CondBForm { bo, bi_bit } => {
                let ops = operands::split_operands(operand_text);
                let (cr_field, target) = match ops.as_slice() {
                    [target] => (0u8, *target),
                    [cr, target] => {
                        let Some(cr_field) = operands::parse_cr_field(cr) else {
                            ctx.diag.bad(ctx.loc, "expected a `crN' condition-register field");
                            return true;
                        };
                        (cr_field, *target)
                    }
                    _ => {
                        ctx.diag.bad(ctx.loc, format!("`{}' takes `[crN,] target'", base_mnemonic));
                        return true;
                    }
                };
                let bi = cr_field * 4 + bi_bit;
                let predict_taken = hint;
                let scheme = if always_hint { PredictionScheme::AtBits } else { self.prediction_scheme };
                let bo = reloc::encode_bo_with_hint(bo, predict_taken, scheme);
                let lk = base_mnemonic.ends_with('l');
                let (expr, value) = operands::eval_immediate(target, ctx.symbols, ctx.loc, ctx.diag);
                let bd = match value {
                    Some(v) => v as i16,
                    None => {
                        register_branch_fixup(ctx, &expr, true, predict_taken.is_some());
                        0
                    }
                };
                encode::b_form(entry.opcode, bo, bi, bd, false, lk)
            }
            OperandShape::NoArgPseudo => {
                if !operand_text.trim().is_empty() {
                    ctx.diag.bad(ctx.loc, format!("`{}' takes no operands", base_mnemonic));
                }
                // `nop` == `ori r0,r0,0`.
                encode::d_form(24, 0, 0, 0)
            }
        };

        ctx.frags.push_bytes(ctx.current_frag, &encode::to_be_bytes(word));
        true
    }

    fn pseudo_op(&self, name: &str, operand_text: &str, ctx: &mut AssembleContext) -> bool {
        let flag = match name {
            "flag_reg" => true,
            "noflag_reg" => false,
            _ => return false,
        };
        let reg = operands::get_absolute(operand_text.trim(), ctx.symbols, ctx.loc, ctx.diag);
        if !(0..32).contains(&reg) {
            ctx.diag.bad(ctx.loc, format!("register number ({}) out of range (0-31) for .{}", reg, name));
            return true;
        }
        self.flagged_gregs.borrow_mut()[reg as usize] = flag;
        true
    }

    fn apply_fixup(
        &self,
        existing: u32,
        reloc: RelocKind,
        value: i64,
        diag: &crate::diagnostics::Diagnostics,
        loc: &crate::source_loc::SourceLoc,
    ) -> u32 {
        match reloc {
            RelocKind::Vanilla => value as u32,
            RelocKind::Hi16 | RelocKind::PairHi16 => (existing & 0xffff_0000) | ((value >> 16) as u32 & 0xffff),
            RelocKind::Lo16 | RelocKind::PairLo16 => (existing & 0xffff_0000) | (value as u32 & 0xffff),
            RelocKind::Ha16 | RelocKind::PairHa16 => {
                let ha = (value.wrapping_add(0x8000)) >> 16;
                (existing & 0xffff_0000) | (ha as u32 & 0xffff)
            }
            RelocKind::Lo14 => (existing & !0x0000_fffc) | (value as u32 & 0x0000_fffc),
            RelocKind::Br14 | RelocKind::Br14Predicted => {
                if value % 4 != 0 {
                    diag.bad(loc, "branch displacement is not a multiple of 4");
                }
                if !(-(1 << 15)..(1 << 15)).contains(&value) {
                    diag.bad(loc, "conditional branch target out of 14-bit displacement range");
                }
                (existing & !0x0000_fffc) | (value as u32 & 0x0000_fffc)
            }
            RelocKind::Br24 | RelocKind::Jbsr => {
                if value % 4 != 0 {
                    diag.bad(loc, "branch displacement is not a multiple of 4");
                }
                (existing & 0xfc00_0003) | (value as u32 & 0x03ff_fffc)
            }
        }
    }
}

fn register_hi16_fixup(ctx: &mut AssembleContext, expr: &crate::ir::Expr, reloc: RelocKind) {
    let where_ = ctx.frags.get(ctx.current_frag).literal.len() as u32;
    ctx.fixes.push(FixData {
        frag: ctx.current_frag,
        where_,
        size: 2,
        add_symbol: expr.add_symbol,
        subtract_symbol: expr.subtract_symbol,
        addend: expr.add_number,
        pcrel: false,
        reloc,
        sectdiff_divide_by_two: expr.sectdiff_divide_by_two,
    });
}

fn register_branch_fixup(ctx: &mut AssembleContext, expr: &crate::ir::Expr, conditional: bool, predicted: bool) {
    let where_ = ctx.frags.get(ctx.current_frag).literal.len() as u32;
    let reloc = reloc::branch_reloc(conditional, predicted, false);
    ctx.fixes.push(FixData {
        frag: ctx.current_frag,
        where_,
        size: 4,
        add_symbol: expr.add_symbol,
        subtract_symbol: expr.subtract_symbol,
        addend: expr.add_number,
        pcrel: true,
        reloc,
        sectdiff_divide_by_two: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::ir::{FixList, FragArena, SymbolTable};
    use crate::source_loc::SourceLoc;
    use std::rc::Rc;

    fn assemble_one(mnemonic: &str, operands: &str) -> Vec<u8> {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.assemble(mnemonic, operands, &mut ctx));
        assert!(!diag.has_bad_error());
        frags.get(frag).literal.clone()
    }

    #[test]
    fn addi_encodes_d_form() {
        let bytes = assemble_one("addi", "r3, r1, 16");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, encode::d_form(14, 3, 1, 16));
    }

    #[test]
    fn add_encodes_x_form() {
        let bytes = assemble_one("add", "r3, r1, r2");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, encode::x_form(31, 3, 1, 2, 266, false));
    }

    #[test]
    fn lwz_encodes_memory_operand() {
        let bytes = assemble_one("lwz", "r3, 8(r1)");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, encode::d_form(32, 3, 1, 8));
    }

    #[test]
    fn nop_expands_to_ori_zero() {
        let bytes = assemble_one("nop", "");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, 0x6000_0000);
    }

    #[test]
    fn beq_expands_to_bc_with_eq_condition() {
        let bytes = assemble_one("beq", "target");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, encode::b_form(16, 0b01100, 2, 0, false, false));
    }

    #[test]
    fn bne_with_explicit_cr_field_shifts_bi() {
        let bytes = assemble_one("bne", "cr1, target");
        let word = u32::from_be_bytes(bytes.try_into().unwrap());
        assert_eq!(word, encode::b_form(16, 0b00100, 1 * 4 + 2, 0, false, false));
    }

    #[test]
    fn beq_plus_sets_the_y_bit_and_registers_a_predicted_branch_fix() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.assemble("beq+", "_target", &mut ctx));
        assert!(!diag.has_bad_error());
        let word = u32::from_be_bytes(frags.get(frag).literal.clone().try_into().unwrap());
        assert_eq!(word & (1 << 21), 1 << 21); // Y-bit is BO's low bit
        let fix = fixes.iter().next().unwrap();
        assert_eq!(fix.reloc, RelocKind::Br14Predicted);
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(!isa.assemble("notaninstruction", "", &mut ctx));
    }

    #[test]
    fn flag_reg_flags_subsequent_use() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.pseudo_op("flag_reg", " 3", &mut ctx));
        assert!(!diag.has_bad_error());
        assert!(isa.assemble("add", "r3, r3, r4", &mut ctx));
        assert!(diag.has_bad_error());
    }

    #[test]
    fn noflag_reg_clears_the_flag() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.pseudo_op("flag_reg", "3", &mut ctx));
        assert!(isa.pseudo_op("noflag_reg", "3", &mut ctx));
        assert!(isa.assemble("add", "r3, r3, r4", &mut ctx));
        assert!(!diag.has_bad_error());
    }

    #[test]
    fn hi16_wrapper_selects_the_hi16_relocation() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.assemble("addis", "r3, r0, hi16(_foo)", &mut ctx));
        assert_eq!(fixes.iter().count(), 1);
        assert_eq!(fixes.iter().next().unwrap().reloc, RelocKind::Hi16);
    }

    #[test]
    fn bare_immediate_defaults_to_lo16() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.assemble("addi", "r3, r1, _foo", &mut ctx));
        assert_eq!(fixes.iter().next().unwrap().reloc, RelocKind::Lo16);
    }

    #[test]
    fn apply_fixup_patches_lo16_field_only() {
        let isa = PpcIsa::default();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let existing = 0x3863_0000u32; // addi r3,r3,0
        let patched = isa.apply_fixup(existing, RelocKind::Lo16, 0x1234, &diag, &loc);
        assert_eq!(patched, 0x3863_1234);
    }

    #[test]
    fn apply_fixup_br24_masks_the_li_field() {
        let isa = PpcIsa::default();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let existing = 0x4800_0000u32; // b 0
        let patched = isa.apply_fixup(existing, RelocKind::Br24, -4, &diag, &loc);
        assert_eq!(patched, 0x4bff_fffc);
    }

    #[test]
    fn flag_reg_out_of_range_is_bad() {
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let mut fixes = FixList::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        let isa = PpcIsa::default();
        let mut ctx = AssembleContext {
            frags: &mut frags,
            symbols: &mut symbols,
            fixes: &mut fixes,
            current_frag: frag,
            loc: &loc,
            diag: &diag,
        };
        assert!(isa.pseudo_op("flag_reg", "99", &mut ctx));
        assert!(diag.has_bad_error());
    }
}
