//! Opcode hash: mnemonic → encoding shape + numeric
//! opcode/extended-opcode fields.
//!
//! The original's table runs to several hundred entries covering every PPC
//! instruction form (including AltiVec and the 970-only/optional
//! extensions). This crate populates a representative subset spanning each
//! `OperandShape` the driver needs to exercise — full coverage of the ISA is
//! out of scope for this crate the same way every non-PPC backend is; see
//! `DESIGN.md`.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug)]
pub enum OperandShape {
    /// `rt, ra, rb` three-register X-form, e.g. `add rt,ra,rb`.
    XForm3 { xo: u16, rc_capable: bool },
    /// `rt, ra, SIMM`/`UIMM` D-form arithmetic, e.g. `addi rt,ra,16`.
    DFormImm { allow_r0_ra: bool },
    /// `rt, d(ra)` D-form load, e.g. `lwz rt,4(r1)`.
    DFormLoad { allow_r0_ra: bool },
    /// `rs, d(ra)` D-form store (same bits, source register named `rs`).
    DFormStore { allow_r0_ra: bool },
    /// `rt` move from a special-purpose register, e.g. `mflr rt`.
    MfSpr { spr: u16 },
    /// `rs` move to a special-purpose register, e.g. `mtlr rs`.
    MtSpr { spr: u16 },
    /// Unconditional branch target, e.g. `b target` / `bl target`.
    IForm,
    /// `bo, bi, target` conditional branch, e.g. `bc bo,bi,target`.
    BForm,
    /// Simplified conditional-branch mnemonic, e.g. `beq [crN,] target`.
    /// `bo` is the fixed BO-field encoding for "branch if condition true/
    /// false" (no hint folded in yet — that still comes from the `+`/`-`/
    /// `++`/`--` suffix, same as `BForm`); `bi_bit` is the condition bit's
    /// offset within a CR field (`0`=lt, `1`=gt, `2`=eq, `3`=so), combined
    /// with an optional leading `crN` operand (`cr0` if omitted) to form BI.
    CondBForm { bo: u8, bi_bit: u8 },
    /// Zero-operand pseudo expansion, e.g. `nop` → `ori r0,r0,0`.
    NoArgPseudo,
}

#[derive(Clone, Copy, Debug)]
pub struct OpcodeEntry {
    pub opcode: u32,
    pub shape: OperandShape,
}

fn table() -> &'static HashMap<&'static str, OpcodeEntry> {
    static TABLE: OnceLock<HashMap<&'static str, OpcodeEntry>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = HashMap::new();
        t.insert("add", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 266, rc_capable: true } });
        t.insert("add.", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 266, rc_capable: true } });
        t.insert("subf", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 40, rc_capable: true } });
        t.insert("or", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 444, rc_capable: true } });
        t.insert("and", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 28, rc_capable: true } });
        t.insert("xor", OpcodeEntry { opcode: 31, shape: OperandShape::XForm3 { xo: 316, rc_capable: true } });

        t.insert("addi", OpcodeEntry { opcode: 14, shape: OperandShape::DFormImm { allow_r0_ra: true } });
        t.insert("addis", OpcodeEntry { opcode: 15, shape: OperandShape::DFormImm { allow_r0_ra: true } });
        t.insert("ori", OpcodeEntry { opcode: 24, shape: OperandShape::DFormImm { allow_r0_ra: false } });
        t.insert("oris", OpcodeEntry { opcode: 25, shape: OperandShape::DFormImm { allow_r0_ra: false } });
        t.insert("andi.", OpcodeEntry { opcode: 28, shape: OperandShape::DFormImm { allow_r0_ra: false } });
        t.insert("subi", OpcodeEntry { opcode: 14, shape: OperandShape::DFormImm { allow_r0_ra: true } });

        t.insert("lwz", OpcodeEntry { opcode: 32, shape: OperandShape::DFormLoad { allow_r0_ra: true } });
        t.insert("lhz", OpcodeEntry { opcode: 40, shape: OperandShape::DFormLoad { allow_r0_ra: true } });
        t.insert("lbz", OpcodeEntry { opcode: 34, shape: OperandShape::DFormLoad { allow_r0_ra: true } });
        t.insert("stw", OpcodeEntry { opcode: 36, shape: OperandShape::DFormStore { allow_r0_ra: true } });
        t.insert("sth", OpcodeEntry { opcode: 44, shape: OperandShape::DFormStore { allow_r0_ra: true } });
        t.insert("stb", OpcodeEntry { opcode: 38, shape: OperandShape::DFormStore { allow_r0_ra: true } });

        t.insert("mflr", OpcodeEntry { opcode: 31, shape: OperandShape::MfSpr { spr: 8 } });
        t.insert("mtlr", OpcodeEntry { opcode: 31, shape: OperandShape::MtSpr { spr: 8 } });
        t.insert("mfctr", OpcodeEntry { opcode: 31, shape: OperandShape::MfSpr { spr: 9 } });
        t.insert("mtctr", OpcodeEntry { opcode: 31, shape: OperandShape::MtSpr { spr: 9 } });

        t.insert("b", OpcodeEntry { opcode: 18, shape: OperandShape::IForm });
        t.insert("bl", OpcodeEntry { opcode: 18, shape: OperandShape::IForm });
        t.insert("ba", OpcodeEntry { opcode: 18, shape: OperandShape::IForm });
        t.insert("bla", OpcodeEntry { opcode: 18, shape: OperandShape::IForm });
        t.insert("bc", OpcodeEntry { opcode: 16, shape: OperandShape::BForm });
        t.insert("bca", OpcodeEntry { opcode: 16, shape: OperandShape::BForm });

        // Simplified conditional-branch mnemonics: BO = 0b01100 ("branch if
        // true") for the positive sense, 0b00100 ("branch if false") for the
        // negated one; BI's condition-bit offset is lt=0/gt=1/eq=2/so=3.
        // `a`/`la` (absolute-address) forms aren't in this representative
        // subset — see `DESIGN.md`.
        t.insert("blt", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 0 } });
        t.insert("bltl", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 0 } });
        t.insert("bgt", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 1 } });
        t.insert("bgtl", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 1 } });
        t.insert("beq", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 2 } });
        t.insert("beql", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 2 } });
        t.insert("bso", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 3 } });
        t.insert("bsol", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b01100, bi_bit: 3 } });
        t.insert("bge", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 0 } });
        t.insert("bgel", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 0 } });
        t.insert("ble", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 1 } });
        t.insert("blel", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 1 } });
        t.insert("bne", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 2 } });
        t.insert("bnel", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 2 } });
        t.insert("bns", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 3 } });
        t.insert("bnsl", OpcodeEntry { opcode: 16, shape: OperandShape::CondBForm { bo: 0b00100, bi_bit: 3 } });

        t.insert("nop", OpcodeEntry { opcode: 24, shape: OperandShape::NoArgPseudo });
        t
    })
}

pub fn lookup(mnemonic: &str) -> Option<OpcodeEntry> {
    table().get(mnemonic).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_mnemonics() {
        assert!(lookup("add").is_some());
        assert!(lookup("lwz").is_some());
        assert!(lookup("totally_not_an_opcode").is_none());
    }

    #[test]
    fn finds_simplified_conditional_branches() {
        assert!(matches!(lookup("beq").unwrap().shape, OperandShape::CondBForm { bo: 0b01100, bi_bit: 2 }));
        assert!(matches!(lookup("bne").unwrap().shape, OperandShape::CondBForm { bo: 0b00100, bi_bit: 2 }));
        assert!(matches!(lookup("bltl").unwrap().shape, OperandShape::CondBForm { bo: 0b01100, bi_bit: 0 }));
    }
}
