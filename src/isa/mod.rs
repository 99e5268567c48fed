//! Architecture backend seam.
//!
//! Only [`ppc::PpcIsa`] is populated — other architecture opcode tables are
//! out of scope for now — but the driver talks to the backend only through
//! [`TargetIsa`], so the rest of the assembler stays generic over which
//! backend (x86/aarch64/risc-v/...) is in play.

pub mod ppc;

use crate::diagnostics::Diagnostics;
use crate::ir::fixup::RelocKind;
use crate::ir::{Frag, FragArena, FixList, SymbolTable};
use crate::source_loc::SourceLoc;

/// Everything a backend needs to encode one instruction: the frag it's
/// writing bytes into, the symbol table for operand resolution, and the fix
/// list for any relocations the encoding needs.
pub struct AssembleContext<'a> {
    pub frags: &'a mut FragArena,
    pub symbols: &'a mut SymbolTable,
    pub fixes: &'a mut FixList,
    pub current_frag: Frag,
    pub loc: &'a SourceLoc,
    pub diag: &'a Diagnostics,
}

pub trait TargetIsa {
    fn name(&self) -> &'static str;

    /// `md_assemble`: encode `mnemonic operands` into `ctx.current_frag`.
    /// Returns `false` if the mnemonic is unknown (the reader then reports
    /// "no such instruction").
    fn assemble(&self, mnemonic: &str, operands: &str, ctx: &mut AssembleContext) -> bool;

    /// A backend-specific pseudo-op (the original's `md_pseudo_table`, e.g.
    /// PPC's `.flag_reg`/`.noflag_reg`). Returns `false` when this backend
    /// doesn't recognize `name`, so the reader falls back to reporting
    /// "unknown pseudo-op".
    fn pseudo_op(&self, _name: &str, _operands: &str, _ctx: &mut AssembleContext) -> bool {
        false
    }

    /// Patch a fixup directly into its instruction word once layout has
    /// resolved `value` (the fixup's final addend, already combining
    /// symbol address, subtracted symbol, and any PC-relative adjustment).
    /// Called only for fixups [`crate::layout::resolve_and_apply_fixes`]
    /// decides are resolvable in place; anything this returns `existing`
    /// unchanged for is left to the Mach-O writer to emit as a relocation
    /// instead. The default (no backend override) never resolves anything.
    fn apply_fixup(&self, existing: u32, _reloc: RelocKind, _value: i64, _diag: &Diagnostics, _loc: &SourceLoc) -> u32 {
        existing
    }
}
