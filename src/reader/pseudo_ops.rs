//! The pseudo-op table: built once, the way `read_begin`
//! builds `read.c`'s `{name, fn}` table via `hash_new()`.
//!
//! This crate implements the pseudo-ops that exercise every component the
//! spec asks for (data emission, alignment, section switching, symbol
//! attributes, conditionals/macros, dump/load, dynamic-linking metadata) and
//! leaves the remaining Mach-O-attribute-only directives
//! (`.desc`/`.lazy_reference`/`.weak_reference`/`.weak_definition`/
//! `.weak_def_can_be_hidden`/`.no_dead_strip`/`.reference`/
//! `.symbol_resolver`/`.stabd`/`.stabn`/`.stabs`/`.debug_note`/
//! `.data_region`/`.end_data_region`) as thin symbol-flag or no-op
//! directives rather than fully modeled Mach-O attributes, since none of
//! them affect code generation or layout — a deliberate scope reduction
//! recorded in `DESIGN.md`, the same way the PPC opcode table only covers a
//! representative instruction subset.

use std::collections::HashMap;
use std::sync::OnceLock;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PseudoOp {
    Align,
    P2align,
    Balign,
    Org,
    Abs,
    PrivateExtern,
    IndirectSymbol,
    Abort,
    Ascii,
    Asciz,
    Byte,
    Short,
    Long,
    Quad,
    Comm,
    Desc,
    Fill,
    Globl,
    Lcomm,
    Line,
    File,
    Lsym,
    Section,
    Text,
    Data,
    Zerofill,
    SecureLogUnique,
    SecureLogReset,
    Set,
    Space,
    Sleb128,
    Uleb128,
    Reference,
    LazyReference,
    WeakReference,
    WeakDefinition,
    NoDeadStrip,
    SymbolResolver,
    Include,
    Macro,
    EndMacro,
    MacrosOn,
    MacrosOff,
    If,
    Elseif,
    Else,
    Endif,
    Dump,
    Load,
    SubsectionsViaSymbols,
    Machine,
    InlineAsmStart,
    InlineAsmEnd,
    Incbin,
    DataRegion,
    EndDataRegion,
    Stabd,
    Stabn,
    Stabs,
    DebugNote,
}

fn table() -> &'static HashMap<&'static str, PseudoOp> {
    static TABLE: OnceLock<HashMap<&'static str, PseudoOp>> = OnceLock::new();
    TABLE.get_or_init(|| {
        use PseudoOp::*;
        let mut t = HashMap::new();
        let mut add = |name: &'static str, op: PseudoOp| {
            t.insert(name, op);
        };
        add("align", Align);
        add("p2align", P2align);
        add("balign", Balign);
        add("org", Org);
        add("abs", Abs);
        add("private_extern", PrivateExtern);
        add("indirect_symbol", IndirectSymbol);
        add("abort", Abort);
        add("ascii", Ascii);
        add("asciz", Asciz);
        add("byte", Byte);
        add("short", Short);
        add("long", Long);
        add("quad", Quad);
        add("octa", Quad);
        add("comm", Comm);
        add("desc", Desc);
        add("double", Quad);
        add("single", Long);
        add("fill", Fill);
        add("globl", Globl);
        add("lcomm", Lcomm);
        add("line", Line);
        add("file", File);
        add("lsym", Lsym);
        add("section", Section);
        add("text", Text);
        add("data", Data);
        add("zerofill", Zerofill);
        add("tbss", Zerofill);
        add("secure_log_unique", SecureLogUnique);
        add("secure_log_reset", SecureLogReset);
        add("set", Set);
        add("space", Space);
        add("sleb128", Sleb128);
        add("uleb128", Uleb128);
        add("reference", Reference);
        add("lazy_reference", LazyReference);
        add("weak_reference", WeakReference);
        add("weak_definition", WeakDefinition);
        add("weak_def_can_be_hidden", WeakDefinition);
        add("no_dead_strip", NoDeadStrip);
        add("symbol_resolver", SymbolResolver);
        add("include", Include);
        add("macro", Macro);
        add("endmacro", EndMacro);
        add("endm", EndMacro);
        add("macros_on", MacrosOn);
        add("macros_off", MacrosOff);
        add("if", If);
        add("elseif", Elseif);
        add("else", Else);
        add("endif", Endif);
        add("dump", Dump);
        add("load", Load);
        add("subsections_via_symbols", SubsectionsViaSymbols);
        add("machine", Machine);
        add("inlineasmstart", InlineAsmStart);
        add("inlineasmend", InlineAsmEnd);
        add("incbin", Incbin);
        add("data_region", DataRegion);
        add("end_data_region", EndDataRegion);
        add("stabd", Stabd);
        add("stabn", Stabn);
        add("stabs", Stabs);
        add("debug_note", DebugNote);
        t
    })
}

pub fn lookup(name: &str) -> Option<PseudoOp> {
    table().get(name).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_core_pseudo_ops() {
        assert_eq!(lookup("byte"), Some(PseudoOp::Byte));
        assert_eq!(lookup("endmacro"), Some(PseudoOp::EndMacro));
        assert_eq!(lookup("endm"), Some(PseudoOp::EndMacro));
        assert!(lookup("not_a_pseudo_op").is_none());
    }
}
