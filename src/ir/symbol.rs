//! Symbol table.
//!
//! Mirrors `cctools`'s `as/symbols.c`: the
//! name hash plus the two threaded orderings it maintains (insertion order
//! for the name table, index order for the emitted Mach-O symbol table), and
//! `colon()`'s redefinition rule (an `UNDF`, zero-valued, flagless symbol may
//! be promoted to `SECT` exactly once; anything else redefining is an
//! error).

use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::diagnostics::Diagnostics;
use crate::ir::expr::Expr;
use crate::ir::frag::Frag;
use crate::source_loc::SourceLoc;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Symbol(u32);
entity_impl!(Symbol, "symbol");

/// Mach-O `nlist` type bits this crate actually distinguishes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolKind {
    Undefined,
    Absolute,
    Section,
}

#[derive(Clone, Copy, Default, Debug)]
pub struct SymbolFlags {
    pub external: bool,
    pub private_extern: bool,
    pub weak_reference: bool,
    pub weak_definition: bool,
    pub no_dead_strip: bool,
    pub referenced_dynamically: bool,
}

pub struct SymbolData {
    pub name: Box<str>,
    pub kind: SymbolKind,
    pub other: u8,
    pub desc: i16,
    pub value: u64,
    pub frag: Option<Frag>,
    pub flags: SymbolFlags,
    /// Non-`None` only for symbols whose value is an unresolved expression
    /// over two as-yet-undefined section offsets.
    pub expr: Option<Expr>,
    /// `true` once this symbol has been `colon()`-defined; distinguishes a
    /// plain forward reference from a completed definition for the
    /// redefinition check.
    pub defined: bool,
    /// `true` once this symbol has a slot in `index_order` — guards against
    /// double-indexing a symbol that is first pulled into the table as an
    /// undefined external reference (`.indirect_symbol`, a relocation's
    /// `add_symbol`) and only later `colon()`-defined.
    indexed: bool,
}

impl SymbolData {
    fn undefined(name: impl Into<Box<str>>) -> Self {
        SymbolData {
            name: name.into(),
            kind: SymbolKind::Undefined,
            other: 0,
            desc: 0,
            value: 0,
            frag: None,
            flags: SymbolFlags::default(),
            expr: None,
            defined: false,
            indexed: false,
        }
    }

    fn redefinable(&self) -> bool {
        !self.defined && self.value == 0 && self.kind == SymbolKind::Undefined
    }
}

/// Hashed name → symbol, plus two orderings: `name_order` (insertion
/// order, used for diagnostics and `.dump`) and `index_order` (definition
/// order, written verbatim into the Mach-O symbol table).
pub struct SymbolTable {
    symbols: PrimaryMap<Symbol, SymbolData>,
    by_name: HashMap<Box<str>, Symbol>,
    name_order: Vec<Symbol>,
    index_order: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: PrimaryMap::new(),
            by_name: HashMap::new(),
            name_order: Vec::new(),
            index_order: Vec::new(),
        }
    }

    /// Look up `name`, creating an `UNDF` placeholder on first reference —
    /// `symbol_new`'s "created as UNDF the first time it is referenced"
    /// rule.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.by_name.get(name) {
            return sym;
        }
        let sym = self.symbols.push(SymbolData::undefined(name));
        self.by_name.insert(name.into(), sym);
        self.name_order.push(sym);
        sym
    }

    pub fn get(&self, sym: Symbol) -> &SymbolData {
        &self.symbols[sym]
    }

    pub fn get_mut(&mut self, sym: Symbol) -> &mut SymbolData {
        &mut self.symbols[sym]
    }

    /// `colon("name")`: define (or promote) a label at `frag`/`offset`.
    /// Redefining anything other than a fresh `UNDF` reference is a `bad`
    /// diagnostic, not a panic — assembly continues using the prior value.
    pub fn define(
        &mut self,
        name: &str,
        frag: Frag,
        offset: u64,
        loc: &SourceLoc,
        diag: &Diagnostics,
    ) -> Symbol {
        let sym = self.intern(name);
        let data = &mut self.symbols[sym];
        if data.defined && !data.redefinable() {
            diag.bad(loc, format!("symbol `{}' is already defined", name));
            return sym;
        }
        data.kind = SymbolKind::Section;
        data.frag = Some(frag);
        data.value = offset;
        data.defined = true;
        if !data.indexed {
            data.indexed = true;
            self.index_order.push(sym);
        }
        sym
    }

    pub fn define_absolute(&mut self, name: &str, value: u64, loc: &SourceLoc, diag: &Diagnostics) -> Symbol {
        let sym = self.intern(name);
        let data = &mut self.symbols[sym];
        if data.defined && !data.redefinable() {
            diag.bad(loc, format!("symbol `{}' is already defined", name));
            return sym;
        }
        data.kind = SymbolKind::Absolute;
        data.value = value;
        data.defined = true;
        if !data.indexed {
            data.indexed = true;
            self.index_order.push(sym);
        }
        sym
    }

    /// Guarantee `sym` occupies a slot in the emitted Mach-O symbol table
    /// even though nothing in this translation unit `colon()`-defines it —
    /// the case of an external symbol that is only ever referenced, the way
    /// `.indirect_symbol NAME` and any relocation's target symbol need an
    /// `N_UNDF` `nlist` entry for the linker to resolve against.
    pub fn ensure_in_symbol_table(&mut self, sym: Symbol) {
        let data = &mut self.symbols[sym];
        if !data.indexed {
            data.indexed = true;
            self.index_order.push(sym);
        }
    }

    /// `symbol_temp_new`: an unnameable label anchored at a frag/offset,
    /// used internally (local labels, DWARF row anchors) without entering
    /// the name hash.
    pub fn temp_new(&mut self, frag: Frag, offset: u64) -> Symbol {
        let mut data = SymbolData::undefined("L<temp>");
        data.kind = SymbolKind::Section;
        data.frag = Some(frag);
        data.value = offset;
        data.defined = true;
        self.symbols.push(data)
    }

    /// `symbol_temp_make`: an undefined placeholder used only as an
    /// expression-subtree anchor.
    pub fn temp_make(&mut self) -> Symbol {
        self.symbols.push(SymbolData::undefined("L<placeholder>"))
    }

    /// Definition order — the order written into the Mach-O symbol table.
    pub fn index_order(&self) -> &[Symbol] {
        &self.index_order
    }

    pub fn name_order(&self) -> &[Symbol] {
        &self.name_order
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::frag::FragArena;
    use std::rc::Rc;

    #[test]
    fn reference_then_definition_promotes_symbol() {
        let mut syms = SymbolTable::new();
        let mut frags = FragArena::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");

        let forward_ref = syms.intern("foo");
        assert_eq!(syms.get(forward_ref).kind, SymbolKind::Undefined);

        let defined = syms.define("foo", frag, 4, &loc, &diag);
        assert_eq!(forward_ref, defined);
        assert_eq!(syms.get(defined).kind, SymbolKind::Section);
        assert_eq!(syms.get(defined).value, 4);
        assert!(!diag.has_bad_error());
    }

    #[test]
    fn redefinition_is_an_error() {
        let mut syms = SymbolTable::new();
        let mut frags = FragArena::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");

        syms.define("foo", frag, 0, &loc, &diag);
        syms.define("foo", frag, 8, &loc, &diag);
        assert!(diag.has_bad_error());
    }
}
