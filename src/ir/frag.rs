//! Frag/section engine.
//!
//! Mirrors `cctools`'s `as/frags.c`
//! (`frag_grow`/`frag_var`/`frag_align`/`frag_new`) and the arena pattern
//! in `cranelift-entity`'s `map.rs`: frags live in one `PrimaryMap` owned by
//! the `Assembler` context and are referenced everywhere else by the `Frag`
//! index rather than by pointer.

use std::rc::Rc;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::ir::symbol::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Frag(u32);
entity_impl!(Frag, "frag");

/// Worst-case encoded width of a ULEB128/SLEB128 of a 64-bit value
/// (`ceil(64 / 7)`); reserved by [`FragArena`] for a [`FragKind::Leb128`]
/// frag before layout knows its final operand value.
pub const MAX_LEB128_BYTES: usize = 10;

/// The kind of deferred-emission content a frag holds.
#[derive(Clone, Debug)]
pub enum FragKind {
    /// Fixed content already fully encoded (ordinary instruction/data output,
    /// and the original's `FILL` frags: `literal` repeated `offset` times).
    Fill { repeat: u32 },
    /// Pad `address` up to `1 << pow2`; `fill_size` is the repeat unit
    /// (1/2/4 bytes), `max_pad` caps how many bytes may actually be emitted.
    Align { pow2: u32, fill_size: u8, max_pad: Option<u32> },
    /// Advance to `symbol.value + offset`.
    Org,
    /// A ULEB128 (`signed: false`) or SLEB128 (`signed: true`) encoding of
    /// `symbol.value - subtract_symbol.value + offset`, re-encoded each
    /// layout pass once both symbols (if any) have an address; `symbol` alone
    /// covers the plain `.uleb128 symbol+N` case, and neither set covers a
    /// constant that layout re-resolves only because it was written as an
    /// expression the reader couldn't fold at read time.
    Leb128 { signed: bool },
}

/// One variable-type fragment inside a section's frag chain.
pub struct FragData {
    /// Assigned by layout; `0` until then.
    pub address: u64,
    /// Bytes already fixed at encode time (`literal[..fix_size]`).
    pub fix_size: u32,
    /// Worst-case size reserved for the variable part, before relaxation.
    pub var_size: u32,
    pub symbol: Option<Symbol>,
    /// The symbol subtracted from `symbol` in a [`FragKind::Leb128`]'s
    /// expression; unused by every other frag kind.
    pub subtract_symbol: Option<Symbol>,
    pub offset: i64,
    pub opcode_offset: usize,
    pub kind: FragKind,
    pub subtype: u32,
    pub file: Rc<str>,
    pub line: u32,
    pub literal: Vec<u8>,
}

impl FragData {
    fn sentinel(file: Rc<str>) -> Self {
        FragData {
            address: 0,
            fix_size: 0,
            var_size: 0,
            symbol: None,
            subtract_symbol: None,
            offset: 0,
            opcode_offset: 0,
            kind: FragKind::Fill { repeat: 1 },
            subtype: 0,
            file,
            line: 0,
            literal: Vec::new(),
        }
    }
}

/// The frag arena. One instance per [`crate::ir::SectionTable`]'s owner
/// (typically the top-level `Assembler`), shared by every section.
pub struct FragArena {
    frags: PrimaryMap<Frag, FragData>,
}

impl FragArena {
    pub fn new() -> Self {
        FragArena {
            frags: PrimaryMap::new(),
        }
    }

    /// A zero-size head frag; every section starts with one of these.
    pub fn new_sentinel(&mut self, file: Rc<str>) -> Frag {
        self.frags.push(FragData::sentinel(file))
    }

    pub fn get(&self, frag: Frag) -> &FragData {
        &self.frags[frag]
    }

    pub fn get_mut(&mut self, frag: Frag) -> &mut FragData {
        &mut self.frags[frag]
    }

    /// `frag_grow(n)`: guarantee the current frag can take `n` more literal
    /// bytes, opening a new fixed frag first if it's already been closed out
    /// by a `frag_var`/`frag_align` call.
    pub fn grow(&mut self, current: Frag, n: usize) {
        self.frags[current].literal.reserve(n);
    }

    pub fn push_bytes(&mut self, current: Frag, bytes: &[u8]) {
        let data = &mut self.frags[current];
        data.literal.extend_from_slice(bytes);
        data.fix_size = data.literal.len() as u32;
    }

    /// `frag_var`: close `current` as a fixed frag and open a fresh variable
    /// frag of `kind` with `max_chars` bytes reserved, returning the new
    /// frag so the reader can keep filling subsequent fixed content there.
    pub fn new_variable(
        &mut self,
        kind: FragKind,
        max_chars: usize,
        symbol: Option<Symbol>,
        offset: i64,
        file: Rc<str>,
        line: u32,
    ) -> Frag {
        let mut data = FragData::sentinel(file);
        data.kind = kind;
        data.var_size = max_chars as u32;
        data.symbol = symbol;
        data.offset = offset;
        data.line = line;
        data.literal = Vec::with_capacity(max_chars);
        self.frags.push(data)
    }

    /// `frag_align`: a fill-typed variable frag sized for the worst-case
    /// padding, materialized into real fill bytes once layout knows the
    /// frag's final address.
    pub fn new_align(
        &mut self,
        pow2: u32,
        fill_byte: u8,
        fill_size: u8,
        max_pad: Option<u32>,
        file: Rc<str>,
        line: u32,
    ) -> Frag {
        let worst_case = max_pad.unwrap_or((1u32 << pow2).saturating_sub(1)) as usize;
        let frag = self.new_variable(
            FragKind::Align { pow2, fill_size, max_pad },
            worst_case,
            None,
            0,
            file,
            line,
        );
        self.frags[frag].literal = vec![fill_byte; fill_size as usize];
        frag
    }

    pub fn len(&self) -> usize {
        self.frags.len()
    }
}

impl Default for FragArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode `value` as a ULEB128, least-significant group first, a `0x80`
/// continuation bit on every byte but the last.
pub fn encode_uleb128(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
    out
}

/// Encode `value` as an SLEB128: like [`encode_uleb128`] but the final byte's
/// sign bit (`0x40`) must agree with the sign of what's left to encode.
pub fn encode_sleb128(mut value: i64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        out.push(if done { byte } else { byte | 0x80 });
        if done {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_has_zero_size() {
        let mut arena = FragArena::new();
        let head = arena.new_sentinel(Rc::from("t.s"));
        assert_eq!(arena.get(head).fix_size, 0);
        assert!(arena.get(head).literal.is_empty());
    }

    #[test]
    fn push_bytes_updates_fix_size() {
        let mut arena = FragArena::new();
        let head = arena.new_sentinel(Rc::from("t.s"));
        arena.push_bytes(head, &[1, 2, 3]);
        assert_eq!(arena.get(head).fix_size, 3);
    }
}
