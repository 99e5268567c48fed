//! Fix (relocation) list.
//!
//! One record per pending symbolic reference inside a frag's fixed bytes;
//! resolved or translated into a Mach-O relocation entry at layout time.
//! Mirrors the PPC relocation kinds in `cctools`'s `as/ppc.c`.

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::ir::frag::Frag;
use crate::ir::symbol::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Fix(u32);
entity_impl!(Fix, "fix");

/// PPC relocation types this backend emits.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RelocKind {
    Vanilla,
    Hi16,
    Lo16,
    Ha16,
    Lo14,
    Br14,
    Br14Predicted,
    Br24,
    Jbsr,
    PairHi16,
    PairLo16,
    PairHa16,
}

pub struct FixData {
    pub frag: Frag,
    pub where_: u32,
    pub size: u8,
    pub add_symbol: Option<Symbol>,
    pub subtract_symbol: Option<Symbol>,
    pub addend: i64,
    pub pcrel: bool,
    pub reloc: RelocKind,
    pub sectdiff_divide_by_two: bool,
}

#[derive(Default)]
pub struct FixList {
    fixes: PrimaryMap<Fix, FixData>,
    /// Per-section ordering, since the Mach-O writer emits relocations
    /// grouped and ordered by the section they apply to.
    by_section_order: Vec<Fix>,
}

impl FixList {
    pub fn new() -> Self {
        FixList::default()
    }

    pub fn push(&mut self, data: FixData) -> Fix {
        let fix = self.fixes.push(data);
        self.by_section_order.push(fix);
        fix
    }

    pub fn get(&self, fix: Fix) -> &FixData {
        &self.fixes[fix]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FixData> {
        self.by_section_order.iter().map(|&f| &self.fixes[f])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::frag::FragArena;
    use std::rc::Rc;

    #[test]
    fn push_and_iterate_preserves_order() {
        let mut frags = FragArena::new();
        let frag = frags.new_sentinel(Rc::from("t.s"));
        let mut fixes = FixList::new();
        for i in 0..3 {
            fixes.push(FixData {
                frag,
                where_: i,
                size: 4,
                add_symbol: None,
                subtract_symbol: None,
                addend: 0,
                pcrel: false,
                reloc: RelocKind::Vanilla,
                sectdiff_divide_by_two: false,
            });
        }
        let wheres: Vec<u32> = fixes.iter().map(|f| f.where_).collect();
        assert_eq!(wheres, vec![0, 1, 2]);
    }
}
