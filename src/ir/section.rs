//! Section chain.

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::ir::frag::Frag;
use crate::ir::symbol::Symbol;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Section(u32);
entity_impl!(Section, "section");

/// One `.indirect_symbol NAME` entry, recorded in the order it appears
/// within its section. `symbol` is already interned (and guaranteed a
/// Mach-O symbol-table slot via [`crate::ir::symbol::SymbolTable::ensure_in_symbol_table`])
/// by the time this entry is pushed, so the writer only needs to look up
/// its final table index.
#[derive(Clone, Debug)]
pub struct IndirectSymbolEntry {
    pub symbol: Symbol,
    pub frag: Frag,
    pub offset: u32,
}

#[derive(Clone, Debug, Default)]
pub struct SectionFlags {
    pub pure_instructions: bool,
    pub some_instructions: bool,
    pub zerofill: bool,
    pub symbol_stubs: bool,
}

pub struct SectionData {
    pub segname: Box<str>,
    pub sectname: Box<str>,
    pub flags: SectionFlags,
    pub align: u32,
    /// An ordered list of frags rather than the original's intrusive
    /// `fr_next` linked list; iterating this in order reproduces the same
    /// layout-time traversal.
    pub frags: Vec<Frag>,
    pub indirect_symbols: Vec<IndirectSymbolEntry>,
    /// Stub/pointer stride in bytes, used to validate the indirect-symbol
    /// list's regularity for `S_SYMBOL_STUBS`/lazy-pointer sections.
    pub stub_size: Option<u32>,
}

impl SectionData {
    fn new(segname: impl Into<Box<str>>, sectname: impl Into<Box<str>>) -> Self {
        SectionData {
            segname: segname.into(),
            sectname: sectname.into(),
            flags: SectionFlags::default(),
            align: 0,
            frags: Vec::new(),
            indirect_symbols: Vec::new(),
            stub_size: None,
        }
    }
}

/// All sections created so far, in first-touch order — sections are created
/// lazily the first time `.section`/a bootstrap reference touches them.
pub struct SectionTable {
    sections: PrimaryMap<Section, SectionData>,
    by_name: std::collections::HashMap<(Box<str>, Box<str>), Section>,
}

impl SectionTable {
    pub fn new() -> Self {
        SectionTable {
            sections: PrimaryMap::new(),
            by_name: std::collections::HashMap::new(),
        }
    }

    /// Create-on-first-touch lookup: a section springs into existence the
    /// first time a directive or label references it.
    pub fn get_or_create(&mut self, segname: &str, sectname: &str) -> Section {
        let key = (segname.into(), sectname.into());
        if let Some(&sect) = self.by_name.get(&key) {
            return sect;
        }
        let sect = self.sections.push(SectionData::new(segname, sectname));
        self.by_name.insert(key, sect);
        sect
    }

    pub fn get(&self, section: Section) -> &SectionData {
        &self.sections[section]
    }

    pub fn get_mut(&mut self, section: Section) -> &mut SectionData {
        &mut self.sections[section]
    }

    /// Iterate every section in creation order, the order Mach-O segment
    /// load commands are emitted in.
    pub fn iter(&self) -> impl Iterator<Item = (Section, &SectionData)> {
        self.sections.iter()
    }

    /// The distinguished bootstrap section every translation unit starts in
    /// unless `-n` is given.
    pub fn bootstrap(&mut self) -> Section {
        self.get_or_create("__TEXT", "__text")
    }
}

impl Default for SectionTable {
    fn default() -> Self {
        Self::new()
    }
}
