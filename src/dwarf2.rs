//! DWARF-2 debug-info emission.
//!
//! Mirrors `cctools`'s `as/dwarf2dbg.c`:
//! every `.file`/`.loc` (and, implicitly, every label-bearing statement while
//! `--gdwarf2` is active) records a `(file, line, column, address)` row; at
//! end-of-file the rows are handed to a line-number program and the
//! `.debug_line`/`.debug_info`/`.debug_abbrev` section bytes are produced
//! (`dwarf2_finish` in the original, which in addition to the line program
//! synthesizes the one compile-unit DIE per translation unit and its
//! `.debug_aranges` entry). This crate builds the line program and the DIE
//! tree with `gimli::write` rather than hand-rolling DWARF opcode/DIE
//! encoding; `.debug_aranges` is assembled directly, since `gimli::write`
//! has no writer for that table (confirmed against the DWARF-producing
//! examples in this pack — none exercise an arange writer, only the reader
//! side's `SectionId::DebugAranges`).

use std::collections::HashMap;

use gimli::write::{
    Address, AttributeValue, DwarfUnit, EndianVec, LineProgram, LineString, Range, RangeList, Sections,
};
use gimli::{Encoding, Format, LineEncoding, RunTimeEndian};

/// One `.file N "path"` entry.
#[derive(Clone, Debug)]
pub struct FileEntry {
    pub number: u32,
    pub path: Box<str>,
}

/// One recorded `.loc file line [column]` row, anchored to a byte offset
/// within the text section rather than a final address — the offset is
/// resolved to an absolute address only once layout has run.
#[derive(Clone, Copy, Debug)]
pub struct LocRow {
    pub file: u32,
    pub line: u32,
    pub column: u32,
    pub address_offset: u64,
}

/// Accumulates `.file`/`.loc` directives over one translation unit. Owned by
/// the driver; fed by the reader each time it dispatches those pseudo-ops
/// (kept out of `reader::Reader` itself since DWARF emission is strictly an
/// end-of-file concern, unlike the frag/symbol bookkeeping the reader owns
/// incrementally).
#[derive(Default)]
pub struct Dwarf2Builder {
    files: HashMap<u32, FileEntry>,
    rows: Vec<LocRow>,
}

impl Dwarf2Builder {
    pub fn new() -> Self {
        Dwarf2Builder::default()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn add_file(&mut self, number: u32, path: impl Into<Box<str>>) {
        self.files.insert(number, FileEntry { number, path: path.into() });
    }

    pub fn add_row(&mut self, file: u32, line: u32, column: u32, address_offset: u64) {
        self.rows.push(LocRow { file, line, column, address_offset });
    }

    /// Build every DWARF-2 debug section for a translation unit whose final
    /// section layout is now known (post-layout): `.debug_line` (the
    /// `(file,line,column,address)` rows captured during assembly),
    /// `.debug_info`/`.debug_abbrev` (one `DW_TAG_compile_unit` plus one
    /// `DW_TAG_subprogram` per entry in `labels`), `.debug_aranges` (one
    /// entry per contiguous text range in `ranges`), and, only when the
    /// code is non-contiguous (`ranges.len() > 1`), `.debug_ranges`.
    ///
    /// `labels` is `(name, absolute address)` for every symbol defined in a
    /// text section, in increasing-address order; each subprogram's
    /// `DW_AT_high_pc` is sized to the next label's address (or the end of
    /// its range, for the last label in a range) since the format has no
    /// notion of a label's extent beyond that.
    pub fn emit(&self, comp_dir: &str, comp_name: &str, ranges: &[(u64, u64)], labels: &[(Box<str>, u64)]) -> Dwarf2Output {
        let encoding = Encoding { format: Format::Dwarf32, version: 2, address_size: 4 };
        let mut dwarf = DwarfUnit::new(encoding);

        let mut line_program = LineProgram::new(
            encoding,
            LineEncoding::default(),
            LineString::String(comp_dir.as_bytes().to_vec()),
            LineString::String(comp_name.as_bytes().to_vec()),
            None,
        );

        let mut file_ids = HashMap::new();
        let mut sorted_files: Vec<&FileEntry> = self.files.values().collect();
        sorted_files.sort_by_key(|f| f.number);
        for entry in sorted_files {
            let id = line_program.add_file(LineString::String(entry.path.as_bytes().to_vec()), line_program.default_directory(), None);
            file_ids.insert(entry.number, id);
        }

        let mut rows = self.rows.clone();
        rows.sort_by_key(|r| r.address_offset);

        if let Some(&(text_base, text_len)) = ranges.first() {
            line_program.begin_sequence(Some(Address::Constant(text_base)));
            for row in &rows {
                let file_id = file_ids.get(&row.file).copied().unwrap_or_else(|| line_program.default_file());
                let r = line_program.row();
                r.address_offset = row.address_offset;
                r.file = file_id;
                r.line = row.line as u64;
                r.column = row.column as u64;
                line_program.generate_row();
            }
            line_program.end_sequence(text_len);
        }

        dwarf.unit.line_program = line_program;

        let root = dwarf.unit.root();
        {
            let cu = dwarf.unit.get_mut(root);
            cu.set(gimli::DW_AT_producer, AttributeValue::String(b"mach_as".to_vec()));
            cu.set(gimli::DW_AT_name, AttributeValue::String(comp_name.as_bytes().to_vec()));
            cu.set(gimli::DW_AT_comp_dir, AttributeValue::String(comp_dir.as_bytes().to_vec()));
            match ranges {
                [] => {}
                [(base, len)] => {
                    cu.set(gimli::DW_AT_low_pc, AttributeValue::Address(Address::Constant(*base)));
                    cu.set(gimli::DW_AT_high_pc, AttributeValue::Udata(*len));
                }
                _ => {
                    let list = RangeList(
                        ranges
                            .iter()
                            .map(|&(base, len)| Range::StartLength { begin: Address::Constant(base), length: len })
                            .collect(),
                    );
                    let list_id = dwarf.unit.ranges.add(list);
                    cu.set(gimli::DW_AT_ranges, AttributeValue::RangeListRef(list_id));
                }
            }
        }

        for (i, (name, address)) in labels.iter().enumerate() {
            let range_end = ranges
                .iter()
                .find(|&&(base, len)| *address >= base && *address < base + len)
                .map(|&(base, len)| base + len)
                .unwrap_or(*address);
            let high_pc = labels
                .get(i + 1)
                .map(|(_, next)| *next)
                .filter(|&next| next > *address)
                .unwrap_or(range_end)
                .saturating_sub(*address);

            let die = dwarf.unit.add(root, gimli::DW_TAG_subprogram);
            let entry = dwarf.unit.get_mut(die);
            entry.set(gimli::DW_AT_name, AttributeValue::String(name.as_bytes().to_vec()));
            entry.set(gimli::DW_AT_low_pc, AttributeValue::Address(Address::Constant(*address)));
            entry.set(gimli::DW_AT_high_pc, AttributeValue::Udata(high_pc));
            entry.set(gimli::DW_AT_external, AttributeValue::Flag(true));
        }

        let mut sections = Sections::new(EndianVec::new(RunTimeEndian::Big));
        dwarf
            .write(&mut sections)
            .expect("in-memory DWARF-2 encoding cannot fail");

        Dwarf2Output {
            debug_line: sections.debug_line.slice().to_vec(),
            debug_info: sections.debug_info.slice().to_vec(),
            debug_abbrev: sections.debug_abbrev.slice().to_vec(),
            debug_aranges: build_debug_aranges(ranges),
            debug_ranges: if ranges.len() > 1 { Some(sections.debug_ranges.slice().to_vec()) } else { None },
        }
    }
}

/// Every DWARF-2 section `Dwarf2Builder::emit` produces.
pub struct Dwarf2Output {
    pub debug_line: Vec<u8>,
    pub debug_info: Vec<u8>,
    pub debug_abbrev: Vec<u8>,
    pub debug_aranges: Vec<u8>,
    /// `None` when the code is one contiguous range — `.debug_ranges` would
    /// be empty, so it's simply not emitted rather than adding a section
    /// with only a terminator.
    pub debug_ranges: Option<Vec<u8>>,
}

/// Hand-packs a `.debug_aranges` set per the DWARF-2 fixed layout (`gimli::write`
/// has no writer for this table): a 4-byte unit length, a 2-byte version, a
/// 4-byte offset into `.debug_info` (always 0 — this crate emits exactly one
/// compile unit per object), 1-byte address size, 1-byte segment-selector
/// size, padding out to a `2 * address_size` boundary, then one
/// `(address, length)` tuple per range and a zero tuple terminator.
fn build_debug_aranges(ranges: &[(u64, u64)]) -> Vec<u8> {
    const ADDRESS_SIZE: usize = 4;
    const TUPLE_SIZE: usize = ADDRESS_SIZE * 2;

    let mut body = Vec::new();
    body.extend_from_slice(&2u16.to_be_bytes()); // version
    body.extend_from_slice(&0u32.to_be_bytes()); // debug_info offset
    body.push(ADDRESS_SIZE as u8); // address_size
    body.push(0); // segment_selector_size

    let header_len = 4 + body.len(); // unit_length field itself counts toward the alignment base
    let padding = (TUPLE_SIZE - (header_len % TUPLE_SIZE)) % TUPLE_SIZE;
    body.resize(body.len() + padding, 0);

    for &(base, len) in ranges {
        body.extend_from_slice(&(base as u32).to_be_bytes());
        body.extend_from_slice(&(len as u32).to_be_bytes());
    }
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&0u32.to_be_bytes());

    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    out
}
