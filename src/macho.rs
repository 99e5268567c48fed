//! Mach-O object writer.
//!
//! Mirrors `cctools`'s `obj_emit_*` family: segment/section headers in
//! section-table order, relocations per section in `FixList` order, and a
//! flat symbol table in `SymbolTable::index_order()` (or, under `-dynamic`,
//! `macho_symbol_order`'s locals/defined-externs/undefined-externs
//! partition). Written through the `object` crate's generic `write::Object`
//! for everything it has an API for; `LC_DYSYMTAB` and the indirect-symbol
//! table it needs are not exposed by that API at all, so those are spliced
//! into the finished bytes by walking the load commands the way any Mach-O
//! reader does (`cmd`/`cmdsize` pairs) — see `append_dysymtab`.

use object::write::{Object, Relocation, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, RelocationFlags, SectionKind, SymbolFlags as ObjSymbolFlags,
    SymbolKind as ObjSymbolKind, SymbolScope,
};

use crate::dwarf2::Dwarf2Output;
use crate::ir::fixup::RelocKind;
use crate::ir::{FixList, FragArena, SectionTable, SymbolTable};

/// PPC Mach-O relocation type codes (`mach-o/ppc/reloc.h` in the original
/// headers): the raw `r_type` nibble this backend's [`RelocKind`] values map
/// to. Kept as a free function rather than a `From` impl since the mapping
/// is Mach-O-specific, not a general property of `RelocKind`.
/// `cmd` values this writer's post-processing pass cares about
/// (`mach-o/loader.h`).
const LC_SEGMENT: u32 = 0x1;
const LC_SYMTAB: u32 = 0x2;
const LC_DYSYMTAB: u32 = 0xb;

fn read_u32_be(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_u32_be(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Group symbols the way `LC_DYSYMTAB` requires: locals first, then defined
/// externs, then undefined externs, each of the latter two sorted by name —
/// `dysymtab_command`'s `ilocalsym`/`iextdefsym`/`iundefsym` fields assume
/// the symbol table is already partitioned this way; `object`'s generic
/// writer has no notion of the partition, so this crate picks the order
/// itself before handing symbols to `Object::add_symbol`. A `private_extern`
/// symbol counts as local here — it is not visible to the dynamic linker
/// even though `SymbolFlags::external` may also be set.
fn macho_symbol_order(symbols: &SymbolTable) -> (Vec<crate::ir::symbol::Symbol>, u32, u32, u32) {
    let mut locals = Vec::new();
    let mut ext_defined = Vec::new();
    let mut ext_undefined = Vec::new();
    for &sym in symbols.index_order() {
        let data = symbols.get(sym);
        let dynamically_visible = data.flags.external && !data.flags.private_extern;
        if !dynamically_visible {
            locals.push(sym);
        } else if data.kind == crate::ir::symbol::SymbolKind::Undefined {
            ext_undefined.push(sym);
        } else {
            ext_defined.push(sym);
        }
    }
    ext_defined.sort_by(|&a, &b| symbols.get(a).name.cmp(&symbols.get(b).name));
    ext_undefined.sort_by(|&a, &b| symbols.get(a).name.cmp(&symbols.get(b).name));
    let n_local = locals.len() as u32;
    let n_ext_defined = ext_defined.len() as u32;
    let n_ext_undefined = ext_undefined.len() as u32;
    let mut order = locals;
    order.extend(ext_defined);
    order.extend(ext_undefined);
    (order, n_local, n_ext_defined, n_ext_undefined)
}

/// Splice an `LC_DYSYMTAB` load command and its indirect-symbol table into
/// an already-written Mach-O object. `object::write`'s Mach-O backend has no
/// public API for either, so this walks the load commands the generic way
/// any Mach-O reader does — by `cmd`/`cmdsize` pairs, not by assuming where
/// `object` placed anything — and patches every file-offset field that now
/// needs to shift past the inserted command, then appends the
/// `reserved1`-addressed indirect-symbol table at the end of the file.
/// `reserved1_per_section` gives, in the same order sections were added to
/// the object (`__debug_line` first if present, then `sections.iter()`),
/// the starting index into the flat `indirect_syms` table for sections that
/// have indirect symbols, or `0` for ones that don't.
fn append_dysymtab(
    bytes: Vec<u8>,
    n_local: u32,
    n_ext_defined: u32,
    n_ext_undefined: u32,
    indirect_syms: &[u32],
    reserved1_per_section: &[u32],
) -> Vec<u8> {
    const DYSYMTAB_SIZE: u32 = 80;

    let mut bytes = bytes;
    let ncmds = read_u32_be(&bytes, 16);
    let sizeofcmds = read_u32_be(&bytes, 20);
    let old_end = 28 + sizeofcmds as usize;

    let mut cursor = 28usize;
    let mut section_index = 0usize;
    while cursor < old_end {
        let cmd = read_u32_be(&bytes, cursor);
        let cmdsize = read_u32_be(&bytes, cursor + 4);
        match cmd {
            LC_SEGMENT => {
                let fileoff = read_u32_be(&bytes, cursor + 32);
                if fileoff != 0 {
                    write_u32_be(&mut bytes, cursor + 32, fileoff + DYSYMTAB_SIZE);
                }
                let nsects = read_u32_be(&bytes, cursor + 48);
                let mut sect_off = cursor + 56;
                for _ in 0..nsects {
                    let data_off = read_u32_be(&bytes, sect_off + 40);
                    if data_off != 0 {
                        write_u32_be(&mut bytes, sect_off + 40, data_off + DYSYMTAB_SIZE);
                    }
                    let reloff = read_u32_be(&bytes, sect_off + 48);
                    if reloff != 0 {
                        write_u32_be(&mut bytes, sect_off + 48, reloff + DYSYMTAB_SIZE);
                    }
                    if let Some(&reserved1) = reserved1_per_section.get(section_index) {
                        write_u32_be(&mut bytes, sect_off + 60, reserved1);
                    }
                    section_index += 1;
                    sect_off += 68;
                }
            }
            LC_SYMTAB => {
                let symoff = read_u32_be(&bytes, cursor + 8);
                if symoff != 0 {
                    write_u32_be(&mut bytes, cursor + 8, symoff + DYSYMTAB_SIZE);
                }
                let stroff = read_u32_be(&bytes, cursor + 16);
                if stroff != 0 {
                    write_u32_be(&mut bytes, cursor + 16, stroff + DYSYMTAB_SIZE);
                }
            }
            _ => {}
        }
        cursor += cmdsize as usize;
    }

    let indirect_off = bytes.len() as u32 + DYSYMTAB_SIZE;

    let mut dysymtab = vec![0u8; DYSYMTAB_SIZE as usize];
    write_u32_be(&mut dysymtab, 0, LC_DYSYMTAB);
    write_u32_be(&mut dysymtab, 4, DYSYMTAB_SIZE);
    write_u32_be(&mut dysymtab, 8, 0); // ilocalsym
    write_u32_be(&mut dysymtab, 12, n_local);
    write_u32_be(&mut dysymtab, 16, n_local); // iextdefsym
    write_u32_be(&mut dysymtab, 20, n_ext_defined);
    write_u32_be(&mut dysymtab, 24, n_local + n_ext_defined); // iundefsym
    write_u32_be(&mut dysymtab, 28, n_ext_undefined);
    write_u32_be(&mut dysymtab, 32, 0); // tocoff
    write_u32_be(&mut dysymtab, 36, 0); // ntoc
    write_u32_be(&mut dysymtab, 40, 0); // modtaboff
    write_u32_be(&mut dysymtab, 44, 0); // nmodtab
    write_u32_be(&mut dysymtab, 48, 0); // extrefsymoff
    write_u32_be(&mut dysymtab, 52, 0); // nextrefsyms
    write_u32_be(&mut dysymtab, 56, indirect_off);
    write_u32_be(&mut dysymtab, 60, indirect_syms.len() as u32);
    write_u32_be(&mut dysymtab, 64, 0); // extreloff
    write_u32_be(&mut dysymtab, 68, 0); // nextrel
    write_u32_be(&mut dysymtab, 72, 0); // locreloff
    write_u32_be(&mut dysymtab, 76, 0); // nlocrel

    write_u32_be(&mut bytes, 16, ncmds + 1);
    write_u32_be(&mut bytes, 20, sizeofcmds + DYSYMTAB_SIZE);

    let mut out = Vec::with_capacity(bytes.len() + DYSYMTAB_SIZE as usize + indirect_syms.len() * 4);
    out.extend_from_slice(&bytes[..old_end]);
    out.extend_from_slice(&dysymtab);
    out.extend_from_slice(&bytes[old_end..]);
    for &idx in indirect_syms {
        out.extend_from_slice(&idx.to_be_bytes());
    }
    out
}

fn raw_reloc_type(kind: RelocKind) -> u8 {
    match kind {
        RelocKind::Vanilla => 0,
        RelocKind::PairLo16 | RelocKind::PairHi16 | RelocKind::PairHa16 => 1,
        RelocKind::Br14 => 2,
        RelocKind::Br24 => 3,
        RelocKind::Hi16 => 4,
        RelocKind::Lo16 => 5,
        RelocKind::Ha16 => 6,
        RelocKind::Lo14 => 7,
        RelocKind::Br14Predicted => 15,
        RelocKind::Jbsr => 19,
    }
}

/// Assemble the final object file bytes. `sections`/`frags`/`symbols`/`fixes`
/// are the completed state after the reader has processed every statement
/// and [`crate::layout::layout`] has assigned addresses. `resolved` marks,
/// in the same order [`FixList::iter`] walks `fixes`, which ones
/// [`crate::layout::resolve_and_apply_fixes`] already patched directly into
/// the frag bytes — those are skipped here rather than also emitted as a
/// relocation.
pub fn write_object(
    sections: &SectionTable,
    frags: &FragArena,
    symbols: &SymbolTable,
    fixes: &FixList,
    resolved: &[bool],
    subsections_via_symbols: bool,
    dynamic: bool,
    debug: Option<Dwarf2Output>,
) -> Vec<u8> {
    let mut object = Object::new(BinaryFormat::MachO, Architecture::PowerPc, Endianness::Big);
    object.flags = object::write::FileFlags::MachO {
        flags: if subsections_via_symbols { 0x2000 } else { 0 },
    };

    // Tracks, in the exact order sections are added to `object` below, how
    // many indirect symbols each one contributes — `__debug_line` (if
    // present) never does.
    let mut indirect_counts_per_section = Vec::new();

    if let Some(debug) = debug {
        let mut add_debug_section = |name: &[u8], data: Vec<u8>| {
            let id = object.add_section(b"__DWARF".to_vec(), name.to_vec(), SectionKind::Debug);
            object.set_section_data(id, data, 1);
            indirect_counts_per_section.push(0usize);
        };
        add_debug_section(b"__debug_line", debug.debug_line);
        add_debug_section(b"__debug_info", debug.debug_info);
        add_debug_section(b"__debug_abbrev", debug.debug_abbrev);
        add_debug_section(b"__debug_aranges", debug.debug_aranges);
        if let Some(debug_ranges) = debug.debug_ranges {
            add_debug_section(b"__debug_ranges", debug_ranges);
        }
    }

    let mut section_ids = std::collections::HashMap::new();
    for (section, data) in sections.iter() {
        let kind = if data.flags.zerofill {
            SectionKind::UninitializedData
        } else if data.segname.as_ref() == "__TEXT" {
            SectionKind::Text
        } else {
            SectionKind::Data
        };
        let id = object.add_section(data.segname.as_bytes().to_vec(), data.sectname.as_bytes().to_vec(), kind);
        let mut bytes = Vec::new();
        for &frag in &data.frags {
            let fd = frags.get(frag);
            bytes.extend_from_slice(&fd.literal);
        }
        if !data.flags.zerofill {
            object.set_section_data(id, bytes, 1 << data.align.max(0));
        } else {
            object.section_mut(id).size = bytes.len() as u64;
        }
        section_ids.insert(section, id);
        indirect_counts_per_section.push(data.indirect_symbols.len());
    }

    let section_of_frag: std::collections::HashMap<_, _> = sections
        .iter()
        .flat_map(|(id, data)| data.frags.iter().map(move |&f| (f, id)))
        .collect();

    // `LC_DYSYMTAB` needs the symbol table partitioned locals/defined-
    // externs/undefined-externs; plain assemblies (no `-dynamic`) keep the
    // general `index_order()` invariant other consumers (e.g. `.dump`) rely
    // on instead.
    let (symbol_emit_order, n_local, n_ext_defined, n_ext_undefined) = if dynamic {
        macho_symbol_order(symbols)
    } else {
        (symbols.index_order().to_vec(), 0, 0, 0)
    };

    let mut symbol_ids = std::collections::HashMap::new();
    let mut symbol_index = std::collections::HashMap::new();
    for (i, &sym) in symbol_emit_order.iter().enumerate() {
        symbol_index.insert(sym, i as u32);
        let data = symbols.get(sym);
        let (kind, section) = match data.kind {
            crate::ir::symbol::SymbolKind::Undefined => (ObjSymbolKind::Unknown, SymbolSection::Undefined),
            crate::ir::symbol::SymbolKind::Absolute => (ObjSymbolKind::Text, SymbolSection::Absolute),
            crate::ir::symbol::SymbolKind::Section => {
                let frag = data.frag.expect("a SECT-kind symbol always has a defining frag");
                let section = *section_of_frag.get(&frag).expect("frag belongs to some section");
                (ObjSymbolKind::Text, SymbolSection::Section(section_ids[&section]))
            }
        };
        let scope = if data.flags.private_extern {
            SymbolScope::Linkage
        } else if data.flags.external {
            SymbolScope::Dynamic
        } else {
            SymbolScope::Compilation
        };
        let id = object.add_symbol(Symbol {
            name: data.name.as_bytes().to_vec(),
            value: data.value,
            size: 0,
            kind,
            scope,
            weak: data.flags.weak_definition || data.flags.weak_reference,
            section,
            flags: ObjSymbolFlags::MachO { n_desc: data.desc as u16 },
        });
        symbol_ids.insert(sym, id);
    }

    for (fix, &already_resolved) in fixes.iter().zip(resolved.iter()) {
        if already_resolved {
            continue;
        }
        let Some(section) = section_of_frag.get(&fix.frag).copied() else { continue };
        let object_section = section_ids[&section];
        let Some(add_symbol) = fix.add_symbol else { continue };
        let Some(&symbol_id) = symbol_ids.get(&add_symbol) else { continue };
        let raw_type = raw_reloc_type(fix.reloc);
        let _ = object.add_relocation(
            object_section,
            Relocation {
                offset: fix.where_ as u64,
                symbol: symbol_id,
                addend: fix.addend,
                flags: RelocationFlags::MachO {
                    r_type: raw_type,
                    r_pcrel: fix.pcrel,
                    r_length: match fix.size {
                        1 => 0,
                        2 => 1,
                        8 => 3,
                        _ => 2,
                    },
                },
            },
        );
    }

    let bytes = object.write().expect("in-memory Mach-O encoding cannot fail");

    if !dynamic {
        return bytes;
    }

    // Flatten `indirect_symbols` section by section, in the same order
    // those sections were added to `object` above, recording each section's
    // starting offset into the flat table for its `reserved1` field.
    let mut indirect_syms = Vec::new();
    let mut reserved1_per_section = Vec::with_capacity(indirect_counts_per_section.len());
    let mut sections_with_indirect = sections.iter().filter(|(_, data)| !data.indirect_symbols.is_empty());
    for &count in &indirect_counts_per_section {
        if count == 0 {
            reserved1_per_section.push(0);
            continue;
        }
        let (_, data) = sections_with_indirect.next().expect("count matched a section with indirect symbols");
        reserved1_per_section.push(indirect_syms.len() as u32);
        for entry in &data.indirect_symbols {
            let index = *symbol_index.get(&entry.symbol).expect("indirect symbol was interned and indexed");
            indirect_syms.push(index);
        }
    }

    append_dysymtab(bytes, n_local, n_ext_defined, n_ext_undefined, &indirect_syms, &reserved1_per_section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::ir::{FixList, FragArena, SectionTable, SymbolTable};
    use crate::source_loc::SourceLoc;
    use object::{Object as _, ObjectSection as _};
    use std::rc::Rc;

    #[test]
    fn writes_a_minimal_object_with_one_text_section() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let symbols = SymbolTable::new();
        let fixes = FixList::new();

        let section = sections.get_or_create("__TEXT", "__text");
        let frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(frag, &[0x60, 0x00, 0x00, 0x00]);
        sections.get_mut(section).frags = vec![frag];

        let bytes = write_object(&sections, &frags, &symbols, &fixes, &[], true, false, None);
        assert!(!bytes.is_empty());
        assert_eq!(&bytes[0..4], &0xfeedfaceu32.to_be_bytes());
    }

    #[test]
    fn defined_symbol_round_trips_into_the_object() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let fixes = FixList::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");

        let section = sections.get_or_create("__TEXT", "__text");
        let frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(frag, &[0, 0, 0, 0]);
        sections.get_mut(section).frags = vec![frag];
        symbols.define("start", frag, 0, &loc, &diag);

        let bytes = write_object(&sections, &frags, &symbols, &fixes, &[], false, false, None);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn resolved_fixups_do_not_become_relocations() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");

        let section = sections.get_or_create("__TEXT", "__text");
        let frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(frag, &[0, 0, 0, 0]);
        sections.get_mut(section).frags = vec![frag];
        let target = symbols.define("target", frag, 0, &loc, &diag);

        let mut fixes = FixList::new();
        fixes.push(crate::ir::FixData {
            frag,
            where_: 0,
            size: 4,
            add_symbol: Some(target),
            subtract_symbol: None,
            addend: 0,
            pcrel: false,
            reloc: RelocKind::Vanilla,
            sectdiff_divide_by_two: false,
        });

        let bytes = write_object(&sections, &frags, &symbols, &fixes, &[true], false, false, None);
        let obj = object::File::parse(&*bytes).expect("parse object");
        let text = obj.section_by_name("__text").expect("__text section");
        assert_eq!(text.relocations().count(), 0);
    }

    #[test]
    fn indirect_symbol_populates_dysymtab_and_indirect_table() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let fixes = FixList::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");

        let local_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(local_frag, &[0, 0, 0, 0]);
        let local_section = sections.get_or_create("__TEXT", "__text");
        sections.get_mut(local_section).frags = vec![local_frag];
        symbols.define("local_fn", local_frag, 0, &loc, &diag);

        let stub_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(stub_frag, &[0; 16]);
        let stub_section = sections.get_or_create("__TEXT", "__symbol_stub1");
        sections.get_mut(stub_section).frags = vec![stub_frag];

        let undef = symbols.intern("_imported");
        symbols.ensure_in_symbol_table(undef);
        sections.get_mut(stub_section).indirect_symbols.push(crate::ir::section::IndirectSymbolEntry {
            symbol: undef,
            frag: stub_frag,
            offset: 0,
        });

        let bytes = write_object(&sections, &frags, &symbols, &fixes, &[], false, true, None);
        let obj = object::File::parse(&*bytes).expect("parse object with LC_DYSYMTAB spliced in");
        assert!(obj.symbol_by_name("_imported").is_some());
        assert!(obj.symbol_by_name("local_fn").is_some());

        let macho = object::macho::MachHeader32::<object::Endianness>::parse(&*bytes, 0).expect("mach header");
        let endian = macho.0.endianness().unwrap();
        let mut found_dysymtab = false;
        let mut commands = macho.0.load_commands(endian, &*bytes, 0).expect("load commands");
        while let Some(command) = commands.next().expect("iterate load commands") {
            if let Ok(Some(dysymtab)) = command.dysymtab() {
                found_dysymtab = true;
                assert_eq!(dysymtab.nindirectsyms.get(endian), 1);
                let indirect_off = dysymtab.indirectsymoff.get(endian) as usize;
                let index = u32::from_be_bytes(bytes[indirect_off..indirect_off + 4].try_into().unwrap());
                assert_eq!(index as usize, dysymtab.iundefsym.get(endian) as usize);
            }
        }
        assert!(found_dysymtab, "LC_DYSYMTAB must be present under -dynamic");
    }
}
