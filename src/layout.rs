//! Layout: frag address assignment, fixup resolution, relax-to-fill
//! conversion.
//!
//! A `go_again` convergence loop: addresses are assigned in a pass over
//! every section's frags in order, variable-size frags are resized against
//! their now-known address, and the whole thing repeats until no frag's
//! size changed — whether that frag is an `ALIGN` or a `LEB128` whose
//! encoded width depends on a symbol value not yet in scope.

use std::collections::HashMap;

use crate::diagnostics::Diagnostics;
use crate::ir::fixup::RelocKind;
use crate::ir::frag::{encode_sleb128, encode_uleb128, FragKind};
use crate::ir::{FixList, FragArena, Section, SectionTable, SymbolTable};
use crate::isa::TargetIsa;
use crate::source_loc::SourceLoc;

/// Per-section final size in bytes, keyed the same way the Mach-O writer
/// needs when it lays out segment/section load commands.
pub type SectionSizes = HashMap<Section, u64>;

/// Assign every frag an address, materialize `ALIGN` padding against that
/// address, and rewrite every symbol's value from "offset within its
/// defining frag" to "offset from the start of its section" — the
/// representation both `.dump` and the Mach-O writer expect.
///
/// Runs to a fixpoint: an `ALIGN` frag's padding depends on the address it
/// starts at, which depends on every frag before it, which can itself be
/// another not-yet-resolved `ALIGN` or `LEB128` frag. Both kinds only ever
/// shrink towards their final encoded size as addresses stabilize, so the
/// loop always converges; it's kept as a `go_again` loop rather than
/// hardcoded to a fixed pass count so a future relaxable frag kind doesn't
/// silently break convergence.
///
/// A `LEB128` frag whose expression spans two sections can't always be
/// resolved within this function's single per-section pass (the other
/// section's addresses may not exist yet) — `diag` reports that case the
/// same way an unresolved absolute expression would.
pub fn layout(
    sections: &mut SectionTable,
    frags: &mut FragArena,
    symbols: &mut SymbolTable,
    diag: &Diagnostics,
) -> SectionSizes {
    let mut sizes = SectionSizes::new();

    let section_ids: Vec<Section> = sections.iter().map(|(id, _)| id).collect();
    for section in section_ids {
        let mut go_again = true;
        let mut size = 0u64;
        let mut pass = 0u32;
        while go_again {
            go_again = false;
            pass += 1;
            log::trace!("layout pass {pass} over section");
            let mut address = 0u64;
            let frag_ids = sections.get(section).frags.clone();
            for &frag in &frag_ids {
                frags.get_mut(frag).address = address;
                let frag_size = match frags.get(frag).kind.clone() {
                    FragKind::Align { pow2, fill_size, max_pad } => {
                        let alignment = 1u64 << pow2;
                        let misalignment = address % alignment;
                        let mut pad = if misalignment == 0 { 0 } else { alignment - misalignment };
                        if let Some(max_pad) = max_pad {
                            pad = pad.min(max_pad as u64);
                        }
                        let fill_size = fill_size.max(1) as u64;
                        let pad = pad - (pad % fill_size);
                        let data = frags.get_mut(frag);
                        if data.literal.len() as u64 != pad {
                            go_again = true;
                        }
                        let unit = data.literal.get(0..fill_size as usize).map(|s| s.to_vec()).unwrap_or(vec![0]);
                        let mut literal = Vec::with_capacity(pad as usize);
                        while (literal.len() as u64) < pad {
                            literal.extend_from_slice(&unit);
                        }
                        literal.truncate(pad as usize);
                        data.literal = literal;
                        data.fix_size = pad as u32;
                        pad
                    }
                    FragKind::Org => {
                        let (sym, user_offset) = {
                            let data = frags.get(frag);
                            (data.symbol, data.offset)
                        };
                        let target = if let Some(sym) = sym {
                            let sym_data = symbols.get(sym);
                            let base = sym_data.frag.map(|f| frags.get(f).address).unwrap_or(0);
                            (base as i64 + sym_data.value as i64 + user_offset).max(0) as u64
                        } else {
                            user_offset.max(0) as u64
                        };
                        let gap = if target < address { 0 } else { target - address };
                        let fdata = frags.get_mut(frag);
                        if fdata.literal.len() as u64 != gap {
                            go_again = true;
                        }
                        fdata.literal = vec![0u8; gap as usize];
                        fdata.fix_size = gap as u32;
                        gap
                    }
                    FragKind::Fill { repeat } => frags.get(frag).literal.len() as u64 * repeat.max(1) as u64,
                    FragKind::Leb128 { signed } => {
                        let (add_sym, sub_sym, addend, line, file) = {
                            let data = frags.get(frag);
                            (data.symbol, data.subtract_symbol, data.offset, data.line, data.file.clone())
                        };
                        let resolved_value = match (add_sym, sub_sym) {
                            (None, None) => Some(addend),
                            (Some(add), None) => {
                                let add_data = symbols.get(add);
                                add_data
                                    .frag
                                    .map(|f| frags.get(f).address as i64 + add_data.value as i64 + addend)
                            }
                            (Some(add), Some(sub)) => {
                                let (add_data, sub_data) = (symbols.get(add), symbols.get(sub));
                                match (add_data.frag, sub_data.frag) {
                                    (Some(af), Some(sf)) => {
                                        let add_addr = frags.get(af).address as i64 + add_data.value as i64;
                                        let sub_addr = frags.get(sf).address as i64 + sub_data.value as i64;
                                        Some(add_addr - sub_addr + addend)
                                    }
                                    _ => None,
                                }
                            }
                            (None, Some(_)) => None,
                        };
                        let value = match resolved_value {
                            Some(v) => v,
                            None => {
                                let loc = SourceLoc { file, logical_line: line.max(1), physical_line: line.max(1), column: 0 };
                                diag.bad(&loc, "uleb128/sleb128 expression could not be resolved");
                                0
                            }
                        };
                        let bytes = if signed { encode_sleb128(value) } else { encode_uleb128(value as u64) };
                        let data = frags.get_mut(frag);
                        if data.literal.len() != bytes.len() {
                            go_again = true;
                        }
                        data.fix_size = bytes.len() as u32;
                        data.literal = bytes;
                        data.literal.len() as u64
                    }
                    _ => frags.get(frag).literal.len() as u64,
                };
                address += frag_size;
            }
            size = address;
        }
        sizes.insert(section, size);
    }

    // Rewrite symbol values from frag-relative to section-relative offsets.
    let symbol_ids: Vec<_> = symbols.name_order().to_vec();
    for sym in symbol_ids {
        let Some(frag) = symbols.get(sym).frag else { continue };
        let base = frags.get(frag).address;
        let data = symbols.get_mut(sym);
        data.value += base;
    }

    sizes
}

/// Resolve every fixup that can be fully determined from this object file
/// alone, baking the value directly into its frag's bytes instead of
/// leaving it to be emitted as a Mach-O relocation:
///
/// - a `DIFFSECT`-shaped fix (`add_symbol - subtract_symbol`) whose two
///   symbols both ended up defined in the same section — the original's
///   "diff-in-section resolution", since both halves move together under
///   any later relocation of that section;
/// - a PC-relative fix (branch displacement) whose single `add_symbol` is
///   defined in the same section as the fix's own frag — the displacement
///   between two points in the same section is already a link-time
///   invariant.
///
/// Any other fix (a plain reference to a symbol that isn't proven
/// same-section, or one whose symbol is undefined entirely) is left
/// untouched for [`crate::macho::write_object`] to emit as a relocation.
/// Returns, in the same order as [`FixList::iter`], whether each fix was
/// resolved here.
pub fn resolve_and_apply_fixes(
    fixes: &FixList,
    frags: &mut FragArena,
    sections: &SectionTable,
    symbols: &SymbolTable,
    isa: &dyn TargetIsa,
    diag: &Diagnostics,
) -> Vec<bool> {
    let section_of_frag: HashMap<_, _> = sections
        .iter()
        .flat_map(|(id, data)| data.frags.iter().map(move |&f| (f, id)))
        .collect();

    let mut resolved = Vec::new();
    for fix in fixes.iter() {
        let value = match (fix.add_symbol, fix.subtract_symbol) {
            (Some(add), Some(sub)) => {
                let (add_data, sub_data) = (symbols.get(add), symbols.get(sub));
                match (add_data.frag, sub_data.frag) {
                    (Some(add_frag), Some(sub_frag))
                        if section_of_frag.get(&add_frag) == section_of_frag.get(&sub_frag) =>
                    {
                        let mut v = add_data.value as i64 - sub_data.value as i64 + fix.addend;
                        if fix.sectdiff_divide_by_two {
                            v /= 2;
                        }
                        Some(v)
                    }
                    _ => None,
                }
            }
            (Some(add), None) if fix.pcrel => {
                let add_data = symbols.get(add);
                let own_section = section_of_frag.get(&fix.frag).copied();
                match add_data.frag {
                    Some(add_frag) if section_of_frag.get(&add_frag).copied() == own_section => {
                        let pc = frags.get(fix.frag).address + fix.where_ as u64;
                        Some(add_data.value as i64 - pc as i64 + fix.addend)
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        let Some(value) = value else {
            resolved.push(false);
            continue;
        };

        let at = fix.where_ as usize;
        let size = fix.size as usize;
        let frag_data = frags.get(fix.frag);
        let loc = SourceLoc {
            file: frag_data.file.clone(),
            logical_line: frag_data.line.max(1),
            physical_line: frag_data.line.max(1),
            column: 0,
        };

        let patched = if fix.reloc == RelocKind::Vanilla {
            if at + size > frag_data.literal.len() {
                resolved.push(false);
                continue;
            }
            let bytes = value.to_be_bytes();
            let start = bytes.len() - size;
            let frag_data = frags.get_mut(fix.frag);
            frag_data.literal[at..at + size].copy_from_slice(&bytes[start..]);
            true
        } else if at + 4 <= frag_data.literal.len() {
            let existing = u32::from_be_bytes(frag_data.literal[at..at + 4].try_into().unwrap());
            let new_word = isa.apply_fixup(existing, fix.reloc, value, diag, &loc);
            let frag_data = frags.get_mut(fix.frag);
            frag_data.literal[at..at + 4].copy_from_slice(&new_word.to_be_bytes());
            true
        } else {
            false
        };
        resolved.push(patched);
    }
    log::trace!(
        "resolved {} of {} fixups in place, no relocation needed",
        resolved.iter().filter(|&&r| r).count(),
        resolved.len()
    );
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::ir::fixup::FixData;
    use crate::isa::ppc::PpcIsa;
    use crate::source_loc::SourceLoc;
    use std::rc::Rc;

    #[test]
    fn same_section_difference_resolves_without_a_relocation() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let section = sections.get_or_create("__TEXT", "__text");

        let a = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(a, &[0u8; 4]);
        let b = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(b, &[0, 0, 0, 0, 0, 0, 0, 0]);
        sections.get_mut(section).frags = vec![a, b];

        let start = symbols.define("start", a, 0, &loc, &diag);
        let here = symbols.define("here", b, 4, &loc, &diag);

        let mut fixes = FixList::new();
        fixes.push(FixData {
            frag: b,
            where_: 0,
            size: 4,
            add_symbol: Some(here),
            subtract_symbol: Some(start),
            addend: 0,
            pcrel: false,
            reloc: RelocKind::Vanilla,
            sectdiff_divide_by_two: false,
        });

        layout(&mut sections, &mut frags, &mut symbols, &diag);
        let isa = PpcIsa::default();
        let resolved = resolve_and_apply_fixes(&fixes, &mut frags, &sections, &symbols, &isa, &diag);

        assert_eq!(resolved, vec![true]);
        let bytes = &frags.get(b).literal[0..4];
        assert_eq!(u32::from_be_bytes(bytes.try_into().unwrap()), 8);
    }

    #[test]
    fn cross_section_difference_is_left_as_a_relocation() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let text = sections.get_or_create("__TEXT", "__text");
        let data = sections.get_or_create("__DATA", "__data");

        let a = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(a, &[0u8; 4]);
        sections.get_mut(text).frags = vec![a];
        let b = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(b, &[0u8; 4]);
        sections.get_mut(data).frags = vec![b];

        let in_text = symbols.define("in_text", a, 0, &loc, &diag);
        let in_data = symbols.define("in_data", b, 0, &loc, &diag);

        let mut fixes = FixList::new();
        fixes.push(FixData {
            frag: b,
            where_: 0,
            size: 4,
            add_symbol: Some(in_data),
            subtract_symbol: Some(in_text),
            addend: 0,
            pcrel: false,
            reloc: RelocKind::Vanilla,
            sectdiff_divide_by_two: false,
        });

        layout(&mut sections, &mut frags, &mut symbols, &diag);
        let isa = PpcIsa::default();
        let resolved = resolve_and_apply_fixes(&fixes, &mut frags, &sections, &symbols, &isa, &diag);
        assert_eq!(resolved, vec![false]);
    }

    #[test]
    fn local_branch_in_the_same_section_bakes_in_the_displacement() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let section = sections.get_or_create("__TEXT", "__text");

        let target_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(target_frag, &[0x38, 0x21, 0x00, 0x00]);
        let branch_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(branch_frag, &[0x41, 0x82, 0x00, 0x00]);
        sections.get_mut(section).frags = vec![target_frag, branch_frag];

        let target = symbols.define("1", target_frag, 0, &loc, &diag);

        let mut fixes = FixList::new();
        fixes.push(FixData {
            frag: branch_frag,
            where_: 0,
            size: 4,
            add_symbol: Some(target),
            subtract_symbol: None,
            addend: 0,
            pcrel: true,
            reloc: RelocKind::Br14,
            sectdiff_divide_by_two: false,
        });

        layout(&mut sections, &mut frags, &mut symbols, &diag);
        let isa = PpcIsa::default();
        let resolved = resolve_and_apply_fixes(&fixes, &mut frags, &sections, &symbols, &isa, &diag);

        assert_eq!(resolved, vec![true]);
        let bytes = &frags.get(branch_frag).literal;
        // BO/BI (first halfword) untouched; BD field (target - pc == -4,
        // shifted into the 14-bit displacement slot) baked into the second.
        assert_eq!(&bytes[0..2], &[0x41, 0x82]);
        assert_eq!(&bytes[2..4], &[0xff, 0xfc]);
        assert!(!diag.has_bad_error());
    }

    #[test]
    fn addresses_are_monotone_and_contiguous() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let section = sections.get_or_create("__TEXT", "__text");

        let a = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(a, &[0u8; 4]);
        let b = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(b, &[0u8; 8]);
        sections.get_mut(section).frags = vec![a, b];

        let diag = Diagnostics::new(false, "ppc", true);
        layout(&mut sections, &mut frags, &mut symbols, &diag);
        assert_eq!(frags.get(a).address, 0);
        assert_eq!(frags.get(b).address, 4);
    }

    #[test]
    fn align_frag_pads_to_boundary() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let section = sections.get_or_create("__TEXT", "__text");

        let a = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(a, &[0u8; 3]);
        let align = frags.new_align(2, 0, 1, None, Rc::from("t.s"), 1);
        sections.get_mut(section).frags = vec![a, align];

        let diag = Diagnostics::new(false, "ppc", true);
        layout(&mut sections, &mut frags, &mut symbols, &diag);
        assert_eq!(frags.get(align).address, 3);
        assert_eq!(frags.get(align).literal.len(), 1);
    }

    #[test]
    fn leb128_frag_encodes_symbol_difference_once_addresses_are_known() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let loc = SourceLoc::new("t.s");
        let section = sections.get_or_create("__TEXT", "__text");

        // `leb_frag` is placed after both labels so its own (not-yet-known)
        // size can't perturb the distance it's encoding.
        let start_frag = frags.new_sentinel(Rc::from("t.s"));
        let data_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.push_bytes(data_frag, &[0u8; 200]);
        let end_frag = frags.new_sentinel(Rc::from("t.s"));
        let leb_frag = frags.new_sentinel(Rc::from("t.s"));
        frags.get_mut(leb_frag).var_size = crate::ir::frag::MAX_LEB128_BYTES as u32;
        sections.get_mut(section).frags = vec![start_frag, data_frag, end_frag, leb_frag];

        let start = symbols.define("start", start_frag, 0, &loc, &diag);
        let end = symbols.define("end", end_frag, 0, &loc, &diag);
        frags.get_mut(leb_frag).kind = FragKind::Leb128 { signed: false };
        frags.get_mut(leb_frag).symbol = Some(end);
        frags.get_mut(leb_frag).subtract_symbol = Some(start);

        layout(&mut sections, &mut frags, &mut symbols, &diag);

        // end - start == 200, which ULEB128-encodes in two bytes (0xc8, 0x01).
        assert_eq!(frags.get(leb_frag).literal, vec![0xc8, 0x01]);
        assert!(!diag.has_bad_error());
    }

    #[test]
    fn leb128_frag_with_unresolvable_expression_reports_a_diagnostic() {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let mut symbols = SymbolTable::new();
        let diag = Diagnostics::new(false, "ppc", true);
        let section = sections.get_or_create("__TEXT", "__text");

        let data_frag = frags.new_sentinel(Rc::from("t.s"));
        let leb_frag = frags.new_sentinel(Rc::from("t.s"));
        sections.get_mut(section).frags = vec![data_frag, leb_frag];

        let undefined = symbols.intern("nowhere");
        frags.get_mut(leb_frag).kind = FragKind::Leb128 { signed: false };
        frags.get_mut(leb_frag).symbol = Some(undefined);

        layout(&mut sections, &mut frags, &mut symbols, &diag);
        assert!(diag.has_bad_error());
    }

    proptest::proptest! {
        /// Whatever sequence of plain-byte-span frag sizes a section holds,
        /// layout must assign addresses that are monotone and contiguous:
        /// each frag starts exactly where the previous one ended.
        #[test]
        fn addresses_are_monotone_for_arbitrary_frag_sizes(sizes in proptest::collection::vec(0usize..64, 0..16)) {
            let mut sections = SectionTable::new();
            let mut frags = FragArena::new();
            let mut symbols = SymbolTable::new();
            let section = sections.get_or_create("__TEXT", "__text");

            let ids: Vec<_> = sizes
                .iter()
                .map(|&size| {
                    let f = frags.new_sentinel(Rc::from("t.s"));
                    frags.push_bytes(f, &vec![0u8; size]);
                    f
                })
                .collect();
            sections.get_mut(section).frags = ids.clone();

            layout(&mut sections, &mut frags, &mut symbols, &diag);

            let mut expected = 0u64;
            for (&id, &size) in ids.iter().zip(sizes.iter()) {
                proptest::prop_assert_eq!(frags.get(id).address, expected);
                expected += size as u64;
            }
        }
    }
}
