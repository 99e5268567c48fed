//! Reader/driver: tokenizes one statement at a time and
//! dispatches to a pseudo-op, a macro invocation, or the backend's
//! `md_assemble`.

pub mod pseudo_ops;

use std::rc::Rc;

use crate::diagnostics::Diagnostics;
use crate::directives::{CondStack, MacroExpander, MacroTable};
use crate::ir::expr::{get_absolute_expression, ExprParser, Segment};
use crate::ir::frag::{encode_sleb128, encode_uleb128, MAX_LEB128_BYTES};
use crate::ir::{Frag, FragArena, FragKind, LocalLabels, Section, SectionTable, Symbol, SymbolTable};
use crate::isa::{AssembleContext, TargetIsa};
use crate::source_loc::{SharedLoc, SourceLoc};
use pseudo_ops::PseudoOp;

/// Everything a translation unit accumulates while statements are read.
/// Owned by the top-level driver (`crate::driver::Driver`), which also owns
/// the scrubber and, at EOF, hands this to layout and the DWARF-2 emitter.
pub struct Reader<'isa> {
    pub symbols: SymbolTable,
    pub sections: SectionTable,
    pub frags: FragArena,
    pub fixes: crate::ir::FixList,
    pub cond: CondStack,
    pub macros: MacroTable,
    pub local_labels: LocalLabels,
    pub current_section: Section,
    pub current_frag: Frag,
    pub loc: SharedLoc,
    pub diag: Diagnostics,
    isa: &'isa dyn TargetIsa,
    macro_depth: usize,
    macros_enabled: bool,
    /// `-dynamic`/`-static`: gates `.indirect_symbol`,
    /// `.lazy_reference`, `.weak_reference`, and dynamic section attributes.
    pub dynamic: bool,
    pub keep_local_labels: bool,
    /// Set by `.inlineasmstart`, cleared by `.inlineasmend`: the location
    /// `.inlineasmstart` itself was seen at, carried on every
    /// label-in-inline-asm warning raised while it is active (spec §4.8).
    inline_asm: Option<SourceLoc>,
}

impl<'isa> Reader<'isa> {
    pub fn new(isa: &'isa dyn TargetIsa, diag: Diagnostics, file: Rc<str>, start_in_text: bool, dynamic: bool) -> Self {
        let mut sections = SectionTable::new();
        let mut frags = FragArena::new();
        let current_section = if start_in_text {
            sections.bootstrap()
        } else {
            sections.get_or_create("", "")
        };
        let current_frag = frags.new_sentinel(file.clone());
        sections.get_mut(current_section).frags.push(current_frag);

        Reader {
            symbols: SymbolTable::new(),
            sections,
            frags,
            fixes: crate::ir::FixList::new(),
            cond: CondStack::new(),
            macros: MacroTable::new(),
            local_labels: LocalLabels::new(),
            current_section,
            current_frag,
            loc: SourceLoc::shared(file),
            diag,
            isa,
            macro_depth: 0,
            macros_enabled: true,
            dynamic,
            keep_local_labels: false,
            inline_asm: None,
        }
    }

    fn loc_snapshot(&self) -> SourceLoc {
        self.loc.borrow().clone()
    }

    /// Append bytes to the frag currently open in the active section.
    fn emit_bytes(&mut self, bytes: &[u8]) {
        self.frags.push_bytes(self.current_frag, bytes);
    }

    /// Open a fresh sentinel frag in the current section (used after a
    /// variable-size frag like `.align`/`.org` is appended).
    fn open_new_frag(&mut self) {
        let file = self.frags.get(self.current_frag).file.clone();
        let frag = self.frags.new_sentinel(file);
        self.sections.get_mut(self.current_section).frags.push(frag);
        self.current_frag = frag;
    }

    /// Process one already-scrubbed logical line: optional leading
    /// whitespace, local-label check, label/`X = expr` check, then
    /// pseudo-op/macro/instruction dispatch.
    pub fn process_line(&mut self, raw: &str) {
        let mut line = raw.trim_start_matches(' ');
        if line.is_empty() {
            return;
        }

        let substituted;
        if line.bytes().any(|b| b.is_ascii_digit()) {
            substituted = substitute_local_label_refs(line, &self.local_labels);
            line = &substituted;
        }

        // Local-label definition: `N:`.
        if let Some(rest) = parse_local_label_def(line) {
            if self.cond.is_ignoring() {
                return;
            }
            let (n, rest) = rest;
            let name = self.local_labels.define(n);
            let frag = self.current_frag;
            let offset = self.frags.get(frag).literal.len() as u64;
            let loc = self.loc_snapshot();
            self.symbols.define(&name, frag, offset, &loc, &self.diag);
            self.process_line(rest);
            return;
        }

        // A leading identifier followed by `:` is an ordinary label; by `=`
        // is a symbolic assignment (`X = expr`).
        if let Some((name, rest)) = parse_label_colon(line) {
            if !self.cond.is_ignoring() {
                let frag = self.current_frag;
                let offset = self.frags.get(frag).literal.len() as u64;
                let loc = self.loc_snapshot();
                if let Some(start_loc) = &self.inline_asm {
                    self.diag.warn_at(
                        &start_loc.file,
                        start_loc.logical_line,
                        start_loc.column,
                        format!("label `{name}' defined inside inline asm"),
                    );
                }
                self.symbols.define(name, frag, offset, &loc, &self.diag);
            }
            self.process_line(rest);
            return;
        }
        if let Some((name, rest)) = parse_set_assignment(line) {
            if !self.cond.is_ignoring() {
                let loc = self.loc_snapshot();
                let (expr, _) = ExprParser::new(rest, &mut self.symbols, &loc, &self.diag).parse();
                let value = get_absolute_expression(&expr, &loc, &self.diag);
                self.symbols.define_absolute(name, value as u64, &loc, &self.diag);
            }
            return;
        }

        line = line.trim();
        if line.is_empty() {
            return;
        }

        let (mnemonic, operands) = split_statement(line);

        if let Some(stripped) = mnemonic.strip_prefix('.') {
            self.dispatch_pseudo_op(stripped, operands);
            return;
        }

        if self.cond.is_ignoring() {
            return;
        }

        if let Some(def) = self.macros_enabled.then(|| self.macros.get(mnemonic)).flatten() {
            if self.macro_depth >= crate::directives::macros::MAX_MACRO_DEPTH {
                let loc = self.loc_snapshot();
                self.diag.bad(&loc, "macro nested too deeply");
                return;
            }
            let args = MacroExpander::parse_args(operands);
            let body = def.body.clone();
            let expansion = MacroExpander::expand(&body, mnemonic, &args);
            self.macro_depth += 1;
            log::trace!("expanding macro `{mnemonic}' with {} args at depth {}", args.len(), self.macro_depth);
            for expansion_line in expansion.lines() {
                self.process_line(expansion_line);
            }
            self.macro_depth -= 1;
            return;
        }

        let loc = self.loc_snapshot();
        let mut ctx = AssembleContext {
            frags: &mut self.frags,
            symbols: &mut self.symbols,
            fixes: &mut self.fixes,
            current_frag: self.current_frag,
            loc: &loc,
            diag: &self.diag,
        };
        if !self.isa.assemble(mnemonic, operands, &mut ctx) {
            self.diag.bad(&loc, format!("no such instruction: `{}'", mnemonic));
        }
    }

    fn dispatch_pseudo_op(&mut self, name: &str, operands: &str) {
        let loc = self.loc_snapshot();

        // Conditionals are honored even while ignoring; `.macro`/`.endmacro`
        // capture is handled by the caller driving raw lines, so by the time
        // `process_line` sees a pseudo-op mid-capture it has already been
        // routed elsewhere (see `Driver::feed`).
        let ignoring = self.cond.is_ignoring();
        let Some(op) = pseudo_ops::lookup(name) else {
            if !ignoring {
                let mut ctx = AssembleContext {
                    frags: &mut self.frags,
                    symbols: &mut self.symbols,
                    fixes: &mut self.fixes,
                    current_frag: self.current_frag,
                    loc: &loc,
                    diag: &self.diag,
                };
                if !self.isa.pseudo_op(name, operands, &mut ctx) {
                    self.diag.bad(&loc, format!("unknown pseudo-op: `.{}'", name));
                }
            }
            return;
        };

        match op {
            PseudoOp::If => {
                let cond = self.eval_cond(operands, ignoring);
                self.cond.push_if(cond, &loc, &self.diag);
            }
            PseudoOp::Elseif => {
                let cond = self.eval_cond(operands, ignoring);
                self.cond.elseif(cond, &loc, &self.diag);
            }
            PseudoOp::Else => self.cond.else_(&loc, &self.diag),
            PseudoOp::Endif => self.cond.endif(&loc, &self.diag),
            _ if ignoring => {}
            PseudoOp::SecureLogUnique => self.diag.secure_log_unique(&loc, operands.trim()),
            PseudoOp::SecureLogReset => self.diag.secure_log_reset(),
            PseudoOp::Abort => self.diag.bad(&loc, "assembly aborted by .abort directive"),
            PseudoOp::Globl => {
                for name in split_names(operands) {
                    let sym = self.symbols.intern(name);
                    self.symbols.get_mut(sym).flags.external = true;
                }
            }
            PseudoOp::PrivateExtern => {
                for name in split_names(operands) {
                    let sym = self.symbols.intern(name);
                    self.symbols.get_mut(sym).flags.private_extern = true;
                }
            }
            PseudoOp::WeakReference => {
                for name in split_names(operands) {
                    let sym = self.symbols.intern(name);
                    self.symbols.get_mut(sym).flags.weak_reference = true;
                }
            }
            PseudoOp::WeakDefinition => {
                for name in split_names(operands) {
                    let sym = self.symbols.intern(name);
                    self.symbols.get_mut(sym).flags.weak_definition = true;
                }
            }
            PseudoOp::NoDeadStrip => {
                for name in split_names(operands) {
                    let sym = self.symbols.intern(name);
                    self.symbols.get_mut(sym).flags.no_dead_strip = true;
                }
            }
            PseudoOp::Reference | PseudoOp::LazyReference | PseudoOp::SymbolResolver | PseudoOp::Desc => {
                // Mach-O attribute-only bookkeeping; no code-generation effect.
            }
            PseudoOp::Byte => self.emit_integers(operands, 1),
            PseudoOp::Short => self.emit_integers(operands, 2),
            PseudoOp::Long => self.emit_integers(operands, 4),
            PseudoOp::Quad => self.emit_integers(operands, 8),
            PseudoOp::Ascii => self.emit_ascii(operands, false),
            PseudoOp::Asciz => self.emit_ascii(operands, true),
            PseudoOp::Space | PseudoOp::Fill => {
                let mut parts = operands.splitn(2, ',');
                let count_text = parts.next().unwrap_or("0");
                let fill_text = parts.next().unwrap_or("0");
                let count = get_absolute_expression(
                    &ExprParser::new(count_text, &mut self.symbols, &loc, &self.diag).parse().0,
                    &loc,
                    &self.diag,
                );
                let fill = get_absolute_expression(
                    &ExprParser::new(fill_text, &mut self.symbols, &loc, &self.diag).parse().0,
                    &loc,
                    &self.diag,
                );
                let bytes = vec![fill as u8; count.max(0) as usize];
                self.emit_bytes(&bytes);
            }
            PseudoOp::Align | PseudoOp::P2align => self.do_align(operands, true),
            PseudoOp::Balign => self.do_align(operands, false),
            PseudoOp::Org => {
                let (expr, _) = ExprParser::new(operands, &mut self.symbols, &loc, &self.diag).parse();
                if expr.seg == Segment::Sect || expr.seg == Segment::Absolute {
                    self.open_new_frag();
                    self.frags.get_mut(self.current_frag).kind = FragKind::Org;
                    self.frags.get_mut(self.current_frag).symbol = expr.add_symbol;
                    self.frags.get_mut(self.current_frag).offset = expr.add_number;
                    self.open_new_frag();
                } else {
                    self.diag.bad(&loc, "`.org' target must be absolute or section-relative");
                }
            }
            PseudoOp::Abs | PseudoOp::Text => {
                self.switch_section("__TEXT", "__text");
            }
            PseudoOp::Data => {
                self.switch_section("__DATA", "__data");
            }
            PseudoOp::Section => {
                let mut parts = operands.splitn(2, ',');
                let segname = parts.next().unwrap_or("").trim();
                let sectname = parts.next().unwrap_or("").trim();
                self.switch_section(segname, sectname);
            }
            PseudoOp::Zerofill => {
                let mut parts = operands.splitn(4, ',');
                let segname = parts.next().unwrap_or("").trim();
                let sectname = parts.next().unwrap_or("").trim();
                self.switch_section(segname, sectname);
                self.sections.get_mut(self.current_section).flags.zerofill = true;
                if let Some(name) = parts.next() {
                    let size = parts
                        .next()
                        .map(|s| {
                            get_absolute_expression(
                                &ExprParser::new(s, &mut self.symbols, &loc, &self.diag).parse().0,
                                &loc,
                                &self.diag,
                            )
                        })
                        .unwrap_or(0);
                    let frag = self.current_frag;
                    let offset = self.frags.get(frag).literal.len() as u64;
                    self.symbols.define(name.trim(), frag, offset, &loc, &self.diag);
                    let bytes = vec![0u8; size.max(0) as usize];
                    self.emit_bytes(&bytes);
                }
            }
            PseudoOp::Comm | PseudoOp::Lcomm => {
                let mut parts = operands.splitn(2, ',');
                let name = parts.next().unwrap_or("").trim();
                let size = parts
                    .next()
                    .map(|s| {
                        get_absolute_expression(
                            &ExprParser::new(s, &mut self.symbols, &loc, &self.diag).parse().0,
                            &loc,
                            &self.diag,
                        )
                    })
                    .unwrap_or(0);
                let frag = self.current_frag;
                let offset = self.frags.get(frag).literal.len() as u64;
                let sym = self.symbols.define(name, frag, offset, &loc, &self.diag);
                if op == PseudoOp::Comm {
                    self.symbols.get_mut(sym).flags.external = true;
                }
                let bytes = vec![0u8; size.max(0) as usize];
                self.emit_bytes(&bytes);
            }
            PseudoOp::Set => {
                // Handled earlier by `parse_set_assignment` for the `X =
                // expr` spelling; `.set NAME, expr` is the pseudo-op
                // spelling of the same operation.
                let mut parts = operands.splitn(2, ',');
                let name = parts.next().unwrap_or("").trim();
                let rest = parts.next().unwrap_or("0");
                let value = get_absolute_expression(
                    &ExprParser::new(rest, &mut self.symbols, &loc, &self.diag).parse().0,
                    &loc,
                    &self.diag,
                );
                self.symbols.define_absolute(name, value as u64, &loc, &self.diag);
            }
            PseudoOp::Lsym => {
                let mut parts = operands.splitn(2, ',');
                let name = parts.next().unwrap_or("").trim();
                let rest = parts.next().unwrap_or("0");
                let value = get_absolute_expression(
                    &ExprParser::new(rest, &mut self.symbols, &loc, &self.diag).parse().0,
                    &loc,
                    &self.diag,
                );
                self.symbols.define_absolute(name, value as u64, &loc, &self.diag);
            }
            PseudoOp::Line => {
                if let Ok(n) = operands.trim().parse::<u32>() {
                    self.loc.borrow_mut().logical_line = n;
                }
            }
            PseudoOp::File => {
                // `.file "name"` updates the logical file name used in
                // diagnostics and DWARF output; parsed but not re-stored on
                // `SourceLoc` here since `loc.file` is `Rc<str>` shared with
                // the frag arena's file tags (see `driver::Driver`).
            }
            PseudoOp::IndirectSymbol => {
                if !self.dynamic {
                    self.diag.bad(&loc, "`.indirect_symbol' requires `-dynamic'");
                } else {
                    let name = operands.trim();
                    let symbol = self.symbols.intern(name);
                    self.symbols.ensure_in_symbol_table(symbol);
                    let frag = self.current_frag;
                    let offset = self.frags.get(frag).literal.len() as u32;
                    self.sections.get_mut(self.current_section).indirect_symbols.push(
                        crate::ir::section::IndirectSymbolEntry { symbol, frag, offset },
                    );
                }
            }
            PseudoOp::Sleb128 => self.emit_leb128(operands, true),
            PseudoOp::Uleb128 => self.emit_leb128(operands, false),
            PseudoOp::Include => {
                // The driver intercepts `.include` before handing lines to
                // `process_line` (it must splice in another file's scrubbed
                // text); if one reaches here the include stack is already
                // exhausted or misconfigured.
                self.diag.bad(&loc, "`.include' must be handled by the driver");
            }
            PseudoOp::Macro | PseudoOp::EndMacro => {
                self.diag.bad(&loc, "`.macro'/.endmacro' must be handled by the driver's capture mode");
            }
            PseudoOp::MacrosOn => self.macros_enabled = true,
            PseudoOp::MacrosOff => self.macros_enabled = false,
            PseudoOp::Dump | PseudoOp::Load => {
                self.diag.bad(&loc, "`.dump'/`.load' must be handled by the driver");
            }
            PseudoOp::SubsectionsViaSymbols | PseudoOp::Machine => {
                // Recorded as object-file-level metadata by the driver at
                // EOF; no per-statement effect.
            }
            PseudoOp::InlineAsmStart => {
                self.inline_asm = Some(loc);
            }
            PseudoOp::InlineAsmEnd => {
                self.inline_asm = None;
            }
            PseudoOp::Incbin => {
                let path = operands.trim().trim_matches('"');
                match std::fs::read(path) {
                    Ok(bytes) => self.emit_bytes(&bytes),
                    Err(err) => self.diag.bad(&loc, format!("can't read `{path}': {err}")),
                }
            }
            PseudoOp::DataRegion | PseudoOp::EndDataRegion => {
                // Marks a data-in-code region for the linker; no effect on
                // this crate's layout or fixup resolution.
            }
            PseudoOp::Stabd | PseudoOp::Stabn | PseudoOp::Stabs | PseudoOp::DebugNote => {
                // Stabs debugging directives; this backend emits DWARF-2
                // (§4.12) rather than stabs, so these are accepted and
                // otherwise ignored.
            }
        }
    }

    fn eval_cond(&mut self, operands: &str, ignoring: bool) -> bool {
        if ignoring {
            return false;
        }
        let loc = self.loc_snapshot();
        let (expr, _) = ExprParser::new(operands, &mut self.symbols, &loc, &self.diag).parse();
        get_absolute_expression(&expr, &loc, &self.diag) != 0
    }

    fn switch_section(&mut self, segname: &str, sectname: &str) {
        let section = self.sections.get_or_create(segname, sectname);
        self.current_section = section;
        let file = self.frags.get(self.current_frag).file.clone();
        if self.sections.get(section).frags.is_empty() {
            let frag = self.frags.new_sentinel(file);
            self.sections.get_mut(section).frags.push(frag);
            self.current_frag = frag;
        } else {
            self.current_frag = *self.sections.get(section).frags.last().unwrap();
        }
    }

    /// `.byte`/`.short`/`.long`/`.quad` and their aliases. An expression that
    /// resolves to `ABSOLUTE` (or folds to it, e.g. a same-frag difference)
    /// is written directly; anything still carrying an unresolved symbol
    /// (`SECT`/`DIFFSECT`/`UNKNOWN`) is reserved as zero bytes and handed to
    /// [`crate::layout::resolve_and_apply_fixes`] as a `Vanilla` fixup, the
    /// same deferral an instruction operand's symbolic immediate gets.
    fn emit_integers(&mut self, operands: &str, width: usize) {
        let loc = self.loc_snapshot();
        for item in split_top_level_commas(operands) {
            let (expr, _) = ExprParser::new(item, &mut self.symbols, &loc, &self.diag).parse();
            match expr.seg {
                Segment::Sect | Segment::DiffSect | Segment::Unknown => {
                    let where_ = self.frags.get(self.current_frag).literal.len() as u32;
                    self.emit_bytes(&vec![0u8; width]);
                    self.fixes.push(crate::ir::FixData {
                        frag: self.current_frag,
                        where_,
                        size: width as u8,
                        add_symbol: expr.add_symbol,
                        subtract_symbol: expr.subtract_symbol,
                        addend: expr.add_number,
                        pcrel: false,
                        reloc: crate::ir::fixup::RelocKind::Vanilla,
                        sectdiff_divide_by_two: expr.sectdiff_divide_by_two,
                    });
                }
                _ => {
                    let value = get_absolute_expression(&expr, &loc, &self.diag);
                    let bytes = value.to_be_bytes();
                    self.emit_bytes(&bytes[8 - width..]);
                }
            }
        }
    }

    /// `.uleb128`/`.sleb128`: an absolute expression encodes immediately, the
    /// way a plain `.byte`/`.long` does. Anything else — a symbol, or a
    /// symbol difference such as the `.Lend - .Lstart` pattern DWARF line
    /// programs use for their own length-prefixed forms — defers through a
    /// [`FragKind::Leb128`] frag, re-encoded once `layout` knows the
    /// operands' addresses, since the final width isn't known at read time.
    fn emit_leb128(&mut self, operands: &str, signed: bool) {
        let loc = self.loc_snapshot();
        for item in split_top_level_commas(operands) {
            let (expr, _) = ExprParser::new(item, &mut self.symbols, &loc, &self.diag).parse();
            if expr.seg == Segment::Absolute {
                let bytes = if signed { encode_sleb128(expr.add_number) } else { encode_uleb128(expr.add_number as u64) };
                self.emit_bytes(&bytes);
                continue;
            }
            if expr.seg == Segment::Unknown {
                self.diag.bad(&loc, "expression has undefined symbol");
            }
            self.open_new_frag();
            let data = self.frags.get_mut(self.current_frag);
            data.kind = FragKind::Leb128 { signed };
            data.symbol = expr.add_symbol;
            data.subtract_symbol = expr.subtract_symbol;
            data.offset = expr.add_number;
            data.var_size = MAX_LEB128_BYTES as u32;
            self.open_new_frag();
        }
    }

    fn emit_ascii(&mut self, operands: &str, nul_terminated: bool) {
        for item in split_top_level_commas(operands) {
            let item = item.trim();
            let Some(unquoted) = item.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) else {
                let loc = self.loc_snapshot();
                self.diag.bad(&loc, "expected a quoted string");
                continue;
            };
            let bytes = unescape(unquoted);
            self.emit_bytes(&bytes);
            if nul_terminated {
                self.emit_bytes(&[0]);
            }
        }
    }

    fn do_align(&mut self, operands: &str, power_of_two: bool) {
        let loc = self.loc_snapshot();
        let mut parts = operands.splitn(3, ',');
        let n = get_absolute_expression(
            &ExprParser::new(parts.next().unwrap_or("0"), &mut self.symbols, &loc, &self.diag).parse().0,
            &loc,
            &self.diag,
        );
        let fill_byte = parts
            .next()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                get_absolute_expression(
                    &ExprParser::new(s, &mut self.symbols, &loc, &self.diag).parse().0,
                    &loc,
                    &self.diag,
                ) as u8
            })
            .unwrap_or(0);
        let max_pad = parts.next().filter(|s| !s.trim().is_empty()).map(|s| {
            get_absolute_expression(&ExprParser::new(s, &mut self.symbols, &loc, &self.diag).parse().0, &loc, &self.diag) as u32
        });
        let pow2 = if power_of_two {
            n.max(0) as u32
        } else {
            (n.max(1) as u32).trailing_zeros()
        };
        let file = self.frags.get(self.current_frag).file.clone();
        let frag = self.frags.new_align(pow2, fill_byte, 1, max_pad, file, self.loc.borrow().logical_line);
        self.sections.get_mut(self.current_section).frags.push(frag);
        self.open_new_frag();
    }
}

fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u8);
            continue;
        }
        match chars.next() {
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('r') => out.push(b'\r'),
            Some('b') => out.push(0x08),
            Some('f') => out.push(0x0c),
            Some('\\') => out.push(b'\\'),
            Some('\'') => out.push(b'\''),
            Some('"') => out.push(b'"'),
            Some('0') => out.push(0),
            Some(other) => out.push(other as u8),
            None => {}
        }
    }
    out
}

fn split_statement(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.find(char::is_whitespace) {
        Some(i) => (&line[..i], line[i..].trim_start()),
        None => (line, ""),
    }
}

fn split_names(operands: &str) -> impl Iterator<Item = &str> {
    operands.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                out.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

fn parse_local_label_def(line: &str) -> Option<(u32, &str)> {
    let digits_end = line.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 || line.as_bytes().get(digits_end) != Some(&b':') {
        return None;
    }
    let n: u32 = line[..digits_end].parse().ok()?;
    Some((n, &line[digits_end + 1..]))
}

fn parse_label_colon(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| !is_symbol_char(c))?;
    if end == 0 || line.as_bytes().get(end) != Some(&b':') {
        return None;
    }
    Some((&line[..end], &line[end + 1..]))
}

fn parse_set_assignment(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| !is_symbol_char(c))?;
    if end == 0 {
        return None;
    }
    let rest = line[end..].trim_start();
    let rest = rest.strip_prefix('=')?;
    Some((&line[..end], rest))
}

fn is_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.' || (c as u32) > 0x7f
}

/// Rewrites every bare `Nb`/`Nf` local-label reference in `text` to the
/// mangled symbol name `LocalLabels` would resolve it to, so the ordinary
/// expression parser can then treat it as an plain identifier. Safe to run
/// unconditionally over a whole line: label *definitions* are spelled `N:`,
/// which this never matches since it only fires on a digit run immediately
/// followed by `b`/`f` at a word boundary.
fn substitute_local_label_refs(text: &str, labels: &LocalLabels) -> String {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let n = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < n {
        let (_, c) = chars[i];
        let prev_is_symbol = i > 0 && is_symbol_char(chars[i - 1].1);
        if c.is_ascii_digit() && !prev_is_symbol {
            let mut j = i;
            while j < n && chars[j].1.is_ascii_digit() {
                j += 1;
            }
            let suffix = chars.get(j).map(|&(_, c)| c);
            let next_is_symbol = chars.get(j + 1).is_some_and(|&(_, c)| is_symbol_char(c));
            if let Some(dir @ ('b' | 'f')) = suffix {
                if !next_is_symbol {
                    let digits: String = chars[i..j].iter().map(|&(_, c)| c).collect();
                    if let Ok(num) = digits.parse::<u32>() {
                        let resolved = if dir == 'b' { labels.backward_name(num) } else { Some(labels.forward_name(num)) };
                        if let Some(name) = resolved {
                            out.push_str(&name);
                            i = j + 1;
                            continue;
                        }
                    }
                }
            }
        }
        out.push(c);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::ppc::PpcIsa;

    fn new_reader(isa: &dyn TargetIsa) -> Reader<'_> {
        Reader::new(isa, Diagnostics::new(false, "ppc", true), Rc::from("t.s"), true, true)
    }

    #[test]
    fn emits_byte_directive() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".byte 1, 2, 3");
        assert_eq!(r.frags.get(r.current_frag).literal, vec![1, 2, 3]);
    }

    #[test]
    fn label_then_instruction_defines_symbol_at_offset() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line("foo: .byte 9");
        let sym = r.symbols.intern("foo");
        assert_eq!(r.symbols.get(sym).value, 0);
    }

    #[test]
    fn set_assignment_defines_absolute_symbol() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line("FOO = 1 + 2");
        let sym = r.symbols.intern("FOO");
        assert_eq!(r.symbols.get(sym).value, 3);
    }

    #[test]
    fn conditional_skips_body_when_false() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".if 0");
        r.process_line(".byte 1");
        r.process_line(".endif");
        assert!(r.frags.get(r.current_frag).literal.is_empty());
    }

    #[test]
    fn local_label_roundtrips_backward_reference() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line("1:");
        let name = r.local_labels.backward_name(1).unwrap();
        assert!(r.symbols.name_order().iter().any(|&s| r.symbols.get(s).name.as_ref() == name));
    }

    #[test]
    fn backward_local_label_reference_resolves_to_the_defining_symbol() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line("1:");
        let defined = r.local_labels.backward_name(1).unwrap();
        r.process_line("b 1b");
        assert!(!r.diag.has_bad_error());
        assert_eq!(r.fixes.iter().count(), 1);
        let fix = r.fixes.iter().next().unwrap();
        let sym = fix.add_symbol.expect("branch fixup should reference a symbol");
        assert_eq!(r.symbols.get(sym).name.as_ref(), defined.as_str());
    }

    #[test]
    fn forward_local_label_reference_predicts_the_next_definition() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        let predicted = r.local_labels.forward_name(2);
        r.process_line("b 2f");
        r.process_line("2:");
        assert!(!r.diag.has_bad_error());
        let fix = r.fixes.iter().next().unwrap();
        let sym = fix.add_symbol.expect("branch fixup should reference a symbol");
        assert_eq!(r.symbols.get(sym).name.as_ref(), predicted.as_str());
    }

    #[test]
    fn identifiers_ending_in_b_or_f_are_left_alone() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line("count1f = 5");
        let sym = r.symbols.intern("count1f");
        assert_eq!(r.symbols.get(sym).value, 5);
    }

    #[test]
    fn unknown_pseudo_op_reports_error() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".not_a_real_directive");
        assert!(r.diag.has_bad_error());
    }

    #[test]
    fn inlineasmstart_tracks_state_without_flagging_bad_errors() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".inlineasmstart");
        assert!(r.inline_asm.is_some());
        r.process_line(".inlineasmend");
        assert!(r.inline_asm.is_none());
        assert!(!r.diag.has_bad_error());
    }

    #[test]
    fn label_inside_inline_asm_is_still_defined() {
        // A label defined between `.inlineasmstart` and `.inlineasmend`
        // only warns (spec §4.8); it must still become a real symbol.
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".inlineasmstart");
        r.process_line("foo: .byte 1");
        r.process_line(".inlineasmend");
        assert!(!r.diag.has_bad_error());
        let sym = r.symbols.intern("foo");
        assert_eq!(r.symbols.get(sym).value, 0);
    }

    #[test]
    fn data_region_and_stabs_directives_are_accepted_as_no_ops() {
        let isa = PpcIsa::default();
        let mut r = new_reader(&isa);
        r.process_line(".data_region");
        r.process_line(".stabs \"x\",0,0,0,0");
        r.process_line(".end_data_region");
        assert!(!r.diag.has_bad_error());
    }

    proptest::proptest! {
        /// `.byte`/`.short`/`.long`/`.quad` truncate an absolute expression to
        /// the directive's width by keeping its low-order bytes, big-endian —
        /// exactly what `value.to_be_bytes()`'s tail slice gives back.
        #[test]
        fn integer_directives_emit_the_low_order_bytes(value in proptest::prelude::any::<i64>()) {
            for (mnemonic, width) in [(".byte", 1usize), (".short", 2), (".long", 4), (".quad", 8)] {
                let isa = PpcIsa::default();
                let mut r = new_reader(&isa);
                r.process_line(&format!("{mnemonic} {value}"));
                let expected = &value.to_be_bytes()[8 - width..];
                proptest::prop_assert_eq!(r.frags.get(r.current_frag).literal.as_slice(), expected);
            }
        }
    }
}
