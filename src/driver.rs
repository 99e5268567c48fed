//! Top-level translation-unit driver.
//!
//! Mirrors `cctools`'s `as/read.c`'s
//! `read_a_source_file` outer loop: scrub a buffer, split it into logical
//! lines, and hand each one to the statement reader — except for the four
//! pseudo-ops that need file I/O or raw-line capture the reader itself has
//! no access to.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::diagnostics::Diagnostics;
use crate::directives::dump::DumpedSymbol;
use crate::directives::macros::MacroDef;
use crate::dwarf2::Dwarf2Builder;
use crate::error::{AssemblerError, AssemblerResult};
use crate::ir::symbol::SymbolKind;
use crate::isa::TargetIsa;
use crate::reader::Reader;
use crate::scrub::include::IncludeResolver;
use crate::scrub::{scrub_source, FileSource, StringSource};
use crate::source_loc::SourceLoc;

/// Configuration threaded in from [`crate::cli::Cli`] that the driver (as
/// opposed to the reader or the backend) needs to know about.
pub struct DriverConfig {
    pub search_dirs: Vec<PathBuf>,
    pub dynamic: bool,
    pub start_in_text: bool,
    pub subsections_via_symbols: bool,
    pub emit_dwarf2: bool,
    pub suppress_warnings: bool,
    pub arch_multiple: bool,
    pub arch_name: String,
}

/// One assembly run over a single input (file path, or `None` for stdin).
pub struct Driver<'isa> {
    reader: Reader<'isa>,
    include: IncludeResolver,
    dwarf2: Dwarf2Builder,
    config: DriverConfig,
    current_file_number: u32,
    isa: &'isa dyn TargetIsa,
}

impl<'isa> Driver<'isa> {
    pub fn new(isa: &'isa dyn TargetIsa, config: DriverConfig, input_dir: PathBuf, top_file: Rc<str>) -> Self {
        let diag = Diagnostics::new(config.arch_multiple, config.arch_name.clone(), config.suppress_warnings);
        let reader = Reader::new(isa, diag, top_file, config.start_in_text, config.dynamic);
        let include = IncludeResolver::new(input_dir, config.search_dirs.clone());
        Driver {
            reader,
            include,
            dwarf2: Dwarf2Builder::new(),
            config,
            current_file_number: 0,
            isa,
        }
    }

    /// Assemble `input` (a path, or `None` to read stdin) end to end,
    /// returning the finished Mach-O object bytes. No bytes are returned if
    /// any `bad` diagnostic was raised — no output file is written on error.
    pub fn assemble(mut self, input: Option<&Path>) -> AssemblerResult<Vec<u8>> {
        let text = match input {
            Some(path) => {
                let source = FileSource::open(path).map_err(|source| AssemblerError::OpenInput {
                    path: path.to_path_buf(),
                    source,
                })?;
                scrub_source(source, &self.reader.loc, &self.reader.diag)
            }
            None => {
                let mut buf = Vec::new();
                std::io::copy(&mut std::io::stdin(), &mut buf).map_err(|source| AssemblerError::OpenInput {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
                scrub_source(StringSource::new(buf), &self.reader.loc, &self.reader.diag)
            }
        };

        self.drive_lines(&text)?;

        let loc = self.reader.loc.borrow().clone();
        self.reader.cond.check_balanced(&loc, &self.reader.diag);

        if self.reader.diag.has_bad_error() {
            return Err(AssemblerError::BadErrorsReported);
        }

        let sizes = crate::layout::layout(
            &mut self.reader.sections,
            &mut self.reader.frags,
            &mut self.reader.symbols,
            &self.reader.diag,
        );
        for (section, size) in &sizes {
            let data = self.reader.sections.get(*section);
            log::debug!("section {},{} laid out at {} bytes", data.segname, data.sectname, size);
        }

        let resolved = crate::layout::resolve_and_apply_fixes(
            &self.reader.fixes,
            &mut self.reader.frags,
            &self.reader.sections,
            &self.reader.symbols,
            self.isa,
            &self.reader.diag,
        );

        let debug = if self.config.emit_dwarf2 && !self.dwarf2.is_empty() {
            self.reader
                .sections
                .iter()
                .find(|(_, d)| d.segname.as_ref() == "__TEXT" && d.sectname.as_ref() == "__text")
                .map(|(id, _)| id)
                .and_then(|text_section| {
                    let frags_in_text: std::collections::HashSet<_> =
                        self.reader.sections.get(text_section).frags.iter().copied().collect();
                    let first_frag = *self.reader.sections.get(text_section).frags.first()?;
                    let base = self.reader.frags.get(first_frag).address;
                    let len = self.reader.sections.get(text_section).frags.iter().fold(0u64, |acc, &f| {
                        acc + self.reader.frags.get(f).literal.len() as u64
                    });

                    let mut labels: Vec<(Box<str>, u64)> = self
                        .reader
                        .symbols
                        .index_order()
                        .iter()
                        .filter_map(|&sym| {
                            let data = self.reader.symbols.get(sym);
                            if data.kind != SymbolKind::Section {
                                return None;
                            }
                            let frag = data.frag?;
                            if !frags_in_text.contains(&frag) {
                                return None;
                            }
                            let address = self.reader.frags.get(frag).address + data.value;
                            Some((data.name.clone(), address))
                        })
                        .collect();
                    labels.sort_by_key(|(_, addr)| *addr);

                    Some(self.dwarf2.emit(".", self.reader.loc.borrow().file.as_ref(), &[(base, len)], &labels))
                })
        } else {
            None
        };

        if self.reader.diag.has_bad_error() {
            return Err(AssemblerError::BadErrorsReported);
        }

        Ok(crate::macho::write_object(
            &self.reader.sections,
            &self.reader.frags,
            &self.reader.symbols,
            &self.reader.fixes,
            &resolved,
            self.config.subsections_via_symbols,
            self.config.dynamic,
            debug,
        ))
    }

    /// Feed scrubbed text line by line, intercepting `.include`, `.macro`
    /// capture, and `.dump`/`.load` before `Reader::process_line` sees them —
    /// per this module's doc comment, these are the four pseudo-ops that
    /// need capability the per-statement reader doesn't have.
    fn drive_lines(&mut self, text: &str) -> AssemblerResult<()> {
        let mut lines = text.split('\n').peekable();
        while let Some(line) = lines.next() {
            let trimmed = line.trim_start();

            if let Some(rest) = strip_exact_directive(trimmed, ".include") {
                if !self.reader.cond.is_ignoring() {
                    self.handle_include(rest.trim())?;
                }
                continue;
            }
            if let Some(rest) = strip_exact_directive(trimmed, ".macro") {
                if !self.reader.cond.is_ignoring() {
                    self.handle_macro_def(rest.trim(), &mut lines)?;
                }
                continue;
            }
            if let Some(rest) = strip_exact_directive(trimmed, ".dump") {
                if !self.reader.cond.is_ignoring() {
                    self.handle_dump(rest.trim())?;
                }
                continue;
            }
            if let Some(rest) = strip_exact_directive(trimmed, ".load") {
                if !self.reader.cond.is_ignoring() {
                    self.handle_load(rest.trim())?;
                }
                continue;
            }
            if let Some(rest) = strip_exact_directive(trimmed, ".file") {
                self.handle_file_directive(rest.trim());
                self.reader.process_line(line);
                continue;
            }
            if let Some(rest) = strip_exact_directive(trimmed, ".loc") {
                self.handle_loc_directive(rest.trim());
                continue;
            }

            self.reader.process_line(line);
        }
        Ok(())
    }

    fn handle_include(&mut self, operands: &str) -> AssemblerResult<()> {
        let Some(name) = operands.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
            let loc = self.reader.loc.borrow().clone();
            self.reader.diag.bad(&loc, "`.include' expects a quoted filename");
            return Ok(());
        };
        self.include.enter()?;
        let path = match self.include.resolve(name) {
            Ok(p) => p,
            Err(e) => {
                self.include.leave();
                let loc = self.reader.loc.borrow().clone();
                self.reader.diag.bad(&loc, e.to_string());
                return Ok(());
            }
        };
        log::debug!("including {} (resolved from \"{}\")", path.display(), name);
        let source = FileSource::open(&path).map_err(|source| AssemblerError::OpenInput { path: path.clone(), source })?;

        let saved_loc = self.reader.loc.borrow().clone();
        *self.reader.loc.borrow_mut() = SourceLoc::new(Rc::from(path.to_string_lossy().into_owned()));
        let included_text = scrub_source(source, &self.reader.loc, &self.reader.diag);
        self.drive_lines(&included_text)?;
        *self.reader.loc.borrow_mut() = saved_loc;
        self.include.leave();
        Ok(())
    }

    fn handle_macro_def<'a>(&mut self, header: &str, lines: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>) -> AssemblerResult<()> {
        let name = header.split(|c: char| c.is_whitespace() || c == ',').next().unwrap_or("").to_string();
        let mut body = String::new();
        let mut depth = 1u32;
        for line in lines.by_ref() {
            let trimmed = line.trim_start();
            if trimmed.starts_with(".macro") {
                depth += 1;
            } else if trimmed.starts_with(".endmacro") || trimmed.starts_with(".endm") {
                depth -= 1;
                if depth == 0 {
                    break;
                }
            }
            body.push_str(line);
            body.push('\n');
        }
        let loc = self.reader.loc.borrow().clone();
        if depth != 0 {
            self.reader.diag.bad(&loc, "`.macro' missing matching `.endmacro'");
        }
        self.reader.macros.define(&name, body, &loc, &self.reader.diag);
        Ok(())
    }

    fn handle_dump(&mut self, operands: &str) -> AssemblerResult<()> {
        let path = operands.trim_matches('"');
        let absolute_symbols: Vec<DumpedSymbol> = self
            .reader
            .symbols
            .name_order()
            .iter()
            .filter_map(|&sym| {
                let data = self.reader.symbols.get(sym);
                (data.kind == SymbolKind::Absolute).then(|| DumpedSymbol {
                    name: data.name.to_string(),
                    value: data.value as u32,
                })
            })
            .collect();
        let mut file = fs::File::create(path).map_err(|source| AssemblerError::WriteOutput { path: PathBuf::from(path), source })?;
        crate::directives::dump::dump_state(&mut file, &self.reader.macros, &absolute_symbols)
            .map_err(|source| AssemblerError::WriteOutput { path: PathBuf::from(path), source })?;
        let _ = file.flush();
        Ok(())
    }

    fn handle_load(&mut self, operands: &str) -> AssemblerResult<()> {
        let path = operands.trim_matches('"');
        let mut file = fs::File::open(path).map_err(|source| AssemblerError::OpenInput { path: PathBuf::from(path), source })?;
        let (macros, symbols) =
            crate::directives::dump::load_state(&mut file).map_err(|source| AssemblerError::OpenInput { path: PathBuf::from(path), source })?;
        let loc = self.reader.loc.borrow().clone();
        for MacroDef { name, body } in macros {
            self.reader.macros.load(MacroDef { name, body }, &loc, &self.reader.diag);
        }
        for sym in symbols {
            self.reader.symbols.define_absolute(&sym.name, sym.value as u64, &loc, &self.reader.diag);
        }
        Ok(())
    }

    fn handle_file_directive(&mut self, operands: &str) {
        let mut parts = operands.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("").trim();
        if let Ok(number) = first.parse::<u32>() {
            let rest = parts.next().unwrap_or("").trim().trim_matches('"');
            self.dwarf2.add_file(number, rest);
        } else {
            self.current_file_number += 1;
            self.dwarf2.add_file(self.current_file_number, first.trim_matches('"'));
        }
    }

    fn handle_loc_directive(&mut self, operands: &str) {
        let mut parts = operands.split_whitespace();
        let Some(Ok(file)) = parts.next().map(str::parse) else { return };
        let Some(Ok(line)) = parts.next().map(str::parse) else { return };
        let column: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let frag = self.reader.current_frag;
        let offset = self.reader.frags.get(frag).literal.len() as u64;
        self.dwarf2.add_row(file, line, column, offset);
    }
}

/// Like `str::strip_prefix`, but only matches at a word boundary — so
/// `.macro` doesn't also swallow `.macros_on`/`.macros_off`.
fn strip_exact_directive<'a>(line: &'a str, directive: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(directive)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() || c == ',' => Some(rest),
        _ => None,
    }
}
