//! A two-pass, multi-architecture assembler that emits Mach-O object files.
//! Only the PowerPC backend is populated — see [`isa::ppc`] — but the reader
//! and everything upstream of it is architecture-generic, talking to the
//! backend only through [`isa::TargetIsa`].
//!
//! Module map:
//!
//! - [`diagnostics`] / [`error`] — the two-tier error model.
//! - [`scrub`] — byte sources and the character-level preprocessor.
//! - [`ir`] — frags, sections, symbols, expressions, fixups.
//! - [`directives`] — conditional assembly, macros, `.dump`/`.load`.
//! - [`reader`] — per-statement dispatch; [`driver`] — the file-level
//!   driver that owns the four pseudo-ops the reader can't handle itself.
//! - [`isa`] — the backend seam and the PowerPC implementation.
//! - [`layout`] / [`macho`] — address assignment and object emission.
//! - [`dwarf2`] — DWARF-2 line-table emission.
//! - [`cli`] — the command-line surface.

pub mod cli;
pub mod diagnostics;
pub mod directives;
pub mod driver;
pub mod dwarf2;
pub mod error;
pub mod ir;
pub mod isa;
pub mod layout;
pub mod macho;
pub mod reader;
pub mod scrub;
pub mod source_loc;
