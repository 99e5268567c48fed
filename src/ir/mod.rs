//! The in-memory program representation: expressions, symbols,
//! frags/sections, and pending fixups.
//!
//! Every cross-referenced entity (`Frag`, `Symbol`, `Section`, `Fix`) is a
//! small `Copy` index into a `cranelift_entity::PrimaryMap`, not a pointer —
//! an arena-of-indices pattern that `cranelift-entity` (this crate's
//! dependency) exists to provide. Like
//! the original's obstack, entries are never freed once allocated; they live
//! until the `Assembler` context itself is dropped at the end of the run.

pub mod expr;
pub mod fixup;
pub mod frag;
pub mod local_label;
pub mod section;
pub mod symbol;

pub use expr::{BigLiteral, Expr, Segment};
pub use fixup::{Fix, FixData, FixList};
pub use frag::{Frag, FragArena, FragData, FragKind};
pub use local_label::LocalLabels;
pub use section::{Section, SectionData, SectionTable};
pub use symbol::{Symbol, SymbolData, SymbolKind, SymbolTable};
