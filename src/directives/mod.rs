//! Conditional assembly + macro facility.

pub mod cond;
pub mod dump;
pub mod macros;

pub use cond::{CondFrame, CondKind, CondStack};
pub use dump::{dump_state, load_state};
pub use macros::{MacroExpander, MacroTable};
