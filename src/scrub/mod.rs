//! Input scrubber + preprocessor.

mod byte_source;
mod state_machine;

pub mod include;

pub use byte_source::{ByteSource, FileSource, StringSource};
pub use state_machine::scrub_bytes;

use crate::diagnostics::Diagnostics;
use crate::source_loc::SharedLoc;

/// Scrub an entire file's bytes (or an in-memory buffer's bytes) into the
/// cleaned text the reader tokenizes. One call per `.include` level;
/// see [`include`] for how those nest.
pub fn scrub_source(source: impl ByteSource, loc: &SharedLoc, diag: &Diagnostics) -> String {
    scrub_bytes(source, loc, diag)
}
