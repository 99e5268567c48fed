//! Structural errors that abort assembly outright.
//!
//! Day-to-day lexical/syntactic/semantic problems never reach this type —
//! they go through [`crate::diagnostics::Diagnostics`] and set the sticky
//! bad-error flag instead, so assembly can keep running far enough to
//! surface every problem in one pass. `AssemblerError` is reserved for the
//! handful of conditions the original `as` handled by calling `exit(1)`
//! directly: I/O failures that leave nothing to recover from, `.abort`, and
//! signal delivery.

use std::io;
use std::path::PathBuf;

/// Top-level failure of an assembly run.
#[derive(Debug, thiserror::Error)]
pub enum AssemblerError {
    /// The named source file could not be opened.
    #[error("can't open {path}: {source}")]
    OpenInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The output object file could not be written.
    #[error("can't write object file {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `.include` named a file that couldn't be found on any search path.
    #[error("can't find include file {0}")]
    IncludeNotFound(String),

    /// `.include` nesting, macro expansion, or `.if` nesting exceeded its
    /// fixed cap.
    #[error("{0}")]
    NestingTooDeep(&'static str),

    /// `.abort` was assembled.
    #[error("assembly aborted by .abort directive")]
    Aborted,

    /// A fatal diagnostic was raised mid-assembly (`as_fatal` in the
    /// original); the message has already been printed to stderr by the
    /// time this is returned.
    #[error("fatal assembler error")]
    Fatal,

    /// One of SIGHUP/SIGINT/SIGPIPE/SIGTERM arrived.
    #[error("interrupted by signal")]
    Interrupted,

    /// Assembly ran to completion but recorded at least one `bad`
    /// diagnostic; no object file was written.
    #[error("errors were reported; no object file written")]
    BadErrorsReported,

    /// Failure while encoding the Mach-O object.
    #[error("failed to encode object file: {0}")]
    ObjectWrite(#[from] object::write::Error),

    /// `-arch NAME` named an architecture outside the PowerPC family; this
    /// crate's Non-goals exclude every other backend's opcode table.
    #[error("architecture for \"{0}\" is not supported by this build")]
    UnsupportedArchitecture(String),
}

/// Convenience alias used throughout the crate.
pub type AssemblerResult<T> = Result<T, AssemblerError>;
