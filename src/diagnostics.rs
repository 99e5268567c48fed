//! Message/diagnostics engine.
//!
//! Mirrors `cctools`'s `as/messages.c`:
//! `as_warn`/`as_warn_where`/`as_bad`/`as_fatal`, the `-arch_multiple`
//! banner-once behavior, and the sticky "bad error" flag that suppresses
//! object emission without aborting the rest of the pass.

use std::cell::{Cell, RefCell};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::source_loc::SourceLoc;

/// Formatted warnings/errors with source location, the sticky bad-error
/// flag, `-W` suppression, and `.secure_log_unique` support.
pub struct Diagnostics {
    /// `-W`: suppress warnings entirely.
    pub suppress_warnings: bool,
    /// `-arch_multiple`: prepend an architecture banner to the first
    /// diagnostic.
    arch_multiple: bool,
    arch_name: String,
    banner_printed: Cell<bool>,
    bad_error: AtomicBool,
    secure_log_file: RefCell<Option<PathBuf>>,
    secure_log_armed: Cell<bool>,
}

impl Diagnostics {
    pub fn new(arch_multiple: bool, arch_name: impl Into<String>, suppress_warnings: bool) -> Self {
        Diagnostics {
            suppress_warnings,
            arch_multiple,
            arch_name: arch_name.into(),
            banner_printed: Cell::new(false),
            bad_error: AtomicBool::new(false),
            secure_log_file: RefCell::new(std::env::var_os("AS_SECURE_LOG_FILE").map(PathBuf::from)),
            secure_log_armed: Cell::new(true),
        }
    }

    fn print_banner(&self) {
        if self.arch_multiple && !self.banner_printed.get() {
            eprintln!("as: for architecture {}", self.arch_name);
            self.banner_printed.set(true);
        }
    }

    /// Send a warning to stderr, located in the current input file. Only
    /// use this when there is some recovery action taken.
    pub fn warn(&self, loc: &SourceLoc, message: impl AsRef<str>) {
        if self.suppress_warnings {
            return;
        }
        self.print_banner();
        eprintln!("{}: {}", loc, message.as_ref());
    }

    /// Like [`Diagnostics::warn`] but with an explicit file/line rather
    /// than the scrubber's current location (`as_warn_where_with_column`).
    pub fn warn_at(&self, file: &str, line: u32, column: u32, message: impl AsRef<str>) {
        if self.suppress_warnings {
            return;
        }
        self.print_banner();
        if column != 0 {
            eprintln!("{}:{}:{}: {}", file, line, column, message.as_ref());
        } else if line != 0 {
            eprintln!("{}:{}: {}", file, line, message.as_ref());
        } else {
            eprintln!("{}: {}", file, message.as_ref());
        }
    }

    /// Report a non-recoverable-but-continuable problem: sets the sticky
    /// bad-error flag (no object file will be written) but does not stop
    /// assembly.
    pub fn bad(&self, loc: &SourceLoc, message: impl AsRef<str>) {
        self.print_banner();
        self.bad_error.store(true, Ordering::Relaxed);
        eprintln!("{}: {}", loc, message.as_ref());
    }

    /// True once any `bad` diagnostic has been raised.
    pub fn has_bad_error(&self) -> bool {
        self.bad_error.load(Ordering::Relaxed)
    }

    /// Append a single line to the secure log named by `AS_SECURE_LOG_FILE`.
    /// At most one line is written per translation unit unless
    /// `.secure_log_reset` re-arms it.
    pub fn secure_log_unique(&self, loc: &SourceLoc, message: &str) {
        if !self.secure_log_armed.get() {
            return;
        }
        let Some(path) = self.secure_log_file.borrow().clone() else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = writeln!(file, "{}:{}:{}", loc.file, loc.logical_line, message);
        }
        self.secure_log_armed.set(false);
    }

    /// `.secure_log_reset`: allow one more `.secure_log_unique` line.
    pub fn secure_log_reset(&self) {
        self.secure_log_armed.set(true);
    }
}
