//! Source-location tracking, threaded through the scrubber and read by
//! every diagnostic.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable cursor into the current file: the scrubber advances it
/// as it consumes bytes, and every diagnostic call reads it back.
pub type SharedLoc = Rc<RefCell<SourceLoc>>;

/// `{file, logical-line, physical-line, column}`, updated by the input
/// scrubber and preprocessor and read on every diagnostic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: Rc<str>,
    pub logical_line: u32,
    pub physical_line: u32,
    pub column: u32,
}

impl SourceLoc {
    pub fn new(file: impl Into<Rc<str>>) -> Self {
        SourceLoc {
            file: file.into(),
            logical_line: 1,
            physical_line: 1,
            column: 0,
        }
    }

    pub fn shared(file: impl Into<Rc<str>>) -> SharedLoc {
        Rc::new(RefCell::new(SourceLoc::new(file)))
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.column != 0 {
            write!(f, "{}:{}:{}", self.file, self.logical_line, self.column)
        } else {
            write!(f, "{}:{}", self.file, self.logical_line)
        }
    }
}
