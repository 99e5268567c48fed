//! The two concrete byte sources the preprocessor state machine runs over.
//!
//! The original assembler kept two hand-written copies of the scrubber,
//! one per source kind. We keep exactly one scrubber
//! (`super::state_machine`) and erase the source behind an iterator, the way
//! `cranelift-entity`'s `EntityRef` erases storage behind a trait rather than
//! duplicating map implementations per key type.

use std::fs::File;
use std::io::{BufReader, Read};

/// Anything that can hand the scrubber a stream of raw input bytes.
pub trait ByteSource: Iterator<Item = u8> {}
impl<T: Iterator<Item = u8>> ByteSource for T {}

/// Reads a buffered file byte-by-byte. `.include`d files and the top-level
/// input file both go through this when reading from disk.
pub struct FileSource {
    reader: BufReader<File>,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
        Ok(FileSource {
            reader: BufReader::new(File::open(path)?),
        })
    }
}

impl Iterator for FileSource {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }
}

/// An in-memory source, used for `-string` input and for macro re-expansion
///.
pub struct StringSource {
    bytes: std::vec::IntoIter<u8>,
}

impl StringSource {
    pub fn new(text: impl Into<Vec<u8>>) -> Self {
        StringSource {
            bytes: text.into().into_iter(),
        }
    }
}

impl Iterator for StringSource {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.bytes.next()
    }
}
