//! `.include` resolution and the scrub-context stack.
//!
//! The original pushes/pops a single global scanner state
//! (`save_scrub_context`/`restore_scrub_context`) because its scrubber is a
//! resumable coroutine driven buffer-by-buffer. Since [`super::scrub_source`]
//! scrubs a whole file in one shot, nesting falls out of ordinary recursion:
//! the reader scrubs the included file, drives it to completion, and returns
//! to the includer's already-scrubbed text. This `IncludeStack` exists to
//! enforce the nesting cap and to resolve search paths, which is the part of
//! the original behavior that doesn't fall out of recursion for free.

use std::path::{Path, PathBuf};

use crate::error::{AssemblerError, AssemblerResult};

/// `as_file`'s default include search path when nothing more specific
/// matches, mirroring the compiled-in list in `input-scrub.c`.
const DEFAULT_INCLUDE_DIRS: &[&str] = &["/usr/include", "/usr/local/include"];

/// Matches `.if`/`.macro`'s nesting caps; `.include` uses
/// the same figure in the original.
pub const MAX_INCLUDE_DEPTH: usize = 20;

pub struct IncludeResolver {
    /// Directory containing the file that's currently being read, prepended
    /// implicitly ahead of every `-I` directory.
    input_dir: PathBuf,
    /// `-I DIR` flags, in the order given on the command line.
    search_dirs: Vec<PathBuf>,
    depth: usize,
}

impl IncludeResolver {
    pub fn new(input_dir: PathBuf, search_dirs: Vec<PathBuf>) -> Self {
        IncludeResolver {
            input_dir,
            search_dirs,
            depth: 0,
        }
    }

    /// Resolve `.include "name"` to a readable path, trying `input_dir`,
    /// then each `-I` directory in order, then the built-in defaults.
    pub fn resolve(&self, name: &str) -> AssemblerResult<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() && direct.is_file() {
            return Ok(direct.to_path_buf());
        }
        let defaults = DEFAULT_INCLUDE_DIRS.iter().map(PathBuf::from);
        for dir in std::iter::once(self.input_dir.clone())
            .chain(self.search_dirs.iter().cloned())
            .chain(defaults)
        {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(AssemblerError::IncludeNotFound(name.to_string()))
    }

    pub fn enter(&mut self) -> AssemblerResult<()> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(AssemblerError::NestingTooDeep("#include nested too deeply"));
        }
        self.depth += 1;
        log::debug!("entering include at depth {}", self.depth);
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        log::debug!("leaving include, depth now {}", self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_reports_name() {
        let resolver = IncludeResolver::new(PathBuf::from("."), vec![]);
        let err = resolver.resolve("definitely-missing.inc").unwrap_err();
        assert!(matches!(err, AssemblerError::IncludeNotFound(n) if n == "definitely-missing.inc"));
    }

    #[test]
    fn depth_cap_enforced() {
        let mut resolver = IncludeResolver::new(PathBuf::from("."), vec![]);
        for _ in 0..MAX_INCLUDE_DEPTH {
            resolver.enter().unwrap();
        }
        assert!(resolver.enter().is_err());
    }
}
