//! Character-level preprocessor.
//!
//! Mirrors `cctools`'s `as/app.c`
//! (the state constants this enum follows) and `input-scrub.c` (physical vs
//! logical line bookkeeping). `cctools` keeps this state in file-scope
//! mutable globals so it survives across the chunked buffers `next-buffer`
//! hands back one at a time; here the whole file is read up front (an
//! in-memory `Vec<u8>`/`String` is cheap for assembler-sized inputs) so the
//! state machine is a single straight-line pass instead of a resumable
//! coroutine, which keeps `.include` handling at the reader level instead of
//! inside this module (see `super::include`).
//!
//! `PPC-assembly mode` is the only mode this crate exercises, since PPC is
//! the sole backend; the other architectures' state transitions are
//! therefore values this machine never actually reaches, not behavior
//! that's missing.

use crate::diagnostics::Diagnostics;
use crate::source_loc::SharedLoc;

/// Named after the original preprocessor's states, even though several
/// collapse to the same code path for the PPC-only configuration this
/// crate builds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Start,
    AfterWs,
    AfterNonWs,
    InString,
    StringEscape,
}

/// Scrub one file's raw bytes into cleaned text: comments stripped,
/// whitespace runs collapsed to one space (except leading tabs), escapes in
/// string literals passed through untouched, `# N "file"` cpp line markers
/// rewritten to `.line`/`.file` pseudo-ops.
///
/// `loc.physical_line` is advanced for every raw `\n` consumed, including
/// ones that appear inside a string literal and are rewritten to a literal
/// `\n` two-character escape: a literal newline inside a string becomes
/// that escape, and still advances the physical line counter.
pub fn scrub_bytes(bytes: impl Iterator<Item = u8>, loc: &SharedLoc, diag: &Diagnostics) -> String {
    // PPC-assembly mode: '\r' is the line separator, '@' is not
    // special, and single-quoted tokens are full string literals rather than
    // single-char literals reduced to `(N)`.
    const QUOTE: u8 = b'\'';

    let mut out = String::new();
    let mut state = State::Start;
    let mut iter = bytes.peekable();

    while let Some(b) = iter.next() {
        match state {
            State::InString => match b {
                b'\\' => state = State::StringEscape,
                b'\n' => {
                    loc.borrow_mut().physical_line += 1;
                    out.push_str("\\n");
                }
                _ if b == QUOTE => {
                    out.push(QUOTE as char);
                    state = State::AfterNonWs;
                }
                _ => out.push(b as char),
            },
            State::StringEscape => {
                out.push('\\');
                out.push(b as char);
                state = State::InString;
            }
            State::Start | State::AfterWs | State::AfterNonWs => {
                if b == b'\n' {
                    loc.borrow_mut().physical_line += 1;
                    out.push('\n');
                    state = State::Start;
                    continue;
                }
                if b == b'\r' {
                    // PPC-mode line separator: acts like a newline without
                    // advancing the physical line counter (no raw '\n' was
                    // consumed).
                    out.push('\n');
                    state = State::Start;
                    continue;
                }
                if b == b';' {
                    out.push('\n');
                    state = State::Start;
                    continue;
                }
                if b == QUOTE {
                    out.push(QUOTE as char);
                    state = State::InString;
                    continue;
                }
                if b == b'/' && iter.peek() == Some(&b'*') {
                    iter.next();
                    consume_block_comment(&mut iter, loc);
                    push_space(&mut out, state);
                    state = State::AfterWs;
                    continue;
                }
                if b == b'/' && iter.peek() == Some(&b'/') {
                    iter.next();
                    consume_line_comment(&mut iter);
                    push_space(&mut out, state);
                    state = State::AfterWs;
                    continue;
                }
                if b == b'#' && state == State::Start {
                    if let Some(rewritten) = try_cpp_line_marker(&mut iter, diag, loc) {
                        out.push_str(&rewritten);
                        state = State::Start;
                        continue;
                    }
                }
                if b == b' ' || b == b'\t' {
                    if state == State::Start {
                        // Leading tabs are preserved verbatim; leading spaces
                        // collapse the same as interior whitespace.
                        if b == b'\t' {
                            out.push('\t');
                            continue;
                        }
                    }
                    push_space(&mut out, state);
                    state = State::AfterWs;
                    continue;
                }
                out.push(b as char);
                state = State::AfterNonWs;
            }
        }
    }

    if state == State::InString {
        diag.warn(&loc.borrow(), "missing terminating quote; inserted");
        out.push(QUOTE as char);
    }

    out
}

fn push_space(out: &mut String, prev: State) {
    if prev != State::AfterWs {
        out.push(' ');
    }
}

fn consume_block_comment(iter: &mut std::iter::Peekable<impl Iterator<Item = u8>>, loc: &SharedLoc) {
    let mut prev = 0u8;
    for b in iter.by_ref() {
        if b == b'\n' {
            loc.borrow_mut().physical_line += 1;
        }
        if prev == b'*' && b == b'/' {
            return;
        }
        prev = b;
    }
}

fn consume_line_comment(iter: &mut std::iter::Peekable<impl Iterator<Item = u8>>) {
    while let Some(&b) = iter.peek() {
        if b == b'\n' {
            return;
        }
        iter.next();
    }
}

/// `# N "file" ...` → `.line N` `.file "file"`, each on its own rewritten
/// line. Returns `None` (leaving `#` to be treated as an ordinary character)
/// if what follows isn't a decimal line number.
fn try_cpp_line_marker(
    iter: &mut std::iter::Peekable<impl Iterator<Item = u8>>,
    diag: &Diagnostics,
    loc: &SharedLoc,
) -> Option<String> {
    let mut lookahead = Vec::new();
    while let Some(&b) = iter.peek() {
        if b == b'\n' {
            break;
        }
        lookahead.push(b);
        iter.next();
    }
    if iter.peek() == Some(&b'\n') {
        iter.next();
        loc.borrow_mut().physical_line += 1;
    }
    let line = String::from_utf8_lossy(&lookahead);
    let line = line.trim_start();
    let mut parts = line.splitn(2, char::is_whitespace);
    let num = parts.next().unwrap_or("");
    if num.is_empty() || !num.bytes().all(|c| c.is_ascii_digit()) {
        diag.warn(&loc.borrow(), "malformed line marker, ignored");
        return Some(String::new());
    }
    let rest = parts.next().unwrap_or("").trim_start();
    let mut rewritten = format!(".line {}\n", num);
    if let Some(file) = rest.strip_prefix('"') {
        if let Some(end) = file.find('"') {
            rewritten.push_str(&format!(".file \"{}\"\n", &file[..end]));
        }
    }
    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_loc::SourceLoc;
    use std::rc::Rc;
    use std::cell::RefCell;

    fn scrub(text: &str) -> String {
        let loc = Rc::new(RefCell::new(SourceLoc::new("t.s")));
        let diag = Diagnostics::new(false, "ppc", true);
        scrub_bytes(text.bytes(), &loc, &diag)
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(scrub("mov   r1,    r2\n"), "mov r1, r2\n");
    }

    #[test]
    fn strips_block_comment() {
        assert_eq!(scrub("a /* x */ b\n"), "a b\n");
    }

    #[test]
    fn strips_line_comment() {
        assert_eq!(scrub("a // trailing\nb\n"), "a\nb\n");
    }

    #[test]
    fn semicolon_terminates_line() {
        assert_eq!(scrub("add r1,r2 ; mov r3,r4\n"), "add r1,r2\n mov r3,r4\n");
    }

    #[test]
    fn preserves_leading_tab() {
        assert_eq!(scrub("\tadd r1,r2\n"), "\tadd r1,r2\n");
    }

    #[test]
    fn rewrites_line_marker() {
        assert_eq!(scrub("# 12 \"foo.s\"\nadd r1,r2\n"), ".line 12\n.file \"foo.s\"\nadd r1,r2\n");
    }

    #[test]
    fn string_escape_passthrough() {
        assert_eq!(scrub("'a\\'b'\n"), "'a\\'b'\n");
    }
}
