//! `.if`/`.elseif`/`.else`/`.endif` stack.

use crate::diagnostics::Diagnostics;
use crate::source_loc::SourceLoc;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CondKind {
    If,
    Elseif,
    Else,
}

#[derive(Clone, Copy, Debug)]
pub struct CondFrame {
    pub kind: CondKind,
    /// Whether any branch of this `.if`/`.elseif`/`.else` chain has matched
    /// yet — once one has, later `.elseif` branches are skipped regardless
    /// of their own condition.
    pub cond_met: bool,
    /// Whether the *current* branch's body should be skipped (its own
    /// condition was false, or an enclosing frame is already ignoring).
    pub ignoring: bool,
}

/// Maximum nesting depth.
pub const MAX_COND_DEPTH: usize = 20;

#[derive(Default)]
pub struct CondStack {
    frames: Vec<CondFrame>,
}

impl CondStack {
    pub fn new() -> Self {
        CondStack::default()
    }

    /// Whether source text should currently be parsed at all, or
    /// syntactically skipped to end-of-line (only
    /// `.if`/`.elseif`/`.else`/`.endif` are still honored while this is
    /// `true`).
    pub fn is_ignoring(&self) -> bool {
        self.frames.last().is_some_and(|f| f.ignoring)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_if(&mut self, condition: bool, loc: &SourceLoc, diag: &Diagnostics) {
        if self.frames.len() >= MAX_COND_DEPTH {
            diag.bad(loc, "`.if' nested too deeply");
            return;
        }
        let parent_ignoring = self.is_ignoring();
        self.frames.push(CondFrame {
            kind: CondKind::If,
            cond_met: condition,
            ignoring: parent_ignoring || !condition,
        });
    }

    pub fn elseif(&mut self, condition: bool, loc: &SourceLoc, diag: &Diagnostics) {
        let Some(frame) = self.frames.last_mut() else {
            diag.bad(loc, "`.elseif' without matching `.if'");
            return;
        };
        if frame.kind == CondKind::Else {
            diag.bad(loc, "`.elseif' after `.else'");
            return;
        }
        let grandparent_ignoring = self.frames.len() >= 2
            && self.frames[..self.frames.len() - 1].last().is_some_and(|f| f.ignoring);
        let frame = self.frames.last_mut().unwrap();
        if frame.cond_met {
            frame.ignoring = true;
        } else {
            frame.cond_met = condition;
            frame.ignoring = grandparent_ignoring || !condition;
        }
        frame.kind = CondKind::Elseif;
    }

    pub fn else_(&mut self, loc: &SourceLoc, diag: &Diagnostics) {
        let Some(frame) = self.frames.last() else {
            diag.bad(loc, "`.else' without matching `.if'");
            return;
        };
        if frame.kind == CondKind::Else {
            diag.bad(loc, "`.else' after `.else'");
            return;
        }
        let grandparent_ignoring =
            self.frames.len() >= 2 && self.frames[..self.frames.len() - 1].last().is_some_and(|f| f.ignoring);
        let frame = self.frames.last_mut().unwrap();
        let met_already = frame.cond_met;
        frame.kind = CondKind::Else;
        frame.ignoring = met_already || grandparent_ignoring;
    }

    pub fn endif(&mut self, loc: &SourceLoc, diag: &Diagnostics) {
        if self.frames.pop().is_none() {
            diag.bad(loc, "`.endif' without matching `.if'");
        }
    }

    /// Called at end-of-file: an unbalanced `.if` is an error.
    pub fn check_balanced(&self, loc: &SourceLoc, diag: &Diagnostics) {
        if !self.frames.is_empty() {
            diag.bad(loc, "unterminated `.if'");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diag() -> Diagnostics {
        Diagnostics::new(false, "ppc", true)
    }

    #[test]
    fn simple_if_false_ignores_body() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.push_if(false, &loc, &d);
        assert!(stack.is_ignoring());
        stack.endif(&loc, &d);
        assert_eq!(stack.depth(), 0);
        assert!(!d.has_bad_error());
    }

    #[test]
    fn elseif_after_true_if_is_skipped() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.push_if(true, &loc, &d);
        assert!(!stack.is_ignoring());
        stack.elseif(true, &loc, &d);
        assert!(stack.is_ignoring());
    }

    #[test]
    fn unbalanced_if_reports_error_at_eof() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.push_if(true, &loc, &d);
        stack.check_balanced(&loc, &d);
        assert!(d.has_bad_error());
    }

    #[test]
    fn nested_else_follows_an_active_outer_if() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.push_if(true, &loc, &d);
        stack.push_if(false, &loc, &d);
        stack.else_(&loc, &d);
        assert!(!stack.is_ignoring(), "outer `.if` is active, so the nested `.else` body should run");
        assert!(!d.has_bad_error());
    }

    #[test]
    fn nested_else_still_honors_an_ignoring_outer_if() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.push_if(false, &loc, &d);
        stack.push_if(false, &loc, &d);
        stack.else_(&loc, &d);
        assert!(stack.is_ignoring(), "outer `.if` is false, so every nested branch stays ignored");
    }

    #[test]
    fn endif_without_if_is_an_error() {
        let d = diag();
        let loc = SourceLoc::new("t.s");
        let mut stack = CondStack::new();
        stack.endif(&loc, &d);
        assert!(d.has_bad_error());
    }
}
