//! Local (numeric) labels: `N:` definitions, `Nb`/`Nf` references.
//!
//! Mirrors `fb_low_counter`/`fb_labels` in `cctools`'s `as/symbols.c`: a
//! small fast path
//! for the common low label numbers plus a growable side table for anything
//! larger, instead of one giant array indexed by label number.

use std::collections::HashMap;

/// Internal name-space separator the original uses for local labels
/// (`"L<N>\x02<M>"`) so they can never collide with a user-chosen name.
/// Chosen above the ASCII range so the mangled name still tokenizes as a
/// single identifier (`is_ident_continue` in `ir::expr` treats any non-ASCII
/// char as ident-continue) when substituted back into source text ahead of
/// expression parsing.
const SENTINEL: char = '\u{a0}';

const FAST_PATH_LABELS: usize = 10;

#[derive(Default)]
pub struct LocalLabels {
    fast: [u32; FAST_PATH_LABELS],
    overflow: HashMap<u32, u32>,
}

impl LocalLabels {
    pub fn new() -> Self {
        LocalLabels::default()
    }

    fn counter(&self, n: u32) -> u32 {
        match usize::try_from(n) {
            Ok(i) if i < FAST_PATH_LABELS => self.fast[i],
            _ => self.overflow.get(&n).copied().unwrap_or(0),
        }
    }

    fn bump(&mut self, n: u32) -> u32 {
        match usize::try_from(n) {
            Ok(i) if i < FAST_PATH_LABELS => {
                self.fast[i] += 1;
                self.fast[i]
            }
            _ => {
                let c = self.overflow.entry(n).or_insert(0);
                *c += 1;
                *c
            }
        }
    }

    /// `N:` seen in the source: start a new occurrence and return the mangled
    /// name to define in the symbol table.
    pub fn define(&mut self, n: u32) -> String {
        let m = self.bump(n);
        format!("L{}{}{}", n, SENTINEL, m)
    }

    /// `Nb`: the immediately preceding `N:` occurrence.
    pub fn backward_name(&self, n: u32) -> Option<String> {
        let m = self.counter(n);
        if m == 0 {
            None
        } else {
            Some(format!("L{}{}{}", n, SENTINEL, m))
        }
    }

    /// `Nf`: the next (not-yet-seen) `N:` occurrence.
    pub fn forward_name(&self, n: u32) -> String {
        format!("L{}{}{}", n, SENTINEL, self.counter(n) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn forward_then_definition_then_backward() {
        let mut labels = LocalLabels::new();
        let forward = labels.forward_name(1);
        let defined = labels.define(1);
        assert_eq!(forward, defined);
        let backward = labels.backward_name(1).unwrap();
        assert_eq!(backward, defined);
    }

    #[test]
    fn repeated_definitions_increment_occurrence() {
        let mut labels = LocalLabels::new();
        let first = labels.define(7);
        let second = labels.define(7);
        assert_ne!(first, second);
        assert_eq!(labels.backward_name(7).unwrap(), second);
    }

    #[test]
    fn overflow_labels_use_side_table() {
        let mut labels = LocalLabels::new();
        let defined = labels.define(999);
        assert_eq!(labels.backward_name(999).unwrap(), defined);
    }

    proptest! {
        /// Whatever `n` a caller picks (low-numbered fast-path or a large
        /// overflow number), `forward_name` must predict the very name
        /// `define` goes on to produce, and `backward_name` must then
        /// agree with it — the round trip `.if`/branch-resolution code
        /// depends on.
        #[test]
        fn forward_name_always_predicts_the_next_define(n in 0u32..2000) {
            let mut labels = LocalLabels::new();
            for _ in 0..5u32 {
                let forward = labels.forward_name(n);
                let defined = labels.define(n);
                prop_assert_eq!(forward, defined.clone());
                prop_assert_eq!(labels.backward_name(n).unwrap(), defined);
            }
        }

        /// Labels with different numbers never collide, regardless of how
        /// many times either has been defined.
        #[test]
        fn distinct_numbers_never_collide(a in 0u32..2000, b in 0u32..2000, hits_a in 1u32..5, hits_b in 1u32..5) {
            prop_assume!(a != b);
            let mut labels = LocalLabels::new();
            let mut last_a = String::new();
            for _ in 0..hits_a {
                last_a = labels.define(a);
            }
            let mut last_b = String::new();
            for _ in 0..hits_b {
                last_b = labels.define(b);
            }
            prop_assert_ne!(last_a, last_b);
        }
    }
}
