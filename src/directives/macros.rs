//! `.macro`/`.endmacro` capture and expansion.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::diagnostics::Diagnostics;
use crate::source_loc::SourceLoc;

/// Up to 10 positional arguments, inline — the same cap `parse_args` enforces
/// below — so an ordinary invocation never spills to the heap.
pub type MacroArgs = SmallVec<[String; 10]>;

/// Maximum macro-expansion nesting depth.
pub const MAX_MACRO_DEPTH: usize = 20;

/// Pseudo-op names a macro definition may never shadow.
const RESERVED: &[&str] = &[
    "if", "elseif", "else", "endif", "macro", "endmacro", "endm", "include", "dump", "load",
];

#[derive(Clone)]
pub struct MacroDef {
    pub name: Box<str>,
    pub body: Box<str>,
}

#[derive(Default)]
pub struct MacroTable {
    macros: HashMap<Box<str>, MacroDef>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    pub fn define(&mut self, name: &str, body: String, loc: &SourceLoc, diag: &Diagnostics) {
        let bare = name.trim_start_matches('.');
        if RESERVED.contains(&bare) {
            diag.bad(loc, format!("`.macro {}' shadows a built-in directive", name));
            return;
        }
        self.macros.insert(
            name.into(),
            MacroDef { name: name.into(), body: body.into() },
        );
    }

    pub fn get(&self, name: &str) -> Option<&MacroDef> {
        self.macros.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MacroDef> {
        self.macros.values()
    }

    /// `.load`: insert a macro read back from a dump file, warning rather
    /// than erroring on a name collision.
    pub fn load(&mut self, def: MacroDef, loc: &SourceLoc, diag: &Diagnostics) {
        if self.macros.contains_key(&def.name) {
            diag.warn(loc, format!("macro `{}' redefined by .load", def.name));
        }
        self.macros.insert(def.name.clone(), def);
    }
}

/// Parses a macro invocation's argument list (comma- or space-separated,
/// respecting matched parentheses, up to 10 arguments) and performs
/// `$0..$9`/`$n`/`$$` substitution over the macro body.
pub struct MacroExpander;

impl MacroExpander {
    /// Splits `args_text` (everything after the macro name on the invocation
    /// line) into up to 10 positional arguments.
    pub fn parse_args(args_text: &str) -> MacroArgs {
        let mut args = MacroArgs::new();
        let mut depth = 0i32;
        let mut current = String::new();
        let mut chars = args_text.trim().chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth == 0 => {
                    args.push(std::mem::take(&mut current).trim().to_string());
                }
                c if c.is_whitespace() && depth == 0 => {
                    if !current.is_empty() {
                        args.push(std::mem::take(&mut current));
                    }
                    while chars.peek().is_some_and(|c| c.is_whitespace()) {
                        chars.next();
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.trim().is_empty() {
            args.push(current.trim().to_string());
        }
        args.truncate(10);
        args
    }

    /// Expand `body`, substituting `$0` (the macro name) .. `$9` (the first
    /// nine arguments), `$n` (actual argument count), and `$$` (literal
    /// `$`). The result is wrapped in leading/trailing newlines so it can be
    /// re-scrubbed and re-parsed as ordinary buffer text.
    pub fn expand(body: &str, macro_name: &str, args: &[String]) -> String {
        let mut out = String::from("\n");
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            match chars.peek() {
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('n') => {
                    chars.next();
                    out.push_str(&args.len().to_string());
                }
                Some(d) if d.is_ascii_digit() => {
                    let d = *d;
                    chars.next();
                    let index = d.to_digit(10).unwrap() as usize;
                    if index == 0 {
                        out.push_str(macro_name);
                    } else if let Some(arg) = args.get(index - 1) {
                        out.push_str(arg);
                    }
                    // else: absent argument substitutes to empty string.
                }
                _ => out.push('$'),
            }
        }
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_args() {
        assert_eq!(MacroExpander::parse_args("a, b, c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn parses_space_separated_args() {
        assert_eq!(MacroExpander::parse_args("a b c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn respects_parens_in_args() {
        assert_eq!(MacroExpander::parse_args("f(a, b), c"), vec!["f(a, b)", "c"]);
    }

    #[test]
    fn expands_positional_and_count() {
        let args = vec!["r1".to_string(), "r2".to_string()];
        let out = MacroExpander::expand("add $1, $2 ; $n args\n", "addtwo", &args);
        assert_eq!(out, "\nadd r1, r2 ; 2 args\n\n");
    }

    #[test]
    fn missing_argument_substitutes_empty() {
        let out = MacroExpander::expand("mov $1, $3\n", "m", &["r1".to_string()]);
        assert_eq!(out, "\nmov r1, \n\n");
    }

    #[test]
    fn dollar_dollar_is_literal() {
        let out = MacroExpander::expand("lea $$1(r1)\n", "m", &[]);
        assert_eq!(out, "\nlea $1(r1)\n\n");
    }
}
