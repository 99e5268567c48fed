//! Expression evaluator.
//!
//! Recursive-descent over an operator precedence table, producing the
//! five-segment (plus `NONE`) algebra `cctools`'s `expr()`/`operand()`
//! pair builds in `as/read.c`'s treatment of
//! `O_constant`/`O_symbol`/`O_subtract`/`O_big`.

use crate::diagnostics::Diagnostics;
use crate::ir::symbol::{Symbol, SymbolKind, SymbolTable};
use crate::source_loc::SourceLoc;

/// Expression category, not a Mach-O segment.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment {
    /// No expression was scanned.
    None,
    /// A bignum or float literal, stashed in [`BigLiteral`].
    Big,
    /// A pure constant.
    Absolute,
    /// A symbol's section + offset.
    Sect,
    /// A section-relative difference between two symbols in different
    /// sections (or not yet both defined).
    DiffSect,
    /// A forward-declared (as yet undefined) symbol.
    Unknown,
}

/// Side channel for `BIG`-segment literals: a bignum wider than a machine
/// word, or an IEEE float literal, kept as its original text rather than
/// eagerly converted (the target-specific float format is chosen later by
/// the pseudo-op that consumes it, e.g. `.double` vs `.single`).
#[derive(Clone, Debug, PartialEq)]
pub struct BigLiteral {
    pub text: Box<str>,
    pub is_float: bool,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub seg: Segment,
    pub add_symbol: Option<Symbol>,
    pub subtract_symbol: Option<Symbol>,
    pub add_number: i64,
    pub sectdiff_divide_by_two: bool,
    pub big: Option<BigLiteral>,
}

impl Expr {
    pub fn none() -> Self {
        Expr {
            seg: Segment::None,
            add_symbol: None,
            subtract_symbol: None,
            add_number: 0,
            sectdiff_divide_by_two: false,
            big: None,
        }
    }

    pub fn absolute(value: i64) -> Self {
        Expr {
            seg: Segment::Absolute,
            add_number: value,
            ..Expr::none()
        }
    }
}

/// `get_absolute_expression`: errors unless the result is `ABSOLUTE`.
pub fn get_absolute_expression(expr: &Expr, loc: &SourceLoc, diag: &Diagnostics) -> i64 {
    if expr.seg != Segment::Absolute {
        diag.bad(loc, "expected absolute expression");
        return 0;
    }
    expr.add_number
}

/// `get_known_segmented_expression`: errors on `UNKNOWN`.
pub fn get_known_segmented_expression<'a>(expr: &'a Expr, loc: &SourceLoc, diag: &Diagnostics) -> &'a Expr {
    if expr.seg == Segment::Unknown {
        diag.bad(loc, "expression has undefined symbol");
    }
    expr
}

pub struct ExprParser<'a> {
    text: &'a str,
    pos: usize,
    symbols: &'a mut SymbolTable,
    loc: &'a SourceLoc,
    diag: &'a Diagnostics,
}

impl<'a> ExprParser<'a> {
    pub fn new(text: &'a str, symbols: &'a mut SymbolTable, loc: &'a SourceLoc, diag: &'a Diagnostics) -> Self {
        ExprParser { text, pos: 0, symbols, loc, diag }
    }

    /// Returns the parsed expression and the byte offset just past it, so
    /// the caller (a pseudo-op or the PPC operand parser) can keep
    /// tokenizing the rest of the statement.
    pub fn parse(mut self) -> (Expr, usize) {
        self.skip_ws();
        if self.pos >= self.text.len() {
            return (Expr::none(), self.pos);
        }
        let e = self.parse_bitor();
        (e, self.pos)
    }

    fn skip_ws(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.text[self.pos..].starts_with(s)
    }

    fn bump(&mut self, n: usize) {
        self.pos += n;
        self.skip_ws();
    }

    // Precedence, low to high binds loosest last in a recursive-descent
    // chain: | -> ^ -> & -> shift -> additive -> mul -> unary -> primary.
    fn parse_bitor(&mut self) -> Expr {
        let mut lhs = self.parse_bitxor();
        loop {
            if self.peek() == Some('|') && !self.starts_with("||") {
                self.bump(1);
                let rhs = self.parse_bitxor();
                lhs = combine_absolute(lhs, rhs, |a, b| a | b, self.loc, self.diag);
            } else {
                return lhs;
            }
        }
    }

    fn parse_bitxor(&mut self) -> Expr {
        let mut lhs = self.parse_bitand();
        loop {
            if self.peek() == Some('^') {
                self.bump(1);
                let rhs = self.parse_bitand();
                lhs = combine_absolute(lhs, rhs, |a, b| a ^ b, self.loc, self.diag);
            } else {
                return lhs;
            }
        }
    }

    fn parse_bitand(&mut self) -> Expr {
        let mut lhs = self.parse_shift();
        loop {
            if self.peek() == Some('&') && !self.starts_with("&&") {
                self.bump(1);
                let rhs = self.parse_shift();
                lhs = combine_absolute(lhs, rhs, |a, b| a & b, self.loc, self.diag);
            } else {
                return lhs;
            }
        }
    }

    fn parse_shift(&mut self) -> Expr {
        let mut lhs = self.parse_additive();
        loop {
            if self.starts_with("<<") {
                self.bump(2);
                let rhs = self.parse_additive();
                lhs = combine_absolute(lhs, rhs, |a, b| a << (b & 63), self.loc, self.diag);
            } else if self.starts_with(">>") {
                self.bump(2);
                let rhs = self.parse_additive();
                lhs = combine_absolute(lhs, rhs, |a, b| a >> (b & 63), self.loc, self.diag);
            } else {
                return lhs;
            }
        }
    }

    fn parse_additive(&mut self) -> Expr {
        let mut lhs = self.parse_mul();
        loop {
            if self.peek() == Some('+') {
                self.bump(1);
                let rhs = self.parse_mul();
                lhs = self.add(lhs, rhs);
            } else if self.peek() == Some('-') {
                self.bump(1);
                let rhs = self.parse_mul();
                lhs = self.subtract(lhs, rhs);
            } else {
                return lhs;
            }
        }
    }

    fn parse_mul(&mut self) -> Expr {
        let mut lhs = self.parse_unary();
        loop {
            if self.peek() == Some('*') {
                self.bump(1);
                let rhs = self.parse_unary();
                lhs = combine_absolute(lhs, rhs, |a, b| a.wrapping_mul(b), self.loc, self.diag);
            } else if self.peek() == Some('/') {
                self.bump(1);
                let rhs = self.parse_unary();
                lhs = combine_absolute(
                    lhs,
                    rhs,
                    |a, b| if b == 0 { 0 } else { a / b },
                    self.loc,
                    self.diag,
                );
            } else if self.peek() == Some('%') {
                self.bump(1);
                let rhs = self.parse_unary();
                lhs = combine_absolute(
                    lhs,
                    rhs,
                    |a, b| if b == 0 { 0 } else { a % b },
                    self.loc,
                    self.diag,
                );
            } else {
                return lhs;
            }
        }
    }

    fn parse_unary(&mut self) -> Expr {
        match self.peek() {
            Some('-') => {
                self.bump(1);
                let e = self.parse_unary();
                combine_absolute(Expr::absolute(0), e, |_, b| -b, self.loc, self.diag)
            }
            Some('~') => {
                self.bump(1);
                let e = self.parse_unary();
                combine_absolute(Expr::absolute(0), e, |_, b| !b, self.loc, self.diag)
            }
            Some('!') => {
                self.bump(1);
                let e = self.parse_unary();
                combine_absolute(Expr::absolute(0), e, |_, b| if b == 0 { 1 } else { 0 }, self.loc, self.diag)
            }
            Some('+') => {
                self.bump(1);
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Expr {
        if self.peek() == Some('(') {
            self.bump(1);
            let e = self.parse_bitor();
            if self.peek() == Some(')') {
                self.bump(1);
            } else {
                self.diag.bad(self.loc, "missing close paren");
            }
            return e;
        }
        if self.peek() == Some('\'') {
            return self.parse_char_literal();
        }
        if self.starts_with("0f") || self.starts_with("0d") || self.starts_with("0s") || self.starts_with("0r")
            || self.starts_with("0F") || self.starts_with("0D") || self.starts_with("0S") || self.starts_with("0R")
        {
            return self.parse_float_literal();
        }
        if let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                return self.parse_number();
            }
            if is_ident_start(c) {
                return self.parse_name();
            }
        }
        self.diag.bad(self.loc, "expected operand");
        Expr::none()
    }

    fn parse_char_literal(&mut self) -> Expr {
        let rest = &self.text[self.pos + 1..];
        let mut chars = rest.chars();
        let Some(c) = chars.next() else {
            self.diag.bad(self.loc, "unterminated character literal");
            return Expr::none();
        };
        if chars.next() != Some('\'') {
            self.diag.bad(self.loc, "malformed character literal");
            return Expr::none();
        }
        self.bump(1 + c.len_utf8() + 1);
        Expr::absolute(c as i64)
    }

    fn parse_float_literal(&mut self) -> Expr {
        let start = self.pos;
        let rest = &self.text[self.pos..];
        let end = rest
            .char_indices()
            .find(|&(_, c)| c == ' ' || is_operator(c) || c == ')' || c == ',')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let text = &self.text[start..start + end];
        self.bump(end);
        Expr {
            seg: Segment::Big,
            big: Some(BigLiteral { text: text.into(), is_float: true }),
            ..Expr::none()
        }
    }

    fn parse_number(&mut self) -> Expr {
        let rest = &self.text[self.pos..];
        let end = rest
            .char_indices()
            .take_while(|&(i, c)| {
                c.is_ascii_hexdigit()
                    || c == 'x'
                    || c == 'X'
                    || c == 'b'
                    || c == 'B' && i > 0
            })
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);
        let text = &rest[..end.max(1)];
        self.bump(end.max(1));
        let value = parse_integer_literal(text);
        // A literal too wide for i64 is routed to the BIG side-channel
        // (e.g. `.quad`/`.octa` constants).
        match value {
            Some(v) => Expr::absolute(v),
            None => Expr {
                seg: Segment::Big,
                big: Some(BigLiteral { text: text.into(), is_float: false }),
                ..Expr::none()
            },
        }
    }

    fn parse_name(&mut self) -> Expr {
        let rest = &self.text[self.pos..];
        let end = rest
            .char_indices()
            .take_while(|&(_, c)| is_ident_continue(c))
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let name = &rest[..end];
        self.bump(end);
        let sym = self.symbols.intern(name);
        match self.symbols.get(sym).kind {
            SymbolKind::Undefined => Expr {
                seg: Segment::Unknown,
                add_symbol: Some(sym),
                ..Expr::none()
            },
            SymbolKind::Absolute => Expr::absolute(self.symbols.get(sym).value as i64),
            SymbolKind::Section => Expr {
                seg: Segment::Sect,
                add_symbol: Some(sym),
                ..Expr::none()
            },
        }
    }

    /// `S + k` / `S - k`: keep the symbol, fold the constant.
    fn add(&mut self, lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.seg, rhs.seg) {
            (Segment::Absolute, Segment::Absolute) => Expr::absolute(lhs.add_number.wrapping_add(rhs.add_number)),
            (_, Segment::Absolute) if lhs.add_symbol.is_some() => Expr {
                add_number: lhs.add_number.wrapping_add(rhs.add_number),
                ..lhs
            },
            (Segment::Absolute, _) if rhs.add_symbol.is_some() => Expr {
                add_number: lhs.add_number.wrapping_add(rhs.add_number),
                ..rhs
            },
            _ => {
                self.diag.bad(self.loc, "invalid operands to `+'");
                Expr::none()
            }
        }
    }

    /// `S1 - S2`: same section → `ABSOLUTE`; otherwise `DIFFSECT`.
    fn subtract(&mut self, lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.seg, rhs.seg) {
            (Segment::Absolute, Segment::Absolute) => Expr::absolute(lhs.add_number.wrapping_sub(rhs.add_number)),
            (_, Segment::Absolute) if lhs.add_symbol.is_some() => Expr {
                add_number: lhs.add_number.wrapping_sub(rhs.add_number),
                ..lhs
            },
            (Segment::Sect, Segment::Sect) => {
                let (Some(a), Some(b)) = (lhs.add_symbol, rhs.add_symbol) else {
                    return Expr::none();
                };
                let same_frag_section = self.symbols.get(a).frag.is_some() && self.symbols.get(b).frag.is_some();
                if same_frag_section && symbols_in_same_section(self.symbols, a, b) {
                    let delta = (self.symbols.get(a).value as i64) - (self.symbols.get(b).value as i64)
                        + lhs.add_number
                        - rhs.add_number;
                    Expr::absolute(delta)
                } else {
                    Expr {
                        seg: Segment::DiffSect,
                        add_symbol: Some(a),
                        subtract_symbol: Some(b),
                        add_number: lhs.add_number - rhs.add_number,
                        ..Expr::none()
                    }
                }
            }
            _ => Expr {
                seg: Segment::DiffSect,
                add_symbol: lhs.add_symbol,
                subtract_symbol: rhs.add_symbol.or(lhs.subtract_symbol),
                add_number: lhs.add_number - rhs.add_number,
                ..Expr::none()
            },
        }
    }
}

fn symbols_in_same_section(symbols: &SymbolTable, a: Symbol, b: Symbol) -> bool {
    symbols.get(a).frag == symbols.get(b).frag || {
        // Frags differ but could still live in the same section; layout
        // has the section->frag mapping needed for a precise check, so this
        // is deliberately conservative pre-layout.
        false
    }
}

fn combine_absolute(
    lhs: Expr,
    rhs: Expr,
    op: impl FnOnce(i64, i64) -> i64,
    loc: &SourceLoc,
    diag: &Diagnostics,
) -> Expr {
    match (lhs.seg, rhs.seg) {
        (Segment::Absolute, Segment::Absolute) => Expr::absolute(op(lhs.add_number, rhs.add_number)),
        (Segment::Unknown, _) | (_, Segment::Unknown) => Expr {
            seg: Segment::Unknown,
            add_symbol: lhs.add_symbol.or(rhs.add_symbol),
            ..Expr::none()
        },
        _ => {
            diag.bad(loc, "invalid operands to binary operator");
            Expr::none()
        }
    }
}

fn is_operator(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '<' | '>' | '~' | '!')
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || c == '.' || (c as u32) > 0x7f
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Decimal / `0x` hex / `0` octal / `0b` binary. Returns `None`
/// when the literal doesn't fit in an `i64` (routed to the `BIG` channel by
/// the caller).
pub fn parse_integer_literal(text: &str) -> Option<i64> {
    let (radix, digits) = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (16, hex)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (2, bin)
    } else if text.starts_with('0') && text.len() > 1 {
        (8, &text[1..])
    } else {
        (10, text)
    };
    if digits.is_empty() {
        return Some(0);
    }
    i64::from_str_radix(digits, radix).ok().or_else(|| {
        u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Expr {
        let mut symbols = SymbolTable::new();
        let loc = SourceLoc::new("t.s");
        let diag = Diagnostics::new(false, "ppc", true);
        ExprParser::new(text, &mut symbols, &loc, &diag).parse().0
    }

    #[test]
    fn precedence_mul_before_add() {
        let e = eval("2 + 3 * 4");
        assert_eq!(e.seg, Segment::Absolute);
        assert_eq!(e.add_number, 14);
    }

    #[test]
    fn parens_override_precedence() {
        let e = eval("(2 + 3) * 4");
        assert_eq!(e.add_number, 20);
    }

    #[test]
    fn shift_and_mask() {
        let e = eval("1 << 4 & 0xff");
        assert_eq!(e.add_number, 16);
    }

    #[test]
    fn hex_and_octal_literals() {
        assert_eq!(eval("0x10").add_number, 16);
        assert_eq!(eval("010").add_number, 8);
    }

    #[test]
    fn character_literal() {
        assert_eq!(eval("'A'").add_number, 'A' as i64);
    }

    #[test]
    fn forward_reference_is_unknown() {
        let e = eval("undefined_symbol");
        assert_eq!(e.seg, Segment::Unknown);
    }
}
