//! `.dump "path"` / `.load "path"` persistence format.
//!
//! On-disk layout: a macros block (`name\0 body\0` pairs terminated by an
//! extra `\0`), then a symbols block (`name\0 value_le32` pairs terminated
//! by a `\0`).

use std::io::{self, Read, Write};

use crate::directives::macros::{MacroDef, MacroTable};

pub struct DumpedSymbol {
    pub name: String,
    pub value: u32,
}

pub fn dump_state(
    writer: &mut impl Write,
    macros: &MacroTable,
    absolute_symbols: &[DumpedSymbol],
) -> io::Result<()> {
    for m in macros.iter() {
        write_cstr(writer, &m.name)?;
        write_cstr(writer, &m.body)?;
    }
    writer.write_all(&[0])?;

    for sym in absolute_symbols {
        write_cstr(writer, &sym.name)?;
        writer.write_all(&sym.value.to_le_bytes())?;
    }
    writer.write_all(&[0])?;
    Ok(())
}

pub fn load_state(reader: &mut impl Read) -> io::Result<(Vec<MacroDef>, Vec<DumpedSymbol>)> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let mut pos = 0;

    let mut macros = Vec::new();
    loop {
        let Some(name) = read_cstr(&bytes, &mut pos) else { break };
        if name.is_empty() {
            break;
        }
        let body = read_cstr(&bytes, &mut pos).unwrap_or_default();
        macros.push(MacroDef { name: name.into(), body: body.into() });
    }

    let mut symbols = Vec::new();
    loop {
        let Some(name) = read_cstr(&bytes, &mut pos) else { break };
        if name.is_empty() {
            break;
        }
        if pos + 4 > bytes.len() {
            break;
        }
        let value = u32::from_le_bytes(bytes[pos..pos + 4].try_into().unwrap());
        pos += 4;
        symbols.push(DumpedSymbol { name, value });
    }

    Ok((macros, symbols))
}

fn write_cstr(writer: &mut impl Write, s: &str) -> io::Result<()> {
    writer.write_all(s.as_bytes())?;
    writer.write_all(&[0])
}

fn read_cstr(bytes: &[u8], pos: &mut usize) -> Option<String> {
    let start = *pos;
    let end = bytes[start..].iter().position(|&b| b == 0)? + start;
    *pos = end + 1;
    Some(String::from_utf8_lossy(&bytes[start..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_macros_and_symbols() {
        let mut macros = MacroTable::new();
        let loc = crate::source_loc::SourceLoc::new("t.s");
        let diag = crate::diagnostics::Diagnostics::new(false, "ppc", true);
        macros.define("frob", "add $1, $2\n".to_string(), &loc, &diag);

        let symbols = vec![DumpedSymbol { name: "VERSION".to_string(), value: 7 }];

        let mut buf = Vec::new();
        dump_state(&mut buf, &macros, &symbols).unwrap();

        let (loaded_macros, loaded_symbols) = load_state(&mut &buf[..]).unwrap();
        assert_eq!(loaded_macros.len(), 1);
        assert_eq!(loaded_macros[0].name.as_ref(), "frob");
        assert_eq!(loaded_symbols.len(), 1);
        assert_eq!(loaded_symbols[0].value, 7);
    }
}
