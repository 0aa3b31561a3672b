//! Per-symbol section bundling and subfunction kinship.
//!
//! Objects compiled with `-ffunction-sections`/`-fdata-sections` give almost
//! every symbol a dedicated section named prefix + symbol name. Recording
//! the defining symbol on each such section is what lets the rest of the
//! pipeline reason per-function instead of per-section.

use goblin::elf::sym::{STT_FUNC, STT_OBJECT, STT_SECTION};
use log::debug;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, SymbolId};

const FUNC_PREFIXES: &[&str] = &[".text.unlikely.", ".text.hot.", ".text."];
const DATA_PREFIXES: &[&str] = &[".data.rel.ro.", ".data.rel.", ".data.", ".rodata.", ".bss."];

const UNLIKELY: &str = ".text.unlikely.";

/// Longest-first prefix match within one family.
fn strip_prefix<'a>(name: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| name.strip_prefix(p))
}

fn is_bundleable(kind: u8, name: &str, secname: &str) -> bool {
    let rest = match kind {
        STT_FUNC => strip_prefix(secname, FUNC_PREFIXES),
        STT_OBJECT => strip_prefix(secname, DATA_PREFIXES),
        _ => None,
    };
    match rest {
        None => false,
        Some(rest) if rest == name => true,
        // A cold subfunction may live in the parent's unlikely section.
        Some(_) => {
            kind == STT_FUNC
                && secname.starts_with(UNLIKELY)
                && name.contains(".cold")
                && name.starts_with(&secname[UNLIKELY.len()..])
        }
    }
}

/// Attach the defining symbol to every bundled section. A bundled symbol
/// sitting anywhere but offset 0 of its section breaks the one-symbol-one-
/// section assumption and is fatal.
pub fn bundle_symbols(obj: &mut ElfObject) -> Result<()> {
    for i in 0..obj.symbols.len() {
        let (kind, name, sec) = {
            let sym = &obj.symbols[i];
            (sym.kind(), sym.name.clone(), sym.sec)
        };
        let sec = match sec {
            Some(sec) => sec,
            None => continue,
        };
        let secname = obj[sec].name.clone();
        if is_bundleable(kind, &name, &secname) {
            let value = obj.symbols[i].sym.st_value;
            if value != 0 {
                return Err(DiffError::BundledSymbolOffset {
                    name,
                    value,
                    section: secname,
                });
            }
            obj[sec].sym = Some(SymbolId(i));
        } else if kind == STT_SECTION && obj[sec].is_except() {
            // exception tables behave like bundled data
            obj[sec].sym = Some(SymbolId(i));
        }
    }
    Ok(())
}

/// During optimization the compiler may split unlikely branches into
/// `parent.cold` subfunctions and partial bodies into `parent.part.N`.
/// Cross-reference them with their parents; a missing parent just leaves
/// the child unlinked.
pub fn detect_child_functions(obj: &mut ElfObject) {
    for i in 0..obj.symbols.len() {
        if obj.symbols[i].kind() != STT_FUNC {
            continue;
        }
        let name = obj.symbols[i].name.clone();
        let marker = match name.find(".cold").or_else(|| name.find(".part")) {
            Some(at) => at,
            None => continue,
        };
        match obj.find_symbol_by_name(&name[..marker]) {
            Some(parent) => {
                obj.symbols[i].parent = Some(parent);
                obj[parent].children.push(SymbolId(i));
            }
            None => debug!("no parent found for subfunction {}", name),
        }
    }
}
