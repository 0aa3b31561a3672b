//! Moving included elements into the output container.
//!
//! Ownership of the included sections and symbols (payloads included)
//! transfers from the patched container to a fresh output container; the
//! remainder is dropped with the patched container. Links to elements that
//! did not make the cut are severed: a symbol without its section becomes
//! an undefined external.

use log::debug;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, SectionId, Strip, SymbolId};

pub fn migrate_included_elements(patched: ElfObject) -> Result<ElfObject> {
    let mut out = ElfObject::new(patched.name.clone(), patched.arch);
    out.header = patched.header.clone();

    let mut sec_map: Vec<Option<SectionId>> = vec![None; patched.sections.len()];
    let mut sym_map: Vec<Option<SymbolId>> = vec![None; patched.symbols.len()];

    let ElfObject {
        sections, symbols, ..
    } = patched;

    for (i, mut sec) in sections.into_iter().enumerate() {
        if !sec.include {
            continue;
        }
        sec.index = 0;
        sec.twin = None;
        sec_map[i] = Some(out.push_section(sec));
    }
    for (i, mut sym) in symbols.into_iter().enumerate() {
        if !sym.include {
            continue;
        }
        sym.index = 0;
        sym.twin = None;
        sym.strip = Strip::Default;
        sym_map[i] = Some(out.push_symbol(sym));
    }

    for sec in &mut out.sections {
        sec.rela = sec.rela.and_then(|r| sec_map[r.0]);
        sec.base = sec.base.and_then(|b| sec_map[b.0]);
        sec.sym = sec.sym.and_then(|s| sym_map[s.0]);
        sec.secsym = sec.secsym.and_then(|s| sym_map[s.0]);
        let sec_name = sec.name.clone();
        for rela in &mut sec.relas {
            rela.sym = sym_map[rela.sym.0].ok_or_else(|| {
                DiffError::Malformed(format!(
                    "relocation in {} targets a symbol that was not migrated",
                    sec_name
                ))
            })?;
        }
    }
    for sym in &mut out.symbols {
        sym.sec = sym.sec.and_then(|s| sec_map[s.0]);
        sym.parent = sym.parent.and_then(|p| sym_map[p.0]);
        sym.children = sym
            .children
            .iter()
            .filter_map(|c| sym_map[c.0])
            .collect();
    }

    debug!(
        "migrated {} sections and {} symbols",
        out.sections.len(),
        out.symbols.len()
    );
    Ok(out)
}
