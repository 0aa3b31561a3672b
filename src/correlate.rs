//! Pairing elements across the source and patched objects.
//!
//! Correlation is keyed on stable identity: section name, symbol
//! (name, type, binding), and for duplicate-name locals the enclosing
//! `STT_FILE` block. Anything left unpaired keeps its `New` status.

use goblin::elf::section_header::SHT_GROUP;
use goblin::elf::sym::{STB_LOCAL, STT_FUNC, STT_OBJECT};
use indexmap::IndexMap;
use log::debug;
use scroll::{Pread, LE};

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, SectionId, SymbolId};

/// Pair sections and symbols by name across the two objects. Correlated
/// patched locals inherit the source symbol's running-binary anchor so the
/// source container can be dropped after comparison.
pub fn correlate(source: &mut ElfObject, patched: &mut ElfObject) {
    correlate_sections(source, patched);
    correlate_symbols(source, patched);
}

fn correlate_sections(source: &mut ElfObject, patched: &mut ElfObject) {
    let mut by_name: IndexMap<String, SectionId> = IndexMap::new();
    for (i, sec) in source.sections.iter().enumerate() {
        by_name.entry(sec.name.clone()).or_insert(SectionId(i));
    }
    for i in 0..patched.sections.len() {
        let twin = match by_name.get(&patched.sections[i].name) {
            Some(&twin) => twin,
            None => continue,
        };
        if source[twin].twin.is_some() {
            continue;
        }
        patched.sections[i].twin = Some(twin);
        source[twin].twin = Some(SectionId(i));
    }
}

fn correlate_symbols(source: &mut ElfObject, patched: &mut ElfObject) {
    let mut by_name: IndexMap<String, Vec<SymbolId>> = IndexMap::new();
    for (i, sym) in source.symbols.iter().enumerate() {
        by_name
            .entry(sym.name.clone())
            .or_default()
            .push(SymbolId(i));
    }

    for p in 0..patched.symbols.len() {
        let (pname, pinfo) = {
            let sym = &patched.symbols[p];
            (sym.name.clone(), sym.sym.st_info)
        };
        let candidates: Vec<SymbolId> = by_name
            .get(&pname)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&s| source[s].twin.is_none() && source[s].sym.st_info == pinfo)
                    .collect()
            })
            .unwrap_or_default();

        let chosen = match candidates.len() {
            0 => continue,
            1 => Some(candidates[0]),
            // duplicate-name locals: pick the one from the same file block
            _ => {
                let pfile = patched
                    .enclosing_file(SymbolId(p))
                    .map(|f| patched[f].name.clone());
                candidates.into_iter().find(|&s| {
                    source.enclosing_file(s).map(|f| source[f].name.clone()) == pfile
                })
            }
        };
        if let Some(twin) = chosen {
            link_symbols(source, patched, twin, SymbolId(p));
        }
    }
}

fn link_symbols(source: &mut ElfObject, patched: &mut ElfObject, s: SymbolId, p: SymbolId) {
    patched[p].twin = Some(s);
    source[s].twin = Some(p);
    patched[p].anchor = source[s].anchor;
}

/// gcc gives file-scope statics a numbered suffix that may differ between
/// builds (`counter.1234` against `counter.1236`). Pair them by base name
/// within the same file block, and rename the patched side — symbol,
/// bundled section, and its relocation section — to the source spelling so
/// references line up with the running binary.
pub fn correlate_static_locals(source: &mut ElfObject, patched: &mut ElfObject) {
    for p in 0..patched.symbols.len() {
        {
            let sym = &patched.symbols[p];
            if sym.twin.is_some() || sym.bind() != STB_LOCAL {
                continue;
            }
            if sym.kind() != STT_FUNC && sym.kind() != STT_OBJECT {
                continue;
            }
        }
        let pname = patched.symbols[p].name.clone();
        let base = match mangled_base(&pname) {
            Some(base) => base.to_string(),
            None => continue,
        };
        let pfile = patched
            .enclosing_file(SymbolId(p))
            .map(|f| patched[f].name.clone());
        let pkind = patched.symbols[p].kind();

        let mut found = None;
        for c in 0..source.symbols.len() {
            let cand = &source.symbols[c];
            if cand.twin.is_some() || cand.bind() != STB_LOCAL || cand.kind() != pkind {
                continue;
            }
            match mangled_base(&cand.name) {
                Some(b) if b == base => {}
                _ => continue,
            }
            if source.enclosing_file(SymbolId(c)).map(|f| source[f].name.clone()) != pfile {
                continue;
            }
            if found.is_some() {
                debug!("ambiguous static local {}, leaving uncorrelated", pname);
                found = None;
                break;
            }
            found = Some(SymbolId(c));
        }
        let twin = match found {
            Some(twin) => twin,
            None => continue,
        };

        let sname = source[twin].name.clone();
        debug!("correlating static local {} as {}", pname, sname);
        patched.symbols[p].name = sname;
        link_symbols(source, patched, twin, SymbolId(p));

        let (psec, ssec) = match (patched.symbols[p].sec, source[twin].sec) {
            (Some(psec), Some(ssec)) => (psec, ssec),
            _ => continue,
        };
        if patched[psec].twin.is_some() || source[ssec].twin.is_some() {
            continue;
        }
        patched[psec].name = source[ssec].name.clone();
        patched[psec].twin = Some(ssec);
        source[ssec].twin = Some(psec);
        if let Some(secsym) = patched[psec].secsym {
            patched[secsym].name = patched[psec].name.clone();
        }
        if let (Some(prela), Some(srela)) = (patched[psec].rela, source[ssec].rela) {
            patched[prela].name = source[srela].name.clone();
            patched[prela].twin = Some(srela);
            source[srela].twin = Some(prela);
        }
    }
}

/// `name.1234` → `name`; `None` when there is no numeric suffix.
fn mangled_base(name: &str) -> Option<&str> {
    let at = name.rfind('.')?;
    let (base, digits) = (&name[..at], &name[at + 1..]);
    if !base.is_empty() && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        Some(base)
    } else {
        None
    }
}

/// Flag every member of a `SHT_GROUP` section; the verifier refuses any
/// change touching a grouped section.
pub fn mark_grouped_sections(obj: &mut ElfObject) -> Result<()> {
    for gi in 0..obj.sections.len() {
        if obj.sections[gi].sh.sh_type != SHT_GROUP {
            continue;
        }
        let data = obj.sections[gi].data.clone();
        // skip the leading flag word (GRP_COMDAT)
        let mut off = 4;
        while off + 4 <= data.len() {
            let index: u32 = data.pread_with(off, LE)?;
            let member = obj
                .find_section_by_index(index as usize)
                .ok_or_else(|| DiffError::Malformed("group member section not found".into()))?;
            debug!("marking section {} ({}) as grouped", obj[member].name, index);
            obj[member].grouped = true;
            off += 4;
        }
    }
    Ok(())
}
