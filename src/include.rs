//! Transitive-closure selection of elements for the output object.
//!
//! Starting from the changed-function frontier, inclusion walks
//! symbol → section → relocation section → every relocation target until it
//! reaches a fixed point. The walk is conservative: a SAME local function
//! that is only referenced gets an empty stub section so the link still
//! resolves, with an `st_other` flag telling the loader to bind it against
//! the running binary instead.

use goblin::elf::sym::{STB_GLOBAL, STB_LOCAL, STT_FILE, STT_FUNC, STT_SECTION};
use log::{debug, warn};

use crate::error::Result;
use crate::object::{ElfObject, SectionId, Status, SymbolId, ST_OTHER_EXTERN};

enum Work {
    Sym(SymbolId),
    Sec(SectionId),
}

fn include_symbol(obj: &mut ElfObject, id: SymbolId) {
    include_worklist(obj, Work::Sym(id));
}

fn include_section(obj: &mut ElfObject, id: SectionId) {
    include_worklist(obj, Work::Sec(id));
}

fn include_worklist(obj: &mut ElfObject, seed: Work) {
    let mut work = vec![seed];
    while let Some(item) = work.pop() {
        match item {
            Work::Sym(id) => {
                if obj[id].include {
                    continue;
                }
                obj[id].include = true;
                let sec = match obj[id].sec {
                    Some(sec) => sec,
                    None => continue,
                };
                let (kind, bind, status) = (obj[id].kind(), obj[id].bind(), obj[id].status);
                if kind == STT_SECTION || status != Status::Same {
                    // section symbols can't be resolved externally, and a
                    // non-SAME definition must travel with its symbol
                    work.push(Work::Sec(sec));
                } else if bind == STB_LOCAL && kind == STT_FUNC {
                    // stub: keep the local linkable, body resolved externally
                    obj[id].sym.st_other |= ST_OTHER_EXTERN;
                    obj[sec].include = true;
                    obj[sec].data = Vec::new();
                    obj[sec].sh.sh_size = 0;
                    if let Some(secsym) = obj[sec].secsym {
                        obj[secsym].include = true;
                    }
                }
            }
            Work::Sec(id) => {
                if obj[id].include {
                    continue;
                }
                obj[id].include = true;
                if let Some(secsym) = obj[id].secsym {
                    obj[secsym].include = true;
                }
                let rela = match obj[id].rela {
                    Some(rela) => rela,
                    None => continue,
                };
                if !obj[rela].include {
                    obj[rela].include = true;
                    for k in 0..obj[rela].relas.len() {
                        work.push(Work::Sym(obj[rela].relas[k].sym));
                    }
                }
            }
        }
    }
}

/// Elements every patch object carries: the string/symbol tables, read-only
/// data pools, and the null symbol.
pub fn include_standard_elements(obj: &mut ElfObject) {
    for i in 0..obj.sections.len() {
        let standard = {
            let sec = &obj.sections[i];
            sec.name == ".shstrtab"
                || sec.name == ".strtab"
                || sec.name == ".symtab"
                || sec.name == ".rodata"
                || sec.is_string_literal()
        };
        if standard {
            include_section(obj, SectionId(i));
        }
    }
    for i in 0..obj.symbols.len() {
        if let Some(sec) = obj.symbols[i].sec {
            if obj[sec].is_string_literal() {
                obj.symbols[i].include = true;
            }
        }
    }
    if !obj.symbols.is_empty() {
        obj.symbols[0].include = true;
    }
}

/// Seed the closure with every changed function (and changed exception
/// table), returning how many were found. `STT_FILE` symbols ride along for
/// debugger continuity.
pub fn include_changed_functions(obj: &mut ElfObject) -> usize {
    let mut changed = 0;
    for i in 0..obj.symbols.len() {
        let (status, kind, sec) = {
            let sym = &obj.symbols[i];
            (sym.status, sym.kind(), sym.sec)
        };
        if status == Status::Changed && kind == STT_FUNC {
            changed += 1;
            include_symbol(obj, SymbolId(i));
        }
        if status == Status::Changed && kind == STT_SECTION {
            if let Some(sec) = sec {
                if obj[sec].is_except() {
                    warn!("found changed exception section {}", obj[sec].name);
                    changed += 1;
                    include_symbol(obj, SymbolId(i));
                }
            }
        }
        if kind == STT_FILE {
            obj.symbols[i].include = true;
        }
    }
    changed
}

/// Seed the closure with every new global definition, returning the count.
pub fn include_new_globals(obj: &mut ElfObject) -> usize {
    let mut new = 0;
    for i in 0..obj.symbols.len() {
        let sym = &obj.symbols[i];
        if sym.bind() == STB_GLOBAL && sym.sec.is_some() && sym.status == Status::New {
            new += 1;
            include_symbol(obj, SymbolId(i));
        }
    }
    new
}

/// Debug sections always travel with the patch, but their relocations are
/// pruned to the surviving targets, and `.eh_frame` gets its FDE table
/// rebuilt to match.
pub fn include_debug_sections(obj: &mut ElfObject) -> Result<()> {
    let mut eh_frame = None;
    for i in 0..obj.sections.len() {
        if !obj.is_debug_section(SectionId(i)) {
            continue;
        }
        obj.sections[i].include = true;
        if !obj.sections[i].is_rela() {
            if let Some(secsym) = obj.sections[i].secsym {
                obj[secsym].include = true;
            }
            if obj.sections[i].name == ".eh_frame" {
                eh_frame = Some(SectionId(i));
            }
        }
    }

    for i in 0..obj.sections.len() {
        if !obj.sections[i].is_rela() || !obj.is_debug_section(SectionId(i)) {
            continue;
        }
        let mut relas = std::mem::take(&mut obj.sections[i].relas);
        relas.retain(|rela| match obj[rela.sym].sec {
            Some(sec) => obj[sec].include,
            None => false,
        });
        debug!(
            "kept {} relocations in debug section {}",
            relas.len(),
            obj.sections[i].name
        );
        obj.sections[i].relas = relas;
    }

    if let Some(eh) = eh_frame {
        crate::ehframe::rebuild(obj, eh)?;
    }
    Ok(())
}
