//! SAME/CHANGED classification of correlated elements.
//!
//! Section payloads compare byte-wise; relocation sections compare
//! structurally so that symbol renumbering between the two builds does not
//! register as a change. Symbol status derives from the status of the
//! defining section and its relocations.

use std::collections::HashMap;

use goblin::elf::section_header::SHT_NOBITS;
use log::debug;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Status};

/// Sections the pipeline must not diff: discarded input kept only for the
/// linker's sake.
pub fn mark_ignored_sections(obj: &mut ElfObject) {
    for sec in &mut obj.sections {
        if sec.name.starts_with(".discard") || sec.name.starts_with(".rela.discard") {
            debug!("found discard section {}", sec.name);
            sec.ignore = true;
        }
    }
}

/// Classify every correlated section and symbol of the patched object.
pub fn compare_correlated_elements(patched: &mut ElfObject, source: &ElfObject) -> Result<()> {
    compare_sections(patched, source)?;
    compare_symbols(patched, source)?;
    Ok(())
}

fn compare_sections(patched: &mut ElfObject, source: &ElfObject) -> Result<()> {
    for i in 0..patched.sections.len() {
        let twin = match patched.sections[i].twin {
            Some(twin) => twin,
            None => continue,
        };
        {
            let p = &patched.sections[i];
            let s = &source[twin];
            if p.sh.sh_type != s.sh.sh_type
                || p.sh.sh_flags != s.sh.sh_flags
                || p.sh.sh_entsize != s.sh.sh_entsize
                || (p.sh.sh_addralign != s.sh.sh_addralign && !p.is_text())
            {
                return Err(DiffError::SectionHeaderMismatch {
                    name: p.name.clone(),
                });
            }
        }

        let status = if patched.sections[i].ignore {
            Status::Same
        } else if patched.sections[i].sh.sh_size != source[twin].sh.sh_size
            || patched.sections[i].data.len() != source[twin].data.len()
        {
            Status::Changed
        } else if patched.sections[i].is_rela() {
            if rela_lists_equal(patched, source, i, twin.0) {
                Status::Same
            } else {
                Status::Changed
            }
        } else if patched.sections[i].sh.sh_type == SHT_NOBITS {
            Status::Same
        } else if patched.sections[i].data != source[twin].data {
            Status::Changed
        } else {
            Status::Same
        };

        if status == Status::Changed {
            debug!("section {} changed", patched.sections[i].name);
        }
        patched.sections[i].status = status;
    }
    Ok(())
}

/// Structural relocation-list equality: entries pair by (offset, type) and
/// must agree on addend and target, where target equality honors the
/// correlation link rather than raw identity.
fn rela_lists_equal(patched: &ElfObject, source: &ElfObject, pi: usize, si: usize) -> bool {
    let plist = &patched.sections[pi].relas;
    let slist = &source.sections[si].relas;
    if plist.len() != slist.len() {
        return false;
    }
    let mut by_key: HashMap<(u64, u32), usize> = HashMap::new();
    for (idx, rela) in slist.iter().enumerate() {
        by_key.insert((rela.offset, rela.typ), idx);
    }
    for prela in plist {
        let srela = match by_key.get(&(prela.offset, prela.typ)) {
            Some(&idx) => &slist[idx],
            None => return false,
        };
        if prela.addend != srela.addend {
            return false;
        }
        let psym = &patched[prela.sym];
        let paired = match psym.twin {
            Some(twin) => twin == srela.sym,
            None => psym.name == source[srela.sym].name,
        };
        if !paired {
            return false;
        }
    }
    true
}

fn compare_symbols(patched: &mut ElfObject, source: &ElfObject) -> Result<()> {
    for i in 0..patched.symbols.len() {
        let twin = match patched.symbols[i].twin {
            Some(twin) => twin,
            None => continue,
        };
        let mut status = None;
        {
            let p = &patched.symbols[i];
            let s = &source[twin];
            if p.sym.st_info != s.sym.st_info || p.sec.is_some() != s.sec.is_some() {
                return Err(DiffError::SymbolInfoMismatch {
                    name: p.name.clone(),
                });
            }
            if let (Some(psec), Some(ssec)) = (p.sec, s.sec) {
                if patched[psec].twin != Some(ssec) {
                    // only tolerated when the symbol moved out of input the
                    // pipeline ignores anyway
                    if source[ssec].ignore {
                        status = Some(Status::Changed);
                    } else {
                        return Err(DiffError::SymbolChangedSections {
                            name: p.name.clone(),
                        });
                    }
                }
            }
        }

        let status = status.unwrap_or_else(|| {
            let p = &patched.symbols[i];
            let s = &source[twin];
            // undefined and absolute symbols carry no payload to diff
            if p.sym.st_shndx == 0 || p.sym.st_shndx >= 0xff00 {
                return Status::Same;
            }
            let mut changed =
                p.sym.st_value != s.sym.st_value || p.sym.st_size != s.sym.st_size;
            if let Some(psec) = p.sec {
                if patched[psec].status == Status::Changed {
                    changed = true;
                }
                if let Some(rela) = patched[psec].rela {
                    if patched[rela].status == Status::Changed {
                        changed = true;
                    }
                }
            }
            if changed {
                Status::Changed
            } else {
                Status::Same
            }
        });

        if status == Status::Changed {
            debug!("symbol {} changed", patched.symbols[i].name);
        }
        patched.symbols[i].status = status;
    }
    Ok(())
}
