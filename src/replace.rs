//! Rewriting section-relative relocations into symbol-relative form.
//!
//! Compilers frequently emit relocations against an `STT_SECTION` symbol
//! plus a nonzero addend, especially for static objects. Per-symbol
//! differencing needs every relocation to name the concrete function or
//! object it means, so each such relocation is redirected to the symbol
//! covering the target offset and its addend rebased. The pass is
//! idempotent: rewritten relocations no longer target section symbols.

use goblin::elf::sym::STT_SECTION;
use log::debug;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, SectionId, SymbolId};

pub fn replace_section_syms(obj: &mut ElfObject) -> Result<()> {
    for ri in 0..obj.sections.len() {
        if !obj.sections[ri].is_rela() || obj.is_debug_section(SectionId(ri)) {
            continue;
        }
        let base = obj.sections[ri].base.ok_or_else(|| {
            DiffError::Malformed(format!("{} has no base section", obj.sections[ri].name))
        })?;
        let base_is_text = obj[base].is_text();

        for k in 0..obj.sections[ri].relas.len() {
            let rela = obj.sections[ri].relas[k];
            let (tkind, tsec) = {
                let target = &obj[rela.sym];
                (target.kind(), target.sec)
            };
            if tkind != STT_SECTION {
                continue;
            }
            let tsec = match tsec {
                Some(tsec) => tsec,
                None => continue,
            };

            // A bundled section has exactly one symbol; redirect to it and
            // keep the addend, which must be zero for a well-formed bundle.
            if let Some(def) = obj[tsec].sym {
                debug!(
                    "{}: replacing section reference {} with {}",
                    obj.sections[ri].name, obj[tsec].name, obj[def].name
                );
                if obj[def].sym.st_value != 0 {
                    return Err(DiffError::BundledSymbolOffset {
                        name: obj[def].name.clone(),
                        value: obj[def].sym.st_value,
                        section: obj[tsec].name.clone(),
                    });
                }
                obj.sections[ri].relas[k].sym = def;
                continue;
            }

            let bias = obj.arch.implicit_bias(base_is_text, rela.typ);
            let target_off = rela.addend - bias;
            let mut replacement = None;
            for si in 0..obj.symbols.len() {
                let sym = &obj.symbols[si];
                if sym.kind() == STT_SECTION || sym.sec != Some(tsec) {
                    continue;
                }
                let start = sym.sym.st_value as i64;
                let end = start + sym.sym.st_size as i64;
                let sec_size = obj[tsec].sh.sh_size as i64;

                if base_is_text
                    && !obj[tsec].is_text()
                    && obj.arch.is_wide_abs(rela.typ)
                    && rela.addend == sec_size
                    && end == sec_size
                {
                    // off-by-one in the patched code, not a valid reference
                    return Err(DiffError::EndOfSectionReference {
                        section: obj[tsec].name.clone(),
                    });
                } else if target_off == start && target_off == end {
                    if obj.arch.is_mapping_symbol(sym) {
                        continue;
                    }
                    debug!("relocation references empty symbol {}", sym.name);
                } else if target_off < start || target_off >= end {
                    continue;
                }

                replacement = Some((SymbolId(si), start));
                break;
            }

            match replacement {
                Some((si, start)) => {
                    debug!(
                        "{}: replacing {}+{} reference with {}+{}",
                        obj.sections[ri].name,
                        obj[tsec].name,
                        rela.addend,
                        obj[si].name,
                        rela.addend - start
                    );
                    obj.sections[ri].relas[k].sym = si;
                    obj.sections[ri].relas[k].addend -= start;
                }
                None => {
                    // Anonymous references into read-only pools stay
                    // section-relative; anything else is unresolvable.
                    let tname = obj[tsec].name.clone();
                    if !obj[tsec].is_string_literal()
                        && !tname.starts_with(".rodata")
                        && !tname.starts_with(".data")
                    {
                        return Err(DiffError::UnresolvedReference {
                            section: obj[base].name.clone(),
                            offset: rela.offset,
                            name: tname,
                            addend: rela.addend,
                        });
                    }
                }
            }
        }
    }
    Ok(())
}
