//! Loading relocatable objects into the in-memory model.

use std::fs;
use std::path::Path;

use goblin::elf::header::ET_REL;
use goblin::elf::section_header::{SHT_NOBITS, SHT_RELA};
use goblin::elf::sym::STT_SECTION;
use goblin::elf::Elf;
use log::debug;

use crate::arch::Arch;
use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Rela, Section, SectionId, Symbol, SymbolId};

/// Symbol section indices at or above this value are reserved (`SHN_ABS`,
/// `SHN_COMMON`, ...) and do not name a real section.
const SHN_RESERVED: usize = 0xff00;

/// Read and parse a relocatable object from `path`.
pub fn open(path: &Path) -> Result<ElfObject> {
    let bytes = fs::read(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    parse(&bytes, &name)
}

/// Parse a relocatable object from a byte buffer.
pub fn parse(bytes: &[u8], name: &str) -> Result<ElfObject> {
    let elf = Elf::parse(bytes)?;

    if elf.header.e_type != ET_REL {
        return Err(DiffError::NotRelocatable { path: name.into() });
    }
    if !elf.is_64 || !elf.little_endian {
        return Err(DiffError::UnsupportedLayout { path: name.into() });
    }
    if !elf.program_headers.is_empty() {
        return Err(DiffError::HasProgramHeaders { path: name.into() });
    }
    if elf.syms.is_empty() {
        return Err(DiffError::MissingSymbolTable { path: name.into() });
    }

    let arch = Arch::from_machine(elf.header.e_machine)?;
    let mut obj = ElfObject::new(name, arch);
    obj.header = elf.header;

    // Sections keep their original header-table index; entry 0 is the null
    // section and has no model counterpart.
    let mut by_index: Vec<Option<SectionId>> = vec![None; elf.section_headers.len()];
    for (index, sh) in elf.section_headers.iter().enumerate().skip(1) {
        let sname = elf
            .shdr_strtab
            .get_at(sh.sh_name)
            .ok_or_else(|| DiffError::Malformed(format!("unnamed section at index {}", index)))?;
        let data = if sh.sh_type == SHT_NOBITS || sh.sh_size == 0 {
            Vec::new()
        } else {
            let start = sh.sh_offset as usize;
            let end = start + sh.sh_size as usize;
            bytes
                .get(start..end)
                .ok_or_else(|| {
                    DiffError::Malformed(format!("section {} extends past end of file", sname))
                })?
                .to_vec()
        };
        let mut sec = Section::new(sname, sh.sh_type);
        sec.sh = sh.clone();
        sec.data = data;
        sec.index = index;
        by_index[index] = Some(obj.push_section(sec));
    }

    // Wire `.rela.X` to `X` through `sh_info`.
    for i in 0..obj.sections.len() {
        if obj.sections[i].sh.sh_type != SHT_RELA {
            continue;
        }
        let info = obj.sections[i].sh.sh_info as usize;
        let base = by_index
            .get(info)
            .copied()
            .flatten()
            .ok_or_else(|| {
                DiffError::Malformed(format!(
                    "relocation section {} has no base section",
                    obj.sections[i].name
                ))
            })?;
        obj.sections[i].base = Some(base);
        obj[base].rela = Some(SectionId(i));
    }

    for (index, sym) in elf.syms.iter().enumerate() {
        let kind = sym.st_type();
        let sec = match sym.st_shndx {
            0 => None,
            n if n >= SHN_RESERVED => None,
            n => Some(by_index.get(n).copied().flatten().ok_or_else(|| {
                DiffError::Malformed(format!("symbol {} references unknown section {}", index, n))
            })?),
        };
        let sname = if kind == STT_SECTION {
            sec.map(|id| obj[id].name.clone()).unwrap_or_default()
        } else {
            elf.strtab.get_at(sym.st_name).unwrap_or("").to_string()
        };
        let mut symbol = Symbol::new(sname, 0, 0);
        symbol.sym = sym;
        symbol.sec = sec;
        symbol.index = index;
        let id = obj.push_symbol(symbol);
        if kind == STT_SECTION {
            if let Some(sid) = sec {
                if obj[sid].secsym.is_none() {
                    obj[sid].secsym = Some(id);
                }
            }
        }
    }

    for (index, relocs) in &elf.shdr_relocs {
        let sid = match by_index.get(*index).copied().flatten() {
            Some(sid) => sid,
            None => continue,
        };
        for r in relocs.iter() {
            if r.r_sym >= obj.symbols.len() {
                return Err(DiffError::Malformed(format!(
                    "relocation in {} targets symbol {} out of range",
                    obj[sid].name, r.r_sym
                )));
            }
            obj[sid].relas.push(Rela {
                typ: r.r_type,
                sym: SymbolId(r.r_sym),
                offset: r.r_offset,
                addend: r.r_addend.unwrap_or(0),
            });
        }
    }

    debug!(
        "loaded {}: {} sections, {} symbols",
        obj.name,
        obj.sections.len(),
        obj.symbols.len()
    );
    Ok(obj)
}

/// The source and patched objects must come from the same compiler setup:
/// everything but section counts and offsets has to match.
pub fn compare_headers(source: &ElfObject, patched: &ElfObject) -> Result<()> {
    let a = &source.header;
    let b = &patched.header;
    if a.e_ident != b.e_ident
        || a.e_type != b.e_type
        || a.e_machine != b.e_machine
        || a.e_version != b.e_version
        || a.e_entry != b.e_entry
        || a.e_phoff != b.e_phoff
        || a.e_flags != b.e_flags
        || a.e_ehsize != b.e_ehsize
        || a.e_phentsize != b.e_phentsize
        || a.e_shentsize != b.e_shentsize
    {
        return Err(DiffError::HeaderMismatch);
    }
    Ok(())
}
