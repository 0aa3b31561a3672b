//! Engine-synthesized metadata sections.
//!
//! Besides the surviving input sections, the patch object carries the
//! tables the live-patch loader consumes: a string pool with the names of
//! patched symbols, a function table pairing every patched function with
//! the address it replaces in the running binary, a slot table for
//! branch-range veneers on machines that need them, and a machine tag for
//! cross-checking at load time.

use goblin::elf::section_header::{SHF_ALLOC, SHT_PROGBITS, SHT_RELA};
use goblin::elf::sym::{STB_LOCAL, STT_FUNC, STT_SECTION};
use log::debug;
use scroll::{Pwrite, LE};

use crate::arch::Arch;
use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Rela, Section, SectionId, Status, Strip, Symbol, SymbolId};
use crate::running::RunningElf;

/// NUL-separated pool of patch symbol names.
pub const STRINGS_SECTION: &str = ".objdelta.strings";
/// Patch-function records, one per replaced function.
pub const FUNCS_SECTION: &str = ".objdelta.funcs";
/// 8-byte veneer slots for limited-reach branches.
pub const GOT_SECTION: &str = ".objdelta.got";
/// Machine tag for the loader's sanity check.
pub const ARCH_SECTION: &str = ".objdelta.arch";

/// Size of one patch-function record: `new_addr`, `new_size`, `old_addr`,
/// `old_size`, `sympos`, `name`, each 8 bytes.
pub const PATCH_FUNC_SIZE: usize = 48;

fn push_meta_section(out: &mut ElfObject, mut sec: Section) -> SectionId {
    sec.sh.sh_flags = u64::from(SHF_ALLOC);
    sec.status = Status::New;
    sec.include = true;
    out.push_section(sec)
}

fn push_rela_section(out: &mut ElfObject, base: SectionId, relas: Vec<Rela>) -> SectionId {
    let mut sec = Section::new(format!(".rela{}", out[base].name), SHT_RELA);
    sec.sh.sh_addralign = 8;
    sec.relas = relas;
    sec.base = Some(base);
    sec.status = Status::New;
    sec.include = true;
    let id = out.push_section(sec);
    out[base].rela = Some(id);
    id
}

/// Create the (initially empty) string pool and its section symbol, which
/// later relocations point at.
pub fn create_strings_elements(out: &mut ElfObject) {
    let mut sec = Section::new(STRINGS_SECTION, SHT_PROGBITS);
    sec.sh.sh_entsize = 1;
    let sid = push_meta_section(out, sec);

    let mut sym = Symbol::new(STRINGS_SECTION, STT_SECTION, STB_LOCAL);
    sym.sec = Some(sid);
    sym.include = true;
    sym.strip = Strip::Keep;
    let symid = out.push_symbol(sym);
    out[sid].secsym = Some(symid);
}

/// Build the patch-function table: for every changed function, a record
/// carrying the replacement symbol (as a relocation), the address and size
/// of the function it replaces in the running binary, and the symbol name
/// (as a relocation into the string pool).
pub fn create_patch_entries(out: &mut ElfObject, relf: &RunningElf) -> Result<()> {
    let strings_sym = out
        .find_section_by_name(STRINGS_SECTION)
        .and_then(|s| out[s].secsym)
        .ok_or_else(|| DiffError::Malformed("patch string pool is missing".into()))?;

    let funcs: Vec<SymbolId> = (0..out.symbols.len())
        .filter(|&i| {
            let sym = &out.symbols[i];
            sym.kind() == STT_FUNC && sym.status == Status::Changed && sym.sec.is_some()
        })
        .map(SymbolId)
        .collect();

    let mut data = vec![0u8; funcs.len() * PATCH_FUNC_SIZE];
    let mut relas = Vec::with_capacity(funcs.len() * 2);
    for (n, &fid) in funcs.iter().enumerate() {
        let (name, bind, size, anchor) = {
            let sym = &out[fid];
            (sym.name.clone(), sym.bind(), sym.sym.st_size, sym.anchor)
        };
        let ridx = if bind == STB_LOCAL {
            let anchor = anchor.ok_or_else(|| {
                DiffError::Malformed(format!("local function {} has no file anchor", name))
            })?;
            relf.find_in_block(anchor, &name, STT_FUNC)
        } else {
            relf.find_global(&name, STT_FUNC)
        }
        .ok_or_else(|| DiffError::MissingRunningSymbol { name: name.clone() })?;
        let rsym = &relf.syms[ridx];
        debug!(
            "patch entry {}: replaces {:#x} (size {})",
            name, rsym.value, rsym.size
        );

        let base = n * PATCH_FUNC_SIZE;
        data.pwrite_with::<u64>(size, base + 8, LE)?;
        data.pwrite_with::<u64>(rsym.value, base + 16, LE)?;
        data.pwrite_with::<u64>(rsym.size, base + 24, LE)?;
        data.pwrite_with::<u64>(relf.sympos(ridx), base + 32, LE)?;
        let name_off = out.add_string(&name);
        relas.push(Rela {
            typ: out.arch.abs64(),
            sym: fid,
            offset: base as u64,
            addend: 0,
        });
        relas.push(Rela {
            typ: out.arch.abs64(),
            sym: strings_sym,
            offset: (base + 40) as u64,
            addend: name_off as i64,
        });
    }

    let mut sec = Section::new(FUNCS_SECTION, SHT_PROGBITS);
    sec.sh.sh_entsize = PATCH_FUNC_SIZE as u64;
    sec.sh.sh_addralign = 8;
    sec.sh.sh_size = data.len() as u64;
    sec.data = data;
    let sid = push_meta_section(out, sec);
    push_rela_section(out, sid, relas);
    Ok(())
}

/// On AArch64, a `bl`/`b` in patched text may be out of range of its
/// destination in the running binary. Emit one address slot per undefined
/// branch target so the loader can route the call through a veneer.
pub fn create_got_entries(out: &mut ElfObject) -> Result<()> {
    if out.arch != Arch::Aarch64 {
        return Ok(());
    }

    let mut targets: Vec<SymbolId> = Vec::new();
    for i in 0..out.sections.len() {
        if !out.sections[i].is_rela() {
            continue;
        }
        let from_text = match out.sections[i].base {
            Some(base) => out[base].is_text(),
            None => false,
        };
        if !from_text {
            continue;
        }
        for k in 0..out.sections[i].relas.len() {
            let rela = out.sections[i].relas[k];
            if !out.arch.is_branch(rela.typ) {
                continue;
            }
            if out[rela.sym].sec.is_some() || targets.contains(&rela.sym) {
                continue;
            }
            targets.push(rela.sym);
        }
    }
    if targets.is_empty() {
        return Ok(());
    }

    let data = vec![0u8; targets.len() * 8];
    let relas = targets
        .iter()
        .enumerate()
        .map(|(n, &sym)| Rela {
            typ: out.arch.abs64(),
            sym,
            offset: (n * 8) as u64,
            addend: 0,
        })
        .collect();
    let mut sec = Section::new(GOT_SECTION, SHT_PROGBITS);
    sec.sh.sh_entsize = 8;
    sec.sh.sh_addralign = 8;
    sec.sh.sh_size = data.len() as u64;
    sec.data = data;
    let sid = push_meta_section(out, sec);
    push_rela_section(out, sid, relas);
    Ok(())
}

/// One record naming the machine the patch was built for.
pub fn create_arch_section(out: &mut ElfObject) -> Result<()> {
    let mut data = vec![0u8; 8];
    data.pwrite_with::<u64>(u64::from(out.arch.machine()), 0, LE)?;
    let mut sec = Section::new(ARCH_SECTION, SHT_PROGBITS);
    sec.sh.sh_entsize = 8;
    sec.sh.sh_addralign = 8;
    sec.sh.sh_size = data.len() as u64;
    sec.data = data;
    push_meta_section(out, sec);
    Ok(())
}

/// Serialize the string pool accumulated by the earlier passes.
pub fn build_strings_section_data(out: &mut ElfObject) -> Result<()> {
    let sid = out
        .find_section_by_name(STRINGS_SECTION)
        .ok_or_else(|| DiffError::Malformed("patch string pool is missing".into()))?;
    let mut data = Vec::with_capacity(out.strings_size() as usize);
    for name in out.strings.keys() {
        data.extend_from_slice(name.as_bytes());
        data.push(0);
    }
    out[sid].sh.sh_size = data.len() as u64;
    out[sid].data = data;
    Ok(())
}
