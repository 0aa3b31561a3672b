//! The ELF64 backend for serializing an output container to a valid
//! relocatable object file.
//!
//! The output container arrives from the migrator with stale indices and
//! string offsets; the passes here restore every symbol-table contract:
//! locals precede globals with the null symbol at index 0, section and
//! symbol indices are dense and 1-based, `sh_link`/`sh_info` and relocation
//! records carry the new indices, and both string tables are rebuilt from
//! live names.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use goblin::elf::header::ET_REL;
use goblin::elf::section_header::{SHN_ABS, SHT_NOBITS, SHT_RELA};
use goblin::elf::sym::{STB_LOCAL, STT_FILE, STT_FUNC, STT_NOTYPE, STT_OBJECT, STT_SECTION};
use goblin::elf64::header::{Header as Header64, SIZEOF_EHDR};
use goblin::elf64::reloc::{Rela as Rela64, SIZEOF_RELA};
use goblin::elf64::section_header::{SectionHeader as SectionHeader64, SIZEOF_SHDR};
use goblin::elf64::sym::{Sym as Sym64, SIZEOF_SYM};
use log::debug;
use scroll::{Pwrite, LE};
use string_interner::{DefaultSymbol, StringInterner};

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Strip, Symbol, SymbolId};
use crate::running::RunningElf;

/// Deduplicating string-table builder: interned names with running offsets,
/// index 0 reserved for the leading NUL.
struct StringTable {
    strings: StringInterner,
    offsets: HashMap<DefaultSymbol, usize>,
    order: Vec<DefaultSymbol>,
    size: usize,
}

impl StringTable {
    fn new() -> Self {
        StringTable {
            strings: StringInterner::default(),
            offsets: HashMap::new(),
            order: Vec::new(),
            size: 1,
        }
    }

    fn push(&mut self, name: &str) -> usize {
        if name.is_empty() {
            return 0;
        }
        let sym = self.strings.get_or_intern(name);
        if let Some(&off) = self.offsets.get(&sym) {
            return off;
        }
        let off = self.size;
        self.offsets.insert(sym, off);
        self.order.push(sym);
        self.size += name.len() + 1;
        off
    }

    fn data(&self) -> Vec<u8> {
        let mut buf = vec![0u8];
        for &sym in &self.order {
            let s = self.strings.resolve(sym).expect("interned string");
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        buf
    }
}

/// Reorder the symbol sequence into link-compliant order: the null symbol,
/// `STT_FILE` markers, section symbols, the remaining locals, then
/// globals/weak — insertion order within each partition.
pub fn reorder_symbols(out: &mut ElfObject) {
    if out.symbols.is_empty() {
        return;
    }
    let class = |sym: &Symbol| -> usize {
        if sym.kind() == STT_FILE {
            0
        } else if sym.kind() == STT_SECTION {
            1
        } else if sym.bind() == STB_LOCAL {
            2
        } else {
            3
        }
    };
    let mut order = Vec::with_capacity(out.symbols.len());
    order.push(0);
    for pass in 0..4 {
        for i in 1..out.symbols.len() {
            if class(&out.symbols[i]) == pass {
                order.push(i);
            }
        }
    }
    apply_symbol_order(out, &order);
}

/// Drop symbols nothing in the output needs: default-strippable, without a
/// defining section, referenced by no relocation, and not a file marker.
pub fn strip_unneeded_syms(out: &mut ElfObject) {
    let mut referenced = vec![false; out.symbols.len()];
    for sec in &out.sections {
        for rela in &sec.relas {
            referenced[rela.sym.0] = true;
        }
    }
    let order: Vec<usize> = (0..out.symbols.len())
        .filter(|&i| {
            if i == 0 {
                return true;
            }
            let sym = &out.symbols[i];
            if sym.strip == Strip::Keep
                || referenced[i]
                || sym.sec.is_some()
                || sym.kind() == STT_FILE
            {
                return true;
            }
            debug!("stripping dead symbol {}", sym.name);
            false
        })
        .collect();
    apply_symbol_order(out, &order);
}

/// Rebuild the symbol sequence as `order` (old positions, in new order) and
/// remap every reference. Old positions missing from `order` are dropped;
/// nothing load-bearing may reference a dropped symbol.
fn apply_symbol_order(out: &mut ElfObject, order: &[usize]) {
    let mut old_to_new: Vec<Option<SymbolId>> = vec![None; out.symbols.len()];
    for (new, &old) in order.iter().enumerate() {
        old_to_new[old] = Some(SymbolId(new));
    }

    let mut slots: Vec<Option<Symbol>> = out.symbols.drain(..).map(Some).collect();
    out.symbols = order
        .iter()
        .map(|&old| slots[old].take().expect("symbol order is a bijection"))
        .collect();

    for sec in &mut out.sections {
        sec.sym = sec.sym.and_then(|s| old_to_new[s.0]);
        sec.secsym = sec.secsym.and_then(|s| old_to_new[s.0]);
        for rela in &mut sec.relas {
            rela.sym = old_to_new[rela.sym.0].expect("relocation target survived reorder");
        }
    }
    for sym in &mut out.symbols {
        sym.parent = sym.parent.and_then(|p| old_to_new[p.0]);
        sym.children = sym
            .children
            .iter()
            .filter_map(|c| old_to_new[c.0])
            .collect();
    }
}

/// Assign dense 1-based section indices and dense symbol indices, then
/// propagate them into `sh_link`/`sh_info`.
pub fn reindex_elements(out: &mut ElfObject) {
    for (i, sec) in out.sections.iter_mut().enumerate() {
        sec.index = i + 1;
    }
    for (i, sym) in out.symbols.iter_mut().enumerate() {
        sym.index = i;
    }

    let symtab = out.find_section_by_name(".symtab");
    let strtab = out.find_section_by_name(".strtab");
    if let (Some(symtab), Some(strtab)) = (symtab, strtab) {
        let strtab_index = out[strtab].index as u32;
        out[symtab].sh.sh_link = strtab_index;
    }
    for i in 0..out.sections.len() {
        if out.sections[i].sh.sh_type != SHT_RELA {
            continue;
        }
        if let Some(symtab) = symtab {
            out.sections[i].sh.sh_link = out[symtab].index as u32;
        }
        if let Some(base) = out.sections[i].base {
            let base_index = out[base].index as u32;
            out.sections[i].sh.sh_info = base_index;
        }
    }
}

/// Re-encode every relocation section from its in-memory entry list.
pub fn rebuild_relocations(out: &mut ElfObject) -> Result<()> {
    for i in 0..out.sections.len() {
        if out.sections[i].sh.sh_type != SHT_RELA {
            continue;
        }
        let base = out.sections[i].base.ok_or_else(|| {
            DiffError::Malformed(format!("{} has no base section", out.sections[i].name))
        })?;
        let base_size = out[base].sh.sh_size;
        let count = out.sections[i].relas.len();
        let mut data = vec![0u8; count * SIZEOF_RELA];
        for (k, rela) in out.sections[i].relas.iter().enumerate() {
            if base_size != 0 && rela.offset >= base_size {
                return Err(DiffError::Malformed(format!(
                    "relocation at {:#x} lies outside {}",
                    rela.offset,
                    out[base].name
                )));
            }
            let sym_index = out[rela.sym].index as u64;
            let record = Rela64 {
                r_offset: rela.offset,
                r_info: (sym_index << 32) | u64::from(rela.typ),
                r_addend: rela.addend,
            };
            data.pwrite_with(record, k * SIZEOF_RELA, LE)?;
        }
        out.sections[i].sh.sh_size = data.len() as u64;
        out.sections[i].sh.sh_entsize = SIZEOF_RELA as u64;
        out.sections[i].sh.sh_addralign = 8;
        out.sections[i].data = data;
    }
    Ok(())
}

/// Rebuild `.shstrtab` from live section names.
pub fn create_shstrtab(out: &mut ElfObject) -> Result<()> {
    let mut table = StringTable::new();
    for i in 0..out.sections.len() {
        let name = out.sections[i].name.clone();
        out.sections[i].sh.sh_name = table.push(&name);
    }
    let sid = out
        .find_section_by_name(".shstrtab")
        .ok_or_else(|| DiffError::Malformed(".shstrtab is missing from the output".into()))?;
    let data = table.data();
    out[sid].sh.sh_size = data.len() as u64;
    out[sid].data = data;
    Ok(())
}

/// Rebuild `.strtab` from live symbol names. Section symbols are nameless
/// in the table; readers print their section's name instead.
pub fn create_strtab(out: &mut ElfObject) -> Result<()> {
    let mut table = StringTable::new();
    for i in 0..out.symbols.len() {
        if out.symbols[i].kind() == STT_SECTION {
            out.symbols[i].sym.st_name = 0;
            continue;
        }
        let name = out.symbols[i].name.clone();
        out.symbols[i].sym.st_name = table.push(&name);
    }
    let sid = out
        .find_section_by_name(".strtab")
        .ok_or_else(|| DiffError::Malformed(".strtab is missing from the output".into()))?;
    let data = table.data();
    out[sid].sh.sh_size = data.len() as u64;
    out[sid].data = data;
    Ok(())
}

/// Copy address and size from the running binary into symbols that have no
/// definition in the output, so the loader binds them without a lookup.
/// Locals go through their file anchor; unmatched symbols stay undefined
/// and are left to the loader.
pub fn resolve_against_running(out: &mut ElfObject, relf: &RunningElf) {
    for i in 0..out.symbols.len() {
        let (kind, bind, name, anchor) = {
            let sym = &out.symbols[i];
            (sym.kind(), sym.bind(), sym.name.clone(), sym.anchor)
        };
        if out.symbols[i].sec.is_some() || name.is_empty() {
            continue;
        }
        if kind != STT_FUNC && kind != STT_OBJECT && kind != STT_NOTYPE {
            continue;
        }
        let found = if bind == STB_LOCAL {
            anchor.and_then(|a| relf.find_in_block(a, &name, kind))
        } else {
            relf.find_global(&name, kind)
        };
        match found {
            Some(idx) => {
                let rsym = &relf.syms[idx];
                debug!("resolved {} to {:#x}", name, rsym.value);
                out.symbols[i].sym.st_value = rsym.value;
                out.symbols[i].sym.st_size = rsym.size;
            }
            None => debug!("symbol {} left for the loader to resolve", name),
        }
    }
}

/// Re-encode `.symtab`: `sh_info` delimits the locals, and `st_shndx`
/// carries the new section indices.
pub fn create_symtab(out: &mut ElfObject) -> Result<()> {
    let count = out.symbols.len();
    let mut data = vec![0u8; count * SIZEOF_SYM];
    let mut first_nonlocal = count;
    for (i, sym) in out.symbols.iter().enumerate() {
        if sym.bind() != STB_LOCAL && first_nonlocal == count {
            first_nonlocal = i;
        }
        let st_shndx: u16 = match sym.sec {
            Some(sec) => out[sec].index as u16,
            None if sym.kind() == STT_FILE => SHN_ABS as u16,
            None => 0,
        };
        let record = Sym64 {
            st_name: sym.sym.st_name as u32,
            st_info: sym.sym.st_info,
            st_other: sym.sym.st_other,
            st_shndx,
            st_value: sym.sym.st_value,
            st_size: sym.sym.st_size,
        };
        data.pwrite_with(record, i * SIZEOF_SYM, LE)?;
    }

    let sid = out
        .find_section_by_name(".symtab")
        .ok_or_else(|| DiffError::Malformed(".symtab is missing from the output".into()))?;
    let strtab_index = out
        .find_section_by_name(".strtab")
        .map(|s| out[s].index as u32)
        .unwrap_or(0);
    out[sid].sh.sh_size = data.len() as u64;
    out[sid].sh.sh_entsize = SIZEOF_SYM as u64;
    out[sid].sh.sh_link = strtab_index;
    out[sid].sh.sh_info = first_nonlocal as u32;
    out[sid].sh.sh_addralign = 8;
    out[sid].data = data;
    Ok(())
}

/// Lay the object out and serialize it: header, section payloads at their
/// alignment, section header table last. The patched object's header is the
/// template; entry point and program header fields are zeroed.
pub fn emit(out: &mut ElfObject) -> Result<Vec<u8>> {
    let mut offset = SIZEOF_EHDR;
    for sec in &mut out.sections {
        let align = sec.sh.sh_addralign.max(1) as usize;
        offset = (offset + align - 1) & !(align - 1);
        sec.sh.sh_offset = offset as u64;
        if sec.sh.sh_type != SHT_NOBITS {
            offset += sec.data.len();
        }
    }
    let shoff = (offset + 7) & !7;
    let shnum = out.sections.len() + 1;
    let total = shoff + shnum * SIZEOF_SHDR;
    let mut buf = vec![0u8; total];

    let shstrndx = out
        .find_section_by_name(".shstrtab")
        .map(|s| out[s].index as u16)
        .unwrap_or(0);
    let header = Header64 {
        e_ident: out.header.e_ident,
        e_type: ET_REL,
        e_machine: out.header.e_machine,
        e_version: out.header.e_version,
        e_entry: 0,
        e_phoff: 0,
        e_shoff: shoff as u64,
        e_flags: out.header.e_flags,
        e_ehsize: SIZEOF_EHDR as u16,
        e_phentsize: 0,
        e_phnum: 0,
        e_shentsize: SIZEOF_SHDR as u16,
        e_shnum: shnum as u16,
        e_shstrndx: shstrndx,
    };
    buf.pwrite_with(header, 0, LE)?;

    for sec in &out.sections {
        if sec.sh.sh_type != SHT_NOBITS && !sec.data.is_empty() {
            let at = sec.sh.sh_offset as usize;
            buf[at..at + sec.data.len()].copy_from_slice(&sec.data);
        }
        let shdr = SectionHeader64 {
            sh_name: sec.sh.sh_name as u32,
            sh_type: sec.sh.sh_type,
            sh_flags: sec.sh.sh_flags,
            sh_addr: 0,
            sh_offset: sec.sh.sh_offset,
            sh_size: sec.sh.sh_size,
            sh_link: sec.sh.sh_link,
            sh_info: sec.sh.sh_info,
            sh_addralign: sec.sh.sh_addralign,
            sh_entsize: sec.sh.sh_entsize,
        };
        buf.pwrite_with(shdr, shoff + sec.index * SIZEOF_SHDR, LE)?;
    }

    debug!("emitted {} bytes, {} sections", buf.len(), shnum);
    Ok(buf)
}

/// Emit the output object to `path` with mode 0664.
pub fn write_output(out: &mut ElfObject, path: &Path) -> Result<()> {
    let bytes = emit(out)?;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o664)
        .open(path)?;
    file.write_all(&bytes)?;
    // open(2) modes are subject to the umask; the contract is not
    fs::set_permissions(path, fs::Permissions::from_mode(0o664))?;
    Ok(())
}
