//! Read-only symbol index of the running binary.
//!
//! The running executable (or shared object) is consulted three ways: to
//! anchor file-scope locals to the translation unit they came from, to find
//! the addresses patched functions replace, and to resolve symbols the
//! output object leaves undefined.

use std::fs;
use std::ops::Range;
use std::path::Path;

use goblin::elf::sym::{STB_LOCAL, STT_FILE, STT_NOTYPE};
use goblin::elf::Elf;
use log::debug;

use crate::error::{DiffError, Result};

/// One symbol-table entry of the running binary.
#[derive(Debug, Clone)]
pub struct RunningSymbol {
    /// Symbol name.
    pub name: String,
    /// `STT_*` type.
    pub typ: u8,
    /// `STB_*` binding.
    pub bind: u8,
    /// Symbol address.
    pub value: u64,
    /// Symbol size.
    pub size: u64,
    /// Defining section index.
    pub shndx: usize,
}

/// Flat, ordered symbol index extracted from the running binary.
#[derive(Debug)]
pub struct RunningElf {
    /// Short name used in diagnostics.
    pub name: String,
    /// Symbols in table order.
    pub syms: Vec<RunningSymbol>,
}

impl RunningElf {
    /// Read and index the running binary at `path`.
    pub fn open(path: &Path) -> Result<RunningElf> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&bytes, &name)
    }

    /// Index the running binary from a byte buffer. Falls back to the
    /// dynamic symbol table when `.symtab` was stripped.
    pub fn parse(bytes: &[u8], name: &str) -> Result<RunningElf> {
        let elf = Elf::parse(bytes)?;
        let (symtab, strtab) = if elf.syms.is_empty() {
            (&elf.dynsyms, &elf.dynstrtab)
        } else {
            (&elf.syms, &elf.strtab)
        };
        if symtab.is_empty() {
            return Err(DiffError::MissingSymbolTable { path: name.into() });
        }
        let syms = symtab
            .iter()
            .map(|sym| RunningSymbol {
                name: strtab.get_at(sym.st_name).unwrap_or("").to_string(),
                typ: sym.st_type(),
                bind: sym.st_bind(),
                value: sym.st_value,
                size: sym.st_size,
                shndx: sym.st_shndx,
            })
            .collect::<Vec<_>>();
        debug!("indexed {} symbols from {}", syms.len(), name);
        Ok(RunningElf {
            name: name.into(),
            syms,
        })
    }

    /// Positions of the symbols between the `STT_FILE` entry at `file` and
    /// the next `STT_FILE` entry.
    pub fn block_range(&self, file: usize) -> Range<usize> {
        let start = file + 1;
        let mut end = start;
        while end < self.syms.len() && self.syms[end].typ != STT_FILE {
            end += 1;
        }
        start..end
    }

    /// Position of the symbol named `name` with type `typ` inside the file
    /// block anchored at `file`.
    pub fn find_in_block(&self, file: usize, name: &str, typ: u8) -> Option<usize> {
        self.block_range(file)
            .find(|&i| self.syms[i].typ == typ && self.syms[i].name == name)
    }

    /// Position of a non-local symbol named `name`. `STT_NOTYPE` queries
    /// match any type, since undefined references carry no type in the
    /// patch object.
    pub fn find_global(&self, name: &str, typ: u8) -> Option<usize> {
        self.syms.iter().position(|s| {
            s.bind != STB_LOCAL && (typ == STT_NOTYPE || s.typ == typ) && s.name == name
        })
    }

    /// 1-based occurrence of the local symbol at `idx` among same-named
    /// locals of the same type, or 0 when the name is unique.
    pub fn sympos(&self, idx: usize) -> u64 {
        let target = &self.syms[idx];
        let dups: Vec<usize> = (0..self.syms.len())
            .filter(|&i| {
                let s = &self.syms[i];
                s.bind == STB_LOCAL && s.typ == target.typ && s.name == target.name
            })
            .collect();
        if dups.len() < 2 {
            return 0;
        }
        dups.iter().position(|&i| i == idx).map(|p| p as u64 + 1).unwrap_or(0)
    }
}
