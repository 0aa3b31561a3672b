//! Anchoring file-scope locals against the running binary.
//!
//! ELF allows duplicate local names across translation units, so a local
//! symbol is only identified by (name, type, enclosing `STT_FILE` block).
//! Both the source object and the running binary split into blocks at
//! `STT_FILE` markers; a source block is anchored to the unique running
//! block whose locals match it both ways.

use std::ops::Range;

use goblin::elf::sym::{STB_LOCAL, STT_FILE, STT_FUNC, STT_OBJECT};
use log::debug;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, SymbolId};
use crate::running::RunningElf;

/// Record, on every local in every source file block, the index of the
/// matching `STT_FILE` entry in the running binary. Zero candidate blocks
/// and ambiguous candidates are both fatal.
pub fn anchor_local_symbols(source: &mut ElfObject, relf: &RunningElf) -> Result<()> {
    let files: Vec<SymbolId> = (0..source.symbols.len())
        .filter(|&i| source.symbols[i].kind() == STT_FILE)
        .map(SymbolId)
        .collect();
    for file in files {
        anchor_block(source, relf, file)?;
    }
    Ok(())
}

fn anchor_block(source: &mut ElfObject, relf: &RunningElf, file: SymbolId) -> Result<()> {
    let fname = source[file].name.clone();
    let block = source.file_block(file);

    let mut anchor = None;
    for (idx, rsym) in relf.syms.iter().enumerate() {
        if rsym.typ != STT_FILE || rsym.name != fname {
            continue;
        }
        if !locals_match(source, block.clone(), relf, idx) {
            continue;
        }
        if anchor.is_some() {
            return Err(DiffError::AmbiguousLocals { file: fname });
        }
        anchor = Some(idx);
    }

    let idx = match anchor {
        Some(idx) => idx,
        None => return Err(DiffError::NoMatchingLocals { file: fname }),
    };
    debug!("anchored file block {} at running symbol {}", fname, idx);
    for i in block {
        source.symbols[i].anchor = Some(idx);
    }
    Ok(())
}

/// Two-way comparison of a source block against the running block starting
/// after `file_idx`: every local function/object must appear on the other
/// side by name and type.
fn locals_match(
    source: &ElfObject,
    block: Range<usize>,
    relf: &RunningElf,
    file_idx: usize,
) -> bool {
    let rblock = relf.block_range(file_idx);

    for r in rblock.clone() {
        let rsym = &relf.syms[r];
        if rsym.bind != STB_LOCAL || (rsym.typ != STT_FUNC && rsym.typ != STT_OBJECT) {
            continue;
        }
        let found = block.clone().any(|i| {
            let sym = &source.symbols[i];
            sym.bind() == STB_LOCAL && sym.kind() == rsym.typ && sym.name == rsym.name
        });
        if !found {
            debug!("no source counterpart for running local {}", rsym.name);
            return false;
        }
    }

    for i in block {
        let sym = &source.symbols[i];
        if sym.bind() != STB_LOCAL || (sym.kind() != STT_FUNC && sym.kind() != STT_OBJECT) {
            continue;
        }
        let found = rblock.clone().any(|r| {
            let rsym = &relf.syms[r];
            rsym.bind == STB_LOCAL && rsym.typ == sym.kind() && rsym.name == sym.name
        });
        if !found {
            debug!("no running counterpart for source local {}", sym.name);
            return false;
        }
    }

    true
}
