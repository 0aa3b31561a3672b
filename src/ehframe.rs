//! Rebuilding `.eh_frame` after FDE pruning.
//!
//! Call-frame data is a sequence of length-prefixed records: CIEs (id 0)
//! and FDEs whose id field is a back-offset to their CIE. Dropping the FDEs
//! of pruned functions shifts every surviving record, so CIE back-pointers
//! and relocation offsets have to be rewritten in the same pass.
//!
//! An FDE's first relocation sits at record offset 8 (the pc-begin field)
//! and names the function it covers; by the time this runs, relocations to
//! non-included sections have already been filtered out, so an FDE survives
//! exactly when that relocation survived.

use std::collections::HashMap;

use log::debug;
use scroll::{Pread, Pwrite, LE};

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Rela, SectionId};

pub fn rebuild(obj: &mut ElfObject, eh: SectionId) -> Result<()> {
    let relasec = match obj[eh].rela {
        Some(relasec) => relasec,
        None => return Ok(()),
    };
    let data = std::mem::take(&mut obj[eh].data);
    let relas = std::mem::take(&mut obj[relasec].relas);

    let mut out: Vec<u8> = Vec::with_capacity(data.len());
    let mut out_relas: Vec<Rela> = Vec::new();
    let mut cie_at: HashMap<u64, u64> = HashMap::new();

    let mut off = 0usize;
    while off + 4 <= data.len() {
        let len: u32 = data.pread_with(off, LE)?;
        if len == 0 {
            break;
        }
        if len == u32::MAX {
            return Err(DiffError::Malformed(
                "extended-length call-frame records are not supported".into(),
            ));
        }
        let end = off + 4 + len as usize;
        if end > data.len() {
            return Err(DiffError::Malformed("truncated call-frame record".into()));
        }
        let id: u32 = data.pread_with(off + 4, LE)?;

        if id == 0 {
            // CIE: always kept
            let new_off = out.len() as u64;
            cie_at.insert(off as u64, new_off);
            out.extend_from_slice(&data[off..end]);
            shift_relas(&relas, off, end, new_off, &mut out_relas);
        } else {
            let keep = relas.iter().any(|r| r.offset as usize == off + 8);
            if keep {
                let new_off = out.len() as u64;
                let cie_old = (off as u64 + 4)
                    .checked_sub(u64::from(id))
                    .ok_or_else(|| DiffError::Malformed("FDE CIE pointer underflow".into()))?;
                let cie_new = *cie_at.get(&cie_old).ok_or_else(|| {
                    DiffError::Malformed("FDE references an unknown CIE".into())
                })?;
                out.extend_from_slice(&data[off..end]);
                let new_id = (new_off + 4 - cie_new) as u32;
                out.pwrite_with(new_id, new_off as usize + 4, LE)?;
                shift_relas(&relas, off, end, new_off, &mut out_relas);
            } else {
                debug!("dropping call-frame record at {:#x}", off);
            }
        }
        off = end;
    }

    obj[eh].sh.sh_size = out.len() as u64;
    obj[eh].data = out;
    obj[relasec].relas = out_relas;
    Ok(())
}

/// Move the relocations inside `[start, end)` to the record's new position.
fn shift_relas(relas: &[Rela], start: usize, end: usize, new_off: u64, out: &mut Vec<Rela>) {
    for rela in relas {
        let at = rela.offset as usize;
        if at >= start && at < end {
            out.push(Rela {
                offset: new_off + (at - start) as u64,
                ..*rela
            });
        }
    }
}
