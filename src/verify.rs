//! Patchability rules.
//!
//! Violations are collected rather than fast-failed so the user sees the
//! whole set in one run; the summary error carries the count.

use goblin::elf::section_header::SHT_GROUP;
use log::error;

use crate::error::{DiffError, Result};
use crate::object::{ElfObject, Status};

pub fn verify_patchability(obj: &ElfObject) -> Result<()> {
    let mut errs = 0;

    for sec in &obj.sections {
        if sec.status == Status::Changed && !sec.include {
            error!("changed section {} not selected for inclusion", sec.name);
            errs += 1;
        }

        if sec.status != Status::Same && sec.grouped {
            error!("changed section {} is part of a section group", sec.name);
            errs += 1;
        }

        if sec.sh.sh_type == SHT_GROUP && sec.status == Status::New {
            error!("new/changed group sections are not supported");
            errs += 1;
        }

        // patching mutable data would desynchronize live state
        if sec.include
            && sec.status != Status::New
            && (sec.name.starts_with(".data") || sec.name.starts_with(".bss"))
            && sec.name != ".data.unlikely"
            && sec.name != ".data.once"
        {
            error!("data section {} selected for inclusion", sec.name);
            errs += 1;
        }
    }

    if errs != 0 {
        return Err(DiffError::Unpatchable(errs));
    }
    Ok(())
}
