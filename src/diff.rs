//! The differencing pipeline.
//!
//! A linear sequence of transformations over the in-memory model; each
//! stage depends only on the state left by earlier ones. The source
//! container is dropped as soon as comparison has finished — everything
//! later stages need from it has been copied onto the patched elements.

use std::path::Path;

use goblin::elf::sym::{STB_GLOBAL, STT_FUNC};
use log::{debug, info};

use crate::error::Result;
use crate::object::{ElfObject, Status};
use crate::running::RunningElf;
use crate::{anchor, bundle, compare, correlate, elf, include, load, meta, migrate, replace, verify};

/// Result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The patch object was written.
    Written,
    /// Nothing changed and no new globals appeared; no output was produced.
    Unchanged,
}

/// Diff `source` against `patched`, resolve against `running`, and write the
/// patch object to `output` — unless there is nothing to patch.
pub fn create_patch_object(
    source: &Path,
    patched: &Path,
    running: &Path,
    output: &Path,
) -> Result<Outcome> {
    debug!("source object: {}", source.display());
    debug!("patched object: {}", patched.display());
    debug!("running binary: {}", running.display());
    debug!("output object: {}", output.display());

    let mut source_obj = load::open(source)?;
    let mut patched_obj = load::open(patched)?;
    let relf = RunningElf::open(running)?;

    load::compare_headers(&source_obj, &patched_obj)?;

    bundle::bundle_symbols(&mut source_obj)?;
    bundle::bundle_symbols(&mut patched_obj)?;
    bundle::detect_child_functions(&mut source_obj);
    bundle::detect_child_functions(&mut patched_obj);

    anchor::anchor_local_symbols(&mut source_obj, &relf)?;

    correlate::mark_grouped_sections(&mut patched_obj)?;

    replace::replace_section_syms(&mut source_obj)?;
    replace::replace_section_syms(&mut patched_obj)?;

    correlate::correlate(&mut source_obj, &mut patched_obj);
    correlate::correlate_static_locals(&mut source_obj, &mut patched_obj);

    compare::mark_ignored_sections(&mut patched_obj);
    compare::compare_correlated_elements(&mut patched_obj, &source_obj)?;
    drop(source_obj);

    include::include_standard_elements(&mut patched_obj);
    let changed = include::include_changed_functions(&mut patched_obj);
    let new_globals = include::include_new_globals(&mut patched_obj);
    include::include_debug_sections(&mut patched_obj)?;

    print_changes(&patched_obj);
    verify::verify_patchability(&patched_obj)?;

    if changed == 0 && new_globals == 0 {
        info!("no changed functions were found");
        return Ok(Outcome::Unchanged);
    }

    let mut out = migrate::migrate_included_elements(patched_obj)?;

    meta::create_strings_elements(&mut out);
    meta::create_patch_entries(&mut out, &relf)?;
    meta::create_got_entries(&mut out)?;
    meta::create_arch_section(&mut out)?;
    meta::build_strings_section_data(&mut out)?;

    elf::reorder_symbols(&mut out);
    elf::strip_unneeded_syms(&mut out);
    elf::reindex_elements(&mut out);
    elf::rebuild_relocations(&mut out)?;
    elf::create_shstrtab(&mut out)?;
    elf::create_strtab(&mut out)?;
    elf::resolve_against_running(&mut out, &relf);
    elf::create_symtab(&mut out)?;
    elf::write_output(&mut out, output)?;

    info!("patch object written to {}", output.display());
    Ok(Outcome::Written)
}

fn print_changes(obj: &ElfObject) {
    for sym in &obj.symbols {
        if sym.kind() != STT_FUNC {
            continue;
        }
        match sym.status {
            Status::Changed => info!("changed function: {}", sym.name),
            Status::New if sym.bind() == STB_GLOBAL && sym.sec.is_some() => {
                info!("new function: {}", sym.name)
            }
            _ => {}
        }
    }
}
