//! objdelta is a crate for diffing relocatable ELF objects into live-patch
//! objects.
//!
//! Given two objects compiled from two versions of the same translation
//! unit (with `-ffunction-sections`/`-fdata-sections`) and the fully linked
//! binary currently running, the engine correlates sections and symbols
//! across the two builds, classifies each one as same/changed/new, pulls in
//! the transitive dependencies of everything that changed, verifies the
//! change set is expressible as an additive patch, and emits a minimal
//! relocatable object carrying the changed code plus the metadata a
//! live-patch loader needs to splice it into the running process.

pub mod anchor;
pub mod arch;
pub mod bundle;
pub mod compare;
pub mod correlate;
pub mod diff;
pub mod ehframe;
pub mod elf;
pub mod error;
pub mod include;
pub mod load;
pub mod meta;
pub mod migrate;
pub mod object;
pub mod replace;
pub mod running;
pub mod verify;

pub use crate::arch::Arch;
pub use crate::diff::{create_patch_object, Outcome};
pub use crate::error::{DiffError, Result};
pub use crate::object::{
    ElfObject, Rela, Section, SectionId, Status, Strip, Symbol, SymbolId, ST_OTHER_EXTERN,
};
pub use crate::running::{RunningElf, RunningSymbol};
