//! Per-architecture relocation behavior.
//!
//! Every branch on a relocation type in the replacer and the writer goes
//! through this descriptor, so adding a machine means filling in one
//! `match` arm per question rather than auditing the whole pipeline.

use goblin::elf::header::{EM_AARCH64, EM_X86_64};
use goblin::elf::reloc::{
    R_AARCH64_ABS32, R_AARCH64_ABS64, R_AARCH64_CALL26, R_AARCH64_JUMP26, R_X86_64_32,
    R_X86_64_32S, R_X86_64_64, R_X86_64_NONE, R_X86_64_PC32, R_X86_64_PLT32,
};
use goblin::elf::sym::{STB_LOCAL, STT_NOTYPE};

use crate::error::{DiffError, Result};
use crate::object::Symbol;

/// Machines the differencing engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    /// x86-64.
    X86_64,
    /// AArch64.
    Aarch64,
}

impl Arch {
    /// Map an ELF `e_machine` value to a descriptor.
    pub fn from_machine(machine: u16) -> Result<Self> {
        match machine {
            EM_X86_64 => Ok(Arch::X86_64),
            EM_AARCH64 => Ok(Arch::Aarch64),
            other => Err(DiffError::UnsupportedMachine(other)),
        }
    }

    /// The `e_machine` value for this descriptor.
    pub fn machine(self) -> u16 {
        match self {
            Arch::X86_64 => EM_X86_64,
            Arch::Aarch64 => EM_AARCH64,
        }
    }

    /// Offset the compiler bakes into the addend for this relocation type.
    ///
    /// PC-relative x86-64 relocations applied from text point four bytes
    /// before the symbol they mean; AArch64 branch addends carry the target
    /// offset directly.
    pub fn implicit_bias(self, from_text: bool, typ: u32) -> i64 {
        match self {
            Arch::X86_64 if from_text => match typ {
                R_X86_64_PC32 | R_X86_64_PLT32 | R_X86_64_NONE => -4,
                _ => 0,
            },
            _ => 0,
        }
    }

    /// Absolute relocation codes of width 32 or 64, used by the
    /// end-of-section policy of the section-symbol replacer.
    pub fn is_wide_abs(self, typ: u32) -> bool {
        match self {
            Arch::X86_64 => matches!(typ, R_X86_64_32 | R_X86_64_32S | R_X86_64_64),
            Arch::Aarch64 => matches!(typ, R_AARCH64_ABS32 | R_AARCH64_ABS64),
        }
    }

    /// The 64-bit absolute relocation code, used by the metadata writer.
    pub fn abs64(self) -> u32 {
        match self {
            Arch::X86_64 => R_X86_64_64,
            Arch::Aarch64 => R_AARCH64_ABS64,
        }
    }

    /// Branch codes with limited reach that may need a long-jump slot.
    pub fn is_branch(self, typ: u32) -> bool {
        match self {
            Arch::X86_64 => false,
            Arch::Aarch64 => matches!(typ, R_AARCH64_CALL26 | R_AARCH64_JUMP26),
        }
    }

    /// AArch64 `$x`/`$d` mapping symbols: zero-size local markers that must
    /// not win a symbol search.
    pub fn is_mapping_symbol(self, sym: &Symbol) -> bool {
        self == Arch::Aarch64
            && sym.name.starts_with('$')
            && sym.kind() == STT_NOTYPE
            && sym.bind() == STB_LOCAL
    }
}
