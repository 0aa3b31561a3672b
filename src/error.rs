//! Error taxonomy for the differencing pipeline.
//!
//! Every failure is fatal to the run: input validation problems surface
//! before any processing, model-integrity problems abort at the first
//! occurrence, and patchability violations are collected by the verifier
//! and reported as a single summary.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DiffError>;

/// The kinds of errors that can befall a differencing run.
#[derive(Debug, Error)]
pub enum DiffError {
    /// Reading or writing one of the input/output files failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The underlying ELF library rejected an input.
    #[error("ELF parse error: {0}")]
    Object(#[from] goblin::error::Error),

    /// Serializing an output record failed.
    #[error("encoding error: {0}")]
    Encode(#[from] scroll::Error),

    /// An input object is not an `ET_REL` file.
    #[error("{path}: not a relocatable object")]
    NotRelocatable {
        /// Offending file.
        path: String,
    },

    /// An input is not 64-bit little-endian.
    #[error("{path}: unsupported ELF class or byte order")]
    UnsupportedLayout {
        /// Offending file.
        path: String,
    },

    /// The object targets a machine the engine does not know.
    #[error("unsupported machine {0:#x}")]
    UnsupportedMachine(u16),

    /// Source and patched objects were not built alike.
    #[error("source and patched objects have incompatible ELF headers")]
    HeaderMismatch,

    /// A relocatable input carries program headers.
    #[error("{path}: relocatable object contains program headers")]
    HasProgramHeaders {
        /// Offending file.
        path: String,
    },

    /// No symbol table could be found.
    #[error("{path}: no symbol table")]
    MissingSymbolTable {
        /// Offending file.
        path: String,
    },

    /// A bundled symbol does not sit at the start of its section.
    #[error("symbol {name} at offset {value} within section {section}, expected 0")]
    BundledSymbolOffset {
        /// Symbol name.
        name: String,
        /// Observed `st_value`.
        value: u64,
        /// Containing section.
        section: String,
    },

    /// A section-relative relocation could not be redirected to a symbol.
    #[error("{section}+{offset:#x}: can't find replacement symbol for {name}+{addend} reference")]
    UnresolvedReference {
        /// Section the relocation applies to.
        section: String,
        /// Offset of the relocation within that section.
        offset: u64,
        /// The section symbol that was targeted.
        name: String,
        /// The relocation addend.
        addend: i64,
    },

    /// An absolute relocation points one past the end of a data section.
    #[error("{section}: relocation refers to the end of a data section")]
    EndOfSectionReference {
        /// The referenced data section.
        section: String,
    },

    /// No `STT_FILE` block in the running binary matched a source block.
    #[error("could not find matching {file} local symbols in running binary")]
    NoMatchingLocals {
        /// The `STT_FILE` symbol name.
        file: String,
    },

    /// Several `STT_FILE` blocks in the running binary matched one source block.
    #[error("found duplicate matches for {file} local symbols in running binary")]
    AmbiguousLocals {
        /// The `STT_FILE` symbol name.
        file: String,
    },

    /// Correlated symbols disagree on type, binding, or definedness.
    #[error("symbol info mismatch: {name}")]
    SymbolInfoMismatch {
        /// Symbol name.
        name: String,
    },

    /// A correlated symbol moved to an unrelated section.
    #[error("symbol changed sections: {name}")]
    SymbolChangedSections {
        /// Symbol name.
        name: String,
    },

    /// Correlated sections disagree on immutable header fields.
    #[error("section header details differ: {name}")]
    SectionHeaderMismatch {
        /// Section name.
        name: String,
    },

    /// The verifier rejected the change set; details precede this on the log.
    #[error("{0} unsupported section changes")]
    Unpatchable(usize),

    /// A patched function has no counterpart in the running binary.
    #[error("{name}: no matching symbol in running binary")]
    MissingRunningSymbol {
        /// Symbol name.
        name: String,
    },

    /// Catch-all for structurally broken inputs or internal model breakage.
    #[error("malformed object: {0}")]
    Malformed(String),
}
