//! ELF32 loader for OTBN binaries and the decoded [`Program`] model.

mod constants;
mod file;
mod header;
mod image;
mod program;

pub use constants::*;
pub use file::*;
pub use header::*;
pub use image::*;
pub use program::*;

use std::path::PathBuf;

use ctcheck_isa::AsmError;
use thiserror::Error;

/// ELF parsing errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("ELF data too small")]
    TooSmall,
    #[error("Invalid ELF magic number")]
    InvalidMagic,
    #[error("Only little-endian ELF supported")]
    NotLittleEndian,
    #[error("Unsupported ELF class: {0} (only ELF32 is supported)")]
    UnsupportedClass(u8),
    #[error("Read past end of file at offset {offset:#x}")]
    Truncated { offset: usize },
    #[error("Section header out of bounds")]
    SectionOutOfBounds,
    #[error("Program header out of bounds")]
    ProgramOutOfBounds,
    #[error("Symbol table has no string table")]
    MissingStringTable,
    #[error("Segment extends beyond file")]
    SegmentBeyondFile,
    #[error("Virtual address overflow")]
    VirtualAddressOverflow,
    #[error("No loadable segments found")]
    NoLoadableSegments,
    #[error("No executable segments found")]
    NoExecutableSegments,
    #[error("Too many loadable segments")]
    TooManySegments,
    #[error("Overlapping virtual address ranges")]
    OverlappingSegments,
}

pub type Result<T> = std::result::Result<T, ElfError>;

/// Failure to turn an input into a [`Program`].
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Elf(#[from] ElfError),
    #[error("cannot decode instruction {raw:#010x} at {pc:#x}")]
    Unknown { pc: u32, raw: u32 },
    #[error("code segment at {vaddr:#x} is not a whole number of instructions")]
    Misaligned { vaddr: u32 },
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },
}

impl From<AsmError> for DecodeError {
    fn from(err: AsmError) -> Self {
        Self::Syntax {
            line: err.line,
            message: err.message,
        }
    }
}
