//! Executable segments of an ELF image.

use crate::constants::*;
use crate::file::ElfFile;
use crate::header::ProgramHeader;
use crate::{ElfError, Result};

/// An executable segment: instruction memory contents at a virtual address.
#[derive(Clone, Debug)]
pub struct CodeSegment {
    pub vaddr: u32,
    pub data: Vec<u8>,
}

impl CodeSegment {
    /// Iterate `(address, word)` pairs over whole 32-bit words.
    pub fn words(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.data
            .chunks_exact(4)
            .zip((0u32..).step_by(4))
            .map(|(bytes, off)| {
                let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                (self.vaddr.wrapping_add(off), word)
            })
    }

    /// Trailing bytes that do not form a whole instruction.
    pub const fn trailing_bytes(&self) -> usize {
        self.data.len() % 4
    }
}

/// Collect the executable `PT_LOAD` segments of a parsed file.
pub fn code_segments(elf: &ElfFile, file_data: &[u8]) -> Result<Vec<CodeSegment>> {
    let loadable = validate_segments(elf, file_data)?;
    let segments: Vec<CodeSegment> = loadable
        .iter()
        .filter(|phdr| phdr.is_executable())
        .map(|phdr| {
            let start = phdr.offset as usize;
            let end = start + phdr.filesz as usize;
            CodeSegment {
                vaddr: phdr.vaddr,
                data: file_data[start..end].to_vec(),
            }
        })
        .collect();

    if segments.is_empty() {
        return Err(ElfError::NoExecutableSegments);
    }
    Ok(segments)
}

fn validate_segments(elf: &ElfFile, file_data: &[u8]) -> Result<Vec<ProgramHeader>> {
    let mut loadable = Vec::new();

    for phdr in &elf.program_headers {
        if phdr.p_type == PT_LOAD && phdr.memsz > 0 {
            let offset = phdr.offset as usize;
            let filesz = phdr.filesz as usize;

            if offset.checked_add(filesz).is_none_or(|end| end > file_data.len()) {
                return Err(ElfError::SegmentBeyondFile);
            }
            if phdr.vaddr.checked_add(phdr.memsz).is_none() {
                return Err(ElfError::VirtualAddressOverflow);
            }

            loadable.push(phdr.clone());
        }
    }

    if loadable.is_empty() {
        return Err(ElfError::NoLoadableSegments);
    }

    if loadable.len() > MAX_SEGMENTS {
        return Err(ElfError::TooManySegments);
    }

    // Executable segments share one address space; data segments live in
    // DMEM and may reuse the same addresses.
    let code: Vec<&ProgramHeader> = loadable.iter().filter(|p| p.is_executable()).collect();
    for (i, a) in code.iter().enumerate() {
        for b in &code[i + 1..] {
            let (a_start, a_end) = (a.vaddr, a.vaddr + a.memsz);
            let (b_start, b_end) = (b.vaddr, b.vaddr + b.memsz);
            if a_start < b_end && b_start < a_end {
                return Err(ElfError::OverlappingSegments);
            }
        }
    }

    Ok(loadable)
}
