//! ELF32 file parser.

use crate::constants::*;
use crate::header::*;
use crate::{ElfError, Result};

/// Read little-endian u16 from bytes.
#[inline]
fn read_le16(data: &[u8], offset: usize) -> Result<u16> {
    offset
        .checked_add(2)
        .and_then(|end| data.get(offset..end))
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(ElfError::Truncated { offset })
}

/// Read little-endian u32 from bytes.
#[inline]
fn read_le32(data: &[u8], offset: usize) -> Result<u32> {
    offset
        .checked_add(4)
        .and_then(|end| data.get(offset..end))
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(ElfError::Truncated { offset })
}

fn read_u8(data: &[u8], offset: usize) -> Result<u8> {
    data.get(offset)
        .copied()
        .ok_or(ElfError::Truncated { offset })
}

/// Parsed ELF file.
#[derive(Clone, Debug)]
pub struct ElfFile {
    pub entry_point: u32,
    pub e_flags: u32,
    pub program_headers: Vec<ProgramHeader>,
    pub sections: Vec<SectionHeader>,
    pub symbols: Vec<Symbol>,
}

impl ElfFile {
    /// Parse ELF file from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = Self::parse_header(data)?;
        let program_headers = Self::parse_program_headers(data, &header)?;
        let sections = Self::parse_all_sections(data, &header)?;
        let symbols = Self::parse_symbols(data, &sections)?;

        Ok(Self {
            entry_point: header.entry,
            e_flags: header.flags,
            program_headers,
            sections,
            symbols,
        })
    }

    /// Look up a symbol by name.
    ///
    /// Returns the symbol's value (address) if found.
    pub fn lookup_symbol(&self, name: &str) -> Option<u32> {
        self.symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.value)
    }

    fn parse_header(data: &[u8]) -> Result<ElfHeader> {
        if data.len() < EHDR_SIZE {
            return Err(ElfError::TooSmall);
        }

        if read_le32(data, 0)? != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }

        let class = read_u8(data, 4)?;
        let data_encoding = read_u8(data, 5)?;
        let version = read_u8(data, 6)?;

        if class != ELF_CLASS_32 {
            return Err(ElfError::UnsupportedClass(class));
        }
        if data_encoding != ELF_DATA_LSB {
            return Err(ElfError::NotLittleEndian);
        }

        Ok(ElfHeader {
            class,
            data: data_encoding,
            version,
            machine: read_le16(data, 18)?,
            entry: read_le32(data, 24)?,
            phoff: read_le32(data, 28)?,
            shoff: read_le32(data, 32)?,
            flags: read_le32(data, 36)?,
            phentsize: read_le16(data, 42)?,
            phnum: read_le16(data, 44)?,
            shentsize: read_le16(data, 46)?,
            shnum: read_le16(data, 48)?,
            shstrndx: read_le16(data, 50)?,
        })
    }

    fn table_offset(base: u32, index: u16, entsize: u16) -> usize {
        base as usize + usize::from(index) * usize::from(entsize)
    }

    fn parse_program_headers(data: &[u8], header: &ElfHeader) -> Result<Vec<ProgramHeader>> {
        if header.phnum > 0 && usize::from(header.phentsize) < PHDR_SIZE {
            return Err(ElfError::ProgramOutOfBounds);
        }
        (0..header.phnum)
            .map(|i| {
                let offset = Self::table_offset(header.phoff, i, header.phentsize);
                Self::parse_program_header(data, offset)
            })
            .collect()
    }

    fn parse_program_header(data: &[u8], offset: usize) -> Result<ProgramHeader> {
        if offset + PHDR_SIZE > data.len() {
            return Err(ElfError::ProgramOutOfBounds);
        }
        Ok(ProgramHeader {
            p_type: read_le32(data, offset)?,
            offset: read_le32(data, offset + 4)?,
            vaddr: read_le32(data, offset + 8)?,
            paddr: read_le32(data, offset + 12)?,
            filesz: read_le32(data, offset + 16)?,
            memsz: read_le32(data, offset + 20)?,
            flags: read_le32(data, offset + 24)?,
            align: read_le32(data, offset + 28)?,
        })
    }

    fn parse_all_sections(data: &[u8], header: &ElfHeader) -> Result<Vec<SectionHeader>> {
        if header.shnum > 0 && usize::from(header.shentsize) < SHDR_SIZE {
            return Err(ElfError::SectionOutOfBounds);
        }
        (0..header.shnum)
            .map(|i| {
                let offset = Self::table_offset(header.shoff, i, header.shentsize);
                Self::parse_section_header(data, offset)
            })
            .collect()
    }

    fn parse_section_header(data: &[u8], offset: usize) -> Result<SectionHeader> {
        if offset + SHDR_SIZE > data.len() {
            return Err(ElfError::SectionOutOfBounds);
        }
        Ok(SectionHeader {
            name: read_le32(data, offset)?,
            sh_type: read_le32(data, offset + 4)?,
            flags: read_le32(data, offset + 8)?,
            addr: read_le32(data, offset + 12)?,
            offset: read_le32(data, offset + 16)?,
            size: read_le32(data, offset + 20)?,
            link: read_le32(data, offset + 24)?,
            info: read_le32(data, offset + 28)?,
            addralign: read_le32(data, offset + 32)?,
            entsize: read_le32(data, offset + 36)?,
        })
    }

    fn extract_string(data: &[u8], strtab_offset: usize, string_offset: usize) -> String {
        let start = strtab_offset.saturating_add(string_offset);
        data.get(start..)
            .map(|tail| {
                let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
                String::from_utf8_lossy(&tail[..end]).into_owned()
            })
            .unwrap_or_default()
    }

    /// Parse symbol table from ELF sections.
    fn parse_symbols(data: &[u8], sections: &[SectionHeader]) -> Result<Vec<Symbol>> {
        // Find symbol table section (.symtab)
        let Some(symtab) = sections.iter().find(|s| s.sh_type == SHT_SYMTAB) else {
            return Ok(Vec::new());
        };

        // Find string table for symbol names (linked via sh_link)
        let strtab = sections
            .get(symtab.link as usize)
            .filter(|s| s.sh_type == SHT_STRTAB)
            .ok_or(ElfError::MissingStringTable)?;

        let entsize = match symtab.entsize as usize {
            0 => SYM_SIZE,
            n => n,
        };
        let symtab_offset = symtab.offset as usize;
        if symtab_offset + symtab.size as usize > data.len() {
            return Err(ElfError::SectionOutOfBounds);
        }

        (0..symtab.size as usize / entsize)
            .map(|i| Self::parse_symbol(data, symtab_offset + i * entsize, strtab.offset as usize))
            .collect()
    }

    /// Parse a single 16-byte ELF32 symbol entry.
    fn parse_symbol(data: &[u8], offset: usize, strtab_offset: usize) -> Result<Symbol> {
        let name_idx = read_le32(data, offset)? as usize;
        let info = read_u8(data, offset + 12)?;

        Ok(Symbol {
            name: Self::extract_string(data, strtab_offset, name_idx),
            value: read_le32(data, offset + 4)?,
            size: read_le32(data, offset + 8)?,
            sym_type: info & 0xf,
            binding: info >> 4,
            shndx: read_le16(data, offset + 14)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u8> {
        let mut data = vec![0u8; EHDR_SIZE];
        data[..4].copy_from_slice(&ELF_MAGIC.to_le_bytes());
        data[4] = ELF_CLASS_32;
        data[5] = ELF_DATA_LSB;
        data[6] = ELF_VERSION_CURRENT;
        data[16..18].copy_from_slice(&ELF_TYPE_EXEC.to_le_bytes());
        data[18..20].copy_from_slice(&ELF_MACHINE_RISCV.to_le_bytes());
        data
    }

    #[test]
    fn test_minimal_header() {
        let elf = ElfFile::parse(&header()).unwrap();
        assert!(elf.program_headers.is_empty());
        assert!(elf.symbols.is_empty());
    }

    #[test]
    fn test_too_small() {
        assert!(matches!(ElfFile::parse(&[0x7F, b'E']), Err(ElfError::TooSmall)));
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = header();
        data[0] = 0;
        assert!(matches!(ElfFile::parse(&data), Err(ElfError::InvalidMagic)));
    }

    #[test]
    fn test_rejects_elf64_and_big_endian() {
        let mut data = header();
        data[4] = 2;
        assert!(matches!(
            ElfFile::parse(&data),
            Err(ElfError::UnsupportedClass(2))
        ));

        let mut data = header();
        data[5] = 2;
        assert!(matches!(ElfFile::parse(&data), Err(ElfError::NotLittleEndian)));
    }

    #[test]
    fn test_program_header_out_of_bounds() {
        let mut data = header();
        data[28..32].copy_from_slice(&1000u32.to_le_bytes());
        data[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        data[44..46].copy_from_slice(&1u16.to_le_bytes());
        assert!(matches!(
            ElfFile::parse(&data),
            Err(ElfError::ProgramOutOfBounds)
        ));
    }
}
