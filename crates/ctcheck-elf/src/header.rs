//! ELF32 header structures.

/// ELF header.
#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub class: u8,
    pub data: u8,
    pub version: u8,
    pub machine: u16,
    pub entry: u32,
    pub phoff: u32,
    pub shoff: u32,
    pub flags: u32,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

/// Program header.
#[derive(Clone, Debug)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub offset: u32,
    pub vaddr: u32,
    pub paddr: u32,
    pub filesz: u32,
    pub memsz: u32,
    pub flags: u32,
    pub align: u32,
}

impl ProgramHeader {
    pub const fn is_executable(&self) -> bool {
        self.flags & crate::PF_X != 0
    }
}

/// Section header.
#[derive(Clone, Debug)]
pub struct SectionHeader {
    pub name: u32,
    pub sh_type: u32,
    pub flags: u32,
    pub addr: u32,
    pub offset: u32,
    pub size: u32,
    pub link: u32,
    pub info: u32,
    pub addralign: u32,
    pub entsize: u32,
}

/// ELF symbol.
#[derive(Clone, Debug)]
pub struct Symbol {
    /// Symbol name.
    pub name: String,
    /// Symbol value (address for functions and labels).
    pub value: u32,
    /// Symbol size.
    pub size: u32,
    /// Symbol type (`STT_FUNC`, `STT_OBJECT`, etc.).
    pub sym_type: u8,
    /// Symbol binding (`STB_LOCAL`, `STB_GLOBAL`, etc.).
    pub binding: u8,
    /// Section index.
    pub shndx: u16,
}

impl Symbol {
    /// Symbols that name a code or data address rather than a file or section.
    pub fn is_address(&self) -> bool {
        !self.name.is_empty() && !matches!(self.sym_type, crate::STT_SECTION | crate::STT_FILE)
    }
}
