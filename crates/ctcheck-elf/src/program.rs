//! Decoded program: instructions keyed by address plus the symbol table.

use std::collections::BTreeMap;
use std::path::Path;

use ctcheck_isa::{Instruction, Location, Op, assemble_at, decode};
use tracing::debug;

use crate::constants::{SHF_EXECINSTR, SHN_ABS};
use crate::file::ElfFile;
use crate::image::code_segments;
use crate::DecodeError;

/// Start symbol of a whole OTBN program.
pub const PROGRAM_START_SYMBOL: &str = "_imem_start";

/// A decoded program.
#[derive(Clone, Debug, Default)]
pub struct Program {
    instructions: BTreeMap<u32, Instruction>,
    symbols: BTreeMap<String, u32>,
}

impl Program {
    /// Decode an ELF file from disk.
    pub fn from_elf(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_elf_bytes(&data)
    }

    /// Decode an in-memory ELF image.
    pub fn from_elf_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        let elf = ElfFile::parse(data)?;
        let mut instructions = BTreeMap::new();

        for segment in code_segments(&elf, data)? {
            if segment.trailing_bytes() != 0 {
                return Err(DecodeError::Misaligned {
                    vaddr: segment.vaddr,
                });
            }
            for (pc, raw) in segment.words() {
                let op = decode(raw).ok_or(DecodeError::Unknown { pc, raw })?;
                instructions.insert(pc, Instruction::new(pc, op));
            }
        }

        let mut symbols = BTreeMap::new();
        for sym in elf.symbols.iter().filter(|s| s.is_address()) {
            let in_code = sym.shndx == SHN_ABS
                || elf
                    .sections
                    .get(usize::from(sym.shndx))
                    .is_some_and(|s| s.flags & SHF_EXECINSTR != 0);
            if in_code {
                symbols.entry(sym.name.clone()).or_insert(sym.value);
            }
        }

        debug!(
            instructions = instructions.len(),
            symbols = symbols.len(),
            "decoded ELF"
        );
        Ok(Self {
            instructions,
            symbols,
        })
    }

    /// Assemble a textual listing laid out from address 0.
    pub fn from_listing(source: &str) -> Result<Self, DecodeError> {
        Self::from_listing_at(source, 0)
    }

    /// Assemble a textual listing laid out from `base`.
    pub fn from_listing_at(source: &str, base: u32) -> Result<Self, DecodeError> {
        let listing = assemble_at(source, base)?;
        Ok(Self::from_ops(listing.instructions, listing.symbols))
    }

    fn from_ops(ops: Vec<(u32, Op)>, symbols: BTreeMap<String, u32>) -> Self {
        Self {
            instructions: ops
                .into_iter()
                .map(|(pc, op)| (pc, Instruction::new(pc, op)))
                .collect(),
            symbols,
        }
    }

    /// Supply targets for the indirect jump or call at `pc`.
    ///
    /// Returns `false` if there is no instruction at `pc`.
    pub fn set_indirect_targets(&mut self, pc: u32, targets: impl IntoIterator<Item = u32>) -> bool {
        match self.instructions.remove(&pc) {
            Some(insn) => {
                self.instructions
                    .insert(pc, insn.with_indirect_targets(targets));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, pc: u32) -> Option<&Instruction> {
        self.instructions.get(&pc)
    }

    /// Instructions in address order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn symbol(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    pub const fn symbols(&self) -> &BTreeMap<String, u32> {
        &self.symbols
    }

    /// Nearest symbol at or before `pc`, with the offset from it.
    pub fn nearest_symbol(&self, pc: u32) -> Option<(&str, u32)> {
        self.symbols
            .iter()
            .filter(|(_, addr)| **addr <= pc)
            .max_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| b_name.cmp(a_name)))
            .map(|(name, addr)| (name.as_str(), pc - addr))
    }

    /// Render an address as `0x... <sym+0x..>`.
    pub fn describe(&self, pc: u32) -> String {
        match self.nearest_symbol(pc) {
            Some((name, 0)) => format!("{pc:#010x} <{name}>"),
            Some((name, off)) => format!("{pc:#010x} <{name}+{off:#x}>"),
            None => format!("{pc:#010x}"),
        }
    }

    /// Every architectural storage location of the target.
    pub fn locations(&self) -> impl Iterator<Item = Location> {
        Location::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_listing() {
        let program = Program::from_listing(
            "
            main:
                addi x2, x0, 1
            helper:
                ecall
            ",
        )
        .unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program.symbol("helper"), Some(4));
        assert_eq!(program.get(4).unwrap().to_string(), "ecall");
        assert!(program.get(8).is_none());
    }

    #[test]
    fn test_describe() {
        let program = Program::from_listing("a:\nnop\nnop\nb:\nnop\n").unwrap();
        assert_eq!(program.describe(0), "0x00000000 <a>");
        assert_eq!(program.describe(4), "0x00000004 <a+0x4>");
        assert_eq!(program.describe(8), "0x00000008 <b>");
    }

    #[test]
    fn test_syntax_error_is_decode_error() {
        let err = Program::from_listing("nop\nbogus x1\n").unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { line: 2, .. }));
    }

    #[test]
    fn test_indirect_targets() {
        let mut program = Program::from_listing("jr x5\nnop\n").unwrap();
        assert!(program.set_indirect_targets(0, [4]));
        assert!(!program.set_indirect_targets(100, [4]));
        assert_eq!(
            program.get(0).unwrap().control,
            ctcheck_isa::Control::IndirectJump { targets: vec![4] }
        );
    }
}
