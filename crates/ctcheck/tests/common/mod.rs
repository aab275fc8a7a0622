#![allow(dead_code)]

use std::io::Write;

use tempfile::NamedTempFile;

/// Build a minimal executable ELF32 with one code segment at `base`.
pub fn build_elf(base: u32, words: &[u32], symbols: &[(&str, u32)]) -> Vec<u8> {
    const EHDR: usize = 52;
    const PHDR: usize = 32;

    let text: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
    let text_off = EHDR + PHDR;

    let mut strtab = vec![0u8];
    let mut syms = vec![0u8; 16];
    for (name, value) in symbols {
        let name_off = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
        syms.extend_from_slice(&name_off.to_le_bytes());
        syms.extend_from_slice(&value.to_le_bytes());
        syms.extend_from_slice(&0u32.to_le_bytes());
        syms.push(0x12); // STB_GLOBAL | STT_FUNC
        syms.push(0);
        syms.extend_from_slice(&1u16.to_le_bytes());
    }
    let shstrtab = b"\0.text\0.symtab\0.strtab\0.shstrtab\0".to_vec();

    let strtab_off = text_off + text.len();
    let symtab_off = (strtab_off + strtab.len()).next_multiple_of(4);
    let shstrtab_off = symtab_off + syms.len();
    let shoff = (shstrtab_off + shstrtab.len()).next_multiple_of(4);

    let mut out = vec![0u8; shoff];
    out[..4].copy_from_slice(b"\x7FELF");
    out[4] = 1; // ELFCLASS32
    out[5] = 1; // little-endian
    out[6] = 1;
    out[16..18].copy_from_slice(&2u16.to_le_bytes());
    out[18..20].copy_from_slice(&243u16.to_le_bytes());
    out[20..24].copy_from_slice(&1u32.to_le_bytes());
    out[24..28].copy_from_slice(&base.to_le_bytes());
    out[28..32].copy_from_slice(&(EHDR as u32).to_le_bytes());
    out[32..36].copy_from_slice(&(shoff as u32).to_le_bytes());
    out[40..42].copy_from_slice(&(EHDR as u16).to_le_bytes());
    out[42..44].copy_from_slice(&(PHDR as u16).to_le_bytes());
    out[44..46].copy_from_slice(&1u16.to_le_bytes());
    out[46..48].copy_from_slice(&40u16.to_le_bytes());
    out[48..50].copy_from_slice(&5u16.to_le_bytes());
    out[50..52].copy_from_slice(&4u16.to_le_bytes());

    let phdr = [
        1,                 // PT_LOAD
        text_off as u32,   // offset
        base,              // vaddr
        base,              // paddr
        text.len() as u32, // filesz
        text.len() as u32, // memsz
        0x5,               // PF_R | PF_X
        4,                 // align
    ];
    for (i, field) in phdr.iter().enumerate() {
        let at = EHDR + i * 4;
        out[at..at + 4].copy_from_slice(&field.to_le_bytes());
    }

    out[text_off..text_off + text.len()].copy_from_slice(&text);
    out[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);
    out[symtab_off..symtab_off + syms.len()].copy_from_slice(&syms);
    out[shstrtab_off..shstrtab_off + shstrtab.len()].copy_from_slice(&shstrtab);

    let sections: [[u32; 10]; 5] = [
        [0; 10],
        [1, 1, 0x6, base, text_off as u32, text.len() as u32, 0, 0, 4, 0],
        [7, 2, 0, 0, symtab_off as u32, syms.len() as u32, 3, 1, 4, 16],
        [15, 3, 0, 0, strtab_off as u32, strtab.len() as u32, 0, 0, 1, 0],
        [23, 3, 0, 0, shstrtab_off as u32, shstrtab.len() as u32, 0, 0, 1, 0],
    ];
    for section in sections {
        for field in section {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
    out
}

/// Write `bytes` to a temporary file that lives as long as the handle.
pub fn temp_file(bytes: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}
