//! Utility functions for preparing the CPU and memory for execution

use std::fs;
use std::path::Path;

use log::debug;
use log::info;
use object::elf::EM_MIPS;
use object::read::elf::ProgramHeader;
use object::Endianness;

use crate::cpu::CPUState;
use crate::elf_helper::*;
use crate::error::ElfError;
use crate::error::SimulatorResult;
use crate::memory::main_memory::MainMemory;

/// Loads a program file: a big-endian MIPS ELF executable, or a text file
/// of hexadecimal instruction words
pub fn load_program(
    path: &Path,
    cpu: &mut CPUState,
    mem: &mut MainMemory,
) -> SimulatorResult<()> {
    let data =
        fs::read(path).map_err(|e| ElfError::FileReadError(path.into(), e))?;
    load_bytes(path, &data, cpu, mem)
}

/// Same as [`load_program`] on bytes already read from `path`
pub fn load_bytes(
    path: &Path,
    data: &[u8],
    cpu: &mut CPUState,
    mem: &mut MainMemory,
) -> SimulatorResult<()> {
    if is_elf(data) {
        let elf_reader = parse_elf(data).map_err(|e| parse_error(path, e))?;
        load_elf(path, cpu, mem, &elf_reader, data)
    } else {
        let text = std::str::from_utf8(data).map_err(|e| parse_error(path, e))?;
        load_hex(path, cpu, mem, text)
    }
}

fn parse_error(path: &Path, err: impl std::fmt::Display) -> ElfError {
    ElfError::ParseError(path.into(), err.to_string())
}

/// Loads an ELF file for the CPU
pub fn load_elf(
    path: &Path,
    cpu: &mut CPUState,
    mem: &mut MainMemory,
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> SimulatorResult<()> {
    let endian = get_elf_endian(elf_reader).map_err(|e| parse_error(path, e))?;
    if endian != Endianness::Big {
        return Err(parse_error(path, "expected a big-endian executable").into());
    }
    let machine = get_elf_machine(elf_reader).map_err(|e| parse_error(path, e))?;
    if machine != EM_MIPS {
        return Err(ElfError::InvalidMachine(machine).into());
    }

    // Set program entry
    let entry = get_elf_entry(elf_reader).map_err(|e| parse_error(path, e))?;
    cpu.pc.write(entry);
    info!("Initial PC: {:#010x}", entry);

    let mut program_end = None;
    let segments =
        get_elf_segments(elf_reader, elf_data).map_err(|e| parse_error(path, e))?;
    for segment in segments {
        let virtual_address = segment.p_vaddr(endian);
        let memory_size = segment.p_memsz(endian);
        let file_size = segment.p_filesz(endian);
        let offset = segment.p_offset(endian) as usize;

        debug!(
            "Loading segment at {:#010x}: {:#x} bytes in memory, {:#x} in file",
            virtual_address, memory_size, file_size
        );

        // Can't handle with 32b memory
        let end = virtual_address
            .checked_add(memory_size)
            .ok_or(ElfError::AddressOutOfBounds(virtual_address))?;
        if memory_size > 0 && !mem.contains(virtual_address, memory_size) {
            return Err(ElfError::AddressOutOfBounds(virtual_address).into());
        }
        if file_size > memory_size {
            return Err(parse_error(path, "segment file size exceeds its memory size").into());
        }

        let bytes = elf_data
            .get(offset..offset + file_size as usize)
            .ok_or_else(|| parse_error(path, "segment data past the end of file"))?;
        mem.load(virtual_address, bytes)?;
        // The rest of the segment is zero-filled
        let zeros = vec![0; (memory_size - file_size) as usize];
        mem.load(virtual_address + file_size, &zeros)?;

        if is_executable(&segment, endian) {
            program_end = program_end.max(Some(end));
        }
    }

    cpu.program_end =
        program_end.ok_or_else(|| parse_error(path, "no executable segment"))?;
    Ok(())
}

/// Parses one instruction word per line. `#` starts a comment; the `0x`
/// prefix is optional.
pub fn parse_hex_words(text: &str) -> Result<Vec<u32>, String> {
    let mut words = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        // Skip empty lines
        if line.is_empty() {
            continue;
        }

        let digits = line
            .strip_prefix("0x")
            .or_else(|| line.strip_prefix("0X"))
            .unwrap_or(line);
        let word = u32::from_str_radix(digits, 16).map_err(|_| {
            format!("Invalid instruction word '{}' at line {}", line, line_num + 1)
        })?;
        words.push(word);
    }
    Ok(words)
}

/// Loads a hex word listing from the start of memory
pub fn load_hex(
    path: &Path,
    cpu: &mut CPUState,
    mem: &mut MainMemory,
    text: &str,
) -> SimulatorResult<()> {
    let words = parse_hex_words(text).map_err(|e| parse_error(path, e))?;
    if words.is_empty() {
        return Err(parse_error(path, "no instructions").into());
    }

    let start = mem.start();
    let bytes: Vec<u8> = words.iter().flat_map(|word| word.to_be_bytes()).collect();
    if !mem.contains(start, bytes.len() as u32) {
        return Err(ElfError::AddressOutOfBounds(start).into());
    }
    mem.load(start, &bytes)?;

    cpu.pc.write(start);
    cpu.program_end = start + bytes.len() as u32;
    info!("Loaded {} instruction words at {:#010x}", words.len(), start);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CPUPolicy;
    use crate::error::SimulatorError;
    use crate::instruction::encode;
    use crate::memory::main_memory::MemoryConfig;
    use object::elf::PF_R;
    use object::elf::PF_W;
    use object::elf::PF_X;

    fn machine() -> (CPUState, MainMemory) {
        (
            CPUState::make(CPUPolicy::default()),
            MainMemory::make(MemoryConfig::default()).unwrap(),
        )
    }

    /// A minimal big-endian ELF32 executable with one segment per entry
    /// of `segments`: (address, flags, words, extra zero-filled bytes)
    fn elf_image(
        e_machine: u16,
        entry: u32,
        segments: &[(u32, u32, Vec<u32>, u32)],
    ) -> Vec<u8> {
        let phoff = 52u32;
        let mut data_offset = phoff + 32 * segments.len() as u32;

        let mut image = Vec::new();
        image.extend_from_slice(&ELF_MAGIC);
        // 32-bit, big-endian, version 1
        image.extend_from_slice(&[1, 2, 1]);
        image.resize(16, 0);
        image.extend_from_slice(&2u16.to_be_bytes()); // ET_EXEC
        image.extend_from_slice(&e_machine.to_be_bytes());
        image.extend_from_slice(&1u32.to_be_bytes());
        image.extend_from_slice(&entry.to_be_bytes());
        image.extend_from_slice(&phoff.to_be_bytes());
        image.extend_from_slice(&0u32.to_be_bytes()); // no sections
        image.extend_from_slice(&0u32.to_be_bytes());
        image.extend_from_slice(&52u16.to_be_bytes());
        image.extend_from_slice(&32u16.to_be_bytes());
        image.extend_from_slice(&(segments.len() as u16).to_be_bytes());
        image.extend_from_slice(&40u16.to_be_bytes());
        image.extend_from_slice(&0u16.to_be_bytes());
        image.extend_from_slice(&0u16.to_be_bytes());
        assert_eq!(image.len(), 52);

        for (address, flags, words, bss) in segments {
            let file_size = 4 * words.len() as u32;
            for field in [
                object::elf::PT_LOAD,
                data_offset,
                *address,
                *address,
                file_size,
                file_size + bss,
                *flags,
                4,
            ] {
                image.extend_from_slice(&field.to_be_bytes());
            }
            data_offset += file_size;
        }
        for (_, _, words, _) in segments {
            for word in words {
                image.extend_from_slice(&word.to_be_bytes());
            }
        }
        image
    }

    #[test]
    fn test_parse_hex_words() {
        let text = "# sum\n0x20110064\n\n20120031 # s2 = 49\n  0X02328820\n";
        assert_eq!(
            parse_hex_words(text).unwrap(),
            vec![0x2011_0064, 0x2012_0031, 0x0232_8820]
        );
        assert!(parse_hex_words("0xnothex\n").unwrap_err().contains("line 1"));
    }

    #[test]
    fn test_load_hex() {
        let (mut cpu, mut mem) = machine();
        let text = format!("{:08x}\n{:08x}\n", encode::addi(17, 0, 100), encode::addi(18, 0, 49));
        load_bytes(Path::new("sum.hex"), text.as_bytes(), &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.pc.read(), 0);
        assert_eq!(cpu.program_end, 8);
        assert_eq!(mem.read_word(4).unwrap(), encode::addi(18, 0, 49));
    }

    #[test]
    fn test_empty_hex_is_rejected() {
        let (mut cpu, mut mem) = machine();
        let result = load_bytes(Path::new("empty.hex"), b"# nothing\n", &mut cpu, &mut mem);
        assert!(matches!(
            result,
            Err(SimulatorError::ElfLoadError(ElfError::ParseError(..)))
        ));
    }

    #[test]
    fn test_load_elf() {
        let (mut cpu, mut mem) = machine();
        let code = vec![encode::addi(8, 0, 1), encode::j(0x400)];
        let image = elf_image(
            EM_MIPS,
            0x404,
            &[(0x400, PF_R | PF_X, code.clone(), 0), (0x800, PF_R | PF_W, vec![7], 8)],
        );
        load_bytes(Path::new("prog.elf"), &image, &mut cpu, &mut mem).unwrap();
        assert_eq!(cpu.pc.read(), 0x404);
        // Code ends where the executable segment ends, not the data
        assert_eq!(cpu.program_end, 0x408);
        assert_eq!(mem.read_word(0x400).unwrap(), code[0]);
        assert_eq!(mem.read_word(0x404).unwrap(), code[1]);
        assert_eq!(mem.read_word(0x800).unwrap(), 7);
    }

    #[test]
    fn test_elf_machine_must_be_mips() {
        let (mut cpu, mut mem) = machine();
        // EM_RISCV
        let image = elf_image(243, 0, &[(0, PF_X, vec![0], 0)]);
        let result = load_bytes(Path::new("prog.elf"), &image, &mut cpu, &mut mem);
        assert!(matches!(
            result,
            Err(SimulatorError::ElfLoadError(ElfError::InvalidMachine(243)))
        ));
    }

    #[test]
    fn test_elf_segment_outside_memory() {
        let (mut cpu, mut mem) = machine();
        let image = elf_image(EM_MIPS, 0, &[(0x4000_0000, PF_X, vec![0], 0)]);
        let result = load_bytes(Path::new("prog.elf"), &image, &mut cpu, &mut mem);
        assert!(matches!(
            result,
            Err(SimulatorError::ElfLoadError(ElfError::AddressOutOfBounds(0x4000_0000)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let (mut cpu, mut mem) = machine();
        let result = load_program(Path::new("/nonexistent/prog.hex"), &mut cpu, &mut mem);
        assert!(matches!(
            result,
            Err(SimulatorError::ElfLoadError(ElfError::FileReadError(..)))
        ));
    }
}
