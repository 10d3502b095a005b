//! Helper functions for parsing ELF files

use object::elf;
use object::read::elf::FileHeader;
use object::read::elf::ProgramHeader;
use object::Endianness;

pub type ELFReaderType = elf::FileHeader32<Endianness>;
pub type Segment = elf::ProgramHeader32<Endianness>;

/// ELF files start with this
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

pub fn is_elf(data: &[u8]) -> bool {
    data.starts_with(&ELF_MAGIC)
}

/// Parses the ELF32 file header
pub fn parse_elf(data: &[u8]) -> object::Result<ELFReaderType> {
    let elf = elf::FileHeader32::<Endianness>::parse(data)?;
    Ok(*elf)
}

/// Returns the program entry address
pub fn get_elf_entry(elf_reader: &ELFReaderType) -> object::Result<u32> {
    let endian = get_elf_endian(elf_reader)?;
    Ok(elf_reader.e_entry(endian))
}

/// Returns the endianness
pub fn get_elf_endian(elf_reader: &ELFReaderType) -> object::Result<Endianness> {
    elf_reader.endian()
}

/// Returns the machine type
pub fn get_elf_machine(elf_reader: &ELFReaderType) -> object::Result<u16> {
    Ok(elf_reader.e_machine(get_elf_endian(elf_reader)?))
}

/// Returns the loadable segments only
pub fn get_elf_segments(
    elf_reader: &ELFReaderType,
    elf_data: &[u8],
) -> object::Result<Vec<Segment>> {
    let endian = get_elf_endian(elf_reader)?;
    Ok(elf_reader
        .program_headers(endian, elf_data)?
        .iter()
        .filter(|segment| segment.p_type(endian) == elf::PT_LOAD)
        .copied()
        .collect())
}

/// Does the segment hold code?
pub fn is_executable(segment: &Segment, endian: Endianness) -> bool {
    segment.p_flags(endian) & elf::PF_X != 0
}
