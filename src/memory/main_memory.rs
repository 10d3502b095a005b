//! Flat, byte-addressable backing memory with a base offset.
//! Words and halfwords are stored big-endian.

use log::warn;

use crate::error::MemoryError;
use crate::error::MemoryErrorKind;
use crate::error::SimulatorError;
use crate::error::SimulatorResult;

/// Default base offset of main memory
pub const MEMORY_START: u32 = 0;
/// Default main memory size: 1 MiB
pub const MEMORY_SIZE: u32 = 1 << 20;

/// Main memory configuration
#[derive(Clone, Copy, Debug)]
pub struct MemoryConfig {
    pub start: u32,
    /// Size in bytes
    pub size: u32,
    /// Reject out-of-window and misaligned accesses
    pub sanity_check: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { start: MEMORY_START, size: MEMORY_SIZE, sanity_check: true }
    }
}

/// Main memory
pub struct MainMemory {
    config: MemoryConfig,
    data: Vec<u8>,
}

impl MainMemory {
    pub fn make(config: MemoryConfig) -> SimulatorResult<Self> {
        if config.size == 0 {
            return Err(SimulatorError::ConfigError(
                "Main memory size must be non-zero".into(),
            ));
        }
        if config.start.checked_add(config.size - 1).is_none() {
            return Err(SimulatorError::ConfigError(format!(
                "Main memory window {:#010x}+{:#x} exceeds the address space",
                config.start, config.size
            )));
        }
        Ok(Self { config, data: vec![0; config.size as usize] })
    }

    pub fn start(&self) -> u32 {
        self.config.start
    }

    /// First address past the window
    pub fn end(&self) -> u64 {
        self.config.start as u64 + self.config.size as u64
    }

    pub fn contains(&self, address: u32, width: u32) -> bool {
        address >= self.config.start
            && (address as u64 + width as u64) <= self.end()
    }

    /// Translates an address into an offset into the backing array.
    /// None means the access must be ignored (sanity checking is off).
    fn offset(&self, address: u32, width: u32) -> SimulatorResult<Option<usize>> {
        if self.config.sanity_check && address % width != 0 {
            return Err(MemoryError::AlignmentError(address, width).into());
        }
        if !self.contains(address, width) {
            if self.config.sanity_check {
                return Err(MemoryError::AccessError {
                    address,
                    kind: MemoryErrorKind::OutOfBounds,
                }
                .into());
            }
            warn!("Ignoring out-of-range access at {:#010x}", address);
            return Ok(None);
        }
        Ok(Some((address - self.config.start) as usize))
    }

    /// Fails the way an access of `width` bytes at `address` would
    pub fn check(&self, address: u32, width: u32) -> SimulatorResult<()> {
        self.offset(address, width).map(|_| ())
    }

    fn read(&self, address: u32, width: u32) -> SimulatorResult<u32> {
        Ok(match self.offset(address, width)? {
            Some(offset) => self.data[offset..offset + width as usize]
                .iter()
                .fold(0, |acc, &byte| (acc << 8) | byte as u32),
            None => 0,
        })
    }

    fn write(&mut self, address: u32, width: u32, value: u32) -> SimulatorResult<()> {
        if let Some(offset) = self.offset(address, width)? {
            let bytes = value.to_be_bytes();
            self.data[offset..offset + width as usize]
                .copy_from_slice(&bytes[4 - width as usize..]);
        }
        Ok(())
    }

    pub fn read_word(&self, address: u32) -> SimulatorResult<u32> {
        self.read(address, 4)
    }
    pub fn read_halfword(&self, address: u32) -> SimulatorResult<u32> {
        self.read(address, 2)
    }
    pub fn read_byte(&self, address: u32) -> SimulatorResult<u32> {
        self.read(address, 1)
    }

    pub fn write_word(&mut self, address: u32, value: u32) -> SimulatorResult<()> {
        self.write(address, 4, value)
    }
    pub fn write_halfword(&mut self, address: u32, value: u32) -> SimulatorResult<()> {
        self.write(address, 2, value)
    }
    pub fn write_byte(&mut self, address: u32, value: u32) -> SimulatorResult<()> {
        self.write(address, 1, value)
    }

    /// Copies raw bytes into memory, used by the loaders
    pub fn load(&mut self, address: u32, bytes: &[u8]) -> SimulatorResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if !self.contains(address, bytes.len() as u32) {
            return Err(MemoryError::AccessError {
                address,
                kind: MemoryErrorKind::OutOfBounds,
            }
            .into());
        }
        let offset = (address - self.config.start) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
