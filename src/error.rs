use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the simulator
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Failed to load program: {0}")]
    ElfLoadError(#[from] ElfError),

    #[error("CPU execution error: {0}")]
    ExecutionError(#[from] ExecutionError),

    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),

    #[error("Invalid instruction: {0:#010x} at PC={1:#010x}")]
    InvalidInstructionError(u32, u32),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

/// Errors related to program files
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("Failed to read program file '{0}': {1}")]
    FileReadError(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse program file '{0}': {1}")]
    ParseError(PathBuf, String),

    #[error("Memory address out of bounds: {0:#010x}")]
    AddressOutOfBounds(u32),

    #[error("Invalid ELF machine type: {0} (expected MIPS)")]
    InvalidMachine(u16),
}

/// Errors related to CPU execution
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Arithmetic overflow at PC={pc:#010x}")]
    ArithmeticOverflow { pc: u32 },

    #[error("Execution limit reached: {0} cycles")]
    ExecutionLimitReached(u64),
}

/// Errors related to memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory access error at address {address:#010x}: {kind}")]
    AccessError { address: u32, kind: MemoryErrorKind },

    #[error("Invalid memory alignment: address {0:#010x} is not aligned to {1} bytes")]
    AlignmentError(u32, u32),

    #[error("The {0} cache is used but was never configured")]
    CacheNotInitialized(&'static str),
}

/// Specific kinds of memory errors
#[derive(Error, Debug)]
pub enum MemoryErrorKind {
    #[error("Attempted to access memory outside addressable range")]
    OutOfBounds,
}

/// Type alias for Result with SimulatorError
pub type SimulatorResult<T> = Result<T, SimulatorError>;
